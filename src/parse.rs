//! Parsing assembly source code into [`AsmLine`] records.
//!
//! Gumnut assembly is line-oriented, so each line is tokenized ([`lex`])
//! and parsed on its own. The main functions are:
//! - [`parse_line`]: parses one line
//! - [`parse_source`]: parses every line of a source file
//!
//! # Example
//! ```
//! use gumnut_sim::parse::parse_line;
//! use gumnut_sim::parse::lex::Ident;
//! use gumnut_sim::ast::Operand;
//! use gumnut_sim::ast::reg_consts::{R1, R2};
//!
//! let line = parse_line("loop: ldm r1, (r2) + 0x12 ; fetch").unwrap();
//! assert_eq!(line.label.as_deref(), Some("loop"));
//! assert_eq!(line.mnemonic, Some(Ident::LDM));
//! assert_eq!(line.operands, [Some(Operand::Reg(R1)), Some(Operand::Reg(R2)), Some(Operand::Num(0x12))]);
//! ```

pub mod lex;

use std::ops::Range;

use logos::{Logos, Span};

use crate::ast::asm::AsmLine;
use crate::ast::{Operand, Reg};
use lex::{LexErr, Numeral, Token};

/// Kinds of errors that can occur from parsing a line.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum ParseErrKind {
    /// A token could not be lexed.
    Lex(LexErr),
    /// The first token after the label was not a mnemonic.
    ExpectedMnemonic,
    /// An operand was expected (e.g., after a comma).
    ExpectedOperand,
    /// Operands must be separated by commas.
    ExpectedComma,
    /// An indexed operand was not closed with `)`.
    UnclosedIndex,
    /// An indexed operand's base was not a register or a label.
    InvalidIndexBase,
    /// More than three operand fields were given.
    TooManyOperands,
}
impl std::fmt::Display for ParseErrKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lex(e)           => e.fmt(f),
            Self::ExpectedMnemonic => f.write_str("expected mnemonic"),
            Self::ExpectedOperand  => f.write_str("expected operand"),
            Self::ExpectedComma    => f.write_str("expected comma between operands"),
            Self::UnclosedIndex    => f.write_str("indexed operand was never closed"),
            Self::InvalidIndexBase => f.write_str("invalid base of indexed operand"),
            Self::TooManyOperands  => f.write_str("too many operands"),
        }
    }
}

/// Error from parsing a source line.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ParseErr {
    /// The kind of error.
    pub kind: ParseErrKind,
    /// The source line (0-indexed) this error occurred on.
    ///
    /// This is always 0 for errors from [`parse_line`].
    pub line: usize,
    /// The character range within the line associated with this error.
    pub span: Range<usize>,
}
impl ParseErr {
    fn new(kind: ParseErrKind, span: Span) -> Self {
        ParseErr { kind, line: 0, span }
    }
}
impl std::fmt::Display for ParseErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.kind.fmt(f)
    }
}
impl std::error::Error for ParseErr {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            ParseErrKind::Lex(e) => Some(e),
            _ => None
        }
    }
}
impl crate::err::Error for ParseErr {
    fn line(&self) -> Option<usize> {
        Some(self.line)
    }

    fn help(&self) -> Option<std::borrow::Cow<str>> {
        match &self.kind {
            ParseErrKind::Lex(e)           => crate::err::Error::help(e),
            ParseErrKind::ExpectedMnemonic => Some("a line holds an optional `label:` followed by a mnemonic".into()),
            ParseErrKind::ExpectedOperand  => Some("operands are registers, numbers, labels, or (rN) + offset".into()),
            ParseErrKind::ExpectedComma    => Some("try adding a comma between these operands".into()),
            ParseErrKind::UnclosedIndex    => Some("try adding a ')' after the base register".into()),
            ParseErrKind::InvalidIndexBase => Some("the base of an indexed operand must be a register or a label".into()),
            ParseErrKind::TooManyOperands  => Some("instructions take at most three operands, and (rN) + k counts as two".into()),
        }
    }
}

/// Parses every line of a source file.
///
/// The returned vector has one record per source line,
/// so its indices are the 0-indexed line numbers.
pub fn parse_source(src: &str) -> Result<Vec<AsmLine>, ParseErr> {
    src.lines()
        .enumerate()
        .map(|(lno, line)| parse_line(line).map_err(|e| ParseErr { line: lno, ..e }))
        .collect()
}

/// Parses one line of source into an [`AsmLine`].
///
/// Blank and comment-only lines produce a record with every field absent.
pub fn parse_line(line: &str) -> Result<AsmLine, ParseErr> {
    let tokens = Token::lexer(line)
        .spanned()
        .filter(|(t, _)| !matches!(t, Ok(Token::Comment)))
        .map(|(t, span)| match t {
            Ok(t)  => Ok((t, span)),
            Err(e) => Err(ParseErr::new(ParseErrKind::Lex(e), span)),
        })
        .collect::<Result<Vec<_>, _>>()?;

    LineParser { src: line, tokens: &tokens, index: 0 }.parse()
}

struct LineParser<'s> {
    src: &'s str,
    tokens: &'s [(Token, Span)],
    index: usize,
}
impl<'s> LineParser<'s> {
    fn peek(&self) -> Option<&'s Token> {
        let tokens = self.tokens;
        tokens.get(self.index).map(|(t, _)| t)
    }
    fn advance(&mut self) -> Option<(&'s Token, Span)> {
        let tokens = self.tokens;
        let (t, s) = tokens.get(self.index)?;
        self.index += 1;
        Some((t, s.clone()))
    }
    /// Span of the next token, or the end of the line.
    fn cursor(&self) -> Span {
        match self.tokens.get(self.index) {
            Some((_, s)) => s.clone(),
            None => self.src.len()..self.src.len(),
        }
    }

    fn parse(mut self) -> Result<AsmLine, ParseErr> {
        let mut record = AsmLine::default();

        // label:
        if let [(Token::Ident(_), span), (Token::Colon, _), ..] = self.tokens {
            record.label = Some(self.src[span.clone()].to_string());
            self.index += 2;
        }

        // mnemonic
        match self.advance() {
            Some((Token::Ident(id), _)) => record.mnemonic = Some(id.clone()),
            Some((_, span)) => return Err(ParseErr::new(ParseErrKind::ExpectedMnemonic, span)),
            None => return Ok(record),
        }

        // operands
        let mut fields = vec![];
        if self.peek().is_some() {
            loop {
                let start = self.cursor().start;
                self.parse_operand(&mut fields)?;
                if fields.len() > record.operands.len() {
                    return Err(ParseErr::new(ParseErrKind::TooManyOperands, start..self.cursor().start));
                }

                match self.advance() {
                    Some((Token::Comma, _)) => {},
                    Some((_, span)) => return Err(ParseErr::new(ParseErrKind::ExpectedComma, span)),
                    None => break,
                }
            }
        }
        for (slot, op) in record.operands.iter_mut().zip(fields) {
            slot.replace(op);
        }

        Ok(record)
    }

    /// Parses one operand, pushing one field (or two for indexed operands).
    fn parse_operand(&mut self, fields: &mut Vec<Operand>) -> Result<(), ParseErr> {
        let Some((token, span)) = self.advance() else {
            return Err(ParseErr::new(ParseErrKind::ExpectedOperand, self.cursor()));
        };

        match token {
            Token::Reg(r)     => fields.push(Operand::Reg(Reg(*r))),
            Token::Numeral(n) => fields.push(numeral_operand(*n)),
            Token::Ident(_)   => fields.push(Operand::Symbol(self.src[span].to_string())),
            Token::LParen => {
                let base = match self.advance() {
                    Some((Token::Reg(r), _)) => Operand::Reg(Reg(*r)),
                    Some((Token::Ident(_), span)) => Operand::Symbol(self.src[span].to_string()),
                    Some((_, span)) => return Err(ParseErr::new(ParseErrKind::InvalidIndexBase, span)),
                    None => return Err(ParseErr::new(ParseErrKind::InvalidIndexBase, self.cursor())),
                };
                match self.advance() {
                    Some((Token::RParen, _)) => {},
                    Some((_, span)) => return Err(ParseErr::new(ParseErrKind::UnclosedIndex, span)),
                    None => return Err(ParseErr::new(ParseErrKind::UnclosedIndex, self.cursor())),
                }

                let offset = self.parse_offset()?;
                fields.push(base);
                fields.push(offset);
            },
            _ => return Err(ParseErr::new(ParseErrKind::ExpectedOperand, span)),
        }

        Ok(())
    }

    /// Parses the optional `+ k` / `- k` following an indexed base.
    fn parse_offset(&mut self) -> Result<Operand, ParseErr> {
        let negate = match self.peek() {
            Some(Token::Plus)  => { self.index += 1; false },
            Some(Token::Minus) => { self.index += 1; true },
            // the sign is part of the numeral (e.g., `(r2)-0x12`)
            Some(Token::Numeral(_)) => false,
            _ => return Ok(Operand::Num(0)),
        };

        match self.advance() {
            Some((Token::Numeral(Numeral::Value(v)), _)) if negate => Ok(Operand::Num(u32::from(v.wrapping_neg() as u8))),
            Some((Token::Numeral(n), _)) => Ok(numeral_operand(*n)),
            Some((_, span)) => Err(ParseErr::new(ParseErrKind::ExpectedOperand, span)),
            None => Err(ParseErr::new(ParseErrKind::ExpectedOperand, self.cursor())),
        }
    }
}

fn numeral_operand(n: Numeral) -> Operand {
    match n {
        Numeral::Value(v)   => Operand::Num(v),
        Numeral::NotANumber => Operand::NotANumber,
    }
}
