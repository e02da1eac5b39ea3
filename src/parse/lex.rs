//! Tokenizing Gumnut assembly.
//!
//! This module holds the tokens that characterize one line of Gumnut assembly ([`Token`]).
//! This module is used by the parser to facilitate the conversion of
//! a source line into a [`AsmLine`] record.
//!
//! The module's key data structure is the [`Token`] enum,
//! which lists all of the tokens of Gumnut assembly.
//!
//! [`AsmLine`]: crate::ast::asm::AsmLine

use std::num::IntErrorKind;

use logos::{Lexer, Logos};

/// A unit of information in Gumnut source code.
#[derive(Debug, Logos, PartialEq, Eq, Clone)]
#[logos(skip r"[ \t\r\n]+", error = LexErr)]
pub enum Token {
    // Note, the numeral regex spans over tokens that are technically invalid
    // (e.g., 23trst or 0.5 match). This is intended.
    // The regex collects what would be considered one discernable unit
    // and classifies it using `numeral`.

    /// A numeric literal (e.g., `9`, `-1`, `0x7F`, `0b101`).
    #[regex(r"[+-]?\d[\w.]*", lex_numeral)]
    Numeral(Numeral),

    /// A register value (i.e., `r0`-`r7`)
    #[regex(r"[Rr]\d+", lex_reg)]
    Reg(u8),

    /// An identifier.
    ///
    /// This can refer to either:
    /// - a label (e.g., `loop`, `start_val`, `done1`)
    /// - a mnemonic or directive (e.g. `add`, `jsb`, `org`)
    ///
    /// Mnemonics are case-insensitive.
    #[regex(r"[A-Za-z_][\w.]*", |lx| lx.slice().parse::<Ident>().ok())]
    Ident(Ident),

    /// A colon, which ends a label
    #[token(":")]
    Colon,

    /// A comma, which delineate operands of an instruction
    #[token(",")]
    Comma,

    /// Opening parenthesis of an indexed operand
    #[token("(")]
    LParen,

    /// Closing parenthesis of an indexed operand
    #[token(")")]
    RParen,

    /// Plus sign of an indexed offset
    #[token("+")]
    Plus,

    /// Minus sign of an indexed offset
    #[token("-")]
    Minus,

    /// A comment, which starts with a semicolon and spans the remaining part of the line.
    #[regex(r";.*")]
    Comment,
}

/// The value of a numeric literal.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum Numeral {
    /// A well-formed literal.
    ///
    /// Negative literals are held as their two's-complement byte (`-1` is `255`).
    /// Positive literals are not truncated here.
    Value(u32),
    /// Something that looks like a number but holds a `.` or `,` (e.g., `0.123`).
    ///
    /// Inside a source line, a comma always separates operands,
    /// so only [`numeral`] called on its own can see one.
    NotANumber,
}

macro_rules! ident_enum {
    ($($instr:ident = $name:literal),+) => {
        /// An identifier.
        ///
        /// This can refer to either:
        /// - a label (e.g., `loop`, `start_val`, `done1`)
        /// - a mnemonic or directive (e.g. `add`, `jsb`, `org`)
        ///
        /// Mnemonics are case insensitive, labels are not.
        #[derive(Debug, PartialEq, Eq, Hash, Clone)]
        pub enum Ident {
            $(
                #[allow(missing_docs)]
                $instr
            ),+,
            #[allow(missing_docs)]
            Label(String)
        }

        impl std::str::FromStr for Ident {
            type Err = std::convert::Infallible;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match &*s.to_lowercase() {
                    $($name => Ok(Self::$instr)),*,
                    _ => Ok(Self::Label(s.to_string()))
                }
            }
        }

        impl std::fmt::Display for Ident {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(Self::$instr => f.write_str($name)),*,
                    Self::Label(id) => f.write_str(id)
                }
            }
        }
    };
}
ident_enum! {
    ADD = "add", ADDC = "addc", SUB = "sub", SUBC = "subc",
    AND = "and", OR = "or", XOR = "xor", MASK = "mask",
    SHL = "shl", SHR = "shr", ROL = "rol", ROR = "ror",
    LDM = "ldm", STM = "stm", INP = "inp", OUT = "out",
    BZ = "bz", BNZ = "bnz", BC = "bc", BNC = "bnc",
    JMP = "jmp", JSB = "jsb",
    RET = "ret", RETI = "reti", ENAI = "enai", DISI = "disi", WAIT = "wait", STBY = "stby",
    ORG = "org", BYTE = "byte"
}
/// Any errors raised in attempting to tokenize an input stream.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Default)]
pub enum LexErr {
    /// Numeric literal cannot fit within the range of a u32
    DoesNotFit,
    /// Hex literal (starting with 0x) has invalid hex digits
    InvalidHex,
    /// Hex literal (starting with 0x) doesn't have digits after it.
    InvalidHexEmpty,
    /// Binary literal (starting with 0b) has digits other than 0 and 1
    InvalidBin,
    /// Binary literal (starting with 0b) doesn't have digits after it.
    InvalidBinEmpty,
    /// Numeric literal could not be parsed as a decimal literal because it has invalid digits (i.e., not 0-9)
    InvalidNumeric,
    /// Int parsing failed but the reason why is unknown
    UnknownIntErr,
    /// Token had the format r\d, but \d isn't 0-7.
    InvalidReg,
    /// A symbol was used which is not allowed in Gumnut assembly files
    #[default]
    InvalidSymbol
}
impl std::fmt::Display for LexErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LexErr::DoesNotFit      => f.write_str("numeric token does not fit 32-bit unsigned integer"),
            LexErr::InvalidHex      => f.write_str("invalid hex literal"),
            LexErr::InvalidHexEmpty => f.write_str("invalid hex literal"),
            LexErr::InvalidBin      => f.write_str("invalid binary literal"),
            LexErr::InvalidBinEmpty => f.write_str("invalid binary literal"),
            LexErr::InvalidNumeric  => f.write_str("invalid decimal literal"),
            LexErr::UnknownIntErr   => f.write_str("could not parse integer"),
            LexErr::InvalidReg      => f.write_str("invalid register"),
            LexErr::InvalidSymbol   => f.write_str("unrecognized symbol"),
        }
    }
}
impl std::error::Error for LexErr {}
impl crate::err::Error for LexErr {
    fn help(&self) -> Option<std::borrow::Cow<str>> {
        match self {
            LexErr::DoesNotFit      => Some(format!("the range for a numeric literal is [{}, {}]", u32::MIN, u32::MAX).into()),
            LexErr::InvalidHex      => Some("a hex literal starts with '0x' and consists of 0-9, A-F".into()),
            LexErr::InvalidHexEmpty => Some("there should be hex digits (0-9, A-F) here".into()),
            LexErr::InvalidBin      => Some("a binary literal starts with '0b' and consists of 0 and 1".into()),
            LexErr::InvalidBinEmpty => Some("there should be binary digits (0, 1) here".into()),
            LexErr::InvalidNumeric  => Some("a decimal literal only consists of digits 0-9".into()),
            LexErr::UnknownIntErr   => None,
            LexErr::InvalidReg      => Some("this must be r0-r7".into()),
            LexErr::InvalidSymbol   => Some("this char does not occur in any token in Gumnut assembly".into()),
        }
    }
}

/// Helper that converts an int error kind to its corresponding LexErr, based on the provided inputs.
fn convert_int_error(
    e: &IntErrorKind,
    invalid_digits_err: LexErr,
    empty_err: LexErr,
) -> LexErr {
    match e {
        IntErrorKind::Empty        => empty_err,
        IntErrorKind::InvalidDigit => invalid_digits_err,
        IntErrorKind::PosOverflow  => LexErr::DoesNotFit,
        IntErrorKind::NegOverflow  => LexErr::DoesNotFit,
        _ => LexErr::UnknownIntErr,
    }
}

/// Classifies a numeric token.
///
/// Accepts `0x` hex, `0b` binary and decimal literals with an optional sign.
/// Negative values are stored as their two's-complement byte.
/// A token holding a `.` or `,` is [`Numeral::NotANumber`] rather than an error,
/// so the assembler gets to decide what to do with it.
///
/// The lexer never hands this a `,`: in source, `byte 0,123` is two operands.
///
/// # Example
/// ```
/// use gumnut_sim::parse::lex::{numeral, Numeral};
///
/// assert_eq!(numeral("0x12"), Ok(Numeral::Value(0x12)));
/// assert_eq!(numeral("-1"), Ok(Numeral::Value(255)));
/// assert_eq!(numeral("0.123"), Ok(Numeral::NotANumber));
/// ```
pub fn numeral(token: &str) -> Result<Numeral, LexErr> {
    if token.contains(['.', ',']) {
        return Ok(Numeral::NotANumber);
    }

    let (negative, unsigned) = match token.as_bytes().first() {
        Some(b'-') => (true, &token[1..]),
        Some(b'+') => (false, &token[1..]),
        _ => (false, token)
    };

    let (radix, digits, invalid_err, empty_err) = if let Some(hex) = unsigned.strip_prefix("0x").or_else(|| unsigned.strip_prefix("0X")) {
        (16, hex, LexErr::InvalidHex, LexErr::InvalidHexEmpty)
    } else if let Some(bin) = unsigned.strip_prefix("0b").or_else(|| unsigned.strip_prefix("0B")) {
        (2, bin, LexErr::InvalidBin, LexErr::InvalidBinEmpty)
    } else {
        (10, unsigned, LexErr::InvalidNumeric, LexErr::InvalidNumeric)
    };

    // from_str_radix accepts its own sign, which is not allowed after a prefix
    if digits.starts_with(['+', '-']) {
        return Err(invalid_err);
    }
    let magnitude = u32::from_str_radix(digits, radix)
        .map_err(|e| convert_int_error(e.kind(), invalid_err, empty_err))?;

    match negative {
        true  => Ok(Numeral::Value(u32::from(magnitude.wrapping_neg() as u8))),
        false => Ok(Numeral::Value(magnitude)),
    }
}
fn lex_numeral(lx: &Lexer<'_, Token>) -> Result<Numeral, LexErr> {
    numeral(lx.slice())
}
fn lex_reg(lx: &Lexer<'_, Token>) -> Result<u8, LexErr> {
    lx.slice()[1..].parse::<u8>().ok()
        .filter(|&r| r < 8)
        .ok_or(LexErr::InvalidReg)
}
