//! The parsed form of one line of assembly source.

use crate::parse::lex::Ident;

use super::Operand;

/// One parsed source line: `label: mnemonic op1, op2, op3`.
///
/// Every field is optional. Blank and comment-only lines have all fields absent.
/// An indexed operand such as `(r2) + 0x12` occupies two operand slots
/// (the base and the offset), so `ldm r1, (r2) + 0x12` fills all three.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Default)]
pub struct AsmLine {
    /// The label defined on this line (without its colon).
    pub label: Option<String>,
    /// The mnemonic or directive.
    ///
    /// Unknown mnemonics appear here as [`Ident::Label`]
    /// and are rejected by the assembler.
    pub mnemonic: Option<Ident>,
    /// Up to three operands, filled in order.
    pub operands: [Option<Operand>; 3],
}
impl AsmLine {
    /// Whether this line has no label, no mnemonic and no operands.
    pub fn is_empty(&self) -> bool {
        self.label.is_none()
            && self.mnemonic.is_none()
            && self.operands.iter().all(Option::is_none)
    }

    /// Iterates over the operands that are present.
    pub fn operand_iter(&self) -> impl Iterator<Item = &Operand> + '_ {
        self.operands.iter().flatten()
    }
}
impl std::fmt::Display for AsmLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(label) = &self.label {
            write!(f, "{label}:")?;
            if self.mnemonic.is_some() { f.write_str(" ")?; }
        }
        if let Some(mn) = &self.mnemonic {
            write!(f, "{mn}")?;
            for (i, op) in self.operand_iter().enumerate() {
                match i {
                    0 => write!(f, " {op}")?,
                    _ => write!(f, ", {op}")?,
                }
            }
        }
        Ok(())
    }
}
