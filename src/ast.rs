//! Components relating to the abstract syntax trees (ASTs)
//! used in representing assembly instructions.
//!
//! These components together are used to construct...
//! - [`asm::AsmLine`] (a data structure holding one parsed assembly source line),
//! - and [`sim::SimInstr`] (a data structure holding a decoded instruction word).

pub mod asm;
pub mod sim;

use std::num::TryFromIntError;

/// A register. Must be between 0 and 7.
///
/// This `Reg` struct can either be constructed by selecting a register from [`reg_consts`],
/// or by using [`Reg::try_from`].
///
/// ## Examples
///
/// ```text
/// add r1, r2, 0x12
///     ~~  ~~
/// ldm r3, (r4) + 1
///     ~~   ~~
/// ```
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub struct Reg(pub(crate) u8);

/// Register constants!
pub mod reg_consts {
    use super::Reg;

    /// The 0th register in the register file.
    pub const R0: Reg = Reg(0);
    /// The 1st register in the register file.
    pub const R1: Reg = Reg(1);
    /// The 2nd register in the register file.
    pub const R2: Reg = Reg(2);
    /// The 3rd register in the register file.
    pub const R3: Reg = Reg(3);
    /// The 4th register in the register file.
    pub const R4: Reg = Reg(4);
    /// The 5th register in the register file.
    pub const R5: Reg = Reg(5);
    /// The 6th register in the register file.
    pub const R6: Reg = Reg(6);
    /// The 7th register in the register file.
    pub const R7: Reg = Reg(7);
}
impl Reg {
    /// Gets the register number of this [`Reg`]. This is always between 0 and 7.
    pub fn reg_no(self) -> u8 {
        self.0
    }

    /// Creates a register from the low 3 bits of an instruction field.
    pub(crate) fn from_field(bits: u32) -> Self {
        Reg((bits & 0b111) as u8)
    }
}
impl std::fmt::Display for Reg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "r{}", self.0)
    }
}
impl From<Reg> for usize {
    // Used for indexing the reg file in [`crate::sim::mem::RegFile`].
    fn from(value: Reg) -> Self {
        usize::from(value.0)
    }
}
impl TryFrom<u8> for Reg {
    type Error = TryFromIntError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0..=7 => Ok(Reg(value)),
            // HACKy, but there's no other way to create this error
            _     => u8::try_from(256).map(|_| unreachable!("should've been TryFromIntError")),
        }
    }
}

/// A value representing either an 8-bit immediate value or a register.
///
/// This is the second source operand of the ALU instructions,
/// where the instruction's addressing mode selects between the two.
///
/// ## Examples
/// ```text
/// add r1, r2, 0x12
///             ~~~~
/// add r1, r2, r3
///             ~~
/// ```
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum ImmOrReg {
    #[allow(missing_docs)]
    Imm(u8),
    #[allow(missing_docs)]
    Reg(Reg)
}
impl ImmOrReg {
    /// The addressing mode this operand is encoded with.
    pub fn mode(&self) -> AddrMode {
        match self {
            ImmOrReg::Imm(_) => AddrMode::Immediate,
            ImmOrReg::Reg(_) => AddrMode::Register,
        }
    }
}
impl std::fmt::Display for ImmOrReg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImmOrReg::Imm(imm) => imm.fmt(f),
            ImmOrReg::Reg(reg) => reg.fmt(f),
        }
    }
}

/// Whether an ALU operand is read from a register or taken as a literal.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum AddrMode {
    /// Second operand is a register.
    Register,
    /// Second operand is an 8-bit immediate.
    Immediate,
}

/// An operand of a parsed source line.
///
/// Operands are kept unresolved here. Symbols are replaced with addresses
/// and numerals are fitted into their fields by the assembler.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum Operand {
    /// A register (e.g., `r3`).
    Reg(Reg),
    /// A numeric literal (e.g., `0x12`, `-1`).
    ///
    /// Negative literals are stored as their two's-complement byte.
    Num(u32),
    /// A token that looked like a number but was malformed (e.g., `0.123`).
    NotANumber,
    /// A reference to a label.
    Symbol(String),
}
impl std::fmt::Display for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operand::Reg(r)    => r.fmt(f),
            Operand::Num(n)    => write!(f, "{n:#x}"),
            Operand::NotANumber => f.write_str("NaN"),
            Operand::Symbol(s) => f.write_str(s),
        }
    }
}
impl From<Reg> for Operand {
    fn from(value: Reg) -> Self {
        Operand::Reg(value)
    }
}
