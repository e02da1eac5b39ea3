//! Decoded instructions and their bit-level encoding.
//!
//! Every instruction word is 18 bits wide in practice (the word is nominally 20 bits;
//! the top two bits are always clear). The leading run of set bits picks the family:
//!
//! ```text
//!             17  16  15  14  13  12  11  10   9   8   7   6   5   4   3   2   1   0
//! ALU imm   |  0 |    fn     |     rd    |     rs    |             imm8              |
//! Memory    |  1   0 |  fn   |     rd    |   base    |            offset             |
//! Shift     |  1   1   0 | - |     rd    |     rs    |   count   | -   -   - |  fn   |
//! ALU reg   |  1   1   1   0 |     rd    |     rs    |     rt    | -   - |    fn     |
//! Jump      |  1   1   1   1   0 | fn|                   address                     |
//! Branch    |  1   1   1   1   1   0 | cond  | -   - |             disp              |
//! Misc      |  1   1   1   1   1   1   0 |    fn     | -   -   -   -   -   -   -   - |
//! ```
//!
//! [`SimInstr::decode`] is total: every word maps to some instruction,
//! with reserved encodings mapping to [`SimInstr::Unknown`].
//! [`SimInstr::encode`] is its inverse for every instruction the assembler emits.

use super::{AddrMode, ImmOrReg, Reg};

/// The width of an instruction word in bits.
pub const WORD_BITS: u32 = 20;
/// Bits of the word that any defined instruction can use.
const USED_MASK: u32 = (1 << 18) - 1;

macro_rules! sub_op {
    ($(#[$m:meta])* $Op:ident { $($name:ident = $mnemonic:literal),+ }) => {
        $(#[$m])*
        #[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
        pub enum $Op {
            $(
                #[allow(missing_docs)]
                $name
            ),+
        }
        impl $Op {
            const ALL: &'static [$Op] = &[$($Op::$name),+];

            /// The sub-opcode value of this operation.
            pub fn id(self) -> u8 {
                self as u8
            }
            /// Gets the operation with the given sub-opcode value.
            pub fn from_id(id: u32) -> Option<Self> {
                Self::ALL.get(usize::try_from(id).ok()?).copied()
            }
            /// The assembly mnemonic of this operation.
            pub fn mnemonic(self) -> &'static str {
                match self {
                    $(Self::$name => $mnemonic),+
                }
            }
        }
    };
}
sub_op!(
    /// Operations of the ALU family (`add`, `addc`, `sub`, `subc`, `and`, `or`, `xor`, `mask`).
    AluOp { Add = "add", Addc = "addc", Sub = "sub", Subc = "subc", And = "and", Or = "or", Xor = "xor", Mask = "mask" }
);
sub_op!(
    /// Operations of the shift family (`shl`, `shr`, `rol`, `ror`).
    ShiftOp { Shl = "shl", Shr = "shr", Rol = "rol", Ror = "ror" }
);
sub_op!(
    /// Operations of the memory/IO family (`ldm`, `stm`, `inp`, `out`).
    MemOp { Ldm = "ldm", Stm = "stm", Inp = "inp", Out = "out" }
);
sub_op!(
    /// Conditions of the branch family (`bz`, `bnz`, `bc`, `bnc`).
    BranchCond { Z = "bz", Nz = "bnz", C = "bc", Nc = "bnc" }
);
sub_op!(
    /// Operations of the jump family (`jmp`, `jsb`).
    JumpOp { Jmp = "jmp", Jsb = "jsb" }
);
sub_op!(
    /// Operand-less operations (`ret`, `reti`, `enai`, `disi`, `wait`, `stby`).
    MiscOp { Ret = "ret", Reti = "reti", Enai = "enai", Disi = "disi", Wait = "wait", Stby = "stby" }
);

/// A decoded instruction word.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum SimInstr {
    /// `op rd, rs, (rt | imm8)`
    Alu(AluOp, Reg, Reg, ImmOrReg),
    /// `op rd, rs, count`
    Shift(ShiftOp, Reg, Reg, u8),
    /// `op rd, offset` (direct, base is `None`) or `op rd, (base) + offset`.
    Mem(MemOp, Reg, Option<Reg>, u8),
    /// `op target`, holding the PC-relative displacement.
    Branch(BranchCond, u8),
    /// `op address`, holding the 12-bit absolute target.
    Jump(JumpOp, u16),
    /// `op`
    Misc(MiscOp),
    /// A word which does not encode any defined instruction.
    Unknown(u32),
}

/// Extracts bits `hi..=lo` of a word.
fn bits(word: u32, hi: u32, lo: u32) -> u32 {
    (word >> lo) & ((1 << (hi - lo + 1)) - 1)
}

impl SimInstr {
    /// Decodes an instruction word.
    ///
    /// # Example
    /// ```
    /// use gumnut_sim::ast::sim::{SimInstr, AluOp};
    /// use gumnut_sim::ast::ImmOrReg;
    /// use gumnut_sim::ast::reg_consts::{R1, R2};
    ///
    /// let instr = SimInstr::decode(0x00A12);
    /// assert_eq!(instr, SimInstr::Alu(AluOp::Add, R1, R2, ImmOrReg::Imm(0x12)));
    /// assert_eq!(instr.encode(), 0x00A12);
    /// ```
    pub fn decode(word: u32) -> Self {
        if word & !USED_MASK != 0 {
            return SimInstr::Unknown(word);
        }

        let rd = Reg::from_field(bits(word, 13, 11));
        let rs = Reg::from_field(bits(word, 10, 8));
        let low = bits(word, 7, 0) as u8;

        // number of leading 1s starting from bit 17
        match (word << (32 - 18)).leading_ones() {
            0 => match AluOp::from_id(bits(word, 16, 14)) {
                Some(op) => SimInstr::Alu(op, rd, rs, ImmOrReg::Imm(low)),
                None => SimInstr::Unknown(word),
            },
            1 => match MemOp::from_id(bits(word, 15, 14)) {
                Some(op) => {
                    let base = (rs.0 != 0).then_some(rs);
                    SimInstr::Mem(op, rd, base, low)
                },
                None => SimInstr::Unknown(word),
            },
            2 => match ShiftOp::from_id(bits(word, 1, 0)) {
                Some(op) => SimInstr::Shift(op, rd, rs, bits(word, 7, 5) as u8),
                None => SimInstr::Unknown(word),
            },
            3 => match AluOp::from_id(bits(word, 2, 0)) {
                Some(op) => SimInstr::Alu(op, rd, rs, ImmOrReg::Reg(Reg::from_field(bits(word, 7, 5)))),
                None => SimInstr::Unknown(word),
            },
            4 => match JumpOp::from_id(bits(word, 12, 12)) {
                Some(op) => SimInstr::Jump(op, bits(word, 11, 0) as u16),
                None => SimInstr::Unknown(word),
            },
            5 => match BranchCond::from_id(bits(word, 11, 10)) {
                Some(cond) => SimInstr::Branch(cond, low),
                None => SimInstr::Unknown(word),
            },
            6 => match MiscOp::from_id(bits(word, 10, 8)) {
                Some(op) => SimInstr::Misc(op),
                None => SimInstr::Unknown(word),
            },
            _ => SimInstr::Unknown(word),
        }
    }

    /// Encodes this instruction into its instruction word.
    ///
    /// Operand fields are masked to their widths
    /// (registers to 3 bits, shift counts to 3 bits, jump targets to 12 bits).
    pub fn encode(&self) -> u32 {
        fn reg(r: Reg, lo: u32) -> u32 {
            u32::from(r.0 & 0b111) << lo
        }

        match *self {
            SimInstr::Alu(op, rd, rs, ImmOrReg::Imm(imm)) => {
                u32::from(op.id()) << 14 | reg(rd, 11) | reg(rs, 8) | u32::from(imm)
            },
            SimInstr::Mem(op, rd, base, offset) => {
                0b10 << 16 | u32::from(op.id()) << 14 | reg(rd, 11) | base.map_or(0, |b| reg(b, 8)) | u32::from(offset)
            },
            SimInstr::Shift(op, rd, rs, count) => {
                0b110 << 15 | reg(rd, 11) | reg(rs, 8) | u32::from(count & 0b111) << 5 | u32::from(op.id())
            },
            SimInstr::Alu(op, rd, rs, ImmOrReg::Reg(rt)) => {
                0b1110 << 14 | reg(rd, 11) | reg(rs, 8) | reg(rt, 5) | u32::from(op.id())
            },
            SimInstr::Jump(op, addr) => {
                0b11110 << 13 | u32::from(op.id()) << 12 | u32::from(addr & 0xFFF)
            },
            SimInstr::Branch(cond, disp) => {
                0b111110 << 12 | u32::from(cond.id()) << 10 | u32::from(disp)
            },
            SimInstr::Misc(op) => {
                0b1111110 << 11 | u32::from(op.id()) << 8
            },
            SimInstr::Unknown(word) => word,
        }
    }

    /// The assembly mnemonic of this instruction (`None` for [`SimInstr::Unknown`]).
    pub fn mnemonic(&self) -> Option<&'static str> {
        match self {
            SimInstr::Alu(op, ..)   => Some(op.mnemonic()),
            SimInstr::Shift(op, ..) => Some(op.mnemonic()),
            SimInstr::Mem(op, ..)   => Some(op.mnemonic()),
            SimInstr::Branch(c, _)  => Some(c.mnemonic()),
            SimInstr::Jump(op, _)   => Some(op.mnemonic()),
            SimInstr::Misc(op)      => Some(op.mnemonic()),
            SimInstr::Unknown(_)    => None,
        }
    }

    /// The sub-opcode selecting the operation within its family.
    pub fn sub_opcode(&self) -> Option<u8> {
        match self {
            SimInstr::Alu(op, ..)   => Some(op.id()),
            SimInstr::Shift(op, ..) => Some(op.id()),
            SimInstr::Mem(op, ..)   => Some(op.id()),
            SimInstr::Branch(c, _)  => Some(c.id()),
            SimInstr::Jump(op, _)   => Some(op.id()),
            SimInstr::Misc(op)      => Some(op.id()),
            SimInstr::Unknown(_)    => None,
        }
    }

    /// The destination (or, for stores, source) register.
    pub fn dest(&self) -> Option<Reg> {
        match *self {
            SimInstr::Alu(_, rd, ..) | SimInstr::Shift(_, rd, ..) | SimInstr::Mem(_, rd, ..) => Some(rd),
            _ => None
        }
    }

    /// The addressing mode, which is only present for the ALU family.
    pub fn mode(&self) -> Option<AddrMode> {
        match self {
            SimInstr::Alu(.., src) => Some(src.mode()),
            _ => None
        }
    }
}
impl std::fmt::Display for SimInstr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            SimInstr::Alu(op, rd, rs, src) => write!(f, "{} {rd}, {rs}, {src}", op.mnemonic()),
            SimInstr::Shift(op, rd, rs, n) => write!(f, "{} {rd}, {rs}, {n}", op.mnemonic()),
            SimInstr::Mem(op, rd, None, off) => write!(f, "{} {rd}, {off}", op.mnemonic()),
            SimInstr::Mem(op, rd, Some(base), off) => match off as i8 {
                o if o < 0 => write!(f, "{} {rd}, ({base}) - {}", op.mnemonic(), o.unsigned_abs()),
                o => write!(f, "{} {rd}, ({base}) + {o}", op.mnemonic()),
            },
            SimInstr::Branch(c, disp) => write!(f, "{} {:+}", c.mnemonic(), disp as i8),
            SimInstr::Jump(op, addr) => write!(f, "{} {addr:#05x}", op.mnemonic()),
            SimInstr::Misc(op) => f.write_str(op.mnemonic()),
            SimInstr::Unknown(word) => write!(f, "<unknown {word:#07x}>"),
        }
    }
}
