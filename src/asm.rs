//! Assembling parsed source lines into an executable image.
//!
//! This module is used to convert source text (or parsed [`AsmLine`]s) into
//! an [`Image`] that can be uploaded into the simulator.
//!
//! The assembler module notably consists of:
//! - [`assemble`] and [`assemble_lines`]: The main functions which assemble source into an image.
//! - [`SymbolTable`]: a struct holding the address of every label, computed during the first pass
//! - [`DebugMap`]: a struct correlating source lines with assembled addresses
//! - [`Image`]: a struct holding the assembled instruction words and data bytes
//!
//! Assembly takes up to two passes. The first pass walks every line,
//! binding labels and encoding what it can. A line referring to a label that
//! has not been seen yet forces a second pass, which re-encodes every line
//! with the complete symbol table.

pub mod encoding;

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};

use tracing::{debug, trace};

use crate::ast::asm::AsmLine;
use crate::ast::sim::{AluOp, BranchCond, JumpOp, MemOp, MiscOp, ShiftOp, SimInstr};
use crate::ast::{ImmOrReg, Operand};
use crate::parse::lex::Ident;
use crate::parse::{ParseErr, ParseErrKind};
use crate::sim::mem::{DATA_MEM_SIZE, INSTR_MEM_SIZE};

/// Assembles source text into an image.
///
/// # Example
/// ```
/// use gumnut_sim::asm::assemble;
///
/// let src = "
///     start: add r1, r1, 1
///            bnz start
///     value: byte 0x2A
/// ";
/// let image = assemble(src).unwrap();
/// assert_eq!(image.instr()[0], 0x00901);
/// assert_eq!(image.data()[0], 0x2A);
/// assert_eq!(image.instr_count(), 2);
/// ```
pub fn assemble(src: &str) -> Result<Image, AsmErr> {
    let lines = crate::parse::parse_source(src)?;
    assemble_lines(&lines)
}

/// Assembles already-parsed lines into an image.
///
/// The index of each line in `lines` is taken as its source line number.
pub fn assemble_lines(lines: &[AsmLine]) -> Result<Image, AsmErr> {
    let mut symbols = SymbolTable::default();

    let first = Assembler::new(Pass::First, &mut symbols).run(lines)?;
    debug!(unresolved = first.unresolved, labels = symbols.len(), "completed first assembler pass");

    let output = match first.unresolved {
        false => first,
        true => {
            let second = Assembler::new(Pass::Second, &mut symbols).run(lines)?;
            debug!("completed second assembler pass");
            second
        }
    };

    Ok(Image {
        instr: output.instr.into_boxed_slice(),
        data: output.data.into_boxed_slice(),
        debug: output.debug,
        symbols,
        instr_count: output.instr_count,
        line_count: lines.len(),
    })
}

/// Kinds of errors that can occur from assembling given assembly code.
///
/// See [`AsmErr`] for this error type with line information included.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum AsmErrKind {
    /// The line could not be parsed.
    Syntax(ParseErrKind),
    /// The mnemonic is not an instruction or directive.
    UnknownMnemonic(String),
    /// The operands do not match the grammar of the instruction.
    InvalidOperands,
    /// An operand which should be a number was malformed (e.g., `0.123`).
    InvalidNumeral,
    /// A label was defined more than once.
    DuplicateLabel(String),
    /// A label was referenced but never defined.
    UndefinedLabel(String),
    /// The instruction-word pointer exceeded the instruction memory.
    InstrCapacityExceeded,
    /// The data pointer exceeded the data memory.
    DataCapacityExceeded,
}
impl std::fmt::Display for AsmErrKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Syntax(e)             => e.fmt(f),
            Self::UnknownMnemonic(m)    => write!(f, "unknown mnemonic {m:?}"),
            Self::InvalidOperands       => f.write_str("invalid operands for instruction"),
            Self::InvalidNumeral        => f.write_str("malformed numeric literal"),
            Self::DuplicateLabel(l)     => write!(f, "label {l:?} was defined multiple times"),
            Self::UndefinedLabel(l)     => write!(f, "label {l:?} could not be found"),
            Self::InstrCapacityExceeded => f.write_str("instruction memory size exceeded"),
            Self::DataCapacityExceeded  => f.write_str("data memory size exceeded"),
        }
    }
}

/// Error from assembling given assembly code.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct AsmErr {
    /// The kind of error.
    pub kind: AsmErrKind,
    /// The source line (0-indexed) this error occurred on.
    pub line: usize,
}
impl AsmErr {
    /// Creates a new [`AsmErr`].
    pub fn new(kind: AsmErrKind, line: usize) -> Self {
        AsmErr { kind, line }
    }
}
impl From<ParseErr> for AsmErr {
    fn from(value: ParseErr) -> Self {
        AsmErr::new(AsmErrKind::Syntax(value.kind), value.line)
    }
}
impl std::fmt::Display for AsmErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.kind.fmt(f)
    }
}
impl std::error::Error for AsmErr {}
impl crate::err::Error for AsmErr {
    fn line(&self) -> Option<usize> {
        Some(self.line)
    }

    fn help(&self) -> Option<std::borrow::Cow<str>> {
        match &self.kind {
            AsmErrKind::Syntax(_)             => None,
            AsmErrKind::UnknownMnemonic(_)    => Some("check the spelling of this instruction".into()),
            AsmErrKind::InvalidOperands       => Some("check the number and kind of operands this instruction takes".into()),
            AsmErrKind::InvalidNumeral        => Some("numbers cannot hold '.'".into()),
            AsmErrKind::DuplicateLabel(_)     => Some("labels must be unique within a file, try renaming one of the labels".into()),
            AsmErrKind::UndefinedLabel(_)     => Some("try adding this label before an instruction or directive".into()),
            AsmErrKind::InstrCapacityExceeded => Some(format!("instruction memory holds {INSTR_MEM_SIZE} words").into()),
            AsmErrKind::DataCapacityExceeded  => Some(format!("data memory holds {DATA_MEM_SIZE} bytes").into()),
        }
    }
}

/// The address a label or line is bound to.
///
/// Instruction memory and data memory are separate address spaces.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Location {
    /// An index into instruction memory.
    Instr(u16),
    /// An index into data memory.
    Data(u8),
}
impl Location {
    /// The numeric address, regardless of the address space.
    pub fn addr(self) -> u16 {
        match self {
            Location::Instr(a) => a,
            Location::Data(a)  => u16::from(a),
        }
    }
}

/// The symbol table created in the first assembler pass,
/// mapping every label to its address.
///
/// Labels are case-sensitive.
#[derive(PartialEq, Eq, Clone, Default, Debug)]
pub struct SymbolTable {
    labels: HashMap<String, Location>,
}
impl SymbolTable {
    fn insert(&mut self, label: &str, loc: Location) -> Result<(), AsmErrKind> {
        match self.labels.entry(label.to_string()) {
            Entry::Occupied(e) => Err(AsmErrKind::DuplicateLabel(e.key().clone())),
            Entry::Vacant(e) => {
                e.insert(loc);
                Ok(())
            }
        }
    }

    /// Gets the location of a given label (if it exists).
    ///
    /// ## Example
    /// ```
    /// use gumnut_sim::asm::{assemble, Location};
    ///
    /// let src = "
    ///     loop: add r0, r0, 1
    ///           jmp loop
    ///     val:  byte 7
    /// ";
    /// let image = assemble(src).unwrap();
    /// let sym = image.symbol_table();
    /// assert_eq!(sym.lookup_label("loop"), Some(Location::Instr(0)));
    /// assert_eq!(sym.lookup_label("val"), Some(Location::Data(0)));
    /// assert_eq!(sym.lookup_label("LOOP"), None);
    /// ```
    pub fn lookup_label(&self, label: &str) -> Option<Location> {
        self.labels.get(label).copied()
    }

    /// Gets a label bound to the given location (if one exists).
    pub fn rev_lookup_label(&self, loc: Location) -> Option<&str> {
        self.labels.iter()
            .find(|&(_, &l)| l == loc)
            .map(|(label, _)| label.as_str())
    }

    /// The number of labels in the table.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Whether the table has no labels.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// The debug record of one source line.
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct DebugSymbol {
    /// The parsed line.
    pub line: AsmLine,
    /// Where the line was assembled to, if it occupies memory
    /// (instructions, `byte`) or binds a label.
    pub location: Option<Location>,
}

/// A mapping from source line numbers to their parsed lines and assembled addresses.
///
/// Only lines holding something (a label, a mnemonic) are present.
/// Reverse lookups ([`DebugMap::find`]) only consider instruction lines,
/// so a PC value always maps to the line of the instruction it points to.
#[derive(PartialEq, Eq, Clone, Default, Debug)]
pub struct DebugMap {
    lines: BTreeMap<usize, DebugSymbol>,
    by_addr: HashMap<u16, usize>,
}
impl DebugMap {
    fn insert(&mut self, lno: usize, line: &AsmLine, location: Option<Location>, is_instr: bool) {
        if let (true, Some(Location::Instr(addr))) = (is_instr, location) {
            self.by_addr.entry(addr).or_insert(lno);
        }
        self.lines.insert(lno, DebugSymbol { line: line.clone(), location });
    }

    /// Gets the debug record of a given source line.
    pub fn get(&self, line: usize) -> Option<&DebugSymbol> {
        self.lines.get(&line)
    }

    /// Gets the location of a given source line.
    pub fn lookup_line(&self, line: usize) -> Option<Location> {
        self.lines.get(&line)?.location
    }

    /// Gets the source line of the instruction at the given address (if it exists).
    ///
    /// ## Example
    /// ```
    /// use gumnut_sim::asm::assemble;
    ///
    /// let src = "            ; 0
    ///     start:          ; 1
    ///         add r0, r0, 1   ; 2
    ///         byte 4          ; 3
    ///         jmp start       ; 4
    /// ";
    /// let image = assemble(src).unwrap();
    /// let map = image.debug_map();
    /// assert_eq!(map.find(0), Some(2));
    /// assert_eq!(map.find(1), Some(4));
    /// assert_eq!(map.find(2), None);
    /// ```
    pub fn find(&self, addr: u16) -> Option<usize> {
        self.by_addr.get(&addr).copied()
    }

    /// Gets an iterable of every recorded line, in source order.
    pub fn iter(&self) -> impl Iterator<Item=(usize, &DebugSymbol)> + '_ {
        self.lines.iter().map(|(&l, s)| (l, s))
    }

    /// The number of recorded lines.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Whether no lines were recorded.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// An assembled program: instruction image, data image and debug information.
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Image {
    instr: Box<[u32]>,
    data: Box<[u8]>,
    debug: DebugMap,
    symbols: SymbolTable,
    instr_count: usize,
    line_count: usize,
}
impl Image {
    /// Creates an image with no instructions and no data.
    pub fn empty() -> Self {
        Image {
            instr: vec![0; INSTR_MEM_SIZE].into_boxed_slice(),
            data: vec![0; DATA_MEM_SIZE].into_boxed_slice(),
            debug: DebugMap::default(),
            symbols: SymbolTable::default(),
            instr_count: 0,
            line_count: 0,
        }
    }

    /// Creates an image from raw instruction words and data bytes,
    /// without any debug information (e.g., from a deserialized image).
    ///
    /// Both images are zero-padded to their full capacities.
    /// This fails if either is larger than its memory.
    pub fn from_raw(instr: &[u32], data: &[u8]) -> Result<Self, AsmErrKind> {
        if instr.len() > INSTR_MEM_SIZE { return Err(AsmErrKind::InstrCapacityExceeded); }
        if data.len() > DATA_MEM_SIZE { return Err(AsmErrKind::DataCapacityExceeded); }

        let mut image = Image::empty();
        image.instr[..instr.len()].copy_from_slice(instr);
        image.data[..data.len()].copy_from_slice(data);
        image.instr_count = instr.len();
        Ok(image)
    }

    /// The instruction image (always [`INSTR_MEM_SIZE`] words).
    pub fn instr(&self) -> &[u32] {
        &self.instr
    }
    /// The data image (always [`DATA_MEM_SIZE`] bytes).
    pub fn data(&self) -> &[u8] {
        &self.data
    }
    /// The source line mapping.
    pub fn debug_map(&self) -> &DebugMap {
        &self.debug
    }
    /// The label mapping.
    pub fn symbol_table(&self) -> &SymbolTable {
        &self.symbols
    }
    /// The number of instructions assembled.
    pub fn instr_count(&self) -> usize {
        self.instr_count
    }
    /// The number of source lines assembled.
    pub fn line_count(&self) -> usize {
        self.line_count
    }
}

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
enum Pass {
    /// Labels are bound and unknown labels are resolved as 0.
    First,
    /// Labels are frozen and unknown labels are errors.
    Second,
}

/// The instruction families, keyed by mnemonic.
enum Family {
    Alu(AluOp),
    Shift(ShiftOp),
    Mem(MemOp),
    Branch(BranchCond),
    Jump(JumpOp),
    Misc(MiscOp),
}
impl Family {
    fn of(id: &Ident) -> Option<Self> {
        let family = match id {
            Ident::ADD  => Family::Alu(AluOp::Add),
            Ident::ADDC => Family::Alu(AluOp::Addc),
            Ident::SUB  => Family::Alu(AluOp::Sub),
            Ident::SUBC => Family::Alu(AluOp::Subc),
            Ident::AND  => Family::Alu(AluOp::And),
            Ident::OR   => Family::Alu(AluOp::Or),
            Ident::XOR  => Family::Alu(AluOp::Xor),
            Ident::MASK => Family::Alu(AluOp::Mask),
            Ident::SHL  => Family::Shift(ShiftOp::Shl),
            Ident::SHR  => Family::Shift(ShiftOp::Shr),
            Ident::ROL  => Family::Shift(ShiftOp::Rol),
            Ident::ROR  => Family::Shift(ShiftOp::Ror),
            Ident::LDM  => Family::Mem(MemOp::Ldm),
            Ident::STM  => Family::Mem(MemOp::Stm),
            Ident::INP  => Family::Mem(MemOp::Inp),
            Ident::OUT  => Family::Mem(MemOp::Out),
            Ident::BZ   => Family::Branch(BranchCond::Z),
            Ident::BNZ  => Family::Branch(BranchCond::Nz),
            Ident::BC   => Family::Branch(BranchCond::C),
            Ident::BNC  => Family::Branch(BranchCond::Nc),
            Ident::JMP  => Family::Jump(JumpOp::Jmp),
            Ident::JSB  => Family::Jump(JumpOp::Jsb),
            Ident::RET  => Family::Misc(MiscOp::Ret),
            Ident::RETI => Family::Misc(MiscOp::Reti),
            Ident::ENAI => Family::Misc(MiscOp::Enai),
            Ident::DISI => Family::Misc(MiscOp::Disi),
            Ident::WAIT => Family::Misc(MiscOp::Wait),
            Ident::STBY => Family::Misc(MiscOp::Stby),
            Ident::ORG | Ident::BYTE | Ident::Label(_) => return None,
        };
        Some(family)
    }
}

struct PassOutput {
    instr: Vec<u32>,
    data: Vec<u8>,
    debug: DebugMap,
    instr_count: usize,
    unresolved: bool,
}

struct Assembler<'t> {
    pass: Pass,
    symbols: &'t mut SymbolTable,
    /// The instruction-word pointer.
    ip: u16,
    /// The data-byte pointer.
    dp: u16,
    unresolved: bool,
}
impl<'t> Assembler<'t> {
    fn new(pass: Pass, symbols: &'t mut SymbolTable) -> Self {
        Self { pass, symbols, ip: 0, dp: 0, unresolved: false }
    }

    fn run(mut self, lines: &[AsmLine]) -> Result<PassOutput, AsmErr> {
        let mut out = PassOutput {
            instr: vec![0; INSTR_MEM_SIZE],
            data: vec![0; DATA_MEM_SIZE],
            debug: DebugMap::default(),
            instr_count: 0,
            unresolved: false,
        };

        for (lno, line) in lines.iter().enumerate() {
            self.line(line, lno, &mut out)
                .map_err(|kind| AsmErr::new(kind, lno))?;
        }

        out.unresolved = self.unresolved;
        Ok(out)
    }

    fn bind(&mut self, line: &AsmLine, loc: Location) -> Result<(), AsmErrKind> {
        match (&line.label, self.pass) {
            (Some(label), Pass::First) => self.symbols.insert(label, loc),
            _ => Ok(()),
        }
    }

    fn line(&mut self, line: &AsmLine, lno: usize, out: &mut PassOutput) -> Result<(), AsmErrKind> {
        let Some(mnemonic) = &line.mnemonic else {
            if line.label.is_some() {
                let loc = Location::Instr(self.ip);
                self.bind(line, loc)?;
                out.debug.insert(lno, line, Some(loc), false);
            }
            return Ok(());
        };

        match mnemonic {
            Ident::ORG => {
                let [Some(Operand::Num(addr)), None, None] = &line.operands else {
                    return Err(AsmErrKind::InvalidOperands);
                };
                self.ip = match u16::try_from(*addr) {
                    Ok(a) if usize::from(a) <= INSTR_MEM_SIZE => a,
                    _ => return Err(AsmErrKind::InstrCapacityExceeded),
                };

                let loc = line.label.as_ref().map(|_| Location::Instr(self.ip));
                if let Some(loc) = loc {
                    self.bind(line, loc)?;
                }
                out.debug.insert(lno, line, loc, false);
            },
            Ident::BYTE => {
                let [Some(value), None, None] = &line.operands else {
                    return Err(AsmErrKind::InvalidOperands);
                };
                let Ok(dp) = u8::try_from(self.dp) else {
                    return Err(AsmErrKind::DataCapacityExceeded);
                };
                let loc = Location::Data(dp);
                self.bind(line, loc)?;

                let byte = (self.value(value)? & 0xFF) as u8;
                trace!(addr = dp, byte, "emit data byte");
                out.data[usize::from(dp)] = byte;
                out.debug.insert(lno, line, Some(loc), false);
                self.dp += 1;
            },
            Ident::Label(name) => return Err(AsmErrKind::UnknownMnemonic(name.clone())),
            instr => {
                if usize::from(self.ip) >= INSTR_MEM_SIZE {
                    return Err(AsmErrKind::InstrCapacityExceeded);
                }
                let loc = Location::Instr(self.ip);
                self.bind(line, loc)?;

                let family = Family::of(instr).ok_or_else(|| AsmErrKind::UnknownMnemonic(instr.to_string()))?;
                let word = self.encode(family, &line.operands)?.encode();
                trace!(addr = self.ip, word, "emit instruction word");

                out.instr[usize::from(self.ip)] = word;
                out.instr_count += 1;
                out.debug.insert(lno, line, Some(loc), true);
                self.ip += 1;
            }
        }

        Ok(())
    }

    /// Resolves a label to its address.
    ///
    /// During the first pass, a label not yet seen resolves to 0 and forces a second pass.
    fn resolve(&mut self, label: &str) -> Result<u32, AsmErrKind> {
        match (self.symbols.lookup_label(label), self.pass) {
            (Some(loc), _) => Ok(u32::from(loc.addr())),
            (None, Pass::First) => {
                self.unresolved = true;
                Ok(0)
            },
            (None, Pass::Second) => Err(AsmErrKind::UndefinedLabel(label.to_string())),
        }
    }

    /// Evaluates an operand which should be a number or a label.
    fn value(&mut self, op: &Operand) -> Result<u32, AsmErrKind> {
        match op {
            Operand::Num(n)     => Ok(*n),
            Operand::Symbol(s)  => self.resolve(s),
            Operand::NotANumber => Err(AsmErrKind::InvalidNumeral),
            Operand::Reg(_)     => Err(AsmErrKind::InvalidOperands),
        }
    }

    fn encode(&mut self, family: Family, operands: &[Option<Operand>; 3]) -> Result<SimInstr, AsmErrKind> {
        use Operand as O;

        let byte = |v: u32| (v & 0xFF) as u8;
        let instr = match (family, operands) {
            (Family::Alu(op), [Some(O::Reg(rd)), Some(O::Reg(rs)), Some(src)]) => {
                let src = match src {
                    O::Reg(rt) => ImmOrReg::Reg(*rt),
                    imm => ImmOrReg::Imm(byte(self.value(imm)?)),
                };
                SimInstr::Alu(op, *rd, *rs, src)
            },
            (Family::Shift(op), [Some(O::Reg(rd)), Some(O::Reg(rs)), Some(count)]) => {
                // counts are masked into the 3-bit field
                let n = (self.value(count)? & 0b111) as u8;
                SimInstr::Shift(op, *rd, *rs, n)
            },
            (Family::Mem(op), [Some(O::Reg(rd)), Some(O::Reg(base)), Some(offset)]) => {
                let offset = byte(self.value(offset)?);
                let base = (base.reg_no() != 0).then_some(*base);
                SimInstr::Mem(op, *rd, base, offset)
            },
            (Family::Mem(op), [Some(O::Reg(rd)), Some(base @ O::Symbol(_)), Some(offset)]) => {
                let addr = self.value(base)?.wrapping_add(self.value(offset)?);
                SimInstr::Mem(op, *rd, None, byte(addr))
            },
            (Family::Mem(op), [Some(O::Reg(rd)), Some(addr), None]) => {
                SimInstr::Mem(op, *rd, None, byte(self.value(addr)?))
            },
            (Family::Branch(cond), [Some(target), None, None]) => {
                let target = self.value(target)?;
                let disp = target.wrapping_sub(u32::from(self.ip) + 1);
                SimInstr::Branch(cond, byte(disp))
            },
            (Family::Jump(op), [Some(target), None, None]) => {
                SimInstr::Jump(op, (self.value(target)? & 0xFFF) as u16)
            },
            (Family::Misc(op), [None, None, None]) => SimInstr::Misc(op),
            _ => return Err(AsmErrKind::InvalidOperands),
        };

        Ok(instr)
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::asm::AsmLine;
    use crate::ast::reg_consts::{R0, R1, R2};
    use crate::ast::sim::{AluOp, SimInstr};
    use crate::ast::{ImmOrReg, Operand};
    use crate::parse::lex::Ident;
    use crate::parse::ParseErrKind;

    use super::{assemble, assemble_lines, AsmErr, AsmErrKind, Image, Location};

    fn assemble_src(src: &str) -> Result<Image, AsmErr> {
        assemble(src)
    }
    #[track_caller]
    fn assert_asm_fail<T: std::fmt::Debug>(r: Result<T, AsmErr>, kind: AsmErrKind) {
        assert_eq!(r.unwrap_err().kind, kind);
    }
    #[track_caller]
    fn assert_words(src: &str, words: &[u32]) {
        let image = assemble_src(src).unwrap();
        assert_eq!(&image.instr()[..words.len()], words, "{src:?}");
        assert!(image.instr()[words.len()..].iter().all(|&w| w == 0));
    }

    #[test]
    fn test_alu_encoding() {
        assert_words("add r1, r2, 0x12", &[0x00A12]);
        assert_words("addc r1, r2, 0x12", &[0x04A12]);
        assert_words("mask r1, r2, 0x12", &[0x1CA12]);
        assert_words(
            "add r1, r2, r3\n addc r1, r2, r3\n sub r1, r2, r3\n subc r1, r2, r3\n and r1, r2, r3\n or r1, r2, r3\n xor r1, r2, r3\n mask r1, r2, r3",
            &[0x38A60, 0x38A61, 0x38A62, 0x38A63, 0x38A64, 0x38A65, 0x38A66, 0x38A67]
        );
        // immediates are masked to 8 bits
        assert_words("add r0, r0, -1\nadd r0, r0, 0x1FF", &[0x000FF, 0x000FF]);
    }

    #[test]
    fn test_mem_encoding() {
        assert_words("ldm r1, 0x12\nstm r1, 0x12\ninp r1, 0x12\nout r1, 0x12", &[0x20812, 0x24812, 0x28812, 0x2C812]);
        assert_words("ldm r1, (r2) + 0x12", &[0x20A12]);
        assert_words("ldm r1, (r2) - 0x12", &[0x20AEE]);
        // base r0 is direct
        assert_words("ldm r1, (r0) + 5", &[0x20805]);
    }

    #[test]
    fn test_mem_symbol_base() {
        let src = "
            ldm r1, (table) + 2
            ldm r1, table
            table: byte 1
                   byte 2
                   byte 3
        ";
        let image = assemble_src(src).unwrap();
        assert_eq!(image.symbol_table().lookup_label("table"), Some(Location::Data(0)));
        assert_eq!(image.instr()[..2], [0x20802, 0x20800]);
        assert_eq!(image.data()[..3], [1, 2, 3]);
    }

    #[test]
    fn test_shift_encoding() {
        assert_words("shl r1, r2, 4\nshr r1, r2, 4\nrol r1, r2, 4\nror r1, r2, 4", &[0x30A80, 0x30A81, 0x30A82, 0x30A83]);
        assert_words("shl r1, r2, 0x12\nshr r1, r2, 8", &[0x30A40, 0x30A01]);
    }

    #[test]
    fn test_control_encoding() {
        assert_words("jmp 0xFFFF\njsb 0", &[0x3CFFF, 0x3D000]);
        assert_words("bz 0", &[0x3E0FF]);
        assert_words("bz 1", &[0x3E000]);
        assert_words("bz 0x80", &[0x3E07F]);
        assert_words("bnz 0\nbc 0\nbnc 0", &[0x3E4FF, 0x3E8FE, 0x3ECFD]);
        assert_words(
            "ret\nreti\nenai\ndisi\nwait\nstby",
            &[0x3F000, 0x3F100, 0x3F200, 0x3F300, 0x3F400, 0x3F500]
        );
    }

    #[test]
    fn test_branch_after_org() {
        let image = assemble_src("org 0x10\nbz 0\nbz 1").unwrap();
        assert_eq!(image.instr()[0x10], 0x3E0EF);
        assert_eq!(image.instr()[0x11], 0x3E0EF);
        assert_eq!(image.instr_count(), 2);

        let image = assemble_src("org 0x10\nbz 0x80").unwrap();
        assert_eq!(image.instr()[0x10], 0x3E06F);
    }

    #[test]
    fn test_forward_refs() {
        let src = "
            start: jsb sub
                   jmp start
            sub:   add r0, r0, 1
                   bnz done
                   ret
            done:  ret
        ";
        let image = assemble_src(src).unwrap();
        let sym = image.symbol_table();
        assert_eq!(sym.lookup_label("start"), Some(Location::Instr(0)));
        assert_eq!(sym.lookup_label("sub"), Some(Location::Instr(2)));
        assert_eq!(sym.lookup_label("done"), Some(Location::Instr(5)));
        assert_eq!(sym.rev_lookup_label(Location::Instr(2)), Some("sub"));

        assert_eq!(image.instr()[0], 0x3D002);
        assert_eq!(image.instr()[1], 0x3C000);
        // bnz at 3 to 5
        assert_eq!(image.instr()[3], 0x3E401);
    }

    #[test]
    fn test_label_only_lines() {
        let src = "top:\n\nloop:\n    add r0, r0, 1\n    jmp loop";
        let image = assemble_src(src).unwrap();
        assert_eq!(image.symbol_table().lookup_label("top"), Some(Location::Instr(0)));
        assert_eq!(image.symbol_table().lookup_label("loop"), Some(Location::Instr(0)));
        assert_eq!(image.instr()[1], 0x3C000);

        let map = image.debug_map();
        assert_eq!(map.lookup_line(0), Some(Location::Instr(0)));
        assert_eq!(map.get(1), None);
        assert_eq!(map.find(0), Some(3));
        assert_eq!(map.find(1), Some(4));
        assert_eq!(map.len(), 4);
    }

    #[test]
    fn test_org() {
        let src = "add r0, r0, 1\nhere: org 0x100\nadd r0, r0, 2";
        let image = assemble_src(src).unwrap();
        assert_eq!(image.symbol_table().lookup_label("here"), Some(Location::Instr(0x100)));
        assert_eq!(image.instr()[0], 0x00001);
        assert_eq!(image.instr()[0x100], 0x00002);
        assert_eq!(image.debug_map().find(0x100), Some(2));

        assert_asm_fail(assemble_src("org 0x1001"), AsmErrKind::InstrCapacityExceeded);
        assert_asm_fail(assemble_src("org start\nstart: ret"), AsmErrKind::InvalidOperands);
    }

    #[test]
    fn test_bytes() {
        let src = "
            a: byte 1
            b: byte -1
            c: byte 1024
        ";
        let image = assemble_src(src).unwrap();
        assert_eq!(image.data()[..4], [1, 255, 0, 0]);
        assert_eq!(image.symbol_table().lookup_label("c"), Some(Location::Data(2)));
        assert_eq!(image.debug_map().lookup_line(2), Some(Location::Data(1)));
        assert_eq!(image.instr_count(), 0);
        assert_eq!(image.line_count(), 5);

        assert_asm_fail(assemble_src("byte 0.123"), AsmErrKind::InvalidNumeral);
        // the comma splits this into two operands
        assert_asm_fail(assemble_src("byte 0,123"), AsmErrKind::InvalidOperands);
        assert_asm_fail(assemble_src("byte r1"), AsmErrKind::InvalidOperands);
    }

    #[test]
    fn test_capacity() {
        let full = "ret\n".repeat(4096);
        let image = assemble_src(&full).unwrap();
        assert_eq!(image.instr_count(), 4096);
        assert_eq!(image.instr()[4095], 0x3F000);

        let over = "ret\n".repeat(4097);
        let err = assemble_src(&over).unwrap_err();
        assert_eq!(err.kind, AsmErrKind::InstrCapacityExceeded);
        assert_eq!(err.line, 4096);

        assert_asm_fail(assemble_src("org 4096\nret"), AsmErrKind::InstrCapacityExceeded);
        assert!(assemble_src(&"byte 0\n".repeat(256)).is_ok());
        assert_asm_fail(assemble_src(&"byte 0\n".repeat(257)), AsmErrKind::DataCapacityExceeded);
    }

    #[test]
    fn test_failures() {
        assert_asm_fail(assemble_src("foo r1, r2, r3"), AsmErrKind::UnknownMnemonic("foo".to_string()));
        assert_asm_fail(assemble_src("add r1, r2"), AsmErrKind::InvalidOperands);
        assert_asm_fail(assemble_src("add r1, 1, r2"), AsmErrKind::InvalidOperands);
        assert_asm_fail(assemble_src("ret r1"), AsmErrKind::InvalidOperands);
        assert_asm_fail(assemble_src("jmp r1"), AsmErrKind::InvalidOperands);
        assert_asm_fail(assemble_src("ldm r1, r2"), AsmErrKind::InvalidOperands);
        assert_asm_fail(assemble_src("add r1, r1, 0.5"), AsmErrKind::InvalidNumeral);
        assert_asm_fail(assemble_src("a: ret\na: ret"), AsmErrKind::DuplicateLabel("a".to_string()));
        assert_asm_fail(assemble_src("jmp nowhere"), AsmErrKind::UndefinedLabel("nowhere".to_string()));
        assert_asm_fail(assemble_src("add r1 r1"), AsmErrKind::Syntax(ParseErrKind::ExpectedComma));

        let err = assemble_src("ret\nret\nxyz").unwrap_err();
        assert_eq!(err.line, 2);
        assert_eq!(crate::err::Error::line(&err), Some(2));
        assert!(crate::err::Error::help(&err).is_some());
    }

    #[test]
    fn test_assemble_lines() {
        let lines = [
            AsmLine::default(),
            AsmLine {
                label: Some("inc".to_string()),
                mnemonic: Some(Ident::ADD),
                operands: [Some(R1.into()), Some(R2.into()), Some(Operand::Num(0x12))],
            },
        ];
        let image = assemble_lines(&lines).unwrap();
        assert_eq!(image.instr()[0], 0x00A12);
        assert_eq!(image.debug_map().find(0), Some(1));
        assert_eq!(image.line_count(), 2);
    }

    #[test]
    fn test_emitted_words_decode_to_source() {
        let src = "
            add r1, r2, 0x12
            sub r0, r0, r2
            ldm r2, (r1) - 1
        ";
        let image = assemble_src(src).unwrap();
        assert_eq!(SimInstr::decode(image.instr()[0]), SimInstr::Alu(AluOp::Add, R1, R2, ImmOrReg::Imm(0x12)));
        assert_eq!(SimInstr::decode(image.instr()[1]), SimInstr::Alu(AluOp::Sub, R0, R0, ImmOrReg::Reg(R2)));
        assert_eq!(SimInstr::decode(image.instr()[2]).to_string(), "ldm r2, (r1) - 1");

        for (lno, sym) in image.debug_map().iter() {
            let Some(Location::Instr(addr)) = sym.location else { continue };
            let word = image.instr()[usize::from(addr)];
            assert_eq!(SimInstr::decode(word).encode(), word, "line {lno}");
            assert_eq!(SimInstr::decode(word).mnemonic(), sym.line.mnemonic.as_ref().map(|m| m.to_string()).as_deref());
        }
    }

    #[test]
    fn test_from_raw() {
        let image = Image::from_raw(&[0x3F000; 10], &[1, 2, 3]).unwrap();
        assert_eq!(image.instr().len(), 4096);
        assert_eq!(image.instr_count(), 10);
        assert_eq!(image.data()[..4], [1, 2, 3, 0]);
        assert!(image.debug_map().is_empty());

        assert_eq!(Image::from_raw(&[0; 4097], &[]), Err(AsmErrKind::InstrCapacityExceeded));
        assert_eq!(Image::from_raw(&[], &[0; 257]), Err(AsmErrKind::DataCapacityExceeded));
    }
}
