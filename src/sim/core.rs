//! The execution core.
//!
//! The [`Core`] holds the machine state (registers, memories, flags and the return-address stack)
//! and executes one instruction per [`Core::step`]:
//!
//! 1. **fetch**: read the word at the PC
//! 2. **decode**: convert it to a [`SimInstr`]
//! 3. **execute**: apply its effects
//! 4. **update PC**: advance the PC by one
//!
//! Control flow instructions set the PC to one before their target,
//! so that the PC update lands on the target.
//!
//! # Example
//! ```
//! use gumnut_sim::asm::assemble;
//! use gumnut_sim::sim::core::Core;
//! use gumnut_sim::ast::reg_consts::R0;
//!
//! let image = assemble("add r0, r0, 1\nadd r0, r0, 1").unwrap();
//! let mut core = Core::new();
//! core.load_image(&image).unwrap();
//!
//! core.step().unwrap();
//! core.step().unwrap();
//! assert_eq!(core.reg_file[R0], 2);
//! assert_eq!(core.pc, 2);
//! assert!(!core.flags.carry());
//! assert!(!core.flags.zero());
//! ```

use tracing::{debug, trace};

use crate::asm::Image;
use crate::ast::sim::{AluOp, BranchCond, JumpOp, MemOp, MiscOp, ShiftOp, SimInstr};
use crate::ast::ImmOrReg;

use super::mem::{ByteMem, InstrMem, RegFile, ReturnStack, INSTR_MEM_SIZE};
use super::observer::{AccessObserver, AccessSet, Space};

/// Conditions raised by the execution core.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum CoreErr {
    /// The PC (or the PC after an update or jump) is outside of instruction memory.
    InvalidPc(i32),
    /// More words were uploaded than instruction memory can hold.
    InstrMemSizeExceeded(usize),
    /// More bytes were uploaded than data memory can hold.
    DataMemSizeExceeded(usize),
    /// A data memory or I/O address was outside of its memory.
    AccessViolation(i32),
    /// The word does not encode an executable instruction.
    InvalidInstruction(u32),
    /// `ret` or `reti` was executed with an empty return-address stack.
    EmptyReturnStack,
    /// `jsb` was executed with a full return-address stack.
    /// The jump still occurs, but the return address is lost.
    ReturnStackOverflow(u16),
}
impl CoreErr {
    /// Whether this condition stops execution.
    ///
    /// Only [`CoreErr::ReturnStackOverflow`] is recoverable.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, CoreErr::ReturnStackOverflow(_))
    }

    /// A stable name for this kind of condition.
    pub fn kind(&self) -> &'static str {
        match self {
            CoreErr::InvalidPc(_)            => "invalid_pc",
            CoreErr::InstrMemSizeExceeded(_) => "instruction_memory_size_exceeded",
            CoreErr::DataMemSizeExceeded(_)  => "data_memory_size_exceeded",
            CoreErr::AccessViolation(_)      => "data_memory_access_violation",
            CoreErr::InvalidInstruction(_)   => "invalid_instruction",
            CoreErr::EmptyReturnStack        => "empty_return_stack",
            CoreErr::ReturnStackOverflow(_)  => "return_stack_overflow",
        }
    }

    /// The offending value, if this condition has one.
    pub fn value(&self) -> Option<i64> {
        match *self {
            CoreErr::InvalidPc(pc)            => Some(i64::from(pc)),
            CoreErr::InstrMemSizeExceeded(n)  => i64::try_from(n).ok(),
            CoreErr::DataMemSizeExceeded(n)   => i64::try_from(n).ok(),
            CoreErr::AccessViolation(addr)    => Some(i64::from(addr)),
            CoreErr::InvalidInstruction(word) => Some(i64::from(word)),
            CoreErr::EmptyReturnStack         => None,
            CoreErr::ReturnStackOverflow(ret) => Some(i64::from(ret)),
        }
    }
}
impl std::fmt::Display for CoreErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoreErr::InvalidPc(pc)            => write!(f, "invalid PC value {pc}"),
            CoreErr::InstrMemSizeExceeded(n)  => write!(f, "instruction memory size exceeded ({n} words)"),
            CoreErr::DataMemSizeExceeded(n)   => write!(f, "data memory size exceeded ({n} bytes)"),
            CoreErr::AccessViolation(addr)    => write!(f, "data memory access violation at address {addr}"),
            CoreErr::InvalidInstruction(word) => write!(f, "invalid instruction {word:#07x}"),
            CoreErr::EmptyReturnStack         => f.write_str("return from subroutine with empty return address stack"),
            CoreErr::ReturnStackOverflow(_)   => f.write_str("return address stack overflow"),
        }
    }
}
impl std::error::Error for CoreErr {}
impl crate::err::Error for CoreErr {
    fn help(&self) -> Option<std::borrow::Cow<str>> {
        match self {
            CoreErr::InvalidPc(_)            => Some(format!("the PC must stay between 0 and {}", INSTR_MEM_SIZE - 1).into()),
            CoreErr::InstrMemSizeExceeded(_) => None,
            CoreErr::DataMemSizeExceeded(_)  => None,
            CoreErr::AccessViolation(_)      => Some("base register plus offset must be between 0 and 255".into()),
            CoreErr::InvalidInstruction(_)   => Some("execution may have run into data or unassembled memory".into()),
            CoreErr::EmptyReturnStack        => Some("every ret must be paired with an earlier jsb".into()),
            CoreErr::ReturnStackOverflow(_)  => Some("subroutine calls can only nest 8 deep".into()),
        }
    }
}

/// The processor flags.
///
/// CARRY and ZERO are recomputed by every ALU and shift instruction.
/// WAIT, STBY and IREN are latches set by their respective instructions.
///
/// ```text
///    IREN STBY WAIT ZERO CARRY
///     |    |    |    |    |
///     V    V    V    V    V
/// 000 1    0    0    1    0
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct Flags(u8);

macro_rules! flag_bits {
    ($($(#[$m:meta])* $get:ident, $set:ident = $bit:literal;)+) => {
        impl Flags {
            $(
                $(#[$m])*
                pub fn $get(&self) -> bool {
                    self.0 & (1 << $bit) != 0
                }
            )+
            $(
                #[doc = concat!("Sets the `", stringify!($get), "` flag.")]
                pub fn $set(&mut self, value: bool) {
                    self.0 &= !(1 << $bit);
                    self.0 |= u8::from(value) << $bit;
                }
            )+
        }
    };
}
flag_bits! {
    /// Whether the last arithmetic operation carried or borrowed.
    carry, set_carry = 0;
    /// Whether the last ALU or shift result was zero.
    zero, set_zero = 1;
    /// Whether `wait` has been executed.
    wait, set_wait = 2;
    /// Whether `stby` has been executed.
    stby, set_stby = 3;
    /// Whether interrupts are enabled.
    iren, set_iren = 4;
}
impl Flags {
    /// Creates a flag set with every flag cleared.
    pub fn new() -> Self {
        Flags(0)
    }

    /// Gets the bit-representation of the flags.
    pub fn get(&self) -> u8 {
        self.0
    }
}
impl std::fmt::Debug for Flags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Flags")
            .field("carry", &self.carry())
            .field("zero", &self.zero())
            .field("wait", &self.wait())
            .field("stby", &self.stby())
            .field("iren", &self.iren())
            .finish()
    }
}

/// Computes an ALU operation, returning the result, CARRY and ZERO.
fn alu(op: AluOp, a: u8, b: u8, carry_in: bool) -> (u8, bool, bool) {
    let (a, b, c) = (i16::from(a), i16::from(b), i16::from(carry_in));
    let wide = match op {
        AluOp::Add  => a + b,
        AluOp::Addc => a + b + c,
        AluOp::Sub  => a - b,
        AluOp::Subc => a - b - c,
        AluOp::And  => a & b,
        AluOp::Or   => a | b,
        AluOp::Xor  => a ^ b,
        AluOp::Mask => a & !b,
    };
    let carry = match op {
        AluOp::Add | AluOp::Addc => wide > 0xFF,
        AluOp::Sub | AluOp::Subc => wide < 0,
        _ => false,
    };

    // ZERO is taken before truncation
    (wide as u8, carry, wide == 0)
}

/// Computes a shift or rotate, returning the result and the last bit moved out (CARRY).
fn shift(op: ShiftOp, a: u8, n: u8) -> (u8, bool) {
    let a32 = u32::from(a);
    match op {
        ShiftOp::Shl => {
            let wide = a32.checked_shl(n.into()).unwrap_or(0);
            (wide as u8, wide & 0x100 != 0)
        },
        ShiftOp::Shr => {
            // keep one bit below the result to catch the last bit out
            let wide = (a32 << 1).checked_shr(n.into()).unwrap_or(0);
            ((wide >> 1) as u8, wide & 1 != 0)
        },
        ShiftOp::Rol => {
            let k = u32::from(n % 8);
            let r = a.rotate_left(k);
            (r, k != 0 && r & 0x01 != 0)
        },
        ShiftOp::Ror => {
            let k = u32::from(n % 8);
            let r = a.rotate_right(k);
            (r, k != 0 && r & 0x80 != 0)
        },
    }
}

/// The execution core.
///
/// All state is public so it can be inspected (and set up) directly.
#[derive(Debug, Clone)]
pub struct Core {
    /// The general purpose registers r0-r7.
    pub reg_file: RegFile,
    /// The program counter.
    pub pc: u16,
    /// The return-address stack.
    pub ras: ReturnStack,
    /// The processor flags.
    pub flags: Flags,
    /// Set by [`Core::trigger_interrupt`]. Interrupts are not dispatched.
    pub interrupt_pending: bool,
    /// Instruction memory.
    pub imem: InstrMem,
    /// Data memory.
    pub dmem: ByteMem,
    /// The I/O controller registers.
    pub io: ByteMem,
    /// The number of instructions which completed a step.
    pub instructions_run: u64,
    /// The last instruction decoded by [`Core::step`].
    pub last_instr: Option<SimInstr>,
    /// Tracks data memory and I/O accesses.
    pub observer: AccessObserver,
}
impl Core {
    /// Creates a core with zeroed state.
    pub fn new() -> Self {
        Self {
            reg_file: RegFile::new(),
            pc: 0,
            ras: ReturnStack::new(),
            flags: Flags::new(),
            interrupt_pending: false,
            imem: InstrMem::new(),
            dmem: ByteMem::new(),
            io: ByteMem::new(),
            instructions_run: 0,
            last_instr: None,
            observer: AccessObserver::new(),
        }
    }

    /// Replaces the instruction memory (see [`InstrMem::upload`]).
    pub fn upload_instr_mem(&mut self, words: &[u32]) -> Result<(), CoreErr> {
        self.imem.upload(words)
    }

    /// Replaces the data memory (see [`ByteMem::upload`]).
    pub fn upload_data_mem(&mut self, bytes: &[u8]) -> Result<(), CoreErr> {
        self.dmem.upload(bytes)
    }

    /// Uploads both memories of an assembled image.
    pub fn load_image(&mut self, image: &Image) -> Result<(), CoreErr> {
        self.upload_instr_mem(image.instr())?;
        self.upload_data_mem(image.data())
    }

    /// Reads the instruction word at the PC.
    pub fn fetch(&self) -> Result<u32, CoreErr> {
        self.imem.get(self.pc).ok_or(CoreErr::InvalidPc(i32::from(self.pc)))
    }

    /// Advances the PC by one.
    ///
    /// If the next PC is outside instruction memory, this errors and the PC is left unchanged.
    pub fn update_pc(&mut self) -> Result<(), CoreErr> {
        let next = self.pc.wrapping_add(1);
        if usize::from(next) >= INSTR_MEM_SIZE {
            return Err(CoreErr::InvalidPc(i32::from(next)));
        }
        self.pc = next;
        Ok(())
    }

    /// Checks a computed data address, converting it to a memory index.
    pub fn check_data_access(addr: i32) -> Result<u8, CoreErr> {
        u8::try_from(addr).map_err(|_| CoreErr::AccessViolation(addr))
    }

    /// Sets the pending interrupt latch.
    pub fn trigger_interrupt(&mut self) {
        self.interrupt_pending = true;
    }

    /// Sets the PC so that the next PC update lands on `target`.
    ///
    /// A target outside instruction memory errors and leaves the PC unchanged.
    fn jump_to(&mut self, target: i32) -> Result<(), CoreErr> {
        match u16::try_from(target) {
            Ok(t) if usize::from(t) < INSTR_MEM_SIZE => {
                self.pc = t.wrapping_sub(1);
                Ok(())
            },
            _ => Err(CoreErr::InvalidPc(target)),
        }
    }

    /// Executes a decoded instruction.
    ///
    /// If this errors with a [`CoreErr::ReturnStackOverflow`], the instruction has still completed.
    /// Any other error leaves the effects applied before the error in place.
    pub fn execute(&mut self, instr: SimInstr) -> Result<(), CoreErr> {
        match instr {
            SimInstr::Alu(op, rd, rs, src) => {
                let a = self.reg_file[rs];
                let b = match src {
                    ImmOrReg::Imm(imm) => imm,
                    ImmOrReg::Reg(rt)  => self.reg_file[rt],
                };

                let (result, carry, zero) = alu(op, a, b, self.flags.carry());
                self.reg_file[rd] = result;
                self.flags.set_carry(carry);
                self.flags.set_zero(zero);
            },
            SimInstr::Shift(op, rd, rs, n) => {
                let (result, carry) = shift(op, self.reg_file[rs], n);
                self.reg_file[rd] = result;
                self.flags.set_carry(carry);
                self.flags.set_zero(result == 0);
            },
            SimInstr::Mem(op, rd, base, offset) => {
                let addr = match base {
                    // direct addresses are unsigned
                    None => i32::from(offset),
                    Some(b) => i32::from(self.reg_file[b]) + i32::from(offset as i8),
                };
                let addr = Self::check_data_access(addr)?;

                match op {
                    MemOp::Ldm => {
                        self.reg_file[rd] = self.dmem[addr];
                        self.observer.update_accesses(Space::Data, addr, AccessSet::READ);
                    },
                    MemOp::Stm => {
                        let mut set = AccessSet::WRITTEN;
                        if self.dmem[addr] != self.reg_file[rd] { set |= AccessSet::MODIFIED; }
                        self.dmem[addr] = self.reg_file[rd];
                        self.observer.update_accesses(Space::Data, addr, set);
                    },
                    MemOp::Inp => {
                        self.reg_file[rd] = self.io[addr];
                        self.observer.update_accesses(Space::Io, addr, AccessSet::READ);
                    },
                    MemOp::Out => {
                        let mut set = AccessSet::WRITTEN;
                        if self.io[addr] != self.reg_file[rd] { set |= AccessSet::MODIFIED; }
                        self.io[addr] = self.reg_file[rd];
                        self.observer.update_accesses(Space::Io, addr, set);
                    },
                }
            },
            SimInstr::Branch(cond, disp) => {
                let taken = match cond {
                    BranchCond::Z  => self.flags.zero(),
                    BranchCond::Nz => !self.flags.zero(),
                    BranchCond::C  => self.flags.carry(),
                    BranchCond::Nc => !self.flags.carry(),
                };
                if taken {
                    self.jump_to(i32::from(self.pc) + 1 + i32::from(disp as i8))?;
                }
            },
            SimInstr::Jump(JumpOp::Jmp, target) => self.jump_to(i32::from(target & 0xFFF))?,
            SimInstr::Jump(JumpOp::Jsb, target) => {
                let ret = self.pc;
                self.jump_to(i32::from(target & 0xFFF))?;
                self.ras.push(ret)?;
            },
            SimInstr::Misc(op) => match op {
                MiscOp::Ret  => self.pc = self.ras.pop()?,
                MiscOp::Reti => {
                    self.pc = self.ras.pop()?;
                    self.flags.set_iren(true);
                },
                MiscOp::Enai => self.flags.set_iren(true),
                MiscOp::Disi => self.flags.set_iren(false),
                MiscOp::Wait => self.flags.set_wait(true),
                MiscOp::Stby => self.flags.set_stby(true),
            },
            SimInstr::Unknown(word) => return Err(CoreErr::InvalidInstruction(word)),
        }

        Ok(())
    }

    /// Simulates one step: fetch, decode, execute and update PC.
    ///
    /// A fatal condition aborts the remaining sub-steps.
    /// A recoverable condition (return stack overflow) still completes the step
    /// and is then returned.
    pub fn step(&mut self) -> Result<(), CoreErr> {
        let word = self.fetch()?;
        let instr = SimInstr::decode(word);
        trace!(pc = self.pc, word, %instr, "executing instruction");
        self.last_instr = Some(instr);

        let outcome = self.execute(instr);
        if let Err(e) = outcome {
            debug!(pc = self.pc, error = %e, "core raised condition");
            if e.is_fatal() { return Err(e); }
        }

        self.update_pc()?;
        self.instructions_run += 1;
        outcome
    }
}
impl Default for Core {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use crate::asm::assemble;
    use crate::ast::reg_consts::{R0, R1, R2, R3};
    use crate::ast::sim::{AluOp, BranchCond, JumpOp, MemOp, MiscOp, ShiftOp, SimInstr};
    use crate::ast::{ImmOrReg, Reg};
    use crate::sim::mem::{DATA_MEM_SIZE, INSTR_MEM_SIZE, RAS_CAPACITY};
    use crate::sim::observer::Space;

    use super::{Core, CoreErr};

    fn alu_imm(op: AluOp, rd: Reg, rs: Reg, imm: u8) -> SimInstr {
        SimInstr::Alu(op, rd, rs, ImmOrReg::Imm(imm))
    }
    fn alu_reg(op: AluOp, rd: Reg, rs: Reg, rt: Reg) -> SimInstr {
        SimInstr::Alu(op, rd, rs, ImmOrReg::Reg(rt))
    }
    #[track_caller]
    fn assert_flags(core: &Core, carry: bool, zero: bool) {
        assert_eq!(core.flags.carry(), carry, "carry");
        assert_eq!(core.flags.zero(), zero, "zero");
    }

    #[test]
    fn test_fetch_limits() {
        let mut core = Core::new();
        assert!(core.fetch().is_ok());

        core.pc = 4095;
        assert!(core.fetch().is_ok());

        core.pc = 4096;
        assert_eq!(core.fetch(), Err(CoreErr::InvalidPc(4096)));

        core.pc = u16::MAX;
        assert_eq!(core.fetch(), Err(CoreErr::InvalidPc(65535)));
    }

    #[test]
    fn test_update_pc_limits() {
        let mut core = Core::new();
        core.update_pc().unwrap();
        core.update_pc().unwrap();
        assert_eq!(core.pc, 2);

        core.pc = 4093;
        core.update_pc().unwrap();
        assert_eq!(core.pc, 4094);
        core.update_pc().unwrap();
        assert_eq!(core.pc, 4095);
        assert_eq!(core.update_pc(), Err(CoreErr::InvalidPc(4096)));
        assert_eq!(core.pc, 4095);

        // corrupted
        core.pc = 0u16.wrapping_sub(100);
        assert!(core.update_pc().is_err());
    }

    #[test]
    fn test_upload() {
        let mut rng = StdRng::seed_from_u64(2110);
        let mut core = Core::new();

        let words: Vec<u32> = (0..INSTR_MEM_SIZE).map(|_| rng.gen_range(0..1000)).collect();
        core.upload_instr_mem(&words).unwrap();
        assert_eq!(core.imem.as_slice(), &words[..]);
        assert_eq!(core.upload_instr_mem(&[0; INSTR_MEM_SIZE + 1]), Err(CoreErr::InstrMemSizeExceeded(4097)));

        let bytes: Vec<u8> = (0..DATA_MEM_SIZE).map(|_| rng.gen()).collect();
        core.upload_data_mem(&bytes).unwrap();
        assert_eq!(core.dmem.as_slice(), &bytes[..]);
        assert_eq!(core.upload_data_mem(&[0; DATA_MEM_SIZE + 1]), Err(CoreErr::DataMemSizeExceeded(257)));
    }

    #[test]
    fn test_check_data_access() {
        assert_eq!(Core::check_data_access(0), Ok(0));
        assert_eq!(Core::check_data_access(255), Ok(255));
        assert_eq!(Core::check_data_access(256), Err(CoreErr::AccessViolation(256)));
        assert_eq!(Core::check_data_access(-1), Err(CoreErr::AccessViolation(-1)));
    }

    #[test]
    fn test_unknown_instruction() {
        let mut core = Core::new();
        let err = core.execute(SimInstr::Unknown(0x3F600)).unwrap_err();
        assert_eq!(err, CoreErr::InvalidInstruction(0x3F600));
        assert!(err.is_fatal());
        assert_eq!(err.value(), Some(0x3F600));
    }

    #[test]
    fn test_add() {
        let mut core = Core::new();
        core.execute(alu_imm(AluOp::Add, R1, R1, 1)).unwrap();
        assert_eq!(core.reg_file[R1], 1);
        assert_flags(&core, false, false);

        core.execute(alu_imm(AluOp::Add, R1, R1, 1)).unwrap();
        assert_eq!(core.reg_file[R1], 2);

        // 2 + 254 = 256
        core.execute(alu_imm(AluOp::Add, R1, R1, 254)).unwrap();
        assert_eq!(core.reg_file[R1], 0);
        assert_flags(&core, true, false);

        core.execute(alu_imm(AluOp::Add, R1, R1, 2)).unwrap();
        assert_eq!(core.reg_file[R1], 2);
        assert_flags(&core, false, false);

        core.execute(alu_reg(AluOp::Add, R1, R1, R1)).unwrap();
        assert_eq!(core.reg_file[R1], 4);
        assert_flags(&core, false, false);

        core.reg_file[R2] = 0;
        core.execute(alu_imm(AluOp::Add, R2, R2, 0)).unwrap();
        assert_flags(&core, false, true);
    }

    #[test]
    fn test_add_flag_properties() {
        let mut core = Core::new();
        core.reg_file[R0] = 254;
        core.execute(alu_imm(AluOp::Add, R0, R0, 2)).unwrap();
        assert_eq!(core.reg_file[R0], 0);
        assert_flags(&core, true, false);

        core.reg_file[R0] = 1;
        core.execute(alu_imm(AluOp::Sub, R0, R0, 4)).unwrap();
        assert_eq!(core.reg_file[R0], 253);
        assert_flags(&core, true, false);

        core.reg_file[R0] = 0xFF;
        core.execute(alu_imm(AluOp::Mask, R0, R0, 0x01)).unwrap();
        assert_eq!(core.reg_file[R0], 0xFE);
    }

    #[test]
    fn test_addc() {
        let mut core = Core::new();
        core.execute(alu_imm(AluOp::Addc, R1, R1, 1)).unwrap();
        core.execute(alu_imm(AluOp::Addc, R1, R1, 1)).unwrap();
        core.execute(alu_imm(AluOp::Addc, R1, R1, 254)).unwrap();
        assert_eq!(core.reg_file[R1], 0);
        assert_flags(&core, true, false);

        // carry in
        core.execute(alu_imm(AluOp::Addc, R1, R1, 2)).unwrap();
        assert_eq!(core.reg_file[R1], 3);
        assert_flags(&core, false, false);

        core.execute(alu_reg(AluOp::Addc, R1, R1, R1)).unwrap();
        assert_eq!(core.reg_file[R1], 6);
    }

    #[test]
    fn test_sub_subc() {
        let mut core = Core::new();
        core.execute(alu_imm(AluOp::Add, R1, R1, 1)).unwrap();
        core.execute(alu_imm(AluOp::Sub, R1, R1, 4)).unwrap();
        assert_eq!(core.reg_file[R1], 253);
        assert_flags(&core, true, false);
        core.execute(alu_imm(AluOp::Sub, R1, R1, 4)).unwrap();
        assert_eq!(core.reg_file[R1], 249);
        assert_flags(&core, false, false);
        core.execute(alu_reg(AluOp::Sub, R1, R1, R1)).unwrap();
        assert_eq!(core.reg_file[R1], 0);
        assert_flags(&core, false, true);

        let mut core = Core::new();
        core.execute(alu_imm(AluOp::Add, R1, R1, 1)).unwrap();
        core.execute(alu_imm(AluOp::Subc, R1, R1, 4)).unwrap();
        assert_eq!(core.reg_file[R1], 253);
        assert_flags(&core, true, false);
        // borrow in
        core.execute(alu_imm(AluOp::Subc, R1, R1, 4)).unwrap();
        assert_eq!(core.reg_file[R1], 248);
        assert_flags(&core, false, false);
        core.execute(alu_reg(AluOp::Subc, R1, R1, R1)).unwrap();
        assert_eq!(core.reg_file[R1], 0);
        assert_flags(&core, false, true);
    }

    #[test]
    fn test_logic() {
        let table = [
            (AluOp::And, [0, 0, 0, 1]),
            (AluOp::Or,  [0, 1, 1, 1]),
            (AluOp::Xor, [0, 1, 1, 0]),
        ];
        for (op, expected) in table {
            for (i, (a, b)) in [(0, 0), (0, 1), (1, 0), (1, 1)].into_iter().enumerate() {
                let mut core = Core::new();
                core.flags.set_carry(true);
                core.reg_file[R1] = a;
                core.reg_file[R2] = b;
                core.execute(alu_reg(op, R3, R1, R2)).unwrap();
                assert_eq!(core.reg_file[R3], expected[i], "{op:?} {a} {b}");
                assert_flags(&core, false, expected[i] == 0);

                core.execute(alu_imm(op, R3, R1, b)).unwrap();
                assert_eq!(core.reg_file[R3], expected[i], "{op:?} {a} #{b}");
            }
        }
    }

    #[test]
    fn test_mask() {
        for (a, b, expected) in [(0xFF, 0x01, 0xFE), (0xFF, 0x7F, 0x80), (0xAA, 0xF0, 0x0A), (0xAA, 0x0F, 0xA0)] {
            let mut core = Core::new();
            core.reg_file[R1] = a;
            core.execute(alu_imm(AluOp::Mask, R3, R1, b)).unwrap();
            assert_eq!(core.reg_file[R3], expected);

            core.reg_file[R2] = b;
            core.execute(alu_reg(AluOp::Mask, R3, R1, R2)).unwrap();
            assert_eq!(core.reg_file[R3], expected);
        }
    }

    #[test]
    fn test_shifts() {
        let run = |op, a, n| {
            let mut core = Core::new();
            core.reg_file[R1] = a;
            core.execute(SimInstr::Shift(op, R2, R1, n)).unwrap();
            (core.reg_file[R2], core.flags.carry())
        };

        let shl: Vec<_> = (1..=9).map(|n| run(ShiftOp::Shl, 1, n).0).collect();
        assert_eq!(shl, [2, 4, 8, 16, 32, 64, 128, 0, 0]);
        let shr: Vec<_> = (1..=9).map(|n| run(ShiftOp::Shr, 128, n).0).collect();
        assert_eq!(shr, [64, 32, 16, 8, 4, 2, 1, 0, 0]);
        let rol: Vec<_> = (1..=9).map(|n| run(ShiftOp::Rol, 1, n).0).collect();
        assert_eq!(rol, [2, 4, 8, 16, 32, 64, 128, 1, 2]);
        let ror: Vec<_> = (1..=9).map(|n| run(ShiftOp::Ror, 128, n).0).collect();
        assert_eq!(ror, [64, 32, 16, 8, 4, 2, 1, 128, 64]);

        // carry is the last bit moved out
        assert_eq!(run(ShiftOp::Shl, 0x80, 1), (0, true));
        assert_eq!(run(ShiftOp::Shl, 0x40, 1), (0x80, false));
        assert_eq!(run(ShiftOp::Shl, 0x01, 8), (0, true));
        assert_eq!(run(ShiftOp::Shr, 0x01, 1), (0, true));
        assert_eq!(run(ShiftOp::Shr, 0x02, 1), (1, false));
        assert_eq!(run(ShiftOp::Rol, 0x80, 1), (1, true));
        assert_eq!(run(ShiftOp::Ror, 0x01, 1), (0x80, true));
        assert_eq!(run(ShiftOp::Rol, 0x80, 8), (0x80, false));
        assert_eq!(run(ShiftOp::Shl, 0x05, 0), (0x05, false));
    }

    #[test]
    fn test_latches_idempotent() {
        let mut core = Core::new();
        for (op, get) in [
            (MiscOp::Enai, (|c: &Core| c.flags.iren()) as fn(&Core) -> bool),
            (MiscOp::Wait, |c: &Core| c.flags.wait()),
            (MiscOp::Stby, |c: &Core| c.flags.stby()),
        ] {
            assert!(!get(&core));
            core.execute(SimInstr::Misc(op)).unwrap();
            assert!(get(&core));
            core.execute(SimInstr::Misc(op)).unwrap();
            assert!(get(&core));
        }

        core.execute(SimInstr::Misc(MiscOp::Disi)).unwrap();
        assert!(!core.flags.iren());
        core.execute(SimInstr::Misc(MiscOp::Disi)).unwrap();
        assert!(!core.flags.iren());
    }

    #[test]
    fn test_ldm_stm() {
        let mut core = Core::new();
        // indexed through r1 = 0
        let ldm = SimInstr::Mem(MemOp::Ldm, R2, Some(R1), 0);
        core.execute(ldm).unwrap();
        assert_eq!(core.reg_file[R2], 0);

        core.dmem[0] = 1;
        core.execute(ldm).unwrap();
        assert_eq!(core.reg_file[R2], 1);

        core.dmem[0xAB] = 0xCD;
        core.dmem[0xAC] = 0xEF;
        core.dmem[0xAD] = 0x12;
        core.reg_file[R1] = 0xAB;
        core.execute(ldm).unwrap();
        assert_eq!(core.reg_file[R2], 0xCD);
        core.execute(SimInstr::Mem(MemOp::Ldm, R2, Some(R1), 2)).unwrap();
        assert_eq!(core.reg_file[R2], 0x12);
        // negative offset
        core.execute(SimInstr::Mem(MemOp::Ldm, R2, Some(R1), (-0x2Bi8) as u8)).unwrap();
        assert_eq!(core.reg_file[R2], core.dmem[0x80]);
        // direct
        core.execute(SimInstr::Mem(MemOp::Ldm, R3, None, 0xAC)).unwrap();
        assert_eq!(core.reg_file[R3], 0xEF);

        core.reg_file[R1] = 10;
        core.reg_file[R2] = 0xCD;
        core.execute(SimInstr::Mem(MemOp::Stm, R2, Some(R1), 1)).unwrap();
        assert_eq!(core.dmem[11], 0xCD);
        assert!(core.observer.get_accesses(Space::Data, 11).modified());
        assert_eq!(core.observer.last_data_access(), Some(11));
    }

    #[test]
    fn test_access_violation() {
        let mut core = Core::new();
        core.reg_file[R1] = 0xFF;
        assert_eq!(
            core.execute(SimInstr::Mem(MemOp::Ldm, R2, Some(R1), 1)),
            Err(CoreErr::AccessViolation(256))
        );
        core.reg_file[R1] = 0;
        assert_eq!(
            core.execute(SimInstr::Mem(MemOp::Stm, R2, Some(R1), 0xFF)),
            Err(CoreErr::AccessViolation(-1))
        );
        assert!(!core.observer.get_accesses(Space::Data, 0xFF).accessed());
    }

    #[test]
    fn test_inp_out() {
        let mut core = Core::new();
        core.io[0] = 0xAB;
        core.execute(SimInstr::Mem(MemOp::Inp, R2, None, 0)).unwrap();
        assert_eq!(core.reg_file[R2], 0xAB);

        core.reg_file[R3] = 0x5A;
        core.execute(SimInstr::Mem(MemOp::Out, R3, None, 7)).unwrap();
        assert_eq!(core.io[7], 0x5A);
        // IO is separate from data memory
        assert_eq!(core.dmem[7], 0);
        assert!(core.observer.get_accesses(Space::Io, 7).written());
        assert_eq!(core.observer.last_data_access(), None);
    }

    #[test]
    fn test_jsb_ret() {
        let mut core = Core::new();
        core.pc = 128;
        core.execute(SimInstr::Jump(JumpOp::Jsb, 256)).unwrap();
        assert_eq!(core.pc, 255);
        assert_eq!(core.ras.len(), 1);
        assert_eq!(core.ras.slots()[0], 128);

        core.execute(SimInstr::Misc(MiscOp::Ret)).unwrap();
        assert_eq!(core.pc, 128);
        assert!(core.ras.is_empty());

        assert_eq!(core.execute(SimInstr::Misc(MiscOp::Ret)), Err(CoreErr::EmptyReturnStack));
        assert_eq!(core.execute(SimInstr::Misc(MiscOp::Reti)), Err(CoreErr::EmptyReturnStack));
    }

    #[test]
    fn test_reti() {
        let mut core = Core::new();
        core.pc = 3;
        core.execute(SimInstr::Jump(JumpOp::Jsb, 40)).unwrap();
        core.execute(SimInstr::Misc(MiscOp::Reti)).unwrap();
        assert_eq!(core.pc, 3);
        assert!(core.flags.iren());
    }

    #[test]
    fn test_jsb_overflow() {
        let mut core = Core::new();
        for i in 0..RAS_CAPACITY as u16 {
            core.pc = i;
            core.execute(SimInstr::Jump(JumpOp::Jsb, 100)).unwrap();
        }
        core.pc = 50;
        let err = core.execute(SimInstr::Jump(JumpOp::Jsb, 200)).unwrap_err();
        assert_eq!(err, CoreErr::ReturnStackOverflow(50));
        assert!(!err.is_fatal());
        // the jump is not rolled back
        assert_eq!(core.pc, 199);
        assert_eq!(core.ras.len(), RAS_CAPACITY);
    }

    #[test]
    fn test_jmp_and_branch() {
        let mut core = Core::new();
        core.pc = 10;
        core.execute(SimInstr::Jump(JumpOp::Jmp, 0)).unwrap();
        core.update_pc().unwrap();
        assert_eq!(core.pc, 0);

        // bz -1 (to self) is only taken when ZERO
        core.pc = 20;
        core.execute(SimInstr::Branch(BranchCond::Z, 0xFF)).unwrap();
        assert_eq!(core.pc, 20);
        core.flags.set_zero(true);
        core.execute(SimInstr::Branch(BranchCond::Z, 0xFF)).unwrap();
        core.update_pc().unwrap();
        assert_eq!(core.pc, 20);

        core.execute(SimInstr::Branch(BranchCond::Nz, 5)).unwrap();
        assert_eq!(core.pc, 20);
        core.execute(SimInstr::Branch(BranchCond::Nc, 5)).unwrap();
        core.update_pc().unwrap();
        assert_eq!(core.pc, 26);
        core.execute(SimInstr::Branch(BranchCond::C, 5)).unwrap();
        assert_eq!(core.pc, 26);
    }

    #[test]
    fn test_jump_targets() {
        // jump targets keep only the 12 address bits
        let mut core = Core::new();
        core.execute(SimInstr::Jump(JumpOp::Jmp, 0x1234)).unwrap();
        core.update_pc().unwrap();
        assert_eq!(core.pc, 0x234);

        core.pc = 7;
        core.execute(SimInstr::Jump(JumpOp::Jsb, 0xF010)).unwrap();
        core.update_pc().unwrap();
        assert_eq!(core.pc, 0x010);
        assert_eq!(core.ras.slots()[0], 7);
    }

    #[test]
    fn test_branch_out_of_range() {
        // a taken branch leaving instruction memory errors before the PC moves
        let mut core = Core::new();
        core.flags.set_zero(true);
        core.pc = 1;
        let err = core.execute(SimInstr::Branch(BranchCond::Z, 0xFB)).unwrap_err();
        assert_eq!(err, CoreErr::InvalidPc(-3));
        assert!(err.is_fatal());
        assert_eq!(core.pc, 1);

        core.pc = 4090;
        assert_eq!(core.execute(SimInstr::Branch(BranchCond::Z, 0x7F)), Err(CoreErr::InvalidPc(4218)));
        assert_eq!(core.pc, 4090);

        // the last word is still reachable
        core.execute(SimInstr::Branch(BranchCond::Z, 4)).unwrap();
        core.update_pc().unwrap();
        assert_eq!(core.pc, 4095);

        // through a full step
        let mut core = Core::new();
        core.flags.set_zero(true);
        core.upload_instr_mem(&[SimInstr::Branch(BranchCond::Z, 0xFE).encode()]).unwrap();
        assert_eq!(core.step(), Err(CoreErr::InvalidPc(-1)));
        assert_eq!(core.pc, 0);
        assert_eq!(core.instructions_run, 0);
    }

    #[test]
    fn test_step_program() {
        let image = assemble("add r0, r0, 1\nadd r0, r0, 1").unwrap();
        let mut core = Core::new();
        core.load_image(&image).unwrap();

        core.step().unwrap();
        core.step().unwrap();
        assert_eq!(core.reg_file[R0], 2);
        assert!(!core.flags.carry());
        assert!(!core.flags.zero());
        assert_eq!(core.instructions_run, 2);
        assert_eq!(core.last_instr, Some(SimInstr::Alu(AluOp::Add, R0, R0, ImmOrReg::Imm(1))));
    }

    #[test]
    fn test_step_loop_and_call() {
        let src = "
                   jsb routine
                   jmp done
            routine: add r1, r1, 3
                   ret
            done:  stby
        ";
        let mut core = Core::new();
        core.load_image(&assemble(src).unwrap()).unwrap();
        for _ in 0..5 { core.step().unwrap(); }
        assert_eq!(core.reg_file[R1], 3);
        assert!(core.flags.stby());
        assert_eq!(core.pc, 5);
    }

    #[test]
    fn test_step_errors() {
        // a fatal condition does not update the PC
        let mut core = Core::new();
        core.upload_instr_mem(&[0x3F000]).unwrap();
        assert_eq!(core.step(), Err(CoreErr::EmptyReturnStack));
        assert_eq!(core.pc, 0);
        assert_eq!(core.instructions_run, 0);

        core.upload_instr_mem(&[0x3F600]).unwrap();
        assert_eq!(core.step(), Err(CoreErr::InvalidInstruction(0x3F600)));

        // an overflow still completes the step
        let mut core = Core::new();
        let jsb_self = SimInstr::Jump(JumpOp::Jsb, 0).encode();
        core.upload_instr_mem(&[jsb_self]).unwrap();
        for _ in 0..RAS_CAPACITY { core.step().unwrap(); }
        assert_eq!(core.step(), Err(CoreErr::ReturnStackOverflow(0)));
        assert_eq!(core.pc, 0);
        assert_eq!(core.instructions_run, RAS_CAPACITY as u64 + 1);

        // running off the end of memory
        let mut core = Core::new();
        core.pc = 4095;
        assert_eq!(core.step(), Err(CoreErr::InvalidPc(4096)));
    }

    #[test]
    fn test_deterministic() {
        let mut rng = StdRng::seed_from_u64(0x6E75_7400);
        for _ in 0..20 {
            let words: Vec<u32> = (0..64).map(|_| rng.gen_range(0..0x3F600)).collect();
            let bytes: Vec<u8> = (0..DATA_MEM_SIZE).map(|_| rng.gen()).collect();

            let mut a = Core::new();
            let mut b = Core::new();
            for core in [&mut a, &mut b] {
                core.upload_instr_mem(&words).unwrap();
                core.upload_data_mem(&bytes).unwrap();
            }

            for _ in 0..200 {
                assert_eq!(a.step(), b.step());
                assert_eq!(a.pc, b.pc);
                assert_eq!(a.reg_file, b.reg_file);
                assert_eq!(a.flags, b.flags);
                assert_eq!(a.ras, b.ras);
                assert_eq!(a.dmem, b.dmem);
                assert_eq!(a.io, b.io);
            }
        }
    }

    #[test]
    fn test_trigger_interrupt() {
        let mut core = Core::new();
        core.trigger_interrupt();
        assert!(core.interrupt_pending);
        // no vectoring
        core.step().unwrap();
        assert_eq!(core.pc, 1);
    }
}
