//! Simulating and execution for Gumnut assembly.
//!
//! This module is focused on driving assembled programs (i.e., [`Image`]).
//!
//! This module consists of:
//! - [`Simulator`]: The controller which loads, steps and reports on a program.
//! - [`core`]: The module holding the execution core (machine state and instruction semantics).
//! - [`mem`]: The module handling memories, registers and the return-address stack.
//! - [`debug`]: The module handling breakpoints.
//! - [`observer`]: The module tracking data memory and I/O accesses.
//! - [`snapshot`]: The module holding immutable views of the simulator state.
//!
//! # Usage
//!
//! To simulate some code, create a [`Simulator`] and set it up with source code:
//!
//! ```
//! use gumnut_sim::sim::{Simulator, RunState};
//! use gumnut_sim::ast::reg_consts::R0;
//!
//! let mut sim = Simulator::new(Default::default());
//! assert_eq!(sim.setup("add r0, r0, 1\nadd r0, r0, 1"), RunState::Idle);
//!
//! sim.step();
//! sim.step();
//! assert_eq!(sim.core.reg_file[R0], 2);
//! assert!(!sim.flags().carry);
//! assert!(!sim.flags().zero);
//! ```
//!
//! ## States
//!
//! The simulator is always in one of three [`RunState`]s:
//! - [`RunState::Halt`]: nothing is loaded, or execution stopped due to a fatal condition
//! - [`RunState::Idle`]: ready for the next step
//! - [`RunState::Breakpoint`]: a breakpoint was reached (or a recoverable condition occurred).
//!     Stepping continues normally from here.
//!
//! ## Exceptions
//!
//! Conditions raised by the assembler or the execution core are recorded as a [`SimException`].
//! An exception is surfaced only once: [`Simulator::take_exception`] (and [`Simulator::status`])
//! clear the recorded exception.
//!
//! ```
//! use gumnut_sim::sim::{Simulator, RunState};
//!
//! let mut sim = Simulator::new(Default::default());
//! sim.setup("ret");
//! assert_eq!(sim.step(), RunState::Halt);
//!
//! let exc = sim.take_exception().unwrap();
//! assert_eq!(exc.kind(), "empty_return_stack");
//! assert!(sim.take_exception().is_none());
//! ```
//!
//! ## Debugging with breakpoints
//!
//! Breakpoints are source lines (0-indexed). After a step, if the PC points at
//! the instruction of a breakpoint line, the simulator enters [`RunState::Breakpoint`].
//!
//! ```
//! use gumnut_sim::sim::{Simulator, RunState};
//!
//! let src = "
//!     add r0, r0, 1
//!     add r0, r0, 2
//!     add r0, r0, 3
//!     stby
//! ";
//! let mut sim = Simulator::new(Default::default());
//! sim.setup(src);
//! sim.toggle_breakpoint(3);
//!
//! assert_eq!(sim.run(), RunState::Breakpoint);
//! assert_eq!(sim.core.pc, 2);
//! assert_eq!(sim.current_line(), Some(3));
//! ```

pub mod core;
pub mod debug;
pub mod mem;
pub mod observer;
pub mod snapshot;

use tracing::{debug, warn};

use crate::asm::{assemble, AsmErr, AsmErrKind, Image};
use crate::ast::sim::{JumpOp, SimInstr};

use self::core::{Core, CoreErr};
use self::debug::Breakpoints;
use self::snapshot::{ExceptionInfo, FlagSnapshot, RegSnapshot, SimStatus};

/// The run state of the [`Simulator`].
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum RunState {
    /// No program is loaded or a fatal condition stopped execution.
    #[default]
    Halt,
    /// Ready to execute the next instruction.
    Idle,
    /// Paused at a breakpoint line, or after a recoverable condition.
    Breakpoint,
}

/// A condition recorded by the [`Simulator`].
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum SimException {
    /// The source failed to assemble.
    Asm(AsmErr),
    /// The execution core raised a condition.
    Core(CoreErr),
}
impl SimException {
    /// A stable name for this kind of exception.
    pub fn kind(&self) -> &'static str {
        match self {
            SimException::Asm(e) => match e.kind {
                AsmErrKind::UnknownMnemonic(_)    => "unknown_mnemonic",
                AsmErrKind::Syntax(_)
                | AsmErrKind::InvalidOperands
                | AsmErrKind::InvalidNumeral        => "malformed_instruction",
                AsmErrKind::DuplicateLabel(_)     => "duplicate_label",
                AsmErrKind::UndefinedLabel(_)     => "undefined_label",
                AsmErrKind::InstrCapacityExceeded => "instruction_memory_size_exceeded",
                AsmErrKind::DataCapacityExceeded  => "data_memory_size_exceeded",
            },
            SimException::Core(e) => e.kind(),
        }
    }

    /// The offending value, if this exception has one.
    pub fn value(&self) -> Option<i64> {
        match self {
            SimException::Asm(_)  => None,
            SimException::Core(e) => e.value(),
        }
    }

    /// Whether this exception stopped execution.
    pub fn is_fatal(&self) -> bool {
        match self {
            SimException::Asm(_)  => true,
            SimException::Core(e) => e.is_fatal(),
        }
    }

    /// Converts this exception into its displayable form.
    pub fn info(&self) -> ExceptionInfo {
        ExceptionInfo {
            kind: self.kind(),
            message: self.to_string(),
            value: self.value(),
        }
    }
}
impl std::fmt::Display for SimException {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SimException::Asm(e)  => write!(f, "line {}: {e}", e.line),
            SimException::Core(e) => e.fmt(f),
        }
    }
}
impl std::error::Error for SimException {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SimException::Asm(e)  => Some(e),
            SimException::Core(e) => Some(e),
        }
    }
}
impl crate::err::Error for SimException {
    fn line(&self) -> Option<usize> {
        match self {
            SimException::Asm(e)  => crate::err::Error::line(e),
            SimException::Core(_) => None,
        }
    }

    fn help(&self) -> Option<std::borrow::Cow<str>> {
        match self {
            SimException::Asm(e)  => crate::err::Error::help(e),
            SimException::Core(e) => crate::err::Error::help(e),
        }
    }
}
impl From<AsmErr> for SimException {
    fn from(value: AsmErr) -> Self {
        SimException::Asm(value)
    }
}
impl From<CoreErr> for SimException {
    fn from(value: CoreErr) -> Self {
        SimException::Core(value)
    }
}

/// Configuration flags for [`Simulator`].
///
/// These can be modified after the `Simulator` is created with [`Simulator::new`]
/// and their effects should still apply. They are kept across [`Simulator::reset`].
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct SimFlags {
    /// Whether the run loops pause once the WAIT latch is set.
    ///
    /// By default, this flag is `true`.
    pub stop_on_wait: bool,

    /// Whether the run loops pause once the STBY latch is set.
    ///
    /// By default, this flag is `true`.
    pub stop_on_stby: bool,
}

#[allow(clippy::derivable_impls)]
impl Default for SimFlags {
    fn default() -> Self {
        Self {
            stop_on_wait: true,
            stop_on_stby: true,
        }
    }
}

/// Executes assembled code.
#[derive(Debug)]
pub struct Simulator {
    /// The execution core.
    ///
    /// Its state can be read (or modified) directly.
    pub core: Core,

    /// The breakpoints for the simulator.
    pub breakpoints: Breakpoints,

    /// Configuration settings for the simulator.
    pub flags: SimFlags,

    image: Image,
    state: RunState,
    exception: Option<SimException>,
    steps: u64,
    prev_pc: u16,
}
impl Simulator {
    /// Creates a new simulator with the provided flags and nothing loaded.
    pub fn new(flags: SimFlags) -> Self {
        Self {
            core: Core::new(),
            breakpoints: Breakpoints::default(),
            flags,
            image: Image::empty(),
            state: RunState::Halt,
            exception: None,
            steps: 0,
            prev_pc: 0,
        }
    }

    /// Resets the simulator to its initial (halted, empty) state.
    ///
    /// This clears breakpoints, but keeps the configured [`SimFlags`].
    pub fn reset(&mut self) {
        let flags = self.flags;
        *self = Self::new(flags);
    }

    /// Resets the simulator, then assembles and loads the given source.
    ///
    /// This returns the resulting state:
    /// - [`RunState::Idle`] if the program has at least one instruction
    /// - [`RunState::Halt`] if it has none
    /// - [`RunState::Halt`] if it failed to assemble (the error is recorded as an exception)
    pub fn setup(&mut self, src: &str) -> RunState {
        match assemble(src) {
            Ok(image) => self.load_image(image),
            Err(e) => {
                self.reset();
                debug!(line = e.line, error = %e, "setup failed to assemble");
                self.exception = Some(e.into());
                self.state
            },
        }
    }

    /// Resets the simulator and loads an already assembled image.
    ///
    /// The resulting state is as described in [`Simulator::setup`].
    pub fn load_image(&mut self, image: Image) -> RunState {
        self.reset();
        if let Err(e) = self.core.load_image(&image) {
            debug!(error = %e, "image could not be uploaded");
            self.exception = Some(e.into());
            return self.state;
        }

        self.state = match image.instr_count() {
            0 => RunState::Halt,
            _ => RunState::Idle,
        };
        debug!(instructions = image.instr_count(), lines = image.line_count(), state = ?self.state, "loaded program");
        self.image = image;
        self.state
    }

    /// Simulates one step, executing one instruction.
    ///
    /// This does nothing if the simulator is halted.
    /// Returns the state after the step.
    pub fn step(&mut self) -> RunState {
        if self.state == RunState::Halt { return self.state; }

        self.prev_pc = self.core.pc;
        self.core.observer.clear();

        self.state = match self.core.step() {
            Ok(()) => {
                self.steps += 1;
                match self.current_line() {
                    Some(line) if self.breakpoints.contains(line) => RunState::Breakpoint,
                    _ => RunState::Idle,
                }
            },
            Err(e) if !e.is_fatal() => {
                warn!(pc = self.prev_pc, error = %e, "recoverable condition during step");
                self.steps += 1;
                self.exception = Some(e.into());
                RunState::Breakpoint
            },
            Err(e) => {
                debug!(pc = self.prev_pc, error = %e, "halting");
                self.exception = Some(e.into());
                RunState::Halt
            },
        };

        self.state
    }

    /// Runs until the tripwire condition returns false (or any of the typical breaks occur).
    ///
    /// The typical break conditions are:
    /// - the state leaves [`RunState::Idle`] (a breakpoint, halt or any recorded exception)
    /// - the WAIT latch is set (if [`SimFlags::stop_on_wait`])
    /// - the STBY latch is set (if [`SimFlags::stop_on_stby`])
    ///
    /// This always executes at least one step unless the tripwire fails first,
    /// so a run can continue from a breakpoint.
    pub fn run_while(&mut self, mut tripwire: impl FnMut(&mut Simulator) -> bool) -> RunState {
        // event loop
        loop {
            if self.state == RunState::Halt || !tripwire(self) {
                break;
            }
            if self.step() != RunState::Idle {
                break;
            }
            if self.flags.stop_on_wait && self.core.flags.wait() {
                break;
            }
            if self.flags.stop_on_stby && self.core.flags.stby() {
                break;
            }
        }

        self.state
    }

    /// Execute the program.
    ///
    /// This blocks until one of the break conditions of [`Simulator::run_while`] occurs.
    /// If you would like to limit the maximum number of steps to execute, consider [`Simulator::run_with_limit`].
    pub fn run(&mut self) -> RunState {
        self.run_while(|_| true)
    }

    /// Execute the program with a limit on how many steps to execute.
    pub fn run_with_limit(&mut self, max_steps: u64) -> RunState {
        let i = self.steps;
        self.run_while(|sim| sim.steps.wrapping_sub(i) < max_steps)
    }

    /// Adds the line as a breakpoint if absent, removes it if present.
    ///
    /// Returns whether the line is now a breakpoint.
    pub fn toggle_breakpoint(&mut self, line: usize) -> bool {
        self.breakpoints.toggle(line)
    }

    /// Sets the pending interrupt latch on the core.
    ///
    /// Interrupts are not dispatched.
    pub fn trigger_interrupt(&mut self) {
        self.core.trigger_interrupt();
    }

    /// Sets an I/O controller register, as an external device would.
    pub fn set_io_register(&mut self, addr: u8, value: u8) {
        self.core.io[addr] = value;
    }

    /// Takes the recorded exception, clearing it.
    pub fn take_exception(&mut self) -> Option<SimException> {
        self.exception.take()
    }

    /// The current run state.
    pub fn state(&self) -> RunState {
        self.state
    }

    /// The number of steps executed since setup.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// The loaded image.
    pub fn image(&self) -> &Image {
        &self.image
    }

    /// The source line of the instruction at the PC.
    pub fn current_line(&self) -> Option<usize> {
        self.image.debug_map().find(self.core.pc)
    }

    /// The source line a subroutine will return to, if the last instruction executed was `jsb`.
    pub fn return_line(&self) -> Option<usize> {
        match self.core.last_instr {
            Some(SimInstr::Jump(JumpOp::Jsb, _)) => self.image.debug_map().find(self.prev_pc.wrapping_add(1)),
            _ => None,
        }
    }

    /// A snapshot of the registers.
    pub fn registers(&self) -> RegSnapshot {
        RegSnapshot {
            regs: self.core.reg_file.values(),
            pc: self.core.pc,
            sp: self.core.ras.len(),
            ras: self.core.ras.slots(),
        }
    }

    /// A snapshot of the flags.
    pub fn flags(&self) -> FlagSnapshot {
        let flags = self.core.flags;
        FlagSnapshot {
            carry: flags.carry(),
            zero: flags.zero(),
            wait: flags.wait(),
            stby: flags.stby(),
            iren: flags.iren(),
        }
    }

    /// A snapshot of the controller status.
    ///
    /// This takes the recorded exception.
    pub fn status(&mut self) -> SimStatus {
        SimStatus {
            state: self.state,
            lines_of_code: self.image.line_count(),
            instruction_count: self.image.instr_count(),
            current_line: self.current_line(),
            return_line: self.return_line(),
            breakpoints: self.breakpoints.iter().collect(),
            data_access_addr: self.core.observer.last_data_access(),
            steps: self.steps,
            exception: self.take_exception().map(|e| e.info()),
        }
    }
}
impl Default for Simulator {
    fn default() -> Self {
        Self::new(Default::default())
    }
}
