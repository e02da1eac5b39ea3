//! Immutable views of simulator state.
//!
//! These are plain values which can be handed to a presentation layer.
//! With the `serde` feature, they can also be serialized.

use super::mem::RAS_CAPACITY;
use super::RunState;

/// The processor flags at one point in time.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FlagSnapshot {
    #[allow(missing_docs)]
    pub carry: bool,
    #[allow(missing_docs)]
    pub zero: bool,
    #[allow(missing_docs)]
    pub wait: bool,
    #[allow(missing_docs)]
    pub stby: bool,
    #[allow(missing_docs)]
    pub iren: bool,
}

/// The register state at one point in time.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct RegSnapshot {
    /// r0-r7.
    pub regs: [u8; 8],
    /// The program counter.
    pub pc: u16,
    /// The return-address stack pointer (the number of addresses on the stack).
    pub sp: usize,
    /// The raw return-address stack slots.
    pub ras: [u16; RAS_CAPACITY],
}

/// A recorded exception, in displayable form.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ExceptionInfo {
    /// A stable tag for the kind of exception (e.g., `empty_return_stack`).
    pub kind: &'static str,
    /// A human-readable message.
    pub message: String,
    /// The offending value, if there is one.
    pub value: Option<i64>,
}

/// The controller's state as seen by a presentation layer.
#[derive(Debug, PartialEq, Eq, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SimStatus {
    /// The run state.
    pub state: RunState,
    /// The number of source lines in the loaded program.
    pub lines_of_code: usize,
    /// The number of instructions in the loaded program.
    pub instruction_count: usize,
    /// The source line of the instruction at the PC.
    pub current_line: Option<usize>,
    /// The source line a subroutine will return to, if the last instruction was `jsb`.
    pub return_line: Option<usize>,
    /// The breakpoint lines, ascending.
    pub breakpoints: Vec<usize>,
    /// The most recently accessed data memory address.
    pub data_access_addr: Option<u8>,
    /// The number of steps taken since setup.
    pub steps: u64,
    /// The exception recorded since the last status (read-once).
    pub exception: Option<ExceptionInfo>,
}
