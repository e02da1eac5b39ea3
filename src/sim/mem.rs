//! Memory handling for the Gumnut simulator.
//!
//! This module consists of:
//! - [`InstrMem`]: The instruction memory.
//! - [`ByteMem`]: A byte-addressed memory (used for both data memory and the I/O registers).
//! - [`RegFile`]: The register file.
//! - [`ReturnStack`]: The bounded return-address stack.
//!
//! Every capacity here is fixed for the lifetime of a core.

use crate::ast::Reg;

use super::core::CoreErr;

/// The number of words in instruction memory.
pub const INSTR_MEM_SIZE: usize = 4096;
/// The number of bytes in data memory.
pub const DATA_MEM_SIZE: usize = 256;
/// The number of addresses the return-address stack can hold.
pub const RAS_CAPACITY: usize = 8;

/// The instruction memory, holding [`INSTR_MEM_SIZE`] instruction words.
///
/// # Example
/// ```
/// use gumnut_sim::sim::mem::InstrMem;
///
/// let mut imem = InstrMem::new();
/// imem.upload(&[0x3F500, 0x00A12]).unwrap();
/// assert_eq!(imem.get(1), Some(0x00A12));
/// assert_eq!(imem.get(2), Some(0));
/// assert_eq!(imem.get(4096), None);
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct InstrMem(Box<[u32; INSTR_MEM_SIZE]>);
impl InstrMem {
    /// Creates a zeroed instruction memory.
    pub fn new() -> Self {
        Self(
            vec![0; INSTR_MEM_SIZE]
                .into_boxed_slice()
                .try_into()
                .unwrap_or_else(|_| unreachable!("vec should have had {INSTR_MEM_SIZE} elements"))
        )
    }

    /// Reads the word at the given address, if it is within the memory.
    pub fn get(&self, addr: u16) -> Option<u32> {
        self.0.get(usize::from(addr)).copied()
    }

    /// Replaces the contents of the memory with the given words.
    ///
    /// Addresses past the end of `words` are zeroed.
    /// This fails if there are more words than the memory can hold.
    pub fn upload(&mut self, words: &[u32]) -> Result<(), CoreErr> {
        if words.len() > INSTR_MEM_SIZE {
            return Err(CoreErr::InstrMemSizeExceeded(words.len()));
        }
        let (head, tail) = self.0.split_at_mut(words.len());
        head.copy_from_slice(words);
        tail.fill(0);
        Ok(())
    }

    /// The memory's contents.
    pub fn as_slice(&self) -> &[u32] {
        &self.0[..]
    }
}
impl Default for InstrMem {
    fn default() -> Self {
        Self::new()
    }
}
impl std::fmt::Debug for InstrMem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // only print populated words
        f.debug_map()
            .entries(self.0.iter().enumerate().filter(|(_, &w)| w != 0))
            .finish()
    }
}

/// A byte-addressed memory of 256 bytes.
///
/// This is used for both the data memory and the I/O controller registers,
/// which are distinct storage despite sharing an address width.
///
/// This struct can be indexed with a `u8` address.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ByteMem([u8; DATA_MEM_SIZE]);
impl ByteMem {
    /// Creates a zeroed memory.
    pub fn new() -> Self {
        Self([0; DATA_MEM_SIZE])
    }

    /// Replaces the contents of the memory with the given bytes.
    ///
    /// Addresses past the end of `bytes` are zeroed.
    /// This fails if there are more bytes than the memory can hold.
    pub fn upload(&mut self, bytes: &[u8]) -> Result<(), CoreErr> {
        if bytes.len() > DATA_MEM_SIZE {
            return Err(CoreErr::DataMemSizeExceeded(bytes.len()));
        }
        let (head, tail) = self.0.split_at_mut(bytes.len());
        head.copy_from_slice(bytes);
        tail.fill(0);
        Ok(())
    }

    /// The memory's contents.
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}
impl Default for ByteMem {
    fn default() -> Self {
        Self::new()
    }
}
impl std::ops::Index<u8> for ByteMem {
    type Output = u8;

    fn index(&self, index: u8) -> &Self::Output {
        &self.0[usize::from(index)]
    }
}
impl std::ops::IndexMut<u8> for ByteMem {
    fn index_mut(&mut self, index: u8) -> &mut Self::Output {
        &mut self.0[usize::from(index)]
    }
}

/// The register file.
///
/// This struct can be indexed with a [`Reg`]
/// (which can be constructed using the [`crate::ast::reg_consts`] module or via [`Reg::try_from`]).
///
/// # Example
///
/// ```
/// use gumnut_sim::sim::mem::RegFile;
/// use gumnut_sim::ast::reg_consts::R0;
///
/// let mut reg = RegFile::new();
/// reg[R0] = 11;
/// assert_eq!(reg[R0], 11);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegFile([u8; 8]);
impl RegFile {
    /// Creates a zeroed register file.
    pub fn new() -> Self {
        Self([0; 8])
    }

    /// The values of r0-r7.
    pub fn values(&self) -> [u8; 8] {
        self.0
    }
}
impl std::ops::Index<Reg> for RegFile {
    type Output = u8;

    fn index(&self, index: Reg) -> &Self::Output {
        &self.0[usize::from(index)]
    }
}
impl std::ops::IndexMut<Reg> for RegFile {
    fn index_mut(&mut self, index: Reg) -> &mut Self::Output {
        &mut self.0[usize::from(index)]
    }
}

/// The return-address stack, holding up to [`RAS_CAPACITY`] addresses.
///
/// # Example
/// ```
/// use gumnut_sim::sim::mem::ReturnStack;
///
/// let mut ras = ReturnStack::new();
/// ras.push(0x80).unwrap();
/// assert_eq!(ras.len(), 1);
/// assert_eq!(ras.pop(), Ok(0x80));
/// assert!(ras.pop().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReturnStack {
    slots: [u16; RAS_CAPACITY],
    len: usize,
}
impl ReturnStack {
    /// Creates an empty stack.
    pub fn new() -> Self {
        Self { slots: [0; RAS_CAPACITY], len: 0 }
    }

    /// Pushes a return address.
    ///
    /// If the stack is full, the stack is left unchanged and this errors
    /// with the address which could not be pushed.
    pub fn push(&mut self, addr: u16) -> Result<(), CoreErr> {
        let slot = self.slots.get_mut(self.len)
            .ok_or(CoreErr::ReturnStackOverflow(addr))?;
        *slot = addr;
        self.len += 1;
        Ok(())
    }

    /// Pops the most recently pushed return address.
    pub fn pop(&mut self) -> Result<u16, CoreErr> {
        let top = self.len.checked_sub(1).ok_or(CoreErr::EmptyReturnStack)?;
        self.len = top;
        Ok(self.slots[top])
    }

    /// The number of addresses on the stack (the stack pointer).
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the stack holds no addresses.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether another push would overflow.
    pub fn is_full(&self) -> bool {
        self.len == RAS_CAPACITY
    }

    /// The raw stack slots.
    ///
    /// Slots at or above [`ReturnStack::len`] hold stale values from earlier pushes.
    pub fn slots(&self) -> [u16; RAS_CAPACITY] {
        self.slots
    }
}
