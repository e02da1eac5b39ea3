//! Module handles memory access observers,
//! which store which accesses occur at a given data memory or I/O location.
//!
//! You would typically access an observer via the [`Core::observer`] field.
//! This [`AccessObserver`] can be used to read or update accesses via its [`get_accesses`]
//! and [`update_accesses`] methods.
//!
//! [`Core::observer`]: crate::sim::core::Core::observer
//! [`get_accesses`]: AccessObserver::get_accesses
//! [`update_accesses`]: AccessObserver::update_accesses

use std::collections::BTreeMap;

/// The set of accesses which have occurred at this location.
///
/// ## Example
///
/// ```
/// # use gumnut_sim::sim::observer::AccessSet;
///
/// let accesses = AccessSet::READ;
/// assert!(accesses.accessed());
/// assert!(accesses.read());
/// assert!(!accesses.written());
/// assert!(!accesses.modified());
/// ```
#[derive(Default, Clone, Copy, PartialEq, Eq)]
pub struct AccessSet(u8);
impl AccessSet {
    /// Set with only the read flag enabled.
    pub const READ: Self = Self(1 << 0);
    /// Set with only the write flag enabled.
    pub const WRITTEN: Self = Self(1 << 1);
    /// Set with only the modify flag enabled.
    pub const MODIFIED: Self = Self(1 << 2);

    /// True if any access has occurred.
    pub fn accessed(&self) -> bool {
        self.0 != 0
    }

    /// True if a read has occurred.
    pub fn read(&self) -> bool {
        self.0 & Self::READ.0 != 0
    }
    /// True if a write has occurred (does not necessarily have to change data).
    pub fn written(&self) -> bool {
        self.0 & Self::WRITTEN.0 != 0
    }
    /// True if a write has occurred (data must change).
    pub fn modified(&self) -> bool {
        self.0 & Self::MODIFIED.0 != 0
    }
}
impl std::ops::BitOr for AccessSet {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}
impl std::ops::BitOrAssign for AccessSet {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = *self | rhs;
    }
}
impl std::fmt::Debug for AccessSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessFlags")
            .field("accessed", &self.accessed())
            .field("read", &self.read())
            .field("written", &self.written())
            .field("modified", &self.modified())
            .finish()
    }
}

/// The address space an access occurred in.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
pub enum Space {
    /// Data memory (`ldm`, `stm`).
    Data,
    /// The I/O controller registers (`inp`, `out`).
    Io,
}

/// A struct that tracks accesses to data memory and the I/O registers.
#[derive(Debug, Default, Clone)]
pub struct AccessObserver {
    mem: BTreeMap<(Space, u8), AccessSet>,
    last_data: Option<u8>,
}
impl AccessObserver {
    /// Creates a new access observer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears all accesses (the last data access is kept).
    pub fn clear(&mut self) {
        self.mem.clear();
    }

    /// Gets the access set for the given location.
    pub fn get_accesses(&self, space: Space, addr: u8) -> AccessSet {
        self.mem.get(&(space, addr)).copied().unwrap_or_default()
    }

    /// Adds new flags to the access set for the given location.
    pub fn update_accesses(&mut self, space: Space, addr: u8, set: AccessSet) {
        *self.mem.entry((space, addr)).or_default() |= set;
        if space == Space::Data {
            self.last_data.replace(addr);
        }
    }

    /// The address of the most recent data memory access, if any has occurred.
    pub fn last_data_access(&self) -> Option<u8> {
        self.last_data
    }

    /// Takes all accesses which have occurred since last clear,
    /// as well as clearing accesses.
    ///
    /// This iterator is sorted by space, then address.
    pub fn take_accesses(&mut self) -> impl Iterator<Item=(Space, u8, AccessSet)> {
        std::mem::take(&mut self.mem)
            .into_iter()
            .map(|((space, addr), set)| (space, addr, set))
    }
}
