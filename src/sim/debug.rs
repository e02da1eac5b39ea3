//! Utilities to debug simulation.
//!
//! The key type here is [`Breakpoints`], the set of source lines
//! which cause the [`Simulator`] to break when execution reaches them.
//!
//! [`Simulator`]: super::Simulator

use std::collections::BTreeSet;

/// A set of breakpoints, keyed by (0-indexed) source line.
///
/// # Example
/// ```
/// use gumnut_sim::sim::debug::Breakpoints;
///
/// let mut bps = Breakpoints::default();
/// assert!(bps.toggle(3));
/// assert!(bps.contains(3));
/// assert!(!bps.toggle(3));
/// assert!(bps.is_empty());
/// ```
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Breakpoints(BTreeSet<usize>);
impl Breakpoints {
    /// Adds the line if absent, removes it if present.
    ///
    /// Returns whether the line is now a breakpoint.
    pub fn toggle(&mut self, line: usize) -> bool {
        match self.0.remove(&line) {
            true  => false,
            false => self.0.insert(line),
        }
    }

    /// Whether the line is a breakpoint.
    pub fn contains(&self, line: usize) -> bool {
        self.0.contains(&line)
    }

    /// Iterates over the breakpoint lines in ascending order.
    pub fn iter(&self) -> impl Iterator<Item=usize> + '_ {
        self.0.iter().copied()
    }

    /// Whether there are no breakpoints.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
