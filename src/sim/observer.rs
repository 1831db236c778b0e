//! Module handles memory access observers,
//! which store which accesses occur at a given memory address.
//!
//! The interpreter holds an [`AccessObserver`] (see [`Interpreter::observer`]),
//! which is cleared before every executed statement. After a step, it lists
//! every address the statement touched, which debuggers can use to highlight changes.
//!
//! [`Interpreter::observer`]: crate::sim::Interpreter::observer

use std::collections::BTreeMap;

/// The set of accesses which have occurred at an address.
///
/// ## Example
///
/// ```
/// # use mima::sim::observer::AccessSet;
///
/// let accesses = AccessSet::READ;
/// assert!(accesses.accessed());
/// assert!(accesses.read());
/// assert!(!accesses.written());
/// assert!(!accesses.modified());
/// ```
#[derive(Default, PartialEq, Eq, Clone, Copy)]
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
    /// True if a write has occurred (the value may be unchanged).
    pub fn written(&self) -> bool {
        self.0 & Self::WRITTEN.0 != 0
    }
    /// True if a write changed the value.
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
        f.debug_struct("AccessSet")
            .field("read", &self.read())
            .field("written", &self.written())
            .field("modified", &self.modified())
            .finish()
    }
}

/// Tracks accesses in memory and the registers.
#[derive(Debug, Default, Clone)]
pub struct AccessObserver {
    mem: BTreeMap<i64, AccessSet>,
    accumulator: AccessSet,
    stack_pointer: AccessSet
}
impl AccessObserver {
    /// Creates a new access observer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears all accesses.
    pub fn clear(&mut self) {
        std::mem::take(self);
    }

    /// Gets the access set for the given address.
    pub fn get_mem_accesses(&self, addr: i64) -> AccessSet {
        self.mem.get(&addr).copied().unwrap_or_default()
    }
    /// Adds new flags to the access set for the given address.
    pub fn update_mem_accesses(&mut self, addr: i64, set: AccessSet) {
        *self.mem.entry(addr).or_default() |= set;
    }
    /// Iterates over every accessed address, in address order.
    pub fn mem_accesses(&self) -> impl Iterator<Item=(i64, AccessSet)> + '_ {
        self.mem.iter().map(|(&addr, &set)| (addr, set))
    }

    /// Gets the access set for the accumulator.
    pub fn accumulator(&self) -> AccessSet {
        self.accumulator
    }
    /// Adds new flags to the access set for the accumulator.
    pub fn update_accumulator(&mut self, set: AccessSet) {
        self.accumulator |= set;
    }

    /// Gets the access set for the stack pointer.
    pub fn stack_pointer(&self) -> AccessSet {
        self.stack_pointer
    }
    /// Adds new flags to the access set for the stack pointer.
    pub fn update_stack_pointer(&mut self, set: AccessSet) {
        self.stack_pointer |= set;
    }
}

#[cfg(test)]
mod tests {
    use super::{AccessObserver, AccessSet};

    #[test]
    fn test_accumulates_until_clear() {
        let mut obs = AccessObserver::new();
        obs.update_mem_accesses(-1, AccessSet::READ);
        obs.update_mem_accesses(-1, AccessSet::WRITTEN);
        obs.update_accumulator(AccessSet::WRITTEN | AccessSet::MODIFIED);

        let set = obs.get_mem_accesses(-1);
        assert!(set.read() && set.written() && !set.modified());
        assert!(obs.accumulator().modified());
        assert!(!obs.get_mem_accesses(0).accessed());

        obs.clear();
        assert_eq!(obs.mem_accesses().count(), 0);
        assert!(!obs.accumulator().accessed());
    }
}
