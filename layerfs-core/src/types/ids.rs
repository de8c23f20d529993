use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;

/// Inode number, virtual or on a branch.
pub type Ino = u64;

/// Identity tag of a branch, stable for the lifetime of the branch even when
/// its position in the branch table changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BranchId(u32);

impl BranchId {
    /// Sentinel carried by slots that have never held a branch inode.
    pub const UNSET: Self = Self(u32::MAX);

    /// Creates a branch id. `u32::MAX` is reserved for [`BranchId::UNSET`].
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw id.
    pub const fn id(&self) -> u32 {
        self.0
    }

    /// Returns true for the unset sentinel.
    pub const fn is_unset(&self) -> bool {
        self.0 == u32::MAX
    }
}

impl Default for BranchId {
    fn default() -> Self {
        Self::UNSET
    }
}

impl fmt::Display for BranchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unset() {
            write!(f, "unset")
        } else {
            write!(f, "br{}", self.0)
        }
    }
}

/// Inclusive range of branch indices `[start, end]` holding branch inodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchRange {
    pub start: usize,
    pub end: usize,
}

impl BranchRange {
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end, "bstart {} > bend {}", start, end);
        Self { start, end }
    }

    /// Range covering exactly one branch.
    pub fn single(bindex: usize) -> Self {
        Self { start: bindex, end: bindex }
    }

    pub fn contains(&self, bindex: usize) -> bool {
        self.start <= bindex && bindex <= self.end
    }

    pub fn indices(&self) -> RangeInclusive<usize> {
        self.start..=self.end
    }
}

impl fmt::Display for BranchRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_branch_id_sentinel() {
        assert!(BranchId::default().is_unset());
        assert!(!BranchId::new(0).is_unset());
        assert_eq!(BranchId::new(7).to_string(), "br7");
        assert_eq!(BranchId::UNSET.to_string(), "unset");
    }

    #[test]
    fn test_branch_range() {
        let range = BranchRange::new(1, 3);
        assert!(range.contains(1));
        assert!(range.contains(3));
        assert!(!range.contains(0));
        assert!(!range.contains(4));
        assert_eq!(range.indices().collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(BranchRange::single(2), BranchRange::new(2, 2));
        assert_eq!(range.to_string(), "[1, 3]");
    }
}
