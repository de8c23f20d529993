use std::fmt;

/// Per-install capability flags gating the side effects of
/// [`IInfoWrite::set_h_inode`](crate::iinfo::IInfoWrite::set_h_inode).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotFlags(u32);

impl SlotFlags {
    /// Persist the branch inode -> virtual inode mapping in the index store
    pub const XINO: Self = Self(1 << 0);
    /// Register a change-notification watch on the branch inode
    pub const HNOTIFY: Self = Self(1 << 1);

    /// Creates an empty set of flags.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Creates a set containing all flags.
    pub const fn all() -> Self {
        Self(Self::XINO.0 | Self::HNOTIFY.0)
    }

    /// Returns the raw value of the flags.
    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// Creates flags from raw bits, truncating invalid bits.
    pub const fn from_bits_truncate(bits: u32) -> Self {
        Self(bits & Self::all().0)
    }

    /// Returns true if no flags are set.
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Returns true if all flags in `other` are set.
    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Inserts the specified flags.
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Removes the specified flags.
    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    /// Returns the union of the flags.
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

impl Default for SlotFlags {
    fn default() -> Self {
        Self::empty()
    }
}

impl std::ops::BitOr for SlotFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl std::ops::BitOrAssign for SlotFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.insert(rhs);
    }
}

impl fmt::Display for SlotFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        if self.contains(Self::XINO) {
            names.push("xino");
        }
        if self.contains(Self::HNOTIFY) {
            names.push("hnotify");
        }
        if names.is_empty() {
            write!(f, "none")
        } else {
            write!(f, "{}", names.join("|"))
        }
    }
}
