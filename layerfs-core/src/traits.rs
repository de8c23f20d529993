//! Interfaces of the collaborators the shadow layer is built on.
//!
//! The shadow layer never implements branch filesystems, the directory entry
//! cache, the index store or change notification itself. It talks to them
//! through the traits below; in-memory implementations live in
//! [`crate::branch`], [`crate::inode`], [`crate::xino`] and [`crate::hnotify`].

use std::fmt;
use std::sync::Arc;

use crate::error::AdvisoryError;
use crate::types::{BranchId, Ino};

/// An inode living on one of the branch filesystems.
///
/// The branch filesystem keeps its own reference in its inode cache; a shadow
/// slot holds one more counted reference through [`RealInodeRef`].
pub trait RealInode: Send + Sync + fmt::Debug {
    /// Inode number on the branch.
    fn ino(&self) -> Ino;

    /// Hard link count. Zero means deleted but still referenced.
    fn nlink(&self) -> u32;

    /// Inode generation as reported by the branch filesystem.
    fn generation(&self) -> u32;

    /// Whether the inode is a directory.
    fn is_dir(&self) -> bool;
}

/// Counted reference to a branch inode. Dropping it releases the reference.
pub type RealInodeRef = Arc<dyn RealInode>;

/// Number of counted references currently held on a branch inode.
pub fn refcount(h_inode: &RealInodeRef) -> usize {
    Arc::strong_count(h_inode)
}

/// A whiteout directory entry on a branch, masking the same name below it.
pub trait WhiteoutEntry: Send + Sync + fmt::Debug {
    /// Name of the whiteout entry on its branch.
    fn name(&self) -> &str;
}

/// Counted reference to a whiteout entry.
pub type WhiteoutRef = Arc<dyn WhiteoutEntry>;

/// Ordered table of the branches composing the union.
pub trait BranchTable: Send + Sync {
    /// Number of branches.
    fn count(&self) -> usize;

    /// Identity tag of the branch at `bindex`, if such a branch exists.
    fn identity_of(&self, bindex: usize) -> Option<BranchId>;

    /// Current position of the branch carrying `id`, if it is still mounted.
    fn index_of(&self, id: BranchId) -> Option<usize>;

    /// Whether change notification may be used on the branch at `bindex`.
    fn supports_notify(&self, bindex: usize) -> bool;
}

/// External index of branch inode numbers to virtual inode numbers.
pub trait XinoStore: Send + Sync {
    /// Records that inode `h_ino` on branch `br_id` is shown as `ino`.
    fn write(&self, br_id: BranchId, h_ino: Ino, ino: Ino) -> Result<(), AdvisoryError>;

    /// Drops what the store keeps for virtual inode `ino`.
    ///
    /// `unlinked` tells an eviction caused by deletion apart from a plain
    /// cache eviction.
    fn purge(&self, ino: Ino, unlinked: bool) -> Result<(), AdvisoryError>;
}

/// Opaque id of a change-notification watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchId(pub u64);

/// Change-notification subsystem.
pub trait Notifier: Send + Sync {
    /// Starts watching `h_inode` on behalf of virtual inode `ino`.
    fn register(&self, ino: Ino, h_inode: &RealInodeRef) -> Result<WatchId, AdvisoryError>;

    /// Stops a watch returned by [`Notifier::register`].
    fn unregister(&self, watch: WatchId);
}
