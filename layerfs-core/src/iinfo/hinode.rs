//! One shadow slot: what a virtual inode holds on a single branch.

use crate::hnotify::NotifyHandle;
use crate::traits::{RealInodeRef, WatchId, WhiteoutRef};
use crate::types::BranchId;

/// Branch inode, whiteout, watch and branch identity held for one branch
/// position of a virtual inode.
#[derive(Debug, Default)]
pub struct HInode {
    pub(crate) inode: Option<RealInodeRef>,
    pub(crate) whiteout: Option<WhiteoutRef>,
    pub(crate) id: BranchId,
    pub(crate) notify: Option<NotifyHandle>,
}

impl HInode {
    pub fn inode(&self) -> Option<&RealInodeRef> {
        self.inode.as_ref()
    }

    pub fn whiteout(&self) -> Option<&WhiteoutRef> {
        self.whiteout.as_ref()
    }

    /// Identity of the branch the inode was installed from.
    pub fn id(&self) -> BranchId {
        self.id
    }

    pub fn watch(&self) -> Option<WatchId> {
        self.notify.as_ref().map(NotifyHandle::watch)
    }

    pub fn is_populated(&self) -> bool {
        self.inode.is_some()
    }

    /// Releases everything the slot holds: the watch first, then the
    /// whiteout, then the branch inode reference.
    pub(crate) fn put(&mut self) {
        drop(self.notify.take());
        drop(self.whiteout.take());
        drop(self.inode.take());
        self.id = BranchId::UNSET;
    }
}
