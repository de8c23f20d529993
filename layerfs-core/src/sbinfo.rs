//! Per-mount state shared by every virtual inode of a union.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

use crate::hnotify::MemoryNotifier;
use crate::stats::ShadowStats;
use crate::traits::{BranchTable, Notifier, XinoStore};
use crate::types::{MountOptions, SlotFlags};
use crate::xino::MemoryXino;

/// Mount-wide context of the shadow layer: options, branch table, index
/// store, notifier, the filesystem generation and the superblock lock.
pub struct SuperBlock {
    options: MountOptions,
    branches: Arc<dyn BranchTable>,
    xino: Arc<dyn XinoStore>,
    notifier: Arc<dyn Notifier>,
    generation: AtomicU64,
    si_rwsem: RwLock<()>,
    stats: ShadowStats,
}

/// A hold on the superblock lock, shared or exclusive.
pub struct SiGuard<'a> {
    _held: SiHeld<'a>,
}

// The guards are only held for their drop.
#[allow(dead_code)]
enum SiHeld<'a> {
    Read(RwLockReadGuard<'a, ()>),
    Write(RwLockWriteGuard<'a, ()>),
}

impl SiGuard<'_> {
    pub fn is_write(&self) -> bool {
        matches!(self._held, SiHeld::Write(_))
    }
}

impl SuperBlock {
    /// Creates a superblock over `branches` with in-memory index store and
    /// notifier.
    pub fn new(options: MountOptions, branches: Arc<dyn BranchTable>) -> Self {
        Self {
            options,
            branches,
            xino: Arc::new(MemoryXino::new()),
            notifier: Arc::new(MemoryNotifier::new()),
            generation: AtomicU64::new(1),
            si_rwsem: RwLock::new(()),
            stats: ShadowStats::new(),
        }
    }

    /// Replaces the index store.
    pub fn with_xino(mut self, xino: Arc<dyn XinoStore>) -> Self {
        self.xino = xino;
        self
    }

    /// Replaces the change-notification subsystem.
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn options(&self) -> &MountOptions {
        &self.options
    }

    pub fn branches(&self) -> &dyn BranchTable {
        self.branches.as_ref()
    }

    pub fn xino(&self) -> &dyn XinoStore {
        self.xino.as_ref()
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    pub fn stats(&self) -> &ShadowStats {
        &self.stats
    }

    /// Number of branches, never less than one.
    pub fn nbr(&self) -> usize {
        self.branches.count().max(1)
    }

    /// Current filesystem generation.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Starts a new generation after a structural change such as adding or
    /// removing a branch. Returns the new generation.
    pub fn bump_generation(&self) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(generation, "superblock generation bumped");
        generation
    }

    /// Capability flags for installing a branch inode under a virtual inode.
    pub fn hi_flags(&self, is_dir: bool) -> SlotFlags {
        self.options.slot_flags(is_dir)
    }

    /// Takes the superblock lock shared. A thread already holding it shared
    /// may take it again without queueing behind a waiting writer.
    pub fn si_read(&self) -> SiGuard<'_> {
        SiGuard {
            _held: SiHeld::Read(self.si_rwsem.read_recursive()),
        }
    }

    /// Takes the superblock lock exclusively.
    pub fn si_write(&self) -> SiGuard<'_> {
        SiGuard {
            _held: SiHeld::Write(self.si_rwsem.write()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::branch::{BranchList, BranchPerm};
    use crate::types::Udba;

    fn sb(options: MountOptions) -> SuperBlock {
        let branches = BranchList::with_branches([("/rw", BranchPerm::Rw)]);
        SuperBlock::new(options, Arc::new(branches))
    }

    #[test]
    fn test_generation_bump() {
        let sb = sb(MountOptions::default());
        assert_eq!(sb.generation(), 1);
        assert_eq!(sb.bump_generation(), 2);
        assert_eq!(sb.generation(), 2);
    }

    #[test]
    fn test_hi_flags_follow_options() {
        let sb = sb(MountOptions::builder().udba(Udba::Notify).build());
        assert_eq!(sb.hi_flags(true), SlotFlags::XINO | SlotFlags::HNOTIFY);
        assert_eq!(sb.hi_flags(false), SlotFlags::XINO);
    }

    #[test]
    fn test_nbr_never_zero() {
        let sb = SuperBlock::new(MountOptions::default(), Arc::new(BranchList::new()));
        assert_eq!(sb.nbr(), 1);
    }

    #[test]
    fn test_si_read_is_reentrant() {
        let sb = sb(MountOptions::default());
        let outer = sb.si_read();
        let inner = sb.si_read();
        assert!(!outer.is_write());
        drop(inner);
        drop(outer);

        let write = sb.si_write();
        assert!(write.is_write());
    }
}
