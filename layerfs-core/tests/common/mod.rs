#![allow(dead_code, missing_docs)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use layerfs_core::branch::{BranchList, BranchPerm};
use layerfs_core::error::AdvisoryError;
use layerfs_core::sbinfo::SuperBlock;
use layerfs_core::traits::{Notifier, RealInodeRef, WatchId, XinoStore};
use layerfs_core::types::{BranchId, Ino, MountOptions, Udba};
use layerfs_core::xino::MemoryXino;

/// Branch list of `n` read-write branches.
pub fn rw_branches(n: usize) -> Arc<BranchList> {
    Arc::new(BranchList::with_branches(
        (0..n).map(|i| (format!("/branch{}", i), BranchPerm::Rw)),
    ))
}

pub fn superblock(n: usize) -> Arc<SuperBlock> {
    Arc::new(SuperBlock::new(MountOptions::default(), rw_branches(n)))
}

pub fn superblock_with_xino(n: usize, xino: Arc<MemoryXino>) -> Arc<SuperBlock> {
    Arc::new(SuperBlock::new(MountOptions::default(), rw_branches(n)).with_xino(xino))
}

/// Superblock whose index store and notifier reject every call.
pub fn failing_superblock(n: usize) -> (Arc<SuperBlock>, Arc<FailingXino>, Arc<FailingNotifier>) {
    let xino = Arc::new(FailingXino::default());
    let notifier = Arc::new(FailingNotifier::default());
    let options = MountOptions::builder().udba(Udba::Notify).build();
    let sb = SuperBlock::new(options, rw_branches(n))
        .with_xino(xino.clone())
        .with_notifier(notifier.clone());
    (Arc::new(sb), xino, notifier)
}

#[derive(Debug, Default)]
pub struct FailingXino {
    pub writes: AtomicUsize,
    pub purges: AtomicUsize,
}

impl XinoStore for FailingXino {
    fn write(&self, _br_id: BranchId, h_ino: Ino, _ino: Ino) -> Result<(), AdvisoryError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        Err(AdvisoryError::XinoWrite {
            h_ino,
            reason: "no space left on device".to_string(),
        })
    }

    fn purge(&self, ino: Ino, _unlinked: bool) -> Result<(), AdvisoryError> {
        self.purges.fetch_add(1, Ordering::SeqCst);
        Err(AdvisoryError::XinoPurge {
            ino,
            reason: "read-only file system".to_string(),
        })
    }
}

#[derive(Debug, Default)]
pub struct FailingNotifier {
    pub attempts: AtomicUsize,
    pub unregistered: AtomicUsize,
}

impl Notifier for FailingNotifier {
    fn register(&self, ino: Ino, _h_inode: &RealInodeRef) -> Result<WatchId, AdvisoryError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(AdvisoryError::NotifyRegister {
            ino,
            reason: "too many watches".to_string(),
        })
    }

    fn unregister(&self, _watch: WatchId) {
        self.unregistered.fetch_add(1, Ordering::SeqCst);
    }
}
