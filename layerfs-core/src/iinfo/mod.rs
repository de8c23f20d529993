//! Per-virtual-inode shadow information.
//!
//! A virtual inode of the union is backed by at most one branch inode per
//! branch. [`InodeInfo`] owns those branch inodes in an array of [`HInode`]
//! slots indexed by branch position, tracks the range of branches actually
//! holding one, and mirrors the filesystem generation to detect stale state.
//!
//! All access to the slots goes through [`IInfoRead`] and [`IInfoWrite`],
//! obtained from [`InodeInfo::read`] and [`InodeInfo::write`].

mod guard;
mod hinode;

pub use guard::{BranchIdentity, IInfo, IInfoRead, IInfoWrite};
pub use hinode::HInode;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, error, trace};

use crate::error::{LayerError, Result};
use crate::sbinfo::{SiGuard, SuperBlock};
use crate::stats::ShadowStats;
use crate::types::Ino;

/// Shadow information of one virtual inode.
pub struct InodeInfo {
    ino: Ino,
    sb: Arc<SuperBlock>,
    /// Mirror of the filesystem generation this inode was last validated at
    generation: AtomicU64,
    rwsem: RwLock<IInfo>,
}

impl InodeInfo {
    /// Creates the shadow information of virtual inode `ino`, with one empty
    /// slot per branch of `sb`.
    pub fn new(ino: Ino, sb: &Arc<SuperBlock>) -> Result<Self> {
        Self::with_branch_count(ino, sb, sb.nbr())
    }

    /// Creates the shadow information with `nbr` empty slots (at least one).
    ///
    /// Fails with [`LayerError::OutOfMemory`] when the slots cannot be
    /// allocated; nothing is left to tear down in that case.
    pub fn with_branch_count(ino: Ino, sb: &Arc<SuperBlock>, nbr: usize) -> Result<Self> {
        let nbr = nbr.max(1);
        let mut hinodes = Vec::new();
        hinodes
            .try_reserve_exact(nbr)
            .map_err(LayerError::oom(nbr))?;
        hinodes.resize_with(nbr, HInode::default);

        trace!(ino, nbr, "iinfo init");
        Ok(Self {
            ino,
            sb: Arc::clone(sb),
            generation: AtomicU64::new(sb.generation()),
            rwsem: RwLock::new(IInfo::new(hinodes)),
        })
    }

    pub fn ino(&self) -> Ino {
        self.ino
    }

    pub fn sb(&self) -> &Arc<SuperBlock> {
        &self.sb
    }

    /// Filesystem generation this inode was last validated at.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Records that the inode is valid as of filesystem generation `current`.
    pub fn update_generation(&self, current: u64) {
        self.generation.store(current, Ordering::Release);
    }

    /// Whether cached state predates filesystem generation `current`.
    pub fn is_stale(&self, current: u64) -> bool {
        self.generation() != current
    }

    /// Takes the inode lock shared.
    pub fn read(&self) -> IInfoRead<'_> {
        IInfoRead::new(self, self.rwsem.read())
    }

    /// Takes the inode lock exclusively.
    pub fn write(&self) -> IInfoWrite<'_> {
        IInfoWrite::new(self, self.rwsem.write())
    }

    /// Tears the shadow information down when its virtual inode is destroyed.
    ///
    /// Takes the superblock lock shared for the index store purge; use
    /// [`InodeInfo::finalize_locked`] from paths already holding it
    /// exclusively.
    pub fn finalize(self, unlinked: bool) {
        let sb = Arc::clone(&self.sb);
        let si = sb.si_read();
        self.finalize_locked(&si, unlinked);
    }

    /// [`InodeInfo::finalize`] for callers holding the superblock lock.
    pub fn finalize_locked(self, _si: &SiGuard<'_>, unlinked: bool) {
        let InodeInfo { ino, sb, rwsem, .. } = self;

        if let Err(err) = sb.xino().purge(ino, unlinked) {
            error!(ino, unlinked, error = %err, "xino purge failed");
            ShadowStats::bump(&sb.stats().xino_failures);
        }

        let mut ii = rwsem.into_inner();
        drop(ii.vdir.take());

        if let Some(range) = ii.range {
            for hinode in ii.hinodes.iter_mut().take(range.end + 1).skip(range.start) {
                if hinode.is_populated() {
                    hinode.put();
                    ShadowStats::bump(&sb.stats().releases);
                }
            }
        }
        drop(ii);

        ShadowStats::bump(&sb.stats().finalized);
        debug!(ino, unlinked, "iinfo finalized");
    }
}
