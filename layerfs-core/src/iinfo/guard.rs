//! Lock guards of [`InodeInfo`] and the operations they unlock.

use std::ops::Deref;

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, error, trace, warn};

use super::hinode::HInode;
use super::InodeInfo;
use crate::error::{LayerError, Result};
use crate::hnotify::NotifyHandle;
use crate::stats::ShadowStats;
use crate::traits::{refcount, BranchTable, RealInodeRef, WhiteoutRef};
use crate::types::{BranchId, BranchRange, SlotFlags};
use crate::vdir::VDir;

/// How the branch identity recorded in a slot relates to the branch table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchIdentity {
    /// The slot holds no branch inode.
    Unset,
    /// The branch at the slot's position is the one the inode came from.
    Match,
    /// The branch is still mounted, but at another position.
    Moved { recorded: BranchId, now_at: usize },
    /// The branch is no longer part of the union.
    Gone { recorded: BranchId },
}

/// State protected by the inode lock.
#[derive(Debug)]
pub struct IInfo {
    pub(super) hinodes: Vec<HInode>,
    pub(super) range: Option<BranchRange>,
    /// Generation copied from the top branch inode
    pub(super) inode_generation: u32,
    pub(super) vdir: Option<VDir>,
}

impl IInfo {
    pub(super) fn new(hinodes: Vec<HInode>) -> Self {
        Self {
            hinodes,
            range: None,
            inode_generation: 0,
            vdir: None,
        }
    }

    /// Number of slots.
    pub fn nbr(&self) -> usize {
        self.hinodes.len()
    }

    pub fn hinode(&self, bindex: usize) -> Option<&HInode> {
        debug_assert!(bindex < self.hinodes.len(), "bindex {} beyond {} slots", bindex, self.hinodes.len());
        self.hinodes.get(bindex)
    }

    /// Branch inode held at `bindex`.
    pub fn h_inode(&self, bindex: usize) -> Option<&RealInodeRef> {
        let h_inode = self.hinode(bindex).and_then(HInode::inode);
        debug_assert!(h_inode.map_or(true, |h| refcount(h) > 0));
        h_inode
    }

    pub fn whiteout(&self, bindex: usize) -> Option<&WhiteoutRef> {
        self.hinode(bindex).and_then(HInode::whiteout)
    }

    pub fn branch_id(&self, bindex: usize) -> BranchId {
        self.hinode(bindex).map(HInode::id).unwrap_or(BranchId::UNSET)
    }

    /// Branches holding a branch inode, `None` when there are none.
    pub fn range(&self) -> Option<BranchRange> {
        self.range
    }

    pub fn bstart(&self) -> Option<usize> {
        self.range.map(|r| r.start)
    }

    pub fn bend(&self) -> Option<usize> {
        self.range.map(|r| r.end)
    }

    /// Generation of the top branch inode, as last copied up.
    pub fn inode_generation(&self) -> u32 {
        self.inode_generation
    }

    pub fn vdir(&self) -> Option<&VDir> {
        self.vdir.as_ref()
    }

    /// Compares the branch identity recorded at `bindex` with `branches`.
    pub fn branch_identity(&self, bindex: usize, branches: &dyn BranchTable) -> BranchIdentity {
        let recorded = match self.hinode(bindex) {
            Some(hinode) if hinode.is_populated() => hinode.id(),
            _ => return BranchIdentity::Unset,
        };
        if recorded.is_unset() {
            return BranchIdentity::Unset;
        }
        if branches.identity_of(bindex) == Some(recorded) {
            return BranchIdentity::Match;
        }
        match branches.index_of(recorded) {
            Some(now_at) => BranchIdentity::Moved { recorded, now_at },
            None => BranchIdentity::Gone { recorded },
        }
    }

    /// Populated slots whose branch no longer sits at their position.
    ///
    /// Whether to evict them or keep serving them is the caller's decision.
    pub fn stale_slots(&self, branches: &dyn BranchTable) -> Vec<(usize, BranchIdentity)> {
        (0..self.hinodes.len())
            .filter(|&bindex| self.hinodes[bindex].is_populated())
            .map(|bindex| (bindex, self.branch_identity(bindex, branches)))
            .filter(|(_, identity)| !matches!(identity, BranchIdentity::Match | BranchIdentity::Unset))
            .collect()
    }

    /// Derives the range from the populated slots: first one going up from
    /// the top branch, last one going down from the bottom. Holes between
    /// the two are allowed.
    fn scan_range(&mut self) {
        self.range = self.hinodes.iter().position(HInode::is_populated).map(|start| {
            let end = self
                .hinodes
                .iter()
                .rposition(HInode::is_populated)
                .unwrap_or(start);
            BranchRange::new(start, end)
        });
    }
}

/// Shared hold on an inode's shadow information.
pub struct IInfoRead<'a> {
    info: &'a InodeInfo,
    ii: RwLockReadGuard<'a, IInfo>,
}

impl<'a> IInfoRead<'a> {
    pub(super) fn new(info: &'a InodeInfo, ii: RwLockReadGuard<'a, IInfo>) -> Self {
        Self { info, ii }
    }

    pub fn info(&self) -> &'a InodeInfo {
        self.info
    }
}

impl Deref for IInfoRead<'_> {
    type Target = IInfo;

    fn deref(&self) -> &IInfo {
        &self.ii
    }
}

/// Exclusive hold on an inode's shadow information.
pub struct IInfoWrite<'a> {
    info: &'a InodeInfo,
    ii: RwLockWriteGuard<'a, IInfo>,
}

impl Deref for IInfoWrite<'_> {
    type Target = IInfo;

    fn deref(&self) -> &IInfo {
        &self.ii
    }
}

impl<'a> IInfoWrite<'a> {
    pub(super) fn new(info: &'a InodeInfo, ii: RwLockWriteGuard<'a, IInfo>) -> Self {
        Self { info, ii }
    }

    pub fn info(&self) -> &'a InodeInfo {
        self.info
    }

    /// Turns the exclusive hold into a shared one without letting a writer in.
    pub fn downgrade(self) -> IInfoRead<'a> {
        IInfoRead::new(self.info, RwLockWriteGuard::downgrade(self.ii))
    }

    /// Installs `h_inode` as the branch inode at `bindex`, or empties the slot
    /// when `h_inode` is `None`.
    ///
    /// Whatever the slot held before is released first. The range is left
    /// alone; call [`IInfoWrite::update_brange`] once the set of populated
    /// slots has settled. Index store and watch failures are logged and
    /// otherwise ignored.
    pub fn set_h_inode(&mut self, bindex: usize, h_inode: Option<RealInodeRef>, flags: SlotFlags) {
        let info = self.info;
        let sb = info.sb();
        let ii = &mut *self.ii;
        let is_top = ii.range.map(|r| r.start) == Some(bindex);
        let nbr = ii.hinodes.len();

        let Some(hinode) = ii.hinodes.get_mut(bindex) else {
            debug_assert!(false, "bindex {} beyond {} slots", bindex, nbr);
            error!(ino = info.ino(), bindex, nbr, "set_h_inode beyond the shadow array");
            return;
        };

        if hinode.is_populated() {
            hinode.put();
            ShadowStats::bump(&sb.stats().releases);
        }

        let Some(h_inode) = h_inode else {
            trace!(ino = info.ino(), bindex, "slot cleared");
            return;
        };

        if is_top {
            ii.inode_generation = h_inode.generation();
        }

        hinode.id = match sb.branches().identity_of(bindex) {
            Some(id) => id,
            None => {
                warn!(ino = info.ino(), bindex, "no branch at this index, identity left unset");
                BranchId::UNSET
            }
        };

        if flags.contains(SlotFlags::XINO) {
            if let Err(err) = sb.xino().write(hinode.id, h_inode.ino(), info.ino()) {
                error!(ino = info.ino(), bindex, error = %err, "xino write failed");
                ShadowStats::bump(&sb.stats().xino_failures);
            }
        }

        if flags.contains(SlotFlags::HNOTIFY) && sb.branches().supports_notify(bindex) {
            match NotifyHandle::register(sb.notifier(), info.ino(), &h_inode) {
                Ok(handle) => hinode.notify = Some(handle),
                Err(err) => {
                    error!(ino = info.ino(), bindex, error = %err, "notify registration failed");
                    ShadowStats::bump(&sb.stats().notify_failures);
                }
            }
        }

        trace!(ino = info.ino(), bindex, h_ino = h_inode.ino(), br = %hinode.id, "slot set");
        debug_assert!(refcount(&h_inode) > 0);
        hinode.inode = Some(h_inode);
        ShadowStats::bump(&sb.stats().installs);
    }

    /// Records the whiteout masking lower branches at `bindex`.
    ///
    /// The slot must not carry a whiteout already.
    pub fn set_whiteout(&mut self, bindex: usize, whiteout: WhiteoutRef) {
        let ino = self.info.ino();
        let Some(hinode) = self.ii.hinodes.get_mut(bindex) else {
            debug_assert!(false, "bindex {} beyond the shadow array", bindex);
            error!(ino, bindex, "set_whiteout beyond the shadow array");
            return;
        };
        debug_assert!(hinode.whiteout.is_none(), "whiteout set twice on bindex {}", bindex);
        if hinode.whiteout.is_some() {
            error!(ino, bindex, "whiteout set twice, replacing");
        }
        hinode.whiteout = Some(whiteout);
    }

    /// Removes and returns the whiteout at `bindex`.
    pub fn clear_whiteout(&mut self, bindex: usize) -> Option<WhiteoutRef> {
        self.ii.hinodes.get_mut(bindex).and_then(|h| h.whiteout.take())
    }

    /// Sets the range ahead of installing branch inodes, as lookup does.
    pub fn set_range(&mut self, range: Option<BranchRange>) -> Result<()> {
        if let Some(r) = range {
            let nbr = self.ii.hinodes.len();
            if r.start > r.end {
                return Err(LayerError::BranchOutOfRange { bindex: r.start, nbr: r.end + 1 });
            }
            if r.end >= nbr {
                return Err(LayerError::BranchOutOfRange { bindex: r.end, nbr });
            }
        }
        self.ii.range = range;
        Ok(())
    }

    /// Re-derives the range from the populated slots.
    ///
    /// With `put_zero`, branch inodes whose link count dropped to zero are
    /// released first: they were deleted on their branch and can no longer
    /// be reached by lookup.
    pub fn update_brange(&mut self, put_zero: bool) {
        if put_zero {
            let zero_link: Vec<usize> = self
                .ii
                .hinodes
                .iter()
                .enumerate()
                .filter(|(_, h)| h.inode().is_some_and(|i| i.nlink() == 0))
                .map(|(bindex, _)| bindex)
                .collect();
            for bindex in zero_link {
                debug!(ino = self.info.ino(), bindex, "dropping zero-link branch inode");
                self.set_h_inode(bindex, None, SlotFlags::empty());
                ShadowStats::bump(&self.info.sb().stats().zero_link_evictions);
            }
        }

        self.ii.scan_range();
        if let Some(r) = self.ii.range {
            debug_assert!(r.start <= r.end && r.end < self.ii.hinodes.len());
        }
        trace!(ino = self.info.ino(), range = ?self.ii.range, "brange updated");
    }

    /// Resizes the shadow array to `nbr` slots (at least one).
    ///
    /// Slots below the used extent (`bend + 1`, or one slot when the range is
    /// empty) keep their content; every other slot starts over empty. The
    /// array cannot shrink below the used extent: that fails with
    /// [`LayerError::BranchOutOfRange`]. On any failure the array is left
    /// untouched.
    pub fn realloc(&mut self, nbr: usize) -> Result<()> {
        let nbr = nbr.max(1);
        let ino = self.info.ino();
        let stats = self.info.sb().stats();
        let ii = &mut *self.ii;
        let used = ii.range.map(|r| r.end + 1).unwrap_or(1);
        let len = ii.hinodes.len();

        if nbr < used {
            warn!(ino, nbr, used, "refusing to shrink below bend");
            return Err(LayerError::BranchOutOfRange { bindex: used - 1, nbr });
        }
        if nbr > len {
            ii.hinodes
                .try_reserve_exact(nbr - len)
                .map_err(LayerError::oom(nbr))?;
        }

        for (bindex, hinode) in ii.hinodes.iter_mut().enumerate().skip(used) {
            if hinode.is_populated() {
                warn!(ino, bindex, "releasing branch inode beyond bend on realloc");
                ShadowStats::bump(&stats.releases);
            }
            hinode.put();
        }
        ii.hinodes.truncate(nbr);
        ii.hinodes.resize_with(nbr, HInode::default);

        if ii.range.is_some_and(|r| r.end >= nbr) {
            ii.scan_range();
        }
        debug!(ino, from = len, to = nbr, "shadow array resized");
        Ok(())
    }

    /// Opens an empty slot at `bindex` for a branch added there, shifting the
    /// slots at and below it down by one.
    pub fn add_branch_slot(&mut self, bindex: usize) -> Result<()> {
        let ii = &mut *self.ii;
        let nbr = ii.hinodes.len();
        if bindex > nbr {
            return Err(LayerError::BranchOutOfRange { bindex, nbr });
        }
        ii.hinodes
            .try_reserve_exact(1)
            .map_err(LayerError::oom(nbr + 1))?;
        ii.hinodes.insert(bindex, HInode::default());

        if let Some(r) = ii.range.as_mut() {
            if r.start >= bindex {
                r.start += 1;
            }
            if r.end >= bindex {
                r.end += 1;
            }
        }
        Ok(())
    }

    /// Drops the slot of a branch removed from `bindex`, releasing what it
    /// held and shifting the slots below it up by one.
    pub fn del_branch_slot(&mut self, bindex: usize) -> Result<()> {
        let stats = self.info.sb().stats();
        let ii = &mut *self.ii;
        let nbr = ii.hinodes.len();
        if bindex >= nbr {
            return Err(LayerError::BranchOutOfRange { bindex, nbr });
        }

        let mut removed = if nbr == 1 {
            std::mem::take(&mut ii.hinodes[0])
        } else {
            ii.hinodes.remove(bindex)
        };
        if removed.is_populated() {
            debug!(ino = self.info.ino(), bindex, "releasing branch inode of removed branch");
            ShadowStats::bump(&stats.releases);
        }
        removed.put();

        ii.scan_range();
        Ok(())
    }

    /// Stores a directory listing snapshot, returning the previous one.
    pub fn set_vdir(&mut self, vdir: Option<VDir>) -> Option<VDir> {
        std::mem::replace(&mut self.ii.vdir, vdir)
    }

    pub fn take_vdir(&mut self) -> Option<VDir> {
        self.ii.vdir.take()
    }
}
