#![allow(clippy::unwrap_used, missing_docs)]

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use layerfs_core::error::LayerError;
use layerfs_core::iinfo::InodeInfo;
use layerfs_core::inode::{MemInode, MemWhiteout};
use layerfs_core::traits::refcount;
use layerfs_core::types::{BranchId, BranchRange, SlotFlags};
use layerfs_core::xino::MemoryXino;

use common::{failing_superblock, superblock, superblock_with_xino};

#[test]
fn recompute_finds_outermost_populated_slots() {
    let sb = superblock(3);
    let info = InodeInfo::new(100, &sb).unwrap();
    let a = MemInode::file(1);
    let b = MemInode::file(2);

    let mut ii = info.write();
    ii.set_h_inode(1, Some(a.as_ref_counted()), SlotFlags::empty());
    ii.set_h_inode(2, Some(b.as_ref_counted()), SlotFlags::empty());
    ii.update_brange(false);

    assert_eq!(ii.range(), Some(BranchRange::new(1, 2)));
    assert!(ii.h_inode(0).is_none());
}

#[test]
fn recompute_drops_zero_link_inode() {
    let sb = superblock(3);
    let info = InodeInfo::new(100, &sb).unwrap();
    let a = MemInode::file(1);
    let b = MemInode::file(2);

    let mut ii = info.write();
    ii.set_h_inode(1, Some(a.as_ref_counted()), SlotFlags::empty());
    ii.set_h_inode(2, Some(b.as_ref_counted()), SlotFlags::empty());
    ii.update_brange(false);

    a.set_nlink(0);
    ii.update_brange(true);

    assert_eq!(ii.range(), Some(BranchRange::new(2, 2)));
    assert!(ii.h_inode(1).is_none());
    assert_eq!(Arc::strong_count(&a), 1);
    assert_eq!(Arc::strong_count(&b), 2);
}

#[test]
fn setting_a_slot_twice_does_not_leak() {
    let sb = superblock(3);
    let info = InodeInfo::new(100, &sb).unwrap();
    let a = MemInode::file(1);

    let mut ii = info.write();
    ii.set_h_inode(1, Some(a.as_ref_counted()), SlotFlags::empty());
    ii.set_h_inode(1, Some(a.as_ref_counted()), SlotFlags::empty());
    assert_eq!(Arc::strong_count(&a), 2);

    ii.set_h_inode(1, None, SlotFlags::empty());
    assert_eq!(Arc::strong_count(&a), 1);
}

#[test]
fn release_is_exactly_once_and_clears_slot_state() {
    let (sb, _, _) = failing_superblock(2);
    let info = InodeInfo::new(100, &sb).unwrap();
    let a = MemInode::dir(1);
    let wh = MemWhiteout::masking("f");

    let mut ii = info.write();
    let h = a.as_ref_counted();
    ii.set_h_inode(0, Some(h.clone()), SlotFlags::empty());
    ii.set_whiteout(0, wh.as_ref_counted());
    assert_eq!(refcount(&h), 3);

    ii.set_h_inode(0, None, SlotFlags::empty());
    assert_eq!(refcount(&h), 2);
    ii.set_h_inode(0, None, SlotFlags::empty());
    assert_eq!(refcount(&h), 2);
    assert_eq!(Arc::strong_count(&wh), 1);

    ii.set_h_inode(0, Some(h.clone()), SlotFlags::empty());
    assert!(ii.whiteout(0).is_none());
    assert!(ii.hinode(0).unwrap().watch().is_none());
}

#[test]
fn resize_preserves_occupied_extent() {
    let sb = superblock(2);
    let info = InodeInfo::new(100, &sb).unwrap();
    let a = MemInode::file(1);
    let b = MemInode::file(2);

    let mut ii = info.write();
    ii.set_h_inode(0, Some(a.as_ref_counted()), SlotFlags::empty());
    ii.set_h_inode(1, Some(b.as_ref_counted()), SlotFlags::empty());
    ii.update_brange(false);

    ii.realloc(5).unwrap();
    assert_eq!(ii.nbr(), 5);
    assert_eq!(ii.h_inode(0).map(|h| h.ino()), Some(1));
    assert_eq!(ii.h_inode(1).map(|h| h.ino()), Some(2));
    assert_eq!(ii.branch_id(0), BranchId::new(0));
    assert_eq!(ii.branch_id(1), BranchId::new(1));
    for bindex in 2..5 {
        assert!(ii.h_inode(bindex).is_none());
        assert_eq!(ii.branch_id(bindex), BranchId::UNSET);
    }
    assert_eq!(ii.range(), Some(BranchRange::new(0, 1)));
}

#[test]
fn failed_resize_leaves_array_untouched() {
    let sb = superblock(2);
    let info = InodeInfo::new(100, &sb).unwrap();
    let a = MemInode::file(1);

    let mut ii = info.write();
    ii.set_h_inode(1, Some(a.as_ref_counted()), SlotFlags::empty());
    ii.update_brange(false);
    let before = format!("{:?}", &*ii);

    let err = ii.realloc(usize::MAX).unwrap_err();
    assert!(matches!(err, LayerError::OutOfMemory { .. }));
    assert_eq!(format!("{:?}", &*ii), before);
    assert_eq!(Arc::strong_count(&a), 2);
}

#[test]
fn finalize_with_empty_range_still_purges() {
    let xino = Arc::new(MemoryXino::new());
    let sb = superblock_with_xino(2, xino.clone());
    let info = InodeInfo::new(100, &sb).unwrap();

    info.finalize(true);

    let stats = sb.stats().snapshot();
    assert_eq!(stats.releases, 0);
    assert_eq!(stats.finalized, 1);
    assert_eq!(xino.generation(100), 1);
}

#[test]
fn plain_eviction_keeps_index_mappings() {
    let xino = Arc::new(MemoryXino::new());
    let sb = superblock_with_xino(1, xino.clone());
    let info = InodeInfo::new(100, &sb).unwrap();
    let a = MemInode::file(1);
    {
        let mut ii = info.write();
        ii.set_h_inode(0, Some(a.as_ref_counted()), sb.hi_flags(false));
        ii.update_brange(false);
    }

    info.finalize(false);
    assert_eq!(xino.read(BranchId::new(0), 1), Some(100));
    assert_eq!(Arc::strong_count(&a), 1);
}

#[test]
fn advisory_failures_never_reach_the_caller() {
    let (sb, xino, notifier) = failing_superblock(2);
    let info = InodeInfo::new(100, &sb).unwrap();
    let dir = MemInode::dir(1);
    {
        let mut ii = info.write();
        ii.set_h_inode(0, Some(dir.as_ref_counted()), sb.hi_flags(true));
        ii.update_brange(false);
        assert_eq!(ii.h_inode(0).map(|h| h.ino()), Some(1));
        assert!(ii.hinode(0).unwrap().watch().is_none());
    }
    info.finalize(true);

    assert_eq!(xino.writes.load(Ordering::SeqCst), 1);
    assert_eq!(xino.purges.load(Ordering::SeqCst), 1);
    assert_eq!(notifier.attempts.load(Ordering::SeqCst), 1);
    assert_eq!(notifier.unregistered.load(Ordering::SeqCst), 0);

    let stats = sb.stats().snapshot();
    assert_eq!(stats.xino_failures, 2);
    assert_eq!(stats.notify_failures, 1);
    assert_eq!(sb.stats().advisory_failures(), 3);
    assert_eq!(Arc::strong_count(&dir), 1);
}

/// Small xorshift generator so operation sequences are reproducible.
struct Sequence(u64);

impl Sequence {
    fn next(&mut self) -> u64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        self.0
    }

    fn below(&mut self, n: usize) -> usize {
        (self.next() % n as u64) as usize
    }
}

#[test]
fn range_holds_after_every_recompute() {
    const NBR: usize = 6;
    let sb = superblock(NBR);
    let inodes: Vec<_> = (0..NBR as u64).map(|i| MemInode::file(10 + i)).collect();

    for seed in 1..=32u64 {
        let info = InodeInfo::new(seed, &sb).unwrap();
        let mut seq = Sequence(seed.wrapping_mul(0x9e37_79b9_7f4a_7c15));
        let mut ii = info.write();

        for _ in 0..64 {
            let bindex = seq.below(NBR);
            match seq.below(4) {
                0 => ii.set_h_inode(bindex, None, SlotFlags::empty()),
                1 => {
                    inodes[bindex].set_nlink(0);
                    ii.update_brange(true);
                    inodes[bindex].set_nlink(1);
                }
                _ => ii.set_h_inode(bindex, Some(inodes[bindex].as_ref_counted()), SlotFlags::empty()),
            }
            ii.update_brange(false);

            match ii.range() {
                None => assert!((0..NBR).all(|b| ii.h_inode(b).is_none())),
                Some(r) => {
                    assert!(r.start <= r.end && r.end < ii.nbr());
                    assert!(ii.h_inode(r.start).is_some());
                    assert!(ii.h_inode(r.end).is_some());
                    assert!((0..r.start).chain(r.end + 1..NBR).all(|b| ii.h_inode(b).is_none()));
                }
            }
        }
        drop(ii);
        info.finalize(seed % 2 == 0);
    }

    for inode in &inodes {
        assert_eq!(Arc::strong_count(inode), 1);
    }
}
