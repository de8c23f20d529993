//! In-memory branch inodes and whiteout entries.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::traits::{RealInode, RealInodeRef, WhiteoutEntry, WhiteoutRef};
use crate::types::Ino;

/// A branch inode held in memory.
#[derive(Debug)]
pub struct MemInode {
    ino: Ino,
    is_dir: bool,
    nlink: AtomicU32,
    generation: AtomicU32,
}

impl MemInode {
    pub fn new(ino: Ino, is_dir: bool) -> Self {
        Self {
            ino,
            is_dir,
            nlink: AtomicU32::new(if is_dir { 2 } else { 1 }),
            generation: AtomicU32::new(0),
        }
    }

    pub fn file(ino: Ino) -> Arc<Self> {
        Arc::new(Self::new(ino, false))
    }

    pub fn dir(ino: Ino) -> Arc<Self> {
        Arc::new(Self::new(ino, true))
    }

    pub fn with_generation(self, generation: u32) -> Self {
        self.generation.store(generation, Ordering::Relaxed);
        self
    }

    pub fn set_nlink(&self, nlink: u32) {
        self.nlink.store(nlink, Ordering::Release);
    }

    /// Drops one hard link, saturating at zero.
    pub fn unlink(&self) {
        let _ = self
            .nlink
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }

    pub fn set_generation(&self, generation: u32) {
        self.generation.store(generation, Ordering::Release);
    }

    /// Converts a shared handle into the counted reference slots hold.
    pub fn as_ref_counted(self: &Arc<Self>) -> RealInodeRef {
        Arc::clone(self) as RealInodeRef
    }
}

impl RealInode for MemInode {
    fn ino(&self) -> Ino {
        self.ino
    }

    fn nlink(&self) -> u32 {
        self.nlink.load(Ordering::Acquire)
    }

    fn generation(&self) -> u32 {
        self.generation.load(Ordering::Acquire)
    }

    fn is_dir(&self) -> bool {
        self.is_dir
    }
}

/// A whiteout entry held in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemWhiteout {
    name: String,
}

impl MemWhiteout {
    /// Creates the whiteout masking `target`.
    pub fn masking(target: &str) -> Arc<Self> {
        Arc::new(Self { name: format!(".wh.{}", target) })
    }

    pub fn as_ref_counted(self: &Arc<Self>) -> WhiteoutRef {
        Arc::clone(self) as WhiteoutRef
    }
}

impl WhiteoutEntry for MemWhiteout {
    fn name(&self) -> &str {
        &self.name
    }
}
