//! Cached merged listing of a virtual directory.

use std::time::{Duration, Instant};

use crate::types::Ino;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VDirEntry {
    pub name: String,
    pub ino: Ino,
    pub is_dir: bool,
}

/// Snapshot of a virtual directory's merged entries.
///
/// Building the listing is the directory layer's business; the shadow layer
/// only keeps the result alongside the inode and frees it on teardown.
#[derive(Debug, Clone)]
pub struct VDir {
    entries: Vec<VDirEntry>,
    generation: u64,
    built_at: Instant,
}

impl VDir {
    /// Wraps a listing built while the filesystem was at `generation`.
    pub fn new(entries: Vec<VDirEntry>, generation: u64) -> Self {
        Self {
            entries,
            generation,
            built_at: Instant::now(),
        }
    }

    pub fn entries(&self) -> &[VDirEntry] {
        &self.entries
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether the listing can still be served at `generation` and `max_age`.
    pub fn is_fresh(&self, generation: u64, max_age: Duration) -> bool {
        self.generation == generation && self.built_at.elapsed() <= max_age
    }
}
