//! Counters for shadow layer activity.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Shadow layer counters shared by every inode of one superblock.
#[derive(Debug, Default)]
pub struct ShadowStats {
    /// Branch inodes installed into slots
    pub installs: AtomicU64,

    /// Slots released (branch inode, whiteout and watch dropped)
    pub releases: AtomicU64,

    /// Zero-link branch inodes evicted by range recompute
    pub zero_link_evictions: AtomicU64,

    /// Index store writes or purges that failed
    pub xino_failures: AtomicU64,

    /// Watch registrations that failed
    pub notify_failures: AtomicU64,

    /// Inode infos torn down
    pub finalized: AtomicU64,
}

/// Point-in-time copy of [`ShadowStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub installs: u64,
    pub releases: u64,
    pub zero_link_evictions: u64,
    pub xino_failures: u64,
    pub notify_failures: u64,
    pub finalized: u64,
}

impl ShadowStats {
    /// Creates a new ShadowStats instance with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a snapshot of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            installs: self.installs.load(Ordering::Relaxed),
            releases: self.releases.load(Ordering::Relaxed),
            zero_link_evictions: self.zero_link_evictions.load(Ordering::Relaxed),
            xino_failures: self.xino_failures.load(Ordering::Relaxed),
            notify_failures: self.notify_failures.load(Ordering::Relaxed),
            finalized: self.finalized.load(Ordering::Relaxed),
        }
    }

    /// Advisory failures of any kind.
    pub fn advisory_failures(&self) -> u64 {
        self.xino_failures.load(Ordering::Relaxed) + self.notify_failures.load(Ordering::Relaxed)
    }
}
