//! Change-notification handles for branch inodes.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::trace;

use crate::error::AdvisoryError;
use crate::traits::{Notifier, RealInodeRef, WatchId};
use crate::types::Ino;

/// RAII registration of a watch on one branch inode.
///
/// The watch is unregistered when the handle is dropped, so it is released
/// exactly once, together with the slot that owns it.
pub struct NotifyHandle {
    watch: WatchId,
    notifier: Arc<dyn Notifier>,
}

impl NotifyHandle {
    /// Registers a watch on `h_inode` for virtual inode `ino`.
    pub fn register(
        notifier: &Arc<dyn Notifier>,
        ino: Ino,
        h_inode: &RealInodeRef,
    ) -> Result<Self, AdvisoryError> {
        let watch = notifier.register(ino, h_inode)?;
        Ok(Self {
            watch,
            notifier: Arc::clone(notifier),
        })
    }

    pub fn watch(&self) -> WatchId {
        self.watch
    }
}

impl fmt::Debug for NotifyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotifyHandle").field("watch", &self.watch).finish()
    }
}

impl Drop for NotifyHandle {
    fn drop(&mut self) {
        self.notifier.unregister(self.watch);
    }
}

/// Watch registry kept in memory.
///
/// It only records who watches what; delivering events is left to the
/// notification subsystem.
pub struct MemoryNotifier {
    /// watch -> (virtual ino, branch ino)
    watches: DashMap<WatchId, (Ino, Ino)>,
    next_watch: AtomicU64,
    max_watches: usize,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::with_limit(usize::MAX)
    }

    /// Creates a registry refusing registrations beyond `max_watches`.
    pub fn with_limit(max_watches: usize) -> Self {
        Self {
            watches: DashMap::new(),
            next_watch: AtomicU64::new(1),
            max_watches,
        }
    }

    pub fn active_watches(&self) -> usize {
        self.watches.len()
    }

    /// Branch inode numbers watched on behalf of virtual inode `ino`.
    pub fn watched_by(&self, ino: Ino) -> Vec<Ino> {
        let mut watched: Vec<Ino> = self
            .watches
            .iter()
            .filter(|entry| entry.value().0 == ino)
            .map(|entry| entry.value().1)
            .collect();
        watched.sort_unstable();
        watched
    }
}

impl Default for MemoryNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier for MemoryNotifier {
    fn register(&self, ino: Ino, h_inode: &RealInodeRef) -> Result<WatchId, AdvisoryError> {
        if self.watches.len() >= self.max_watches {
            return Err(AdvisoryError::NotifyRegister {
                ino,
                reason: format!("watch limit {} reached", self.max_watches),
            });
        }
        let watch = WatchId(self.next_watch.fetch_add(1, Ordering::Relaxed));
        self.watches.insert(watch, (ino, h_inode.ino()));
        trace!(ino, h_ino = h_inode.ino(), watch = watch.0, "watch registered");
        Ok(watch)
    }

    fn unregister(&self, watch: WatchId) {
        self.watches.remove(&watch);
        trace!(watch = watch.0, "watch unregistered");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inode::MemInode;

    #[test]
    fn test_handle_unregisters_on_drop() {
        let registry = Arc::new(MemoryNotifier::new());
        let notifier: Arc<dyn Notifier> = registry.clone();
        let h_inode = MemInode::dir(40).as_ref_counted();

        let handle = NotifyHandle::register(&notifier, 7, &h_inode).unwrap();
        assert_eq!(registry.active_watches(), 1);
        assert_eq!(registry.watched_by(7), vec![40]);

        drop(handle);
        assert_eq!(registry.active_watches(), 0);
        assert!(registry.watched_by(7).is_empty());
    }

    #[test]
    fn test_watch_limit() {
        let registry = Arc::new(MemoryNotifier::with_limit(1));
        let notifier: Arc<dyn Notifier> = registry.clone();
        let a = MemInode::dir(1).as_ref_counted();
        let b = MemInode::dir(2).as_ref_counted();

        let _first = NotifyHandle::register(&notifier, 7, &a).unwrap();
        let err = NotifyHandle::register(&notifier, 7, &b).unwrap_err();
        assert!(matches!(err, AdvisoryError::NotifyRegister { ino: 7, .. }));
        assert_eq!(registry.active_watches(), 1);
    }
}
