//! In-memory index store mapping branch inodes to virtual inode numbers.

use dashmap::DashMap;
use tracing::trace;

use crate::error::AdvisoryError;
use crate::traits::XinoStore;
use crate::types::{BranchId, Ino};

/// Index store kept in memory.
///
/// A plain eviction keeps the mappings of the evicted inode, so a later lookup
/// of the same branch inode gets the same virtual inode number back. An
/// eviction after deletion drops them and bumps the inode's generation, so a
/// reused number is never mistaken for the deleted file.
pub struct MemoryXino {
    /// (branch, branch ino) -> virtual ino
    map: DashMap<(BranchId, Ino), Ino>,

    /// Per virtual inode generation, bumped when the inode is deleted
    xigen: DashMap<Ino, u32>,
}

impl MemoryXino {
    pub fn new() -> Self {
        Self {
            map: DashMap::new(),
            xigen: DashMap::new(),
        }
    }

    /// Looks up the virtual inode number recorded for a branch inode.
    pub fn read(&self, br_id: BranchId, h_ino: Ino) -> Option<Ino> {
        self.map.get(&(br_id, h_ino)).map(|ino| *ino)
    }

    /// Generation of virtual inode number `ino`.
    pub fn generation(&self, ino: Ino) -> u32 {
        self.xigen.get(&ino).map(|g| *g).unwrap_or(0)
    }

    /// Drops every mapping recorded for a removed branch.
    pub fn forget_branch(&self, br_id: BranchId) -> usize {
        let before = self.map.len();
        self.map.retain(|(id, _), _| *id != br_id);
        before - self.map.len()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl Default for MemoryXino {
    fn default() -> Self {
        Self::new()
    }
}

impl XinoStore for MemoryXino {
    fn write(&self, br_id: BranchId, h_ino: Ino, ino: Ino) -> Result<(), AdvisoryError> {
        if br_id.is_unset() {
            return Err(AdvisoryError::XinoWrite {
                h_ino,
                reason: "branch id is unset".to_string(),
            });
        }
        trace!(br = %br_id, h_ino, ino, "xino write");
        self.map.insert((br_id, h_ino), ino);
        Ok(())
    }

    fn purge(&self, ino: Ino, unlinked: bool) -> Result<(), AdvisoryError> {
        if !unlinked {
            return Ok(());
        }
        self.map.retain(|_, mapped| *mapped != ino);
        *self.xigen.entry(ino).or_insert(0) += 1;
        trace!(ino, "xino purged");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_and_read() {
        let xino = MemoryXino::new();
        xino.write(BranchId::new(0), 100, 5).unwrap();
        xino.write(BranchId::new(1), 100, 6).unwrap();

        assert_eq!(xino.read(BranchId::new(0), 100), Some(5));
        assert_eq!(xino.read(BranchId::new(1), 100), Some(6));
        assert_eq!(xino.read(BranchId::new(2), 100), None);
        assert_eq!(xino.len(), 2);
    }

    #[test]
    fn test_write_rejects_unset_branch() {
        let xino = MemoryXino::new();
        let err = xino.write(BranchId::UNSET, 1, 2).unwrap_err();
        assert!(matches!(err, AdvisoryError::XinoWrite { h_ino: 1, .. }));
        assert!(xino.is_empty());
    }

    #[test]
    fn test_purge_keeps_mappings_on_plain_evict() {
        let xino = MemoryXino::new();
        xino.write(BranchId::new(0), 100, 5).unwrap();

        xino.purge(5, false).unwrap();
        assert_eq!(xino.read(BranchId::new(0), 100), Some(5));
        assert_eq!(xino.generation(5), 0);
    }

    #[test]
    fn test_purge_unlinked() {
        let xino = MemoryXino::new();
        xino.write(BranchId::new(0), 100, 5).unwrap();
        xino.write(BranchId::new(1), 200, 5).unwrap();
        xino.write(BranchId::new(1), 300, 6).unwrap();

        xino.purge(5, true).unwrap();
        assert_eq!(xino.read(BranchId::new(0), 100), None);
        assert_eq!(xino.read(BranchId::new(1), 200), None);
        assert_eq!(xino.read(BranchId::new(1), 300), Some(6));
        assert_eq!(xino.generation(5), 1);
    }

    #[test]
    fn test_forget_branch() {
        let xino = MemoryXino::new();
        xino.write(BranchId::new(0), 1, 10).unwrap();
        xino.write(BranchId::new(0), 2, 11).unwrap();
        xino.write(BranchId::new(1), 1, 12).unwrap();

        assert_eq!(xino.forget_branch(BranchId::new(0)), 2);
        assert_eq!(xino.len(), 1);
    }
}
