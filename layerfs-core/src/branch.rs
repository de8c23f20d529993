//! In-memory branch table.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::LayerError;
use crate::traits::BranchTable;
use crate::types::BranchId;

/// Access permission of a branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BranchPerm {
    /// Writable
    Rw,
    /// Read-only through the union, but may change underneath
    Ro,
    /// Really read-only: nothing modifies it, so it is never watched
    Rr,
}

impl BranchPerm {
    /// Whether inodes on a branch with this permission may be watched.
    pub fn notifyable(&self) -> bool {
        !matches!(self, BranchPerm::Rr)
    }
}

impl fmt::Display for BranchPerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BranchPerm::Rw => write!(f, "rw"),
            BranchPerm::Ro => write!(f, "ro"),
            BranchPerm::Rr => write!(f, "rr"),
        }
    }
}

impl FromStr for BranchPerm {
    type Err = LayerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rw" => Ok(BranchPerm::Rw),
            "ro" => Ok(BranchPerm::Ro),
            "rr" => Ok(BranchPerm::Rr),
            _ => Err(LayerError::InvalidOption {
                option: s.to_string(),
                reason: "branch permission must be rw, ro or rr".to_string(),
            }),
        }
    }
}

/// One branch of the union.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Branch {
    pub id: BranchId,
    pub perm: BranchPerm,
    pub path: PathBuf,
}

/// Branch table kept in memory, top branch first.
///
/// Every branch gets a fresh [`BranchId`] when added, so a branch removed and
/// added back at the same position is recognised as a different branch.
pub struct BranchList {
    branches: RwLock<Vec<Branch>>,
    next_id: AtomicU32,
}

impl BranchList {
    pub fn new() -> Self {
        Self {
            branches: RwLock::new(Vec::new()),
            next_id: AtomicU32::new(0),
        }
    }

    /// Creates a table from `(path, perm)` pairs, top branch first.
    pub fn with_branches<P: Into<PathBuf>>(branches: impl IntoIterator<Item = (P, BranchPerm)>) -> Self {
        let list = Self::new();
        for (path, perm) in branches {
            list.append(path, perm);
        }
        list
    }

    fn alloc_id(&self) -> BranchId {
        BranchId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Adds a branch at the bottom of the stack.
    pub fn append(&self, path: impl Into<PathBuf>, perm: BranchPerm) -> BranchId {
        let id = self.alloc_id();
        self.branches.write().push(Branch { id, perm, path: path.into() });
        id
    }

    /// Adds a branch at position `bindex`, shifting lower branches down.
    pub fn insert(&self, bindex: usize, path: impl Into<PathBuf>, perm: BranchPerm) -> Result<BranchId, LayerError> {
        let mut branches = self.branches.write();
        if bindex > branches.len() {
            return Err(LayerError::BranchOutOfRange { bindex, nbr: branches.len() });
        }
        let id = self.alloc_id();
        branches.insert(bindex, Branch { id, perm, path: path.into() });
        Ok(id)
    }

    /// Removes the branch at `bindex`.
    pub fn remove(&self, bindex: usize) -> Result<Branch, LayerError> {
        let mut branches = self.branches.write();
        if bindex >= branches.len() {
            return Err(LayerError::BranchOutOfRange { bindex, nbr: branches.len() });
        }
        Ok(branches.remove(bindex))
    }

    /// Changes the permission of the branch at `bindex`.
    pub fn set_perm(&self, bindex: usize, perm: BranchPerm) -> Result<(), LayerError> {
        let mut branches = self.branches.write();
        let nbr = branches.len();
        let branch = branches
            .get_mut(bindex)
            .ok_or(LayerError::BranchOutOfRange { bindex, nbr })?;
        branch.perm = perm;
        Ok(())
    }

    /// Copy of the table, top branch first.
    pub fn snapshot(&self) -> Vec<Branch> {
        self.branches.read().clone()
    }
}

impl Default for BranchList {
    fn default() -> Self {
        Self::new()
    }
}

impl BranchTable for BranchList {
    fn count(&self) -> usize {
        self.branches.read().len()
    }

    fn identity_of(&self, bindex: usize) -> Option<BranchId> {
        self.branches.read().get(bindex).map(|br| br.id)
    }

    fn index_of(&self, id: BranchId) -> Option<usize> {
        self.branches.read().iter().position(|br| br.id == id)
    }

    fn supports_notify(&self, bindex: usize) -> bool {
        self.branches
            .read()
            .get(bindex)
            .map(|br| br.perm.notifyable())
            .unwrap_or(false)
    }
}
