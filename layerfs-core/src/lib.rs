//! # LayerFS Core
//!
//! The per-inode shadow layer of a union filesystem. A union stacks several
//! branch directories, top to bottom, and presents them as one tree; every
//! virtual inode of that tree is backed by at most one real inode per branch.
//!
//! ## Overview
//!
//! This crate keeps, for each virtual inode, the array of branch inodes
//! shadowing it together with the bookkeeping the union needs:
//!
//! - which branches hold a branch inode (the `[bstart, bend]` range)
//! - the identity of the branch each inode was taken from
//! - whiteouts masking lower branches
//! - change-notification watches and inode number index entries
//! - the generation used to detect state made stale by branch changes
//!
//! ## Basic Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use layerfs_core::branch::{BranchList, BranchPerm};
//! use layerfs_core::iinfo::InodeInfo;
//! use layerfs_core::inode::MemInode;
//! use layerfs_core::sbinfo::SuperBlock;
//! use layerfs_core::types::MountOptions;
//!
//! # fn main() -> layerfs_core::error::Result<()> {
//! let branches = BranchList::with_branches([("/upper", BranchPerm::Rw), ("/lower", BranchPerm::Ro)]);
//! let sb = Arc::new(SuperBlock::new(MountOptions::default(), Arc::new(branches)));
//!
//! let info = InodeInfo::new(42, &sb)?;
//! let lower = MemInode::file(1001);
//! {
//!     let mut ii = info.write();
//!     ii.set_h_inode(1, Some(lower.as_ref_counted()), sb.hi_flags(false));
//!     ii.update_brange(false);
//!     assert_eq!(ii.bstart(), Some(1));
//! }
//! info.finalize(false);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`iinfo`]: the shadow array, its lock guards and lifecycle
//! - [`sbinfo`]: mount-wide context shared by all inodes
//! - [`traits`]: seams to the branch table, index store and notifier
//! - [`branch`], [`xino`], [`hnotify`], [`inode`]: in-memory collaborators
//! - [`types`]: identifiers, slot flags and mount options
//! - [`error`]: error types
//! - [`stats`]: activity counters

pub mod branch;
pub mod error;
pub mod hnotify;
pub mod iinfo;
pub mod inode;
pub mod sbinfo;
pub mod stats;
pub mod traits;
pub mod types;
pub mod vdir;
pub mod xino;

pub use error::{AdvisoryError, LayerError, Result};
pub use iinfo::{InodeInfo, IInfoRead, IInfoWrite};
pub use sbinfo::SuperBlock;
