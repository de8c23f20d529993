//! Error types for the layerfs shadow layer.

use std::collections::TryReserveError;
use thiserror::Error;

/// Errors surfaced to callers of the shadow layer.
#[derive(Debug, Error)]
pub enum LayerError {
    /// The shadow array could not be allocated or grown.
    #[error("Out of memory: could not allocate {requested} shadow slots")]
    OutOfMemory {
        requested: usize,
    },

    /// A branch index beyond the current branch count.
    #[error("Branch index {bindex} out of range (branch count {nbr})")]
    BranchOutOfRange {
        bindex: usize,
        nbr: usize,
    },

    /// A mount option that could not be parsed or is unknown.
    #[error("Invalid mount option '{option}': {reason}")]
    InvalidOption {
        option: String,
        reason: String,
    },

    /// A configuration file that could not be decoded.
    #[error("Invalid configuration")]
    Config {
        #[from]
        #[source]
        source: serde_json::Error,
    },

    /// I/O error while reading configuration.
    #[error("I/O error")]
    IoError {
        #[from]
        #[source]
        source: std::io::Error,
    },
}

impl LayerError {
    /// Maps an allocation failure for `requested` slots.
    pub(crate) fn oom(requested: usize) -> impl FnOnce(TryReserveError) -> Self {
        move |_| LayerError::OutOfMemory { requested }
    }
}

/// Failure of a best-effort collaborator call (index store, notification).
///
/// These never reach filesystem clients; the shadow layer logs and drops them.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AdvisoryError {
    /// The index store rejected a mapping write.
    #[error("xino write failed for branch inode {h_ino}: {reason}")]
    XinoWrite {
        h_ino: u64,
        reason: String,
    },

    /// The index store could not purge the mappings of an inode.
    #[error("xino purge failed for inode {ino}: {reason}")]
    XinoPurge {
        ino: u64,
        reason: String,
    },

    /// A change-notification watch could not be registered.
    #[error("notify registration failed for inode {ino}: {reason}")]
    NotifyRegister {
        ino: u64,
        reason: String,
    },
}

/// Result type alias for layerfs operations.
pub type Result<T> = std::result::Result<T, LayerError>;
