// File: crates/depot-repl/src/error.rs

//! Error types for the replication subsystem.

use thiserror::Error;

use depot_chunk::ChunkError;
use depot_fs::FsError;
use depot_version::VersionError;

/// Result type alias for replication operations.
pub type ReplResult<T> = Result<T, ReplError>;

/// Error variants for master calls and replica-side operations.
///
/// Errors from a master cross a node boundary, so they arrive as display
/// strings; the not-found class keeps its identity so replicas can decide
/// whether to fall back.
#[derive(Debug, Error)]
pub enum ReplError {
    /// The connection to a master failed.
    #[error("network error: {msg}")]
    Network {
        /// Description of the failure.
        msg: String,
    },

    /// A master call exceeded its bounded timeout.
    #[error("operation '{op}' timed out")]
    Timeout {
        /// The operation that timed out.
        op: &'static str,
    },

    /// The failover client was built with an empty master list.
    #[error("no masters configured")]
    NoMasters,

    /// The master reported a failure.
    #[error("remote call failed: {0}")]
    Remote(String),

    /// The master reported the requested entity absent.
    #[error("remote not found: {0}")]
    RemoteNotFound(String),

    /// A payload from the channel could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// A local version-layer failure on this node.
    #[error("local error: {0}")]
    Local(#[from] VersionError),

    /// A local filesystem-layer failure on this node.
    #[error("local fs error: {0}")]
    Fs(#[from] FsError),

    /// A local chunk-layer failure on this node.
    #[error("local chunk error: {0}")]
    Chunk(#[from] ChunkError),
}

impl ReplError {
    /// True when the error is a remote or local not-found.
    pub fn is_not_found(&self) -> bool {
        match self {
            ReplError::RemoteNotFound(_) => true,
            ReplError::Local(e) => e.is_not_found(),
            ReplError::Fs(FsError::Meta(e)) => e.is_not_found(),
            ReplError::Chunk(ChunkError::NotFound { .. }) => true,
            _ => false,
        }
    }
}
