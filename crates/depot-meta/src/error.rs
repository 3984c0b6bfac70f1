//! Error types for the metadata subsystem.

use thiserror::Error;

use crate::types::{ChunkId, FileId, VersionRef};

/// Result type alias for metadata operations.
pub type MetaResult<T> = Result<T, MetaError>;

/// Error variants for metadata operations.
///
/// The taxonomy follows three caller-visible classes: not-found (absent
/// dataset/version/file/chunk), conflict (duplicate version or commit), and
/// forbidden (mutating a committed version). None of them are retryable.
#[derive(Debug, Error)]
pub enum MetaError {
    /// No dataset row matches the given key.
    #[error("dataset '{workspace}/{name}' not found")]
    DatasetNotFound {
        /// Workspace the lookup used.
        workspace: String,
        /// Dataset name the lookup used.
        name: String,
    },

    /// No version row matches the given reference.
    #[error("version {0} not found")]
    VersionNotFound(VersionRef),

    /// No file row at the given path within the version.
    #[error("file '{path}' not found in {version}")]
    FileNotFound {
        /// Version the lookup used.
        version: VersionRef,
        /// Path that was not found.
        path: String,
    },

    /// A chunk row referenced by id is missing.
    #[error("chunk row {0} not found")]
    ChunkRowNotFound(ChunkId),

    /// A file row referenced by id is missing.
    #[error("file row {0} not found")]
    FileRowNotFound(FileId),

    /// The destination version already exists (clone/create).
    #[error("version {0} already exists")]
    VersionExists(VersionRef),

    /// The version was already committed; committing again is a conflict.
    #[error("version {0} is already committed")]
    AlreadyCommitted(VersionRef),

    /// The version is committed and accepts no further mutation.
    #[error("version {0} is committed and read-only")]
    CommittedVersionImmutable(VersionRef),

    /// A declared file path is empty or malformed.
    #[error("invalid file path: {0:?}")]
    InvalidPath(String),

    /// A declared chunk list violates the gapless index invariant.
    #[error("chunk indexes for '{path}' are not dense from zero")]
    SparseChunkIndex {
        /// File whose declaration was rejected.
        path: String,
    },

    /// An error occurred in the KV store layer.
    #[error("kv store error: {0}")]
    Kv(String),

    /// Row encoding or decoding failed.
    #[error("row codec error: {0}")]
    Codec(String),
}

impl MetaError {
    /// True for the not-found class of errors.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            MetaError::DatasetNotFound { .. }
                | MetaError::VersionNotFound(_)
                | MetaError::FileNotFound { .. }
                | MetaError::ChunkRowNotFound(_)
                | MetaError::FileRowNotFound(_)
        )
    }

    /// True for the conflict class of errors.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            MetaError::VersionExists(_) | MetaError::AlreadyCommitted(_)
        )
    }

    /// True for the forbidden class of errors.
    pub fn is_forbidden(&self) -> bool {
        matches!(self, MetaError::CommittedVersionImmutable(_))
    }
}
