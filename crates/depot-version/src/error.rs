//! Error types for the version lifecycle subsystem.

use thiserror::Error;

use depot_chunk::{ChunkError, ChunkHash};
use depot_meta::MetaError;

/// Result type alias for version operations.
pub type VersionResult<T> = Result<T, VersionError>;

/// Error variants for version lifecycle operations.
#[derive(Debug, Error)]
pub enum VersionError {
    /// An error from the metadata layer.
    #[error("metadata error: {0}")]
    Meta(#[from] MetaError),

    /// An error from the chunk blob layer.
    #[error("chunk error: {0}")]
    Chunk(#[from] ChunkError),

    /// A save referenced a chunk whose blob is not on disk.
    ///
    /// The whole save is aborted; nothing is persisted.
    #[error("chunk {hash} referenced by '{path}' has no blob")]
    MissingBlob {
        /// The unreachable chunk.
        hash: ChunkHash,
        /// The declared file that referenced it.
        path: String,
    },
}

impl VersionError {
    /// True for the not-found class of errors.
    pub fn is_not_found(&self) -> bool {
        matches!(self, VersionError::Meta(e) if e.is_not_found())
            || matches!(self, VersionError::Chunk(ChunkError::NotFound { .. }))
    }

    /// True for the conflict class of errors.
    pub fn is_conflict(&self) -> bool {
        matches!(self, VersionError::Meta(e) if e.is_conflict())
    }

    /// True for the forbidden class of errors.
    pub fn is_forbidden(&self) -> bool {
        matches!(self, VersionError::Meta(e) if e.is_forbidden())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depot_meta::VersionRef;

    #[test]
    fn test_meta_classes_pass_through() {
        let err: VersionError =
            MetaError::CommittedVersionImmutable(VersionRef::new("ws", "d", "1.0.0")).into();
        assert!(err.is_forbidden());
        assert!(!err.is_conflict());

        let err: VersionError =
            MetaError::VersionExists(VersionRef::new("ws", "d", "1.0.0")).into();
        assert!(err.is_conflict());
    }

    #[test]
    fn test_missing_blob_display() {
        let err = VersionError::MissingBlob {
            hash: ChunkHash::digest(b"gone"),
            path: "a.bin".to_string(),
        };
        assert!(format!("{}", err).contains("a.bin"));
    }
}
