//! Error types for the chunk storage subsystem.

use thiserror::Error;

use crate::hash::ChunkHash;

/// Result type alias for chunk operations.
pub type ChunkResult<T> = Result<T, ChunkError>;

/// Error variants for chunking and blob storage operations.
#[derive(Debug, Error)]
pub enum ChunkError {
    /// Wraps standard I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The requested chunk blob does not exist under the given scheme.
    #[error("chunk {hash} not found (scheme {scheme})")]
    NotFound {
        /// Hash of the missing chunk.
        hash: ChunkHash,
        /// Storage-scheme byte the lookup used.
        scheme: u8,
    },

    /// The storage-scheme byte is not one this build understands.
    #[error("unsupported storage scheme {0}")]
    UnsupportedScheme(u8),

    /// Uploaded bytes do not digest to the hash they were declared under.
    #[error("hash mismatch: declared {declared}, computed {computed}")]
    HashMismatch {
        /// Hash the caller declared.
        declared: ChunkHash,
        /// Hash actually computed over the payload.
        computed: ChunkHash,
    },

    /// A hash string could not be parsed.
    #[error("invalid chunk hash: {0}")]
    InvalidHash(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::ChunkHash;

    #[test]
    fn test_chunk_result_alias() {
        let ok: ChunkResult<u32> = Ok(7);
        assert!(ok.is_ok());

        let err: ChunkResult<u32> = Err(ChunkError::UnsupportedScheme(9));
        assert!(err.is_err());
    }

    #[test]
    fn test_not_found_display_names_hash() {
        let hash = ChunkHash::digest(b"payload");
        let err = ChunkError::NotFound { hash, scheme: 1 };
        let msg = format!("{}", err);
        assert!(msg.contains(&hash.to_hex()[..8]));
        assert!(msg.contains("scheme 1"));
    }

    #[test]
    fn test_unsupported_scheme_display() {
        let err = ChunkError::UnsupportedScheme(42);
        assert_eq!(format!("{}", err), "unsupported storage scheme 42");
    }

    #[test]
    fn test_io_error_from_std() {
        let std_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: ChunkError = std_err.into();
        assert!(matches!(err, ChunkError::Io(_)));
    }
}
