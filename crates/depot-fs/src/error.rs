//! Error types for the virtual filesystem subsystem.

use thiserror::Error;

use depot_chunk::{ChunkError, ChunkHash};
use depot_meta::MetaError;

/// Result type alias for filesystem operations.
pub type FsResult<T> = Result<T, FsError>;

/// Error variants for tree reconstruction and file streaming.
#[derive(Debug, Error)]
pub enum FsError {
    /// An error from the metadata layer.
    #[error("metadata error: {0}")]
    Meta(#[from] MetaError),

    /// An error from the chunk blob layer.
    #[error("chunk error: {0}")]
    Chunk(#[from] ChunkError),

    /// Wraps standard I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No node at the given virtual path.
    #[error("path '{0}' not found in tree")]
    PathNotFound(String),

    /// The node at the path is a file where a directory was required.
    #[error("path '{0}' is not a directory")]
    NotADirectory(String),

    /// The node at the path is a directory where a file was required.
    #[error("path '{0}' is not a file")]
    NotAFile(String),

    /// A blob held fewer bytes than its chunk row declared.
    #[error("chunk {hash} shorter than declared size {declared}")]
    TruncatedChunk {
        /// Hash of the short blob.
        hash: ChunkHash,
        /// Size the metadata declared.
        declared: u64,
    },

    /// A seek resolved to a negative absolute offset.
    #[error("seek to a negative offset")]
    InvalidSeek,

    /// Tree encoding or decoding failed.
    #[error("tree codec error: {0}")]
    Codec(String),
}
