#![warn(missing_docs)]

//! Depot metadata subsystem: the relational graph linking datasets to
//! versions, files and ordered chunks.
//!
//! Tables live on an embedded key-value store; every mutating call is one
//! atomic write batch, so a failed save leaves the graph untouched. This
//! crate records structure only — chunk blobs are owned by `depot-chunk`
//! and must exist before a save references them.

pub mod error;
pub mod kvstore;
pub mod store;
pub mod types;

pub use error::{MetaError, MetaResult};
pub use kvstore::{BatchOp, KvStore, MemoryKvStore};
pub use store::{MetadataStore, SaveOutcome};
pub use types::{
    normalize_path, ChunkDecl, ChunkId, ChunkRow, Dataset, DatasetId, DatasetKind, DatasetVersion,
    FileChunkRow, FileDecl, FileId, FileRow, FsStructure, VersionId, VersionRef, DEFAULT_FILE_MODE,
};
