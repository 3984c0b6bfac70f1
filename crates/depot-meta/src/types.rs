//! Row types and identifiers for the metadata graph.
//!
//! The graph is Dataset → DatasetVersion → File → (ordered) Chunk, with
//! `FileChunk` as the ordered join row. Rows are serde types encoded with
//! bincode when they hit the KV layer.

use core::fmt;

use serde::{Deserialize, Serialize};

use depot_chunk::{ChunkHash, StoreScheme};

use crate::error::{MetaError, MetaResult};

macro_rules! row_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        pub struct $name(u64);

        impl $name {
            /// Creates an id from a raw u64 value.
            pub fn new(id: u64) -> Self {
                Self(id)
            }

            /// Returns the raw u64 value.
            pub fn as_u64(&self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

row_id!(
    /// Identifier of a Dataset row.
    DatasetId
);
row_id!(
    /// Identifier of a DatasetVersion row.
    VersionId
);
row_id!(
    /// Identifier of a File row.
    FileId
);
row_id!(
    /// Identifier of a Chunk row.
    ChunkId
);

/// What kind of collection a dataset is.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetKind {
    /// A data collection.
    Dataset,
    /// A model artifact collection.
    Model,
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatasetKind::Dataset => write!(f, "dataset"),
            DatasetKind::Model => write!(f, "model"),
        }
    }
}

/// Fully-qualified reference to one dataset version.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionRef {
    /// Owning workspace.
    pub workspace: String,
    /// Dataset name.
    pub dataset: String,
    /// Version label, e.g. `1.0.0`.
    pub version: String,
}

impl VersionRef {
    /// Creates a reference from its three parts.
    pub fn new(
        workspace: impl Into<String>,
        dataset: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            workspace: workspace.into(),
            dataset: dataset.into(),
            version: version.into(),
        }
    }

    /// Returns the same dataset at a different version.
    pub fn at_version(&self, version: impl Into<String>) -> Self {
        Self {
            workspace: self.workspace.clone(),
            dataset: self.dataset.clone(),
            version: version.into(),
        }
    }
}

impl fmt::Display for VersionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.workspace, self.dataset, self.version)
    }
}

/// A named, versioned collection of files within a workspace.
///
/// Unique by (kind, workspace, name). Soft-deleted and recoverable until a
/// GC pass physically reclaims it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    /// Row id.
    pub id: DatasetId,
    /// Collection kind.
    pub kind: DatasetKind,
    /// Owning workspace.
    pub workspace: String,
    /// Dataset name.
    pub name: String,
    /// Soft-delete marker.
    pub deleted: bool,
}

/// One version of a dataset; immutable once committed.
///
/// Unique by (workspace, dataset, version). `editing` gates mutability.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetVersion {
    /// Row id.
    pub id: VersionId,
    /// Owning workspace.
    pub workspace: String,
    /// Owning dataset name.
    pub dataset: String,
    /// Version label.
    pub version: String,
    /// True while the version accepts writes.
    pub editing: bool,
    /// Soft-delete marker.
    pub deleted: bool,
    /// Commit / creation message.
    pub message: String,
    /// Total size in bytes of the version's live files.
    pub size: u64,
}

impl DatasetVersion {
    /// Returns this row's fully-qualified reference.
    pub fn version_ref(&self) -> VersionRef {
        VersionRef::new(
            self.workspace.clone(),
            self.dataset.clone(),
            self.version.clone(),
        )
    }
}

/// One file path within one dataset version.
///
/// Unique by (workspace, dataset, version, path).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRow {
    /// Row id.
    pub id: FileId,
    /// Owning workspace.
    pub workspace: String,
    /// Owning dataset name.
    pub dataset: String,
    /// Owning version label.
    pub version: String,
    /// Path within the version's virtual tree, no leading slash.
    pub path: String,
    /// File size in bytes.
    pub size: u64,
    /// Unix mode bits.
    pub mode: u32,
    /// Soft-delete marker.
    pub deleted: bool,
}

/// One content-addressed chunk.
///
/// Unique by hash within a storage scheme; referenced by any number of
/// files through [`FileChunkRow`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRow {
    /// Row id.
    pub id: ChunkId,
    /// SHA-512 of the chunk bytes.
    pub hash: ChunkHash,
    /// Chunk size in bytes.
    pub size: u64,
    /// Storage scheme the blob lives under.
    pub scheme: StoreScheme,
}

/// Ordered association between a file and one of its chunks.
///
/// `index` is the chunk's byte-order position within the file, dense from
/// zero; concatenating chunk bytes in index order reproduces the file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChunkRow {
    /// Owning file.
    pub file_id: FileId,
    /// Referenced chunk.
    pub chunk_id: ChunkId,
    /// Position of the chunk within the file.
    pub index: u32,
}

/// Default mode for files declared without one.
pub const DEFAULT_FILE_MODE: u32 = 0o644;

/// One chunk reference inside a declared file structure.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkDecl {
    /// Chunk digest.
    pub hash: ChunkHash,
    /// Chunk size in bytes.
    pub size: u64,
    /// Scheme the blob was stored under.
    pub scheme: StoreScheme,
}

/// One file inside a declared file structure.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDecl {
    /// Path within the version, with or without a leading slash.
    pub path: String,
    /// Unix mode bits.
    pub mode: u32,
    /// The file's chunks in byte order.
    pub chunks: Vec<ChunkDecl>,
}

impl FileDecl {
    /// Creates a declaration with the default file mode.
    pub fn new(path: impl Into<String>, chunks: Vec<ChunkDecl>) -> Self {
        Self {
            path: path.into(),
            mode: DEFAULT_FILE_MODE,
            chunks,
        }
    }

    /// Total declared size: the sum of the chunk sizes.
    pub fn size(&self) -> u64 {
        self.chunks.iter().map(|c| c.size).sum()
    }
}

/// The file structure a client declares for one save call.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsStructure {
    /// Declared files, order-insensitive.
    pub files: Vec<FileDecl>,
}

impl FsStructure {
    /// Creates a structure over the given declarations.
    pub fn new(files: Vec<FileDecl>) -> Self {
        Self { files }
    }
}

/// Normalizes a declared path: strips leading slashes, rejects empty paths
/// and NUL bytes.
pub fn normalize_path(path: &str) -> MetaResult<String> {
    let trimmed = path.trim_start_matches('/');
    if trimmed.is_empty() || trimmed.contains('\0') {
        return Err(MetaError::InvalidPath(path.to_string()));
    }
    Ok(trimmed.to_string())
}
