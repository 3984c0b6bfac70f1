#![warn(missing_docs)]

//! Depot virtual filesystem subsystem.
//!
//! Reconstructs a directory tree and seekable file streams from the
//! metadata graph, serializes trees for transport to remote consumers, and
//! exports whole versions as tar archives.

pub mod archive;
pub mod builder;
pub mod error;
pub mod file;
pub mod serialize;
pub mod tree;

pub use archive::export_tar;
pub use builder::{FsBuilder, TreeCache};
pub use error::{FsError, FsResult};
pub use file::FileStream;
pub use serialize::{decode_tree, encode_tree, TreeFormat};
pub use tree::{FsNode, FsTree, NodeKind, TreeEntry, DEFAULT_DIR_MODE};
