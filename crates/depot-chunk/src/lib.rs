#![warn(missing_docs)]

//! Depot chunk subsystem: fixed-size chunking and content-addressed blobs.
//!
//! This crate provides the byte-level foundation of the depot backend:
//! splitting uploads into fixed-size SHA-512-addressed blocks and storing
//! each block exactly once under a fan-out directory layout.

pub mod chunker;
pub mod error;
pub mod hash;
pub mod store;

pub use chunker::{Chunk, Chunker, DEFAULT_BLOCK_SIZE};
pub use error::{ChunkError, ChunkResult};
pub use hash::{ChunkHash, StoreScheme, HASH_LEN};
pub use store::{ChunkStore, ChunkStoreStats};
