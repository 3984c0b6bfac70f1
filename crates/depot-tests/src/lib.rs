//! Depot integration suites.
//!
//! Cross-crate scenarios that exercise the whole backend: upload through
//! chunking and metadata, tree reconstruction, commit semantics, garbage
//! collection, and the master/replica protocol. Unit tests live with their
//! crates; everything here spans at least two subsystems.

pub mod harness;
pub mod lifecycle;
pub mod replication;
