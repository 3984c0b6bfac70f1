// File: crates/depot-repl/src/messages.rs

//! Invalidation messages exchanged between master and replicas.
//!
//! The payload is a closed tagged-variant type, decoded exactly once at
//! the channel boundary; nothing downstream sees an untyped map.

use serde::{Deserialize, Serialize};

use depot_meta::{DatasetKind, VersionRef};

use crate::error::{ReplError, ReplResult};

/// How many received messages the hub retains for late-joining inquirers.
pub const LAST_MESSAGES_CAP: usize = 5;

/// A delete notification broadcast from a master.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InvalidateEvent {
    /// A dataset was deleted upstream.
    #[serde(rename = "dataset")]
    DatasetDeleted {
        /// Collection kind of the dataset.
        dataset_kind: DatasetKind,
        /// Owning workspace.
        workspace: String,
        /// Dataset name.
        name: String,
    },
    /// A dataset version was deleted upstream.
    #[serde(rename = "dataset_version")]
    VersionDeleted {
        /// Owning workspace.
        workspace: String,
        /// Owning dataset name.
        dataset: String,
        /// Version label.
        version: String,
    },
}

impl InvalidateEvent {
    /// Builds the version reference of a version-deleted event.
    pub fn version_ref(&self) -> Option<VersionRef> {
        match self {
            InvalidateEvent::VersionDeleted {
                workspace,
                dataset,
                version,
            } => Some(VersionRef::new(
                workspace.clone(),
                dataset.clone(),
                version.clone(),
            )),
            InvalidateEvent::DatasetDeleted { .. } => None,
        }
    }

    /// Encodes the event for the wire.
    pub fn encode(&self) -> ReplResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| ReplError::Decode(e.to_string()))
    }

    /// Decodes one event at the channel boundary.
    pub fn decode(bytes: &[u8]) -> ReplResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| ReplError::Decode(e.to_string()))
    }
}
