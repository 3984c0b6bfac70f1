#![warn(missing_docs)]

//! Depot replication subsystem: master failover, replica write-back
//! caching, and cache invalidation between nodes.
//!
//! A non-authoritative node reaches masters through the
//! [`RemoteDatasetSource`] capability interface — one implementation per
//! topology: the in-process [`LocalSource`] for a single endpoint and
//! [`FailoverSource`] for an ordered list. Delete notifications flow from
//! the master's [`InvalidationHub`] to each replica's [`Watcher`].

pub mod error;
pub mod failover;
pub mod hub;
pub mod messages;
pub mod replica;
pub mod source;
pub mod watcher;

pub use error::{ReplError, ReplResult};
pub use failover::{FailoverSource, DEFAULT_CALL_TIMEOUT};
pub use hub::InvalidationHub;
pub use messages::{InvalidateEvent, LAST_MESSAGES_CAP};
pub use replica::{ReplicaNode, ReplicaStats};
pub use source::{LocalSource, RemoteDatasetSource, SourceCalls};
pub use watcher::{
    next_backoff, BroadcastConnector, HubConnection, HubConnector, InvalidationHandler, Watcher,
    WatcherConfig, WatcherState,
};
