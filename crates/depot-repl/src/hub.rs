// File: crates/depot-repl/src/hub.rs

//! Master-side broadcast channel for delete notifications.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::debug;

use crate::messages::{InvalidateEvent, LAST_MESSAGES_CAP};

/// Default broadcast buffer depth per subscriber.
const CHANNEL_CAPACITY: usize = 64;

/// Fan-out point for invalidation events.
///
/// Replicas subscribe for live events; a bounded ring of the most recent
/// messages stays answerable synchronously for late-joining inquirers.
pub struct InvalidationHub {
    tx: broadcast::Sender<InvalidateEvent>,
    recent: Mutex<VecDeque<InvalidateEvent>>,
}

impl InvalidationHub {
    /// Creates a hub with the default channel capacity.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            tx,
            recent: Mutex::new(VecDeque::with_capacity(LAST_MESSAGES_CAP)),
        }
    }

    /// Broadcasts one event. Returns how many subscribers received it.
    pub fn publish(&self, event: InvalidateEvent) -> usize {
        {
            let mut recent = self.recent.lock();
            if recent.len() == LAST_MESSAGES_CAP {
                recent.pop_front();
            }
            recent.push_back(event.clone());
        }
        let delivered = self.tx.send(event.clone()).unwrap_or(0);
        debug!(?event, delivered, "invalidation published");
        delivered
    }

    /// Opens a live subscription.
    pub fn subscribe(&self) -> broadcast::Receiver<InvalidateEvent> {
        self.tx.subscribe()
    }

    /// The last few published events, oldest first.
    pub fn last_messages(&self) -> Vec<InvalidateEvent> {
        self.recent.lock().iter().cloned().collect()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for InvalidationHub {
    fn default() -> Self {
        Self::new()
    }
}
