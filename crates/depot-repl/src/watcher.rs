// File: crates/depot-repl/src/watcher.rs

//! Replica-side watcher: one persistent subscription to a master's
//! broadcast channel.
//!
//! State machine: **Connecting** — on failure, wait with a doubling delay
//! capped at a fixed ceiling, retry; on success → **Receiving**, with a
//! periodic heartbeat; any heartbeat or receive failure drops back to
//! Connecting. Events are handed to the injected handler, which performs
//! the local delete and cache purge under the global mutation gate.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ReplError, ReplResult};
use crate::hub::InvalidationHub;
use crate::messages::InvalidateEvent;

/// One live connection to a hub.
#[async_trait]
pub trait HubConnection: Send {
    /// Waits for the next event.
    async fn recv(&mut self) -> ReplResult<InvalidateEvent>;

    /// Heartbeat; an error means the connection is dead.
    async fn ping(&mut self) -> ReplResult<()>;
}

/// Factory for hub connections, one per (re)connect attempt.
#[async_trait]
pub trait HubConnector: Send + Sync + 'static {
    /// The connection type produced.
    type Conn: HubConnection;

    /// Establishes a fresh connection.
    async fn connect(&self) -> ReplResult<Self::Conn>;
}

/// Applies an invalidation event on the local node.
#[async_trait]
pub trait InvalidationHandler: Send + Sync {
    /// Deletes the named entity locally and purges caches.
    async fn handle(&self, event: InvalidateEvent) -> ReplResult<()>;
}

/// In-process connector over a hub's broadcast channel. Production
/// deployments put the websocket transport behind the same pair of traits.
pub struct BroadcastConnector {
    hub: Arc<InvalidationHub>,
}

impl BroadcastConnector {
    /// Connects to an in-process hub.
    pub fn new(hub: Arc<InvalidationHub>) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl HubConnector for BroadcastConnector {
    type Conn = BroadcastConnection;

    async fn connect(&self) -> ReplResult<Self::Conn> {
        Ok(BroadcastConnection {
            rx: self.hub.subscribe(),
        })
    }
}

/// Connection half of [`BroadcastConnector`].
pub struct BroadcastConnection {
    rx: broadcast::Receiver<InvalidateEvent>,
}

#[async_trait]
impl HubConnection for BroadcastConnection {
    async fn recv(&mut self) -> ReplResult<InvalidateEvent> {
        self.rx.recv().await.map_err(|e| ReplError::Network {
            msg: format!("broadcast channel: {e}"),
        })
    }

    async fn ping(&mut self) -> ReplResult<()> {
        Ok(())
    }
}

/// Watcher pacing configuration.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Seconds between heartbeats while receiving.
    pub heartbeat_secs: u64,
    /// First reconnect delay in milliseconds.
    pub initial_backoff_ms: u64,
    /// Reconnect delay ceiling in milliseconds.
    pub max_backoff_ms: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            heartbeat_secs: 30,
            initial_backoff_ms: 100,
            max_backoff_ms: 30_000,
        }
    }
}

/// Observable watcher state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatcherState {
    /// Trying to reach the hub.
    Connecting {
        /// Attempt number since the last healthy connection.
        attempt: u32,
    },
    /// Connected and processing events.
    Receiving,
}

/// Doubles a backoff delay up to the ceiling.
pub fn next_backoff(current_ms: u64, max_ms: u64) -> u64 {
    current_ms.saturating_mul(2).min(max_ms)
}

/// The replica's persistent hub subscription.
pub struct Watcher<C: HubConnector> {
    connector: C,
    handler: Arc<dyn InvalidationHandler>,
    config: WatcherConfig,
    session_id: Uuid,
}

impl<C: HubConnector> Watcher<C> {
    /// Creates a watcher; nothing runs until [`spawn`](Watcher::spawn).
    pub fn new(connector: C, handler: Arc<dyn InvalidationHandler>, config: WatcherConfig) -> Self {
        Self {
            connector,
            handler,
            config,
            session_id: Uuid::new_v4(),
        }
    }

    /// Starts the reconnect loop. Returns the task handle and a state
    /// receiver; abort the handle to stop watching.
    pub fn spawn(self) -> (tokio::task::JoinHandle<()>, watch::Receiver<WatcherState>) {
        let (state_tx, state_rx) = watch::channel(WatcherState::Connecting { attempt: 0 });
        let session = self.session_id;
        info!(%session, "watcher starting");

        let handle = tokio::spawn(async move {
            let mut backoff_ms = self.config.initial_backoff_ms;
            let mut attempt = 0u32;

            loop {
                // Connecting.
                let mut conn = loop {
                    attempt += 1;
                    let _ = state_tx.send(WatcherState::Connecting { attempt });
                    match self.connector.connect().await {
                        Ok(conn) => break conn,
                        Err(e) => {
                            let jitter = rand::thread_rng().gen_range(0..=backoff_ms / 4 + 1);
                            warn!(%session, attempt, error = %e, delay_ms = backoff_ms + jitter,
                                  "hub connect failed");
                            tokio::time::sleep(Duration::from_millis(backoff_ms + jitter)).await;
                            backoff_ms = next_backoff(backoff_ms, self.config.max_backoff_ms);
                        }
                    }
                };

                backoff_ms = self.config.initial_backoff_ms;
                attempt = 0;
                let _ = state_tx.send(WatcherState::Receiving);
                debug!(%session, "watcher receiving");

                // Receiving, with periodic heartbeat.
                let mut heartbeat =
                    tokio::time::interval(Duration::from_secs(self.config.heartbeat_secs.max(1)));
                heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                heartbeat.tick().await; // first tick is immediate

                loop {
                    tokio::select! {
                        _ = heartbeat.tick() => {
                            if let Err(e) = conn.ping().await {
                                warn!(%session, error = %e, "heartbeat failed, reconnecting");
                                break;
                            }
                        }
                        event = conn.recv() => match event {
                            Ok(event) => {
                                debug!(%session, ?event, "invalidation received");
                                if let Err(e) = self.handler.handle(event).await {
                                    warn!(%session, error = %e, "invalidation handling failed");
                                }
                            }
                            Err(e) => {
                                warn!(%session, error = %e, "receive failed, reconnecting");
                                break;
                            }
                        }
                    }
                }
            }
        });

        (handle, state_rx)
    }
}
