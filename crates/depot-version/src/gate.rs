//! Coordination services shared by the version manager and the garbage
//! collector.
//!
//! Both are explicit objects owned by the top-level server and injected
//! into their users; nothing here is process-global state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};

/// Cooperative gate between GC passes and metadata mutation.
///
/// A mutator calls [`wait_completed`](MaintenanceGate::wait_completed)
/// before touching metadata, so an in-flight pass finishes first. The gate
/// is not a lock: a mutation already past the gate is never paused, and a
/// new mutation may begin the moment a pass ends.
#[derive(Clone)]
pub struct MaintenanceGate {
    inner: Arc<GateInner>,
}

struct GateInner {
    running: AtomicBool,
    done: Notify,
    trigger: Notify,
    pending: AtomicBool,
}

impl MaintenanceGate {
    /// Creates a gate with no pass in flight.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(GateInner {
                running: AtomicBool::new(false),
                done: Notify::new(),
                trigger: Notify::new(),
                pending: AtomicBool::new(false),
            }),
        }
    }

    /// Marks a pass as in flight. The returned guard ends the pass (and
    /// releases all waiters) when dropped.
    pub fn begin(&self) -> GatePass {
        self.inner.running.store(true, Ordering::Release);
        GatePass {
            inner: self.inner.clone(),
        }
    }

    /// True while a pass is in flight.
    pub fn pass_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Waits for any in-flight pass to finish. Returns immediately when
    /// none is running.
    pub async fn wait_completed(&self) {
        loop {
            let notified = self.inner.done.notified();
            if !self.inner.running.load(Ordering::Acquire) {
                return;
            }
            notified.await;
        }
    }

    /// Requests an on-demand pass (administrative or post-delete).
    pub fn signal(&self) {
        self.inner.pending.store(true, Ordering::Release);
        self.inner.trigger.notify_one();
    }

    /// Consumes a pending on-demand request, if any.
    pub fn take_pending(&self) -> bool {
        self.inner.pending.swap(false, Ordering::AcqRel)
    }

    /// Resolves when an on-demand pass is requested.
    pub async fn triggered(&self) {
        self.inner.trigger.notified().await;
    }
}

impl Default for MaintenanceGate {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard for one GC pass.
pub struct GatePass {
    inner: Arc<GateInner>,
}

impl Drop for GatePass {
    fn drop(&mut self) {
        self.inner.running.store(false, Ordering::Release);
        self.inner.done.notify_waiters();
    }
}

/// Counting semaphore bounding concurrent upload operations.
#[derive(Clone)]
pub struct UploadSlots {
    sem: Arc<Semaphore>,
    capacity: usize,
}

impl UploadSlots {
    /// Creates a pool with `capacity` concurrent slots.
    pub fn new(capacity: usize) -> Self {
        Self {
            sem: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Acquires one slot, waiting until one frees up.
    pub async fn acquire(&self) -> OwnedSemaphorePermit {
        self.sem
            .clone()
            .acquire_owned()
            .await
            .expect("upload semaphore never closed")
    }

    /// Acquires one slot without waiting, or `None` when all are taken.
    pub fn try_acquire(&self) -> Option<OwnedSemaphorePermit> {
        self.sem.clone().try_acquire_owned().ok()
    }

    /// Total slot count.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Currently free slots.
    pub fn available(&self) -> usize {
        self.sem.available_permits()
    }
}
