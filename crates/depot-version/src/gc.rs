//! Garbage collection: reclaiming rows and blobs nothing references.
//!
//! A pass runs on a periodic timer or an on-demand signal, holds the
//! maintenance gate while it works, and is idempotent: with nothing
//! orphaned it is a no-op. Item failures are logged and skipped; a pass
//! never fails the process.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use depot_chunk::ChunkStore;
use depot_meta::{ChunkId, MetadataStore};

use crate::gate::MaintenanceGate;

/// Configuration for the collector's background loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GcConfig {
    /// Seconds between periodic passes.
    pub interval_secs: u64,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self { interval_secs: 300 }
    }
}

/// Counters for one GC pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcPassReport {
    /// File rows physically removed.
    pub files_purged: u64,
    /// Chunk rows (and blobs) physically removed.
    pub chunks_purged: u64,
    /// Version rows physically removed.
    pub versions_purged: u64,
    /// Dataset rows physically removed.
    pub datasets_purged: u64,
    /// Items skipped after an error.
    pub items_skipped: u64,
}

impl GcPassReport {
    /// True when the pass reclaimed nothing.
    pub fn is_noop(&self) -> bool {
        *self == GcPassReport::default()
    }
}

/// Cumulative collector statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GcStats {
    /// Passes completed.
    pub passes: u64,
    /// File rows removed over all passes.
    pub files_purged: u64,
    /// Chunk rows removed over all passes.
    pub chunks_purged: u64,
}

#[derive(Default)]
struct StatsInner {
    passes: AtomicU64,
    files_purged: AtomicU64,
    chunks_purged: AtomicU64,
}

/// Best-effort collector of referentially orphaned rows and blobs.
pub struct GarbageCollector {
    meta: Arc<MetadataStore>,
    chunks: Arc<ChunkStore>,
    gate: MaintenanceGate,
    stats: StatsInner,
}

impl GarbageCollector {
    /// Creates a collector over the shared stores and gate.
    pub fn new(meta: Arc<MetadataStore>, chunks: Arc<ChunkStore>, gate: MaintenanceGate) -> Self {
        Self {
            meta,
            chunks,
            gate,
            stats: StatsInner::default(),
        }
    }

    /// Runs one pass. Holds the gate for its duration so mutators queue
    /// behind it; per-item failures are logged and the pass continues.
    pub async fn run_pass(&self) -> GcPassReport {
        let _pass = self.gate.begin();
        let mut report = GcPassReport::default();
        let mut touched: HashSet<ChunkId> = HashSet::new();

        // Soft-deleted datasets cascade to their versions first.
        match self.meta.list_deleted_datasets() {
            Ok(datasets) => {
                for ds in datasets {
                    match self.meta.versions_of_dataset_any(&ds.workspace, &ds.name) {
                        Ok(versions) => {
                            for v in versions.iter().filter(|v| !v.deleted) {
                                if let Err(e) = self.meta.soft_delete_version(&v.version_ref()) {
                                    warn!(version = %v.version_ref(), error = %e,
                                          "gc: cascade delete failed");
                                    report.items_skipped += 1;
                                }
                            }
                        }
                        Err(e) => {
                            warn!(dataset = %ds.name, error = %e, "gc: version listing failed");
                            report.items_skipped += 1;
                        }
                    }
                }
            }
            Err(e) => warn!(error = %e, "gc: deleted dataset listing failed"),
        }

        // Deleted versions lose their file and link rows.
        match self.meta.list_deleted_versions() {
            Ok(versions) => {
                for v in versions {
                    let r = v.version_ref();
                    match self.meta.files_of_version(&r, true) {
                        Ok(files) => {
                            let mut all_purged = true;
                            for file in files {
                                match self.meta.purge_file(&file) {
                                    Ok(chunk_ids) => {
                                        report.files_purged += 1;
                                        touched.extend(chunk_ids);
                                    }
                                    Err(e) => {
                                        warn!(path = %file.path, error = %e,
                                              "gc: file purge failed");
                                        report.items_skipped += 1;
                                        all_purged = false;
                                    }
                                }
                            }
                            if all_purged {
                                match self.meta.purge_version(&v) {
                                    Ok(()) => report.versions_purged += 1,
                                    Err(e) => {
                                        warn!(version = %r, error = %e,
                                              "gc: version purge failed");
                                        report.items_skipped += 1;
                                    }
                                }
                            }
                        }
                        Err(e) => {
                            warn!(version = %r, error = %e, "gc: file listing failed");
                            report.items_skipped += 1;
                        }
                    }
                }
            }
            Err(e) => warn!(error = %e, "gc: deleted version listing failed"),
        }

        // Files soft-deleted inside still-live versions.
        match self.meta.list_deleted_files() {
            Ok(files) => {
                for file in files {
                    match self.meta.purge_file(&file) {
                        Ok(chunk_ids) => {
                            report.files_purged += 1;
                            touched.extend(chunk_ids);
                        }
                        Err(e) => {
                            warn!(path = %file.path, error = %e, "gc: file purge failed");
                            report.items_skipped += 1;
                        }
                    }
                }
            }
            Err(e) => warn!(error = %e, "gc: deleted file listing failed"),
        }

        // Recount every touched chunk; zero references means the row and
        // its blob both go.
        for chunk_id in touched {
            match self.meta.chunk_ref_count(chunk_id) {
                Ok(0) => match self.meta.purge_chunk(chunk_id) {
                    Ok(row) => {
                        report.chunks_purged += 1;
                        if let Err(e) = self.chunks.delete(&row.hash, row.scheme).await {
                            warn!(hash = %row.hash, error = %e, "gc: blob delete failed");
                            report.items_skipped += 1;
                        }
                    }
                    Err(e) => {
                        warn!(chunk = %chunk_id, error = %e, "gc: chunk purge failed");
                        report.items_skipped += 1;
                    }
                },
                Ok(_) => {}
                Err(e) => {
                    warn!(chunk = %chunk_id, error = %e, "gc: recount failed");
                    report.items_skipped += 1;
                }
            }
        }

        // Deleted datasets with no remaining versions disappear for good.
        match self.meta.list_deleted_datasets() {
            Ok(datasets) => {
                for ds in datasets {
                    match self.meta.versions_of_dataset_any(&ds.workspace, &ds.name) {
                        Ok(versions) if versions.is_empty() => {
                            match self.meta.purge_dataset(&ds) {
                                Ok(()) => report.datasets_purged += 1,
                                Err(e) => {
                                    warn!(dataset = %ds.name, error = %e,
                                          "gc: dataset purge failed");
                                    report.items_skipped += 1;
                                }
                            }
                        }
                        Ok(_) => {}
                        Err(e) => {
                            warn!(dataset = %ds.name, error = %e, "gc: version listing failed");
                            report.items_skipped += 1;
                        }
                    }
                }
            }
            Err(e) => warn!(error = %e, "gc: deleted dataset listing failed"),
        }

        self.stats.passes.fetch_add(1, Ordering::Relaxed);
        self.stats
            .files_purged
            .fetch_add(report.files_purged, Ordering::Relaxed);
        self.stats
            .chunks_purged
            .fetch_add(report.chunks_purged, Ordering::Relaxed);

        if report.is_noop() {
            debug!("gc pass: nothing to reclaim");
        } else {
            info!(?report, "gc pass completed");
        }
        report
    }

    /// Snapshot of the cumulative statistics.
    pub fn stats(&self) -> GcStats {
        GcStats {
            passes: self.stats.passes.load(Ordering::Relaxed),
            files_purged: self.stats.files_purged.load(Ordering::Relaxed),
            chunks_purged: self.stats.chunks_purged.load(Ordering::Relaxed),
        }
    }

    /// Spawns the background loop: a pass per `interval` tick and one per
    /// on-demand signal. Abort the returned handle to stop the loop.
    pub fn spawn(self: Arc<Self>, config: GcConfig) -> tokio::task::JoinHandle<()> {
        let interval = Duration::from_secs(config.interval_secs.max(1));
        tokio::spawn(async move {
            loop {
                if !self.gate.take_pending() {
                    tokio::select! {
                        _ = tokio::time::sleep(interval) => {}
                        _ = self.gate.triggered() => {}
                    }
                    self.gate.take_pending();
                }
                self.run_pass().await;
            }
        })
    }
}
