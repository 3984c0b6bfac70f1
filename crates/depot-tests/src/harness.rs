//! Shared fixtures for the integration suites.

use std::sync::Arc;

use depot_chunk::ChunkStore;
use depot_fs::{FsBuilder, TreeCache};
use depot_meta::{MemoryKvStore, MetadataStore, VersionRef};
use depot_version::{GarbageCollector, MaintenanceGate, UploadSlots, VersionManager};

/// Block size used across the suites; small enough that short payloads
/// split into several chunks.
pub const TEST_BLOCK_SIZE: usize = 8;

/// One fully wired node: stores, manager, collector and tree cache.
pub struct TestNode {
    /// Blob directory; dropped last.
    pub dir: tempfile::TempDir,
    /// The node's metadata store.
    pub meta: Arc<MetadataStore>,
    /// The node's blob store.
    pub chunks: Arc<ChunkStore>,
    /// Gate shared by the manager and the collector.
    pub gate: MaintenanceGate,
    /// Mutation gateway.
    pub manager: Arc<VersionManager>,
    /// Garbage collector over the same stores.
    pub gc: Arc<GarbageCollector>,
    /// Tree cache over the node's metadata.
    pub cache: Arc<TreeCache>,
}

impl TestNode {
    /// Builds a node with in-memory metadata and a temp blob directory.
    pub async fn start() -> anyhow::Result<TestNode> {
        let dir = tempfile::tempdir()?;
        let meta = Arc::new(MetadataStore::open(Arc::new(MemoryKvStore::new()))?);
        let chunks = Arc::new(ChunkStore::open(dir.path()).await?);
        let gate = MaintenanceGate::new();
        let manager = Arc::new(
            VersionManager::new(
                meta.clone(),
                chunks.clone(),
                gate.clone(),
                UploadSlots::new(4),
            )
            .with_block_size(TEST_BLOCK_SIZE),
        );
        let gc = Arc::new(GarbageCollector::new(
            meta.clone(),
            chunks.clone(),
            gate.clone(),
        ));
        let cache = Arc::new(TreeCache::new(FsBuilder::new(meta.clone())));
        Ok(TestNode {
            dir,
            meta,
            chunks,
            gate,
            manager,
            gc,
            cache,
        })
    }

    /// Fresh builder over this node's metadata.
    pub fn builder(&self) -> FsBuilder {
        FsBuilder::new(self.meta.clone())
    }
}

/// The version reference the suites default to.
pub fn v1() -> VersionRef {
    VersionRef::new("ws", "d", "1.0.0")
}

/// Installs a fmt subscriber once, honoring `RUST_LOG`. Call at the top of
/// a test to see depot's tracing output while debugging it.
pub fn init_tracing() {
    use std::sync::Once;
    static ONCE: Once = Once::new();
    ONCE.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}
