// File: crates/depot-repl/src/replica.rs

//! A non-authoritative node: local-first reads with write-back caching.
//!
//! Reads are served locally whenever the node holds the data. On a miss
//! the node resolves through its [`RemoteDatasetSource`], answers the
//! caller immediately, and persists the fetched structure and blobs in the
//! background; every later read for the same key stays local. Local writes
//! complete locally first — forwarding to a master is best-effort and
//! never blocks the local result.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::AsyncRead;
use tracing::{debug, warn};

use depot_chunk::ChunkStore;
use depot_fs::{FileStream, FsTree, NodeKind, TreeCache};
use depot_meta::{
    ChunkDecl, Dataset, DatasetKind, DatasetVersion, FileDecl, FsStructure, VersionRef,
};
use depot_version::{UploadOutcome, VersionManager};

use crate::error::{ReplError, ReplResult};
use crate::messages::InvalidateEvent;
use crate::source::RemoteDatasetSource;
use crate::watcher::InvalidationHandler;

/// Replica activity counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplicaStats {
    /// Structure fetches that had to reach a master.
    pub remote_fetches: u64,
    /// Background write-back persists completed.
    pub writebacks: u64,
    /// Best-effort forwards to a master that failed (logged only).
    pub forward_failures: u64,
}

#[derive(Default)]
struct StatsInner {
    remote_fetches: AtomicU64,
    writebacks: AtomicU64,
    forward_failures: AtomicU64,
}

/// Flattens a fetched tree back into the declared-structure form the
/// version manager persists.
fn structure_from_tree(tree: &FsTree) -> FsStructure {
    let files = tree
        .files()
        .iter()
        .map(|node| FileDecl {
            path: node.path.clone(),
            mode: node.mode,
            chunks: match &node.kind {
                NodeKind::File { chunks } => chunks.clone(),
                NodeKind::Dir { .. } => Vec::new(),
            },
        })
        .collect();
    FsStructure::new(files)
}

struct ReplicaInner {
    manager: Arc<VersionManager>,
    chunks: Arc<ChunkStore>,
    cache: Arc<TreeCache>,
    source: Arc<dyn RemoteDatasetSource>,
    stats: StatsInner,
    pending: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

/// A replica node over local stores and an upstream source. Cheap to
/// clone; clones share the same state.
#[derive(Clone)]
pub struct ReplicaNode {
    inner: Arc<ReplicaInner>,
}

impl ReplicaNode {
    /// Creates a replica over its local services and an upstream source.
    pub fn new(
        manager: Arc<VersionManager>,
        cache: Arc<TreeCache>,
        source: Arc<dyn RemoteDatasetSource>,
    ) -> Self {
        let chunks = manager.chunks().clone();
        Self {
            inner: Arc::new(ReplicaInner {
                manager,
                chunks,
                cache,
                source,
                stats: StatsInner::default(),
                pending: Mutex::new(Vec::new()),
            }),
        }
    }

    /// The local version manager.
    pub fn manager(&self) -> &Arc<VersionManager> {
        &self.inner.manager
    }

    /// The local tree cache.
    pub fn cache(&self) -> &Arc<TreeCache> {
        &self.inner.cache
    }

    /// Snapshot of the replica counters.
    pub fn stats(&self) -> ReplicaStats {
        ReplicaStats {
            remote_fetches: self.inner.stats.remote_fetches.load(Ordering::Relaxed),
            writebacks: self.inner.stats.writebacks.load(Ordering::Relaxed),
            forward_failures: self.inner.stats.forward_failures.load(Ordering::Relaxed),
        }
    }

    /// Waits for every pending background persist/forward to finish.
    /// Reads after this are guaranteed fully local.
    pub async fn flush_background(&self) {
        let handles: Vec<_> = self.inner.pending.lock().drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
    }

    fn track(&self, handle: tokio::task::JoinHandle<()>) {
        let mut pending = self.inner.pending.lock();
        pending.retain(|h| !h.is_finished());
        pending.push(handle);
    }

    /// Returns the tree of a version: cached, else local metadata, else a
    /// master — in that order. A remote hit is served immediately while
    /// structure and blobs persist in the background.
    pub async fn get_fs_structure(
        &self,
        kind: DatasetKind,
        r: &VersionRef,
    ) -> ReplResult<Arc<FsTree>> {
        let inner = &self.inner;
        if let Some(tree) = inner.cache.peek(r) {
            return Ok(tree);
        }
        if let Some(v) = inner
            .manager
            .meta()
            .get_version(r)
            .map_err(depot_version::VersionError::Meta)?
        {
            if !v.deleted {
                return Ok(inner.cache.get(r)?);
            }
        }

        let tree = Arc::new(inner.source.get_fs_structure(r).await?);
        inner.stats.remote_fetches.fetch_add(1, Ordering::Relaxed);
        inner.cache.insert(r.clone(), tree.clone());
        debug!(version = %r, "structure fetched from master");

        // Write-back cache: persist structure and blobs without blocking
        // the caller.
        let task_inner = inner.clone();
        let r = r.clone();
        let persist_tree = tree.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = task_inner.persist_fetched(kind, &r, &persist_tree).await {
                warn!(version = %r, error = %e, "write-back persist failed");
            } else {
                task_inner.stats.writebacks.fetch_add(1, Ordering::Relaxed);
            }
        });
        self.track(handle);

        Ok(tree)
    }

    /// Reads a whole file, fetching any missing blobs from a master and
    /// caching them locally first.
    pub async fn read_file(
        &self,
        kind: DatasetKind,
        r: &VersionRef,
        path: &str,
    ) -> ReplResult<Vec<u8>> {
        let tree = self.get_fs_structure(kind, r).await?;
        let node = tree
            .lookup(path)
            .ok_or_else(|| ReplError::Fs(depot_fs::FsError::PathNotFound(path.to_string())))?;
        let chunks = node.chunks().map_err(ReplError::Fs)?.to_vec();

        for chunk in &chunks {
            self.inner.ensure_chunk_local(chunk).await?;
        }
        let mut stream = FileStream::new(self.inner.chunks.clone(), chunks);
        Ok(stream.read_to_end().await?)
    }

    /// Lists datasets: locally when any are known, otherwise from a
    /// master.
    pub async fn list_datasets(&self, workspace: &str) -> ReplResult<Vec<Dataset>> {
        let local = self.inner.manager.list_datasets(workspace)?;
        if !local.is_empty() {
            return Ok(local);
        }
        self.inner.source.list_datasets(workspace).await
    }

    /// Lists versions: locally when any are known, otherwise from a
    /// master.
    pub async fn list_versions(
        &self,
        workspace: &str,
        dataset: &str,
    ) -> ReplResult<Vec<DatasetVersion>> {
        let local = self.inner.manager.list_versions(workspace, dataset)?;
        if !local.is_empty() {
            return Ok(local);
        }
        self.inner.source.list_versions(workspace, dataset).await
    }

    /// Uploads a file locally, then forwards chunks and structure to a
    /// master without blocking the local result.
    pub async fn upload_file<R: AsyncRead + Unpin>(
        &self,
        kind: DatasetKind,
        r: &VersionRef,
        path: &str,
        reader: R,
    ) -> ReplResult<UploadOutcome> {
        let outcome = self.inner.manager.upload_file(kind, r, path, reader).await?;
        self.inner.cache.purge_version(r);

        let task_inner = self.inner.clone();
        let r_owned = r.clone();
        let path_owned = outcome.path.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = task_inner.forward_file(kind, &r_owned, &path_owned).await {
                task_inner
                    .stats
                    .forward_failures
                    .fetch_add(1, Ordering::Relaxed);
                warn!(version = %r_owned, path = %path_owned, error = %e,
                      "best-effort forward failed");
            }
        });
        self.track(handle);

        Ok(outcome)
    }

    /// Deletes a version locally and forwards the delete best-effort.
    pub async fn delete_version(&self, r: &VersionRef) -> ReplResult<()> {
        self.inner.manager.delete_version(r).await?;
        self.inner.cache.purge_version(r);

        let task_inner = self.inner.clone();
        let r_owned = r.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = task_inner.source.delete_version(&r_owned).await {
                task_inner
                    .stats
                    .forward_failures
                    .fetch_add(1, Ordering::Relaxed);
                warn!(version = %r_owned, error = %e, "delete forward failed");
            }
        });
        self.track(handle);
        Ok(())
    }

    /// Deletes a dataset locally and forwards the delete best-effort.
    pub async fn delete_dataset(
        &self,
        kind: DatasetKind,
        workspace: &str,
        name: &str,
    ) -> ReplResult<()> {
        self.inner.manager.delete_dataset(kind, workspace, name).await?;
        self.inner.cache.purge_dataset(workspace, name);

        let task_inner = self.inner.clone();
        let workspace = workspace.to_string();
        let name = name.to_string();
        let handle = tokio::spawn(async move {
            if let Err(e) = task_inner.source.delete_dataset(kind, &workspace, &name).await {
                task_inner
                    .stats
                    .forward_failures
                    .fetch_add(1, Ordering::Relaxed);
                warn!(workspace = %workspace, name = %name, error = %e,
                      "delete forward failed");
            }
        });
        self.track(handle);
        Ok(())
    }
}

impl ReplicaInner {
    async fn persist_fetched(
        &self,
        kind: DatasetKind,
        r: &VersionRef,
        tree: &FsTree,
    ) -> ReplResult<()> {
        let structure = structure_from_tree(tree);
        for decl in &structure.files {
            for chunk in &decl.chunks {
                self.ensure_chunk_local(chunk).await?;
            }
        }
        self.manager.save_structure(kind, r, &structure).await?;
        debug!(version = %r, files = structure.files.len(), "write-back persisted");
        Ok(())
    }

    async fn ensure_chunk_local(&self, chunk: &ChunkDecl) -> ReplResult<()> {
        if self.chunks.check(&chunk.hash, chunk.scheme).await?.is_some() {
            return Ok(());
        }
        let data = self.source.download_chunk(&chunk.hash, chunk.scheme).await?;
        self.chunks.put(&chunk.hash, chunk.scheme, &data).await?;
        Ok(())
    }

    async fn forward_file(&self, kind: DatasetKind, r: &VersionRef, path: &str) -> ReplResult<()> {
        let meta = self.manager.meta();
        let file = meta
            .get_file(r, path)
            .map_err(depot_version::VersionError::Meta)?
            .ok_or_else(|| ReplError::Fs(depot_fs::FsError::PathNotFound(path.to_string())))?;
        let mut decls = Vec::new();
        for (_, row) in meta
            .chunks_of_file(&file)
            .map_err(depot_version::VersionError::Meta)?
        {
            let decl = ChunkDecl {
                hash: row.hash,
                size: row.size,
                scheme: row.scheme,
            };
            if self.source.check_chunk(&decl.hash, decl.scheme).await?.is_none() {
                let data = self.chunks.get_bytes(&decl.hash, decl.scheme).await?;
                self.source
                    .save_chunk(&decl.hash, decl.scheme, data.into())
                    .await?;
            }
            decls.push(decl);
        }
        let structure = FsStructure::new(vec![FileDecl {
            path: file.path.clone(),
            mode: file.mode,
            chunks: decls,
        }]);
        self.source.commit_file_structure(kind, r, &structure).await
    }
}

#[async_trait]
impl InvalidationHandler for ReplicaNode {
    /// Applies an upstream delete locally: the entity goes through the
    /// normal delete path (gate, soft-delete, GC signal) and its cached
    /// trees are purged. An entity this node never held is a no-op.
    async fn handle(&self, event: InvalidateEvent) -> ReplResult<()> {
        match event {
            InvalidateEvent::DatasetDeleted {
                dataset_kind,
                workspace,
                name,
            } => {
                match self
                    .inner
                    .manager
                    .delete_dataset(dataset_kind, &workspace, &name)
                    .await
                {
                    Ok(()) => {}
                    Err(e) if e.is_not_found() => {}
                    Err(e) => return Err(e.into()),
                }
                self.inner.cache.purge_dataset(&workspace, &name);
            }
            InvalidateEvent::VersionDeleted {
                workspace,
                dataset,
                version,
            } => {
                let r = VersionRef::new(workspace, dataset, version);
                match self.inner.manager.delete_version(&r).await {
                    Ok(()) => {}
                    Err(e) if e.is_not_found() => {}
                    Err(e) => return Err(e.into()),
                }
                self.inner.cache.purge_version(&r);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::LocalSource;
    use depot_fs::FsBuilder;
    use depot_meta::{MemoryKvStore, MetadataStore};
    use depot_version::{MaintenanceGate, UploadSlots};
    use std::io::Cursor;

    struct Cluster {
        _dirs: Vec<tempfile::TempDir>,
        master_manager: Arc<VersionManager>,
        master_source: Arc<LocalSource>,
        replica: ReplicaNode,
    }

    async fn new_node(dir: &tempfile::TempDir) -> Arc<VersionManager> {
        let meta = Arc::new(MetadataStore::open(Arc::new(MemoryKvStore::new())).unwrap());
        let chunks = Arc::new(ChunkStore::open(dir.path()).await.unwrap());
        Arc::new(
            VersionManager::new(meta, chunks, MaintenanceGate::new(), UploadSlots::new(4))
                .with_block_size(8),
        )
    }

    async fn cluster() -> Cluster {
        let master_dir = tempfile::tempdir().unwrap();
        let replica_dir = tempfile::tempdir().unwrap();

        let master_manager = new_node(&master_dir).await;
        let master_source = Arc::new(LocalSource::new(master_manager.clone()));

        let replica_manager = new_node(&replica_dir).await;
        let cache = Arc::new(TreeCache::new(FsBuilder::new(
            replica_manager.meta().clone(),
        )));
        let replica = ReplicaNode::new(replica_manager, cache, master_source.clone());

        Cluster {
            _dirs: vec![master_dir, replica_dir],
            master_manager,
            master_source,
            replica,
        }
    }

    fn vref() -> VersionRef {
        VersionRef::new("ws", "d", "1.0.0")
    }

    #[tokio::test]
    async fn test_first_read_fetches_then_serves_locally() {
        let c = cluster().await;
        c.master_manager
            .upload_file(
                DatasetKind::Dataset,
                &vref(),
                "a.txt",
                Cursor::new(b"replicated".to_vec()),
            )
            .await
            .unwrap();

        let tree = c
            .replica
            .get_fs_structure(DatasetKind::Dataset, &vref())
            .await
            .unwrap();
        assert!(tree.lookup("a.txt").is_some());
        assert_eq!(c.master_source.calls().get_fs_structure, 1);
        assert_eq!(c.replica.stats().remote_fetches, 1);

        // Second call: no additional remote call.
        c.replica
            .get_fs_structure(DatasetKind::Dataset, &vref())
            .await
            .unwrap();
        assert_eq!(c.master_source.calls().get_fs_structure, 1);
        assert_eq!(c.replica.stats().remote_fetches, 1);
    }

    #[tokio::test]
    async fn test_writeback_persists_structure_and_blobs() {
        let c = cluster().await;
        c.master_manager
            .upload_file(
                DatasetKind::Dataset,
                &vref(),
                "a.txt",
                Cursor::new(b"cached bytes!".to_vec()),
            )
            .await
            .unwrap();

        c.replica
            .get_fs_structure(DatasetKind::Dataset, &vref())
            .await
            .unwrap();
        c.replica.flush_background().await;
        assert_eq!(c.replica.stats().writebacks, 1);

        // Even with the cache dropped, the structure now lives locally.
        c.replica.cache().purge_version(&vref());
        c.replica
            .get_fs_structure(DatasetKind::Dataset, &vref())
            .await
            .unwrap();
        assert_eq!(c.master_source.calls().get_fs_structure, 1);

        // Blobs came along, so reads are fully local too.
        let data = c
            .replica
            .read_file(DatasetKind::Dataset, &vref(), "a.txt")
            .await
            .unwrap();
        assert_eq!(data, b"cached bytes!");
        assert_eq!(c.master_source.calls().download_chunk, 2); // 13 bytes / block 8
    }

    #[tokio::test]
    async fn test_missing_everywhere_surfaces_not_found() {
        let c = cluster().await;
        let err = c
            .replica
            .get_fs_structure(DatasetKind::Dataset, &vref())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_local_write_forwards_to_master() {
        let c = cluster().await;
        c.replica
            .upload_file(
                DatasetKind::Dataset,
                &vref(),
                "up.bin",
                Cursor::new(b"pushed".to_vec()),
            )
            .await
            .unwrap();
        c.replica.flush_background().await;

        // The master now holds structure and blob.
        let tree = c.master_source.get_fs_structure(&vref()).await.unwrap();
        assert!(tree.lookup("up.bin").is_some());
        assert_eq!(c.replica.stats().forward_failures, 0);
    }

    #[tokio::test]
    async fn test_invalidation_deletes_local_copy_and_cache() {
        let c = cluster().await;
        c.master_manager
            .upload_file(
                DatasetKind::Dataset,
                &vref(),
                "a.txt",
                Cursor::new(b"to be purged".to_vec()),
            )
            .await
            .unwrap();
        c.replica
            .get_fs_structure(DatasetKind::Dataset, &vref())
            .await
            .unwrap();
        c.replica.flush_background().await;
        assert!(!c.replica.cache().is_empty());

        c.replica
            .handle(InvalidateEvent::VersionDeleted {
                workspace: "ws".to_string(),
                dataset: "d".to_string(),
                version: "1.0.0".to_string(),
            })
            .await
            .unwrap();

        assert!(c.replica.cache().is_empty());
        assert!(c
            .replica
            .manager()
            .list_versions("ws", "d")
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_invalidation_for_unknown_entity_is_noop() {
        let c = cluster().await;
        c.replica
            .handle(InvalidateEvent::DatasetDeleted {
                dataset_kind: DatasetKind::Dataset,
                workspace: "ws".to_string(),
                name: "never-seen".to_string(),
            })
            .await
            .unwrap();
    }
}
