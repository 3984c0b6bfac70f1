// File: crates/depot-repl/src/source.rs

//! The capability interface a node uses to reach authoritative data.
//!
//! Production deployments put an HTTP transport behind this trait; the
//! in-process [`LocalSource`] adapter serves the same contract straight
//! from a master's stores, and doubles as the test double. Either way the
//! caller only ever sees [`RemoteDatasetSource`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use depot_chunk::{ChunkHash, StoreScheme};
use depot_fs::{FsBuilder, FsTree};
use depot_meta::{Dataset, DatasetKind, DatasetVersion, FsStructure, VersionRef};
use depot_version::{VersionError, VersionManager};

use crate::error::{ReplError, ReplResult};

/// Everything a non-authoritative node can ask of a master.
#[async_trait]
pub trait RemoteDatasetSource: Send + Sync {
    /// Lists the live datasets of a workspace.
    async fn list_datasets(&self, workspace: &str) -> ReplResult<Vec<Dataset>>;

    /// Lists the live versions of a dataset.
    async fn list_versions(&self, workspace: &str, dataset: &str)
        -> ReplResult<Vec<DatasetVersion>>;

    /// Fetches the reconstructed tree of a version.
    async fn get_fs_structure(&self, r: &VersionRef) -> ReplResult<FsTree>;

    /// Downloads one chunk's bytes.
    async fn download_chunk(&self, hash: &ChunkHash, scheme: StoreScheme) -> ReplResult<Bytes>;

    /// Uploads one chunk's bytes.
    async fn save_chunk(
        &self,
        hash: &ChunkHash,
        scheme: StoreScheme,
        data: Bytes,
    ) -> ReplResult<()>;

    /// Reports whether the master holds a chunk, and its size.
    async fn check_chunk(&self, hash: &ChunkHash, scheme: StoreScheme)
        -> ReplResult<Option<u64>>;

    /// Records a file structure under a version on the master.
    async fn commit_file_structure(
        &self,
        kind: DatasetKind,
        r: &VersionRef,
        structure: &FsStructure,
    ) -> ReplResult<()>;

    /// Deletes a dataset on the master.
    async fn delete_dataset(
        &self,
        kind: DatasetKind,
        workspace: &str,
        name: &str,
    ) -> ReplResult<()>;

    /// Deletes a version on the master.
    async fn delete_version(&self, r: &VersionRef) -> ReplResult<()>;
}

/// Per-operation call counters, for cache-behavior assertions and ops
/// visibility.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceCalls {
    /// `list_datasets` calls served.
    pub list_datasets: u64,
    /// `list_versions` calls served.
    pub list_versions: u64,
    /// `get_fs_structure` calls served.
    pub get_fs_structure: u64,
    /// `download_chunk` calls served.
    pub download_chunk: u64,
    /// `save_chunk` calls served.
    pub save_chunk: u64,
    /// `check_chunk` calls served.
    pub check_chunk: u64,
    /// `commit_file_structure` calls served.
    pub commit_file_structure: u64,
    /// `delete_dataset` calls served.
    pub delete_dataset: u64,
    /// `delete_version` calls served.
    pub delete_version: u64,
}

#[derive(Default)]
struct CallsInner {
    list_datasets: AtomicU64,
    list_versions: AtomicU64,
    get_fs_structure: AtomicU64,
    download_chunk: AtomicU64,
    save_chunk: AtomicU64,
    check_chunk: AtomicU64,
    commit_file_structure: AtomicU64,
    delete_dataset: AtomicU64,
    delete_version: AtomicU64,
}

/// In-process adapter exposing one master's stores through the source
/// contract.
pub struct LocalSource {
    manager: Arc<VersionManager>,
    builder: FsBuilder,
    calls: CallsInner,
}

fn to_remote(e: VersionError) -> ReplError {
    if e.is_not_found() {
        ReplError::RemoteNotFound(e.to_string())
    } else {
        ReplError::Remote(e.to_string())
    }
}

impl LocalSource {
    /// Wraps a master's version manager.
    pub fn new(manager: Arc<VersionManager>) -> Self {
        let builder = FsBuilder::new(manager.meta().clone());
        Self {
            manager,
            builder,
            calls: CallsInner::default(),
        }
    }

    /// Snapshot of the per-operation call counters.
    pub fn calls(&self) -> SourceCalls {
        SourceCalls {
            list_datasets: self.calls.list_datasets.load(Ordering::Relaxed),
            list_versions: self.calls.list_versions.load(Ordering::Relaxed),
            get_fs_structure: self.calls.get_fs_structure.load(Ordering::Relaxed),
            download_chunk: self.calls.download_chunk.load(Ordering::Relaxed),
            save_chunk: self.calls.save_chunk.load(Ordering::Relaxed),
            check_chunk: self.calls.check_chunk.load(Ordering::Relaxed),
            commit_file_structure: self.calls.commit_file_structure.load(Ordering::Relaxed),
            delete_dataset: self.calls.delete_dataset.load(Ordering::Relaxed),
            delete_version: self.calls.delete_version.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl RemoteDatasetSource for LocalSource {
    async fn list_datasets(&self, workspace: &str) -> ReplResult<Vec<Dataset>> {
        self.calls.list_datasets.fetch_add(1, Ordering::Relaxed);
        self.manager.list_datasets(workspace).map_err(to_remote)
    }

    async fn list_versions(
        &self,
        workspace: &str,
        dataset: &str,
    ) -> ReplResult<Vec<DatasetVersion>> {
        self.calls.list_versions.fetch_add(1, Ordering::Relaxed);
        self.manager
            .list_versions(workspace, dataset)
            .map_err(to_remote)
    }

    async fn get_fs_structure(&self, r: &VersionRef) -> ReplResult<FsTree> {
        self.calls.get_fs_structure.fetch_add(1, Ordering::Relaxed);
        self.builder.build(r).map_err(|e| match e {
            depot_fs::FsError::Meta(ref m) if m.is_not_found() => {
                ReplError::RemoteNotFound(e.to_string())
            }
            other => ReplError::Remote(other.to_string()),
        })
    }

    async fn download_chunk(&self, hash: &ChunkHash, scheme: StoreScheme) -> ReplResult<Bytes> {
        self.calls.download_chunk.fetch_add(1, Ordering::Relaxed);
        match self.manager.chunks().get_bytes(hash, scheme).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e @ depot_chunk::ChunkError::NotFound { .. }) => {
                Err(ReplError::RemoteNotFound(e.to_string()))
            }
            Err(e) => Err(ReplError::Remote(e.to_string())),
        }
    }

    async fn save_chunk(
        &self,
        hash: &ChunkHash,
        scheme: StoreScheme,
        data: Bytes,
    ) -> ReplResult<()> {
        self.calls.save_chunk.fetch_add(1, Ordering::Relaxed);
        self.manager
            .chunks()
            .put(hash, scheme, &data)
            .await
            .map(|_| ())
            .map_err(|e| ReplError::Remote(e.to_string()))
    }

    async fn check_chunk(
        &self,
        hash: &ChunkHash,
        scheme: StoreScheme,
    ) -> ReplResult<Option<u64>> {
        self.calls.check_chunk.fetch_add(1, Ordering::Relaxed);
        self.manager
            .chunks()
            .check(hash, scheme)
            .await
            .map_err(|e| ReplError::Remote(e.to_string()))
    }

    async fn commit_file_structure(
        &self,
        kind: DatasetKind,
        r: &VersionRef,
        structure: &FsStructure,
    ) -> ReplResult<()> {
        self.calls
            .commit_file_structure
            .fetch_add(1, Ordering::Relaxed);
        self.manager
            .save_structure(kind, r, structure)
            .await
            .map(|_| ())
            .map_err(to_remote)
    }

    async fn delete_dataset(
        &self,
        kind: DatasetKind,
        workspace: &str,
        name: &str,
    ) -> ReplResult<()> {
        self.calls.delete_dataset.fetch_add(1, Ordering::Relaxed);
        self.manager
            .delete_dataset(kind, workspace, name)
            .await
            .map_err(to_remote)
    }

    async fn delete_version(&self, r: &VersionRef) -> ReplResult<()> {
        self.calls.delete_version.fetch_add(1, Ordering::Relaxed);
        self.manager.delete_version(r).await.map_err(to_remote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depot_chunk::ChunkStore;
    use depot_meta::{MemoryKvStore, MetadataStore};
    use depot_version::{MaintenanceGate, UploadSlots};
    use std::io::Cursor;

    async fn master() -> (tempfile::TempDir, Arc<LocalSource>) {
        let dir = tempfile::tempdir().unwrap();
        let meta = Arc::new(MetadataStore::open(Arc::new(MemoryKvStore::new())).unwrap());
        let chunks = Arc::new(ChunkStore::open(dir.path()).await.unwrap());
        let manager = Arc::new(
            VersionManager::new(meta, chunks, MaintenanceGate::new(), UploadSlots::new(2))
                .with_block_size(8),
        );
        (dir, Arc::new(LocalSource::new(manager)))
    }

    fn vref() -> VersionRef {
        VersionRef::new("ws", "d", "1.0.0")
    }

    #[tokio::test]
    async fn test_local_source_round_trip() {
        let (_dir, source) = master().await;
        source
            .manager
            .upload_file(
                DatasetKind::Dataset,
                &vref(),
                "a.txt",
                Cursor::new(b"payload".to_vec()),
            )
            .await
            .unwrap();

        let tree = source.get_fs_structure(&vref()).await.unwrap();
        let node = tree.lookup("a.txt").unwrap();
        assert_eq!(node.size, 7);

        let chunk = &node.chunks().unwrap()[0];
        let data = source.download_chunk(&chunk.hash, chunk.scheme).await.unwrap();
        assert_eq!(&data[..], b"payload");

        let calls = source.calls();
        assert_eq!(calls.get_fs_structure, 1);
        assert_eq!(calls.download_chunk, 1);
    }

    #[tokio::test]
    async fn test_missing_version_is_remote_not_found() {
        let (_dir, source) = master().await;
        let err = source.get_fs_structure(&vref()).await.unwrap_err();
        assert!(matches!(err, ReplError::RemoteNotFound(_)));
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_missing_chunk_is_remote_not_found() {
        let (_dir, source) = master().await;
        let err = source
            .download_chunk(&ChunkHash::digest(b"absent"), StoreScheme::V1)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
