// File: crates/depot-repl/src/failover.rs

//! Ordered failover over a list of masters.
//!
//! Every operation tries the masters in configuration order with a bounded
//! per-call timeout. The first success short-circuits; when every master
//! fails, the last error surfaces. There is no automatic retry beyond the
//! one walk down the list.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::warn;

use depot_chunk::{ChunkHash, StoreScheme};
use depot_fs::FsTree;
use depot_meta::{Dataset, DatasetKind, DatasetVersion, FsStructure, VersionRef};

use crate::error::{ReplError, ReplResult};
use crate::source::RemoteDatasetSource;

/// Default per-call timeout toward one master.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

type BoxedOp<T> = Pin<Box<dyn Future<Output = ReplResult<T>> + Send>>;

/// A [`RemoteDatasetSource`] fanning out over an ordered master list.
pub struct FailoverSource {
    masters: Vec<Arc<dyn RemoteDatasetSource>>,
    call_timeout: Duration,
}

impl FailoverSource {
    /// Creates a failover client over the given masters, tried in order.
    pub fn new(masters: Vec<Arc<dyn RemoteDatasetSource>>) -> Self {
        Self {
            masters,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Overrides the per-call timeout.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Number of configured masters.
    pub fn master_count(&self) -> usize {
        self.masters.len()
    }

    async fn try_masters<T>(
        &self,
        op: &'static str,
        f: impl Fn(Arc<dyn RemoteDatasetSource>) -> BoxedOp<T>,
    ) -> ReplResult<T> {
        let mut last_err = ReplError::NoMasters;
        for (i, master) in self.masters.iter().enumerate() {
            match tokio::time::timeout(self.call_timeout, f(master.clone())).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => {
                    warn!(op, master = i, error = %e, "master call failed, advancing");
                    last_err = e;
                }
                Err(_) => {
                    warn!(op, master = i, "master call timed out, advancing");
                    last_err = ReplError::Timeout { op };
                }
            }
        }
        Err(last_err)
    }
}

#[async_trait]
impl RemoteDatasetSource for FailoverSource {
    async fn list_datasets(&self, workspace: &str) -> ReplResult<Vec<Dataset>> {
        let workspace = workspace.to_string();
        self.try_masters("list_datasets", move |m| {
            let workspace = workspace.clone();
            Box::pin(async move { m.list_datasets(&workspace).await })
        })
        .await
    }

    async fn list_versions(
        &self,
        workspace: &str,
        dataset: &str,
    ) -> ReplResult<Vec<DatasetVersion>> {
        let workspace = workspace.to_string();
        let dataset = dataset.to_string();
        self.try_masters("list_versions", move |m| {
            let workspace = workspace.clone();
            let dataset = dataset.clone();
            Box::pin(async move { m.list_versions(&workspace, &dataset).await })
        })
        .await
    }

    async fn get_fs_structure(&self, r: &VersionRef) -> ReplResult<FsTree> {
        let r = r.clone();
        self.try_masters("get_fs_structure", move |m| {
            let r = r.clone();
            Box::pin(async move { m.get_fs_structure(&r).await })
        })
        .await
    }

    async fn download_chunk(&self, hash: &ChunkHash, scheme: StoreScheme) -> ReplResult<Bytes> {
        let hash = *hash;
        self.try_masters("download_chunk", move |m| {
            Box::pin(async move { m.download_chunk(&hash, scheme).await })
        })
        .await
    }

    async fn save_chunk(
        &self,
        hash: &ChunkHash,
        scheme: StoreScheme,
        data: Bytes,
    ) -> ReplResult<()> {
        let hash = *hash;
        let data = data.clone();
        self.try_masters("save_chunk", move |m| {
            let data = data.clone();
            Box::pin(async move { m.save_chunk(&hash, scheme, data).await })
        })
        .await
    }

    async fn check_chunk(
        &self,
        hash: &ChunkHash,
        scheme: StoreScheme,
    ) -> ReplResult<Option<u64>> {
        let hash = *hash;
        self.try_masters("check_chunk", move |m| {
            Box::pin(async move { m.check_chunk(&hash, scheme).await })
        })
        .await
    }

    async fn commit_file_structure(
        &self,
        kind: DatasetKind,
        r: &VersionRef,
        structure: &FsStructure,
    ) -> ReplResult<()> {
        let r = r.clone();
        let structure = structure.clone();
        self.try_masters("commit_file_structure", move |m| {
            let r = r.clone();
            let structure = structure.clone();
            Box::pin(async move { m.commit_file_structure(kind, &r, &structure).await })
        })
        .await
    }

    async fn delete_dataset(
        &self,
        kind: DatasetKind,
        workspace: &str,
        name: &str,
    ) -> ReplResult<()> {
        let workspace = workspace.to_string();
        let name = name.to_string();
        self.try_masters("delete_dataset", move |m| {
            let workspace = workspace.clone();
            let name = name.clone();
            Box::pin(async move { m.delete_dataset(kind, &workspace, &name).await })
        })
        .await
    }

    async fn delete_version(&self, r: &VersionRef) -> ReplResult<()> {
        let r = r.clone();
        self.try_masters("delete_version", move |m| {
            let r = r.clone();
            Box::pin(async move { m.delete_version(&r).await })
        })
        .await
    }
}
