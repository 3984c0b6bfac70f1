//! The mutation gateway over metadata and chunk storage.
//!
//! Every dataset version moves through two states: **editing** (accepts
//! uploads, deletes and repeated saves) and **committed** (terminal,
//! read-only). All mutating calls first wait on the GC gate, and uploads
//! additionally take a slot from the bounded upload pool.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;
use tracing::{debug, info};

use depot_chunk::{Chunker, ChunkStore, StoreScheme, DEFAULT_BLOCK_SIZE};
use depot_meta::{
    ChunkDecl, Dataset, DatasetKind, DatasetVersion, FileDecl, FsStructure, MetadataStore,
    SaveOutcome, VersionRef, DEFAULT_FILE_MODE,
};

use crate::error::{VersionError, VersionResult};
use crate::gate::{MaintenanceGate, UploadSlots};

/// Result of one file upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadOutcome {
    /// Normalized path the file was stored under.
    pub path: String,
    /// Total uploaded bytes.
    pub size: u64,
    /// Number of chunks the file split into.
    pub chunks: u64,
    /// Chunks whose blobs were newly written (the rest deduplicated).
    pub new_chunks: u64,
}

/// Gateway for all dataset/version mutation.
pub struct VersionManager {
    meta: Arc<MetadataStore>,
    chunks: Arc<ChunkStore>,
    gate: MaintenanceGate,
    slots: UploadSlots,
    block_size: usize,
}

impl VersionManager {
    /// Creates a manager over the shared stores and coordination services.
    pub fn new(
        meta: Arc<MetadataStore>,
        chunks: Arc<ChunkStore>,
        gate: MaintenanceGate,
        slots: UploadSlots,
    ) -> Self {
        Self {
            meta,
            chunks,
            gate,
            slots,
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }

    /// Overrides the chunking block size (changes every downstream hash).
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// The metadata store this manager mutates.
    pub fn meta(&self) -> &Arc<MetadataStore> {
        &self.meta
    }

    /// The blob store this manager writes.
    pub fn chunks(&self) -> &Arc<ChunkStore> {
        &self.chunks
    }

    /// The GC gate shared with the collector.
    pub fn gate(&self) -> &MaintenanceGate {
        &self.gate
    }

    /// Chunks a byte stream into the blob store and records the file under
    /// the version in one atomic save.
    pub async fn upload_file<R: AsyncRead + Unpin>(
        &self,
        kind: DatasetKind,
        r: &VersionRef,
        path: &str,
        reader: R,
    ) -> VersionResult<UploadOutcome> {
        self.gate.wait_completed().await;
        let _slot = self.slots.acquire().await;

        // Reject early so no blob work happens against a committed version.
        if let Some(v) = self.meta.get_version(r)? {
            if !v.deleted && !v.editing {
                return Err(depot_meta::MetaError::CommittedVersionImmutable(r.clone()).into());
            }
        }

        let mut chunker = Chunker::new(reader, self.block_size);
        let mut decls = Vec::new();
        let mut new_chunks = 0u64;
        while let Some(chunk) = chunker.next_chunk().await? {
            if self
                .chunks
                .put(&chunk.hash, StoreScheme::CURRENT, &chunk.data)
                .await?
            {
                new_chunks += 1;
            }
            decls.push(ChunkDecl {
                hash: chunk.hash,
                size: chunk.len() as u64,
                scheme: StoreScheme::CURRENT,
            });
        }

        let decl = FileDecl {
            path: path.to_string(),
            mode: DEFAULT_FILE_MODE,
            chunks: decls,
        };
        let outcome = UploadOutcome {
            path: depot_meta::normalize_path(path).map_err(VersionError::Meta)?,
            size: decl.size(),
            chunks: decl.chunks.len() as u64,
            new_chunks,
        };
        self.meta
            .save(kind, r, &FsStructure::new(vec![decl]))?;

        info!(version = %r, path = %outcome.path, size = outcome.size,
              chunks = outcome.chunks, new_chunks = outcome.new_chunks, "file uploaded");
        Ok(outcome)
    }

    /// Records a pre-uploaded structure under a version.
    ///
    /// Every referenced blob must already exist in the chunk store; a
    /// missing blob aborts the call before any metadata is written, so
    /// nothing is partially persisted.
    pub async fn save_structure(
        &self,
        kind: DatasetKind,
        r: &VersionRef,
        structure: &FsStructure,
    ) -> VersionResult<SaveOutcome> {
        self.gate.wait_completed().await;

        for decl in &structure.files {
            for chunk in &decl.chunks {
                if self.chunks.check(&chunk.hash, chunk.scheme).await?.is_none() {
                    return Err(VersionError::MissingBlob {
                        hash: chunk.hash,
                        path: decl.path.clone(),
                    });
                }
            }
        }

        Ok(self.meta.save(kind, r, structure)?)
    }

    /// Transitions an editing version to committed.
    pub async fn commit(&self, r: &VersionRef) -> VersionResult<DatasetVersion> {
        self.gate.wait_completed().await;
        let version = self.meta.commit_version(r)?;
        info!(version = %r, size = version.size, "version committed");
        Ok(version)
    }

    /// Copies `src` into a new editing version `dst`, sharing chunks.
    pub async fn clone_version(
        &self,
        src: &VersionRef,
        dst: &VersionRef,
        message: &str,
    ) -> VersionResult<DatasetVersion> {
        self.gate.wait_completed().await;
        let version = self.meta.clone_version(src, dst, message)?;
        info!(src = %src, dst = %dst, "version cloned");
        Ok(version)
    }

    /// Soft-deletes one file of an editing version.
    pub async fn delete_file(&self, r: &VersionRef, path: &str) -> VersionResult<()> {
        self.gate.wait_completed().await;
        self.meta.soft_delete_file(r, path)?;
        self.gate.signal();
        Ok(())
    }

    /// Soft-deletes a version; chunks are reclaimed by a later GC pass.
    pub async fn delete_version(&self, r: &VersionRef) -> VersionResult<()> {
        self.gate.wait_completed().await;
        self.meta.soft_delete_version(r)?;
        self.gate.signal();
        debug!(version = %r, "version soft-deleted");
        Ok(())
    }

    /// Soft-deletes a dataset with all its versions.
    pub async fn delete_dataset(
        &self,
        kind: DatasetKind,
        workspace: &str,
        name: &str,
    ) -> VersionResult<()> {
        self.gate.wait_completed().await;
        self.meta.soft_delete_dataset(kind, workspace, name)?;
        self.gate.signal();
        debug!(workspace, name, "dataset soft-deleted");
        Ok(())
    }

    /// Lists the live datasets of a workspace.
    pub fn list_datasets(&self, workspace: &str) -> VersionResult<Vec<Dataset>> {
        Ok(self.meta.list_datasets(workspace)?)
    }

    /// Lists the live versions of a dataset.
    pub fn list_versions(
        &self,
        workspace: &str,
        dataset: &str,
    ) -> VersionResult<Vec<DatasetVersion>> {
        Ok(self.meta.list_versions(workspace, dataset)?)
    }
}
