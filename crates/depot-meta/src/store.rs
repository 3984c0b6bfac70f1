//! The metadata table layer: datasets, versions, files and chunks over the
//! embedded KV store.
//!
//! Each table maps a row-id key to a bincode row, with a unique-index key
//! per table resolving the natural key to the row id:
//!
//! ```text
//! d/<id>                          dataset row
//! di/<kind>\0<ws>\0<name>         dataset natural key -> id
//! v/<id>                          version row
//! vi/<ws>\0<ds>\0<version>        version natural key -> id
//! f/<id>                          file row
//! fi/<ws>\0<ds>\0<ver>\0<path>    file natural key -> id
//! c/<id>                          chunk row
//! ci/<scheme><hex>                chunk natural key -> id
//! fc/<file-id><index>             file-chunk join row, scan = byte order
//! cr/<chunk-id><file-id><index>   reverse reference index for GC counts
//! ```
//!
//! Every mutating call stages its puts and deletes into one batch and
//! applies it with `write_batch`, so a failed call leaves the graph exactly
//! as it was.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use depot_chunk::{ChunkHash, StoreScheme};

use crate::error::{MetaError, MetaResult};
use crate::kvstore::{BatchOp, Key, KvStore, Value};
use crate::types::{
    normalize_path, ChunkId, ChunkRow, Dataset, DatasetId, DatasetKind, DatasetVersion,
    FileChunkRow, FileId, FileRow, FsStructure, VersionId, VersionRef,
};

const SEP: u8 = 0;

fn dataset_row_key(id: DatasetId) -> Key {
    let mut k = b"d/".to_vec();
    k.extend_from_slice(&id.as_u64().to_be_bytes());
    k
}

fn dataset_index_key(kind: DatasetKind, workspace: &str, name: &str) -> Key {
    let mut k = b"di/".to_vec();
    k.push(match kind {
        DatasetKind::Dataset => b'd',
        DatasetKind::Model => b'm',
    });
    k.push(SEP);
    k.extend_from_slice(workspace.as_bytes());
    k.push(SEP);
    k.extend_from_slice(name.as_bytes());
    k
}

fn version_row_key(id: VersionId) -> Key {
    let mut k = b"v/".to_vec();
    k.extend_from_slice(&id.as_u64().to_be_bytes());
    k
}

fn version_index_key(r: &VersionRef) -> Key {
    let mut k = version_list_prefix(&r.workspace, &r.dataset);
    k.extend_from_slice(r.version.as_bytes());
    k
}

fn version_list_prefix(workspace: &str, dataset: &str) -> Key {
    let mut k = b"vi/".to_vec();
    k.extend_from_slice(workspace.as_bytes());
    k.push(SEP);
    k.extend_from_slice(dataset.as_bytes());
    k.push(SEP);
    k
}

fn file_row_key(id: FileId) -> Key {
    let mut k = b"f/".to_vec();
    k.extend_from_slice(&id.as_u64().to_be_bytes());
    k
}

fn file_index_key(r: &VersionRef, path: &str) -> Key {
    let mut k = file_list_prefix(r);
    k.extend_from_slice(path.as_bytes());
    k
}

fn file_list_prefix(r: &VersionRef) -> Key {
    let mut k = b"fi/".to_vec();
    k.extend_from_slice(r.workspace.as_bytes());
    k.push(SEP);
    k.extend_from_slice(r.dataset.as_bytes());
    k.push(SEP);
    k.extend_from_slice(r.version.as_bytes());
    k.push(SEP);
    k
}

fn chunk_row_key(id: ChunkId) -> Key {
    let mut k = b"c/".to_vec();
    k.extend_from_slice(&id.as_u64().to_be_bytes());
    k
}

fn chunk_index_key(scheme: StoreScheme, hash: &ChunkHash) -> Key {
    let mut k = b"ci/".to_vec();
    k.push(scheme.as_byte());
    k.extend_from_slice(hash.to_hex().as_bytes());
    k
}

fn file_chunk_key(file_id: FileId, index: u32) -> Key {
    let mut k = file_chunk_prefix(file_id);
    k.extend_from_slice(&index.to_be_bytes());
    k
}

fn file_chunk_prefix(file_id: FileId) -> Key {
    let mut k = b"fc/".to_vec();
    k.extend_from_slice(&file_id.as_u64().to_be_bytes());
    k
}

fn chunk_ref_key(chunk_id: ChunkId, file_id: FileId, index: u32) -> Key {
    let mut k = chunk_ref_prefix(chunk_id);
    k.extend_from_slice(&file_id.as_u64().to_be_bytes());
    k.extend_from_slice(&index.to_be_bytes());
    k
}

fn chunk_ref_prefix(chunk_id: ChunkId) -> Key {
    let mut k = b"cr/".to_vec();
    k.extend_from_slice(&chunk_id.as_u64().to_be_bytes());
    k
}

fn encode<T: Serialize>(row: &T) -> MetaResult<Value> {
    bincode::serialize(row).map_err(|e| MetaError::Codec(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> MetaResult<T> {
    bincode::deserialize(bytes).map_err(|e| MetaError::Codec(e.to_string()))
}

fn decode_id(bytes: &[u8]) -> MetaResult<u64> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| MetaError::Codec("malformed id value".to_string()))?;
    Ok(u64::from_be_bytes(raw))
}

/// Outcome counters for one `save` call; all-zero means the call was a
/// no-op re-submission of an unchanged structure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveOutcome {
    /// File rows created.
    pub files_created: u64,
    /// File rows whose size/mode/liveness changed.
    pub files_updated: u64,
    /// Chunk rows created.
    pub chunks_created: u64,
    /// File-chunk join rows written or rewritten.
    pub links_written: u64,
}

impl SaveOutcome {
    /// True when the call changed nothing.
    pub fn is_noop(&self) -> bool {
        *self == SaveOutcome::default()
    }
}

/// Staged view over the KV store: reads see earlier writes of the same
/// call, and nothing is applied until `commit`.
struct Tx<'a> {
    kv: &'a dyn KvStore,
    ops: Vec<BatchOp>,
    overlay: HashMap<Key, Option<Value>>,
}

impl<'a> Tx<'a> {
    fn new(kv: &'a dyn KvStore) -> Self {
        Self {
            kv,
            ops: Vec::new(),
            overlay: HashMap::new(),
        }
    }

    fn get(&self, key: &[u8]) -> MetaResult<Option<Value>> {
        if let Some(staged) = self.overlay.get(key) {
            return Ok(staged.clone());
        }
        self.kv.get(key)
    }

    fn put(&mut self, key: Key, value: Value) {
        self.overlay.insert(key.clone(), Some(value.clone()));
        self.ops.push(BatchOp::Put { key, value });
    }

    fn delete(&mut self, key: Key) {
        self.overlay.insert(key.clone(), None);
        self.ops.push(BatchOp::Delete { key });
    }

    fn commit(self) -> MetaResult<()> {
        self.kv.write_batch(self.ops)
    }
}

/// The relational metadata store.
pub struct MetadataStore {
    kv: Arc<dyn KvStore>,
    next_id: AtomicU64,
}

impl MetadataStore {
    /// Opens the store over a KV backend, seeding the id allocator from
    /// the highest row id already present.
    pub fn open(kv: Arc<dyn KvStore>) -> MetaResult<Self> {
        let mut max_id = 0u64;
        for prefix in [b"d/".as_slice(), b"v/", b"f/", b"c/"] {
            for (key, _) in kv.scan_prefix(prefix)? {
                if let Ok(id) = decode_id(&key[prefix.len()..]) {
                    max_id = max_id.max(id);
                }
            }
        }
        Ok(Self {
            kv,
            next_id: AtomicU64::new(max_id + 1),
        })
    }

    fn alloc_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    // ---- dataset table ----

    /// Looks up a dataset by its natural key, soft-deleted rows included.
    pub fn get_dataset(
        &self,
        kind: DatasetKind,
        workspace: &str,
        name: &str,
    ) -> MetaResult<Option<Dataset>> {
        let Some(id_raw) = self.kv.get(&dataset_index_key(kind, workspace, name))? else {
            return Ok(None);
        };
        let id = DatasetId::new(decode_id(&id_raw)?);
        match self.kv.get(&dataset_row_key(id))? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Lists the live datasets of a workspace.
    pub fn list_datasets(&self, workspace: &str) -> MetaResult<Vec<Dataset>> {
        let mut out = Vec::new();
        for (_, id_raw) in self.kv.scan_prefix(b"di/")? {
            let id = DatasetId::new(decode_id(&id_raw)?);
            if let Some(bytes) = self.kv.get(&dataset_row_key(id))? {
                let ds: Dataset = decode(&bytes)?;
                if ds.workspace == workspace && !ds.deleted {
                    out.push(ds);
                }
            }
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    /// Marks a dataset deleted. Its rows remain until a GC pass reclaims
    /// them.
    pub fn soft_delete_dataset(
        &self,
        kind: DatasetKind,
        workspace: &str,
        name: &str,
    ) -> MetaResult<()> {
        let mut ds = self
            .get_dataset(kind, workspace, name)?
            .ok_or_else(|| MetaError::DatasetNotFound {
                workspace: workspace.to_string(),
                name: name.to_string(),
            })?;
        if !ds.deleted {
            ds.deleted = true;
            self.kv.put(dataset_row_key(ds.id), encode(&ds)?)?;
        }
        Ok(())
    }

    // ---- version table ----

    /// Looks up a version row, soft-deleted rows included.
    pub fn get_version(&self, r: &VersionRef) -> MetaResult<Option<DatasetVersion>> {
        let Some(id_raw) = self.kv.get(&version_index_key(r))? else {
            return Ok(None);
        };
        let id = VersionId::new(decode_id(&id_raw)?);
        match self.kv.get(&version_row_key(id))? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn require_live_version(&self, r: &VersionRef) -> MetaResult<DatasetVersion> {
        match self.get_version(r)? {
            Some(v) if !v.deleted => Ok(v),
            _ => Err(MetaError::VersionNotFound(r.clone())),
        }
    }

    /// Lists the live versions of a dataset.
    pub fn list_versions(&self, workspace: &str, dataset: &str) -> MetaResult<Vec<DatasetVersion>> {
        let mut out = Vec::new();
        for (_, id_raw) in self
            .kv
            .scan_prefix(&version_list_prefix(workspace, dataset))?
        {
            let id = VersionId::new(decode_id(&id_raw)?);
            if let Some(bytes) = self.kv.get(&version_row_key(id))? {
                let v: DatasetVersion = decode(&bytes)?;
                if !v.deleted {
                    out.push(v);
                }
            }
        }
        Ok(out)
    }

    /// Transitions a version from editing to committed.
    pub fn commit_version(&self, r: &VersionRef) -> MetaResult<DatasetVersion> {
        let mut v = self.require_live_version(r)?;
        if !v.editing {
            return Err(MetaError::AlreadyCommitted(r.clone()));
        }
        v.editing = false;
        self.kv.put(version_row_key(v.id), encode(&v)?)?;
        debug!(version = %r, "version committed");
        Ok(v)
    }

    /// Marks a version deleted; reclamation is deferred to GC.
    pub fn soft_delete_version(&self, r: &VersionRef) -> MetaResult<()> {
        let mut v = self.require_live_version(r)?;
        v.deleted = true;
        self.kv.put(version_row_key(v.id), encode(&v)?)?;
        Ok(())
    }

    // ---- file / chunk queries ----

    /// Looks up one file row by path within a version.
    pub fn get_file(&self, r: &VersionRef, path: &str) -> MetaResult<Option<FileRow>> {
        let path = normalize_path(path)?;
        let Some(id_raw) = self.kv.get(&file_index_key(r, &path))? else {
            return Ok(None);
        };
        let id = FileId::new(decode_id(&id_raw)?);
        match self.kv.get(&file_row_key(id))? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Lists a version's file rows; `include_deleted` widens the result to
    /// soft-deleted rows for GC.
    pub fn files_of_version(&self, r: &VersionRef, include_deleted: bool) -> MetaResult<Vec<FileRow>> {
        let mut out = Vec::new();
        for (_, id_raw) in self.kv.scan_prefix(&file_list_prefix(r))? {
            let id = FileId::new(decode_id(&id_raw)?);
            if let Some(bytes) = self.kv.get(&file_row_key(id))? {
                let f: FileRow = decode(&bytes)?;
                if include_deleted || !f.deleted {
                    out.push(f);
                }
            }
        }
        Ok(out)
    }

    /// Returns a file's chunks in index order, verifying the dense-from-
    /// zero invariant.
    pub fn chunks_of_file(&self, file: &FileRow) -> MetaResult<Vec<(FileChunkRow, ChunkRow)>> {
        let mut out = Vec::new();
        for (i, (_, bytes)) in self
            .kv
            .scan_prefix(&file_chunk_prefix(file.id))?
            .into_iter()
            .enumerate()
        {
            let link: FileChunkRow = decode(&bytes)?;
            if link.index as usize != i {
                return Err(MetaError::SparseChunkIndex {
                    path: file.path.clone(),
                });
            }
            let chunk_bytes = self
                .kv
                .get(&chunk_row_key(link.chunk_id))?
                .ok_or(MetaError::ChunkRowNotFound(link.chunk_id))?;
            out.push((link, decode(&chunk_bytes)?));
        }
        Ok(out)
    }

    /// Looks up a chunk row by its content hash within a scheme.
    pub fn chunk_by_hash(
        &self,
        scheme: StoreScheme,
        hash: &ChunkHash,
    ) -> MetaResult<Option<ChunkRow>> {
        let Some(id_raw) = self.kv.get(&chunk_index_key(scheme, hash))? else {
            return Ok(None);
        };
        let id = ChunkId::new(decode_id(&id_raw)?);
        match self.kv.get(&chunk_row_key(id))? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Counts the file-chunk rows still referencing a chunk.
    pub fn chunk_ref_count(&self, chunk_id: ChunkId) -> MetaResult<u64> {
        Ok(self.kv.scan_prefix(&chunk_ref_prefix(chunk_id))?.len() as u64)
    }

    /// Marks one file deleted within an editing version.
    pub fn soft_delete_file(&self, r: &VersionRef, path: &str) -> MetaResult<()> {
        let mut version = self.require_live_version(r)?;
        if !version.editing {
            return Err(MetaError::CommittedVersionImmutable(r.clone()));
        }
        let mut file = self.get_file(r, path)?.ok_or_else(|| MetaError::FileNotFound {
            version: r.clone(),
            path: path.to_string(),
        })?;
        if file.deleted {
            return Ok(());
        }
        file.deleted = true;
        version.size = version.size.saturating_sub(file.size);

        let mut tx = Tx::new(self.kv.as_ref());
        tx.put(file_row_key(file.id), encode(&file)?);
        tx.put(version_row_key(version.id), encode(&version)?);
        tx.commit()
    }

    // ---- atomic save ----

    /// Records a declared file structure under a version in one atomic
    /// batch.
    ///
    /// Upserts the dataset and version rows (creating the version in the
    /// editing state if absent), then per declared file: upserts the file
    /// row, the chunk rows and the ordered file-chunk rows. Re-submitting
    /// an unchanged structure is a no-op. Never touches blob storage —
    /// blobs must already exist before their hashes are declared here.
    pub fn save(
        &self,
        kind: DatasetKind,
        r: &VersionRef,
        structure: &FsStructure,
    ) -> MetaResult<SaveOutcome> {
        let mut tx = Tx::new(self.kv.as_ref());
        let mut outcome = SaveOutcome::default();

        // Dataset row: create on first write, revive if soft-deleted.
        let ds_index = dataset_index_key(kind, &r.workspace, &r.dataset);
        match tx.get(&ds_index)? {
            Some(id_raw) => {
                let id = DatasetId::new(decode_id(&id_raw)?);
                let bytes = tx
                    .get(&dataset_row_key(id))?
                    .ok_or_else(|| MetaError::Kv("dangling dataset index".to_string()))?;
                let mut ds: Dataset = decode(&bytes)?;
                if ds.deleted {
                    ds.deleted = false;
                    tx.put(dataset_row_key(id), encode(&ds)?);
                }
            }
            None => {
                let ds = Dataset {
                    id: DatasetId::new(self.alloc_id()),
                    kind,
                    workspace: r.workspace.clone(),
                    name: r.dataset.clone(),
                    deleted: false,
                };
                tx.put(dataset_row_key(ds.id), encode(&ds)?);
                tx.put(ds_index, ds.id.as_u64().to_be_bytes().to_vec());
            }
        }

        // Version row: create in the editing state if absent.
        let v_index = version_index_key(r);
        let mut version = match tx.get(&v_index)? {
            Some(id_raw) => {
                let id = VersionId::new(decode_id(&id_raw)?);
                let bytes = tx
                    .get(&version_row_key(id))?
                    .ok_or_else(|| MetaError::Kv("dangling version index".to_string()))?;
                let v: DatasetVersion = decode(&bytes)?;
                if v.deleted {
                    return Err(MetaError::VersionNotFound(r.clone()));
                }
                if !v.editing {
                    return Err(MetaError::CommittedVersionImmutable(r.clone()));
                }
                v
            }
            None => {
                let v = DatasetVersion {
                    id: VersionId::new(self.alloc_id()),
                    workspace: r.workspace.clone(),
                    dataset: r.dataset.clone(),
                    version: r.version.clone(),
                    editing: true,
                    deleted: false,
                    message: String::new(),
                    size: 0,
                };
                tx.put(version_row_key(v.id), encode(&v)?);
                tx.put(v_index.clone(), v.id.as_u64().to_be_bytes().to_vec());
                v
            }
        };

        let mut size_delta = 0i64;
        let mut seen_paths = HashSet::new();

        for decl in &structure.files {
            let path = normalize_path(&decl.path)?;
            if !seen_paths.insert(path.clone()) {
                return Err(MetaError::InvalidPath(decl.path.clone()));
            }
            let declared_size = decl.size();

            // File row upsert.
            let f_index = file_index_key(r, &path);
            let (file_id, old_links_differ, old_size) = match tx.get(&f_index)? {
                Some(id_raw) => {
                    let id = FileId::new(decode_id(&id_raw)?);
                    let bytes = tx
                        .get(&file_row_key(id))?
                        .ok_or_else(|| MetaError::Kv("dangling file index".to_string()))?;
                    let mut f: FileRow = decode(&bytes)?;
                    let old_size = if f.deleted { 0 } else { f.size };
                    let changed = f.deleted || f.size != declared_size || f.mode != decl.mode;
                    if changed {
                        f.deleted = false;
                        f.size = declared_size;
                        f.mode = decl.mode;
                        tx.put(file_row_key(id), encode(&f)?);
                        outcome.files_updated += 1;
                    }
                    // Compare existing links to the declaration.
                    let existing = self.kv.scan_prefix(&file_chunk_prefix(id))?;
                    let mut differ = existing.len() != decl.chunks.len();
                    if !differ {
                        for (i, (_, link_bytes)) in existing.iter().enumerate() {
                            let link: FileChunkRow = decode(link_bytes)?;
                            let declared = &decl.chunks[i];
                            let row = self.chunk_by_hash(declared.scheme, &declared.hash)?;
                            if row.map(|c| c.id) != Some(link.chunk_id) {
                                differ = true;
                                break;
                            }
                        }
                    }
                    if differ {
                        for (key, link_bytes) in existing {
                            let link: FileChunkRow = decode(&link_bytes)?;
                            tx.delete(key);
                            tx.delete(chunk_ref_key(link.chunk_id, link.file_id, link.index));
                        }
                    }
                    (id, differ, old_size)
                }
                None => {
                    let f = FileRow {
                        id: FileId::new(self.alloc_id()),
                        workspace: r.workspace.clone(),
                        dataset: r.dataset.clone(),
                        version: r.version.clone(),
                        path: path.clone(),
                        size: declared_size,
                        mode: decl.mode,
                        deleted: false,
                    };
                    tx.put(file_row_key(f.id), encode(&f)?);
                    tx.put(f_index, f.id.as_u64().to_be_bytes().to_vec());
                    outcome.files_created += 1;
                    (f.id, true, 0)
                }
            };
            size_delta += declared_size as i64 - old_size as i64;

            // Chunk and link rows.
            for (i, chunk_decl) in decl.chunks.iter().enumerate() {
                let c_index = chunk_index_key(chunk_decl.scheme, &chunk_decl.hash);
                let chunk_id = match tx.get(&c_index)? {
                    Some(id_raw) => ChunkId::new(decode_id(&id_raw)?),
                    None => {
                        let c = ChunkRow {
                            id: ChunkId::new(self.alloc_id()),
                            hash: chunk_decl.hash,
                            size: chunk_decl.size,
                            scheme: chunk_decl.scheme,
                        };
                        tx.put(chunk_row_key(c.id), encode(&c)?);
                        tx.put(c_index, c.id.as_u64().to_be_bytes().to_vec());
                        outcome.chunks_created += 1;
                        c.id
                    }
                };
                if old_links_differ {
                    let link = FileChunkRow {
                        file_id,
                        chunk_id,
                        index: i as u32,
                    };
                    tx.put(file_chunk_key(file_id, link.index), encode(&link)?);
                    tx.put(chunk_ref_key(chunk_id, file_id, link.index), Vec::new());
                    outcome.links_written += 1;
                }
            }
        }

        if size_delta != 0 {
            version.size = (version.size as i64 + size_delta).max(0) as u64;
            tx.put(version_row_key(version.id), encode(&version)?);
        }

        tx.commit()?;
        debug!(version = %r, ?outcome, "structure saved");
        Ok(outcome)
    }

    // ---- clone ----

    /// Copies the live files of `src` into a new editing version `dst`.
    ///
    /// File and file-chunk rows get fresh identities; chunk rows are
    /// shared, so no blob is duplicated. Source and clone evolve
    /// independently afterwards.
    pub fn clone_version(
        &self,
        src: &VersionRef,
        dst: &VersionRef,
        message: &str,
    ) -> MetaResult<DatasetVersion> {
        let src_version = self.require_live_version(src)?;
        if self.get_version(dst)?.is_some() {
            return Err(MetaError::VersionExists(dst.clone()));
        }

        let mut tx = Tx::new(self.kv.as_ref());
        let mut dst_version = DatasetVersion {
            id: VersionId::new(self.alloc_id()),
            workspace: dst.workspace.clone(),
            dataset: dst.dataset.clone(),
            version: dst.version.clone(),
            editing: true,
            deleted: false,
            message: message.to_string(),
            size: 0,
        };

        for file in self.files_of_version(src, false)? {
            let new_file = FileRow {
                id: FileId::new(self.alloc_id()),
                workspace: dst.workspace.clone(),
                dataset: dst.dataset.clone(),
                version: dst.version.clone(),
                ..file.clone()
            };
            tx.put(file_row_key(new_file.id), encode(&new_file)?);
            tx.put(
                file_index_key(dst, &new_file.path),
                new_file.id.as_u64().to_be_bytes().to_vec(),
            );
            dst_version.size += new_file.size;

            for (link, _) in self.chunks_of_file(&file)? {
                let new_link = FileChunkRow {
                    file_id: new_file.id,
                    chunk_id: link.chunk_id,
                    index: link.index,
                };
                tx.put(file_chunk_key(new_file.id, new_link.index), encode(&new_link)?);
                tx.put(
                    chunk_ref_key(new_link.chunk_id, new_file.id, new_link.index),
                    Vec::new(),
                );
            }
        }

        tx.put(version_row_key(dst_version.id), encode(&dst_version)?);
        tx.put(
            version_index_key(dst),
            dst_version.id.as_u64().to_be_bytes().to_vec(),
        );
        tx.commit()?;
        debug!(src = %src, dst = %dst, src_id = %src_version.id, "version cloned");
        Ok(dst_version)
    }

    // ---- GC support ----

    /// Lists soft-deleted datasets.
    pub fn list_deleted_datasets(&self) -> MetaResult<Vec<Dataset>> {
        let mut out = Vec::new();
        for (_, bytes) in self.kv.scan_prefix(b"d/")? {
            let ds: Dataset = decode(&bytes)?;
            if ds.deleted {
                out.push(ds);
            }
        }
        Ok(out)
    }

    /// Lists soft-deleted versions.
    pub fn list_deleted_versions(&self) -> MetaResult<Vec<DatasetVersion>> {
        let mut out = Vec::new();
        for (_, bytes) in self.kv.scan_prefix(b"v/")? {
            let v: DatasetVersion = decode(&bytes)?;
            if v.deleted {
                out.push(v);
            }
        }
        Ok(out)
    }

    /// Lists soft-deleted file rows across all versions.
    pub fn list_deleted_files(&self) -> MetaResult<Vec<FileRow>> {
        let mut out = Vec::new();
        for (_, bytes) in self.kv.scan_prefix(b"f/")? {
            let f: FileRow = decode(&bytes)?;
            if f.deleted {
                out.push(f);
            }
        }
        Ok(out)
    }

    /// Lists every version row of a dataset, soft-deleted included.
    pub fn versions_of_dataset_any(
        &self,
        workspace: &str,
        dataset: &str,
    ) -> MetaResult<Vec<DatasetVersion>> {
        let mut out = Vec::new();
        for (_, id_raw) in self
            .kv
            .scan_prefix(&version_list_prefix(workspace, dataset))?
        {
            let id = VersionId::new(decode_id(&id_raw)?);
            if let Some(bytes) = self.kv.get(&version_row_key(id))? {
                out.push(decode(&bytes)?);
            }
        }
        Ok(out)
    }

    /// Physically removes a file row with its index and link rows.
    /// Returns the distinct chunks the file referenced, for recounting.
    pub fn purge_file(&self, file: &FileRow) -> MetaResult<Vec<ChunkId>> {
        let mut tx = Tx::new(self.kv.as_ref());
        let mut touched = Vec::new();
        for (key, bytes) in self.kv.scan_prefix(&file_chunk_prefix(file.id))? {
            let link: FileChunkRow = decode(&bytes)?;
            tx.delete(key);
            tx.delete(chunk_ref_key(link.chunk_id, link.file_id, link.index));
            if !touched.contains(&link.chunk_id) {
                touched.push(link.chunk_id);
            }
        }
        tx.delete(file_row_key(file.id));
        tx.delete(file_index_key(
            &VersionRef::new(
                file.workspace.clone(),
                file.dataset.clone(),
                file.version.clone(),
            ),
            &file.path,
        ));
        tx.commit()?;
        Ok(touched)
    }

    /// Physically removes an unreferenced chunk row, returning it so the
    /// caller can drop the blob.
    pub fn purge_chunk(&self, chunk_id: ChunkId) -> MetaResult<ChunkRow> {
        let bytes = self
            .kv
            .get(&chunk_row_key(chunk_id))?
            .ok_or(MetaError::ChunkRowNotFound(chunk_id))?;
        let row: ChunkRow = decode(&bytes)?;
        let mut tx = Tx::new(self.kv.as_ref());
        tx.delete(chunk_row_key(chunk_id));
        tx.delete(chunk_index_key(row.scheme, &row.hash));
        tx.commit()?;
        Ok(row)
    }

    /// Physically removes a version row and its index entry.
    pub fn purge_version(&self, v: &DatasetVersion) -> MetaResult<()> {
        let mut tx = Tx::new(self.kv.as_ref());
        tx.delete(version_row_key(v.id));
        tx.delete(version_index_key(&v.version_ref()));
        tx.commit()
    }

    /// Physically removes a dataset row and its index entry.
    pub fn purge_dataset(&self, ds: &Dataset) -> MetaResult<()> {
        let mut tx = Tx::new(self.kv.as_ref());
        tx.delete(dataset_row_key(ds.id));
        tx.delete(dataset_index_key(ds.kind, &ds.workspace, &ds.name));
        tx.commit()
    }
}
