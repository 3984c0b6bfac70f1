//! Content-addressed blob storage.
//!
//! Blobs live at `data_dir/<hex[0..8]>/<hex[8..]>`; the 8-character hex
//! prefix fans writes out across subdirectories so no single directory
//! grows unbounded. Writes land in a temp file and are renamed into place,
//! so a crash or a losing racer never leaves a partial blob visible.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::error::{ChunkError, ChunkResult};
use crate::hash::{ChunkHash, StoreScheme};

/// Counters for store activity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkStoreStats {
    /// Blobs written for the first time.
    pub puts_written: u64,
    /// Puts that found the blob already present.
    pub puts_deduped: u64,
    /// Successful get opens.
    pub gets: u64,
    /// Blobs removed.
    pub deletes: u64,
}

#[derive(Debug, Default)]
struct StatsInner {
    puts_written: AtomicU64,
    puts_deduped: AtomicU64,
    gets: AtomicU64,
    deletes: AtomicU64,
}

/// Content-addressed blob store rooted at one data directory.
pub struct ChunkStore {
    data_dir: PathBuf,
    tmp_seq: AtomicU64,
    stats: StatsInner,
}

impl ChunkStore {
    /// Opens (creating if needed) a store rooted at `data_dir`.
    pub async fn open(data_dir: impl Into<PathBuf>) -> ChunkResult<Self> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir).await?;
        Ok(Self {
            data_dir,
            tmp_seq: AtomicU64::new(0),
            stats: StatsInner::default(),
        })
    }

    /// Returns the root directory of this store.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Resolves the blob path for a hash under a scheme.
    fn blob_path(&self, hash: &ChunkHash, scheme: StoreScheme) -> PathBuf {
        match scheme {
            StoreScheme::V1 => {
                let hex = hash.to_hex();
                self.data_dir.join(&hex[..8]).join(&hex[8..])
            }
        }
    }

    /// Reports whether the blob exists, and its size when it does.
    pub async fn check(&self, hash: &ChunkHash, scheme: StoreScheme) -> ChunkResult<Option<u64>> {
        let path = self.blob_path(hash, scheme);
        match fs::metadata(&path).await {
            Ok(meta) => Ok(Some(meta.len())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Stores a blob under its declared hash. Idempotent: returns `false`
    /// without writing when the blob is already present.
    ///
    /// The payload is re-digested and must match `hash`; a mismatch is
    /// rejected before anything touches disk.
    pub async fn put(
        &self,
        hash: &ChunkHash,
        scheme: StoreScheme,
        data: &[u8],
    ) -> ChunkResult<bool> {
        let computed = ChunkHash::digest(data);
        if computed != *hash {
            return Err(ChunkError::HashMismatch {
                declared: *hash,
                computed,
            });
        }

        let path = self.blob_path(hash, scheme);
        if fs::metadata(&path).await.is_ok() {
            self.stats.puts_deduped.fetch_add(1, Ordering::Relaxed);
            debug!(hash = %hash, "put deduplicated");
            return Ok(false);
        }

        let parent = path.parent().expect("blob path always has a fan-out parent");
        fs::create_dir_all(parent).await?;

        let tmp = parent.join(format!(
            ".tmp-{}-{}",
            std::process::id(),
            self.tmp_seq.fetch_add(1, Ordering::Relaxed)
        ));
        let mut file = fs::File::create(&tmp).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        drop(file);

        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            // A concurrent put may have won the rename; that is fine.
            if fs::metadata(&path).await.is_ok() {
                self.stats.puts_deduped.fetch_add(1, Ordering::Relaxed);
                return Ok(false);
            }
            return Err(e.into());
        }

        self.stats.puts_written.fetch_add(1, Ordering::Relaxed);
        debug!(hash = %hash, size = data.len(), "blob written");
        Ok(true)
    }

    /// Opens a streaming reader over the blob, or `NotFound`.
    pub async fn get(&self, hash: &ChunkHash, scheme: StoreScheme) -> ChunkResult<fs::File> {
        let path = self.blob_path(hash, scheme);
        match fs::File::open(&path).await {
            Ok(file) => {
                self.stats.gets.fetch_add(1, Ordering::Relaxed);
                Ok(file)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ChunkError::NotFound {
                hash: *hash,
                scheme: scheme.as_byte(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Reads the entire blob into memory.
    pub async fn get_bytes(&self, hash: &ChunkHash, scheme: StoreScheme) -> ChunkResult<Vec<u8>> {
        let path = self.blob_path(hash, scheme);
        match fs::read(&path).await {
            Ok(data) => {
                self.stats.gets.fetch_add(1, Ordering::Relaxed);
                Ok(data)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ChunkError::NotFound {
                hash: *hash,
                scheme: scheme.as_byte(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Removes a blob. Missing blobs are reported, not ignored, so GC can
    /// log them.
    pub async fn delete(&self, hash: &ChunkHash, scheme: StoreScheme) -> ChunkResult<()> {
        let path = self.blob_path(hash, scheme);
        match fs::remove_file(&path).await {
            Ok(()) => {
                self.stats.deletes.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(hash = %hash, "delete of absent blob");
                Err(ChunkError::NotFound {
                    hash: *hash,
                    scheme: scheme.as_byte(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Snapshot of the activity counters.
    pub fn stats(&self) -> ChunkStoreStats {
        ChunkStoreStats {
            puts_written: self.stats.puts_written.load(Ordering::Relaxed),
            puts_deduped: self.stats.puts_deduped.load(Ordering::Relaxed),
            gets: self.stats.gets.load(Ordering::Relaxed),
            deletes: self.stats.deletes.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    async fn open_store() -> (tempfile::TempDir, ChunkStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ChunkStore::open(dir.path()).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_put_then_check_and_get() {
        let (_dir, store) = open_store().await;
        let data = b"dummy content";
        let hash = ChunkHash::digest(data);

        assert!(store.check(&hash, StoreScheme::V1).await.unwrap().is_none());
        assert!(store.put(&hash, StoreScheme::V1, data).await.unwrap());
        assert_eq!(
            store.check(&hash, StoreScheme::V1).await.unwrap(),
            Some(data.len() as u64)
        );

        let mut reader = store.get(&hash, StoreScheme::V1).await.unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, data);
    }

    #[tokio::test]
    async fn test_put_is_idempotent() {
        let (_dir, store) = open_store().await;
        let data = b"stored once";
        let hash = ChunkHash::digest(data);

        assert!(store.put(&hash, StoreScheme::V1, data).await.unwrap());
        assert!(!store.put(&hash, StoreScheme::V1, data).await.unwrap());

        let stats = store.stats();
        assert_eq!(stats.puts_written, 1);
        assert_eq!(stats.puts_deduped, 1);
    }

    #[tokio::test]
    async fn test_fanout_layout_on_disk() {
        let (dir, store) = open_store().await;
        let data = b"layout probe";
        let hash = ChunkHash::digest(data);
        store.put(&hash, StoreScheme::V1, data).await.unwrap();

        let hex = hash.to_hex();
        let expected = dir.path().join(&hex[..8]).join(&hex[8..]);
        assert!(expected.exists());
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let (_dir, store) = open_store().await;
        let hash = ChunkHash::digest(b"never stored");
        let err = store.get(&hash, StoreScheme::V1).await.unwrap_err();
        assert!(matches!(err, ChunkError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_put_rejects_wrong_hash() {
        let (_dir, store) = open_store().await;
        let hash = ChunkHash::digest(b"declared payload");
        let err = store
            .put(&hash, StoreScheme::V1, b"actual payload")
            .await
            .unwrap_err();
        assert!(matches!(err, ChunkError::HashMismatch { .. }));
        assert!(store.check(&hash, StoreScheme::V1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_removes_blob() {
        let (_dir, store) = open_store().await;
        let data = b"short lived";
        let hash = ChunkHash::digest(data);
        store.put(&hash, StoreScheme::V1, data).await.unwrap();

        store.delete(&hash, StoreScheme::V1).await.unwrap();
        assert!(store.check(&hash, StoreScheme::V1).await.unwrap().is_none());

        let err = store.delete(&hash, StoreScheme::V1).await.unwrap_err();
        assert!(matches!(err, ChunkError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_no_tmp_files_left_behind() {
        let (dir, store) = open_store().await;
        let data = b"tmp hygiene";
        let hash = ChunkHash::digest(data);
        store.put(&hash, StoreScheme::V1, data).await.unwrap();

        let hex = hash.to_hex();
        let fanout = dir.path().join(&hex[..8]);
        let mut entries = tokio::fs::read_dir(&fanout).await.unwrap();
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        assert_eq!(names, vec![hex[8..].to_string()]);
    }
}
