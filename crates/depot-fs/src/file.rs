//! Seekable byte streams reassembled from ordered chunks.

use std::io::SeekFrom;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncSeekExt};

use depot_chunk::ChunkStore;
use depot_meta::ChunkDecl;

use crate::error::{FsError, FsResult};

/// A sequential, seekable reader over one file's chunk list.
///
/// Reads span chunk boundaries transparently: when the current blob is
/// exhausted the next chunk's reader is opened on demand. Seeking
/// recomputes the active chunk from the cumulative chunk sizes and drops
/// any open reader.
pub struct FileStream {
    store: Arc<ChunkStore>,
    chunks: Vec<ChunkDecl>,
    /// Cumulative start offset of each chunk.
    offsets: Vec<u64>,
    total: u64,
    pos: u64,
    current: Option<(usize, tokio::fs::File)>,
}

impl FileStream {
    /// Creates a stream over `chunks` backed by `store`.
    pub fn new(store: Arc<ChunkStore>, chunks: Vec<ChunkDecl>) -> Self {
        let mut offsets = Vec::with_capacity(chunks.len());
        let mut total = 0u64;
        for chunk in &chunks {
            offsets.push(total);
            total += chunk.size;
        }
        Self {
            store,
            chunks,
            offsets,
            total,
            pos: 0,
            current: None,
        }
    }

    /// Total file length in bytes.
    pub fn len(&self) -> u64 {
        self.total
    }

    /// True for a zero-length file.
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Current byte position.
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Index of the chunk containing `pos`, skipping zero-sized chunks.
    fn chunk_at(&self, pos: u64) -> Option<usize> {
        (0..self.chunks.len())
            .find(|&i| pos >= self.offsets[i] && pos < self.offsets[i] + self.chunks[i].size)
    }

    /// Reads into `buf`, returning 0 at end of file.
    pub async fn read(&mut self, buf: &mut [u8]) -> FsResult<usize> {
        if buf.is_empty() || self.pos >= self.total {
            return Ok(0);
        }

        let idx = match self.chunk_at(self.pos) {
            Some(idx) => idx,
            None => return Ok(0),
        };

        if self.current.as_ref().map(|(i, _)| *i) != Some(idx) {
            let chunk = &self.chunks[idx];
            let mut file = self.store.get(&chunk.hash, chunk.scheme).await?;
            let in_chunk = self.pos - self.offsets[idx];
            if in_chunk > 0 {
                file.seek(SeekFrom::Start(in_chunk)).await?;
            }
            self.current = Some((idx, file));
        }

        // Clamp to the chunk boundary so a declared size is never crossed
        // within one underlying read.
        let chunk_end = self.offsets[idx] + self.chunks[idx].size;
        let max = (chunk_end - self.pos).min(buf.len() as u64) as usize;

        let (_, file) = self.current.as_mut().expect("reader opened above");
        let n = file.read(&mut buf[..max]).await?;
        if n == 0 {
            // The blob ended before its declared size.
            let chunk = &self.chunks[idx];
            return Err(FsError::TruncatedChunk {
                hash: chunk.hash,
                declared: chunk.size,
            });
        }

        self.pos += n as u64;
        if self.chunk_at(self.pos) != Some(idx) {
            self.current = None;
        }
        Ok(n)
    }

    /// Repositions the stream, closing any open chunk reader.
    ///
    /// Seeking past the end is allowed; subsequent reads return 0.
    pub async fn seek(&mut self, pos: SeekFrom) -> FsResult<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::End(delta) => self.total as i64 + delta,
            SeekFrom::Current(delta) => self.pos as i64 + delta,
        };
        if target < 0 {
            return Err(FsError::InvalidSeek);
        }
        self.current = None;
        self.pos = target as u64;
        Ok(self.pos)
    }

    /// Reads every remaining byte.
    pub async fn read_to_end(&mut self) -> FsResult<Vec<u8>> {
        let mut out = Vec::with_capacity(self.total.saturating_sub(self.pos) as usize);
        let mut buf = [0u8; 8192];
        loop {
            let n = self.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depot_chunk::{ChunkHash, StoreScheme};

    async fn stream_over(payloads: &[&[u8]]) -> (tempfile::TempDir, FileStream) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ChunkStore::open(dir.path()).await.unwrap());
        let mut chunks = Vec::new();
        for payload in payloads {
            let hash = ChunkHash::digest(payload);
            store.put(&hash, StoreScheme::V1, payload).await.unwrap();
            chunks.push(ChunkDecl {
                hash,
                size: payload.len() as u64,
                scheme: StoreScheme::V1,
            });
        }
        let stream = FileStream::new(store, chunks);
        (dir, stream)
    }

    #[tokio::test]
    async fn test_read_spans_chunk_boundaries() {
        let (_dir, mut stream) = stream_over(&[b"hello ", b"chunked ", b"world"]).await;
        assert_eq!(stream.len(), 19);

        let data = stream.read_to_end().await.unwrap();
        assert_eq!(data, b"hello chunked world");
    }

    #[tokio::test]
    async fn test_small_buffer_reads() {
        let (_dir, mut stream) = stream_over(&[b"abc", b"def"]).await;
        let mut out = Vec::new();
        let mut buf = [0u8; 2];
        loop {
            let n = stream.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        assert_eq!(out, b"abcdef");
    }

    #[tokio::test]
    async fn test_seek_start_into_later_chunk() {
        let (_dir, mut stream) = stream_over(&[b"0123", b"4567", b"89"]).await;
        stream.seek(SeekFrom::Start(6)).await.unwrap();
        let data = stream.read_to_end().await.unwrap();
        assert_eq!(data, b"6789");
    }

    #[tokio::test]
    async fn test_seek_within_chunk() {
        let (_dir, mut stream) = stream_over(&[b"0123456789"]).await;
        stream.seek(SeekFrom::Start(3)).await.unwrap();
        let mut buf = [0u8; 4];
        let n = stream.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"3456");
    }

    #[tokio::test]
    async fn test_seek_end_and_current() {
        let (_dir, mut stream) = stream_over(&[b"0123", b"4567"]).await;
        let pos = stream.seek(SeekFrom::End(-3)).await.unwrap();
        assert_eq!(pos, 5);
        let data = stream.read_to_end().await.unwrap();
        assert_eq!(data, b"567");

        stream.seek(SeekFrom::Start(2)).await.unwrap();
        stream.seek(SeekFrom::Current(2)).await.unwrap();
        let data = stream.read_to_end().await.unwrap();
        assert_eq!(data, b"4567");
    }

    #[tokio::test]
    async fn test_seek_negative_is_error() {
        let (_dir, mut stream) = stream_over(&[b"0123"]).await;
        assert!(matches!(
            stream.seek(SeekFrom::End(-10)).await,
            Err(FsError::InvalidSeek)
        ));
    }

    #[tokio::test]
    async fn test_read_past_end_returns_zero() {
        let (_dir, mut stream) = stream_over(&[b"abc"]).await;
        stream.seek(SeekFrom::Start(100)).await.unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(stream.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_empty_file() {
        let (_dir, mut stream) = stream_over(&[]).await;
        assert!(stream.is_empty());
        let mut buf = [0u8; 4];
        assert_eq!(stream.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_missing_blob_surfaces_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ChunkStore::open(dir.path()).await.unwrap());
        let mut stream = FileStream::new(
            store,
            vec![ChunkDecl {
                hash: ChunkHash::digest(b"never stored"),
                size: 12,
                scheme: StoreScheme::V1,
            }],
        );
        let mut buf = [0u8; 4];
        let err = stream.read(&mut buf).await.unwrap_err();
        assert!(matches!(err, FsError::Chunk(_)));
    }
}
