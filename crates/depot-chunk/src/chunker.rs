//! Fixed-size chunking of byte streams.
//!
//! Boundaries are byte offsets, not content-defined: identical input and
//! block size always yield the identical chunk/hash sequence, and changing
//! the block size changes every downstream hash.

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::ChunkResult;
use crate::hash::ChunkHash;

/// Default chunk block size: 4 MiB.
pub const DEFAULT_BLOCK_SIZE: usize = 4 * 1024 * 1024;

/// One block of file bytes together with its digest.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// The exact block bytes.
    pub data: Bytes,
    /// SHA-512 of `data`.
    pub hash: ChunkHash,
}

impl Chunk {
    /// Returns the block length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the block carries no bytes.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Splits a byte stream into fixed-size hashed blocks.
///
/// The sequence is lazy, finite and non-restartable: each `next_chunk`
/// consumes the source. A zero-byte read from the source ends the sequence.
pub struct Chunker<R> {
    reader: R,
    block_size: usize,
    done: bool,
}

impl<R: AsyncRead + Unpin> Chunker<R> {
    /// Creates a chunker over `reader` producing blocks of `block_size`
    /// bytes (the final block may be shorter). `block_size` must be
    /// non-zero.
    pub fn new(reader: R, block_size: usize) -> Self {
        assert!(block_size > 0, "block size must be non-zero");
        Self {
            reader,
            block_size,
            done: false,
        }
    }

    /// Creates a chunker with [`DEFAULT_BLOCK_SIZE`].
    pub fn with_default_block_size(reader: R) -> Self {
        Self::new(reader, DEFAULT_BLOCK_SIZE)
    }

    /// Returns the next block, or `None` once the source is exhausted.
    ///
    /// Short reads from the source are accumulated until the block is full
    /// or the stream ends; only a zero-byte read is treated as the end
    /// sentinel.
    pub async fn next_chunk(&mut self) -> ChunkResult<Option<Chunk>> {
        if self.done {
            return Ok(None);
        }

        let mut buf = vec![0u8; self.block_size];
        let mut filled = 0;
        while filled < self.block_size {
            let n = self.reader.read(&mut buf[filled..]).await?;
            if n == 0 {
                self.done = true;
                break;
            }
            filled += n;
        }

        if filled == 0 {
            return Ok(None);
        }

        buf.truncate(filled);
        let hash = ChunkHash::digest(&buf);
        Ok(Some(Chunk {
            data: Bytes::from(buf),
            hash,
        }))
    }

    /// Drains the source, returning every remaining block in order.
    pub async fn collect_all(mut self) -> ChunkResult<Vec<Chunk>> {
        let mut chunks = Vec::new();
        while let Some(chunk) = self.next_chunk().await? {
            chunks.push(chunk);
        }
        Ok(chunks)
    }
}
