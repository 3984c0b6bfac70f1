//! Tar export of reconstructed trees.
//!
//! Walks the tree depth-first and emits one header per file, size and mode
//! included, followed by the file's reassembled bytes.

use std::sync::Arc;

use tar::{Builder, Header};
use tracing::debug;

use depot_chunk::ChunkStore;

use crate::error::FsResult;
use crate::file::FileStream;
use crate::tree::FsTree;

/// Exports every file of the tree into a tar archive.
pub async fn export_tar(tree: &FsTree, store: Arc<ChunkStore>) -> FsResult<Vec<u8>> {
    let mut builder = Builder::new(Vec::new());

    for node in tree.files() {
        let chunks = node.chunks()?.to_vec();
        let mut stream = FileStream::new(store.clone(), chunks);
        let data = stream.read_to_end().await?;

        let mut header = Header::new_gnu();
        header.set_size(node.size);
        header.set_mode(node.mode);
        header.set_cksum();
        builder.append_data(&mut header, &node.path, &data[..])?;
    }

    let bytes = builder.into_inner()?;
    debug!(files = tree.file_count(), bytes = bytes.len(), "tar exported");
    Ok(bytes)
}
