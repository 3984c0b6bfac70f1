//! Wire encodings for virtual trees.
//!
//! Three formats, semantically identical, selected by the caller: plain
//! JSON, compact bincode, and bincode compressed with zstd for large trees
//! crossing node boundaries.

use serde::{Deserialize, Serialize};

use crate::error::{FsError, FsResult};
use crate::tree::FsTree;

/// zstd level used for the compressed format.
const ZSTD_LEVEL: i32 = 3;

/// Wire format for a serialized tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeFormat {
    /// Human-readable JSON.
    Json,
    /// Compact bincode.
    Binary,
    /// Bincode wrapped in a zstd frame.
    BinaryZstd,
}

impl TreeFormat {
    /// All supported formats.
    pub fn all() -> &'static [TreeFormat] {
        &[TreeFormat::Json, TreeFormat::Binary, TreeFormat::BinaryZstd]
    }
}

/// Encodes a tree in the requested format.
pub fn encode_tree(tree: &FsTree, format: TreeFormat) -> FsResult<Vec<u8>> {
    match format {
        TreeFormat::Json => serde_json::to_vec(tree).map_err(|e| FsError::Codec(e.to_string())),
        TreeFormat::Binary => bincode::serialize(tree).map_err(|e| FsError::Codec(e.to_string())),
        TreeFormat::BinaryZstd => {
            let bin = bincode::serialize(tree).map_err(|e| FsError::Codec(e.to_string()))?;
            zstd::stream::encode_all(&bin[..], ZSTD_LEVEL).map_err(FsError::Io)
        }
    }
}

/// Decodes a tree from the given format.
pub fn decode_tree(bytes: &[u8], format: TreeFormat) -> FsResult<FsTree> {
    match format {
        TreeFormat::Json => serde_json::from_slice(bytes).map_err(|e| FsError::Codec(e.to_string())),
        TreeFormat::Binary => bincode::deserialize(bytes).map_err(|e| FsError::Codec(e.to_string())),
        TreeFormat::BinaryZstd => {
            let bin = zstd::stream::decode_all(bytes).map_err(FsError::Io)?;
            bincode::deserialize(&bin).map_err(|e| FsError::Codec(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::TreeEntry;
    use depot_chunk::{ChunkHash, StoreScheme};
    use depot_meta::ChunkDecl;

    fn sample_tree() -> FsTree {
        FsTree::build(
            (0..20)
                .map(|i| TreeEntry {
                    path: format!("dir{}/file{}.bin", i % 3, i),
                    mode: 0o644,
                    size: 64,
                    chunks: vec![ChunkDecl {
                        hash: ChunkHash::digest(format!("chunk{i}").as_bytes()),
                        size: 64,
                        scheme: StoreScheme::V1,
                    }],
                })
                .collect(),
        )
    }

    #[test]
    fn test_roundtrip_every_format() {
        let tree = sample_tree();
        for &format in TreeFormat::all() {
            let bytes = encode_tree(&tree, format).unwrap();
            let decoded = decode_tree(&bytes, format).unwrap();
            assert_eq!(decoded, tree, "format {format:?}");
        }
    }

    #[test]
    fn test_formats_agree_on_content() {
        let tree = sample_tree();
        let via_json = decode_tree(&encode_tree(&tree, TreeFormat::Json).unwrap(), TreeFormat::Json)
            .unwrap();
        let via_zstd = decode_tree(
            &encode_tree(&tree, TreeFormat::BinaryZstd).unwrap(),
            TreeFormat::BinaryZstd,
        )
        .unwrap();
        assert_eq!(via_json, via_zstd);
    }

    #[test]
    fn test_binary_is_smaller_than_json() {
        let tree = sample_tree();
        let json = encode_tree(&tree, TreeFormat::Json).unwrap();
        let binary = encode_tree(&tree, TreeFormat::Binary).unwrap();
        assert!(binary.len() < json.len());
    }

    #[test]
    fn test_garbage_input_is_codec_error() {
        assert!(decode_tree(b"not json", TreeFormat::Json).is_err());
        assert!(decode_tree(b"\x00\x01", TreeFormat::Binary).is_err());
        assert!(decode_tree(b"\x00\x01", TreeFormat::BinaryZstd).is_err());
    }

    #[test]
    fn test_empty_tree_roundtrip() {
        let tree = FsTree::build(vec![]);
        for &format in TreeFormat::all() {
            let decoded = decode_tree(&encode_tree(&tree, format).unwrap(), format).unwrap();
            assert_eq!(decoded, tree);
        }
    }
}
