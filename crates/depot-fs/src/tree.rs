//! Virtual directory trees synthesized from file paths.
//!
//! Directories are not stored in metadata; they are inferred from the path
//! separators of the version's file rows and given a default mode. The
//! whole tree is a plain serde structure so it can travel to remote
//! consumers in any of the supported formats.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use depot_meta::ChunkDecl;

use crate::error::{FsError, FsResult};

/// Mode assigned to inferred directories.
pub const DEFAULT_DIR_MODE: u32 = 0o755;

/// Payload distinguishing files from directories.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    /// A directory with name-sorted children.
    Dir {
        /// Children keyed by name; BTreeMap keeps readdir deterministic.
        children: BTreeMap<String, FsNode>,
    },
    /// A file with its ordered chunk references.
    File {
        /// The file's chunks in byte order.
        chunks: Vec<ChunkDecl>,
    },
}

/// One node of the virtual tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsNode {
    /// Node name (last path segment; empty for the root).
    pub name: String,
    /// Full path from the root, no leading slash; empty for the root.
    pub path: String,
    /// Unix mode bits.
    pub mode: u32,
    /// File size, or the summed size of a directory's descendants.
    pub size: u64,
    /// File or directory payload.
    pub kind: NodeKind,
}

impl FsNode {
    fn new_dir(name: String, path: String) -> Self {
        Self {
            name,
            path,
            mode: DEFAULT_DIR_MODE,
            size: 0,
            kind: NodeKind::Dir {
                children: BTreeMap::new(),
            },
        }
    }

    /// True if this node is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self.kind, NodeKind::Dir { .. })
    }

    /// Returns the ordered chunk list of a file node.
    pub fn chunks(&self) -> FsResult<&[ChunkDecl]> {
        match &self.kind {
            NodeKind::File { chunks } => Ok(chunks),
            NodeKind::Dir { .. } => Err(FsError::NotAFile(self.path.clone())),
        }
    }
}

/// A declared file entering the tree: its path, mode and ordered chunks.
#[derive(Clone, Debug)]
pub struct TreeEntry {
    /// Path within the version, no leading slash.
    pub path: String,
    /// Unix mode bits.
    pub mode: u32,
    /// File size in bytes.
    pub size: u64,
    /// The file's chunks in byte order.
    pub chunks: Vec<ChunkDecl>,
}

/// The reconstructed virtual filesystem of one dataset version.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsTree {
    root: FsNode,
}

impl FsTree {
    /// Builds a tree from file entries, inferring directories.
    pub fn build(entries: Vec<TreeEntry>) -> FsTree {
        let mut root = FsNode::new_dir(String::new(), String::new());

        for entry in entries {
            let segments: Vec<&str> = entry.path.split('/').collect();
            let mut node = &mut root;
            node.size += entry.size;

            for (i, segment) in segments.iter().enumerate() {
                let is_leaf = i == segments.len() - 1;
                let child_path = if node.path.is_empty() {
                    segment.to_string()
                } else {
                    format!("{}/{}", node.path, segment)
                };

                let NodeKind::Dir { children } = &mut node.kind else {
                    // A file already sits where this path needs a directory;
                    // the file index key makes this unreachable for saved
                    // structures, but tolerate it by skipping the entry.
                    break;
                };

                if is_leaf {
                    children.insert(
                        segment.to_string(),
                        FsNode {
                            name: segment.to_string(),
                            path: child_path,
                            mode: entry.mode,
                            size: entry.size,
                            kind: NodeKind::File {
                                chunks: entry.chunks.clone(),
                            },
                        },
                    );
                    break;
                } else {
                    let child = children
                        .entry(segment.to_string())
                        .or_insert_with(|| FsNode::new_dir(segment.to_string(), child_path));
                    child.size += entry.size;
                    node = child;
                }
            }
        }

        FsTree { root }
    }

    /// Returns the root directory node.
    pub fn root(&self) -> &FsNode {
        &self.root
    }

    /// Resolves a virtual path; `/` and the empty path are the root.
    pub fn lookup(&self, path: &str) -> Option<&FsNode> {
        let trimmed = path.trim_matches('/');
        if trimmed.is_empty() {
            return Some(&self.root);
        }
        let mut node = &self.root;
        for segment in trimmed.split('/') {
            match &node.kind {
                NodeKind::Dir { children } => node = children.get(segment)?,
                NodeKind::File { .. } => return None,
            }
        }
        Some(node)
    }

    /// Returns the immediate children of a directory, name-sorted.
    /// `n == 0` means all; otherwise at most `n` entries.
    pub fn readdir(&self, path: &str, n: usize) -> FsResult<Vec<&FsNode>> {
        let node = self
            .lookup(path)
            .ok_or_else(|| FsError::PathNotFound(path.to_string()))?;
        let NodeKind::Dir { children } = &node.kind else {
            return Err(FsError::NotADirectory(path.to_string()));
        };
        let mut out: Vec<&FsNode> = children.values().collect();
        if n > 0 {
            out.truncate(n);
        }
        Ok(out)
    }

    /// Returns every file node depth-first, directories walked in name
    /// order.
    pub fn files(&self) -> Vec<&FsNode> {
        let mut out = Vec::new();
        let mut stack = vec![&self.root];
        while let Some(node) = stack.pop() {
            match &node.kind {
                NodeKind::File { .. } => out.push(node),
                NodeKind::Dir { children } => {
                    // Reverse so the stack pops in name order.
                    for child in children.values().rev() {
                        stack.push(child);
                    }
                }
            }
        }
        out
    }

    /// Total number of file nodes.
    pub fn file_count(&self) -> usize {
        self.files().len()
    }
}
