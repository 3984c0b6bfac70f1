//! Tree reconstruction from metadata rows, with a keyed cache.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use depot_meta::{ChunkDecl, MetaError, MetadataStore, VersionRef};

use crate::error::FsResult;
use crate::tree::{FsTree, TreeEntry};

/// Reconstructs virtual trees from the metadata graph.
pub struct FsBuilder {
    meta: Arc<MetadataStore>,
}

impl FsBuilder {
    /// Creates a builder over the given metadata store.
    pub fn new(meta: Arc<MetadataStore>) -> Self {
        Self { meta }
    }

    /// Loads the version's live file rows and synthesizes its tree.
    pub fn build(&self, r: &VersionRef) -> FsResult<FsTree> {
        match self.meta.get_version(r)? {
            Some(v) if !v.deleted => {}
            _ => return Err(MetaError::VersionNotFound(r.clone()).into()),
        }

        let mut entries = Vec::new();
        for file in self.meta.files_of_version(r, false)? {
            let chunks: Vec<ChunkDecl> = self
                .meta
                .chunks_of_file(&file)?
                .into_iter()
                .map(|(_, row)| ChunkDecl {
                    hash: row.hash,
                    size: row.size,
                    scheme: row.scheme,
                })
                .collect();
            entries.push(TreeEntry {
                path: file.path,
                mode: file.mode,
                size: file.size,
                chunks,
            });
        }
        debug!(version = %r, files = entries.len(), "tree built");
        Ok(FsTree::build(entries))
    }
}

/// Version-keyed cache of built trees.
///
/// Replicas keep served trees here; invalidation events and local deletes
/// purge the affected keys.
pub struct TreeCache {
    builder: FsBuilder,
    trees: DashMap<VersionRef, Arc<FsTree>>,
}

impl TreeCache {
    /// Creates an empty cache over a builder.
    pub fn new(builder: FsBuilder) -> Self {
        Self {
            builder,
            trees: DashMap::new(),
        }
    }

    /// Returns the cached tree for a version, building it on first use.
    pub fn get(&self, r: &VersionRef) -> FsResult<Arc<FsTree>> {
        if let Some(tree) = self.trees.get(r) {
            return Ok(tree.clone());
        }
        let tree = Arc::new(self.builder.build(r)?);
        self.trees.insert(r.clone(), tree.clone());
        Ok(tree)
    }

    /// Inserts a pre-built tree (e.g. one fetched from a master).
    pub fn insert(&self, r: VersionRef, tree: Arc<FsTree>) {
        self.trees.insert(r, tree);
    }

    /// Returns the cached tree without building on a miss.
    pub fn peek(&self, r: &VersionRef) -> Option<Arc<FsTree>> {
        self.trees.get(r).map(|t| t.clone())
    }

    /// Drops the cached tree for one version.
    pub fn purge_version(&self, r: &VersionRef) {
        self.trees.remove(r);
    }

    /// Drops every cached tree of one dataset.
    pub fn purge_dataset(&self, workspace: &str, dataset: &str) {
        self.trees
            .retain(|key, _| !(key.workspace == workspace && key.dataset == dataset));
    }

    /// Number of cached trees.
    pub fn len(&self) -> usize {
        self.trees.len()
    }

    /// True when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }
}
