//! Cache-backed access to the listing tree.
//!
//! The held tree is only ever replaced as a whole. Readers clone an `Arc`
//! under a short read lock; rebuilds are serialised by a separate mutex so a
//! burst of cold readers triggers a single scan.

use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use tracing::{debug, info};

use crate::tree::{ArchiveNode, TreeBuilder};
use crate::utils::Result;

/// Something that can produce a fresh listing tree.
pub trait TreeSource: Send + Sync {
    fn build_tree(&self) -> Result<ArchiveNode>;
}

impl TreeSource for TreeBuilder {
    fn build_tree(&self) -> Result<ArchiveNode> {
        self.scan_directory()
    }
}

pub struct TreeCache<S> {
    source: S,
    current: RwLock<Option<Arc<ArchiveNode>>>,
    rebuild: Mutex<()>,
}

impl<S: TreeSource> TreeCache<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            current: RwLock::new(None),
            rebuild: Mutex::new(()),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn is_populated(&self) -> bool {
        self.snapshot().is_some()
    }

    /// Return the held tree, building it first when the cache is empty.
    pub fn list_tree(&self) -> Result<Arc<ArchiveNode>> {
        if let Some(tree) = self.snapshot() {
            debug!("Tree cache hit");
            return Ok(tree);
        }

        let _guard = self.rebuild.lock().unwrap_or_else(|e| e.into_inner());
        // Another caller may have finished a build while we waited.
        if let Some(tree) = self.snapshot() {
            return Ok(tree);
        }
        self.rebuild_locked()
    }

    /// Drop the held tree and rebuild it right away.
    ///
    /// A failed rebuild leaves the cache empty, so the next reader retries.
    pub fn invalidate(&self) -> Result<Arc<ArchiveNode>> {
        let _guard = self.rebuild.lock().unwrap_or_else(|e| e.into_inner());
        self.store(None);
        info!("Tree cache invalidated");
        self.rebuild_locked()
    }

    fn rebuild_locked(&self) -> Result<Arc<ArchiveNode>> {
        let started = Instant::now();
        let tree = Arc::new(self.source.build_tree()?);
        self.store(Some(Arc::clone(&tree)));
        info!("Tree cache populated in {} ms", started.elapsed().as_millis());
        Ok(tree)
    }

    fn snapshot(&self) -> Option<Arc<ArchiveNode>> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn store(&self, tree: Option<Arc<ArchiveNode>>) {
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = tree;
    }
}
