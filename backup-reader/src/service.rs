//! The surface handed to the HTTP and file-watcher collaborators.

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::cache::TreeCache;
use crate::config::ReaderConfig;
use crate::extract::{Extracted, MemberExtractor};
use crate::tree::{ArchiveNode, TreeBuilder, WorkerPool};
use crate::utils::{ReaderError, Result};

/// Cached listing, extraction and invalidation over one configuration.
///
/// Owns the indexing worker pool; it lives as long as the service does.
pub struct BackupService {
    config: Arc<ReaderConfig>,
    cache: TreeCache<TreeBuilder>,
    extractor: MemberExtractor,
}

impl BackupService {
    pub fn new(config: ReaderConfig) -> Result<Self> {
        let config = Arc::new(config);
        let pool = Arc::new(WorkerPool::new(config.workers)?);
        info!(
            "Backup service ready for {} ({} workers, {} passwords)",
            config.backup_dir.display(),
            pool.threads(),
            config.passwords.len()
        );

        Ok(Self {
            cache: TreeCache::new(TreeBuilder::new(Arc::clone(&config), pool)),
            extractor: MemberExtractor::new(Arc::clone(&config)),
            config,
        })
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// Cached tree; safe to call from many threads at once.
    pub fn list_tree(&self) -> Result<Arc<ArchiveNode>> {
        self.cache.list_tree()
    }

    /// Stream one member out of `archive`.
    ///
    /// `archive` must sit directly inside the backup directory or one with a
    /// registered password, which keeps requests from reaching arbitrary files.
    pub fn extract(&self, archive: &Path, l1: &str, l2: Option<&str>) -> Result<Extracted> {
        self.check_archive_path(archive)?;
        self.extractor.extract_path(archive, l1, l2)
    }

    pub fn is_cached(&self) -> bool {
        self.cache.is_populated()
    }

    /// Rebuild the cached tree after the backup directory changed.
    pub fn invalidate(&self) -> Result<()> {
        self.cache.invalidate().map(|_| ())
    }

    fn check_archive_path(&self, archive: &Path) -> Result<()> {
        let file_name = archive
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if !self.config.is_archive_name(&file_name) {
            return Err(ReaderError::InvalidPath(format!(
                "{} is not a backup archive",
                archive.display()
            )));
        }
        let parent = archive.parent().unwrap_or_else(|| Path::new("."));
        if !self.config.is_backup_dir(parent) {
            return Err(ReaderError::InvalidPath(format!(
                "{} is not inside a backup directory",
                archive.display()
            )));
        }
        Ok(())
    }
}
