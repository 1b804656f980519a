//! Builds the listing tree for a backup directory.
//!
//! Per container the members are partitioned into directories, nested
//! sub-archives and plain files, each partition sorted by name, and emitted
//! in that order. Nested sub-archives are opened (and decrypted) in parallel.
//! A failure inside one backup or one nested archive becomes an error entry
//! at that position and never affects its siblings.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use super::node::{format_mtime, format_system_time, ArchiveNode, NodeKind, TreeEntry};
use super::pool::WorkerPool;
use crate::archive::{MemberInfo, NestedArchive, OuterArchive};
use crate::config::ReaderConfig;
use crate::utils::paths::normalize_path;
use crate::utils::Result;

#[derive(Clone)]
pub struct TreeBuilder {
    config: Arc<ReaderConfig>,
    pool: Arc<WorkerPool>,
}

/// Members of one container split by how they are listed.
struct Partition<'a> {
    dirs: Vec<&'a MemberInfo>,
    nested: Vec<&'a MemberInfo>,
    files: Vec<&'a MemberInfo>,
}

impl<'a> Partition<'a> {
    fn of(members: &'a [MemberInfo], is_nested: impl Fn(&MemberInfo) -> bool) -> Self {
        let mut sorted: Vec<&MemberInfo> = members.iter().filter(|m| !m.is_root_marker()).collect();
        sorted.sort_by(|a, b| a.name.cmp(&b.name));

        let mut partition = Partition {
            dirs: Vec::new(),
            nested: Vec::new(),
            files: Vec::new(),
        };
        for member in sorted {
            if member.is_dir() {
                partition.dirs.push(member);
            } else if is_nested(member) {
                partition.nested.push(member);
            } else {
                partition.files.push(member);
            }
        }
        partition
    }
}

fn leaf(member: &MemberInfo, kind: NodeKind) -> TreeEntry {
    ArchiveNode::leaf(&member.name, kind, member.size, format_mtime(member.mtime)).into()
}

/// Turn one parallel unit's outcome into a tree entry, logging failures.
fn settle(name: &str, outcome: std::result::Result<Result<ArchiveNode>, String>) -> TreeEntry {
    match outcome {
        Ok(Ok(node)) => node.into(),
        Ok(Err(e)) => {
            warn!("Failed to list {}: {}", name, e);
            TreeEntry::failed(name, e.to_string())
        }
        Err(panic) => {
            warn!("Listing {} panicked: {}", name, panic);
            TreeEntry::failed(name, panic)
        }
    }
}

impl TreeBuilder {
    pub fn new(config: Arc<ReaderConfig>, pool: Arc<WorkerPool>) -> Self {
        Self { config, pool }
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// List every archive directly inside the configured backup directory.
    ///
    /// Fails only when the directory itself cannot be read.
    pub fn scan_directory(&self) -> Result<ArchiveNode> {
        let dir = &self.config.backup_dir;
        let started = Instant::now();

        let mut names = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if self.config.is_archive_name(&name) && entry.path().is_file() {
                names.push(name);
            }
        }
        names.sort();

        let root_name = normalize_path(dir);
        if names.is_empty() {
            info!("No backups found in {}", dir.display());
            return Ok(ArchiveNode::root(&root_name, Vec::new()));
        }

        let outcomes = self
            .pool
            .map_ordered(names.clone(), |name| self.list_backup(&dir.join(&name)));
        let children: Vec<TreeEntry> = names
            .iter()
            .zip(outcomes)
            .map(|(name, outcome)| settle(name, outcome))
            .collect();

        info!(
            "Scanned {}: {} backups ({} failed) in {} ms",
            dir.display(),
            children.len(),
            children.iter().filter(|c| c.is_failed()).count(),
            started.elapsed().as_millis()
        );
        Ok(ArchiveNode::root(&root_name, children))
    }

    /// Backup node for one archive file, with its container fully expanded.
    pub fn list_backup(&self, path: &Path) -> Result<ArchiveNode> {
        let outer = OuterArchive::open(path)?;
        let metadata = fs::metadata(path)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());

        let children = self.list_container(&outer);
        Ok(ArchiveNode::container(
            &file_name,
            NodeKind::Backup,
            metadata.len(),
            metadata.modified().ok().and_then(format_system_time),
            children,
        ))
    }

    /// Entries of an opened backup: directories, expanded nested archives, files.
    pub fn list_container(&self, outer: &OuterArchive) -> Vec<TreeEntry> {
        let partition = Partition::of(outer.members(), |m| {
            self.config.is_nested_archive_name(&m.name)
        });

        let mut entries: Vec<TreeEntry> = partition
            .dirs
            .iter()
            .map(|m| leaf(m, NodeKind::Dir))
            .collect();

        if !partition.nested.is_empty() {
            let outcomes = self
                .pool
                .map_ordered(partition.nested.clone(), |m| self.list_nested(outer, m));
            entries.extend(
                partition
                    .nested
                    .iter()
                    .zip(outcomes)
                    .map(|(m, outcome)| settle(&m.name, outcome)),
            );
        }

        entries.extend(partition.files.iter().map(|m| leaf(m, NodeKind::File)));
        entries
    }

    /// Zip node for one nested archive. Its own nested-looking members are
    /// listed as plain files: there is no third level.
    fn list_nested(&self, outer: &OuterArchive, member: &MemberInfo) -> Result<ArchiveNode> {
        let mut nested = NestedArchive::open(outer, &member.name, &self.config)?;
        let members = nested.members()?;
        debug!(
            "Listed nested archive {} in {} ({} entries)",
            member.name,
            outer.path().display(),
            members.len()
        );

        let partition = Partition::of(&members, |_| false);
        let children = partition
            .dirs
            .iter()
            .map(|m| leaf(m, NodeKind::Dir))
            .chain(partition.files.iter().map(|m| leaf(m, NodeKind::File)))
            .collect();

        Ok(ArchiveNode::container(
            &member.name,
            NodeKind::Zip,
            member.size,
            format_mtime(member.mtime),
            children,
        ))
    }
}
