//! Tree node types and their JSON shape.

use chrono::{DateTime, Local, TimeZone};
use serde::Serialize;
use std::time::SystemTime;

use crate::utils::paths::normalize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Root,
    Backup,
    Dir,
    Zip,
    File,
}

/// One entry of the listing.
///
/// `children` is only ever set on root, backup and zip nodes; directories are
/// listed flat, with their path in `name`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArchiveNode {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mtime: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<TreeEntry>>,
}

/// A subtree that could not be computed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedNode {
    pub name: String,
    #[serde(rename = "error")]
    pub message: String,
}

/// Either a node or the failure that replaced it; serialised untagged so the
/// two JSON shapes are `{name, type, ...}` and `{name, error}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TreeEntry {
    Node(ArchiveNode),
    Failed(FailedNode),
}

impl ArchiveNode {
    pub fn root(dir: &str, children: Vec<TreeEntry>) -> Self {
        Self {
            name: normalize(dir),
            kind: NodeKind::Root,
            size: None,
            mtime: None,
            children: Some(children),
        }
    }

    pub fn container(
        name: &str,
        kind: NodeKind,
        size: u64,
        mtime: Option<String>,
        children: Vec<TreeEntry>,
    ) -> Self {
        Self {
            name: normalize(name),
            kind,
            size: Some(size),
            mtime,
            children: Some(children),
        }
    }

    pub fn leaf(name: &str, kind: NodeKind, size: u64, mtime: Option<String>) -> Self {
        Self {
            name: normalize(name),
            kind,
            size: Some(size),
            mtime,
            children: None,
        }
    }

    pub fn children(&self) -> &[TreeEntry] {
        self.children.as_deref().unwrap_or(&[])
    }
}

impl TreeEntry {
    pub fn failed(name: &str, message: impl Into<String>) -> Self {
        TreeEntry::Failed(FailedNode {
            name: normalize(name),
            message: message.into(),
        })
    }

    pub fn name(&self) -> &str {
        match self {
            TreeEntry::Node(node) => &node.name,
            TreeEntry::Failed(failed) => &failed.name,
        }
    }

    pub fn as_node(&self) -> Option<&ArchiveNode> {
        match self {
            TreeEntry::Node(node) => Some(node),
            TreeEntry::Failed(_) => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, TreeEntry::Failed(_))
    }
}

impl From<ArchiveNode> for TreeEntry {
    fn from(node: ArchiveNode) -> Self {
        TreeEntry::Node(node)
    }
}

const MTIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Local-time rendering of a Unix timestamp; `None` for 0 (unknown).
pub fn format_mtime(secs: u64) -> Option<String> {
    if secs == 0 {
        return None;
    }
    let secs = i64::try_from(secs).ok()?;
    Local
        .timestamp_opt(secs, 0)
        .single()
        .map(|t| t.format(MTIME_FORMAT).to_string())
}

pub fn format_system_time(time: SystemTime) -> Option<String> {
    if time == SystemTime::UNIX_EPOCH {
        return None;
    }
    Some(DateTime::<Local>::from(time).format(MTIME_FORMAT).to_string())
}
