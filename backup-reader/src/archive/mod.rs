//! Access to the two archive levels of a backup.
//!
//! The outer container is a tar file (optionally gzip-compressed) that is
//! indexed once so members can be opened by offset. Nested sub-archives are
//! gzip-compressed tars, optionally encrypted, and can only be streamed.

pub mod gzip;
pub mod manifest;
pub mod nested;
pub mod outer;
pub mod window;

use std::io::{Read, Seek};

use crate::utils::{ReaderError, Result};

pub use manifest::ManifestInfo;
pub use nested::NestedArchive;
pub use outer::OuterArchive;
pub use window::MemberWindow;

/// First two bytes of every gzip member
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Owned, sendable byte stream handed across component boundaries.
pub type BoxedRead = Box<dyn Read + Send>;

pub trait ReadSeek: Read + Seek {}

impl<T: Read + Seek> ReadSeek for T {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Dir,
    Regular,
    /// Links, devices and anything else that has no readable payload
    Other,
}

/// Header data of one tar member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberInfo {
    /// Raw member path with trailing `/` removed
    pub name: String,
    pub kind: MemberKind,
    pub size: u64,
    /// Seconds since the Unix epoch, 0 when unknown
    pub mtime: u64,
    /// Offset of the payload within the (decompressed) tar stream
    pub data_offset: u64,
}

impl MemberInfo {
    pub(crate) fn from_entry<R: Read>(entry: &tar::Entry<'_, R>) -> Result<Self> {
        let raw = entry.path()?.to_string_lossy().into_owned();
        let trimmed = raw.trim_end_matches('/');
        let name = if trimmed.is_empty() && !raw.is_empty() { "/" } else { trimmed };

        let entry_type = entry.header().entry_type();
        let kind = if entry_type.is_dir() {
            MemberKind::Dir
        } else if entry_type.is_file() {
            MemberKind::Regular
        } else {
            MemberKind::Other
        };

        Ok(Self {
            name: name.to_string(),
            kind,
            size: entry.size(),
            mtime: entry.header().mtime().unwrap_or(0),
            data_offset: entry.raw_file_position(),
        })
    }

    pub fn is_dir(&self) -> bool {
        self.kind == MemberKind::Dir
    }

    /// Archive's own `.` entry, skipped in listings
    pub fn is_root_marker(&self) -> bool {
        self.name == "."
    }

    pub(crate) fn ensure_regular(&self) -> Result<()> {
        match self.kind {
            MemberKind::Regular => Ok(()),
            _ => Err(ReaderError::Archive(format!(
                "{} is not a regular file",
                self.name
            ))),
        }
    }
}

/// Collect the headers of every entry, in archive order.
pub(crate) fn collect_members<R: Read>(entries: tar::Entries<'_, R>) -> Result<Vec<MemberInfo>> {
    let mut members = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ReaderError::Archive(format!("corrupt tar entry: {e}")))?;
        members.push(MemberInfo::from_entry(&entry)?);
    }
    Ok(members)
}

/// Both spellings a writer may have used for `path`: `./path` first, then `path`.
pub(crate) fn name_candidates(path: &str) -> [String; 2] {
    let bare = path.trim_start_matches("./");
    [format!("./{bare}"), bare.to_string()]
}
