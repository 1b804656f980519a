//! Indexed outer backup container.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use flate2::read::MultiGzDecoder;
use tracing::debug;

use super::gzip::GzFileReader;
use super::window::MemberWindow;
use super::{collect_members, name_candidates, MemberInfo, ReadSeek, GZIP_MAGIC};
use crate::utils::{ReaderError, Result};

/// Member index of one backup file.
///
/// Holds no open handles: every `open_member` call opens the file afresh, so
/// an index can be shared by concurrent readers.
#[derive(Debug)]
pub struct OuterArchive {
    path: PathBuf,
    compressed: bool,
    members: Vec<MemberInfo>,
    by_name: HashMap<String, usize>,
}

impl OuterArchive {
    /// Walk the tar headers of `path` and index every member.
    pub fn open(path: &Path) -> Result<Self> {
        let compressed = is_gzip_file(path)?;

        let indexed = if compressed {
            let decoder = MultiGzDecoder::new(BufReader::new(File::open(path)?));
            let mut archive = tar::Archive::new(decoder);
            collect_members(archive.entries()?)
        } else {
            let mut archive = tar::Archive::new(File::open(path)?);
            collect_members(archive.entries_with_seek()?)
        };
        let members = indexed.map_err(|e| match e {
            ReaderError::Archive(msg) => ReaderError::Archive(format!("{}: {msg}", path.display())),
            other => other,
        })?;

        // Later duplicates shadow earlier ones, as tar extraction would.
        let by_name = members
            .iter()
            .enumerate()
            .map(|(idx, member)| (member.name.clone(), idx))
            .collect();

        debug!(
            "Indexed {} ({} members, compressed: {})",
            path.display(),
            members.len(),
            compressed
        );

        Ok(Self {
            path: path.to_path_buf(),
            compressed,
            members,
            by_name,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    /// Every member in archive order.
    pub fn members(&self) -> &[MemberInfo] {
        &self.members
    }

    /// Exact-name lookup.
    pub fn get(&self, name: &str) -> Option<&MemberInfo> {
        self.by_name.get(name).map(|&idx| &self.members[idx])
    }

    /// Look `path` up as `./path`, then as `path`.
    pub fn resolve(&self, path: &str) -> Result<&MemberInfo> {
        name_candidates(path)
            .iter()
            .find_map(|candidate| self.get(candidate))
            .ok_or_else(|| {
                ReaderError::NotFound(format!("{} in {}", path, self.path.display()))
            })
    }

    /// Open a fresh, seekable stream over the payload of `member`.
    pub fn open_member(&self, member: &MemberInfo) -> Result<MemberWindow<Box<dyn ReadSeek + Send>>> {
        member.ensure_regular()?;
        let inner: Box<dyn ReadSeek + Send> = if self.compressed {
            Box::new(GzFileReader::open(&self.path)?)
        } else {
            Box::new(File::open(&self.path)?)
        };
        Ok(MemberWindow::new(inner, member.data_offset, member.size))
    }

    /// Read a small member completely, refusing anything over `limit` bytes.
    pub fn read_member(&self, member: &MemberInfo, limit: u64) -> Result<Vec<u8>> {
        if member.size > limit {
            return Err(ReaderError::Archive(format!(
                "{} is {} bytes, limit is {limit}",
                member.name, member.size
            )));
        }
        let mut data = Vec::with_capacity(member.size as usize);
        self.open_member(member)?.read_to_end(&mut data)?;
        Ok(data)
    }
}

/// Sniff the gzip magic rather than trusting the extension.
fn is_gzip_file(path: &Path) -> Result<bool> {
    let mut magic = [0u8; 2];
    let mut file = File::open(path)?;
    let mut filled = 0;
    while filled < magic.len() {
        match file.read(&mut magic[filled..])? {
            0 => return Ok(false),
            n => filled += n,
        }
    }
    Ok(magic == GZIP_MAGIC)
}
