//! Nested sub-archives stored inside a backup.

use std::io::{BufRead, BufReader, Read};

use flate2::read::GzDecoder;
use tracing::debug;

use super::manifest::{self, MANIFEST_LIMIT};
use super::outer::OuterArchive;
use super::{collect_members, name_candidates, BoxedRead, MemberInfo, GZIP_MAGIC};
use crate::config::ReaderConfig;
use crate::crypto::DecryptingStream;
use crate::utils::{ReaderError, Result};

/// A nested tar opened for a single forward pass.
///
/// Owns the whole reader chain (file handle, member window, decryption,
/// decompression); dropping it releases all of them together.
pub struct NestedArchive {
    name: String,
    archive: tar::Archive<BoxedRead>,
}

impl NestedArchive {
    /// Open nested member `member_name` of `outer`.
    ///
    /// The backup's manifest decides whether the member is decrypted first,
    /// using the password registered for the directory holding `outer`.
    pub fn open(outer: &OuterArchive, member_name: &str, config: &ReaderConfig) -> Result<Self> {
        let member = outer.resolve(member_name)?;
        member.ensure_regular()?;

        let manifest = read_manifest(outer, config)?;
        let window = outer.open_member(member)?;

        let payload: BoxedRead = if manifest.protected {
            let password = config.passwords.for_archive(outer.path())?;
            let stream = DecryptingStream::new(password, window)?;
            debug!("Decrypting nested archive {} ({} bytes)", member.name, stream.size());
            Box::new(stream)
        } else {
            Box::new(window)
        };

        Ok(Self {
            name: member.name.clone(),
            archive: tar::Archive::new(decompress(payload)?),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Headers of every entry. Consumes the single forward pass.
    pub fn members(&mut self) -> Result<Vec<MemberInfo>> {
        collect_members(self.archive.entries()?)
    }

    /// Open nested member `member_name` and return the header and payload
    /// stream of `path` (as `./path` or `path`) inside it.
    ///
    /// When the name occurs more than once the last occurrence wins, as it
    /// would on extraction. Finding it takes a full pass, so the chain is
    /// opened a second time and advanced to that entry. The stream owns the
    /// whole reader chain.
    pub fn extract_member(
        outer: &OuterArchive,
        member_name: &str,
        config: &ReaderConfig,
        path: &str,
    ) -> Result<(MemberInfo, BoxedRead)> {
        let (index, info) = Self::open(outer, member_name, config)?.locate_last(path)?;
        info.ensure_regular()?;

        let reader = Self::open(outer, member_name, config)?.into_entry_reader(index, &info)?;
        Ok((info, reader))
    }

    /// Position and header of the last entry named `path`.
    fn locate_last(mut self, path: &str) -> Result<(usize, MemberInfo)> {
        let candidates = name_candidates(path);

        let mut found = None;
        for (index, entry) in self.archive.entries()?.enumerate() {
            let entry = entry.map_err(|e| ReaderError::Archive(format!("corrupt tar entry: {e}")))?;
            let info = MemberInfo::from_entry(&entry)?;
            if candidates.contains(&info.name) {
                found = Some((index, info));
            }
        }

        found.ok_or_else(|| ReaderError::NotFound(format!("{path} in {}", self.name)))
    }

    /// Advance to entry number `index` and hand out its payload.
    fn into_entry_reader(mut self, index: usize, expected: &MemberInfo) -> Result<BoxedRead> {
        let reached = {
            let mut entries = self.archive.entries()?;
            match entries.nth(index) {
                Some(entry) => {
                    let entry = entry
                        .map_err(|e| ReaderError::Archive(format!("corrupt tar entry: {e}")))?;
                    MemberInfo::from_entry(&entry)?
                }
                None => {
                    return Err(ReaderError::Archive(format!(
                        "{} ended before entry {index}",
                        self.name
                    )))
                }
            }
        };
        if reached.name != expected.name || reached.size != expected.size {
            return Err(ReaderError::Archive(format!(
                "{} changed while reading: expected {} at entry {index}, found {}",
                self.name, expected.name, reached.name
            )));
        }

        // The entry iterator stops right after the header, so the inner
        // reader sits at the first payload byte.
        Ok(Box::new(self.archive.into_inner().take(reached.size)))
    }
}

/// Read and check the backup's manifest.
pub fn read_manifest(outer: &OuterArchive, config: &ReaderConfig) -> Result<manifest::ManifestInfo> {
    let member = outer.resolve(&config.manifest_name)?;
    let bytes = outer.read_member(member, MANIFEST_LIMIT)?;
    manifest::inspect(&bytes)
}

/// Wrap `reader` in a gzip decoder when it starts with the gzip magic.
fn decompress(reader: BoxedRead) -> Result<BoxedRead> {
    let mut buffered = BufReader::new(reader);
    let head = buffered.fill_buf()?;
    if head.starts_with(&GZIP_MAGIC) {
        Ok(Box::new(GzDecoder::new(buffered)))
    } else {
        Ok(Box::new(buffered))
    }
}
