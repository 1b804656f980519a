//! Streaming extraction of a single member, one or two archive levels deep.

use std::fmt;
use std::io::{self, Read};
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::archive::{BoxedRead, NestedArchive, OuterArchive};
use crate::config::ReaderConfig;
use crate::utils::Result;

/// An extracted member: its size and a stream over its bytes.
///
/// The stream owns every handle it depends on (file, window, decryption,
/// decompression); dropping it releases them all.
pub struct Extracted {
    pub size: u64,
    reader: BoxedRead,
}

impl Extracted {
    pub fn new(size: u64, reader: BoxedRead) -> Self {
        Self { size, reader }
    }

    pub fn into_reader(self) -> BoxedRead {
        self.reader
    }
}

impl fmt::Debug for Extracted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extracted").field("size", &self.size).finish()
    }
}

impl Read for Extracted {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

#[derive(Clone)]
pub struct MemberExtractor {
    config: Arc<ReaderConfig>,
}

impl MemberExtractor {
    pub fn new(config: Arc<ReaderConfig>) -> Self {
        Self { config }
    }

    /// Extract `l1` from `outer`, or `l2` from the nested archive `l1`.
    ///
    /// Top-level members are returned raw; nested members go through the
    /// manifest check and optional decryption first. An empty `l2` counts as
    /// absent.
    pub fn extract(&self, outer: &OuterArchive, l1: &str, l2: Option<&str>) -> Result<Extracted> {
        match l2.filter(|path| !path.is_empty()) {
            None => {
                let member = outer.resolve(l1)?;
                let window = outer.open_member(member)?;
                debug!("Extracting {} from {} ({} bytes)", member.name, outer.path().display(), member.size);
                Ok(Extracted::new(member.size, Box::new(window)))
            }
            Some(l2) => {
                let (info, reader) = NestedArchive::extract_member(outer, l1, &self.config, l2)?;
                debug!(
                    "Extracting {} from nested {} in {} ({} bytes)",
                    info.name,
                    l1,
                    outer.path().display(),
                    info.size
                );
                Ok(Extracted::new(info.size, reader))
            }
        }
    }

    /// Index `archive` and extract from it.
    pub fn extract_path(&self, archive: &Path, l1: &str, l2: Option<&str>) -> Result<Extracted> {
        let outer = OuterArchive::open(archive)?;
        self.extract(&outer, l1, l2)
    }
}
