//! Seekable reader over a gzip-compressed file.
//!
//! Gzip has no index, so seeking forward decompresses and discards, and
//! seeking backward restarts from the beginning of the file. Only absolute
//! and relative seeks are supported; the decompressed length is unknown.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use flate2::read::MultiGzDecoder;
use tracing::trace;

pub struct GzFileReader {
    path: PathBuf,
    decoder: MultiGzDecoder<BufReader<File>>,
    pos: u64,
}

impl GzFileReader {
    pub fn open(path: &Path) -> io::Result<Self> {
        Ok(Self {
            path: path.to_path_buf(),
            decoder: Self::decoder(path)?,
            pos: 0,
        })
    }

    fn decoder(path: &Path) -> io::Result<MultiGzDecoder<BufReader<File>>> {
        Ok(MultiGzDecoder::new(BufReader::new(File::open(path)?)))
    }

    fn rewind_to_start(&mut self) -> io::Result<()> {
        trace!("Restarting gzip decoder for {} (was at {})", self.path.display(), self.pos);
        self.decoder = Self::decoder(&self.path)?;
        self.pos = 0;
        Ok(())
    }
}

impl Read for GzFileReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read = self.decoder.read(buf)?;
        self.pos += read as u64;
        Ok(read)
    }
}

impl Seek for GzFileReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => offset,
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta).ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidInput, "seek before start of stream")
            })?,
            SeekFrom::End(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::Unsupported,
                    "gzip stream length is unknown",
                ))
            }
        };

        if target < self.pos {
            self.rewind_to_start()?;
        }
        let skip = target - self.pos;
        let skipped = io::copy(&mut (&mut self.decoder).take(skip), &mut io::sink())?;
        self.pos += skipped;
        Ok(self.pos)
    }

    fn stream_position(&mut self) -> io::Result<u64> {
        Ok(self.pos)
    }
}
