//! Bounded, seekable view over one member's payload.

use std::io::{self, Read, Seek, SeekFrom};

/// Exposes `[offset, offset + len)` of `inner` as a stream of its own.
///
/// Positions are relative to the window. Seeking past the end is allowed and
/// reads there return 0, like a file.
pub struct MemberWindow<R> {
    inner: R,
    offset: u64,
    len: u64,
    pos: u64,
    synced: bool,
}

impl<R: Read + Seek> MemberWindow<R> {
    pub fn new(inner: R, offset: u64, len: u64) -> Self {
        Self {
            inner,
            offset,
            len,
            pos: 0,
            synced: false,
        }
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<R: Read + Seek> Read for MemberWindow<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos >= self.len || buf.is_empty() {
            return Ok(0);
        }
        if !self.synced {
            self.inner.seek(SeekFrom::Start(self.offset + self.pos))?;
            self.synced = true;
        }

        let remaining = self.len - self.pos;
        let want = buf.len().min(usize::try_from(remaining).unwrap_or(usize::MAX));
        let read = self.inner.read(&mut buf[..want])?;
        self.pos += read as u64;
        Ok(read)
    }
}

impl<R: Read + Seek> Seek for MemberWindow<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => i128::from(offset),
            SeekFrom::Current(delta) => i128::from(self.pos) + i128::from(delta),
            SeekFrom::End(delta) => i128::from(self.len) + i128::from(delta),
        };
        let target = u64::try_from(target).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek before start of member")
        })?;

        if target != self.pos {
            self.pos = target;
            self.synced = false;
        }
        Ok(self.pos)
    }

    fn stream_position(&mut self) -> io::Result<u64> {
        Ok(self.pos)
    }
}
