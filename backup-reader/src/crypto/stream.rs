//! Seekable decrypting view over a SecureTar container.
//!
//! CBC lets decryption resume at any block: the IV of block `b` is simply
//! ciphertext block `b - 1`, which is always at hand on a seekable source.
//! Only block 0 needs its IV derived from the stored seed.
//!
//! The legacy (header-less) container places its PKCS7 padding before the
//! last content block, which corrupts whatever trailer the plaintext carries
//! (the gzip CRC, typically). The size inferred from the pad-length byte is
//! still right, and readers that never pass `size()` never see the damage, so
//! the padding is read exactly as written and never "repaired".

use std::io::{self, Read, Seek, SeekFrom};

use aes::cipher::generic_array::GenericArray;
use cbc::cipher::{BlockDecryptMut, KeyIvInit};
use tracing::debug;

use super::kdf::{derive_iv, derive_key, Key};
use super::{BLOCK_SIZE, HEADER_SIZE, SECURETAR_MAGIC};
use crate::utils::{ReaderError, Result};

type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

const BLOCK: u64 = BLOCK_SIZE as u64;

pub struct DecryptingStream<R> {
    source: R,
    key: Key,
    /// Source offset of the block-0 IV seed
    start: u64,
    /// Total plaintext size
    size: u64,
    /// Source offset right after the last ciphertext byte consumed
    source_pos: u64,
    cipher: Option<Aes128CbcDec>,
    /// Decrypted bytes not yet handed out
    buf: Vec<u8>,
}

impl<R: Read + Seek> DecryptingStream<R> {
    /// Open a container starting at the source's current position.
    pub fn new(password: &str, mut source: R) -> Result<Self> {
        let key = derive_key(password.as_bytes());
        let origin = source.stream_position()?;

        let mut magic = [0u8; BLOCK_SIZE];
        source.read_exact(&mut magic).map_err(|e| {
            ReaderError::Archive(format!("encrypted container too short: {e}"))
        })?;

        let mut stream = if magic == SECURETAR_MAGIC {
            let mut size = [0u8; 8];
            source.read_exact(&mut size)?;
            let size = u64::from_be_bytes(size);
            debug!("SecureTar header found, plaintext size {}", size);
            Self::with_layout(source, key, origin + HEADER_SIZE, size)
        } else {
            let end = source.seek(SeekFrom::End(0))?;
            let padded = end.checked_sub(origin + BLOCK).ok_or_else(|| {
                ReaderError::Archive("encrypted container has no IV seed".to_string())
            })?;
            let mut stream = Self::with_layout(source, key, origin, padded);
            stream.seek_to(SeekFrom::End(-1))?;
            let mut pad = [0u8; 1];
            stream.read_into(&mut pad)?;
            stream.size = padded.checked_sub(u64::from(pad[0])).ok_or_else(|| {
                ReaderError::Archive(format!("padding length {} exceeds container", pad[0]))
            })?;
            debug!("Legacy container, size {} from {} padding bytes", stream.size, pad[0]);
            stream
        };

        stream.seek_to(SeekFrom::Start(0))?;
        Ok(stream)
    }

    fn with_layout(source: R, key: Key, start: u64, size: u64) -> Self {
        Self {
            source,
            key,
            start,
            size,
            source_pos: start,
            cipher: None,
            buf: Vec::new(),
        }
    }

    /// Plaintext size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Current logical offset into the plaintext.
    pub fn tell(&self) -> u64 {
        self.source_pos
            .saturating_sub(self.start + BLOCK)
            .saturating_sub(self.buf.len() as u64)
    }

    /// Read up to `n` bytes, never past `size()`.
    pub fn read_chunk(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut out = vec![0u8; n];
        let read = self.read_into(&mut out)?;
        out.truncate(read);
        Ok(out)
    }

    /// Move to an absolute, relative or end-anchored offset within `[0, size]`.
    pub fn seek_to(&mut self, pos: SeekFrom) -> Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => i128::from(offset),
            SeekFrom::Current(delta) => i128::from(self.tell()) + i128::from(delta),
            SeekFrom::End(delta) => i128::from(self.size) + i128::from(delta),
        };
        if target < 0 || target > i128::from(self.size) {
            return Err(ReaderError::Range(format!(
                "seek to {target} outside [0, {}]",
                self.size
            )));
        }

        let offset = target as u64;
        self.init(offset / BLOCK)?;
        let skip = (offset % BLOCK) as usize;
        if skip > 0 {
            let block = self.decrypt(1)?;
            self.buf = block[skip..].to_vec();
        }
        Ok(offset)
    }

    /// Release the stream and hand back the underlying source.
    pub fn into_inner(self) -> R {
        self.source
    }

    fn read_into(&mut self, out: &mut [u8]) -> Result<usize> {
        let remaining = self.size.saturating_sub(self.tell());
        let n = out.len().min(usize::try_from(remaining).unwrap_or(usize::MAX));

        let missing = n as i64 - self.buf.len() as i64;
        let blocks = (missing + BLOCK as i64 - 1).div_euclid(BLOCK as i64);
        if blocks < 0 {
            return Err(ReaderError::Range(format!(
                "negative block count {blocks} for read of {n} bytes"
            )));
        }
        if blocks > 0 {
            let plain = self.decrypt(blocks as usize)?;
            self.buf.extend_from_slice(&plain);
        }

        out[..n].copy_from_slice(&self.buf[..n]);
        self.buf.drain(..n);
        Ok(n)
    }

    /// Position the cipher so the next decrypted block is `block`.
    fn init(&mut self, block: u64) -> Result<()> {
        let iv_pos = self.start + block * BLOCK;
        self.source.seek(SeekFrom::Start(iv_pos))?;

        let mut iv = [0u8; BLOCK_SIZE];
        self.source.read_exact(&mut iv)?;
        if block == 0 {
            iv = derive_iv(&self.key, &iv);
        }

        self.cipher = Some(Aes128CbcDec::new(
            GenericArray::from_slice(&self.key),
            GenericArray::from_slice(&iv),
        ));
        self.source_pos = iv_pos + BLOCK;
        self.buf.clear();
        Ok(())
    }

    fn decrypt(&mut self, blocks: usize) -> Result<Vec<u8>> {
        let cipher = self
            .cipher
            .as_mut()
            .ok_or_else(|| ReaderError::Range("stream read before seek".to_string()))?;

        let mut data = vec![0u8; blocks * BLOCK_SIZE];
        let mut filled = 0;
        while filled < data.len() {
            match self.source.read(&mut data[filled..]) {
                Ok(0) => break,
                Ok(read) => filled += read,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        if filled != data.len() {
            return Err(ReaderError::Archive(format!(
                "truncated ciphertext: wanted {} bytes, got {filled}",
                data.len()
            )));
        }

        for chunk in data.chunks_exact_mut(BLOCK_SIZE) {
            cipher.decrypt_block_mut(GenericArray::from_mut_slice(chunk));
        }
        self.source_pos += filled as u64;
        Ok(data)
    }
}

impl<R: Read + Seek> Read for DecryptingStream<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        Ok(self.read_into(out)?)
    }
}

impl<R: Read + Seek> Seek for DecryptingStream<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        Ok(self.seek_to(pos)?)
    }

    fn stream_position(&mut self) -> io::Result<u64> {
        Ok(self.tell())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{encrypt_container, sample_bytes, ContainerForm, MISPLACED_PAD_LEN};
    use proptest::prelude::*;
    use std::io::Cursor;

    const PASSWORD: &str = "hunter2";

    /// Produced independently with a reference AES implementation:
    /// legacy layout, seed 00..0f, plaintext below.
    const KNOWN_CONTAINER: &str = "000102030405060708090a0b0c0d0e0f\
        4715e04b35286b8285b2dc494c67711e26f2a1ada4fd46d9351eddf93b44901e\
        524fb1d3bca64e10ffce941d32070e57";
    const KNOWN_PLAINTEXT: &[u8] = b"The quick brown fox jumps over the lazy dog";

    fn unhex(s: &str) -> Vec<u8> {
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
            .collect()
    }

    fn open(plain: &[u8], form: ContainerForm) -> DecryptingStream<Cursor<Vec<u8>>> {
        let container = encrypt_container(PASSWORD, plain, form);
        DecryptingStream::new(PASSWORD, Cursor::new(container)).unwrap()
    }

    #[test]
    fn test_known_legacy_container() {
        let mut stream =
            DecryptingStream::new(PASSWORD, Cursor::new(unhex(KNOWN_CONTAINER))).unwrap();
        assert_eq!(stream.size(), KNOWN_PLAINTEXT.len() as u64);

        let mut plain = Vec::new();
        stream.read_to_end(&mut plain).unwrap();
        assert_eq!(plain, KNOWN_PLAINTEXT);
    }

    #[test]
    fn test_header_form_uses_declared_size() {
        let plain = sample_bytes(100);
        let mut container = encrypt_container(PASSWORD, &plain, ContainerForm::Header);
        // Declare fewer bytes than were encrypted: the field is trusted verbatim.
        container[16..24].copy_from_slice(&60u64.to_be_bytes());

        let mut stream = DecryptingStream::new(PASSWORD, Cursor::new(container)).unwrap();
        assert_eq!(stream.size(), 60);
        let mut out = Vec::new();
        stream.read_to_end(&mut out).unwrap();
        assert_eq!(out, &plain[..60]);
    }

    #[test]
    fn test_legacy_form_infers_size_from_padding() {
        for len in [0usize, 1, 15, 16, 17, 31, 32, 100] {
            let plain = sample_bytes(len);
            let stream = open(&plain, ContainerForm::Legacy);
            assert_eq!(stream.size(), len as u64, "plaintext length {len}");
        }
    }

    #[test]
    fn test_misplaced_padding_keeps_inferred_size() {
        let plain = sample_bytes(90);
        let mut stream = open(&plain, ContainerForm::LegacyMisplacedPadding);
        assert_eq!(stream.size(), plain.len() as u64);

        let mut out = Vec::new();
        stream.read_to_end(&mut out).unwrap();
        assert_eq!(out.len(), plain.len());
        let body = plain.len() - MISPLACED_PAD_LEN;
        assert_eq!(out[..body], plain[..body]);
        assert_ne!(out[body..], plain[body..]);
    }

    #[test]
    fn test_container_at_nonzero_offset() {
        let plain = sample_bytes(70);
        let mut data = vec![0xAA; 40];
        data.extend(encrypt_container(PASSWORD, &plain, ContainerForm::Header));

        let mut cursor = Cursor::new(data);
        cursor.set_position(40);
        let mut stream = DecryptingStream::new(PASSWORD, cursor).unwrap();
        let mut out = Vec::new();
        stream.read_to_end(&mut out).unwrap();
        assert_eq!(out, plain);
    }

    #[test]
    fn test_read_in_small_pieces() {
        let plain = sample_bytes(83);
        let mut stream = open(&plain, ContainerForm::Header);

        let mut out = Vec::new();
        for step in [1usize, 5, 16, 3, 40, 100] {
            out.extend(stream.read_chunk(step).unwrap());
            assert_eq!(stream.tell(), out.len() as u64);
        }
        assert_eq!(out, plain);
    }

    #[test]
    fn test_seek_to_end_then_read_is_empty() {
        let plain = sample_bytes(50);
        let mut stream = open(&plain, ContainerForm::Legacy);

        assert_eq!(stream.seek_to(SeekFrom::End(0)).unwrap(), 50);
        assert!(stream.read_chunk(1).unwrap().is_empty());
        assert!(stream.read_chunk(64).unwrap().is_empty());
    }

    #[test]
    fn test_seek_out_of_bounds_is_range_error() {
        let plain = sample_bytes(50);
        let mut stream = open(&plain, ContainerForm::Header);

        assert!(matches!(
            stream.seek_to(SeekFrom::Start(51)),
            Err(ReaderError::Range(_))
        ));
        assert!(matches!(
            stream.seek_to(SeekFrom::Current(-1)),
            Err(ReaderError::Range(_))
        ));
        assert!(matches!(
            stream.seek_to(SeekFrom::End(1)),
            Err(ReaderError::Range(_))
        ));

        let err = Seek::seek(&mut stream, SeekFrom::End(-51)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_relative_seeks_track_position() {
        let plain = sample_bytes(200);
        let mut stream = open(&plain, ContainerForm::Legacy);

        stream.read_chunk(21).unwrap();
        assert_eq!(stream.seek_to(SeekFrom::Current(10)).unwrap(), 31);
        assert_eq!(stream.read_chunk(5).unwrap(), &plain[31..36]);
        assert_eq!(stream.seek_to(SeekFrom::Current(-20)).unwrap(), 16);
        assert_eq!(stream.read_chunk(4).unwrap(), &plain[16..20]);
        assert_eq!(stream.seek_to(SeekFrom::End(-7)).unwrap(), 193);
        assert_eq!(stream.read_chunk(100).unwrap(), &plain[193..]);
        assert_eq!(stream.tell(), 200);
    }

    #[test]
    fn test_wrong_password_yields_garbage_not_error() {
        let plain = sample_bytes(64);
        let container = encrypt_container(PASSWORD, &plain, ContainerForm::Header);

        let mut stream = DecryptingStream::new("not the password", Cursor::new(container)).unwrap();
        let mut out = Vec::new();
        stream.read_to_end(&mut out).unwrap();
        assert_eq!(out.len(), plain.len());
        assert_ne!(out, plain);
    }

    #[test]
    fn test_truncated_container_is_rejected() {
        let err = DecryptingStream::new(PASSWORD, Cursor::new(vec![1u8; 7]))
            .err()
            .unwrap();
        assert!(matches!(err, ReaderError::Archive(_)));
    }

    proptest! {
        #[test]
        fn prop_seek_read_matches_prefix_read(
            len in 1usize..300,
            legacy in any::<bool>(),
            a in any::<prop::sample::Index>(),
            b in any::<prop::sample::Index>(),
        ) {
            let plain = sample_bytes(len);
            let form = if legacy { ContainerForm::Legacy } else { ContainerForm::Header };
            let offset = a.index(len + 1);
            let count = b.index(len - offset + 1);

            let mut fresh = open(&plain, form);
            let prefix = fresh.read_chunk(offset + count).unwrap();

            let mut seeked = open(&plain, form);
            seeked.seek_to(SeekFrom::Start(offset as u64)).unwrap();
            prop_assert_eq!(seeked.tell(), offset as u64);
            let window = seeked.read_chunk(count).unwrap();

            prop_assert_eq!(&window[..], &prefix[offset..]);
            prop_assert_eq!(&window[..], &plain[offset..offset + count]);
            prop_assert_eq!(seeked.tell(), (offset + count) as u64);
        }
    }
}
