//! Fixture builders: tar, gzip and SecureTar containers written the way the
//! producing tool writes them.

use std::io::Write;
use std::path::{Path, PathBuf};

use aes::cipher::generic_array::GenericArray;
use cbc::cipher::{BlockEncryptMut, KeyIvInit};
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::crypto::{derive_iv, derive_key, BLOCK_SIZE, SECURETAR_MAGIC};

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;

/// Fixed mtime for fixture entries: 2023-11-14 22:13:20 UTC
pub const FIXTURE_MTIME: u64 = 1_700_000_000;

pub enum Entry {
    Dir(String),
    File(String, Vec<u8>),
}

pub fn dir(name: &str) -> Entry {
    Entry::Dir(name.to_string())
}

pub fn file(name: &str, data: &[u8]) -> Entry {
    Entry::File(name.to_string(), data.to_vec())
}

/// Deterministic, non-repeating-looking payload.
pub fn sample_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 + i / 7) as u8).collect()
}

/// Build a ustar archive, keeping names byte-for-byte (including `./`).
pub fn tar_of(entries: &[Entry]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for entry in entries {
        let (name, data, entry_type, mode) = match entry {
            Entry::Dir(name) => (name, &[][..], tar::EntryType::Directory, 0o755),
            Entry::File(name, data) => (name, &data[..], tar::EntryType::Regular, 0o644),
        };

        let mut header = tar::Header::new_ustar();
        let raw = name.as_bytes();
        assert!(raw.len() <= 100, "fixture names must fit the ustar name field");
        header.as_old_mut().name[..raw.len()].copy_from_slice(raw);
        header.set_entry_type(entry_type);
        header.set_size(data.len() as u64);
        header.set_mode(mode);
        header.set_mtime(FIXTURE_MTIME);
        header.set_cksum();
        builder.append(&header, data).unwrap();
    }
    builder.into_inner().unwrap()
}

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

pub fn manifest_json(protected: bool) -> Vec<u8> {
    if protected {
        br#"{"slug": "fixture", "version": 2, "protected": true, "crypto": "aes128"}"#.to_vec()
    } else {
        br#"{"slug": "fixture", "version": 2, "protected": false, "crypto": null}"#.to_vec()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerForm {
    /// Magic, size and reserved bytes before the IV seed
    Header,
    /// IV seed first, size recovered from padding
    Legacy,
    /// Legacy layout from the faulty encoder: pad bytes land over the end of
    /// the content, clobbering a gzip trailer, while the final pad-length
    /// byte still closes the container
    LegacyMisplacedPadding,
}

/// Bytes of content overwritten by misplaced padding (gzip CRC32 and ISIZE).
pub const MISPLACED_PAD_LEN: usize = 8;

/// Encrypt `plain` into a SecureTar container with PKCS7 padding.
pub fn encrypt_container(password: &str, plain: &[u8], form: ContainerForm) -> Vec<u8> {
    let key = derive_key(password.as_bytes());
    let seed: [u8; BLOCK_SIZE] = std::array::from_fn(|i| (i as u8).wrapping_mul(7).wrapping_add(3));
    let iv = derive_iv(&key, &seed);

    let pad = BLOCK_SIZE - plain.len() % BLOCK_SIZE;
    let mut data = plain.to_vec();
    if form == ContainerForm::LegacyMisplacedPadding {
        let start = data.len().saturating_sub(MISPLACED_PAD_LEN);
        data[start..].fill(pad as u8);
    }
    data.extend(std::iter::repeat(pad as u8).take(pad));

    let mut cipher = Aes128CbcEnc::new(GenericArray::from_slice(&key), GenericArray::from_slice(&iv));
    for chunk in data.chunks_exact_mut(BLOCK_SIZE) {
        cipher.encrypt_block_mut(GenericArray::from_mut_slice(chunk));
    }

    let mut out = Vec::new();
    if form == ContainerForm::Header {
        out.extend_from_slice(&SECURETAR_MAGIC);
        out.extend_from_slice(&(plain.len() as u64).to_be_bytes());
        out.extend_from_slice(&[0u8; 8]);
    }
    out.extend_from_slice(&seed);
    out.extend(data);
    out
}

/// Nested sub-archive bytes: tar → gzip → optional encryption.
pub fn nested_archive(password: Option<&str>, entries: &[Entry]) -> Vec<u8> {
    let compressed = gzip(&tar_of(entries));
    match password {
        Some(password) => encrypt_container(password, &compressed, ContainerForm::Header),
        None => compressed,
    }
}

/// Encrypted nested sub-archive whose gzip trailer was overwritten by
/// misplaced padding.
pub fn misplaced_padding_archive(password: &str, entries: &[Entry]) -> Vec<u8> {
    encrypt_container(password, &gzip(&tar_of(entries)), ContainerForm::LegacyMisplacedPadding)
}

pub fn write_file(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, data).unwrap();
    path
}
