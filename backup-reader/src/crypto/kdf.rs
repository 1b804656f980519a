//! Key stretching: password → AES key, key + seed → block-0 IV.

use sha2::{Digest, Sha256};

use super::KEY_SIZE;

/// Number of chained SHA-256 rounds
const ROUNDS: usize = 100;

pub type Key = [u8; KEY_SIZE];

/// Hash `password` with SHA-256 100 times and keep the first 16 bytes.
pub fn derive_key(password: &[u8]) -> Key {
    let mut digest = Sha256::digest(password);
    for _ in 1..ROUNDS {
        digest = Sha256::digest(digest.as_slice());
    }

    let mut key = [0u8; KEY_SIZE];
    key.copy_from_slice(&digest[..KEY_SIZE]);
    key
}

/// Stretch `key ++ seed` the same way as a password to obtain the first IV.
pub fn derive_iv(key: &Key, seed: &[u8; KEY_SIZE]) -> [u8; KEY_SIZE] {
    let mut material = [0u8; KEY_SIZE * 2];
    material[..KEY_SIZE].copy_from_slice(key);
    material[KEY_SIZE..].copy_from_slice(seed);
    derive_key(&material)
}
