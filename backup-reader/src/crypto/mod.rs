//! SecureTar-compatible AES-128-CBC decryption.
//!
//! The container layout is produced by an external tool and must be read
//! bit-for-bit as written:
//!
//! ```text
//! [magic 16][plaintext size u64 BE][reserved 8]?  IV seed 16  ciphertext...
//! ```
//!
//! The header is optional. Without it the plaintext size is inferred from the
//! PKCS7 pad-length byte in the last decrypted block.

pub mod kdf;
pub mod stream;

pub use kdf::{derive_iv, derive_key, Key};
pub use stream::DecryptingStream;

/// AES-128 key size in bytes
pub const KEY_SIZE: usize = 16;

/// AES block size in bytes
pub const BLOCK_SIZE: usize = 16;

/// Signature of the header-bearing container revision
pub const SECURETAR_MAGIC: [u8; 16] = *b"SecureTar\x02\x00\x00\x00\x00\x00\x00";

/// Bytes occupied by magic, size field and reserved padding
pub const HEADER_SIZE: u64 = 32;
