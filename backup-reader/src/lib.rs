//! Backup Reader Library
//!
//! Read-only access to SecureTar backups: seekable AES-128-CBC decryption,
//! a parallel indexer for nested tar archives, member extraction and a
//! cached listing tree.

pub mod archive;
pub mod cache;
pub mod config;
pub mod crypto;
pub mod extract;
pub mod service;
pub mod tree;
pub mod utils;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use config::{PasswordRegistry, ReaderConfig};
pub use extract::Extracted;
pub use service::BackupService;
pub use tree::{ArchiveNode, TreeEntry};
pub use utils::errors::ReaderError;
pub use utils::Result;
