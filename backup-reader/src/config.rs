//! Configuration for the backup reader.
//!
//! Built once at start-up and shared read-only (behind an `Arc`) by every
//! component that needs passwords or the archive naming rules.

use crate::utils::paths::normalize_path;
use crate::utils::{ReaderError, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct ReaderConfig {
    /// Directory scanned for backup archives
    pub backup_dir: PathBuf,

    /// Decryption passwords per backup directory
    #[serde(default)]
    pub passwords: PasswordRegistry,

    /// Outer archive file extensions (matched case-insensitively)
    #[serde(default = "default_archive_extensions")]
    pub archive_extensions: Vec<String>,

    /// Suffix identifying nested sub-archives inside a backup
    #[serde(default = "default_nested_suffix")]
    pub nested_suffix: String,

    /// Manifest member name inside each backup
    #[serde(default = "default_manifest_name")]
    pub manifest_name: String,

    /// Number of indexing worker threads
    #[serde(default = "default_workers")]
    pub workers: usize,
}

/// Mapping from backup directory to the password its archives were encrypted with.
///
/// Keys are lexically normalised so `/backup/` and `/backup` resolve alike.
#[derive(Clone, Default, Deserialize)]
#[serde(from = "HashMap<String, String>")]
pub struct PasswordRegistry {
    entries: HashMap<String, String>,
}

impl From<HashMap<String, String>> for PasswordRegistry {
    fn from(raw: HashMap<String, String>) -> Self {
        raw.into_iter()
            .fold(Self::new(), |registry, (dir, password)| registry.with(dir, password))
    }
}

impl fmt::Debug for PasswordRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Directories only; passwords never reach the logs.
        f.debug_set().entries(self.entries.keys()).finish()
    }
}

impl PasswordRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `password` for `dir`, replacing any previous entry.
    pub fn with(mut self, dir: impl AsRef<Path>, password: impl Into<String>) -> Self {
        self.entries
            .insert(normalize_path(dir.as_ref()), password.into());
        self
    }

    pub fn get(&self, dir: &Path) -> Option<&str> {
        self.entries.get(&normalize_path(dir)).map(String::as_str)
    }

    /// Password for the directory that directly contains `archive`.
    pub fn for_archive(&self, archive: &Path) -> Result<&str> {
        let dir = archive.parent().unwrap_or_else(|| Path::new("."));
        let dir = if dir.as_os_str().is_empty() { Path::new(".") } else { dir };
        self.get(dir).ok_or_else(|| {
            ReaderError::Configuration(format!(
                "no password registered for directory {}",
                dir.display()
            ))
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// Default values
fn default_archive_extensions() -> Vec<String> {
    vec![".tar".to_string(), ".tar.gz".to_string(), ".tgz".to_string()]
}

fn default_nested_suffix() -> String {
    ".tar.gz".to_string()
}

fn default_manifest_name() -> String {
    "backup.json".to_string()
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl ReaderConfig {
    /// Single-directory configuration with default naming rules.
    pub fn new(backup_dir: impl Into<PathBuf>, password: impl Into<String>) -> Self {
        let mut config = Self::without_passwords(backup_dir);
        config.passwords = PasswordRegistry::new().with(&config.backup_dir, password);
        config
    }

    /// Configuration for a directory holding only unprotected backups.
    pub fn without_passwords(backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            backup_dir: backup_dir.into(),
            passwords: PasswordRegistry::new(),
            archive_extensions: default_archive_extensions(),
            nested_suffix: default_nested_suffix(),
            manifest_name: default_manifest_name(),
            workers: default_workers(),
        }
    }

    /// Register another directory's password.
    pub fn with_password(mut self, dir: impl AsRef<Path>, password: impl Into<String>) -> Self {
        self.passwords = self.passwords.with(dir, password);
        self
    }

    /// Is `dir` the backup directory or one with a registered password?
    pub fn is_backup_dir(&self, dir: &Path) -> bool {
        normalize_path(dir) == normalize_path(&self.backup_dir) || self.passwords.get(dir).is_some()
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: ReaderConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(ReaderError::Configuration(
                "workers must be at least 1".to_string(),
            ));
        }
        if self.archive_extensions.is_empty() {
            return Err(ReaderError::Configuration(
                "at least one archive extension is required".to_string(),
            ));
        }
        Ok(())
    }

    /// Does `file_name` carry one of the recognised outer archive extensions?
    pub fn is_archive_name(&self, file_name: &str) -> bool {
        let lower = file_name.to_lowercase();
        self.archive_extensions
            .iter()
            .any(|ext| lower.ends_with(&ext.to_lowercase()))
    }

    pub fn is_nested_archive_name(&self, member_name: &str) -> bool {
        member_name.ends_with(&self.nested_suffix)
    }
}
