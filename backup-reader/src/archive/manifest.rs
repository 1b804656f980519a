//! Backup manifest inspection.
//!
//! Each backup carries a small JSON sidecar stating whether its nested
//! archives are encrypted. Only one revision and one cipher exist; anything
//! else is refused outright rather than guessed at.

use serde::Deserialize;

use crate::utils::{ReaderError, Result};

pub const SUPPORTED_VERSION: u64 = 2;
pub const SUPPORTED_CRYPTO: &str = "aes128";

/// Upper bound on manifest size read into memory
pub const MANIFEST_LIMIT: u64 = 1024 * 1024;

#[derive(Debug, Deserialize)]
struct RawManifest {
    /// Compared by numeric value, so `2` and `2.0` are the same revision
    version: serde_json::Value,
    protected: bool,
    #[serde(default)]
    crypto: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManifestInfo {
    /// Nested archives must be decrypted before they can be parsed
    pub protected: bool,
}

/// Parse a manifest and check it describes a supported container.
pub fn inspect(bytes: &[u8]) -> Result<ManifestInfo> {
    let raw: RawManifest = serde_json::from_slice(bytes)
        .map_err(|e| ReaderError::Archive(format!("malformed manifest: {e}")))?;

    if raw.version.as_f64() != Some(SUPPORTED_VERSION as f64) {
        return Err(ReaderError::Configuration(format!(
            "only manifest version {SUPPORTED_VERSION} is supported, found {}",
            raw.version
        )));
    }

    if raw.protected && raw.crypto.as_deref() != Some(SUPPORTED_CRYPTO) {
        return Err(ReaderError::Configuration(format!(
            "only {SUPPORTED_CRYPTO} encryption is supported, found {}",
            raw.crypto.as_deref().unwrap_or("none")
        )));
    }

    Ok(ManifestInfo {
        protected: raw.protected,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unprotected() {
        let info = inspect(br#"{"version": 2, "protected": false}"#).unwrap();
        assert!(!info.protected);
    }

    #[test]
    fn test_protected_aes128_with_extra_fields() {
        let info = inspect(
            br#"{"slug": "a1b2", "version": 2, "protected": true, "crypto": "aes128", "name": "Full"}"#,
        )
        .unwrap();
        assert!(info.protected);
    }

    #[test]
    fn test_unprotected_ignores_crypto() {
        let info = inspect(br#"{"version": 2, "protected": false, "crypto": "rot13"}"#).unwrap();
        assert!(!info.protected);
    }

    #[test]
    fn test_wrong_version_is_configuration_error() {
        let err = inspect(br#"{"version": 3, "protected": false}"#).unwrap_err();
        assert!(matches!(err, ReaderError::Configuration(_)));
    }

    #[test]
    fn test_float_version_is_accepted() {
        let info = inspect(br#"{"version": 2.0, "protected": true, "crypto": "aes128"}"#).unwrap();
        assert!(info.protected);
    }

    #[test]
    fn test_non_numeric_version_is_configuration_error() {
        for manifest in [
            &br#"{"version": "2", "protected": false}"#[..],
            br#"{"version": null, "protected": false}"#,
            br#"{"version": 2.5, "protected": false}"#,
        ] {
            let err = inspect(manifest).unwrap_err();
            assert!(matches!(err, ReaderError::Configuration(_)), "{err}");
        }
    }

    #[test]
    fn test_unknown_cipher_is_configuration_error() {
        let err = inspect(br#"{"version": 2, "protected": true, "crypto": "aes256"}"#).unwrap_err();
        assert!(matches!(err, ReaderError::Configuration(_)));

        let err = inspect(br#"{"version": 2, "protected": true}"#).unwrap_err();
        assert!(matches!(err, ReaderError::Configuration(_)));
    }

    #[test]
    fn test_malformed_json_is_archive_error() {
        assert!(matches!(inspect(b"{not json"), Err(ReaderError::Archive(_))));
        assert!(matches!(
            inspect(br#"{"protected": false}"#),
            Err(ReaderError::Archive(_))
        ));
    }
}
