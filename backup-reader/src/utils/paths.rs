//! Lexical path normalisation for member names and directory keys.

use std::path::Path;

/// Collapse `.`/`..` components, repeated and trailing separators.
///
/// Purely lexical: the file system is never consulted. An empty result is `"."`.
pub fn normalize(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();

    for component in path.split('/') {
        match component {
            "" | "." => {}
            ".." => match parts.last() {
                Some(&last) if last != ".." => {
                    parts.pop();
                }
                // `/..` stays at the root
                _ if absolute => {}
                _ => parts.push(".."),
            },
            other => parts.push(other),
        }
    }

    let joined = parts.join("/");
    match (absolute, joined.is_empty()) {
        (true, _) => format!("/{joined}"),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}

/// Normalise a file-system path the same way as member names.
pub fn normalize_path(path: &Path) -> String {
    normalize(&path.to_string_lossy())
}

/// Final component of a `/`-separated member path.
pub fn basename(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}
