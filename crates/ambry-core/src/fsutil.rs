// SPDX-FileCopyrightText: 2026 Ambry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Atomic file writes and content hashing.
//!
//! Every governance artifact and state file in ambry is written via
//! temp-file + rename so that readers never observe a partially written
//! file, even across a crash.

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::AmbryError;

/// Write bytes to `path` atomically, creating parent directories as needed.
///
/// The bytes land in a temp file in the same directory and are renamed into
/// place, so the destination is either the old content or the new content.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<(), AmbryError> {
    let parent = path
        .parent()
        .ok_or_else(|| AmbryError::Validation(format!("path has no parent: {}", path.display())))?;
    std::fs::create_dir_all(parent)?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.persist(path)
        .map_err(|e| AmbryError::Internal(format!("atomic rename failed: {e}")))?;
    Ok(())
}

/// Serialize `value` as pretty JSON and write it atomically.
pub fn atomic_write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), AmbryError> {
    let mut content = serde_json::to_string_pretty(value)?;
    content.push('\n');
    atomic_write(path, content.as_bytes())
}

/// Full sha-256 hex digest of a byte slice.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex_encode(&hasher.finalize())
}

/// First 16 hex chars of sha-256, used for fingerprints and dedup keys.
pub fn short_hash16(input: &str) -> String {
    sha256_hex(input.as_bytes())[..16].to_string()
}

/// First 8 hex chars of sha-256, used for worktree directory suffixes.
pub fn short_hash8(bytes: &[u8]) -> String {
    sha256_hex(bytes)[..8].to_string()
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn atomic_write_creates_parents_and_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/deep/state.json");
        atomic_write(&path, b"hello").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello");
    }

    #[test]
    fn atomic_write_replaces_existing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        atomic_write(&path, b"first").unwrap();
        atomic_write(&path, b"second").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
    }

    #[test]
    fn atomic_write_json_is_pretty_and_terminated() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("v.json");
        atomic_write_json(&path, &serde_json::json!({"a": 1})).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.ends_with('\n'));
        assert!(text.contains("\"a\": 1"));
    }

    #[test]
    fn sha256_is_stable() {
        // Known digest of the empty string.
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn short_hashes_are_prefixes() {
        let full = sha256_hex(b"plan contents");
        assert_eq!(short_hash8(b"plan contents"), full[..8]);
        assert_eq!(short_hash16("plan contents"), full[..16]);
    }
}
