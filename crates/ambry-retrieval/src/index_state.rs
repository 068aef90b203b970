// SPDX-FileCopyrightText: 2026 Ambry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Code-index state file and staleness detection.
//!
//! The external code-search binary does not expose what commit it indexed,
//! so ambry records it in `index-state.json` after every reindex and derives
//! staleness by diffing the working tree against that commit.

use std::path::Path;

use serde::{Deserialize, Serialize};

use ambry_core::{fsutil, AmbryError};
use ambry_git::{ops, GitRunner};

pub const INDEX_STATE_FILENAME: &str = "index-state.json";

/// Persisted snapshot of the last successful reindex.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexState {
    #[serde(default)]
    pub last_indexed_commit: Option<String>,
    #[serde(default)]
    pub last_indexed_at: Option<String>,
    #[serde(default)]
    pub total_files: i64,
    #[serde(default)]
    pub model: Option<String>,
}

/// Read the state file; missing or corrupt files yield the default.
pub fn read_index_state(data_dir: &Path) -> IndexState {
    let path = data_dir.join(INDEX_STATE_FILENAME);
    std::fs::read_to_string(&path)
        .ok()
        .and_then(|text| serde_json::from_str(&text).ok())
        .unwrap_or_default()
}

/// Persist the state file atomically.
pub fn write_index_state(data_dir: &Path, state: &IndexState) -> Result<(), AmbryError> {
    fsutil::atomic_write_json(&data_dir.join(INDEX_STATE_FILENAME), state)
}

/// True when any tracked file differs from the last indexed commit.
///
/// No recorded commit, or any git failure, reads as stale.
pub async fn is_stale(
    git: &dyn GitRunner,
    project_root: &Path,
    state: &IndexState,
) -> bool {
    let Some(commit) = &state.last_indexed_commit else {
        return true;
    };
    match ops::changed_files(git, project_root, Some(commit)).await {
        Ok(files) => !files.is_empty(),
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ambry_git::ScriptedGit;
    use tempfile::tempdir;

    #[test]
    fn missing_state_file_yields_default() {
        let dir = tempdir().unwrap();
        let state = read_index_state(dir.path());
        assert!(state.last_indexed_commit.is_none());
        assert_eq!(state.total_files, 0);
    }

    #[test]
    fn corrupt_state_file_yields_default() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(INDEX_STATE_FILENAME), "{nope").unwrap();
        let state = read_index_state(dir.path());
        assert!(state.last_indexed_commit.is_none());
    }

    #[test]
    fn state_round_trips() {
        let dir = tempdir().unwrap();
        let state = IndexState {
            last_indexed_commit: Some("abc123".into()),
            last_indexed_at: Some("2026-01-01T00:00:00.000Z".into()),
            total_files: 42,
            model: Some("e5-small".into()),
        };
        write_index_state(dir.path(), &state).unwrap();
        let back = read_index_state(dir.path());
        assert_eq!(back.last_indexed_commit.as_deref(), Some("abc123"));
        assert_eq!(back.total_files, 42);
    }

    #[tokio::test]
    async fn no_recorded_commit_is_stale() {
        let git = ScriptedGit::new();
        assert!(is_stale(&git, Path::new("/repo"), &IndexState::default()).await);
    }

    #[tokio::test]
    async fn clean_diff_is_fresh() {
        let git = ScriptedGit::new();
        git.ok(&["diff", "--name-only"], "");
        let state = IndexState {
            last_indexed_commit: Some("abc".into()),
            ..Default::default()
        };
        assert!(!is_stale(&git, Path::new("/repo"), &state).await);
    }

    #[tokio::test]
    async fn any_tracked_diff_is_stale() {
        let git = ScriptedGit::new();
        git.ok(&["diff", "--name-only"], "src/main.rs\n");
        let state = IndexState {
            last_indexed_commit: Some("abc".into()),
            ..Default::default()
        };
        assert!(is_stale(&git, Path::new("/repo"), &state).await);
    }
}
