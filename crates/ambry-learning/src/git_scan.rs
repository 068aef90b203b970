// SPDX-FileCopyrightText: 2026 Ambry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Git-facing half of the learning analyzer.
//!
//! Collects the change window (added/modified files, commit count, newest
//! commit age) through the git choke point. Individual git failures
//! degrade to empty lists with a log line; the pipeline never aborts on a
//! single bad invocation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use ambry_core::AmbryError;
use ambry_git::{ops, GitRunner};

use crate::syntactic::MAX_ANALYZED_BYTES;

/// The window of changes one analysis run looks at.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub commit_count: usize,
    /// Age in days of the newest commit in the window.
    pub newest_commit_age_days: f64,
    pub head: Option<String>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty()
    }
}

pub struct GitAnalyzer {
    git: Arc<dyn GitRunner>,
    root: PathBuf,
}

impl GitAnalyzer {
    pub fn new(git: Arc<dyn GitRunner>, root: &Path) -> Self {
        Self {
            git,
            root: root.to_path_buf(),
        }
    }

    /// Commits accumulated since the given head (the analysis trigger).
    pub async fn commits_since(&self, since: Option<&str>) -> Result<usize, AmbryError> {
        ops::commit_count_since(self.git.as_ref(), &self.root, since).await
    }

    /// Gather the change window since a commit (HEAD~1 when absent).
    pub async fn collect(&self, since: Option<&str>) -> ChangeSet {
        let added = ops::added_files(self.git.as_ref(), &self.root, since)
            .await
            .unwrap_or_else(|e| {
                debug!(error = %e, "added-files scan failed");
                vec![]
            });
        let modified = ops::modified_files(self.git.as_ref(), &self.root, since)
            .await
            .unwrap_or_else(|e| {
                debug!(error = %e, "modified-files scan failed");
                vec![]
            });
        let commit_count = ops::commit_count_since(self.git.as_ref(), &self.root, since)
            .await
            .unwrap_or(0);
        let head = ops::current_head(self.git.as_ref(), &self.root).await.ok();
        let newest_commit_age_days = match &head {
            Some(head) => ops::commit_age_days(self.git.as_ref(), &self.root, head)
                .await
                .unwrap_or(0.0),
            None => 0.0,
        };

        ChangeSet {
            added,
            modified,
            commit_count,
            newest_commit_age_days,
            head,
        }
    }

    /// Load a changed file's contents for shape extraction.
    ///
    /// Prefers the working tree, falls back to the HEAD blob. Binary or
    /// oversized files are skipped with a logged observation.
    pub async fn load_source(&self, rel_path: &str) -> Option<String> {
        let full = self.root.join(rel_path);
        if let Ok(meta) = std::fs::metadata(&full) {
            if meta.len() as usize > MAX_ANALYZED_BYTES {
                debug!(path = rel_path, bytes = meta.len(), "skipping oversized file");
                return None;
            }
        }
        match std::fs::read(&full) {
            Ok(bytes) => match String::from_utf8(bytes) {
                Ok(text) => Some(text),
                Err(_) => {
                    debug!(path = rel_path, "skipping non-utf8 file");
                    None
                }
            },
            Err(_) => ops::show_file_at_head(self.git.as_ref(), &self.root, rel_path)
                .await
                .ok()
                .flatten()
                .filter(|text| text.len() <= MAX_ANALYZED_BYTES),
        }
    }
}
