// SPDX-FileCopyrightText: 2026 Ambry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Thin wrapper over the external semantic code-search binary.
//!
//! The contract with callers: a missing binary, non-zero exit, or deadline
//! expiry surfaces as `BackendUnavailable`, never a crash. Every caller
//! treats unavailability as "skip this backend".

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tracing::debug;

use ambry_core::{time, AmbryError};
use ambry_git::{ops, GitRunner};

use crate::index_state::{self, IndexState};
use crate::models::{Corpus, IndexStatus, SearchResult};

/// Default deadline for a search invocation.
const SEARCH_TIMEOUT: Duration = Duration::from_secs(10);
/// Reindexing a large tree takes longer than a query.
const INDEX_TIMEOUT: Duration = Duration::from_secs(300);
/// Version probe deadline.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Client for the configured code-search binary.
pub struct CodeSearchClient {
    binary: String,
    project_root: PathBuf,
    data_dir: PathBuf,
    search_timeout: Duration,
}

impl CodeSearchClient {
    pub fn new(binary: impl Into<String>, project_root: &Path, data_dir: &Path) -> Self {
        Self {
            binary: binary.into(),
            project_root: project_root.to_path_buf(),
            data_dir: data_dir.to_path_buf(),
            search_timeout: SEARCH_TIMEOUT,
        }
    }

    pub fn with_search_timeout(mut self, timeout: Duration) -> Self {
        self.search_timeout = timeout;
        self
    }

    /// True when the binary exists and answers a version probe.
    pub async fn is_available(&self) -> bool {
        matches!(
            self.run(&["--version"], PROBE_TIMEOUT).await,
            Ok((0, _, _))
        )
    }

    /// Backend status including index staleness.
    pub async fn status(&self, git: &dyn GitRunner) -> IndexStatus {
        let available = self.is_available().await;
        let state = index_state::read_index_state(&self.data_dir);
        let stale = index_state::is_stale(git, &self.project_root, &state).await;
        IndexStatus {
            available,
            last_indexed_commit: state.last_indexed_commit,
            last_indexed_at: state.last_indexed_at,
            total_files: state.total_files,
            model: state.model,
            stale,
        }
    }

    /// Ranked code search. `BackendUnavailable` on any backend failure.
    pub async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchResult>, AmbryError> {
        let top = top_k.to_string();
        let args = [
            "search",
            "--format",
            "porcelain",
            "--top",
            top.as_str(),
            query,
        ];
        let (code, stdout, stderr) = self.run(&args, self.search_timeout).await?;
        if code != 0 {
            return Err(AmbryError::BackendUnavailable(format!(
                "{} search exited {code}: {}",
                self.binary,
                stderr.trim()
            )));
        }
        Ok(parse_porcelain(&stdout))
    }

    /// Trigger a reindex and record the resulting index state.
    pub async fn reindex(
        &self,
        git: &dyn GitRunner,
        full: bool,
    ) -> Result<IndexState, AmbryError> {
        let mode = if full { "full" } else { "incremental" };
        let args = ["index", "--mode", mode];
        let (code, stdout, stderr) = self.run(&args, INDEX_TIMEOUT).await?;
        if code != 0 {
            return Err(AmbryError::BackendUnavailable(format!(
                "{} index exited {code}: {}",
                self.binary,
                stderr.trim()
            )));
        }

        let mut state = parse_index_output(&stdout);
        state.last_indexed_commit = ops::current_head(git, &self.project_root).await.ok();
        state.last_indexed_at = Some(time::now_iso());
        index_state::write_index_state(&self.data_dir, &state)?;
        debug!(files = state.total_files, mode, "code index refreshed");
        Ok(state)
    }

    async fn run(
        &self,
        args: &[&str],
        deadline: Duration,
    ) -> Result<(i32, String, String), AmbryError> {
        let child = tokio::process::Command::new(&self.binary)
            .args(args)
            .current_dir(&self.project_root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(deadline, child).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AmbryError::BackendUnavailable(format!(
                    "code search binary not found: {}",
                    self.binary
                )));
            }
            Ok(Err(e)) => {
                return Err(AmbryError::BackendUnavailable(format!(
                    "failed to spawn {}: {e}",
                    self.binary
                )));
            }
            Err(_) => {
                return Err(AmbryError::BackendUnavailable(format!(
                    "{} timed out after {deadline:?}",
                    self.binary
                )));
            }
        };

        Ok((
            output.status.code().unwrap_or(-1),
            String::from_utf8_lossy(&output.stdout).into_owned(),
            String::from_utf8_lossy(&output.stderr).into_owned(),
        ))
    }
}

/// Parse porcelain search output.
///
/// Line format (tab-separated):
/// `rank score file_path chunk_index line_start line_end heading :: excerpt`
pub fn parse_porcelain(output: &str) -> Vec<SearchResult> {
    let mut results = Vec::new();
    for line in output.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let parts: Vec<&str> = line.splitn(7, '\t').collect();
        if parts.len() < 7 {
            continue;
        }
        let (rank_s, score_s, file_path, chunk_s, start_s, end_s, tail) = (
            parts[0], parts[1], parts[2], parts[3], parts[4], parts[5], parts[6],
        );
        let excerpt = match tail.split_once(" :: ") {
            Some((_heading, excerpt)) => excerpt,
            None => tail,
        };
        let heading = tail.split_once(" :: ").map(|(h, _)| h.to_string());

        let parsed = (
            rank_s.parse::<usize>(),
            score_s.parse::<f64>(),
            chunk_s.parse::<i64>(),
            start_s.parse::<i64>(),
            end_s.parse::<i64>(),
        );
        if let (Ok(rank), Ok(score), Ok(chunk), Ok(start), Ok(end)) = parsed {
            results.push(SearchResult {
                file_path: file_path.to_string(),
                score,
                rank,
                excerpt: excerpt.to_string(),
                corpus: Corpus::Code,
                heading,
                doc_type: None,
                chunk_index: Some(chunk),
                line_start: Some(start),
                line_end: Some(end),
            });
        }
    }
    results
}

/// Parse `index` output of the form `Key: value` per line.
fn parse_index_output(output: &str) -> IndexState {
    let mut state = IndexState::default();
    for line in output.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_lowercase().replace(' ', "_");
        let value = value.trim();
        match key.as_str() {
            "files" => {
                if let Ok(n) = value.parse() {
                    state.total_files = n;
                }
            }
            "model" => state.model = Some(value.to_string()),
            _ => {}
        }
    }
    state
}
