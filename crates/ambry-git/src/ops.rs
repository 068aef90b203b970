// SPDX-FileCopyrightText: 2026 Ambry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed wrappers over the git choke point.
//!
//! Non-zero exits become `AmbryError::Vcs` carrying stderr; callers that
//! tolerate failure (the learning analyzers) catch and skip per-file.

use std::path::Path;

use ambry_core::AmbryError;

use crate::{GitOutput, GitRunner};

/// One entry from `git log`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub sha: String,
    pub message: String,
}

fn vcs_err(context: &str, out: &GitOutput) -> AmbryError {
    let stderr = out.stderr.trim();
    if stderr.is_empty() {
        AmbryError::Vcs(format!("{context} failed with exit code {}", out.code))
    } else {
        AmbryError::Vcs(format!("{context} failed: {stderr}"))
    }
}

/// `git rev-parse HEAD`.
pub async fn current_head(git: &dyn GitRunner, root: &Path) -> Result<String, AmbryError> {
    let out = git.run(&["rev-parse", "HEAD"], root).await?;
    if !out.ok() {
        return Err(vcs_err("rev-parse HEAD", &out));
    }
    Ok(out.trimmed())
}

/// Names of files changed since `since` (or the last commit when absent).
pub async fn changed_files(
    git: &dyn GitRunner,
    root: &Path,
    since: Option<&str>,
) -> Result<Vec<String>, AmbryError> {
    diff_names(git, root, since, None).await
}

/// Names of files added since `since`.
pub async fn added_files(
    git: &dyn GitRunner,
    root: &Path,
    since: Option<&str>,
) -> Result<Vec<String>, AmbryError> {
    diff_names(git, root, since, Some("A")).await
}

/// Names of files modified since `since`.
pub async fn modified_files(
    git: &dyn GitRunner,
    root: &Path,
    since: Option<&str>,
) -> Result<Vec<String>, AmbryError> {
    diff_names(git, root, since, Some("M")).await
}

async fn diff_names(
    git: &dyn GitRunner,
    root: &Path,
    since: Option<&str>,
    filter: Option<&str>,
) -> Result<Vec<String>, AmbryError> {
    let mut args = vec!["diff", "--name-only"];
    let filter_arg;
    if let Some(f) = filter {
        filter_arg = format!("--diff-filter={f}");
        args.push(&filter_arg);
    }
    let range = since.unwrap_or("HEAD~1");
    args.push(range);

    let out = git.run(&args, root).await?;
    if !out.ok() {
        return Err(vcs_err("diff --name-only", &out));
    }
    Ok(out
        .stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect())
}

/// `git log` since a commit, newest first, bounded by `max`.
pub async fn log(
    git: &dyn GitRunner,
    root: &Path,
    since: Option<&str>,
    max: usize,
) -> Result<Vec<Commit>, AmbryError> {
    let limit = format!("-{max}");
    let mut args = vec!["log", limit.as_str(), "--pretty=format:%H|%s"];
    let range;
    if let Some(since) = since {
        range = format!("{since}..HEAD");
        args.push(&range);
    }

    let out = git.run(&args, root).await?;
    if !out.ok() {
        return Err(vcs_err("log", &out));
    }

    let mut commits = Vec::new();
    for line in out.stdout.lines() {
        if let Some((sha, message)) = line.split_once('|') {
            commits.push(Commit {
                sha: sha.to_string(),
                message: message.to_string(),
            });
        }
    }
    Ok(commits)
}

/// Count of commits since `since` (total history when absent).
///
/// This feeds the learning trigger: analysis fires once
/// `commit_count_since(last_analyzed_head)` reaches the configured batch.
pub async fn commit_count_since(
    git: &dyn GitRunner,
    root: &Path,
    since: Option<&str>,
) -> Result<usize, AmbryError> {
    let range;
    let mut args = vec!["rev-list", "--count"];
    match since {
        Some(since) => {
            range = format!("{since}..HEAD");
            args.push(&range);
        }
        None => args.push("HEAD"),
    }

    let out = git.run(&args, root).await?;
    if !out.ok() {
        return Err(vcs_err("rev-list --count", &out));
    }
    out.trimmed()
        .parse()
        .map_err(|_| AmbryError::Vcs(format!("unparseable rev-list output: {}", out.trimmed())))
}

/// Unified diff of a single commit against its parent.
pub async fn diff_hunks(
    git: &dyn GitRunner,
    root: &Path,
    sha: &str,
) -> Result<String, AmbryError> {
    let range = format!("{sha}~1..{sha}");
    let out = git.run(&["diff", &range], root).await?;
    if !out.ok() {
        return Err(vcs_err("diff", &out));
    }
    Ok(out.stdout)
}

/// Contents of a tracked file at HEAD, or None when git cannot show it.
pub async fn show_file_at_head(
    git: &dyn GitRunner,
    root: &Path,
    path: &str,
) -> Result<Option<String>, AmbryError> {
    let spec = format!("HEAD:{path}");
    let out = git.run(&["show", &spec], root).await?;
    if !out.ok() {
        return Ok(None);
    }
    Ok(Some(out.stdout))
}

/// Age in days of a commit, from its committer timestamp.
pub async fn commit_age_days(
    git: &dyn GitRunner,
    root: &Path,
    sha: &str,
) -> Result<f64, AmbryError> {
    let out = git
        .run(&["show", "-s", "--format=%ct", sha], root)
        .await?;
    if !out.ok() {
        return Err(vcs_err("show -s", &out));
    }
    let epoch: i64 = out
        .trimmed()
        .parse()
        .map_err(|_| AmbryError::Vcs(format!("unparseable commit time: {}", out.trimmed())))?;
    let now = unix_now();
    Ok(((now - epoch).max(0)) as f64 / 86_400.0)
}

fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
