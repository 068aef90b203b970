// SPDX-FileCopyrightText: 2026 Ambry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Git subprocess choke point for the ambry daemon.
//!
//! Every git invocation in the workspace flows through the [`GitRunner`]
//! trait so that tests can simulate any failure mode from a single mock
//! point. [`SystemGit`] is the production implementation; [`ScriptedGit`]
//! is the scripted fake shared by orchestration and learning tests.

pub mod ops;
pub mod script;

pub use ops::Commit;
pub use script::ScriptedGit;

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use ambry_core::AmbryError;

/// Default deadline for a single git invocation.
pub const DEFAULT_GIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Captured result of one git invocation.
#[derive(Debug, Clone)]
pub struct GitOutput {
    pub stdout: String,
    pub stderr: String,
    pub code: i32,
}

impl GitOutput {
    /// True when the subprocess exited zero.
    pub fn ok(&self) -> bool {
        self.code == 0
    }

    /// Trimmed stdout, the common case for single-value commands.
    pub fn trimmed(&self) -> String {
        self.stdout.trim().to_string()
    }
}

/// The single mock point for version control.
///
/// `run` never interprets exit codes; callers decide whether non-zero is an
/// error (most typed wrappers in [`ops`] translate it to `AmbryError::Vcs`).
#[async_trait]
pub trait GitRunner: Send + Sync {
    async fn run(&self, args: &[&str], cwd: &Path) -> Result<GitOutput, AmbryError>;
}

/// Production [`GitRunner`] that shells out to the `git` binary.
pub struct SystemGit {
    timeout: Duration,
}

impl SystemGit {
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_GIT_TIMEOUT,
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for SystemGit {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GitRunner for SystemGit {
    async fn run(&self, args: &[&str], cwd: &Path) -> Result<GitOutput, AmbryError> {
        debug!(args = ?args, cwd = %cwd.display(), "git");

        let child = tokio::process::Command::new("git")
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(self.timeout, child).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AmbryError::Vcs("git binary not found".to_string()));
            }
            Ok(Err(e)) => {
                return Err(AmbryError::Vcs(format!("failed to spawn git: {e}")));
            }
            // kill_on_drop reaps the child when the timeout future wins.
            Err(_) => {
                return Err(AmbryError::Timeout {
                    duration: self.timeout,
                });
            }
        };

        Ok(GitOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            code: output.status.code().unwrap_or(-1),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn system_git_reports_version() {
        let git = SystemGit::new();
        let dir = tempfile::tempdir().unwrap();
        let out = git.run(&["--version"], dir.path()).await.unwrap();
        assert!(out.ok());
        assert!(out.stdout.contains("git version"));
    }

    #[tokio::test]
    async fn system_git_nonzero_is_not_an_error_at_this_layer() {
        let git = SystemGit::new();
        let dir = tempfile::tempdir().unwrap();
        // Not a repository: git status exits non-zero but run() succeeds.
        let out = git.run(&["status", "--porcelain"], dir.path()).await.unwrap();
        assert!(!out.ok());
        assert!(!out.stderr.is_empty());
    }
}
