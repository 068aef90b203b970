// SPDX-FileCopyrightText: 2026 Ambry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted [`GitRunner`] fake for tests.
//!
//! Rules are matched by argument prefix in registration order; later rules
//! for the same prefix override earlier ones, so a test can re-script a
//! command mid-scenario. Unmatched invocations succeed with empty output,
//! which keeps happy-path scenarios terse.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;

use ambry_core::AmbryError;

use crate::{GitOutput, GitRunner};

struct Rule {
    prefix: Vec<String>,
    output: Result<GitOutput, String>,
}

/// In-memory git fake. The single mock point for all git failure modes.
#[derive(Default)]
pub struct ScriptedGit {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl ScriptedGit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a successful invocation for commands starting with `prefix`.
    pub fn ok(&self, prefix: &[&str], stdout: &str) {
        self.push(
            prefix,
            Ok(GitOutput {
                stdout: stdout.to_string(),
                stderr: String::new(),
                code: 0,
            }),
        );
    }

    /// Script a non-zero exit with the given stderr.
    pub fn fail(&self, prefix: &[&str], stderr: &str) {
        self.push(
            prefix,
            Ok(GitOutput {
                stdout: String::new(),
                stderr: stderr.to_string(),
                code: 128,
            }),
        );
    }

    /// Script a transport-level failure (binary missing, spawn error).
    pub fn error(&self, prefix: &[&str], message: &str) {
        self.push(prefix, Err(message.to_string()));
    }

    /// All invocations recorded so far, as argument vectors.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    /// True when some recorded invocation starts with `prefix`.
    pub fn saw(&self, prefix: &[&str]) -> bool {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .any(|call| starts_with(call, prefix))
    }

    fn push(&self, prefix: &[&str], output: Result<GitOutput, String>) {
        self.rules.lock().unwrap().push(Rule {
            prefix: prefix.iter().map(|s| s.to_string()).collect(),
            output,
        });
    }
}

fn starts_with(args: &[String], prefix: &[&str]) -> bool {
    prefix.len() <= args.len() && prefix.iter().zip(args).all(|(p, a)| p == a)
}

#[async_trait]
impl GitRunner for ScriptedGit {
    async fn run(&self, args: &[&str], _cwd: &Path) -> Result<GitOutput, AmbryError> {
        let call: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        self.calls.lock().unwrap().push(call.clone());

        let rules = self.rules.lock().unwrap();
        // Last matching rule wins so tests can re-script mid-scenario.
        for rule in rules.iter().rev() {
            let prefix: Vec<&str> = rule.prefix.iter().map(String::as_str).collect();
            if starts_with(&call, &prefix) {
                return match &rule.output {
                    Ok(out) => Ok(out.clone()),
                    Err(msg) => Err(AmbryError::Vcs(msg.clone())),
                };
            }
        }

        Ok(GitOutput {
            stdout: String::new(),
            stderr: String::new(),
            code: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn later_rules_override_earlier() {
        let git = ScriptedGit::new();
        git.ok(&["status"], "first");
        git.ok(&["status"], "second");
        let out = git.run(&["status", "--porcelain"], Path::new("/")).await.unwrap();
        assert_eq!(out.stdout, "second");
    }

    #[tokio::test]
    async fn unmatched_commands_succeed_empty() {
        let git = ScriptedGit::new();
        let out = git.run(&["branch", "-D", "x"], Path::new("/")).await.unwrap();
        assert!(out.ok());
        assert!(out.stdout.is_empty());
    }

    #[tokio::test]
    async fn records_every_call() {
        let git = ScriptedGit::new();
        git.run(&["rev-parse", "HEAD"], Path::new("/")).await.unwrap();
        git.run(&["status"], Path::new("/")).await.unwrap();
        assert_eq!(git.calls().len(), 2);
        assert!(git.saw(&["rev-parse"]));
        assert!(!git.saw(&["merge"]));
    }

    #[tokio::test]
    async fn scripted_error_surfaces_as_vcs() {
        let git = ScriptedGit::new();
        git.error(&["worktree", "add"], "git binary not found");
        let err = git
            .run(&["worktree", "add", "/x"], Path::new("/"))
            .await
            .unwrap_err();
        assert!(matches!(err, AmbryError::Vcs(_)));
    }
}
