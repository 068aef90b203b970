// SPDX-FileCopyrightText: 2026 Ambry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Git worktree lifecycle for spec-branch isolation.
//!
//! Worktrees live at `<git_root>/.worktrees/spec-<slug>-<sha8>/` on branch
//! `spec/<slug>`, where sha8 is derived from the plan-file contents. The
//! path is always derivable from (slug, fingerprint) and never stored.
//! All git traffic goes through the [`GitRunner`] choke point so a single
//! scripted fake covers every failure mode in tests.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};

use ambry_core::{fsutil, AmbryError};
use ambry_git::GitRunner;

/// Stash label used when a dirty checkout blocks a worktree operation.
const STASH_LABEL: &str = "ambry: pre-worktree stash";

/// Result of `detect`.
#[derive(Debug, Clone, Serialize)]
pub struct DetectInfo {
    pub present: bool,
    pub path: PathBuf,
    pub branch: Option<String>,
}

/// Result of `create`.
#[derive(Debug, Clone, Serialize)]
pub struct CreateInfo {
    pub path: PathBuf,
    pub branch: String,
    pub base_branch: String,
    pub sha8: String,
    pub stashed: bool,
    /// True when an identical worktree already existed.
    pub existed: bool,
}

/// Result of `sync`.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub merged: bool,
    pub commit: String,
    pub files_changed: u32,
    pub insertions: u32,
    pub deletions: u32,
    /// Set when a dirty base checkout was stashed before the merge.
    pub stashed: bool,
}

/// Result of `cleanup`.
#[derive(Debug, Clone, Serialize)]
pub struct CleanupReport {
    pub removed: bool,
    pub path: PathBuf,
    pub branch_deleted: bool,
}

/// Result of `status`.
#[derive(Debug, Clone, Serialize)]
pub struct WorktreeStatus {
    pub path: PathBuf,
    pub branch: String,
    pub present: bool,
    pub dirty: bool,
    pub ahead: u32,
    pub behind: u32,
}

pub struct WorktreeManager {
    git: Arc<dyn GitRunner>,
    git_root: PathBuf,
    base_branch: String,
}

impl WorktreeManager {
    pub fn new(git: Arc<dyn GitRunner>, git_root: &Path) -> Self {
        Self {
            git,
            git_root: git_root.to_path_buf(),
            base_branch: "main".to_string(),
        }
    }

    pub fn with_base_branch(mut self, base_branch: impl Into<String>) -> Self {
        self.base_branch = base_branch.into();
        self
    }

    /// sha8 over the plan file contents, or over the slug with no plan.
    pub fn sha8(&self, slug: &str, plan_path: Option<&str>) -> String {
        if let Some(plan_path) = plan_path {
            if let Ok(bytes) = std::fs::read(self.git_root.join(plan_path)) {
                return fsutil::short_hash8(&bytes);
            }
        }
        fsutil::short_hash8(slug.as_bytes())
    }

    /// Convention: `<git_root>/.worktrees/spec-<slug>-<sha8>/`.
    pub fn worktree_path(&self, slug: &str, sha8: &str) -> PathBuf {
        self.git_root
            .join(".worktrees")
            .join(format!("spec-{slug}-{sha8}"))
    }

    pub fn branch_name(&self, slug: &str) -> String {
        format!("spec/{slug}")
    }

    /// Whether the worktree exists on disk and git knows about it.
    pub async fn detect(
        &self,
        slug: &str,
        plan_path: Option<&str>,
    ) -> Result<DetectInfo, AmbryError> {
        let sha8 = self.sha8(slug, plan_path);
        let path = self.worktree_path(slug, &sha8);

        let out = self
            .git
            .run(&["worktree", "list", "--porcelain"], &self.git_root)
            .await?;
        if !out.ok() {
            return Err(AmbryError::Vcs(format!(
                "worktree list failed: {}",
                out.stderr.trim()
            )));
        }

        let target = path.display().to_string();
        let mut found_branch = None;
        let mut present = false;
        let mut current_path: Option<String> = None;
        for line in out.stdout.lines().chain(std::iter::once("")) {
            if let Some(rest) = line.strip_prefix("worktree ") {
                current_path = Some(rest.trim().to_string());
            } else if let Some(rest) = line.strip_prefix("branch ") {
                if current_path.as_deref() == Some(target.as_str()) {
                    found_branch = Some(rest.trim().to_string());
                }
            } else if line.is_empty() {
                if current_path.as_deref() == Some(target.as_str()) {
                    present = path.is_dir();
                }
                current_path = None;
            }
        }

        Ok(DetectInfo {
            present,
            path,
            branch: found_branch,
        })
    }

    /// Create the worktree for a spec.
    ///
    /// A dirty main checkout is stashed first with a labelled message.
    /// Idempotent: an existing worktree for the same (slug, fingerprint)
    /// is returned without error.
    pub async fn create(
        &self,
        slug: &str,
        plan_path: Option<&str>,
    ) -> Result<CreateInfo, AmbryError> {
        let sha8 = self.sha8(slug, plan_path);
        let path = self.worktree_path(slug, &sha8);
        let branch = self.branch_name(slug);

        let existing = self.detect(slug, plan_path).await?;
        if existing.present {
            debug!(slug, path = %path.display(), "worktree already present");
            return Ok(CreateInfo {
                path,
                branch,
                base_branch: self.base_branch.clone(),
                sha8,
                stashed: false,
                existed: true,
            });
        }

        let stashed = self.stash_if_dirty().await?;

        let path_str = path.display().to_string();
        let out = self
            .git
            .run(
                &["worktree", "add", "-b", &branch, &path_str, &self.base_branch],
                &self.git_root,
            )
            .await?;
        if !out.ok() {
            return Err(AmbryError::Vcs(format!(
                "worktree add failed: {}",
                out.stderr.trim()
            )));
        }

        // Subagents in the worktree see the same governance tooling.
        let claude_dir = self.git_root.join(".claude");
        if claude_dir.is_dir() {
            copy_dir(&claude_dir, &path.join(".claude"))?;
        }
        let mcp_config = self.git_root.join(".mcp.json");
        if mcp_config.is_file() {
            std::fs::copy(&mcp_config, path.join(".mcp.json"))?;
        }

        info!(slug, path = %path.display(), branch, "worktree created");
        Ok(CreateInfo {
            path,
            branch,
            base_branch: self.base_branch.clone(),
            sha8,
            stashed,
            existed: false,
        })
    }

    /// Unified diff of the spec branch against its merge-base with the base
    /// branch. Missing merge-base (unborn branch) reads as an empty diff.
    pub async fn diff(&self, slug: &str) -> Result<String, AmbryError> {
        let branch = self.branch_name(slug);
        let merge_base = self
            .git
            .run(&["merge-base", &self.base_branch, &branch], &self.git_root)
            .await?;
        if !merge_base.ok() {
            return Ok(String::new());
        }
        let base = merge_base.trimmed();

        let out = self
            .git
            .run(&["diff", &format!("{base}..{branch}")], &self.git_root)
            .await?;
        if !out.ok() {
            return Err(AmbryError::Vcs(format!(
                "diff failed: {}",
                out.stderr.trim()
            )));
        }
        Ok(out.stdout)
    }

    /// Squash-merge the spec branch onto the base checkout without
    /// committing. A dirty base checkout is stashed first and reported.
    pub async fn sync(&self, slug: &str) -> Result<SyncReport, AmbryError> {
        let branch = self.branch_name(slug);
        let stashed = self.stash_if_dirty().await?;

        let out = self
            .git
            .run(&["merge", "--squash", "--stat", &branch], &self.git_root)
            .await?;
        if !out.ok() {
            return Err(AmbryError::Vcs(format!(
                "squash merge failed: {}",
                out.stderr.trim()
            )));
        }

        let (files_changed, insertions, deletions) = parse_merge_stat(&out.stdout);
        let head = self
            .git
            .run(&["rev-parse", "HEAD"], &self.git_root)
            .await?;

        info!(slug, files_changed, insertions, deletions, "worktree synced");
        Ok(SyncReport {
            merged: true,
            commit: head.trimmed(),
            files_changed,
            insertions,
            deletions,
            stashed,
        })
    }

    /// Remove the worktree and delete its branch.
    ///
    /// Directory removal failures retry once with direct filesystem
    /// removal; deleting an already-deleted branch is tolerated.
    pub async fn cleanup(
        &self,
        slug: &str,
        plan_path: Option<&str>,
    ) -> Result<CleanupReport, AmbryError> {
        let sha8 = self.sha8(slug, plan_path);
        let path = self.worktree_path(slug, &sha8);
        let branch = self.branch_name(slug);
        let path_str = path.display().to_string();

        let remove = self
            .git
            .run(&["worktree", "remove", "--force", &path_str], &self.git_root)
            .await?;
        let mut removed = remove.ok();
        if !removed {
            warn!(slug, stderr = remove.stderr.trim(), "worktree remove failed, retrying with fs removal");
            match std::fs::remove_dir_all(&path) {
                Ok(()) => {
                    // Let git forget the now-missing directory.
                    let _ = self
                        .git
                        .run(&["worktree", "prune"], &self.git_root)
                        .await;
                    removed = true;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => removed = true,
                Err(e) => {
                    warn!(slug, error = %e, "filesystem removal failed");
                }
            }
        }

        let delete = self
            .git
            .run(&["branch", "-D", &branch], &self.git_root)
            .await?;
        let branch_deleted = delete.ok();
        if !branch_deleted {
            debug!(slug, stderr = delete.stderr.trim(), "branch delete tolerated");
        }

        Ok(CleanupReport {
            removed,
            path,
            branch_deleted,
        })
    }

    /// Worktree status: presence, dirtiness, and ahead/behind counts.
    pub async fn status(
        &self,
        slug: &str,
        plan_path: Option<&str>,
    ) -> Result<WorktreeStatus, AmbryError> {
        let info = self.detect(slug, plan_path).await?;
        let branch = self.branch_name(slug);

        if !info.present {
            return Ok(WorktreeStatus {
                path: info.path,
                branch,
                present: false,
                dirty: false,
                ahead: 0,
                behind: 0,
            });
        }

        let status = self
            .git
            .run(&["status", "--porcelain"], &info.path)
            .await?;
        let dirty = !status.trimmed().is_empty();

        let ahead = self
            .rev_count(&format!("{}..{branch}", self.base_branch))
            .await;
        let behind = self
            .rev_count(&format!("{branch}..{}", self.base_branch))
            .await;

        Ok(WorktreeStatus {
            path: info.path,
            branch,
            present: true,
            dirty,
            ahead,
            behind,
        })
    }

    async fn rev_count(&self, range: &str) -> u32 {
        match self
            .git
            .run(&["rev-list", "--count", range], &self.git_root)
            .await
        {
            Ok(out) if out.ok() => out.trimmed().parse().unwrap_or(0),
            _ => 0,
        }
    }

    /// Stash the main checkout if dirty; returns whether a stash was made.
    async fn stash_if_dirty(&self) -> Result<bool, AmbryError> {
        let status = self
            .git
            .run(&["status", "--porcelain"], &self.git_root)
            .await?;
        if status.trimmed().is_empty() {
            return Ok(false);
        }
        let out = self
            .git
            .run(&["stash", "push", "-m", STASH_LABEL], &self.git_root)
            .await?;
        if !out.ok() {
            return Err(AmbryError::Vcs(format!(
                "stash failed: {}",
                out.stderr.trim()
            )));
        }
        info!("dirty checkout stashed before worktree operation");
        Ok(true)
    }
}

fn merge_stat_res() -> &'static (Regex, Regex, Regex) {
    static RE: OnceLock<(Regex, Regex, Regex)> = OnceLock::new();
    RE.get_or_init(|| {
        (
            Regex::new(r"(\d+) files? changed").unwrap(),
            Regex::new(r"(\d+) insertions?\(\+\)").unwrap(),
            Regex::new(r"(\d+) deletions?\(-\)").unwrap(),
        )
    })
}

fn parse_merge_stat(output: &str) -> (u32, u32, u32) {
    let (files_re, ins_re, del_re) = merge_stat_res();
    let grab = |re: &Regex| {
        re.captures(output)
            .and_then(|caps| caps[1].parse().ok())
            .unwrap_or(0)
    };
    (grab(files_re), grab(ins_re), grab(del_re))
}

fn copy_dir(src: &Path, dst: &Path) -> Result<(), AmbryError> {
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ambry_git::ScriptedGit;
    use tempfile::tempdir;

    fn manager(git: Arc<ScriptedGit>, root: &Path) -> WorktreeManager {
        WorktreeManager::new(git, root)
    }

    fn porcelain_for(path: &Path, branch: &str) -> String {
        format!(
            "worktree {}\nHEAD abc\nbranch {branch}\n\n",
            path.display()
        )
    }

    #[tokio::test]
    async fn path_is_derivable_and_stable_for_identical_plan() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("plan.md"), "step 1\nstep 2\n").unwrap();
        let m = manager(Arc::new(ScriptedGit::new()), dir.path());

        let a = m.sha8("add-logging", Some("plan.md"));
        let b = m.sha8("add-logging", Some("plan.md"));
        assert_eq!(a, b);
        assert_eq!(a.len(), 8);
        let path = m.worktree_path("add-logging", &a);
        assert!(path
            .display()
            .to_string()
            .ends_with(&format!(".worktrees/spec-add-logging-{a}")));
    }

    #[tokio::test]
    async fn create_runs_worktree_add_and_copies_tooling() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".claude/rules")).unwrap();
        std::fs::write(dir.path().join(".claude/rules/r.md"), "rule\n").unwrap();
        std::fs::write(dir.path().join(".mcp.json"), "{}\n").unwrap();

        let git = Arc::new(ScriptedGit::new());
        git.ok(&["worktree", "list"], "");
        git.ok(&["status", "--porcelain"], "");
        git.ok(&["worktree", "add"], "");

        let m = manager(git.clone(), dir.path());
        let info = m.create("demo", None).await.unwrap();
        assert!(!info.existed);
        assert!(!info.stashed);
        assert_eq!(info.branch, "spec/demo");

        assert!(git.saw(&["worktree", "add", "-b", "spec/demo"]));
        assert!(info.path.join(".claude/rules/r.md").exists());
        assert!(info.path.join(".mcp.json").exists());
    }

    #[tokio::test]
    async fn create_stashes_dirty_checkout_first() {
        let dir = tempdir().unwrap();
        let git = Arc::new(ScriptedGit::new());
        git.ok(&["worktree", "list"], "");
        git.ok(&["status", "--porcelain"], " M src/main.rs\n");
        git.ok(&["stash", "push"], "Saved working directory");
        git.ok(&["worktree", "add"], "");

        let m = manager(git.clone(), dir.path());
        let info = m.create("demo", None).await.unwrap();
        assert!(info.stashed);
        assert!(git.saw(&["stash", "push", "-m", STASH_LABEL]));
    }

    #[tokio::test]
    async fn second_create_with_identical_plan_returns_existing() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("plan.md"), "the plan\n").unwrap();

        let git = Arc::new(ScriptedGit::new());
        let m = manager(git.clone(), dir.path());
        let sha8 = m.sha8("demo", Some("plan.md"));
        let path = m.worktree_path("demo", &sha8);
        std::fs::create_dir_all(&path).unwrap();
        git.ok(&["worktree", "list"], &porcelain_for(&path, "refs/heads/spec/demo"));

        let info = m.create("demo", Some("plan.md")).await.unwrap();
        assert!(info.existed);
        assert_eq!(info.path, path);
        assert!(!git.saw(&["worktree", "add"]), "no second add");
    }

    #[tokio::test]
    async fn create_propagates_worktree_add_failure() {
        let dir = tempdir().unwrap();
        let git = Arc::new(ScriptedGit::new());
        git.ok(&["worktree", "list"], "");
        git.ok(&["status", "--porcelain"], "");
        git.fail(&["worktree", "add"], "fatal: branch exists");

        let m = manager(git, dir.path());
        let err = m.create("demo", None).await.unwrap_err();
        assert!(matches!(err, AmbryError::Vcs(_)));
    }

    #[tokio::test]
    async fn detect_reports_absent_before_create() {
        let dir = tempdir().unwrap();
        let git = Arc::new(ScriptedGit::new());
        git.ok(&["worktree", "list"], "worktree /elsewhere\nbranch refs/heads/main\n\n");

        let m = manager(git, dir.path());
        let info = m.detect("demo", None).await.unwrap();
        assert!(!info.present);
    }

    #[tokio::test]
    async fn sync_parses_stat_summary() {
        let dir = tempdir().unwrap();
        let git = Arc::new(ScriptedGit::new());
        git.ok(&["status", "--porcelain"], "");
        git.ok(
            &["merge", "--squash", "--stat"],
            " 3 files changed, 40 insertions(+), 7 deletions(-)\nSquash commit -- not updating HEAD\n",
        );
        git.ok(&["rev-parse", "HEAD"], "headsha\n");

        let m = manager(git, dir.path());
        let report = m.sync("demo").await.unwrap();
        assert!(report.merged);
        assert_eq!(report.files_changed, 3);
        assert_eq!(report.insertions, 40);
        assert_eq!(report.deletions, 7);
        assert_eq!(report.commit, "headsha");
        assert!(!report.stashed);
    }

    #[tokio::test]
    async fn sync_stashes_dirty_base_and_reports_it() {
        let dir = tempdir().unwrap();
        let git = Arc::new(ScriptedGit::new());
        git.ok(&["status", "--porcelain"], " M Cargo.toml\n");
        git.ok(&["stash", "push"], "Saved");
        git.ok(&["merge", "--squash", "--stat"], " 1 file changed, 1 insertion(+)\n");
        git.ok(&["rev-parse", "HEAD"], "sha\n");

        let m = manager(git, dir.path());
        let report = m.sync("demo").await.unwrap();
        assert!(report.stashed);
        assert_eq!(report.files_changed, 1);
        assert_eq!(report.insertions, 1);
        assert_eq!(report.deletions, 0);
    }

    #[tokio::test]
    async fn sync_failure_is_vcs_error() {
        let dir = tempdir().unwrap();
        let git = Arc::new(ScriptedGit::new());
        git.ok(&["status", "--porcelain"], "");
        git.fail(&["merge", "--squash"], "CONFLICT (content)");

        let m = manager(git, dir.path());
        let err = m.sync("demo").await.unwrap_err();
        assert!(err.to_string().contains("CONFLICT"));
    }

    #[tokio::test]
    async fn cleanup_tolerates_missing_branch() {
        let dir = tempdir().unwrap();
        let git = Arc::new(ScriptedGit::new());
        git.ok(&["worktree", "remove"], "");
        git.fail(&["branch", "-D"], "error: branch 'spec/demo' not found");

        let m = manager(git, dir.path());
        let report = m.cleanup("demo", None).await.unwrap();
        assert!(report.removed);
        assert!(!report.branch_deleted);
    }

    #[tokio::test]
    async fn cleanup_retries_with_fs_removal() {
        let dir = tempdir().unwrap();
        let git = Arc::new(ScriptedGit::new());
        git.fail(&["worktree", "remove"], "fatal: working tree is locked");
        git.ok(&["worktree", "prune"], "");
        git.ok(&["branch", "-D"], "");

        let m = manager(git.clone(), dir.path());
        // Materialize the directory so the fs fallback has work to do.
        let sha8 = m.sha8("demo", None);
        let path = m.worktree_path("demo", &sha8);
        std::fs::create_dir_all(&path).unwrap();
        std::fs::write(path.join("file"), "x").unwrap();

        let report = m.cleanup("demo", None).await.unwrap();
        assert!(report.removed);
        assert!(!path.exists());
        assert!(git.saw(&["worktree", "prune"]));
    }

    #[tokio::test]
    async fn status_reports_ahead_behind_and_dirty() {
        let dir = tempdir().unwrap();
        let git = Arc::new(ScriptedGit::new());
        let m = manager(git.clone(), dir.path());
        let sha8 = m.sha8("demo", None);
        let path = m.worktree_path("demo", &sha8);
        std::fs::create_dir_all(&path).unwrap();

        git.ok(&["worktree", "list"], &porcelain_for(&path, "refs/heads/spec/demo"));
        git.ok(&["status", "--porcelain"], "?? junk.txt\n");
        git.ok(&["rev-list", "--count", "main..spec/demo"], "4\n");
        git.ok(&["rev-list", "--count", "spec/demo..main"], "1\n");

        let status = m.status("demo", None).await.unwrap();
        assert!(status.present);
        assert!(status.dirty);
        assert_eq!(status.ahead, 4);
        assert_eq!(status.behind, 1);
    }

    #[test]
    fn merge_stat_handles_singulars() {
        assert_eq!(parse_merge_stat(" 1 file changed, 1 insertion(+), 1 deletion(-)"), (1, 1, 1));
        assert_eq!(parse_merge_stat("nothing to squash"), (0, 0, 0));
    }
}
