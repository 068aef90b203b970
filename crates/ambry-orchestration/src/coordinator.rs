// SPDX-FileCopyrightText: 2026 Ambry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The spec coordinator: a pure state machine over SpecState.
//!
//! Transitions for one slug are strictly serialized behind a per-slug lock;
//! different slugs are independent. Worktree side effects run before the
//! state write, so a failed git operation leaves the phase unchanged. The
//! coordinator generates no prompts and never talks to a model backend.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Duration;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use ambry_config::OrchestrationConfig;
use ambry_core::{time, AmbryError};
use ambry_git::GitRunner;
use ambry_storage::{ActorType, EventType, MemoryEvent, MemoryStore};

use crate::review::{self, ReviewVerdict};
use crate::state::{self, SpecPhase, SpecState};
use crate::worktree::{SyncReport, WorktreeManager};

/// Advisory pre-orchestration classification. Pure: no state changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecComplexity {
    Simple,
    Complex,
}

const SECURITY_KEYWORDS: &[&str] = &[
    "auth",
    "authentication",
    "authorization",
    "security",
    "password",
    "token",
    "jwt",
    "oauth",
    "encrypt",
];
const DATA_KEYWORDS: &[&str] = &[
    "database",
    "migration",
    "schema",
    "sql",
    "orm",
    "table",
    "query",
];
const API_KEYWORDS: &[&str] = &["api", "endpoint", "route", "handler", "controller", "rest"];
const INTEGRATION_KEYWORDS: &[&str] = &[
    "integration",
    "external",
    "third-party",
    "webhook",
    "callback",
];
const INFRA_KEYWORDS: &[&str] = &["deploy", "docker", "kubernetes", "infrastructure", "pipeline"];

/// Classify a spec as simple or complex from its text and blast radius.
pub fn assess_complexity(spec_text: &str, affected_files: &[String]) -> SpecComplexity {
    let lower = spec_text.to_lowercase();
    let hits = |keywords: &[&str]| keywords.iter().any(|k| lower.contains(k));

    if affected_files.len() > 3 {
        return SpecComplexity::Complex;
    }
    if hits(SECURITY_KEYWORDS) || hits(DATA_KEYWORDS) || hits(INTEGRATION_KEYWORDS) || hits(INFRA_KEYWORDS)
    {
        return SpecComplexity::Complex;
    }
    if hits(API_KEYWORDS) && lower.len() > 200 {
        return SpecComplexity::Complex;
    }
    SpecComplexity::Simple
}

/// Outcome of resolving a verify iteration.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ResolveOutcome {
    /// All verdicts passed; the spec moved to learning.
    Learn { sync: SyncReport },
    /// Findings remain and the bound allows another iteration.
    FixLoop {
        iteration: u32,
        instructions: String,
    },
    /// The fix loop is exhausted; the spec aborted with reason `unfixed`.
    Aborted { reason: String },
}

pub struct SpecCoordinator {
    git_root: PathBuf,
    config: OrchestrationConfig,
    worktrees: WorktreeManager,
    memory: Option<Arc<MemoryStore>>,
    locks: DashMap<String, Arc<Mutex<()>>>,
    pending_verdicts: DashMap<String, Vec<ReviewVerdict>>,
}

impl SpecCoordinator {
    pub fn new(
        git: Arc<dyn GitRunner>,
        git_root: &Path,
        config: OrchestrationConfig,
        memory: Option<Arc<MemoryStore>>,
    ) -> Self {
        Self {
            git_root: git_root.to_path_buf(),
            config,
            worktrees: WorktreeManager::new(git, git_root),
            memory,
            locks: DashMap::new(),
            pending_verdicts: DashMap::new(),
        }
    }

    pub fn worktrees(&self) -> &WorktreeManager {
        &self.worktrees
    }

    fn lock_for(&self, slug: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(slug.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn load(&self, slug: &str) -> Result<SpecState, AmbryError> {
        state::read_spec_state(&self.git_root, slug)
            .ok_or_else(|| AmbryError::NotFound(format!("no spec state for '{slug}'")))
    }

    fn persist(&self, spec: &SpecState) -> Result<(), AmbryError> {
        state::write_spec_state(&self.git_root, spec)
    }

    /// Current state of a slug, if any.
    pub fn get_state(&self, slug: &str) -> Option<SpecState> {
        state::read_spec_state(&self.git_root, slug)
    }

    /// All persisted spec states.
    pub fn list_states(&self) -> Vec<SpecState> {
        state::list_spec_states(&self.git_root)
    }

    /// Create a spec in `planning`.
    pub async fn start(
        &self,
        slug: &str,
        plan_path: Option<&str>,
    ) -> Result<SpecState, AmbryError> {
        validate_slug(slug)?;
        let lock = self.lock_for(slug);
        let _guard = lock.lock().await;

        if let Some(existing) = self.get_state(slug) {
            if !existing.phase.is_terminal() {
                return Err(AmbryError::Conflict(format!(
                    "spec '{slug}' already active in {} phase",
                    existing.phase
                )));
            }
        }

        let fingerprint = state::plan_fingerprint(&self.git_root, slug, plan_path);
        let spec = SpecState::new(slug, fingerprint, plan_path.map(String::from));
        self.persist(&spec)?;
        info!(slug, "spec started");
        self.record_event(
            EventType::Event,
            format!("Spec started: {slug}"),
            0.5,
            &[("slug", slug)],
        )
        .await;
        Ok(spec)
    }

    /// Approve the plan: creates the worktree, then enters `implementing`.
    pub async fn approve_plan(
        &self,
        slug: &str,
        total_tasks: u32,
    ) -> Result<SpecState, AmbryError> {
        let lock = self.lock_for(slug);
        let _guard = lock.lock().await;

        let mut spec = self.load(slug)?;
        if spec.phase != SpecPhase::Planning {
            return Err(AmbryError::State(format!(
                "cannot approve plan: '{slug}' is in {} phase",
                spec.phase
            )));
        }
        if total_tasks == 0 {
            return Err(AmbryError::Validation(
                "approve_plan requires total_tasks > 0".into(),
            ));
        }

        // Worktree first: a failed create leaves the phase at planning.
        let created = self
            .worktrees
            .create(slug, spec.plan_path.as_deref())
            .await?;

        spec.transition(SpecPhase::Implementing)?;
        spec.total_tasks = total_tasks;
        spec.current_task = 1;
        spec.worktree_sha8 = Some(created.sha8.clone());
        self.persist(&spec)?;
        info!(slug, total_tasks, worktree = %created.path.display(), "plan approved");
        Ok(spec)
    }

    /// Mark a task as in progress.
    pub async fn start_task(&self, slug: &str, task_num: u32) -> Result<SpecState, AmbryError> {
        let lock = self.lock_for(slug);
        let _guard = lock.lock().await;

        let mut spec = self.load(slug)?;
        if spec.phase != SpecPhase::Implementing {
            return Err(AmbryError::State(format!(
                "cannot start task: '{slug}' is in {} phase",
                spec.phase
            )));
        }
        if task_num == 0 || task_num > spec.total_tasks {
            return Err(AmbryError::Validation(format!(
                "task {task_num} out of range 1..={}",
                spec.total_tasks
            )));
        }
        spec.current_task = task_num;
        spec.touch();
        self.persist(&spec)?;
        Ok(spec)
    }

    /// Mark a task complete; progress is monotonic and capped at total.
    pub async fn complete_task(&self, slug: &str, task_num: u32) -> Result<SpecState, AmbryError> {
        let lock = self.lock_for(slug);
        let _guard = lock.lock().await;

        let mut spec = self.load(slug)?;
        if spec.phase != SpecPhase::Implementing {
            return Err(AmbryError::State(format!(
                "cannot complete task: '{slug}' is in {} phase",
                spec.phase
            )));
        }
        spec.completed_tasks = (spec.completed_tasks + 1).min(spec.total_tasks);
        spec.current_task = (task_num + 1).min(spec.total_tasks);
        spec.touch();
        self.persist(&spec)?;
        Ok(spec)
    }

    /// Enter `verifying` once every task is complete.
    pub async fn start_verify(&self, slug: &str) -> Result<SpecState, AmbryError> {
        let lock = self.lock_for(slug);
        let _guard = lock.lock().await;

        let mut spec = self.load(slug)?;
        if spec.phase != SpecPhase::Implementing || spec.completed_tasks < spec.total_tasks {
            return Err(AmbryError::State(format!(
                "cannot start verify: '{slug}' is in {} phase with {}/{} tasks",
                spec.phase, spec.completed_tasks, spec.total_tasks
            )));
        }
        spec.transition(SpecPhase::Verifying)?;
        self.persist(&spec)?;
        self.pending_verdicts.remove(slug);
        Ok(spec)
    }

    /// Append one reviewer verdict to the current iteration set.
    pub async fn submit_verdict(
        &self,
        slug: &str,
        mut verdict: ReviewVerdict,
    ) -> Result<(), AmbryError> {
        let lock = self.lock_for(slug);
        let _guard = lock.lock().await;

        let spec = self.load(slug)?;
        if spec.phase != SpecPhase::Verifying {
            return Err(AmbryError::State(format!(
                "cannot submit verdict: '{slug}' is in {} phase",
                spec.phase
            )));
        }
        verdict.iteration = spec.review_iteration;
        self.pending_verdicts
            .entry(slug.to_string())
            .or_default()
            .push(verdict);
        Ok(())
    }

    /// Resolve the verify iteration once the caller has collected all
    /// expected verdicts. The core does not quorum-detect.
    pub async fn resolve_verify(&self, slug: &str) -> Result<ResolveOutcome, AmbryError> {
        let lock = self.lock_for(slug);
        let _guard = lock.lock().await;

        let mut spec = self.load(slug)?;
        if spec.phase != SpecPhase::Verifying {
            return Err(AmbryError::State(format!(
                "cannot resolve verify: '{slug}' is in {} phase",
                spec.phase
            )));
        }

        let verdicts = self
            .pending_verdicts
            .remove(slug)
            .map(|(_, v)| v)
            .unwrap_or_default();
        if verdicts.is_empty() {
            return Err(AmbryError::Validation(
                "resolve_verify called with no submitted verdicts".into(),
            ));
        }

        if review::aggregate(&verdicts) {
            let sync = self.enter_learning(&mut spec).await?;
            return Ok(ResolveOutcome::Learn { sync });
        }

        if spec.review_iteration < self.config.max_review_iterations {
            // Persist the intermediate fixing phase so the observed phase
            // sequence stays a path in the transition graph.
            spec.transition(SpecPhase::Fixing)?;
            self.persist(&spec)?;

            spec.review_iteration += 1;
            spec.transition(SpecPhase::Implementing)?;
            self.persist(&spec)?;

            info!(slug, iteration = spec.review_iteration, "entering fix loop");
            return Ok(ResolveOutcome::FixLoop {
                iteration: spec.review_iteration,
                instructions: review::build_fix_instructions(&verdicts),
            });
        }

        spec.abort_reason = Some("unfixed".into());
        spec.transition(SpecPhase::Aborted)?;
        self.persist(&spec)?;
        warn!(slug, "fix loop exhausted; spec aborted");
        // Worktree intentionally left behind for operator inspection.
        Ok(ResolveOutcome::Aborted {
            reason: "unfixed".into(),
        })
    }

    /// Enter `learning` explicitly (all verdicts PASS).
    pub async fn start_learn(&self, slug: &str) -> Result<SpecState, AmbryError> {
        let lock = self.lock_for(slug);
        let _guard = lock.lock().await;

        let mut spec = self.load(slug)?;
        if spec.phase != SpecPhase::Verifying {
            return Err(AmbryError::State(format!(
                "cannot start learn: '{slug}' is in {} phase",
                spec.phase
            )));
        }
        self.enter_learning(&mut spec).await?;
        Ok(spec)
    }

    async fn enter_learning(&self, spec: &mut SpecState) -> Result<SyncReport, AmbryError> {
        // Sync first: a failed squash merge leaves the phase at verifying.
        let sync = self.worktrees.sync(&spec.slug).await?;
        spec.transition(SpecPhase::Learning)?;
        self.persist(spec)?;
        Ok(sync)
    }

    /// Finish the spec: clean up the worktree and record a summary.
    pub async fn complete(&self, slug: &str) -> Result<SpecState, AmbryError> {
        let lock = self.lock_for(slug);
        let _guard = lock.lock().await;

        let mut spec = self.load(slug)?;
        if spec.phase != SpecPhase::Learning {
            return Err(AmbryError::State(format!(
                "cannot complete: '{slug}' is in {} phase",
                spec.phase
            )));
        }

        let cleanup = self
            .worktrees
            .cleanup(slug, spec.plan_path.as_deref())
            .await?;
        spec.transition(SpecPhase::Done)?;
        self.persist(&spec)?;

        info!(slug, removed = cleanup.removed, "spec complete");
        self.record_event(
            EventType::Decision,
            format!(
                "Spec completed: {slug} ({} tasks, {} review iteration(s))",
                spec.total_tasks, spec.review_iteration
            ),
            0.6,
            &[("slug", slug)],
        )
        .await;
        Ok(spec)
    }

    /// Abort from any non-terminal phase; the worktree is left behind.
    pub async fn abort(&self, slug: &str, reason: &str) -> Result<SpecState, AmbryError> {
        let lock = self.lock_for(slug);
        let _guard = lock.lock().await;

        let mut spec = self.load(slug)?;
        if spec.phase.is_terminal() {
            return Err(AmbryError::State(format!(
                "cannot abort: '{slug}' already in {} phase",
                spec.phase
            )));
        }
        spec.abort_reason = Some(reason.to_string());
        spec.transition(SpecPhase::Aborted)?;
        self.persist(&spec)?;
        self.pending_verdicts.remove(slug);
        warn!(slug, reason, "spec aborted");
        Ok(spec)
    }

    /// Stop-guard for session exit probes.
    ///
    /// Busy iff the phase is one of implementing/verifying/fixing AND the
    /// state was updated within the staleness horizon; stale busy states
    /// report not-busy so exits are never blocked indefinitely.
    pub fn is_busy(&self, slug: &str) -> bool {
        let Some(spec) = self.get_state(slug) else {
            return false;
        };
        if !spec.phase.is_busy() {
            return false;
        }
        match time::parse_iso(&spec.updated_at) {
            Some(updated) => {
                chrono::Utc::now() - updated < Duration::hours(self.config.stale_busy_hours)
            }
            None => false,
        }
    }

    async fn record_event(
        &self,
        event_type: EventType,
        text: String,
        importance: f64,
        refs: &[(&str, &str)],
    ) {
        let Some(memory) = &self.memory else {
            return;
        };
        let mut event = MemoryEvent::new(event_type, text)
            .with_actor(ActorType::System)
            .with_importance(importance)
            .with_tags(["orchestration"]);
        for (key, value) in refs {
            event = event.with_ref(*key, *value);
        }
        if let Err(e) = memory.save_event(&event).await {
            warn!(error = %e, "failed to record orchestration memory event");
        }
    }
}

fn validate_slug(slug: &str) -> Result<(), AmbryError> {
    let valid = !slug.is_empty()
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !slug.starts_with('-')
        && !slug.ends_with('-')
        && !slug.contains("--");
    if valid {
        Ok(())
    } else {
        Err(AmbryError::Validation(format!(
            "slug must be kebab-case: '{slug}'"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugs_must_be_kebab_case() {
        assert!(validate_slug("add-logging").is_ok());
        assert!(validate_slug("fix2").is_ok());
        assert!(validate_slug("").is_err());
        assert!(validate_slug("Add-Logging").is_err());
        assert!(validate_slug("double--dash").is_err());
        assert!(validate_slug("-leading").is_err());
        assert!(validate_slug("trailing-").is_err());
        assert!(validate_slug("under_score").is_err());
    }

    #[test]
    fn complexity_is_keyword_and_blast_radius_driven() {
        assert_eq!(
            assess_complexity("rename a helper function", &[]),
            SpecComplexity::Simple
        );
        assert_eq!(
            assess_complexity("add oauth token refresh", &[]),
            SpecComplexity::Complex
        );
        assert_eq!(
            assess_complexity("add a database migration for events", &[]),
            SpecComplexity::Complex
        );
        let many_files: Vec<String> = (0..5).map(|i| format!("src/f{i}.rs")).collect();
        assert_eq!(
            assess_complexity("tiny tweak", &many_files),
            SpecComplexity::Complex
        );
    }

    #[test]
    fn complexity_assessment_is_pure() {
        // Same inputs, same answer; nothing persisted anywhere.
        let a = assess_complexity("add an api endpoint", &[]);
        let b = assess_complexity("add an api endpoint", &[]);
        assert_eq!(a, b);
    }
}
