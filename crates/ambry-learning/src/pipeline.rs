// SPDX-FileCopyrightText: 2026 Ambry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! LearningPipeline facade: analyze → heuristics → proposals → decisions.
//!
//! Per-file analyzer errors are swallowed with a log line and the file is
//! skipped; a single unreadable blob never aborts an analysis run. Decide
//! calls are serialized per proposal and idempotent on decided proposals.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::Duration;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use ambry_config::LearningConfig;
use ambry_core::{time, AmbryError};
use ambry_git::GitRunner;
use ambry_storage::{ActorType, EventType, MemoryEvent, MemoryStore};

use crate::analytics;
use crate::artifacts;
use crate::database::LearningDatabase;
use crate::git_scan::GitAnalyzer;
use crate::heuristics;
use crate::models::{
    CandidateStatus, Decision, FailureCategory, HeuristicId, Proposal, ProposalStatus,
    ProposalType,
};
use crate::proposals;
use crate::syntactic::{self, SourceShapes};

/// Result of one analysis run.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct AnalysisOutcome {
    pub detections: usize,
    pub candidates: usize,
    pub proposals: usize,
    pub analyzed_commits: usize,
    pub analysis_time_ms: u128,
    /// Set when the run was skipped (disabled, warm-up, below trigger).
    pub skipped: Option<String>,
}

/// Result of one decide call.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DecisionOutcome {
    pub proposal_id: String,
    pub decision: Decision,
    pub artifact_path: Option<String>,
    /// True when the proposal was already decided and no side effects ran.
    pub prior: bool,
}

pub struct LearningPipeline {
    config: LearningConfig,
    db: Arc<LearningDatabase>,
    git: Arc<dyn GitRunner>,
    project_root: PathBuf,
    memory: Option<Arc<MemoryStore>>,
    decide_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl LearningPipeline {
    pub fn new(
        config: LearningConfig,
        db: Arc<LearningDatabase>,
        git: Arc<dyn GitRunner>,
        project_root: &Path,
        memory: Option<Arc<MemoryStore>>,
    ) -> Self {
        Self {
            config,
            db,
            git,
            project_root: project_root.to_path_buf(),
            memory,
            decide_locks: DashMap::new(),
        }
    }

    pub fn database(&self) -> &LearningDatabase {
        &self.db
    }

    pub fn config(&self) -> &LearningConfig {
        &self.config
    }

    /// Run the full analysis pipeline over commits since `since_commit`
    /// (falling back to the last analyzed head).
    ///
    /// `force` bypasses the enable flag, warm-up, and commit trigger; the
    /// commit-observer hook calls without it, the HTTP analyze endpoint
    /// passes it through.
    pub async fn analyze(
        &self,
        since_commit: Option<&str>,
        session_id: Option<&str>,
        force: bool,
    ) -> Result<AnalysisOutcome, AmbryError> {
        if !self.config.global_enabled && !force {
            return Ok(skipped("learning disabled"));
        }

        if !force {
            if let Some(reason) = self.warmup_block().await? {
                return Ok(skipped(&reason));
            }
        }

        let analyzer = GitAnalyzer::new(self.git.clone(), &self.project_root);
        let state = self.db.analysis_state().await?;
        let since = since_commit
            .map(String::from)
            .or(state.last_commit.clone());

        if !force {
            let pending = analyzer.commits_since(since.as_deref()).await.unwrap_or(0);
            if pending < self.config.commits_per_trigger {
                return Ok(skipped(&format!(
                    "below commit trigger ({pending}/{})",
                    self.config.commits_per_trigger
                )));
            }
        }

        let started = Instant::now();
        let window = analyzer.collect(since.as_deref()).await;

        // Extract shapes per changed file; errors skip the file.
        let mut shapes_by_file: BTreeMap<String, SourceShapes> = BTreeMap::new();
        for file in window.added.iter().chain(window.modified.iter()) {
            if !syntactic::is_source_path(file) {
                continue;
            }
            match analyzer.load_source(file).await {
                Some(source) => {
                    shapes_by_file.insert(file.clone(), syntactic::extract_shapes(file, &source));
                }
                None => debug!(file, "analyzer skipped file"),
            }
        }

        let detections = heuristics::run_heuristics(&window, &shapes_by_file, &self.project_root);
        let detection_count = detections.len();

        let rule_fingerprints = artifacts::existing_rule_fingerprints(&self.project_root);
        let now = time::now_iso();
        let candidates =
            heuristics::score_and_filter(detections, &self.db, &rule_fingerprints, &now).await?;

        for candidate in &candidates {
            self.db.save_candidate(candidate).await?;
        }

        let generated = proposals::generate(
            &candidates,
            self.config.min_confidence(),
            self.config.max_proposals_per_session,
            session_id,
        );
        for proposal in &generated {
            self.db.save_proposal(proposal).await?;
            self.db
                .set_candidate_status(&proposal.candidate_fingerprint, CandidateStatus::Proposed)
                .await?;
        }

        if let Some(head) = &window.head {
            self.db
                .update_analysis_state(head, window.commit_count as i64)
                .await?;
        }

        let outcome = AnalysisOutcome {
            detections: detection_count,
            candidates: candidates.len(),
            proposals: generated.len(),
            analyzed_commits: window.commit_count,
            analysis_time_ms: started.elapsed().as_millis(),
            skipped: None,
        };
        info!(
            detections = outcome.detections,
            candidates = outcome.candidates,
            proposals = outcome.proposals,
            commits = outcome.analyzed_commits,
            "learning analysis complete"
        );
        Ok(outcome)
    }

    async fn warmup_block(&self) -> Result<Option<String>, AmbryError> {
        if self.config.warmup_hours <= 0 {
            return Ok(None);
        }
        let Some(created) = self.db.created_at().await? else {
            return Ok(None);
        };
        let Some(created) = time::parse_iso(&created) else {
            return Ok(None);
        };
        let age = chrono::Utc::now() - created;
        if age < Duration::hours(self.config.warmup_hours) {
            return Ok(Some(format!(
                "warm-up: database is {}h old, needs {}h",
                age.num_hours(),
                self.config.warmup_hours
            )));
        }
        Ok(None)
    }

    /// Pending proposals above a confidence floor.
    pub async fn pending_proposals(
        &self,
        max_count: usize,
        min_confidence: f64,
    ) -> Result<Vec<Proposal>, AmbryError> {
        self.db
            .list_proposals(Some(ProposalStatus::Pending), min_confidence, max_count)
            .await
    }

    /// Apply a user decision to a proposal.
    ///
    /// Serialized per proposal_id; idempotent when already decided: the
    /// prior outcome comes back without duplicate side effects.
    pub async fn decide(
        &self,
        proposal_id: &str,
        decision: Decision,
        edited_content: Option<String>,
    ) -> Result<DecisionOutcome, AmbryError> {
        let lock = self
            .decide_locks
            .entry(proposal_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        let proposal = self
            .db
            .get_proposal(proposal_id)
            .await?
            .ok_or_else(|| AmbryError::NotFound(format!("proposal {proposal_id}")))?;

        // Idempotence: a decided proposal reports its prior outcome.
        if let Some(prior_decision) = proposal.decision {
            if proposal.status != ProposalStatus::Snoozed {
                return Ok(DecisionOutcome {
                    proposal_id: proposal_id.to_string(),
                    decision: prior_decision,
                    artifact_path: prior_artifact_path(&proposal, &self.project_root),
                    prior: true,
                });
            }
        }

        let heuristic = self
            .db
            .get_candidate(&proposal.candidate_fingerprint)
            .await?
            .map(|c| c.heuristic_id)
            .unwrap_or(HeuristicId::H1);

        let mut artifact_path = None;
        match decision {
            Decision::Accept => {
                let path =
                    artifacts::write_artifact(&proposal, &self.project_root, edited_content.as_deref())?;
                let category = baseline_category(proposal.proposal_type);
                analytics::snapshot_baseline(
                    self.db.database(),
                    &proposal.proposal_id,
                    &path.display().to_string(),
                    category,
                    30,
                )
                .await?;
                self.db
                    .record_decision(&proposal.candidate_fingerprint, heuristic, decision)
                    .await?;
                artifact_path = Some(path.display().to_string());
            }
            Decision::Reject | Decision::Ignore => {
                let until = (chrono::Utc::now() + Duration::days(self.config.cooldown_days))
                    .format("%Y-%m-%dT%H:%M:%S%.3fZ")
                    .to_string();
                self.db
                    .set_cooldown(&proposal.candidate_fingerprint, &until)
                    .await?;
                self.db
                    .record_decision(&proposal.candidate_fingerprint, heuristic, decision)
                    .await?;
            }
            Decision::Snooze => {}
        }

        self.db
            .mark_decided(proposal_id, decision, edited_content)
            .await?;
        self.record_memory_event(&proposal, decision, artifact_path.as_deref())
            .await;

        Ok(DecisionOutcome {
            proposal_id: proposal_id.to_string(),
            decision,
            artifact_path,
            prior: false,
        })
    }

    /// Best-effort memory event for the decision; never blocks the caller.
    async fn record_memory_event(
        &self,
        proposal: &Proposal,
        decision: Decision,
        artifact_path: Option<&str>,
    ) {
        let Some(memory) = &self.memory else {
            return;
        };
        let (event_type, importance) = match decision {
            Decision::Accept => (EventType::Decision, 0.7),
            Decision::Reject | Decision::Ignore => (EventType::RejectedPattern, 0.5),
            Decision::Snooze => return,
        };

        let mut event = MemoryEvent::new(
            event_type,
            format!("Learning decision: {decision} — {}", proposal.title),
        )
        .with_actor(ActorType::System)
        .with_importance(importance)
        .with_tags(["learning", &decision.to_string()])
        .with_ref("proposal_id", &proposal.proposal_id);
        if let Some(path) = artifact_path {
            event = event.with_ref("artifact_path", path);
        }

        if let Err(e) = memory.save_event(&event).await {
            warn!(error = %e, "failed to record learning memory event");
        }
    }
}

fn skipped(reason: &str) -> AnalysisOutcome {
    AnalysisOutcome {
        skipped: Some(reason.to_string()),
        ..Default::default()
    }
}

fn prior_artifact_path(proposal: &Proposal, project_root: &Path) -> Option<String> {
    if proposal.status == ProposalStatus::Accepted {
        let path = artifacts::artifact_path(proposal, project_root);
        Some(path.display().to_string())
    } else {
        None
    }
}

/// Map an artifact type onto the failure category its baseline tracks.
fn baseline_category(proposal_type: ProposalType) -> FailureCategory {
    match proposal_type {
        ProposalType::Rule | ProposalType::Template | ProposalType::ProjectGraph => {
            FailureCategory::LintError
        }
        ProposalType::Adr => FailureCategory::ReviewFailure,
        ProposalType::Skill => FailureCategory::TestFailure,
    }
}
