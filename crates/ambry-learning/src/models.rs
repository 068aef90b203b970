// SPDX-FileCopyrightText: 2026 Ambry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Models and enums for the adaptive learning layer.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use ambry_core::{fsutil, time};

/// The seven pattern-mining heuristics.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, Serialize, Deserialize,
)]
pub enum HeuristicId {
    /// Repeated block: same normalized code shape in several files.
    H1,
    /// Missing standard pattern: a file lacks what most peers carry.
    H2,
    /// Inconsistent pattern: competing implementations of one concern.
    H3,
    /// Security shape: recognizable anti-patterns.
    H4,
    /// Performance shape: nested loop over collection followed by IO.
    H5,
    /// Test gap: new non-test file without a sibling test.
    H6,
    /// Doc gap: new top-level module without a descriptor file.
    H7,
}

/// A file plus optional line span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub file: String,
    #[serde(default)]
    pub line_start: Option<i64>,
    #[serde(default)]
    pub line_end: Option<i64>,
}

impl Location {
    pub fn file(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line_start: None,
            line_end: None,
        }
    }

    pub fn span(file: impl Into<String>, start: i64, end: i64) -> Self {
        Self {
            file: file.into(),
            line_start: Some(start),
            line_end: Some(end),
        }
    }
}

/// A structural observation about code changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub heuristic_id: HeuristicId,
    pub locations: Vec<Location>,
    /// Stable 16-hex hash over the normalized shape; cross-run identity.
    pub fingerprint: String,
    pub example_text: String,
    pub raw_evidence: serde_json::Value,
    pub occurrences: usize,
    /// Share of matching occurrences among peers, in [0, 1].
    pub peer_share: f64,
    /// Age in days of the newest commit touching this shape.
    pub newest_commit_age_days: f64,
}

impl Detection {
    /// Build a detection; the fingerprint is derived from the heuristic and
    /// the normalized shape key so identical shapes match across runs.
    pub fn new(
        heuristic_id: HeuristicId,
        shape_key: &str,
        locations: Vec<Location>,
        example_text: impl Into<String>,
        raw_evidence: serde_json::Value,
    ) -> Self {
        let occurrences = locations.len();
        Self {
            heuristic_id,
            locations,
            fingerprint: fingerprint_for(heuristic_id, shape_key),
            example_text: example_text.into(),
            raw_evidence,
            occurrences,
            peer_share: 1.0,
            newest_commit_age_days: 0.0,
        }
    }

    pub fn distinct_files(&self) -> usize {
        let mut files: Vec<&str> = self.locations.iter().map(|l| l.file.as_str()).collect();
        files.sort_unstable();
        files.dedup();
        files.len()
    }
}

/// Stable fingerprint for a (heuristic, normalized shape) pair.
pub fn fingerprint_for(heuristic_id: HeuristicId, shape_key: &str) -> String {
    fsutil::short_hash16(&format!("{heuristic_id}|{shape_key}"))
}

/// Candidate lifecycle.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CandidateStatus {
    #[default]
    New,
    Proposed,
    Superseded,
}

/// A detection that survived the minimum count and recency filters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternCandidate {
    pub id: String,
    pub heuristic_id: HeuristicId,
    pub fingerprint: String,
    pub description: String,
    pub locations: Vec<Location>,
    pub occurrence_count: usize,
    pub distinct_files: usize,
    pub confidence: f64,
    pub first_seen: String,
    pub last_seen: String,
    #[serde(default)]
    pub cooldown_until: Option<String>,
    #[serde(default)]
    pub status: CandidateStatus,
    #[serde(default)]
    pub raw_evidence: serde_json::Value,
}

impl PatternCandidate {
    pub fn from_detection(detection: &Detection, confidence: f64) -> Self {
        let now = time::now_iso();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            heuristic_id: detection.heuristic_id,
            fingerprint: detection.fingerprint.clone(),
            description: detection.example_text.clone(),
            locations: detection.locations.clone(),
            occurrence_count: detection.occurrences,
            distinct_files: detection.distinct_files(),
            confidence: confidence.clamp(0.0, 1.0),
            first_seen: now.clone(),
            last_seen: now,
            cooldown_until: None,
            status: CandidateStatus::New,
            raw_evidence: detection.raw_evidence.clone(),
        }
    }
}

/// Artifact kind a proposal produces when accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProposalType {
    Rule,
    Adr,
    Template,
    Skill,
    ProjectGraph,
}

/// Proposal lifecycle.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProposalStatus {
    #[default]
    Pending,
    Accepted,
    Rejected,
    Ignored,
    Snoozed,
}

/// User decision on a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Decision {
    Accept,
    Reject,
    Ignore,
    Snooze,
}

impl Decision {
    pub fn resulting_status(&self) -> ProposalStatus {
        match self {
            Decision::Accept => ProposalStatus::Accepted,
            Decision::Reject => ProposalStatus::Rejected,
            Decision::Ignore => ProposalStatus::Ignored,
            Decision::Snooze => ProposalStatus::Snoozed,
        }
    }
}

/// An actionable artifact suggestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal {
    pub proposal_id: String,
    pub candidate_fingerprint: String,
    #[serde(rename = "type")]
    pub proposal_type: ProposalType,
    pub title: String,
    pub rationale: String,
    pub proposed_content: String,
    pub confidence: f64,
    #[serde(default)]
    pub status: ProposalStatus,
    pub created_at: String,
    #[serde(default)]
    pub decided_at: Option<String>,
    #[serde(default)]
    pub decision: Option<Decision>,
    #[serde(default)]
    pub edited_content: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Failure category recorded by hooks.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FailureCategory {
    LintError,
    TestFailure,
    TddViolation,
    ReviewFailure,
}

/// A hook observation of a lint/test/TDD failure, deduped per UTC day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureEvent {
    pub id: String,
    pub category: FailureCategory,
    #[serde(default)]
    pub file_path: Option<String>,
    /// Truncated to 200 chars before hashing and storage.
    pub detail: String,
    #[serde(default)]
    pub session_id: Option<String>,
    pub recorded_at: String,
    /// UTC calendar date, part of the dedup key.
    pub day: String,
    pub signature: String,
}

impl FailureEvent {
    pub fn new(
        category: FailureCategory,
        file_path: Option<String>,
        detail: impl Into<String>,
    ) -> Self {
        let day = time::today_utc();
        let detail: String = detail.into().chars().take(200).collect();
        let signature = failure_signature(category, file_path.as_deref(), &detail, &day);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            category,
            file_path,
            detail,
            session_id: None,
            recorded_at: time::now_iso(),
            day,
            signature,
        }
    }
}

/// Deterministic per-day dedup key.
pub fn failure_signature(
    category: FailureCategory,
    file_path: Option<&str>,
    detail: &str,
    day: &str,
) -> String {
    let detail: String = detail.chars().take(200).collect();
    fsutil::short_hash16(&format!(
        "{category}|{}|{detail}|{day}",
        file_path.unwrap_or("")
    ))
}

/// Snapshot of a rule's domain failure rate at acceptance time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleBaseline {
    pub baseline_id: String,
    pub proposal_id: String,
    pub artifact_path: String,
    pub category: FailureCategory,
    pub baseline_failures_per_day: f64,
    pub baseline_window_days: i64,
    pub created_at: String,
    /// "heuristic" when derived from the proposal type, "manual" otherwise.
    pub category_source: String,
}

/// Effectiveness verdict tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EffectivenessVerdict {
    Effective,
    Neutral,
    Ineffective,
}

/// Computed effectiveness of one accepted rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleEffectiveness {
    pub proposal_id: String,
    pub artifact_path: String,
    pub category: FailureCategory,
    pub baseline_rate: f64,
    pub current_rate: f64,
    pub score: f64,
    pub sample_days: i64,
    pub verdict: EffectivenessVerdict,
}

/// One bucket of the failure trend series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureTrend {
    pub day: String,
    pub category: FailureCategory,
    pub count: i64,
}

/// A file ranked by failure count within the window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileHotspot {
    pub file_path: String,
    pub total_failures: i64,
    pub by_category: BTreeMap<String, i64>,
}
