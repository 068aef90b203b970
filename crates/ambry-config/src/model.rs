// SPDX-FileCopyrightText: 2026 Ambry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for `.ai-framework.json`.
//!
//! Every section carries a `#[serde(flatten)]` map so keys this version of
//! ambry does not recognize survive a read-modify-write round trip.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{Display, EnumString};

/// Top-level ambry configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AmbryConfig {
    /// Project identity.
    #[serde(default)]
    pub project: ProjectConfig,

    /// Adaptive learning pipeline settings.
    #[serde(default)]
    pub learning: LearningConfig,

    /// Retrieval backend settings.
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Orchestration state-machine settings.
    #[serde(default)]
    pub orchestration: OrchestrationConfig,

    /// Agent-teams settings; nested fields are opaque to the core.
    #[serde(default)]
    pub agent_teams: AgentTeamsConfig,

    /// Unrecognized top-level keys, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Project identity configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProjectConfig {
    /// Human-readable project name.
    #[serde(default)]
    pub name: Option<String>,

    /// Project root path; defaults to the current directory at load time.
    #[serde(default)]
    pub root: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Learning sensitivity tiers mapped to minimum proposal confidence.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Sensitivity {
    Conservative,
    #[default]
    Moderate,
    Aggressive,
}

impl Sensitivity {
    /// Minimum confidence a candidate needs before it becomes a proposal.
    pub fn min_confidence(&self) -> f64 {
        match self {
            Sensitivity::Conservative => 0.7,
            Sensitivity::Moderate => 0.5,
            Sensitivity::Aggressive => 0.3,
        }
    }
}

/// Adaptive learning configuration with anti-annoyance controls.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LearningConfig {
    /// Master switch; the pipeline is opt-in.
    #[serde(default)]
    pub global_enabled: bool,

    /// How eagerly patterns become proposals.
    #[serde(default)]
    pub sensitivity: Sensitivity,

    /// Cap on proposals produced per session.
    #[serde(default = "default_max_proposals")]
    pub max_proposals_per_session: usize,

    /// Days a rejected fingerprint stays out of proposal generation.
    #[serde(default = "default_cooldown_days")]
    pub cooldown_days: i64,

    /// Hours after first open before analysis starts producing anything.
    #[serde(default = "default_warmup_hours")]
    pub warmup_hours: i64,

    /// Commits accumulated since the last analysis before a trigger fires.
    #[serde(default = "default_commits_per_trigger")]
    pub commits_per_trigger: usize,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl LearningConfig {
    /// Minimum confidence derived from the configured sensitivity.
    pub fn min_confidence(&self) -> f64 {
        self.sensitivity.min_confidence()
    }
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            global_enabled: false,
            sensitivity: Sensitivity::default(),
            max_proposals_per_session: default_max_proposals(),
            cooldown_days: default_cooldown_days(),
            warmup_hours: default_warmup_hours(),
            commits_per_trigger: default_commits_per_trigger(),
            extra: Map::new(),
        }
    }
}

fn default_max_proposals() -> usize {
    3
}

fn default_cooldown_days() -> i64 {
    7
}

fn default_warmup_hours() -> i64 {
    24
}

fn default_commits_per_trigger() -> usize {
    5
}

/// Retrieval backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrievalConfig {
    /// Whether the external code-search backend participates in fan-out.
    #[serde(default = "default_true")]
    pub code_enabled: bool,

    /// Whether the governance index participates in fan-out.
    #[serde(default = "default_true")]
    pub governance_enabled: bool,

    /// Path to the external semantic code-search binary.
    #[serde(default = "default_code_binary")]
    pub code_binary: String,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            code_enabled: true,
            governance_enabled: true,
            code_binary: default_code_binary(),
            extra: Map::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_code_binary() -> String {
    "vexor".to_string()
}

/// Orchestration state-machine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OrchestrationConfig {
    /// Fix-loop bound before a spec aborts with reason `unfixed`.
    #[serde(default = "default_max_review_iterations")]
    pub max_review_iterations: u32,

    /// Hours after which a busy phase stops blocking session exit.
    #[serde(default = "default_stale_busy_hours")]
    pub stale_busy_hours: i64,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            max_review_iterations: default_max_review_iterations(),
            stale_busy_hours: default_stale_busy_hours(),
            extra: Map::new(),
        }
    }
}

fn default_max_review_iterations() -> u32 {
    3
}

fn default_stale_busy_hours() -> i64 {
    4
}

/// Agent-teams configuration. The core only reads `enabled`; the nested
/// fields belong to the teams collaborator and ride along untouched.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AgentTeamsConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
