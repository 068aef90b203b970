// SPDX-FileCopyrightText: 2026 Ambry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared retrieval models.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// A retrieval source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Corpus {
    Code,
    Governance,
}

/// Kind of governance document, derived from its directory convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DocType {
    Rule,
    Adr,
    Template,
    Skill,
    Agent,
    Architecture,
    Project,
}

/// One ranked retrieval hit from either corpus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub file_path: String,
    /// Bounded score in (0, 1]; higher is more relevant.
    pub score: f64,
    /// 1-based rank in the final merged ordering.
    pub rank: usize,
    pub excerpt: String,
    pub corpus: Corpus,
    #[serde(default)]
    pub heading: Option<String>,
    #[serde(default)]
    pub doc_type: Option<DocType>,
    #[serde(default)]
    pub chunk_index: Option<i64>,
    #[serde(default)]
    pub line_start: Option<i64>,
    #[serde(default)]
    pub line_end: Option<i64>,
}

/// Response from a retrieve call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResponse {
    pub results: Vec<SearchResult>,
    pub query_time_ms: f64,
    /// Backends that were skipped because they were unavailable.
    #[serde(default)]
    pub degraded: Vec<String>,
}

impl RetrievalResponse {
    pub fn empty() -> Self {
        Self {
            results: vec![],
            query_time_ms: 0.0,
            degraded: vec![],
        }
    }
}

/// Status of the external code index.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexStatus {
    pub available: bool,
    #[serde(default)]
    pub last_indexed_commit: Option<String>,
    #[serde(default)]
    pub last_indexed_at: Option<String>,
    #[serde(default)]
    pub total_files: i64,
    #[serde(default)]
    pub model: Option<String>,
    /// True when any tracked file differs from the indexed commit.
    #[serde(default = "default_stale")]
    pub stale: bool,
}

fn default_stale() -> bool {
    true
}
