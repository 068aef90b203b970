// SPDX-FileCopyrightText: 2026 Ambry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! LearningDatabase: candidates, proposals, decision history, and analysis
//! state, backed by `learning.db`.

use std::path::Path;
use std::str::FromStr;

use rusqlite::{params, OptionalExtension};

use ambry_core::{time, AmbryError};
use ambry_storage::database::Database;
use ambry_storage::migrations::MigrationSet;

use crate::models::{
    CandidateStatus, Decision, HeuristicId, PatternCandidate, Proposal, ProposalStatus,
    ProposalType,
};

const CANDIDATES_DDL: &str = "
CREATE TABLE IF NOT EXISTS pattern_candidates (
    id TEXT PRIMARY KEY,
    heuristic_id TEXT NOT NULL,
    fingerprint TEXT NOT NULL UNIQUE,
    description TEXT NOT NULL,
    locations TEXT NOT NULL DEFAULT '[]',
    occurrence_count INTEGER NOT NULL DEFAULT 0,
    distinct_files INTEGER NOT NULL DEFAULT 0,
    confidence REAL NOT NULL DEFAULT 0.0,
    first_seen TEXT NOT NULL,
    last_seen TEXT NOT NULL,
    cooldown_until TEXT,
    status TEXT NOT NULL DEFAULT 'new',
    raw_evidence TEXT NOT NULL DEFAULT '{}'
);
CREATE INDEX IF NOT EXISTS idx_candidates_confidence ON pattern_candidates(confidence);
CREATE INDEX IF NOT EXISTS idx_candidates_status ON pattern_candidates(status);
";

const PROPOSALS_DDL: &str = "
CREATE TABLE IF NOT EXISTS proposals (
    proposal_id TEXT PRIMARY KEY,
    candidate_fingerprint TEXT NOT NULL,
    type TEXT NOT NULL,
    title TEXT NOT NULL,
    rationale TEXT NOT NULL,
    proposed_content TEXT NOT NULL,
    confidence REAL NOT NULL DEFAULT 0.0,
    status TEXT NOT NULL DEFAULT 'pending',
    created_at TEXT NOT NULL,
    decided_at TEXT,
    decision TEXT,
    edited_content TEXT,
    session_id TEXT
);
CREATE INDEX IF NOT EXISTS idx_proposals_status ON proposals(status);
CREATE INDEX IF NOT EXISTS idx_proposals_fingerprint ON proposals(candidate_fingerprint);
";

const DECISION_HISTORY_DDL: &str = "
CREATE TABLE IF NOT EXISTS decision_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    fingerprint TEXT NOT NULL,
    heuristic_id TEXT NOT NULL,
    decision TEXT NOT NULL,
    decided_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_history_fingerprint ON decision_history(fingerprint);
";

const ANALYSIS_STATE_DDL: &str = "
CREATE TABLE IF NOT EXISTS analysis_state (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    last_commit TEXT,
    last_analyzed_at TEXT,
    total_commits_analyzed INTEGER NOT NULL DEFAULT 0
);
";

const FAILURE_EVENTS_DDL: &str = "
CREATE TABLE IF NOT EXISTS failure_events (
    id TEXT PRIMARY KEY,
    category TEXT NOT NULL,
    file_path TEXT,
    detail TEXT NOT NULL DEFAULT '',
    session_id TEXT,
    recorded_at TEXT NOT NULL,
    day TEXT NOT NULL,
    signature TEXT NOT NULL UNIQUE
);
CREATE INDEX IF NOT EXISTS idx_failures_category ON failure_events(category);
CREATE INDEX IF NOT EXISTS idx_failures_day ON failure_events(day);
CREATE INDEX IF NOT EXISTS idx_failures_file ON failure_events(file_path);
";

const RULE_BASELINES_DDL: &str = "
CREATE TABLE IF NOT EXISTS rule_baselines (
    baseline_id TEXT PRIMARY KEY,
    proposal_id TEXT NOT NULL,
    artifact_path TEXT NOT NULL,
    category TEXT NOT NULL,
    baseline_failures_per_day REAL NOT NULL,
    baseline_window_days INTEGER NOT NULL DEFAULT 30,
    created_at TEXT NOT NULL,
    category_source TEXT NOT NULL DEFAULT 'heuristic'
);
";

pub(crate) const LEARNING_MIGRATIONS: MigrationSet = &[&[
    CANDIDATES_DDL,
    PROPOSALS_DDL,
    DECISION_HISTORY_DDL,
    ANALYSIS_STATE_DDL,
    FAILURE_EVENTS_DDL,
    RULE_BASELINES_DDL,
]];

/// Last analysis bookmark.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct AnalysisState {
    pub last_commit: Option<String>,
    pub last_analyzed_at: Option<String>,
    pub total_commits_analyzed: i64,
}

/// Aggregate learning counters.
#[derive(Debug, Clone, serde::Serialize)]
pub struct LearningStats {
    pub candidates_total: i64,
    pub proposals_total: i64,
    pub proposals_by_status: std::collections::BTreeMap<String, i64>,
}

pub struct LearningDatabase {
    db: Database,
}

impl LearningDatabase {
    pub async fn open(path: &Path) -> Result<Self, AmbryError> {
        let db = Database::open(path, LEARNING_MIGRATIONS).await?;
        Ok(Self { db })
    }

    pub async fn open_in_memory() -> Result<Self, AmbryError> {
        let db = Database::open_in_memory(LEARNING_MIGRATIONS).await?;
        Ok(Self { db })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Timestamp of first schema application; drives the warm-up guard.
    pub async fn created_at(&self) -> Result<Option<String>, AmbryError> {
        self.db.schema_created_at().await
    }

    // --- Candidates ---

    /// Insert or refresh a candidate keyed by fingerprint.
    ///
    /// A recurring fingerprint keeps its first_seen and cooldown but picks
    /// up the new occurrence counts and confidence.
    pub async fn save_candidate(&self, candidate: &PatternCandidate) -> Result<(), AmbryError> {
        let c = candidate.clone();
        self.db
            .connection()
            .call(move |conn| {
                let locations = serde_json::to_string(&c.locations).unwrap_or_else(|_| "[]".into());
                let evidence =
                    serde_json::to_string(&c.raw_evidence).unwrap_or_else(|_| "{}".into());
                conn.execute(
                    "INSERT INTO pattern_candidates
                         (id, heuristic_id, fingerprint, description, locations,
                          occurrence_count, distinct_files, confidence,
                          first_seen, last_seen, cooldown_until, status, raw_evidence)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                     ON CONFLICT(fingerprint) DO UPDATE SET
                         description=excluded.description,
                         locations=excluded.locations,
                         occurrence_count=excluded.occurrence_count,
                         distinct_files=excluded.distinct_files,
                         confidence=excluded.confidence,
                         last_seen=excluded.last_seen,
                         raw_evidence=excluded.raw_evidence",
                    params![
                        c.id,
                        c.heuristic_id.to_string(),
                        c.fingerprint,
                        c.description,
                        locations,
                        c.occurrence_count as i64,
                        c.distinct_files as i64,
                        c.confidence,
                        c.first_seen,
                        c.last_seen,
                        c.cooldown_until,
                        c.status.to_string(),
                        evidence,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(AmbryError::storage)
    }

    pub async fn get_candidate(
        &self,
        fingerprint: &str,
    ) -> Result<Option<PatternCandidate>, AmbryError> {
        let fingerprint = fingerprint.to_string();
        self.db
            .connection()
            .call(move |conn| {
                let candidate = conn
                    .query_row(
                        "SELECT * FROM pattern_candidates WHERE fingerprint = ?1",
                        params![fingerprint],
                        row_to_candidate,
                    )
                    .optional()?;
                Ok(candidate)
            })
            .await
            .map_err(AmbryError::storage)
    }

    pub async fn list_candidates(
        &self,
        min_confidence: f64,
        limit: usize,
    ) -> Result<Vec<PatternCandidate>, AmbryError> {
        self.db
            .connection()
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT * FROM pattern_candidates
                     WHERE confidence >= ?1
                     ORDER BY confidence DESC LIMIT ?2",
                )?;
                let rows = stmt.query_map(params![min_confidence, limit as i64], row_to_candidate)?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })
            .await
            .map_err(AmbryError::storage)
    }

    pub async fn set_candidate_status(
        &self,
        fingerprint: &str,
        status: CandidateStatus,
    ) -> Result<(), AmbryError> {
        let fingerprint = fingerprint.to_string();
        self.db
            .connection()
            .call(move |conn| {
                conn.execute(
                    "UPDATE pattern_candidates SET status = ?1 WHERE fingerprint = ?2",
                    params![status.to_string(), fingerprint],
                )?;
                Ok(())
            })
            .await
            .map_err(AmbryError::storage)
    }

    /// Start a cooldown window for a fingerprint.
    pub async fn set_cooldown(&self, fingerprint: &str, until: &str) -> Result<(), AmbryError> {
        let (fingerprint, until) = (fingerprint.to_string(), until.to_string());
        self.db
            .connection()
            .call(move |conn| {
                conn.execute(
                    "UPDATE pattern_candidates SET cooldown_until = ?1 WHERE fingerprint = ?2",
                    params![until, fingerprint],
                )?;
                Ok(())
            })
            .await
            .map_err(AmbryError::storage)
    }

    /// True while `now` is inside the fingerprint's cooldown window.
    pub async fn is_in_cooldown(&self, fingerprint: &str, now: &str) -> Result<bool, AmbryError> {
        let (fingerprint, now) = (fingerprint.to_string(), now.to_string());
        self.db
            .connection()
            .call(move |conn| {
                let until: Option<String> = conn
                    .query_row(
                        "SELECT cooldown_until FROM pattern_candidates WHERE fingerprint = ?1",
                        params![fingerprint],
                        |row| row.get(0),
                    )
                    .optional()?
                    .flatten();
                Ok(match until {
                    Some(until) => now < until,
                    None => false,
                })
            })
            .await
            .map_err(AmbryError::storage)
    }

    // --- Decision history and the prior factor ---

    pub async fn record_decision(
        &self,
        fingerprint: &str,
        heuristic_id: HeuristicId,
        decision: Decision,
    ) -> Result<(), AmbryError> {
        let fingerprint = fingerprint.to_string();
        self.db
            .connection()
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO decision_history (fingerprint, heuristic_id, decision, decided_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![
                        fingerprint,
                        heuristic_id.to_string(),
                        decision.to_string(),
                        time::now_iso(),
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(AmbryError::storage)
    }

    /// Prior-decision factor for a fingerprint.
    ///
    /// Starts at 1.0 with no history, rises toward 1.5 as accepts
    /// accumulate, falls toward 0.5 as rejects do; an ignore counts as half
    /// a reject. Clamped to [0.5, 1.5].
    pub async fn prior_decision_factor(&self, fingerprint: &str) -> Result<f64, AmbryError> {
        let fingerprint = fingerprint.to_string();
        self.db
            .connection()
            .call(move |conn| {
                let (accepts, rejects, ignores): (f64, f64, f64) = conn.query_row(
                    "SELECT
                         COALESCE(SUM(CASE WHEN decision='accept' THEN 1 ELSE 0 END), 0),
                         COALESCE(SUM(CASE WHEN decision='reject' THEN 1 ELSE 0 END), 0),
                         COALESCE(SUM(CASE WHEN decision='ignore' THEN 1 ELSE 0 END), 0)
                     FROM decision_history WHERE fingerprint = ?1",
                    params![fingerprint],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )?;
                let weight = accepts + rejects + 0.5 * ignores;
                if weight == 0.0 {
                    return Ok(1.0);
                }
                let factor = 1.0 + 0.5 * (accepts - rejects - 0.5 * ignores) / weight;
                Ok(factor.clamp(0.5, 1.5))
            })
            .await
            .map_err(AmbryError::storage)
    }

    // --- Proposals ---

    pub async fn save_proposal(&self, proposal: &Proposal) -> Result<(), AmbryError> {
        let p = proposal.clone();
        self.db
            .connection()
            .call(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO proposals
                         (proposal_id, candidate_fingerprint, type, title, rationale,
                          proposed_content, confidence, status, created_at,
                          decided_at, decision, edited_content, session_id)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                    params![
                        p.proposal_id,
                        p.candidate_fingerprint,
                        p.proposal_type.to_string(),
                        p.title,
                        p.rationale,
                        p.proposed_content,
                        p.confidence,
                        p.status.to_string(),
                        p.created_at,
                        p.decided_at,
                        p.decision.map(|d| d.to_string()),
                        p.edited_content,
                        p.session_id,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(AmbryError::storage)
    }

    pub async fn get_proposal(&self, proposal_id: &str) -> Result<Option<Proposal>, AmbryError> {
        let proposal_id = proposal_id.to_string();
        self.db
            .connection()
            .call(move |conn| {
                let proposal = conn
                    .query_row(
                        "SELECT * FROM proposals WHERE proposal_id = ?1",
                        params![proposal_id],
                        row_to_proposal,
                    )
                    .optional()?;
                Ok(proposal)
            })
            .await
            .map_err(AmbryError::storage)
    }

    pub async fn list_proposals(
        &self,
        status: Option<ProposalStatus>,
        min_confidence: f64,
        limit: usize,
    ) -> Result<Vec<Proposal>, AmbryError> {
        self.db
            .connection()
            .call(move |conn| {
                let mut clauses = vec!["confidence >= ?1".to_string()];
                let mut params: Vec<Box<dyn rusqlite::types::ToSql>> =
                    vec![Box::new(min_confidence)];
                if let Some(status) = status {
                    params.push(Box::new(status.to_string()));
                    clauses.push(format!("status = ?{}", params.len()));
                }
                params.push(Box::new(limit as i64));
                let limit_idx = params.len();

                let sql = format!(
                    "SELECT * FROM proposals WHERE {}
                     ORDER BY confidence DESC LIMIT ?{limit_idx}",
                    clauses.join(" AND ")
                );
                let mut stmt = conn.prepare(&sql)?;
                let refs: Vec<&dyn rusqlite::types::ToSql> =
                    params.iter().map(|p| p.as_ref()).collect();
                let rows = stmt.query_map(refs.as_slice(), row_to_proposal)?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })
            .await
            .map_err(AmbryError::storage)
    }

    /// Count proposals attributed to one session (per-session quota).
    pub async fn count_session_proposals(&self, session_id: &str) -> Result<i64, AmbryError> {
        let session_id = session_id.to_string();
        self.db
            .connection()
            .call(move |conn| {
                let n = conn.query_row(
                    "SELECT COUNT(*) FROM proposals WHERE session_id = ?1",
                    params![session_id],
                    |row| row.get(0),
                )?;
                Ok(n)
            })
            .await
            .map_err(AmbryError::storage)
    }

    /// Apply a decision to a proposal row.
    pub async fn mark_decided(
        &self,
        proposal_id: &str,
        decision: Decision,
        edited_content: Option<String>,
    ) -> Result<(), AmbryError> {
        let proposal_id = proposal_id.to_string();
        self.db
            .connection()
            .call(move |conn| {
                conn.execute(
                    "UPDATE proposals
                     SET status = ?1, decision = ?2, decided_at = ?3, edited_content = ?4
                     WHERE proposal_id = ?5",
                    params![
                        decision.resulting_status().to_string(),
                        decision.to_string(),
                        time::now_iso(),
                        edited_content,
                        proposal_id,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(AmbryError::storage)
    }

    // --- Analysis state ---

    pub async fn analysis_state(&self) -> Result<AnalysisState, AmbryError> {
        self.db
            .connection()
            .call(|conn| {
                let state = conn
                    .query_row("SELECT * FROM analysis_state WHERE id = 1", [], |row| {
                        Ok(AnalysisState {
                            last_commit: row.get("last_commit")?,
                            last_analyzed_at: row.get("last_analyzed_at")?,
                            total_commits_analyzed: row.get("total_commits_analyzed")?,
                        })
                    })
                    .optional()?;
                Ok(state.unwrap_or_default())
            })
            .await
            .map_err(AmbryError::storage)
    }

    pub async fn update_analysis_state(
        &self,
        last_commit: &str,
        total_commits: i64,
    ) -> Result<(), AmbryError> {
        let last_commit = last_commit.to_string();
        self.db
            .connection()
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO analysis_state (id, last_commit, last_analyzed_at, total_commits_analyzed)
                     VALUES (1, ?1, ?2, ?3)
                     ON CONFLICT(id) DO UPDATE SET
                         last_commit=excluded.last_commit,
                         last_analyzed_at=excluded.last_analyzed_at,
                         total_commits_analyzed=excluded.total_commits_analyzed",
                    params![last_commit, time::now_iso(), total_commits],
                )?;
                Ok(())
            })
            .await
            .map_err(AmbryError::storage)
    }

    pub async fn stats(&self) -> Result<LearningStats, AmbryError> {
        self.db
            .connection()
            .call(|conn| {
                let candidates_total: i64 =
                    conn.query_row("SELECT COUNT(*) FROM pattern_candidates", [], |r| r.get(0))?;
                let proposals_total: i64 =
                    conn.query_row("SELECT COUNT(*) FROM proposals", [], |r| r.get(0))?;
                let mut stmt =
                    conn.prepare("SELECT status, COUNT(*) FROM proposals GROUP BY status")?;
                let mut proposals_by_status = std::collections::BTreeMap::new();
                let rows = stmt.query_map([], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                })?;
                for row in rows {
                    let (s, n) = row?;
                    proposals_by_status.insert(s, n);
                }
                Ok(LearningStats {
                    candidates_total,
                    proposals_total,
                    proposals_by_status,
                })
            })
            .await
            .map_err(AmbryError::storage)
    }
}

fn row_to_candidate(row: &rusqlite::Row<'_>) -> rusqlite::Result<PatternCandidate> {
    let heuristic: String = row.get("heuristic_id")?;
    let status: String = row.get("status")?;
    let locations: String = row.get("locations")?;
    let evidence: String = row.get("raw_evidence")?;
    Ok(PatternCandidate {
        id: row.get("id")?,
        heuristic_id: HeuristicId::from_str(&heuristic).unwrap_or(HeuristicId::H1),
        fingerprint: row.get("fingerprint")?,
        description: row.get("description")?,
        locations: serde_json::from_str(&locations).unwrap_or_default(),
        occurrence_count: row.get::<_, i64>("occurrence_count")? as usize,
        distinct_files: row.get::<_, i64>("distinct_files")? as usize,
        confidence: row.get("confidence")?,
        first_seen: row.get("first_seen")?,
        last_seen: row.get("last_seen")?,
        cooldown_until: row.get("cooldown_until")?,
        status: CandidateStatus::from_str(&status).unwrap_or_default(),
        raw_evidence: serde_json::from_str(&evidence).unwrap_or(serde_json::Value::Null),
    })
}

fn row_to_proposal(row: &rusqlite::Row<'_>) -> rusqlite::Result<Proposal> {
    let proposal_type: String = row.get("type")?;
    let status: String = row.get("status")?;
    let decision: Option<String> = row.get("decision")?;
    Ok(Proposal {
        proposal_id: row.get("proposal_id")?,
        candidate_fingerprint: row.get("candidate_fingerprint")?,
        proposal_type: ProposalType::from_str(&proposal_type).unwrap_or(ProposalType::Rule),
        title: row.get("title")?,
        rationale: row.get("rationale")?,
        proposed_content: row.get("proposed_content")?,
        confidence: row.get("confidence")?,
        status: ProposalStatus::from_str(&status).unwrap_or_default(),
        created_at: row.get("created_at")?,
        decided_at: row.get("decided_at")?,
        decision: decision.and_then(|d| Decision::from_str(&d).ok()),
        edited_content: row.get("edited_content")?,
        session_id: row.get("session_id")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Detection, Location};

    fn candidate(fingerprint_seed: &str, confidence: f64) -> PatternCandidate {
        let detection = Detection::new(
            HeuristicId::H1,
            fingerprint_seed,
            vec![Location::file("a.rs"), Location::file("b.rs")],
            format!("repeated shape {fingerprint_seed}"),
            serde_json::json!({}),
        );
        PatternCandidate::from_detection(&detection, confidence)
    }

    fn proposal_for(c: &PatternCandidate) -> Proposal {
        Proposal {
            proposal_id: uuid::Uuid::new_v4().to_string(),
            candidate_fingerprint: c.fingerprint.clone(),
            proposal_type: ProposalType::Rule,
            title: "Add rule".into(),
            rationale: "seen twice".into(),
            proposed_content: "body".into(),
            confidence: c.confidence,
            status: ProposalStatus::Pending,
            created_at: time::now_iso(),
            decided_at: None,
            decision: None,
            edited_content: None,
            session_id: Some("sess".into()),
        }
    }

    #[tokio::test]
    async fn candidate_upsert_keeps_first_seen() {
        let db = LearningDatabase::open_in_memory().await.unwrap();
        let mut c = candidate("shape-a", 0.6);
        c.first_seen = "2026-01-01T00:00:00.000Z".into();
        db.save_candidate(&c).await.unwrap();

        let mut again = candidate("shape-a", 0.8);
        again.occurrence_count = 5;
        db.save_candidate(&again).await.unwrap();

        let stored = db.get_candidate(&c.fingerprint).await.unwrap().unwrap();
        assert_eq!(stored.first_seen, "2026-01-01T00:00:00.000Z");
        assert_eq!(stored.occurrence_count, 5);
        assert!((stored.confidence - 0.8).abs() < 1e-9);
    }

    #[tokio::test]
    async fn cooldown_window_is_respected() {
        let db = LearningDatabase::open_in_memory().await.unwrap();
        let c = candidate("cool", 0.5);
        db.save_candidate(&c).await.unwrap();

        assert!(!db.is_in_cooldown(&c.fingerprint, "2026-08-02T00:00:00.000Z").await.unwrap());

        db.set_cooldown(&c.fingerprint, "2026-08-09T00:00:00.000Z").await.unwrap();
        assert!(db.is_in_cooldown(&c.fingerprint, "2026-08-08T00:00:00.000Z").await.unwrap());
        assert!(!db.is_in_cooldown(&c.fingerprint, "2026-08-10T00:00:00.000Z").await.unwrap());
    }

    #[tokio::test]
    async fn prior_factor_starts_neutral_and_moves_with_decisions() {
        let db = LearningDatabase::open_in_memory().await.unwrap();
        assert_eq!(db.prior_decision_factor("fp").await.unwrap(), 1.0);

        db.record_decision("fp", HeuristicId::H1, Decision::Accept).await.unwrap();
        let after_accept = db.prior_decision_factor("fp").await.unwrap();
        assert_eq!(after_accept, 1.5);

        db.record_decision("fp", HeuristicId::H1, Decision::Reject).await.unwrap();
        let mixed = db.prior_decision_factor("fp").await.unwrap();
        assert!(mixed > 0.5 && mixed < 1.5);

        let db2 = LearningDatabase::open_in_memory().await.unwrap();
        for _ in 0..3 {
            db2.record_decision("fp", HeuristicId::H1, Decision::Reject).await.unwrap();
        }
        assert_eq!(db2.prior_decision_factor("fp").await.unwrap(), 0.5);
    }

    #[tokio::test]
    async fn ignore_weighs_half_a_reject() {
        let reject_db = LearningDatabase::open_in_memory().await.unwrap();
        reject_db.record_decision("fp", HeuristicId::H2, Decision::Reject).await.unwrap();
        let ignore_db = LearningDatabase::open_in_memory().await.unwrap();
        ignore_db.record_decision("fp", HeuristicId::H2, Decision::Ignore).await.unwrap();

        let after_reject = reject_db.prior_decision_factor("fp").await.unwrap();
        let after_ignore = ignore_db.prior_decision_factor("fp").await.unwrap();
        assert!(after_ignore > after_reject, "ignore decrements less than reject");
    }

    #[tokio::test]
    async fn proposal_round_trip_and_decide() {
        let db = LearningDatabase::open_in_memory().await.unwrap();
        let c = candidate("p-shape", 0.7);
        db.save_candidate(&c).await.unwrap();
        let p = proposal_for(&c);
        db.save_proposal(&p).await.unwrap();

        let pending = db.list_proposals(Some(ProposalStatus::Pending), 0.0, 10).await.unwrap();
        assert_eq!(pending.len(), 1);

        db.mark_decided(&p.proposal_id, Decision::Accept, None).await.unwrap();
        let stored = db.get_proposal(&p.proposal_id).await.unwrap().unwrap();
        assert_eq!(stored.status, ProposalStatus::Accepted);
        assert_eq!(stored.decision, Some(Decision::Accept));
        assert!(stored.decided_at.is_some());
    }

    #[tokio::test]
    async fn list_proposals_filters_by_confidence() {
        let db = LearningDatabase::open_in_memory().await.unwrap();
        let low = candidate("low", 0.2);
        let high = candidate("high", 0.9);
        db.save_candidate(&low).await.unwrap();
        db.save_candidate(&high).await.unwrap();
        db.save_proposal(&proposal_for(&low)).await.unwrap();
        db.save_proposal(&proposal_for(&high)).await.unwrap();

        let confident = db.list_proposals(None, 0.5, 10).await.unwrap();
        assert_eq!(confident.len(), 1);
        assert_eq!(confident[0].candidate_fingerprint, high.fingerprint);
    }

    #[tokio::test]
    async fn analysis_state_round_trips() {
        let db = LearningDatabase::open_in_memory().await.unwrap();
        let initial = db.analysis_state().await.unwrap();
        assert!(initial.last_commit.is_none());

        db.update_analysis_state("abc123", 12).await.unwrap();
        let state = db.analysis_state().await.unwrap();
        assert_eq!(state.last_commit.as_deref(), Some("abc123"));
        assert_eq!(state.total_commits_analyzed, 12);
    }

    #[tokio::test]
    async fn session_quota_counts_only_that_session() {
        let db = LearningDatabase::open_in_memory().await.unwrap();
        let c = candidate("quota", 0.7);
        db.save_candidate(&c).await.unwrap();
        let mut p1 = proposal_for(&c);
        p1.session_id = Some("s1".into());
        let mut p2 = proposal_for(&c);
        p2.session_id = Some("s2".into());
        db.save_proposal(&p1).await.unwrap();
        db.save_proposal(&p2).await.unwrap();

        assert_eq!(db.count_session_proposals("s1").await.unwrap(), 1);
        assert_eq!(db.count_session_proposals("s3").await.unwrap(), 0);
    }
}
