// SPDX-FileCopyrightText: 2026 Ambry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Failure analytics: per-day deduped events, trends, hotspots, and
//! rule-effectiveness scoring against acceptance-time baselines.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{Duration, Utc};
use rusqlite::params;

use ambry_core::{time, AmbryError};
use ambry_storage::database::Database;

use crate::models::{
    EffectivenessVerdict, FailureCategory, FailureEvent, FailureTrend, FileHotspot, RuleBaseline,
    RuleEffectiveness,
};

/// Floor for the baseline rate in the effectiveness ratio.
const BASELINE_EPSILON: f64 = 0.01;

/// Summary of failures within a window.
#[derive(Debug, Clone, serde::Serialize)]
pub struct FailureSummary {
    pub total_failures: i64,
    pub by_category: BTreeMap<String, i64>,
    pub period_days: i64,
    pub daily_rate: f64,
}

/// Record a failure event, deduped per (category, file, detail, day).
///
/// Returns true when the row was new, false when the signature already
/// existed for the day.
pub async fn record_failure(db: &Database, event: &FailureEvent) -> Result<bool, AmbryError> {
    let e = event.clone();
    db.connection()
        .call(move |conn| {
            let n = conn.execute(
                "INSERT OR IGNORE INTO failure_events
                     (id, category, file_path, detail, session_id, recorded_at, day, signature)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    e.id,
                    e.category.to_string(),
                    e.file_path,
                    e.detail,
                    e.session_id,
                    e.recorded_at,
                    e.day,
                    e.signature,
                ],
            )?;
            Ok(n > 0)
        })
        .await
        .map_err(AmbryError::storage)
}

/// Count failures, optionally narrowed by category and a since timestamp.
pub async fn count_failures(
    db: &Database,
    category: Option<FailureCategory>,
    since: Option<&str>,
) -> Result<i64, AmbryError> {
    let category = category.map(|c| c.to_string());
    let since = since.map(String::from);
    db.connection()
        .call(move |conn| {
            let mut clauses: Vec<String> = Vec::new();
            let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
            if let Some(category) = category {
                params.push(Box::new(category));
                clauses.push(format!("category = ?{}", params.len()));
            }
            if let Some(since) = since {
                params.push(Box::new(since));
                clauses.push(format!("recorded_at >= ?{}", params.len()));
            }
            let where_sql = if clauses.is_empty() {
                "1=1".to_string()
            } else {
                clauses.join(" AND ")
            };
            let refs: Vec<&dyn rusqlite::types::ToSql> =
                params.iter().map(|p| p.as_ref()).collect();
            let n = conn.query_row(
                &format!("SELECT COUNT(*) FROM failure_events WHERE {where_sql}"),
                refs.as_slice(),
                |row| row.get(0),
            )?;
            Ok(n)
        })
        .await
        .map_err(AmbryError::storage)
}

/// Totals and per-category counts over the last `days`.
pub async fn failure_summary(db: &Database, days: i64) -> Result<FailureSummary, AmbryError> {
    let since = (Utc::now() - Duration::days(days))
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string();
    db.connection()
        .call(move |conn| {
            let total: i64 = conn.query_row(
                "SELECT COUNT(*) FROM failure_events WHERE recorded_at >= ?1",
                params![since],
                |row| row.get(0),
            )?;
            let mut stmt = conn.prepare(
                "SELECT category, COUNT(*) FROM failure_events
                 WHERE recorded_at >= ?1 GROUP BY category",
            )?;
            let mut by_category = BTreeMap::new();
            let rows = stmt.query_map(params![since], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            for row in rows {
                let (c, n) = row?;
                by_category.insert(c, n);
            }
            Ok(FailureSummary {
                total_failures: total,
                by_category,
                period_days: days,
                daily_rate: if total > 0 {
                    total as f64 / days as f64
                } else {
                    0.0
                },
            })
        })
        .await
        .map_err(AmbryError::storage)
}

/// Failure counts bucketed by UTC date over the last `days`.
pub async fn failure_trends(
    db: &Database,
    days: i64,
    category: Option<FailureCategory>,
) -> Result<Vec<FailureTrend>, AmbryError> {
    let since_day = (Utc::now() - Duration::days(days))
        .format("%Y-%m-%d")
        .to_string();
    let category = category.map(|c| c.to_string());
    db.connection()
        .call(move |conn| {
            let mut clauses = vec!["day >= ?1".to_string()];
            let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = vec![Box::new(since_day)];
            if let Some(category) = category {
                params.push(Box::new(category));
                clauses.push(format!("category = ?{}", params.len()));
            }
            let sql = format!(
                "SELECT day, category, COUNT(*) FROM failure_events
                 WHERE {} GROUP BY day, category ORDER BY day",
                clauses.join(" AND ")
            );
            let mut stmt = conn.prepare(&sql)?;
            let refs: Vec<&dyn rusqlite::types::ToSql> =
                params.iter().map(|p| p.as_ref()).collect();
            let rows = stmt.query_map(refs.as_slice(), |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })?;
            let mut trends = Vec::new();
            for row in rows {
                let (day, category, count) = row?;
                if let Ok(category) = FailureCategory::from_str(&category) {
                    trends.push(FailureTrend {
                        day,
                        category,
                        count,
                    });
                }
            }
            Ok(trends)
        })
        .await
        .map_err(AmbryError::storage)
}

/// Top files by failure count within the window.
pub async fn file_hotspots(
    db: &Database,
    limit: usize,
    days: i64,
) -> Result<Vec<FileHotspot>, AmbryError> {
    let since = (Utc::now() - Duration::days(days))
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT file_path, category, COUNT(*) FROM failure_events
                 WHERE file_path IS NOT NULL AND recorded_at >= ?1
                 GROUP BY file_path, category",
            )?;
            let rows = stmt.query_map(params![since], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })?;

            let mut per_file: BTreeMap<String, FileHotspot> = BTreeMap::new();
            for row in rows {
                let (file, category, count) = row?;
                let entry = per_file.entry(file.clone()).or_insert_with(|| FileHotspot {
                    file_path: file,
                    total_failures: 0,
                    by_category: BTreeMap::new(),
                });
                entry.total_failures += count;
                entry.by_category.insert(category, count);
            }

            let mut hotspots: Vec<FileHotspot> = per_file.into_values().collect();
            hotspots.sort_by(|a, b| b.total_failures.cmp(&a.total_failures));
            hotspots.truncate(limit);
            Ok(hotspots)
        })
        .await
        .map_err(AmbryError::storage)
}

/// Count failures for a category in the window and persist the baseline.
pub async fn snapshot_baseline(
    db: &Database,
    proposal_id: &str,
    artifact_path: &str,
    category: FailureCategory,
    window_days: i64,
) -> Result<RuleBaseline, AmbryError> {
    let since = (Utc::now() - Duration::days(window_days))
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string();
    let count = count_failures(db, Some(category), Some(&since)).await?;
    let baseline = RuleBaseline {
        baseline_id: uuid::Uuid::new_v4().to_string(),
        proposal_id: proposal_id.to_string(),
        artifact_path: artifact_path.to_string(),
        category,
        baseline_failures_per_day: count as f64 / window_days as f64,
        baseline_window_days: window_days,
        created_at: time::now_iso(),
        category_source: "heuristic".to_string(),
    };

    let b = baseline.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO rule_baselines
                     (baseline_id, proposal_id, artifact_path, category,
                      baseline_failures_per_day, baseline_window_days,
                      created_at, category_source)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    b.baseline_id,
                    b.proposal_id,
                    b.artifact_path,
                    b.category.to_string(),
                    b.baseline_failures_per_day,
                    b.baseline_window_days,
                    b.created_at,
                    b.category_source,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(AmbryError::storage)?;
    Ok(baseline)
}

/// All saved baselines, newest first.
pub async fn list_baselines(db: &Database) -> Result<Vec<RuleBaseline>, AmbryError> {
    db.connection()
        .call(|conn| {
            let mut stmt =
                conn.prepare("SELECT * FROM rule_baselines ORDER BY created_at DESC")?;
            let rows = stmt.query_map([], |row| {
                let category: String = row.get("category")?;
                Ok(RuleBaseline {
                    baseline_id: row.get("baseline_id")?,
                    proposal_id: row.get("proposal_id")?,
                    artifact_path: row.get("artifact_path")?,
                    category: FailureCategory::from_str(&category)
                        .unwrap_or(FailureCategory::LintError),
                    baseline_failures_per_day: row.get("baseline_failures_per_day")?,
                    baseline_window_days: row.get("baseline_window_days")?,
                    created_at: row.get("created_at")?,
                    category_source: row.get("category_source")?,
                })
            })?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
        .map_err(AmbryError::storage)
}

/// Score one rule against its baseline.
///
/// ratio = current_rate / max(baseline_rate, 0.01); score = clamp(1 − ratio/2).
/// For a fixed baseline the score is non-increasing in the current rate.
pub async fn rule_effectiveness(
    db: &Database,
    baseline: &RuleBaseline,
) -> Result<RuleEffectiveness, AmbryError> {
    let sample_days = time::parse_iso(&baseline.created_at)
        .map(|created| (Utc::now() - created).num_days().max(1))
        .unwrap_or(1);
    let count = count_failures(db, Some(baseline.category), Some(&baseline.created_at)).await?;
    let current_rate = count as f64 / sample_days as f64;
    Ok(score_effectiveness(baseline, current_rate, sample_days))
}

/// Pure scoring step, separated for property tests.
pub fn score_effectiveness(
    baseline: &RuleBaseline,
    current_rate: f64,
    sample_days: i64,
) -> RuleEffectiveness {
    let ratio = current_rate / baseline.baseline_failures_per_day.max(BASELINE_EPSILON);
    let score = (1.0 - ratio / 2.0).clamp(0.0, 1.0);
    let verdict = if score > 0.6 {
        EffectivenessVerdict::Effective
    } else if score >= 0.4 {
        EffectivenessVerdict::Neutral
    } else {
        EffectivenessVerdict::Ineffective
    };
    RuleEffectiveness {
        proposal_id: baseline.proposal_id.clone(),
        artifact_path: baseline.artifact_path.clone(),
        category: baseline.category,
        baseline_rate: baseline.baseline_failures_per_day,
        current_rate,
        score,
        sample_days,
        verdict,
    }
}

/// Effectiveness for every saved baseline.
pub async fn all_rule_effectiveness(db: &Database) -> Result<Vec<RuleEffectiveness>, AmbryError> {
    let baselines = list_baselines(db).await?;
    let mut results = Vec::with_capacity(baselines.len());
    for baseline in &baselines {
        results.push(rule_effectiveness(db, baseline).await?);
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::LearningDatabase;

    fn baseline(rate: f64) -> RuleBaseline {
        RuleBaseline {
            baseline_id: "b1".into(),
            proposal_id: "p1".into(),
            artifact_path: ".claude/rules/learning-x.md".into(),
            category: FailureCategory::LintError,
            baseline_failures_per_day: rate,
            baseline_window_days: 30,
            created_at: time::now_iso(),
            category_source: "heuristic".into(),
        }
    }

    #[tokio::test]
    async fn per_day_dedup_keeps_one_row() {
        let ldb = LearningDatabase::open_in_memory().await.unwrap();
        let db = ldb.database();
        let event = FailureEvent::new(
            FailureCategory::LintError,
            Some("src/a.rs".into()),
            "unused import",
        );
        assert!(record_failure(db, &event).await.unwrap());

        // Same category/file/detail on the same day: identical signature.
        let duplicate = FailureEvent::new(
            FailureCategory::LintError,
            Some("src/a.rs".into()),
            "unused import",
        );
        assert!(!record_failure(db, &duplicate).await.unwrap());
        assert_eq!(count_failures(db, None, None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn different_details_are_distinct_rows() {
        let ldb = LearningDatabase::open_in_memory().await.unwrap();
        let db = ldb.database();
        for detail in ["unused import", "missing semicolon"] {
            let e = FailureEvent::new(FailureCategory::LintError, Some("src/a.rs".into()), detail);
            assert!(record_failure(db, &e).await.unwrap());
        }
        assert_eq!(count_failures(db, None, None).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn summary_counts_by_category() {
        let ldb = LearningDatabase::open_in_memory().await.unwrap();
        let db = ldb.database();
        record_failure(db, &FailureEvent::new(FailureCategory::LintError, None, "a"))
            .await
            .unwrap();
        record_failure(db, &FailureEvent::new(FailureCategory::TestFailure, None, "b"))
            .await
            .unwrap();

        let summary = failure_summary(db, 30).await.unwrap();
        assert_eq!(summary.total_failures, 2);
        assert_eq!(summary.by_category.get("lint_error"), Some(&1));
        assert!(summary.daily_rate > 0.0);
    }

    #[tokio::test]
    async fn trends_bucket_on_utc_date() {
        let ldb = LearningDatabase::open_in_memory().await.unwrap();
        let db = ldb.database();
        record_failure(db, &FailureEvent::new(FailureCategory::LintError, None, "a"))
            .await
            .unwrap();
        record_failure(db, &FailureEvent::new(FailureCategory::LintError, None, "b"))
            .await
            .unwrap();

        let trends = failure_trends(db, 7, None).await.unwrap();
        assert_eq!(trends.len(), 1, "same day, same category: one bucket");
        assert_eq!(trends[0].count, 2);
        assert_eq!(trends[0].day, time::today_utc());
    }

    #[tokio::test]
    async fn hotspots_rank_files_by_count() {
        let ldb = LearningDatabase::open_in_memory().await.unwrap();
        let db = ldb.database();
        for detail in ["a", "b", "c"] {
            record_failure(
                db,
                &FailureEvent::new(FailureCategory::LintError, Some("hot.rs".into()), detail),
            )
            .await
            .unwrap();
        }
        record_failure(
            db,
            &FailureEvent::new(FailureCategory::TestFailure, Some("cold.rs".into()), "x"),
        )
        .await
        .unwrap();

        let hotspots = file_hotspots(db, 10, 30).await.unwrap();
        assert_eq!(hotspots[0].file_path, "hot.rs");
        assert_eq!(hotspots[0].total_failures, 3);
        assert_eq!(hotspots.len(), 2);
    }

    #[tokio::test]
    async fn baseline_snapshot_records_rate() {
        let ldb = LearningDatabase::open_in_memory().await.unwrap();
        let db = ldb.database();
        for detail in ["a", "b", "c"] {
            record_failure(db, &FailureEvent::new(FailureCategory::LintError, None, detail))
                .await
                .unwrap();
        }

        let baseline = snapshot_baseline(db, "p1", ".claude/rules/learning-x.md",
            FailureCategory::LintError, 30)
            .await
            .unwrap();
        assert!((baseline.baseline_failures_per_day - 0.1).abs() < 1e-9);
        assert_eq!(baseline.category_source, "heuristic");
        assert_eq!(list_baselines(db).await.unwrap().len(), 1);
    }

    #[test]
    fn effectiveness_score_is_monotonic_in_current_rate() {
        let b = baseline(1.0);
        let mut last = f64::INFINITY;
        for rate in [0.0, 0.2, 0.5, 1.0, 2.0, 5.0] {
            let eff = score_effectiveness(&b, rate, 10);
            assert!(eff.score <= last, "score must not increase with failures");
            last = eff.score;
        }
    }

    #[test]
    fn effectiveness_verdict_tiers() {
        let b = baseline(1.0);
        assert_eq!(
            score_effectiveness(&b, 0.0, 10).verdict,
            EffectivenessVerdict::Effective
        );
        assert_eq!(
            score_effectiveness(&b, 1.0, 10).verdict,
            EffectivenessVerdict::Neutral
        );
        assert_eq!(
            score_effectiveness(&b, 2.0, 10).verdict,
            EffectivenessVerdict::Ineffective
        );
    }

    #[test]
    fn zero_baseline_uses_epsilon_floor() {
        let b = baseline(0.0);
        let eff = score_effectiveness(&b, 0.5, 10);
        // ratio = 0.5 / 0.01 = 50 → score clamps to 0.
        assert_eq!(eff.score, 0.0);
        assert_eq!(eff.verdict, EffectivenessVerdict::Ineffective);
    }
}
