// SPDX-FileCopyrightText: 2026 Ambry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Learning endpoints: analysis, proposals, decisions, analytics.

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::warn;

use ambry_learning::analytics;
use ambry_learning::models::{
    Decision, FailureCategory, FailureEvent, FailureTrend, FileHotspot, Proposal,
    RuleEffectiveness,
};
use ambry_learning::pipeline::{AnalysisOutcome, DecisionOutcome};

use crate::error::ApiError;
use crate::server::AppState;

#[derive(Debug, Deserialize, Default)]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub since_commit: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub force: bool,
}

/// POST /api/learning/analyze
pub async fn analyze(
    State(state): State<AppState>,
    body: Option<Json<AnalyzeRequest>>,
) -> Result<Json<AnalysisOutcome>, ApiError> {
    let body = body.map(|b| b.0).unwrap_or_default();
    let outcome = state
        .learning
        .analyze(body.since_commit.as_deref(), body.session_id.as_deref(), body.force)
        .await?;
    Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
pub struct ProposalsQuery {
    #[serde(default)]
    pub max_count: Option<usize>,
    #[serde(default)]
    pub min_confidence: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct ProposalsResponse {
    pub proposals: Vec<Proposal>,
}

/// GET /api/learning/proposals
pub async fn list_proposals(
    State(state): State<AppState>,
    Query(query): Query<ProposalsQuery>,
) -> Result<Json<ProposalsResponse>, ApiError> {
    let proposals = state
        .learning
        .pending_proposals(
            query.max_count.unwrap_or(10),
            query.min_confidence.unwrap_or(0.0),
        )
        .await?;
    Ok(Json(ProposalsResponse { proposals }))
}

#[derive(Debug, Deserialize)]
pub struct DecideRequest {
    pub proposal_id: String,
    pub decision: Decision,
    #[serde(default)]
    pub edited_content: Option<String>,
}

/// POST /api/learning/decide -- idempotent on decided proposals.
pub async fn decide(
    State(state): State<AppState>,
    Json(body): Json<DecideRequest>,
) -> Result<Json<DecisionOutcome>, ApiError> {
    let outcome = state
        .learning
        .decide(&body.proposal_id, body.decision, body.edited_content)
        .await?;
    Ok(Json(outcome))
}

/// GET /api/learning/stats
pub async fn stats(
    State(state): State<AppState>,
) -> Result<Json<ambry_learning::database::LearningStats>, ApiError> {
    Ok(Json(state.learning.database().stats().await?))
}

/// GET /api/learning/config
pub async fn get_config(State(state): State<AppState>) -> Json<serde_json::Value> {
    let config = state.learning.config();
    Json(serde_json::json!({
        "global_enabled": config.global_enabled,
        "sensitivity": config.sensitivity,
        "min_confidence": config.min_confidence(),
        "max_proposals_per_session": config.max_proposals_per_session,
        "cooldown_days": config.cooldown_days,
        "warmup_hours": config.warmup_hours,
        "commits_per_trigger": config.commits_per_trigger,
    }))
}

#[derive(Debug, Deserialize)]
pub struct WindowQuery {
    #[serde(default)]
    pub days: Option<i64>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub category: Option<String>,
}

fn parse_category(raw: Option<&str>) -> Result<Option<FailureCategory>, ApiError> {
    match raw {
        None => Ok(None),
        Some(raw) => raw
            .parse::<FailureCategory>()
            .map(Some)
            .map_err(|_| {
                ambry_core::AmbryError::Validation(format!("unknown failure category '{raw}'"))
                    .into()
            }),
    }
}

/// GET /api/learning/analytics/failures
pub async fn failures_summary(
    State(state): State<AppState>,
    Query(query): Query<WindowQuery>,
) -> Result<Json<analytics::FailureSummary>, ApiError> {
    let summary =
        analytics::failure_summary(state.learning.database().database(), query.days.unwrap_or(30))
            .await?;
    Ok(Json(summary))
}

#[derive(Debug, Serialize)]
pub struct HotspotsResponse {
    pub hotspots: Vec<FileHotspot>,
}

/// GET /api/learning/analytics/hotspots
pub async fn hotspots(
    State(state): State<AppState>,
    Query(query): Query<WindowQuery>,
) -> Result<Json<HotspotsResponse>, ApiError> {
    let hotspots = analytics::file_hotspots(
        state.learning.database().database(),
        query.limit.unwrap_or(10),
        query.days.unwrap_or(30),
    )
    .await?;
    Ok(Json(HotspotsResponse { hotspots }))
}

#[derive(Debug, Serialize)]
pub struct TrendResponse {
    pub trend: Vec<FailureTrend>,
}

/// GET /api/learning/analytics/trend
pub async fn trend(
    State(state): State<AppState>,
    Query(query): Query<WindowQuery>,
) -> Result<Json<TrendResponse>, ApiError> {
    let trend = analytics::failure_trends(
        state.learning.database().database(),
        query.days.unwrap_or(30),
        parse_category(query.category.as_deref())?,
    )
    .await?;
    Ok(Json(TrendResponse { trend }))
}

#[derive(Debug, Serialize)]
pub struct EffectivenessResponse {
    pub rules: Vec<RuleEffectiveness>,
}

/// GET /api/learning/analytics/rules-effectiveness
pub async fn rules_effectiveness(
    State(state): State<AppState>,
) -> Result<Json<EffectivenessResponse>, ApiError> {
    let rules = analytics::all_rule_effectiveness(state.learning.database().database()).await?;
    Ok(Json(EffectivenessResponse { rules }))
}

#[derive(Debug, Deserialize)]
pub struct RecordFailureRequest {
    pub category: FailureCategory,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub detail: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RecordFailureResponse {
    pub ok: bool,
    /// False when the per-day signature already existed.
    pub recorded: bool,
}

/// POST /api/learning/analytics/record-failure -- best-effort hook write.
pub async fn record_failure(
    State(state): State<AppState>,
    Json(body): Json<RecordFailureRequest>,
) -> Json<RecordFailureResponse> {
    let mut event = FailureEvent::new(body.category, body.file_path, body.detail);
    event.session_id = body.session_id;

    match analytics::record_failure(state.learning.database().database(), &event).await {
        Ok(recorded) => Json(RecordFailureResponse { ok: true, recorded }),
        Err(e) => {
            warn!(error = %e, "failure event dropped (swallowed at HTTP boundary)");
            Json(RecordFailureResponse {
                ok: false,
                recorded: false,
            })
        }
    }
}
