// SPDX-FileCopyrightText: 2026 Ambry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Orchestration endpoints: spec lifecycle and the stop guard.

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use ambry_orchestration::coordinator::{assess_complexity, ResolveOutcome, SpecComplexity};
use ambry_orchestration::review::parse_verdict;
use ambry_orchestration::SpecState;

use crate::error::ApiError;
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct SlugQuery {
    #[serde(default)]
    pub slug: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StateResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<SpecState>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub states: Vec<SpecState>,
}

/// GET /api/orchestration/state -- one slug, or all specs without one.
pub async fn get_state(
    State(state): State<AppState>,
    Query(query): Query<SlugQuery>,
) -> Json<StateResponse> {
    match query.slug {
        Some(slug) => Json(StateResponse {
            state: state.coordinator.get_state(&slug),
            states: vec![],
        }),
        None => Json(StateResponse {
            state: None,
            states: state.coordinator.list_states(),
        }),
    }
}

#[derive(Debug, Deserialize)]
pub struct StartRequest {
    pub slug: String,
    #[serde(default)]
    pub plan_path: Option<String>,
    /// Advisory only; assessed purely, never stored.
    #[serde(default)]
    pub complexity_text: Option<String>,
    #[serde(default)]
    pub affected_files: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct StartResponse {
    pub state: SpecState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub complexity: Option<SpecComplexity>,
}

/// POST /api/orchestration/start
pub async fn start(
    State(state): State<AppState>,
    Json(body): Json<StartRequest>,
) -> Result<Json<StartResponse>, ApiError> {
    let complexity = body
        .complexity_text
        .as_deref()
        .map(|text| assess_complexity(text, &body.affected_files));
    let spec = state
        .coordinator
        .start(&body.slug, body.plan_path.as_deref())
        .await?;
    Ok(Json(StartResponse {
        state: spec,
        complexity,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ApprovePlanRequest {
    pub slug: String,
    pub total_tasks: u32,
}

/// POST /api/orchestration/approve-plan
pub async fn approve_plan(
    State(state): State<AppState>,
    Json(body): Json<ApprovePlanRequest>,
) -> Result<Json<SpecState>, ApiError> {
    Ok(Json(
        state
            .coordinator
            .approve_plan(&body.slug, body.total_tasks)
            .await?,
    ))
}

#[derive(Debug, Deserialize)]
pub struct TaskRequest {
    pub slug: String,
    pub task_num: u32,
}

/// POST /api/orchestration/start-task
pub async fn start_task(
    State(state): State<AppState>,
    Json(body): Json<TaskRequest>,
) -> Result<Json<SpecState>, ApiError> {
    Ok(Json(
        state
            .coordinator
            .start_task(&body.slug, body.task_num)
            .await?,
    ))
}

/// POST /api/orchestration/complete-task
pub async fn complete_task(
    State(state): State<AppState>,
    Json(body): Json<TaskRequest>,
) -> Result<Json<SpecState>, ApiError> {
    Ok(Json(
        state
            .coordinator
            .complete_task(&body.slug, body.task_num)
            .await?,
    ))
}

#[derive(Debug, Deserialize)]
pub struct SlugRequest {
    pub slug: String,
}

/// POST /api/orchestration/start-verify
pub async fn start_verify(
    State(state): State<AppState>,
    Json(body): Json<SlugRequest>,
) -> Result<Json<SpecState>, ApiError> {
    Ok(Json(state.coordinator.start_verify(&body.slug).await?))
}

#[derive(Debug, Deserialize)]
pub struct SubmitVerdictRequest {
    pub slug: String,
    pub reviewer_id: String,
    /// Raw reviewer output; parsed with the strict verdict contract.
    pub output: String,
}

#[derive(Debug, Serialize)]
pub struct SubmitVerdictResponse {
    pub ok: bool,
    pub verdict: ambry_orchestration::review::Verdict,
    pub findings: usize,
}

/// POST /api/orchestration/submit-verdict
pub async fn submit_verdict(
    State(state): State<AppState>,
    Json(body): Json<SubmitVerdictRequest>,
) -> Result<Json<SubmitVerdictResponse>, ApiError> {
    let verdict = parse_verdict(&body.output, &body.reviewer_id, 0);
    let summary = (verdict.verdict, verdict.findings.len());
    state.coordinator.submit_verdict(&body.slug, verdict).await?;
    Ok(Json(SubmitVerdictResponse {
        ok: true,
        verdict: summary.0,
        findings: summary.1,
    }))
}

/// POST /api/orchestration/resolve-verify
pub async fn resolve_verify(
    State(state): State<AppState>,
    Json(body): Json<SlugRequest>,
) -> Result<Json<ResolveOutcome>, ApiError> {
    Ok(Json(state.coordinator.resolve_verify(&body.slug).await?))
}

/// POST /api/orchestration/start-learn
pub async fn start_learn(
    State(state): State<AppState>,
    Json(body): Json<SlugRequest>,
) -> Result<Json<SpecState>, ApiError> {
    Ok(Json(state.coordinator.start_learn(&body.slug).await?))
}

/// POST /api/orchestration/complete
pub async fn complete(
    State(state): State<AppState>,
    Json(body): Json<SlugRequest>,
) -> Result<Json<SpecState>, ApiError> {
    Ok(Json(state.coordinator.complete(&body.slug).await?))
}

#[derive(Debug, Deserialize)]
pub struct AbortRequest {
    pub slug: String,
    #[serde(default)]
    pub reason: Option<String>,
}

/// POST /api/orchestration/abort
pub async fn abort(
    State(state): State<AppState>,
    Json(body): Json<AbortRequest>,
) -> Result<Json<SpecState>, ApiError> {
    Ok(Json(
        state
            .coordinator
            .abort(&body.slug, body.reason.as_deref().unwrap_or("aborted"))
            .await?,
    ))
}

#[derive(Debug, Serialize)]
pub struct BusyResponse {
    pub busy: bool,
}

/// GET /api/orchestration/busy -- the session-exit stop guard.
pub async fn is_busy(
    State(state): State<AppState>,
    Query(query): Query<SlugQuery>,
) -> Json<BusyResponse> {
    let busy = match query.slug {
        Some(slug) => state.coordinator.is_busy(&slug),
        None => state
            .coordinator
            .list_states()
            .iter()
            .any(|s| state.coordinator.is_busy(&s.slug)),
    };
    Json(BusyResponse { busy })
}
