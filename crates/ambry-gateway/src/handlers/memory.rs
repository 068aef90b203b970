// SPDX-FileCopyrightText: 2026 Ambry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Memory and session endpoints.
//!
//! Event saves originate from hooks, so they are best-effort: a failure is
//! logged and answered with `ok: false` rather than an error status.

use std::collections::BTreeMap;

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::warn;

use ambry_storage::queries::events::EventFilter;
use ambry_storage::{ActorType, EventType, MemoryEvent, Session};

use crate::error::ApiError;
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct SaveEventRequest {
    pub text: String,
    #[serde(rename = "type", default)]
    pub event_type: Option<EventType>,
    #[serde(default)]
    pub actor: Option<ActorType>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub refs: BTreeMap<String, String>,
    #[serde(default)]
    pub importance: Option<f64>,
    #[serde(default)]
    pub dedupe_key: Option<String>,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SaveEventResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
}

/// POST /api/memory/save -- best-effort hook ingestion.
pub async fn save_event(
    State(state): State<AppState>,
    Json(body): Json<SaveEventRequest>,
) -> Json<SaveEventResponse> {
    let mut event = MemoryEvent::new(body.event_type.unwrap_or_default(), body.text)
        .with_tags(body.tags)
        .with_importance(body.importance.unwrap_or(0.5));
    event.actor = body.actor.unwrap_or(ActorType::Hook);
    event.refs = body.refs;
    event.dedupe_key = body.dedupe_key;
    event.project = body.project;
    event.session_id = body.session_id;

    match state.memory.save_event(&event).await {
        Ok(id) => Json(SaveEventResponse { ok: true, id: Some(id) }),
        Err(e) => {
            warn!(error = %e, "memory save failed (swallowed at HTTP boundary)");
            Json(SaveEventResponse { ok: false, id: None })
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(rename = "type", default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub project: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EventsResponse {
    pub events: Vec<MemoryEvent>,
}

/// GET /api/memory/search
pub async fn search_events(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<EventsResponse>, ApiError> {
    let event_type = match query.event_type.as_deref() {
        Some(raw) => Some(raw.parse::<EventType>().map_err(|_| {
            ambry_core::AmbryError::Validation(format!("unknown event type '{raw}'"))
        })?),
        None => None,
    };
    let filter = EventFilter {
        event_type,
        project: query.project,
        session_id: None,
        limit: query.limit,
    };
    let events = state.memory.search_events(&query.query, filter).await?;
    Ok(Json(EventsResponse { events }))
}

#[derive(Debug, Deserialize)]
pub struct TimelineQuery {
    #[serde(default)]
    pub since: Option<String>,
    #[serde(default)]
    pub until: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// GET /api/memory/timeline
pub async fn timeline(
    State(state): State<AppState>,
    Query(query): Query<TimelineQuery>,
) -> Result<Json<EventsResponse>, ApiError> {
    let events = state
        .memory
        .timeline(
            query.since.as_deref(),
            query.until.as_deref(),
            query.limit.unwrap_or(100),
        )
        .await?;
    Ok(Json(EventsResponse { events }))
}

#[derive(Debug, Deserialize)]
pub struct ObservationsRequest {
    pub ids: Vec<i64>,
}

/// POST /api/memory/observations -- batch fetch by ids.
pub async fn observations(
    State(state): State<AppState>,
    Json(body): Json<ObservationsRequest>,
) -> Result<Json<EventsResponse>, ApiError> {
    let events = state.memory.get_events(&body.ids).await?;
    Ok(Json(EventsResponse { events }))
}

#[derive(Debug, Deserialize)]
pub struct InitSessionRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub initial_prompt: Option<String>,
}

/// POST /api/sessions/init
pub async fn init_session(
    State(state): State<AppState>,
    Json(body): Json<InitSessionRequest>,
) -> Result<Json<Session>, ApiError> {
    let session = state
        .memory
        .init_session(
            body.session_id.as_deref().unwrap_or("default"),
            body.project.as_deref(),
            body.initial_prompt.as_deref(),
        )
        .await?;
    Ok(Json(session))
}

#[derive(Debug, Deserialize)]
pub struct ListSessionsQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct SessionsResponse {
    pub sessions: Vec<Session>,
}

/// GET /api/sessions
pub async fn list_sessions(
    State(state): State<AppState>,
    Query(query): Query<ListSessionsQuery>,
) -> Result<Json<SessionsResponse>, ApiError> {
    let sessions = state.memory.list_sessions(query.limit.unwrap_or(50)).await?;
    Ok(Json(SessionsResponse { sessions }))
}
