// SPDX-FileCopyrightText: 2026 Ambry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retrieval endpoints: status, search, reindex.

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::warn;

use ambry_core::AmbryError;
use ambry_retrieval::{IndexStatus, QueryRoute, RetrievalResponse};

use crate::error::ApiError;
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub code: IndexStatus,
    pub governance: serde_json::Value,
    pub embed_cache: ambry_retrieval::embed_cache::EmbedCacheStats,
}

/// GET /api/retrieval/status
pub async fn get_status(
    State(state): State<AppState>,
) -> Result<Json<StatusResponse>, ApiError> {
    let code = state.code.status(state.git.as_ref()).await;
    let governance = state.governance.stats().await?;
    let embed_cache = state.embed_cache.stats().await?;
    Ok(Json(StatusResponse {
        code,
        governance,
        embed_cache,
    }))
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    /// Explicit corpus choice: "code", "governance", or "hybrid".
    #[serde(default)]
    pub corpus: Option<String>,
    #[serde(default)]
    pub top_k: Option<usize>,
}

fn parse_route(corpus: Option<&str>) -> Result<Option<QueryRoute>, AmbryError> {
    match corpus {
        None => Ok(None),
        Some("code") => Ok(Some(QueryRoute::Code)),
        Some("governance") => Ok(Some(QueryRoute::Governance)),
        Some("hybrid") => Ok(Some(QueryRoute::Hybrid)),
        Some(other) => Err(AmbryError::Validation(format!(
            "unknown corpus '{other}' (expected code, governance, or hybrid)"
        ))),
    }
}

/// GET /api/retrieval/search
///
/// A single-corpus query against an unavailable backend degrades to an
/// empty 200, matching the listing-endpoint contract.
pub async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<RetrievalResponse>, ApiError> {
    let top_k = query.top_k.unwrap_or(10);
    let route = parse_route(query.corpus.as_deref())?;
    match state.retriever.retrieve(&query.query, route, top_k).await {
        Ok(response) => Ok(Json(response)),
        Err(AmbryError::BackendUnavailable(reason)) => {
            warn!(reason, "retrieval backend unavailable; returning empty results");
            let mut response = RetrievalResponse::empty();
            response.degraded.push(reason);
            Ok(Json(response))
        }
        Err(e) => Err(e.into()),
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct ReindexRequest {
    #[serde(default)]
    pub full: bool,
}

#[derive(Debug, Serialize)]
pub struct ReindexResponse {
    pub governance: ambry_retrieval::IndexReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<ambry_retrieval::index_state::IndexState>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub degraded: Vec<String>,
}

/// POST /api/retrieval/index
///
/// Reindexes the governance corpus and, when available, the code backend.
pub async fn reindex(
    State(state): State<AppState>,
    body: Option<Json<ReindexRequest>>,
) -> Result<Json<ReindexResponse>, ApiError> {
    let full = body.map(|b| b.full).unwrap_or(false);
    let governance = state.governance.index_project(&state.project_root).await?;
    if full {
        // Everything gets re-embedded; cached hashes are dead weight.
        state.embed_cache.clear().await?;
    }

    let mut degraded = Vec::new();
    let code = match state.code.reindex(state.git.as_ref(), full).await {
        Ok(state) => Some(state),
        Err(e) => {
            warn!(error = %e, "code reindex skipped");
            degraded.push("code".to_string());
            None
        }
    };

    Ok(Json(ReindexResponse {
        governance,
        code,
        degraded,
    }))
}
