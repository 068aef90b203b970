// SPDX-FileCopyrightText: 2026 Ambry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Router assembly and server lifecycle.

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::info;

use ambry_core::AmbryError;
use ambry_git::GitRunner;
use ambry_learning::LearningPipeline;
use ambry_orchestration::SpecCoordinator;
use ambry_retrieval::{CodeSearchClient, EmbedCache, GovernanceIndex, UnifiedRetriever};
use ambry_storage::MemoryStore;

use crate::handlers;

/// Shared state for every request handler.
#[derive(Clone)]
pub struct AppState {
    pub memory: Arc<MemoryStore>,
    pub governance: Arc<GovernanceIndex>,
    pub embed_cache: Arc<EmbedCache>,
    pub code: Arc<CodeSearchClient>,
    pub retriever: Arc<UnifiedRetriever>,
    pub learning: Arc<LearningPipeline>,
    pub coordinator: Arc<SpecCoordinator>,
    pub git: Arc<dyn GitRunner>,
    pub project_root: PathBuf,
}

/// Bind configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8787,
        }
    }
}

/// Build the full route tree.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::system::get_health))
        // Memory
        .route("/api/memory/save", post(handlers::memory::save_event))
        .route("/api/memory/search", get(handlers::memory::search_events))
        .route("/api/memory/timeline", get(handlers::memory::timeline))
        .route(
            "/api/memory/observations",
            post(handlers::memory::observations),
        )
        // Sessions
        .route("/api/sessions/init", post(handlers::memory::init_session))
        .route("/api/sessions", get(handlers::memory::list_sessions))
        // Retrieval
        .route(
            "/api/retrieval/status",
            get(handlers::retrieval::get_status),
        )
        .route("/api/retrieval/search", get(handlers::retrieval::search))
        .route("/api/retrieval/index", post(handlers::retrieval::reindex))
        // Learning
        .route("/api/learning/analyze", post(handlers::learning::analyze))
        .route(
            "/api/learning/proposals",
            get(handlers::learning::list_proposals),
        )
        .route("/api/learning/decide", post(handlers::learning::decide))
        .route("/api/learning/stats", get(handlers::learning::stats))
        .route("/api/learning/config", get(handlers::learning::get_config))
        .route(
            "/api/learning/analytics/failures",
            get(handlers::learning::failures_summary),
        )
        .route(
            "/api/learning/analytics/hotspots",
            get(handlers::learning::hotspots),
        )
        .route(
            "/api/learning/analytics/trend",
            get(handlers::learning::trend),
        )
        .route(
            "/api/learning/analytics/rules-effectiveness",
            get(handlers::learning::rules_effectiveness),
        )
        .route(
            "/api/learning/analytics/record-failure",
            post(handlers::learning::record_failure),
        )
        // Orchestration
        .route(
            "/api/orchestration/state",
            get(handlers::orchestration::get_state),
        )
        .route(
            "/api/orchestration/start",
            post(handlers::orchestration::start),
        )
        .route(
            "/api/orchestration/approve-plan",
            post(handlers::orchestration::approve_plan),
        )
        .route(
            "/api/orchestration/start-task",
            post(handlers::orchestration::start_task),
        )
        .route(
            "/api/orchestration/complete-task",
            post(handlers::orchestration::complete_task),
        )
        .route(
            "/api/orchestration/start-verify",
            post(handlers::orchestration::start_verify),
        )
        .route(
            "/api/orchestration/submit-verdict",
            post(handlers::orchestration::submit_verdict),
        )
        .route(
            "/api/orchestration/resolve-verify",
            post(handlers::orchestration::resolve_verify),
        )
        .route(
            "/api/orchestration/start-learn",
            post(handlers::orchestration::start_learn),
        )
        .route(
            "/api/orchestration/complete",
            post(handlers::orchestration::complete),
        )
        .route(
            "/api/orchestration/abort",
            post(handlers::orchestration::abort),
        )
        .route(
            "/api/orchestration/busy",
            get(handlers::orchestration::is_busy),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until the cancellation token fires.
pub async fn start_server(
    config: &ServerConfig,
    state: AppState,
    cancel: CancellationToken,
) -> Result<(), AmbryError> {
    let app = build_router(state);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AmbryError::Internal(format!("failed to bind gateway to {addr}: {e}")))?;

    info!("gateway listening on {addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|e| AmbryError::Internal(format!("gateway server error: {e}")))?;
    Ok(())
}
