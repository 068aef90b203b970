// SPDX-FileCopyrightText: 2026 Ambry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP contract tests over the assembled router.

use std::path::Path;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use tower::ServiceExt;

use ambry_config::{LearningConfig, OrchestrationConfig};
use ambry_gateway::{build_router, AppState};
use ambry_git::ScriptedGit;
use ambry_learning::{LearningDatabase, LearningPipeline};
use ambry_orchestration::SpecCoordinator;
use ambry_retrieval::unified::CorpusSearch;
use ambry_retrieval::{CodeSearchClient, EmbedCache, GovernanceIndex, UnifiedRetriever};
use ambry_storage::MemoryStore;

async fn test_app(root: &Path, git: Arc<ScriptedGit>) -> Router {
    let memory = Arc::new(MemoryStore::open_in_memory().await.unwrap());
    let governance = Arc::new(GovernanceIndex::open_in_memory().await.unwrap());
    governance.index_project(root).await.unwrap();
    let embed_cache = Arc::new(EmbedCache::open_in_memory().await.unwrap());

    // A nonexistent binary makes the code backend genuinely unavailable.
    let code = Arc::new(CodeSearchClient::new(
        "/nonexistent/code-search-binary",
        root,
        root,
    ));
    let retriever = Arc::new(UnifiedRetriever::new(
        Some(code.clone() as Arc<dyn CorpusSearch>),
        Some(governance.clone() as Arc<dyn CorpusSearch>),
    ));

    let learning_db = Arc::new(LearningDatabase::open_in_memory().await.unwrap());
    let learning = Arc::new(LearningPipeline::new(
        LearningConfig {
            global_enabled: true,
            warmup_hours: 0,
            ..Default::default()
        },
        learning_db,
        git.clone(),
        root,
        Some(memory.clone()),
    ));

    let coordinator = Arc::new(SpecCoordinator::new(
        git.clone(),
        root,
        OrchestrationConfig::default(),
        Some(memory.clone()),
    ));

    build_router(AppState {
        memory,
        governance,
        embed_cache,
        code,
        retriever,
        learning,
        coordinator,
        git,
        project_root: root.to_path_buf(),
    })
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn health_answers_ok() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(dir.path(), Arc::new(ScriptedGit::new())).await;

    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn memory_save_then_search_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(dir.path(), Arc::new(ScriptedGit::new())).await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/memory/save",
            serde_json::json!({
                "text": "the retry budget was exhausted",
                "type": "lesson",
                "tags": ["Retries"],
                "importance": 0.8
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let saved = body_json(response).await;
    assert_eq!(saved["ok"], true);

    let response = app
        .oneshot(get("/api/memory/search?query=retry%20budget"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["events"].as_array().unwrap().len(), 1);
    assert_eq!(json["events"][0]["type"], "lesson");
    assert_eq!(json["events"][0]["tags"][0], "retries");
}

#[tokio::test]
async fn hybrid_search_with_dead_code_backend_returns_governance_hits() {
    let dir = tempfile::tempdir().unwrap();
    let rules = dir.path().join(".claude/rules");
    std::fs::create_dir_all(&rules).unwrap();
    std::fs::write(
        rules.join("errors.md"),
        "## Error handling convention\nAlways use typed error kinds.\n\
         ## Retries\nBound every retry loop.\n\
         ## Logging\nLog at subsystem boundaries.\n",
    )
    .unwrap();

    let app = test_app(dir.path(), Arc::new(ScriptedGit::new())).await;
    let response = app
        .oneshot(get(
            "/api/retrieval/search?query=error%20handling%20convention&corpus=hybrid&top_k=10",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let results = json["results"].as_array().unwrap();
    assert!(!results.is_empty());
    assert!(results.iter().all(|r| r["corpus"] == "governance"));
    assert_eq!(json["degraded"][0], "code");
}

#[tokio::test]
async fn code_only_search_against_dead_backend_degrades_to_empty_200() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(dir.path(), Arc::new(ScriptedGit::new())).await;

    let response = app
        .oneshot(get("/api/retrieval/search?query=anything&corpus=code"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert!(json["results"].as_array().unwrap().is_empty());
    assert!(!json["degraded"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn orchestration_lifecycle_over_http() {
    let dir = tempfile::tempdir().unwrap();
    let git = Arc::new(ScriptedGit::new());
    git.ok(&["worktree", "list"], "");
    git.ok(&["status", "--porcelain"], "");
    git.ok(&["worktree", "add"], "");
    let app = test_app(dir.path(), git).await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/orchestration/start",
            serde_json::json!({"slug": "http-spec"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Zero tasks violates the approve contract.
    let response = app
        .clone()
        .oneshot(post_json(
            "/api/orchestration/approve-plan",
            serde_json::json!({"slug": "http-spec", "total_tasks": 0}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/orchestration/approve-plan",
            serde_json::json!({"slug": "http-spec", "total_tasks": 1}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["phase"], "implementing");

    // A verdict outside verifying is a phase conflict.
    let response = app
        .clone()
        .oneshot(post_json(
            "/api/orchestration/submit-verdict",
            serde_json::json!({
                "slug": "http-spec",
                "reviewer_id": "code-quality",
                "output": "Verdict: PASS"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .oneshot(get("/api/orchestration/state?slug=http-spec"))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["state"]["phase"], "implementing");
}

#[tokio::test]
async fn unknown_proposal_decision_is_404() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(dir.path(), Arc::new(ScriptedGit::new())).await;

    let response = app
        .oneshot(post_json(
            "/api/learning/decide",
            serde_json::json!({"proposal_id": "ghost", "decision": "accept"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn record_failure_dedups_per_day() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(dir.path(), Arc::new(ScriptedGit::new())).await;

    let body = serde_json::json!({
        "category": "lint_error",
        "file_path": "src/a.rs",
        "detail": "unused import"
    });
    let first = app
        .clone()
        .oneshot(post_json("/api/learning/analytics/record-failure", body.clone()))
        .await
        .unwrap();
    let first = body_json(first).await;
    assert_eq!(first["recorded"], true);

    let second = app
        .clone()
        .oneshot(post_json("/api/learning/analytics/record-failure", body))
        .await
        .unwrap();
    let second = body_json(second).await;
    assert_eq!(second["recorded"], false, "same signature, same day");

    let summary = app
        .oneshot(get("/api/learning/analytics/failures"))
        .await
        .unwrap();
    let summary = body_json(summary).await;
    assert_eq!(summary["total_failures"], 1);
}

#[tokio::test]
async fn retrieval_status_reports_unavailable_backend() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(dir.path(), Arc::new(ScriptedGit::new())).await;

    let response = app.oneshot(get("/api/retrieval/status")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["code"]["available"], false);
    assert_eq!(json["code"]["stale"], true);
    assert!(json["governance"]["total_files"].is_number());
}
