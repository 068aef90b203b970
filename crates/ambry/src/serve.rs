// SPDX-FileCopyrightText: 2026 Ambry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `ambry serve`: assemble the daemon and run until signalled.
//!
//! Subsystems initialize in a fixed order (memory → governance →
//! embed_cache → learning → coordinator) and tear down in reverse. The
//! bound port is recorded in `port.lock` inside the data directory so
//! hooks and the stdio bridge can find the daemon.

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use ambry_config::{load_config, AmbryConfig};
use ambry_core::{fsutil, AmbryError};
use ambry_gateway::{start_server, AppState, ServerConfig};
use ambry_git::{GitRunner, SystemGit};
use ambry_learning::{LearningDatabase, LearningPipeline};
use ambry_orchestration::SpecCoordinator;
use ambry_retrieval::unified::CorpusSearch;
use ambry_retrieval::{CodeSearchClient, EmbedCache, GovernanceIndex, UnifiedRetriever};
use ambry_storage::MemoryStore;

/// File in the data dir recording the bound port.
const PORT_LOCK_FILE: &str = "port.lock";

pub async fn run_serve(
    host: String,
    port: u16,
    project_root: Option<PathBuf>,
    data_dir: Option<PathBuf>,
) -> Result<(), AmbryError> {
    let project_root = resolve_project_root(project_root)?;
    let config = load_config(&project_root)?;
    init_tracing();

    let data_dir = resolve_data_dir(data_dir);
    std::fs::create_dir_all(&data_dir)?;
    info!(
        project_root = %project_root.display(),
        data_dir = %data_dir.display(),
        "starting ambry serve"
    );

    let git: Arc<dyn GitRunner> = Arc::new(SystemGit::new());

    // Initialization order is part of the lifecycle contract:
    // memory → governance → embed_cache → learning → coordinator.
    let memory = Arc::new(MemoryStore::open(&data_dir.join("memory.db")).await?);
    let governance = Arc::new(GovernanceIndex::open(&data_dir.join("governance.db")).await?);
    let embed_cache = Arc::new(EmbedCache::open(&data_dir.join("embed_cache.db")).await?);
    let learning_db = Arc::new(LearningDatabase::open(&data_dir.join("learning.db")).await?);
    let learning = Arc::new(LearningPipeline::new(
        config.learning.clone(),
        learning_db,
        git.clone(),
        &project_root,
        Some(memory.clone()),
    ));
    let coordinator = Arc::new(SpecCoordinator::new(
        git.clone(),
        &project_root,
        config.orchestration.clone(),
        Some(memory.clone()),
    ));

    let code = Arc::new(CodeSearchClient::new(
        config.retrieval.code_binary.clone(),
        &project_root,
        &data_dir,
    ));
    let retriever = Arc::new(build_retriever(&config, code.clone(), governance.clone()));

    // Index governance docs at startup so first queries have a corpus.
    match governance.index_project(&project_root).await {
        Ok(report) => info!(
            indexed = report.files_indexed,
            skipped = report.files_skipped,
            "startup governance index"
        ),
        Err(e) => warn!(error = %e, "startup governance index failed"),
    }

    // Record the bound port for hooks and the stdio bridge.
    let port_lock = data_dir.join(PORT_LOCK_FILE);
    fsutil::atomic_write(&port_lock, format!("{port}\n").as_bytes())?;

    let cancel = install_signal_handler();
    let state = AppState {
        memory: memory.clone(),
        governance,
        embed_cache,
        code,
        retriever,
        learning,
        coordinator,
        git,
        project_root,
    };
    let server_config = ServerConfig { host, port };
    let result = start_server(&server_config, state, cancel).await;

    // Teardown in reverse: learning/coordinator hold no connections of
    // their own beyond learning.db, which closes on drop; checkpoint the
    // memory WAL and drop the port lock.
    if let Err(e) = memory.close().await {
        warn!(error = %e, "memory checkpoint failed during shutdown");
    }
    if let Err(e) = std::fs::remove_file(&port_lock) {
        warn!(error = %e, "failed to remove port.lock");
    }
    info!("ambry serve shutdown complete");
    result
}

fn build_retriever(
    config: &AmbryConfig,
    code: Arc<CodeSearchClient>,
    governance: Arc<GovernanceIndex>,
) -> UnifiedRetriever {
    let code_backend: Option<Arc<dyn CorpusSearch>> = if config.retrieval.code_enabled {
        Some(code)
    } else {
        None
    };
    let governance_backend: Option<Arc<dyn CorpusSearch>> = if config.retrieval.governance_enabled {
        Some(governance)
    } else {
        None
    };
    UnifiedRetriever::new(code_backend, governance_backend)
}

fn resolve_project_root(explicit: Option<PathBuf>) -> Result<PathBuf, AmbryError> {
    match explicit {
        Some(root) => Ok(root),
        None => std::env::current_dir()
            .map_err(|e| AmbryError::Internal(format!("cannot resolve current dir: {e}"))),
    }
}

fn resolve_data_dir(explicit: Option<PathBuf>) -> PathBuf {
    explicit.unwrap_or_else(|| {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".ai-framework/data")
    })
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("ambry=info,warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

/// SIGINT/SIGTERM cancel the server for a graceful shutdown.
fn install_signal_handler() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("sigterm handler");
            tokio::select! {
                _ = ctrl_c => {},
                _ = sigterm.recv() => {},
            }
        }
        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
        }
        info!("shutdown signal received");
        trigger.cancel();
    });
    cancel
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_dir_defaults_under_home() {
        let dir = resolve_data_dir(None);
        assert!(dir.ends_with(".ai-framework/data"));
    }

    #[test]
    fn explicit_data_dir_wins() {
        let dir = resolve_data_dir(Some(PathBuf::from("/tmp/ambry-data")));
        assert_eq!(dir, PathBuf::from("/tmp/ambry-data"));
    }
}
