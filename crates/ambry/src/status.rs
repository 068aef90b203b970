// SPDX-FileCopyrightText: 2026 Ambry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `ambry status`: data-directory and spec overview.

use std::path::PathBuf;

use ambry_core::AmbryError;
use ambry_learning::LearningDatabase;
use ambry_orchestration::state::list_spec_states;
use ambry_storage::MemoryStore;

pub async fn run_status(
    project_root: Option<PathBuf>,
    data_dir: Option<PathBuf>,
) -> Result<(), AmbryError> {
    let project_root = match project_root {
        Some(root) => root,
        None => std::env::current_dir()
            .map_err(|e| AmbryError::Internal(format!("cannot resolve current dir: {e}")))?,
    };
    let data_dir = data_dir.unwrap_or_else(|| {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".ai-framework/data")
    });

    println!("ambry status");
    println!("  project root: {}", project_root.display());
    println!("  data dir:     {}", data_dir.display());

    let port_lock = data_dir.join("port.lock");
    match std::fs::read_to_string(&port_lock) {
        Ok(port) => println!("  daemon port:  {}", port.trim()),
        Err(_) => println!("  daemon port:  (not running)"),
    }

    for db in ["memory.db", "governance.db", "embed_cache.db", "learning.db"] {
        let path = data_dir.join(db);
        let marker = if path.exists() { "present" } else { "absent" };
        println!("  {db:<16} {marker}");
    }

    let memory_path = data_dir.join("memory.db");
    if memory_path.exists() {
        let memory = MemoryStore::open(&memory_path).await?;
        let stats = memory.event_stats().await?;
        println!(
            "  events: {} across {} session(s)",
            stats.total_events, stats.total_sessions
        );
    }

    let learning_path = data_dir.join("learning.db");
    if learning_path.exists() {
        let learning = LearningDatabase::open(&learning_path).await?;
        let stats = learning.stats().await?;
        println!(
            "  learning: {} candidate(s), {} proposal(s)",
            stats.candidates_total, stats.proposals_total
        );
    }

    let specs = list_spec_states(&project_root);
    if specs.is_empty() {
        println!("  specs: none");
    } else {
        println!("  specs:");
        for spec in specs {
            println!(
                "    {:<24} {:<12} {}/{} tasks, iteration {}",
                spec.slug, spec.phase, spec.completed_tasks, spec.total_tasks, spec.review_iteration
            );
        }
    }

    Ok(())
}
