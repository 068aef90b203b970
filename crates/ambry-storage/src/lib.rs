// SPDX-FileCopyrightText: 2026 Ambry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the ambry daemon.
//!
//! Provides the WAL-mode storage substrate shared by every subsystem (one
//! database file each), a version-table migration runner whose version row
//! commits atomically with its DDL, and the memory-event / session store
//! with FTS5 porter-stemmed full-text search.
//!
//! All writes on a given file are serialized through tokio-rusqlite's single
//! background thread; readers proceed concurrently thanks to WAL. Do NOT
//! create additional write connections to the same file.

pub mod database;
pub mod migrations;
pub mod models;
pub mod queries;
pub mod schema;

pub use database::{fts_quote, Database};
pub use models::{ActorType, EventType, MemoryEvent, Session};

use std::path::Path;

use ambry_core::AmbryError;

/// Memory-event and session store backed by `memory.db`.
pub struct MemoryStore {
    db: Database,
}

impl MemoryStore {
    /// Open or create the memory database at `path`.
    pub async fn open(path: &Path) -> Result<Self, AmbryError> {
        let db = Database::open(path, schema::MEMORY_MIGRATIONS).await?;
        Ok(Self { db })
    }

    /// In-memory variant for tests.
    pub async fn open_in_memory() -> Result<Self, AmbryError> {
        let db = Database::open_in_memory(schema::MEMORY_MIGRATIONS).await?;
        Ok(Self { db })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    // --- Event operations ---

    pub async fn save_event(&self, event: &MemoryEvent) -> Result<i64, AmbryError> {
        queries::events::save_event(&self.db, event).await
    }

    pub async fn search_events(
        &self,
        query: &str,
        filter: queries::events::EventFilter,
    ) -> Result<Vec<MemoryEvent>, AmbryError> {
        queries::events::search(&self.db, query, filter).await
    }

    pub async fn timeline(
        &self,
        since: Option<&str>,
        until: Option<&str>,
        limit: usize,
    ) -> Result<Vec<MemoryEvent>, AmbryError> {
        queries::events::timeline(&self.db, since, until, limit).await
    }

    pub async fn get_events(&self, ids: &[i64]) -> Result<Vec<MemoryEvent>, AmbryError> {
        queries::events::get_events(&self.db, ids).await
    }

    pub async fn recent_events(
        &self,
        project: Option<&str>,
        limit: usize,
    ) -> Result<Vec<MemoryEvent>, AmbryError> {
        queries::events::recent(&self.db, project, limit).await
    }

    pub async fn event_stats(&self) -> Result<queries::events::EventStats, AmbryError> {
        queries::events::stats(&self.db).await
    }

    // --- Session operations ---

    pub async fn init_session(
        &self,
        session_id: &str,
        project: Option<&str>,
        initial_prompt: Option<&str>,
    ) -> Result<Session, AmbryError> {
        queries::sessions::init_session(&self.db, session_id, project, initial_prompt).await
    }

    pub async fn end_session(&self, session_id: &str) -> Result<(), AmbryError> {
        queries::sessions::end_session(&self.db, session_id).await
    }

    pub async fn list_sessions(&self, limit: usize) -> Result<Vec<Session>, AmbryError> {
        queries::sessions::list_sessions(&self.db, limit).await
    }

    /// Checkpoint the WAL before shutdown.
    pub async fn close(&self) -> Result<(), AmbryError> {
        self.db.checkpoint().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_then_search_by_exact_text_round_trips() {
        let store = MemoryStore::open_in_memory().await.unwrap();
        let event = MemoryEvent::new(EventType::Discovery, "the cache layer uses stale keys");
        store.save_event(&event).await.unwrap();

        let hits = store
            .search_events("stale keys", Default::default())
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "the cache layer uses stale keys");
    }

    #[tokio::test]
    async fn wal_files_appear_next_to_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.db");
        let store = MemoryStore::open(&path).await.unwrap();
        store
            .save_event(&MemoryEvent::new(EventType::Event, "hello"))
            .await
            .unwrap();
        assert!(path.exists());
        assert!(dir.path().join("memory.db-wal").exists());
        store.close().await.unwrap();
    }
}
