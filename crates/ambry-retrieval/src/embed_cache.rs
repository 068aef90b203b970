// SPDX-FileCopyrightText: 2026 Ambry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding result cache backed by `embed_cache.db`.
//!
//! Keys are chunk content hashes, so an unchanged chunk never needs to be
//! re-embedded across incremental reindex runs. The daemon itself never
//! embeds anything; it only bookkeeps for the external code-search binary.

use std::path::Path;

use rusqlite::params;

use ambry_core::AmbryError;
use ambry_storage::database::Database;
use ambry_storage::migrations::MigrationSet;

const EMBED_CACHE_DDL: &str = "
CREATE TABLE IF NOT EXISTS embed_cache (
    content_hash TEXT PRIMARY KEY,
    file_path TEXT NOT NULL,
    chunk_index INTEGER NOT NULL DEFAULT 0,
    model_name TEXT NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    hit_count INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_embed_cache_file ON embed_cache(file_path);
CREATE INDEX IF NOT EXISTS idx_embed_cache_model ON embed_cache(model_name);
";

const EMBED_MIGRATIONS: MigrationSet = &[&[EMBED_CACHE_DDL]];

/// Cache statistics.
#[derive(Debug, Clone, serde::Serialize)]
pub struct EmbedCacheStats {
    pub entries: i64,
    pub total_hits: i64,
}

pub struct EmbedCache {
    db: Database,
}

impl EmbedCache {
    pub async fn open(path: &Path) -> Result<Self, AmbryError> {
        let db = Database::open(path, EMBED_MIGRATIONS).await?;
        Ok(Self { db })
    }

    pub async fn open_in_memory() -> Result<Self, AmbryError> {
        let db = Database::open_in_memory(EMBED_MIGRATIONS).await?;
        Ok(Self { db })
    }

    /// Record a freshly embedded chunk.
    pub async fn record(
        &self,
        content_hash: &str,
        file_path: &str,
        chunk_index: i64,
        model_name: &str,
    ) -> Result<(), AmbryError> {
        let (content_hash, file_path, model_name) = (
            content_hash.to_string(),
            file_path.to_string(),
            model_name.to_string(),
        );
        self.db
            .connection()
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO embed_cache (content_hash, file_path, chunk_index, model_name)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(content_hash) DO UPDATE SET
                         file_path=excluded.file_path,
                         chunk_index=excluded.chunk_index,
                         model_name=excluded.model_name",
                    params![content_hash, file_path, chunk_index, model_name],
                )?;
                Ok(())
            })
            .await
            .map_err(AmbryError::storage)
    }

    /// True when the hash is cached for this model; counts the hit.
    pub async fn hit(&self, content_hash: &str, model_name: &str) -> Result<bool, AmbryError> {
        let (content_hash, model_name) = (content_hash.to_string(), model_name.to_string());
        self.db
            .connection()
            .call(move |conn| {
                let n = conn.execute(
                    "UPDATE embed_cache SET hit_count = hit_count + 1
                     WHERE content_hash = ?1 AND model_name = ?2",
                    params![content_hash, model_name],
                )?;
                Ok(n > 0)
            })
            .await
            .map_err(AmbryError::storage)
    }

    /// Drop entries for a file whose chunks were re-cut.
    pub async fn invalidate_file(&self, file_path: &str) -> Result<usize, AmbryError> {
        let file_path = file_path.to_string();
        self.db
            .connection()
            .call(move |conn| {
                let n = conn.execute(
                    "DELETE FROM embed_cache WHERE file_path = ?1",
                    params![file_path],
                )?;
                Ok(n)
            })
            .await
            .map_err(AmbryError::storage)
    }

    /// Drop every entry; a full reindex re-embeds the world.
    pub async fn clear(&self) -> Result<usize, AmbryError> {
        self.db
            .connection()
            .call(|conn| {
                let n = conn.execute("DELETE FROM embed_cache", [])?;
                Ok(n)
            })
            .await
            .map_err(AmbryError::storage)
    }

    pub async fn stats(&self) -> Result<EmbedCacheStats, AmbryError> {
        self.db
            .connection()
            .call(|conn| {
                let entries: i64 =
                    conn.query_row("SELECT COUNT(*) FROM embed_cache", [], |r| r.get(0))?;
                let total_hits: i64 = conn.query_row(
                    "SELECT COALESCE(SUM(hit_count), 0) FROM embed_cache",
                    [],
                    |r| r.get(0),
                )?;
                Ok(EmbedCacheStats {
                    entries,
                    total_hits,
                })
            })
            .await
            .map_err(AmbryError::storage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn miss_then_record_then_hit() {
        let cache = EmbedCache::open_in_memory().await.unwrap();
        assert!(!cache.hit("h1", "e5").await.unwrap());

        cache.record("h1", "src/a.md", 0, "e5").await.unwrap();
        assert!(cache.hit("h1", "e5").await.unwrap());
        assert!(!cache.hit("h1", "other-model").await.unwrap());

        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.total_hits, 1);
    }

    #[tokio::test]
    async fn clear_empties_the_cache() {
        let cache = EmbedCache::open_in_memory().await.unwrap();
        cache.record("h1", "a.md", 0, "e5").await.unwrap();
        cache.record("h2", "b.md", 0, "e5").await.unwrap();
        assert_eq!(cache.clear().await.unwrap(), 2);
        assert_eq!(cache.stats().await.unwrap().entries, 0);
    }

    #[tokio::test]
    async fn invalidate_removes_file_entries() {
        let cache = EmbedCache::open_in_memory().await.unwrap();
        cache.record("h1", "src/a.md", 0, "e5").await.unwrap();
        cache.record("h2", "src/a.md", 1, "e5").await.unwrap();
        cache.record("h3", "src/b.md", 0, "e5").await.unwrap();

        let removed = cache.invalidate_file("src/a.md").await.unwrap();
        assert_eq!(removed, 2);
        assert!(cache.hit("h3", "e5").await.unwrap());
    }
}
