// SPDX-FileCopyrightText: 2026 Ambry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and the
//! transaction helper.
//!
//! Each subsystem opens its own file through [`Database::open`] with its own
//! migration set. tokio-rusqlite serializes every access on one background
//! thread, which is the single-writer model the daemon relies on.

use std::path::Path;
use std::time::Duration;

use rusqlite::TransactionBehavior;
use tracing::debug;

use ambry_core::AmbryError;

use crate::migrations::{self, MigrationSet};

/// Bounded retry count for busy writers.
const TX_MAX_ATTEMPTS: u32 = 5;

/// Map a tokio-rusqlite error into the storage error kind.
pub(crate) fn map_tr_err(e: tokio_rusqlite::Error) -> AmbryError {
    AmbryError::StorageUnavailable {
        source: Box::new(e),
    }
}

/// A single-writer SQLite handle with migrations applied.
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Open or create the database at `path` and bring its schema current.
    ///
    /// Returns `StorageUnavailable` when the schema cannot be reached after
    /// migration.
    pub async fn open(path: &Path, migrations: MigrationSet) -> Result<Self, AmbryError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = tokio_rusqlite::Connection::open(path.to_path_buf())
            .await
            .map_err(map_tr_err)?;
        let db = Self { conn };
        db.init(migrations).await?;
        debug!(path = %path.display(), "database opened");
        Ok(db)
    }

    /// In-memory variant for tests; same pragmas and migrations.
    pub async fn open_in_memory(migrations: MigrationSet) -> Result<Self, AmbryError> {
        let conn = tokio_rusqlite::Connection::open_in_memory()
            .await
            .map_err(map_tr_err)?;
        let db = Self { conn };
        db.init(migrations).await?;
        Ok(db)
    }

    async fn init(&self, migrations: MigrationSet) -> Result<(), AmbryError> {
        self.conn
            .call(move |conn| {
                conn.busy_timeout(Duration::from_secs(5))?;
                // journal_mode returns a result row, so query_row it.
                conn.query_row("PRAGMA journal_mode=WAL;", [], |_| Ok(()))?;
                conn.execute_batch("PRAGMA foreign_keys=ON;")?;
                migrations::run_migrations(conn, migrations)?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    /// Borrow the underlying connection for query modules.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Run `f` inside an IMMEDIATE transaction with bounded busy retries.
    ///
    /// The closure is retried from scratch when SQLite reports the database
    /// busy or locked, with jittered backoff between attempts. Readers are
    /// never blocked (WAL), so retries only contend with other writers.
    pub async fn tx<T, F>(&self, f: F) -> Result<T, AmbryError>
    where
        T: Send + 'static,
        F: for<'a> Fn(&rusqlite::Transaction<'a>) -> Result<T, rusqlite::Error>
            + Send
            + Sync
            + Clone
            + 'static,
    {
        let mut attempt = 0;
        loop {
            let f = f.clone();
            let result = self
                .conn
                .call(move |conn| {
                    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                    let value = f(&tx)?;
                    tx.commit()?;
                    Ok(value)
                })
                .await;

            match result {
                Ok(value) => return Ok(value),
                Err(e) if is_busy(&e) && attempt < TX_MAX_ATTEMPTS => {
                    attempt += 1;
                    tokio::time::sleep(backoff_with_jitter(attempt)).await;
                }
                Err(e) => return Err(map_tr_err(e)),
            }
        }
    }

    /// Truncate-checkpoint the WAL (called before shutdown).
    pub async fn checkpoint(&self) -> Result<(), AmbryError> {
        self.conn
            .call(|conn| {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        debug!("WAL checkpoint complete");
        Ok(())
    }

    /// Timestamp at which schema version 1 was applied, if any.
    ///
    /// Used by the learning warm-up guard.
    pub async fn schema_created_at(&self) -> Result<Option<String>, AmbryError> {
        self.conn
            .call(|conn| {
                let mut stmt =
                    conn.prepare("SELECT applied_at FROM schema_versions WHERE version = 1")?;
                let mut rows = stmt.query([])?;
                match rows.next()? {
                    Some(row) => Ok(Some(row.get::<_, String>(0)?)),
                    None => Ok(None),
                }
            })
            .await
            .map_err(map_tr_err)
    }
}

fn is_busy(e: &tokio_rusqlite::Error) -> bool {
    if let tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(code, _)) = e {
        matches!(
            code.code,
            rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
        )
    } else {
        false
    }
}

fn backoff_with_jitter(attempt: u32) -> Duration {
    let base_ms = 50u64 * u64::from(attempt);
    let jitter_ms = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| u64::from(d.subsec_nanos()) % 25)
        .unwrap_or(0);
    Duration::from_millis(base_ms + jitter_ms)
}

/// Quote a free-form query for FTS5 MATCH.
///
/// Each whitespace token is wrapped in double quotes so bare punctuation and
/// FTS operators (`-`, `*`, `NEAR`) are treated as literal terms.
pub fn fts_quote(query: &str) -> String {
    query
        .split_whitespace()
        .map(|token| format!("\"{}\"", token.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_MIGRATIONS: MigrationSet = &[&[
        "CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT NOT NULL);",
    ]];

    #[tokio::test]
    async fn open_applies_migrations() {
        let db = Database::open_in_memory(TEST_MIGRATIONS).await.unwrap();
        db.connection()
            .call(|conn| {
                conn.execute("INSERT INTO items (name) VALUES ('x')", [])?;
                Ok(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn tx_commits_atomically() {
        let db = Database::open_in_memory(TEST_MIGRATIONS).await.unwrap();
        let inserted = db
            .tx(|tx| {
                tx.execute("INSERT INTO items (name) VALUES ('a')", [])?;
                tx.execute("INSERT INTO items (name) VALUES ('b')", [])?;
                Ok(tx.last_insert_rowid())
            })
            .await
            .unwrap();
        assert_eq!(inserted, 2);
    }

    #[tokio::test]
    async fn tx_rolls_back_on_error() {
        let db = Database::open_in_memory(TEST_MIGRATIONS).await.unwrap();
        let result = db
            .tx(|tx| {
                tx.execute("INSERT INTO items (name) VALUES ('a')", [])?;
                tx.execute("INSERT INTO nope (name) VALUES ('b')", [])?;
                Ok(())
            })
            .await;
        assert!(result.is_err());

        let count: i64 = db
            .connection()
            .call(|conn| {
                let n = conn.query_row("SELECT COUNT(*) FROM items", [], |r| r.get(0))?;
                Ok(n)
            })
            .await
            .unwrap();
        assert_eq!(count, 0, "failed transaction must leave no rows");
    }

    #[tokio::test]
    async fn schema_created_at_is_recorded() {
        let db = Database::open_in_memory(TEST_MIGRATIONS).await.unwrap();
        let created = db.schema_created_at().await.unwrap();
        assert!(created.is_some());
    }

    #[test]
    fn fts_quote_neutralizes_operators() {
        assert_eq!(fts_quote("error handling"), "\"error\" \"handling\"");
        assert_eq!(fts_quote("foo-bar*"), "\"foo-bar*\"");
        assert_eq!(fts_quote("say \"hi\""), "\"say\" \"\"\"hi\"\"\"");
    }
}
