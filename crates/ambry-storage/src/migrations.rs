// SPDX-FileCopyrightText: 2026 Ambry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Version-table migration runner shared by every subsystem database.
//!
//! Each subsystem declares its schema as an ordered list of versions, each a
//! list of DDL statements. A version's statements and its `schema_versions`
//! row commit in the same transaction, so a crash mid-migration leaves the
//! database at the previous version, never between versions.

use rusqlite::Connection;

/// Ordered migration versions: index 0 is version 1.
pub type MigrationSet = &'static [&'static [&'static str]];

const SCHEMA_VERSIONS_DDL: &str = "
CREATE TABLE IF NOT EXISTS schema_versions (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);
";

/// Apply all pending migrations.
pub fn run_migrations(conn: &mut Connection, migrations: MigrationSet) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_VERSIONS_DDL)?;

    let current: i64 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_versions", [], |row| {
            row.get(0)
        })?;

    for (idx, statements) in migrations.iter().enumerate() {
        let version = idx as i64 + 1;
        if version <= current {
            continue;
        }
        let tx = conn.transaction()?;
        for statement in *statements {
            tx.execute_batch(statement)?;
        }
        tx.execute(
            "INSERT INTO schema_versions (version) VALUES (?1)",
            [version],
        )?;
        tx.commit()?;
    }
    Ok(())
}
