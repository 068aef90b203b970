// SPDX-FileCopyrightText: 2026 Ambry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! DDL for the memory database (`memory.db`).

use crate::migrations::MigrationSet;

const MEMORY_EVENTS_DDL: &str = "
CREATE TABLE IF NOT EXISTS memory_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    ts TEXT NOT NULL,
    actor TEXT NOT NULL DEFAULT 'agent',
    type TEXT NOT NULL DEFAULT 'event',
    text TEXT NOT NULL,
    tags TEXT NOT NULL DEFAULT '[]',
    refs TEXT NOT NULL DEFAULT '{}',
    importance REAL NOT NULL DEFAULT 0.5,
    dedupe_key TEXT UNIQUE,
    project TEXT,
    session_id TEXT,
    created_at_epoch INTEGER NOT NULL
);
";

const MEMORY_EVENTS_INDEXES: &str = "
CREATE INDEX IF NOT EXISTS idx_memory_events_ts ON memory_events(ts);
CREATE INDEX IF NOT EXISTS idx_memory_events_type ON memory_events(type);
CREATE INDEX IF NOT EXISTS idx_memory_events_project ON memory_events(project);
CREATE INDEX IF NOT EXISTS idx_memory_events_session ON memory_events(session_id);
CREATE INDEX IF NOT EXISTS idx_memory_events_importance ON memory_events(importance);
";

const MEMORY_EVENTS_FTS_DDL: &str = "
CREATE VIRTUAL TABLE IF NOT EXISTS memory_events_fts USING fts5(
    text,
    tags,
    content='memory_events',
    content_rowid='id',
    tokenize='porter unicode61'
);
";

const FTS_TRIGGERS: &str = "
CREATE TRIGGER IF NOT EXISTS memory_events_ai AFTER INSERT ON memory_events BEGIN
    INSERT INTO memory_events_fts(rowid, text, tags)
    VALUES (new.id, new.text, new.tags);
END;

CREATE TRIGGER IF NOT EXISTS memory_events_ad AFTER DELETE ON memory_events BEGIN
    INSERT INTO memory_events_fts(memory_events_fts, rowid, text, tags)
    VALUES ('delete', old.id, old.text, old.tags);
END;

CREATE TRIGGER IF NOT EXISTS memory_events_au AFTER UPDATE ON memory_events BEGIN
    INSERT INTO memory_events_fts(memory_events_fts, rowid, text, tags)
    VALUES ('delete', old.id, old.text, old.tags);
    INSERT INTO memory_events_fts(rowid, text, tags)
    VALUES (new.id, new.text, new.tags);
END;
";

const SESSIONS_DDL: &str = "
CREATE TABLE IF NOT EXISTS sessions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL UNIQUE,
    project TEXT,
    initial_prompt TEXT,
    started_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    ended_at TEXT
);
";

/// Migration set for `memory.db`.
pub const MEMORY_MIGRATIONS: MigrationSet = &[&[
    MEMORY_EVENTS_DDL,
    MEMORY_EVENTS_INDEXES,
    MEMORY_EVENTS_FTS_DDL,
    FTS_TRIGGERS,
    SESSIONS_DDL,
]];
