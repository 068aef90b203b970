// SPDX-FileCopyrightText: 2026 Ambry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session CRUD.

use rusqlite::{params, OptionalExtension};

use ambry_core::AmbryError;

use crate::database::{map_tr_err, Database};
use crate::models::Session;

/// Create a session, or return the existing one for the same session_id.
///
/// Hooks fire repeatedly per conversation, so init must be idempotent.
pub async fn init_session(
    db: &Database,
    session_id: &str,
    project: Option<&str>,
    initial_prompt: Option<&str>,
) -> Result<Session, AmbryError> {
    let session_id = if session_id.is_empty() {
        "default".to_string()
    } else {
        session_id.to_string()
    };
    let project = project.map(String::from);
    let initial_prompt = initial_prompt.map(String::from);

    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO sessions (session_id, project, initial_prompt)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(session_id) DO NOTHING",
                params![session_id, project, initial_prompt],
            )?;
            let session = conn.query_row(
                "SELECT id, session_id, project, initial_prompt, started_at, ended_at
                 FROM sessions WHERE session_id = ?1",
                params![session_id],
                row_to_session,
            )?;
            Ok(session)
        })
        .await
        .map_err(map_tr_err)
}

/// Mark a session ended. Unknown ids are a NotFound error.
pub async fn end_session(db: &Database, session_id: &str) -> Result<(), AmbryError> {
    let session_id = session_id.to_string();
    let changed = db
        .connection()
        .call(move |conn| {
            let n = conn.execute(
                "UPDATE sessions
                 SET ended_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE session_id = ?1 AND ended_at IS NULL",
                params![session_id],
            )?;
            Ok(n)
        })
        .await
        .map_err(map_tr_err)?;
    if changed == 0 {
        return Err(AmbryError::NotFound("session not found or already ended".into()));
    }
    Ok(())
}

/// Sessions newest first.
pub async fn list_sessions(db: &Database, limit: usize) -> Result<Vec<Session>, AmbryError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, session_id, project, initial_prompt, started_at, ended_at
                 FROM sessions ORDER BY started_at DESC LIMIT ?1",
            )?;
            let sessions = stmt
                .query_map(params![limit as i64], row_to_session)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(sessions)
        })
        .await
        .map_err(map_tr_err)
}

/// Fetch one session by its caller-supplied id.
pub async fn get_session(
    db: &Database,
    session_id: &str,
) -> Result<Option<Session>, AmbryError> {
    let session_id = session_id.to_string();
    db.connection()
        .call(move |conn| {
            let session = conn
                .query_row(
                    "SELECT id, session_id, project, initial_prompt, started_at, ended_at
                     FROM sessions WHERE session_id = ?1",
                    params![session_id],
                    row_to_session,
                )
                .optional()?;
            Ok(session)
        })
        .await
        .map_err(map_tr_err)
}

fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        id: row.get(0)?,
        session_id: row.get(1)?,
        project: row.get(2)?,
        initial_prompt: row.get(3)?,
        started_at: row.get(4)?,
        ended_at: row.get(5)?,
    })
}
