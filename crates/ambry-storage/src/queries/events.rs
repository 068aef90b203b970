// SPDX-FileCopyrightText: 2026 Ambry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Memory event CRUD and FTS5 search.

use std::collections::BTreeMap;
use std::str::FromStr;

use rusqlite::params;

use ambry_core::AmbryError;

use crate::database::{fts_quote, map_tr_err, Database};
use crate::models::{ActorType, EventType, MemoryEvent};

/// Optional filters for event search.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub event_type: Option<EventType>,
    pub project: Option<String>,
    pub session_id: Option<String>,
    pub limit: Option<usize>,
}

/// Aggregate counts for the stats endpoint.
#[derive(Debug, Clone, serde::Serialize)]
pub struct EventStats {
    pub total_events: i64,
    pub total_sessions: i64,
    pub events_by_type: BTreeMap<String, i64>,
}

/// Insert an event, upserting when a dedupe key collides. Returns the row id.
pub async fn save_event(db: &Database, event: &MemoryEvent) -> Result<i64, AmbryError> {
    let event = event.clone();
    db.connection()
        .call(move |conn| {
            let tags: Vec<String> = event.tags.iter().map(|t| t.to_lowercase()).collect();
            let tags_json = serde_json::to_string(&tags).unwrap_or_else(|_| "[]".into());
            let refs_json = serde_json::to_string(&event.refs).unwrap_or_else(|_| "{}".into());
            let importance = event.importance.clamp(0.0, 1.0);

            let sql = if event.dedupe_key.is_some() {
                "INSERT INTO memory_events
                     (ts, actor, type, text, tags, refs, importance,
                      dedupe_key, project, session_id, created_at_epoch)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                 ON CONFLICT(dedupe_key) DO UPDATE SET
                     ts=excluded.ts, text=excluded.text, tags=excluded.tags,
                     refs=excluded.refs, importance=excluded.importance
                 RETURNING id"
            } else {
                "INSERT INTO memory_events
                     (ts, actor, type, text, tags, refs, importance,
                      dedupe_key, project, session_id, created_at_epoch)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                 RETURNING id"
            };

            let id: i64 = conn.query_row(
                sql,
                params![
                    event.ts,
                    event.actor.to_string(),
                    event.event_type.to_string(),
                    event.text,
                    tags_json,
                    refs_json,
                    importance,
                    event.dedupe_key,
                    event.project,
                    event.session_id,
                    event.created_at_epoch,
                ],
                |row| row.get(0),
            )?;
            Ok(id)
        })
        .await
        .map_err(map_tr_err)
}

/// Full-text search over event text and tags.
pub async fn search(
    db: &Database,
    query: &str,
    filter: EventFilter,
) -> Result<Vec<MemoryEvent>, AmbryError> {
    let match_expr = fts_quote(query);
    if match_expr.is_empty() {
        return Ok(vec![]);
    }
    db.connection()
        .call(move |conn| {
            let mut clauses = vec![
                "me.id IN (SELECT rowid FROM memory_events_fts WHERE memory_events_fts MATCH ?1)"
                    .to_string(),
            ];
            let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = vec![Box::new(match_expr)];

            if let Some(t) = filter.event_type {
                params.push(Box::new(t.to_string()));
                clauses.push(format!("me.type = ?{}", params.len()));
            }
            if let Some(p) = filter.project {
                params.push(Box::new(p));
                clauses.push(format!("me.project = ?{}", params.len()));
            }
            if let Some(s) = filter.session_id {
                params.push(Box::new(s));
                clauses.push(format!("me.session_id = ?{}", params.len()));
            }
            params.push(Box::new(filter.limit.unwrap_or(20) as i64));
            let limit_idx = params.len();

            let sql = format!(
                "SELECT me.* FROM memory_events me
                 WHERE {}
                 ORDER BY me.ts DESC
                 LIMIT ?{limit_idx}",
                clauses.join(" AND ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let refs: Vec<&dyn rusqlite::types::ToSql> =
                params.iter().map(|p| p.as_ref()).collect();
            let events = stmt
                .query_map(refs.as_slice(), row_to_event)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(events)
        })
        .await
        .map_err(map_tr_err)
}

/// Chronological slice of events between two timestamps (inclusive).
///
/// Readers sort explicitly: appends carry no ordering guarantee beyond ts.
pub async fn timeline(
    db: &Database,
    since: Option<&str>,
    until: Option<&str>,
    limit: usize,
) -> Result<Vec<MemoryEvent>, AmbryError> {
    let since = since.map(String::from);
    let until = until.map(String::from);
    db.connection()
        .call(move |conn| {
            let mut clauses: Vec<String> = Vec::new();
            let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

            if let Some(since) = since {
                params.push(Box::new(since));
                clauses.push(format!("ts >= ?{}", params.len()));
            }
            if let Some(until) = until {
                params.push(Box::new(until));
                clauses.push(format!("ts <= ?{}", params.len()));
            }
            params.push(Box::new(limit as i64));
            let limit_idx = params.len();

            let where_sql = if clauses.is_empty() {
                "1=1".to_string()
            } else {
                clauses.join(" AND ")
            };
            let sql = format!(
                "SELECT * FROM memory_events WHERE {where_sql}
                 ORDER BY ts ASC LIMIT ?{limit_idx}"
            );

            let mut stmt = conn.prepare(&sql)?;
            let refs: Vec<&dyn rusqlite::types::ToSql> =
                params.iter().map(|p| p.as_ref()).collect();
            let events = stmt
                .query_map(refs.as_slice(), row_to_event)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(events)
        })
        .await
        .map_err(map_tr_err)
}

/// Batch fetch by ids (the observations endpoint).
pub async fn get_events(db: &Database, ids: &[i64]) -> Result<Vec<MemoryEvent>, AmbryError> {
    if ids.is_empty() {
        return Ok(vec![]);
    }
    let ids = ids.to_vec();
    db.connection()
        .call(move |conn| {
            let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{i}")).collect();
            let sql = format!(
                "SELECT * FROM memory_events WHERE id IN ({}) ORDER BY ts ASC",
                placeholders.join(", ")
            );
            let mut stmt = conn.prepare(&sql)?;
            let refs: Vec<&dyn rusqlite::types::ToSql> =
                ids.iter().map(|id| id as &dyn rusqlite::types::ToSql).collect();
            let events = stmt
                .query_map(refs.as_slice(), row_to_event)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(events)
        })
        .await
        .map_err(map_tr_err)
}

/// Most recent events without FTS, newest first.
pub async fn recent(
    db: &Database,
    project: Option<&str>,
    limit: usize,
) -> Result<Vec<MemoryEvent>, AmbryError> {
    let project = project.map(String::from);
    db.connection()
        .call(move |conn| {
            let events = match project {
                Some(project) => {
                    let mut stmt = conn.prepare(
                        "SELECT * FROM memory_events WHERE project = ?1
                         ORDER BY ts DESC LIMIT ?2",
                    )?;
                    let rows = stmt
                        .query_map(params![project, limit as i64], row_to_event)?
                        .collect::<Result<Vec<_>, _>>()?;
                    rows
                }
                None => {
                    let mut stmt = conn.prepare(
                        "SELECT * FROM memory_events ORDER BY ts DESC LIMIT ?1",
                    )?;
                    let rows = stmt
                        .query_map(params![limit as i64], row_to_event)?
                        .collect::<Result<Vec<_>, _>>()?;
                    rows
                }
            };
            Ok(events)
        })
        .await
        .map_err(map_tr_err)
}

/// Totals for the stats endpoint.
pub async fn stats(db: &Database) -> Result<EventStats, AmbryError> {
    db.connection()
        .call(|conn| {
            let total_events: i64 =
                conn.query_row("SELECT COUNT(*) FROM memory_events", [], |r| r.get(0))?;
            let total_sessions: i64 =
                conn.query_row("SELECT COUNT(*) FROM sessions", [], |r| r.get(0))?;

            let mut stmt =
                conn.prepare("SELECT type, COUNT(*) FROM memory_events GROUP BY type")?;
            let mut events_by_type = BTreeMap::new();
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            for row in rows {
                let (t, n) = row?;
                events_by_type.insert(t, n);
            }

            Ok(EventStats {
                total_events,
                total_sessions,
                events_by_type,
            })
        })
        .await
        .map_err(map_tr_err)
}

fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<MemoryEvent> {
    let actor: String = row.get("actor")?;
    let event_type: String = row.get("type")?;
    let tags_json: String = row.get("tags")?;
    let refs_json: String = row.get("refs")?;

    Ok(MemoryEvent {
        id: Some(row.get("id")?),
        ts: row.get("ts")?,
        actor: ActorType::from_str(&actor).unwrap_or_default(),
        event_type: EventType::from_str(&event_type).unwrap_or_default(),
        text: row.get("text")?,
        tags: serde_json::from_str(&tags_json).unwrap_or_default(),
        refs: serde_json::from_str(&refs_json).unwrap_or_default(),
        importance: row.get("importance")?,
        dedupe_key: row.get("dedupe_key")?,
        project: row.get("project")?,
        session_id: row.get("session_id")?,
        created_at_epoch: row.get("created_at_epoch")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::MEMORY_MIGRATIONS;

    async fn setup() -> Database {
        Database::open_in_memory(MEMORY_MIGRATIONS).await.unwrap()
    }

    #[tokio::test]
    async fn save_assigns_ids_in_order() {
        let db = setup().await;
        let a = save_event(&db, &MemoryEvent::new(EventType::Event, "first"))
            .await
            .unwrap();
        let b = save_event(&db, &MemoryEvent::new(EventType::Event, "second"))
            .await
            .unwrap();
        assert!(b > a);
    }

    #[tokio::test]
    async fn dedupe_key_upserts_instead_of_duplicating() {
        let db = setup().await;
        let mut event = MemoryEvent::new(EventType::Discovery, "v1");
        event.dedupe_key = Some("hook:tdd:src/a.rs".into());
        let id1 = save_event(&db, &event).await.unwrap();

        event.text = "v2".into();
        let id2 = save_event(&db, &event).await.unwrap();
        assert_eq!(id1, id2);

        let events = get_events(&db, &[id1]).await.unwrap();
        assert_eq!(events[0].text, "v2");
    }

    #[tokio::test]
    async fn search_matches_stemmed_terms() {
        let db = setup().await;
        save_event(
            &db,
            &MemoryEvent::new(EventType::Lesson, "retries exhausted the connection pool"),
        )
        .await
        .unwrap();

        // Porter stemming folds "retry" onto "retries".
        let hits = search(&db, "retry", EventFilter::default()).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn search_filters_by_type() {
        let db = setup().await;
        save_event(&db, &MemoryEvent::new(EventType::Decision, "kept axum"))
            .await
            .unwrap();
        save_event(&db, &MemoryEvent::new(EventType::Discovery, "axum has extractors"))
            .await
            .unwrap();

        let filter = EventFilter {
            event_type: Some(EventType::Decision),
            ..Default::default()
        };
        let hits = search(&db, "axum", filter).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].event_type, EventType::Decision);
    }

    #[tokio::test]
    async fn search_with_bare_punctuation_is_literal() {
        let db = setup().await;
        save_event(&db, &MemoryEvent::new(EventType::Event, "renamed foo-bar module"))
            .await
            .unwrap();
        // A bare "-" would be an FTS NOT operator without quoting.
        let hits = search(&db, "foo-bar", EventFilter::default()).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn timeline_is_ascending_within_bounds() {
        let db = setup().await;
        let mut early = MemoryEvent::new(EventType::Event, "early");
        early.ts = "2026-01-01T00:00:00.000Z".into();
        let mut mid = MemoryEvent::new(EventType::Event, "mid");
        mid.ts = "2026-02-01T00:00:00.000Z".into();
        let mut late = MemoryEvent::new(EventType::Event, "late");
        late.ts = "2026-03-01T00:00:00.000Z".into();
        for e in [&late, &early, &mid] {
            save_event(&db, e).await.unwrap();
        }

        let window = timeline(
            &db,
            Some("2026-01-15T00:00:00.000Z"),
            Some("2026-02-15T00:00:00.000Z"),
            50,
        )
        .await
        .unwrap();
        assert_eq!(window.len(), 1);
        assert_eq!(window[0].text, "mid");

        let all = timeline(&db, None, None, 50).await.unwrap();
        let texts: Vec<_> = all.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["early", "mid", "late"]);
    }

    #[tokio::test]
    async fn get_events_empty_ids_is_empty() {
        let db = setup().await;
        assert!(get_events(&db, &[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn stats_counts_by_type() {
        let db = setup().await;
        save_event(&db, &MemoryEvent::new(EventType::Decision, "a"))
            .await
            .unwrap();
        save_event(&db, &MemoryEvent::new(EventType::Decision, "b"))
            .await
            .unwrap();
        save_event(&db, &MemoryEvent::new(EventType::Lesson, "c"))
            .await
            .unwrap();

        let stats = stats(&db).await.unwrap();
        assert_eq!(stats.total_events, 3);
        assert_eq!(stats.events_by_type.get("decision"), Some(&2));
        assert_eq!(stats.events_by_type.get("lesson"), Some(&1));
    }
}
