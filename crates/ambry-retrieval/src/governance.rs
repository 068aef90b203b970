// SPDX-FileCopyrightText: 2026 Ambry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Governance document indexer backed by `governance.db`.
//!
//! Crawls the project's governance roots, chunks markdown at `## ` heading
//! boundaries, and keeps an FTS5 porter-stemmed index current via per-file
//! content hashing. Each file's chunks are replaced inside one transaction,
//! so an interrupted run can leave stale rows but never a partially chunked
//! file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use rusqlite::params;
use tracing::{debug, info};

use ambry_core::{fsutil, AmbryError};
use ambry_storage::database::{fts_quote, Database};
use ambry_storage::migrations::MigrationSet;

use crate::models::{Corpus, DocType, SearchResult};

const GOVERNANCE_DOCS_DDL: &str = "
CREATE TABLE IF NOT EXISTS governance_docs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    file_path TEXT NOT NULL,
    chunk_index INTEGER NOT NULL DEFAULT 0,
    heading TEXT NOT NULL DEFAULT '',
    body TEXT NOT NULL,
    doc_type TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    indexed_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    UNIQUE(file_path, chunk_index)
);
";

const GOVERNANCE_FTS_DDL: &str = "
CREATE VIRTUAL TABLE IF NOT EXISTS governance_fts USING fts5(
    heading, body, doc_type,
    content='governance_docs', content_rowid='id',
    tokenize='porter unicode61'
);
";

const FTS_TRIGGERS: &str = "
CREATE TRIGGER IF NOT EXISTS governance_docs_ai AFTER INSERT ON governance_docs BEGIN
    INSERT INTO governance_fts(rowid, heading, body, doc_type)
    VALUES (new.id, new.heading, new.body, new.doc_type);
END;

CREATE TRIGGER IF NOT EXISTS governance_docs_ad AFTER DELETE ON governance_docs BEGIN
    INSERT INTO governance_fts(governance_fts, rowid, heading, body, doc_type)
    VALUES ('delete', old.id, old.heading, old.body, old.doc_type);
END;

CREATE TRIGGER IF NOT EXISTS governance_docs_au AFTER UPDATE ON governance_docs BEGIN
    INSERT INTO governance_fts(governance_fts, rowid, heading, body, doc_type)
    VALUES ('delete', old.id, old.heading, old.body, old.doc_type);
    INSERT INTO governance_fts(rowid, heading, body, doc_type)
    VALUES (new.id, new.heading, new.body, new.doc_type);
END;
";

const GOVERNANCE_MIGRATIONS: MigrationSet =
    &[&[GOVERNANCE_DOCS_DDL, GOVERNANCE_FTS_DDL, FTS_TRIGGERS]];

/// Directory conventions: (relative dir, recursive, doc_type).
const DOC_DIRS: &[(&str, bool, DocType)] = &[
    (".claude/rules", false, DocType::Rule),
    ("docs/decisions", false, DocType::Adr),
    (".claude/templates", false, DocType::Template),
    (".claude/skills", true, DocType::Skill),
    (".claude/agents", false, DocType::Agent),
    ("docs/architecture", false, DocType::Architecture),
];

/// Basenames indexed project-wide as doc_type=project.
const PROJECT_DOC_NAMES: &[&str] = &["CLAUDE.md", "README.md"];

/// Directories never crawled for project docs.
const SKIP_DIRS: &[&str] = &[
    "node_modules",
    ".git",
    ".venv",
    "venv",
    "__pycache__",
    "dist",
    "build",
    ".next",
    "out",
    "target",
    "vendor",
    "coverage",
    ".cache",
    ".worktrees",
];

/// Outcome of one indexing run.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct IndexReport {
    pub files_indexed: usize,
    pub files_skipped: usize,
    pub files_removed: usize,
    pub chunks_indexed: usize,
}

/// One markdown chunk prior to insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub heading: String,
    pub body: String,
}

/// Split markdown into chunks at `## ` heading lines.
///
/// Content before the first heading becomes chunk 0 with the fallback
/// heading (the file name). Headings with empty bodies are dropped.
pub fn chunk_markdown(text: &str, fallback_heading: &str) -> Vec<Chunk> {
    if text.trim().is_empty() {
        return vec![];
    }

    let mut chunks: Vec<Chunk> = Vec::new();
    let mut heading = fallback_heading.to_string();
    let mut body_lines: Vec<&str> = Vec::new();

    let mut flush = |heading: &str, body_lines: &mut Vec<&str>, chunks: &mut Vec<Chunk>| {
        let body = body_lines.join("\n").trim().to_string();
        if !body.is_empty() {
            chunks.push(Chunk {
                heading: heading.to_string(),
                body,
            });
        }
        body_lines.clear();
    };

    for line in text.lines() {
        if let Some(rest) = line.strip_prefix("## ") {
            flush(&heading, &mut body_lines, &mut chunks);
            heading = rest.trim().to_string();
        } else {
            body_lines.push(line);
        }
    }
    flush(&heading, &mut body_lines, &mut chunks);

    chunks
}

/// The governance index.
pub struct GovernanceIndex {
    db: Database,
}

impl GovernanceIndex {
    pub async fn open(path: &Path) -> Result<Self, AmbryError> {
        let db = Database::open(path, GOVERNANCE_MIGRATIONS).await?;
        Ok(Self { db })
    }

    pub async fn open_in_memory() -> Result<Self, AmbryError> {
        let db = Database::open_in_memory(GOVERNANCE_MIGRATIONS).await?;
        Ok(Self { db })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Index new and changed governance files under `project_root`, removing
    /// rows for files that no longer exist on disk.
    ///
    /// Re-running with no file changes performs zero write transactions.
    pub async fn index_project(&self, project_root: &Path) -> Result<IndexReport, AmbryError> {
        let found = collect_governance_files(project_root);
        let mut report = IndexReport::default();

        let root_prefix = format!("{}%", project_root.display());
        let existing: HashMap<String, String> = self
            .db
            .connection()
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT DISTINCT file_path, content_hash FROM governance_docs
                     WHERE file_path LIKE ?1",
                )?;
                let rows = stmt.query_map(params![root_prefix], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })?;
                let mut map = HashMap::new();
                for row in rows {
                    let (path, hash) = row?;
                    map.insert(path, hash);
                }
                Ok(map)
            })
            .await
            .map_err(ambry_core::AmbryError::storage)?;

        for (path, doc_type) in &found {
            let path_str = path.display().to_string();
            let content = match std::fs::read_to_string(path) {
                Ok(content) => content,
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "skipping unreadable file");
                    continue;
                }
            };
            let new_hash = fsutil::sha256_hex(content.as_bytes());

            if existing.get(&path_str) == Some(&new_hash) {
                report.files_skipped += 1;
                continue;
            }

            let fallback = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let chunks = chunk_markdown(&content, &fallback);
            let chunk_count = chunks.len();
            let doc_type = *doc_type;
            let tx_path = path_str.clone();

            // One transaction per file: replace is all-or-nothing.
            self.db
                .tx(move |tx| {
                    tx.execute(
                        "DELETE FROM governance_docs WHERE file_path = ?1",
                        params![tx_path],
                    )?;
                    for (idx, chunk) in chunks.iter().enumerate() {
                        tx.execute(
                            "INSERT INTO governance_docs
                                 (file_path, chunk_index, heading, body, doc_type, content_hash)
                             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                            params![
                                tx_path,
                                idx as i64,
                                chunk.heading,
                                chunk.body,
                                doc_type.to_string(),
                                new_hash,
                            ],
                        )?;
                    }
                    Ok(())
                })
                .await?;

            report.files_indexed += 1;
            report.chunks_indexed += chunk_count;
        }

        // Remove rows for files gone from disk.
        let found_paths: std::collections::HashSet<String> =
            found.iter().map(|(p, _)| p.display().to_string()).collect();
        for stale_path in existing.keys().filter(|p| !found_paths.contains(*p)) {
            let stale = stale_path.clone();
            self.db
                .tx(move |tx| {
                    tx.execute(
                        "DELETE FROM governance_docs WHERE file_path = ?1",
                        params![stale],
                    )?;
                    Ok(())
                })
                .await?;
            report.files_removed += 1;
        }

        info!(
            indexed = report.files_indexed,
            skipped = report.files_skipped,
            removed = report.files_removed,
            chunks = report.chunks_indexed,
            "governance index refreshed"
        );
        Ok(report)
    }

    /// BM25-ranked chunk search with a bounded score in (0, 1].
    ///
    /// Ties on score break toward the most recently re-indexed chunk.
    pub async fn search(
        &self,
        query: &str,
        doc_type: Option<DocType>,
        top_k: usize,
    ) -> Result<Vec<SearchResult>, AmbryError> {
        let match_expr = fts_quote(query);
        if match_expr.is_empty() {
            return Ok(vec![]);
        }

        self.db
            .connection()
            .call(move |conn| {
                let mut clauses = vec!["governance_fts MATCH ?1".to_string()];
                let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = vec![Box::new(match_expr)];

                if let Some(dt) = doc_type {
                    params.push(Box::new(dt.to_string()));
                    clauses.push(format!("g.doc_type = ?{}", params.len()));
                }
                params.push(Box::new(top_k as i64));
                let limit_idx = params.len();

                let sql = format!(
                    "SELECT g.file_path, g.heading, g.body, g.doc_type, g.chunk_index,
                            bm25(governance_fts) AS raw_score
                     FROM governance_docs g
                     JOIN governance_fts ON governance_fts.rowid = g.id
                     WHERE {}
                     ORDER BY raw_score ASC, g.indexed_at DESC
                     LIMIT ?{limit_idx}",
                    clauses.join(" AND ")
                );

                let mut stmt = conn.prepare(&sql)?;
                let refs: Vec<&dyn rusqlite::types::ToSql> =
                    params.iter().map(|p| p.as_ref()).collect();
                let rows = stmt.query_map(refs.as_slice(), |row| {
                    let raw: f64 = row.get("raw_score")?;
                    let doc_type: String = row.get("doc_type")?;
                    Ok(SearchResult {
                        file_path: row.get("file_path")?,
                        // bm25() emits negative-is-better raw scores; fold
                        // them monotonically into (0, 1].
                        score: 1.0 / (1.0 + raw.abs()),
                        rank: 0,
                        excerpt: row.get("body")?,
                        corpus: Corpus::Governance,
                        heading: Some(row.get("heading")?),
                        doc_type: doc_type.parse().ok(),
                        chunk_index: Some(row.get("chunk_index")?),
                        line_start: None,
                        line_end: None,
                    })
                })?;

                let mut results: Vec<SearchResult> = rows.collect::<Result<Vec<_>, _>>()?;
                for (i, r) in results.iter_mut().enumerate() {
                    r.rank = i + 1;
                }
                Ok(results)
            })
            .await
            .map_err(AmbryError::storage)
    }

    /// Distinct indexed files with their doc types.
    pub async fn list_documents(&self) -> Result<Vec<(String, String)>, AmbryError> {
        self.db
            .connection()
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT DISTINCT file_path, doc_type FROM governance_docs
                     ORDER BY file_path",
                )?;
                let rows = stmt.query_map([], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })
            .await
            .map_err(AmbryError::storage)
    }

    /// Document/chunk counts with a doc-type breakdown.
    pub async fn stats(&self) -> Result<serde_json::Value, AmbryError> {
        self.db
            .connection()
            .call(|conn| {
                let total_files: i64 = conn.query_row(
                    "SELECT COUNT(DISTINCT file_path) FROM governance_docs",
                    [],
                    |r| r.get(0),
                )?;
                let total_chunks: i64 =
                    conn.query_row("SELECT COUNT(*) FROM governance_docs", [], |r| r.get(0))?;
                let mut stmt = conn.prepare(
                    "SELECT doc_type, COUNT(DISTINCT file_path) FROM governance_docs
                     GROUP BY doc_type",
                )?;
                let mut by_type = serde_json::Map::new();
                let rows = stmt.query_map([], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                })?;
                for row in rows {
                    let (t, n) = row?;
                    by_type.insert(t, n.into());
                }
                Ok(serde_json::json!({
                    "total_files": total_files,
                    "total_chunks": total_chunks,
                    "by_doc_type": by_type,
                }))
            })
            .await
            .map_err(AmbryError::storage)
    }
}

/// Enumerate governance files for a project by directory convention.
fn collect_governance_files(project_root: &Path) -> Vec<(PathBuf, DocType)> {
    let mut found: Vec<(PathBuf, DocType)> = Vec::new();

    for (dir, recursive, doc_type) in DOC_DIRS {
        let base = project_root.join(dir);
        if !base.is_dir() {
            continue;
        }
        let max_depth = if *recursive { None } else { Some(1) };
        let mut walker = WalkBuilder::new(&base);
        walker.standard_filters(false).follow_links(false);
        if let Some(depth) = max_depth {
            walker.max_depth(Some(depth));
        }
        for entry in walker.build().flatten() {
            let path = entry.path();
            if path.is_file() && path.extension().is_some_and(|e| e == "md") {
                found.push((path.to_path_buf(), *doc_type));
            }
        }
    }

    // Project-wide CLAUDE.md / README.md, skipping vendor and build trees.
    let walker = WalkBuilder::new(project_root)
        .standard_filters(false)
        .follow_links(false)
        .filter_entry(|entry| {
            let name = entry.file_name().to_string_lossy();
            !(entry.path().is_dir() && SKIP_DIRS.contains(&name.as_ref()))
        })
        .build();
    for entry in walker.flatten() {
        let path = entry.path();
        if path.is_file()
            && path
                .file_name()
                .is_some_and(|n| PROJECT_DOC_NAMES.contains(&n.to_string_lossy().as_ref()))
        {
            found.push((path.to_path_buf(), DocType::Project));
        }
    }

    // Stable sort by path; a file matched by both a directory convention
    // and the project walk keeps its convention doc_type.
    found.sort_by(|a, b| a.0.cmp(&b.0));
    found.dedup_by(|a, b| a.0 == b.0);
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn chunking_splits_on_h2_headings() {
        let text = "Intro paragraph.\n\n## Setup\nInstall things.\n\n## Usage\nRun it.\n";
        let chunks = chunk_markdown(text, "guide.md");
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].heading, "guide.md");
        assert_eq!(chunks[0].body, "Intro paragraph.");
        assert_eq!(chunks[1].heading, "Setup");
        assert_eq!(chunks[2].heading, "Usage");
        assert_eq!(chunks[2].body, "Run it.");
    }

    #[test]
    fn chunking_drops_empty_sections() {
        let chunks = chunk_markdown("## Empty\n\n## Full\ncontent\n", "x.md");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].heading, "Full");
    }

    #[test]
    fn chunking_empty_file_is_empty() {
        assert!(chunk_markdown("", "x.md").is_empty());
        assert!(chunk_markdown("   \n  ", "x.md").is_empty());
    }

    #[tokio::test]
    async fn index_search_roundtrip() {
        let dir = tempdir().unwrap();
        write(
            dir.path(),
            ".claude/rules/error-handling.md",
            "# Error handling\n\n## Convention\nAlways propagate errors with typed kinds.\n",
        );

        let index = GovernanceIndex::open_in_memory().await.unwrap();
        let report = index.index_project(dir.path()).await.unwrap();
        assert_eq!(report.files_indexed, 1);
        assert!(report.chunks_indexed >= 1);

        let hits = index
            .search("propagate errors", Some(DocType::Rule), 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].score > 0.0 && hits[0].score <= 1.0);
        assert_eq!(hits[0].corpus, Corpus::Governance);
    }

    #[tokio::test]
    async fn unchanged_reindex_skips_all_files() {
        let dir = tempdir().unwrap();
        write(dir.path(), ".claude/rules/a.md", "## A\nbody a\n");
        write(dir.path(), "docs/decisions/b.md", "## B\nbody b\n");

        let index = GovernanceIndex::open_in_memory().await.unwrap();
        index.index_project(dir.path()).await.unwrap();
        let second = index.index_project(dir.path()).await.unwrap();
        assert_eq!(second.files_indexed, 0);
        assert_eq!(second.files_skipped, 2);
        assert_eq!(second.files_removed, 0);
    }

    #[tokio::test]
    async fn changed_file_replaces_all_its_chunks() {
        let dir = tempdir().unwrap();
        write(dir.path(), ".claude/rules/a.md", "## One\nfirst\n## Two\nsecond\n");

        let index = GovernanceIndex::open_in_memory().await.unwrap();
        index.index_project(dir.path()).await.unwrap();

        write(dir.path(), ".claude/rules/a.md", "## Only\nreplacement body\n");
        let report = index.index_project(dir.path()).await.unwrap();
        assert_eq!(report.files_indexed, 1);

        let hits = index.search("first", None, 10).await.unwrap();
        assert!(hits.is_empty(), "old chunks must be gone");
        let hits = index.search("replacement", None, 10).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn deleted_files_are_removed_from_index() {
        let dir = tempdir().unwrap();
        write(dir.path(), ".claude/rules/a.md", "## A\nkeep me\n");
        write(dir.path(), ".claude/rules/b.md", "## B\ndelete me\n");

        let index = GovernanceIndex::open_in_memory().await.unwrap();
        index.index_project(dir.path()).await.unwrap();

        std::fs::remove_file(dir.path().join(".claude/rules/b.md")).unwrap();
        let report = index.index_project(dir.path()).await.unwrap();
        assert_eq!(report.files_removed, 1);

        let hits = index.search("delete", None, 10).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn skill_docs_are_found_recursively() {
        let dir = tempdir().unwrap();
        write(
            dir.path(),
            ".claude/skills/deploy/prompt.md",
            "## Deploy\nrun the deploy checklist\n",
        );

        let index = GovernanceIndex::open_in_memory().await.unwrap();
        index.index_project(dir.path()).await.unwrap();
        let hits = index.search("deploy checklist", None, 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].doc_type, Some(DocType::Skill));
    }

    #[tokio::test]
    async fn vendor_dirs_are_not_crawled_for_project_docs() {
        let dir = tempdir().unwrap();
        write(dir.path(), "README.md", "## Project\nthe real readme\n");
        write(
            dir.path(),
            "node_modules/dep/README.md",
            "## Dep\nvendored readme\n",
        );

        let index = GovernanceIndex::open_in_memory().await.unwrap();
        index.index_project(dir.path()).await.unwrap();
        let docs = index.list_documents().await.unwrap();
        assert_eq!(docs.len(), 1);
        assert!(docs[0].0.ends_with("README.md"));
        assert!(!docs[0].0.contains("node_modules"));
    }

    #[tokio::test]
    async fn search_is_case_insensitive() {
        let dir = tempdir().unwrap();
        write(dir.path(), ".claude/rules/naming.md", "## Naming\nUse Snake Case.\n");

        let index = GovernanceIndex::open_in_memory().await.unwrap();
        index.index_project(dir.path()).await.unwrap();
        let hits = index.search("SNAKE case", None, 10).await.unwrap();
        assert_eq!(hits.len(), 1);
    }
}
