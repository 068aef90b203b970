// SPDX-FileCopyrightText: 2026 Ambry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Unified retrieval for the ambry daemon.
//!
//! Two corpora sit behind one query contract: the governance index (markdown
//! rules, ADRs, templates, skills indexed into SQLite FTS5) and an external
//! semantic code-search binary. A heuristic classifier routes free-form
//! queries; hybrid queries fan out to both backends and merge by score with
//! a per-corpus floor. New corpora are added by implementing the same
//! search contract, not by subclassing anything.

pub mod classify;
pub mod code;
pub mod embed_cache;
pub mod governance;
pub mod index_state;
pub mod models;
pub mod unified;

pub use classify::{classify_query, QueryRoute};
pub use code::CodeSearchClient;
pub use embed_cache::EmbedCache;
pub use governance::{GovernanceIndex, IndexReport};
pub use models::{Corpus, DocType, IndexStatus, RetrievalResponse, SearchResult};
pub use unified::UnifiedRetriever;
