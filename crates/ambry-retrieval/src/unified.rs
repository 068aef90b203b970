// SPDX-FileCopyrightText: 2026 Ambry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Unified retriever: classify, fan out, merge.
//!
//! Both corpora sit behind [`CorpusSearch`]; a new corpus is added by
//! implementing that contract and plugging it in. Hybrid queries run both
//! backends concurrently under a parent deadline and merge by score with a
//! per-corpus floor so one noisy backend cannot crowd the other out.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::warn;

use ambry_core::AmbryError;

use crate::classify::{classify_query, QueryRoute};
use crate::code::CodeSearchClient;
use crate::governance::GovernanceIndex;
use crate::models::{Corpus, RetrievalResponse, SearchResult};

/// Parent deadline for hybrid fan-out; slower backends are abandoned.
const FAN_OUT_DEADLINE: Duration = Duration::from_secs(10);

/// The common query contract both corpora implement.
#[async_trait]
pub trait CorpusSearch: Send + Sync {
    fn corpus(&self) -> Corpus;
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchResult>, AmbryError>;
}

#[async_trait]
impl CorpusSearch for GovernanceIndex {
    fn corpus(&self) -> Corpus {
        Corpus::Governance
    }

    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchResult>, AmbryError> {
        GovernanceIndex::search(self, query, None, top_k).await
    }
}

#[async_trait]
impl CorpusSearch for CodeSearchClient {
    fn corpus(&self) -> Corpus {
        Corpus::Code
    }

    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchResult>, AmbryError> {
        CodeSearchClient::search(self, query, top_k).await
    }
}

/// Router over the two corpus backends.
///
/// A backend disabled by configuration is simply absent here.
pub struct UnifiedRetriever {
    code: Option<Arc<dyn CorpusSearch>>,
    governance: Option<Arc<dyn CorpusSearch>>,
}

impl UnifiedRetriever {
    pub fn new(
        code: Option<Arc<dyn CorpusSearch>>,
        governance: Option<Arc<dyn CorpusSearch>>,
    ) -> Self {
        Self { code, governance }
    }

    /// Route a query to one corpus or fan out to both.
    ///
    /// An explicit route overrides classification. Single-corpus requests
    /// propagate `BackendUnavailable`; hybrid requests degrade to whichever
    /// backend answered.
    pub async fn retrieve(
        &self,
        query: &str,
        route: Option<QueryRoute>,
        top_k: usize,
    ) -> Result<RetrievalResponse, AmbryError> {
        let started = Instant::now();
        let route = route.unwrap_or_else(|| classify_query(query));

        let mut response = match route {
            QueryRoute::Code => {
                let results = self.search_one(&self.code, Corpus::Code, query, top_k).await?;
                RetrievalResponse {
                    results,
                    query_time_ms: 0.0,
                    degraded: vec![],
                }
            }
            QueryRoute::Governance => {
                let results = self
                    .search_one(&self.governance, Corpus::Governance, query, top_k)
                    .await?;
                RetrievalResponse {
                    results,
                    query_time_ms: 0.0,
                    degraded: vec![],
                }
            }
            QueryRoute::Hybrid => self.hybrid(query, top_k).await,
        };

        response.query_time_ms = started.elapsed().as_secs_f64() * 1000.0;
        Ok(response)
    }

    async fn search_one(
        &self,
        backend: &Option<Arc<dyn CorpusSearch>>,
        corpus: Corpus,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<SearchResult>, AmbryError> {
        let Some(backend) = backend else {
            return Err(AmbryError::BackendUnavailable(format!(
                "{corpus} backend is disabled"
            )));
        };
        match tokio::time::timeout(FAN_OUT_DEADLINE, backend.search(query, top_k)).await {
            Ok(result) => result,
            Err(_) => Err(AmbryError::Timeout {
                duration: FAN_OUT_DEADLINE,
            }),
        }
    }

    /// Fan out to both backends; an unavailable one degrades, not fails.
    async fn hybrid(&self, query: &str, top_k: usize) -> RetrievalResponse {
        let code_fut = self.search_one(&self.code, Corpus::Code, query, top_k);
        let gov_fut = self.search_one(&self.governance, Corpus::Governance, query, top_k);
        let (code_result, gov_result) = tokio::join!(code_fut, gov_fut);

        let mut degraded = Vec::new();
        let code_results = match code_result {
            Ok(results) => results,
            Err(e) => {
                warn!(error = %e, "code backend degraded during hybrid search");
                degraded.push(Corpus::Code.to_string());
                vec![]
            }
        };
        let gov_results = match gov_result {
            Ok(results) => results,
            Err(e) => {
                warn!(error = %e, "governance backend degraded during hybrid search");
                degraded.push(Corpus::Governance.to_string());
                vec![]
            }
        };

        RetrievalResponse {
            results: merge_with_floor(code_results, gov_results, top_k),
            query_time_ms: 0.0,
            degraded,
        }
    }
}

/// Merge two ranked lists so each corpus contributes up to ⌈top_k/2⌉ results
/// before the higher-scoring tail pads the remainder.
pub fn merge_with_floor(
    mut code: Vec<SearchResult>,
    mut governance: Vec<SearchResult>,
    top_k: usize,
) -> Vec<SearchResult> {
    let by_score_desc =
        |a: &SearchResult, b: &SearchResult| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal);
    code.sort_by(by_score_desc);
    governance.sort_by(by_score_desc);

    let floor = top_k.div_ceil(2);
    let code_take = code.len().min(floor);
    let gov_take = governance.len().min(floor);

    let mut tail: Vec<SearchResult> = code.split_off(code_take);
    tail.extend(governance.split_off(gov_take));
    tail.sort_by(by_score_desc);

    let mut selected = code;
    selected.extend(governance);
    for result in tail {
        if selected.len() >= top_k {
            break;
        }
        selected.push(result);
    }

    selected.sort_by(by_score_desc);
    selected.truncate(top_k);
    for (i, r) in selected.iter_mut().enumerate() {
        r.rank = i + 1;
    }
    selected
}
