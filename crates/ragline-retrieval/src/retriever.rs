use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;

use ragline_corpus::{AccessScope, Candidate, CorpusStore, Embedder};
use ragline_llm::LlmProvider;
use tokio::task::JoinSet;

use crate::agent::{self, RelevanceResult};
use crate::bundle::{ContextBundle, DEFAULT_SEPARATOR, SourceDocuments};
use crate::error::{Result, bounded};
use crate::query::ProcessedQuery;

#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    pub vector_top_k: usize,
    pub keyword_limit: usize,
    pub document_separator: String,
    pub agent_timeout: Duration,
    pub search_timeout: Duration,
    pub embedding_timeout: Duration,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            vector_top_k: 5,
            keyword_limit: 10,
            document_separator: DEFAULT_SEPARATOR.into(),
            agent_timeout: Duration::from_secs(30),
            search_timeout: Duration::from_secs(10),
            embedding_timeout: Duration::from_secs(30),
        }
    }
}

/// Fans a [`ProcessedQuery`] out into per-sub-query searches and folds the
/// relevance-filtered hits into one [`ContextBundle`].
pub struct CandidateRetriever<P> {
    provider: Arc<P>,
    corpus: Arc<dyn CorpusStore>,
    embedder: Arc<dyn Embedder>,
    config: Arc<RetrievalConfig>,
}

impl<P> Clone for CandidateRetriever<P> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
            corpus: Arc::clone(&self.corpus),
            embedder: Arc::clone(&self.embedder),
            config: Arc::clone(&self.config),
        }
    }
}

impl<P> std::fmt::Debug for CandidateRetriever<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CandidateRetriever")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<P: LlmProvider + 'static> CandidateRetriever<P> {
    #[must_use]
    pub fn new(
        provider: Arc<P>,
        corpus: Arc<dyn CorpusStore>,
        embedder: Arc<dyn Embedder>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            provider,
            corpus,
            embedder,
            config: Arc::new(config),
        }
    }

    /// Search every distinct `(query, keywords)` pair concurrently and fold the
    /// results, first sub-query first, into a deduplicated bundle.
    ///
    /// A sub-query task that panics contributes nothing; its siblings still run
    /// to completion.
    #[tracing::instrument(skip_all, fields(pairs = tracing::field::Empty, scoped = scope.is_some()))]
    pub async fn retrieve(&self, pq: &ProcessedQuery, scope: Option<&AccessScope>) -> ContextBundle {
        let pairs = pq.distinct_pairs();
        tracing::Span::current().record("pairs", pairs.len());

        let mut tasks = JoinSet::new();
        for (idx, pair) in pairs.iter().enumerate() {
            let this = self.clone();
            let query = pair.query.clone();
            let keywords = pair.keywords.clone();
            let scope = scope.cloned();
            tasks.spawn(async move {
                let hits = this.search_and_validate(&query, &keywords, scope.as_ref()).await;
                (idx, hits)
            });
        }

        let mut per_task: Vec<Vec<Candidate>> = vec![Vec::new(); pairs.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, hits)) => per_task[idx] = hits,
                Err(e) => tracing::warn!(error = %e, "sub-query task failed"),
            }
        }

        let docs: SourceDocuments = per_task.into_iter().flatten().collect();
        tracing::debug!(documents = docs.len(), "retrieval folded");
        ContextBundle::new(docs, &self.config.document_separator)
    }

    /// Run keyword and vector search for one query, merge the hits and keep the
    /// ones the relevance agent approves.
    ///
    /// A failing search branch counts as zero hits. A failing relevance call
    /// drops every hit.
    #[tracing::instrument(skip_all, fields(query = %query, keywords = keywords.len()))]
    pub async fn search_and_validate(
        &self,
        query: &str,
        keywords: &BTreeSet<String>,
        scope: Option<&AccessScope>,
    ) -> Vec<Candidate> {
        let (keyword_hits, vector_hits) = tokio::join!(
            self.keyword_branch(keywords, scope),
            self.vector_branch(query, scope),
        );
        let keyword_hits = keyword_hits.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "keyword search failed");
            Vec::new()
        });
        let vector_hits = vector_hits.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "vector search failed");
            Vec::new()
        });
        tracing::debug!(
            keyword = keyword_hits.len(),
            vector = vector_hits.len(),
            "search branches done"
        );

        let combined = merge_hits(keyword_hits, vector_hits);
        if combined.is_empty() {
            return Vec::new();
        }

        let verdict = agent::classify_relevance(
            self.provider.as_ref(),
            query,
            &combined,
            self.config.agent_timeout,
        )
        .await;
        if verdict == RelevanceResult::Failed {
            return Vec::new();
        }
        combined.into_iter().filter(|c| verdict.approves(&c.id)).collect()
    }

    async fn keyword_branch(
        &self,
        keywords: &BTreeSet<String>,
        scope: Option<&AccessScope>,
    ) -> Result<Vec<Candidate>> {
        if keywords.is_empty() {
            return Ok(Vec::new());
        }
        bounded(
            "keyword search",
            self.config.search_timeout,
            self.corpus.keyword_search(
                keywords.iter().cloned().collect(),
                self.config.keyword_limit,
                scope.map(AccessScope::id_scope),
            ),
        )
        .await
    }

    async fn vector_branch(&self, query: &str, scope: Option<&AccessScope>) -> Result<Vec<Candidate>> {
        let vector = bounded("embedding", self.config.embedding_timeout, self.embedder.embed(query)).await?;
        let scored = bounded(
            "vector search",
            self.config.search_timeout,
            self.corpus.vector_search(
                vector,
                self.config.vector_top_k,
                scope.map(AccessScope::vector_filter),
            ),
        )
        .await?;
        if scored.is_empty() {
            return Ok(Vec::new());
        }

        let ids = scored.iter().map(|s| s.id.clone()).collect();
        let mut nodes = bounded("chunk lookup", self.config.search_timeout, self.corpus.get_by_ids(ids))
            .await?;
        Ok(scored
            .into_iter()
            .filter_map(|s| {
                let pos = nodes.iter().position(|n| n.id == s.id)?;
                Some(nodes.swap_remove(pos).into_candidate(Some(s.score)))
            })
            .collect())
    }
}

/// Keyword hits first, then vector hits with unseen ids. Unusable candidates are dropped.
fn merge_hits(keyword_hits: Vec<Candidate>, vector_hits: Vec<Candidate>) -> Vec<Candidate> {
    let mut seen = HashSet::new();
    keyword_hits
        .into_iter()
        .chain(vector_hits)
        .filter(|c| c.is_usable() && seen.insert(c.id.clone()))
        .collect()
}
