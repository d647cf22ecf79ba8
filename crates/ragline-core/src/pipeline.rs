//! End-to-end context assembly for one chat turn.

use std::sync::Arc;
use std::time::Duration;

use ragline_corpus::{
    AccessScope, Candidate, CorpusError, CorpusStore, DocumentNode, Embedder, HistoryStore,
};
use ragline_llm::LlmProvider;
use ragline_models::{RerankService, RerankedCandidate};
use ragline_retrieval::{
    CandidateRetriever, ContextBundle, HierarchicalMerger, MergedRecord, ProcessedQuery,
    QueryDecomposer, render_context,
};

use crate::config::Config;
use crate::error::{PipelineError, Result};

/// Output of [`ContextPipeline::assemble`].
#[derive(Debug, Clone)]
pub struct AssembledContext {
    pub processed: ProcessedQuery,
    /// Relevance-filtered retrieval result, before merging and reranking.
    pub bundle: ContextBundle,
    /// Documents in final context order. Scores are cross-encoder scores when
    /// reranking ran.
    pub ranked: Vec<Candidate>,
    pub context: String,
}

impl AssembledContext {
    /// Ids of every document retrieval surfaced for this turn.
    #[must_use]
    pub fn source_document_ids(&self) -> Vec<String> {
        self.bundle.source_document_ids()
    }
}

pub struct ContextPipeline<P> {
    decomposer: QueryDecomposer<P>,
    retriever: CandidateRetriever<P>,
    merger: HierarchicalMerger,
    merge_enabled: bool,
    reranker: Option<Arc<RerankService>>,
    corpus: Arc<dyn CorpusStore>,
    history: Arc<dyn HistoryStore>,
    history_limit: usize,
    separator: String,
    search_timeout: Duration,
}

impl<P> std::fmt::Debug for ContextPipeline<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextPipeline")
            .field("merge_enabled", &self.merge_enabled)
            .field("rerank", &self.reranker.is_some())
            .field("history_limit", &self.history_limit)
            .finish_non_exhaustive()
    }
}

impl<P: LlmProvider + 'static> ContextPipeline<P> {
    /// # Errors
    ///
    /// Returns `PipelineError::Config` if `config` fails validation.
    pub fn new(
        config: &Config,
        provider: Arc<P>,
        corpus: Arc<dyn CorpusStore>,
        embedder: Arc<dyn Embedder>,
        history: Arc<dyn HistoryStore>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            decomposer: QueryDecomposer::new(Arc::clone(&provider), config.decomposer_config()),
            retriever: CandidateRetriever::new(
                provider,
                Arc::clone(&corpus),
                embedder,
                config.retrieval_config(),
            ),
            merger: HierarchicalMerger::new(config.merge_config()),
            merge_enabled: config.merge.enabled,
            reranker: None,
            corpus,
            history,
            history_limit: config.query.history_limit,
            separator: config.retrieval.document_separator.clone(),
            search_timeout: Duration::from_secs(config.timeouts.search_seconds),
        })
    }

    #[must_use]
    pub fn with_reranker(mut self, reranker: Arc<RerankService>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    #[must_use]
    pub fn reranker(&self) -> Option<&Arc<RerankService>> {
        self.reranker.as_ref()
    }

    /// Fetch the session history and decompose `query` against it.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::History` if the history store fails or times out.
    pub async fn analyze_query(
        &self,
        query: &str,
        user_id: &str,
        session_id: &str,
    ) -> Result<ProcessedQuery> {
        let load = self
            .history
            .load_history(user_id, session_id, self.history_limit);
        let history = match tokio::time::timeout(self.search_timeout, load).await {
            Ok(Ok(history)) => history,
            Ok(Err(e)) => return Err(PipelineError::History(e)),
            Err(_) => return Err(PipelineError::History(CorpusError::Timeout(self.search_timeout))),
        };
        Ok(self.decomposer.analyze(query, &history).await)
    }

    pub async fn retrieve_context(
        &self,
        pq: &ProcessedQuery,
        scope: Option<&AccessScope>,
    ) -> ContextBundle {
        self.retriever.retrieve(pq, scope).await
    }

    #[must_use]
    pub fn merge_hierarchy(
        &self,
        leaves: &[DocumentNode],
        all_nodes: &[DocumentNode],
    ) -> Vec<MergedRecord> {
        self.merger.merge(leaves, all_nodes)
    }

    /// # Errors
    ///
    /// Returns `PipelineError::RerankDisabled` when no reranker is attached, or
    /// the reranker's model error.
    pub async fn rerank(
        &self,
        query: &str,
        records: Vec<Candidate>,
        model: Option<&str>,
    ) -> Result<Vec<RerankedCandidate>> {
        let reranker = self.reranker.as_ref().ok_or(PipelineError::RerankDisabled)?;
        Ok(reranker.rerank(query, records, model, None).await?)
    }

    /// Decompose, retrieve, then merge and rerank when enabled, and render the
    /// final context string.
    ///
    /// # Errors
    ///
    /// Returns an error if history loading or reranking fails. Agent and search
    /// failures only shrink the result.
    #[tracing::instrument(skip_all, fields(user_id = %user_id, session_id = %session_id))]
    pub async fn assemble(
        &self,
        query: &str,
        user_id: &str,
        session_id: &str,
        scope: Option<&AccessScope>,
    ) -> Result<AssembledContext> {
        let processed = self.analyze_query(query, user_id, session_id).await?;
        let bundle = self.retrieve_context(&processed, scope).await;

        let mut ranked: Vec<Candidate> = bundle.source_documents.iter().cloned().collect();
        if self.merge_enabled && !ranked.is_empty() {
            ranked = self.merge_retrieved(ranked).await;
        }
        if self.reranker.is_some() && !ranked.is_empty() {
            ranked = self
                .rerank(&processed.original_query, ranked, None)
                .await?
                .into_iter()
                .map(|r| r.candidate.with_score(r.score))
                .collect();
        }

        let context = render_context(ranked.iter().map(|c| c.text.as_str()), &self.separator);
        tracing::info!(
            sub_queries = processed.sub_queries.len(),
            retrieved = bundle.source_documents.len(),
            documents = ranked.len(),
            "context assembled"
        );
        Ok(AssembledContext {
            processed,
            bundle,
            ranked,
            context,
        })
    }

    async fn merge_retrieved(&self, documents: Vec<Candidate>) -> Vec<Candidate> {
        let all = match tokio::time::timeout(self.search_timeout, self.corpus.get_all()).await {
            Ok(Ok(all)) => all,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "corpus fetch for merging failed, keeping leaves");
                return documents;
            }
            Err(_) => {
                tracing::warn!(limit = ?self.search_timeout, "corpus fetch for merging timed out, keeping leaves");
                return documents;
            }
        };
        let leaves: Vec<DocumentNode> = documents.into_iter().map(DocumentNode::from).collect();
        self.merge_hierarchy(&leaves, &all)
            .into_iter()
            .map(MergedRecord::into_candidate)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use ragline_corpus::{InMemoryCorpus, InMemoryHistory, ProviderEmbedder};
    use ragline_llm::mock::MockProvider;

    use super::*;
    use crate::config::ConfigError;

    struct BrokenHistory;

    impl HistoryStore for BrokenHistory {
        fn load_history(
            &self,
            _user_id: &str,
            _session_id: &str,
            _limit: usize,
        ) -> ragline_corpus::store::BoxFuture<'_, std::result::Result<Vec<ragline_llm::Message>, CorpusError>>
        {
            Box::pin(async { Err(CorpusError::History("database offline".into())) })
        }
    }

    fn pipeline(config: &Config, history: Arc<dyn HistoryStore>) -> Result<ContextPipeline<MockProvider>> {
        let provider = Arc::new(MockProvider::default().with_embedding(vec![1.0]));
        let embedder = Arc::new(ProviderEmbedder::new(Arc::clone(&provider)));
        ContextPipeline::new(
            config,
            provider,
            Arc::new(InMemoryCorpus::new()),
            embedder,
            history,
        )
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = Config::default();
        config.merge.child_ratio = 0.0;
        let err = pipeline(&config, Arc::new(InMemoryHistory::new())).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Config(ConfigError::Ratio { .. })
        ));
    }

    #[tokio::test]
    async fn history_failure_is_fatal() {
        let p = pipeline(&Config::default(), Arc::new(BrokenHistory)).unwrap();
        let err = p.analyze_query("q", "u", "s").await.unwrap_err();
        assert!(matches!(err, PipelineError::History(_)));
        let err = p.assemble("q", "u", "s", None).await.unwrap_err();
        assert!(matches!(err, PipelineError::History(_)));
    }

    #[tokio::test]
    async fn rerank_without_service_is_an_error() {
        let p = pipeline(&Config::default(), Arc::new(InMemoryHistory::new())).unwrap();
        let err = p
            .rerank("q", vec![Candidate::new("a", "text")], None)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::RerankDisabled));
    }

    #[tokio::test]
    async fn empty_corpus_assembles_empty_context() {
        let p = pipeline(&Config::default(), Arc::new(InMemoryHistory::new())).unwrap();
        let out = p.assemble("anything", "u", "s", None).await.unwrap();
        assert!(out.ranked.is_empty());
        assert!(out.context.is_empty());
        assert!(out.source_document_ids().is_empty());
        assert_eq!(out.processed.original_query, "anything");
    }
}
