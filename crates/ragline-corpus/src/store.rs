use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use ragline_llm::LlmProvider;

use crate::error::CorpusError;
use crate::scope::{IdScope, VectorFilter};
use crate::types::{Candidate, DocumentNode};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredId {
    pub id: String,
    pub score: f32,
}

/// Search and fetch operations over the stored chunk corpus.
pub trait CorpusStore: Send + Sync {
    /// Nearest-neighbour search; returns ids with similarity scores, best first.
    fn vector_search(
        &self,
        vector: Vec<f32>,
        limit: usize,
        filter: Option<VectorFilter>,
    ) -> BoxFuture<'_, Result<Vec<ScoredId>, CorpusError>>;

    /// Full-text search for any of `keywords`, optionally restricted to `scope`.
    fn keyword_search(
        &self,
        keywords: Vec<String>,
        limit: usize,
        scope: Option<IdScope>,
    ) -> BoxFuture<'_, Result<Vec<Candidate>, CorpusError>>;

    /// Fetch chunks by id, in request order; unknown ids are skipped.
    fn get_by_ids(&self, ids: Vec<String>) -> BoxFuture<'_, Result<Vec<DocumentNode>, CorpusError>>;

    /// Fetch every chunk in the corpus.
    fn get_all(&self) -> BoxFuture<'_, Result<Vec<DocumentNode>, CorpusError>>;
}

/// Turns query text into a vector comparable with the stored chunk embeddings.
///
/// Implementations backed by local inference must run the model on a blocking
/// worker thread rather than on the async executor.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> BoxFuture<'_, Result<Vec<f32>, CorpusError>>;
}

/// Embeds through an [`LlmProvider`]'s embedding endpoint.
#[derive(Debug)]
pub struct ProviderEmbedder<P> {
    provider: Arc<P>,
}

impl<P> Clone for ProviderEmbedder<P> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
        }
    }
}

impl<P: LlmProvider> ProviderEmbedder<P> {
    #[must_use]
    pub fn new(provider: Arc<P>) -> Self {
        Self { provider }
    }
}

impl<P: LlmProvider> Embedder for ProviderEmbedder<P> {
    fn embed(&self, text: &str) -> BoxFuture<'_, Result<Vec<f32>, CorpusError>> {
        let text = text.to_owned();
        Box::pin(async move {
            let vector = self.provider.embed(&text).await?;
            if vector.is_empty() {
                return Err(CorpusError::Embedding(format!(
                    "{} returned an empty embedding",
                    self.provider.name()
                )));
            }
            Ok(vector)
        })
    }
}
