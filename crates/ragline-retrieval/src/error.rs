//! Error types for ragline-retrieval.

use std::time::Duration;

/// Errors raised inside a retrieval branch. None of them escape
/// [`crate::retriever::CandidateRetriever::retrieve`]; they are logged and the
/// branch contributes no candidates.
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    /// Corpus search or lookup failed.
    #[error("corpus error: {0}")]
    Corpus(#[from] ragline_corpus::CorpusError),

    /// Agent call failed.
    #[error("LLM error: {0}")]
    Llm(#[from] ragline_llm::LlmError),

    /// An external call exceeded its deadline.
    #[error("{operation} timed out after {limit:?}")]
    Timeout {
        operation: &'static str,
        limit: Duration,
    },
}

/// Result type alias using `RetrievalError`.
pub type Result<T> = std::result::Result<T, RetrievalError>;

/// Await `fut` for at most `limit`.
pub(crate) async fn bounded<T, E, F>(operation: &'static str, limit: Duration, fut: F) -> Result<T>
where
    F: std::future::Future<Output = std::result::Result<T, E>>,
    RetrievalError: From<E>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(RetrievalError::from),
        Err(_) => Err(RetrievalError::Timeout { operation, limit }),
    }
}
