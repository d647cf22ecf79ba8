use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum CorpusError {
    #[error("search error: {0}")]
    Search(String),

    #[error("lookup error: {0}")]
    Lookup(String),

    #[error("embedding error: {0}")]
    Embedding(String),

    #[error("LLM error: {0}")]
    Llm(#[from] ragline_llm::LlmError),

    #[error("history error: {0}")]
    History(String),

    #[error("corpus call timed out after {0:?}")]
    Timeout(Duration),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}
