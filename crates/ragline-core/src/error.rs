use ragline_corpus::CorpusError;
use ragline_models::ModelError;

use crate::config::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("failed to load conversation history: {0}")]
    History(#[source] CorpusError),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("model error: {0}")]
    Model(#[from] ModelError),

    #[error("reranking is not enabled for this pipeline")]
    RerankDisabled,

    #[error("{0} requires the `candle` feature")]
    BackendUnavailable(&'static str),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
