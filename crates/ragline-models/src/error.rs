#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("GPU required but not available: {reason}")]
    GpuUnavailable { reason: String },

    #[error("failed to load model {model}: {reason}")]
    Load { model: String, reason: String },

    #[error("inference failed on {model}: {reason}")]
    Inference { model: String, reason: String },

    #[error("{model} returned {got} scores for {expected} pairs")]
    ScoreCount {
        model: String,
        expected: usize,
        got: usize,
    },

    #[error("tokenization failed: {0}")]
    Tokenization(String),

    #[error("blocking model task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[cfg(feature = "candle")]
    #[error("candle error: {0}")]
    Candle(#[from] candle_core::Error),
}

impl ModelError {
    pub fn load(model: &str, reason: impl Into<String>) -> Self {
        Self::Load {
            model: model.to_owned(),
            reason: reason.into(),
        }
    }

    pub fn inference(model: &str, reason: impl Into<String>) -> Self {
        Self::Inference {
            model: model.to_owned(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ModelError>;
