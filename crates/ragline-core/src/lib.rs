//! Configuration and the [`ContextPipeline`] facade tying query decomposition,
//! retrieval, hierarchy merging and reranking into one call.

pub mod backends;
pub mod config;
pub mod error;
pub mod pipeline;

pub use config::{Config, ConfigError};
pub use error::{PipelineError, Result};
pub use pipeline::{AssembledContext, ContextPipeline};
