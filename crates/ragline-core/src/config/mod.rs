mod env;
mod types;


pub use types::*;

use std::path::Path;
use std::time::Duration;

use anyhow::Context;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("{field} must be in (0, 1], got {value}")]
    Ratio { field: &'static str, value: f32 },

    #[error("{field} must not be empty")]
    Empty { field: &'static str },
}

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns the first setting that is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("retrieval.vector_top_k", self.retrieval.vector_top_k),
            ("retrieval.keyword_limit", self.retrieval.keyword_limit),
            ("query.history_limit", self.query.history_limit),
            ("rerank.batch_size", self.rerank.batch_size),
        ] {
            if value == 0 {
                return Err(ConfigError::Zero { field });
            }
        }
        for (field, value) in [
            ("timeouts.agent_seconds", self.timeouts.agent_seconds),
            ("timeouts.search_seconds", self.timeouts.search_seconds),
            ("timeouts.embedding_seconds", self.timeouts.embedding_seconds),
        ] {
            if value == 0 {
                return Err(ConfigError::Zero { field });
            }
        }
        if self.rerank.top_k == Some(0) {
            return Err(ConfigError::Zero { field: "rerank.top_k" });
        }
        for (field, value) in [
            ("merge.child_ratio", self.merge.child_ratio),
            ("rerank.min_free_memory_ratio", self.rerank.min_free_memory_ratio),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(ConfigError::Ratio { field, value });
            }
        }
        if self.assistant.default_query.trim().is_empty() {
            return Err(ConfigError::Empty {
                field: "assistant.default_query",
            });
        }
        if self.rerank.enabled && self.rerank.model.trim().is_empty() {
            return Err(ConfigError::Empty { field: "rerank.model" });
        }
        Ok(())
    }

    #[must_use]
    pub fn decomposer_config(&self) -> ragline_retrieval::DecomposerConfig {
        ragline_retrieval::DecomposerConfig {
            default_query: self.assistant.default_query.clone(),
            system_prompt: self.assistant.system_prompt.clone(),
            instructions: self.assistant.instructions.clone(),
            history_window: self.query.history_window,
            agent_timeout: Duration::from_secs(self.timeouts.agent_seconds),
        }
    }

    #[must_use]
    pub fn retrieval_config(&self) -> ragline_retrieval::RetrievalConfig {
        ragline_retrieval::RetrievalConfig {
            vector_top_k: self.retrieval.vector_top_k,
            keyword_limit: self.retrieval.keyword_limit,
            document_separator: self.retrieval.document_separator.clone(),
            agent_timeout: Duration::from_secs(self.timeouts.agent_seconds),
            search_timeout: Duration::from_secs(self.timeouts.search_seconds),
            embedding_timeout: Duration::from_secs(self.timeouts.embedding_seconds),
        }
    }

    #[must_use]
    pub fn merge_config(&self) -> ragline_retrieval::MergeConfig {
        ragline_retrieval::MergeConfig {
            child_ratio: self.merge.child_ratio,
        }
    }

    #[must_use]
    pub fn rerank_config(&self) -> ragline_models::RerankConfig {
        ragline_models::RerankConfig {
            model: self.rerank.model.clone(),
            require_gpu: self.rerank.require_gpu,
            min_free_memory_ratio: self.rerank.min_free_memory_ratio,
            top_k: self.rerank.top_k,
            batch_size: self.rerank.batch_size,
        }
    }
}
