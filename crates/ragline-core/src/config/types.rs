use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub assistant: AssistantConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub merge: MergeConfig,
    #[serde(default)]
    pub rerank: RerankConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

fn default_base_url() -> String {
    "http://localhost:11434/v1".into()
}

fn default_model() -> String {
    "qwen2.5:7b".into()
}

fn default_embedding_model() -> String {
    "nomic-embed-text".into()
}

fn default_max_tokens() -> u32 {
    1024
}

/// OpenAI-compatible endpoint backing every agent call.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            embedding_model: default_embedding_model(),
            max_tokens: default_max_tokens(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// The LLM endpoint's embedding model.
    #[default]
    Provider,
    /// A local BERT model (requires the `candle` feature).
    Candle,
}

fn default_local_embedding_model() -> String {
    "sentence-transformers/all-MiniLM-L6-v2".into()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub backend: EmbeddingBackend,
    /// Hub repo id or local directory for the `candle` backend.
    #[serde(default = "default_local_embedding_model")]
    pub model: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::default(),
            model: default_local_embedding_model(),
        }
    }
}

fn default_system_prompt() -> String {
    "You are an assistant that answers questions using the provided documents.".into()
}

fn default_instructions() -> String {
    "Answer only from the documents. Say so when they do not contain the answer.".into()
}

fn default_query() -> String {
    "Summarize the available documents.".into()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AssistantConfig {
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "default_instructions")]
    pub instructions: String,
    /// Used in place of a blank query.
    #[serde(default = "default_query")]
    pub default_query: String,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            instructions: default_instructions(),
            default_query: default_query(),
        }
    }
}

fn default_history_window() -> usize {
    3
}

fn default_history_limit() -> usize {
    20
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueryConfig {
    /// Trailing user/assistant turn pairs shown to intent synthesis.
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    /// Messages fetched from the history store per turn.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            history_window: default_history_window(),
            history_limit: default_history_limit(),
        }
    }
}

fn default_vector_top_k() -> usize {
    5
}

fn default_keyword_limit() -> usize {
    10
}

fn default_document_separator() -> String {
    ragline_retrieval::DEFAULT_SEPARATOR.into()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_vector_top_k")]
    pub vector_top_k: usize,
    #[serde(default = "default_keyword_limit")]
    pub keyword_limit: usize,
    #[serde(default = "default_document_separator")]
    pub document_separator: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            vector_top_k: default_vector_top_k(),
            keyword_limit: default_keyword_limit(),
            document_separator: default_document_separator(),
        }
    }
}

fn default_child_ratio() -> f32 {
    1.0
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MergeConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_child_ratio")]
    pub child_ratio: f32,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            child_ratio: default_child_ratio(),
        }
    }
}

fn default_rerank_model() -> String {
    ragline_models::reranker::DEFAULT_RERANK_MODEL.into()
}

fn default_min_free_memory_ratio() -> f32 {
    0.2
}

fn default_batch_size() -> usize {
    8
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RerankConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_rerank_model")]
    pub model: String,
    #[serde(default)]
    pub require_gpu: bool,
    #[serde(default = "default_min_free_memory_ratio")]
    pub min_free_memory_ratio: f32,
    #[serde(default)]
    pub top_k: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            model: default_rerank_model(),
            require_gpu: false,
            min_free_memory_ratio: default_min_free_memory_ratio(),
            top_k: None,
            batch_size: default_batch_size(),
        }
    }
}

fn default_agent_timeout() -> u64 {
    30
}

fn default_search_timeout() -> u64 {
    10
}

fn default_embedding_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_agent_timeout")]
    pub agent_seconds: u64,
    #[serde(default = "default_search_timeout")]
    pub search_seconds: u64,
    #[serde(default = "default_embedding_timeout")]
    pub embedding_seconds: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            agent_seconds: default_agent_timeout(),
            search_seconds: default_search_timeout(),
            embedding_seconds: default_embedding_timeout(),
        }
    }
}
