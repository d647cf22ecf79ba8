use super::{Config, EmbeddingBackend};

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_llm();
        self.apply_env_overrides_pipeline();
        self.apply_env_overrides_rerank();
    }

    fn apply_env_overrides_llm(&mut self) {
        if let Ok(v) = std::env::var("RAGLINE_LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Ok(v) = std::env::var("RAGLINE_LLM_MODEL") {
            self.llm.model = v;
        }
        if let Ok(v) = std::env::var("RAGLINE_LLM_EMBEDDING_MODEL") {
            self.llm.embedding_model = v;
        }
        if let Ok(v) = std::env::var("RAGLINE_LLM_API_KEY") {
            self.llm.api_key = Some(v);
        }
        if let Ok(v) = std::env::var("RAGLINE_LLM_MAX_TOKENS")
            && let Ok(n) = v.parse::<u32>()
        {
            self.llm.max_tokens = n;
        }
        if let Ok(v) = std::env::var("RAGLINE_EMBEDDING_BACKEND") {
            match v.to_lowercase().as_str() {
                "provider" => self.embedding.backend = EmbeddingBackend::Provider,
                "candle" => self.embedding.backend = EmbeddingBackend::Candle,
                _ => tracing::warn!("ignoring invalid RAGLINE_EMBEDDING_BACKEND value: {v}"),
            }
        }
        if let Ok(v) = std::env::var("RAGLINE_EMBEDDING_MODEL") {
            self.embedding.model = v;
        }
    }

    fn apply_env_overrides_pipeline(&mut self) {
        if let Ok(v) = std::env::var("RAGLINE_ASSISTANT_DEFAULT_QUERY") {
            self.assistant.default_query = v;
        }
        if let Ok(v) = std::env::var("RAGLINE_QUERY_HISTORY_WINDOW")
            && let Ok(n) = v.parse::<usize>()
        {
            self.query.history_window = n;
        }
        if let Ok(v) = std::env::var("RAGLINE_QUERY_HISTORY_LIMIT")
            && let Ok(n) = v.parse::<usize>()
        {
            self.query.history_limit = n;
        }
        if let Ok(v) = std::env::var("RAGLINE_RETRIEVAL_VECTOR_TOP_K")
            && let Ok(n) = v.parse::<usize>()
        {
            self.retrieval.vector_top_k = n;
        }
        if let Ok(v) = std::env::var("RAGLINE_RETRIEVAL_KEYWORD_LIMIT")
            && let Ok(n) = v.parse::<usize>()
        {
            self.retrieval.keyword_limit = n;
        }
        if let Ok(v) = std::env::var("RAGLINE_MERGE_ENABLED")
            && let Ok(enabled) = v.parse::<bool>()
        {
            self.merge.enabled = enabled;
        }
        if let Ok(v) = std::env::var("RAGLINE_MERGE_CHILD_RATIO")
            && let Ok(ratio) = v.parse::<f32>()
        {
            self.merge.child_ratio = ratio;
        }
        if let Ok(v) = std::env::var("RAGLINE_TIMEOUT_AGENT")
            && let Ok(secs) = v.parse::<u64>()
        {
            self.timeouts.agent_seconds = secs;
        }
        if let Ok(v) = std::env::var("RAGLINE_TIMEOUT_SEARCH")
            && let Ok(secs) = v.parse::<u64>()
        {
            self.timeouts.search_seconds = secs;
        }
        if let Ok(v) = std::env::var("RAGLINE_TIMEOUT_EMBEDDING")
            && let Ok(secs) = v.parse::<u64>()
        {
            self.timeouts.embedding_seconds = secs;
        }
    }

    fn apply_env_overrides_rerank(&mut self) {
        if let Ok(v) = std::env::var("RAGLINE_RERANK_ENABLED")
            && let Ok(enabled) = v.parse::<bool>()
        {
            self.rerank.enabled = enabled;
        }
        if let Ok(v) = std::env::var("RAGLINE_RERANK_MODEL") {
            self.rerank.model = v;
        }
        if let Ok(v) = std::env::var("RAGLINE_RERANK_REQUIRE_GPU")
            && let Ok(required) = v.parse::<bool>()
        {
            self.rerank.require_gpu = required;
        }
        if let Ok(v) = std::env::var("RAGLINE_RERANK_MIN_FREE_MEMORY_RATIO")
            && let Ok(ratio) = v.parse::<f32>()
        {
            self.rerank.min_free_memory_ratio = ratio;
        }
        if let Ok(v) = std::env::var("RAGLINE_RERANK_TOP_K")
            && let Ok(n) = v.parse::<usize>()
        {
            self.rerank.top_k = Some(n);
        }
        if let Ok(v) = std::env::var("RAGLINE_RERANK_BATCH_SIZE")
            && let Ok(n) = v.parse::<usize>()
        {
            self.rerank.batch_size = n;
        }
    }
}
