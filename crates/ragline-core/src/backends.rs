//! Construction of the model-backed collaborators named in [`Config`].

use std::sync::Arc;

use ragline_corpus::{Embedder, ProviderEmbedder};
use ragline_llm::LlmProvider;
use ragline_models::RerankService;

use crate::config::{Config, EmbeddingBackend};
use crate::error::Result;

/// Build the query embedder selected by `[embedding] backend`.
///
/// The Candle backend loads its model on a blocking thread, on the GPU when
/// one is present.
///
/// # Errors
///
/// Returns an error if the local model cannot be loaded or the backend is not
/// compiled in.
pub async fn embedder<P>(config: &Config, provider: Arc<P>) -> Result<Arc<dyn Embedder>>
where
    P: LlmProvider + 'static,
{
    match config.embedding.backend {
        EmbeddingBackend::Provider => Ok(Arc::new(ProviderEmbedder::new(provider))),
        EmbeddingBackend::Candle => candle_embedder(&config.embedding.model).await,
    }
}

#[cfg(feature = "candle")]
async fn candle_embedder(model: &str) -> Result<Arc<dyn Embedder>> {
    use ragline_models::candle::{CandleEmbedder, CandleMonitor, EmbedModel, device_for};

    let kind = ragline_models::select_device(&CandleMonitor::new(), false)?;
    let name = model.to_owned();
    let loaded = tokio::task::spawn_blocking(move || {
        let device = device_for(kind)?;
        EmbedModel::load(&name, &device)
    })
    .await
    .map_err(ragline_models::ModelError::from)??;
    tracing::info!(model, device = %kind, "embedding model loaded");
    Ok(Arc::new(CandleEmbedder::new(loaded)))
}

#[cfg(not(feature = "candle"))]
#[allow(clippy::unused_async)]
async fn candle_embedder(_model: &str) -> Result<Arc<dyn Embedder>> {
    Err(crate::error::PipelineError::BackendUnavailable(
        "the candle embedding backend",
    ))
}

/// Build the rerank service when `[rerank] enabled` is set.
///
/// # Errors
///
/// Returns an error if reranking is enabled in a build without a model backend.
pub fn reranker(config: &Config) -> Result<Option<Arc<RerankService>>> {
    if !config.rerank.enabled {
        return Ok(None);
    }
    candle_reranker(config).map(Some)
}

#[cfg(feature = "candle")]
#[allow(clippy::unnecessary_wraps)]
fn candle_reranker(config: &Config) -> Result<Arc<RerankService>> {
    use ragline_models::candle::{CandleLoader, CandleMonitor};

    Ok(Arc::new(RerankService::new(
        Arc::new(CandleLoader),
        Arc::new(CandleMonitor::new()),
        config.rerank_config(),
    )))
}

#[cfg(not(feature = "candle"))]
fn candle_reranker(_config: &Config) -> Result<Arc<RerankService>> {
    Err(crate::error::PipelineError::BackendUnavailable("reranking"))
}

#[cfg(test)]
mod tests {
    use ragline_llm::mock::MockProvider;

    use super::*;

    #[test]
    fn reranker_disabled_by_default() {
        assert!(reranker(&Config::default()).unwrap().is_none());
    }

    #[tokio::test]
    async fn provider_embedder_is_default() {
        let provider = Arc::new(MockProvider::default().with_embedding(vec![1.0, 0.0]));
        let embedder = embedder(&Config::default(), provider).await.unwrap();
        assert_eq!(embedder.embed("q").await.unwrap(), vec![1.0, 0.0]);
    }

    #[cfg(not(feature = "candle"))]
    #[tokio::test]
    async fn local_backends_need_candle() {
        use crate::error::PipelineError;

        let mut config = Config::default();
        config.rerank.enabled = true;
        assert!(matches!(
            reranker(&config),
            Err(PipelineError::BackendUnavailable(_))
        ));

        config.embedding.backend = EmbeddingBackend::Candle;
        let err = embedder(&config, Arc::new(MockProvider::default()))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, PipelineError::BackendUnavailable(_)));
    }
}
