use std::sync::Arc;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use ragline_corpus::CorpusError;
use ragline_corpus::store::{BoxFuture, Embedder};
use tokenizers::Tokenizer;

use super::resolve_files;
use crate::error::{ModelError, Result};

/// BERT sentence embedder: mean pooling followed by L2 normalization.
pub struct EmbedModel {
    name: String,
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
}

impl std::fmt::Debug for EmbedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbedModel")
            .field("name", &self.name)
            .field("device", &self.device)
            .finish_non_exhaustive()
    }
}

impl EmbedModel {
    /// # Errors
    ///
    /// Returns an error if model download or loading fails.
    pub fn load(name: &str, device: &Device) -> Result<Self> {
        let files = resolve_files(name)?;
        let config_str = std::fs::read_to_string(&files.config)
            .map_err(|e| ModelError::load(name, format!("failed to read config.json: {e}")))?;
        let config: BertConfig = serde_json::from_str(&config_str)
            .map_err(|e| ModelError::load(name, format!("invalid config.json: {e}")))?;
        let tokenizer =
            Tokenizer::from_file(&files.tokenizer).map_err(|e| ModelError::load(name, e.to_string()))?;

        // SAFETY: the safetensors file is not modified while the VarBuilder maps it.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[files.weights], DType::F32, device)? };
        let model = BertModel::load(vb, &config).map_err(|e| ModelError::load(name, e.to_string()))?;
        tracing::info!(model = name, ?device, "embedding model loaded");

        Ok(Self {
            name: name.to_owned(),
            model,
            tokenizer,
            device: device.clone(),
        })
    }

    /// # Errors
    ///
    /// Returns an error if tokenization or the forward pass fails.
    pub fn embed_sync(&self, text: &str) -> Result<Vec<f32>> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| ModelError::Tokenization(e.to_string()))?;
        let ids = encoding.get_ids();
        let type_ids = vec![0u32; ids.len()];

        let input_ids = Tensor::new(ids, &self.device)?.unsqueeze(0)?;
        let token_type_ids = Tensor::new(type_ids.as_slice(), &self.device)?.unsqueeze(0)?;
        let hidden = self
            .model
            .forward(&input_ids, &token_type_ids, None)
            .map_err(|e| ModelError::inference(&self.name, e.to_string()))?;

        let seq_len = u32::try_from(hidden.dim(1)?)
            .map_err(|e| ModelError::inference(&self.name, format!("sequence length overflow: {e}")))?;
        let pooled = (hidden.sum(1)? / f64::from(seq_len))?;
        let norm = pooled.sqr()?.sum_keepdim(1)?.sqrt()?;
        Ok(pooled.broadcast_div(&norm)?.squeeze(0)?.to_vec1::<f32>()?)
    }
}

/// [`Embedder`] that runs an [`EmbedModel`] on the blocking thread pool.
#[derive(Debug, Clone)]
pub struct CandleEmbedder {
    model: Arc<EmbedModel>,
}

impl CandleEmbedder {
    #[must_use]
    pub fn new(model: EmbedModel) -> Self {
        Self {
            model: Arc::new(model),
        }
    }
}

impl Embedder for CandleEmbedder {
    fn embed(&self, text: &str) -> BoxFuture<'_, std::result::Result<Vec<f32>, CorpusError>> {
        let model = Arc::clone(&self.model);
        let text = text.to_owned();
        Box::pin(async move {
            tokio::task::spawn_blocking(move || model.embed_sync(&text))
                .await
                .map_err(|e| CorpusError::Embedding(format!("embedding task failed: {e}")))?
                .map_err(|e| CorpusError::Embedding(e.to_string()))
        })
    }
}
