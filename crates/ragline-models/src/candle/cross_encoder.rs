use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use tokenizers::{PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};

use super::resolve_files;
use crate::encoder::CrossEncoder;
use crate::error::{ModelError, Result};

const MAX_SEQUENCE_LENGTH: usize = 512;

/// BERT with a single-logit classifier head over the `[CLS]` token.
pub struct CandleCrossEncoder {
    name: String,
    model: BertModel,
    classifier_weight: Tensor,
    classifier_bias: Tensor,
    tokenizer: Tokenizer,
    device: Device,
}

impl std::fmt::Debug for CandleCrossEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CandleCrossEncoder")
            .field("name", &self.name)
            .field("device", &self.device)
            .finish_non_exhaustive()
    }
}

impl CandleCrossEncoder {
    /// Load a cross-encoder from a local directory or a `HuggingFace` repo id.
    ///
    /// # Errors
    ///
    /// Returns an error if a model file is missing or the weights do not match
    /// a BERT sequence classifier.
    pub fn load(name: &str, device: &Device) -> Result<Self> {
        let files = resolve_files(name)?;
        tracing::info!(model = name, ?device, "loading cross-encoder");

        let config_str = std::fs::read_to_string(&files.config)
            .map_err(|e| ModelError::load(name, format!("failed to read config.json: {e}")))?;
        let config: BertConfig = serde_json::from_str(&config_str)
            .map_err(|e| ModelError::load(name, format!("invalid config.json: {e}")))?;

        // SAFETY: the safetensors file is not modified while the VarBuilder maps it.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[files.weights], DType::F32, device)? };
        let model = BertModel::load(vb.clone(), &config).map_err(|e| ModelError::load(name, e.to_string()))?;
        let classifier_weight = vb
            .get((1, config.hidden_size), "classifier.weight")
            .map_err(|e| ModelError::load(name, format!("classifier.weight: {e}")))?;
        let classifier_bias = vb
            .get(1, "classifier.bias")
            .map_err(|e| ModelError::load(name, format!("classifier.bias: {e}")))?;

        let mut tokenizer =
            Tokenizer::from_file(&files.tokenizer).map_err(|e| ModelError::load(name, e.to_string()))?;
        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            ..PaddingParams::default()
        }));
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: MAX_SEQUENCE_LENGTH,
                ..TruncationParams::default()
            }))
            .map_err(|e| ModelError::load(name, e.to_string()))?;

        Ok(Self {
            name: name.to_owned(),
            model,
            classifier_weight,
            classifier_bias,
            tokenizer,
            device: device.clone(),
        })
    }

    fn logits(&self, query: &str, passages: &[String]) -> Result<Vec<f32>> {
        let pairs: Vec<(String, String)> = passages.iter().map(|p| (query.to_owned(), p.clone())).collect();
        let encodings = self
            .tokenizer
            .encode_batch(pairs, true)
            .map_err(|e| ModelError::Tokenization(e.to_string()))?;

        let rows = encodings.len();
        let width = encodings.iter().map(|e| e.get_ids().len()).max().unwrap_or(0);
        let mut input_ids = Vec::with_capacity(rows * width);
        let mut attention_mask = Vec::with_capacity(rows * width);
        let mut token_type_ids = Vec::with_capacity(rows * width);
        for encoding in &encodings {
            let pad = width - encoding.get_ids().len();
            input_ids.extend(encoding.get_ids().iter().copied().chain(std::iter::repeat_n(0, pad)));
            attention_mask.extend(
                encoding
                    .get_attention_mask()
                    .iter()
                    .copied()
                    .chain(std::iter::repeat_n(0, pad)),
            );
            token_type_ids.extend(encoding.get_type_ids().iter().copied().chain(std::iter::repeat_n(0, pad)));
        }

        let input_ids = Tensor::from_vec(input_ids, (rows, width), &self.device)?;
        let attention_mask = Tensor::from_vec(attention_mask, (rows, width), &self.device)?;
        let token_type_ids = Tensor::from_vec(token_type_ids, (rows, width), &self.device)?;

        let hidden = self
            .model
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))
            .map_err(|e| ModelError::inference(&self.name, e.to_string()))?;
        // [rows, seq, hidden] -> [rows, hidden]
        let cls = hidden.narrow(1, 0, 1)?.squeeze(1)?;
        let logits = cls
            .matmul(&self.classifier_weight.t()?)?
            .broadcast_add(&self.classifier_bias)?
            .squeeze(1)?;
        Ok(logits.to_dtype(DType::F32)?.to_vec1()?)
    }
}

impl CrossEncoder for CandleCrossEncoder {
    fn score_pairs(&self, query: &str, passages: &[String]) -> Result<Vec<f32>> {
        if passages.is_empty() {
            return Ok(Vec::new());
        }
        tracing::debug!(passages = passages.len(), device = ?self.device, "scoring pairs");
        self.logits(query, passages)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
