use std::sync::Arc;

use ragline_corpus::Candidate;
use serde::Serialize;
use tokio::sync::{Mutex, Semaphore, watch};

use crate::device::{DeviceKind, DeviceMonitor, select_device};
use crate::encoder::{CrossEncoder, ModelLoader};
use crate::error::{ModelError, Result};

pub const DEFAULT_RERANK_MODEL: &str = "cross-encoder/ms-marco-MiniLM-L-6-v2";

#[derive(Debug, Clone)]
pub struct RerankConfig {
    /// Model used when a request names none.
    pub model: String,
    pub require_gpu: bool,
    /// Reload the model when the free share of device memory drops below this.
    pub min_free_memory_ratio: f32,
    pub top_k: Option<usize>,
    pub batch_size: usize,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_RERANK_MODEL.into(),
            require_gpu: false,
            min_free_memory_ratio: 0.2,
            top_k: None,
            batch_size: 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelStatus {
    Unloaded,
    Loading,
    Ready,
    Unloading,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RerankedCandidate {
    pub candidate: Candidate,
    pub score: f32,
}

struct LoadedModel {
    name: String,
    device: DeviceKind,
    encoder: Arc<dyn CrossEncoder>,
}

/// Process-wide cross-encoder service.
///
/// A request takes the single admission permit first and keeps it through the
/// load-or-reuse decision and scoring, so a swap never starts while another
/// request still scores on the old model. The load lock guards the handle
/// itself.
pub struct RerankService {
    loader: Arc<dyn ModelLoader>,
    monitor: Arc<dyn DeviceMonitor>,
    config: RerankConfig,
    handle: Mutex<Option<LoadedModel>>,
    status: watch::Sender<ModelStatus>,
    admission: Arc<Semaphore>,
}

impl std::fmt::Debug for RerankService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RerankService")
            .field("config", &self.config)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl RerankService {
    #[must_use]
    pub fn new(loader: Arc<dyn ModelLoader>, monitor: Arc<dyn DeviceMonitor>, config: RerankConfig) -> Self {
        let (status, _) = watch::channel(ModelStatus::Unloaded);
        Self {
            loader,
            monitor,
            config,
            handle: Mutex::new(None),
            status,
            admission: Arc::new(Semaphore::new(1)),
        }
    }

    #[must_use]
    pub fn status(&self) -> ModelStatus {
        *self.status.borrow()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ModelStatus> {
        self.status.subscribe()
    }

    /// Name of the model currently held, if any.
    pub async fn loaded_model(&self) -> Option<String> {
        self.handle.lock().await.as_ref().map(|m| m.name.clone())
    }

    /// Drop the loaded model and reclaim its device memory once no inference
    /// is running on it.
    pub async fn unload(&self) {
        let _permit = self.admission.acquire().await;
        let mut handle = self.handle.lock().await;
        self.evict(&mut handle, "unload requested");
    }

    /// Score `candidates` against `query` and return them best first.
    ///
    /// `model` defaults to the configured model and `top_k` to the configured
    /// cut-off. Returned candidates carry no metadata. Each passage is scored
    /// on its original content when ingestion kept one.
    ///
    /// # Errors
    ///
    /// Returns an error when a required GPU is missing, the model fails to load,
    /// or inference fails. There is no unranked fallback.
    #[tracing::instrument(skip_all, fields(candidates = candidates.len(), model = tracing::field::Empty))]
    pub async fn rerank(
        &self,
        query: &str,
        candidates: Vec<Candidate>,
        model: Option<&str>,
        top_k: Option<usize>,
    ) -> Result<Vec<RerankedCandidate>> {
        let device = select_device(self.monitor.as_ref(), self.config.require_gpu)?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        let model = model
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(&self.config.model);
        tracing::Span::current().record("model", model);

        let permit = Arc::clone(&self.admission)
            .acquire_owned()
            .await
            .map_err(|e| ModelError::inference(model, e.to_string()))?;
        let encoder = self.ensure_loaded(model, device).await?;
        let passages: Vec<String> = candidates.iter().map(|c| c.scoring_text().to_owned()).collect();

        let query = query.to_owned();
        let batch_size = self.config.batch_size.max(1);
        // The encoder clone must be gone before the permit lets an eviction in.
        let scores = tokio::task::spawn_blocking(move || {
            let scores = score_in_batches(encoder.as_ref(), &query, &passages, batch_size);
            drop(encoder);
            drop(permit);
            scores
        })
        .await??;

        let mut ranked: Vec<RerankedCandidate> = candidates
            .iter()
            .zip(scores)
            .map(|(c, score)| RerankedCandidate {
                candidate: c.stripped(),
                score,
            })
            .collect();
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
        if let Some(k) = top_k.or(self.config.top_k) {
            ranked.truncate(k);
        }
        Ok(ranked)
    }

    async fn ensure_loaded(&self, model: &str, device: DeviceKind) -> Result<Arc<dyn CrossEncoder>> {
        let mut handle = self.handle.lock().await;

        if let Some(current) = handle.as_ref() {
            let same = current.name == model && current.device == device;
            if same && !self.under_pressure(device) {
                return Ok(Arc::clone(&current.encoder));
            }
            let reason = if same { "memory pressure" } else { "model change" };
            self.evict(&mut handle, reason);
        }

        self.status.send_replace(ModelStatus::Loading);
        let loader = Arc::clone(&self.loader);
        let name = model.to_owned();
        let loaded = tokio::task::spawn_blocking(move || loader.load(&name, device)).await;
        let encoder = match loaded {
            Ok(Ok(encoder)) => encoder,
            Ok(Err(e)) => {
                self.status.send_replace(ModelStatus::Unloaded);
                return Err(e);
            }
            Err(e) => {
                self.status.send_replace(ModelStatus::Unloaded);
                return Err(e.into());
            }
        };

        tracing::info!(model, %device, "rerank model loaded");
        *handle = Some(LoadedModel {
            name: model.to_owned(),
            device,
            encoder: Arc::clone(&encoder),
        });
        self.status.send_replace(ModelStatus::Ready);
        Ok(encoder)
    }

    fn under_pressure(&self, device: DeviceKind) -> bool {
        self.monitor
            .free_memory_ratio(device)
            .is_some_and(|free| free < self.config.min_free_memory_ratio)
    }

    fn evict(&self, handle: &mut Option<LoadedModel>, reason: &str) {
        let Some(old) = handle.take() else {
            return;
        };
        self.status.send_replace(ModelStatus::Unloading);
        tracing::info!(model = %old.name, device = %old.device, reason, "evicting rerank model");
        let device = old.device;
        drop(old);
        self.monitor.reclaim(device);
        self.status.send_replace(ModelStatus::Unloaded);
    }
}

fn score_in_batches(
    encoder: &dyn CrossEncoder,
    query: &str,
    passages: &[String],
    batch_size: usize,
) -> Result<Vec<f32>> {
    let mut scores = Vec::with_capacity(passages.len());
    for batch in passages.chunks(batch_size) {
        let batch_scores = encoder.score_pairs(query, batch)?;
        if batch_scores.len() != batch.len() {
            return Err(ModelError::ScoreCount {
                model: encoder.name().to_owned(),
                expected: batch.len(),
                got: batch_scores.len(),
            });
        }
        scores.extend(batch_scores);
    }
    Ok(scores)
}
