//! Candle BERT backends: cross-encoder reranking and sentence embedding.

mod cross_encoder;
mod embed;

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

pub use candle_core::Device;

pub use self::cross_encoder::CandleCrossEncoder;
pub use self::embed::{CandleEmbedder, EmbedModel};
use crate::device::{DeviceKind, DeviceMonitor, SystemMonitor};
use crate::encoder::{CrossEncoder, ModelLoader};
use crate::error::{ModelError, Result};

/// Open a Candle device of the given kind (ordinal 0 for GPUs).
///
/// # Errors
///
/// Returns an error if the backend is missing from this build or has no device.
pub fn device_for(kind: DeviceKind) -> Result<Device> {
    Ok(match kind {
        DeviceKind::Cpu => Device::Cpu,
        DeviceKind::Cuda => Device::new_cuda(0)?,
        DeviceKind::Metal => Device::new_metal(0)?,
    })
}

/// Loads BERT cross-encoders from a local directory or the `HuggingFace` Hub.
#[derive(Debug, Default, Clone, Copy)]
pub struct CandleLoader;

impl ModelLoader for CandleLoader {
    fn load(&self, name: &str, kind: DeviceKind) -> Result<Arc<dyn CrossEncoder>> {
        let device = device_for(kind)?;
        Ok(Arc::new(CandleCrossEncoder::load(name, &device)?))
    }
}

/// Monitor that detects CUDA or Metal through Candle.
#[derive(Debug, Default)]
pub struct CandleMonitor {
    gpu: OnceLock<Option<DeviceKind>>,
    system: SystemMonitor,
}

impl CandleMonitor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl DeviceMonitor for CandleMonitor {
    fn gpu(&self) -> Option<DeviceKind> {
        *self.gpu.get_or_init(detect_gpu)
    }

    // Candle exposes no GPU memory statistics.
    fn free_memory_ratio(&self, device: DeviceKind) -> Option<f32> {
        self.system.free_memory_ratio(device)
    }

    fn reclaim(&self, device: DeviceKind) {
        if !device.is_gpu() {
            return;
        }
        match device_for(device).and_then(|d| d.synchronize().map_err(ModelError::from)) {
            Ok(()) => tracing::debug!(%device, "device synchronized after eviction"),
            Err(e) => tracing::warn!(%device, error = %e, "device synchronize failed"),
        }
    }

    fn unavailable_reason(&self) -> String {
        if cfg!(feature = "cuda") {
            "CUDA GPU not available; check the NVIDIA driver and CUDA toolkit".into()
        } else if cfg!(feature = "metal") {
            "Metal GPU not available on this system".into()
        } else {
            self.system.unavailable_reason()
        }
    }
}

fn detect_gpu() -> Option<DeviceKind> {
    #[cfg(feature = "cuda")]
    {
        match Device::new_cuda(0) {
            Ok(_) => return Some(DeviceKind::Cuda),
            Err(e) => tracing::debug!("CUDA not available: {e}"),
        }
    }

    #[cfg(feature = "metal")]
    {
        match Device::new_metal(0) {
            Ok(_) => return Some(DeviceKind::Metal),
            Err(e) => tracing::debug!("Metal not available: {e}"),
        }
    }

    None
}

pub(crate) struct ModelFiles {
    pub config: PathBuf,
    pub tokenizer: PathBuf,
    pub weights: PathBuf,
}

/// Find `config.json`, `tokenizer.json` and `model.safetensors` for `name`:
/// a local directory when one exists at that path, otherwise a Hub repo id.
pub(crate) fn resolve_files(name: &str) -> Result<ModelFiles> {
    let local = Path::new(name);
    if local.is_dir() {
        let files = ModelFiles {
            config: local.join("config.json"),
            tokenizer: local.join("tokenizer.json"),
            weights: local.join("model.safetensors"),
        };
        for path in [&files.config, &files.tokenizer, &files.weights] {
            if !path.is_file() {
                return Err(ModelError::load(name, format!("{} not found", path.display())));
            }
        }
        return Ok(files);
    }

    let api = hf_hub::api::sync::Api::new()
        .map_err(|e| ModelError::load(name, format!("failed to create HuggingFace API client: {e}")))?;
    let repo = api.model(name.to_owned());
    let fetch = |file: &str| {
        repo.get(file)
            .map_err(|e| ModelError::load(name, format!("failed to download {file}: {e}")))
    };
    Ok(ModelFiles {
        config: fetch("config.json")?,
        tokenizer: fetch("tokenizer.json")?,
        weights: fetch("model.safetensors")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_device_always_opens() {
        assert!(matches!(device_for(DeviceKind::Cpu).unwrap(), Device::Cpu));
    }

    #[test]
    fn local_dir_missing_files_is_load_error() {
        let dir = std::env::temp_dir().join("ragline-empty-model-dir");
        std::fs::create_dir_all(&dir).unwrap();
        let err = resolve_files(dir.to_str().unwrap()).err().unwrap();
        assert!(matches!(err, ModelError::Load { .. }));
    }
}
