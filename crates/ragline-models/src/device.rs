//! Device selection and memory probing.

use std::fmt;

use crate::error::{ModelError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    Cpu,
    Cuda,
    Metal,
}

impl DeviceKind {
    #[must_use]
    pub fn is_gpu(self) -> bool {
        !matches!(self, Self::Cpu)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Cuda => "cuda",
            Self::Metal => "metal",
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the host offers for running models.
pub trait DeviceMonitor: Send + Sync {
    /// The GPU backend this process can use, if any.
    fn gpu(&self) -> Option<DeviceKind>;

    /// Fraction of memory still free on `device`, or `None` when unknown.
    fn free_memory_ratio(&self, device: DeviceKind) -> Option<f32>;

    /// Return memory released by dropped models to the device.
    fn reclaim(&self, device: DeviceKind);

    fn unavailable_reason(&self) -> String {
        "no GPU backend is available".into()
    }
}

/// GPU when available, otherwise CPU. With `require_gpu` the CPU fallback is an error.
///
/// # Errors
///
/// Returns `ModelError::GpuUnavailable` when `require_gpu` is set and no GPU exists.
pub fn select_device(monitor: &dyn DeviceMonitor, require_gpu: bool) -> Result<DeviceKind> {
    match monitor.gpu() {
        Some(gpu) => Ok(gpu),
        None if require_gpu => Err(ModelError::GpuUnavailable {
            reason: monitor.unavailable_reason(),
        }),
        None => Ok(DeviceKind::Cpu),
    }
}

/// CPU-only monitor reading host memory from `/proc/meminfo`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemMonitor;

impl DeviceMonitor for SystemMonitor {
    fn gpu(&self) -> Option<DeviceKind> {
        None
    }

    fn free_memory_ratio(&self, device: DeviceKind) -> Option<f32> {
        if device.is_gpu() {
            return None;
        }
        std::fs::read_to_string("/proc/meminfo")
            .ok()
            .and_then(|text| parse_meminfo(&text))
    }

    fn reclaim(&self, device: DeviceKind) {
        tracing::debug!(%device, "released model memory");
    }

    fn unavailable_reason(&self) -> String {
        "built without GPU support; rebuild with --features cuda or --features metal".into()
    }
}

/// `MemAvailable / MemTotal` from a `/proc/meminfo` listing.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn parse_meminfo(text: &str) -> Option<f32> {
    let field = |name: &str| {
        text.lines()
            .find_map(|line| line.strip_prefix(name))
            .and_then(|rest| rest.trim_start_matches(':').split_whitespace().next())
            .and_then(|kb| kb.parse::<u64>().ok())
    };
    let total = field("MemTotal")?;
    let available = field("MemAvailable")?;
    (total > 0).then(|| available as f32 / total as f32)
}
