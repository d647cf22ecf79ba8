use std::sync::Arc;

use crate::device::DeviceKind;
use crate::error::Result;

/// A model that scores `(query, passage)` pairs jointly.
///
/// Scoring is blocking; callers run it on a worker thread.
pub trait CrossEncoder: Send + Sync {
    /// One score per passage, in passage order. Higher means more relevant.
    ///
    /// # Errors
    ///
    /// Returns an error if tokenization or the forward pass fails.
    fn score_pairs(&self, query: &str, passages: &[String]) -> Result<Vec<f32>>;

    fn name(&self) -> &str;
}

/// Loads cross-encoders by name onto a device. Blocking.
pub trait ModelLoader: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the model cannot be fetched or initialized on `device`.
    fn load(&self, name: &str, device: DeviceKind) -> Result<Arc<dyn CrossEncoder>>;
}
