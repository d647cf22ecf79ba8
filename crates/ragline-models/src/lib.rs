//! Cross-encoder reranking and local embedding models.
//!
//! [`RerankService`] owns the one loaded cross-encoder, decides when to load or
//! evict it and admits one inference at a time. Model backends plug in through
//! [`ModelLoader`] and [`CrossEncoder`]; the Candle BERT backend is behind the
//! `candle` feature.

#[cfg(feature = "candle")]
pub mod candle;
pub mod device;
pub mod encoder;
pub mod error;
pub mod reranker;

pub use device::{DeviceKind, DeviceMonitor, SystemMonitor, select_device};
pub use encoder::{CrossEncoder, ModelLoader};
pub use error::{ModelError, Result};
pub use reranker::{ModelStatus, RerankConfig, RerankService, RerankedCandidate};
