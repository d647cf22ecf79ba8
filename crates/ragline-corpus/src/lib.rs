//! Read-side access to the chunk corpus and conversation history.
//!
//! Chunks, their embeddings and their hierarchy metadata are produced at ingestion
//! time; this crate only searches and fetches them.

pub mod error;
pub mod history;
pub mod in_memory;
pub mod scope;
pub mod store;
pub mod types;

pub use error::CorpusError;
pub use history::{HistoryStore, InMemoryHistory};
pub use in_memory::{CorpusRecord, InMemoryCorpus};
pub use scope::{AccessScope, FieldCondition, FieldValue, IdScope, VectorFilter};
pub use store::{CorpusStore, Embedder, ProviderEmbedder, ScoredId};
pub use types::{Candidate, DocumentNode, Metadata};
