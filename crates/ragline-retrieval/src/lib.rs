//! Context assembly for a retrieval-augmented chat turn.
//!
//! [`decomposer::QueryDecomposer`] turns a raw query plus history into sub-queries
//! and keyword sets, [`retriever::CandidateRetriever`] fans them out into keyword
//! and vector searches filtered by an LLM relevance check, and
//! [`merger::HierarchicalMerger`] promotes complete sibling sets to their parent
//! chunk.

pub mod agent;
pub mod bundle;
pub mod decomposer;
pub mod error;
pub mod hierarchy;
pub mod merger;
pub(crate) mod prompts;
pub mod query;
pub mod retriever;

pub use bundle::{ContextBundle, DEFAULT_SEPARATOR, SourceDocuments, render_context};
pub use decomposer::{DecomposerConfig, QueryDecomposer};
pub use error::{Result, RetrievalError};
pub use hierarchy::{HierarchyNode, NodeIndex, RelationKind, Related};
pub use merger::{HierarchicalMerger, MergeConfig, MergeReport, MergedRecord};
pub use query::{ProcessedQuery, QueryKeywords};
pub use retriever::{CandidateRetriever, RetrievalConfig};
