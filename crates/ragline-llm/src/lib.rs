//! Agent-call abstraction used by every LLM-mediated decision in the pipeline.
//!
//! A provider answers two questions: "complete this conversation" and "embed this
//! text". Structured replies are requested through [`LlmProvider::chat_typed`],
//! which guides the model with a JSON schema and tolerates fenced or chatty output.

pub mod compatible;
pub mod error;
pub mod http;
#[cfg(feature = "mock")]
pub mod mock;
pub mod provider;
pub mod structured;
pub mod timeout;

pub use error::LlmError;
pub use provider::{LlmProvider, Message, Role};
