use std::future::Future;

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::structured;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    /// `true` for the roles that make up a conversation (user and assistant turns).
    #[must_use]
    pub fn is_conversational(self) -> bool {
        matches!(self, Self::User | Self::Assistant)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

pub trait LlmProvider: Send + Sync {
    /// Send messages to the LLM and return the assistant response.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider fails to communicate or the response is invalid.
    fn chat(&self, messages: &[Message]) -> impl Future<Output = Result<String, LlmError>> + Send;

    /// Generate an embedding vector for `text`.
    ///
    /// # Errors
    ///
    /// Returns `LlmError::EmbedUnsupported` when the provider has no embedding model.
    fn embed(&self, text: &str) -> impl Future<Output = Result<Vec<f32>, LlmError>> + Send;

    fn supports_embeddings(&self) -> bool;

    fn name(&self) -> &str;

    /// Ask for a JSON reply matching `T` and deserialize it.
    ///
    /// The schema of `T` is appended to the system instructions; the reply may be
    /// wrapped in a fenced block or surrounded by prose.
    ///
    /// # Errors
    ///
    /// Returns the provider error, or `LlmError::StructuredParse` if no value of
    /// type `T` can be read from the reply.
    fn chat_typed<T>(
        &self,
        messages: &[Message],
    ) -> impl Future<Output = Result<T, LlmError>> + Send
    where
        T: DeserializeOwned + JsonSchema + Send,
        Self: Sized,
    {
        async move {
            let schema = serde_json::to_string(&schemars::schema_for!(T))
                .map_err(|e| LlmError::StructuredParse(e.to_string()))?;
            let augmented = structured::with_schema_instruction(messages, &schema);
            let raw = self.chat(&augmented).await?;
            structured::parse_json::<T>(&raw)
        }
    }
}
