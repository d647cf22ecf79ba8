use std::collections::HashMap;
use std::sync::RwLock;

use ragline_llm::Message;

use crate::error::CorpusError;
use crate::store::BoxFuture;

/// Source of prior conversation turns for a user's chat session.
pub trait HistoryStore: Send + Sync {
    /// Load up to `limit` most recent messages, oldest first.
    fn load_history(
        &self,
        user_id: &str,
        session_id: &str,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<Message>, CorpusError>>;
}

#[derive(Default)]
pub struct InMemoryHistory {
    sessions: RwLock<HashMap<(String, String), Vec<Message>>>,
}

impl InMemoryHistory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    ///
    /// Returns an error if the store lock is poisoned.
    pub fn append(&self, user_id: &str, session_id: &str, message: Message) -> Result<(), CorpusError> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|e| CorpusError::History(e.to_string()))?;
        sessions
            .entry((user_id.to_owned(), session_id.to_owned()))
            .or_default()
            .push(message);
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryHistory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryHistory").finish_non_exhaustive()
    }
}

impl HistoryStore for InMemoryHistory {
    fn load_history(
        &self,
        user_id: &str,
        session_id: &str,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<Message>, CorpusError>> {
        let key = (user_id.to_owned(), session_id.to_owned());
        Box::pin(async move {
            let sessions = self
                .sessions
                .read()
                .map_err(|e| CorpusError::History(e.to_string()))?;
            let Some(messages) = sessions.get(&key) else {
                return Ok(Vec::new());
            };
            let skip = messages.len().saturating_sub(limit);
            Ok(messages[skip..].to_vec())
        })
    }
}
