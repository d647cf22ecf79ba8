use std::sync::Arc;
use std::time::Duration;

use ragline_llm::{LlmProvider, Message};

use crate::agent::{self, IntentResult};
use crate::query::{ProcessedQuery, dedup_queries};

#[derive(Debug, Clone)]
pub struct DecomposerConfig {
    /// Substituted for a blank query.
    pub default_query: String,
    pub system_prompt: String,
    pub instructions: String,
    /// Trailing user/assistant turn pairs shown to intent synthesis.
    pub history_window: usize,
    pub agent_timeout: Duration,
}

impl Default for DecomposerConfig {
    fn default() -> Self {
        Self {
            default_query: "Summarize the available documents.".into(),
            system_prompt: String::new(),
            instructions: String::new(),
            history_window: 3,
            agent_timeout: Duration::from_secs(30),
        }
    }
}

/// Turns a raw query and the session history into a [`ProcessedQuery`].
pub struct QueryDecomposer<P> {
    provider: Arc<P>,
    config: DecomposerConfig,
}

impl<P> std::fmt::Debug for QueryDecomposer<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryDecomposer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<P: LlmProvider> QueryDecomposer<P> {
    #[must_use]
    pub fn new(provider: Arc<P>, config: DecomposerConfig) -> Self {
        Self { provider, config }
    }

    /// Decompose `query` into sub-queries with keyword sets.
    ///
    /// Intent synthesis and query breakdown run concurrently; keyword extraction
    /// follows once the full query list is known. Agent failures degrade to
    /// empty results and never surface here.
    #[tracing::instrument(skip_all, fields(history = history.len()))]
    pub async fn analyze(&self, query: &str, history: &[Message]) -> ProcessedQuery {
        let original = if query.trim().is_empty() {
            self.config.default_query.trim()
        } else {
            query.trim()
        }
        .to_owned();

        let conversation: Vec<Message> = history
            .iter()
            .filter(|m| m.role.is_conversational())
            .cloned()
            .collect();
        let window = trailing_window(&conversation, self.config.history_window);
        let limit = self.config.agent_timeout;

        let (intent, breakdown) = tokio::join!(
            agent::synthesize_intent(
                self.provider.as_ref(),
                &self.config.system_prompt,
                window,
                &original,
                limit,
            ),
            agent::break_down(self.provider.as_ref(), &original, limit),
        );

        let mut queries = dedup_queries(
            std::iter::once(original.clone()).chain(breakdown.into_sub_queries()),
        );
        if let IntentResult::Continuation { question } = intent
            && !conversation.is_empty()
            && !queries.contains(&question)
        {
            tracing::debug!(%question, "appending synthesized follow-up question");
            queries.push(question);
        }

        let keywords_per_query = if queries.is_empty() {
            Vec::new()
        } else {
            agent::extract_keywords(self.provider.as_ref(), &queries, limit)
                .await
                .into_pairs(&queries)
        };
        tracing::debug!(sub_queries = queries.len(), "query analyzed");

        ProcessedQuery {
            original_query: original,
            sub_queries: queries,
            keywords_per_query,
            history_messages: conversation,
            system_prompt: self.config.system_prompt.clone(),
            instructions: self.config.instructions.clone(),
        }
    }
}

fn trailing_window(conversation: &[Message], pairs: usize) -> &[Message] {
    let skip = conversation.len().saturating_sub(pairs.saturating_mul(2));
    &conversation[skip..]
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Mutex;

    use ragline_llm::LlmError;
    use ragline_llm::mock::MockProvider;

    use super::*;
    use crate::query::QueryKeywords;

    struct Script {
        intent: Result<&'static str, ()>,
        breakdown: Result<&'static str, ()>,
        keywords: Result<&'static str, ()>,
    }

    fn scripted(script: Script) -> (Arc<MockProvider>, Arc<Mutex<Vec<Vec<Message>>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        let provider = MockProvider::routed(move |msgs| {
            log.lock().unwrap().push(msgs.to_vec());
            let system = &msgs[0].content;
            let reply = if system.contains("Task: intent synthesis") {
                script.intent
            } else if system.contains("Task: query breakdown") {
                script.breakdown
            } else {
                script.keywords
            };
            reply
                .map(str::to_owned)
                .map_err(|()| LlmError::Other("scripted failure".into()))
        });
        (Arc::new(provider), seen)
    }

    fn decomposer(provider: Arc<MockProvider>) -> QueryDecomposer<MockProvider> {
        QueryDecomposer::new(
            provider,
            DecomposerConfig {
                default_query: "default question".into(),
                system_prompt: "You answer HR questions.".into(),
                instructions: "Be brief.".into(),
                history_window: 1,
                agent_timeout: Duration::from_secs(5),
            },
        )
    }

    #[tokio::test]
    async fn blank_query_uses_default() {
        let (provider, _) = scripted(Script {
            intent: Ok(r#"{"status":"none"}"#),
            breakdown: Ok(r#"{"subQueries":[]}"#),
            keywords: Ok(r#"{"keywords":[["default"]]}"#),
        });
        let pq = decomposer(provider).analyze("   ", &[]).await;
        assert_eq!(pq.original_query, "default question");
        assert_eq!(pq.sub_queries, vec!["default question"]);
        assert_eq!(
            pq.keywords_per_query,
            vec![QueryKeywords::new("default question", ["default".to_owned()])]
        );
    }

    #[tokio::test]
    async fn original_first_then_deduped_sub_queries() {
        let (provider, _) = scripted(Script {
            intent: Ok(r#"{"status":"none"}"#),
            breakdown: Ok(r#"{"subQueries":["a?","b?","a and b?","a?"]}"#),
            keywords: Ok(r#"{"keywords":[["a","b"],["a"],["b"]]}"#),
        });
        let pq = decomposer(provider).analyze("a and b?", &[]).await;
        assert_eq!(pq.sub_queries, vec!["a and b?", "a?", "b?"]);
        assert_eq!(pq.keywords_per_query[1].keywords, BTreeSet::from(["a".to_owned()]));
        assert_eq!(pq.system_prompt, "You answer HR questions.");
        assert_eq!(pq.instructions, "Be brief.");
    }

    #[tokio::test]
    async fn continuation_appended_only_with_history() {
        let script = || Script {
            intent: Ok(r#"{"status":"valid","question":"leave policy for interns?"}"#),
            breakdown: Ok(r#"{"subQueries":[]}"#),
            keywords: Err(()),
        };
        let history = vec![
            Message::system("ignored"),
            Message::user("what is the leave policy?"),
            Message::assistant("for which role?"),
        ];

        let (provider, _) = scripted(script());
        let pq = decomposer(provider).analyze("interns", &history).await;
        assert_eq!(pq.sub_queries, vec!["interns", "leave policy for interns?"]);
        assert_eq!(pq.history_messages.len(), 2);
        assert!(pq.history_messages.iter().all(|m| m.role.is_conversational()));

        let (provider, _) = scripted(script());
        let pq = decomposer(provider).analyze("interns", &[]).await;
        assert_eq!(pq.sub_queries, vec!["interns"]);
    }

    #[tokio::test]
    async fn keyword_failure_falls_back_to_empty_sets() {
        let (provider, _) = scripted(Script {
            intent: Ok(r#"{"status":"none"}"#),
            breakdown: Ok(r#"{"subQueries":["x"]}"#),
            keywords: Err(()),
        });
        let pq = decomposer(provider).analyze("x", &[]).await;
        assert_eq!(pq.keywords_per_query, vec![QueryKeywords::without_keywords("x")]);
    }

    #[tokio::test]
    async fn every_agent_failing_still_yields_original_query() {
        let provider = Arc::new(MockProvider::failing());
        let pq = decomposer(Arc::clone(&provider)).analyze("q", &[]).await;
        assert_eq!(pq.sub_queries, vec!["q"]);
        assert_eq!(pq.keywords_per_query, vec![QueryKeywords::without_keywords("q")]);
        assert_eq!(provider.chat_calls(), 3);
    }

    #[tokio::test]
    async fn intent_sees_only_trailing_window() {
        let (provider, seen) = scripted(Script {
            intent: Ok(r#"{"status":"none"}"#),
            breakdown: Ok(r#"{"subQueries":[]}"#),
            keywords: Ok(r#"{"keywords":[[]]}"#),
        });
        let history = vec![
            Message::user("old question"),
            Message::assistant("old answer"),
            Message::user("recent question"),
            Message::assistant("recent answer"),
        ];
        decomposer(provider).analyze("now", &history).await;
        let calls = seen.lock().unwrap();
        let intent = calls
            .iter()
            .find(|m| m[0].content.contains("Task: intent synthesis"))
            .unwrap();
        let contents: Vec<_> = intent[1..].iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["recent question", "recent answer", "now"]);
    }
}
