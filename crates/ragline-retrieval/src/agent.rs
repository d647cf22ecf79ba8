//! Typed agent calls.
//!
//! Every LLM-mediated decision in the pipeline goes through one of the functions
//! here. Each parses the reply into a wire struct and folds it into a result
//! enum with an explicit failure variant; none of them return an error.

use std::collections::{BTreeSet, HashSet};
use std::time::Duration;

use ragline_corpus::Candidate;
use ragline_llm::timeout::bounded;
use ragline_llm::{LlmProvider, Message};
use schemars::JsonSchema;
use serde::Deserialize;

use crate::prompts;
use crate::query::QueryKeywords;

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct IntentReply {
    /// `"valid"` when the newest message continues an unanswered question.
    pub status: String,
    #[serde(default)]
    pub question: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntentResult {
    /// The query continues an earlier question; `question` is the synthesized form.
    Continuation { question: String },
    Standalone,
    Failed,
}

impl From<IntentReply> for IntentResult {
    fn from(reply: IntentReply) -> Self {
        match reply.question {
            Some(q) if reply.status.trim().eq_ignore_ascii_case("valid") && !q.trim().is_empty() => {
                Self::Continuation {
                    question: q.trim().to_owned(),
                }
            }
            _ => Self::Standalone,
        }
    }
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct BreakdownReply {
    #[serde(rename = "subQueries", alias = "sub_queries")]
    pub sub_queries: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecompositionResult {
    SubQueries(Vec<String>),
    Failed,
}

impl DecompositionResult {
    #[must_use]
    pub fn into_sub_queries(self) -> Vec<String> {
        match self {
            Self::SubQueries(q) => q,
            Self::Failed => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct KeywordReply {
    /// One keyword list per query, positionally.
    pub keywords: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeywordResult {
    PerQuery(Vec<BTreeSet<String>>),
    ShapeMismatch { expected: usize, got: usize },
    Failed,
}

impl KeywordResult {
    fn from_reply(reply: KeywordReply, expected: usize) -> Self {
        if reply.keywords.len() != expected {
            return Self::ShapeMismatch {
                expected,
                got: reply.keywords.len(),
            };
        }
        Self::PerQuery(
            reply
                .keywords
                .into_iter()
                .map(|list| {
                    list.into_iter()
                        .map(|k| k.trim().to_owned())
                        .filter(|k| !k.is_empty())
                        .collect()
                })
                .collect(),
        )
    }

    /// Zip keyword sets onto `queries`; anything but a well-shaped reply gives
    /// every query an empty set.
    #[must_use]
    pub fn into_pairs(self, queries: &[String]) -> Vec<QueryKeywords> {
        match self {
            Self::PerQuery(sets) => queries
                .iter()
                .zip(sets)
                .map(|(q, keywords)| QueryKeywords {
                    query: q.clone(),
                    keywords,
                })
                .collect(),
            Self::ShapeMismatch { .. } | Self::Failed => queries
                .iter()
                .map(QueryKeywords::without_keywords)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct RelevanceReply {
    #[serde(rename = "relevantContextIds", alias = "relevant_context_ids")]
    pub relevant_context_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelevanceResult {
    Relevant(HashSet<String>),
    /// Nothing passes.
    Failed,
}

impl RelevanceResult {
    #[must_use]
    pub fn approves(&self, id: &str) -> bool {
        match self {
            Self::Relevant(ids) => ids.contains(id),
            Self::Failed => false,
        }
    }
}

pub async fn synthesize_intent<P: LlmProvider>(
    provider: &P,
    system_prompt: &str,
    window: &[Message],
    query: &str,
    limit: Duration,
) -> IntentResult {
    let messages = prompts::intent_messages(system_prompt, window, query);
    match bounded(limit, provider.chat_typed::<IntentReply>(&messages)).await {
        Ok(reply) => reply.into(),
        Err(e) => {
            tracing::warn!(error = %e, "intent synthesis failed");
            IntentResult::Failed
        }
    }
}

pub async fn break_down<P: LlmProvider>(provider: &P, query: &str, limit: Duration) -> DecompositionResult {
    let messages = prompts::breakdown_messages(query);
    match bounded(limit, provider.chat_typed::<BreakdownReply>(&messages)).await {
        Ok(reply) => DecompositionResult::SubQueries(reply.sub_queries),
        Err(e) => {
            tracing::warn!(error = %e, "query breakdown failed");
            DecompositionResult::Failed
        }
    }
}

pub async fn extract_keywords<P: LlmProvider>(
    provider: &P,
    queries: &[String],
    limit: Duration,
) -> KeywordResult {
    let messages = prompts::keyword_messages(queries);
    match bounded(limit, provider.chat_typed::<KeywordReply>(&messages)).await {
        Ok(reply) => {
            let result = KeywordResult::from_reply(reply, queries.len());
            if let KeywordResult::ShapeMismatch { expected, got } = result {
                tracing::warn!(expected, got, "keyword reply does not match query count");
            }
            result
        }
        Err(e) => {
            tracing::warn!(error = %e, "keyword extraction failed");
            KeywordResult::Failed
        }
    }
}

pub async fn classify_relevance<P: LlmProvider>(
    provider: &P,
    query: &str,
    candidates: &[Candidate],
    limit: Duration,
) -> RelevanceResult {
    let messages = prompts::relevance_messages(query, candidates);
    match bounded(limit, provider.chat_typed::<RelevanceReply>(&messages)).await {
        Ok(reply) => RelevanceResult::Relevant(reply.relevant_context_ids.into_iter().collect()),
        Err(e) => {
            tracing::warn!(error = %e, "relevance filter failed, dropping candidates");
            RelevanceResult::Failed
        }
    }
}
