use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub type Metadata = HashMap<String, serde_json::Value>;

/// Metadata key holding the unmodified source text of a contextualized chunk.
pub const ORIGINAL_CONTENT_KEY: &str = "original_content";

/// A retrieved document fragment under consideration for the final context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Candidate {
    #[must_use]
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            score: None,
            metadata: Metadata::new(),
        }
    }

    #[must_use]
    pub fn with_score(mut self, score: f32) -> Self {
        self.score = Some(score);
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// A candidate may only travel downstream with a non-blank id and text.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        !self.id.trim().is_empty() && !self.text.trim().is_empty()
    }

    /// The source text before any contextual rewriting, when ingestion kept it.
    #[must_use]
    pub fn original_content(&self) -> Option<&str> {
        self.metadata
            .get(ORIGINAL_CONTENT_KEY)
            .and_then(serde_json::Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }

    /// Text the cross-encoder should score: original content if present, else `text`.
    #[must_use]
    pub fn scoring_text(&self) -> &str {
        self.original_content().unwrap_or(&self.text)
    }

    /// Copy of this candidate with metadata removed.
    #[must_use]
    pub fn stripped(&self) -> Self {
        Self {
            id: self.id.clone(),
            text: self.text.clone(),
            score: self.score,
            metadata: Metadata::new(),
        }
    }
}

/// A stored chunk with its serialized metadata, including hierarchy relationships.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentNode {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl DocumentNode {
    #[must_use]
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            metadata: Metadata::new(),
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    #[must_use]
    pub fn into_candidate(self, score: Option<f32>) -> Candidate {
        Candidate {
            id: self.id,
            text: self.text,
            score,
            metadata: self.metadata,
        }
    }
}

impl From<Candidate> for DocumentNode {
    fn from(c: Candidate) -> Self {
        Self {
            id: c.id,
            text: c.text,
            metadata: c.metadata,
        }
    }
}
