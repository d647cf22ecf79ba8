use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::error::CorpusError;
use crate::scope::{IdScope, VectorFilter};
use crate::store::{BoxFuture, CorpusStore, ScoredId};
use crate::types::{Candidate, DocumentNode, Metadata};

/// One corpus entry as stored on disk or handed over by an ingestion job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusRecord {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,
}

struct StoredChunk {
    node: DocumentNode,
    vector: Option<Vec<f32>>,
}

#[derive(Default)]
struct Chunks {
    order: Vec<StoredChunk>,
    index: HashMap<String, usize>,
}

/// Corpus held entirely in memory: cosine vector search, term-count keyword search.
pub struct InMemoryCorpus {
    chunks: RwLock<Chunks>,
}

impl InMemoryCorpus {
    #[must_use]
    pub fn new() -> Self {
        Self {
            chunks: RwLock::new(Chunks::default()),
        }
    }

    /// # Errors
    ///
    /// Returns an error if the store lock is poisoned.
    pub fn from_records(records: Vec<CorpusRecord>) -> Result<Self, CorpusError> {
        let corpus = Self::new();
        for record in records {
            let node = DocumentNode {
                id: record.id,
                text: record.text,
                metadata: record.metadata,
            };
            corpus.upsert(node, record.vector)?;
        }
        Ok(corpus)
    }

    /// Insert or replace a chunk. Replacing keeps the original insertion position.
    ///
    /// # Errors
    ///
    /// Returns an error if the store lock is poisoned.
    pub fn upsert(&self, node: DocumentNode, vector: Option<Vec<f32>>) -> Result<(), CorpusError> {
        let mut chunks = self
            .chunks
            .write()
            .map_err(|e| CorpusError::Other(e.to_string()))?;
        let stored = StoredChunk { node, vector };
        if let Some(&pos) = chunks.index.get(&stored.node.id) {
            chunks.order[pos] = stored;
        } else {
            let pos = chunks.order.len();
            chunks.index.insert(stored.node.id.clone(), pos);
            chunks.order.push(stored);
        }
        Ok(())
    }

    /// Ids of chunks that still need an embedding.
    ///
    /// # Errors
    ///
    /// Returns an error if the store lock is poisoned.
    pub fn unembedded(&self) -> Result<Vec<(String, String)>, CorpusError> {
        let chunks = self
            .chunks
            .read()
            .map_err(|e| CorpusError::Other(e.to_string()))?;
        Ok(chunks
            .order
            .iter()
            .filter(|c| c.vector.is_none())
            .map(|c| (c.node.id.clone(), c.node.text.clone()))
            .collect())
    }

    /// Attach an embedding to an existing chunk.
    ///
    /// # Errors
    ///
    /// Returns `CorpusError::Lookup` if `id` is unknown.
    pub fn set_vector(&self, id: &str, vector: Vec<f32>) -> Result<(), CorpusError> {
        let mut chunks = self
            .chunks
            .write()
            .map_err(|e| CorpusError::Other(e.to_string()))?;
        let pos = *chunks
            .index
            .get(id)
            .ok_or_else(|| CorpusError::Lookup(format!("chunk {id} not found")))?;
        chunks.order[pos].vector = Some(vector);
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.read().map_or(0, |c| c.order.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryCorpus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryCorpus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryCorpus")
            .field("chunks", &self.len())
            .finish()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn normalize_keywords(keywords: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(keywords.len());
    for kw in keywords {
        let kw = kw.trim().to_lowercase();
        if !kw.is_empty() && !out.contains(&kw) {
            out.push(kw);
        }
    }
    out
}

#[allow(clippy::cast_precision_loss)]
fn keyword_score(text: &str, keywords: &[String]) -> f32 {
    let haystack = text.to_lowercase();
    keywords
        .iter()
        .map(|kw| haystack.matches(kw.as_str()).count())
        .sum::<usize>() as f32
}

impl CorpusStore for InMemoryCorpus {
    fn vector_search(
        &self,
        vector: Vec<f32>,
        limit: usize,
        filter: Option<VectorFilter>,
    ) -> BoxFuture<'_, Result<Vec<ScoredId>, CorpusError>> {
        Box::pin(async move {
            let chunks = self
                .chunks
                .read()
                .map_err(|e| CorpusError::Search(e.to_string()))?;
            let filter = filter.unwrap_or_default();

            let mut scored: Vec<ScoredId> = chunks
                .order
                .iter()
                .filter(|c| filter.matches(&c.node.metadata))
                .filter_map(|c| {
                    c.vector.as_ref().map(|v| ScoredId {
                        id: c.node.id.clone(),
                        score: cosine_similarity(&vector, v),
                    })
                })
                .collect();

            scored.sort_by(|a, b| b.score.total_cmp(&a.score));
            scored.truncate(limit);
            tracing::debug!(hits = scored.len(), limit, "in-memory vector search");
            Ok(scored)
        })
    }

    fn keyword_search(
        &self,
        keywords: Vec<String>,
        limit: usize,
        scope: Option<IdScope>,
    ) -> BoxFuture<'_, Result<Vec<Candidate>, CorpusError>> {
        Box::pin(async move {
            let keywords = normalize_keywords(keywords);
            if keywords.is_empty() {
                return Ok(Vec::new());
            }
            let chunks = self
                .chunks
                .read()
                .map_err(|e| CorpusError::Search(e.to_string()))?;

            let mut hits: Vec<Candidate> = chunks
                .order
                .iter()
                .filter(|c| scope.as_ref().is_none_or(|s| s.contains(&c.node.id)))
                .filter_map(|c| {
                    let score = keyword_score(&c.node.text, &keywords);
                    (score > 0.0).then(|| c.node.clone().into_candidate(Some(score)))
                })
                .collect();

            hits.sort_by(|a, b| {
                b.score
                    .unwrap_or_default()
                    .total_cmp(&a.score.unwrap_or_default())
            });
            hits.truncate(limit);
            tracing::debug!(hits = hits.len(), keywords = keywords.len(), "in-memory keyword search");
            Ok(hits)
        })
    }

    fn get_by_ids(&self, ids: Vec<String>) -> BoxFuture<'_, Result<Vec<DocumentNode>, CorpusError>> {
        Box::pin(async move {
            let chunks = self
                .chunks
                .read()
                .map_err(|e| CorpusError::Lookup(e.to_string()))?;
            Ok(ids
                .iter()
                .filter_map(|id| chunks.index.get(id))
                .map(|&pos| chunks.order[pos].node.clone())
                .collect())
        })
    }

    fn get_all(&self) -> BoxFuture<'_, Result<Vec<DocumentNode>, CorpusError>> {
        Box::pin(async move {
            let chunks = self
                .chunks
                .read()
                .map_err(|e| CorpusError::Lookup(e.to_string()))?;
            Ok(chunks.order.iter().map(|c| c.node.clone()).collect())
        })
    }
}
