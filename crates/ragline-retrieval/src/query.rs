use std::collections::{BTreeSet, HashSet};

use ragline_llm::Message;
use serde::Serialize;

/// One query to search for, with the keywords extracted for it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct QueryKeywords {
    pub query: String,
    pub keywords: BTreeSet<String>,
}

impl QueryKeywords {
    #[must_use]
    pub fn new(query: impl Into<String>, keywords: impl IntoIterator<Item = String>) -> Self {
        Self {
            query: query.into(),
            keywords: keywords.into_iter().collect(),
        }
    }

    #[must_use]
    pub fn without_keywords(query: impl Into<String>) -> Self {
        Self::new(query, [])
    }
}

/// Decomposed form of one chat turn's query. Built once by
/// [`crate::QueryDecomposer::analyze`] and read-only afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessedQuery {
    pub original_query: String,
    /// Original query first, then decomposed and synthesized questions, without duplicates.
    pub sub_queries: Vec<String>,
    pub keywords_per_query: Vec<QueryKeywords>,
    /// Prior user and assistant turns, oldest first.
    pub history_messages: Vec<Message>,
    pub system_prompt: String,
    pub instructions: String,
}

impl ProcessedQuery {
    /// Distinct `(query, keywords)` pairs in first-seen order.
    #[must_use]
    pub fn distinct_pairs(&self) -> Vec<&QueryKeywords> {
        let mut seen = HashSet::new();
        self.keywords_per_query
            .iter()
            .filter(|pair| seen.insert(*pair))
            .collect()
    }
}

/// Order-preserving dedup that also drops blank entries.
pub(crate) fn dedup_queries<I>(queries: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for q in queries {
        let q = q.trim().to_owned();
        if !q.is_empty() && seen.insert(q.clone()) {
            out.push(q);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn processed(pairs: Vec<QueryKeywords>) -> ProcessedQuery {
        ProcessedQuery {
            original_query: "q".into(),
            sub_queries: pairs.iter().map(|p| p.query.clone()).collect(),
            keywords_per_query: pairs,
            history_messages: Vec::new(),
            system_prompt: String::new(),
            instructions: String::new(),
        }
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let out = dedup_queries(["a".to_owned(), " b ".into(), "a".into(), "".into(), "b".into()]);
        assert_eq!(out, vec!["a", "b"]);
    }

    #[test]
    fn distinct_pairs_collapse_identical_entries() {
        let pq = processed(vec![
            QueryKeywords::new("x", ["k".to_owned()]),
            QueryKeywords::new("y", []),
            QueryKeywords::new("x", ["k".to_owned()]),
        ]);
        let pairs = pq.distinct_pairs();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].query, "x");
        assert_eq!(pairs[1].query, "y");
    }

    #[test]
    fn same_query_different_keywords_is_distinct() {
        let pq = processed(vec![
            QueryKeywords::new("x", ["a".to_owned()]),
            QueryKeywords::new("x", ["b".to_owned()]),
        ]);
        assert_eq!(pq.distinct_pairs().len(), 2);
    }
}
