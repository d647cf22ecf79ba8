use std::sync::Arc;

use ragline_core::{Config, ContextPipeline};
use ragline_corpus::{
    AccessScope, CorpusRecord, InMemoryCorpus, InMemoryHistory, ProviderEmbedder,
};
use ragline_llm::mock::MockProvider;
use ragline_llm::{LlmError, Message};
use ragline_models::{
    CrossEncoder, DeviceKind, DeviceMonitor, ModelLoader, RerankConfig, RerankService, Result,
};
use serde_json::json;

const QUERY: &str = "how many leave days";
const SUB_QUERY: &str = "leave policy";

fn record(id: &str, text: &str, vector: Vec<f32>, metadata: serde_json::Value) -> CorpusRecord {
    CorpusRecord {
        id: id.into(),
        text: text.into(),
        metadata: serde_json::from_value(metadata).unwrap(),
        vector: Some(vector),
    }
}

/// A parent chunk with two children plus one unrelated chunk that the
/// relevance agent always rejects.
fn corpus() -> InMemoryCorpus {
    InMemoryCorpus::from_records(vec![
        record(
            "handbook",
            "Time off handbook, full section",
            vec![0.0, 0.0, 1.0],
            json!({ "access": "general" }),
        ),
        record(
            "c1",
            "Employees get twelve leave days",
            vec![1.0, 0.0, 0.0],
            json!({ "access": "general", "relationships": { "PARENT": "handbook" } }),
        ),
        record(
            "c2",
            "Leave requests need manager approval",
            vec![1.0, 0.0, 0.0],
            json!({ "access": "general", "relationships": { "1": { "node_id": "handbook" } } }),
        ),
        record(
            "noise",
            "Parking policy",
            vec![0.0, 1.0, 0.0],
            json!({ "access": "general" }),
        ),
    ])
    .unwrap()
}

/// Agent that breaks the query into one sub-query and approves every
/// candidate except `noise`.
fn agent() -> MockProvider {
    MockProvider::routed(|msgs: &[Message]| {
        let system = &msgs[0].content;
        let reply = if system.contains("Task: intent synthesis") {
            json!({ "status": "invalid" })
        } else if system.contains("Task: query breakdown") {
            json!({ "subQueries": [SUB_QUERY] })
        } else if system.contains("Task: keyword extraction") {
            json!({ "keywords": [["leave"], ["policy"]] })
        } else if system.contains("Task: relevance filtering") {
            let payload: serde_json::Value = serde_json::from_str(&msgs[1].content)
                .map_err(|e| LlmError::Other(e.to_string()))?;
            let ids: Vec<&str> = payload["candidates"]
                .as_array()
                .into_iter()
                .flatten()
                .filter_map(|c| c["id"].as_str())
                .filter(|id| *id != "noise")
                .collect();
            json!({ "relevantContextIds": ids })
        } else {
            return Err(LlmError::Other("unexpected prompt".into()));
        };
        Ok(reply.to_string())
    })
    .with_embedding(vec![1.0, 0.0, 0.0])
}

fn config() -> Config {
    let mut config = Config::default();
    config.retrieval.vector_top_k = 2;
    config
}

fn pipeline(config: &Config) -> ContextPipeline<MockProvider> {
    let provider = Arc::new(agent());
    let embedder = Arc::new(ProviderEmbedder::new(Arc::clone(&provider)));
    ContextPipeline::new(
        config,
        provider,
        Arc::new(corpus()),
        embedder,
        Arc::new(InMemoryHistory::new()),
    )
    .unwrap()
}

/// Scores a passage by its length.
struct LengthEncoder;

impl CrossEncoder for LengthEncoder {
    fn score_pairs(&self, _query: &str, passages: &[String]) -> Result<Vec<f32>> {
        #[allow(clippy::cast_precision_loss)]
        Ok(passages.iter().map(|p| p.len() as f32).collect())
    }

    fn name(&self) -> &str {
        "length"
    }
}

struct LengthLoader;

impl ModelLoader for LengthLoader {
    fn load(&self, _name: &str, _device: DeviceKind) -> Result<Arc<dyn CrossEncoder>> {
        Ok(Arc::new(LengthEncoder))
    }
}

struct CpuOnly;

impl DeviceMonitor for CpuOnly {
    fn gpu(&self) -> Option<DeviceKind> {
        None
    }

    fn free_memory_ratio(&self, _device: DeviceKind) -> Option<f32> {
        None
    }

    fn reclaim(&self, _device: DeviceKind) {}
}

fn reranker() -> Arc<RerankService> {
    Arc::new(RerankService::new(
        Arc::new(LengthLoader),
        Arc::new(CpuOnly),
        RerankConfig::default(),
    ))
}

#[tokio::test]
async fn assembles_relevant_leaves() {
    let out = pipeline(&config()).assemble(QUERY, "u1", "s1", None).await.unwrap();

    assert_eq!(out.processed.sub_queries, vec![QUERY.to_owned(), SUB_QUERY.to_owned()]);
    assert_eq!(out.source_document_ids(), vec!["c1", "c2"]);
    let ids: Vec<_> = out.ranked.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["c1", "c2"]);
    assert_eq!(
        out.context,
        "### Document 1\nEmployees get twelve leave days\n\n---\n\n\
         ### Document 2\nLeave requests need manager approval"
    );
    assert_eq!(out.context, out.bundle.context_string);
}

#[tokio::test]
async fn merge_promotes_complete_siblings() {
    let mut config = config();
    config.merge.enabled = true;
    let out = pipeline(&config).assemble(QUERY, "u1", "s1", None).await.unwrap();

    assert_eq!(out.source_document_ids(), vec!["c1", "c2"]);
    let ids: Vec<_> = out.ranked.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["handbook"]);
    assert_eq!(out.context, "### Document 1\nTime off handbook, full section");
}

#[tokio::test]
async fn rerank_orders_final_documents() {
    let out = pipeline(&config())
        .with_reranker(reranker())
        .assemble(QUERY, "u1", "s1", None)
        .await
        .unwrap();

    let ids: Vec<_> = out.ranked.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["c2", "c1"]);
    assert!(out.ranked.iter().all(|c| c.score.is_some()));
    assert!(out.ranked.iter().all(|c| c.metadata.is_empty()));
    assert!(out.context.starts_with("### Document 1\nLeave requests"));
}

#[tokio::test]
async fn history_feeds_the_decomposer() {
    let history = Arc::new(InMemoryHistory::new());
    history.append("u1", "s1", Message::user("earlier question")).unwrap();
    history.append("u1", "s1", Message::assistant("earlier answer")).unwrap();
    history.append("u1", "other", Message::user("not mine")).unwrap();

    let provider = Arc::new(agent());
    let embedder = Arc::new(ProviderEmbedder::new(Arc::clone(&provider)));
    let pipeline = ContextPipeline::new(&config(), provider, Arc::new(corpus()), embedder, history).unwrap();

    let pq = pipeline.analyze_query(QUERY, "u1", "s1").await.unwrap();
    let contents: Vec<_> = pq.history_messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["earlier question", "earlier answer"]);
}

#[tokio::test]
async fn scope_hides_documents_outside_access() {
    let scope = AccessScope {
        projects: vec!["apollo".into()],
        ..AccessScope::default()
    };
    let provider = Arc::new(agent());
    let embedder = Arc::new(ProviderEmbedder::new(Arc::clone(&provider)));
    let corpus = InMemoryCorpus::from_records(vec![record(
        "secret",
        "Leave days for the zeus project",
        vec![1.0, 0.0, 0.0],
        json!({ "project": "zeus" }),
    )])
    .unwrap();
    let pipeline = ContextPipeline::new(
        &config(),
        provider,
        Arc::new(corpus),
        embedder,
        Arc::new(InMemoryHistory::new()),
    )
    .unwrap();

    let out = pipeline.assemble(QUERY, "u1", "s1", Some(&scope)).await.unwrap();
    assert!(out.ranked.is_empty());
    assert!(out.context.is_empty());
}

#[tokio::test]
async fn merge_hierarchy_is_available_directly() {
    let pipeline = pipeline(&config());
    let all: Vec<_> = corpus_nodes();
    let leaves: Vec<_> = all.iter().filter(|n| n.id.starts_with('c')).cloned().collect();
    let merged = pipeline.merge_hierarchy(&leaves, &all);
    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].id, "handbook");
}

fn corpus_nodes() -> Vec<ragline_corpus::DocumentNode> {
    ["handbook", "c1", "c2"]
        .iter()
        .map(|id| {
            let node = ragline_corpus::DocumentNode::new(*id, format!("text {id}"));
            if *id == "handbook" {
                node
            } else {
                node.with_metadata(
                    serde_json::from_value(json!({ "relationships": { "PARENT": "handbook" } }))
                        .unwrap(),
                )
            }
        })
        .collect()
}
