use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use ragline_core::{AssembledContext, Config, ContextPipeline, backends};
use ragline_corpus::{AccessScope, CorpusRecord, Embedder, InMemoryCorpus, InMemoryHistory};
use ragline_llm::compatible::CompatibleProvider;

/// Assemble retrieval context for one chat turn
#[derive(Parser, Debug)]
#[command(name = "ragline", version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, env = "RAGLINE_CONFIG", default_value = "config/default.toml")]
    config: PathBuf,

    /// JSON file holding an array of corpus records
    #[arg(long)]
    corpus: PathBuf,

    #[arg(long, default_value = "cli")]
    user: String,

    #[arg(long, default_value = "default")]
    session: String,

    /// Restrict retrieval to documents of these projects (repeatable)
    #[arg(long = "project")]
    projects: Vec<String>,

    /// Print query analysis, document ids and context as JSON
    #[arg(long)]
    json: bool,

    /// The question; when omitted the configured default query is used
    query: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_subscriber();
    let cli = Cli::parse();

    let config = Config::load(&cli.config)?;
    config.validate()?;

    let provider = Arc::new(create_provider(&config)?);
    let records = load_records(&cli.corpus).await?;
    let scope = access_scope(&cli.projects, &records);
    let corpus = Arc::new(InMemoryCorpus::from_records(records)?);
    let embedder = backends::embedder(&config, Arc::clone(&provider)).await?;
    embed_missing(&corpus, embedder.as_ref()).await?;

    let mut pipeline = ContextPipeline::new(
        &config,
        provider,
        corpus,
        embedder,
        Arc::new(InMemoryHistory::new()),
    )?;
    if let Some(reranker) = backends::reranker(&config)? {
        pipeline = pipeline.with_reranker(reranker);
    }

    let query = cli.query.join(" ");
    let assembled = pipeline
        .assemble(&query, &cli.user, &cli.session, scope.as_ref())
        .await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report(&assembled))?);
    } else if assembled.context.is_empty() {
        tracing::warn!("no relevant documents found");
    } else {
        println!("{}", assembled.context);
    }
    Ok(())
}

fn init_subscriber() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn create_provider(config: &Config) -> anyhow::Result<CompatibleProvider> {
    CompatibleProvider::new(
        "compatible",
        config.llm.api_key.clone(),
        config.llm.base_url.clone(),
        config.llm.model.clone(),
        config.llm.max_tokens,
        Some(config.llm.embedding_model.clone()),
    )
    .context("failed to create LLM provider")
}

async fn load_records(path: &Path) -> anyhow::Result<Vec<CorpusRecord>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read corpus file {}", path.display()))?;
    serde_json::from_str(&raw).context("failed to parse corpus file")
}

/// Scope covering the given projects plus general-access documents, or `None`
/// when no project was requested.
fn access_scope(projects: &[String], records: &[CorpusRecord]) -> Option<AccessScope> {
    if projects.is_empty() {
        return None;
    }
    let mut scope = AccessScope {
        projects: projects.to_vec(),
        ..AccessScope::default()
    };
    let filter = scope.vector_filter();
    scope.allowed_ids = records
        .iter()
        .filter(|r| filter.matches(&r.metadata))
        .map(|r| r.id.clone())
        .collect();
    Some(scope)
}

async fn embed_missing(corpus: &InMemoryCorpus, embedder: &dyn Embedder) -> anyhow::Result<()> {
    let pending = corpus.unembedded()?;
    if pending.is_empty() {
        return Ok(());
    }
    let mut embedded = 0usize;
    for (id, text) in &pending {
        match embedder.embed(text).await {
            Ok(vector) => {
                corpus.set_vector(id, vector)?;
                embedded += 1;
            }
            Err(e) => tracing::warn!(%id, "embedding failed: {e:#}"),
        }
    }
    tracing::info!("embedded {embedded} of {} corpus chunk(s)", pending.len());
    Ok(())
}

fn report(assembled: &AssembledContext) -> serde_json::Value {
    serde_json::json!({
        "query": assembled.processed.original_query,
        "sub_queries": assembled.processed.sub_queries,
        "source_document_ids": assembled.source_document_ids(),
        "documents": assembled.ranked,
        "context": assembled.context,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn record(id: &str, metadata: serde_json::Value) -> CorpusRecord {
        CorpusRecord {
            id: id.into(),
            text: format!("text {id}"),
            metadata: serde_json::from_value(metadata).unwrap(),
            vector: None,
        }
    }

    #[test]
    fn cli_parses_query_words() {
        let cli = Cli::parse_from([
            "ragline",
            "--corpus",
            "docs.json",
            "--project",
            "apollo",
            "how",
            "many",
            "days",
        ]);
        assert_eq!(cli.query.join(" "), "how many days");
        assert_eq!(cli.projects, vec!["apollo"]);
        assert_eq!(cli.user, "cli");
    }

    #[test]
    fn no_projects_means_no_scope() {
        assert!(access_scope(&[], &[record("a", json!({}))]).is_none());
    }

    #[test]
    fn scope_admits_project_and_general_ids() {
        let records = vec![
            record("mine", json!({ "project": "apollo" })),
            record("shared", json!({ "access": "general" })),
            record("other", json!({ "project": "zeus" })),
        ];
        let scope = access_scope(&["apollo".to_owned()], &records).unwrap();
        let mut ids: Vec<_> = scope.allowed_ids.iter().map(String::as_str).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec!["mine", "shared"]);
    }

    #[tokio::test]
    async fn load_records_reads_json_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpus.json");
        std::fs::write(&path, r#"[{"id":"a","text":"alpha"},{"id":"b","text":"beta","vector":[1.0]}]"#)
            .unwrap();
        let records = load_records(&path).await.unwrap();
        assert_eq!(records.len(), 2);
        assert!(records[0].vector.is_none());
        assert_eq!(records[1].vector.as_deref(), Some(&[1.0][..]));
    }

    #[tokio::test]
    async fn load_records_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_records(&dir.path().join("absent.json")).await.unwrap_err();
        assert!(err.to_string().contains("failed to read corpus file"));
    }
}
