use anyhow::{Context, Result};
use clap::Parser;
use indexmap::IndexMap;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use communities::{
    CommunityId, CommunityScheduler, EdgeRecord, EntityGraph, EntityRecord, OllamaReportClient, SummarizerConfig,
    TiktokenCounter, group_by_community,
};

/// Summarize knowledge-graph communities into reports with an LLM
#[derive(Parser, Debug)]
#[command(name = "summarize-communities", version)]
struct Args {
    /// Community data: JSON object mapping community id to its entity records
    #[arg(long, required_unless_present = "graph", conflicts_with = "graph")]
    community_data: Option<PathBuf>,

    /// Graph edges: JSON array of {source, target, ...attributes}
    #[arg(long, requires = "communities")]
    graph: Option<PathBuf>,

    /// Community assignment: JSON object mapping entity id to community id
    #[arg(long, requires = "graph")]
    communities: Option<PathBuf>,

    /// Where to save community data grouped from --graph/--communities
    #[arg(long)]
    community_data_out: Option<PathBuf>,

    #[arg(long, default_value = "data/communities/community-reports.json")]
    output: PathBuf,

    /// Summarizer settings as JSON; missing fields use defaults
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = "http://localhost:11434")]
    ollama_url: String,

    /// Overrides the model from --config
    #[arg(long)]
    model: Option<String>,

    /// Disable cooldowns and jitter and allow more concurrent requests (local, unthrottled service)
    #[arg(long)]
    fast: bool,

    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.json_logs);

    let config = load_config(&args).await?;
    config.validate().context("Invalid summarizer config")?;
    info!(model = %config.model, token_limit = config.token_limit, "Summarizer configured");

    let community_data = load_community_data(&args).await?;
    info!(communities = community_data.len(), "Loaded community data");

    let counter = TiktokenCounter::for_model(&config.model).context("Failed to load tokenizer")?;
    let client = Arc::new(OllamaReportClient::new(args.ollama_url.clone(), config.retry));
    let scheduler = CommunityScheduler::from_config(Arc::new(counter), client.clone(), client, &config)?;

    let progress = scheduler.progress();
    let reporter = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(15));
        loop {
            interval.tick().await;
            let snapshot = progress.snapshot();
            info!(
                completed = snapshot.completed,
                total = snapshot.total_communities,
                failed = snapshot.failed,
                "Progress {:.0}%",
                snapshot.fraction_done() * 100.0
            );
        }
    });

    let run = scheduler.summarize_all(&community_data).await;
    reporter.abort();

    for failure in &run.failures {
        tracing::warn!(community_id = %failure.community_id, error = %failure.error, "Community left out");
    }
    for (community_id, skipped) in &run.skipped {
        tracing::warn!(community_id = %community_id, records = skipped.len(), "Records skipped during chunking");
    }

    write_json(&args.output, &run.reports).await?;

    let snapshot = scheduler.progress().snapshot();
    info!(
        reports = run.reports.len(),
        failed = run.failures.len(),
        prompt_tokens = run.usage.prompt_tokens,
        completion_tokens = run.usage.completion_tokens,
        total_tokens = run.usage.total_tokens,
        llm_calls = run.usage.llm_calls,
        generator_calls = snapshot.generator_calls,
        combiner_calls = snapshot.combiner_calls,
        output = %args.output.display(),
        "Saved community reports"
    );

    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn load_config(args: &Args) -> Result<SummarizerConfig> {
    let mut config = match &args.config {
        Some(path) => read_json(path).await?,
        None => SummarizerConfig::default(),
    };

    if args.fast {
        config = config.unthrottled();
    }
    if let Some(model) = &args.model {
        config.model = model.clone();
    }

    Ok(config)
}

async fn load_community_data(args: &Args) -> Result<BTreeMap<CommunityId, Vec<EntityRecord>>> {
    if let Some(path) = &args.community_data {
        return read_json(path).await;
    }

    let (Some(graph_path), Some(communities_path)) = (&args.graph, &args.communities) else {
        anyhow::bail!("Either --community-data or --graph with --communities is required");
    };

    let edges: Vec<EdgeRecord> = read_json(graph_path).await?;
    let graph = EntityGraph::from_edges(edges);
    info!(entities = graph.entities.len(), edges = graph.edge_count(), "Loaded graph");

    // Members keep the order of the assignment file
    let assignment: IndexMap<String, serde_json::Value> = read_json(communities_path).await?;
    let membership = assignment
        .into_iter()
        .map(|(entity, community)| {
            let community_id = match community {
                serde_json::Value::String(id) => CommunityId::from(id),
                other => CommunityId::from(other.to_string()),
            };
            (entity, community_id)
        })
        .collect::<Vec<_>>();

    let community_data = group_by_community(&graph, membership);

    if let Some(out) = &args.community_data_out {
        write_json(out, &community_data).await?;
        info!(path = %out.display(), "Saved community data");
    }

    Ok(community_data)
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = tokio::fs::read_to_string(path)
        .await
        .context(format!("Failed to read file: {:?}", path))?;
    serde_json::from_str(&content).context(format!("Failed to parse JSON: {:?}", path))
}

async fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_string_pretty(value)?;
    tokio::fs::write(path, json)
        .await
        .context(format!("Failed to write file: {:?}", path))
}
