//! Entity Graph Analytics - CLI
//!
//! Runs community detection and centrality over a JSON graph snapshot and
//! prints the results as JSON.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use entity_graph_analytics::graph::{
    AnalyticsConfig, AnalyticsEngine, CommunityInfo, GraphAnalyticsEngine, GraphSnapshot,
    InMemorySnapshotProvider,
};
use entity_graph_analytics::Config;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "graph-analytics")]
#[command(about = "Community detection and centrality over entity graphs")]
struct Cli {
    /// YAML config file (default: ./config.yaml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// JSON snapshot file (overrides config and ANALYTICS_SNAPSHOT_PATH)
    #[arg(short, long, global = true)]
    snapshot: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect Louvain communities
    Communities {
        /// Only print the N largest communities
        #[arg(short, long)]
        top: Option<usize>,
    },

    /// Detect communities within a set of entities
    Subgraph {
        /// Entity IDs spanning the subgraph
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Rank entities by PageRank
    Pagerank {
        #[arg(short, long, default_value = "10")]
        top: usize,
    },

    /// Rank entities by betweenness centrality
    Betweenness {
        #[arg(short, long, default_value = "10")]
        top: usize,

        /// Sample this many source nodes instead of all
        #[arg(long)]
        sample_size: Option<usize>,
    },

    /// List bridge entities above a normalized betweenness threshold
    Bridges {
        #[arg(short, long, default_value = "0.1")]
        threshold: f64,
    },

    /// Show community and centrality scores for one entity
    Entity {
        /// Entity ID
        id: String,
    },
}

#[derive(Serialize)]
struct EntityReport {
    id: String,
    community: Option<CommunityInfo>,
    pagerank: Option<f64>,
    betweenness: Option<f64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Initialize tracing (stderr, so stdout stays valid JSON)
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,entity_graph_analytics=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = Config::from_yaml_and_env(cli.config.as_deref())?;
    let snapshot_path = cli
        .snapshot
        .or(config.snapshot_path)
        .context("no snapshot given (use --snapshot or ANALYTICS_SNAPSHOT_PATH)")?;

    let engine = load_engine(&snapshot_path, config.analytics)?;

    match cli.command {
        Commands::Communities { top } => {
            let result = engine.detect_communities(None).await?;
            match top {
                Some(n) => print_json(&result.top_communities(n)),
                None => print_json(&result),
            }
        }
        Commands::Subgraph { ids } => {
            print_json(&engine.detect_subgraph_communities(&ids).await?)
        }
        Commands::Pagerank { top } => {
            print_json(&engine.get_top_entities_by_pagerank(top).await?)
        }
        Commands::Betweenness { top, sample_size } => {
            let mut options = engine.config().betweenness.clone();
            if sample_size.is_some() {
                options.sample_size = sample_size;
            }
            let result = engine.calculate_betweenness(Some(options)).await?;
            print_json(&result.top_entities(top))
        }
        Commands::Bridges { threshold } => {
            let options = engine.config().betweenness.clone();
            print_json(&engine.identify_bridge_entities(threshold, Some(options)).await?)
        }
        Commands::Entity { id } => {
            let report = EntityReport {
                community: engine.get_entity_community(&id).await?,
                pagerank: engine.get_entity_pagerank(&id).await?,
                betweenness: engine.get_entity_betweenness(&id).await?,
                id,
            };
            print_json(&report)
        }
    }
}

fn load_engine(path: &Path, config: AnalyticsConfig) -> Result<GraphAnalyticsEngine> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read snapshot {}", path.display()))?;
    let snapshot: GraphSnapshot = serde_json::from_str(&contents)
        .with_context(|| format!("failed to parse snapshot {}", path.display()))?;
    tracing::info!(
        "Loaded snapshot {}: {} nodes, {} edges",
        path.display(),
        snapshot.nodes.len(),
        snapshot.edges.len()
    );

    let provider = Arc::new(InMemorySnapshotProvider::from_snapshot(snapshot, Utc::now()));
    Ok(GraphAnalyticsEngine::new(provider, config))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
