//! Entity Graph Analytics
//!
//! Graph analytics over extracted entity graphs:
//! - Louvain community detection, with an incremental Dynamic Frontier variant
//! - PageRank with dangling-node handling
//! - Brandes betweenness centrality with sampling and bridge detection
//!
//! Snapshots come from a [`graph::GraphSnapshotProvider`]; every algorithm
//! runs synchronously over an immutable in-memory graph.

pub mod graph;

use anyhow::Result;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use graph::{
    AnalyticsConfig, BetweennessConfig, IncrementalConfig, LouvainConfig, PageRankConfig,
};

// ============================================================================
// YAML config structs (deserialization targets)
// ============================================================================

/// Top-level YAML configuration file structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub snapshot: SnapshotYamlConfig,
    pub louvain: LouvainConfig,
    pub pagerank: PageRankConfig,
    pub betweenness: BetweennessConfig,
    pub incremental: IncrementalConfig,
}

/// Snapshot source section
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SnapshotYamlConfig {
    /// JSON snapshot file (`{nodes, edges}`)
    pub path: Option<String>,
    /// Cap on entities loaded from the snapshot
    pub limit: Option<usize>,
}

// ============================================================================
// Runtime config (what the application actually uses)
// ============================================================================

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub snapshot_path: Option<PathBuf>,
    pub analytics: AnalyticsConfig,
}

impl Config {
    /// Load configuration from environment variables only.
    /// Equivalent to from_yaml_and_env(None).
    pub fn from_env() -> Result<Self> {
        Self::from_yaml_and_env(None)
    }

    /// Load configuration from an optional YAML file, then override with env vars.
    ///
    /// Priority: env var > YAML > default
    ///
    /// If `yaml_path` is None, tries "config.yaml" in CWD. The resulting
    /// analytics configuration is validated before it is returned.
    pub fn from_yaml_and_env(yaml_path: Option<&Path>) -> Result<Self> {
        let yaml = Self::load_yaml(yaml_path);

        let mut analytics = AnalyticsConfig {
            louvain: yaml.louvain,
            pagerank: yaml.pagerank,
            betweenness: yaml.betweenness,
            incremental: yaml.incremental,
            snapshot_limit: env_parse("ANALYTICS_SNAPSHOT_LIMIT").or(yaml.snapshot.limit),
        };
        if let Some(resolution) = env_parse("ANALYTICS_LOUVAIN_RESOLUTION") {
            analytics.louvain.resolution = resolution;
        }
        if let Some(damping) = env_parse("ANALYTICS_PAGERANK_DAMPING") {
            analytics.pagerank.damping_factor = damping;
        }
        if let Some(sample_size) = env_parse("ANALYTICS_BETWEENNESS_SAMPLE_SIZE") {
            analytics.betweenness.sample_size = Some(sample_size);
        }
        if let Some(seed) = env_parse("ANALYTICS_BETWEENNESS_SEED") {
            analytics.betweenness.seed = seed;
        }
        if let Some(ratio) = env_parse("ANALYTICS_INCREMENTAL_MAX_CHANGE_RATIO") {
            analytics.incremental.max_change_ratio = ratio;
        }
        analytics.validate()?;

        Ok(Self {
            snapshot_path: std::env::var("ANALYTICS_SNAPSHOT_PATH")
                .ok()
                .or(yaml.snapshot.path)
                .map(PathBuf::from),
            analytics,
        })
    }

    /// Try to load and parse a YAML config file. Returns defaults on any failure.
    fn load_yaml(yaml_path: Option<&Path>) -> YamlConfig {
        let default_path = Path::new("config.yaml");
        let path = yaml_path.unwrap_or(default_path);

        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_yaml::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                    YamlConfig::default()
                }
            },
            Err(_) => {
                tracing::debug!(
                    "No config file at {}, using env vars / defaults",
                    path.display()
                );
                YamlConfig::default()
            }
        }
    }
}

/// Read and parse an env var; unset or unparsable values are ignored.
fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring unparsable {}={:?}", name, raw);
            None
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
