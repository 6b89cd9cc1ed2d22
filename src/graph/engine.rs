//! Analytics engine: orchestrates fetch and compute.
//!
//! The `AnalyticsEngine` trait is the single entry point for analytics
//! consumers (CLI, services). Each call:
//!
//! 1. **Fetch**: pull a snapshot through the `GraphSnapshotProvider`
//! 2. **Convert**: snapshot → `EntityGraph`
//! 3. **Compute**: Louvain, PageRank or betweenness on the read-only graph
//!
//! Convenience views (top-N, per-entity lookups, bridges) are default trait
//! methods layered on the three algorithms.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use super::betweenness::calculate_betweenness as run_betweenness;
use super::incremental::{detect_communities_incremental as run_incremental, IncrementalUpdate};
use super::louvain::detect_communities as run_louvain;
use super::models::{
    AnalyticsConfig, BetweennessConfig, BetweennessResult, CommunityDetectionResult,
    CommunityInfo, EntityEdge, EntityGraph, IncrementalCommunityResult, LouvainConfig,
    PageRankConfig, PageRankResult, RankedEntity,
};
use super::pagerank::calculate_pagerank as run_pagerank;
use super::snapshot::{graph_from_snapshot, graph_from_subgraph, GraphSnapshotProvider};

// ============================================================================
// Trait
// ============================================================================

/// Analytics engine trait: single entry point for graph analytics.
///
/// Consumers use `Arc<dyn AnalyticsEngine>` for dependency injection.
/// `None` configs fall back to the engine's configured defaults; default view
/// methods that need a config of their own start from the type's `Default`.
#[async_trait]
pub trait AnalyticsEngine: Send + Sync {
    /// Partition the full graph into communities.
    async fn detect_communities(
        &self,
        config: Option<LouvainConfig>,
    ) -> Result<CommunityDetectionResult>;

    /// Partition the subgraph spanned by `node_ids`.
    async fn detect_subgraph_communities(
        &self,
        node_ids: &[String],
    ) -> Result<CommunityDetectionResult>;

    /// Update a previous partition against the current graph.
    async fn detect_communities_incremental(
        &self,
        update: &IncrementalUpdate,
    ) -> Result<IncrementalCommunityResult>;

    async fn calculate_pagerank(&self, config: Option<PageRankConfig>) -> Result<PageRankResult>;

    async fn calculate_betweenness(
        &self,
        config: Option<BetweennessConfig>,
    ) -> Result<BetweennessResult>;

    // ------------------------------------------------------------------------
    // Views
    // ------------------------------------------------------------------------

    /// The `n` largest communities.
    async fn get_top_communities(&self, n: usize) -> Result<Vec<CommunityInfo>> {
        Ok(self.detect_communities(None).await?.top_communities(n))
    }

    async fn get_entity_community(&self, id: &str) -> Result<Option<CommunityInfo>> {
        let result = self.detect_communities(None).await?;
        Ok(result.entity_community(id).cloned())
    }

    async fn get_top_entities_by_pagerank(&self, n: usize) -> Result<Vec<RankedEntity>> {
        Ok(self.calculate_pagerank(None).await?.top_entities(n))
    }

    async fn get_entity_pagerank(&self, id: &str) -> Result<Option<f64>> {
        Ok(self.calculate_pagerank(None).await?.entity_score(id))
    }

    async fn get_top_entities_by_betweenness(&self, n: usize) -> Result<Vec<RankedEntity>> {
        Ok(self.calculate_betweenness(None).await?.top_entities(n))
    }

    async fn get_entity_betweenness(&self, id: &str) -> Result<Option<f64>> {
        Ok(self.calculate_betweenness(None).await?.entity_score(id))
    }

    /// Entities with normalized betweenness above `threshold`, highest first.
    ///
    /// Normalization is forced on whatever `config` says. `None` starts from
    /// `BetweennessConfig::default()`.
    async fn identify_bridge_entities(
        &self,
        threshold: f64,
        config: Option<BetweennessConfig>,
    ) -> Result<Vec<RankedEntity>> {
        let mut config = config.unwrap_or_default();
        config.normalized = true;
        Ok(self
            .calculate_betweenness(Some(config))
            .await?
            .entities_above(threshold))
    }
}

// ============================================================================
// Refresh planning
// ============================================================================

/// Why a refresh must recompute everything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FullRefreshReason {
    NoPreviousResult,
    SmallGraph { node_count: usize },
    HighChangeRatio { change_ratio: f64 },
}

/// How the next community refresh should run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RefreshPlan {
    Full { reason: FullRefreshReason },
    Incremental { estimated_change_ratio: f64 },
}

// ============================================================================
// Concrete implementation
// ============================================================================

/// Real analytics engine backed by a `GraphSnapshotProvider`.
pub struct GraphAnalyticsEngine {
    provider: Arc<dyn GraphSnapshotProvider>,
    config: AnalyticsConfig,
}

impl GraphAnalyticsEngine {
    /// Create a new engine backed by the given provider.
    pub fn new(provider: Arc<dyn GraphSnapshotProvider>, config: AnalyticsConfig) -> Self {
        Self { provider, config }
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    async fn load_graph(&self) -> Result<EntityGraph> {
        let snapshot = self.provider.get_all_entities(self.config.snapshot_limit).await?;
        let graph = graph_from_snapshot(&snapshot);
        if graph.dropped_edges > 0 {
            tracing::warn!(
                "Skipped {} malformed edges while loading snapshot",
                graph.dropped_edges
            );
        }
        Ok(graph)
    }

    /// Decide between a full and an incremental refresh without computing.
    pub async fn plan_refresh(
        &self,
        previous: Option<&CommunityDetectionResult>,
        since: DateTime<Utc>,
    ) -> Result<RefreshPlan> {
        if previous.is_none() {
            return Ok(RefreshPlan::Full {
                reason: FullRefreshReason::NoPreviousResult,
            });
        }

        let summary = self.provider.get_graph_change_summary(since).await?;
        let thresholds = &self.config.incremental;
        let change_ratio = summary.estimated_change_ratio();

        let plan = if summary.total_entity_count < thresholds.min_graph_size {
            RefreshPlan::Full {
                reason: FullRefreshReason::SmallGraph {
                    node_count: summary.total_entity_count,
                },
            }
        } else if change_ratio > thresholds.max_change_ratio {
            RefreshPlan::Full {
                reason: FullRefreshReason::HighChangeRatio { change_ratio },
            }
        } else {
            RefreshPlan::Incremental {
                estimated_change_ratio: change_ratio,
            }
        };
        tracing::debug!("Refresh plan since {}: {:?}", since, plan);
        Ok(plan)
    }

    /// Refresh `previous` with everything that changed after `since`.
    ///
    /// Modified entities unknown to `previous` are treated as new nodes.
    pub async fn refresh_communities(
        &self,
        previous: CommunityDetectionResult,
        since: DateTime<Utc>,
    ) -> Result<IncrementalCommunityResult> {
        let modified = self.provider.get_entities_modified_since(since).await?;
        let new_edges = self.provider.get_edges_created_since(since).await?;
        let removed_edges = self.provider.get_edges_removed_since(since).await?;

        let (new_node_ids, modified_node_ids): (Vec<String>, Vec<String>) = modified
            .into_iter()
            .partition(|id| !previous.communities.contains_key(id));

        let update = IncrementalUpdate {
            previous_result: Some(previous),
            new_node_ids,
            new_edges: new_edges.iter().map(EntityEdge::from).collect(),
            removed_edges: removed_edges.iter().map(EntityEdge::from).collect(),
            modified_node_ids,
        };
        self.detect_communities_incremental(&update).await
    }
}

#[async_trait]
impl AnalyticsEngine for GraphAnalyticsEngine {
    async fn detect_communities(
        &self,
        config: Option<LouvainConfig>,
    ) -> Result<CommunityDetectionResult> {
        let config = config.unwrap_or_else(|| self.config.louvain.clone());
        config.validate()?;

        let graph = self.load_graph().await?;
        let start = Instant::now();
        let result = run_louvain(&graph, &config);
        tracing::info!(
            "Louvain: {} nodes, {} communities, modularity={:.4} in {}ms",
            result.metadata.node_count,
            result.metadata.community_count,
            result.modularity,
            start.elapsed().as_millis()
        );
        Ok(result)
    }

    async fn detect_subgraph_communities(
        &self,
        node_ids: &[String],
    ) -> Result<CommunityDetectionResult> {
        let config = &self.config.louvain;
        config.validate()?;

        let subgraph = self.provider.get_subgraph(node_ids).await?;
        let graph = graph_from_subgraph(&subgraph);
        let result = run_louvain(&graph, config);
        tracing::info!(
            "Subgraph Louvain: {} of {} requested nodes, {} communities",
            result.metadata.node_count,
            node_ids.len(),
            result.metadata.community_count
        );
        Ok(result)
    }

    async fn detect_communities_incremental(
        &self,
        update: &IncrementalUpdate,
    ) -> Result<IncrementalCommunityResult> {
        self.config.louvain.validate()?;
        self.config.incremental.validate()?;

        let graph = self.load_graph().await?;
        let start = Instant::now();
        let result = run_incremental(&graph, update, &self.config.louvain, &self.config.incremental);
        tracing::info!(
            "Incremental Louvain: incremental={} frontier={} changed_communities={} in {}ms",
            result.incremental.incremental,
            result.incremental.frontier_size,
            result.changed_communities.len(),
            start.elapsed().as_millis()
        );
        Ok(result)
    }

    async fn calculate_pagerank(&self, config: Option<PageRankConfig>) -> Result<PageRankResult> {
        let config = config.unwrap_or_else(|| self.config.pagerank.clone());
        config.validate()?;

        let graph = self.load_graph().await?;
        let start = Instant::now();
        let result = run_pagerank(&graph, &config);
        tracing::info!(
            "PageRank: {} nodes, {} iterations, converged={} in {}ms",
            result.metadata.node_count,
            result.metadata.iterations,
            result.metadata.converged,
            start.elapsed().as_millis()
        );
        Ok(result)
    }

    async fn calculate_betweenness(
        &self,
        config: Option<BetweennessConfig>,
    ) -> Result<BetweennessResult> {
        let config = config.unwrap_or_else(|| self.config.betweenness.clone());
        config.validate()?;

        let graph = self.load_graph().await?;
        let start = Instant::now();
        let result = run_betweenness(&graph, &config);
        tracing::info!(
            "Betweenness: {} nodes, sample={:?} in {}ms",
            result.metadata.node_count,
            result.metadata.sample_size,
            start.elapsed().as_millis()
        );
        Ok(result)
    }

    /// Like the default view, but `None` starts from this engine's configured
    /// betweenness settings.
    async fn identify_bridge_entities(
        &self,
        threshold: f64,
        config: Option<BetweennessConfig>,
    ) -> Result<Vec<RankedEntity>> {
        let mut config = config.unwrap_or_else(|| self.config.betweenness.clone());
        config.normalized = true;
        Ok(self
            .calculate_betweenness(Some(config))
            .await?
            .entities_above(threshold))
    }
}

// ============================================================================
// Tests
// ============================================================================
