//! Graph analytics data models.
//!
//! Defines the complete type system for entity-graph analytics:
//!
//! ## Input types (snapshot conversion)
//! - [`EntityNode`] / [`EntityEdge`]: entities and relationships from the snapshot
//! - [`EntityGraph`]: petgraph wrapper with ID ↔ NodeIndex mapping
//!
//! ## Output types (analytics)
//! - [`CommunityInfo`] / [`CommunityDetectionResult`]: Louvain partition and summaries
//! - [`IncrementalCommunityResult`]: Dynamic Frontier output with change metadata
//! - [`RankedEntity`] / [`PageRankResult`] / [`BetweennessResult`]: centrality scores
//!
//! ## Configuration
//! - [`LouvainConfig`], [`PageRankConfig`], [`BetweennessConfig`], [`IncrementalConfig`]
//! - [`AnalyticsConfig`]: aggregate of the above, validated before each run

use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use thiserror::Error;

// ============================================================================
// Input types: Graph structure (snapshot → algorithms)
// ============================================================================

/// An entity node extracted from the knowledge graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityNode {
    /// Stable opaque identifier
    pub id: String,
    /// Display name (relationship endpoints in subgraph queries reference this)
    pub name: String,
    /// Entity type (e.g. "Organization", "Person"), if the extractor assigned one
    pub entity_type: Option<String>,
    /// Node weight (default: 1.0)
    pub weight: f64,
}

impl EntityNode {
    /// Create a node whose name equals its ID and that carries no type.
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            entity_type: None,
            weight: 1.0,
        }
    }

    /// Builder-style setter for the entity type.
    pub fn with_type(mut self, entity_type: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self
    }

    /// Builder-style setter for the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// A relationship (edge) between two entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityEdge {
    pub source: String,
    pub target: String,
    /// Edge weight (default: 1.0, must be finite and non-negative)
    #[serde(default = "default_edge_weight")]
    pub weight: f64,
    /// Whether the relationship has a direction (default: true)
    #[serde(default = "default_directed")]
    pub directed: bool,
    /// Relationship type label, if any
    #[serde(default)]
    pub relation_type: Option<String>,
}

fn default_edge_weight() -> f64 {
    1.0
}

fn default_directed() -> bool {
    true
}

impl EntityEdge {
    /// Directed edge of weight 1.0.
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            weight: 1.0,
            directed: true,
            relation_type: None,
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn undirected(mut self) -> Self {
        self.directed = false;
        self
    }

    /// True when the weight is usable (finite and ≥ 0).
    pub fn has_valid_weight(&self) -> bool {
        self.weight.is_finite() && self.weight >= 0.0
    }
}

// ============================================================================
// EntityGraph: petgraph wrapper with ID mapping
// ============================================================================

/// Wrapper around `petgraph::DiGraph` with bidirectional ID ↔ NodeIndex mapping.
///
/// Node indices are assigned densely in insertion order, which is the order
/// every algorithm iterates in. Edges whose endpoints were never added, or
/// whose weight is negative or non-finite, are skipped and counted in
/// `dropped_edges`.
#[derive(Debug, Clone, Default)]
pub struct EntityGraph {
    /// The underlying directed multigraph
    pub graph: DiGraph<EntityNode, EntityEdge>,
    /// Mapping from node ID to petgraph NodeIndex
    pub id_to_index: HashMap<String, NodeIndex>,
    /// Number of edges rejected as malformed
    pub dropped_edges: usize,
}

impl EntityGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an EntityGraph with pre-allocated capacity.
    pub fn with_capacity(nodes: usize, edges: usize) -> Self {
        Self {
            graph: DiGraph::with_capacity(nodes, edges),
            id_to_index: HashMap::with_capacity(nodes),
            dropped_edges: 0,
        }
    }

    /// Build a graph from node and edge lists in one pass.
    pub fn from_parts(
        nodes: impl IntoIterator<Item = EntityNode>,
        edges: impl IntoIterator<Item = EntityEdge>,
    ) -> Self {
        let nodes = nodes.into_iter();
        let edges = edges.into_iter();
        let mut graph = Self::with_capacity(nodes.size_hint().0, edges.size_hint().0);
        for node in nodes {
            graph.add_node(node);
        }
        for edge in edges {
            graph.add_edge(edge);
        }
        if graph.dropped_edges > 0 {
            tracing::debug!(
                "Dropped {} malformed edges while building entity graph",
                graph.dropped_edges
            );
        }
        graph
    }

    /// Add a node to the graph. Returns the NodeIndex.
    /// If a node with the same ID already exists, returns its existing index
    /// and the first observation wins.
    pub fn add_node(&mut self, node: EntityNode) -> NodeIndex {
        if let Some(&idx) = self.id_to_index.get(&node.id) {
            return idx;
        }
        let id = node.id.clone();
        let idx = self.graph.add_node(node);
        self.id_to_index.insert(id, idx);
        idx
    }

    /// Add an edge between two known nodes.
    /// Returns `None` (and counts the edge as dropped) when either endpoint is
    /// unknown or the weight is invalid.
    pub fn add_edge(&mut self, edge: EntityEdge) -> Option<EdgeIndex> {
        let endpoints = self
            .id_to_index
            .get(&edge.source)
            .zip(self.id_to_index.get(&edge.target));
        match endpoints {
            Some((&from, &to)) if edge.has_valid_weight() => {
                Some(self.graph.add_edge(from, to, edge))
            }
            _ => {
                self.dropped_edges += 1;
                None
            }
        }
    }

    pub fn get_node(&self, id: &str) -> Option<&EntityNode> {
        let idx = self.id_to_index.get(id)?;
        self.graph.node_weight(*idx)
    }

    pub fn get_index(&self, id: &str) -> Option<NodeIndex> {
        self.id_to_index.get(id).copied()
    }

    /// Node IDs in dense index order.
    pub fn node_ids(&self) -> Vec<&str> {
        self.graph
            .node_indices()
            .map(|idx| self.graph[idx].id.as_str())
            .collect()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}

// ============================================================================
// Output types: Community detection
// ============================================================================

/// Metadata about a community detected by the Louvain algorithm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunityInfo {
    /// Community identifier
    pub id: u32,
    /// Number of nodes in this community
    pub size: usize,
    /// Node IDs belonging to this community, in graph order
    pub members: Vec<String>,
    /// Count of members per entity type
    pub type_histogram: BTreeMap<String, usize>,
    /// Most frequent entity type (ties go to the lexicographically smallest)
    pub dominant_type: Option<String>,
    /// Sum of member node weights
    pub total_weight: f64,
    /// Auto-generated label (dominant type + leading member names)
    pub label: String,
}

/// Run metadata attached to every community detection result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommunityMetadata {
    pub node_count: usize,
    pub edge_count: usize,
    pub community_count: usize,
    /// Local-moving sweeps performed across all levels
    pub iterations: usize,
    /// Aggregation levels performed
    pub levels: usize,
}

/// Partition produced by a community detection run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommunityDetectionResult {
    /// Node ID → community ID (every node has exactly one label)
    pub communities: BTreeMap<String, u32>,
    /// Community summaries sorted by size descending, then ID ascending
    pub community_list: Vec<CommunityInfo>,
    /// Modularity of the partition over the full input graph
    pub modularity: f64,
    pub metadata: CommunityMetadata,
}

impl CommunityDetectionResult {
    /// The `n` largest communities.
    pub fn top_communities(&self, n: usize) -> Vec<CommunityInfo> {
        self.community_list.iter().take(n).cloned().collect()
    }

    /// The community an entity belongs to, if the entity is known.
    pub fn entity_community(&self, id: &str) -> Option<&CommunityInfo> {
        let label = self.communities.get(id)?;
        self.community_list.iter().find(|c| c.id == *label)
    }
}

/// Bookkeeping for an incremental (Dynamic Frontier) run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IncrementalMetadata {
    /// True when the frontier path ran (false on fallback)
    pub incremental: bool,
    /// Nodes eligible to move
    pub frontier_size: usize,
    /// Frontier plus the fixed neighbours of nodes that moved
    pub affected_node_count: usize,
    pub fell_back_to_full: bool,
    pub change_ratio: f64,
    pub iterations: usize,
}

/// Result of `detect_communities_incremental`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IncrementalCommunityResult {
    #[serde(flatten)]
    pub result: CommunityDetectionResult,
    pub incremental: IncrementalMetadata,
    /// Union of previous and current community IDs of every affected node
    pub changed_communities: BTreeSet<u32>,
}

// ============================================================================
// Output types: Centrality
// ============================================================================

/// An entity with its score, as listed in `ranked_entities`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedEntity {
    pub id: String,
    pub score: f64,
}

/// Sort descending by score with ascending ID as the tie-break.
pub fn rank_scores(scores: &BTreeMap<String, f64>) -> Vec<RankedEntity> {
    let mut ranked: Vec<RankedEntity> = scores
        .iter()
        .map(|(id, &score)| RankedEntity {
            id: id.clone(),
            score,
        })
        .collect();
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
    ranked
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageRankMetadata {
    pub damping_factor: f64,
    pub iterations: usize,
    pub converged: bool,
    /// L1 delta of the last iteration
    pub last_delta: f64,
    pub node_count: usize,
    pub edge_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageRankResult {
    pub scores: BTreeMap<String, f64>,
    pub ranked_entities: Vec<RankedEntity>,
    pub metadata: PageRankMetadata,
}

impl PageRankResult {
    /// The `n` highest-ranked entities.
    pub fn top_entities(&self, n: usize) -> Vec<RankedEntity> {
        self.ranked_entities.iter().take(n).cloned().collect()
    }

    pub fn entity_score(&self, id: &str) -> Option<f64> {
        self.scores.get(id).copied()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BetweennessMetadata {
    pub normalized: bool,
    pub directed: bool,
    /// Number of sources actually used when sampling
    pub sample_size: Option<usize>,
    pub node_count: usize,
    pub edge_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BetweennessResult {
    pub scores: BTreeMap<String, f64>,
    pub ranked_entities: Vec<RankedEntity>,
    pub metadata: BetweennessMetadata,
}

impl BetweennessResult {
    pub fn top_entities(&self, n: usize) -> Vec<RankedEntity> {
        self.ranked_entities.iter().take(n).cloned().collect()
    }

    pub fn entity_score(&self, id: &str) -> Option<f64> {
        self.scores.get(id).copied()
    }

    /// Entities scoring strictly above `threshold`, highest first.
    pub fn entities_above(&self, threshold: f64) -> Vec<RankedEntity> {
        self.ranked_entities
            .iter()
            .take_while(|e| e.score > threshold)
            .cloned()
            .collect()
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Rejected configuration values.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("damping factor must lie in [0, 1], got {0}")]
    InvalidDampingFactor(f64),
    #[error("resolution must be finite and positive, got {0}")]
    InvalidResolution(f64),
    #[error("{name} must be finite and non-negative, got {value}")]
    InvalidThreshold { name: &'static str, value: f64 },
    #[error("change ratio ceiling must lie in [0, 1], got {0}")]
    InvalidChangeRatio(f64),
    #[error("sample size must be at least 1")]
    InvalidSampleSize,
}

/// Louvain tuning parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LouvainConfig {
    /// Resolution γ (default: 1.0, higher = smaller communities)
    pub resolution: f64,
    /// Local-moving sweep budget shared across levels (default: 100)
    pub max_iterations: usize,
    /// Minimum gain for a move to be accepted (default: 1e-7)
    pub min_modularity_gain: f64,
}

impl Default for LouvainConfig {
    fn default() -> Self {
        Self {
            resolution: 1.0,
            max_iterations: 100,
            min_modularity_gain: 1e-7,
        }
    }
}

impl LouvainConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.resolution.is_finite() || self.resolution <= 0.0 {
            return Err(ConfigError::InvalidResolution(self.resolution));
        }
        check_threshold("min_modularity_gain", self.min_modularity_gain)
    }
}

/// PageRank tuning parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageRankConfig {
    pub damping_factor: f64,
    pub max_iterations: usize,
    /// L1 convergence threshold (default: 1e-6)
    pub convergence_threshold: f64,
    /// Total initial mass, spread uniformly (default: 1.0)
    pub default_score: f64,
    /// Follow edge direction (default: true)
    pub directed: bool,
}

impl Default for PageRankConfig {
    fn default() -> Self {
        Self {
            damping_factor: 0.85,
            max_iterations: 100,
            convergence_threshold: 1e-6,
            default_score: 1.0,
            directed: true,
        }
    }
}

impl PageRankConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.damping_factor) {
            return Err(ConfigError::InvalidDampingFactor(self.damping_factor));
        }
        check_threshold("convergence_threshold", self.convergence_threshold)?;
        check_threshold("default_score", self.default_score)
    }
}

/// Betweenness centrality parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BetweennessConfig {
    pub normalized: bool,
    pub directed: bool,
    /// Number of pivot sources to sample (None = exact)
    pub sample_size: Option<usize>,
    /// Seed for pivot sampling
    pub seed: u64,
    /// Use edge weights as distances (Dijkstra) instead of hop counts (BFS)
    pub weighted: bool,
    /// Source count at which traversals fan out across threads
    pub parallel_threshold: usize,
}

impl Default for BetweennessConfig {
    fn default() -> Self {
        Self {
            normalized: true,
            directed: true,
            sample_size: None,
            seed: 42,
            weighted: false,
            parallel_threshold: 64,
        }
    }
}

impl BetweennessConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.sample_size {
            Some(0) => Err(ConfigError::InvalidSampleSize),
            _ => Ok(()),
        }
    }
}

/// Thresholds deciding between the frontier path and a full rerun.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IncrementalConfig {
    /// Graphs with fewer nodes always rerun in full (default: 50)
    pub min_graph_size: usize,
    /// Change ratios above this rerun in full (default: 0.3)
    pub max_change_ratio: f64,
    /// Add direct neighbours of touched nodes to the initial frontier
    pub expand_to_neighbors: bool,
}

impl Default for IncrementalConfig {
    fn default() -> Self {
        Self {
            min_graph_size: 50,
            max_change_ratio: 0.3,
            expand_to_neighbors: false,
        }
    }
}

impl IncrementalConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.max_change_ratio) {
            return Err(ConfigError::InvalidChangeRatio(self.max_change_ratio));
        }
        Ok(())
    }
}

/// Tuning parameters for every analytics algorithm.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    pub louvain: LouvainConfig,
    pub pagerank: PageRankConfig,
    pub betweenness: BetweennessConfig,
    pub incremental: IncrementalConfig,
    /// Cap on entities fetched from the snapshot provider
    pub snapshot_limit: Option<usize>,
}

impl AnalyticsConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.louvain.validate()?;
        self.pagerank.validate()?;
        self.betweenness.validate()?;
        self.incremental.validate()
    }
}

fn check_threshold(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidThreshold { name, value })
    }
}

// ============================================================================
// Tests
// ============================================================================
