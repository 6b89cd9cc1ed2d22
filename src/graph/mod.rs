//! Graph analytics engine.
//!
//! In-process community detection and centrality over entity graphs, built
//! on petgraph. Computes Louvain communities (full and incremental),
//! PageRank, and Brandes betweenness centrality.
//!
//! ## Architecture
//!
//! ```text
//! GraphSnapshotProvider ──► snapshot ──► EntityGraph (petgraph::DiGraph)
//!                                              │
//!                                          adjacency
//!                                              │
//!                        louvain / incremental / pagerank / betweenness
//!                                              │
//!                              AnalyticsEngine (orchestrator + views)
//! ```
//!
//! ## Modules
//!
//! - [`models`]: Graph, result and configuration types
//! - [`snapshot`]: Provider trait, wire types, snapshot → graph conversion
//! - [`memory`]: `InMemorySnapshotProvider`
//! - [`adjacency`]: Deterministic undirected/directed adjacency builder
//! - [`louvain`]: Multi-level Louvain and modularity
//! - [`incremental`]: Dynamic Frontier Louvain
//! - [`pagerank`]: Power-iteration PageRank
//! - [`betweenness`]: Brandes betweenness, sampling, bridge entities
//! - [`engine`]: `AnalyticsEngine` trait and `GraphAnalyticsEngine`

pub mod adjacency;
pub mod betweenness;
pub mod engine;
pub mod incremental;
pub mod louvain;
pub mod memory;
pub mod models;
pub mod pagerank;
pub mod snapshot;

// Re-export primary types for convenience
pub use engine::{AnalyticsEngine, FullRefreshReason, GraphAnalyticsEngine, RefreshPlan};
pub use incremental::{identify_changed_communities, IncrementalUpdate};
pub use memory::InMemorySnapshotProvider;
pub use models::{
    AnalyticsConfig, BetweennessConfig, BetweennessResult, CommunityDetectionResult,
    CommunityInfo, ConfigError, EntityEdge, EntityGraph, EntityNode, IncrementalCommunityResult,
    IncrementalConfig, LouvainConfig, PageRankConfig, PageRankResult, RankedEntity,
};
pub use snapshot::{
    GraphChangeSummary, GraphSnapshot, GraphSnapshotProvider, SnapshotEdge, SnapshotNode,
    SnapshotRelationship, SubgraphSnapshot,
};
