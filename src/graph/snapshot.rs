//! Snapshot provider boundary.
//!
//! The analytics core never touches storage. A [`GraphSnapshotProvider`]
//! hands over fully materialized node/edge lists, which are converted here
//! into an [`EntityGraph`] before any algorithm runs.
//!
//! Two wire shapes exist:
//!
//! - **Full snapshot** (`get_all_entities`): edges reference entity IDs.
//! - **Subgraph** (`get_subgraph`): relationships reference entity **names**
//!   and are remapped to IDs during conversion.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::models::{EntityEdge, EntityGraph, EntityNode};

// ============================================================================
// Wire types
// ============================================================================

/// An entity as served by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotNode {
    pub id: String,
    /// Display name; falls back to the ID when empty
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
}

impl SnapshotNode {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            entity_type: None,
            weight: None,
        }
    }

    pub fn with_type(mut self, entity_type: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// The name, or the ID for nameless entities.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

impl From<&SnapshotNode> for EntityNode {
    fn from(node: &SnapshotNode) -> Self {
        EntityNode {
            id: node.id.clone(),
            name: node.display_name().to_string(),
            entity_type: node.entity_type.clone(),
            weight: node.weight.unwrap_or(1.0),
        }
    }
}

/// An ID-addressed edge of a full snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEdge {
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
}

impl SnapshotEdge {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            weight: None,
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = Some(weight);
        self
    }

    /// True when both edges connect the same ordered pair.
    pub fn same_endpoints(&self, other: &SnapshotEdge) -> bool {
        self.source == other.source && self.target == other.target
    }
}

impl From<&SnapshotEdge> for EntityEdge {
    fn from(edge: &SnapshotEdge) -> Self {
        EntityEdge::new(edge.source.clone(), edge.target.clone())
            .with_weight(edge.weight.unwrap_or(1.0))
    }
}

/// Full graph snapshot: `{nodes, edges}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    #[serde(default)]
    pub nodes: Vec<SnapshotNode>,
    #[serde(default)]
    pub edges: Vec<SnapshotEdge>,
}

/// A name-addressed relationship of a subgraph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRelationship {
    pub from: String,
    pub to: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub relation_type: Option<String>,
}

/// Bounded subgraph: `{entities, relationships}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubgraphSnapshot {
    #[serde(default)]
    pub entities: Vec<SnapshotNode>,
    #[serde(default)]
    pub relationships: Vec<SnapshotRelationship>,
}

/// Counts of what changed since a point in time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphChangeSummary {
    pub new_entity_count: usize,
    pub modified_entity_count: usize,
    pub new_edge_count: usize,
    pub removed_edge_count: usize,
    pub total_entity_count: usize,
}

impl GraphChangeSummary {
    /// Upper-bound estimate of the incremental change ratio.
    ///
    /// Each new edge is assumed to touch two distinct entities.
    pub fn estimated_change_ratio(&self) -> f64 {
        if self.total_entity_count == 0 {
            return 0.0;
        }
        let touched = self.new_entity_count + self.modified_entity_count + 2 * self.new_edge_count;
        touched as f64 / self.total_entity_count as f64
    }
}

// ============================================================================
// Provider trait
// ============================================================================

/// Source of graph snapshots.
///
/// Implementations own the storage; errors are surfaced to callers unchanged.
#[async_trait]
pub trait GraphSnapshotProvider: Send + Sync {
    /// Every entity and edge, optionally capped at `limit` entities.
    async fn get_all_entities(&self, limit: Option<usize>) -> Result<GraphSnapshot>;

    /// The given entities and the relationships among them.
    async fn get_subgraph(&self, node_ids: &[String]) -> Result<SubgraphSnapshot>;

    /// IDs of entities created or updated after `since`.
    async fn get_entities_modified_since(&self, since: DateTime<Utc>) -> Result<Vec<String>>;

    /// Edges created after `since`.
    async fn get_edges_created_since(&self, since: DateTime<Utc>) -> Result<Vec<SnapshotEdge>>;

    /// Edges removed after `since`.
    async fn get_edges_removed_since(&self, since: DateTime<Utc>) -> Result<Vec<SnapshotEdge>>;

    async fn get_graph_change_summary(&self, since: DateTime<Utc>) -> Result<GraphChangeSummary>;
}

// ============================================================================
// Conversion
// ============================================================================

/// Build an [`EntityGraph`] from a full snapshot.
///
/// Edges with unknown endpoints or malformed weights are skipped and counted.
pub fn graph_from_snapshot(snapshot: &GraphSnapshot) -> EntityGraph {
    EntityGraph::from_parts(
        snapshot.nodes.iter().map(EntityNode::from),
        snapshot.edges.iter().map(EntityEdge::from),
    )
}

/// Build an [`EntityGraph`] from a name-addressed subgraph.
///
/// Relationship endpoints are resolved by entity name first, then by ID.
/// The first entity carrying a name wins.
pub fn graph_from_subgraph(subgraph: &SubgraphSnapshot) -> EntityGraph {
    let mut by_name: HashMap<&str, &str> = HashMap::with_capacity(subgraph.entities.len());
    for entity in &subgraph.entities {
        by_name
            .entry(entity.display_name())
            .or_insert(entity.id.as_str());
    }

    // Unresolved endpoints pass through and are dropped by the graph.
    let resolve = |endpoint: &str| -> String {
        by_name.get(endpoint).copied().unwrap_or(endpoint).to_string()
    };

    EntityGraph::from_parts(
        subgraph.entities.iter().map(EntityNode::from),
        subgraph.relationships.iter().map(|rel| {
            let mut edge = EntityEdge::new(resolve(&rel.from), resolve(&rel.to));
            edge.relation_type = rel.relation_type.clone();
            edge
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_json_shape() {
        let json = r#"{
            "nodes": [
                {"id": "e1", "name": "Acme", "type": "Organization"},
                {"id": "e2", "name": "Alice", "type": "Person", "weight": 2.5},
                {"id": "e3"}
            ],
            "edges": [
                {"source": "e1", "target": "e2"},
                {"source": "e2", "target": "e3", "weight": 4.0}
            ]
        }"#;
        let snapshot: GraphSnapshot = serde_json::from_str(json).unwrap();
        let graph = graph_from_snapshot(&snapshot);

        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 2);
        let e2 = graph.get_node("e2").unwrap();
        assert_eq!(e2.entity_type.as_deref(), Some("Person"));
        assert!((e2.weight - 2.5).abs() < f64::EPSILON);
        // Missing name falls back to the ID
        assert_eq!(graph.get_node("e3").unwrap().name, "e3");
    }

    #[test]
    fn test_snapshot_skips_malformed_edges() {
        let snapshot = GraphSnapshot {
            nodes: vec![SnapshotNode::new("a"), SnapshotNode::new("b")],
            edges: vec![
                SnapshotEdge::new("a", "b"),
                SnapshotEdge::new("a", "ghost"),
                SnapshotEdge::new("b", "a").with_weight(f64::NAN),
                SnapshotEdge::new("b", "a").with_weight(-1.0),
            ],
        };
        let graph = graph_from_snapshot(&snapshot);
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.dropped_edges, 3);
    }

    #[test]
    fn test_subgraph_remaps_names_to_ids() {
        let json = r#"{
            "entities": [
                {"id": "e1", "name": "Acme", "type": "Organization"},
                {"id": "e2", "name": "Alice", "type": "Person"},
                {"id": "e3", "name": "Berlin", "type": "Location"}
            ],
            "relationships": [
                {"from": "Alice", "to": "Acme", "type": "WORKS_AT"},
                {"from": "e1", "to": "Berlin", "type": "LOCATED_IN"},
                {"from": "Alice", "to": "Nobody", "type": "KNOWS"}
            ]
        }"#;
        let subgraph: SubgraphSnapshot = serde_json::from_str(json).unwrap();
        let graph = graph_from_subgraph(&subgraph);

        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.dropped_edges, 1);

        let e2 = graph.get_index("e2").unwrap();
        let e1 = graph.get_index("e1").unwrap();
        let edge = graph.graph.find_edge(e2, e1).unwrap();
        assert_eq!(graph.graph[edge].relation_type.as_deref(), Some("WORKS_AT"));
        assert!(graph
            .graph
            .find_edge(e1, graph.get_index("e3").unwrap())
            .is_some());
    }

    #[test]
    fn test_subgraph_nameless_entities_resolve_by_id() {
        let subgraph = SubgraphSnapshot {
            entities: vec![
                SnapshotNode::new("a").with_name(""),
                SnapshotNode::new("b").with_name(""),
            ],
            relationships: vec![SnapshotRelationship {
                from: "a".to_string(),
                to: "b".to_string(),
                relation_type: None,
            }],
        };
        assert_eq!(subgraph.entities[0].display_name(), "a");
        let graph = graph_from_subgraph(&subgraph);
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.dropped_edges, 0);
    }

    #[test]
    fn test_change_ratio_estimate() {
        let summary = GraphChangeSummary {
            new_entity_count: 2,
            modified_entity_count: 1,
            new_edge_count: 1,
            removed_edge_count: 0,
            total_entity_count: 50,
        };
        assert!((summary.estimated_change_ratio() - 0.1).abs() < 1e-12);
        assert_eq!(GraphChangeSummary::default().estimated_change_ratio(), 0.0);
    }
}
