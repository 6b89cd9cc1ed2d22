//! In-memory snapshot provider.
//!
//! Keeps entities and relationships in `tokio::sync::RwLock` collections with
//! creation/update timestamps, so the change feeds used by incremental
//! refresh can be answered. Backs the CLI (loaded from a JSON snapshot file)
//! and the engine tests.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use tokio::sync::RwLock;

use super::snapshot::{
    GraphChangeSummary, GraphSnapshot, GraphSnapshotProvider, SnapshotEdge, SnapshotNode,
    SnapshotRelationship, SubgraphSnapshot,
};

#[derive(Debug, Clone)]
struct StoredEntity {
    node: SnapshotNode,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct StoredEdge {
    edge: SnapshotEdge,
    created_at: DateTime<Utc>,
}

/// Snapshot provider backed by process memory.
///
/// Entities are served in ID order, edges in insertion order.
pub struct InMemorySnapshotProvider {
    entities: RwLock<BTreeMap<String, StoredEntity>>,
    edges: RwLock<Vec<StoredEdge>>,
    removed_edges: RwLock<Vec<(SnapshotEdge, DateTime<Utc>)>>,
}

impl InMemorySnapshotProvider {
    pub fn new() -> Self {
        Self {
            entities: RwLock::new(BTreeMap::new()),
            edges: RwLock::new(Vec::new()),
            removed_edges: RwLock::new(Vec::new()),
        }
    }

    /// Seed a provider from a full snapshot, timestamped `at`.
    pub fn from_snapshot(snapshot: GraphSnapshot, at: DateTime<Utc>) -> Self {
        let entities = snapshot
            .nodes
            .into_iter()
            .map(|node| {
                let stored = StoredEntity {
                    node,
                    created_at: at,
                    updated_at: at,
                };
                (stored.node.id.clone(), stored)
            })
            .collect();
        let edges = snapshot
            .edges
            .into_iter()
            .map(|edge| StoredEdge {
                edge,
                created_at: at,
            })
            .collect();
        Self {
            entities: RwLock::new(entities),
            edges: RwLock::new(edges),
            removed_edges: RwLock::new(Vec::new()),
        }
    }

    pub async fn upsert_entity(&self, node: SnapshotNode) {
        self.upsert_entity_at(node, Utc::now()).await
    }

    /// Insert or replace an entity. Replacing keeps the original creation time.
    pub async fn upsert_entity_at(&self, node: SnapshotNode, at: DateTime<Utc>) {
        let mut entities = self.entities.write().await;
        match entities.get_mut(&node.id) {
            Some(existing) => {
                existing.node = node;
                existing.updated_at = at;
            }
            None => {
                entities.insert(
                    node.id.clone(),
                    StoredEntity {
                        node,
                        created_at: at,
                        updated_at: at,
                    },
                );
            }
        }
    }

    pub async fn add_relationship(&self, edge: SnapshotEdge) {
        self.add_relationship_at(edge, Utc::now()).await
    }

    pub async fn add_relationship_at(&self, edge: SnapshotEdge, at: DateTime<Utc>) {
        self.edges.write().await.push(StoredEdge {
            edge,
            created_at: at,
        });
    }

    /// Remove every edge from `source` to `target`. Returns how many were removed.
    pub async fn remove_relationship(&self, source: &str, target: &str) -> usize {
        self.remove_relationship_at(source, target, Utc::now()).await
    }

    pub async fn remove_relationship_at(
        &self,
        source: &str,
        target: &str,
        at: DateTime<Utc>,
    ) -> usize {
        let probe = SnapshotEdge::new(source, target);
        let mut edges = self.edges.write().await;
        let before = edges.len();
        let mut removed = Vec::new();
        edges.retain(|stored| {
            if stored.edge.same_endpoints(&probe) {
                removed.push((stored.edge.clone(), at));
                false
            } else {
                true
            }
        });
        let count = before - edges.len();
        self.removed_edges.write().await.extend(removed);
        count
    }
}

impl Default for InMemorySnapshotProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GraphSnapshotProvider for InMemorySnapshotProvider {
    async fn get_all_entities(&self, limit: Option<usize>) -> Result<GraphSnapshot> {
        let entities = self.entities.read().await;
        let nodes: Vec<SnapshotNode> = entities
            .values()
            .take(limit.unwrap_or(usize::MAX))
            .map(|stored| stored.node.clone())
            .collect();

        // With a limit, keep only edges inside the returned node set.
        let stored = self.edges.read().await;
        let edges: Vec<SnapshotEdge> = if nodes.len() < entities.len() {
            let kept: HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
            stored
                .iter()
                .filter(|s| {
                    kept.contains(s.edge.source.as_str()) && kept.contains(s.edge.target.as_str())
                })
                .map(|s| s.edge.clone())
                .collect()
        } else {
            stored.iter().map(|s| s.edge.clone()).collect()
        };

        Ok(GraphSnapshot { nodes, edges })
    }

    async fn get_subgraph(&self, node_ids: &[String]) -> Result<SubgraphSnapshot> {
        let entities = self.entities.read().await;
        let selected: Vec<&SnapshotNode> = node_ids
            .iter()
            .filter_map(|id| entities.get(id))
            .map(|stored| &stored.node)
            .collect();
        let names: BTreeMap<&str, &str> = selected
            .iter()
            .map(|node| (node.id.as_str(), node.display_name()))
            .collect();

        let relationships = self
            .edges
            .read()
            .await
            .iter()
            .filter_map(|stored| {
                let from = names.get(stored.edge.source.as_str())?;
                let to = names.get(stored.edge.target.as_str())?;
                Some(SnapshotRelationship {
                    from: from.to_string(),
                    to: to.to_string(),
                    relation_type: None,
                })
            })
            .collect();

        Ok(SubgraphSnapshot {
            entities: selected.into_iter().cloned().collect(),
            relationships,
        })
    }

    async fn get_entities_modified_since(&self, since: DateTime<Utc>) -> Result<Vec<String>> {
        Ok(self
            .entities
            .read()
            .await
            .values()
            .filter(|stored| stored.updated_at > since)
            .map(|stored| stored.node.id.clone())
            .collect())
    }

    async fn get_edges_created_since(&self, since: DateTime<Utc>) -> Result<Vec<SnapshotEdge>> {
        Ok(self
            .edges
            .read()
            .await
            .iter()
            .filter(|stored| stored.created_at > since)
            .map(|stored| stored.edge.clone())
            .collect())
    }

    async fn get_edges_removed_since(&self, since: DateTime<Utc>) -> Result<Vec<SnapshotEdge>> {
        Ok(self
            .removed_edges
            .read()
            .await
            .iter()
            .filter(|(_, at)| *at > since)
            .map(|(edge, _)| edge.clone())
            .collect())
    }

    async fn get_graph_change_summary(&self, since: DateTime<Utc>) -> Result<GraphChangeSummary> {
        let entities = self.entities.read().await;
        let new_entity_count = entities.values().filter(|e| e.created_at > since).count();
        let modified_entity_count = entities
            .values()
            .filter(|e| e.created_at <= since && e.updated_at > since)
            .count();
        let new_edge_count = self
            .edges
            .read()
            .await
            .iter()
            .filter(|e| e.created_at > since)
            .count();
        let removed_edge_count = self
            .removed_edges
            .read()
            .await
            .iter()
            .filter(|(_, at)| *at > since)
            .count();

        Ok(GraphChangeSummary {
            new_entity_count,
            modified_entity_count,
            new_edge_count,
            removed_edge_count,
            total_entity_count: entities.len(),
        })
    }
}
