use crate::evidence::merge_evidence;
use crate::labels::is_safe_identifier;
use crate::snapshot::{GraphSnapshot, SnapshotEdge, SnapshotNode};
use crate::store::{EdgeRow, EntityRow, GraphStats, GraphStore, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
pub struct MemoryNode {
    pub labels: BTreeSet<String>,
    pub text: String,
    pub entity_type: String,
    pub properties: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct MemoryEdge {
    pub evidence: String,
    pub note: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct MemoryGraph {
    nodes: BTreeMap<String, MemoryNode>,
    /// Keyed by (head, relationship type, tail).
    edges: BTreeMap<(String, String, String), MemoryEdge>,
}

/// In-process graph store with the same upsert rules as Neo4j. Backs dry
/// runs and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    graph: Mutex<MemoryGraph>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn node(&self, key: &str) -> Option<MemoryNode> {
        self.graph.lock().await.nodes.get(key).cloned()
    }

    pub async fn edge(&self, head: &str, relation_type: &str, tail: &str) -> Option<MemoryEdge> {
        let slot = (head.to_string(), relation_type.to_string(), tail.to_string());
        self.graph.lock().await.edges.get(&slot).cloned()
    }
}

fn check_identifier(identifier: &str) -> Result<(), StoreError> {
    if is_safe_identifier(identifier) {
        Ok(())
    } else {
        Err(StoreError::InvalidIdentifier(identifier.to_string()))
    }
}

#[async_trait]
impl GraphStore for MemoryStore {
    async fn reset(&self) -> Result<(), StoreError> {
        let mut graph = self.graph.lock().await;
        graph.nodes.clear();
        graph.edges.clear();
        Ok(())
    }

    async fn ensure_schema(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn upsert_entities(&self, label: &str, rows: &[EntityRow]) -> Result<usize, StoreError> {
        check_identifier(label)?;
        let now = Utc::now();
        let mut graph = self.graph.lock().await;

        for row in rows {
            let node = graph.nodes.entry(row.key.clone()).or_insert_with(|| MemoryNode {
                labels: BTreeSet::from(["Entity".to_string()]),
                text: row.text.clone(),
                entity_type: row.entity_type.clone(),
                properties: Map::new(),
                created_at: now,
                updated_at: now,
            });

            node.labels.insert(label.to_string());
            node.entity_type = row.entity_type.clone();
            node.properties
                .extend(row.properties.iter().map(|(k, v)| (k.clone(), v.clone())));
            node.updated_at = now;
        }

        Ok(rows.len())
    }

    async fn upsert_edges(&self, relation_type: &str, rows: &[EdgeRow]) -> Result<usize, StoreError> {
        check_identifier(relation_type)?;
        let now = Utc::now();
        let mut graph = self.graph.lock().await;
        let mut created = 0;

        for row in rows {
            // Neo4j MATCHes both endpoints first; a missing one drops the row.
            if !graph.nodes.contains_key(&row.head) || !graph.nodes.contains_key(&row.tail) {
                continue;
            }

            let slot = (row.head.clone(), relation_type.to_string(), row.tail.clone());
            match graph.edges.entry(slot) {
                Entry::Occupied(mut occupied) => {
                    let edge = occupied.get_mut();
                    edge.evidence = merge_evidence(&edge.evidence, &row.evidence);
                    edge.note = merge_evidence(&edge.note, &row.note);
                    edge.updated_at = now;
                }
                Entry::Vacant(vacant) => {
                    vacant.insert(MemoryEdge {
                        evidence: row.evidence.clone(),
                        note: row.note.clone(),
                        created_at: now,
                        updated_at: now,
                    });
                    created += 1;
                }
            }
        }

        Ok(created)
    }

    async fn stats(&self) -> Result<GraphStats, StoreError> {
        let graph = self.graph.lock().await;
        Ok(GraphStats {
            entity_count: graph.nodes.len(),
            relation_count: graph.edges.len(),
        })
    }

    async fn fetch_snapshot(&self) -> Result<GraphSnapshot, StoreError> {
        let graph = self.graph.lock().await;

        let nodes = graph
            .nodes
            .iter()
            .map(|(key, node)| SnapshotNode {
                id: key.clone(),
                label: node.text.clone(),
                node_type: node.entity_type.clone(),
            })
            .collect();

        let edges = graph
            .edges
            .iter()
            .map(|((head, relation_type, tail), edge)| SnapshotEdge {
                source: head.clone(),
                target: tail.clone(),
                edge_type: relation_type.clone(),
                evidence: edge.evidence.clone(),
                note: edge.note.clone(),
            })
            .collect();

        Ok(GraphSnapshot { nodes, edges })
    }
}
