//! Serializable copy of the graph for presentation when the store is down.

use crate::evidence::merge_evidence;
use crate::labels::relation_type_for;
use crate::plan::stable_key;
use anyhow::{Context, Result};
use extract::{CanonicalGraph, EntityNormalizer};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotNode {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub node_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEdge {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub edge_type: String,
    #[serde(default)]
    pub evidence: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub note: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<SnapshotNode>,
    pub edges: Vec<SnapshotEdge>,
}

impl GraphSnapshot {
    /// Build the snapshot the store would hold after ingesting `graph`.
    /// Node ids are the same stable keys the store uses.
    pub fn from_canonical(graph: &CanonicalGraph) -> Self {
        let normalizer = EntityNormalizer::new();
        let mut snapshot = Self::default();
        let mut ids = HashMap::with_capacity(graph.entities.len());

        for entity in &graph.entities {
            let key = stable_key(&normalizer.key(&entity.text, &entity.entity_type));
            ids.insert(entity.id, key.clone());
            snapshot.nodes.push(SnapshotNode {
                id: key,
                label: entity.text.clone(),
                node_type: entity.entity_type.clone(),
            });
        }

        let mut positions: HashMap<(String, String, String), usize> = HashMap::new();
        for rel in &graph.relationships {
            let (Some(source), Some(target)) = (ids.get(&rel.head), ids.get(&rel.tail)) else {
                continue;
            };
            let edge_type = relation_type_for(&rel.relation_type);
            let slot = (source.clone(), target.clone(), edge_type.clone());

            match positions.get(&slot) {
                Some(&position) => {
                    let edge = &mut snapshot.edges[position];
                    edge.evidence = merge_evidence(&edge.evidence, &rel.evidence);
                }
                None => {
                    positions.insert(slot, snapshot.edges.len());
                    snapshot.edges.push(SnapshotEdge {
                        source: source.clone(),
                        target: target.clone(),
                        edge_type,
                        evidence: rel.evidence.clone(),
                        note: String::new(),
                    });
                }
            }
        }

        snapshot
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Snapshot {} is not valid graph JSON", path.display()))
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize snapshot")?;
        tokio::fs::write(path, json)
            .await
            .with_context(|| format!("Failed to write snapshot {}", path.display()))?;

        tracing::info!(
            path = %path.display(),
            nodes = self.nodes.len(),
            edges = self.edges.len(),
            "Saved graph snapshot"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use extract::{CanonicalEntity, CanonicalRelationship};
    use serde_json::Map;

    fn entity(id: u64, text: &str, entity_type: &str) -> CanonicalEntity {
        CanonicalEntity {
            id,
            text: text.into(),
            entity_type: entity_type.into(),
            code_system: None,
            code: None,
            properties: Map::new(),
        }
    }

    fn rel(head: u64, tail: u64, evidence: &str) -> CanonicalRelationship {
        CanonicalRelationship {
            head,
            tail,
            relation_type: "treats".into(),
            evidence: evidence.into(),
        }
    }

    #[test]
    fn canonical_graph_collapses_parallel_evidence() {
        let graph = CanonicalGraph {
            entities: vec![
                entity(1, "Sertraline", "medication"),
                entity(2, "MDD", "medical_condition"),
            ],
            relationships: vec![rel(1, 2, "x"), rel(1, 2, "y"), rel(1, 2, "x"), rel(1, 9, "dangling")],
            raw_responses: Vec::new(),
        };

        let snapshot = GraphSnapshot::from_canonical(&graph);

        assert_eq!(snapshot.nodes[0].id, "medication:sertraline");
        assert_eq!(snapshot.nodes[1].id, "medical_condition:major depressive disorder");
        assert_eq!(snapshot.nodes[1].label, "MDD");
        assert_eq!(snapshot.edges.len(), 1);
        assert_eq!(snapshot.edges[0].edge_type, "TREATS");
        assert_eq!(snapshot.edges[0].evidence, "x\ny");
    }

    #[tokio::test]
    async fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.json");
        let snapshot = GraphSnapshot {
            nodes: vec![SnapshotNode {
                id: "a".into(),
                label: "A".into(),
                node_type: "medication".into(),
            }],
            edges: Vec::new(),
        };

        snapshot.save(&path).await.unwrap();
        assert_eq!(GraphSnapshot::load(&path).await.unwrap(), snapshot);
    }

    #[test]
    fn reads_files_without_notes() {
        let raw = r#"{"nodes": [], "edges": [{"source": "a", "target": "b", "type": "TREATS", "evidence": "e"}]}"#;
        let snapshot: GraphSnapshot = serde_json::from_str(raw).unwrap();
        assert_eq!(snapshot.edges[0].note, "");
    }
}
