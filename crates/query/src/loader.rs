use crate::view::GraphView;
use anyhow::{Context, Result};
use index::{GraphSnapshot, GraphStore};
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewSource {
    Store,
    Snapshot,
}

/// Build a view from the live store, or from the snapshot file when the
/// store is missing or fails.
pub async fn load_view(
    store: Option<&dyn GraphStore>,
    snapshot: Option<&Path>,
) -> Result<(GraphView, ViewSource)> {
    if let Some(store) = store {
        match store.fetch_snapshot().await {
            Ok(graph) => return Ok((GraphView::from_snapshot(graph), ViewSource::Store)),
            Err(e) => tracing::warn!(error = %e, "Graph store unavailable, falling back to snapshot"),
        }
    }

    let path = snapshot.context("Graph store unavailable and no snapshot file configured")?;
    let graph = GraphSnapshot::load(path).await?;
    tracing::info!(path = %path.display(), nodes = graph.nodes.len(), "Loaded graph from snapshot");

    Ok((GraphView::from_snapshot(graph), ViewSource::Snapshot))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use index::{EdgeRow, EntityRow, GraphStats, MemoryStore, SnapshotNode, StoreError};

    struct DownStore;

    #[async_trait]
    impl GraphStore for DownStore {
        async fn reset(&self) -> Result<(), StoreError> {
            Err(StoreError::Connection("refused".into()))
        }
        async fn ensure_schema(&self) -> Result<(), StoreError> {
            Err(StoreError::Connection("refused".into()))
        }
        async fn upsert_entities(&self, _: &str, _: &[EntityRow]) -> Result<usize, StoreError> {
            Err(StoreError::Connection("refused".into()))
        }
        async fn upsert_edges(&self, _: &str, _: &[EdgeRow]) -> Result<usize, StoreError> {
            Err(StoreError::Connection("refused".into()))
        }
        async fn stats(&self) -> Result<GraphStats, StoreError> {
            Err(StoreError::Connection("refused".into()))
        }
        async fn fetch_snapshot(&self) -> Result<GraphSnapshot, StoreError> {
            Err(StoreError::Connection("refused".into()))
        }
    }

    async fn snapshot_file(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("graph.json");
        GraphSnapshot {
            nodes: vec![SnapshotNode {
                id: "medication:sertraline".into(),
                label: "Sertraline".into(),
                node_type: "medication".into(),
            }],
            edges: Vec::new(),
        }
        .save(&path)
        .await
        .unwrap();
        path
    }

    #[tokio::test]
    async fn falls_back_to_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = snapshot_file(dir.path()).await;

        let (view, source) = load_view(Some(&DownStore as &dyn GraphStore), Some(path.as_path())).await.unwrap();
        assert_eq!(source, ViewSource::Snapshot);
        assert_eq!(view.node_count(), 1);
    }

    #[tokio::test]
    async fn prefers_live_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = snapshot_file(dir.path()).await;

        let (view, source) = load_view(Some(&MemoryStore::new() as &dyn GraphStore), Some(path.as_path())).await.unwrap();
        assert_eq!(source, ViewSource::Store);
        assert_eq!(view.node_count(), 0);
    }

    #[tokio::test]
    async fn errors_without_any_source() {
        assert!(load_view(Some(&DownStore as &dyn GraphStore), None).await.is_err());
    }
}
