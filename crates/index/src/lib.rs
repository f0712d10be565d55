pub mod evidence;
pub mod labels;
pub mod memory_store;
pub mod neo4j_store;
pub mod plan;
pub mod snapshot;
pub mod store;

pub use evidence::merge_evidence;
pub use labels::{label_for, relation_type_for, sanitize_identifier};
pub use memory_store::MemoryStore;
pub use neo4j_store::{Neo4jConfig, Neo4jStore};
pub use plan::{stable_key, IngestPlan};
pub use snapshot::{GraphSnapshot, SnapshotEdge, SnapshotNode};
pub use store::{EdgeRow, EntityRow, GraphStats, GraphStore, StoreError};

use extract::RetryPolicy;
use serde::Serialize;
use std::future::Future;
use std::time::Duration;

pub const DEFAULT_BATCH_SIZE: usize = 500;

#[derive(Debug, Default, Clone, Serialize)]
pub struct IngestSummary {
    pub nodes_upserted: usize,
    pub relationships_created: usize,
    pub batches: usize,
    pub diagnostics: usize,
}

/// Writes an [`IngestPlan`] into a [`GraphStore`] in bounded batches.
pub struct Ingestor<'a> {
    store: &'a dyn GraphStore,
    batch_size: usize,
    retry: RetryPolicy,
    timeout: Duration,
}

impl<'a> Ingestor<'a> {
    pub fn new(store: &'a dyn GraphStore) -> Self {
        Self {
            store,
            batch_size: DEFAULT_BATCH_SIZE,
            retry: RetryPolicy::default(),
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn reset(&self) -> Result<(), StoreError> {
        self.store.reset().await
    }

    /// Upsert all entities first, then all edges, so edges always find their
    /// endpoints. Every batch is idempotent, so a retried batch is harmless.
    pub async fn ingest(&self, plan: &IngestPlan) -> Result<IngestSummary, StoreError> {
        self.store.ensure_schema().await?;

        let mut summary = IngestSummary {
            diagnostics: plan.diagnostics.len(),
            ..Default::default()
        };

        for (label, rows) in plan.entity_groups() {
            for batch in rows.chunks(self.batch_size) {
                let written = self
                    .write("upsert entities", || self.store.upsert_entities(label, batch))
                    .await?;
                summary.nodes_upserted += written;
                summary.batches += 1;
                tracing::debug!(label, rows = batch.len(), "Upserted entity batch");
            }
        }

        for (relation_type, rows) in plan.edge_groups() {
            for batch in rows.chunks(self.batch_size) {
                let created = self
                    .write("upsert edges", || self.store.upsert_edges(relation_type, batch))
                    .await?;
                summary.relationships_created += created;
                summary.batches += 1;
                tracing::debug!(relation_type, rows = batch.len(), created, "Upserted edge batch");
            }
        }

        tracing::info!(
            nodes = summary.nodes_upserted,
            new_relationships = summary.relationships_created,
            batches = summary.batches,
            "Ingestion complete"
        );
        Ok(summary)
    }

    async fn write<F, Fut>(&self, operation: &str, mut f: F) -> Result<usize, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<usize, StoreError>>,
    {
        let timeout = self.timeout;
        self.retry
            .retry_if(
                operation,
                || {
                    let pending = f();
                    async move {
                        tokio::time::timeout(timeout, pending)
                            .await
                            .map_err(|_| StoreError::Timeout(timeout))?
                    }
                },
                StoreError::is_transient,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn plan() -> IngestPlan {
        let mut plan = IngestPlan::new();
        plan.add_document(
            "combined.json",
            &json!({
                "entities": [
                    {"id": 1, "text": "Sertraline", "type": "medication"},
                    {"id": 2, "text": "Escitalopram", "type": "medication"},
                    {"id": 3, "text": "MDD", "type": "medical_condition"},
                    {"id": 4, "text": "remission", "type": "outcome"}
                ],
                "relationships": [
                    {"head": 1, "tail": 3, "type": "treats", "evidence": "X"},
                    {"head": 1, "tail": 3, "type": "treats", "evidence": "Y"},
                    {"head": 2, "tail": 3, "type": "treats", "evidence": ""},
                    {"head": 1, "tail": 4, "type": "has_outcome", "evidence": "Z"}
                ]
            }),
        );
        plan
    }

    #[tokio::test]
    async fn ingesting_twice_changes_nothing() {
        let store = MemoryStore::new();
        let ingestor = Ingestor::new(&store).with_batch_size(1);
        let plan = plan();

        let first = ingestor.ingest(&plan).await.unwrap();
        assert_eq!(first.nodes_upserted, 4);
        assert_eq!(first.relationships_created, 3);
        let before = store.fetch_snapshot().await.unwrap();

        let second = ingestor.ingest(&plan).await.unwrap();
        assert_eq!(second.relationships_created, 0);
        assert_eq!(store.fetch_snapshot().await.unwrap(), before);
        assert_eq!(
            store.stats().await.unwrap(),
            GraphStats {
                entity_count: 4,
                relation_count: 3
            }
        );
    }

    #[tokio::test]
    async fn evidence_from_parallel_rows_is_merged() {
        let store = MemoryStore::new();
        Ingestor::new(&store).ingest(&plan()).await.unwrap();

        let edge = store
            .edge("medication:sertraline", "TREATS", "medical_condition:major depressive disorder")
            .await
            .unwrap();
        assert_eq!(edge.evidence, "X\nY");
    }

    #[tokio::test]
    async fn batches_respect_batch_size() {
        let store = MemoryStore::new();
        let summary = Ingestor::new(&store)
            .with_batch_size(2)
            .ingest(&plan())
            .await
            .unwrap();

        // one batch per label, two for the three TREATS rows, one for HAS_OUTCOME
        assert_eq!(summary.batches, 6);
    }

    /// Rejects every entity batch and counts how often it was asked.
    #[derive(Default)]
    struct RejectingStore {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl GraphStore for RejectingStore {
        async fn reset(&self) -> Result<(), StoreError> {
            Ok(())
        }

        async fn ensure_schema(&self) -> Result<(), StoreError> {
            Ok(())
        }

        async fn upsert_entities(&self, label: &str, _rows: &[EntityRow]) -> Result<usize, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::InvalidIdentifier(label.to_string()))
        }

        async fn upsert_edges(&self, _relation_type: &str, _rows: &[EdgeRow]) -> Result<usize, StoreError> {
            Ok(0)
        }

        async fn stats(&self) -> Result<GraphStats, StoreError> {
            Ok(GraphStats::default())
        }

        async fn fetch_snapshot(&self) -> Result<GraphSnapshot, StoreError> {
            Ok(GraphSnapshot::default())
        }
    }

    #[tokio::test]
    async fn invalid_identifiers_fail_without_retrying() {
        let store = RejectingStore::default();
        let result = Ingestor::new(&store)
            .with_retry(RetryPolicy::new(3, 0, 0))
            .ingest(&plan())
            .await;

        assert!(matches!(result, Err(StoreError::InvalidIdentifier(_))));
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reset_clears_the_store() {
        let store = MemoryStore::new();
        let ingestor = Ingestor::new(&store);
        ingestor.ingest(&plan()).await.unwrap();

        ingestor.reset().await.unwrap();
        assert_eq!(store.stats().await.unwrap(), GraphStats::default());
    }
}
