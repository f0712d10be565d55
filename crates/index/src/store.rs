use crate::snapshot::GraphSnapshot;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use std::time::Duration;

/// One entity ready for upsert. `key` is the stable store identity derived
/// from normalized text and type; `text` is the display form.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRow {
    pub key: String,
    pub text: String,
    pub entity_type: String,
    pub label: String,
    /// Non-empty scalar properties; later values overwrite earlier ones.
    pub properties: Map<String, Value>,
}

/// One directed edge between two node keys. Empty `evidence` or `note`
/// means "nothing to add".
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EdgeRow {
    pub head: String,
    pub tail: String,
    pub relation_type: String,
    pub evidence: String,
    pub note: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GraphStats {
    pub entity_count: usize,
    pub relation_count: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("graph store connection error: {0}")]
    Connection(String),

    #[error("graph store query error: {0}")]
    Query(String),

    #[error("graph store write timed out after {0:?}")]
    Timeout(Duration),

    #[error("refusing to use {0:?} as a label or relationship type")]
    InvalidIdentifier(String),
}

impl StoreError {
    /// Whether repeating the same call could succeed.
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::InvalidIdentifier(_))
    }
}

/// A property graph that upserts idempotently.
///
/// Batches handed to `upsert_entities` share one label and batches handed to
/// `upsert_edges` share one relationship type.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Remove every node and relationship.
    async fn reset(&self) -> Result<(), StoreError>;

    async fn ensure_schema(&self) -> Result<(), StoreError>;

    /// Returns the number of rows written.
    async fn upsert_entities(&self, label: &str, rows: &[EntityRow]) -> Result<usize, StoreError>;

    /// Returns the number of relationships that did not exist before.
    async fn upsert_edges(&self, relation_type: &str, rows: &[EdgeRow]) -> Result<usize, StoreError>;

    async fn stats(&self) -> Result<GraphStats, StoreError>;

    async fn fetch_snapshot(&self) -> Result<GraphSnapshot, StoreError>;
}
