use crate::evidence::merge_expression;
use crate::labels::is_safe_identifier;
use crate::snapshot::{GraphSnapshot, SnapshotEdge, SnapshotNode};
use crate::store::{EdgeRow, EntityRow, GraphStats, GraphStore, StoreError};
use async_trait::async_trait;
use neo4rs::{BoltMap, BoltType, Graph, Query};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Neo4jConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
}

impl Default for Neo4jConfig {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".to_string(),
            user: "neo4j".to_string(),
            password: "test1234".to_string(),
        }
    }
}

const SCHEMA_STATEMENTS: &[&str] = &[
    "CREATE CONSTRAINT entity_key_unique IF NOT EXISTS FOR (n:Entity) REQUIRE n.key IS UNIQUE",
    "CREATE INDEX entity_type_index IF NOT EXISTS FOR (n:Entity) ON (n.type)",
    "CREATE INDEX entity_text_index IF NOT EXISTS FOR (n:Entity) ON (n.text)",
];

pub struct Neo4jStore {
    graph: Graph,
}

fn query_error(e: impl std::fmt::Display) -> StoreError {
    StoreError::Query(e.to_string())
}

fn checked(identifier: &str) -> Result<&str, StoreError> {
    if is_safe_identifier(identifier) {
        Ok(identifier)
    } else {
        Err(StoreError::InvalidIdentifier(identifier.to_string()))
    }
}

fn bolt_value(value: &Value) -> Option<BoltType> {
    match value {
        Value::String(s) => Some(BoltType::from(s.clone())),
        Value::Bool(b) => Some(BoltType::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(BoltType::from(i)),
            None => n.as_f64().map(BoltType::from),
        },
        _ => None,
    }
}

fn bolt_map(entries: impl IntoIterator<Item = (String, BoltType)>) -> BoltType {
    let mut map = BoltMap::new();
    for (key, value) in entries {
        map.put(key.into(), value);
    }
    BoltType::Map(map)
}

fn property_map(properties: &Map<String, Value>) -> BoltType {
    bolt_map(
        properties
            .iter()
            .filter_map(|(key, value)| bolt_value(value).map(|v| (key.clone(), v))),
    )
}

fn entity_row(row: &EntityRow) -> BoltType {
    bolt_map([
        ("key".to_string(), BoltType::from(row.key.clone())),
        ("text".to_string(), BoltType::from(row.text.clone())),
        ("type".to_string(), BoltType::from(row.entity_type.clone())),
        ("props".to_string(), property_map(&row.properties)),
    ])
}

fn edge_row(row: &EdgeRow) -> BoltType {
    bolt_map([
        ("head".to_string(), BoltType::from(row.head.clone())),
        ("tail".to_string(), BoltType::from(row.tail.clone())),
        ("evidence".to_string(), BoltType::from(row.evidence.clone())),
        ("note".to_string(), BoltType::from(row.note.clone())),
    ])
}

fn entity_statement(label: &str) -> String {
    format!(
        "UNWIND $rows AS row \
         MERGE (n:Entity {{key: row.key}}) \
         ON CREATE SET n.createdAt = datetime(), n.text = row.text \
         SET n:`{label}`, n.type = row.type, n.updatedAt = datetime() \
         SET n += row.props \
         RETURN count(n) AS upserted"
    )
}

/// `r._new` marks relationships created by this statement until they have
/// been counted, then is removed.
fn edge_statement(relation_type: &str) -> String {
    format!(
        "UNWIND $rows AS row \
         MATCH (h:Entity {{key: row.head}}) \
         MATCH (t:Entity {{key: row.tail}}) \
         MERGE (h)-[r:`{relation_type}`]->(t) \
         ON CREATE SET r.createdAt = datetime(), r._new = true, \
             r.evidence = row.evidence, \
             r.note = CASE WHEN row.note = '' THEN null ELSE row.note END \
         ON MATCH SET r.evidence = {evidence}, r.note = {note} \
         SET r.updatedAt = datetime() \
         WITH r, r._new IS NOT NULL AS created \
         REMOVE r._new \
         RETURN count(DISTINCT CASE WHEN created THEN r END) AS created",
        evidence = merge_expression("evidence"),
        note = merge_expression("note"),
    )
}

impl Neo4jStore {
    /// Connect and verify the server answers before anything is written.
    pub async fn connect(config: &Neo4jConfig) -> Result<Self, StoreError> {
        tracing::info!(uri = %config.uri, "Connecting to Neo4j");

        let graph = Graph::new(config.uri.as_str(), config.user.as_str(), config.password.as_str())
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let store = Self { graph };
        store.health_check().await?;
        tracing::info!("Neo4j connection established");

        Ok(store)
    }

    pub async fn health_check(&self) -> Result<(), StoreError> {
        self.graph
            .run(Query::new("RETURN 1".to_string()))
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))
    }

    async fn single_count(&self, statement: &str, column: &str) -> Result<usize, StoreError> {
        self.count(Query::new(statement.to_string()), column).await
    }

    async fn count(&self, query: Query, column: &str) -> Result<usize, StoreError> {
        let mut result = self.graph.execute(query).await.map_err(query_error)?;
        let count = match result.next().await.map_err(query_error)? {
            Some(row) => row.get::<i64>(column).map_err(query_error)?,
            None => 0,
        };
        Ok(usize::try_from(count).unwrap_or(0))
    }
}

#[async_trait]
impl GraphStore for Neo4jStore {
    async fn reset(&self) -> Result<(), StoreError> {
        tracing::warn!("Deleting every node and relationship");
        self.graph
            .run(Query::new("MATCH (n) DETACH DELETE n".to_string()))
            .await
            .map_err(query_error)
    }

    async fn ensure_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA_STATEMENTS {
            if let Err(e) = self.graph.run(Query::new(statement.to_string())).await {
                tracing::warn!(statement = *statement, error = %e, "Failed to create schema element");
            }
        }
        Ok(())
    }

    async fn upsert_entities(&self, label: &str, rows: &[EntityRow]) -> Result<usize, StoreError> {
        if rows.is_empty() {
            return Ok(0);
        }
        let label = checked(label)?;

        let rows: Vec<BoltType> = rows.iter().map(entity_row).collect();
        let query = Query::new(entity_statement(label)).param("rows", rows);
        self.count(query, "upserted").await
    }

    async fn upsert_edges(&self, relation_type: &str, rows: &[EdgeRow]) -> Result<usize, StoreError> {
        if rows.is_empty() {
            return Ok(0);
        }
        let relation_type = checked(relation_type)?;

        let rows: Vec<BoltType> = rows.iter().map(edge_row).collect();
        let query = Query::new(edge_statement(relation_type)).param("rows", rows);
        self.count(query, "created").await
    }

    async fn stats(&self) -> Result<GraphStats, StoreError> {
        let entity_count = self
            .single_count("MATCH (n:Entity) RETURN count(n) AS count", "count")
            .await?;
        let relation_count = self
            .single_count("MATCH (:Entity)-[r]->(:Entity) RETURN count(r) AS count", "count")
            .await?;

        Ok(GraphStats {
            entity_count,
            relation_count,
        })
    }

    async fn fetch_snapshot(&self) -> Result<GraphSnapshot, StoreError> {
        let mut snapshot = GraphSnapshot::default();

        let query = Query::new(
            "MATCH (n:Entity) \
             RETURN n.key AS id, coalesce(n.text, n.key) AS label, coalesce(n.type, 'other') AS type \
             ORDER BY id"
                .to_string(),
        );
        let mut result = self.graph.execute(query).await.map_err(query_error)?;
        while let Some(row) = result.next().await.map_err(query_error)? {
            snapshot.nodes.push(SnapshotNode {
                id: row.get("id").map_err(query_error)?,
                label: row.get("label").map_err(query_error)?,
                node_type: row.get("type").map_err(query_error)?,
            });
        }

        let query = Query::new(
            "MATCH (a:Entity)-[r]->(b:Entity) \
             RETURN a.key AS source, b.key AS target, type(r) AS type, \
                    coalesce(r.evidence, '') AS evidence, coalesce(r.note, '') AS note \
             ORDER BY source, target, type"
                .to_string(),
        );
        let mut result = self.graph.execute(query).await.map_err(query_error)?;
        while let Some(row) = result.next().await.map_err(query_error)? {
            snapshot.edges.push(SnapshotEdge {
                source: row.get("source").map_err(query_error)?,
                target: row.get("target").map_err(query_error)?,
                edge_type: row.get("type").map_err(query_error)?,
                evidence: row.get("evidence").map_err(query_error)?,
                note: row.get("note").map_err(query_error)?,
            });
        }

        tracing::info!(
            nodes = snapshot.nodes.len(),
            edges = snapshot.edges.len(),
            "Fetched graph snapshot"
        );
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statements_interpolate_only_the_identifier() {
        let statement = entity_statement("Medication");
        assert!(statement.contains("SET n:`Medication`"));
        assert!(statement.contains("MERGE (n:Entity {key: row.key})"));

        let statement = edge_statement("TREATS");
        assert!(statement.contains("MERGE (h)-[r:`TREATS`]->(t)"));
        assert!(statement.contains("r.evidence CONTAINS row.evidence"));
        assert!(statement.contains("r.note CONTAINS row.note"));
        assert!(statement.contains("REMOVE r._new"));
        assert!(!statement.contains("$batch"));
    }

    #[test]
    fn unsafe_identifiers_never_reach_a_statement() {
        assert!(checked("TREATS").is_ok());
        assert!(matches!(
            checked("TREATS`]->() DETACH DELETE"),
            Err(StoreError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn only_scalars_become_properties() {
        let properties: Map<String, Value> = serde_json::from_str(
            r#"{"code": "36437", "dose_mg": 50, "ratio": 0.5, "generic": true, "aliases": ["a"]}"#,
        )
        .unwrap();

        assert_eq!(properties.values().filter_map(bolt_value).count(), 4);
        assert!(matches!(property_map(&properties), BoltType::Map(_)));
    }

    #[test]
    fn default_config_points_at_local_server() {
        let config = Neo4jConfig::default();
        assert_eq!(config.uri, "bolt://localhost:7687");
        assert_eq!(config.user, "neo4j");
    }
}
