//! Turning extraction output into store rows.

use crate::labels::{label_for, relation_type_for};
use crate::store::{EdgeRow, EntityRow};
use extract::{
    validate_interactions, CanonicalGraph, Diagnostic, DiagnosticKind, EntityKey,
    EntityNormalizer, EntityType, ExtractionPayload, Interaction, LocalId,
};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Store identity for an entity. Never the per-run integer id.
pub fn stable_key(key: &EntityKey) -> String {
    format!("{}:{}", key.entity_type, key.text)
}

fn scalar_properties<'a>(
    properties: impl IntoIterator<Item = (&'a String, &'a Value)>,
) -> Map<String, Value> {
    properties
        .into_iter()
        .filter(|(_, value)| match value {
            Value::String(s) => !s.trim().is_empty(),
            Value::Number(_) | Value::Bool(_) => true,
            _ => false,
        })
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Node properties the store owns. Extraction extras never overwrite them.
const RESERVED_PROPERTIES: &[&str] = &[
    "key",
    "text",
    "type",
    "label",
    "createdAt",
    "updatedAt",
    "code_system",
    "code",
];

fn entity_properties(
    code_system: Option<&str>,
    code: Option<&str>,
    extra: &Map<String, Value>,
) -> Map<String, Value> {
    let mut properties = scalar_properties(
        extra
            .iter()
            .filter(|(name, _)| !RESERVED_PROPERTIES.contains(&name.as_str())),
    );
    for (name, value) in [("code_system", code_system), ("code", code)] {
        if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
            properties.insert(name.to_string(), Value::String(value.to_string()));
        }
    }
    properties
}

/// Entity and edge rows grouped by label and relationship type, ready to be
/// written in batches.
#[derive(Debug, Default)]
pub struct IngestPlan {
    normalizer: EntityNormalizer,
    entities: BTreeMap<String, Vec<EntityRow>>,
    entity_slots: HashMap<String, usize>,
    edges: BTreeMap<String, Vec<EdgeRow>>,
    seen_edges: HashSet<EdgeRow>,
    pub diagnostics: Vec<Diagnostic>,
}

impl IngestPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.values().map(Vec::len).sum()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.edges.is_empty()
    }

    /// Entity rows per label, in label order.
    pub fn entity_groups(&self) -> impl Iterator<Item = (&str, &[EntityRow])> {
        self.entities.iter().map(|(label, rows)| (label.as_str(), rows.as_slice()))
    }

    /// Edge rows per relationship type, in type order.
    pub fn edge_groups(&self) -> impl Iterator<Item = (&str, &[EdgeRow])> {
        self.edges.iter().map(|(kind, rows)| (kind.as_str(), rows.as_slice()))
    }

    fn report(&mut self, kind: DiagnosticKind, message: String) {
        let diagnostic = Diagnostic::new(kind, message);
        diagnostic.log(None);
        self.diagnostics.push(diagnostic);
    }

    /// Add one entity; returns its stable key. A repeated key keeps the first
    /// display text and merges in the new properties.
    fn push_entity(&mut self, text: &str, entity_type: &str, properties: Map<String, Value>) -> String {
        let key = self.normalizer.key(text, entity_type);
        let id = stable_key(&key);
        let label = label_for(&key.entity_type);

        if let Some(&slot) = self.entity_slots.get(&id) {
            if let Some(row) = self.entities.get_mut(&label).and_then(|rows| rows.get_mut(slot)) {
                row.properties.extend(properties);
            }
            return id;
        }

        let rows = self.entities.entry(label.clone()).or_default();
        self.entity_slots.insert(id.clone(), rows.len());
        rows.push(EntityRow {
            key: id.clone(),
            text: text.trim().to_string(),
            entity_type: key.entity_type,
            label,
            properties,
        });

        id
    }

    fn push_edge(&mut self, head: String, tail: String, relation_type: &str, evidence: &str, note: &str) {
        let relation_type = relation_type_for(relation_type);
        let row = EdgeRow {
            head,
            tail,
            relation_type: relation_type.clone(),
            evidence: evidence.trim().to_string(),
            note: note.trim().to_string(),
        };

        if self.seen_edges.insert(row.clone()) {
            self.edges.entry(relation_type).or_default().push(row);
        }
    }

    /// Add an extraction document of any supported shape. Ids inside the
    /// document only resolve against that document's own entities.
    pub fn add_document(&mut self, source: &str, value: &Value) {
        let Some(payload) = ExtractionPayload::from_value(value) else {
            self.report(
                DiagnosticKind::MalformedRecord,
                format!("{source}: top-level value is not a JSON object"),
            );
            return;
        };

        for diagnostic in payload.diagnostics {
            self.report(diagnostic.kind, format!("{source}: {}", diagnostic.message));
        }

        let mut local_ids: HashMap<LocalId, String> = HashMap::new();
        let mut candidates: HashMap<u64, String> = HashMap::new();

        for entity in &payload.entities {
            let Some(text) = entity.text.as_deref().filter(|t| !t.trim().is_empty()) else {
                self.report(
                    DiagnosticKind::MalformedRecord,
                    format!("{source}: skipping entity {:?} without text", entity.id),
                );
                continue;
            };

            let properties = entity_properties(
                entity.code_system.as_deref(),
                entity.code.as_deref(),
                &entity.extra,
            );
            let key = self.push_entity(text, &entity.entity_type, properties);

            if let Some(id) = entity.id {
                let interactive = matches!(
                    EntityType::parse(&entity.entity_type),
                    Some(EntityType::Medication | EntityType::TreatmentType)
                );
                if let (true, Ok(id)) = (interactive, u64::try_from(id)) {
                    candidates.insert(id, key.clone());
                }
                local_ids.insert(id, key);
            }
        }

        for rel in &payload.relationships {
            let resolved = (
                rel.head.and_then(|id| local_ids.get(&id)),
                rel.tail.and_then(|id| local_ids.get(&id)),
            );
            let (Some(head), Some(tail)) = resolved else {
                self.report(
                    DiagnosticKind::UnresolvedReference,
                    format!(
                        "{source}: dropping {} relationship {:?} -> {:?}",
                        rel.relation_type, rel.head, rel.tail
                    ),
                );
                continue;
            };
            let (head, tail) = (head.clone(), tail.clone());
            self.push_edge(head, tail, &rel.relation_type, &rel.evidence, "");
        }

        if !payload.interactions.is_empty() {
            let known: HashSet<u64> = candidates.keys().copied().collect();
            let pass = validate_interactions(&payload.interactions, &known);
            self.diagnostics.extend(pass.diagnostics);
            for interaction in &pass.accepted {
                let [first, second] = interaction.entity_ids;
                let (Some(head), Some(tail)) = (candidates.get(&first), candidates.get(&second)) else {
                    continue;
                };
                let (head, tail) = (head.clone(), tail.clone());
                self.push_interaction(head, tail, interaction);
            }
        }
    }

    pub fn add_graph(&mut self, graph: &CanonicalGraph) {
        let keys = self.add_graph_entities(graph);

        for rel in &graph.relationships {
            let (Some(head), Some(tail)) = (keys.get(&rel.head), keys.get(&rel.tail)) else {
                self.report(
                    DiagnosticKind::UnresolvedReference,
                    format!("dropping {} relationship {} -> {}", rel.relation_type, rel.head, rel.tail),
                );
                continue;
            };
            let (head, tail) = (head.clone(), tail.clone());
            self.push_edge(head, tail, &rel.relation_type, &rel.evidence, "");
        }
    }

    /// Add interaction edges between entities of `graph`. The entities are
    /// upserted too so the edges always have endpoints.
    pub fn add_interactions(&mut self, graph: &CanonicalGraph, interactions: &[Interaction]) {
        let keys = self.add_graph_entities(graph);

        for interaction in interactions {
            let [first, second] = interaction.entity_ids;
            let (Some(head), Some(tail)) = (keys.get(&first), keys.get(&second)) else {
                self.report(
                    DiagnosticKind::UnresolvedReference,
                    format!("dropping interaction {} between {first} and {second}", interaction.id),
                );
                continue;
            };
            let (head, tail) = (head.clone(), tail.clone());
            self.push_interaction(head, tail, interaction);
        }
    }

    fn add_graph_entities(&mut self, graph: &CanonicalGraph) -> HashMap<u64, String> {
        graph
            .entities
            .iter()
            .map(|entity| {
                let properties = entity_properties(
                    entity.code_system.as_deref(),
                    entity.code.as_deref(),
                    &entity.properties,
                );
                (entity.id, self.push_entity(&entity.text, &entity.entity_type, properties))
            })
            .collect()
    }

    fn push_interaction(&mut self, head: String, tail: String, interaction: &Interaction) {
        self.push_edge(
            head,
            tail,
            interaction.interaction_type.relation_type(),
            &interaction.evidence,
            &interaction.note,
        );
    }
}
