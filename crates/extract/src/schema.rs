use crate::report::{Diagnostic, DiagnosticKind};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Entity id assigned by the oracle, only meaningful inside one response.
pub type LocalId = i64;

/// Run-stable entity id assigned by the canonicalizer.
pub type CanonicalId = u64;

pub const DEFAULT_ENTITY_TYPE: &str = "other";
pub const DEFAULT_RELATION_TYPE: &str = "related_to";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    MedicalCondition,
    Medication,
    TreatmentType,
    Outcome,
    Measure,
    PatientGroup,
    Study,
    Dosage,
    QuantitativeResult,
    Other,
}

impl EntityType {
    pub fn parse(raw: &str) -> Option<Self> {
        let kind = match raw.trim().to_lowercase().as_str() {
            "medical_condition" => Self::MedicalCondition,
            "medication" => Self::Medication,
            "treatment_type" => Self::TreatmentType,
            "outcome" => Self::Outcome,
            "measure" => Self::Measure,
            "patient_group" => Self::PatientGroup,
            "study" => Self::Study,
            "dosage" => Self::Dosage,
            "quantitative_result" => Self::QuantitativeResult,
            "other" => Self::Other,
            _ => return None,
        };
        Some(kind)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MedicalCondition => "medical_condition",
            Self::Medication => "medication",
            Self::TreatmentType => "treatment_type",
            Self::Outcome => "outcome",
            Self::Measure => "measure",
            Self::PatientGroup => "patient_group",
            Self::Study => "study",
            Self::Dosage => "dosage",
            Self::QuantitativeResult => "quantitative_result",
            Self::Other => "other",
        }
    }
}

/// Accepted key names per field, highest priority first.
pub mod keys {
    pub const ENTITY_ID: &[&str] = &["id", "uid", "node_id"];
    pub const ENTITY_TEXT: &[&str] = &["text", "name", "label"];
    pub const ENTITY_TYPE: &[&str] = &["type", "category"];
    pub const CODE_SYSTEM: &[&str] = &["code_system", "codeSystem"];
    pub const CODE: &[&str] = &["code"];
    pub const HEAD: &[&str] = &["head", "source", "from"];
    pub const TAIL: &[&str] = &["tail", "target", "to"];
    pub const RELATION_TYPE: &[&str] = &["type", "relation"];
    pub const EVIDENCE: &[&str] = &["evidence"];
    pub const ENTITY_IDS: &[&str] = &["entity_ids", "entityIds"];
    pub const INTERACTION_TYPE: &[&str] = &["interaction_type", "interactionType", "type"];
    pub const NOTE: &[&str] = &["note"];

    pub const ENTITIES: &[&str] = &["entities", "nodes"];
    pub const RELATIONSHIPS: &[&str] = &["relationships", "relations", "edges"];
    pub const INTERACTIONS: &[&str] = &["interactions"];
}

/// First non-null value among `keys`.
fn first_present<'a>(object: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| object.get(*key))
        .find(|value| !value.is_null())
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn as_local_id(value: &Value) -> Option<LocalId> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn text_field(object: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    first_present(object, keys).and_then(as_text)
}

/// Scalar, non-empty values whose key is not one of the recognized fields.
fn extra_scalars(object: &Map<String, Value>, consumed: &[&[&str]]) -> Map<String, Value> {
    object
        .iter()
        .filter(|(key, _)| !consumed.iter().any(|group| group.contains(&key.as_str())))
        .filter(|(_, value)| match value {
            Value::String(s) => !s.trim().is_empty(),
            Value::Number(_) | Value::Bool(_) => true,
            _ => false,
        })
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawEntity {
    pub id: Option<LocalId>,
    pub text: Option<String>,
    pub entity_type: String,
    pub code_system: Option<String>,
    pub code: Option<String>,
    pub extra: Map<String, Value>,
}

impl RawEntity {
    pub fn from_object(object: &Map<String, Value>) -> Self {
        Self {
            id: first_present(object, keys::ENTITY_ID).and_then(as_local_id),
            text: text_field(object, keys::ENTITY_TEXT),
            entity_type: text_field(object, keys::ENTITY_TYPE)
                .unwrap_or_else(|| DEFAULT_ENTITY_TYPE.to_string()),
            code_system: text_field(object, keys::CODE_SYSTEM),
            code: text_field(object, keys::CODE),
            extra: extra_scalars(
                object,
                &[
                    keys::ENTITY_ID,
                    keys::ENTITY_TEXT,
                    keys::ENTITY_TYPE,
                    keys::CODE_SYSTEM,
                    keys::CODE,
                ],
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawRelationship {
    pub head: Option<LocalId>,
    pub tail: Option<LocalId>,
    pub relation_type: String,
    pub evidence: String,
}

impl RawRelationship {
    pub fn from_object(object: &Map<String, Value>) -> Self {
        Self {
            head: first_present(object, keys::HEAD).and_then(as_local_id),
            tail: first_present(object, keys::TAIL).and_then(as_local_id),
            relation_type: text_field(object, keys::RELATION_TYPE)
                .unwrap_or_else(|| DEFAULT_RELATION_TYPE.to_string()),
            evidence: text_field(object, keys::EVIDENCE).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawInteraction {
    pub id: Option<LocalId>,
    /// Every reference the oracle gave; arity is checked during validation.
    pub entity_ids: Vec<Option<LocalId>>,
    pub interaction_type: Option<String>,
    pub note: String,
    pub evidence: String,
}

impl RawInteraction {
    pub fn from_object(object: &Map<String, Value>) -> Self {
        let entity_ids = match first_present(object, keys::ENTITY_IDS) {
            Some(Value::Array(items)) => items.iter().map(as_local_id).collect(),
            Some(single) => vec![as_local_id(single)],
            None => Vec::new(),
        };

        Self {
            id: first_present(object, keys::ENTITY_ID).and_then(as_local_id),
            entity_ids,
            interaction_type: text_field(object, keys::INTERACTION_TYPE),
            note: text_field(object, keys::NOTE).unwrap_or_default(),
            evidence: text_field(object, keys::EVIDENCE).unwrap_or_default(),
        }
    }
}

/// One oracle response (or one input document) in typed form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractionPayload {
    pub entities: Vec<RawEntity>,
    pub relationships: Vec<RawRelationship>,
    pub interactions: Vec<RawInteraction>,
    /// Items that were not JSON objects and had to be skipped.
    pub diagnostics: Vec<Diagnostic>,
}

impl ExtractionPayload {
    /// Returns `None` when `value` is not a JSON object.
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let mut payload = Self::default();

        let diagnostics = &mut payload.diagnostics;

        payload.entities = collect_objects(object, keys::ENTITIES, "entity", diagnostics)
            .into_iter()
            .map(RawEntity::from_object)
            .collect();
        payload.relationships = collect_objects(object, keys::RELATIONSHIPS, "relationship", diagnostics)
            .into_iter()
            .map(RawRelationship::from_object)
            .collect();
        payload.interactions = collect_objects(object, keys::INTERACTIONS, "interaction", diagnostics)
            .into_iter()
            .map(RawInteraction::from_object)
            .collect();

        Some(payload)
    }
}

fn collect_objects<'a>(
    object: &'a Map<String, Value>,
    keys: &[&str],
    what: &str,
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<&'a Map<String, Value>> {
    let items: &[Value] = match first_present(object, keys) {
        Some(Value::Array(items)) => items,
        Some(other) => {
            diagnostics.push(Diagnostic::new(
                DiagnosticKind::MalformedRecord,
                format!("expected a list of {what} records, found {other}"),
            ));
            &[]
        }
        None => &[],
    };

    let mut objects = Vec::with_capacity(items.len());
    for item in items {
        match item.as_object() {
            Some(map) => objects.push(map),
            None => diagnostics.push(Diagnostic::new(
                DiagnosticKind::MalformedRecord,
                format!("skipping {what} that is not an object: {item}"),
            )),
        }
    }
    objects
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalEntity {
    pub id: CanonicalId,
    pub text: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_system: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(flatten)]
    pub properties: Map<String, Value>,
}

impl CanonicalEntity {
    pub fn kind(&self) -> Option<EntityType> {
        EntityType::parse(&self.entity_type)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CanonicalRelationship {
    pub head: CanonicalId,
    pub tail: CanonicalId,
    #[serde(rename = "type")]
    pub relation_type: String,
    pub evidence: String,
}

/// The combined output of one extraction run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanonicalGraph {
    pub entities: Vec<CanonicalEntity>,
    pub relationships: Vec<CanonicalRelationship>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub raw_responses: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_synonym_keys_in_priority_order() {
        let value = json!({
            "nodes": [
                {"uid": "3", "name": "Sertraline", "category": "medication", "code_system": "RXNORM", "code": 36437},
                {"id": 4, "uid": 9, "text": "MDD", "label": "ignored", "type": "medical_condition"}
            ],
            "relations": [
                {"source": 3, "to": "4", "relation": "treats", "evidence": "sertraline treats MDD"}
            ]
        });

        let payload = ExtractionPayload::from_value(&value).unwrap();

        assert_eq!(payload.entities[0].id, Some(3));
        assert_eq!(payload.entities[0].text.as_deref(), Some("Sertraline"));
        assert_eq!(payload.entities[0].entity_type, "medication");
        assert_eq!(payload.entities[0].code.as_deref(), Some("36437"));
        assert_eq!(payload.entities[1].id, Some(4));
        assert_eq!(payload.entities[1].text.as_deref(), Some("MDD"));

        let rel = &payload.relationships[0];
        assert_eq!((rel.head, rel.tail), (Some(3), Some(4)));
        assert_eq!(rel.relation_type, "treats");
        assert!(payload.diagnostics.is_empty());
    }

    #[test]
    fn keeps_unrecognized_scalars_as_extra_properties() {
        let value = json!({"id": 1, "text": "remission", "type": "outcome", "confidence": 0.9, "tags": ["a"], "note": ""});
        let entity = RawEntity::from_object(value.as_object().unwrap());

        assert_eq!(entity.extra.len(), 1);
        assert_eq!(entity.extra["confidence"], json!(0.9));
    }

    #[test]
    fn defaults_missing_types() {
        let value = json!({"entities": [{"id": 1, "text": "x"}], "relationships": [{"head": 1, "tail": 1}]});
        let payload = ExtractionPayload::from_value(&value).unwrap();

        assert_eq!(payload.entities[0].entity_type, DEFAULT_ENTITY_TYPE);
        assert_eq!(payload.relationships[0].relation_type, DEFAULT_RELATION_TYPE);
        assert_eq!(payload.relationships[0].evidence, "");
    }

    #[test]
    fn skips_non_object_items_with_a_diagnostic() {
        let value = json!({"entities": [{"id": 1, "text": "x"}, "junk"], "relationships": 7});
        let payload = ExtractionPayload::from_value(&value).unwrap();

        assert_eq!(payload.entities.len(), 1);
        assert_eq!(payload.diagnostics.len(), 2);
        assert!(ExtractionPayload::from_value(&json!([1, 2])).is_none());
    }

    #[test]
    fn interaction_keeps_every_reference() {
        let value = json!({"id": 1, "entity_ids": [2, "x", 5], "interaction_type": "contraindicated"});
        let interaction = RawInteraction::from_object(value.as_object().unwrap());

        assert_eq!(interaction.entity_ids, vec![Some(2), None, Some(5)]);
    }

    #[test]
    fn entity_type_round_trips_through_str() {
        for raw in ["medication", " Treatment_Type ", "quantitative_result"] {
            let kind = EntityType::parse(raw).unwrap();
            assert_eq!(kind.as_str(), raw.trim().to_lowercase());
        }
        assert_eq!(EntityType::parse("symptom"), None);
    }
}
