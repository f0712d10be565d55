//! Second-pass annotation of pairwise medication/treatment interactions.

use crate::llm::ExtractionOracle;
use crate::prompt;
use crate::report::{Diagnostic, DiagnosticKind};
use crate::response::{parse_response, ChunkOutcome};
use crate::retry::RetryPolicy;
use crate::schema::{CanonicalEntity, CanonicalGraph, CanonicalId, EntityType, RawInteraction};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionType {
    Contraindicated,
    UseWithCaution,
}

impl InteractionType {
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "contraindicated" | "contraindication" => Some(Self::Contraindicated),
            "use_with_caution" | "caution" => Some(Self::UseWithCaution),
            _ => None,
        }
    }

    /// Edge type used in the graph store.
    pub fn relation_type(&self) -> &'static str {
        match self {
            Self::Contraindicated => "CONTRAINDICATED",
            Self::UseWithCaution => "USE_WITH_CAUTION",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub id: u64,
    pub entity_ids: [CanonicalId; 2],
    pub interaction_type: InteractionType,
    pub note: String,
    pub evidence: String,
}

/// File format for annotated interactions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InteractionSet {
    pub interactions: Vec<Interaction>,
}

#[derive(Debug, Default)]
pub struct InteractionPass {
    pub accepted: Vec<Interaction>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Entities an interaction may reference.
pub fn interaction_candidates(entities: &[CanonicalEntity]) -> Vec<&CanonicalEntity> {
    entities
        .iter()
        .filter(|e| matches!(e.kind(), Some(EntityType::Medication | EntityType::TreatmentType)))
        .collect()
}

/// Keep only candidates with exactly two distinct, known entity ids and a
/// recognized interaction type.
pub fn validate_interactions(raw: &[RawInteraction], known: &HashSet<CanonicalId>) -> InteractionPass {
    let mut pass = InteractionPass::default();

    for (index, candidate) in raw.iter().enumerate() {
        let reject = |reason: String| {
            Diagnostic::new(
                DiagnosticKind::MalformedInteraction,
                format!("skipping interaction {:?}: {reason}", candidate.id.unwrap_or(index as i64 + 1)),
            )
        };

        let &[Some(first), Some(second)] = candidate.entity_ids.as_slice() else {
            pass.diagnostics.push(reject(format!(
                "expected exactly two entity ids, got {:?}",
                candidate.entity_ids
            )));
            continue;
        };

        let resolve = |id: i64| u64::try_from(id).ok().filter(|id| known.contains(id));
        let (Some(first), Some(second)) = (resolve(first), resolve(second)) else {
            pass.diagnostics.push(reject(format!(
                "unknown entity id in {:?}",
                candidate.entity_ids
            )));
            continue;
        };

        if first == second {
            pass.diagnostics.push(reject("both ids refer to the same entity".to_string()));
            continue;
        }

        let Some(interaction_type) = candidate
            .interaction_type
            .as_deref()
            .and_then(InteractionType::parse)
        else {
            pass.diagnostics.push(reject(format!(
                "unrecognized interaction type {:?}",
                candidate.interaction_type
            )));
            continue;
        };

        pass.accepted.push(Interaction {
            id: candidate
                .id
                .and_then(|id| u64::try_from(id).ok())
                .unwrap_or(index as u64 + 1),
            entity_ids: [first, second],
            interaction_type,
            note: candidate.note.clone(),
            evidence: candidate.evidence.clone(),
        });
    }

    for diagnostic in &pass.diagnostics {
        diagnostic.log(None);
    }

    pass
}

pub struct InteractionAnnotator<O> {
    oracle: O,
    retry: RetryPolicy,
}

impl<O: ExtractionOracle> InteractionAnnotator<O> {
    pub fn new(oracle: O, retry: RetryPolicy) -> Self {
        Self { oracle, retry }
    }

    /// Ask the oracle for interactions among the graph's medications and
    /// treatments. Bad responses become diagnostics; only an unreachable
    /// oracle is an error.
    pub async fn annotate(&self, graph: &CanonicalGraph) -> Result<InteractionPass> {
        let candidates = interaction_candidates(&graph.entities);
        if candidates.len() < 2 {
            tracing::info!(candidates = candidates.len(), "Not enough candidates for interactions");
            return Ok(InteractionPass::default());
        }

        let input = prompt::build_interaction_input(&candidates);
        let reply = self
            .retry
            .retry("interaction annotation", || {
                self.oracle.complete(prompt::INTERACTION_INSTRUCTIONS, &input)
            })
            .await?;

        let known: HashSet<CanonicalId> = candidates.iter().map(|e| e.id).collect();

        match parse_response(&reply) {
            ChunkOutcome::Parsed(payload) => {
                let mut pass = validate_interactions(&payload.interactions, &known);
                pass.diagnostics.extend(payload.diagnostics);
                tracing::info!(
                    accepted = pass.accepted.len(),
                    rejected = pass.diagnostics.len(),
                    "Validated interaction candidates"
                );
                Ok(pass)
            }
            ChunkOutcome::Failed { error, .. } => {
                let diagnostic = Diagnostic::new(
                    DiagnosticKind::ParseFailure,
                    format!("interaction response is not valid JSON: {error}"),
                );
                diagnostic.log(None);
                Ok(InteractionPass {
                    accepted: Vec::new(),
                    diagnostics: vec![diagnostic],
                })
            }
            ChunkOutcome::OracleError(error) => anyhow::bail!(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Map};

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

    fn raw(value: serde_json::Value) -> RawInteraction {
        RawInteraction::from_object(value.as_object().unwrap())
    }

    #[test]
    fn candidates_are_medications_and_treatments() {
        let entities = vec![
            entity(1, "Phenelzine", "medication"),
            entity(2, "MDD", "medical_condition"),
            entity(3, "ECT", "treatment_type"),
        ];

        let ids: Vec<u64> = interaction_candidates(&entities).iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn rejects_wrong_arity_and_unknown_ids() {
        let known: HashSet<u64> = [1, 3].into_iter().collect();
        let candidates = vec![
            raw(json!({"id": 1, "entity_ids": [1], "interaction_type": "contraindicated"})),
            raw(json!({"id": 2, "entity_ids": [1, 3, 4], "interaction_type": "contraindicated"})),
            raw(json!({"id": 3, "entity_ids": [1, 2], "interaction_type": "contraindicated"})),
            raw(json!({"id": 4, "entity_ids": [1, 1], "interaction_type": "contraindicated"})),
            raw(json!({"id": 5, "entity_ids": [1, 3], "interaction_type": "synergy"})),
            raw(json!({"id": 6, "entity_ids": [1, 3], "interaction_type": "use with caution", "note": "monitor"})),
        ];

        let pass = validate_interactions(&candidates, &known);

        assert_eq!(pass.diagnostics.len(), 5);
        assert_eq!(
            pass.accepted,
            vec![Interaction {
                id: 6,
                entity_ids: [1, 3],
                interaction_type: InteractionType::UseWithCaution,
                note: "monitor".into(),
                evidence: String::new(),
            }]
        );
    }

    #[test]
    fn interaction_types_map_to_edge_types() {
        assert_eq!(InteractionType::parse("Contraindicated"), Some(InteractionType::Contraindicated));
        assert_eq!(InteractionType::parse("use-with-caution"), Some(InteractionType::UseWithCaution));
        assert_eq!(InteractionType::UseWithCaution.relation_type(), "USE_WITH_CAUTION");
    }

    struct CannedOracle(&'static str);

    #[async_trait]
    impl ExtractionOracle for CannedOracle {
        async fn complete(&self, _instructions: &str, _input: &str) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    #[tokio::test]
    async fn annotator_validates_oracle_reply() {
        let graph = CanonicalGraph {
            entities: vec![
                entity(1, "Phenelzine", "medication"),
                entity(2, "Sertraline", "medication"),
                entity(3, "MDD", "medical_condition"),
            ],
            ..Default::default()
        };
        let reply = "```json\n{\"interactions\": [\
            {\"id\": 1, \"entity_ids\": [1, 2], \"interaction_type\": \"contraindicated\", \"note\": \"serotonin syndrome\"},\
            {\"id\": 2, \"entity_ids\": [1, 3], \"interaction_type\": \"use_with_caution\"}\
        ]}\n```";

        let annotator = InteractionAnnotator::new(CannedOracle(reply), RetryPolicy::none());
        let pass = annotator.annotate(&graph).await.unwrap();

        assert_eq!(pass.accepted.len(), 1);
        assert_eq!(pass.accepted[0].entity_ids, [1, 2]);
        assert_eq!(pass.diagnostics.len(), 1);
    }

    #[tokio::test]
    async fn annotator_tolerates_garbage() {
        let graph = CanonicalGraph {
            entities: vec![entity(1, "A", "medication"), entity(2, "B", "treatment_type")],
            ..Default::default()
        };

        let annotator = InteractionAnnotator::new(CannedOracle("I cannot help"), RetryPolicy::none());
        let pass = annotator.annotate(&graph).await.unwrap();

        assert!(pass.accepted.is_empty());
        assert_eq!(pass.diagnostics[0].kind, DiagnosticKind::ParseFailure);
    }
}
