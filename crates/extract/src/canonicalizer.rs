//! Run-scoped canonicalization of entities and relationships.
//!
//! All mutable state of a run lives in [`CanonicalContext`]; chunks are folded
//! into it one at a time, so id assignment is serialized by `&mut` access.

use crate::normalizer::{EntityKey, EntityNormalizer};
use crate::report::{ChunkReport, Diagnostic, DiagnosticKind};
use crate::response::ChunkOutcome;
use crate::schema::{
    CanonicalEntity, CanonicalGraph, CanonicalId, CanonicalRelationship, LocalId, RawEntity,
    RawRelationship, DEFAULT_RELATION_TYPE,
};
use anyhow::{bail, Result};
use std::collections::{HashMap, HashSet};

/// Chunk-local id -> canonical id, valid for one oracle response.
pub type LocalIdMap = HashMap<LocalId, CanonicalId>;

#[derive(Debug, Default)]
pub struct EntityPass {
    pub local_ids: LocalIdMap,
    pub seen: usize,
    pub new_entities: usize,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Default)]
pub struct RelationshipPass {
    pub kept: usize,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Default)]
pub struct CanonicalContext {
    normalizer: EntityNormalizer,
    ids: HashMap<EntityKey, CanonicalId>,
    entities: Vec<CanonicalEntity>,
    relationships: Vec<CanonicalRelationship>,
    raw_responses: Vec<String>,
}

impl CanonicalContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume from entities canonicalized earlier. New ids continue after the
    /// highest seeded id.
    pub fn with_entities(entities: Vec<CanonicalEntity>) -> Result<Self> {
        let mut context = Self::new();

        for entity in entities {
            let key = context.normalizer.key(&entity.text, &entity.entity_type);
            if context.ids.values().any(|&id| id == entity.id) {
                bail!("Duplicate canonical id {} in seed entities", entity.id);
            }
            if context.ids.insert(key, entity.id).is_some() {
                bail!("Seed entities contain two records for {:?}", entity.text);
            }
            context.entities.push(entity);
        }
        context.entities.sort_by_key(|e| e.id);

        Ok(context)
    }

    /// Continue a run from its combined output. Earlier relationships and raw
    /// responses are carried through to the next `finish`.
    pub fn resume(graph: CanonicalGraph) -> Result<Self> {
        let mut context = Self::with_entities(graph.entities)?;
        context.relationships = graph.relationships;
        context.raw_responses = graph.raw_responses;
        Ok(context)
    }

    pub fn entities(&self) -> &[CanonicalEntity] {
        &self.entities
    }

    pub fn normalizer(&self) -> &EntityNormalizer {
        &self.normalizer
    }

    fn next_id(&self) -> CanonicalId {
        self.entities.last().map_or(1, |e| e.id + 1)
    }

    /// Assign canonical ids to one chunk's entities.
    pub fn canonicalize_entities(&mut self, entities: &[RawEntity]) -> EntityPass {
        let mut pass = EntityPass::default();

        for raw in entities {
            let Some(text) = raw.text.as_deref() else {
                pass.diagnostics.push(Diagnostic::new(
                    DiagnosticKind::MalformedRecord,
                    format!("entity {:?} has no text", raw.id),
                ));
                continue;
            };
            pass.seen += 1;

            let key = self.normalizer.key(text, &raw.entity_type);
            let canonical_id = match self.ids.get(&key) {
                Some(&id) => {
                    self.fill_missing(id, raw);
                    id
                }
                None => {
                    let id = self.next_id();
                    self.entities.push(CanonicalEntity {
                        id,
                        text: text.to_string(),
                        entity_type: key.entity_type.clone(),
                        code_system: raw.code_system.clone(),
                        code: raw.code.clone(),
                        properties: raw.extra.clone(),
                    });
                    self.ids.insert(key, id);
                    pass.new_entities += 1;
                    id
                }
            };

            if let Some(local) = raw.id {
                let mapped = *pass.local_ids.entry(local).or_insert(canonical_id);
                if mapped != canonical_id {
                    pass.diagnostics.push(Diagnostic::new(
                        DiagnosticKind::MalformedRecord,
                        format!("local id {local} reused for different entities, keeping the first"),
                    ));
                }
            }
        }

        pass
    }

    /// Later sightings may fill gaps but never replace what is already known.
    fn fill_missing(&mut self, id: CanonicalId, raw: &RawEntity) {
        let Some(entity) = self.entities.iter_mut().find(|e| e.id == id) else {
            return;
        };

        if entity.code_system.is_none() {
            entity.code_system = raw.code_system.clone();
        }
        if entity.code.is_none() {
            entity.code = raw.code.clone();
        }
        for (key, value) in &raw.extra {
            entity
                .properties
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
    }

    /// Remap one chunk's relationships onto canonical ids.
    pub fn canonicalize_relationships(
        &mut self,
        relationships: &[RawRelationship],
        local_ids: &LocalIdMap,
    ) -> RelationshipPass {
        let mut pass = RelationshipPass::default();

        for raw in relationships {
            let head = raw.head.and_then(|id| local_ids.get(&id).copied());
            let tail = raw.tail.and_then(|id| local_ids.get(&id).copied());

            let (Some(head), Some(tail)) = (head, tail) else {
                pass.diagnostics.push(Diagnostic::new(
                    DiagnosticKind::UnresolvedReference,
                    format!(
                        "dropping '{}' relationship {:?} -> {:?}: endpoint not defined in chunk",
                        raw.relation_type, raw.head, raw.tail
                    ),
                ));
                continue;
            };

            self.relationships.push(CanonicalRelationship {
                head,
                tail,
                relation_type: normalize_relation_type(&raw.relation_type),
                evidence: self.normalizer.normalize(&raw.evidence),
            });
            pass.kept += 1;
        }

        pass
    }

    /// Fold one chunk's extraction outcome into the run.
    pub fn absorb(&mut self, chunk_index: usize, outcome: ChunkOutcome) -> ChunkReport {
        let mut report = ChunkReport {
            chunk_index,
            ..Default::default()
        };

        match outcome {
            ChunkOutcome::Parsed(payload) => {
                report.parsed = true;
                report.diagnostics.extend(payload.diagnostics);

                let entities = self.canonicalize_entities(&payload.entities);
                let relationships =
                    self.canonicalize_relationships(&payload.relationships, &entities.local_ids);

                report.entities_seen = entities.seen;
                report.new_entities = entities.new_entities;
                report.relationships_kept = relationships.kept;
                report.diagnostics.extend(entities.diagnostics);
                report.diagnostics.extend(relationships.diagnostics);
            }
            ChunkOutcome::Failed { raw, error } => {
                report.diagnostics.push(Diagnostic::new(
                    DiagnosticKind::ParseFailure,
                    format!("response is not valid extraction JSON: {error}"),
                ));
                self.raw_responses.push(raw);
            }
            ChunkOutcome::OracleError(error) => {
                report
                    .diagnostics
                    .push(Diagnostic::new(DiagnosticKind::OracleFailure, error));
            }
        }

        for diagnostic in &report.diagnostics {
            diagnostic.log(Some(chunk_index));
        }

        report
    }

    /// Hand off the run's result, dropping exact duplicate relationships.
    pub fn finish(self) -> CanonicalGraph {
        let mut seen = HashSet::new();
        let mut relationships = self.relationships;
        relationships.retain(|rel| seen.insert(rel.clone()));

        CanonicalGraph {
            entities: self.entities,
            relationships,
            raw_responses: self.raw_responses,
        }
    }
}

pub fn normalize_relation_type(raw: &str) -> String {
    let normalized = raw
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase();
    if normalized.is_empty() {
        DEFAULT_RELATION_TYPE.to_string()
    } else {
        normalized
    }
}
