//! Node labels and relationship types. Both end up spliced into Cypher text,
//! so everything passes through [`sanitize_identifier`] first.

pub const DEFAULT_RELATION_TYPE: &str = "RELATED_TO";

const LABELS: &[(&str, &str)] = &[
    ("medical_condition", "MedicalCondition"),
    ("medication", "Medication"),
    ("treatment_type", "Treatment"),
    ("outcome", "Outcome"),
    ("measure", "Measure"),
    ("patient_group", "PatientGroup"),
    ("study", "Study"),
    ("dosage", "Dosage"),
    ("quantitative_result", "QuantitativeResult"),
];

/// Reduce `raw` to `[A-Za-z0-9_]`, starting with a letter.
pub fn sanitize_identifier(raw: &str) -> Option<String> {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }

    let trimmed = out.trim_matches('_');
    match trimmed.chars().next() {
        Some(first) if first.is_ascii_alphabetic() => Some(trimmed.to_string()),
        Some(_) => Some(format!("T_{trimmed}")),
        None => None,
    }
}

pub fn is_safe_identifier(identifier: &str) -> bool {
    identifier.starts_with(|c: char| c.is_ascii_alphabetic())
        && identifier.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn title_case(raw: &str) -> String {
    let mut chars = raw.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Label for an entity type; unknown types get a title-cased label.
pub fn label_for(entity_type: &str) -> String {
    let lowered = entity_type.trim().to_lowercase();
    if let Some((_, label)) = LABELS.iter().find(|(kind, _)| *kind == lowered) {
        return label.to_string();
    }
    sanitize_identifier(&title_case(&lowered)).unwrap_or_else(|| "EntityType".to_string())
}

/// Relationship type in Neo4j's upper snake case.
pub fn relation_type_for(raw: &str) -> String {
    sanitize_identifier(&raw.trim().to_lowercase())
        .map(|s| s.to_uppercase())
        .unwrap_or_else(|| DEFAULT_RELATION_TYPE.to_string())
}
