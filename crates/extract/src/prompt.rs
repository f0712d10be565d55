use crate::schema::CanonicalEntity;
use serde_json::json;

pub const EXTRACTION_INSTRUCTIONS: &str = r#"You are an information extraction system for clinical mental health research text.
Extract entities and relationships related to depression and anxiety. Only use what is
explicitly stated in the text. Do not infer or add information.

ENTITY TYPES:
- medical_condition: a disorder or subtype (e.g. "major depressive disorder", "anxious depression")
- medication: a drug or drug class (e.g. "sertraline", "SSRIs")
- treatment_type: a non-drug therapy (e.g. "cognitive behavioral therapy", "electroconvulsive therapy")
- outcome: a measurable result (e.g. "remission", "response rate", "dropout")
- patient_group: a group with shared traits (e.g. "adolescents with MDD", "anxious outpatients")
- study: a study design or named trial (e.g. "randomized controlled trial", "STAR*D")
- measure: a rating scale or metric (e.g. "Hamilton Depression Rating Scale")
- dosage: medication dosage information
- quantitative_result: a numeric result tied to an outcome or measure (e.g. "65% remission")
- other: anything relevant that fits none of the above

RELATIONSHIP TYPES:
- treats: medication/treatment_type -> medical_condition
- has_outcome: medication/treatment_type/patient_group -> outcome
- affects: patient_group -> outcome
- compares: study -> medication/treatment_type
- has_dosage: medication -> dosage
- measured_by: outcome -> measure
- reports: outcome/medication/treatment_type -> quantitative_result

RULES:
- Use sequential integer ids starting at 1; relationships refer to these ids.
- Prefer the full name over an abbreviation and do not put abbreviations in parentheses.
- For medications set code_system "RXNORM", for conditions "ICD-10", for measures "LOINC",
  for procedures "CPT", with the matching code. Use null for both when unsure; never invent codes.
- Put the supporting sentence for each relationship in "evidence".
- Output ONLY the JSON object, no markdown, no explanations.

SCHEMA:
{
  "entities": [
    {"id": 1, "text": "Sertraline", "type": "medication", "code_system": "RXNORM", "code": "36437"}
  ],
  "relationships": [
    {"head": 1, "tail": 2, "type": "treats", "evidence": "supporting text"}
  ]
}

If nothing relevant is found, return {"entities": [], "relationships": []}"#;

pub const INTERACTION_INSTRUCTIONS: &str = r#"You are a clinical validation assistant.
You receive a JSON list of medications and treatments extracted from depression and anxiety
research. Identify pairs that are known contraindications or that should be used with caution
together.

RULES:
- Only use the entity ids given in the input. Each interaction references exactly two ids.
- interaction_type must be "contraindicated" or "use_with_caution".
- "note" is a short clinical explanation, "evidence" a reference or "unknown".
- Output ONLY the JSON object, no markdown, no explanations.

SCHEMA:
{
  "interactions": [
    {"id": 1, "entity_ids": [3, 7], "interaction_type": "contraindicated", "note": "...", "evidence": "..."}
  ]
}

If there are no interactions, return {"interactions": []}"#;

pub fn build_chunk_input(chunk_text: &str, chunk_number: usize, source: &str) -> String {
    format!(
        "Text section {} of {}:\n{}\n\nRespond with the JSON object containing all extracted entities and relationships.",
        chunk_number, source, chunk_text
    )
}

pub fn build_interaction_input(candidates: &[&CanonicalEntity]) -> String {
    let entities: Vec<_> = candidates
        .iter()
        .map(|e| json!({"id": e.id, "text": e.text, "type": e.entity_type}))
        .collect();

    json!({ "entities": entities }).to_string()
}
