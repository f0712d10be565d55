use crate::schema::DEFAULT_ENTITY_TYPE;
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

static TRAILING_PARENTHETICAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\([^()]*\)$").unwrap());

static FORMULATION_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s+(?:sr|xr|er|xl|cr|(?:sustained|extended|controlled)[- ]release)$").unwrap()
});

/// Domain abbreviations and their expansions, matched on whole tokens.
const ACRONYMS: &[(&str, &str)] = &[
    ("mdd", "major depressive disorder"),
    ("gad", "generalized anxiety disorder"),
    ("ssri", "selective serotonin reuptake inhibitor"),
    ("ssris", "selective serotonin reuptake inhibitors"),
    ("snri", "serotonin-norepinephrine reuptake inhibitor"),
    ("snris", "serotonin-norepinephrine reuptake inhibitors"),
    ("tca", "tricyclic antidepressant"),
    ("tcas", "tricyclic antidepressants"),
    ("maoi", "monoamine oxidase inhibitor"),
    ("maois", "monoamine oxidase inhibitors"),
    ("cbt", "cognitive behavioral therapy"),
    ("ect", "electroconvulsive therapy"),
    ("rtms", "repetitive transcranial magnetic stimulation"),
    ("tms", "transcranial magnetic stimulation"),
    ("hdrs", "hamilton depression rating scale"),
    ("hamd", "hamilton depression rating scale"),
    ("ham-d", "hamilton depression rating scale"),
    ("hama", "hamilton anxiety rating scale"),
    ("ham-a", "hamilton anxiety rating scale"),
    ("madrs", "montgomery-asberg depression rating scale"),
    ("bdi", "beck depression inventory"),
    ("bai", "beck anxiety inventory"),
    ("phq-9", "patient health questionnaire-9"),
    ("gad-7", "generalized anxiety disorder 7-item scale"),
    ("rct", "randomized controlled trial"),
    ("trd", "treatment-resistant depression"),
    ("ptsd", "post-traumatic stress disorder"),
    ("ocd", "obsessive-compulsive disorder"),
];

/// Identity of an entity within a run and inside the graph store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKey {
    pub text: String,
    pub entity_type: String,
}

pub struct EntityNormalizer {
    /// Maps abbreviation -> expansion
    acronyms: HashMap<&'static str, &'static str>,
}

impl Default for EntityNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EntityNormalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityNormalizer")
            .field("acronyms", &self.acronyms.len())
            .finish()
    }
}

impl EntityNormalizer {
    pub fn new() -> Self {
        Self {
            acronyms: ACRONYMS.iter().copied().collect(),
        }
    }

    /// Normalize surface text: lowercase, collapse whitespace, drop trailing
    /// parentheticals and formulation markers, expand known abbreviations.
    pub fn normalize(&self, text: &str) -> String {
        let lowered = text.to_lowercase();
        let mut normalized = WHITESPACE.replace_all(lowered.trim(), " ").into_owned();

        // "Drug XR (extended-release)" needs both passes, in either order
        loop {
            let before = normalized.len();
            let stripped = TRAILING_PARENTHETICAL.replace(&normalized, "");
            // a bare "(p < 0.05)" is the whole name, not a qualifier
            if !stripped.trim().is_empty() {
                normalized = stripped.into_owned();
            }
            normalized = FORMULATION_SUFFIX.replace(&normalized, "").into_owned();
            if normalized.len() == before {
                break;
            }
        }

        normalized
            .split(' ')
            .filter(|token| !token.is_empty())
            .map(|token| self.expand(token))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn expand(&self, token: &str) -> String {
        let core = token.trim_end_matches([',', '.', ';', ':']);
        match self.acronyms.get(core) {
            Some(expansion) => format!("{}{}", expansion, &token[core.len()..]),
            None => token.to_string(),
        }
    }

    pub fn normalize_type(&self, entity_type: &str) -> String {
        let normalized = WHITESPACE
            .replace_all(entity_type.trim(), "_")
            .to_lowercase();
        if normalized.is_empty() {
            DEFAULT_ENTITY_TYPE.to_string()
        } else {
            normalized
        }
    }

    pub fn key(&self, text: &str, entity_type: &str) -> EntityKey {
        EntityKey {
            text: self.normalize(text),
            entity_type: self.normalize_type(entity_type),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalization() {
        let normalizer = EntityNormalizer::new();

        assert_eq!(normalizer.normalize("Sertraline"), "sertraline");
        assert_eq!(normalizer.normalize("  Major   Depressive\tDisorder "), "major depressive disorder");
        assert_eq!(normalizer.normalize("SSRIs"), normalizer.normalize("ssris "));
    }

    #[test]
    fn strips_trailing_parentheticals() {
        let normalizer = EntityNormalizer::new();

        assert_eq!(
            normalizer.normalize("Hamilton Depression Rating Scale (HDRS)"),
            normalizer.normalize("Hamilton Depression Rating Scale")
        );
        assert_eq!(normalizer.normalize("Venlafaxine (Effexor) (SNRI)"), "venlafaxine");
        assert_eq!(normalizer.normalize("(HDRS) total score"), "(hdrs) total score");
        assert_eq!(normalizer.normalize("(n = 120)"), "(n = 120)");
        assert_eq!(normalizer.normalize("(n = 120) (ITT)"), "(n = 120)");
    }

    #[test]
    fn strips_formulation_suffixes() {
        let normalizer = EntityNormalizer::new();

        assert_eq!(normalizer.normalize("Bupropion SR"), "bupropion");
        assert_eq!(normalizer.normalize("venlafaxine extended-release"), "venlafaxine");
        assert_eq!(normalizer.normalize("Quetiapine XR (extended release)"), "quetiapine");
        assert_eq!(normalizer.normalize("paroxetine sustained release"), "paroxetine");
    }

    #[test]
    fn expands_known_abbreviations() {
        let normalizer = EntityNormalizer::new();

        assert_eq!(normalizer.normalize("MDD"), "major depressive disorder");
        assert_eq!(normalizer.normalize("HDRS"), "hamilton depression rating scale");
        assert_eq!(normalizer.normalize("CBT for GAD."), "cognitive behavioral therapy for generalized anxiety disorder.");
        assert_eq!(normalizer.normalize("GAD-7"), "generalized anxiety disorder 7-item scale");
    }

    #[test]
    fn key_combines_text_and_type() {
        let normalizer = EntityNormalizer::new();

        let a = normalizer.key("SSRIs", "Medication");
        let b = normalizer.key("selective serotonin reuptake inhibitors", " medication ");
        let c = normalizer.key("SSRIs", "treatment_type");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(normalizer.key("x", "").entity_type, "other");
        assert_eq!(normalizer.key("x", "Patient Group").entity_type, "patient_group");
    }
}
