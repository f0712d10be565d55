/// Merge incoming text into what an edge already stores: an append-only log
/// that skips text already present.
pub fn merge_evidence(stored: &str, incoming: &str) -> String {
    if incoming.is_empty() || stored.contains(incoming) {
        stored.to_string()
    } else if stored.is_empty() {
        incoming.to_string()
    } else {
        format!("{stored}\n{incoming}")
    }
}

/// The same policy as a Cypher expression over `r.<field>` and `row.<field>`.
pub(crate) fn merge_expression(field: &str) -> String {
    format!(
        "CASE \
            WHEN row.{field} = '' THEN r.{field} \
            WHEN r.{field} IS NULL OR r.{field} = '' THEN row.{field} \
            WHEN r.{field} CONTAINS row.{field} THEN r.{field} \
            ELSE r.{field} + '\\n' + row.{field} \
        END"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_new_evidence_on_its_own_line() {
        assert_eq!(merge_evidence("X", "Y"), "X\nY");
    }

    #[test]
    fn repeated_evidence_is_kept_once() {
        assert_eq!(merge_evidence("X", "X"), "X");
        assert_eq!(merge_evidence("sertraline improved remission", "improved"), "sertraline improved remission");
    }

    #[test]
    fn empty_sides() {
        assert_eq!(merge_evidence("X", ""), "X");
        assert_eq!(merge_evidence("", "Y"), "Y");
        assert_eq!(merge_evidence("", ""), "");
    }

    #[test]
    fn cypher_expression_mentions_every_branch() {
        let expr = merge_expression("evidence");
        assert!(expr.starts_with("CASE"));
        assert!(expr.contains("r.evidence CONTAINS row.evidence"));
        assert!(expr.contains("r.evidence + '\\n' + row.evidence"));
    }
}
