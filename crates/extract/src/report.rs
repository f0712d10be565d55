use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// The oracle answered with something that is not the expected JSON.
    ParseFailure,
    /// The oracle call itself failed after retries.
    OracleFailure,
    /// A record was missing required fields or had the wrong shape.
    MalformedRecord,
    /// A relationship pointed at an id the chunk never defined.
    UnresolvedReference,
    /// An interaction candidate failed validation.
    MalformedInteraction,
}

/// A non-fatal problem found while processing one unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn log(&self, chunk: Option<usize>) {
        tracing::warn!(kind = ?self.kind, chunk, "{}", self.message);
    }
}

/// Outcome of folding one chunk into the canonical context.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChunkReport {
    pub chunk_index: usize,
    pub parsed: bool,
    pub entities_seen: usize,
    pub new_entities: usize,
    pub relationships_kept: usize,
    pub diagnostics: Vec<Diagnostic>,
}

/// Aggregate over all chunks of a run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub chunks: usize,
    pub parse_failures: usize,
    pub oracle_failures: usize,
    pub entities_seen: usize,
    pub new_entities: usize,
    pub relationships_kept: usize,
    pub diagnostics: Vec<Diagnostic>,
}

impl RunSummary {
    pub fn record(&mut self, report: ChunkReport) {
        self.chunks += 1;
        self.entities_seen += report.entities_seen;
        self.new_entities += report.new_entities;
        self.relationships_kept += report.relationships_kept;

        for diagnostic in &report.diagnostics {
            match diagnostic.kind {
                DiagnosticKind::ParseFailure => self.parse_failures += 1,
                DiagnosticKind::OracleFailure => self.oracle_failures += 1,
                _ => {}
            }
        }
        self.diagnostics.extend(report.diagnostics);
    }

    /// Share of chunks whose response could not be used.
    pub fn failure_rate(&self) -> f64 {
        if self.chunks == 0 {
            return 0.0;
        }
        (self.parse_failures + self.oracle_failures) as f64 / self.chunks as f64
    }

    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.diagnostics.iter().filter(|d| d.kind == kind).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_aggregates_reports() {
        let mut summary = RunSummary::default();
        summary.record(ChunkReport {
            chunk_index: 0,
            parsed: true,
            entities_seen: 4,
            new_entities: 3,
            relationships_kept: 2,
            diagnostics: vec![Diagnostic::new(DiagnosticKind::UnresolvedReference, "head 9")],
        });
        summary.record(ChunkReport {
            chunk_index: 1,
            diagnostics: vec![Diagnostic::new(DiagnosticKind::ParseFailure, "bad json")],
            ..Default::default()
        });

        assert_eq!(summary.chunks, 2);
        assert_eq!(summary.new_entities, 3);
        assert_eq!(summary.parse_failures, 1);
        assert_eq!(summary.count(DiagnosticKind::UnresolvedReference), 1);
        assert!((summary.failure_rate() - 0.5).abs() < f64::EPSILON);
    }
}
