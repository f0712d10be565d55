pub mod canonicalizer;
pub mod interactions;
pub mod llm;
pub mod normalizer;
pub mod prompt;
pub mod report;
pub mod response;
pub mod retry;
pub mod schema;

pub use canonicalizer::{CanonicalContext, LocalIdMap};
pub use interactions::{
    interaction_candidates, validate_interactions, Interaction, InteractionAnnotator,
    InteractionPass, InteractionSet, InteractionType,
};
pub use llm::{ExtractionOracle, OllamaClient, OpenAiClient};
pub use normalizer::{EntityKey, EntityNormalizer};
pub use report::{ChunkReport, Diagnostic, DiagnosticKind, RunSummary};
pub use response::{parse_response, strip_code_fences, ChunkOutcome};
pub use retry::RetryPolicy;
pub use schema::{
    CanonicalEntity, CanonicalGraph, CanonicalId, CanonicalRelationship, EntityType,
    ExtractionPayload, LocalId, RawEntity, RawInteraction, RawRelationship,
};

use futures::stream::{self, StreamExt};
use ingest::Chunk;

pub struct Extractor<O> {
    oracle: O,
    retry: RetryPolicy,
    concurrency: usize,
}

impl<O: ExtractionOracle> Extractor<O> {
    pub fn new(oracle: O, retry: RetryPolicy) -> Self {
        Self {
            oracle,
            retry,
            concurrency: 1,
        }
    }

    /// Number of oracle calls allowed in flight at once.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Call the oracle for one chunk. Never fails: unreachable oracles and
    /// unusable answers are reported through the outcome.
    pub async fn extract_chunk(&self, chunk: &Chunk) -> ChunkOutcome {
        let input = prompt::build_chunk_input(&chunk.text, chunk.index + 1, &chunk.source);

        let reply = self
            .retry
            .retry("chunk extraction", || {
                self.oracle.complete(prompt::EXTRACTION_INSTRUCTIONS, &input)
            })
            .await;

        match reply {
            Ok(raw) => parse_response(&raw),
            Err(e) => ChunkOutcome::OracleError(format!("{e:#}")),
        }
    }

    /// Extract every chunk and fold the results into `context`.
    ///
    /// Oracle calls may overlap up to the configured concurrency, but results
    /// are absorbed strictly in chunk order, so canonical ids do not depend on
    /// response timing.
    pub async fn run(&self, chunks: &[Chunk], context: &mut CanonicalContext) -> RunSummary {
        let mut summary = RunSummary::default();

        let mut outcomes = stream::iter(chunks.iter().enumerate())
            .map(|(position, chunk)| async move { (position, self.extract_chunk(chunk).await) })
            .buffered(self.concurrency);

        while let Some((position, outcome)) = outcomes.next().await {
            let report = context.absorb(position, outcome);
            tracing::info!(
                chunk = position + 1,
                total = chunks.len(),
                new_entities = report.new_entities,
                relationships = report.relationships_kept,
                "Processed chunk"
            );
            summary.record(report);
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replies with canned responses in call order.
    struct ScriptedOracle {
        replies: Vec<Option<&'static str>>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ExtractionOracle for ScriptedOracle {
        async fn complete(&self, _instructions: &str, _input: &str) -> Result<String> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            match self.replies.get(call).copied().flatten() {
                Some(reply) => Ok(reply.to_string()),
                None => anyhow::bail!("connection reset"),
            }
        }
    }

    fn chunk(index: usize, text: &str) -> Chunk {
        Chunk::new("doc".into(), index, text.into(), "paper.txt".into(), (0, 0))
    }

    #[tokio::test]
    async fn run_continues_past_bad_chunks() {
        let oracle = ScriptedOracle {
            replies: vec![
                Some(r#"{"entities": [{"id": 1, "text": "Sertraline", "type": "medication"}, {"id": 2, "text": "MDD", "type": "medical_condition"}], "relationships": [{"head": 1, "tail": 2, "type": "treats", "evidence": "Sertraline treats MDD"}]}"#),
                Some("Sorry, I can't produce JSON for this."),
                None,
                Some("```json\n{\"entities\": [{\"id\": 1, \"text\": \"major depressive disorder\", \"type\": \"medical_condition\"}, {\"id\": 2, \"text\": \"remission\", \"type\": \"outcome\"}], \"relationships\": [{\"head\": 1, \"tail\": 2, \"type\": \"has_outcome\", \"evidence\": \"\"}]}\n```"),
            ],
            calls: AtomicUsize::new(0),
        };
        let extractor = Extractor::new(oracle, RetryPolicy::none());
        let chunks: Vec<Chunk> = (0..4).map(|i| chunk(i, "text")).collect();

        let mut context = CanonicalContext::new();
        let summary = extractor.run(&chunks, &mut context).await;
        let graph = context.finish();

        assert_eq!(summary.chunks, 4);
        assert_eq!(summary.parse_failures, 1);
        assert_eq!(summary.oracle_failures, 1);
        assert_eq!(graph.entities.len(), 3);
        assert_eq!(graph.relationships.len(), 2);
        assert_eq!(graph.relationships[1].head, 2);
        assert_eq!(graph.raw_responses, vec!["Sorry, I can't produce JSON for this.".to_string()]);
    }

    #[tokio::test]
    async fn oracle_errors_are_retried() {
        let oracle = ScriptedOracle {
            replies: vec![None, Some(r#"{"entities": [], "relationships": []}"#)],
            calls: AtomicUsize::new(0),
        };
        let extractor = Extractor::new(oracle, RetryPolicy::new(1, 0, 0));

        let outcome = extractor.extract_chunk(&chunk(0, "text")).await;
        assert!(matches!(outcome, ChunkOutcome::Parsed(_)));
    }
}
