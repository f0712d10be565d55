use crate::commands::StoreArgs;
use crate::config::AppConfig;
use anyhow::{Context, Result};
use clap::Args;
use index::{GraphStore, IngestPlan, Ingestor, MemoryStore, Neo4jStore};
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct IngestArgs {
    /// Extraction JSON files, or directories of them
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    #[command(flatten)]
    pub store: StoreArgs,

    /// Delete every node and relationship before ingesting
    #[arg(long)]
    pub reset: bool,

    /// Apply the upserts to an in-memory graph instead of Neo4j
    #[arg(long)]
    pub dry_run: bool,

    /// Rows per write statement
    #[arg(long)]
    pub batch_size: Option<usize>,
}

/// Build one plan from every input document. Unparsable files are skipped
/// with a warning; unreadable ones are an error.
pub async fn plan_from_files(files: &[PathBuf]) -> Result<IngestPlan> {
    let mut plan = IngestPlan::new();

    for file in files {
        let raw = tokio::fs::read_to_string(file)
            .await
            .with_context(|| format!("Failed to read {}", file.display()))?;

        match serde_json::from_str(&raw) {
            Ok(value) => plan.add_document(&file.display().to_string(), &value),
            Err(e) => tracing::warn!(file = %file.display(), error = %e, "Skipping file that is not JSON"),
        }
    }

    tracing::info!(
        files = files.len(),
        entities = plan.entity_count(),
        edges = plan.edge_count(),
        diagnostics = plan.diagnostics.len(),
        "Built ingest plan"
    );
    Ok(plan)
}

pub async fn open_store(store: &StoreArgs, config: &AppConfig, dry_run: bool) -> Result<Box<dyn GraphStore>> {
    if dry_run {
        tracing::info!("Dry run: writing to an in-memory graph");
        return Ok(Box::new(MemoryStore::new()));
    }

    let neo4j = store.resolve(&config.neo4j);
    let store = Neo4jStore::connect(&neo4j)
        .await
        .with_context(|| format!("Cannot reach Neo4j at {}", neo4j.uri))?;
    Ok(Box::new(store))
}

pub fn ingestor<'a>(store: &'a dyn GraphStore, config: &AppConfig, batch_size: Option<usize>) -> Ingestor<'a> {
    Ingestor::new(store)
        .with_batch_size(batch_size.unwrap_or(config.ingest.batch_size))
        .with_retry(config.retry.policy())
        .with_timeout(config.write_timeout())
}

pub async fn run(args: IngestArgs, config: &AppConfig) -> Result<()> {
    // Resolve inputs before touching the store so a bad path changes nothing.
    let files = ingest::collect_inputs(&args.inputs, &["json"])?;
    if files.is_empty() {
        anyhow::bail!("No .json files found in the given inputs");
    }
    let plan = plan_from_files(&files).await?;

    let store = open_store(&args.store, config, args.dry_run).await?;
    let ingestor = ingestor(store.as_ref(), config, args.batch_size);

    if args.reset {
        ingestor.reset().await?;
    }
    let summary = ingestor.ingest(&plan).await?;

    println!(
        "Upserted nodes: {}, New relationships: {}",
        summary.nodes_upserted, summary.relationships_created
    );
    if summary.diagnostics > 0 {
        println!("Skipped records: {} (see log for details)", summary.diagnostics);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dry_run_ingests_json_inputs() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(
            dir.path().join("combined.json"),
            r#"{"entities": [{"id": 1, "text": "Sertraline", "type": "medication"},
                            {"id": 2, "text": "MDD", "type": "medical_condition"}],
                "relationships": [{"head": 1, "tail": 2, "type": "treats", "evidence": "e"}]}"#,
        )
        .await
        .unwrap();
        tokio::fs::write(dir.path().join("broken.json"), "{not json").await.unwrap();

        let files = ingest::collect_inputs(&[dir.path().to_path_buf()], &["json"]).unwrap();
        let plan = plan_from_files(&files).await.unwrap();

        let config = AppConfig::default();
        let store = open_store(&StoreArgs::default(), &config, true).await.unwrap();
        let summary = ingestor(store.as_ref(), &config, None).ingest(&plan).await.unwrap();

        assert_eq!(summary.nodes_upserted, 2);
        assert_eq!(summary.relationships_created, 1);
    }

    #[test]
    fn missing_inputs_fail_before_any_write() {
        let missing = PathBuf::from("/definitely/not/here.json");
        assert!(ingest::collect_inputs(&[missing], &["json"]).is_err());
    }
}
