use crate::commands::{read_json, write_json};
use crate::config::AppConfig;
use anyhow::{Context, Result};
use clap::Args;
use extract::{CanonicalContext, CanonicalGraph, DiagnosticKind, Extractor};
use ingest::{ChunkerConfig, WordChunker};
use std::path::PathBuf;

const TEXT_EXTENSIONS: &[&str] = &["txt", "md"];

#[derive(Args, Debug)]
pub struct ExtractArgs {
    /// Text files, or directories of .txt/.md files
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Where to write the combined entities and relationships
    #[arg(short, long, default_value = "combined.json")]
    pub output: PathBuf,

    /// Words per chunk
    #[arg(long)]
    pub max_words: Option<usize>,

    /// Oracle calls allowed in flight
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Continue numbering from an earlier combined file
    #[arg(long)]
    pub resume: Option<PathBuf>,
}

pub async fn run(args: ExtractArgs, config: &AppConfig) -> Result<()> {
    let files = ingest::collect_inputs(&args.inputs, TEXT_EXTENSIONS)?;
    if files.is_empty() {
        anyhow::bail!("No .txt or .md files found in the given inputs");
    }

    let chunker = WordChunker::new(ChunkerConfig {
        max_words: args.max_words.unwrap_or(config.chunking.max_words),
    })?;

    let mut chunks = Vec::new();
    for file in &files {
        chunks.extend(ingest::ingest_file(file, &chunker).await?);
    }
    tracing::info!(files = files.len(), chunks = chunks.len(), "Chunked input documents");

    let mut context = match &args.resume {
        Some(path) => {
            let earlier: CanonicalGraph = read_json(path).await?;
            CanonicalContext::resume(earlier)
                .with_context(|| format!("Cannot resume from {}", path.display()))?
        }
        None => CanonicalContext::new(),
    };

    let extractor = Extractor::new(config.oracle()?, config.retry.policy()).with_concurrency(
        args.concurrency
            .unwrap_or(config.concurrency.max_concurrent_llm_calls),
    );
    let summary = extractor.run(&chunks, &mut context).await;
    let graph = context.finish();

    write_json(&args.output, &graph).await?;

    println!("Chunks processed: {}", summary.chunks);
    println!(
        "Entities: {}, Relationships: {}",
        graph.entities.len(),
        graph.relationships.len()
    );
    println!(
        "Parse failures: {}, Oracle failures: {}, Dropped relationships: {}",
        summary.parse_failures,
        summary.oracle_failures,
        summary.count(DiagnosticKind::UnresolvedReference)
    );
    println!("Wrote {}", args.output.display());

    if summary.chunks > 0 && summary.failure_rate() >= 1.0 {
        tracing::warn!("No chunk produced usable output");
    }

    Ok(())
}
