use crate::commands::ingestion::{ingestor, open_store};
use crate::commands::{read_json, write_json, StoreArgs};
use crate::config::AppConfig;
use anyhow::Result;
use clap::Args;
use extract::{CanonicalGraph, InteractionAnnotator, InteractionSet};
use index::IngestPlan;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct AnnotateArgs {
    /// Combined extraction output
    #[arg(short, long, default_value = "combined.json")]
    pub input: PathBuf,

    /// Where to write the accepted interactions
    #[arg(short, long, default_value = "interactions.json")]
    pub output: PathBuf,

    /// Also upsert the interactions as graph edges
    #[arg(long)]
    pub ingest: bool,

    #[command(flatten)]
    pub store: StoreArgs,
}

pub async fn run(args: AnnotateArgs, config: &AppConfig) -> Result<()> {
    let graph: CanonicalGraph = read_json(&args.input).await?;

    let annotator = InteractionAnnotator::new(config.oracle()?, config.retry.policy());
    let pass = annotator.annotate(&graph).await?;

    let set = InteractionSet {
        interactions: pass.accepted,
    };
    write_json(&args.output, &set).await?;
    println!(
        "Interactions accepted: {}, rejected: {}",
        set.interactions.len(),
        pass.diagnostics.len()
    );
    println!("Wrote {}", args.output.display());

    if args.ingest {
        let mut plan = IngestPlan::new();
        plan.add_interactions(&graph, &set.interactions);

        let store = open_store(&args.store, config, false).await?;
        let summary = ingestor(store.as_ref(), config, None).ingest(&plan).await?;
        println!(
            "Upserted nodes: {}, New relationships: {}",
            summary.nodes_upserted, summary.relationships_created
        );
    }

    Ok(())
}
