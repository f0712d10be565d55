use crate::commands::{read_json, StoreArgs};
use crate::config::AppConfig;
use anyhow::Result;
use clap::Args;
use extract::CanonicalGraph;
use index::{GraphSnapshot, GraphStore, Neo4jStore};
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct SnapshotArgs {
    #[arg(short, long, default_value = "graph.json")]
    pub output: PathBuf,

    /// Build from a combined extraction file instead of the live graph
    #[arg(long)]
    pub from: Option<PathBuf>,

    #[command(flatten)]
    pub store: StoreArgs,
}

pub async fn run(args: SnapshotArgs, config: &AppConfig) -> Result<()> {
    let snapshot = match &args.from {
        Some(path) => {
            let graph: CanonicalGraph = read_json(path).await?;
            GraphSnapshot::from_canonical(&graph)
        }
        None => {
            let store = Neo4jStore::connect(&args.store.resolve(&config.neo4j)).await?;
            store.fetch_snapshot().await?
        }
    };

    snapshot.save(&args.output).await?;
    println!(
        "Snapshot: {} nodes, {} edges -> {}",
        snapshot.nodes.len(),
        snapshot.edges.len(),
        args.output.display()
    );
    Ok(())
}
