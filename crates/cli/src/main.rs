mod commands;
mod config;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{annotation, extraction, ingestion, serve, snapshot};
use config::AppConfig;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Build and browse a knowledge graph of clinical research text
#[derive(Parser)]
#[command(name = "clinical-kg")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Debug-level logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chunk text, extract entities and relationships, write combined JSON
    Extract(extraction::ExtractArgs),

    /// Upsert extraction JSON into Neo4j
    Ingest(ingestion::IngestArgs),

    /// Find contraindications among extracted medications and treatments
    Annotate(annotation::AnnotateArgs),

    /// Write the graph to a JSON snapshot file
    Snapshot(snapshot::SnapshotArgs),

    /// Serve read-only graph views over HTTP
    Serve(serve::ServeArgs),
}

fn init_tracing(verbose: bool, json: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let registry = tracing_subscriber::registry().with(filter);

    // stdout is reserved for command output
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env (if present)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let config = AppConfig::from_env();

    match cli.command {
        Commands::Extract(args) => extraction::run(args, &config).await,
        Commands::Ingest(args) => ingestion::run(args, &config).await,
        Commands::Annotate(args) => annotation::run(args, &config).await,
        Commands::Snapshot(args) => snapshot::run(args, &config).await,
        Commands::Serve(args) => serve::run(args, &config).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_ingest_flags() {
        let cli = Cli::parse_from([
            "clinical-kg",
            "ingest",
            "--reset",
            "--batch-size",
            "100",
            "--uri",
            "bolt://db:7687",
            "combined.json",
        ]);

        let Commands::Ingest(args) = cli.command else {
            panic!("expected ingest");
        };
        assert!(args.reset);
        assert!(!args.dry_run);
        assert_eq!(args.batch_size, Some(100));
        assert_eq!(args.store.uri.as_deref(), Some("bolt://db:7687"));
    }
}
