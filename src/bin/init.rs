//! Cluster Initializer CLI
//!
//! Provisions every collection of the Secret Santa database: validator,
//! shard key, pre-split chunks and indexes.
//!
//! Usage:
//!   santa-init --dry-run
//!   santa-init --emit init-cluster.js --database secret_santa
//!   santa-init --dry-run --strict --format json

use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use clap::{ArgGroup, Parser};
use santa_schemas::config::{OutputFormat, SantaConfig};
use santa_schemas::registry::SchemaRegistry;
use santa_schemas::{ClusterInitializer, CollectionPlanner, MemoryCluster, ScriptCluster, Summary};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "santa-init")]
#[command(about = "Provision the sharded collections of the Secret Santa database")]
#[command(group(ArgGroup::new("backend").args(["dry_run", "emit"])))]
struct Cli {
    /// Provision an in-memory cluster and report what would happen
    #[arg(long)]
    dry_run: bool,

    /// Write a mongosh script to FILE instead
    #[arg(long, value_name = "FILE")]
    emit: Option<PathBuf>,

    /// Skip collections whose lint has errors
    #[arg(long)]
    strict: bool,

    /// Database name
    #[arg(short, long)]
    database: Option<String>,

    /// Config file layered over the default locations
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum)]
    format: Option<OutputFormat>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("❌ Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = SantaConfig::load_from(cli.config.as_deref()).context("loading configuration")?;
    let format = cli.format.unwrap_or(config.output.format);
    let database = cli.database.clone().unwrap_or_else(|| config.cluster.database.clone());

    let registry = match config.schemas_dir() {
        Some(dir) => SchemaRegistry::load_dir(&dir, &config.paths.extension)
            .with_context(|| format!("loading schemas from {}", dir.display()))?,
        None => SchemaRegistry::builtin(),
    };
    let planner = CollectionPlanner::new().with_order(config.cluster.order.clone());
    let initializer = ClusterInitializer::new(database.clone()).strict(cli.strict || config.provision.strict);

    let summary = match &cli.emit {
        Some(path) => {
            let mut script = ScriptCluster::new(database);
            let summary = initializer.initialize_registry(&mut script, &registry, &planner);
            fs::write(path, script.finish()).with_context(|| format!("writing {}", path.display()))?;
            eprintln!("📝 Wrote initialization script to {}", path.display());
            summary
        }
        None => {
            if !cli.dry_run {
                tracing::info!("no live driver is bundled; running against the in-memory cluster");
            }
            let mut cluster = MemoryCluster::new();
            initializer.initialize_registry(&mut cluster, &registry, &planner)
        }
    };

    report(&summary, format)
}

fn report(summary: &Summary, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(summary)?),
        OutputFormat::Text => println!("{}", summary),
    }
    Ok(())
}
