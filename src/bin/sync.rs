//! Schema Synchronizer CLI
//!
//! Keeps entity schemas, exported validators and the cluster initialization
//! script in step.
//!
//! Usage:
//!   santa-sync --check
//!   santa-sync --generate --output init-cluster.js
//!   santa-sync --validate --format json
//!   santa-sync --export --validators ./validators

use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use clap::{ArgGroup, Parser};
use santa_schemas::config::{OutputFormat, SantaConfig};
use santa_schemas::registry::{SchemaRegistry, ValidatorCatalog};
use santa_schemas::sync::{Command, SchemaSynchronizer, Side};
use santa_schemas::CollectionPlanner;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "santa-sync")]
#[command(about = "Synchronize entity schemas with native validators and the cluster layout")]
#[command(group(ArgGroup::new("command").args(["check", "generate", "validate", "export"])))]
struct Cli {
    /// Report entities missing on either side and validators that drifted
    #[arg(long)]
    check: bool,

    /// Derive collection configs and render the cluster initialization script
    #[arg(long)]
    generate: bool,

    /// Lint every entity and its collection config
    #[arg(long)]
    validate: bool,

    /// Write compiled validators to the validators directory
    #[arg(long)]
    export: bool,

    /// Where `--generate` writes the script (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Config file layered over the default locations
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Entity schema directory (default: built-in schemas)
    #[arg(long)]
    schemas: Option<PathBuf>,

    /// Native validator directory
    #[arg(long)]
    validators: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum)]
    format: Option<OutputFormat>,
}

impl Cli {
    fn command(&self) -> Option<Command> {
        if self.check {
            Some(Command::Check)
        } else if self.generate {
            Some(Command::Generate)
        } else if self.validate {
            Some(Command::Validate)
        } else if self.export {
            Some(Command::Export)
        } else {
            None
        }
    }
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
    let extension = config.paths.extension.as_str();

    let registry = match cli.schemas.clone().or_else(|| config.schemas_dir()) {
        Some(dir) => SchemaRegistry::load_dir(&dir, extension)
            .with_context(|| format!("loading schemas from {}", dir.display()))?,
        None => SchemaRegistry::builtin(),
    };
    let validators_dir = cli.validators.clone().unwrap_or_else(|| config.validators_dir());

    let Some(command) = cli.command() else {
        print_usage(&registry);
        return Ok(());
    };

    let catalog = ValidatorCatalog::load_dir(&validators_dir, extension)
        .with_context(|| format!("loading validators from {}", validators_dir.display()))?;
    let sync = SchemaSynchronizer::new(registry, catalog, config.cluster.database.clone())
        .with_planner(CollectionPlanner::new().with_order(config.cluster.order.clone()));

    match command {
        Command::Check => {
            let report = sync.check();
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
                OutputFormat::Text => {
                    println!("🔍 Schema Drift Check\n");
                    println!("   {} schemas, {} validators\n", sync.registry().len(), sync.catalog().len());
                    for finding in &report.findings {
                        let marker = match finding.missing_from {
                            Side::Validator => "➕",
                            Side::Schema => "➖",
                        };
                        println!("{} {}", marker, finding.message);
                    }
                    for change in &report.changed {
                        println!("📝 {}", change.entity);
                        for detail in &change.changes {
                            println!("   - {}", detail);
                        }
                    }
                    if report.in_sync() {
                        println!("\n✅ No drift detected ({} in sync)", report.unchanged);
                    } else {
                        println!(
                            "\n⚠️  {} missing, {} changed, {} in sync",
                            report.findings.len(),
                            report.changed.len(),
                            report.unchanged
                        );
                    }
                }
            }
        }
        Command::Generate => {
            let generated = sync.generate();
            match &cli.output {
                Some(path) => {
                    fs::write(path, &generated.script)
                        .with_context(|| format!("writing {}", path.display()))?;
                    match format {
                        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&generated.configs)?),
                        OutputFormat::Text => {
                            for config in &generated.configs {
                                println!(
                                    "📦 {:<16} shard {:<28} {} index(es), {} unique",
                                    config.name,
                                    config.shard.key(),
                                    config.indexes.len(),
                                    config.unique_indexes.len()
                                );
                            }
                            println!("\n✅ Wrote initialization script to {}", path.display());
                        }
                    }
                }
                None => match format {
                    OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&generated.configs)?),
                    OutputFormat::Text => print!("{}", generated.script),
                },
            }
        }
        Command::Validate => {
            let results = sync.validate();
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&results)?),
                OutputFormat::Text => {
                    println!("🔍 Validating {} entities\n", results.len());
                    for result in &results {
                        let marker = if result.valid { "✅" } else { "❌" };
                        println!("{} {} ({})", marker, result.entity, result.collection);
                        for error in &result.lint.errors {
                            println!("   ❌ [{}] {}: {}", error.code, error.path, error.message);
                        }
                        for warning in &result.lint.warnings {
                            println!("   ⚠️  [{}] {}: {}", warning.code, warning.path, warning.message);
                        }
                    }
                    let invalid = results.iter().filter(|r| !r.valid).count();
                    println!("\n{} valid, {} invalid", results.len() - invalid, invalid);
                }
            }
        }
        Command::Export => {
            let written = sync
                .export(&validators_dir)
                .with_context(|| format!("exporting validators to {}", validators_dir.display()))?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&written)?),
                OutputFormat::Text => {
                    for path in &written {
                        println!("📝 {}", path.display());
                    }
                    println!("\n✅ Exported {} validators", written.len());
                }
            }
        }
    }

    Ok(())
}

fn print_usage(registry: &SchemaRegistry) {
    println!("santa-sync: keep entity schemas and native validators in step\n");
    println!("Usage:");
    println!("  santa-sync --check       report schema/validator drift");
    println!("  santa-sync --generate    render the cluster initialization script");
    println!("  santa-sync --validate    lint entities and collection configs");
    println!("  santa-sync --export      write compiled validators\n");
    println!("📂 Discovered {} schema sources", registry.discovered());
    for issue in registry.issues() {
        println!("   ⚠️  {}: {}", issue.file, issue.reason);
    }
}
