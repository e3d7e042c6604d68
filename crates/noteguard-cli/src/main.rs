//! `noteguard` command-line tool.
//!
//! Validates catalogs and replays recorded outcomes and note events through
//! the resilience engines, printing the results as JSON or YAML.

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "noteguard")]
#[command(about = "Inspect fallback strategies and trigger rules for the Noteguard resilience layer")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Runtime configuration file (YAML or JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, global = true, default_value_t = OutputFormat::Json)]
    format: OutputFormat,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a catalog file against the schema and shape rules
    Validate {
        /// Catalog file (YAML or JSON)
        catalog: PathBuf,
    },

    /// Replay a sequence of call outcomes through the fallback engine
    Simulate {
        /// Catalog file; the built-in catalog is used when omitted
        #[arg(short, long)]
        catalog: Option<PathBuf>,

        /// Outcome sequence (YAML or JSON list)
        #[arg(short, long)]
        outcomes: PathBuf,
    },

    /// Evaluate trigger rules against a note event
    Trigger {
        /// Catalog file; the built-in catalog is used when omitted
        #[arg(short, long)]
        catalog: Option<PathBuf>,

        /// Trigger context (YAML or JSON)
        #[arg(long)]
        context: PathBuf,
    },

    /// Rank alternatives to a service after replaying outcomes
    Recommend {
        /// Catalog file; the built-in catalog is used when omitted
        #[arg(short, long)]
        catalog: Option<PathBuf>,

        /// Outcome sequence (YAML or JSON list)
        #[arg(short, long)]
        outcomes: PathBuf,

        /// Service to replace, as provider:model
        #[arg(short, long)]
        service: String,

        /// Provider to leave out (repeatable)
        #[arg(short, long)]
        exclude: Vec<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Yaml,
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Validate { catalog } => commands::validate(&catalog, cli.format),
        Commands::Simulate { catalog, outcomes } => {
            commands::simulate(config, catalog.as_deref(), &outcomes, cli.format).await
        }
        Commands::Trigger { catalog, context } => {
            commands::trigger(config, catalog.as_deref(), &context, cli.format).await
        }
        Commands::Recommend {
            catalog,
            outcomes,
            service,
            exclude,
        } => commands::recommend(
            config,
            catalog.as_deref(),
            &outcomes,
            &service,
            &exclude,
            cli.format,
        ),
    }
}
