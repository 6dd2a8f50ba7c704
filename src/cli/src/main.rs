//! Tasktree CLI - offline access-control queries over a directory snapshot.
//!
//! Provides hierarchy inspection, access decision, and audit attribution commands.

mod commands;
mod output;
mod snapshot;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tasktree_core::config::Config;
use tasktree_core::rbac::OrganizationTree;
use tasktree_core::telemetry::{init_logging, LogFormat, LoggingConfig};

use commands::{access, org};
use output::OutputFormat;

/// Tasktree - multi-tenant access control CLI
#[derive(Parser)]
#[command(
    name = "tasktree",
    version,
    about = "Tasktree - organization hierarchy and access control",
    long_about = "Inspect an organization directory snapshot and evaluate access decisions \
                  offline.",
    propagate_version = true
)]
pub struct Cli {
    /// Output format
    #[arg(short, long, global = true, default_value = "table")]
    output: OutputFormat,

    /// Directory snapshot (YAML, JSON, or TOML)
    #[arg(short, long, global = true, env = "TASKTREE_SNAPSHOT", default_value = "tasktree.yaml")]
    snapshot: PathBuf,

    /// Configuration file; environment variables are used when omitted
    #[arg(short, long, global = true, env = "TASKTREE_CONFIG")]
    config: Option<String>,

    /// Log decisions and traversal details to the console
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the organization forest
    Tree,

    /// List an organization and everything nested below it
    Accessible(org::AccessibleArgs),

    /// Check whether a reparent would create a cycle
    Cycle(org::CycleArgs),

    /// Evaluate an access request
    Check(access::CheckArgs),

    /// Show how an actor's actions are attributed in the audit trail
    Attribute(access::AttributeArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    if let Err(e) = run(cli).await {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }

    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let _ = dotenvy::dotenv();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load()?,
    };

    if cli.verbose {
        init_logging(&LoggingConfig {
            level: "debug".to_string(),
            format: LogFormat::Compact,
            ..config.logging.clone()
        })?;
    }

    let directory = Arc::new(snapshot::load(&cli.snapshot)?);
    let tree = OrganizationTree::new(directory.as_ref())
        .with_max_depth(config.access.max_traversal_depth);
    let format = cli.output;

    match cli.command {
        Commands::Tree => org::tree(&directory, format),
        Commands::Accessible(args) => org::accessible(&tree, args, format),
        Commands::Cycle(args) => org::cycle(&tree, args, format),
        Commands::Check(args) => access::check(&directory, &config, args, format),
        Commands::Attribute(args) => {
            access::attribute(directory.clone(), &config, args, format).await
        }
    }
}
