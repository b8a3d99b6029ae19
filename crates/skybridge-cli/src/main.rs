//! Skybridge CLI - deploy serverless functions
//!
//! Loads the configuration, resolves every reference once, then builds each
//! function in a container, converges it to a published version behind a
//! stage alias and wires the alias into the configured API gateways and
//! identity pools.

use clap::{Parser, Subcommand};
use skybridge_config::{load_tree, ResolvedConfig, RunSettings};
use std::path::PathBuf;
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod error;
mod output;

use error::CliError;

/// Skybridge CLI application
#[derive(Debug, Parser)]
#[command(name = "skybridge")]
#[command(about = "Skybridge - serverless function deployment", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to skybridge.{yaml,yml,json,toml})
    #[arg(short, long, env = "SKYBRIDGE_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Fetch and reconcile, but change nothing
    #[arg(short, long, global = true)]
    dry_run: bool,

    /// Deployment stage, also the alias name
    #[arg(short, long, global = true)]
    stage: Option<String>,

    /// Cloud region
    #[arg(short, long, global = true)]
    region: Option<String>,

    /// Skip gateway and identity pool wiring
    #[arg(long, global = true)]
    functions_only: bool,

    /// Only deploy these functions (comma separated)
    #[arg(long, value_delimiter = ',', global = true)]
    only: Vec<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Debug, Subcommand)]
enum Commands {
    /// Build and deploy the configured functions
    Deploy,

    /// Print the resolved configuration
    Config,
}

impl Cli {
    fn run_settings(&self) -> RunSettings {
        RunSettings {
            dry_run: self.dry_run,
            functions_only: self.functions_only,
            only: self
                .only
                .iter()
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty())
                .collect(),
            stage: self.stage.clone(),
            region: self.region.clone(),
        }
    }
}

fn init_tracing(verbose: bool, json: bool) {
    let filter = if verbose { "debug" } else { "info" };
    let registry = tracing_subscriber::registry().with(
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
    );
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().without_time())
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().without_time())
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let raw = load_tree(cli.config.as_deref())?;
    let snapshot = ResolvedConfig::build(&raw, &cli.run_settings())?;
    if snapshot.dry_run() {
        warn!("Dry run: nothing will be changed");
    }

    let result = match cli.command {
        Commands::Deploy => commands::deploy::execute(&snapshot).await,
        Commands::Config => commands::config::execute(&snapshot),
    };

    match result {
        Err(CliError::DeployFailed { .. }) => std::process::exit(1),
        other => Ok(other?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "skybridge",
            "deploy",
            "--dry-run",
            "-s",
            "prod",
            "--only",
            "hello, world",
            "--functions-only",
        ])
        .unwrap();
        let settings = cli.run_settings();
        assert!(settings.dry_run);
        assert!(settings.functions_only);
        assert_eq!(settings.stage.as_deref(), Some("prod"));
        assert_eq!(settings.only, vec!["hello", "world"]);
        assert!(matches!(cli.command, Commands::Deploy));
    }
}
