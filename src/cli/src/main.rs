//! Gatekeeper CLI - inspect and administer role-based authorization policies.
//!
//! Every invocation opens the configured policy store, applies startup seeds
//! and loads an enforcer, then runs one command against it. With the memory
//! backend nothing outlives the process, which makes `--seed` plus `check`
//! a convenient dry run for a policy file.

mod commands;
mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use commands::{check, inherit, policy, role, seed, status};
use gatekeeper_core::config::Config;
use gatekeeper_core::telemetry::{init_telemetry, TelemetryConfig};
use gatekeeper_core::Gatekeeper;
use output::OutputFormat;

/// Gatekeeper - role-based authorization with role inheritance
#[derive(Parser)]
#[command(
    name = "gatekeeper",
    version,
    about = "Gatekeeper - role-based authorization with role inheritance",
    long_about = "CLI tool for checking permissions and managing policy rules, role assignments and role inheritance.",
    propagate_version = true
)]
pub struct Cli {
    /// Output format
    #[arg(short, long, global = true, default_value = "table")]
    output: OutputFormat,

    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long, global = true, env = "GATEKEEPER_CONFIG")]
    config: Option<String>,

    /// Seed file applied after startup, in `p`/`g`/`g2` line format
    #[arg(long, global = true)]
    seed: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decide whether a user may act on a resource
    Check(check::CheckArgs),

    /// Show everything a user is allowed to do
    Permissions(check::PermissionsArgs),

    /// Policy rule management
    #[command(subcommand)]
    Policy(policy::PolicyCommands),

    /// User role assignment management
    #[command(subcommand)]
    Role(role::RoleCommands),

    /// Role inheritance management
    #[command(subcommand)]
    Inherit(inherit::InheritCommands),

    /// Apply a seed file to the store
    Seed(seed::SeedArgs),

    /// Show the enforcer's loaded snapshot
    Status(status::StatusArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is not an error.
    let _ = dotenvy::dotenv();

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
    let mut config =
        Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(path) = cli.seed {
        config.enforcer.seed_path = Some(path);
    }

    let telemetry = init_telemetry(&TelemetryConfig::from(&config))?;

    let gatekeeper = Gatekeeper::from_config(&config)
        .await
        .context("Failed to start the enforcer")?;
    let format = cli.output;

    match cli.command {
        Commands::Check(args) => check::execute(args, &gatekeeper, format),
        Commands::Permissions(args) => check::permissions(args, &gatekeeper, format),
        Commands::Policy(cmd) => policy::execute(cmd, &gatekeeper, format).await,
        Commands::Role(cmd) => role::execute(cmd, &gatekeeper, format).await,
        Commands::Inherit(cmd) => inherit::execute(cmd, &gatekeeper, format).await,
        Commands::Seed(args) => seed::execute(args, &gatekeeper, format).await,
        Commands::Status(args) => status::execute(args, &gatekeeper, &telemetry, format),
    }
}
