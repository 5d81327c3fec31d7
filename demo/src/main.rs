//! arbor — Demo CLI
//!
//! Inspects a data directory (universe.xml, catalogues.xml, agents.db) with
//! the same domain layer a server transport would use.
//!
//! Usage:
//!   cargo run -p demo -- --data-dir ./data tree
//!   cargo run -p demo -- --data-dir ./data resolve alice
//!   cargo run -p demo -- --data-dir ./data authorize alice s3cret --app gAP
//!   cargo run -p demo -- --config arbor.toml agents

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use arbor_core::{DataKeeper, ServerConfig};

// ── CLI definition ────────────────────────────────────────────────────────────

/// arbor — organization-structure and authorization store.
#[derive(Parser)]
#[command(
    name = "demo",
    about = "arbor authorization server demo",
    long_about = "Loads an arbor data directory and runs read queries and an\n\
                  authorization check against it, printing the results as JSON."
)]
struct Cli {
    /// TOML configuration file (alternative to --data-dir).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding universe.xml, catalogues.xml and agents.db.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the branch tree with each branch's effective funcsets.
    Tree,
    /// Resolve a user: branches, positions, funcsets and allowed functions.
    Resolve { user: String },
    /// Check a user's secret, optionally with an application profile.
    Authorize {
        user: String,
        secret: String,
        #[arg(long)]
        app: Option<String>,
    },
    /// List registered agents with their owning branches.
    Agents,
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> ExitCode {
    // Structured logging; set RUST_LOG=debug for resolver traces.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(message) => {
            eprintln!("demo error: {message}");
            return ExitCode::FAILURE;
        }
    };

    info!(data_dir = %config.data_dir.display(), "opening data directory");

    let mut keeper = match DataKeeper::open(&config) {
        Ok(keeper) => keeper,
        Err(e) => {
            eprintln!("demo error: cannot open data directory: {e}");
            return ExitCode::FAILURE;
        }
    };

    match run(&mut keeper, cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // Print the structured failure the way a transport would send it.
            println!("{}", e.to_api());
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> Result<ServerConfig, String> {
    match (&cli.config, &cli.data_dir) {
        (Some(path), _) => ServerConfig::from_file(path).map_err(|e| e.to_string()),
        (None, Some(dir)) => Ok(ServerConfig::new(dir.clone())),
        (None, None) => Err("pass --data-dir or --config".to_string()),
    }
}

// ── Commands ──────────────────────────────────────────────────────────────────

fn run(keeper: &mut DataKeeper, command: Command) -> arbor_contracts::OpResult<()> {
    match command {
        Command::Tree => {
            for branch in keeper.list_branches() {
                let funcsets = keeper.branch_effective_funcsets(&branch);
                let roles = keeper.enabled_roles(&branch);
                println!(
                    "{branch}: funcsets={} roles={}",
                    funcsets.join(","),
                    roles.join(",")
                );
            }
            Ok(())
        }
        Command::Resolve { user } => {
            let report = serde_json::json!({
                "user": user,
                "branches": keeper.user_branches(&user),
                "positions": keeper.user_positions(&user),
                "funcsets": keeper.user_funcsets_list(&user)?,
                "functions": keeper.user_functions_review(&user, "*ALL*")?,
            });
            println!("{report:#}");
            Ok(())
        }
        Command::Authorize { user, secret, app } => {
            let details = keeper.authorize(&user, &secret, app.as_deref())?;
            println!("{:#}", serde_json::to_value(&details).unwrap_or_default());
            Ok(())
        }
        Command::Agents => {
            for (agent, branch) in keeper.list_agents_located(None, true)? {
                println!("{agent} @ {branch}");
            }
            Ok(())
        }
    }
}
