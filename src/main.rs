//! Kore - AI coding-assistant runtime.
//!
//! Thin binary entry point: parse args, resolve config, initialize tracing,
//! dispatch to a subcommand.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use kore::cli::{run_chat, run_serve, Cli, Commands};
use tracing_subscriber::EnvFilter;

fn main() -> std::process::ExitCode {
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("Error: failed to start Tokio runtime: {err}");
            return std::process::ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run()) {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:?}");
            std::process::ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "kore=debug,kore_core=debug,kore_config=debug" } else { "kore=info,kore_core=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn project_dir(explicit: Option<PathBuf>) -> Result<PathBuf> {
    match explicit {
        Some(path) if path.is_file() => Ok(path.parent().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."))),
        Some(path) => Ok(path),
        None => std::env::current_dir().context("resolving current directory"),
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = kore_config::load(&project_dir(cli.config.clone())?)?;
    if let Some(ui) = cli.ui {
        config.ui.mode = ui.into();
    }

    match cli.command {
        Some(Commands::Chat { msg }) => run_chat(config, msg).await,
        Some(Commands::Serve) => run_serve(config).await,
        Some(Commands::Version) => {
            println!("kore {}", env!("CARGO_PKG_VERSION"));
            println!("config directory: {}", kore_config::data_dir().display());
            Ok(())
        }
        None => {
            Cli::command().print_help()?;
            println!();
            Ok(())
        }
    }
}
