//! recplay CLI - Main Entry Point
//!
//! Records manual browser tests and replays them from the session store.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use recplay_core::config::{Browser, DriverKind};

mod commands;
mod context;
mod output;

use commands::{record, replay, session};
use context::{Context, Overrides};

/// recplay - record and replay manual browser tests
#[derive(Parser)]
#[command(name = "recplay")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file
    #[arg(long, default_value = "recplay.toml", global = true)]
    config: PathBuf,

    /// Session store directory (overrides config and RECPLAY_STORE_DIR)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Browser driver: playwright or simulated
    #[arg(long, global = true)]
    driver: Option<DriverKind>,

    /// Browser engine: chromium, firefox or webkit
    #[arg(long, global = true)]
    browser: Option<Browser>,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a session until Ctrl-C
    Record(record::RecordArgs),

    /// Replay a recorded session
    Replay(replay::ReplayArgs),

    /// List recorded sessions
    List,

    /// Show a session and its steps
    Show(session::SessionArgs),

    /// Delete a session and its artifacts
    Delete(session::SessionArgs),

    /// List replay results of a session
    Results(session::SessionArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let ctx = match Context::load(
        &cli.config,
        Overrides {
            store: cli.store,
            driver: cli.driver,
            browser: cli.browser,
        },
    ) {
        Ok(ctx) => ctx,
        Err(e) => {
            output::print_error(&format!("{:#}", e));
            std::process::exit(2);
        }
    };

    match cli.command {
        Commands::Record(args) => record::execute(args, ctx, cli.format).await?,
        Commands::Replay(args) => replay::execute(args, ctx, cli.format).await?,
        Commands::List => session::list(ctx, cli.format).await?,
        Commands::Show(args) => session::show(args, ctx, cli.format).await?,
        Commands::Delete(args) => session::delete(args, ctx, cli.format).await?,
        Commands::Results(args) => replay::results(args, ctx, cli.format).await?,
    }

    Ok(())
}
