// ABOUTME: Entry point for the keel CLI application.
// ABOUTME: Parses arguments and dispatches to appropriate command handlers.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use keel::config::{self, Config};
use keel::error::Result;
use keel::output::{Output, OutputMode};
use std::env;
use tracing_subscriber::EnvFilter;

/// Filter directives used when `--verbose` is not given, e.g. `KEEL_LOG=keel::lifecycle=trace`.
const LOG_ENV: &str = "KEEL_LOG";

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        env::var(LOG_ENV)
            .map(EnvFilter::new)
            .unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let result = run(cli).await;

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let cwd = env::current_dir()?;
    match cli.command {
        Commands::Init { force } => {
            config::init_config(&cwd, force)?;
            println!("Created {}", config::CONFIG_FILENAME);
            Ok(())
        }
        Commands::Hash { definition } => {
            let config = Config::resolve(cli.config.as_deref(), &cwd)?;
            commands::hash(&definition, &config)
        }
        Commands::Simulate {
            scenario,
            timeout,
            json,
            quiet,
        } => {
            let config = Config::resolve(cli.config.as_deref(), &cwd)?;
            let output = Output::new(OutputMode::from_flags(json, quiet));
            commands::simulate(&scenario, config, timeout, output).await
        }
    }
}
