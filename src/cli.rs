// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines all subcommands and their arguments.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "keel")]
#[command(about = "Build and deploy lifecycle controllers for multi-service systems")]
#[command(version)]
pub struct Cli {
    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file to use instead of discovering keel.yml
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new keel.yml configuration file
    Init {
        /// Overwrite an existing configuration file
        #[arg(long)]
        force: bool,
    },

    /// Print the content hash of a container build definition
    Hash {
        /// YAML file holding one container build definition
        definition: PathBuf,
    },

    /// Replay a scenario against in-process controllers
    Simulate {
        /// Scenario YAML file
        scenario: PathBuf,

        /// Give up if the scenario has not settled after this long
        #[arg(long, default_value = "60s", value_parser = parse_duration)]
        timeout: Duration,

        /// Emit JSON lines instead of text
        #[arg(long)]
        json: bool,

        /// Print only the final result
        #[arg(short, long, conflicts_with = "json")]
        quiet: bool,
    },
}

fn parse_duration(value: &str) -> Result<Duration, String> {
    humantime_serde::re::humantime::parse_duration(value).map_err(|e| e.to_string())
}
