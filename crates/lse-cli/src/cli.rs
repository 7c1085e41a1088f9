use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Linear state estimation for PMU telemetry", long_about = None)]
pub struct Cli {
    /// Set the logging level (overrides the config file)
    #[arg(long)]
    pub log_level: Option<tracing::Level>,

    /// Estimator configuration file (TOML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Estimate the state for every frame of a recorded telemetry file
    Run {
        /// Network model (JSON)
        model: PathBuf,
        /// Telemetry frames, one JSON object of key/value samples per line
        frames: PathBuf,
        /// Write estimates as JSON lines to this file instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Replay a synthetic feeder, including a breaker trip
    Demo {
        /// Number of frames to replay
        #[arg(long, default_value_t = 10)]
        frames: usize,
        /// Frame at which the tap breaker opens (defaults to the midpoint)
        #[arg(long)]
        trip_at: Option<usize>,
        /// Write the feeder model and frames to this directory
        #[arg(long)]
        export: Option<PathBuf>,
    },
    /// Summarise a network model and its diagnostics
    Inspect {
        /// Network model (JSON)
        model: PathBuf,
    },
    /// Configuration helpers
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the effective configuration as TOML
    Show,
    /// Write the default configuration to a file
    Init {
        /// Destination path
        path: PathBuf,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
