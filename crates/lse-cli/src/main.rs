use std::str::FromStr;

use anyhow::{Context, Result};
use clap::Parser;
use lse_cli::cli::{Cli, Commands};
use lse_core::LseConfig;
use tracing_subscriber::FmtSubscriber;

mod commands;

fn load_config(cli: &Cli) -> Result<LseConfig> {
    match &cli.config {
        Some(path) => LseConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => Ok(LseConfig::default()),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let level = match cli.log_level {
        Some(level) => level,
        None => tracing::Level::from_str(&config.logging.level)
            .with_context(|| format!("invalid log level '{}'", config.logging.level))?,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match &cli.command {
        Commands::Run { model, frames, out } => {
            commands::run::handle(&config, model, frames, out.as_deref())
        }
        Commands::Demo {
            frames,
            trip_at,
            export,
        } => commands::demo::handle(&config, *frames, *trip_at, export.as_deref()),
        Commands::Inspect { model } => commands::inspect::handle(model),
        Commands::Config { command } => commands::config::handle(&config, command),
    }
}
