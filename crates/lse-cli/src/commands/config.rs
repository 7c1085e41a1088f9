use anyhow::{bail, Result};
use lse_cli::cli::ConfigCommands;
use lse_core::LseConfig;

pub fn handle(config: &LseConfig, command: &ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Show => {
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
        ConfigCommands::Init { path, force } => {
            if path.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", path.display());
            }
            LseConfig::default().save_to(path)?;
            println!("Wrote default configuration to {}", path.display());
            Ok(())
        }
    }
}
