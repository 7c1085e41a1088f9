pub mod config;
pub mod demo;
pub mod inspect;
pub mod run;

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use lse_core::NetworkBuilder;

/// Read a JSON network model.
pub fn load_model(path: &Path) -> Result<NetworkBuilder> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("reading model {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parsing model {}", path.display()))
}
