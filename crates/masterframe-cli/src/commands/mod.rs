pub mod config;
pub mod info;
pub mod plan;
pub mod purge;
pub mod select_dark;
pub mod synth;

use std::path::Path;

use anyhow::{Context, Result};
use masterframe_core::config::SynthesisConfig;

/// Read a TOML config file, or fall back to the defaults.
pub fn load_config(path: Option<&Path>) -> Result<SynthesisConfig> {
    let Some(path) = path else {
        return Ok(SynthesisConfig::default());
    };
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    toml::from_str(&contents).context("Invalid synthesis config")
}
