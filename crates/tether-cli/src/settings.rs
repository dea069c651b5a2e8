//! Effective configuration for a CLI run
//!
//! Loads `tether.toml` (explicit file or discovered from the current
//! directory) and turns it into the settings the runtime bridge starts with.

use anyhow::{Context, Result};
use std::path::Path;
use tether_config::{Config, ConfigLoader};
use tether_runtime::{platform_aliases, BridgeSettings, CallingConvention};

/// Load configuration from `config_file`, or by searching from the current directory
pub fn load(config_file: Option<&Path>) -> Result<Config> {
    let mut loader = ConfigLoader::new();
    match config_file {
        Some(path) => loader
            .load_from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => {
            let cwd = std::env::current_dir().context("Failed to read current directory")?;
            loader
                .load_from_directory(&cwd)
                .context("Failed to load configuration")
        }
    }
}

/// Build bridge settings; configured aliases extend the platform ones
pub fn bridge_settings(config: &Config) -> Result<BridgeSettings> {
    let mut aliases = platform_aliases();
    aliases.extend(config.aliases());

    let default_convention = CallingConvention::parse(config.default_convention())
        .context("Invalid default calling convention")?;

    Ok(BridgeSettings {
        search_paths: config.search_paths(),
        aliases,
        max_arguments: config.max_arguments(),
        default_convention,
    })
}
