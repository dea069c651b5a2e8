//! Config command - show the effective configuration

use anyhow::Result;
use tether_config::{Config, GlobalConfig};

/// Print the merged configuration as a tether.toml document
pub fn run(config: &Config) -> Result<()> {
    print!("{}", render(config)?);
    Ok(())
}

/// Print where the global configuration file is read from
pub fn run_global_path() -> Result<()> {
    println!("{}", GlobalConfig::global_config_path()?.display());
    Ok(())
}

fn render(config: &Config) -> Result<String> {
    let source = match config.project_root() {
        Some(root) => format!("# project: {}\n", root.display()),
        None => "# no tether.toml found; showing defaults\n".to_string(),
    };
    Ok(format!("{}{}", source, config.effective().to_toml_string()?))
}
