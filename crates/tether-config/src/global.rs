//! Global Configuration (~/.tether/config.toml)
//!
//! User-wide library search paths and aliases. Dispatch limits are a
//! property of the project and are not accepted here.

use crate::project::LoaderConfig;
use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Global user configuration from ~/.tether/config.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct GlobalConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loader: Option<LoaderConfig>,
}

impl GlobalConfig {
    /// Load global config from file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::IoError(e)
            }
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::TomlParseError {
            file: path.to_path_buf(),
            error: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        match &self.loader {
            Some(loader) => loader.validate("loader"),
            None => Ok(()),
        }
    }

    /// Get the global config file path (~/.tether/config.toml)
    pub fn global_config_path() -> ConfigResult<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
        Ok(home.join(".tether").join("config.toml"))
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        self.loader
            .as_ref()
            .map(|l| l.search_paths.as_slice())
            .unwrap_or(&[])
    }

    pub fn alias(&self, name: &str) -> Option<&str> {
        self.loader
            .as_ref()
            .and_then(|l| l.aliases.get(name))
            .map(String::as_str)
    }
}
