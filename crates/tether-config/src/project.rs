//! Project Configuration (tether.toml)
//!
//! ```toml
//! [loader]
//! search_paths = ["native/lib", "/opt/vendor/lib"]
//!
//! [loader.aliases]
//! c = "libc.so.6"
//! vendor = "libvendor.so.2"
//!
//! [dispatch]
//! max_arguments = 32
//! default_convention = "C"
//! ```

use crate::{ConfigError, ConfigResult, CONVENTIONS, MAX_ARGUMENTS_LIMIT};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Project configuration from tether.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Library lookup settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loader: Option<LoaderConfig>,

    /// Call dispatch settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispatch: Option<DispatchConfig>,
}

/// `[loader]` section, shared by the project and global files
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct LoaderConfig {
    /// Directories searched before the platform defaults
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub search_paths: Vec<PathBuf>,

    /// Logical library name -> platform file name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub aliases: BTreeMap<String, String>,
}

/// `[dispatch]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct DispatchConfig {
    /// Most arguments a single call may carry
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_arguments: Option<usize>,

    /// Convention token used when a caller does not name one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_convention: Option<String>,
}

impl ProjectConfig {
    /// Load and validate a project config file
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

    /// Validate the project configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(loader) = &self.loader {
            loader.validate("loader")?;
        }

        if let Some(dispatch) = &self.dispatch {
            if let Some(max) = dispatch.max_arguments {
                validate_max_arguments("dispatch.max_arguments", max)?;
            }
            if let Some(convention) = &dispatch.default_convention {
                validate_convention("dispatch.default_convention", convention)?;
            }
        }

        Ok(())
    }

    /// Render as tether.toml text
    pub fn to_toml_string(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
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

    pub fn max_arguments(&self) -> Option<usize> {
        self.dispatch.as_ref().and_then(|d| d.max_arguments)
    }

    pub fn default_convention(&self) -> Option<&str> {
        self.dispatch
            .as_ref()
            .and_then(|d| d.default_convention.as_deref())
    }

    /// Mutable dispatch section, created on first use
    pub(crate) fn dispatch_mut(&mut self) -> &mut DispatchConfig {
        self.dispatch.get_or_insert_with(DispatchConfig::default)
    }
}

impl LoaderConfig {
    /// Validate a `[loader]` section; `section` prefixes field names in errors
    pub fn validate(&self, section: &str) -> ConfigResult<()> {
        for path in &self.search_paths {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: format!("{}.search_paths", section),
                    reason: "path cannot be empty".to_string(),
                });
            }
        }

        for (name, file) in &self.aliases {
            if name.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: format!("{}.aliases", section),
                    reason: "alias name cannot be empty".to_string(),
                });
            }
            if file.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: format!("{}.aliases.{}", section, name),
                    reason: "library file name cannot be empty".to_string(),
                });
            }
        }

        Ok(())
    }
}

pub(crate) fn validate_max_arguments(field: &str, value: usize) -> ConfigResult<()> {
    if value == 0 || value > MAX_ARGUMENTS_LIMIT {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            reason: format!("must be between 1 and {}, got {}", MAX_ARGUMENTS_LIMIT, value),
        });
    }
    Ok(())
}

pub(crate) fn validate_convention(field: &str, value: &str) -> ConfigResult<()> {
    if !CONVENTIONS.contains(&value) {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            reason: format!("must be 'C' or 'JNI', got '{}'", value),
        });
    }
    Ok(())
}
