//! Tether configuration
//!
//! Settings for the native-call bridge come from three places:
//! - Project configuration (`tether.toml`, found by walking up from a directory)
//! - Global user configuration (`~/.tether/config.toml`)
//! - Environment variables (`TETHER_*`)
//!
//! # Precedence
//!
//! Later sources override earlier ones:
//! 1. Global config
//! 2. Project config
//! 3. Environment variables
//! 4. CLI flags (applied by the caller)
//!
//! Search paths are the exception: they accumulate, with environment paths
//! searched first, then project paths, then global paths.
//!
//! # Example
//!
//! ```no_run
//! use tether_config::ConfigLoader;
//! use std::path::Path;
//!
//! let mut loader = ConfigLoader::new();
//! let config = loader.load_from_directory(Path::new("."))?;
//! println!("max arguments: {}", config.max_arguments());
//! # Ok::<(), tether_config::ConfigError>(())
//! ```

pub mod global;
pub mod loader;
pub mod project;

use std::path::PathBuf;
use thiserror::Error;

/// Project configuration file name
pub const CONFIG_FILE_NAME: &str = "tether.toml";

/// Argument cap used when nothing configures one
pub const DEFAULT_MAX_ARGUMENTS: usize = 32;

/// Largest accepted `dispatch.max_arguments`
pub const MAX_ARGUMENTS_LIMIT: usize = 255;

/// Convention tokens accepted by `dispatch.default_convention`
pub const CONVENTIONS: [&str; 2] = ["C", "JNI"];

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid TOML syntax in {file}: {error}")]
    TomlParseError {
        file: PathBuf,
        error: toml::de::Error,
    },

    #[error("Failed to serialize configuration: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Invalid environment variable {name}={value}: {reason}")]
    InvalidEnv {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Home directory not found")]
    HomeNotFound,
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

pub use global::GlobalConfig;
pub use loader::{Config, ConfigLoader};
pub use project::{DispatchConfig, LoaderConfig, ProjectConfig};
