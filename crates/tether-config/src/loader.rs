//! Configuration Loader
//!
//! Loads the global, project and environment layers and exposes the
//! effective values through [`Config`].

use crate::global::GlobalConfig;
use crate::project::{validate_convention, validate_max_arguments, LoaderConfig, ProjectConfig};
use crate::{ConfigError, ConfigResult, CONFIG_FILE_NAME, DEFAULT_MAX_ARGUMENTS};
use log::{debug, warn};
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};

/// Directories prepended to the library search path
pub const ENV_LIBRARY_PATH: &str = "TETHER_LIBRARY_PATH";
/// Overrides `dispatch.max_arguments`
pub const ENV_MAX_ARGUMENTS: &str = "TETHER_MAX_ARGUMENTS";
/// Overrides `dispatch.default_convention`
pub const ENV_DEFAULT_CONVENTION: &str = "TETHER_DEFAULT_CONVENTION";

/// Configuration loader
///
/// Precedence, lowest first:
/// 1. Global config (~/.tether/config.toml)
/// 2. Project config (tether.toml)
/// 3. Environment variables (TETHER_*)
/// 4. CLI flags (handled by caller)
pub struct ConfigLoader {
    /// Cached global config path
    global_config_path: Option<PathBuf>,
}

/// Merged configuration result
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Project configuration, with environment overrides applied
    pub project: ProjectConfig,

    /// Global configuration
    pub global: GlobalConfig,

    /// Project root directory (where tether.toml was found)
    pub project_root: Option<PathBuf>,

    /// Search paths from TETHER_LIBRARY_PATH
    pub env_search_paths: Vec<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            global_config_path: None,
        }
    }

    /// Read the global layer from `path` instead of ~/.tether/config.toml
    pub fn with_global_config(path: impl Into<PathBuf>) -> Self {
        Self {
            global_config_path: Some(path.into()),
        }
    }

    /// Load configuration starting from the given directory
    ///
    /// Walks up the directory tree to find tether.toml. A directory tree
    /// without one yields the global and environment layers only.
    pub fn load_from_directory(&mut self, start_dir: &Path) -> ConfigResult<Config> {
        let (project_root, project_config) = self.find_project_config(start_dir)?;
        self.assemble(project_root, project_config)
    }

    /// Load configuration from a specific project config file
    pub fn load_from_file(&mut self, config_path: &Path) -> ConfigResult<Config> {
        let project_config = ProjectConfig::load_from_file(config_path)?;
        let project_root = config_path.parent().map(|p| p.to_path_buf());
        self.assemble(project_root, project_config)
    }

    fn assemble(
        &mut self,
        project_root: Option<PathBuf>,
        mut project: ProjectConfig,
    ) -> ConfigResult<Config> {
        let global = match self.load_global_config() {
            Ok(global) => global,
            Err(ConfigError::HomeNotFound) => GlobalConfig::default(),
            Err(e) => {
                warn!("ignoring global configuration: {}", e);
                GlobalConfig::default()
            }
        };

        let env_search_paths = Self::apply_env_overrides(&mut project)?;

        Ok(Config {
            project,
            global,
            project_root,
            env_search_paths,
        })
    }

    /// Find project configuration by walking up the directory tree
    fn find_project_config(
        &self,
        start_dir: &Path,
    ) -> ConfigResult<(Option<PathBuf>, ProjectConfig)> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(CONFIG_FILE_NAME);

            if config_path.is_file() {
                debug!("using project configuration {}", config_path.display());
                let project_config = ProjectConfig::load_from_file(&config_path)?;
                return Ok((Some(current), project_config));
            }

            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => return Ok((None, ProjectConfig::default())),
            }
        }
    }

    /// Load global configuration; a missing file is an empty configuration
    fn load_global_config(&mut self) -> ConfigResult<GlobalConfig> {
        let path = match &self.global_config_path {
            Some(path) => path.clone(),
            None => {
                let path = GlobalConfig::global_config_path()?;
                self.global_config_path = Some(path.clone());
                path
            }
        };

        if !path.exists() {
            return Ok(GlobalConfig::default());
        }

        debug!("using global configuration {}", path.display());
        GlobalConfig::load_from_file(&path)
    }

    /// Apply TETHER_* overrides to `config`; returns the TETHER_LIBRARY_PATH entries
    fn apply_env_overrides(config: &mut ProjectConfig) -> ConfigResult<Vec<PathBuf>> {
        let search_paths = match env::var_os(ENV_LIBRARY_PATH) {
            Some(value) => env::split_paths(&value)
                .filter(|p| !p.as_os_str().is_empty())
                .collect(),
            None => Vec::new(),
        };

        if let Ok(value) = env::var(ENV_MAX_ARGUMENTS) {
            let max = value
                .trim()
                .parse::<usize>()
                .map_err(|e| invalid_env(ENV_MAX_ARGUMENTS, &value, e.to_string()))?;
            validate_max_arguments("dispatch.max_arguments", max)
                .map_err(|e| invalid_env(ENV_MAX_ARGUMENTS, &value, reason_of(e)))?;
            config.dispatch_mut().max_arguments = Some(max);
        }

        if let Ok(value) = env::var(ENV_DEFAULT_CONVENTION) {
            validate_convention("dispatch.default_convention", &value)
                .map_err(|e| invalid_env(ENV_DEFAULT_CONVENTION, &value, reason_of(e)))?;
            config.dispatch_mut().default_convention = Some(value);
        }

        Ok(search_paths)
    }

    /// Get the global configuration directory (~/.tether)
    pub fn global_config_dir() -> ConfigResult<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
        Ok(home.join(".tether"))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn invalid_env(name: &str, value: &str, reason: String) -> ConfigError {
    ConfigError::InvalidEnv {
        name: name.to_string(),
        value: value.to_string(),
        reason,
    }
}

fn reason_of(err: ConfigError) -> String {
    match err {
        ConfigError::InvalidValue { reason, .. } => reason,
        other => other.to_string(),
    }
}

impl Config {
    /// Effective search paths: environment, then project, then global
    ///
    /// Relative project paths are taken relative to the project root.
    /// Duplicates keep their first position.
    pub fn search_paths(&self) -> Vec<PathBuf> {
        let project = self.project.search_paths().iter().map(|p| match &self.project_root {
            Some(root) if p.is_relative() => root.join(p),
            _ => p.clone(),
        });

        let mut paths: Vec<PathBuf> = Vec::new();
        for path in self
            .env_search_paths
            .iter()
            .cloned()
            .chain(project)
            .chain(self.global.search_paths().iter().cloned())
        {
            if !paths.contains(&path) {
                paths.push(path);
            }
        }
        paths
    }

    /// Resolve a library alias (project > global)
    pub fn alias(&self, name: &str) -> Option<&str> {
        self.project
            .alias(name)
            .or_else(|| self.global.alias(name))
    }

    /// All aliases, project entries replacing global ones of the same name
    pub fn aliases(&self) -> BTreeMap<String, String> {
        let mut merged = BTreeMap::new();
        for layer in [&self.global.loader, &self.project.loader].into_iter().flatten() {
            merged.extend(layer.aliases.clone());
        }
        merged
    }

    /// Get the effective argument cap (env > project > default)
    pub fn max_arguments(&self) -> usize {
        self.project.max_arguments().unwrap_or(DEFAULT_MAX_ARGUMENTS)
    }

    /// Get the effective default convention token (env > project > "C")
    pub fn default_convention(&self) -> &str {
        self.project.default_convention().unwrap_or("C")
    }

    pub fn project_root(&self) -> Option<&Path> {
        self.project_root.as_deref()
    }

    /// Check if this is a project (has tether.toml)
    pub fn is_project(&self) -> bool {
        self.project_root.is_some()
    }

    /// The merged configuration as a single project file
    pub fn effective(&self) -> ProjectConfig {
        let mut effective = ProjectConfig {
            loader: Some(LoaderConfig {
                search_paths: self.search_paths(),
                aliases: self.aliases(),
            }),
            dispatch: None,
        };
        let dispatch = effective.dispatch_mut();
        dispatch.max_arguments = Some(self.max_arguments());
        dispatch.default_convention = Some(self.default_convention().to_string());
        effective
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    fn create_config_file(dir: &Path, content: &str) -> PathBuf {
        let config_path = dir.join(CONFIG_FILE_NAME);
        fs::write(&config_path, content).unwrap();
        config_path
    }

    fn isolated_loader(dir: &TempDir) -> ConfigLoader {
        ConfigLoader::with_global_config(dir.path().join("no-global.toml"))
    }

    fn clear_env() {
        env::remove_var(ENV_LIBRARY_PATH);
        env::remove_var(ENV_MAX_ARGUMENTS);
        env::remove_var(ENV_DEFAULT_CONVENTION);
    }

    #[test]
    #[serial]
    fn test_defaults_without_any_file() {
        clear_env();
        let temp_dir = TempDir::new().unwrap();
        let config = isolated_loader(&temp_dir)
            .load_from_directory(temp_dir.path())
            .unwrap();

        assert!(!config.is_project());
        assert_eq!(config.max_arguments(), DEFAULT_MAX_ARGUMENTS);
        assert_eq!(config.default_convention(), "C");
        assert!(config.search_paths().is_empty());
        assert!(config.aliases().is_empty());
    }

    #[test]
    #[serial]
    fn test_relative_search_paths_join_project_root() {
        clear_env();
        let temp_dir = TempDir::new().unwrap();
        create_config_file(
            temp_dir.path(),
            r#"
[loader]
search_paths = ["native", "/opt/lib"]
"#,
        );

        let config = isolated_loader(&temp_dir)
            .load_from_directory(temp_dir.path())
            .unwrap();
        assert_eq!(
            config.search_paths(),
            vec![temp_dir.path().join("native"), PathBuf::from("/opt/lib")]
        );
    }

    #[test]
    #[serial]
    fn test_env_overrides_dispatch() {
        clear_env();
        let temp_dir = TempDir::new().unwrap();
        create_config_file(
            temp_dir.path(),
            r#"
[dispatch]
max_arguments = 16
default_convention = "C"
"#,
        );

        env::set_var(ENV_MAX_ARGUMENTS, "8");
        env::set_var(ENV_DEFAULT_CONVENTION, "JNI");
        let config = isolated_loader(&temp_dir).load_from_directory(temp_dir.path());
        clear_env();

        let config = config.unwrap();
        assert_eq!(config.max_arguments(), 8);
        assert_eq!(config.default_convention(), "JNI");
    }

    #[test]
    #[serial]
    fn test_env_max_arguments_not_a_number() {
        clear_env();
        let temp_dir = TempDir::new().unwrap();

        env::set_var(ENV_MAX_ARGUMENTS, "many");
        let result = isolated_loader(&temp_dir).load_from_directory(temp_dir.path());
        clear_env();

        assert!(matches!(
            result,
            Err(ConfigError::InvalidEnv { name, value, .. })
                if name == ENV_MAX_ARGUMENTS && value == "many"
        ));
    }

    #[test]
    #[serial]
    fn test_env_convention_validated() {
        clear_env();
        let temp_dir = TempDir::new().unwrap();

        env::set_var(ENV_DEFAULT_CONVENTION, "Pascal");
        let result = isolated_loader(&temp_dir).load_from_directory(temp_dir.path());
        clear_env();

        let err = result.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid environment variable TETHER_DEFAULT_CONVENTION=Pascal: must be 'C' or 'JNI', got 'Pascal'"
        );
    }

    #[test]
    #[serial]
    fn test_env_library_path_searched_first() {
        clear_env();
        let temp_dir = TempDir::new().unwrap();
        create_config_file(
            temp_dir.path(),
            r#"
[loader]
search_paths = ["/project/lib"]
"#,
        );

        let joined = env::join_paths([PathBuf::from("/env/a"), PathBuf::from("/env/b")]).unwrap();
        env::set_var(ENV_LIBRARY_PATH, &joined);
        let config = isolated_loader(&temp_dir).load_from_directory(temp_dir.path());
        clear_env();

        assert_eq!(
            config.unwrap().search_paths(),
            vec![
                PathBuf::from("/env/a"),
                PathBuf::from("/env/b"),
                PathBuf::from("/project/lib")
            ]
        );
    }

    #[test]
    fn test_duplicate_search_paths_collapse() {
        let config = Config {
            env_search_paths: vec![PathBuf::from("/lib"), PathBuf::from("/lib")],
            ..Default::default()
        };
        assert_eq!(config.search_paths(), vec![PathBuf::from("/lib")]);
    }

    #[test]
    #[serial]
    fn test_effective_reflects_merged_values() {
        clear_env();
        let temp_dir = TempDir::new().unwrap();
        create_config_file(
            temp_dir.path(),
            r#"
[loader.aliases]
c = "libc.so.6"
"#,
        );

        let config = isolated_loader(&temp_dir)
            .load_from_directory(temp_dir.path())
            .unwrap();
        let effective = config.effective();
        assert_eq!(effective.alias("c"), Some("libc.so.6"));
        assert_eq!(effective.max_arguments(), Some(DEFAULT_MAX_ARGUMENTS));
        assert_eq!(effective.default_convention(), Some("C"));
        assert!(effective.validate().is_ok());
    }

    #[test]
    fn test_global_config_dir() {
        if let Ok(dir) = ConfigLoader::global_config_dir() {
            assert!(dir.ends_with(".tether"));
        }
    }
}
