//! Configuration Loader
//!
//! Environment-aware loading on top of the `config` crate: defaults, a base
//! TOML file, an environment-specific TOML file, then environment variables.

use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use config::{Config, Environment, File, FileFormat};
use tracing::{debug, info};

use super::error::{ConfigResult, ConfigurationError};
use super::TaskerPoolConfig;

const CONFIG_FILE_STEM: &str = "tasker-pool";
const ENV_PREFIX: &str = "TASKER_POOL";

/// Loaded configuration plus where it came from
#[derive(Debug)]
pub struct ConfigManager {
    config: TaskerPoolConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment
    /// This is useful for testing without modifying global environment variables
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        if environment.is_empty()
            || !environment
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ConfigurationError::environment_config_error(
                environment,
                "environment names may only contain letters, digits, '-' and '_'",
            ));
        }

        let config_directory = config_dir.unwrap_or_else(|| PathBuf::from("config"));

        debug!(
            environment = environment,
            config_directory = %config_directory.display(),
            "Loading configuration"
        );

        let config = Self::build(&config_directory, environment)?;
        config.validate()?;

        debug!(
            "Configuration loaded: {}",
            serde_json::to_string(&config).unwrap_or_else(|_| "[serialization error]".to_string())
        );

        info!(
            environment = environment,
            num_workers = config.worker_pool.num_workers,
            batch_size = config.worker_pool.batch_size,
            components = config.resilience.components.len(),
            "Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    fn build(config_directory: &Path, environment: &str) -> ConfigResult<TaskerPoolConfig> {
        let base = config_directory.join(format!("{CONFIG_FILE_STEM}.toml"));
        let overlay = config_directory.join(format!("{CONFIG_FILE_STEM}.{environment}.toml"));

        let config = Config::builder()
            .add_source(Config::try_from(&TaskerPoolConfig::default())?)
            .add_source(File::from(base).format(FileFormat::Toml).required(false))
            .add_source(File::from(overlay).format(FileFormat::Toml).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &TaskerPoolConfig {
        &self.config
    }

    /// Effective configuration as JSON, for diagnostics endpoints and logs
    pub fn debug_config(&self) -> serde_json::Value {
        serde_json::to_value(&self.config).unwrap_or_default()
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// Detect the current environment from `TASKER_POOL_ENV`, then `APP_ENV`
    pub fn detect_environment() -> String {
        resolve_environment(
            env::var("TASKER_POOL_ENV")
                .or_else(|_| env::var("APP_ENV"))
                .ok(),
        )
    }
}

/// Trimmed, lowercased environment name, `development` when unset or blank
pub(crate) fn resolve_environment(raw: Option<String>) -> String {
    raw.map(|value| value.trim().to_lowercase())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| "development".to_string())
}
