//! # Configuration
//!
//! Layered configuration for the worker pool and the resilience wrapper.
//!
//! Sources, lowest precedence first:
//!
//! 1. built-in defaults ([`TaskerPoolConfig::default`])
//! 2. `config/tasker-pool.toml`
//! 3. `config/tasker-pool.{environment}.toml`
//! 4. environment variables `TASKER_POOL__SECTION__FIELD`
//!
//! Durations are expressed in milliseconds in every source.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tasker_pool::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let pool = &manager.config().worker_pool;
//! let options = pool.to_pool_config::<String>();
//! # let _ = options;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

use crate::execution::WorkerPoolConfig;
use crate::resilience::{CircuitBreakerConfig, RetryConfig};

/// Root configuration document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskerPoolConfig {
    pub worker_pool: WorkerPoolSettings,
    pub resilience: ResilienceSettings,
}

impl TaskerPoolConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        self.worker_pool.validate()?;
        self.resilience.validate()
    }
}

/// Worker pool sizing and timeouts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerPoolSettings {
    pub num_workers: usize,
    /// Tasks per batch for batched runs; 0 runs everything in one batch
    pub batch_size: usize,
    /// Per-task deadline; 0 disables it
    pub task_timeout_ms: u64,
    /// Result collection deadline; 0 disables it
    pub result_timeout_ms: u64,
    pub use_priority: bool,
}

impl Default for WorkerPoolSettings {
    fn default() -> Self {
        Self {
            num_workers: 4,
            batch_size: 0,
            task_timeout_ms: 0,
            result_timeout_ms: 0,
            use_priority: false,
        }
    }
}

impl WorkerPoolSettings {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.num_workers == 0 {
            return Err(ConfigurationError::invalid_value(
                "worker_pool.num_workers",
                self.num_workers,
                "must be at least 1",
            ));
        }
        Ok(())
    }

    /// Build pool options from these settings
    pub fn to_pool_config<O>(&self) -> WorkerPoolConfig<O> {
        WorkerPoolConfig::new()
            .with_task_timeout(Duration::from_millis(self.task_timeout_ms))
            .with_result_timeout(Duration::from_millis(self.result_timeout_ms))
            .with_priority_support(self.use_priority)
    }
}

/// Retry and circuit breaker defaults plus per-component overrides
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceSettings {
    pub retry: RetryConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    /// Keyed by component name, e.g. `payments_api`
    pub components: HashMap<String, ComponentResilienceConfig>,
}

/// Override for a single component; unset sections use the global defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComponentResilienceConfig {
    pub retry: Option<RetryConfig>,
    pub circuit_breaker: Option<CircuitBreakerConfig>,
}

impl ResilienceSettings {
    /// Resolve the retry and breaker configuration for `component`
    ///
    /// The returned breaker is always named after the component.
    pub fn config_for_component(&self, component: &str) -> (RetryConfig, CircuitBreakerConfig) {
        let overrides = self.components.get(component);

        let retry = overrides
            .and_then(|c| c.retry.clone())
            .unwrap_or_else(|| self.retry.clone());
        let mut breaker = overrides
            .and_then(|c| c.circuit_breaker.clone())
            .unwrap_or_else(|| self.circuit_breaker.clone());
        breaker.name = component.to_string();

        (retry, breaker)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        self.retry.validate()?;
        self.circuit_breaker.validate()?;

        for (name, component) in &self.components {
            let scoped = |err: ConfigurationError| match err {
                ConfigurationError::InvalidValue {
                    field,
                    value,
                    context,
                } => ConfigurationError::InvalidValue {
                    field: format!("resilience.components.{name}.{field}"),
                    value,
                    context,
                },
                other => other,
            };

            if let Some(retry) = &component.retry {
                retry.validate().map_err(scoped)?;
            }
            if let Some(breaker) = &component.circuit_breaker {
                breaker.validate().map_err(scoped)?;
            }
        }
        Ok(())
    }
}
