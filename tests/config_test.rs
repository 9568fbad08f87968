//! Layered configuration loading from TOML files

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use tasker_pool::config::{ConfigManager, ConfigurationError};
use tempfile::TempDir;

const BASE_CONFIG: &str = r#"
[worker_pool]
num_workers = 8
task_timeout_ms = 2000

[resilience.retry]
max_retries = 5

[resilience.circuit_breaker]
request_threshold = 10

[resilience.components.payments_api.retry]
max_retries = 1
initial_wait_ms = 50
"#;

const STAGING_CONFIG: &str = r#"
[worker_pool]
num_workers = 16
use_priority = true
"#;

fn config_dir(files: &[(&str, &str)]) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    for (name, contents) in files {
        fs::write(dir.path().join(name), contents).unwrap();
    }
    dir
}

fn load(dir: &TempDir, environment: &str) -> Result<Arc<ConfigManager>, ConfigurationError> {
    ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), environment)
}

#[test]
fn test_base_file_overrides_defaults() {
    let dir = config_dir(&[("tasker-pool.toml", BASE_CONFIG)]);
    let manager = load(&dir, "test").unwrap();
    let config = manager.config();

    assert_eq!(config.worker_pool.num_workers, 8);
    assert_eq!(config.worker_pool.task_timeout_ms, 2000);
    assert!(!config.worker_pool.use_priority);
    assert_eq!(config.resilience.retry.max_retries, 5);
    assert_eq!(config.resilience.retry.initial_wait, Duration::from_millis(100));
    assert_eq!(config.resilience.circuit_breaker.request_threshold, 10);
    assert_eq!(config.resilience.circuit_breaker.open_timeout, Duration::from_secs(30));
}

#[test]
fn test_environment_file_layers_over_base() {
    let dir = config_dir(&[
        ("tasker-pool.toml", BASE_CONFIG),
        ("tasker-pool.staging.toml", STAGING_CONFIG),
    ]);
    let manager = load(&dir, "staging").unwrap();
    let pool = &manager.config().worker_pool;

    assert_eq!(manager.environment(), "staging");
    assert_eq!(pool.num_workers, 16);
    assert!(pool.use_priority);
    assert_eq!(pool.task_timeout_ms, 2000);

    let options = pool.to_pool_config::<()>();
    assert_eq!(options.task_timeout, Some(Duration::from_secs(2)));
    assert!(options.use_priority);
}

#[test]
fn test_component_overrides_resolve() {
    let dir = config_dir(&[("tasker-pool.toml", BASE_CONFIG)]);
    let manager = load(&dir, "test").unwrap();
    let resilience = &manager.config().resilience;

    let (retry, breaker) = resilience.config_for_component("payments_api");
    assert_eq!(retry.max_retries, 1);
    assert_eq!(retry.initial_wait, Duration::from_millis(50));
    assert_eq!(breaker.name, "payments_api");
    assert_eq!(breaker.request_threshold, 10);

    let (retry, _) = resilience.config_for_component("unlisted");
    assert_eq!(retry.max_retries, 5);
}

#[test]
fn test_invalid_values_fail_validation() {
    let dir = config_dir(&[(
        "tasker-pool.toml",
        "[resilience.circuit_breaker]\nfailure_rate_threshold = 2.5\n",
    )]);

    let err = load(&dir, "test").unwrap_err();
    assert!(matches!(err, ConfigurationError::InvalidValue { ref field, .. }
        if field == "circuit_breaker.failure_rate_threshold"));
}

#[test]
fn test_malformed_toml_is_a_load_error() {
    let dir = config_dir(&[("tasker-pool.toml", "[worker_pool\nnum_workers = ")]);

    let err = load(&dir, "test").unwrap_err();
    assert!(matches!(err, ConfigurationError::Load(_)));
}
