use std::time::Duration;

use proptest::prelude::*;
use tasker_pool::RetryConfig;

/// Strategy for generating retry configurations with sane ranges
pub fn retry_config_strategy() -> impl Strategy<Value = RetryConfig> {
    (
        1u64..=1_000,   // initial_wait_ms
        1u64..=60_000,  // max_wait_ms
        0u32..=10,      // max_retries
        1.0f64..=4.0,   // backoff_factor
        0.0f64..=1.0,   // jitter_factor
    )
        .prop_map(|(initial, max, retries, factor, jitter)| {
            RetryConfig::new()
                .with_initial_wait(Duration::from_millis(initial))
                .with_max_wait(Duration::from_millis(max))
                .with_max_retries(retries)
                .with_backoff_factor(factor)
                .with_jitter_factor(jitter)
        })
}

/// Strategy for generating task priority lists
pub fn priorities_strategy() -> impl Strategy<Value = Vec<i32>> {
    prop::collection::vec(-50i32..50, 1..16)
}

/// Strategy for generating breaker call outcomes (`true` = success)
pub fn outcomes_strategy() -> impl Strategy<Value = Vec<bool>> {
    prop::collection::vec(any::<bool>(), 0..64)
}
