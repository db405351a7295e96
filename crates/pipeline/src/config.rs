use std::time::Duration;

use orch_core::retry::RetryPolicy;

/// Engine tuning loaded from environment variables.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Global cap on in-flight downstream calls (default: `32`).
    pub max_concurrent_calls: usize,
    /// Retry policy for transient downstream failures.
    pub retry: RetryPolicy,
    /// Optional budget for executing one work unit.
    pub task_timeout: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_calls: 32,
            retry: RetryPolicy::default(),
            task_timeout: None,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default  |
    /// |------------------------|----------|
    /// | `MAX_CONCURRENT_CALLS` | `32`     |
    /// | `RETRY_MAX_ATTEMPTS`   | `3`      |
    /// | `RETRY_BASE_DELAY_MS`  | `200`    |
    /// | `RETRY_MAX_DELAY_MS`   | `5000`   |
    /// | `TASK_TIMEOUT_SECS`    | disabled |
    pub fn from_env() -> Self {
        let max_concurrent_calls: usize = std::env::var("MAX_CONCURRENT_CALLS")
            .unwrap_or_else(|_| "32".into())
            .parse()
            .expect("MAX_CONCURRENT_CALLS must be a valid usize");

        let max_attempts: u32 = std::env::var("RETRY_MAX_ATTEMPTS")
            .unwrap_or_else(|_| "3".into())
            .parse()
            .expect("RETRY_MAX_ATTEMPTS must be a valid u32");

        let base_delay_ms: u64 = std::env::var("RETRY_BASE_DELAY_MS")
            .unwrap_or_else(|_| "200".into())
            .parse()
            .expect("RETRY_BASE_DELAY_MS must be a valid u64");

        let max_delay_ms: u64 = std::env::var("RETRY_MAX_DELAY_MS")
            .unwrap_or_else(|_| "5000".into())
            .parse()
            .expect("RETRY_MAX_DELAY_MS must be a valid u64");

        let task_timeout = std::env::var("TASK_TIMEOUT_SECS").ok().map(|v| {
            Duration::from_secs(v.parse().expect("TASK_TIMEOUT_SECS must be a valid u64"))
        });

        Self {
            max_concurrent_calls: max_concurrent_calls.max(1),
            retry: RetryPolicy {
                max_attempts: max_attempts.max(1),
                base_delay: Duration::from_millis(base_delay_ms),
                max_delay: Duration::from_millis(max_delay_ms),
                ..RetryPolicy::default()
            },
            task_timeout,
        }
    }
}
