use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default number of requests in flight at once, 1.
pub const DEFAULT_MAX_CONCURRENCY: usize = 1;
/// Default delay between two admissions, none.
pub const DEFAULT_LAUNCH_INTERVAL: Duration = Duration::ZERO;
/// Default number of retries per request, 5.
pub const DEFAULT_MAX_RETRIES: u64 = 5;
/// Default delay before a failed request is queued again, 2 seconds.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);
/// Default time to wait for a completion before checking again, 1 second.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(1);

/// Tuning of an [`Engine`](crate::Engine)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of requests registered with the transport at once.
    ///
    /// With `0`, nothing is ever admitted.
    pub max_concurrency: usize,

    /// Minimum delay between two successive admissions
    #[serde(with = "humantime_serde")]
    pub launch_interval: Duration,

    /// Number of times a request failing with a recoverable error is
    /// attempted again
    pub max_retries: u64,

    /// Fixed delay before a failed request re-enters the queue
    #[serde(with = "humantime_serde")]
    pub retry_delay: Duration,

    /// Upper bound of a single wait for transport progress
    #[serde(with = "humantime_serde")]
    pub poll_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            launch_interval: DEFAULT_LAUNCH_INTERVAL,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::EngineConfig;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_concurrency, 1);
        assert_eq!(config.launch_interval, Duration::ZERO);
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.retry_delay, Duration::from_secs(2));
        assert_eq!(config.poll_timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_partial_toml() {
        let config: EngineConfig = toml::from_str(
            r#"
            max_concurrency = 8
            launch_interval = "50ms"
            "#,
        )
        .unwrap();

        assert_eq!(
            config,
            EngineConfig {
                max_concurrency: 8,
                launch_interval: Duration::from_millis(50),
                ..EngineConfig::default()
            }
        );
    }
}
