//! Retry strategies and backoff policies for memory-hub's embedded-SQLite
//! concurrency model.
//!
//! Two call sites need this crate:
//! - the catalog worker's `BEGIN IMMEDIATE` acquisition, which retries a
//!   handful of times on `SQLITE_BUSY` before giving up on a batch;
//! - a failed catalog job's next `lease_expires_at`, which backs off
//!   exponentially per job rather than per process.
//!
//! Both are expressed through the same [`RetryStrategyConfig`] /
//! [`calculate_delay`] primitives so one jitter and capping implementation
//! serves both.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Strategy type for retry behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategyType {
    /// No delay between retries - retry immediately.
    Immediate,
    /// Exponential backoff: delay doubles each attempt (default).
    #[default]
    Exponential,
    /// Linear backoff: delay increases linearly each attempt.
    Linear,
    /// Constant delay: same delay every attempt.
    Constant,
}

/// Predefined retry policies with sensible defaults for the two places
/// memory-hub retries: lock contention on a single `BEGIN IMMEDIATE`, and
/// a catalog job's attempt-to-attempt backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryPolicy {
    /// `BEGIN IMMEDIATE` retry inside the catalog worker: 3 attempts, 100ms
    /// exponential base, no cap beyond the attempt count itself.
    #[default]
    LockContention,
    /// Catalog job attempt-to-attempt backoff: `min(300s, 2^attempts)`,
    /// capped at `max_job_attempts` (carried by the caller, not here).
    CatalogJobBackoff,
    /// Fully custom configuration, e.g. loaded from `.memoryhub.toml`.
    Custom,
}

impl RetryPolicy {
    /// The default retry configuration for this policy.
    pub fn to_config(&self) -> RetryStrategyConfig {
        match self {
            RetryPolicy::LockContention => RetryStrategyConfig {
                strategy: RetryStrategyType::Exponential,
                max_attempts: 3,
                base_delay: Duration::from_millis(100),
                max_delay: Duration::from_secs(5),
                jitter: 0.0,
            },
            RetryPolicy::CatalogJobBackoff => RetryStrategyConfig {
                strategy: RetryStrategyType::Exponential,
                max_attempts: 5,
                base_delay: Duration::from_secs(1),
                max_delay: Duration::from_secs(300),
                jitter: 0.0,
            },
            RetryPolicy::Custom => RetryStrategyConfig::default(),
        }
    }
}

/// Configuration for a retry strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryStrategyConfig {
    /// Strategy type for calculating delay between retries.
    #[serde(default)]
    pub strategy: RetryStrategyType,
    /// Maximum number of retry attempts.
    #[serde(default)]
    pub max_attempts: u32,
    /// Base delay for backoff calculations.
    #[serde(default = "default_base_delay", with = "humantime_serde")]
    pub base_delay: Duration,
    /// Maximum delay cap for backoff.
    #[serde(default = "default_max_delay", with = "humantime_serde")]
    pub max_delay: Duration,
    /// Jitter factor for randomized delays (0.0 = no jitter, 1.0 = full jitter).
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

fn default_base_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(300)
}

fn default_jitter() -> f64 {
    0.0
}

impl Default for RetryStrategyConfig {
    fn default() -> Self {
        RetryPolicy::CatalogJobBackoff.to_config()
    }
}

/// Calculates the delay before the next retry attempt (1-indexed).
///
/// ```
/// use memoryhub_retry::{RetryStrategyConfig, RetryStrategyType, calculate_delay};
/// use std::time::Duration;
///
/// let config = RetryStrategyConfig {
///     strategy: RetryStrategyType::Exponential,
///     base_delay: Duration::from_secs(1),
///     max_delay: Duration::from_secs(300),
///     jitter: 0.0,
///     max_attempts: 5,
/// };
///
/// assert_eq!(calculate_delay(&config, 1), Duration::from_secs(1));
/// assert_eq!(calculate_delay(&config, 2), Duration::from_secs(2));
/// ```
pub fn calculate_delay(config: &RetryStrategyConfig, attempt: u32) -> Duration {
    let delay = match config.strategy {
        RetryStrategyType::Immediate => Duration::ZERO,
        RetryStrategyType::Exponential => {
            let pow = attempt.saturating_sub(1).min(16);
            config.base_delay.saturating_mul(2_u32.saturating_pow(pow))
        }
        RetryStrategyType::Linear => config.base_delay.saturating_mul(attempt),
        RetryStrategyType::Constant => config.base_delay,
    };

    let capped = delay.min(config.max_delay);

    if config.jitter > 0.0 {
        apply_jitter(capped, config.jitter)
    } else {
        capped
    }
}

fn apply_jitter(delay: Duration, jitter: f64) -> Duration {
    use rand::Rng;

    let jitter_range = 2.0 * jitter;
    let mut rng = rand::thread_rng();
    let random_value: f64 = rng.r#gen();
    let random_factor = 1.0 - jitter + (random_value * jitter_range);
    let millis = (delay.as_millis() as f64 * random_factor).round() as u64;
    Duration::from_millis(millis)
}

/// Computes the lease backoff for a catalog job's next attempt:
/// `min(300, 2^attempts)` seconds, matching the reference worker's retry
/// schedule regardless of which [`RetryPolicy`] a caller configured.
pub fn catalog_job_backoff_seconds(attempts: u32) -> u64 {
    let pow = attempts.min(9);
    (2_u64.saturating_pow(pow)).min(300)
}

/// Runs a fallible operation under the given retry policy, sleeping between
/// attempts. Used by the catalog worker around a single `BEGIN IMMEDIATE`.
pub struct RetryExecutor {
    config: RetryStrategyConfig,
}

impl RetryExecutor {
    pub fn new(config: RetryStrategyConfig) -> Self {
        Self { config }
    }

    pub fn from_policy(policy: RetryPolicy) -> Self {
        Self::new(policy.to_config())
    }

    /// Runs `operation` until it succeeds or `max_attempts` is exhausted.
    /// `operation` receives the 1-indexed attempt number.
    pub fn run<T, E, F>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Result<T, E>,
    {
        let mut attempt = 1;
        loop {
            match operation(attempt) {
                Ok(result) => return Ok(result),
                Err(e) => {
                    if attempt >= self.config.max_attempts {
                        return Err(e);
                    }
                    std::thread::sleep(calculate_delay(&self.config, attempt));
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_contention_policy_matches_worker_retry_schedule() {
        let config = RetryPolicy::LockContention.to_config();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.base_delay, Duration::from_millis(100));
    }

    #[test]
    fn catalog_job_backoff_caps_at_300_seconds() {
        assert_eq!(catalog_job_backoff_seconds(0), 1);
        assert_eq!(catalog_job_backoff_seconds(1), 2);
        assert_eq!(catalog_job_backoff_seconds(5), 32);
        assert_eq!(catalog_job_backoff_seconds(20), 300);
    }

    #[test]
    fn calculate_delay_exponential_doubles_each_attempt() {
        let config = RetryStrategyConfig {
            strategy: RetryStrategyType::Exponential,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            jitter: 0.0,
            max_attempts: 3,
        };
        assert_eq!(calculate_delay(&config, 1), Duration::from_millis(100));
        assert_eq!(calculate_delay(&config, 2), Duration::from_millis(200));
        assert_eq!(calculate_delay(&config, 3), Duration::from_millis(400));
    }

    #[test]
    fn calculate_delay_caps_at_max_delay() {
        let config = RetryStrategyConfig {
            strategy: RetryStrategyType::Exponential,
            base_delay: Duration::from_secs(100),
            max_delay: Duration::from_secs(300),
            jitter: 0.0,
            max_attempts: 10,
        };
        assert_eq!(calculate_delay(&config, 5), Duration::from_secs(300));
    }

    #[test]
    fn retry_executor_succeeds_after_transient_failures() {
        let executor = RetryExecutor::new(RetryStrategyConfig {
            strategy: RetryStrategyType::Immediate,
            max_attempts: 3,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: 0.0,
        });
        let mut attempts = 0;
        let result = executor.run(|attempt| {
            attempts = attempt;
            if attempt < 2 {
                Err("database is locked")
            } else {
                Ok("acquired")
            }
        });
        assert_eq!(result, Ok("acquired"));
        assert_eq!(attempts, 2);
    }

    #[test]
    fn retry_executor_exhausts_attempts_and_returns_last_error() {
        let executor = RetryExecutor::from_policy(RetryPolicy::LockContention);
        let result = executor.run(|_attempt| Err::<&str, _>("database is locked"));
        assert_eq!(result, Err("database is locked"));
    }
}
