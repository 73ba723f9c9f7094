//! HTTP client configuration and retry policy.
//!
//! This module provides the retry policy and HTTP client settings shared by
//! the token providers and every [`ServiceClient`](crate::transport::ServiceClient).

use crate::error::{Error, Result};
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, ClientBuilder};
use std::collections::BTreeSet;
use std::time::Duration;

/// Default request timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default connect timeout in seconds
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

// Connection pool settings

/// Default idle timeout for connection pools
pub const DEFAULT_POOL_IDLE_TIMEOUT: u64 = 90;

/// Default maximum idle connections per host
pub const DEFAULT_POOL_MAX_IDLE_PER_HOST: usize = 10;

// Retry settings

/// Default number of attempts, including the first one
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default backoff before the first retry, in milliseconds
pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 100;

/// Default backoff cap, in milliseconds
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 5000;

/// Default backoff multiplier
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Upper bound of the random jitter, as a fraction of the base backoff
pub const MAX_JITTER_RATIO: f64 = 0.2;

/// Statuses retried by default when the failure is classified retryable
pub const DEFAULT_RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// User agent sent by SDK clients unless overridden
pub const DEFAULT_USER_AGENT: &str = concat!("nhncloud-sdk-rust/", env!("CARGO_PKG_VERSION"));

/// Retry policy with exponential backoff and jitter.
///
/// A failed call is retried when its error is retryable, the attempt budget is
/// not exhausted and, for HTTP failures, its status is in `retryable_statuses`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (1 disables retries)
    pub max_attempts: u32,

    /// Delay before the first retry
    pub initial_backoff: Duration,

    /// Maximum delay between attempts (cap for exponential backoff)
    pub max_backoff: Duration,

    /// Backoff multiplier
    pub multiplier: f64,

    /// HTTP statuses eligible for retry
    pub retryable_statuses: BTreeSet<u16>,
}

impl RetryPolicy {
    /// Create a new retry policy with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff: Duration::from_millis(DEFAULT_INITIAL_BACKOFF_MS),
            max_backoff: Duration::from_millis(DEFAULT_MAX_BACKOFF_MS),
            multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            retryable_statuses: DEFAULT_RETRYABLE_STATUSES.into_iter().collect(),
        }
    }

    /// Create a retry policy that makes a single attempt.
    #[must_use]
    pub fn no_retry() -> Self {
        Self::new().with_max_attempts(1)
    }

    /// Set the maximum number of attempts; values below 1 are raised to 1.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Set the initial backoff.
    #[must_use]
    pub fn with_initial_backoff(mut self, delay: Duration) -> Self {
        self.initial_backoff = delay;
        self
    }

    /// Set the maximum backoff.
    #[must_use]
    pub fn with_max_backoff(mut self, delay: Duration) -> Self {
        self.max_backoff = delay;
        self
    }

    /// Set the backoff multiplier; values below 1.0 are raised to 1.0.
    #[must_use]
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = if multiplier.is_finite() {
            multiplier.max(1.0)
        } else {
            DEFAULT_BACKOFF_MULTIPLIER
        };
        self
    }

    /// Replace the set of retryable HTTP statuses.
    #[must_use]
    pub fn with_retryable_statuses(mut self, statuses: impl IntoIterator<Item = u16>) -> Self {
        self.retryable_statuses = statuses.into_iter().collect();
        self
    }

    /// Backoff before retrying after `attempt`, without jitter.
    ///
    /// delay = min(initial_backoff * multiplier^(attempt-1), max_backoff); attempt 0 waits nothing.
    #[must_use]
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let nanos = self.initial_backoff.as_nanos() as f64 * self.multiplier.powi(exponent);
        let cap = self.max_backoff.as_nanos() as f64;

        if !nanos.is_finite() || nanos >= cap {
            return self.max_backoff;
        }

        Duration::from_nanos(nanos as u64)
    }

    /// Backoff for `attempt` plus up to [`MAX_JITTER_RATIO`] random jitter.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.backoff_for_attempt(attempt);
        if base.is_zero() {
            return base;
        }

        let ratio = rand::thread_rng().gen_range(0.0..=MAX_JITTER_RATIO);
        base + base.mul_f64(ratio)
    }

    /// Check whether a call that failed with `error` on `attempt` (1-based) should be retried.
    #[must_use]
    pub fn should_retry(&self, error: &Error, attempt: u32) -> bool {
        attempt < self.max_attempts
            && error.is_retryable()
            && error
                .status()
                .map_or(true, |status| self.retryable_statuses.contains(&status))
    }

    /// Check if retries are enabled.
    #[must_use]
    pub const fn has_retries(&self) -> bool {
        self.max_attempts > 1
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// HTTP client configuration.
///
/// Configures HTTP client behavior including timeouts, retries, connection
/// pooling and request diagnostics.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Request timeout
    pub timeout: Duration,

    /// Retry policy
    pub retry_policy: RetryPolicy,

    /// Connection pool idle timeout
    pub pool_idle_timeout: Duration,

    /// Maximum idle connections per host
    pub pool_max_idle_per_host: usize,

    /// Emit masked request/response diagnostics at debug level
    pub debug: bool,

    /// Enable response compression
    pub enable_compression: bool,

    /// User agent
    pub user_agent: String,

    /// Headers sent with every request
    pub default_headers: HeaderMap,
}

impl ClientConfig {
    /// Create a new client configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            retry_policy: RetryPolicy::new(),
            pool_idle_timeout: Duration::from_secs(DEFAULT_POOL_IDLE_TIMEOUT),
            pool_max_idle_per_host: DEFAULT_POOL_MAX_IDLE_PER_HOST,
            debug: false,
            enable_compression: true,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            default_headers: HeaderMap::new(),
        }
    }

    /// Set request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Disable retries.
    #[must_use]
    pub fn without_retries(mut self) -> Self {
        self.retry_policy = RetryPolicy::no_retry();
        self
    }

    /// Set connection pool idle timeout.
    #[must_use]
    pub const fn with_pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.pool_idle_timeout = timeout;
        self
    }

    /// Set maximum idle connections per host.
    #[must_use]
    pub const fn with_pool_max_idle(mut self, max: usize) -> Self {
        self.pool_max_idle_per_host = max;
        self
    }

    /// Enable or disable request diagnostics.
    #[must_use]
    pub const fn with_debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }

    /// Enable or disable compression.
    #[must_use]
    pub const fn with_compression(mut self, enabled: bool) -> Self {
        self.enable_compression = enabled;
        self
    }

    /// Set the user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Add a header sent with every request.
    #[must_use]
    pub fn with_default_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.default_headers.insert(name, value);
        self
    }

    /// Build a [`reqwest::Client`] from these settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the TLS backend cannot be initialised.
    pub fn build_http_client(&self) -> Result<Client> {
        ClientBuilder::new()
            .user_agent(self.user_agent.as_str())
            .default_headers(self.default_headers.clone())
            .timeout(self.timeout)
            .connect_timeout(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS))
            .pool_idle_timeout(self.pool_idle_timeout)
            .pool_max_idle_per_host(self.pool_max_idle_per_host)
            .gzip(self.enable_compression)
            .build()
            .map_err(|err| Error::Config(format!("Failed to build HTTP client: {err}")))
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_policy_new() {
        let policy = RetryPolicy::new();
        assert_eq!(policy.max_attempts, DEFAULT_MAX_ATTEMPTS);
        assert_eq!(policy.initial_backoff, Duration::from_millis(100));
        assert_eq!(policy.max_backoff, Duration::from_secs(5));
        assert!((policy.multiplier - 2.0).abs() < f64::EPSILON);
        assert_eq!(
            policy.retryable_statuses.iter().copied().collect::<Vec<_>>(),
            vec![429, 500, 502, 503, 504]
        );
    }

    #[test]
    fn test_retry_policy_no_retry() {
        let policy = RetryPolicy::no_retry();
        assert_eq!(policy.max_attempts, 1);
        assert!(!policy.has_retries());
        assert!(!policy.should_retry(&Error::Network("reset".into()), 1));
    }

    #[test]
    fn test_retry_policy_builder() {
        let policy = RetryPolicy::new()
            .with_max_attempts(5)
            .with_initial_backoff(Duration::from_millis(50))
            .with_max_backoff(Duration::from_secs(10))
            .with_multiplier(3.0)
            .with_retryable_statuses([503]);

        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.initial_backoff, Duration::from_millis(50));
        assert_eq!(policy.max_backoff, Duration::from_secs(10));
        assert!((policy.multiplier - 3.0).abs() < f64::EPSILON);
        assert!(policy.retryable_statuses.contains(&503));
        assert_eq!(policy.retryable_statuses.len(), 1);
    }

    #[test]
    fn test_retry_policy_clamps_inputs() {
        let policy = RetryPolicy::new().with_max_attempts(0).with_multiplier(0.5);
        assert_eq!(policy.max_attempts, 1);
        assert!((policy.multiplier - 1.0).abs() < f64::EPSILON);

        let policy = RetryPolicy::new().with_multiplier(f64::NAN);
        assert!((policy.multiplier - DEFAULT_BACKOFF_MULTIPLIER).abs() < f64::EPSILON);
    }

    #[test]
    fn test_retry_policy_exponential_backoff() {
        let policy = RetryPolicy::new();

        assert_eq!(policy.backoff_for_attempt(0), Duration::ZERO);
        assert_eq!(policy.backoff_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_for_attempt(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_for_attempt(3), Duration::from_millis(400));
        assert_eq!(policy.backoff_for_attempt(6), Duration::from_millis(3200));

        // Should cap at max_backoff (5000ms)
        assert_eq!(policy.backoff_for_attempt(7), Duration::from_millis(5000));
        assert_eq!(policy.backoff_for_attempt(64), Duration::from_millis(5000));
        assert_eq!(policy.backoff_for_attempt(u32::MAX), Duration::from_millis(5000));
    }

    #[test]
    fn test_jitter_is_bounded() {
        let policy = RetryPolicy::new();
        for attempt in 1..=8 {
            let base = policy.backoff_for_attempt(attempt);
            for _ in 0..50 {
                let delay = policy.delay_for_attempt(attempt);
                assert!(delay >= base);
                assert!(delay <= base + base.mul_f64(MAX_JITTER_RATIO));
            }
        }
        assert_eq!(policy.delay_for_attempt(0), Duration::ZERO);
    }

    #[test]
    fn test_should_retry() {
        let policy = RetryPolicy::new();
        let unavailable = Error::from_status(503, None, "down", None);

        assert!(policy.should_retry(&unavailable, 1));
        assert!(policy.should_retry(&unavailable, 2));
        // Attempt budget exhausted
        assert!(!policy.should_retry(&unavailable, 3));

        // Non-retryable kinds
        assert!(!policy.should_retry(&Error::from_status(404, None, "gone", None), 1));
        assert!(!policy.should_retry(&Error::from_status(401, None, "denied", None), 1));
        assert!(!policy.should_retry(&Error::Cancelled, 1));

        // Retryable kind whose status is outside the configured set
        assert!(!policy.should_retry(&Error::from_status(501, None, "nope", None), 1));

        // Failures without a status
        assert!(policy.should_retry(&Error::Network("refused".into()), 1));
        assert!(policy.should_retry(&Error::Timeout("slow".into()), 1));
    }

    #[test]
    fn test_client_config_new() {
        let config = ClientConfig::new();
        assert_eq!(config.timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        assert_eq!(config.retry_policy.max_attempts, DEFAULT_MAX_ATTEMPTS);
        assert!(!config.debug);
        assert!(config.enable_compression);
        assert!(config.user_agent.starts_with("nhncloud-sdk-rust/"));
        assert!(config.default_headers.is_empty());
    }

    #[test]
    fn test_client_config_builder() {
        let config = ClientConfig::new()
            .with_timeout(Duration::from_secs(60))
            .with_retry_policy(RetryPolicy::no_retry())
            .with_pool_idle_timeout(Duration::from_secs(120))
            .with_pool_max_idle(20)
            .with_debug(true)
            .with_compression(false)
            .with_user_agent("custom/1.0")
            .with_default_header(
                HeaderName::from_static("x-tenant"),
                HeaderValue::from_static("t-1"),
            );

        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.retry_policy.max_attempts, 1);
        assert_eq!(config.pool_idle_timeout, Duration::from_secs(120));
        assert_eq!(config.pool_max_idle_per_host, 20);
        assert!(config.debug);
        assert!(!config.enable_compression);
        assert_eq!(config.user_agent, "custom/1.0");
        assert_eq!(config.default_headers["x-tenant"], "t-1");
    }

    #[test]
    fn test_client_config_without_retries() {
        let config = ClientConfig::default().without_retries();
        assert!(!config.retry_policy.has_retries());
    }

    #[test]
    fn test_build_http_client() {
        assert!(ClientConfig::new().build_http_client().is_ok());
    }
}
