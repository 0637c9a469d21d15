//! Configuration management for the pubrelay service.

use std::time::Duration;

use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use pubrelay_client::{AgentConfig, Credentials, DEFAULT_ORIGIN};
use pubrelay_delivery::{BackoffStrategy, DeliveryConfig, RetryPolicies, RetryPolicy};
use serde::{Deserialize, Serialize};
use url::Url;

const CONFIG_FILE: &str = "pubrelay.toml";

/// Complete service configuration with defaults, file, and environment
/// overrides.
///
/// Configuration is loaded in priority order:
/// 1. Environment variables (highest priority)
/// 2. Configuration file (`pubrelay.toml`)
/// 3. Built-in defaults (lowest priority)
///
/// Only the publish and subscribe keys have no usable default.
///
/// # Example
///
/// ```no_run
/// use pubrelay_api::Config;
///
/// let config = Config::load().expect("Failed to load configuration");
///
/// println!("Delivering through {} sessions", config.session_pool_size);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    // Keys
    /// Publish key.
    ///
    /// Environment variable: `PUBLISH_KEY`
    #[serde(default, alias = "PUBLISH_KEY")]
    pub publish_key: String,
    /// Subscribe key.
    ///
    /// Environment variable: `SUBSCRIBE_KEY`
    #[serde(default, alias = "SUBSCRIBE_KEY")]
    pub subscribe_key: String,
    /// Secret key for signing. Empty sends unsigned requests, and grants
    /// then fail.
    ///
    /// Environment variable: `SECRET_KEY`
    #[serde(default, alias = "SECRET_KEY")]
    pub secret_key: String,
    /// Scheme and host of the remote service.
    ///
    /// Environment variable: `ORIGIN`
    #[serde(default = "default_origin", alias = "ORIGIN")]
    pub origin: String,

    // Delivery
    /// Number of pooled sessions.
    ///
    /// Environment variable: `SESSION_POOL_SIZE`
    #[serde(default = "default_pool_size", alias = "SESSION_POOL_SIZE")]
    pub session_pool_size: usize,
    /// Period between queue drains in milliseconds.
    ///
    /// Environment variable: `DRAIN_INTERVAL_MS`
    #[serde(default = "default_drain_interval_ms", alias = "DRAIN_INTERVAL_MS")]
    pub drain_interval_ms: u64,
    /// Maximum wait for a free session in milliseconds; 0 waits forever.
    ///
    /// Environment variable: `ACQUIRE_TIMEOUT_MS`
    #[serde(default, alias = "ACQUIRE_TIMEOUT_MS")]
    pub acquire_timeout_ms: u64,
    /// Time allowed for in-flight deliveries at shutdown, in seconds.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT_SECONDS`
    #[serde(default = "default_shutdown_timeout", alias = "SHUTDOWN_TIMEOUT_SECONDS")]
    pub shutdown_timeout_seconds: u64,

    // Retry
    /// Delay between delivery attempts in milliseconds.
    ///
    /// Environment variable: `RETRY_BACKOFF_MS`
    #[serde(default = "default_retry_backoff_ms", alias = "RETRY_BACKOFF_MS")]
    pub retry_backoff_ms: u64,
    /// How the delay grows between attempts: `fixed`, `linear` or
    /// `exponential`.
    ///
    /// Environment variable: `RETRY_BACKOFF_STRATEGY`
    #[serde(default = "default_backoff_strategy", alias = "RETRY_BACKOFF_STRATEGY")]
    pub retry_backoff_strategy: BackoffStrategy,
    /// Upper bound for a growing delay in milliseconds.
    ///
    /// Environment variable: `RETRY_MAX_DELAY_MS`
    #[serde(default = "default_retry_max_delay_ms", alias = "RETRY_MAX_DELAY_MS")]
    pub retry_max_delay_ms: u64,
    /// Fraction of each delay randomized, from 0.0 to 1.0.
    ///
    /// Environment variable: `RETRY_JITTER`
    #[serde(default, alias = "RETRY_JITTER")]
    pub retry_jitter: f64,
    /// Maximum publish attempts; 0 retries until delivered.
    ///
    /// Environment variable: `PUBLISH_MAX_ATTEMPTS`
    #[serde(default, alias = "PUBLISH_MAX_ATTEMPTS")]
    pub publish_max_attempts: u32,
    /// Maximum grant attempts; 0 retries until delivered.
    ///
    /// Environment variable: `GRANT_MAX_ATTEMPTS`
    #[serde(default, alias = "GRANT_MAX_ATTEMPTS")]
    pub grant_max_attempts: u32,

    // Client
    /// Connection timeout in seconds.
    ///
    /// Environment variable: `CONNECT_TIMEOUT_SECONDS`
    #[serde(default = "default_connect_timeout", alias = "CONNECT_TIMEOUT_SECONDS")]
    pub connect_timeout_seconds: u64,
    /// Whole-request timeout in seconds.
    ///
    /// Environment variable: `REQUEST_TIMEOUT_SECONDS`
    #[serde(default = "default_request_timeout", alias = "REQUEST_TIMEOUT_SECONDS")]
    pub request_timeout_seconds: u64,
    /// Extra attempts after a request times out.
    ///
    /// Environment variable: `CONNECT_RETRY`
    #[serde(default = "default_connect_retry", alias = "CONNECT_RETRY")]
    pub connect_retry: u32,

    // Logging
    /// Log level configuration.
    ///
    /// Environment variable: `RUST_LOG`
    #[serde(default = "default_log_level", alias = "RUST_LOG")]
    pub rust_log: String,
}

impl Config {
    /// Load configuration from defaults, `pubrelay.toml`, and environment
    /// variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error when a value cannot be parsed or fails validation.
    pub fn load() -> Result<Self> {
        Self::load_from(CONFIG_FILE)
    }

    /// Load configuration using `path` as the configuration file. A missing
    /// file is skipped.
    ///
    /// # Errors
    ///
    /// Same as [`Config::load`].
    pub fn load_from(path: &str) -> Result<Self> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(""));

        let config: Self = figment.extract().context("Failed to load configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Convert to the session configuration shared by every pooled agent.
    pub fn to_agent_config(&self) -> AgentConfig {
        let secret = Some(self.secret_key.as_str());
        let credentials = Credentials::new(&self.publish_key, &self.subscribe_key, secret);
        AgentConfig {
            origin: self.origin.clone(),
            credentials,
            connect_timeout: Duration::from_secs(self.connect_timeout_seconds),
            request_timeout: Duration::from_secs(self.request_timeout_seconds),
            connect_retry: self.connect_retry,
        }
    }

    /// Convert to the delivery crate's configuration.
    pub fn to_delivery_config(&self) -> DeliveryConfig {
        let backoff = |policy: RetryPolicy| {
            policy
                .with_backoff(Duration::from_millis(self.retry_backoff_ms))
                .with_strategy(self.retry_backoff_strategy)
                .with_max_delay(Duration::from_millis(self.retry_max_delay_ms))
                .with_jitter(self.retry_jitter)
        };
        DeliveryConfig {
            pool_size: self.session_pool_size,
            drain_interval: Duration::from_millis(self.drain_interval_ms),
            policies: RetryPolicies {
                publish: backoff(RetryPolicy::publish_default())
                    .with_max_attempts(self.publish_max_attempts),
                grant: backoff(RetryPolicy::grant_default())
                    .with_max_attempts(self.grant_max_attempts),
            },
            acquire_timeout: (self.acquire_timeout_ms > 0)
                .then(|| Duration::from_millis(self.acquire_timeout_ms)),
            shutdown_timeout: Duration::from_secs(self.shutdown_timeout_seconds),
        }
    }

    /// Get the secret key masked for logging.
    pub fn secret_key_masked(&self) -> String {
        if self.secret_key.is_empty() {
            return String::new();
        }
        let prefix: String = self.secret_key.chars().take(6).collect();
        format!("{prefix}***")
    }

    /// Validate configuration values.
    fn validate(&self) -> Result<()> {
        if self.publish_key.trim().is_empty() {
            anyhow::bail!("publish_key must be set");
        }

        if self.subscribe_key.trim().is_empty() {
            anyhow::bail!("subscribe_key must be set");
        }

        let origin = Url::parse(&self.origin).context("origin is not a valid URL")?;
        if !matches!(origin.scheme(), "http" | "https") {
            anyhow::bail!("origin must use http or https");
        }

        if self.session_pool_size == 0 {
            anyhow::bail!("session_pool_size must be greater than 0");
        }

        if self.drain_interval_ms == 0 {
            anyhow::bail!("drain_interval_ms must be greater than 0");
        }

        if !(0.0..=1.0).contains(&self.retry_jitter) {
            anyhow::bail!("retry_jitter must be between 0.0 and 1.0");
        }

        if self.retry_max_delay_ms < self.retry_backoff_ms {
            anyhow::bail!("retry_max_delay_ms must not be below retry_backoff_ms");
        }

        if self.request_timeout_seconds == 0 {
            anyhow::bail!("request_timeout_seconds must be greater than 0");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            publish_key: String::new(),
            subscribe_key: String::new(),
            secret_key: String::new(),
            origin: default_origin(),
            session_pool_size: default_pool_size(),
            drain_interval_ms: default_drain_interval_ms(),
            acquire_timeout_ms: 0,
            shutdown_timeout_seconds: default_shutdown_timeout(),
            retry_backoff_ms: default_retry_backoff_ms(),
            retry_backoff_strategy: default_backoff_strategy(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            retry_jitter: 0.0,
            publish_max_attempts: 0,
            grant_max_attempts: 0,
            connect_timeout_seconds: default_connect_timeout(),
            request_timeout_seconds: default_request_timeout(),
            connect_retry: default_connect_retry(),
            rust_log: default_log_level(),
        }
    }
}

fn default_origin() -> String {
    DEFAULT_ORIGIN.to_string()
}

fn default_pool_size() -> usize {
    pubrelay_delivery::DEFAULT_POOL_SIZE
}

fn default_drain_interval_ms() -> u64 {
    200
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_retry_backoff_ms() -> u64 {
    100
}

fn default_backoff_strategy() -> BackoffStrategy {
    BackoffStrategy::Fixed
}

fn default_retry_max_delay_ms() -> u64 {
    30_000
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_request_timeout() -> u64 {
    5
}

fn default_connect_retry() -> u32 {
    3
}

fn default_log_level() -> String {
    "info,pubrelay=debug".to_string()
}
