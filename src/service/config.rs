//! Worker service configuration.

use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use crate::reservation::DEFAULT_RESERVATION_TIMEOUT;

/// Default reservation group shared by every recorder in the fleet.
pub const DEFAULT_RESERVATION_CHANNEL: &str = "recording_reservation";

/// Default Redis URL.
pub const DEFAULT_REDIS_URL: &str = "redis://localhost:6379";

/// Errors that can occur while building a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration for a recorder worker.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Identifier used in logs and metrics.
    pub worker_id: String,
    /// Redis connection URL.
    pub redis_url: String,
    /// Reservation group to compete on.
    pub reservation_channel: String,
    /// Reservations older than this are discarded.
    pub reservation_timeout: Duration,
    /// Delay before retrying after a failed receive.
    pub receive_retry_interval: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("recorder-{}", Uuid::new_v4()),
            redis_url: DEFAULT_REDIS_URL.to_string(),
            reservation_channel: DEFAULT_RESERVATION_CHANNEL.to_string(),
            reservation_timeout: DEFAULT_RESERVATION_TIMEOUT,
            receive_retry_interval: Duration::from_secs(1),
        }
    }
}

impl ServiceConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `RECORDER_WORKER_ID`: Worker identifier (default: `recorder-<uuid>`)
    /// - `RECORDER_REDIS_URL`: Redis URL (default: redis://localhost:6379)
    /// - `RECORDER_RESERVATION_CHANNEL`: Reservation group (default: recording_reservation)
    /// - `RECORDER_RESERVATION_TIMEOUT_MS`: Staleness threshold in ms (default: 2000)
    /// - `RECORDER_RETRY_INTERVAL_MS`: Receive retry delay in ms (default: 1000)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable cannot be parsed or the result is
    /// invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(val) = lookup("RECORDER_WORKER_ID") {
            config.worker_id = val;
        }

        if let Some(val) = lookup("RECORDER_REDIS_URL") {
            config.redis_url = val;
        }

        if let Some(val) = lookup("RECORDER_RESERVATION_CHANNEL") {
            config.reservation_channel = val;
        }

        if let Some(val) = lookup("RECORDER_RESERVATION_TIMEOUT_MS") {
            let ms: u64 = parse_env_value(&val, "RECORDER_RESERVATION_TIMEOUT_MS")?;
            config.reservation_timeout = Duration::from_millis(ms);
        }

        if let Some(val) = lookup("RECORDER_RETRY_INTERVAL_MS") {
            let ms: u64 = parse_env_value(&val, "RECORDER_RETRY_INTERVAL_MS")?;
            config.receive_retry_interval = Duration::from_millis(ms);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_id.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "worker_id cannot be empty".to_string(),
            ));
        }

        if self.reservation_channel.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "reservation_channel cannot be empty".to_string(),
            ));
        }

        if self.reservation_timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "reservation_timeout must be greater than 0".to_string(),
            ));
        }

        if self.receive_retry_interval.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "receive_retry_interval must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Sets the worker identifier.
    pub fn with_worker_id(mut self, id: impl Into<String>) -> Self {
        self.worker_id = id.into();
        self
    }

    /// Sets the Redis URL.
    pub fn with_redis_url(mut self, url: impl Into<String>) -> Self {
        self.redis_url = url.into();
        self
    }

    /// Sets the reservation group.
    pub fn with_reservation_channel(mut self, channel: impl Into<String>) -> Self {
        self.reservation_channel = channel.into();
        self
    }

    /// Sets the staleness threshold.
    pub fn with_reservation_timeout(mut self, timeout: Duration) -> Self {
        self.reservation_timeout = timeout;
        self
    }

    /// Sets the receive retry delay.
    pub fn with_receive_retry_interval(mut self, interval: Duration) -> Self {
        self.receive_retry_interval = interval;
        self
    }
}

/// Parse an environment variable value.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}
