//! Pool configuration.
//!
//! [`PoolConfig`] carries typed values with documented defaults. Callers
//! usually supply a partial [`PoolConfigOverlay`] (from code or a TOML file)
//! that is applied on top of those defaults.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Configuration for the connection pool.
#[derive(Clone, Debug, PartialEq)]
pub struct PoolConfig {
    /// Maximum live connections per pool key (default: 10).
    pub max_connections: usize,
    /// Floor the idle reaper never goes below (default: 2).
    pub min_connections: usize,
    /// Maximum time to wait for a release when a key is at capacity (default: 30s).
    pub acquire_timeout: Duration,
    /// Period of the per-key health monitor; zero disables it (default: 60s).
    pub health_check_interval: Duration,
    /// Idle time after which a connection becomes eligible for reaping (default: 300s).
    pub max_idle_time: Duration,
    /// Connection creation attempts, including the first (default: 3).
    pub retry_attempts: u32,
    /// Base delay of the exponential backoff between attempts (default: 1s).
    pub retry_delay: Duration,
    /// Validate idle connections before handing them out (default: true).
    pub enable_connection_validation: bool,
    /// Deadline for a validation or health-check round-trip (default: 5s).
    pub connection_validation_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 2,
            acquire_timeout: Duration::from_secs(30),
            health_check_interval: Duration::from_secs(60),
            max_idle_time: Duration::from_secs(300),
            retry_attempts: 3,
            retry_delay: Duration::from_secs(1),
            enable_connection_validation: true,
            connection_validation_timeout: Duration::from_secs(5),
        }
    }
}

/// Partial configuration; unset fields keep their defaults.
///
/// Timings are in milliseconds. camelCase aliases are accepted.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolConfigOverlay {
    #[serde(alias = "maxConnections")]
    pub max_connections: Option<usize>,
    #[serde(alias = "minConnections")]
    pub min_connections: Option<usize>,
    #[serde(alias = "acquireTimeout")]
    pub acquire_timeout_ms: Option<u64>,
    #[serde(alias = "healthCheckInterval")]
    pub health_check_interval_ms: Option<u64>,
    #[serde(alias = "maxIdleTime")]
    pub max_idle_time_ms: Option<u64>,
    #[serde(alias = "retryAttempts")]
    pub retry_attempts: Option<u32>,
    #[serde(alias = "retryDelay")]
    pub retry_delay_ms: Option<u64>,
    #[serde(alias = "enableConnectionValidation")]
    pub enable_connection_validation: Option<bool>,
    #[serde(alias = "connectionValidationTimeout")]
    pub connection_validation_timeout_ms: Option<u64>,
}

/// A TOML document may hold the overlay at top level or under `[pool]`.
#[derive(Deserialize)]
#[serde(untagged)]
enum ConfigDocument {
    Nested { pool: PoolConfigOverlay },
    Flat(PoolConfigOverlay),
}

impl PoolConfig {
    /// Apply an overlay on top of this configuration.
    pub fn with_overlay(self, overlay: &PoolConfigOverlay) -> Self {
        Self {
            max_connections: overlay.max_connections.unwrap_or(self.max_connections),
            min_connections: overlay.min_connections.unwrap_or(self.min_connections),
            acquire_timeout: overlay
                .acquire_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(self.acquire_timeout),
            health_check_interval: overlay
                .health_check_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(self.health_check_interval),
            max_idle_time: overlay
                .max_idle_time_ms
                .map(Duration::from_millis)
                .unwrap_or(self.max_idle_time),
            retry_attempts: overlay.retry_attempts.unwrap_or(self.retry_attempts),
            retry_delay: overlay
                .retry_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(self.retry_delay),
            enable_connection_validation: overlay
                .enable_connection_validation
                .unwrap_or(self.enable_connection_validation),
            connection_validation_timeout: overlay
                .connection_validation_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(self.connection_validation_timeout),
        }
    }

    /// Parse an overlay from TOML, apply it to the defaults and validate.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let overlay = match toml::from_str::<ConfigDocument>(s)? {
            ConfigDocument::Nested { pool } => pool,
            ConfigDocument::Flat(overlay) => overlay,
        };
        let config = Self::default().with_overlay(&overlay);
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_toml_str(&content)?)
    }

    /// Check cross-field constraints, reporting every violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();
        if self.max_connections == 0 {
            errors.push("max_connections must be at least 1".to_string());
        }
        if self.min_connections > self.max_connections {
            errors.push(format!(
                "min_connections ({}) cannot be greater than max_connections ({})",
                self.min_connections, self.max_connections
            ));
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(errors))
        }
    }

    /// Attempts made by the connection creator; never less than one.
    pub fn creation_attempts(&self) -> u32 {
        self.retry_attempts.max(1)
    }
}
