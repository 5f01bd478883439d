//! Configuration management for the FilaZero rate limiter.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{FilazeroError, Result};
use crate::ratelimit::LimitSettings;

/// Prefix of environment variables that override file configuration,
/// e.g. `FILAZERO__RATE_LIMITING__MAX_REQUESTS=50`.
pub const ENV_PREFIX: &str = "FILAZERO";

/// Main configuration for the service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilazeroConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Requests admitted per client within the window
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,

    /// Window length in minutes
    #[serde(default = "default_window_minutes")]
    pub window_minutes: u64,

    /// Seconds between sweeps of idle clients
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_minutes: default_window_minutes(),
            cleanup_interval_secs: default_cleanup_interval(),
        }
    }
}

fn default_max_requests() -> u32 {
    100
}

fn default_window_minutes() -> u64 {
    15
}

fn default_cleanup_interval() -> u64 {
    300
}

impl RateLimitingConfig {
    /// The limiter settings described by this section.
    pub fn limit_settings(&self) -> LimitSettings {
        LimitSettings::new(
            self.max_requests,
            Duration::from_secs(self.window_minutes.saturating_mul(60)),
        )
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

/// Output format for log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl FilazeroConfig {
    /// Load configuration from an optional YAML file, then apply
    /// `FILAZERO__`-prefixed environment overrides.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__"),
        );

        let config: FilazeroConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: FilazeroConfig = config::Config::builder()
            .add_source(config::File::from_str(yaml, config::FileFormat::Yaml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the limiter cannot run with.
    pub fn validate(&self) -> Result<()> {
        let rate_limiting = &self.rate_limiting;
        if rate_limiting.max_requests == 0 {
            return Err(FilazeroError::Config(
                "rate_limiting.max_requests must be greater than zero".to_string(),
            ));
        }
        if rate_limiting.window_minutes == 0 {
            return Err(FilazeroError::Config(
                "rate_limiting.window_minutes must be greater than zero".to_string(),
            ));
        }
        if rate_limiting.cleanup_interval_secs == 0 {
            return Err(FilazeroError::Config(
                "rate_limiting.cleanup_interval_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
