//! Main application configuration
//!
//! This module defines the primary configuration structures for the
//! arena-rating service, including file loading, environment variable
//! overrides, and validation.

use crate::config::gate::GateConfig;
use crate::config::rating::RatingConfig;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceSettings,
    pub rating: RatingConfig,
    pub gate: GateConfig,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Service name for logging and metrics
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Interval between periodic cache flushes in seconds
    pub flush_interval_seconds: u64,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "arena-rating".to_string(),
            log_level: "info".to_string(),
            flush_interval_seconds: 60,
            shutdown_timeout_seconds: 30,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from environment variables with fallback to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        // Service settings
        if let Ok(name) = env::var("ARENA_RATING_SERVICE_NAME") {
            config.service.name = name;
        }
        if let Ok(log_level) = env::var("ARENA_RATING_LOG_LEVEL") {
            config.service.log_level = log_level;
        }
        if let Ok(interval) = env::var("ARENA_RATING_FLUSH_INTERVAL_SECONDS") {
            config.service.flush_interval_seconds = interval.parse().map_err(|_| {
                anyhow!("Invalid ARENA_RATING_FLUSH_INTERVAL_SECONDS value: {}", interval)
            })?;
        }
        if let Ok(timeout) = env::var("ARENA_RATING_SHUTDOWN_TIMEOUT_SECONDS") {
            config.service.shutdown_timeout_seconds = timeout.parse().map_err(|_| {
                anyhow!("Invalid ARENA_RATING_SHUTDOWN_TIMEOUT_SECONDS value: {}", timeout)
            })?;
        }

        // Rating settings
        if let Ok(rating) = env::var("ARENA_RATING_INITIAL_RATING") {
            config.rating.initial_rating = rating
                .parse()
                .map_err(|_| anyhow!("Invalid ARENA_RATING_INITIAL_RATING value: {}", rating))?;
        }
        if let Ok(deviation) = env::var("ARENA_RATING_INITIAL_DEVIATION") {
            config.rating.initial_deviation = deviation.parse().map_err(|_| {
                anyhow!("Invalid ARENA_RATING_INITIAL_DEVIATION value: {}", deviation)
            })?;
        }
        if let Ok(volatility) = env::var("ARENA_RATING_INITIAL_VOLATILITY") {
            config.rating.initial_volatility = volatility.parse().map_err(|_| {
                anyhow!("Invalid ARENA_RATING_INITIAL_VOLATILITY value: {}", volatility)
            })?;
        }
        if let Ok(tau) = env::var("ARENA_RATING_SYSTEM_TAU") {
            config.rating.system_tau = tau
                .parse()
                .map_err(|_| anyhow!("Invalid ARENA_RATING_SYSTEM_TAU value: {}", tau))?;
        }

        // Gate settings
        if let Ok(stale) = env::var("ARENA_RATING_POOL_STALE_SECONDS") {
            config.gate.pool_stale_seconds = stale
                .parse()
                .map_err(|_| anyhow!("Invalid ARENA_RATING_POOL_STALE_SECONDS value: {}", stale))?;
        }

        validate_config(&config)?;
        Ok(config)
    }

    /// Get flush interval as Duration
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.service.flush_interval_seconds)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.service.shutdown_timeout_seconds)
    }
}

/// Validate configuration values
pub fn validate_config(config: &AppConfig) -> Result<()> {
    // Validate log level
    match config.service.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow!("Invalid log level: {}", config.service.log_level)),
    }

    // Validate intervals
    if config.service.flush_interval_seconds == 0 {
        return Err(anyhow!("Flush interval must be greater than 0"));
    }
    if config.service.shutdown_timeout_seconds == 0 {
        return Err(anyhow!("Shutdown timeout must be greater than 0"));
    }

    config.rating.validate()?;
    config.gate.validate()?;

    Ok(())
}
