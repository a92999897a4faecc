//! Main application configuration
//!
//! This module defines the primary configuration structures for the
//! spades-room service, including environment variable and TOML loading
//! and validation.

use crate::config::room::RoomConfig;
use crate::wait_time::EstimatorConfig;
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
    pub estimator: EstimatorConfig,
    pub room: RoomConfig,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Service name for logging and metrics
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Port for the health, metrics and estimate endpoints
    pub http_port: u16,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "spades-room".to_string(),
            log_level: "info".to_string(),
            http_port: 8080,
            shutdown_timeout_seconds: 30,
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| anyhow!("Invalid {} value: {}", name, value))
}

impl AppConfig {
    /// Load configuration from environment variables with fallback to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from a TOML file; environment variables override it
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config = Self::from_toml_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.apply_env()?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Parse a TOML document; missing keys take their defaults
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<()> {
        // Service settings
        if let Ok(name) = env::var("SERVICE_NAME") {
            self.service.name = name;
        }
        if let Ok(log_level) = env::var("LOG_LEVEL") {
            self.service.log_level = log_level;
        }
        if let Ok(port) = env::var("HTTP_PORT") {
            self.service.http_port = parse_var("HTTP_PORT", &port)?;
        }
        if let Ok(timeout) = env::var("SHUTDOWN_TIMEOUT_SECONDS") {
            self.service.shutdown_timeout_seconds =
                parse_var("SHUTDOWN_TIMEOUT_SECONDS", &timeout)?;
        }

        // Estimator settings
        if let Ok(refresh) = env::var("ESTIMATOR_REFRESH_SECONDS") {
            self.estimator.refresh_interval_seconds =
                parse_var("ESTIMATOR_REFRESH_SECONDS", &refresh)?;
        }
        if let Ok(window) = env::var("ESTIMATOR_WINDOW_HOURS") {
            self.estimator.time_window_hours = parse_var("ESTIMATOR_WINDOW_HOURS", &window)?;
        }
        if let Ok(fallback) = env::var("ESTIMATOR_FALLBACK_SECONDS") {
            self.estimator.fallback_wait_seconds =
                parse_var("ESTIMATOR_FALLBACK_SECONDS", &fallback)?;
        }

        // Room settings
        if let Ok(seed) = env::var("ROOM_ACTIVITY_SEED_LIMIT") {
            self.room.activity_seed_limit = parse_var("ROOM_ACTIVITY_SEED_LIMIT", &seed)?;
        }
        if let Ok(display) = env::var("ROOM_ACTIVITY_DISPLAY_LIMIT") {
            self.room.activity_display_limit = parse_var("ROOM_ACTIVITY_DISPLAY_LIMIT", &display)?;
        }
        if let Ok(phase) = env::var("ROOM_START_PHASE") {
            self.room.start_phase = phase;
        }

        Ok(())
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.service.shutdown_timeout_seconds)
    }

    /// Get estimator refresh interval as Duration
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.estimator.refresh_interval_seconds)
    }
}

/// Validate configuration values
pub fn validate_config(config: &AppConfig) -> Result<()> {
    // Validate log level
    match config.service.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow!("Invalid log level: {}", config.service.log_level)),
    }

    if config.service.http_port == 0 {
        return Err(anyhow!("HTTP port cannot be 0"));
    }
    if config.service.shutdown_timeout_seconds == 0 {
        return Err(anyhow!("Shutdown timeout must be greater than 0"));
    }

    config.estimator.validate()?;
    config.room.validate()?;

    Ok(())
}
