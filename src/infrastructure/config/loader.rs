use anyhow::{Context, Result};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use thiserror::Error;

use crate::domain::models::config::FleetConfig;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("vm_api.base_url cannot be empty")]
    EmptyBaseUrl,

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid rate limit capacity: {0}. Must be at least 1")]
    InvalidRateLimitCapacity(u32),

    #[error("Invalid rate limit refill: {0}. Must be at least 1")]
    InvalidRateLimitRefill(u32),

    #[error("Invalid max_attempts: {0}. Cannot be 0")]
    InvalidMaxAttempts(u32),

    #[error(
        "Invalid backoff configuration: base_delay_ms ({0}) must be less than max_delay_ms ({1})"
    )]
    InvalidBackoff(u64, u64),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .vers-fleet/config.yaml (project config)
    /// 3. .vers-fleet/local.yaml (project local overrides, optional)
    /// 4. Environment variables (`VERS_FLEET_*` prefix, highest priority)
    pub fn load() -> Result<FleetConfig> {
        let config: FleetConfig = Figment::new()
            .merge(Serialized::defaults(FleetConfig::default()))
            .merge(Yaml::file(".vers-fleet/config.yaml"))
            .merge(Yaml::file(".vers-fleet/local.yaml"))
            .merge(Env::prefixed("VERS_FLEET_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<FleetConfig> {
        let config: FleetConfig = Figment::new()
            .merge(Serialized::defaults(FleetConfig::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &FleetConfig) -> Result<(), ConfigError> {
        if config.vm_api.base_url.trim().is_empty() {
            return Err(ConfigError::EmptyBaseUrl);
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        if config.vm_api.rate_limit.capacity == 0 {
            return Err(ConfigError::InvalidRateLimitCapacity(
                config.vm_api.rate_limit.capacity,
            ));
        }

        if config.vm_api.rate_limit.refill_per_sec == 0 {
            return Err(ConfigError::InvalidRateLimitRefill(
                config.vm_api.rate_limit.refill_per_sec,
            ));
        }

        if config.vm_api.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidMaxAttempts(
                config.vm_api.retry.max_attempts,
            ));
        }

        if config.vm_api.retry.base_delay_ms >= config.vm_api.retry.max_delay_ms {
            return Err(ConfigError::InvalidBackoff(
                config.vm_api.retry.base_delay_ms,
                config.vm_api.retry.max_delay_ms,
            ));
        }

        if let Some(url) = &config.registry.url {
            if url.trim().is_empty() {
                return Err(ConfigError::ValidationFailed(
                    "registry.url cannot be an empty string; omit the key instead".to_string(),
                ));
            }
        }

        Ok(())
    }
}
