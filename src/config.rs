//! Application Configuration
//!
//! This module provides configuration management for the application,
//! supporting YAML configuration files with sensible defaults.

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::bridge::{DEFAULT_BLOCK_SIZE, DEFAULT_PIPE_CAPACITY};
use crate::storage::StorageError;

pub use crate::storage::config::{ReaperConfig, StorageBackend, StorageConfig};

/// Default config file, overridable with `BINKEEPER_CONFIG`
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// Storage configuration
    pub storage: StorageConfig,
    /// Reaper configuration
    pub reaper: ReaperConfig,
    /// Streaming bridge configuration
    pub streaming: StreamingConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Streaming bridge configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Largest block sent per download chunk, in bytes
    pub block_size: usize,
    /// Chunks buffered between the transport and the store
    pub pipe_capacity: usize,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            pipe_capacity: DEFAULT_PIPE_CAPACITY,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Path to log configuration file
    pub config_file: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            config_file: "server_log.yaml".to_string(),
        }
    }
}

/// Parse `name` from the environment into `target`, keeping the old value on bad input
fn override_from_env<T>(name: &str, target: &mut T)
where
    T: FromStr + std::fmt::Debug,
{
    if let Ok(raw) = env::var(name) {
        match raw.parse::<T>() {
            Ok(value) => {
                info!("Using {} from environment: {:?}", name, value);
                *target = value;
            }
            Err(_) => warn!("Invalid {} in environment: {:?}. Keeping {:?}.", name, raw, target),
        }
    }
}

impl AppConfig {
    /// Load configuration from file, use defaults if not found.
    /// Environment overrides are applied on top.
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let config_path = env::var("BINKEEPER_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from `config_path` without environment overrides
    pub fn load_from(config_path: impl AsRef<Path>) -> Result<Self, Box<dyn std::error::Error>> {
        let config_path = config_path.as_ref();
        if config_path.exists() {
            let content = fs::read_to_string(config_path)?;
            let config: AppConfig = serde_yaml::from_str(&content)?;
            info!("Loaded configuration from {}", config_path.display());
            Ok(config)
        } else {
            warn!("Config file {} not found, using defaults", config_path.display());
            Ok(Self::default())
        }
    }

    pub fn apply_env_overrides(&mut self) {
        self.storage.apply_env();
        override_from_env("REAPER_INTERVAL_SECS", &mut self.reaper.interval_secs);
        override_from_env("REAPER_MAX_AGE_SECS", &mut self.reaper.max_age_secs);
        override_from_env("STREAM_BLOCK_SIZE", &mut self.streaming.block_size);
    }

    /// Reject settings the store cannot run with
    pub fn validate(&self) -> Result<(), StorageError> {
        if self.streaming.block_size == 0 {
            return Err(StorageError::InvalidInput("streaming.block_size must be positive".into()));
        }
        if self.streaming.pipe_capacity == 0 {
            return Err(StorageError::InvalidInput("streaming.pipe_capacity must be positive".into()));
        }
        if self.server.workers == 0 {
            return Err(StorageError::InvalidInput("server.workers must be positive".into()));
        }
        if self.storage.root.is_empty() {
            return Err(StorageError::InvalidInput("storage.root must not be empty".into()));
        }
        if self.reaper.enabled {
            if self.reaper.interval_secs == 0 {
                return Err(StorageError::InvalidInput("reaper.interval_secs must be positive".into()));
            }
            if self.reaper.max_age_secs == 0 {
                return Err(StorageError::InvalidInput("reaper.max_age_secs must be positive".into()));
            }
            if self.reaper.max_age_secs < 60 * 60 {
                warn!(
                    "reaper.max_age_secs is {}s; slow uploads may lose their artifact mid-save",
                    self.reaper.max_age_secs
                );
            }
        }
        Ok(())
    }
}
