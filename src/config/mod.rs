//! Configuration management for the bulk engine
//!
//! This module handles loading, validation, and management of engine configuration.

pub mod models;
pub mod validation;

pub use models::*;
pub use validation::Validate;

use crate::utils::error::{BulkError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Main configuration struct for the engine
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Engine configuration
    #[serde(default)]
    pub engine: EngineConfig,
}

impl Config {
    /// Load configuration from file
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading configuration from: {:?}", path);

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| BulkError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| BulkError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;

        debug!("Configuration loaded successfully");
        Ok(config)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        info!("Loading configuration from environment variables");

        let engine = EngineConfig::from_env()?;
        let config = Self { engine };

        config.validate()?;
        Ok(config)
    }

    /// Get engine configuration
    pub fn engine(&self) -> &EngineConfig {
        &self.engine
    }

    /// Get the default operation policy
    pub fn defaults(&self) -> &BulkOperationConfig {
        &self.engine.defaults
    }

    /// Get logging configuration
    pub fn logging(&self) -> &LoggingConfig {
        &self.engine.logging
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        debug!("Validating configuration");

        self.engine
            .validate()
            .map_err(|e| BulkError::Config(format!("Engine config error: {}", e)))?;

        debug!("Configuration validation completed");
        Ok(())
    }

    /// Merge with another configuration (other takes precedence)
    pub fn merge(mut self, other: Self) -> Self {
        self.engine = self.engine.merge(other.engine);
        self
    }

    /// Convert to YAML string
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self)
            .map_err(|e| BulkError::Config(format!("Failed to serialize config to YAML: {}", e)))
    }
}
