//! Configuration management for ufys
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use ufys::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Server listening on: {}", config.server.bind_addr);
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `UFYS__<section>__<key>`, e.g. `UFYS__WORKER__MAX_INFLIGHT_HANDLERS=8`.
//!
//! The deployment variables `MINIO_ACCESS_KEY`, `MINIO_SECRET_KEY`,
//! `MINIO_ENDPOINT`, `MINIO_BUCKET`, `MINIO_SECURE`, `AAAS_ENDPOINT` and
//! `PROXY_URL` are applied last.
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/ufys.toml`.
//! This can be overridden using the `UFYS_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

pub use models::{Config, HandlersConfig, ServerConfig, StorageConfig, WorkerConfig};
pub use sources::apply_flat_env;
pub use validation::ValidationError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file is malformed or a value
    /// fails validation. Missing object store settings are not an error.
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    ///
    /// Useful for testing with custom configuration files.
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_minimal_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        fs::write(&config_path, "[worker]\nmax_inflight_handlers = 2\n").unwrap();

        let config = Config::load_from_path(config_path).unwrap();
        assert_eq!(config.worker.max_inflight_handlers, 2);
    }

    #[test]
    fn test_validation_runs_on_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        fs::write(&config_path, "[worker]\nmax_inflight_handlers = 0\n").unwrap();

        let result = Config::load_from_path(config_path);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::ValidationError(ValidationError::NoHandlerCapacity)
        ));
    }

    #[test]
    fn test_full_config_example() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[server]
bind_addr = "0.0.0.0:8080"
max_payload_bytes = 65536

[worker]
max_inflight_handlers = 16

[storage]
endpoint = "minio.internal:9000"
bucket = "ufys"
secure = true
region = "eu-central-1"
connect_timeout_secs = 2

[handlers]
aaas_endpoint = "https://aaas.internal/render"
proxy_url = "http://proxy.internal:3128"
user_agent = "ufys-test"
request_timeout_secs = 30
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = Config::load_from_path(config_path).unwrap();

        assert_eq!(config.server.bind_addr.to_string(), "0.0.0.0:8080");
        assert_eq!(config.worker.max_inflight_handlers, 16);
        assert_eq!(config.storage.region, "eu-central-1");
        assert_eq!(config.storage.connect_timeout_secs, 2);
        assert_eq!(config.handlers.user_agent, "ufys-test");
        assert_eq!(config.handlers.request_timeout().as_secs(), 30);
    }
}
