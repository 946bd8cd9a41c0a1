//! Configuration management for the call assistant
//!
//! Supports loading configuration from:
//! - YAML/TOML files (config/default, config/{env})
//! - Environment variables (CALL_ASSISTANT__ prefix, `__` separator)
//!
//! Business profiles live in their own YAML file and are served through
//! the [`BusinessDirectory`] trait.

pub mod business;
pub mod settings;

pub use business::{BusinessDirectory, StaticBusinessDirectory};
pub use settings::{
    load_settings, DialogueConfig, EmailTransportKind, LlmSettings, NotificationConfig,
    ObservabilityConfig, PersistenceConfig, RuntimeEnvironment, ServerConfig, Settings,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}
