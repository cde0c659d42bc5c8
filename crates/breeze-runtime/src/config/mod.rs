//! Configuration module for the Breeze runtime.
//!
//! This module provides layered configuration loading (defaults, files,
//! environment) and validation for the connection, bot, liveness, API and
//! logging settings.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    ApiConfig, BotConfig, BreezeConfig, ConnectionConfig, LivenessConfig, LogFormat, LogOutput,
    LogRotation, LoggingConfig,
};
pub use validation::validate_config;
