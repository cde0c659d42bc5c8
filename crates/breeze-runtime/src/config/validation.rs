//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{BreezeConfig, ConnectionConfig, LogOutput, LoggingConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &BreezeConfig) -> ConfigResult<()> {
    validate_connection_config(&config.connection)?;
    validate_logging_config(&config.logging)?;

    if config.api.timeout_secs == 0 {
        return Err(ConfigError::validation(
            "API timeout must be greater than 0",
        ));
    }

    Ok(())
}

/// Validates the gateway connection settings.
fn validate_connection_config(connection: &ConnectionConfig) -> ConfigResult<()> {
    validate_url(&connection.url)?;

    if connection.reconnect_delay_ms == 0 {
        return Err(ConfigError::validation(
            "Reconnect delay must be greater than 0",
        ));
    }

    Ok(())
}

/// Validates logging settings.
fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_log_levels.contains(&logging.level.to_lowercase().as_str()) {
        return Err(ConfigError::validation(format!(
            "Invalid log level: {}. Valid values are: {:?}",
            logging.level, valid_log_levels
        )));
    }

    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }

    Ok(())
}

/// Validates a WebSocket URL.
fn validate_url(url: &str) -> ConfigResult<()> {
    if url.is_empty() {
        return Err(ConfigError::missing_field("connection.url"));
    }

    let valid_schemes = ["ws://", "wss://"];
    if !valid_schemes.iter().any(|s| url.starts_with(s)) {
        return Err(ConfigError::invalid_url(
            url,
            format!("URL must start with one of: {valid_schemes:?}"),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&BreezeConfig::default()).is_ok());
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = BreezeConfig::default();
        config.logging.level = "loud".to_string();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError { .. })
        ));

        config.logging.level = "DEBUG".to_string();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_url_scheme() {
        let mut config = BreezeConfig::default();
        config.connection.url = "http://127.0.0.1:3001".to_string();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::InvalidUrl { .. })
        ));

        config.connection.url = "wss://gateway.example".to_string();
        assert!(validate_config(&config).is_ok());

        config.connection.url = String::new();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::MissingField { .. })
        ));
    }

    #[test]
    fn test_validate_zero_durations() {
        let mut config = BreezeConfig::default();
        config.connection.reconnect_delay_ms = 0;
        assert!(validate_config(&config).is_err());

        let mut config = BreezeConfig::default();
        config.api.timeout_secs = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_file_output_needs_path() {
        let mut config = BreezeConfig::default();
        config.logging.output = LogOutput::File;
        config.logging.file_path = None;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::MissingField { .. })
        ));
    }
}
