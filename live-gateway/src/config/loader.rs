use std::path::Path;
use thiserror::Error;
use url::Url;

use super::types::LiveConfigFile;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Load configuration from a JSON file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<LiveConfigFile, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    load_config_from_str(&content)
}

/// Load configuration from a JSON string
pub fn load_config_from_str(json: &str) -> Result<LiveConfigFile, ConfigError> {
    let config: LiveConfigFile = serde_json::from_str(json)?;
    config.validate()?;
    Ok(config)
}

/// Load the default embedded configuration
pub fn load_default_config() -> Result<LiveConfigFile, ConfigError> {
    let default_config = include_str!("live_config.json");
    load_config_from_str(default_config)
}

impl LiveConfigFile {
    /// Parsed endpoint URL
    pub fn endpoint_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.endpoint.url)
            .map_err(|e| ConfigError::Invalid(format!("endpoint.url: {}", e)))?;
        match url.scheme() {
            "ws" | "wss" => Ok(url),
            other => Err(ConfigError::Invalid(format!(
                "endpoint.url: expected ws or wss scheme, got {}",
                other
            ))),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.endpoint_url()?;
        if self.history.capacity == 0 {
            return Err(ConfigError::Invalid(
                "history.capacity must be positive".to_string(),
            ));
        }
        if self.reconnect.delay_ms == 0 {
            return Err(ConfigError::Invalid(
                "reconnect.delay_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_default_config() {
        let config = load_default_config().unwrap();
        assert_eq!(config.history.capacity, 200);
        assert_eq!(config.reconnect.delay_ms, 5_000);
        assert_eq!(config.endpoint.heartbeat_ms, 0);
    }

    #[test]
    fn test_embedded_default_matches_serde_defaults() {
        let embedded = load_default_config().unwrap();
        let empty = load_config_from_str("{}").unwrap();

        assert_eq!(embedded.endpoint.url, empty.endpoint.url);
        assert_eq!(embedded.endpoint.heartbeat_ms, empty.endpoint.heartbeat_ms);
        assert_eq!(embedded.endpoint.connect_timeout_ms, empty.endpoint.connect_timeout_ms);
        assert_eq!(embedded.reconnect.policy, empty.reconnect.policy);
        assert_eq!(embedded.reconnect.delay_ms, empty.reconnect.delay_ms);
        assert_eq!(embedded.history.capacity, empty.history.capacity);
    }

    #[test]
    fn test_rejects_http_url() {
        let result = load_config_from_str(r#"{ "endpoint": { "url": "http://localhost/ws" } }"#);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_zero_capacity() {
        let result = load_config_from_str(r#"{ "history": { "capacity": 0 } }"#);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_zero_delay() {
        let result = load_config_from_str(r#"{ "reconnect": { "delay_ms": 0 } }"#);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_missing_file() {
        let result = load_config("/nonexistent/live_config.json");
        assert!(matches!(result, Err(ConfigError::IoError(_))));
    }
}
