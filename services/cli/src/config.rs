use reqwest::Url;
use std::time::Duration;
use tracing::Level;

const DEFAULT_ENDPOINT: &str = "/api/connection-details";
const DEFAULT_ORIGIN: &str = "http://localhost:3000";

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    /// Absolute connection-details endpoint (directory and credentials).
    pub connection_endpoint: Url,
    pub request_timeout: Duration,
    pub noise_filter: bool,
    pub allow_default_room: bool,
    pub log_level: Level,
}

fn parse_bool(var: &str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(var) {
        Err(_) => Ok(default),
        Ok(value) => match value.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue(
                var.to_string(),
                format!("'{}' is not a boolean", value),
            )),
        },
    }
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let origin_str = std::env::var("APP_ORIGIN").unwrap_or_else(|_| DEFAULT_ORIGIN.to_string());
        let origin = Url::parse(&origin_str)
            .map_err(|e| ConfigError::InvalidValue("APP_ORIGIN".to_string(), e.to_string()))?;

        // Relative endpoints resolve against the origin; absolute ones replace it.
        let endpoint_str = std::env::var("CONN_DETAILS_ENDPOINT")
            .unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string());
        let connection_endpoint = origin.join(&endpoint_str).map_err(|e| {
            ConfigError::InvalidValue("CONN_DETAILS_ENDPOINT".to_string(), e.to_string())
        })?;

        let timeout_str = std::env::var("REQUEST_TIMEOUT_SECS").unwrap_or_else(|_| "10".to_string());
        let request_timeout = timeout_str
            .parse::<u64>()
            .ok()
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "REQUEST_TIMEOUT_SECS".to_string(),
                    format!("'{}' is not a positive number of seconds", timeout_str),
                )
            })?;

        let noise_filter = parse_bool("NOISE_FILTER", true)?;
        let allow_default_room = parse_bool("ALLOW_DEFAULT_ROOM", false)?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            connection_endpoint,
            request_timeout,
            noise_filter,
            allow_default_room,
            log_level,
        })
    }
}
