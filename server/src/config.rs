//! Server configuration module.
//!
//! Parses configuration from environment variables for the OBEX server.
//!
//! # Environment Variables
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `PORT` | No | 8080 | HTTP server port |
//! | `OBEX_DATABASE_PATH` | No | `obex.db` | SQLite database file path |
//! | `OBEX_MQTT_HOST` | No | `localhost` | MQTT broker host |
//! | `OBEX_MQTT_PORT` | No | 1883 | MQTT broker port |
//! | `OBEX_MQTT_USERNAME` | No | - | Broker username (requires password) |
//! | `OBEX_MQTT_PASSWORD` | No | - | Broker password (requires username) |
//! | `OBEX_MQTT_TOPIC` | No | `obex/alerts` | Topic carrying inbound alerts |
//! | `OBEX_MQTT_DISABLED` | No | false | Skip starting the bus adapter (dev only) |
//! | `OBEX_CACHE_PREFIX` | No | `obex` | Namespace prefix for cache keys |
//! | `OBEX_CACHE_TTL_SECS` | No | 3600 | Default cache entry time-to-live |

use std::env;

use thiserror::Error;

/// Default HTTP server port.
const DEFAULT_PORT: u16 = 8080;

/// Default SQLite database path.
const DEFAULT_DATABASE_PATH: &str = "obex.db";

/// Default MQTT broker host.
const DEFAULT_MQTT_HOST: &str = "localhost";

/// Default MQTT broker port.
const DEFAULT_MQTT_PORT: u16 = 1883;

/// Default MQTT topic for inbound alerts.
const DEFAULT_MQTT_TOPIC: &str = "obex/alerts";

/// Default cache key namespace.
const DEFAULT_CACHE_PREFIX: &str = "obex";

/// Default cache TTL in seconds (1 hour).
const DEFAULT_CACHE_TTL_SECS: u64 = 3600;

/// Errors that can occur when parsing configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Environment variable has invalid format.
    #[error("invalid value for {var}: {message}")]
    InvalidValue { var: String, message: String },

    /// Configuration validation failed.
    #[error("configuration validation failed: {0}")]
    ValidationError(String),
}

/// MQTT broker connection settings.
#[derive(Debug, Clone)]
pub struct MqttSettings {
    /// Broker hostname.
    pub host: String,

    /// Broker port.
    pub port: u16,

    /// Optional username (must be paired with a password).
    pub username: Option<String>,

    /// Optional password (must be paired with a username).
    pub password: Option<String>,

    /// Topic the bus adapter subscribes to.
    pub topic: String,

    /// When true, the bus adapter is not started.
    pub disabled: bool,
}

/// Server configuration parsed from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port.
    pub port: u16,

    /// SQLite database file path.
    pub database_path: String,

    /// MQTT broker settings.
    pub mqtt: MqttSettings,

    /// Namespace prefix for cache keys.
    pub cache_prefix: String,

    /// Default cache entry TTL in seconds.
    pub cache_ttl_secs: u64,
}

impl Config {
    /// Parse configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a numeric variable fails to parse or if
    /// only one of `OBEX_MQTT_USERNAME`/`OBEX_MQTT_PASSWORD` is set.
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = parse_u16("PORT", DEFAULT_PORT)?;
        let database_path =
            env::var("OBEX_DATABASE_PATH").unwrap_or_else(|_| DEFAULT_DATABASE_PATH.to_string());

        let mqtt = MqttSettings {
            host: env::var("OBEX_MQTT_HOST").unwrap_or_else(|_| DEFAULT_MQTT_HOST.to_string()),
            port: parse_u16("OBEX_MQTT_PORT", DEFAULT_MQTT_PORT)?,
            username: env::var("OBEX_MQTT_USERNAME").ok().filter(|s| !s.is_empty()),
            password: env::var("OBEX_MQTT_PASSWORD").ok().filter(|s| !s.is_empty()),
            topic: env::var("OBEX_MQTT_TOPIC").unwrap_or_else(|_| DEFAULT_MQTT_TOPIC.to_string()),
            disabled: parse_bool_env("OBEX_MQTT_DISABLED"),
        };

        let cache_prefix =
            env::var("OBEX_CACHE_PREFIX").unwrap_or_else(|_| DEFAULT_CACHE_PREFIX.to_string());
        let cache_ttl_secs = parse_u64("OBEX_CACHE_TTL_SECS", DEFAULT_CACHE_TTL_SECS)?;

        let config = Self {
            port,
            database_path,
            mqtt,
            cache_prefix,
            cache_ttl_secs,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.mqtt.username.is_some() != self.mqtt.password.is_some() {
            return Err(ConfigError::ValidationError(
                "OBEX_MQTT_USERNAME and OBEX_MQTT_PASSWORD must be set together".to_string(),
            ));
        }

        if self.mqtt.topic.is_empty() {
            return Err(ConfigError::ValidationError(
                "OBEX_MQTT_TOPIC must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// Parse a boolean environment variable.
///
/// Returns `true` only if the variable is set to "true" (case-insensitive).
fn parse_bool_env(name: &str) -> bool {
    env::var(name)
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Parse a u16 environment variable, falling back to `default` when unset.
fn parse_u16(name: &str, default: u16) -> Result<u16, ConfigError> {
    match env::var(name) {
        Ok(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
            var: name.to_string(),
            message: format!("'{value}' is not a valid port number"),
        }),
        Err(_) => Ok(default),
    }
}

/// Parse a u64 environment variable, falling back to `default` when unset.
fn parse_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    match env::var(name) {
        Ok(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
            var: name.to_string(),
            message: format!("'{value}' is not a valid integer"),
        }),
        Err(_) => Ok(default),
    }
}
