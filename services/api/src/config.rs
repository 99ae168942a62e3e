//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub log_level: Level,
    pub cors_origin: String,
    pub openai_api_key: Option<String>,
    pub openai_base_url: Option<String>,
    pub query_model: String,
    pub engagement_model: String,
    pub contextual_model: String,
    pub default_learning_module: String,
    pub engagement_interval: Duration,
    pub default_sample_rate: u32,
    /// Longest voice recording accepted before it is stopped and sent.
    pub max_recording: Duration,
    pub seed_sample_chats: bool,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup.
    pub fn from_vars<F>(var: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let or_default = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());

        // --- Load Server Settings ---
        let bind_address_str = or_default("BIND_ADDRESS", "0.0.0.0:3000");
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let log_level_str = or_default("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let cors_origin = or_default("CORS_ORIGIN", "http://localhost:9002");

        // --- Load Model Provider Settings ---
        let openai_api_key = var("OPENAI_API_KEY");
        let openai_base_url = var("OPENAI_BASE_URL");
        let query_model = or_default("QUERY_MODEL", "gemini-2.0-flash");
        let engagement_model = or_default("ENGAGEMENT_MODEL", "gemini-2.0-flash");
        let contextual_model = or_default("CONTEXTUAL_MODEL", "gemini-2.0-flash");

        // --- Load Session Settings ---
        let default_learning_module = or_default("DEFAULT_LEARNING_MODULE", "General Studies");
        let engagement_interval_secs =
            parse_positive(&or_default("ENGAGEMENT_INTERVAL_SECS", "15"), "ENGAGEMENT_INTERVAL_SECS")?;
        let default_sample_rate =
            parse_positive(&or_default("DEFAULT_SAMPLE_RATE", "48000"), "DEFAULT_SAMPLE_RATE")?;
        let max_recording_secs =
            parse_positive(&or_default("MAX_RECORDING_SECS", "120"), "MAX_RECORDING_SECS")?;

        let seed_str = or_default("SEED_SAMPLE_CHATS", "true");
        let seed_sample_chats = seed_str.parse::<bool>().map_err(|_| {
            ConfigError::InvalidValue(
                "SEED_SAMPLE_CHATS".to_string(),
                format!("'{}' is not true or false", seed_str),
            )
        })?;

        Ok(Self {
            bind_address,
            log_level,
            cors_origin,
            openai_api_key,
            openai_base_url,
            query_model,
            engagement_model,
            contextual_model,
            default_learning_module,
            engagement_interval: Duration::from_secs(engagement_interval_secs.into()),
            default_sample_rate,
            max_recording: Duration::from_secs(max_recording_secs.into()),
            seed_sample_chats,
        })
    }

    /// The model provider key, which the server cannot start without.
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.openai_api_key
            .as_deref()
            .ok_or_else(|| ConfigError::MissingVar("OPENAI_API_KEY".to_string()))
    }
}

fn parse_positive(value: &str, key: &str) -> Result<u32, ConfigError> {
    match value.parse::<u32>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::InvalidValue(
            key.to_string(),
            format!("'{}' is not a positive integer", value),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_with(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_vars(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = config_with(&[]).unwrap();
        assert_eq!(config.bind_address, "0.0.0.0:3000".parse().unwrap());
        assert_eq!(config.log_level, Level::INFO);
        assert_eq!(config.engagement_interval, Duration::from_secs(15));
        assert_eq!(config.default_sample_rate, 48_000);
        assert_eq!(config.max_recording, Duration::from_secs(120));
        assert!(config.seed_sample_chats);
        assert!(matches!(
            config.require_api_key(),
            Err(ConfigError::MissingVar(ref key)) if key == "OPENAI_API_KEY"
        ));
    }

    #[test]
    fn explicit_values_override_defaults() {
        let config = config_with(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("ENGAGEMENT_INTERVAL_SECS", "5"),
            ("MAX_RECORDING_SECS", "30"),
            ("SEED_SAMPLE_CHATS", "false"),
            ("RUST_LOG", "debug"),
        ])
        .unwrap();
        assert_eq!(config.require_api_key().unwrap(), "sk-test");
        assert_eq!(config.engagement_interval, Duration::from_secs(5));
        assert_eq!(config.max_recording, Duration::from_secs(30));
        assert!(!config.seed_sample_chats);
        assert_eq!(config.log_level, Level::DEBUG);
    }

    #[test]
    fn invalid_values_are_reported_by_name() {
        for (key, value) in [
            ("BIND_ADDRESS", "not-an-address"),
            ("RUST_LOG", "chatty"),
            ("ENGAGEMENT_INTERVAL_SECS", "0"),
            ("DEFAULT_SAMPLE_RATE", "-1"),
            ("SEED_SAMPLE_CHATS", "maybe"),
        ] {
            match config_with(&[(key, value)]) {
                Err(ConfigError::InvalidValue(name, _)) => assert_eq!(name, key),
                other => panic!("{key}={value} should be invalid, got {other:?}"),
            }
        }
    }
}
