//! services/trainer/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::time::Duration;

use roleplay_training_core::DriverSettings;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Where staff and customer turns are generated.
#[derive(Clone, Debug, PartialEq)]
pub enum GeneratorBackend {
    /// The chat endpoints of the admin console.
    Endpoint {
        staff_url: String,
        customer_url: String,
        opening_url: String,
    },
    /// A chat-completion model called directly.
    OpenAi { api_key: String },
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    /// Absent means the in-memory store is used.
    pub database_url: Option<String>,
    pub log_level: Level,
    pub backend: GeneratorBackend,
    pub training_model: String,
    pub generation_timeout: Duration,
    pub max_turns: u32,
    pub settle_delay: Duration,
    pub step_delay: Duration,
    pub admin_token: Option<String>,
    pub cors_origin: String,
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
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| var(key).ok_or_else(|| ConfigError::MissingVar(key.to_string()));

        // --- Server and Database Settings ---
        let bind_address_str = var("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url = var("DATABASE_URL");

        let log_level_str = var("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Generation Backend ---
        let backend = match var("GENERATOR_BACKEND")
            .unwrap_or_else(|| "endpoint".to_string())
            .to_lowercase()
            .as_str()
        {
            "endpoint" => GeneratorBackend::Endpoint {
                staff_url: required("STAFF_ENDPOINT_URL")?,
                customer_url: required("CUSTOMER_ENDPOINT_URL")?,
                opening_url: required("OPENING_ENDPOINT_URL")?,
            },
            "openai" => GeneratorBackend::OpenAi {
                api_key: required("OPENAI_API_KEY")?,
            },
            other => {
                return Err(ConfigError::InvalidValue(
                    "GENERATOR_BACKEND".to_string(),
                    format!("'{}' is not one of endpoint, openai", other),
                ))
            }
        };
        let training_model = var("TRAINING_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string());
        let generation_timeout = Duration::from_secs(parse_or(&var, "GENERATION_TIMEOUT_SECS", 60)?);

        // --- Dialogue Pacing ---
        let max_turns = parse_or(&var, "MAX_TURNS", 8)?;
        let settle_delay = Duration::from_millis(parse_or(&var, "SETTLE_DELAY_MS", 1500)?);
        let step_delay = Duration::from_millis(parse_or(&var, "STEP_DELAY_MS", 2000)?);

        // --- Access ---
        let admin_token = var("ADMIN_TOKEN");
        let cors_origin = var("CORS_ORIGIN").unwrap_or_else(|| "http://localhost:3000".to_string());

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            backend,
            training_model,
            generation_timeout,
            max_turns,
            settle_delay,
            step_delay,
            admin_token,
            cors_origin,
        })
    }

    pub fn driver_settings(&self) -> DriverSettings {
        DriverSettings {
            max_turns: self.max_turns,
            settle_delay: self.settle_delay,
            step_delay: self.step_delay,
        }
    }
}

fn parse_or<T, F>(var: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string())),
        None => Ok(default),
    }
}
