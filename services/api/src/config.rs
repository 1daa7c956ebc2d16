//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
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
    pub database_url: String,
    pub log_level: Level,
    /// Root directory for uploaded certificate files.
    pub media_root: PathBuf,
    /// Public base URL of this service, used to build the payment callback URLs.
    pub public_base_url: String,
    pub gateway_api_url: String,
    pub gateway_token: String,
    pub gateway_timeout_secs: u64,
    /// How long a charge (and the pending application behind it) stays valid.
    pub charge_ttl_hours: i64,
    /// Interval of the background task that garbage-collects expired
    /// pending applications.
    pub reaper_interval_secs: u64,
    /// Transactional-mail API; when unset, confirmations are only logged.
    pub mail_api_url: Option<String>,
    pub mail_api_token: Option<String>,
    pub mail_from: String,
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

        // --- Load Server and Database Settings ---
        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let media_root = std::env::var("MEDIA_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./media"));

        let public_base_url = std::env::var("PUBLIC_BASE_URL")
            .unwrap_or_else(|_| format!("http://{bind_address}"));

        // --- Load Payment Gateway Settings ---
        let gateway_api_url = std::env::var("GATEWAY_API_URL")
            .map_err(|_| ConfigError::MissingVar("GATEWAY_API_URL".to_string()))?;
        let gateway_token = std::env::var("GATEWAY_TOKEN")
            .map_err(|_| ConfigError::MissingVar("GATEWAY_TOKEN".to_string()))?;
        let gateway_timeout_secs = parse_var("GATEWAY_TIMEOUT_SECS", 15)?;
        let charge_ttl_hours = parse_var("CHARGE_TTL_HOURS", 24)?;
        let reaper_interval_secs = parse_var("REAPER_INTERVAL_SECS", 900)?;

        // --- Load Mail Settings (as optional) ---
        let mail_api_url = std::env::var("MAIL_API_URL").ok();
        let mail_api_token = std::env::var("MAIL_API_TOKEN").ok();
        let mail_from = std::env::var("MAIL_FROM")
            .unwrap_or_else(|_| "no-reply@scholarship.example".to_string());

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            media_root,
            public_base_url,
            gateway_api_url,
            gateway_token,
            gateway_timeout_secs,
            charge_ttl_hours,
            reaper_interval_secs,
            mail_api_url,
            mail_api_token,
            mail_from,
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue(name.to_string(), raw)),
        Err(_) => Ok(default),
    }
}
