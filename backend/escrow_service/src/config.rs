//! Application configuration loaded from environment variables.

use crate::errors::{Result, ServiceError};

#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database file
    pub database_url: String,
    /// Port for the REST API server
    pub api_port: u16,
    /// Base URL of the core-banking account service
    pub account_service_url: String,
    /// Per-request timeout for account service calls
    pub account_service_timeout_secs: u64,
    /// Locale used when a request carries no `x-locale` header
    pub default_locale: String,
    /// Optional JSON message bundle layered over the built-in English one
    pub messages_path: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            database_url: env_var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./escrow.db".to_string()),
            api_port: env_var("API_PORT")
                .unwrap_or_else(|_| "3002".to_string())
                .parse()
                .map_err(|_| ServiceError::Config("Invalid API_PORT".to_string()))?,
            account_service_url: env_var("ACCOUNT_SERVICE_URL")
                .map_err(|_| {
                    ServiceError::Config(
                        "ACCOUNT_SERVICE_URL environment variable is required".to_string(),
                    )
                })?
                .trim_end_matches('/')
                .to_string(),
            account_service_timeout_secs: env_var("ACCOUNT_SERVICE_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .map_err(|_| {
                    ServiceError::Config("Invalid ACCOUNT_SERVICE_TIMEOUT_SECS".to_string())
                })?,
            default_locale: env_var("DEFAULT_LOCALE").unwrap_or_else(|_| "en".to_string()),
            messages_path: env_var("MESSAGES_PATH").ok(),
        })
    }
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| ServiceError::Config(format!("Missing env var: {key}")))
}
