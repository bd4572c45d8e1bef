//! Application configuration management.
//!
//! This module handles loading configuration from environment variables.
//! It uses the `envy` crate to deserialize environment variables into a type-safe struct.

use serde::Deserialize;

use crate::services::rate_limit_service::RateLimitDefaults;

/// Configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (required): PostgreSQL connection string
/// - `DATABASE_MAX_CONNECTIONS` (optional): pool size, defaults to 5
/// - `DEFAULT_ROLE` (optional): role ensured at startup, defaults to `user`
/// - `DEFAULT_RATE_LIMIT` (optional): requests allowed when no rule exists, defaults to 100
/// - `DEFAULT_RATE_WINDOW_SEC` (optional): window for the default rule, defaults to 3600
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,

    #[serde(default = "default_max_connections")]
    pub database_max_connections: u32,

    #[serde(default = "default_role")]
    pub default_role: String,

    #[serde(default = "default_rate_limit")]
    pub default_rate_limit: i32,

    #[serde(default = "default_rate_window_sec")]
    pub default_rate_window_sec: i32,
}

fn default_max_connections() -> u32 {
    5
}

fn default_role() -> String {
    "user".to_string()
}

fn default_rate_limit() -> i32 {
    100
}

fn default_rate_window_sec() -> i32 {
    3600
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// A `.env` file is read first if present.
    ///
    /// # Errors
    ///
    /// Returns an error if `DATABASE_URL` is missing or a value cannot be
    /// parsed into its field type.
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();

        // Field names map to upper case: database_url -> DATABASE_URL
        envy::from_env::<Config>()
    }

    /// Rule applied to keys that have no stored rate limit.
    pub fn rate_limit_defaults(&self) -> RateLimitDefaults {
        RateLimitDefaults {
            limit: self.default_rate_limit,
            window_sec: self.default_rate_window_sec,
        }
    }
}
