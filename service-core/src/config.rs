//! Environment-driven configuration helpers.
//!
//! Each service owns its concrete `Config` struct; these helpers cover the
//! shared read-from-env mechanics.

use crate::error::AppError;
use std::env;

/// Read a required environment variable.
pub fn require_env(key: &str) -> Result<String, AppError> {
    env::var(key).map_err(|_| AppError::ConfigError(anyhow::anyhow!("{} must be set", key)))
}

/// Read an environment variable with a fallback.
pub fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Read and parse an environment variable with a fallback.
pub fn env_parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
