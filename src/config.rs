//! Startup configuration, read once from the environment.

use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::api::ApiConfig;

pub const API_URL_VAR: &str = "MEDIA_API_URL";
pub const CONNECT_TIMEOUT_VAR: &str = "MEDIA_API_CONNECT_TIMEOUT";
pub const REQUEST_TIMEOUT_VAR: &str = "MEDIA_API_REQUEST_TIMEOUT";
pub const IDLE_TIMEOUT_VAR: &str = "MEDIA_API_IDLE_TIMEOUT";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} is not a valid http(s) address: {value}")]
    InvalidUrl { var: &'static str, value: String },

    #[error("{var} must be a positive number of seconds, got {value:?}")]
    InvalidTimeout { var: &'static str, value: String },
}

/// Build the API configuration from the process environment.
/// `.env` must already have been loaded.
pub fn load() -> Result<ApiConfig, ConfigError> {
    from_lookup(|key| std::env::var(key).ok())
}

pub fn from_lookup<F>(lookup: F) -> Result<ApiConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let defaults = ApiConfig::default();
    let value = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    let base_url = match value(API_URL_VAR) {
        Some(raw) => parse_base_url(&raw)?,
        None => defaults.base_url.clone(),
    };

    let seconds = |var: &'static str, default: Duration| -> Result<Duration, ConfigError> {
        match value(var) {
            None => Ok(default),
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
                _ => Err(ConfigError::InvalidTimeout { var, value: raw }),
            },
        }
    };

    Ok(ApiConfig {
        base_url,
        connect_timeout: seconds(CONNECT_TIMEOUT_VAR, defaults.connect_timeout)?,
        request_timeout: seconds(REQUEST_TIMEOUT_VAR, defaults.request_timeout)?,
        idle_timeout: seconds(IDLE_TIMEOUT_VAR, defaults.idle_timeout)?,
    })
}

fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let invalid = || ConfigError::InvalidUrl {
        var: API_URL_VAR,
        value: raw.to_string(),
    };
    let url = Url::parse(raw.trim()).map_err(|_| invalid())?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        _ => Err(invalid()),
    }
}
