use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use url::Url;

/// Response from the /formats endpoint
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FormatsResponse {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default, deserialize_with = "lenient_formats")]
    pub formats: Option<Vec<FormatDescriptor>>,
}

/// One downloadable variant of a media resource.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FormatDescriptor {
    #[serde(deserialize_with = "text_or_number")]
    pub id: String,
    #[serde(default)]
    pub ext: String,
    #[serde(default, deserialize_with = "optional_label")]
    pub resolution: Option<String>,
    #[serde(default, deserialize_with = "optional_size")]
    pub size: Option<u64>,
}

/// FastAPI error body
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorDetail {
    pub detail: String,
}

/// Configuration for the API client
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: Url,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub idle_timeout: Duration,
}

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse(DEFAULT_BASE_URL).expect("default base URL is valid"),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(60),
            idle_timeout: Duration::from_secs(60),
        }
    }
}

// A malformed entry drops that card only, not the whole listing.
fn lenient_formats<'de, D>(deserializer: D) -> Result<Option<Vec<FormatDescriptor>>, D::Error>
where
    D: Deserializer<'de>,
{
    let entries = match Option::<Vec<Value>>::deserialize(deserializer)? {
        Some(entries) => entries,
        None => return Ok(None),
    };

    let formats = entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value::<FormatDescriptor>(entry) {
            Ok(format) => Some(format),
            Err(e) => {
                warn!(error = %e, "skipping malformed format entry");
                None
            }
        })
        .collect();
    Ok(Some(formats))
}

// Backends send format ids as strings (yt-dlp) or integers (itags).
fn text_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(de::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}

fn optional_label<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) if !s.trim().is_empty() => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn optional_size<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f.round() as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}
