use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use reqwest::header::{HeaderMap, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Client, Response};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use super::models::{ApiConfig, ErrorDetail, FormatsResponse};
use crate::utils::filename_from_content_disposition;

pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("{0}")]
    Server(String),

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    #[error("Invalid API address: {0}")]
    InvalidAddress(String),
}

pub type Result<T> = std::result::Result<T, ApiError>;

/// A successful /download response whose body can be read with progress.
pub struct StreamedDownload {
    pub filename: String,
    pub content_type: String,
    pub total: u64,
    pub stream: BoxStream<'static, Result<bytes::Bytes>>,
}

/// What to do with a successful /download response.
pub enum DownloadResponse {
    Streamed(StreamedDownload),
    /// Name or length unknown; let the system browser fetch this URL itself.
    Direct(Url),
}

#[derive(Clone)]
pub struct ApiClient {
    config: ApiConfig,
    http: Client,
}

impl ApiClient {
    pub fn new(config: ApiConfig) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// `{base}/{endpoint}?k=v...`, keeping any path prefix on the base.
    fn endpoint(&self, endpoint: &str, query: &[(&str, &str)]) -> Result<Url> {
        let mut url = self.config.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidAddress(self.config.base_url.to_string()))?
            .pop_if_empty()
            .push(endpoint);
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    /// Query the available formats of a media URL.
    pub async fn fetch_formats(&self, media_url: &str) -> Result<FormatsResponse> {
        let url = self.endpoint("formats", &[("url", media_url)])?;
        debug!(%url, "requesting formats");

        let response = self
            .http
            .get(url)
            .timeout(self.config.request_timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let message = match error_message(response).await {
                Some(detail) => format!("Failed to fetch formats: {}", detail),
                None => "Failed to fetch formats".to_string(),
            };
            warn!(%status, "formats request rejected");
            return Err(ApiError::Server(message));
        }

        let formats: FormatsResponse = response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("JSON decode error: {}", e)))?;

        info!(
            title = formats.title.as_deref().unwrap_or_default(),
            count = formats.formats.as_ref().map_or(0, Vec::len),
            "formats received"
        );
        Ok(formats)
    }

    /// Request a format and decide whether its body can be streamed with progress.
    pub async fn start_download(&self, media_url: &str, format_id: &str) -> Result<DownloadResponse> {
        let url = self.endpoint("download", &[("url", media_url), ("format_id", format_id)])?;
        debug!(%url, "requesting download");

        let response = self.http.get(url.clone()).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let message = error_message(response)
                .await
                .unwrap_or_else(|| "Download failed".to_string());
            warn!(%status, %message, "download request rejected");
            return Err(ApiError::Server(message));
        }

        let headers = response.headers();
        let filename = header_str(headers, CONTENT_DISPOSITION)
            .and_then(filename_from_content_disposition);
        let total = header_str(headers, CONTENT_LENGTH).and_then(|v| v.trim().parse::<u64>().ok());
        let content_type = header_str(headers, CONTENT_TYPE)
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();

        match (filename, total) {
            (Some(filename), Some(total)) => {
                debug!(%filename, total, %content_type, "streaming download body");
                let stream = response
                    .bytes_stream()
                    .map_err(ApiError::RequestError)
                    .boxed();
                Ok(DownloadResponse::Streamed(StreamedDownload {
                    filename,
                    content_type,
                    total,
                    stream,
                }))
            }
            (filename, total) => {
                info!(?filename, ?total, "headers insufficient for streaming, using direct download");
                Ok(DownloadResponse::Direct(url))
            }
        }
    }

    /// Fetch raw thumbnail bytes.
    pub async fn fetch_thumbnail(&self, thumbnail_url: &str) -> Result<bytes::Bytes> {
        let response = self
            .http
            .get(thumbnail_url)
            .timeout(self.config.request_timeout)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.bytes().await?)
    }
}

fn header_str(headers: &HeaderMap, name: reqwest::header::HeaderName) -> Option<&str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Error text from a failed response: FastAPI `detail` if present, else the body.
async fn error_message(response: Response) -> Option<String> {
    let body = response.text().await.ok()?;
    if let Ok(error) = serde_json::from_str::<ErrorDetail>(&body) {
        return Some(error.detail).filter(|d| !d.trim().is_empty());
    }
    Some(body).filter(|b| !b.trim().is_empty())
}
