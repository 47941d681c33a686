use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::BytesMut;
use futures::{stream::BoxStream, StreamExt};
use iced::widget::image;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    api::{ApiClient, DownloadResponse, FormatsResponse},
    domain::{AppError, DownloadedFile},
    utils::{progress_percent, sanitize_filename},
};

// Upper bound for the up-front buffer reservation; a lying Content-Length
// must not allocate gigabytes before the first byte arrives.
const MAX_PREALLOCATION: u64 = 64 * 1024 * 1024;

#[derive(Debug, Clone)]
pub enum DownloadEvent {
    Started { filename: String, total: u64 },
    Progress(u8),
    Fetched(DownloadedFile),
    /// The system browser has to fetch this URL itself.
    Direct(Url),
    Failed(AppError),
}

#[derive(Clone)]
pub struct DownloadCoordinator {
    api_client: ApiClient,
}

impl DownloadCoordinator {
    pub fn new(api_client: ApiClient) -> Self {
        Self { api_client }
    }

    pub async fn discover_formats(&self, media_url: String) -> Result<FormatsResponse, AppError> {
        self.api_client
            .fetch_formats(&media_url)
            .await
            .map_err(|e| AppError::FormatFetch(e.to_string()))
    }

    pub async fn load_thumbnail(&self, thumbnail_url: String) -> Result<image::Handle, String> {
        let data = self
            .api_client
            .fetch_thumbnail(&thumbnail_url)
            .await
            .map_err(|e| e.to_string())?;

        let rgba = ::image::load_from_memory(&data)
            .map_err(|e| format!("Failed to decode thumbnail: {}", e))?
            .to_rgba8();
        let (width, height) = rgba.dimensions();
        Ok(image::Handle::from_rgba(width, height, rgba.into_raw()))
    }

    pub async fn save_file(file: DownloadedFile) -> Result<Option<PathBuf>, AppError> {
        let mut suggested = sanitize_filename(&file.filename);
        if suggested.is_empty() {
            suggested = "download".to_string();
        }

        let mut dialog = rfd::AsyncFileDialog::new().set_file_name(&suggested);
        if let Some(ext) = Path::new(&suggested).extension().and_then(|e| e.to_str()) {
            dialog = dialog.add_filter(&file.content_type, &[ext]);
        }

        let Some(handle) = dialog.save_file().await else {
            return Ok(None);
        };
        let path = handle.path().to_path_buf();

        tokio::fs::write(&path, &file.bytes).await.map_err(|e| {
            AppError::Download(format!("Failed to write {}: {}", path.display(), e))
        })?;

        info!(path = %path.display(), bytes = file.bytes.len(), "download saved");
        Ok(Some(path))
    }

    pub fn open_direct(url: &Url) -> Result<(), AppError> {
        info!(%url, "handing download to the system browser");
        open::that_detached(url.as_str())
            .map_err(|e| AppError::Download(format!("Failed to open browser: {}", e)))
    }

    pub fn download_stream(
        &self,
        media_url: String,
        format_id: String,
    ) -> BoxStream<'static, DownloadEvent> {
        futures::stream::unfold(
            DownloadRuntimeState::Start {
                client: self.api_client.clone(),
                media_url,
                format_id,
            },
            |state| async move {
                match state {
                    DownloadRuntimeState::Start {
                        client,
                        media_url,
                        format_id,
                    } => {
                        let idle_timeout = client.config().idle_timeout;
                        match client.start_download(&media_url, &format_id).await {
                            Ok(DownloadResponse::Streamed(download)) => Some((
                                DownloadEvent::Started {
                                    filename: download.filename.clone(),
                                    total: download.total,
                                },
                                DownloadRuntimeState::Downloading {
                                    buffer: BytesMut::with_capacity(
                                        download.total.min(MAX_PREALLOCATION) as usize,
                                    ),
                                    stream: download.stream,
                                    received: 0,
                                    total: download.total,
                                    filename: download.filename,
                                    content_type: download.content_type,
                                    idle_timeout,
                                },
                            )),
                            Ok(DownloadResponse::Direct(url)) => {
                                Some((DownloadEvent::Direct(url), DownloadRuntimeState::Finished))
                            }
                            Err(e) => Some((
                                DownloadEvent::Failed(AppError::Download(e.to_string())),
                                DownloadRuntimeState::Finished,
                            )),
                        }
                    }
                    DownloadRuntimeState::Downloading {
                        mut buffer,
                        mut stream,
                        mut received,
                        total,
                        filename,
                        content_type,
                        idle_timeout,
                    } => match tokio::time::timeout(idle_timeout, stream.next()).await {
                        Ok(Some(Ok(chunk))) => {
                            buffer.extend_from_slice(&chunk);
                            received += chunk.len() as u64;

                            Some((
                                DownloadEvent::Progress(progress_percent(received, total)),
                                DownloadRuntimeState::Downloading {
                                    buffer,
                                    stream,
                                    received,
                                    total,
                                    filename,
                                    content_type,
                                    idle_timeout,
                                },
                            ))
                        }
                        Ok(Some(Err(e))) => Some((
                            DownloadEvent::Failed(AppError::Download(e.to_string())),
                            DownloadRuntimeState::Finished,
                        )),
                        Ok(None) => {
                            if received != total {
                                warn!(received, total, "body length differs from Content-Length");
                            }
                            debug!(%filename, received, "download body complete");
                            Some((
                                DownloadEvent::Progress(100),
                                DownloadRuntimeState::Complete(DownloadedFile {
                                    filename,
                                    content_type,
                                    bytes: buffer.freeze(),
                                }),
                            ))
                        }
                        Err(_) => Some((
                            DownloadEvent::Failed(AppError::Download(format!(
                                "No data received for {:?}",
                                idle_timeout
                            ))),
                            DownloadRuntimeState::Finished,
                        )),
                    },
                    DownloadRuntimeState::Complete(file) => {
                        Some((DownloadEvent::Fetched(file), DownloadRuntimeState::Finished))
                    }
                    DownloadRuntimeState::Finished => None,
                }
            },
        )
        .boxed()
    }
}

enum DownloadRuntimeState {
    Start {
        client: ApiClient,
        media_url: String,
        format_id: String,
    },
    Downloading {
        buffer: BytesMut,
        stream: BoxStream<'static, crate::api::Result<bytes::Bytes>>,
        received: u64,
        total: u64,
        filename: String,
        content_type: String,
        idle_timeout: Duration,
    },
    Complete(DownloadedFile),
    Finished,
}
