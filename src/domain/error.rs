use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppError {
    #[error("Error fetching formats: {0}")]
    FormatFetch(String),

    #[error("Error downloading file: {0}")]
    Download(String),
}
