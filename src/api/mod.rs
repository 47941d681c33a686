pub mod client;
pub mod models;

pub use client::{ApiClient, DownloadResponse, Result};
pub use models::{ApiConfig, FormatDescriptor, FormatsResponse};
