use crate::api::{FormatDescriptor, FormatsResponse};

/// A fully received download, ready to be saved.
#[derive(Debug, Clone)]
pub struct DownloadedFile {
    pub filename: String,
    pub content_type: String,
    pub bytes: bytes::Bytes,
}

/// Ephemeral state of the window.
///
/// Discovery and download are tracked independently. Each keeps its own
/// generation: starting a discovery supersedes the previous discovery only,
/// starting a download the previous download only. Results tagged with an
/// older generation of their kind are stale and must not touch the state.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub media_url: String,
    pub title: String,
    pub thumbnail_url: String,
    pub formats: Vec<FormatDescriptor>,
    pub progress: u8,
    pub status_message: String,
    discovering: bool,
    downloading: bool,
    discovery_generation: u64,
    download_generation: u64,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            media_url: String::new(),
            title: String::new(),
            thumbnail_url: String::new(),
            formats: Vec::new(),
            progress: 0,
            status_message: "Paste a media URL and press Fetch".to_string(),
            discovering: false,
            downloading: false,
            discovery_generation: 0,
            download_generation: 0,
        }
    }
}

impl SessionState {
    pub fn loading(&self) -> bool {
        self.discovering || self.downloading
    }

    pub fn discovery_generation(&self) -> u64 {
        self.discovery_generation
    }

    pub fn download_generation(&self) -> u64 {
        self.download_generation
    }

    pub fn is_current_discovery(&self, generation: u64) -> bool {
        self.discovery_generation == generation
    }

    pub fn is_current_download(&self, generation: u64) -> bool {
        self.download_generation == generation
    }

    /// Trimmed URL, or `None` when there is nothing to act on.
    pub fn target_url(&self) -> Option<String> {
        let url = self.media_url.trim();
        (!url.is_empty()).then(|| url.to_string())
    }

    pub fn begin_discovery(&mut self) -> u64 {
        self.discovery_generation += 1;
        self.discovering = true;
        self.title.clear();
        self.thumbnail_url.clear();
        self.formats.clear();
        if !self.downloading {
            self.progress = 0;
        }
        self.status_message = "Fetching formats...".to_string();
        self.discovery_generation
    }

    pub fn apply_formats(&mut self, response: FormatsResponse) {
        self.title = response.title.unwrap_or_default();
        self.thumbnail_url = response.thumbnail.unwrap_or_default();
        self.formats = response.formats.unwrap_or_default();
        self.discovering = false;
        self.status_message = match self.formats.len() {
            0 => "No formats available".to_string(),
            1 => "1 format available".to_string(),
            n => format!("{} formats available", n),
        };
    }

    pub fn finish_discovery(&mut self, status_message: String) {
        self.discovering = false;
        self.status_message = status_message;
    }

    pub fn begin_download(&mut self, format_id: &str) -> u64 {
        self.download_generation += 1;
        self.downloading = true;
        self.progress = 0;
        self.status_message = format!("Requesting format {}...", format_id);
        self.download_generation
    }

    pub fn set_progress(&mut self, progress: u8) {
        self.progress = progress.min(100);
    }

    /// Download back to idle. Progress is left for `decay_progress`.
    pub fn finish_download(&mut self, status_message: String) {
        self.downloading = false;
        self.status_message = status_message;
    }

    pub fn decay_progress(&mut self) {
        self.progress = 0;
    }

    pub fn shows_progress(&self) -> bool {
        self.downloading && self.progress > 0
    }
}
