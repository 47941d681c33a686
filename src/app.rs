use std::path::PathBuf;
use std::time::Duration;

use iced::task;
use iced::widget::image;
use iced::Task;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::api::{ApiClient, FormatsResponse};
use crate::application::{DownloadCoordinator, DownloadEvent};
use crate::domain::AppError;
use crate::ui::{MediaView, UiMessage};

/// Delay before a finished download's progress falls back to zero.
pub const PROGRESS_DECAY: Duration = Duration::from_millis(600);

pub struct MediaApp {
    view: MediaView,
    coordinator: DownloadCoordinator,
    discovery_task: TaskSlot,
    download_task: TaskSlot,
}

impl MediaApp {
    pub fn new(api_client: ApiClient) -> Self {
        Self {
            view: MediaView::default(),
            coordinator: DownloadCoordinator::new(api_client),
            discovery_task: TaskSlot::default(),
            download_task: TaskSlot::default(),
        }
    }
}

/// The in-flight task of one action kind.
#[derive(Default)]
struct TaskSlot(Option<task::Handle>);

impl TaskSlot {
    /// Track `task`, aborting whatever this slot was running before.
    fn start(&mut self, task: Task<Message>) -> Task<Message> {
        let (task, handle) = task.abortable();
        self.replace(handle);
        task
    }

    /// Store `handle` and return the previous one, already aborted.
    fn replace(&mut self, handle: task::Handle) -> Option<task::Handle> {
        let previous = self.0.replace(handle)?;
        previous.abort();
        Some(previous)
    }

    fn clear(&mut self) {
        self.0 = None;
    }
}

/// Results from background work carry the generation that started them.
#[derive(Debug, Clone)]
pub enum Message {
    UiMessage(UiMessage),
    FormatsFetched(u64, Result<FormatsResponse, AppError>),
    ThumbnailLoaded(u64, Result<image::Handle, String>),
    Download(u64, DownloadEvent),
    DirectOpened(u64, Result<(), AppError>),
    /// `None` when the save dialog was cancelled
    DownloadSaved(u64, Result<Option<PathBuf>, AppError>),
    ProgressDecayed(u64),
    AlertDismissed,
}

pub fn update(app: &mut MediaApp, message: Message) -> Task<Message> {
    match message {
        Message::UiMessage(ui_msg) => {
            app.view.update(ui_msg.clone());

            match ui_msg {
                UiMessage::FetchPressed => return start_discovery(app),
                UiMessage::DownloadPressed(format_id) => return start_download(app, format_id),
                UiMessage::UrlChanged(_) => {}
            }
        }
        Message::FormatsFetched(generation, result) => {
            if !app.view.session.is_current_discovery(generation) {
                debug!(
                    generation,
                    current = app.view.session.discovery_generation(),
                    "discarding stale formats response"
                );
                return Task::none();
            }

            match result {
                Ok(response) => {
                    app.view.session.apply_formats(response);

                    let thumbnail_url = app.view.session.thumbnail_url.clone();
                    if thumbnail_url.is_empty() {
                        app.discovery_task.clear();
                    } else {
                        let coordinator = app.coordinator.clone();
                        return app.discovery_task.start(Task::perform(
                            async move { coordinator.load_thumbnail(thumbnail_url).await },
                            move |result| Message::ThumbnailLoaded(generation, result),
                        ));
                    }
                }
                Err(e) => {
                    app.discovery_task.clear();
                    error!(generation, error = %e, "format discovery failed");
                    let message = e.to_string();
                    app.view.session.finish_discovery(message.clone());
                    return alert(message);
                }
            }
        }
        Message::ThumbnailLoaded(generation, result) => {
            if !app.view.session.is_current_discovery(generation) {
                return Task::none();
            }
            app.discovery_task.clear();
            match result {
                Ok(handle) => app.view.thumbnail = Some(handle),
                Err(e) => warn!(error = %e, "thumbnail unavailable"),
            }
        }
        Message::Download(generation, event) => {
            if !app.view.session.is_current_download(generation) {
                info!(
                    generation,
                    current = app.view.session.download_generation(),
                    "ignoring event of a replaced download"
                );
                return Task::none();
            }
            return on_download_event(app, generation, event);
        }
        Message::DirectOpened(generation, result) => {
            if !app.view.session.is_current_download(generation) {
                return Task::none();
            }
            match result {
                Ok(()) => {
                    return finish_download(
                        app,
                        generation,
                        "Download handed to the browser".to_string(),
                    )
                }
                Err(e) => return fail_download(app, generation, e),
            }
        }
        Message::DownloadSaved(generation, result) => {
            if !app.view.session.is_current_download(generation) {
                if let Ok(Some(path)) = &result {
                    info!(path = %path.display(), "replaced download was still saved");
                }
                return Task::none();
            }
            match result {
                Ok(Some(path)) => {
                    return finish_download(app, generation, format!("Saved: {}", path.display()))
                }
                Ok(None) => {
                    return finish_download(app, generation, "Save cancelled".to_string())
                }
                Err(e) => return fail_download(app, generation, e),
            }
        }
        Message::ProgressDecayed(generation) => {
            if app.view.session.is_current_download(generation) {
                app.view.session.decay_progress();
            }
        }
        Message::AlertDismissed => {}
    }
    Task::none()
}

pub fn view(app: &MediaApp) -> iced::Element<'_, Message> {
    app.view.view().map(Message::UiMessage)
}

fn start_discovery(app: &mut MediaApp) -> Task<Message> {
    let Some(media_url) = app.view.session.target_url() else {
        return Task::none();
    };

    let generation = app.view.session.begin_discovery();
    app.view.thumbnail = None;
    info!(%media_url, generation, "fetching formats");

    let coordinator = app.coordinator.clone();
    app.discovery_task.start(Task::perform(
        async move { coordinator.discover_formats(media_url).await },
        move |result| Message::FormatsFetched(generation, result),
    ))
}

fn start_download(app: &mut MediaApp, format_id: String) -> Task<Message> {
    let Some(media_url) = app.view.session.target_url() else {
        return Task::none();
    };

    let generation = app.view.session.begin_download(&format_id);
    info!(%media_url, %format_id, generation, "starting download");

    let stream = app.coordinator.download_stream(media_url, format_id);
    app.download_task
        .start(Task::stream(stream).map(move |event| Message::Download(generation, event)))
}

fn on_download_event(app: &mut MediaApp, generation: u64, event: DownloadEvent) -> Task<Message> {
    match event {
        DownloadEvent::Started { filename, total } => {
            app.view.session.status_message = format!("Downloading {} ({} bytes)", filename, total);
        }
        DownloadEvent::Progress(progress) => {
            app.view.session.set_progress(progress);
        }
        DownloadEvent::Fetched(file) => {
            app.download_task.clear();
            app.view.session.status_message = format!("Choose where to save {}...", file.filename);
            return Task::perform(DownloadCoordinator::save_file(file), move |result| {
                Message::DownloadSaved(generation, result)
            });
        }
        DownloadEvent::Direct(url) => {
            app.download_task.clear();
            return open_direct(generation, url);
        }
        DownloadEvent::Failed(e) => {
            app.download_task.clear();
            return fail_download(app, generation, e);
        }
    }
    Task::none()
}

fn open_direct(generation: u64, url: Url) -> Task<Message> {
    Task::perform(
        async move { DownloadCoordinator::open_direct(&url) },
        move |result| Message::DirectOpened(generation, result),
    )
}

/// Download back to idle, then let the progress bar decay.
fn finish_download(app: &mut MediaApp, generation: u64, status_message: String) -> Task<Message> {
    info!(generation, status = %status_message, "download finished");
    app.view.session.finish_download(status_message);
    Task::perform(
        async move { tokio::time::sleep(PROGRESS_DECAY).await },
        move |_| Message::ProgressDecayed(generation),
    )
}

fn fail_download(app: &mut MediaApp, generation: u64, e: AppError) -> Task<Message> {
    error!(generation, error = %e, "download failed");
    let message = e.to_string();
    Task::batch([
        finish_download(app, generation, message.clone()),
        alert(message),
    ])
}

fn alert(message: String) -> Task<Message> {
    Task::perform(
        async move {
            rfd::AsyncMessageDialog::new()
                .set_level(rfd::MessageLevel::Error)
                .set_title("Universal Media Downloader")
                .set_description(message)
                .set_buttons(rfd::MessageButtons::Ok)
                .show()
                .await;
        },
        |_| Message::AlertDismissed,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiConfig, FormatDescriptor};
    use crate::domain::DownloadedFile;
    use crate::ui::card_lines;

    fn app() -> MediaApp {
        MediaApp::new(ApiClient::new(ApiConfig::default()).unwrap())
    }

    fn press(app: &mut MediaApp, ui_msg: UiMessage) {
        let _ = update(app, Message::UiMessage(ui_msg));
    }

    fn thumbnail() -> image::Handle {
        image::Handle::from_rgba(1, 1, vec![0u8, 0, 0, 255])
    }

    #[test]
    fn test_fetch_ignores_empty_url() {
        let mut app = app();
        press(&mut app, UiMessage::FetchPressed);
        assert!(!app.view.session.loading());
        assert_eq!(app.view.session.discovery_generation(), 0);
    }

    #[test]
    fn test_discovery_shows_title_and_cards() {
        let mut app = app();
        press(&mut app, UiMessage::UrlChanged("https://example.com/v".to_string()));
        press(&mut app, UiMessage::FetchPressed);
        assert!(app.view.session.loading());

        let generation = app.view.session.discovery_generation();
        let response = FormatsResponse {
            title: Some("Demo".to_string()),
            thumbnail: None,
            formats: Some(vec![FormatDescriptor {
                id: "1".to_string(),
                ext: "mp4".to_string(),
                resolution: None,
                size: Some(2_097_152),
            }]),
        };
        let _ = update(&mut app, Message::FormatsFetched(generation, Ok(response)));

        let session = &app.view.session;
        assert!(!session.loading());
        assert_eq!(session.title, "Demo");
        assert_eq!(session.formats.len(), 1);
        assert_eq!(card_lines(&session.formats[0])[2], "Size: 2.00 MB");
    }

    #[test]
    fn test_discovery_failure_leaves_state_cleared() {
        let mut app = app();
        app.view.session.title = "Old".to_string();
        press(&mut app, UiMessage::UrlChanged("https://example.com/v".to_string()));
        press(&mut app, UiMessage::FetchPressed);

        let generation = app.view.session.discovery_generation();
        let err = AppError::FormatFetch("Failed to fetch formats".to_string());
        let _ = update(&mut app, Message::FormatsFetched(generation, Err(err)));

        let session = &app.view.session;
        assert!(!session.loading());
        assert!(session.title.is_empty());
        assert!(session.formats.is_empty());
        assert_eq!(
            session.status_message,
            "Error fetching formats: Failed to fetch formats"
        );
    }

    #[test]
    fn test_stale_formats_are_discarded() {
        let mut app = app();
        press(&mut app, UiMessage::UrlChanged("https://example.com/a".to_string()));
        press(&mut app, UiMessage::FetchPressed);
        let stale = app.view.session.discovery_generation();
        press(&mut app, UiMessage::FetchPressed);

        let response = FormatsResponse {
            title: Some("Stale".to_string()),
            ..FormatsResponse::default()
        };
        let _ = update(&mut app, Message::FormatsFetched(stale, Ok(response)));

        assert!(app.view.session.loading());
        assert!(app.view.session.title.is_empty());
    }

    #[test]
    fn test_streamed_download_lifecycle() {
        let mut app = app();
        press(&mut app, UiMessage::UrlChanged("https://example.com/v".to_string()));
        press(&mut app, UiMessage::DownloadPressed("1".to_string()));
        let generation = app.view.session.download_generation();
        assert!(app.view.session.loading());
        assert_eq!(app.view.session.progress, 0);

        for event in [
            DownloadEvent::Started {
                filename: "clip.mp4".to_string(),
                total: 10,
            },
            DownloadEvent::Progress(50),
            DownloadEvent::Progress(100),
        ] {
            let _ = update(&mut app, Message::Download(generation, event));
        }
        assert!(app.view.session.shows_progress());
        assert_eq!(app.view.session.progress, 100);

        let file = DownloadedFile {
            filename: "clip.mp4".to_string(),
            content_type: "video/mp4".to_string(),
            bytes: bytes::Bytes::from_static(b"0123456789"),
        };
        let _ = update(&mut app, Message::Download(generation, DownloadEvent::Fetched(file)));
        assert!(app.view.session.loading());

        let saved = PathBuf::from("/tmp/clip.mp4");
        let _ = update(&mut app, Message::DownloadSaved(generation, Ok(Some(saved))));
        assert!(!app.view.session.loading());
        assert_eq!(app.view.session.progress, 100);
        assert_eq!(app.view.session.status_message, "Saved: /tmp/clip.mp4");

        let _ = update(&mut app, Message::ProgressDecayed(generation));
        assert_eq!(app.view.session.progress, 0);
    }

    #[test]
    fn test_download_failure_reports_server_text() {
        let mut app = app();
        press(&mut app, UiMessage::UrlChanged("https://example.com/v".to_string()));
        press(&mut app, UiMessage::DownloadPressed("1".to_string()));
        let generation = app.view.session.download_generation();

        let err = AppError::Download("not found".to_string());
        let _ = update(&mut app, Message::Download(generation, DownloadEvent::Failed(err)));

        assert!(!app.view.session.loading());
        assert!(app.view.session.status_message.contains("not found"));
        let _ = update(&mut app, Message::ProgressDecayed(generation));
        assert_eq!(app.view.session.progress, 0);
    }

    #[test]
    fn test_direct_download_keeps_progress_at_zero() {
        let mut app = app();
        press(&mut app, UiMessage::UrlChanged("https://example.com/v".to_string()));
        press(&mut app, UiMessage::DownloadPressed("1".to_string()));
        let generation = app.view.session.download_generation();

        let url = Url::parse("http://localhost:8000/download?url=x&format_id=1").unwrap();
        let _ = update(&mut app, Message::Download(generation, DownloadEvent::Direct(url)));
        assert_eq!(app.view.session.progress, 0);

        let _ = update(&mut app, Message::DirectOpened(generation, Ok(())));
        assert!(!app.view.session.loading());
        assert_eq!(app.view.session.progress, 0);
    }

    #[test]
    fn test_stale_decay_keeps_newer_progress() {
        let mut app = app();
        press(&mut app, UiMessage::UrlChanged("https://example.com/v".to_string()));
        press(&mut app, UiMessage::DownloadPressed("1".to_string()));
        let first = app.view.session.download_generation();
        let _ = update(&mut app, Message::DownloadSaved(first, Ok(None)));

        press(&mut app, UiMessage::DownloadPressed("2".to_string()));
        let second = app.view.session.download_generation();
        let _ = update(&mut app, Message::Download(second, DownloadEvent::Progress(30)));

        let _ = update(&mut app, Message::ProgressDecayed(first));
        assert_eq!(app.view.session.progress, 30);
        assert!(app.view.session.shows_progress());
    }

    #[test]
    fn test_fetch_during_download_keeps_download_intact() {
        let mut app = app();
        press(&mut app, UiMessage::UrlChanged("https://example.com/v".to_string()));
        press(&mut app, UiMessage::DownloadPressed("1".to_string()));
        let download = app.view.session.download_generation();
        let _ = update(&mut app, Message::Download(download, DownloadEvent::Progress(50)));

        press(&mut app, UiMessage::FetchPressed);
        let discovery = app.view.session.discovery_generation();
        let _ = update(
            &mut app,
            Message::FormatsFetched(discovery, Ok(FormatsResponse::default())),
        );
        // Discovery is done; the bar still belongs to the running download.
        assert!(app.view.session.loading());
        assert!(app.view.session.shows_progress());

        let _ = update(&mut app, Message::Download(download, DownloadEvent::Progress(100)));
        let file = DownloadedFile {
            filename: "clip.mp4".to_string(),
            content_type: "video/mp4".to_string(),
            bytes: bytes::Bytes::from_static(b"0123456789"),
        };
        let _ = update(&mut app, Message::Download(download, DownloadEvent::Fetched(file)));
        assert_eq!(app.view.session.status_message, "Choose where to save clip.mp4...");

        let saved = PathBuf::from("/tmp/clip.mp4");
        let _ = update(&mut app, Message::DownloadSaved(download, Ok(Some(saved))));
        assert!(!app.view.session.loading());
        assert_eq!(app.view.session.progress, 100);

        let _ = update(&mut app, Message::ProgressDecayed(download));
        assert_eq!(app.view.session.progress, 0);
    }

    #[test]
    fn test_fetch_after_download_starts_from_zero_progress() {
        let mut app = app();
        press(&mut app, UiMessage::UrlChanged("https://example.com/v".to_string()));
        press(&mut app, UiMessage::DownloadPressed("1".to_string()));
        let download = app.view.session.download_generation();
        let _ = update(&mut app, Message::Download(download, DownloadEvent::Progress(50)));
        let _ = update(&mut app, Message::DownloadSaved(download, Ok(None)));

        // Within the decay window a new discovery must not show the old bar.
        press(&mut app, UiMessage::FetchPressed);
        assert!(app.view.session.loading());
        assert_eq!(app.view.session.progress, 0);
        assert!(!app.view.session.shows_progress());
    }

    #[test]
    fn test_download_before_thumbnail_keeps_thumbnail() {
        let mut app = app();
        press(&mut app, UiMessage::UrlChanged("https://example.com/v".to_string()));
        press(&mut app, UiMessage::FetchPressed);
        let discovery = app.view.session.discovery_generation();

        let response = FormatsResponse {
            title: Some("Demo".to_string()),
            thumbnail: Some("http://t/x.jpg".to_string()),
            ..FormatsResponse::default()
        };
        let _ = update(&mut app, Message::FormatsFetched(discovery, Ok(response)));
        press(&mut app, UiMessage::DownloadPressed("1".to_string()));

        let _ = update(&mut app, Message::ThumbnailLoaded(discovery, Ok(thumbnail())));
        assert!(app.view.thumbnail.is_some());
        assert_eq!(app.view.session.title, "Demo");
    }

    #[test]
    fn test_stale_thumbnail_is_discarded() {
        let mut app = app();
        press(&mut app, UiMessage::UrlChanged("https://example.com/v".to_string()));
        press(&mut app, UiMessage::FetchPressed);
        let stale = app.view.session.discovery_generation();
        press(&mut app, UiMessage::FetchPressed);

        let _ = update(&mut app, Message::ThumbnailLoaded(stale, Ok(thumbnail())));
        assert!(app.view.thumbnail.is_none());
    }

    #[test]
    fn test_task_slot_aborts_replaced_task() {
        let mut slot = TaskSlot::default();
        let (_first_task, first) = Task::<Message>::none().abortable();
        assert!(slot.replace(first).is_none());

        let (_second_task, second) = Task::<Message>::none().abortable();
        let replaced = slot.replace(second).unwrap();
        assert!(replaced.is_aborted());
        assert!(!slot.0.as_ref().unwrap().is_aborted());
    }

    #[test]
    fn test_new_download_tracks_its_own_task() {
        let mut app = app();
        press(&mut app, UiMessage::UrlChanged("https://example.com/v".to_string()));
        press(&mut app, UiMessage::DownloadPressed("1".to_string()));
        assert!(app.download_task.0.is_some());
        assert!(app.discovery_task.0.is_none());

        press(&mut app, UiMessage::FetchPressed);
        assert!(app.discovery_task.0.is_some());
        // A discovery never cancels the running download.
        assert!(!app.download_task.0.as_ref().unwrap().is_aborted());

        let download = app.view.session.download_generation();
        let err = AppError::Download("not found".to_string());
        let _ = update(&mut app, Message::Download(download, DownloadEvent::Failed(err)));
        assert!(app.download_task.0.is_none());
    }
}
