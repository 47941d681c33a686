use iced::{
    widget::{
        button, column, container, image, progress_bar, row, scrollable, text, text_input, Column,
        Image, Row, Space,
    },
    Element, Length,
};

use crate::api::FormatDescriptor;
use crate::domain::SessionState;
use crate::utils::nice_size;

const CARDS_PER_ROW: usize = 2;

/// Main view state
#[derive(Default)]
pub struct MediaView {
    pub session: SessionState,
    pub thumbnail: Option<image::Handle>,
}

#[derive(Debug, Clone)]
pub enum UiMessage {
    UrlChanged(String),
    FetchPressed,
    /// Format id of the card whose button was pressed.
    DownloadPressed(String),
}

impl MediaView {
    pub fn update(&mut self, message: UiMessage) {
        match message {
            UiMessage::UrlChanged(url) => {
                self.session.media_url = url;
            }
            UiMessage::FetchPressed | UiMessage::DownloadPressed(_) => {
                // Will be handled by the app
            }
        }
    }

    pub fn view(&self) -> Element<'_, UiMessage> {
        let session = &self.session;

        let mut content = column![
            text("Universal Media Downloader").size(32),
            Space::new().height(Length::Fixed(20.0)),
            row![
                text_input("Paste media URL here...", &session.media_url)
                    .on_input(UiMessage::UrlChanged)
                    .on_submit(UiMessage::FetchPressed)
                    .padding(10),
                button("Fetch")
                    .on_press(UiMessage::FetchPressed)
                    .padding([10, 20]),
            ]
            .spacing(10),
        ]
        .padding(20)
        .spacing(10);

        if session.shows_progress() {
            content = content
                .push(progress_bar(0.0..=100.0, f32::from(session.progress)))
                .push(text(format!("Downloading: {}%", session.progress)).size(14));
        }

        content = content.push(text(&session.status_message).size(14));

        if !session.title.is_empty() {
            if let Some(handle) = &self.thumbnail {
                let thumbnail: Image = Image::new(handle.clone());
                content = content.push(thumbnail.width(Length::Fixed(224.0)));
            }
            content = content.push(text(&session.title).size(24));
        }

        if !session.formats.is_empty() {
            let mut grid = Column::new().spacing(10);
            for formats in session.formats.chunks(CARDS_PER_ROW) {
                let line = formats
                    .iter()
                    .fold(Row::new().spacing(10), |line, format| {
                        line.push(format_card(format))
                    });
                grid = grid.push(line);
            }
            content = content.push(grid);
        }

        scrollable(content).into()
    }
}

/// Text lines of a format card.
pub fn card_lines(format: &FormatDescriptor) -> [String; 3] {
    [
        format!("Format: {}", format.id),
        format!(
            "Type: {} • Resolution: {}",
            format.ext,
            format.resolution.as_deref().unwrap_or("N/A")
        ),
        format!("Size: {}", nice_size(format.size)),
    ]
}

fn format_card(format: &FormatDescriptor) -> Element<'_, UiMessage> {
    let [heading, kind, size] = card_lines(format);

    let details = column![
        text(heading).size(16),
        text(kind).size(14),
        text(size).size(14),
    ]
    .spacing(4)
    .width(Length::Fill);

    container(
        row![
            details,
            button("Download")
                .on_press(UiMessage::DownloadPressed(format.id.clone()))
                .padding([8, 12]),
        ]
        .spacing(10),
    )
    .padding(12)
    .width(Length::Fill)
    .style(container::rounded_box)
    .into()
}
