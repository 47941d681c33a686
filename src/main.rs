mod api;
mod app;
mod application;
mod config;
mod domain;
mod ui;
mod utils;

use tracing::info;

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "universal_media_downloader=info".into()),
        )
        .init();

    let api_config = config::load()?;
    info!(base_url = %api_config.base_url, "using media API");
    let api_client = api::ApiClient::new(api_config)?;

    iced::application(
        move || app::MediaApp::new(api_client.clone()),
        app::update,
        app::view,
    )
    .title("Universal Media Downloader")
    .run()?;

    Ok(())
}
