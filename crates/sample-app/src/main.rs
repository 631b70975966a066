pub mod api;
pub mod app;
pub mod inspector;
pub mod logger;
pub mod network_activity;
pub mod placeholder;

use app::AppContext;
use pipeline::{FetchResponse, FileDownloader};
use shared::image::format_image_size;
use std::{path::PathBuf, process::ExitCode, sync::Arc};
use url::Url;

const CONFIG_ENV: &str = "IMAGEPIPE_CONFIG";

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config_path = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
    let settings = pipeline_config::config::load_or_default(config_path.as_deref());

    let app = AppContext::launch(settings, Arc::new(FileDownloader));

    let mut failures = 0;
    for arg in std::env::args().skip(1) {
        let url = match Url::parse(&arg) {
            Ok(url) => url,
            Err(err) => {
                println!("{arg}: invalid URL ({err})");
                failures += 1;
                continue;
            }
        };

        match app.fetch(&url).await {
            Some(response) => println!("{}", describe(&response, app.debug_info_visible())),
            None => {
                println!("{url}: no image");
                failures += 1;
            }
        }
    }

    if app.debug_info_visible() {
        let outstanding = app.activity().flush().await.unwrap_or_default();
        println!(
            "network activity: {outstanding} outstanding, indicator {}",
            if app.activity().is_visible() { "on" } else { "off" }
        );
        for (url, state) in app.inspect().await {
            println!("  {url}: {state}");
        }
    }

    app.enter_background().await;

    if failures == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn describe(response: &FetchResponse, verbose: bool) -> String {
    let image = &response.image;
    let image_type = image
        .image_type()
        .map(|image_type| image_type.to_string())
        .unwrap_or_else(|| "unknown".into());

    let mut line = format!(
        "{}: {} {} from {}",
        response.url,
        image_type,
        image.dimensions(),
        response.source
    );

    if verbose {
        if let Some(download) = &response.download {
            line.push_str(&format!(
                " [{}{}]",
                format_image_size(download.byte_size),
                if download.was_resumed { ", resumed" } else { "" }
            ));
        }
        if image.is_animated() {
            line.push_str(" [animated]");
        }
    }

    line
}
