//! Application context: owns the pipeline configuration and the adapters
//! the sample app plugs into it.

use crate::api::{ApiClient, ApiDelegate};
use crate::inspector::InspectorHandle;
use crate::logger::ConsoleLogger;
use crate::network_activity::NetworkActivity;
use crate::placeholder::PlaceholderCache;
use pipeline::{
    DownloadMetadata, Downloader, FetchError, FetchResponse, GlobalConfig, ImagePipeline,
    PipelineObserver,
};
use pipeline_config::PipelineSettings;
use pipeline_image::WebpCodec;
use pipeline_types::ImageType;
use shared::fetch_state::FetchState;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use url::Url;

/// Counts downloads and API work as network activity.
#[derive(Debug, Clone)]
pub struct ActivityObserver {
    activity: NetworkActivity,
}

impl ActivityObserver {
    pub fn new(activity: NetworkActivity) -> Self {
        Self { activity }
    }
}

impl PipelineObserver for ActivityObserver {
    fn download_started(&self, _url: &Url) {
        self.activity.increment();
    }

    fn download_finished(&self, _metadata: &DownloadMetadata) {
        self.activity.decrement();
    }

    fn download_failed(&self, _url: &Url, _error: &FetchError) {
        self.activity.decrement();
    }
}

impl ApiDelegate for ActivityObserver {
    fn work_started(&self) {
        self.activity.increment();
    }

    fn work_finished(&self) {
        self.activity.decrement();
    }
}

pub struct AppContext {
    settings: PipelineSettings,
    global: Arc<GlobalConfig>,
    pipeline: ImagePipeline,
    activity: NetworkActivity,
    placeholder: Arc<PlaceholderCache>,
    api: ApiClient,
    inspector: InspectorHandle,
    debug_info_visible: AtomicBool,
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("settings", &self.settings)
            .field("pipeline", &self.pipeline)
            .field("activity", &self.activity)
            .finish_non_exhaustive()
    }
}

impl AppContext {
    /// Wires up the pipeline. Must be called inside a tokio runtime.
    ///
    /// Decoding is always serialized and memory caches are always dropped
    /// when the app is backgrounded, whatever the settings say.
    pub fn launch(mut settings: PipelineSettings, downloader: Arc<dyn Downloader>) -> Self {
        settings.concurrency.serialize_decoding = true;
        settings.clear_memory_caches_on_background = true;

        let global = Arc::new(GlobalConfig::from_settings(&settings));
        global.set_logger(Arc::new(ConsoleLogger::default()));
        global
            .codec_catalogue()
            .set_codec(ImageType::WEBP, Arc::new(WebpCodec::new()));

        let inspector = InspectorHandle::spawn(global.events().subscribe());
        let activity = NetworkActivity::spawn();
        let observer = Arc::new(ActivityObserver::new(activity.clone()));
        global.add_observer(observer.clone());

        let placeholder = Arc::new(PlaceholderCache::new());
        let pipeline = ImagePipeline::new(
            settings.identifier.clone(),
            global.clone(),
            downloader,
            &settings.cache,
        );
        pipeline.add_additional_cache(placeholder.clone());

        let mut api = ApiClient::new();
        api.set_delegate(observer);

        tracing::info!(
            "Launched {} ({})",
            settings.identifier,
            settings.concurrency
        );

        Self {
            debug_info_visible: AtomicBool::new(settings.app.debug_info_visible),
            settings,
            global,
            pipeline,
            activity,
            placeholder,
            api,
            inspector,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn global(&self) -> &Arc<GlobalConfig> {
        &self.global
    }

    pub fn pipeline(&self) -> &ImagePipeline {
        &self.pipeline
    }

    pub fn activity(&self) -> &NetworkActivity {
        &self.activity
    }

    pub fn placeholder(&self) -> &PlaceholderCache {
        &self.placeholder
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn debug_info_visible(&self) -> bool {
        self.debug_info_visible.load(Ordering::Relaxed)
    }

    pub fn set_debug_info_visible(&self, visible: bool) {
        self.debug_info_visible.store(visible, Ordering::Relaxed);
    }

    pub async fn fetch(&self, url: &Url) -> Option<FetchResponse> {
        self.pipeline.fetch_image(url).await
    }

    /// Status of every URL fetched so far, in URL order.
    pub async fn inspect(&self) -> Vec<(String, FetchState)> {
        self.inspector.snapshot().await
    }

    /// Returns whether memory caches were dropped.
    pub async fn enter_background(&self) -> bool {
        self.pipeline.handle_background().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, RgbaImage};
    use pipeline::{Download, StaticDownloader};
    use pipeline_types::LoadSource;
    use std::io::Cursor;

    fn settings() -> PipelineSettings {
        let mut settings = PipelineSettings::default();
        settings.cache.disk_enabled = false;
        settings
    }

    fn webp(width: u32, height: u32) -> Vec<u8> {
        let image = DynamicImage::ImageRgba8(RgbaImage::new(width, height));
        let mut bytes = Cursor::new(Vec::new());
        image.write_to(&mut bytes, ImageFormat::WebP).unwrap();
        bytes.into_inner()
    }

    #[tokio::test]
    async fn test_launch_configures_global() {
        let app = AppContext::launch(settings(), Arc::new(StaticDownloader::new()));

        assert_eq!(app.pipeline().identifier(), "imagepipe.Example");
        assert!(app.global().decoding_is_serialized());
        assert_eq!(app.global().available_decode_permits(), 1);
        assert!(app.global().clears_memory_caches_on_background());
        assert!(app.global().codec_catalogue().supports(&ImageType::WEBP));
        assert_eq!(app.global().observers().len(), 1);
        assert_eq!(app.pipeline().additional_cache_count(), 1);
    }

    #[tokio::test]
    async fn test_placeholder_resolves_without_network() {
        let downloader = Arc::new(StaticDownloader::new());
        let app = AppContext::launch(settings(), downloader.clone());

        let url = Url::parse("placeholder://placeholder.com/placeholder.jpg").unwrap();
        let response = app.fetch(&url).await.unwrap();

        assert_eq!(response.source, LoadSource::AdditionalCache);
        assert!(app.placeholder().is_loaded());
        assert_eq!(downloader.request_count(), 0);
        assert_eq!(app.activity().flush().await, Some(0));
    }

    #[tokio::test]
    async fn test_downloads_drive_activity_indicator() {
        let downloader = Arc::new(StaticDownloader::new());
        let good = Url::parse("https://images.example.com/cat.webp").unwrap();
        let missing = Url::parse("https://images.example.com/missing.webp").unwrap();
        downloader.insert(&good, Download::new(webp(4, 4)));
        let app = AppContext::launch(settings(), downloader);

        let response = app.fetch(&good).await.unwrap();
        assert_eq!(response.image.image_type(), Some(&ImageType::WEBP));
        assert!(app.fetch(&missing).await.is_none());

        assert_eq!(app.activity().flush().await, Some(0));
        assert!(!app.activity().is_visible());

        let states = app.inspect().await;
        assert_eq!(states.len(), 2);
        assert_eq!(states[0].0, good.to_string());
        assert_eq!(states[0].1, FetchState::Ready { from_cache: false });
        assert_eq!(states[1].0, missing.to_string());
        assert!(states[1].1.is_failed());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_inspect_covers_long_sessions() {
        let app = AppContext::launch(settings(), Arc::new(StaticDownloader::new()));

        let urls: Vec<Url> = (0..200)
            .map(|index| {
                Url::parse(&format!(
                    "placeholder://placeholder.com/{index:03}/placeholder.jpg"
                ))
                .unwrap()
            })
            .collect();
        for url in &urls {
            app.fetch(url).await.unwrap();
        }

        let states = app.inspect().await;
        assert_eq!(states.len(), 200);
        assert_eq!(states[0].0, urls[0].to_string());
        assert!(states.iter().all(|(_, state)| state.is_ready()));
    }

    #[tokio::test]
    async fn test_api_work_counts_as_activity() {
        let app = AppContext::launch(settings(), Arc::new(StaticDownloader::new()));

        let during = app
            .api()
            .perform(async { app.activity().flush().await })
            .await;
        assert_eq!(during, Some(1));
        assert_eq!(app.activity().flush().await, Some(0));
    }

    #[tokio::test]
    async fn test_enter_background_drops_memory() {
        let app = AppContext::launch(settings(), Arc::new(StaticDownloader::new()));
        let url = Url::parse("placeholder://placeholder.com/placeholder.jpg").unwrap();
        app.fetch(&url).await.unwrap();
        assert_eq!(app.pipeline().rendered_cache().len(), 1);

        assert!(app.enter_background().await);
        assert!(app.pipeline().rendered_cache().is_empty());
    }

    #[tokio::test]
    async fn test_app_settings_survive_launch() {
        let mut settings = settings();
        settings.app.search_count = 12;
        settings.app.search_webp = true;
        settings.app.use_placeholder = true;
        settings.app.debug_info_visible = true;

        let app = AppContext::launch(settings.clone(), Arc::new(StaticDownloader::new()));

        assert_eq!(app.settings().app, settings.app);
        assert!(app.debug_info_visible());
    }

    #[tokio::test]
    async fn test_debug_info_toggle() {
        let app = AppContext::launch(settings(), Arc::new(StaticDownloader::new()));
        assert!(!app.debug_info_visible());
        app.set_debug_info_visible(true);
        assert!(app.debug_info_visible());
    }
}
