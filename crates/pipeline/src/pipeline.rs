//! The fetch pipeline.
//!
//! A fetch resolves a URL through the tiers in order: decoded memory cache,
//! encoded memory cache, disk cache, additional caches, then the network.
//! Concurrent fetches for the same key share one resolution.

use crate::additional_cache::AdditionalCache;
use crate::downloader::{Download, DownloadError, Downloader};
use crate::events::PipelineEvent;
use crate::global::GlobalConfig;
use crate::pipeline_log;
use pipeline_config::CacheSettings;
use pipeline_image::{
    DecodeError, DecodeRequest, DiskCache, ImageContainer, RenderedCache, decode_off_thread,
    scale_off_thread,
};
use pipeline_types::{Dimensions, DownloadMetadata, ImageType, LoadSource, LogLevel};
use shared::cache::DataCache;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError, RwLock},
};
use thiserror::Error;
use tokio::sync::OnceCell;
use url::Url;

/// Attempts to continue an interrupted transfer before giving up
const MAX_RESUME_ATTEMPTS: usize = 2;

#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("Download failed for {url}: {source}")]
    Download {
        url: Url,
        #[source]
        source: DownloadError,
    },
    #[error("Failed to decode {url}: {reason}")]
    Decode { url: Url, reason: String },
    #[error("Fetch cancelled")]
    Cancelled,
}

impl FetchError {
    fn decode(url: &Url, err: DecodeError) -> Self {
        match err {
            DecodeError::Cancelled => FetchError::Cancelled,
            err => FetchError::Decode {
                url: url.clone(),
                reason: err.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub url: Url,
    /// Downscale the result to fit these dimensions
    pub target: Option<Dimensions>,
    /// Skip every cache tier and go to the network
    pub reload: bool,
}

impl FetchRequest {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            target: None,
            reload: false,
        }
    }

    pub fn with_target(mut self, target: Dimensions) -> Self {
        self.target = Some(target);
        self
    }

    pub fn reloading(mut self) -> Self {
        self.reload = true;
        self
    }

    /// Decoded images are cached per target size; encoded bytes per URL.
    fn rendered_key(&self) -> String {
        match self.target {
            Some(target) if !target.is_empty() => format!("{}#{}", self.url, target),
            _ => self.url.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub url: Url,
    pub image: Arc<ImageContainer>,
    pub source: LoadSource,
    /// Present when the image came from the network
    pub download: Option<DownloadMetadata>,
}

type SharedFetch = Arc<OnceCell<Result<FetchResponse, FetchError>>>;

struct Inner {
    identifier: String,
    global: Arc<GlobalConfig>,
    downloader: Arc<dyn Downloader>,
    rendered: RenderedCache,
    data: DataCache,
    disk: Option<DiskCache>,
    additional_caches: RwLock<Vec<Arc<dyn AdditionalCache>>>,
    in_flight: Mutex<HashMap<String, SharedFetch>>,
}

/// Cheap to clone; clones share caches and in-flight fetches.
#[derive(Clone)]
pub struct ImagePipeline {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ImagePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImagePipeline")
            .field("identifier", &self.inner.identifier)
            .field("rendered", &self.inner.rendered.len())
            .field("disk", &self.inner.disk)
            .finish_non_exhaustive()
    }
}

/// Guarantees a started download is reported as finished or failed, even
/// when the fetch future is dropped midway.
struct DownloadNotice<'a> {
    global: &'a GlobalConfig,
    url: &'a Url,
    settled: bool,
}

impl<'a> DownloadNotice<'a> {
    fn start(global: &'a GlobalConfig, url: &'a Url) -> Self {
        global.observers().download_started(url);
        global
            .events()
            .publish(PipelineEvent::DownloadStarted { url: url.clone() });
        Self {
            global,
            url,
            settled: false,
        }
    }

    fn finished(mut self, metadata: &DownloadMetadata) {
        self.settled = true;
        self.global.observers().download_finished(metadata);
        self.global
            .events()
            .publish(PipelineEvent::DownloadFinished(metadata.clone()));
    }

    fn failed(mut self, error: &FetchError) {
        self.settled = true;
        self.notify_failed(error);
    }

    fn notify_failed(&self, error: &FetchError) {
        self.global.observers().download_failed(self.url, error);
        self.global.events().publish(PipelineEvent::DownloadFailed {
            url: self.url.clone(),
            error: error.to_string(),
        });
    }
}

impl Drop for DownloadNotice<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.notify_failed(&FetchError::Cancelled);
        }
    }
}

/// Pending marker for a key being resolved; cleared on drop.
struct PendingMark<'a> {
    cache: &'a RenderedCache,
    key: &'a str,
}

impl<'a> PendingMark<'a> {
    fn set(cache: &'a RenderedCache, key: &'a str) -> Self {
        cache.set_pending(key.to_string());
        Self { cache, key }
    }
}

impl Drop for PendingMark<'_> {
    fn drop(&mut self) {
        self.cache.clear_pending(self.key);
    }
}

/// One caller's share of an in-flight fetch. The last waiter to leave,
/// whether it finished or was dropped mid-await, removes the map entry.
struct InFlightWaiter<'a> {
    in_flight: &'a Mutex<HashMap<String, SharedFetch>>,
    key: &'a str,
    cell: SharedFetch,
}

impl<'a> InFlightWaiter<'a> {
    fn join(in_flight: &'a Mutex<HashMap<String, SharedFetch>>, key: &'a str) -> Self {
        let cell = in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();
        Self {
            in_flight,
            key,
            cell,
        }
    }
}

impl Drop for InFlightWaiter<'_> {
    fn drop(&mut self) {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // Release our handle under the lock so concurrent waiters see an
        // exact count.
        let cell = std::mem::replace(&mut self.cell, Arc::new(OnceCell::new()));
        let last = in_flight
            .get(self.key)
            .is_some_and(|current| Arc::ptr_eq(current, &cell) && Arc::strong_count(&cell) == 2);
        drop(cell);
        if last {
            in_flight.remove(self.key);
        }
    }
}

impl ImagePipeline {
    pub fn new(
        identifier: impl Into<String>,
        global: Arc<GlobalConfig>,
        downloader: Arc<dyn Downloader>,
        cache: &CacheSettings,
    ) -> Self {
        let identifier = identifier.into();
        let disk = cache.disk_enabled.then(|| {
            DiskCache::new(cache.resolved_disk_root(), &identifier, cache.disk_max_bytes)
        });

        Self {
            inner: Arc::new(Inner {
                rendered: RenderedCache::new(cache.memory_capacity, cache.memory_byte_budget),
                data: DataCache::new(cache.data_capacity, cache.data_byte_budget),
                disk,
                identifier,
                global,
                downloader,
                additional_caches: RwLock::new(Vec::new()),
                in_flight: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn identifier(&self) -> &str {
        &self.inner.identifier
    }

    pub fn global(&self) -> &Arc<GlobalConfig> {
        &self.inner.global
    }

    pub fn rendered_cache(&self) -> &RenderedCache {
        &self.inner.rendered
    }

    pub fn data_cache(&self) -> &DataCache {
        &self.inner.data
    }

    pub fn disk_cache(&self) -> Option<&DiskCache> {
        self.inner.disk.as_ref()
    }

    pub fn set_additional_caches(&self, caches: Vec<Arc<dyn AdditionalCache>>) {
        *self
            .inner
            .additional_caches
            .write()
            .unwrap_or_else(PoisonError::into_inner) = caches;
    }

    pub fn add_additional_cache(&self, cache: Arc<dyn AdditionalCache>) {
        self.inner
            .additional_caches
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(cache);
    }

    pub fn additional_cache_count(&self) -> usize {
        self.inner
            .additional_caches
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Number of distinct keys currently being resolved.
    pub fn in_flight_count(&self) -> usize {
        self.inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Fetch without caring about the reason for a miss: failures are
    /// logged and surface as `None`.
    pub async fn fetch_image(&self, url: &Url) -> Option<FetchResponse> {
        match self.fetch(FetchRequest::new(url.clone())).await {
            Ok(response) => Some(response),
            Err(err) => {
                pipeline_log!(
                    self.inner.global.logger(),
                    LogLevel::Warning,
                    "{}: no image for {url}: {err}",
                    self.inner.identifier
                );
                None
            }
        }
    }

    pub async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
        let events = self.inner.global.events();
        events.publish(PipelineEvent::FetchStarted {
            pipeline: self.inner.identifier.clone(),
            url: request.url.clone(),
        });

        let result = self.fetch_coalesced(&request).await;

        match &result {
            Ok(response) => events.publish(PipelineEvent::FetchCompleted {
                pipeline: self.inner.identifier.clone(),
                url: request.url.clone(),
                source: response.source,
            }),
            Err(err) => events.publish(PipelineEvent::FetchFailed {
                pipeline: self.inner.identifier.clone(),
                url: request.url.clone(),
                error: err.to_string(),
            }),
        }

        result
    }

    async fn fetch_coalesced(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        let key = request.rendered_key();

        if !request.reload {
            if let Some(image) = self.inner.rendered.get(&key) {
                tracing::debug!("Memory cache hit for {key}");
                return Ok(FetchResponse {
                    url: request.url.clone(),
                    image,
                    source: LoadSource::MemoryCache,
                    download: None,
                });
            }
        }

        let waiter = InFlightWaiter::join(&self.inner.in_flight, &key);
        waiter
            .cell
            .get_or_init(|| self.resolve(request, &key))
            .await
            .clone()
    }

    async fn resolve(&self, request: &FetchRequest, key: &str) -> Result<FetchResponse, FetchError> {
        let _pending = PendingMark::set(&self.inner.rendered, key);

        let result = self.resolve_uncached(request).await;
        if let Ok(response) = &result {
            self.inner
                .rendered
                .insert(key.to_string(), response.image.clone());
        }

        result
    }

    async fn resolve_uncached(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        if !request.reload {
            if let Some(response) = self.load_from_data_caches(request).await {
                return Ok(response);
            }

            if let Some(response) = self.load_from_additional_caches(request).await {
                return Ok(response);
            }
        }

        self.load_from_network(request).await
    }

    async fn load_from_data_caches(&self, request: &FetchRequest) -> Option<FetchResponse> {
        let url_key = request.url.as_str();

        let (data, source): (Arc<[u8]>, _) = match self.inner.data.get(url_key).await {
            Some(data) => (data, LoadSource::MemoryCache),
            None => {
                let disk = self.inner.disk.as_ref()?;
                let data: Arc<[u8]> = match disk.read(url_key).await {
                    Ok(Some(data)) => data.into(),
                    Ok(None) => return None,
                    Err(err) => {
                        tracing::warn!("Disk cache read failed for {url_key}: {err}");
                        return None;
                    }
                };
                self.inner.data.put(url_key.to_string(), data.clone()).await;
                (data, LoadSource::DiskCache)
            }
        };

        match self.decode(&request.url, data, None, request.target).await {
            Ok(image) => {
                tracing::debug!("{source} hit for {url_key}");
                Some(FetchResponse {
                    url: request.url.clone(),
                    image: Arc::new(image),
                    source,
                    download: None,
                })
            }
            Err(err) => {
                // Corrupt entry; drop it and fall through to the next tier
                tracing::warn!("Discarding undecodable cache entry for {url_key}: {err}");
                self.inner.data.remove(url_key).await;
                if let Some(disk) = &self.inner.disk {
                    let _ = disk.remove(url_key).await;
                }
                None
            }
        }
    }

    async fn load_from_additional_caches(&self, request: &FetchRequest) -> Option<FetchResponse> {
        let caches = self
            .inner
            .additional_caches
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for cache in caches {
            let Some(image) = cache.retrieve_image(&request.url).await else {
                continue;
            };

            let image = match request.target {
                Some(target) => match scale_off_thread(image.as_ref().clone(), target).await {
                    Ok(scaled) => Arc::new(scaled),
                    Err(err) => {
                        tracing::warn!("Failed to scale {}: {err}", request.url);
                        image
                    }
                },
                None => image,
            };

            tracing::debug!("Additional cache hit for {}", request.url);
            return Some(FetchResponse {
                url: request.url.clone(),
                image,
                source: LoadSource::AdditionalCache,
                download: None,
            });
        }

        None
    }

    async fn load_from_network(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        let global = &self.inner.global;
        let _permit = global
            .acquire_download()
            .await
            .map_err(|_| FetchError::Cancelled)?;

        let notice = DownloadNotice::start(global, &request.url);

        match self.download_and_decode(request).await {
            Ok((image, metadata)) => {
                notice.finished(&metadata);
                Ok(FetchResponse {
                    url: request.url.clone(),
                    image: Arc::new(image),
                    source: LoadSource::Network,
                    download: Some(metadata),
                })
            }
            Err(err) => {
                pipeline_log!(
                    global.logger(),
                    LogLevel::Error,
                    "{}: download of {} failed: {err}",
                    self.inner.identifier,
                    request.url
                );
                notice.failed(&err);
                Err(err)
            }
        }
    }

    async fn download_and_decode(
        &self,
        request: &FetchRequest,
    ) -> Result<(ImageContainer, DownloadMetadata), FetchError> {
        let url = &request.url;
        let download = self.download_with_resume(url).await?;

        let byte_size = download.data.len() as u64;
        let hint = download
            .content_type
            .as_deref()
            .and_then(ImageType::from_content_type);
        let data: Arc<[u8]> = download.data.into();

        let original = self.decode(url, data.clone(), hint, None).await?;

        let mut metadata = DownloadMetadata::new(url.clone(), byte_size, original.dimensions())
            .resumed(download.was_resumed);
        metadata.content_type = download.content_type;
        metadata.image_type = original.image_type().cloned();

        self.store_encoded(url.as_str(), data).await;

        let image = match request.target {
            Some(target) => scale_off_thread(original, target)
                .await
                .map_err(|err| FetchError::decode(url, err))?,
            None => original,
        };

        Ok((image, metadata))
    }

    async fn download_with_resume(&self, url: &Url) -> Result<Download, FetchError> {
        let downloader = &self.inner.downloader;
        let mut partial: Vec<u8> = Vec::new();
        let mut resumed = false;

        for attempt in 0..=MAX_RESUME_ATTEMPTS {
            let resume_from = (!partial.is_empty()).then_some(partial.len() as u64);

            match downloader.download(url, resume_from).await {
                Ok(mut download) => {
                    if resume_from.is_some() && download.was_resumed {
                        partial.extend_from_slice(&download.data);
                        download.data = partial;
                        resumed = true;
                    }
                    download.was_resumed = resumed;
                    return Ok(download);
                }
                Err(DownloadError::Interrupted { partial: received }) if attempt < MAX_RESUME_ATTEMPTS => {
                    tracing::warn!(
                        "Download of {url} interrupted after {} bytes, resuming (attempt {})",
                        partial.len() + received.len(),
                        attempt + 1
                    );
                    partial.extend_from_slice(&received);
                }
                Err(source) => {
                    return Err(FetchError::Download {
                        url: url.clone(),
                        source,
                    });
                }
            }
        }

        Err(FetchError::Download {
            url: url.clone(),
            source: DownloadError::Interrupted { partial },
        })
    }

    async fn decode(
        &self,
        url: &Url,
        data: Arc<[u8]>,
        hint: Option<ImageType>,
        target: Option<Dimensions>,
    ) -> Result<ImageContainer, FetchError> {
        let global = &self.inner.global;
        let _permit = global
            .acquire_decode()
            .await
            .map_err(|_| FetchError::Cancelled)?;

        let request = DecodeRequest::new(data).with_hint(hint).with_target(target);
        decode_off_thread(global.codec_catalogue().clone(), request)
            .await
            .map_err(|err| FetchError::decode(url, err))
    }

    async fn store_encoded(&self, url_key: &str, data: Arc<[u8]>) {
        if let Some(disk) = &self.inner.disk {
            if let Err(err) = disk.write(url_key, &data).await {
                tracing::warn!("Disk cache write failed for {url_key}: {err}");
            }
        }
        self.inner.data.put(url_key.to_string(), data).await;
    }

    /// Seeds the encoded tiers with `data` for `url`. The bytes must decode
    /// with a registered codec. Any decoded copy at full size is replaced.
    pub async fn store_image(&self, url: &Url, data: Vec<u8>) -> Result<(), FetchError> {
        let data: Arc<[u8]> = data.into();
        let image = self.decode(url, data.clone(), None, None).await?;

        self.store_encoded(url.as_str(), data).await;
        self.inner
            .rendered
            .insert(url.to_string(), Arc::new(image));
        Ok(())
    }

    /// Drops `url` from every tier. Scaled variants in memory age out
    /// through the LRU.
    pub async fn remove_image(&self, url: &Url) {
        self.inner.rendered.remove(url.as_str());
        self.inner.data.remove(url.as_str()).await;
        if let Some(disk) = &self.inner.disk {
            if let Err(err) = disk.remove(url.as_str()).await {
                tracing::warn!("Disk cache remove failed for {url}: {err}");
            }
        }
    }

    pub async fn clear_memory_caches(&self) {
        self.inner.rendered.clear();
        self.inner.data.clear().await;
        tracing::info!("{}: cleared memory caches", self.inner.identifier);
        self.inner
            .global
            .events()
            .publish(PipelineEvent::MemoryCachesCleared {
                pipeline: self.inner.identifier.clone(),
            });
    }

    pub async fn clear_disk_cache(&self) {
        if let Some(disk) = &self.inner.disk {
            if let Err(err) = disk.clear().await {
                pipeline_log!(
                    self.inner.global.logger(),
                    LogLevel::Error,
                    "{}: failed to clear disk cache: {err}",
                    self.inner.identifier
                );
            }
        }
    }

    /// Application moved to the background. Returns whether memory caches
    /// were cleared.
    pub async fn handle_background(&self) -> bool {
        if !self.inner.global.clears_memory_caches_on_background() {
            return false;
        }
        self.clear_memory_caches().await;
        true
    }
}
