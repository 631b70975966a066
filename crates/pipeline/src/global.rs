//! Context shared by every pipeline in a process: logger, concurrency
//! policy, observers, events and the codec catalogue. Owned and passed
//! explicitly rather than reached through a singleton.

use crate::events::EventBus;
use crate::logger::{Logger, TracingLogger};
use crate::observer::{ObserverRegistry, PipelineObserver};
use pipeline_config::{ConcurrencyPolicy, PipelineSettings};
use pipeline_image::CodecCatalogue;
use std::sync::{
    Arc, PoisonError, RwLock,
    atomic::{AtomicBool, Ordering},
};
use tokio::sync::{AcquireError, Semaphore, SemaphorePermit};

pub struct GlobalConfig {
    logger: RwLock<Arc<dyn Logger>>,
    concurrency: ConcurrencyPolicy,
    download_permits: Semaphore,
    decode_permits: Semaphore,
    observers: ObserverRegistry,
    events: EventBus,
    catalogue: CodecCatalogue,
    clear_memory_caches_on_background: AtomicBool,
}

impl std::fmt::Debug for GlobalConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobalConfig")
            .field("concurrency", &self.concurrency)
            .field("observers", &self.observers)
            .field("catalogue", &self.catalogue)
            .finish_non_exhaustive()
    }
}

impl GlobalConfig {
    pub fn new(concurrency: ConcurrencyPolicy) -> Self {
        let decode_limit = if concurrency.serialize_decoding {
            1
        } else {
            concurrency.max_concurrent_decodes.max(1)
        };

        Self {
            logger: RwLock::new(Arc::new(TracingLogger)),
            concurrency,
            download_permits: Semaphore::new(concurrency.max_concurrent_downloads.max(1)),
            decode_permits: Semaphore::new(decode_limit),
            observers: ObserverRegistry::new(),
            events: EventBus::default(),
            catalogue: CodecCatalogue::with_defaults(),
            clear_memory_caches_on_background: AtomicBool::new(false),
        }
    }

    pub fn from_settings(settings: &PipelineSettings) -> Self {
        let config = Self::new(settings.concurrency);
        config.set_clear_memory_caches_on_background(settings.clear_memory_caches_on_background);
        config
    }

    pub fn with_catalogue(mut self, catalogue: CodecCatalogue) -> Self {
        self.catalogue = catalogue;
        self
    }

    pub fn logger(&self) -> Arc<dyn Logger> {
        self.logger
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_logger(&self, logger: Arc<dyn Logger>) {
        *self.logger.write().unwrap_or_else(PoisonError::into_inner) = logger;
    }

    pub fn concurrency(&self) -> ConcurrencyPolicy {
        self.concurrency
    }

    pub fn decoding_is_serialized(&self) -> bool {
        self.concurrency.serialize_decoding
    }

    pub fn observers(&self) -> &ObserverRegistry {
        &self.observers
    }

    pub fn add_observer(&self, observer: Arc<dyn PipelineObserver>) {
        self.observers.add(observer);
    }

    pub fn remove_observer(&self, observer: &Arc<dyn PipelineObserver>) -> bool {
        self.observers.remove(observer)
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn codec_catalogue(&self) -> &CodecCatalogue {
        &self.catalogue
    }

    pub fn clears_memory_caches_on_background(&self) -> bool {
        self.clear_memory_caches_on_background.load(Ordering::Relaxed)
    }

    pub fn set_clear_memory_caches_on_background(&self, enabled: bool) {
        self.clear_memory_caches_on_background
            .store(enabled, Ordering::Relaxed);
    }

    pub async fn acquire_download(&self) -> Result<SemaphorePermit<'_>, AcquireError> {
        self.download_permits.acquire().await
    }

    pub async fn acquire_decode(&self) -> Result<SemaphorePermit<'_>, AcquireError> {
        self.decode_permits.acquire().await
    }

    pub fn available_download_permits(&self) -> usize {
        self.download_permits.available_permits()
    }

    pub fn available_decode_permits(&self) -> usize {
        self.decode_permits.available_permits()
    }

    /// Stops handing out permits. Fetches waiting on one fail as cancelled.
    pub fn shutdown(&self) {
        self.download_permits.close();
        self.decode_permits.close();
    }
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self::new(ConcurrencyPolicy::default())
    }
}
