pub mod additional_cache;
pub mod downloader;
pub mod events;
pub mod global;
pub mod logger;
pub mod observer;
pub mod pipeline;

pub use additional_cache::AdditionalCache;
pub use downloader::{Download, DownloadError, Downloader, FileDownloader, StaticDownloader};
pub use events::{EventBus, PipelineEvent};
pub use global::GlobalConfig;
pub use logger::{LogRecord, Logger, TracingLogger};
pub use observer::{ObserverRegistry, PipelineObserver};
pub use pipeline::{FetchError, FetchRequest, FetchResponse, ImagePipeline};

pub use pipeline_image::{CodecCatalogue, ImageCodec, ImageContainer};
pub use pipeline_types::{Dimensions, DownloadMetadata, ImageType, LoadSource, LogLevel};
