//! Transport seam. The pipeline never speaks HTTP itself; it asks a
//! [`Downloader`] for bytes.

use async_trait::async_trait;
use pipeline_types::ImageType;
use std::{
    collections::HashMap,
    io::ErrorKind,
    sync::{
        Arc, PoisonError, RwLock,
        atomic::{AtomicUsize, Ordering},
    },
};
use thiserror::Error;
use url::Url;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DownloadError {
    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),
    #[error("Resource not found: {0}")]
    NotFound(String),
    #[error("HTTP {status} for URL: {url}")]
    HttpStatus { status: u16, url: String },
    /// Transfer stopped early; `partial` holds what arrived so far
    #[error("Download interrupted after {} bytes", .partial.len())]
    Interrupted { partial: Vec<u8> },
    #[error("Download IO error: {0}")]
    Io(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub data: Vec<u8>,
    pub content_type: Option<String>,
    /// The downloader honored `resume_from` and `data` holds only the
    /// remaining bytes
    pub was_resumed: bool,
}

impl Download {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            content_type: None,
            was_resumed: false,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

#[async_trait]
pub trait Downloader: Send + Sync {
    /// Fetch the bytes at `url`. When `resume_from` is set the downloader
    /// may return only the bytes after that offset, flagging
    /// `was_resumed`.
    async fn download(&self, url: &Url, resume_from: Option<u64>) -> Result<Download, DownloadError>;
}

fn guess_content_type(url: &Url) -> Option<String> {
    let format = image::ImageFormat::from_path(url.path()).ok()?;
    ImageType::from_format(format)?
        .content_type()
        .map(str::to_string)
}

/// Reads `file://` URLs from the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileDownloader;

#[async_trait]
impl Downloader for FileDownloader {
    async fn download(&self, url: &Url, resume_from: Option<u64>) -> Result<Download, DownloadError> {
        if url.scheme() != "file" {
            return Err(DownloadError::UnsupportedScheme(url.scheme().to_string()));
        }

        let path = url
            .to_file_path()
            .map_err(|_| DownloadError::NotFound(url.to_string()))?;

        let data = tokio::fs::read(&path).await.map_err(|err| match err.kind() {
            ErrorKind::NotFound => DownloadError::NotFound(url.to_string()),
            _ => DownloadError::Io(err.to_string()),
        })?;

        let offset = resume_from.unwrap_or(0) as usize;
        let (data, was_resumed) = if offset > 0 && offset <= data.len() {
            (data[offset..].to_vec(), true)
        } else {
            (data, false)
        };

        Ok(Download {
            data,
            content_type: guess_content_type(url),
            was_resumed,
        })
    }
}

/// In-memory downloader serving registered URLs. Counts requests so
/// callers can tell cache hits from network trips.
#[derive(Debug, Clone, Default)]
pub struct StaticDownloader {
    resources: Arc<RwLock<HashMap<String, Download>>>,
    requests: Arc<AtomicUsize>,
}

impl StaticDownloader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, url: &Url, download: Download) {
        self.resources
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.to_string(), download);
    }

    pub fn remove(&self, url: &Url) -> Option<Download> {
        self.resources
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(url.as_str())
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Downloader for StaticDownloader {
    async fn download(&self, url: &Url, _resume_from: Option<u64>) -> Result<Download, DownloadError> {
        self.requests.fetch_add(1, Ordering::SeqCst);

        let resource = self
            .resources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url.as_str())
            .cloned();

        let mut download = resource.ok_or_else(|| DownloadError::NotFound(url.to_string()))?;
        if download.content_type.is_none() {
            download.content_type = guess_content_type(url);
        }
        Ok(download)
    }
}
