pub mod types;

pub use types::{Dimensions, ImageType, LoadSource, LogBucket, LogLevel};

/// Metadata reported to observers once a download completes.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DownloadMetadata {
    pub url: url::Url,
    pub image_type: Option<ImageType>,
    pub content_type: Option<String>,
    pub byte_size: u64,
    pub dimensions: Dimensions,
    pub was_resumed: bool,
}

impl DownloadMetadata {
    pub fn new(url: url::Url, byte_size: u64, dimensions: Dimensions) -> Self {
        Self {
            url,
            image_type: None,
            content_type: None,
            byte_size,
            dimensions,
            was_resumed: false,
        }
    }

    pub fn with_image_type(mut self, image_type: ImageType) -> Self {
        self.image_type = Some(image_type);
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn resumed(mut self, was_resumed: bool) -> Self {
        self.was_resumed = was_resumed;
        self
    }
}
