use async_trait::async_trait;
use pipeline_image::ImageContainer;
use std::sync::Arc;
use url::Url;

/// External lookup consulted after the pipeline's own cache tiers and
/// before the network. Resolving to `None` means "not mine".
#[async_trait]
pub trait AdditionalCache: Send + Sync {
    async fn retrieve_image(&self, url: &Url) -> Option<Arc<ImageContainer>>;
}

