//! Placeholder image served for the reserved `placeholder://` address.

use async_trait::async_trait;
use image::{DynamicImage, Rgba, RgbaImage};
use once_cell::sync::OnceCell;
use pipeline::AdditionalCache;
use pipeline_image::ImageContainer;
use pipeline_types::{Dimensions, ImageType};
use std::sync::Arc;
use url::Url;

const SCHEME: &str = "placeholder";
const HOST: &str = "placeholder.com";
const FILE_NAME: &str = "placeholder.jpg";

pub const PLACEHOLDER_SIZE: Dimensions = Dimensions {
    width: 256,
    height: 256,
};

/// `placeholder://placeholder.com/.../placeholder.jpg`
pub fn is_placeholder_url(url: &Url) -> bool {
    url.scheme() == SCHEME
        && url.host_str() == Some(HOST)
        && url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            == Some(FILE_NAME)
}

/// Additional cache that answers only for the placeholder address. The
/// image is generated on first use and shared afterwards.
#[derive(Debug, Default)]
pub struct PlaceholderCache {
    image: OnceCell<Arc<ImageContainer>>,
}

impl PlaceholderCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_loaded(&self) -> bool {
        self.image.get().is_some()
    }

    pub fn placeholder(&self) -> Arc<ImageContainer> {
        self.image.get_or_init(|| Arc::new(render())).clone()
    }
}

#[async_trait]
impl AdditionalCache for PlaceholderCache {
    async fn retrieve_image(&self, url: &Url) -> Option<Arc<ImageContainer>> {
        is_placeholder_url(url).then(|| self.placeholder())
    }
}

/// Two-tone diagonal so the placeholder is obvious on screen.
fn render() -> ImageContainer {
    let light = Rgba([150, 215, 255, 255]);
    let dark = Rgba([90, 160, 220, 255]);

    let image = RgbaImage::from_fn(PLACEHOLDER_SIZE.width, PLACEHOLDER_SIZE.height, |x, y| {
        if (x / 32 + y / 32) % 2 == 0 { light } else { dark }
    });

    ImageContainer::new(DynamicImage::ImageRgba8(image), Some(ImageType::JPEG))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(url: &str) -> Url {
        Url::parse(url).unwrap()
    }

    #[test]
    fn test_matches_reserved_triple_only() {
        assert!(is_placeholder_url(&parse("placeholder://placeholder.com/placeholder.jpg")));
        assert!(is_placeholder_url(&parse(
            "placeholder://placeholder.com/any/depth/placeholder.jpg"
        )));

        assert!(!is_placeholder_url(&parse("https://placeholder.com/placeholder.jpg")));
        assert!(!is_placeholder_url(&parse("placeholder://example.com/placeholder.jpg")));
        assert!(!is_placeholder_url(&parse("placeholder://placeholder.com/placeholder.png")));
        assert!(!is_placeholder_url(&parse("placeholder://placeholder.com/placeholder.jpg/")));
        assert!(!is_placeholder_url(&parse("placeholder://placeholder.com")));
    }

    #[tokio::test]
    async fn test_placeholder_is_created_lazily_and_memoized() {
        let cache = PlaceholderCache::new();
        assert!(!cache.is_loaded());

        let miss = cache
            .retrieve_image(&parse("https://example.com/placeholder.jpg"))
            .await;
        assert!(miss.is_none());
        assert!(!cache.is_loaded());

        let url = parse("placeholder://placeholder.com/placeholder.jpg");
        let first = cache.retrieve_image(&url).await.unwrap();
        let second = cache.retrieve_image(&url).await.unwrap();

        assert!(cache.is_loaded());
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.dimensions(), PLACEHOLDER_SIZE);
    }
}
