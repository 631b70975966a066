use image::DynamicImage;
use pipeline_types::{Dimensions, ImageType};
use std::sync::Arc;

/// A decoded image plus what the pipeline knows about it.
#[derive(Clone)]
pub struct ImageContainer {
    image: Arc<DynamicImage>,
    image_type: Option<ImageType>,
    dimensions: Dimensions,
    animated: bool,
}

impl std::fmt::Debug for ImageContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageContainer")
            .field("image_type", &self.image_type)
            .field("dimensions", &self.dimensions)
            .field("animated", &self.animated)
            .finish_non_exhaustive()
    }
}

impl ImageContainer {
    pub fn new(image: DynamicImage, image_type: Option<ImageType>) -> Self {
        let dimensions = Dimensions::new(image.width(), image.height());
        Self {
            image: Arc::new(image),
            image_type,
            dimensions,
            animated: false,
        }
    }

    pub fn with_animated(mut self, animated: bool) -> Self {
        self.animated = animated;
        self
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    pub fn image_type(&self) -> Option<&ImageType> {
        self.image_type.as_ref()
    }

    pub fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    pub fn is_animated(&self) -> bool {
        self.animated
    }

    /// Approximate memory held by the decoded pixels.
    pub fn byte_cost(&self) -> usize {
        let bytes_per_pixel = self.image.color().bytes_per_pixel() as u64;
        (self.dimensions.pixel_count() * bytes_per_pixel) as usize
    }
}
