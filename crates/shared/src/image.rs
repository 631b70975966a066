use fast_image_resize::images::Image;
use fast_image_resize::{PixelType, Resizer};
use image::{DynamicImage, RgbaImage};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImageProcessingError {
    #[error("Failed to load image: {0}")]
    LoadError(#[from] image::ImageError),

    #[error("Failed to resize image: {0}")]
    ResizeError(String),

    #[error("Unsupported image format")]
    UnsupportedFormat,

    #[error("Invalid image dimensions")]
    InvalidDimensions,
}

pub type ImageResult<T> = Result<T, ImageProcessingError>;

/// Size that fits inside `max_width` x `max_height` keeping the aspect ratio.
/// Images already inside the box keep their size.
pub fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if width == 0 || height == 0 || (width <= max_width && height <= max_height) {
        return (width, height);
    }

    let scale = f64::min(
        max_width as f64 / width as f64,
        max_height as f64 / height as f64,
    );

    (
        ((width as f64 * scale).round() as u32).max(1),
        ((height as f64 * scale).round() as u32).max(1),
    )
}

pub fn load_image_with_format(data: &[u8], format: image::ImageFormat) -> ImageResult<DynamicImage> {
    if data.is_empty() {
        return Err(ImageProcessingError::UnsupportedFormat);
    }
    let img = image::load_from_memory_with_format(data, format)?;
    Ok(img)
}

/// Downscales `image` to fit inside the box. Returns `None` when the image
/// already fits and no work was needed.
pub fn resize_to_fit(
    image: &DynamicImage,
    max_width: u32,
    max_height: u32,
) -> ImageResult<Option<RgbaImage>> {
    if max_width == 0 || max_height == 0 {
        return Err(ImageProcessingError::InvalidDimensions);
    }

    let (original_width, original_height) = (image.width(), image.height());
    let (width, height) = fit_within(original_width, original_height, max_width, max_height);
    if width == original_width && height == original_height {
        return Ok(None);
    }

    let src_image = Image::from_vec_u8(
        original_width,
        original_height,
        image.to_rgba8().into_raw(),
        PixelType::U8x4,
    )
    .map_err(|e| ImageProcessingError::ResizeError(e.to_string()))?;

    let mut dst_image = Image::new(width, height, PixelType::U8x4);

    let mut resizer = Resizer::new();
    resizer
        .resize(&src_image, &mut dst_image, None)
        .map_err(|e| ImageProcessingError::ResizeError(e.to_string()))?;

    RgbaImage::from_raw(width, height, dst_image.into_vec())
        .map(Some)
        .ok_or(ImageProcessingError::InvalidDimensions)
}

pub fn format_image_size(size_bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
    let mut size = size_bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.1} {}", size, UNITS[unit_index])
}
