//! Encode/decode strategies for individual image formats.

use image::{AnimationDecoder, DynamicImage, ImageFormat, codecs::gif::GifDecoder};
use pipeline_types::ImageType;
use shared::image::{ImageProcessingError, load_image_with_format};
use std::io::Cursor;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("No codec registered for {0}")]
    NoCodec(ImageType),
    #[error("Data does not match any registered codec")]
    UnrecognizedData,
    #[error("Failed to decode image: {0}")]
    Decode(#[from] ImageProcessingError),
    #[error("Failed to encode {image_type}: {reason}")]
    Encode { image_type: ImageType, reason: String },
}

/// Strategy for one encoded image byte-format.
pub trait ImageCodec: Send + Sync {
    fn image_type(&self) -> ImageType;

    /// Whether `data` looks like this format (magic bytes).
    fn matches(&self, data: &[u8]) -> bool;

    fn decode(&self, data: &[u8]) -> Result<DynamicImage, CodecError>;

    /// `quality` is 1-100 where the format supports lossy output.
    fn encode(&self, image: &DynamicImage, quality: Option<u8>) -> Result<Vec<u8>, CodecError>;

    fn is_animated(&self, _data: &[u8]) -> bool {
        false
    }
}

/// Codec backed by the `image` crate for a single format.
#[derive(Debug, Clone)]
pub struct ImageCrateCodec {
    format: ImageFormat,
    image_type: ImageType,
}

impl ImageCrateCodec {
    /// Returns `None` for formats without an [`ImageType`] identifier.
    pub fn new(format: ImageFormat) -> Option<Self> {
        let image_type = ImageType::from_format(format)?;
        Some(Self { format, image_type })
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    fn encode_error(&self, err: impl ToString) -> CodecError {
        CodecError::Encode {
            image_type: self.image_type.clone(),
            reason: err.to_string(),
        }
    }
}

impl ImageCodec for ImageCrateCodec {
    fn image_type(&self) -> ImageType {
        self.image_type.clone()
    }

    fn matches(&self, data: &[u8]) -> bool {
        image::guess_format(data)
            .map(|format| format == self.format)
            .unwrap_or(false)
    }

    fn decode(&self, data: &[u8]) -> Result<DynamicImage, CodecError> {
        Ok(load_image_with_format(data, self.format)?)
    }

    fn encode(&self, image: &DynamicImage, quality: Option<u8>) -> Result<Vec<u8>, CodecError> {
        let mut out = Cursor::new(Vec::new());

        match self.format {
            ImageFormat::Jpeg => {
                // JPEG has no alpha channel
                let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
                let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(
                    &mut out,
                    quality.unwrap_or(85).clamp(1, 100),
                );
                rgb.write_with_encoder(encoder)
                    .map_err(|e| self.encode_error(e))?;
            }
            ImageFormat::Ico => {
                // ICO entries are limited to 256x256
                let rgba = if image.width() > 256 || image.height() > 256 {
                    image.thumbnail(256, 256).to_rgba8()
                } else {
                    image.to_rgba8()
                };
                DynamicImage::ImageRgba8(rgba)
                    .write_to(&mut out, self.format)
                    .map_err(|e| self.encode_error(e))?;
            }
            format => {
                DynamicImage::ImageRgba8(image.to_rgba8())
                    .write_to(&mut out, format)
                    .map_err(|e| self.encode_error(e))?;
            }
        }

        Ok(out.into_inner())
    }

    fn is_animated(&self, data: &[u8]) -> bool {
        if self.format != ImageFormat::Gif {
            return false;
        }

        GifDecoder::new(Cursor::new(data))
            .map(|decoder| decoder.into_frames().take(2).count() > 1)
            .unwrap_or(false)
    }
}

/// WebP support, registered explicitly rather than shipped in the default
/// catalogue. Encoding is lossless only.
#[derive(Debug, Clone, Default)]
pub struct WebpCodec;

impl WebpCodec {
    pub fn new() -> Self {
        Self
    }
}

impl ImageCodec for WebpCodec {
    fn image_type(&self) -> ImageType {
        ImageType::WEBP
    }

    fn matches(&self, data: &[u8]) -> bool {
        data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP"
    }

    fn decode(&self, data: &[u8]) -> Result<DynamicImage, CodecError> {
        Ok(load_image_with_format(data, ImageFormat::WebP)?)
    }

    fn encode(&self, image: &DynamicImage, _quality: Option<u8>) -> Result<Vec<u8>, CodecError> {
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(image.to_rgba8())
            .write_to(&mut out, ImageFormat::WebP)
            .map_err(|e| CodecError::Encode {
                image_type: ImageType::WEBP,
                reason: e.to_string(),
            })?;
        Ok(out.into_inner())
    }
}
