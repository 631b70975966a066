use crate::catalogue::CodecCatalogue;
use crate::codec::CodecError;
use crate::container::ImageContainer;
use image::DynamicImage;
use pipeline_types::{Dimensions, ImageType};
use shared::image::{ImageProcessingError, resize_to_fit};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("Failed to scale image: {0}")]
    Scale(#[from] ImageProcessingError),
    #[error("Task cancelled")]
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct DecodeRequest {
    pub data: Arc<[u8]>,
    pub hint: Option<ImageType>,
    /// Downscale to fit these dimensions after decoding
    pub target: Option<Dimensions>,
}

impl DecodeRequest {
    pub fn new(data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            data: data.into(),
            hint: None,
            target: None,
        }
    }

    pub fn with_hint(mut self, hint: Option<ImageType>) -> Self {
        self.hint = hint;
        self
    }

    pub fn with_target(mut self, target: Option<Dimensions>) -> Self {
        self.target = target;
        self
    }
}

/// Decodes on the rayon pool so the async runtime never blocks on pixels.
pub async fn decode_off_thread(
    catalogue: CodecCatalogue,
    request: DecodeRequest,
) -> Result<ImageContainer, DecodeError> {
    let (tx, rx) = tokio::sync::oneshot::channel();

    rayon::spawn(move || {
        let result = decode_sync(&catalogue, &request);
        let _ = tx.send(result);
    });

    rx.await.map_err(|_| DecodeError::Cancelled)?
}

/// Scales an already decoded image on the rayon pool.
pub async fn scale_off_thread(
    container: ImageContainer,
    target: Dimensions,
) -> Result<ImageContainer, DecodeError> {
    let (tx, rx) = tokio::sync::oneshot::channel();

    rayon::spawn(move || {
        let _ = tx.send(scale_to_fit(container, target));
    });

    rx.await.map_err(|_| DecodeError::Cancelled)?
}

pub fn decode_sync(
    catalogue: &CodecCatalogue,
    request: &DecodeRequest,
) -> Result<ImageContainer, DecodeError> {
    let container = catalogue.decode(&request.data, request.hint.as_ref())?;

    match request.target {
        Some(target) => scale_to_fit(container, target),
        None => Ok(container),
    }
}

pub fn scale_to_fit(
    container: ImageContainer,
    target: Dimensions,
) -> Result<ImageContainer, DecodeError> {
    if target.is_empty() {
        return Ok(container);
    }

    match resize_to_fit(container.image(), target.width, target.height)? {
        Some(scaled) => {
            let animated = container.is_animated();
            Ok(
                ImageContainer::new(DynamicImage::ImageRgba8(scaled), container.image_type().cloned())
                    .with_animated(animated),
            )
        }
        None => Ok(container),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let image = DynamicImage::ImageRgba8(RgbaImage::new(width, height));
        CodecCatalogue::with_defaults()
            .encode(&image, &ImageType::PNG, None)
            .unwrap()
    }

    #[tokio::test]
    async fn test_decode_off_thread() {
        let container = decode_off_thread(
            CodecCatalogue::with_defaults(),
            DecodeRequest::new(png(8, 6)).with_hint(Some(ImageType::PNG)),
        )
        .await
        .unwrap();

        assert_eq!(container.dimensions(), Dimensions::new(8, 6));
        assert_eq!(container.image_type(), Some(&ImageType::PNG));
    }

    #[tokio::test]
    async fn test_decode_with_target_scales_down() {
        let container = decode_off_thread(
            CodecCatalogue::with_defaults(),
            DecodeRequest::new(png(40, 20)).with_target(Some(Dimensions::new(10, 10))),
        )
        .await
        .unwrap();

        assert_eq!(container.dimensions(), Dimensions::new(10, 5));
        assert_eq!(container.image_type(), Some(&ImageType::PNG));
    }

    #[tokio::test]
    async fn test_decode_failure_propagates() {
        let result = decode_off_thread(
            CodecCatalogue::with_defaults(),
            DecodeRequest::new(b"nope".to_vec()),
        )
        .await;

        assert!(matches!(
            result,
            Err(DecodeError::Codec(CodecError::UnrecognizedData))
        ));
    }

    #[test]
    fn test_empty_target_is_ignored() {
        let container = decode_sync(
            &CodecCatalogue::with_defaults(),
            &DecodeRequest::new(png(4, 4)).with_target(Some(Dimensions::ZERO)),
        )
        .unwrap();

        assert_eq!(container.dimensions(), Dimensions::new(4, 4));
    }
}
