use crate::codec::{CodecError, ImageCodec, ImageCrateCodec};
use crate::container::ImageContainer;
use image::{DynamicImage, ImageFormat};
use pipeline_types::ImageType;
use std::sync::{Arc, RwLock};

const DEFAULT_FORMATS: &[ImageFormat] = &[
    ImageFormat::Jpeg,
    ImageFormat::Png,
    ImageFormat::Gif,
    ImageFormat::Bmp,
    ImageFormat::Tiff,
    ImageFormat::Ico,
];

/// Registry of codecs keyed by [`ImageType`]. Detection walks codecs in
/// registration order.
#[derive(Clone)]
pub struct CodecCatalogue {
    codecs: Arc<RwLock<Vec<(ImageType, Arc<dyn ImageCodec>)>>>,
}

impl std::fmt::Debug for CodecCatalogue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodecCatalogue")
            .field("image_types", &self.image_types())
            .finish()
    }
}

impl CodecCatalogue {
    pub fn empty() -> Self {
        Self {
            codecs: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Catalogue with the `image` crate backed codecs. WebP is left out.
    pub fn with_defaults() -> Self {
        let catalogue = Self::empty();

        for format in DEFAULT_FORMATS {
            if let Some(codec) = ImageCrateCodec::new(*format) {
                let image_type = codec.image_type();
                catalogue.set_codec(image_type, Arc::new(codec));
            }
        }

        catalogue
    }

    /// Registers `codec` for `image_type`, returning the codec it replaced.
    pub fn set_codec(
        &self,
        image_type: ImageType,
        codec: Arc<dyn ImageCodec>,
    ) -> Option<Arc<dyn ImageCodec>> {
        let Ok(mut codecs) = self.codecs.write() else {
            return None;
        };

        if let Some(slot) = codecs.iter_mut().find(|(ty, _)| *ty == image_type) {
            return Some(std::mem::replace(&mut slot.1, codec));
        }

        tracing::debug!("Registered codec for {image_type}");
        codecs.push((image_type, codec));
        None
    }

    pub fn remove_codec(&self, image_type: &ImageType) -> Option<Arc<dyn ImageCodec>> {
        let mut codecs = self.codecs.write().ok()?;
        let index = codecs.iter().position(|(ty, _)| ty == image_type)?;
        Some(codecs.remove(index).1)
    }

    pub fn codec(&self, image_type: &ImageType) -> Option<Arc<dyn ImageCodec>> {
        self.codecs
            .read()
            .ok()?
            .iter()
            .find(|(ty, _)| ty == image_type)
            .map(|(_, codec)| codec.clone())
    }

    pub fn image_types(&self) -> Vec<ImageType> {
        self.codecs
            .read()
            .map(|codecs| codecs.iter().map(|(ty, _)| ty.clone()).collect())
            .unwrap_or_default()
    }

    pub fn supports(&self, image_type: &ImageType) -> bool {
        self.codec(image_type).is_some()
    }

    pub fn detect_image_type(&self, data: &[u8]) -> Option<ImageType> {
        self.codecs
            .read()
            .ok()?
            .iter()
            .find(|(_, codec)| codec.matches(data))
            .map(|(ty, _)| ty.clone())
    }

    /// Decodes `data`, trying the hinted type first and falling back to
    /// detection when the hint is missing or wrong.
    pub fn decode(
        &self,
        data: &[u8],
        hint: Option<&ImageType>,
    ) -> Result<ImageContainer, CodecError> {
        let hinted = hint
            .and_then(|image_type| self.codec(image_type))
            .filter(|codec| codec.matches(data));

        let codec = match hinted {
            Some(codec) => codec,
            None => {
                let image_type = self
                    .detect_image_type(data)
                    .ok_or(CodecError::UnrecognizedData)?;
                self.codec(&image_type)
                    .ok_or(CodecError::NoCodec(image_type))?
            }
        };

        let image = codec.decode(data)?;
        let animated = codec.is_animated(data);

        Ok(ImageContainer::new(image, Some(codec.image_type())).with_animated(animated))
    }

    pub fn encode(
        &self,
        image: &DynamicImage,
        image_type: &ImageType,
        quality: Option<u8>,
    ) -> Result<Vec<u8>, CodecError> {
        let codec = self
            .codec(image_type)
            .ok_or_else(|| CodecError::NoCodec(image_type.clone()))?;
        codec.encode(image, quality)
    }
}

impl Default for CodecCatalogue {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::WebpCodec;
    use image::RgbaImage;

    fn sample() -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(5, 3, image::Rgba([1, 2, 3, 255])))
    }

    struct FakeCodec;

    impl ImageCodec for FakeCodec {
        fn image_type(&self) -> ImageType {
            ImageType::custom("com.example.fake")
        }

        fn matches(&self, data: &[u8]) -> bool {
            data.starts_with(b"FAKE")
        }

        fn decode(&self, _data: &[u8]) -> Result<DynamicImage, CodecError> {
            Ok(DynamicImage::ImageRgba8(RgbaImage::new(2, 2)))
        }

        fn encode(&self, _image: &DynamicImage, _quality: Option<u8>) -> Result<Vec<u8>, CodecError> {
            Ok(b"FAKE".to_vec())
        }
    }

    #[test]
    fn test_defaults_exclude_webp() {
        let catalogue = CodecCatalogue::with_defaults();

        assert!(catalogue.supports(&ImageType::JPEG));
        assert!(catalogue.supports(&ImageType::PNG));
        assert!(!catalogue.supports(&ImageType::WEBP));
        assert_eq!(catalogue.image_types().len(), DEFAULT_FORMATS.len());
    }

    #[test]
    fn test_set_codec_replaces_and_returns_previous() {
        let catalogue = CodecCatalogue::with_defaults();

        assert!(
            catalogue
                .set_codec(ImageType::WEBP, Arc::new(WebpCodec::new()))
                .is_none()
        );
        assert!(catalogue.supports(&ImageType::WEBP));

        let previous = catalogue.set_codec(ImageType::WEBP, Arc::new(WebpCodec::new()));
        assert!(previous.is_some());
        assert_eq!(catalogue.image_types().len(), DEFAULT_FORMATS.len() + 1);
    }

    #[test]
    fn test_detect_and_decode() {
        let catalogue = CodecCatalogue::with_defaults();
        let png = catalogue.encode(&sample(), &ImageType::PNG, None).unwrap();

        assert_eq!(catalogue.detect_image_type(&png), Some(ImageType::PNG));

        let container = catalogue.decode(&png, None).unwrap();
        assert_eq!(container.image_type(), Some(&ImageType::PNG));
        assert_eq!(container.dimensions().width, 5);

        // A wrong hint falls back to detection
        let container = catalogue.decode(&png, Some(&ImageType::JPEG)).unwrap();
        assert_eq!(container.image_type(), Some(&ImageType::PNG));
    }

    #[test]
    fn test_unknown_data_and_missing_codec() {
        let catalogue = CodecCatalogue::with_defaults();

        assert!(matches!(
            catalogue.decode(b"garbage bytes", None),
            Err(CodecError::UnrecognizedData)
        ));
        assert!(matches!(
            catalogue.encode(&sample(), &ImageType::WEBP, None),
            Err(CodecError::NoCodec(_))
        ));
    }

    #[test]
    fn test_remove_codec_disables_format() {
        let catalogue = CodecCatalogue::with_defaults();
        let png = catalogue.encode(&sample(), &ImageType::PNG, None).unwrap();

        assert!(catalogue.remove_codec(&ImageType::PNG).is_some());
        assert!(catalogue.remove_codec(&ImageType::PNG).is_none());
        assert!(catalogue.decode(&png, None).is_err());
    }

    #[test]
    fn test_custom_codec() {
        let catalogue = CodecCatalogue::empty();
        let fake = ImageType::custom("com.example.fake");
        catalogue.set_codec(fake.clone(), Arc::new(FakeCodec));

        let container = catalogue.decode(b"FAKE1234", None).unwrap();
        assert_eq!(container.image_type(), Some(&fake));
        assert_eq!(container.dimensions().width, 2);
    }
}
