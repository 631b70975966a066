use serde::{Deserialize, Serialize};
use std::{borrow::Cow, fmt};

/// Identifier of an encoded image byte-format, e.g. `public.jpeg`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ImageType(Cow<'static, str>);

impl ImageType {
    pub const JPEG: ImageType = ImageType(Cow::Borrowed("public.jpeg"));
    pub const PNG: ImageType = ImageType(Cow::Borrowed("public.png"));
    pub const GIF: ImageType = ImageType(Cow::Borrowed("com.compuserve.gif"));
    pub const WEBP: ImageType = ImageType(Cow::Borrowed("org.webmproject.webp"));
    pub const BMP: ImageType = ImageType(Cow::Borrowed("com.microsoft.bmp"));
    pub const TIFF: ImageType = ImageType(Cow::Borrowed("public.tiff"));
    pub const ICO: ImageType = ImageType(Cow::Borrowed("com.microsoft.ico"));

    pub const ALL: &'static [Self] = &[
        Self::JPEG,
        Self::PNG,
        Self::GIF,
        Self::WEBP,
        Self::BMP,
        Self::TIFF,
        Self::ICO,
    ];

    /// Custom identifier for formats outside the built-in set.
    pub fn custom(identifier: impl Into<String>) -> Self {
        Self(Cow::Owned(identifier.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn from_format(format: image::ImageFormat) -> Option<Self> {
        match format {
            image::ImageFormat::Jpeg => Some(Self::JPEG),
            image::ImageFormat::Png => Some(Self::PNG),
            image::ImageFormat::Gif => Some(Self::GIF),
            image::ImageFormat::WebP => Some(Self::WEBP),
            image::ImageFormat::Bmp => Some(Self::BMP),
            image::ImageFormat::Tiff => Some(Self::TIFF),
            image::ImageFormat::Ico => Some(Self::ICO),
            _ => None,
        }
    }

    pub fn to_format(&self) -> Option<image::ImageFormat> {
        match self.as_str() {
            "public.jpeg" => Some(image::ImageFormat::Jpeg),
            "public.png" => Some(image::ImageFormat::Png),
            "com.compuserve.gif" => Some(image::ImageFormat::Gif),
            "org.webmproject.webp" => Some(image::ImageFormat::WebP),
            "com.microsoft.bmp" => Some(image::ImageFormat::Bmp),
            "public.tiff" => Some(image::ImageFormat::Tiff),
            "com.microsoft.ico" => Some(image::ImageFormat::Ico),
            _ => None,
        }
    }

    /// Maps an HTTP `Content-Type` value (parameters ignored) to a known type.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        Self::ALL
            .iter()
            .find(|image_type| image_type.content_type() == Some(mime.as_str()))
            .cloned()
    }

    pub fn content_type(&self) -> Option<&'static str> {
        self.to_format().map(|format| format.to_mime_type())
    }
}

impl fmt::Display for ImageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub const ZERO: Dimensions = Dimensions {
        width: 0,
        height: 0,
    };

    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn aspect_ratio(&self) -> f64 {
        if self.height == 0 {
            return 0.0;
        }
        self.width as f64 / self.height as f64
    }

    /// Largest size with the same aspect ratio that fits inside `target`.
    /// Never scales up.
    pub fn scaled_to_fit(&self, target: Dimensions) -> Dimensions {
        if self.is_empty() || target.is_empty() {
            return *self;
        }
        if self.width <= target.width && self.height <= target.height {
            return *self;
        }

        let scale = f64::min(
            target.width as f64 / self.width as f64,
            target.height as f64 / self.height as f64,
        );

        Dimensions {
            width: ((self.width as f64 * scale).round() as u32).max(1),
            height: ((self.height as f64 * scale).round() as u32).max(1),
        }
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Where a fetched image was resolved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoadSource {
    MemoryCache,
    DiskCache,
    AdditionalCache,
    Network,
}

impl LoadSource {
    pub fn is_cache(self) -> bool {
        !matches!(self, LoadSource::Network)
    }
}

impl fmt::Display for LoadSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadSource::MemoryCache => write!(f, "Memory Cache"),
            LoadSource::DiskCache => write!(f, "Disk Cache"),
            LoadSource::AdditionalCache => write!(f, "Additional Cache"),
            LoadSource::Network => write!(f, "Network"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    Emergency,
    Alert,
    Critical,
    Error,
    Warning,
    Notice,
    Information,
    Debug,
}

impl LogLevel {
    pub const ALL: &'static [Self] = &[
        Self::Emergency,
        Self::Alert,
        Self::Critical,
        Self::Error,
        Self::Warning,
        Self::Notice,
        Self::Information,
        Self::Debug,
    ];

    pub fn bucket(self) -> LogBucket {
        match self {
            LogLevel::Emergency | LogLevel::Alert | LogLevel::Critical | LogLevel::Error => {
                LogBucket::Error
            }
            LogLevel::Warning => LogBucket::Warning,
            LogLevel::Notice | LogLevel::Information | LogLevel::Debug => LogBucket::Info,
        }
    }
}

/// Display bucket a [`LogLevel`] collapses into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogBucket {
    Error,
    Warning,
    Info,
}

impl LogBucket {
    pub const ALL: &'static [Self] = &[Self::Error, Self::Warning, Self::Info];

    pub fn tag(self) -> &'static str {
        match self {
            LogBucket::Error => "ERR",
            LogBucket::Warning => "WRN",
            LogBucket::Info => "INF",
        }
    }
}

impl fmt::Display for LogBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}
