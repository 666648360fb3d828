//! Core data types flowing through the pipeline

use image::ImageFormat;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Declared media type of an image payload
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MediaType {
    /// `image/jpeg`
    Jpeg,
    /// `image/png`
    Png,
    /// `image/webp`
    WebP,
    /// `image/bmp`
    Bmp,
    /// `image/tiff`
    Tiff,
    /// `image/gif`
    Gif,
    /// `image/heic`, camera-native and not decodable by the bundled codecs
    Heic,
    /// Anything else, kept verbatim (lower-cased)
    Other(String),
}

impl MediaType {
    /// Parse a MIME essence string such as `image/png`
    #[must_use]
    pub fn parse(value: &str) -> Self {
        let essence = value
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match essence.as_str() {
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Self::Jpeg,
            "image/png" => Self::Png,
            "image/webp" => Self::WebP,
            "image/bmp" | "image/x-ms-bmp" => Self::Bmp,
            "image/tiff" => Self::Tiff,
            "image/gif" => Self::Gif,
            "image/heic" | "image/heif" => Self::Heic,
            _ => Self::Other(essence),
        }
    }

    /// Guess the media type from a file extension (without the dot)
    #[must_use]
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" | "jfif" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "webp" => Some(Self::WebP),
            "bmp" => Some(Self::Bmp),
            "tif" | "tiff" => Some(Self::Tiff),
            "gif" => Some(Self::Gif),
            "heic" | "heif" => Some(Self::Heic),
            _ => None,
        }
    }

    /// Map an `image` crate format to a media type
    #[must_use]
    pub fn from_image_format(format: ImageFormat) -> Self {
        match format {
            ImageFormat::Jpeg => Self::Jpeg,
            ImageFormat::Png => Self::Png,
            ImageFormat::WebP => Self::WebP,
            ImageFormat::Bmp => Self::Bmp,
            ImageFormat::Tiff => Self::Tiff,
            ImageFormat::Gif => Self::Gif,
            other => Self::Other(other.to_mime_type().to_string()),
        }
    }

    /// The `image` crate format used to decode this media type, if any
    #[must_use]
    pub fn image_format(&self) -> Option<ImageFormat> {
        match self {
            Self::Jpeg => Some(ImageFormat::Jpeg),
            Self::Png => Some(ImageFormat::Png),
            Self::WebP => Some(ImageFormat::WebP),
            Self::Bmp => Some(ImageFormat::Bmp),
            Self::Tiff => Some(ImageFormat::Tiff),
            Self::Gif => Some(ImageFormat::Gif),
            Self::Heic | Self::Other(_) => None,
        }
    }

    /// Whether removal capabilities consume this type as is
    #[must_use]
    pub fn is_removal_input(&self) -> bool {
        matches!(self, Self::Jpeg | Self::Png)
    }

    /// MIME essence string
    #[must_use]
    pub fn essence(&self) -> &str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::WebP => "image/webp",
            Self::Bmp => "image/bmp",
            Self::Tiff => "image/tiff",
            Self::Gif => "image/gif",
            Self::Heic => "image/heic",
            Self::Other(essence) => essence,
        }
    }

    /// Preferred file extension (without the dot)
    #[must_use]
    pub fn extension(&self) -> &str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::WebP => "webp",
            Self::Bmp => "bmp",
            Self::Tiff => "tiff",
            Self::Gif => "gif",
            Self::Heic => "heic",
            Self::Other(_) => "bin",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.essence())
    }
}

impl From<String> for MediaType {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<MediaType> for String {
    fn from(value: MediaType) -> Self {
        value.essence().to_string()
    }
}

/// The raw user-selected image before any processing.
///
/// Immutable once constructed; the payload is shared, never copied, when the
/// file is passed through to later stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    name: String,
    media_type: MediaType,
    bytes: Arc<[u8]>,
}

impl SourceFile {
    pub fn new<N: Into<String>, B: Into<Arc<[u8]>>>(
        name: N,
        media_type: MediaType,
        bytes: B,
    ) -> Self {
        Self {
            name: name.into(),
            media_type,
            bytes: bytes.into(),
        }
    }

    /// Display name, including the extension
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn media_type(&self) -> &MediaType {
        &self.media_type
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Shared handle to the payload
    #[must_use]
    pub fn payload(&self) -> Arc<[u8]> {
        Arc::clone(&self.bytes)
    }

    /// Display name with the final extension stripped
    #[must_use]
    pub fn derived_name(&self) -> String {
        strip_extension(&self.name)
    }
}

/// A file guaranteed to be in a media type the removal operation accepts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizedFile {
    /// The source file, handed over untouched
    Passthrough(SourceFile),
    /// A re-encoded (and possibly downscaled) rendition of the source
    Transcoded {
        /// Display name of the source this was derived from
        source_name: String,
        media_type: MediaType,
        bytes: Arc<[u8]>,
        /// Dimensions after transcoding
        dimensions: (u32, u32),
    },
}

impl NormalizedFile {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Passthrough(source) => source.name(),
            Self::Transcoded { source_name, .. } => source_name,
        }
    }

    #[must_use]
    pub fn media_type(&self) -> &MediaType {
        match self {
            Self::Passthrough(source) => source.media_type(),
            Self::Transcoded { media_type, .. } => media_type,
        }
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        match self {
            Self::Passthrough(source) => source.bytes(),
            Self::Transcoded { bytes, .. } => bytes,
        }
    }

    /// Shared handle to the payload
    #[must_use]
    pub fn payload(&self) -> Arc<[u8]> {
        match self {
            Self::Passthrough(source) => source.payload(),
            Self::Transcoded { bytes, .. } => Arc::clone(bytes),
        }
    }

    #[must_use]
    pub fn is_transcoded(&self) -> bool {
        matches!(self, Self::Transcoded { .. })
    }
}

/// The background-removed image payload returned by the removal operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovalResult {
    bytes: Arc<[u8]>,
    media_type: MediaType,
}

impl RemovalResult {
    /// Wrap an encoded payload of the given media type
    pub fn new<B: Into<Arc<[u8]>>>(bytes: B, media_type: MediaType) -> Self {
        Self {
            bytes: bytes.into(),
            media_type,
        }
    }

    /// Wrap a PNG-encoded payload
    pub fn png<B: Into<Arc<[u8]>>>(bytes: B) -> Self {
        Self::new(bytes, MediaType::Png)
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn payload(&self) -> Arc<[u8]> {
        Arc::clone(&self.bytes)
    }

    #[must_use]
    pub fn media_type(&self) -> &MediaType {
        &self.media_type
    }
}

/// Drop the final `.segment` of a file name.
///
/// `"photo.png"` becomes `"photo"` and `"a.b.c"` becomes `"a.b"`.
///
/// Names with no extension to drop (`"photo"`, `".png"`) are returned
/// unchanged. This deliberately differs from a plain "everything before the
/// last dot" split, which yields `""` for both, so the download is never
/// named `.png`.
#[must_use]
pub fn strip_extension(name: &str) -> String {
    match name.rfind('.') {
        Some(idx) if idx > 0 => name.get(..idx).unwrap_or(name).to_string(),
        _ => name.to_string(),
    }
}
