//! Format normalization service
//!
//! Inspects the declared media type of a [`SourceFile`] and either hands it
//! through untouched or transcodes it into a type the removal step consumes.
//! Transcoding also bounds the image dimensions, which caps the cost of the
//! removal computation for very large uploads.

use crate::config::{NormalizerConfig, TranscodeFormat};
use crate::error::{BgtifyError, Result};
use crate::types::{MediaType, NormalizedFile, SourceFile};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};
use std::io::Cursor;
use std::sync::Arc;

/// Parameters for a single transcoding call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranscodeOptions {
    pub max_width: u32,
    pub max_height: u32,
    pub output: TranscodeFormat,
    pub quality: u8,
}

impl From<&NormalizerConfig> for TranscodeOptions {
    fn from(config: &NormalizerConfig) -> Self {
        Self {
            max_width: config.max_width,
            max_height: config.max_height,
            output: config.output,
            quality: config.quality,
        }
    }
}

/// Output of a transcoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcoded {
    pub bytes: Vec<u8>,
    pub media_type: MediaType,
    pub dimensions: (u32, u32),
}

/// Capability: turn a source file into a bounded, consumable encoding
pub trait Transcoder: Send + Sync {
    /// Transcode `file` according to `options`
    ///
    /// # Errors
    /// - Malformed input or a media type without a decoder
    /// - Encoder failures
    fn transcode(&self, file: &SourceFile, options: &TranscodeOptions) -> Result<Transcoded>;
}

/// Transcoder backed by the `image` crate codecs
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageTranscoder;

impl ImageTranscoder {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn decode(file: &SourceFile) -> Result<DynamicImage> {
        let format = file.media_type().image_format().ok_or_else(|| {
            BgtifyError::normalization(format!(
                "No decoder available for {} ({})",
                file.media_type(),
                file.name()
            ))
        })?;

        image::load_from_memory_with_format(file.bytes(), format).map_err(|e| {
            BgtifyError::normalization(format!(
                "Failed to decode {} as {}: {e}",
                file.name(),
                file.media_type()
            ))
        })
    }

    /// Downscale to fit within the bounds, preserving aspect ratio. Never upscales.
    fn bound(image: DynamicImage, max_width: u32, max_height: u32) -> DynamicImage {
        let (width, height) = image.dimensions();
        if width <= max_width && height <= max_height {
            return image;
        }
        image.resize(max_width, max_height, FilterType::Triangle)
    }

    fn encode(image: &DynamicImage, options: &TranscodeOptions) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        let mut cursor = Cursor::new(&mut buffer);

        let written = match options.output {
            TranscodeFormat::Jpeg => {
                // JPEG carries no alpha channel
                let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
                let encoder = JpegEncoder::new_with_quality(&mut cursor, options.quality);
                rgb.write_with_encoder(encoder)
            },
            TranscodeFormat::Png => image.write_to(&mut cursor, ImageFormat::Png),
        };
        written.map_err(|e| {
            BgtifyError::normalization(format!("Failed to encode transcoded image: {e}"))
        })?;

        Ok(buffer)
    }
}

impl Transcoder for ImageTranscoder {
    fn transcode(&self, file: &SourceFile, options: &TranscodeOptions) -> Result<Transcoded> {
        let decoded = Self::decode(file)?;
        let original_dimensions = decoded.dimensions();
        let bounded = Self::bound(decoded, options.max_width, options.max_height);
        let dimensions = bounded.dimensions();
        let bytes = Self::encode(&bounded, options)?;

        tracing::debug!(
            file = %file.name(),
            from = %file.media_type(),
            to = %options.output.media_type(),
            ?original_dimensions,
            ?dimensions,
            size_bytes = bytes.len(),
            "Transcoded source file"
        );

        Ok(Transcoded {
            bytes,
            media_type: options.output.media_type(),
            dimensions,
        })
    }
}

/// Decides between pass-through and transcoding
#[derive(Clone)]
pub struct FormatNormalizer {
    transcoder: Arc<dyn Transcoder>,
    config: NormalizerConfig,
}

impl std::fmt::Debug for FormatNormalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormatNormalizer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl FormatNormalizer {
    /// Normalizer using the bundled `image` codecs
    #[must_use]
    pub fn new(config: NormalizerConfig) -> Self {
        Self::with_transcoder(config, Arc::new(ImageTranscoder::new()))
    }

    #[must_use]
    pub fn with_transcoder(config: NormalizerConfig, transcoder: Arc<dyn Transcoder>) -> Self {
        Self { transcoder, config }
    }

    #[must_use]
    pub fn config(&self) -> &NormalizerConfig {
        &self.config
    }

    /// Whether a file of this media type will be transcoded
    ///
    /// Types the remover cannot consume are always transcoded, whatever the
    /// configured set says.
    #[must_use]
    pub fn needs_transcoding(&self, media_type: &MediaType) -> bool {
        self.config.always_transcode
            || self.config.transcode_from.contains(media_type)
            || !media_type.is_removal_input()
    }

    /// Normalize on the current thread
    pub fn normalize_blocking(&self, file: SourceFile) -> Result<NormalizedFile> {
        if !self.needs_transcoding(file.media_type()) {
            tracing::debug!(file = %file.name(), media_type = %file.media_type(), "Passing source file through");
            return Ok(NormalizedFile::Passthrough(file));
        }

        let options = TranscodeOptions::from(&self.config);
        let transcoded = self.transcoder.transcode(&file, &options)?;
        Ok(NormalizedFile::Transcoded {
            source_name: file.name().to_string(),
            media_type: transcoded.media_type,
            bytes: transcoded.bytes.into(),
            dimensions: transcoded.dimensions,
        })
    }

    /// Normalize, moving any transcoding work onto the blocking pool
    pub async fn normalize(&self, file: SourceFile) -> Result<NormalizedFile> {
        if !self.needs_transcoding(file.media_type()) {
            return self.normalize_blocking(file);
        }

        let normalizer = self.clone();
        tokio::task::spawn_blocking(move || normalizer.normalize_blocking(file))
            .await
            .map_err(|e| BgtifyError::internal(format!("Transcoding task failed: {e}")))?
    }
}
