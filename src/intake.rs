//! File intake boundary
//!
//! Turns a drop/pick event carrying zero or more candidate files into at most
//! one accepted [`SourceFile`]. Rejections are silent: they never reach the
//! error boundary and never touch pipeline state.

use crate::config::IntakeConfig;
use crate::error::{BgtifyError, Result};
use crate::types::{MediaType, SourceFile};
use std::fmt;
use std::path::Path;

/// Why a selection was refused at the boundary
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntakeRejection {
    /// The event carried no files
    NoFiles,
    /// More than one file was offered
    TooManyFiles(usize),
    /// The single file has a media type outside the accepted set
    UnsupportedMediaType(MediaType),
}

impl fmt::Display for IntakeRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoFiles => write!(f, "no file selected"),
            Self::TooManyFiles(count) => write!(f, "{count} files selected, expected exactly one"),
            Self::UnsupportedMediaType(media_type) => {
                write!(f, "unsupported media type {media_type}")
            },
        }
    }
}

impl From<IntakeRejection> for BgtifyError {
    fn from(rejection: IntakeRejection) -> Self {
        match rejection {
            IntakeRejection::UnsupportedMediaType(media_type) => {
                BgtifyError::unsupported_media_type(media_type.essence())
            },
            other => BgtifyError::intake_rejected(other.to_string()),
        }
    }
}

/// Outcome of evaluating a selection event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntakeDecision {
    Accepted(SourceFile),
    Rejected(IntakeRejection),
}

/// Accepts exactly one file of an allowed image media type
#[derive(Debug, Clone)]
pub struct FileIntake {
    accepted: Vec<MediaType>,
}

impl FileIntake {
    #[must_use]
    pub fn new(config: &IntakeConfig) -> Self {
        Self {
            accepted: config.accepted.clone(),
        }
    }

    #[must_use]
    pub fn accepts(&self, media_type: &MediaType) -> bool {
        self.accepted.contains(media_type)
    }

    /// Media types this intake lets through
    #[must_use]
    pub fn accepted(&self) -> &[MediaType] {
        &self.accepted
    }

    /// Evaluate a selection event
    #[must_use]
    pub fn evaluate(&self, mut candidates: Vec<SourceFile>) -> IntakeDecision {
        match candidates.len() {
            0 => IntakeDecision::Rejected(IntakeRejection::NoFiles),
            1 => {
                let Some(file) = candidates.pop() else {
                    return IntakeDecision::Rejected(IntakeRejection::NoFiles);
                };
                if self.accepts(file.media_type()) {
                    IntakeDecision::Accepted(file)
                } else {
                    IntakeDecision::Rejected(IntakeRejection::UnsupportedMediaType(
                        file.media_type().clone(),
                    ))
                }
            },
            count => IntakeDecision::Rejected(IntakeRejection::TooManyFiles(count)),
        }
    }

    /// Read a file from disk into a [`SourceFile`].
    ///
    /// The declared media type comes from the extension, like a browser file
    /// picker; content sniffing is only used when the extension is unknown.
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<SourceFile> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| BgtifyError::file_io_error("read image file", path, &e))?;

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let media_type = declared_media_type(path, &bytes);
        tracing::debug!(
            file = %name,
            media_type = %media_type,
            size_bytes = bytes.len(),
            "Loaded source file"
        );

        Ok(SourceFile::new(name, media_type, bytes))
    }
}

fn declared_media_type(path: &Path, bytes: &[u8]) -> MediaType {
    path.extension()
        .and_then(|ext| ext.to_str())
        .and_then(MediaType::from_extension)
        .or_else(|| image::guess_format(bytes).ok().map(MediaType::from_image_format))
        .unwrap_or_else(|| MediaType::Other("application/octet-stream".to_string()))
}
