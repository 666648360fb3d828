//! Error types for the intake, normalization and removal pipeline

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, BgtifyError>;

/// Stage of the pipeline a failure belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    /// Wrong file count or media type at the boundary (never surfaced)
    Intake,
    /// Transcoding the source file failed
    Normalization,
    /// The background removal operation failed
    Removal,
    /// Building preview resources from the result failed
    PreviewConstruction,
    /// Anything that is not part of a pipeline run (config, IO, ...)
    Other,
}

/// Error types for background removal pipeline operations
#[derive(Error, Debug)]
pub enum BgtifyError {
    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding or encoding errors
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Media type outside of the supported set
    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    /// The intake boundary refused the selection
    #[error("Intake rejected: {0}")]
    IntakeRejected(String),

    /// Another run is already in flight
    #[error("A background removal is already in progress")]
    Busy,

    /// Transcoding to a consumable format failed
    #[error("Normalization failed: {0}")]
    Normalization(String),

    /// The removal operation failed, optionally with a description
    #[error("Background removal failed{}", .description.as_deref().map(|d| format!(": {d}")).unwrap_or_default())]
    Removal { description: Option<String> },

    /// A preview reference could not be built from the result
    #[error("Preview construction failed: {0}")]
    PreviewConstruction(String),

    /// Configuration (de)serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BgtifyError {
    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new unsupported media type error
    pub fn unsupported_media_type<S: Into<String>>(media_type: S) -> Self {
        Self::UnsupportedMediaType(media_type.into())
    }

    /// Create a new intake rejection
    pub fn intake_rejected<S: Into<String>>(reason: S) -> Self {
        Self::IntakeRejected(reason.into())
    }

    /// Create a new normalization error
    pub fn normalization<S: Into<String>>(msg: S) -> Self {
        Self::Normalization(msg.into())
    }

    /// Create a removal error carrying a description
    pub fn removal<S: Into<String>>(description: S) -> Self {
        Self::Removal {
            description: Some(description.into()),
        }
    }

    /// Create a removal error without any description
    #[must_use]
    pub fn removal_undescribed() -> Self {
        Self::Removal { description: None }
    }

    /// Create a new preview construction error
    pub fn preview<S: Into<String>>(msg: S) -> Self {
        Self::PreviewConstruction(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Human-readable description of the failure, without the category prefix.
    ///
    /// Returns `None` only for removal failures that carried no description;
    /// callers substitute their fallback message in that case.
    #[must_use]
    pub fn description(&self) -> Option<String> {
        match self {
            Self::Removal { description } => description.clone(),
            Self::InvalidConfig(msg)
            | Self::UnsupportedMediaType(msg)
            | Self::IntakeRejected(msg)
            | Self::Normalization(msg)
            | Self::PreviewConstruction(msg)
            | Self::Internal(msg) => Some(msg.clone()),
            Self::Io(e) => Some(e.to_string()),
            Self::Image(e) => Some(e.to_string()),
            Self::Serialization(e) => Some(e.to_string()),
            Self::Busy => Some(self.to_string()),
        }
    }

    /// Pipeline stage this error is attributed to
    #[must_use]
    pub fn stage(&self) -> FailureStage {
        match self {
            Self::IntakeRejected(_) | Self::UnsupportedMediaType(_) | Self::Busy => {
                FailureStage::Intake
            },
            Self::Normalization(_) | Self::Image(_) => FailureStage::Normalization,
            Self::Removal { .. } => FailureStage::Removal,
            Self::PreviewConstruction(_) => FailureStage::PreviewConstruction,
            Self::Io(_) | Self::InvalidConfig(_) | Self::Serialization(_) | Self::Internal(_) => {
                FailureStage::Other
            },
        }
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {operation} '{path_display}': {error}"),
        ))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
    ) -> Self {
        Self::InvalidConfig(format!(
            "Invalid {parameter}: {value} (valid range: {valid_range})"
        ))
    }
}
