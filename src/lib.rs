#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]

//! # Bgtify
//!
//! Drop an image, get it back without its background.
//!
//! This library implements the single-image background removal flow: it
//! accepts exactly one image from a selection event, converts formats the
//! removal step cannot consume into JPEG, runs the background removal
//! capability, and keeps one observable state record with two preview
//! references (original and result) plus a download name.
//!
//! ## Features
//!
//! - **Intake boundary**: exactly one file of an accepted image type; anything else is ignored silently
//! - **Format normalization**: WebP, BMP, TIFF and GIF are downscaled to fit 1000x1000 and re-encoded as JPEG (quality 80)
//! - **Pluggable removal**: any [`BackgroundRemover`]; a pure Rust ONNX implementation via Tract ships behind the `tract` feature
//! - **Progress notifications**: the `compute:inference` phase is mapped to "processing" and "success" messages
//! - **Error boundary**: every failure becomes one error notification and a reset to idle
//! - **Single-writer state**: runs are sequenced, overlapping drops are refused and stale completions are discarded
//! - **CLI Integration**: Optional command-line interface (enable with `cli` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! # #[cfg(feature = "tract")]
//! # mod quick_start {
//! use bgtify::{FileIntake, Pipeline, PipelineConfig, TracingNotifier, TractRemover, TractRemoverConfig};
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let remover = TractRemover::load(&TractRemoverConfig::new("models/isnet.onnx"))?;
//! let pipeline = Pipeline::new(
//!     PipelineConfig::default(),
//!     Arc::new(remover),
//!     Arc::new(TracingNotifier),
//! )?;
//!
//! let file = FileIntake::load("portrait.webp").await?;
//! pipeline.handle_drop(vec![file]).await;
//!
//! if let Some(download) = pipeline.download() {
//!     download.save_in(".").await?; // writes portrait.png
//! }
//! # Ok(())
//! # }
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `tract` (default): Pure Rust ONNX segmentation remover
//! - `cli` (default): Command-line interface and console tracing
//! - `webp-support` (default): WebP decoding for the normalizer
//! - `tracing-json`: JSON log output for the CLI
//!
//! ### Library-Only Usage
//!
//! ```toml
//! [dependencies]
//! bgtify = { version = "0.1", default-features = false, features = ["tract", "webp-support"] }
//! ```

pub mod config;
pub mod error;
pub mod intake;
pub mod normalize;
pub mod notify;
pub mod pipeline;
pub mod preview;
pub mod removal;
pub mod state;
pub mod tracing_config;
pub mod types;

#[cfg(feature = "cli")]
pub mod cli;

pub use config::{
    IntakeConfig, NormalizerConfig, NotifierConfig, PipelineConfig, PipelineConfigBuilder,
    RemovalConfig, TranscodeFormat,
};
pub use error::{BgtifyError, FailureStage, Result};
pub use intake::{FileIntake, IntakeDecision, IntakeRejection};
pub use normalize::{FormatNormalizer, ImageTranscoder, TranscodeOptions, Transcoded, Transcoder};
pub use notify::{
    ChannelNotifier, NoOpNotifier, Notification, NotificationLevel, Notifier, RecordingNotifier,
    TracingNotifier,
};
pub use pipeline::{
    Admission, Download, IntakeOutcome, Pipeline, PipelineBuilder, RunOutcome, RunReport,
    RunTicket,
};
pub use preview::{PreviewLease, PreviewResource, PreviewStore};
pub use removal::{
    BackgroundRemover, ProgressClassifier, ProgressEvent, ProgressSignal, ProgressSink,
    RemovalAdapter,
};
#[cfg(feature = "tract")]
pub use removal::{TractRemover, TractRemoverConfig};
pub use state::{Phase, PipelineEvent, PipelineState, RunId};
pub use types::{MediaType, NormalizedFile, RemovalResult, SourceFile};
