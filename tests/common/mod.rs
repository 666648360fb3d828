//! Shared fixtures for the pipeline integration tests
//!
//! Scripted removal capabilities, a gated remover for interleaving tests and
//! small in-memory images generated with `image`.

#![allow(dead_code)]

use async_trait::async_trait;
use bgtify::{
    BackgroundRemover, BgtifyError, MediaType, NormalizedFile, PipelineConfig, ProgressEvent,
    ProgressSink, RecordingNotifier, RemovalResult, Result, SourceFile, TranscodeOptions,
    Transcoded, Transcoder,
};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// Bytes the scripted removers return as their "PNG" result
pub const RESULT_BYTES: &[u8] = b"\x89PNG-cutout";

/// Encode a solid-colour image of the given size
pub fn encoded_image(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let image = RgbImage::from_pixel(width, height, Rgb([30, 120, 200]));
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut bytes), format)
        .expect("Failed to encode fixture image");
    bytes
}

pub fn png_file(name: &str) -> SourceFile {
    SourceFile::new(name, MediaType::Png, encoded_image(8, 6, ImageFormat::Png))
}

pub fn jpeg_file(name: &str) -> SourceFile {
    SourceFile::new(name, MediaType::Jpeg, encoded_image(8, 6, ImageFormat::Jpeg))
}

pub fn bmp_file(name: &str, width: u32, height: u32) -> SourceFile {
    SourceFile::new(name, MediaType::Bmp, encoded_image(width, height, ImageFormat::Bmp))
}

/// How a scripted removal resolves
#[derive(Debug, Clone)]
pub enum Outcome {
    Succeed(Vec<u8>),
    FailWith(String),
    FailSilently,
}

/// Removal capability that emits canned progress and resolves as told
pub struct ScriptedRemover {
    events: Vec<ProgressEvent>,
    outcome: Outcome,
    received: Mutex<Vec<NormalizedFile>>,
}

impl ScriptedRemover {
    pub fn new(outcome: Outcome) -> Self {
        Self {
            events: vec![
                ProgressEvent::new("fetch:model", 0, 2),
                ProgressEvent::new("compute:inference", 0, 1),
                ProgressEvent::new("compute:inference", 1, 1),
            ],
            outcome,
            received: Mutex::new(Vec::new()),
        }
    }

    pub fn succeeding() -> Self {
        Self::new(Outcome::Succeed(RESULT_BYTES.to_vec()))
    }

    pub fn with_events(mut self, events: Vec<ProgressEvent>) -> Self {
        self.events = events;
        self
    }

    /// Files handed to the capability, in call order
    pub fn received(&self) -> Vec<NormalizedFile> {
        self.received.lock().unwrap().clone()
    }
}

#[async_trait]
impl BackgroundRemover for ScriptedRemover {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn remove_background(
        &self,
        file: &NormalizedFile,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<RemovalResult> {
        self.received.lock().unwrap().push(file.clone());
        for event in &self.events {
            progress.on_progress(event.clone());
        }
        match &self.outcome {
            Outcome::Succeed(bytes) => Ok(RemovalResult::png(bytes.clone())),
            Outcome::FailWith(description) => Err(BgtifyError::removal(description.clone())),
            Outcome::FailSilently => Err(BgtifyError::removal_undescribed()),
        }
    }
}

/// Removal capability that blocks until released, to interleave events with
/// an in-flight run
pub struct GatedRemover {
    started: Notify,
    release: Notify,
    outcome: Outcome,
}

impl GatedRemover {
    pub fn new(outcome: Outcome) -> Self {
        Self {
            started: Notify::new(),
            release: Notify::new(),
            outcome,
        }
    }

    /// Wait until a run has entered the removal step
    pub async fn wait_started(&self) {
        self.started.notified().await;
    }

    /// Let the pending removal resolve
    pub fn release(&self) {
        self.release.notify_one();
    }
}

#[async_trait]
impl BackgroundRemover for GatedRemover {
    fn name(&self) -> &str {
        "gated"
    }

    async fn remove_background(
        &self,
        _file: &NormalizedFile,
        _progress: Arc<dyn ProgressSink>,
    ) -> Result<RemovalResult> {
        self.started.notify_one();
        self.release.notified().await;
        match &self.outcome {
            Outcome::Succeed(bytes) => Ok(RemovalResult::png(bytes.clone())),
            Outcome::FailWith(description) => Err(BgtifyError::removal(description.clone())),
            Outcome::FailSilently => Err(BgtifyError::removal_undescribed()),
        }
    }
}

/// Stand-in for a camera-native codec the bundled decoders cannot read:
/// always answers with a small JPEG
pub struct CameraTranscoder {
    calls: Mutex<Vec<TranscodeOptions>>,
}

impl CameraTranscoder {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<TranscodeOptions> {
        self.calls.lock().unwrap().clone()
    }
}

impl Transcoder for CameraTranscoder {
    fn transcode(&self, _file: &SourceFile, options: &TranscodeOptions) -> Result<Transcoded> {
        self.calls.lock().unwrap().push(*options);
        Ok(Transcoded {
            bytes: encoded_image(4, 4, ImageFormat::Jpeg),
            media_type: MediaType::Jpeg,
            dimensions: (4, 4),
        })
    }
}

pub fn recording_notifier() -> Arc<RecordingNotifier> {
    Arc::new(RecordingNotifier::new())
}

/// Default configuration that also accepts HEIC for transcoding
pub fn camera_config() -> PipelineConfig {
    PipelineConfig::builder()
        .transcode_from(MediaType::Heic)
        .build()
        .expect("Failed to build camera config")
}
