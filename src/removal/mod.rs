//! Background removal adapter
//!
//! The removal computation itself is an opaque capability
//! ([`BackgroundRemover`]). This module wraps it, listens to its progress
//! channel and turns the computation phase into user notifications:
//! - ONNX segmentation via Tract (pure Rust, feature `tract`)
//! - anything else implementing the trait (services, test doubles)

pub mod segmentation;

#[cfg(feature = "tract")]
pub mod tract;

#[cfg(feature = "tract")]
pub use self::tract::{TractRemover, TractRemoverConfig};

use crate::config::{NotifierConfig, RemovalConfig};
use crate::error::Result;
use crate::notify::{Notification, Notifier};
use crate::types::{NormalizedFile, RemovalResult};
use async_trait::async_trait;
use std::sync::Arc;

/// A `(phase, current, total)` progress triple
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub phase: String,
    pub current: u64,
    pub total: u64,
}

impl ProgressEvent {
    pub fn new<S: Into<String>>(phase: S, current: u64, total: u64) -> Self {
        Self {
            phase: phase.into(),
            current,
            total,
        }
    }
}

/// Receiver of progress events from a removal operation
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, event: ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn on_progress(&self, event: ProgressEvent) {
        self(event);
    }
}

/// Capability: remove the background of a normalized image
#[async_trait]
pub trait BackgroundRemover: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Run the removal, reporting progress on `progress`.
    ///
    /// Resolves exactly once, to the encoded result or a failure.
    ///
    /// # Errors
    /// - Any failure of the underlying operation; a description is optional
    async fn remove_background(
        &self,
        file: &NormalizedFile,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<RemovalResult>;
}

/// What a progress event means for the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressSignal {
    /// First computation event (`current == 0`)
    Started { current: u64, total: u64 },
    /// Any later computation event
    Succeeded,
    /// Not the computation phase
    Ignored,
}

/// Classifies progress events by the configured computation phase
#[derive(Debug, Clone)]
pub struct ProgressClassifier {
    inference_phase: String,
}

impl ProgressClassifier {
    pub fn new<S: Into<String>>(inference_phase: S) -> Self {
        Self {
            inference_phase: inference_phase.into(),
        }
    }

    #[must_use]
    pub fn classify(&self, event: &ProgressEvent) -> ProgressSignal {
        if event.phase != self.inference_phase {
            return ProgressSignal::Ignored;
        }
        if event.current == 0 {
            ProgressSignal::Started {
                current: event.current,
                total: event.total,
            }
        } else {
            ProgressSignal::Succeeded
        }
    }
}

/// Progress sink that turns computation events into notifications
struct NotifyingProgress {
    classifier: ProgressClassifier,
    notifier: Arc<dyn Notifier>,
    wording: NotifierConfig,
}

impl ProgressSink for NotifyingProgress {
    fn on_progress(&self, event: ProgressEvent) {
        tracing::trace!(
            phase = %event.phase,
            current = event.current,
            total = event.total,
            "Removal progress"
        );

        match self.classifier.classify(&event) {
            ProgressSignal::Started { current, total } => self.notifier.notify(
                Notification::info(self.wording.started_message(current, total)),
            ),
            ProgressSignal::Succeeded => self
                .notifier
                .notify(Notification::success(self.wording.succeeded_message.clone())),
            ProgressSignal::Ignored => {},
        }
    }
}

/// Invokes the removal capability and maps its progress to notifications.
///
/// Progress is advisory: the outcome is decided solely by the removal
/// future, never by the order or number of progress events.
#[derive(Clone)]
pub struct RemovalAdapter {
    remover: Arc<dyn BackgroundRemover>,
    notifier: Arc<dyn Notifier>,
    classifier: ProgressClassifier,
    wording: NotifierConfig,
}

impl RemovalAdapter {
    #[must_use]
    pub fn new(
        remover: Arc<dyn BackgroundRemover>,
        notifier: Arc<dyn Notifier>,
        config: &RemovalConfig,
        wording: NotifierConfig,
    ) -> Self {
        Self {
            remover,
            notifier,
            classifier: ProgressClassifier::new(config.inference_phase.clone()),
            wording,
        }
    }

    #[must_use]
    pub fn remover_name(&self) -> &str {
        self.remover.name()
    }

    /// Run the removal once. No retries; failures are forwarded unchanged.
    pub async fn remove(&self, file: &NormalizedFile) -> Result<RemovalResult> {
        let progress: Arc<dyn ProgressSink> = Arc::new(NotifyingProgress {
            classifier: self.classifier.clone(),
            notifier: Arc::clone(&self.notifier),
            wording: self.wording.clone(),
        });

        tracing::debug!(
            remover = %self.remover.name(),
            file = %file.name(),
            media_type = %file.media_type(),
            "Starting background removal"
        );

        let result = self.remover.remove_background(file, progress).await;

        match &result {
            Ok(removed) => tracing::debug!(
                remover = %self.remover.name(),
                size_bytes = removed.bytes().len(),
                "Background removal finished"
            ),
            Err(e) => tracing::debug!(remover = %self.remover.name(), error = %e, "Background removal failed"),
        }

        result
    }
}
