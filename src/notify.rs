//! User-facing notifications
//!
//! This module keeps notification delivery apart from pipeline logic, so
//! different frontends can surface messages their own way.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc;

/// Severity of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Info,
    Success,
    Error,
}

/// A single human-readable message for the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl Notification {
    pub fn new<S: Into<String>>(level: NotificationLevel, message: S) -> Self {
        Self {
            level,
            message: message.into(),
            at: Utc::now(),
        }
    }

    pub fn info<S: Into<String>>(message: S) -> Self {
        Self::new(NotificationLevel::Info, message)
    }

    pub fn success<S: Into<String>>(message: S) -> Self {
        Self::new(NotificationLevel::Success, message)
    }

    pub fn error<S: Into<String>>(message: S) -> Self {
        Self::new(NotificationLevel::Error, message)
    }
}

/// Trait for surfacing notifications to the user
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Discards all notifications
#[derive(Debug, Default)]
pub struct NoOpNotifier;

impl Notifier for NoOpNotifier {
    fn notify(&self, _notification: Notification) {}
}

/// Forwards notifications to `tracing`
#[derive(Debug, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: Notification) {
        match notification.level {
            NotificationLevel::Info => tracing::info!("{}", notification.message),
            NotificationLevel::Success => tracing::info!("✅ {}", notification.message),
            NotificationLevel::Error => tracing::error!("❌ {}", notification.message),
        }
    }
}

/// Keeps every notification in memory, in delivery order
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    received: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything received so far
    #[must_use]
    pub fn notifications(&self) -> Vec<Notification> {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Messages of the given level, in order
    #[must_use]
    pub fn messages(&self, level: NotificationLevel) -> Vec<String> {
        self.notifications()
            .into_iter()
            .filter(|n| n.level == level)
            .map(|n| n.message)
            .collect()
    }

    /// Drain the recorded notifications
    pub fn take(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.received.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notification);
    }
}

/// Sends notifications over an unbounded channel, e.g. to a UI task
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    sender: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotifier {
    /// Create a notifier and the receiving end of its channel
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notification: Notification) {
        if self.sender.send(notification).is_err() {
            tracing::trace!("Notification receiver dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_notifier_keeps_order() {
        let notifier = RecordingNotifier::new();
        notifier.notify(Notification::info("Processing 0 of 1"));
        notifier.notify(Notification::success("Congratulations!"));
        notifier.notify(Notification::error("network error"));

        let all = notifier.notifications();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].level, NotificationLevel::Info);
        assert_eq!(notifier.messages(NotificationLevel::Error), vec!["network error"]);

        assert_eq!(notifier.take().len(), 3);
        assert!(notifier.notifications().is_empty());
    }

    #[tokio::test]
    async fn test_channel_notifier_delivers() {
        let (notifier, mut receiver) = ChannelNotifier::new();
        notifier.notify(Notification::success("done"));
        let received = receiver.recv().await.unwrap();
        assert_eq!(received.message, "done");

        drop(receiver);
        // Sending after the receiver is gone must not panic
        notifier.notify(Notification::info("ignored"));
    }

    #[test]
    fn test_notification_serializes_level() {
        let json = serde_json::to_value(Notification::error("boom")).unwrap();
        assert_eq!(json["level"], "error");
        assert_eq!(json["message"], "boom");
    }
}
