//! Fire-and-forget user notifications (toasts).

use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Success,
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct Notification {
    pub level: NotificationLevel,
    pub title: String,
    pub detail: Option<String>,
}

impl Notification {
    /// `"title: detail"`, or just the title.
    pub fn message(&self) -> String {
        match &self.detail {
            Some(detail) => format!("{}: {}", self.title, detail),
            None => self.title.clone(),
        }
    }
}

/// A surface that shows notifications. Return values are never consumed.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);

    fn success(&self, title: &str, detail: Option<&str>) {
        self.notify(build(NotificationLevel::Success, title, detail));
    }

    fn info(&self, title: &str, detail: Option<&str>) {
        self.notify(build(NotificationLevel::Info, title, detail));
    }

    fn warning(&self, title: &str, detail: Option<&str>) {
        self.notify(build(NotificationLevel::Warning, title, detail));
    }

    fn error(&self, title: &str, detail: Option<&str>) {
        self.notify(build(NotificationLevel::Error, title, detail));
    }
}

fn build(level: NotificationLevel, title: &str, detail: Option<&str>) -> Notification {
    Notification {
        level,
        title: title.to_string(),
        detail: detail.map(str::to_string),
    }
}

/// Sends notifications to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, n: Notification) {
        match n.level {
            NotificationLevel::Success | NotificationLevel::Info => info!("[Notify] {}", n.message()),
            NotificationLevel::Warning => warn!("[Notify] {}", n.message()),
            NotificationLevel::Error => error!("[Notify] {}", n.message()),
        }
    }
}

/// Keeps every notification so a host can drain them (and tests can inspect them).
#[derive(Debug, Default, Clone)]
pub struct RecordingNotifier {
    inner: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<Notification> {
        self.inner.lock().map(|v| v.clone()).unwrap_or_default()
    }

    /// Take and clear all pending notifications.
    pub fn drain(&self) -> Vec<Notification> {
        self.inner.lock().map(|mut v| std::mem::take(&mut *v)).unwrap_or_default()
    }

    pub fn titles(&self) -> Vec<String> {
        self.snapshot().into_iter().map(|n| n.title).collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        if let Ok(mut v) = self.inner.lock() {
            v.push(notification);
        }
    }
}
