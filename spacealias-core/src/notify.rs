//! User-facing notifications

use std::sync::Mutex;
use tracing::{error, info, warn};

/// Generic failure message shown when a guarded action fails
pub const SOMETHING_WENT_WRONG: &str = "Oops, something went wrong!";

/// Notification severity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

/// Fire-and-forget notification sink (toast UI)
pub trait Notifier: Send + Sync {
    fn notify(&self, severity: Severity, message: &str);
}

/// Notifier that only writes to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, severity: Severity, message: &str) {
        match severity {
            Severity::Info | Severity::Success => info!(target: "notify", "{}", message),
            Severity::Warning => warn!(target: "notify", "{}", message),
            Severity::Error => error!(target: "notify", "{}", message),
        }
    }
}

/// Notifier that records every notification
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<(Severity, String)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(Severity, String)> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, severity: Severity, message: &str) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((severity, message.to_string()));
    }
}
