//! Run events.
//!
//! A broadcast channel carrying one [`LogEntry`] per pipeline milestone and
//! per row outcome. Every entry is also emitted as a `tracing` event, so
//! nothing is lost when no one subscribes.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Severity of a run event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// A single run event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    /// 1-based data row the event is about, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row: Option<usize>,
}

impl LogEntry {
    pub fn info(message: impl Into<String>) -> Self {
        Self { level: LogLevel::Info, message: message.into(), row: None }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self { level: LogLevel::Success, message: message.into(), row: None }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self { level: LogLevel::Warning, message: message.into(), row: None }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { level: LogLevel::Error, message: message.into(), row: None }
    }

    pub fn for_row(mut self, row: usize) -> Self {
        self.row = Some(row);
        self
    }
}

/// Global broadcaster used when a pipeline is not given its own.
pub static LOG_BROADCASTER: Lazy<LogBroadcaster> = Lazy::new(LogBroadcaster::new);

/// Fans run events out to subscribers. Cloning shares the channel.
#[derive(Debug, Clone)]
pub struct LogBroadcaster {
    sender: broadcast::Sender<LogEntry>,
}

impl LogBroadcaster {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(100);
        Self { sender }
    }

    /// Emit to `tracing` and to all subscribers.
    pub fn log(&self, entry: LogEntry) {
        match (entry.level, entry.row) {
            (LogLevel::Info | LogLevel::Success, Some(row)) => tracing::info!(row, "{}", entry.message),
            (LogLevel::Info | LogLevel::Success, None) => tracing::info!("{}", entry.message),
            (LogLevel::Warning, Some(row)) => tracing::warn!(row, "{}", entry.message),
            (LogLevel::Warning, None) => tracing::warn!("{}", entry.message),
            (LogLevel::Error, Some(row)) => tracing::error!(row, "{}", entry.message),
            (LogLevel::Error, None) => tracing::error!("{}", entry.message),
        }

        // No receivers is fine.
        let _ = self.sender.send(entry);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
        self.sender.subscribe()
    }
}

impl Default for LogBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

pub fn log_info(msg: impl Into<String>) {
    LOG_BROADCASTER.log(LogEntry::info(msg));
}

pub fn log_success(msg: impl Into<String>) {
    LOG_BROADCASTER.log(LogEntry::success(msg));
}

pub fn log_warning(msg: impl Into<String>) {
    LOG_BROADCASTER.log(LogEntry::warning(msg));
}

pub fn log_error(msg: impl Into<String>) {
    LOG_BROADCASTER.log(LogEntry::error(msg));
}
