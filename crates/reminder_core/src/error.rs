use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ReminderError>;

#[derive(Debug, Error)]
pub enum ReminderError {
    #[error("hour must be within 0..=23, got {0}")]
    InvalidHour(i64),
    #[error("minute must be within 0..=59, got {0}")]
    InvalidMinute(i64),
    #[error("no valid local time for {hour:02}:{minute:02} on {date}")]
    UnresolvableLocalTime {
        date: chrono::NaiveDate,
        hour: u32,
        minute: u32,
    },
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Failures raised by a [`crate::registry::TaskRegistry`] backend.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to access task registry at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("task registry at {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode task registry: {0}")]
    Encode(#[source] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotificationError {
    #[error("notification channel `{0}` has not been registered")]
    ChannelNotRegistered(String),
    #[error("notification surface rejected the notification: {0}")]
    Platform(String),
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("notification could not be shown: {0}")]
    Notification(#[from] NotificationError),
    #[error("task failed: {0}")]
    Failed(String),
}

/// Raised by a foreground event sink when a push cannot be handed over.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventSinkError {
    #[error("message bridge is not attached")]
    Detached,
    #[error("message bridge rejected the event: {0}")]
    Rejected(String),
}
