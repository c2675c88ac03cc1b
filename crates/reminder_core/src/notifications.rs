use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::NotificationError;

pub const DEFAULT_CHANNEL_ID: &str = "heartshine_general";
pub const DEFAULT_CHANNEL_NAME: &str = "Daily reminders";
/// Intent extra that carries the payload back to the host application.
pub const PAYLOAD_EXTRA: &str = "notification_payload";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Importance {
    Low,
    Default,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
    Low,
    Default,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationChannel {
    pub id: String,
    pub name: String,
    pub importance: Importance,
}

impl NotificationChannel {
    pub fn new(id: impl Into<String>, name: impl Into<String>, importance: Importance) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            importance,
        }
    }
}

impl Default for NotificationChannel {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_ID, DEFAULT_CHANNEL_NAME, Importance::High)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IntentFlag {
    NewTask,
    ClearTop,
    SingleTop,
}

/// Deep link that brings the host application to the foreground.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryIntent {
    pub target: String,
    pub flags: Vec<IntentFlag>,
    pub extras: BTreeMap<String, String>,
}

impl DeliveryIntent {
    pub fn launch(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            flags: vec![IntentFlag::NewTask, IntentFlag::ClearTop, IntentFlag::SingleTop],
            extras: BTreeMap::new(),
        }
    }

    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.extras.insert(PAYLOAD_EXTRA.to_string(), payload.into());
        self
    }

    pub fn payload(&self) -> Option<&str> {
        self.extras.get(PAYLOAD_EXTRA).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub id: i32,
    pub channel_id: String,
    pub title: String,
    pub body: String,
    pub priority: Priority,
    pub auto_cancel: bool,
    pub intent: DeliveryIntent,
}

impl NotificationEvent {
    pub fn payload(&self) -> Option<&str> {
        self.intent.payload()
    }
}

/// Implemented by each platform's notification adapter.
pub trait NotificationSink: Send + Sync {
    /// Must be idempotent; hosts call it on every startup.
    fn register_channel(&self, channel: &NotificationChannel) -> Result<(), NotificationError>;
    fn notify(&self, event: &NotificationEvent) -> Result<(), NotificationError>;
}

/// Adapter for hosts without a native notification surface: notifications are
/// written to the tracing log.
#[derive(Debug, Default)]
pub struct LogNotificationSink {
    channels: RwLock<HashMap<String, NotificationChannel>>,
}

impl LogNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn channels(&self) -> Vec<NotificationChannel> {
        let mut channels: Vec<_> = self.channels.read().values().cloned().collect();
        channels.sort_by(|a, b| a.id.cmp(&b.id));
        channels
    }
}

impl NotificationSink for LogNotificationSink {
    fn register_channel(&self, channel: &NotificationChannel) -> Result<(), NotificationError> {
        let mut channels = self.channels.write();
        if channels.contains_key(&channel.id) {
            return Ok(());
        }
        info!(
            id = %channel.id,
            name = %channel.name,
            importance = ?channel.importance,
            "registered notification channel"
        );
        channels.insert(channel.id.clone(), channel.clone());
        Ok(())
    }

    fn notify(&self, event: &NotificationEvent) -> Result<(), NotificationError> {
        if !self.channels.read().contains_key(&event.channel_id) {
            return Err(NotificationError::ChannelNotRegistered(
                event.channel_id.clone(),
            ));
        }
        info!(
            id = event.id,
            channel = %event.channel_id,
            title = %event.title,
            body = %event.body,
            payload = event.payload().unwrap_or_default(),
            "notification posted"
        );
        Ok(())
    }
}
