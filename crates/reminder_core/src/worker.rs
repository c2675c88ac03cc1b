use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{instrument, warn};

use crate::error::WorkerError;
use crate::notifications::{
    DeliveryIntent, NotificationEvent, NotificationSink, Priority, DEFAULT_CHANNEL_ID,
};

pub const DAILY_REMINDER_NOTIFICATION_ID: i32 = 1;
pub const DAILY_REMINDER_TITLE: &str = "今天也辛苦了 💛";
pub const DAILY_REMINDER_BODY: &str = "花一點時間記錄一下今天的心情吧。";

/// Input handed to a [`Worker`] each time its task fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskContext {
    pub name: String,
    pub payload: String,
    /// Zero on the first try of a period, incremented on every retry.
    pub attempt: u32,
    pub scheduled_for: DateTime<Utc>,
}

pub trait Worker: Send + Sync {
    fn execute(&self, ctx: &TaskContext) -> Result<(), WorkerError>;
}

/// Posts the daily "record your mood" notification with a deep link back
/// into the host application.
pub struct DailyReminderWorker {
    sink: Arc<dyn NotificationSink>,
    launch_target: String,
    channel_id: String,
}

impl DailyReminderWorker {
    pub fn new(sink: Arc<dyn NotificationSink>, launch_target: impl Into<String>) -> Self {
        Self {
            sink,
            launch_target: launch_target.into(),
            channel_id: DEFAULT_CHANNEL_ID.to_string(),
        }
    }

    pub fn with_channel(mut self, channel_id: impl Into<String>) -> Self {
        self.channel_id = channel_id.into();
        self
    }

    pub fn build_event(&self, payload: &str) -> NotificationEvent {
        NotificationEvent {
            id: DAILY_REMINDER_NOTIFICATION_ID,
            channel_id: self.channel_id.clone(),
            title: DAILY_REMINDER_TITLE.to_string(),
            body: DAILY_REMINDER_BODY.to_string(),
            priority: Priority::High,
            auto_cancel: true,
            intent: DeliveryIntent::launch(&self.launch_target).with_payload(payload),
        }
    }
}

impl Worker for DailyReminderWorker {
    #[instrument(skip(self, ctx), fields(task = %ctx.name, attempt = ctx.attempt))]
    fn execute(&self, ctx: &TaskContext) -> Result<(), WorkerError> {
        let event = self.build_event(&ctx.payload);
        self.sink.notify(&event).map_err(|err| {
            warn!(%err, "notification surface rejected daily reminder");
            WorkerError::from(err)
        })
    }
}
