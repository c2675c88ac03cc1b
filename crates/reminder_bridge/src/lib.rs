//! Method-call surface through which the application layer drives the daily
//! reminder, plus the push channel for notification taps.

use std::sync::Arc;

use chrono::{Local, TimeZone};
use reminder_core::delivery::{DeliveryOutcome, EventSink, PayloadDelivery};
use reminder_core::error::EventSinkError;
use reminder_core::notifications::DeliveryIntent;
use reminder_core::{DailyReminderScheduler, ReminderError, ScheduleRequest};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

pub const SCHEDULE_DAILY_NOTIFICATION: &str = "scheduleDailyNotification";
pub const CANCEL_DAILY_NOTIFICATION: &str = "cancelDailyNotification";
pub const GET_INITIAL_PAYLOAD: &str = "getInitialPayload";
pub const NOTIFICATION_TAPPED: &str = "notificationTapped";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodCall {
    pub method: String,
    #[serde(default)]
    pub arguments: Value,
}

impl MethodCall {
    pub fn new(method: impl Into<String>, arguments: Value) -> Self {
        Self {
            method: method.into(),
            arguments,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MethodResult {
    Success { value: Value },
    Error { code: String, message: String },
    NotImplemented,
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("invalid arguments for `{method}`: {reason}")]
    InvalidArgument { method: String, reason: String },
    #[error(transparent)]
    Reminder(#[from] ReminderError),
}

impl BridgeError {
    fn code(&self, fallback: &'static str) -> &'static str {
        match self {
            BridgeError::InvalidArgument { .. }
            | BridgeError::Reminder(ReminderError::InvalidHour(_))
            | BridgeError::Reminder(ReminderError::InvalidMinute(_)) => "invalid_argument",
            BridgeError::Reminder(_) => fallback,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScheduleArgs {
    hour: Option<i64>,
    minute: Option<i64>,
    payload: Option<String>,
}

/// Dispatches bridge calls for one host process. The event sink of the
/// current foreground session is attached and detached explicitly.
pub struct ReminderBridge<Tz: TimeZone = Local> {
    scheduler: DailyReminderScheduler<Tz>,
    delivery: Arc<PayloadDelivery>,
}

impl<Tz: TimeZone> ReminderBridge<Tz> {
    pub fn new(scheduler: DailyReminderScheduler<Tz>, delivery: Arc<PayloadDelivery>) -> Self {
        Self {
            scheduler,
            delivery,
        }
    }

    pub fn handle(&self, call: &MethodCall) -> MethodResult {
        debug!(method = %call.method, "bridge call");
        match call.method.as_str() {
            SCHEDULE_DAILY_NOTIFICATION => to_method_result(
                self.schedule_daily_notification(&call.arguments),
                "schedule_failed",
            ),
            CANCEL_DAILY_NOTIFICATION => {
                to_method_result(self.cancel_daily_notification(), "cancel_failed")
            }
            GET_INITIAL_PAYLOAD => MethodResult::Success {
                value: self.get_initial_payload().map_or(Value::Null, Value::String),
            },
            _ => MethodResult::NotImplemented,
        }
    }

    /// Absent arguments default to 22:00 and "/daily".
    pub fn schedule_daily_notification(&self, arguments: &Value) -> Result<bool, BridgeError> {
        let args: ScheduleArgs = if arguments.is_null() {
            ScheduleArgs::default()
        } else {
            serde_json::from_value(arguments.clone()).map_err(|err| {
                BridgeError::InvalidArgument {
                    method: SCHEDULE_DAILY_NOTIFICATION.to_string(),
                    reason: err.to_string(),
                }
            })?
        };
        let request = ScheduleRequest::from_parts(args.hour, args.minute, args.payload)?;
        self.scheduler.schedule(&request)?;
        Ok(true)
    }

    pub fn cancel_daily_notification(&self) -> Result<bool, BridgeError> {
        self.scheduler.cancel()?;
        Ok(true)
    }

    pub fn get_initial_payload(&self) -> Option<String> {
        self.delivery.take_initial_payload()
    }

    pub fn attach_session(&self, sink: Arc<dyn EventSink>) {
        self.delivery.attach(sink);
    }

    pub fn detach_session(&self) {
        self.delivery.detach();
    }

    /// Called by the host when an already running application is re-activated.
    pub fn on_new_intent(&self, intent: &DeliveryIntent) -> DeliveryOutcome {
        self.delivery.on_new_intent(intent)
    }
}

fn to_method_result(result: Result<bool, BridgeError>, fallback: &'static str) -> MethodResult {
    match result {
        Ok(value) => MethodResult::Success { value: json!(value) },
        Err(err) => {
            warn!(%err, "bridge call failed");
            MethodResult::Error {
                code: err.code(fallback).to_string(),
                message: err.to_string(),
            }
        }
    }
}

/// [`EventSink`] that forwards taps as `notificationTapped` method calls to
/// the application layer's message channel.
pub struct MethodChannelSink<F> {
    invoke: F,
}

impl<F> MethodChannelSink<F>
where
    F: Fn(MethodCall) -> Result<(), String> + Send + Sync,
{
    pub fn new(invoke: F) -> Self {
        Self { invoke }
    }
}

impl<F> EventSink for MethodChannelSink<F>
where
    F: Fn(MethodCall) -> Result<(), String> + Send + Sync,
{
    fn notification_tapped(&self, payload: &str) -> Result<(), EventSinkError> {
        (self.invoke)(MethodCall::new(
            NOTIFICATION_TAPPED,
            Value::String(payload.to_string()),
        ))
        .map_err(EventSinkError::Rejected)
    }
}
