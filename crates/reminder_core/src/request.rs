use serde::Serialize;

use crate::error::{ReminderError, Result};

pub const DEFAULT_HOUR: u32 = 22;
pub const DEFAULT_MINUTE: u32 = 0;
pub const DEFAULT_PAYLOAD: &str = "/daily";

/// A caller's desired daily trigger time together with the payload that
/// should travel through to the foreground application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleRequest {
    hour: u32,
    minute: u32,
    payload: String,
}

impl ScheduleRequest {
    pub fn new(hour: i64, minute: i64, payload: impl Into<String>) -> Result<Self> {
        Ok(Self {
            hour: validate_hour(hour)?,
            minute: validate_minute(minute)?,
            payload: payload.into(),
        })
    }

    /// Defaults are only applied to parts that are absent. A present but
    /// out-of-range value is rejected.
    pub fn from_parts(
        hour: Option<i64>,
        minute: Option<i64>,
        payload: Option<String>,
    ) -> Result<Self> {
        Self::new(
            hour.unwrap_or(DEFAULT_HOUR as i64),
            minute.unwrap_or(DEFAULT_MINUTE as i64),
            payload.unwrap_or_else(|| DEFAULT_PAYLOAD.to_string()),
        )
    }

    pub fn hour(&self) -> u32 {
        self.hour
    }

    pub fn minute(&self) -> u32 {
        self.minute
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }
}

pub(crate) fn validate_hour(hour: i64) -> Result<u32> {
    if (0..=23).contains(&hour) {
        Ok(hour as u32)
    } else {
        Err(ReminderError::InvalidHour(hour))
    }
}

pub(crate) fn validate_minute(minute: i64) -> Result<u32> {
    if (0..=59).contains(&minute) {
        Ok(minute as u32)
    } else {
        Err(ReminderError::InvalidMinute(minute))
    }
}
