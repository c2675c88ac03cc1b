pub mod clock;
pub mod delivery;
pub mod error;
pub mod notifications;
pub mod registry;
pub mod request;
pub mod runner;
pub mod scheduler;
pub mod trigger;
pub mod worker;

pub use crate::error::{ReminderError, Result};
pub use crate::request::ScheduleRequest;
pub use crate::scheduler::{
    DailyReminderScheduler, DailyReminderSchedulerBuilder, DAILY_REMINDER_TASK,
};
