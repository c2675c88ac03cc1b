use std::sync::Arc;

use chrono::{Duration, Local, TimeZone};
use tracing::{info, instrument};

use crate::clock::{Clock, SystemClock};
use crate::error::Result;
use crate::registry::{ScheduledTask, TaskRegistry, TaskSpec};
use crate::request::ScheduleRequest;
use crate::trigger::next_trigger;

/// Logical name of the one daily reminder slot.
pub const DAILY_REMINDER_TASK: &str = "daily_reminder";

pub fn daily_period() -> Duration {
    Duration::hours(24)
}

/// Registers and cancels the daily reminder in a durable [`TaskRegistry`].
pub struct DailyReminderScheduler<Tz: TimeZone = Local> {
    registry: Arc<dyn TaskRegistry>,
    clock: Arc<dyn Clock>,
    tz: Tz,
}

pub struct DailyReminderSchedulerBuilder<Tz: TimeZone> {
    registry: Arc<dyn TaskRegistry>,
    clock: Arc<dyn Clock>,
    tz: Tz,
}

impl DailyReminderScheduler<Local> {
    pub fn builder(registry: Arc<dyn TaskRegistry>) -> DailyReminderSchedulerBuilder<Local> {
        DailyReminderSchedulerBuilder {
            registry,
            clock: Arc::new(SystemClock),
            tz: Local,
        }
    }
}

impl<Tz: TimeZone> DailyReminderSchedulerBuilder<Tz> {
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_time_zone<Tz2: TimeZone>(self, tz: Tz2) -> DailyReminderSchedulerBuilder<Tz2> {
        DailyReminderSchedulerBuilder {
            registry: self.registry,
            clock: self.clock,
            tz,
        }
    }

    pub fn build(self) -> DailyReminderScheduler<Tz> {
        DailyReminderScheduler {
            registry: self.registry,
            clock: self.clock,
            tz: self.tz,
        }
    }
}

impl<Tz: TimeZone> DailyReminderScheduler<Tz> {
    /// Replaces any existing daily reminder with one firing at the request's
    /// time-of-day, first at the next occurrence after now and then every
    /// 24 hours.
    #[instrument(skip(self, request), fields(hour = request.hour(), minute = request.minute()))]
    pub fn schedule(&self, request: &ScheduleRequest) -> Result<ScheduledTask> {
        let now = self.clock.now();
        let local_now = now.with_timezone(&self.tz);
        let trigger = next_trigger(&local_now, request.hour(), request.minute())?;
        let first_fire = trigger.fire_at.with_timezone(&chrono::Utc);

        let task = self.registry.register(
            TaskSpec {
                name: DAILY_REMINDER_TASK.to_string(),
                first_fire,
                period: daily_period(),
                payload: request.payload().to_string(),
            },
            now,
        )?;
        info!(
            %first_fire,
            delay_secs = trigger.initial_delay.num_seconds(),
            generation = task.generation,
            "daily reminder scheduled"
        );
        Ok(task)
    }

    /// Removes the daily reminder. Returns whether one was registered.
    #[instrument(skip(self))]
    pub fn cancel(&self) -> Result<bool> {
        let removed = self.registry.remove(DAILY_REMINDER_TASK)?;
        info!(removed, "daily reminder cancelled");
        Ok(removed)
    }

    pub fn active(&self) -> Result<Option<ScheduledTask>> {
        Ok(self.registry.get(DAILY_REMINDER_TASK)?)
    }
}
