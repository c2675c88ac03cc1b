use chrono::{DateTime, Duration, LocalResult, NaiveDate, TimeZone};

use crate::error::{ReminderError, Result};
use crate::request::{validate_hour, validate_minute};

/// Largest daylight-saving gap we step over when the requested wall time
/// does not exist on a given day.
const MAX_GAP_MINUTES: i64 = 180;

/// The first instant a daily trigger should fire, and how far away it is.
#[derive(Debug, Clone)]
pub struct Trigger<Tz: TimeZone> {
    pub fire_at: DateTime<Tz>,
    pub initial_delay: Duration,
}

/// Computes the next `hour:minute:00` strictly after `now`, in `now`'s zone.
///
/// If the time-of-day has already passed today, or is exactly `now`, the
/// trigger moves to the next calendar day. The delay is never negative.
pub fn next_trigger<Tz: TimeZone>(
    now: &DateTime<Tz>,
    hour: u32,
    minute: u32,
) -> Result<Trigger<Tz>> {
    let hour = validate_hour(hour as i64)?;
    let minute = validate_minute(minute as i64)?;
    let tz = now.timezone();
    let today = now.date_naive();

    let mut candidate = resolve_local(&tz, today, hour, minute)?;
    if candidate <= *now {
        let tomorrow = today
            .succ_opt()
            .ok_or(ReminderError::UnresolvableLocalTime {
                date: today,
                hour,
                minute,
            })?;
        candidate = resolve_local(&tz, tomorrow, hour, minute)?;
    }

    let initial_delay = candidate.clone().signed_duration_since(now.clone());
    Ok(Trigger {
        fire_at: candidate,
        initial_delay,
    })
}

fn resolve_local<Tz: TimeZone>(
    tz: &Tz,
    date: NaiveDate,
    hour: u32,
    minute: u32,
) -> Result<DateTime<Tz>> {
    let unresolvable = || ReminderError::UnresolvableLocalTime { date, hour, minute };
    let naive = date.and_hms_opt(hour, minute, 0).ok_or_else(unresolvable)?;
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(instant) => Ok(instant),
        LocalResult::Ambiguous(earliest, _) => Ok(earliest),
        LocalResult::None => (1..=MAX_GAP_MINUTES)
            .find_map(|offset| {
                tz.from_local_datetime(&(naive + Duration::minutes(offset)))
                    .earliest()
            })
            .ok_or_else(unresolvable),
    }
}
