use std::sync::Arc;

use chrono::{Duration, FixedOffset, TimeZone, Utc};
use parking_lot::Mutex;
use reminder_core::{
    clock::{Clock, ManualClock},
    delivery::{DeliveryOutcome, EventSink, PayloadDelivery},
    error::{EventSinkError, NotificationError},
    notifications::{NotificationChannel, NotificationEvent, NotificationSink},
    registry::{FileRegistry, TaskRegistry},
    runner::{RetryPolicy, RunOutcome, TaskRunner},
    worker::DailyReminderWorker,
    DailyReminderScheduler, ScheduleRequest, DAILY_REMINDER_TASK,
};
use tempfile::tempdir;

#[derive(Default)]
struct RecordingSink {
    channels: Mutex<Vec<String>>,
    posted: Mutex<Vec<NotificationEvent>>,
}

impl NotificationSink for RecordingSink {
    fn register_channel(&self, channel: &NotificationChannel) -> Result<(), NotificationError> {
        let mut channels = self.channels.lock();
        if !channels.contains(&channel.id) {
            channels.push(channel.id.clone());
        }
        Ok(())
    }

    fn notify(&self, event: &NotificationEvent) -> Result<(), NotificationError> {
        if !self.channels.lock().contains(&event.channel_id) {
            return Err(NotificationError::ChannelNotRegistered(event.channel_id.clone()));
        }
        self.posted.lock().push(event.clone());
        Ok(())
    }
}

#[derive(Default)]
struct AppLayer {
    taps: Mutex<Vec<String>>,
}

impl EventSink for AppLayer {
    fn notification_tapped(&self, payload: &str) -> Result<(), EventSinkError> {
        self.taps.lock().push(payload.to_string());
        Ok(())
    }
}

fn host(
    registry: Arc<FileRegistry>,
    clock: Arc<ManualClock>,
    sink: Arc<RecordingSink>,
) -> (DailyReminderScheduler<FixedOffset>, TaskRunner) {
    let taipei = FixedOffset::east_opt(8 * 3600).unwrap();
    let scheduler = DailyReminderScheduler::builder(registry.clone())
        .with_clock(clock)
        .with_time_zone(taipei)
        .build();
    sink.register_channel(&NotificationChannel::default())
        .expect("register channel");
    let runner = TaskRunner::new(registry, RetryPolicy::default());
    runner.register_worker(
        DAILY_REMINDER_TASK,
        Arc::new(DailyReminderWorker::new(sink, "tw.heartsshine.app")),
    );
    (scheduler, runner)
}

#[test]
fn schedule_survives_restart_and_delivers_tap_payload() {
    let temp = tempdir().expect("tempdir");
    let path = temp.path().join("reminders.json");
    // 2024-01-01 10:00 in Taipei.
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 2, 0, 0).unwrap()));

    {
        let registry = Arc::new(FileRegistry::open(&path).expect("open registry"));
        let sink = Arc::new(RecordingSink::default());
        let (scheduler, _runner) = host(registry, clock.clone(), sink);
        scheduler
            .schedule(&ScheduleRequest::new(22, 0, "/daily").unwrap())
            .expect("first schedule");
        scheduler
            .schedule(&ScheduleRequest::new(21, 30, "/evening").unwrap())
            .expect("second schedule");
    }

    // Process restarts after the fire time has passed.
    clock.set(Utc.with_ymd_and_hms(2024, 1, 1, 14, 0, 0).unwrap());
    let registry = Arc::new(FileRegistry::open(&path).expect("reopen registry"));
    let sink = Arc::new(RecordingSink::default());
    let (scheduler, runner) = host(registry.clone(), clock.clone(), sink.clone());

    let active = scheduler.active().unwrap().expect("schedule persisted");
    assert_eq!(active.payload, "/evening");
    assert_eq!(registry.list().unwrap().len(), 1);

    let report = runner.recover(clock.now()).unwrap();
    assert_eq!(report.overdue.len(), 1);

    let records = runner.run_due(clock.now()).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].outcome, RunOutcome::Succeeded);
    assert_eq!(
        records[0].next_fire,
        Some(Utc.with_ymd_and_hms(2024, 1, 2, 13, 30, 0).unwrap())
    );

    let posted = sink.posted.lock().clone();
    assert_eq!(posted.len(), 1);
    assert_eq!(posted[0].payload(), Some("/evening"));

    // Cold start from the notification.
    let cold = PayloadDelivery::cold_start(Some(&posted[0].intent));
    assert_eq!(cold.take_initial_payload().as_deref(), Some("/evening"));
    assert_eq!(cold.take_initial_payload(), None);

    // Resume with a session attached, then without one.
    let app = Arc::new(AppLayer::default());
    let warm = PayloadDelivery::new();
    warm.attach(app.clone());
    assert_eq!(warm.on_new_intent(&posted[0].intent), DeliveryOutcome::Delivered);
    warm.detach();
    assert!(matches!(
        warm.on_new_intent(&posted[0].intent),
        DeliveryOutcome::Dropped(EventSinkError::Detached)
    ));
    assert_eq!(*app.taps.lock(), vec!["/evening".to_string()]);
}

#[test]
fn cancel_prevents_further_firings() {
    let temp = tempdir().expect("tempdir");
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 2, 0, 0).unwrap()));
    let registry = Arc::new(FileRegistry::open(temp.path().join("reminders.json")).unwrap());
    let sink = Arc::new(RecordingSink::default());
    let (scheduler, runner) = host(registry, clock.clone(), sink.clone());

    assert!(!scheduler.cancel().expect("cancel without schedule"));
    scheduler
        .schedule(&ScheduleRequest::from_parts(None, None, None).unwrap())
        .unwrap();
    assert!(scheduler.cancel().unwrap());

    for day in 0..3 {
        let now = clock.advance(Duration::hours(24));
        assert!(runner.run_due(now).unwrap().is_empty(), "day {day} fired");
    }
    assert!(sink.posted.lock().is_empty());
    assert_eq!(runner.next_wakeup().unwrap(), None);
}
