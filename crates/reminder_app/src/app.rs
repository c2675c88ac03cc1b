use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Local, Utc};
use reminder_core::clock::{Clock, SystemClock};
use reminder_core::notifications::{
    Importance, LogNotificationSink, NotificationChannel, NotificationSink, DEFAULT_CHANNEL_ID,
    DEFAULT_CHANNEL_NAME,
};
use reminder_core::registry::FileRegistry;
use reminder_core::runner::{RecoveryReport, RetryPolicy, RunRecord, TaskRunner};
use reminder_core::worker::DailyReminderWorker;
use reminder_core::{DailyReminderScheduler, DAILY_REMINDER_TASK};
use tracing::{debug, info, warn};

pub const DEFAULT_APP_ID: &str = "tw.heartsshine.app";
pub const DEFAULT_REGISTRY_FILE: &str = "reminders.json";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub(crate) registry_path: PathBuf,
    pub(crate) app_id: String,
    pub(crate) channel_name: String,
    pub(crate) poll_interval: StdDuration,
    pub(crate) retry: RetryPolicy,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            registry_path: PathBuf::from(DEFAULT_REGISTRY_FILE),
            app_id: DEFAULT_APP_ID.to_string(),
            channel_name: DEFAULT_CHANNEL_NAME.to_string(),
            poll_interval: StdDuration::from_secs(60),
            retry: RetryPolicy::default(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary variable source. Unparsable values
    /// are ignored and the default kept.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(path) = lookup("REMINDER_REGISTRY_PATH") {
            if !path.trim().is_empty() {
                config.registry_path = PathBuf::from(path.trim());
            }
        }
        if let Some(app_id) = lookup("REMINDER_APP_ID") {
            if !app_id.trim().is_empty() {
                config.app_id = app_id.trim().to_string();
            }
        }
        if let Some(name) = lookup("REMINDER_CHANNEL_NAME") {
            if !name.trim().is_empty() {
                config.channel_name = name.trim().to_string();
            }
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "REMINDER_POLL_SECONDS") {
            if secs > 0 {
                config.poll_interval = StdDuration::from_secs(secs);
            }
        }
        if let Some(attempts) = parse_var::<u32, _>(&lookup, "REMINDER_MAX_ATTEMPTS") {
            config.retry.max_attempts = attempts.max(1);
        }
        if let Some(secs) = parse_var::<i64, _>(&lookup, "REMINDER_INITIAL_BACKOFF_SECONDS") {
            match Duration::try_seconds(secs).filter(|backoff| *backoff > Duration::zero()) {
                Some(backoff) => config.retry.initial_backoff = backoff,
                None => warn!(secs, "ignoring out of range initial backoff"),
            }
        }
        config
    }

    pub fn registry_path(&self) -> &PathBuf {
        &self.registry_path
    }

    pub fn channel(&self) -> NotificationChannel {
        NotificationChannel::new(DEFAULT_CHANNEL_ID, self.channel_name.clone(), Importance::High)
    }
}

fn parse_var<T, L>(lookup: &L, key: &str) -> Option<T>
where
    T: FromStr,
    L: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparsable setting");
            None
        }
    }
}

/// Everything a host process needs: the durable registry, the notification
/// surface with its channel registered, and a runner that owns the worker.
pub struct ReminderHost {
    config: AppConfig,
    registry: Arc<FileRegistry>,
    runner: TaskRunner,
    clock: Arc<dyn Clock>,
}

impl ReminderHost {
    pub fn start(config: AppConfig) -> Result<Self> {
        Self::start_with(config, Arc::new(LogNotificationSink::new()), Arc::new(SystemClock))
    }

    pub fn start_with(
        config: AppConfig,
        sink: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let registry = Arc::new(
            FileRegistry::open(&config.registry_path).with_context(|| {
                format!(
                    "failed to open reminder registry at {}",
                    config.registry_path.display()
                )
            })?,
        );

        let channel = config.channel();
        sink.register_channel(&channel)
            .with_context(|| format!("failed to register notification channel `{}`", channel.id))?;

        let runner = TaskRunner::new(registry.clone(), config.retry.clone());
        let worker = DailyReminderWorker::new(sink, config.app_id.clone()).with_channel(channel.id);
        runner.register_worker(DAILY_REMINDER_TASK, Arc::new(worker));
        info!(registry = %config.registry_path.display(), "reminder host started");

        Ok(Self {
            config,
            registry,
            runner,
            clock,
        })
    }

    pub fn scheduler(&self) -> DailyReminderScheduler<Local> {
        DailyReminderScheduler::builder(self.registry.clone())
            .with_clock(self.clock.clone())
            .build()
    }

    pub fn recover(&self) -> Result<RecoveryReport> {
        self.runner
            .recover(self.clock.now())
            .context("failed to recover reminder registry")
    }

    pub fn run_once(&self) -> Result<Vec<RunRecord>> {
        self.runner
            .run_due(self.clock.now())
            .context("failed to run due reminders")
    }

    /// Runs due tasks until `should_stop` returns true, sleeping until the
    /// next fire time or the poll interval, whichever comes first.
    pub fn run(&self, should_stop: impl Fn() -> bool) -> Result<()> {
        self.recover()?;
        while !should_stop() {
            self.run_once()?;
            let next = self.runner.next_wakeup()?;
            let pause = sleep_for(self.clock.now(), next, self.config.poll_interval);
            debug!(?pause, ?next, "waiting for next reminder");
            std::thread::sleep(pause);
        }
        Ok(())
    }
}

fn sleep_for(now: DateTime<Utc>, next: Option<DateTime<Utc>>, poll: StdDuration) -> StdDuration {
    let Some(next) = next else {
        return poll;
    };
    match next.signed_duration_since(now).to_std() {
        Ok(until) => until.clamp(StdDuration::from_secs(1), poll),
        Err(_) => StdDuration::from_secs(1),
    }
}
