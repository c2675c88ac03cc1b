use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use crate::error::RegistryError;
use crate::registry::{ScheduledTask, TaskRegistry};
use crate::worker::{TaskContext, Worker};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total tries per period, the first run included.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Runs slower than this are reported, not interrupted.
    pub execution_budget: std::time::Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::seconds(30),
            max_backoff: Duration::minutes(5),
            execution_budget: std::time::Duration::from_secs(600),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based), doubling each time and
    /// never longer than `max_backoff`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(30);
        self.initial_backoff
            .checked_mul(1i32 << exponent)
            .map_or(self.max_backoff, |scaled| scaled.min(self.max_backoff))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RunOutcome {
    Succeeded,
    Retrying {
        attempt: u32,
        retry_at: DateTime<Utc>,
    },
    /// Every try of this period failed; the schedule moves on to the next one.
    Abandoned { attempts: u32 },
    /// The task was replaced or cancelled while it ran; the result is dropped.
    Superseded,
    NoWorker,
    InFlight,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunRecord {
    pub name: String,
    pub generation: u64,
    pub scheduled_for: DateTime<Utc>,
    pub outcome: RunOutcome,
    pub next_fire: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    pub registered: usize,
    /// Tasks whose fire time passed while nothing was running, with the number
    /// of whole periods skipped on top of the one that will still run.
    pub overdue: Vec<(String, i64)>,
    pub orphaned: Vec<String>,
}

/// Executes due tasks from a [`TaskRegistry`].
///
/// Missed periods are coalesced into a single run, and runs of the same task
/// name never overlap.
pub struct TaskRunner {
    registry: Arc<dyn TaskRegistry>,
    workers: RwLock<HashMap<String, Arc<dyn Worker>>>,
    in_flight: Mutex<HashSet<String>>,
    policy: RetryPolicy,
}

impl TaskRunner {
    pub fn new(registry: Arc<dyn TaskRegistry>, policy: RetryPolicy) -> Self {
        Self {
            registry,
            workers: RwLock::new(HashMap::new()),
            in_flight: Mutex::new(HashSet::new()),
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn register_worker(&self, name: impl Into<String>, worker: Arc<dyn Worker>) {
        self.workers.write().insert(name.into(), worker);
    }

    /// Sweep run once at process start.
    #[instrument(skip(self))]
    pub fn recover(&self, now: DateTime<Utc>) -> Result<RecoveryReport, RegistryError> {
        let tasks = self.registry.list()?;
        let workers = self.workers.read();
        let mut report = RecoveryReport {
            registered: tasks.len(),
            ..RecoveryReport::default()
        };
        for task in &tasks {
            if !workers.contains_key(&task.name) {
                warn!(name = %task.name, "registered task has no worker");
                report.orphaned.push(task.name.clone());
            }
            if task.is_due(now) {
                let missed = task.missed_periods(now);
                info!(
                    name = %task.name,
                    next_fire = %task.next_fire,
                    missed,
                    "task overdue after restart"
                );
                report.overdue.push((task.name.clone(), missed));
            }
        }
        info!(
            registered = report.registered,
            overdue = report.overdue.len(),
            "recovered task registry"
        );
        Ok(report)
    }

    pub fn next_wakeup(&self) -> Result<Option<DateTime<Utc>>, RegistryError> {
        Ok(self
            .registry
            .list()?
            .into_iter()
            .map(|task| task.next_fire)
            .min())
    }

    pub fn run_due(&self, now: DateTime<Utc>) -> Result<Vec<RunRecord>, RegistryError> {
        let due: Vec<ScheduledTask> = self
            .registry
            .list()?
            .into_iter()
            .filter(|task| task.is_due(now))
            .collect();
        let mut records = Vec::with_capacity(due.len());
        for task in due {
            records.push(self.run_task(task, now)?);
        }
        Ok(records)
    }

    #[instrument(skip(self, task), fields(name = %task.name, generation = task.generation))]
    fn run_task(
        &self,
        task: ScheduledTask,
        now: DateTime<Utc>,
    ) -> Result<RunRecord, RegistryError> {
        let record = |outcome, next_fire| RunRecord {
            name: task.name.clone(),
            generation: task.generation,
            scheduled_for: task.next_fire,
            outcome,
            next_fire,
        };

        let Some(worker) = self.workers.read().get(&task.name).cloned() else {
            warn!("no worker registered, leaving task pending");
            return Ok(record(RunOutcome::NoWorker, Some(task.next_fire)));
        };
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight, &task.name) else {
            debug!("previous run still in flight");
            return Ok(record(RunOutcome::InFlight, Some(task.next_fire)));
        };

        let ctx = TaskContext {
            name: task.name.clone(),
            payload: task.payload.clone(),
            attempt: task.attempt,
            scheduled_for: task.next_fire,
        };
        let started = Instant::now();
        let result = worker.execute(&ctx);
        let elapsed = started.elapsed();
        if elapsed > self.policy.execution_budget {
            warn!(
                ?elapsed,
                budget = ?self.policy.execution_budget,
                "task exceeded its execution budget"
            );
        }

        let current = match self.registry.get(&task.name)? {
            Some(current) if current.generation == task.generation => current,
            _ => {
                info!("task replaced or cancelled during execution, discarding result");
                return Ok(record(RunOutcome::Superseded, None));
            }
        };

        let mut updated = current;
        updated.last_run = Some(now);
        let outcome = match result {
            Ok(()) => {
                updated.attempt = 0;
                updated.next_fire = updated.next_period_after(now);
                info!(next_fire = %updated.next_fire, "task succeeded");
                RunOutcome::Succeeded
            }
            Err(err) => {
                let attempts = updated.attempt + 1;
                let next_period = updated.next_period_after(now);
                let retry_at = now + self.policy.backoff(attempts);
                // A retry that would reach the next slot belongs to that
                // period, which starts with a fresh attempt count.
                if attempts >= self.policy.max_attempts.max(1) || retry_at >= next_period {
                    updated.attempt = 0;
                    updated.next_fire = next_period;
                    error!(
                        %err,
                        attempts,
                        next_fire = %updated.next_fire,
                        "task failed permanently for this period"
                    );
                    RunOutcome::Abandoned { attempts }
                } else {
                    updated.attempt = attempts;
                    updated.next_fire = retry_at;
                    warn!(%err, attempt = attempts, %retry_at, "task failed, retrying");
                    RunOutcome::Retrying {
                        attempt: attempts,
                        retry_at,
                    }
                }
            }
        };

        if !self.registry.update(&updated)? {
            info!("task replaced or cancelled during execution, discarding result");
            return Ok(record(RunOutcome::Superseded, None));
        }
        Ok(record(outcome, Some(updated.next_fire)))
    }
}

struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<String>>,
    name: String,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(set: &'a Mutex<HashSet<String>>, name: &str) -> Option<Self> {
        if !set.lock().insert(name.to_string()) {
            return None;
        }
        Some(Self {
            set,
            name: name.to_string(),
        })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set.lock().remove(&self.name);
    }
}
