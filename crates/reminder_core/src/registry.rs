use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use fs2::FileExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, instrument};

use crate::error::RegistryError;

/// What a caller asks the registry to run: a named periodic task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSpec {
    pub name: String,
    pub first_fire: DateTime<Utc>,
    pub period: Duration,
    pub payload: String,
}

/// A registration as persisted by a [`TaskRegistry`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub name: String,
    /// Bumped whenever a registration under the same name replaces this one.
    pub generation: u64,
    pub first_fire: DateTime<Utc>,
    pub next_fire: DateTime<Utc>,
    pub period_secs: i64,
    pub payload: String,
    pub registered_at: DateTime<Utc>,
    #[serde(default)]
    pub attempt: u32,
    #[serde(default)]
    pub last_run: Option<DateTime<Utc>>,
}

impl ScheduledTask {
    pub fn period(&self) -> Duration {
        Duration::seconds(self.period_secs)
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_fire <= now
    }

    /// The first slot of the fixed period grid anchored at `first_fire` that
    /// lies strictly after `now`.
    pub fn next_period_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        if now < self.first_fire || self.period_secs <= 0 {
            return self.first_fire;
        }
        let elapsed = now.signed_duration_since(self.first_fire).num_seconds();
        let periods = elapsed / self.period_secs + 1;
        self.first_fire + Duration::seconds(periods * self.period_secs)
    }

    /// Number of grid slots between `next_fire` and `now` that were never run.
    pub fn missed_periods(&self, now: DateTime<Utc>) -> i64 {
        if now < self.next_fire || self.period_secs <= 0 {
            return 0;
        }
        now.signed_duration_since(self.next_fire).num_seconds() / self.period_secs
    }
}

/// Durable, name-keyed registry of periodic tasks.
///
/// `register` replaces any existing task with the same name atomically and
/// `remove` is idempotent. `update` only writes runner bookkeeping back when
/// the stored generation still matches, so a run that raced with a replace
/// or a cancel cannot resurrect a stale registration.
pub trait TaskRegistry: Send + Sync {
    fn register(&self, spec: TaskSpec, registered_at: DateTime<Utc>)
        -> Result<ScheduledTask, RegistryError>;
    fn remove(&self, name: &str) -> Result<bool, RegistryError>;
    fn get(&self, name: &str) -> Result<Option<ScheduledTask>, RegistryError>;
    fn list(&self) -> Result<Vec<ScheduledTask>, RegistryError>;
    fn update(&self, task: &ScheduledTask) -> Result<bool, RegistryError>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RegistryState {
    next_generation: u64,
    tasks: BTreeMap<String, ScheduledTask>,
}

impl RegistryState {
    fn register(&mut self, spec: TaskSpec, registered_at: DateTime<Utc>) -> ScheduledTask {
        self.next_generation += 1;
        let task = ScheduledTask {
            name: spec.name.clone(),
            generation: self.next_generation,
            first_fire: spec.first_fire,
            next_fire: spec.first_fire,
            period_secs: spec.period.num_seconds(),
            payload: spec.payload,
            registered_at,
            attempt: 0,
            last_run: None,
        };
        if let Some(previous) = self.tasks.insert(spec.name, task.clone()) {
            debug!(
                name = %task.name,
                previous_generation = previous.generation,
                generation = task.generation,
                "replaced existing registration"
            );
        }
        task
    }

    fn update(&mut self, task: &ScheduledTask) -> bool {
        match self.tasks.get_mut(&task.name) {
            Some(stored) if stored.generation == task.generation => {
                *stored = task.clone();
                true
            }
            _ => false,
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryRegistry {
    state: Mutex<RegistryState>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TaskRegistry for MemoryRegistry {
    fn register(
        &self,
        spec: TaskSpec,
        registered_at: DateTime<Utc>,
    ) -> Result<ScheduledTask, RegistryError> {
        Ok(self.state.lock().register(spec, registered_at))
    }

    fn remove(&self, name: &str) -> Result<bool, RegistryError> {
        Ok(self.state.lock().tasks.remove(name).is_some())
    }

    fn get(&self, name: &str) -> Result<Option<ScheduledTask>, RegistryError> {
        Ok(self.state.lock().tasks.get(name).cloned())
    }

    fn list(&self) -> Result<Vec<ScheduledTask>, RegistryError> {
        Ok(self.state.lock().tasks.values().cloned().collect())
    }

    fn update(&self, task: &ScheduledTask) -> Result<bool, RegistryError> {
        Ok(self.state.lock().update(task))
    }
}

/// Registry persisted as a JSON document on disk.
///
/// Every operation takes an advisory lock on a `<path>.lock` sidecar, reads
/// the file, applies the change and writes it back through a uniquely named
/// temporary file and a rename. Processes sharing the file (a CLI next to a
/// long running host) therefore serialize their read-modify-write cycles.
#[derive(Debug)]
pub struct FileRegistry {
    path: PathBuf,
    lock_path: PathBuf,
    lock: Mutex<()>,
}

/// Held for the duration of one registry operation.
struct FileLock {
    file: File,
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

impl FileRegistry {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let path = path.as_ref().to_path_buf();
        let mut lock_path = path.clone().into_os_string();
        lock_path.push(".lock");
        let registry = Self {
            path,
            lock_path: PathBuf::from(lock_path),
            lock: Mutex::new(()),
        };
        // Surface a corrupt or unreadable file at open time rather than on
        // the first firing.
        let _lock = registry.lock_file(false)?;
        registry.load()?;
        Ok(registry)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: std::io::Error) -> RegistryError {
        RegistryError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn parent_dir(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    fn lock_file(&self, exclusive: bool) -> Result<FileLock, RegistryError> {
        fs::create_dir_all(self.parent_dir()).map_err(|err| self.io_err(err))?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.lock_path)
            .map_err(|err| self.io_err(err))?;
        let locked = if exclusive {
            file.lock_exclusive()
        } else {
            file.lock_shared()
        };
        locked.map_err(|err| self.io_err(err))?;
        Ok(FileLock { file })
    }

    fn load(&self) -> Result<RegistryState, RegistryError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(RegistryState::default()),
            Err(source) => return Err(self.io_err(source)),
        };
        if raw.trim().is_empty() {
            return Ok(RegistryState::default());
        }
        serde_json::from_str(&raw).map_err(|source| RegistryError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    fn store(&self, state: &RegistryState) -> Result<(), RegistryError> {
        let encoded = serde_json::to_vec_pretty(state).map_err(RegistryError::Encode)?;
        let mut staging =
            NamedTempFile::new_in(self.parent_dir()).map_err(|err| self.io_err(err))?;
        staging
            .write_all(&encoded)
            .and_then(|()| staging.as_file().sync_all())
            .map_err(|err| self.io_err(err))?;
        staging
            .persist(&self.path)
            .map_err(|err| self.io_err(err.error))?;
        Ok(())
    }

    fn read<T>(&self, apply: impl FnOnce(RegistryState) -> T) -> Result<T, RegistryError> {
        let _guard = self.lock.lock();
        let _lock = self.lock_file(false)?;
        Ok(apply(self.load()?))
    }

    /// Applies `apply` under the exclusive lock and writes the state back
    /// when it reports a change.
    fn mutate<T>(
        &self,
        apply: impl FnOnce(&mut RegistryState) -> (T, bool),
    ) -> Result<T, RegistryError> {
        let _guard = self.lock.lock();
        let _lock = self.lock_file(true)?;
        let mut state = self.load()?;
        let (outcome, changed) = apply(&mut state);
        if changed {
            self.store(&state)?;
        }
        Ok(outcome)
    }
}

impl TaskRegistry for FileRegistry {
    #[instrument(skip(self, spec), fields(name = %spec.name, path = %self.path.display()))]
    fn register(
        &self,
        spec: TaskSpec,
        registered_at: DateTime<Utc>,
    ) -> Result<ScheduledTask, RegistryError> {
        self.mutate(|state| (state.register(spec, registered_at), true))
    }

    fn remove(&self, name: &str) -> Result<bool, RegistryError> {
        self.mutate(|state| {
            let removed = state.tasks.remove(name).is_some();
            (removed, removed)
        })
    }

    fn get(&self, name: &str) -> Result<Option<ScheduledTask>, RegistryError> {
        self.read(|mut state| state.tasks.remove(name))
    }

    fn list(&self) -> Result<Vec<ScheduledTask>, RegistryError> {
        self.read(|state| state.tasks.into_values().collect())
    }

    fn update(&self, task: &ScheduledTask) -> Result<bool, RegistryError> {
        self.mutate(|state| {
            let updated = state.update(task);
            (updated, updated)
        })
    }
}
