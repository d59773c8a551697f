//! ProjectLock - exclusive, crash-recoverable advisory lock on `.cortex/.lock`

use crate::models::config::LockConfig;
use crate::models::lock::LockRecord;
use crate::models::GovernancePaths;
use chrono::Utc;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use super::liveness;

/// An empty lock file younger than this is assumed to be mid-write by its
/// creator rather than abandoned.
const CREATION_GRACE: Duration = Duration::from_secs(2);

// =============================================================================
// Options and errors
// =============================================================================

/// Parameters for a single acquisition
#[derive(Debug, Clone)]
pub struct LockOptions {
    /// Diagnostic label written into the lock record
    pub command_name: String,
    /// Total time to wait for a live holder to go away
    pub timeout: Duration,
    /// Maximum hold age before a lock is reclaimable
    pub stale_after: Duration,
    /// Sleep between attempts
    pub poll_interval: Duration,
    /// Remove any existing lock, stale or not
    pub force_takeover: bool,
}

impl LockOptions {
    pub fn new(command_name: impl Into<String>) -> Self {
        Self::from_config(&LockConfig::default(), command_name)
    }

    pub fn from_config(config: &LockConfig, command_name: impl Into<String>) -> Self {
        Self {
            command_name: command_name.into(),
            timeout: config.timeout(),
            stale_after: config.stale_after(),
            poll_interval: config.poll_interval(),
            force_takeover: false,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn force_takeover(mut self, force: bool) -> Self {
        self.force_takeover = force;
        self
    }
}

/// Errors raised by the lock manager
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error(
        "lock_timeout: unable to acquire {} within {:.1}s; owner={}",
        .path.display(),
        .waited.as_secs_f64(),
        describe_holder(.holder)
    )]
    Timeout {
        path: PathBuf,
        waited: Duration,
        holder: Option<LockRecord>,
    },

    #[error("Failed to {action} lock file {}: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn describe_holder(holder: &Option<LockRecord>) -> String {
    match holder {
        Some(record) => format!(
            "pid {} running '{}' since {} (token {})",
            record.owner_process_id, record.command_name, record.created_at, record.token
        ),
        None => "unknown".to_string(),
    }
}

fn io_error<'a>(action: &'static str, path: &'a Path) -> impl FnOnce(io::Error) -> LockError + 'a {
    move |source| LockError::Io {
        action,
        path: path.to_path_buf(),
        source,
    }
}

// =============================================================================
// Staleness
// =============================================================================

/// Why an existing lock may be reclaimed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StaleReason {
    /// The record could not be parsed
    InvalidMetadata,
    /// The record is older than `stale_after`
    AgeExceeded,
    /// The owner process is confirmed dead
    OwnerProcessMissing,
}

impl StaleReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StaleReason::InvalidMetadata => "invalid_metadata",
            StaleReason::AgeExceeded => "age_exceeded",
            StaleReason::OwnerProcessMissing => "owner_process_missing",
        }
    }
}

/// Snapshot of whatever currently sits at the lock path
#[derive(Debug, Clone)]
enum ExistingLock {
    /// The file vanished between the failed create and the read
    Missing,
    /// Created but not yet written by its holder
    Empty { age: Option<Duration> },
    Unparsable { raw: String },
    Held { raw: String, record: LockRecord },
}

impl ExistingLock {
    fn read(path: &Path) -> Result<Self, LockError> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(ExistingLock::Missing),
            Err(e) => return Err(io_error("read", path)(e)),
        };

        if raw.trim().is_empty() {
            let age = fs::metadata(path)
                .and_then(|m| m.modified())
                .ok()
                .and_then(|modified| SystemTime::now().duration_since(modified).ok());
            return Ok(ExistingLock::Empty { age });
        }

        match serde_json::from_str::<LockRecord>(&raw) {
            Ok(record) => Ok(ExistingLock::Held { raw, record }),
            Err(_) => Ok(ExistingLock::Unparsable { raw }),
        }
    }

    fn record(&self) -> Option<&LockRecord> {
        match self {
            ExistingLock::Held { record, .. } => Some(record),
            _ => None,
        }
    }

    fn raw(&self) -> Option<&str> {
        match self {
            ExistingLock::Held { raw, .. } | ExistingLock::Unparsable { raw } => Some(raw),
            ExistingLock::Empty { .. } => Some(""),
            ExistingLock::Missing => None,
        }
    }

    fn stale_reason(&self, stale_after: Duration) -> Option<StaleReason> {
        match self {
            ExistingLock::Missing => None,
            ExistingLock::Empty { age } => match age {
                Some(age) if *age < CREATION_GRACE => None,
                _ => Some(StaleReason::InvalidMetadata),
            },
            ExistingLock::Unparsable { .. } => Some(StaleReason::InvalidMetadata),
            ExistingLock::Held { record, .. } => record_stale_reason(record, stale_after),
        }
    }
}

/// Judge a parsed lock record: too old, or owner confirmed dead
pub fn record_stale_reason(record: &LockRecord, stale_after: Duration) -> Option<StaleReason> {
    if !record.created_epoch.is_finite() {
        return Some(StaleReason::InvalidMetadata);
    }
    if record.age_seconds(Utc::now()) > stale_after.as_secs_f64() {
        return Some(StaleReason::AgeExceeded);
    }
    if liveness::probe(record.owner_process_id).is_dead() {
        return Some(StaleReason::OwnerProcessMissing);
    }
    None
}

/// Read-only view of the current lock, for diagnostics
#[derive(Debug, Clone, Serialize)]
pub struct LockInspection {
    pub locked: bool,
    pub holder: Option<LockRecord>,
    pub stale_reason: Option<StaleReason>,
}

/// Report who holds the project lock without touching it
pub fn inspect(paths: &GovernancePaths, stale_after: Duration) -> Result<LockInspection, LockError> {
    let existing = ExistingLock::read(&paths.lock_file())?;
    Ok(LockInspection {
        locked: !matches!(existing, ExistingLock::Missing),
        holder: existing.record().cloned(),
        stale_reason: existing.stale_reason(stale_after),
    })
}

// =============================================================================
// Lock guard
// =============================================================================

/// A held project lock. Released when dropped, including during unwinding.
#[derive(Debug)]
pub struct ProjectLock {
    root: PathBuf,
    path: PathBuf,
    record: LockRecord,
    released: bool,
}

impl ProjectLock {
    /// Acquire the lock for a governance root.
    ///
    /// Waits in `poll_interval` steps while a live holder has it, reclaims
    /// stale locks immediately, and gives up with [`LockError::Timeout`]
    /// once `timeout` has elapsed.
    pub fn acquire(paths: &GovernancePaths, options: &LockOptions) -> Result<Self, LockError> {
        let root = paths.root().to_path_buf();
        let path = paths.lock_file();
        fs::create_dir_all(&root).map_err(io_error("create directory for", &path))?;

        let record = LockRecord::for_current_process(&options.command_name);
        let payload = serialize_record(&record);
        let start = Instant::now();

        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    let written = file
                        .write_all(payload.as_bytes())
                        .and_then(|_| file.flush())
                        .and_then(|_| file.sync_all());
                    if let Err(e) = written {
                        drop(file);
                        let _ = fs::remove_file(&path);
                        return Err(io_error("write", &path)(e));
                    }

                    tracing::debug!(
                        path = %path.display(),
                        token = %record.token,
                        command = %record.command_name,
                        "acquired project lock"
                    );
                    return Ok(Self {
                        root,
                        path,
                        record,
                        released: false,
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
                Err(e) => return Err(io_error("create", &path)(e)),
            }

            let existing = ExistingLock::read(&path)?;
            if matches!(existing, ExistingLock::Missing) {
                continue;
            }

            let stale_reason = existing.stale_reason(options.stale_after);
            if stale_reason.is_some() || options.force_takeover {
                let reason = stale_reason.map(|r| r.as_str()).unwrap_or("force_takeover");
                tracing::warn!(
                    path = %path.display(),
                    reason,
                    holder = %describe_holder(&existing.record().cloned()),
                    "taking over project lock"
                );
                remove_if_unchanged(&path, &existing)?;
                continue;
            }

            if start.elapsed() >= options.timeout {
                return Err(LockError::Timeout {
                    path,
                    waited: start.elapsed(),
                    holder: existing.record().cloned(),
                });
            }
            std::thread::sleep(options.poll_interval);
        }
    }

    /// Run `f` while holding the lock; the lock is released on every exit path
    pub fn scoped<T, E, F>(paths: &GovernancePaths, options: &LockOptions, f: F) -> Result<T, E>
    where
        F: FnOnce(&ProjectLock) -> Result<T, E>,
        E: From<LockError>,
    {
        let guard = Self::acquire(paths, options)?;
        let result = f(&guard);
        guard.release()?;
        result
    }

    /// Governance root this lock protects
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&self) -> &LockRecord {
        &self.record
    }

    pub fn token(&self) -> &str {
        &self.record.token
    }

    /// Release explicitly, surfacing I/O errors.
    ///
    /// Returns `false` when the file no longer carries this holder's token
    /// (it was reclaimed by someone else) and was therefore left alone.
    pub fn release(mut self) -> Result<bool, LockError> {
        self.released = true;
        release_if_owned(&self.path, &self.record.token)
    }
}

impl Drop for ProjectLock {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(e) = release_if_owned(&self.path, &self.record.token) {
            tracing::warn!(error = %e, "failed to release project lock");
        }
    }
}

fn serialize_record(record: &LockRecord) -> String {
    let mut payload = serde_json::to_string_pretty(record).unwrap_or_default();
    payload.push('\n');
    payload
}

/// Delete the lock file only if it still carries `token`
fn release_if_owned(path: &Path, token: &str) -> Result<bool, LockError> {
    let existing = ExistingLock::read(path)?;
    let owned = existing.record().is_some_and(|r| r.token == token);
    if !owned {
        tracing::warn!(
            path = %path.display(),
            token,
            "project lock no longer ours; leaving it in place"
        );
        return Ok(false);
    }

    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(io_error("remove", path)(e)),
    }
    tracing::debug!(path = %path.display(), token, "released project lock");
    Ok(true)
}

/// Remove a lock judged stale, unless it changed since it was judged.
///
/// A reclaim landing between the re-read and the remove goes unnoticed.
fn remove_if_unchanged(path: &Path, judged: &ExistingLock) -> Result<(), LockError> {
    let current = ExistingLock::read(path)?;
    if current.raw() != judged.raw() {
        return Ok(());
    }
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(io_error("remove", path)(e)),
    }
}

// =============================================================================
// Tests
// =============================================================================
