//! Durable, lock-guarded store of job status records.
//!
//! One JSON file per job id under the jobs directory. Every operation runs
//! inside a critical section guarded by an advisory lock on a `.lock` file
//! in the same directory, which is valid across threads and across the
//! separately spawned worker processes of process dispatch, where an
//! in-process mutex cannot reach. Writes go through a temp file plus rename
//! so an interrupted writer never leaves a torn record behind.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::error::{DaaError, Result};
use crate::job::{JobRecord, JobStatus};

const LOCK_FILE: &str = ".lock";

/// Directory-backed job record store. Cheap to clone a handle to: all state
/// lives on disk, so parent and respawned worker processes open their own.
#[derive(Debug, Clone)]
pub struct JobStore {
    dir: PathBuf,
}

/// Holds the store-wide advisory lock; released on drop.
struct StoreGuard {
    file: File,
}

impl Drop for StoreGuard {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

impl JobStore {
    /// Open (creating if needed) the store at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(JobStore { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.dir.join(id)
    }

    /// Acquire the store-wide lock, blocking until it is free.
    fn lock(&self) -> Result<StoreGuard> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.dir.join(LOCK_FILE))?;
        file.lock()?;
        Ok(StoreGuard { file })
    }

    /// Create the record for a freshly accepted job. Fails with
    /// [`DaaError::DuplicateJob`] if a record with this id already exists.
    /// Stamps `created_time` (and `end_time` for the degenerate case of a
    /// record created directly in a terminal state).
    pub fn create(&self, job: &mut JobRecord) -> Result<()> {
        let _guard = self.lock()?;
        let path = self.record_path(&job.id);
        if path.is_file() {
            return Err(DaaError::DuplicateJob(job.id.clone()));
        }
        let now = Utc::now();
        job.created_time = Some(now);
        if job.status.is_terminal() {
            job.end_time = Some(now);
        }
        self.write_record(job)
    }

    /// Current record for `id`, or the `NA` sentinel if no file exists.
    /// "Never existed" and "deleted" both read as `NA`; neither is an error.
    pub fn read(&self, id: &str) -> Result<JobRecord> {
        let _guard = self.lock()?;
        self.read_unlocked(id)
    }

    /// Transition the record to `new_status`, merging in the caller's view
    /// of the job (usage metrics in particular). When `expected_prev` is
    /// given, the transition only happens if the on-disk status matches;
    /// otherwise [`DaaError::UnexpectedStatus`] is returned and nothing is
    /// written. Terminal transitions stamp `end_time`. Returns the record
    /// as written.
    pub fn update(
        &self,
        job: &JobRecord,
        new_status: JobStatus,
        expected_prev: Option<JobStatus>,
        reason_message: Option<String>,
        reason_code: Option<u32>,
    ) -> Result<JobRecord> {
        let _guard = self.lock()?;
        let current = self.read_unlocked(&job.id)?;
        if current.status == JobStatus::Na {
            return Err(DaaError::JobNotFound(job.id.clone()));
        }
        if let Some(expected) = expected_prev {
            if current.status != expected {
                return Err(DaaError::UnexpectedStatus {
                    id: job.id.clone(),
                    actual: current.status,
                    expected,
                });
            }
        }
        // Terminal states are final regardless of what the caller expected.
        if current.status.is_terminal() {
            return Err(DaaError::UnexpectedStatus {
                id: job.id.clone(),
                actual: current.status,
                expected: JobStatus::Running,
            });
        }

        let mut merged = job.clone();
        merged.status = new_status;
        merged.created_time = current.created_time;
        if new_status.is_terminal() {
            merged.end_time = Some(Utc::now());
        }
        if reason_message.is_some() {
            merged.reason_message = reason_message;
        }
        if reason_code.is_some() {
            merged.reason_code = reason_code;
        }
        self.write_record(&merged)?;
        Ok(merged)
    }

    /// All persisted records, ascending by creation time (id as tiebreak).
    pub fn list(&self) -> Result<Vec<JobRecord>> {
        let _guard = self.lock()?;
        let mut jobs = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            // Skip the lock file and in-flight temp files.
            if name.starts_with('.') || !entry.file_type()?.is_file() {
                continue;
            }
            let data = fs::read_to_string(entry.path())?;
            jobs.push(serde_json::from_str::<JobRecord>(&data)?);
        }
        jobs.sort_by(|a, b| {
            a.created_time
                .cmp(&b.created_time)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(jobs)
    }

    /// Remove the record for `id`. Only terminal jobs may be deleted.
    pub fn delete(&self, id: &str) -> Result<()> {
        let _guard = self.lock()?;
        let record = self.read_unlocked(id)?;
        if record.status == JobStatus::Na {
            return Err(DaaError::JobNotFound(id.to_string()));
        }
        if !record.status.is_terminal() {
            return Err(DaaError::JobNotTerminal(id.to_string()));
        }
        fs::remove_file(self.record_path(id)).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                DaaError::JobNotFound(id.to_string())
            } else {
                DaaError::Io(e)
            }
        })
    }

    fn read_unlocked(&self, id: &str) -> Result<JobRecord> {
        let path = self.record_path(id);
        if !path.is_file() {
            return Ok(JobRecord::not_found(id));
        }
        let data = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    /// Whole-record write: serialize to a dot-prefixed temp file in the same
    /// directory, then rename over the target.
    fn write_record(&self, job: &JobRecord) -> Result<()> {
        let tmp = self.dir.join(format!(".tmp-{}", job.id));
        fs::write(&tmp, serde_json::to_string_pretty(job)?)?;
        fs::rename(&tmp, self.record_path(&job.id))?;
        Ok(())
    }
}
