//! Job execution engine: the state machine and concurrency core.
//!
//! [`EngineCore`] owns the blocking execution pipeline a worker runs for one
//! job; [`ExecutionEngine`] dispatches accepted jobs onto tokio's blocking
//! pool (thread mode) or into freshly spawned worker processes (process
//! mode) and keeps the handles needed for cancellation and cleanup.
//!
//! Terminal-status writes from workers are compare-and-swapped against
//! `Running`. The record that wins determines the outcome; a worker whose
//! write loses (for example because the job was cancelled underneath it)
//! logs the conflict and drops the write.

pub mod estimator;
pub mod input;
pub mod output;
pub mod sampler;

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::backend::BackendRegistry;
use crate::config::{BackendSpec, DispatchMode, EngineOptions};
use crate::error::{DaaError, Result};
use crate::job::{JobRecord, JobStatus, ProgramId};
use crate::joblog::JobLog;
use crate::storage::StorageRegistry;
use crate::store::JobStore;

/// Reason code recorded on a `Failed` transition caused by an execution
/// error.
pub const EXECUTION_FAILED_CODE: u32 = 5203;

const USAGE_METRIC: &str = "quantum_nanoseconds";

/// Everything a worker needs to run one job. Shared by both dispatch modes:
/// thread workers borrow the parent's instance, process workers reconstruct
/// one from the [`WorkerPayload`].
pub struct EngineCore {
    store: JobStore,
    backends: BackendRegistry,
    storages: StorageRegistry,
    options: EngineOptions,
}

impl EngineCore {
    pub fn new(
        store: JobStore,
        backends: BackendRegistry,
        storages: StorageRegistry,
        options: EngineOptions,
    ) -> Self {
        EngineCore {
            store,
            backends,
            storages,
            options,
        }
    }

    /// Run one job to a terminal state. Blocking. Every failure is caught
    /// and recorded on the job itself, since the submitter only learns
    /// about it by polling.
    pub fn run_job(&self, mut job: JobRecord) {
        let mut user_log = JobLog::new(job.log_level.as_deref());
        if let Err(err) = self.run_pipeline(&mut job, &mut user_log) {
            match &err {
                DaaError::UnexpectedStatus { .. } => {
                    tracing::warn!(
                        job_id = %job.id,
                        error = %err,
                        "Terminal transition lost the status race, dropped"
                    );
                }
                _ => {
                    tracing::error!(job_id = %job.id, error = %err, "Job execution failed");
                    user_log.error(err.to_string());
                    let written = self.store.update(
                        &job,
                        JobStatus::Failed,
                        Some(JobStatus::Running),
                        Some(err.to_string()),
                        Some(EXECUTION_FAILED_CODE),
                    );
                    match written {
                        Ok(_) => {}
                        Err(DaaError::UnexpectedStatus { .. }) => {
                            tracing::warn!(
                                job_id = %job.id,
                                "Failure write lost the status race, dropped"
                            );
                        }
                        Err(store_err) => {
                            tracing::error!(
                                job_id = %job.id,
                                error = %store_err,
                                "Unable to record job failure"
                            );
                        }
                    }
                }
            }
        }

        // Flush user logs to their storage location regardless of outcome.
        if let Some(logs) = job.storage.as_ref().and_then(|s| s.logs.as_ref()) {
            if let Err(err) = self.storages.put(logs, &user_log.contents()) {
                tracing::error!(job_id = %job.id, error = %err, "Failed to flush job logs");
            }
        }
    }

    fn run_pipeline(&self, job: &mut JobRecord, user_log: &mut JobLog) -> Result<()> {
        user_log.info(format!("Executing {}", job.id));
        tracing::info!(job_id = %job.id, "Executing job");

        let storage_map = job
            .storage
            .clone()
            .ok_or_else(|| DaaError::invalid_input("job has no storage descriptors", &job.id))?;
        let program = job
            .program_id
            .ok_or_else(|| DaaError::invalid_input("job has no program id", &job.id))?;
        let backend_name = match &job.backend {
            Some(name) => name.clone(),
            None => self
                .backends
                .default_backend_name()
                .map(str::to_string)
                .ok_or_else(|| DaaError::BackendNotFound(String::new()))?,
        };
        let device = self.backends.device(&backend_name)?;

        let payload = self.storages.get(&storage_map.input)?;
        let job_input = input::parse_input(&payload)?;

        let defaults = match program {
            ProgramId::Sampler => &self.options.sampler,
            ProgramId::Estimator => &self.options.estimator,
        };
        let merged = input::filter_options(program, &job_input.options, defaults, user_log);

        let results = match program {
            ProgramId::Sampler => sampler::run(&device, &job_input, &merged)?,
            ProgramId::Estimator => estimator::run(&device, &job_input, &merged)?,
        };

        let usage_ns: u64 = results.iter().map(|r| r.elapsed.as_nanos() as u64).sum();
        job.usage.insert(USAGE_METRIC.to_string(), usage_ns);

        let result_payload = output::serialize_results(&results, job_input.support_qiskit)?;
        self.storages.put(&storage_map.results, &result_payload)?;

        // Completion is only valid coming directly from Running.
        self.store.update(
            job,
            JobStatus::Completed,
            Some(JobStatus::Running),
            None,
            None,
        )?;

        user_log.info(format!("Finished {}", job.id));
        tracing::info!(job_id = %job.id, usage_ns, "Finished job");
        Ok(())
    }
}

/// Startup document handed to a spawned worker process on stdin. The worker
/// reconstructs its engine from these explicit arguments rather than from
/// inherited process state.
#[derive(Debug, Serialize, Deserialize)]
pub struct WorkerPayload {
    pub job: JobRecord,
    pub options: EngineOptions,
    pub jobs_dir: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backends: Option<Vec<BackendSpec>>,
}

impl WorkerPayload {
    /// Entry point of the `worker` subcommand.
    pub fn run(self) -> Result<()> {
        tracing::info!(pid = std::process::id(), job_id = %self.job.id, "Worker process started");
        let core = EngineCore::new(
            JobStore::open(&self.jobs_dir)?,
            BackendRegistry::from_config(self.backends.as_deref(), false),
            StorageRegistry::with_defaults(),
            self.options,
        );
        core.run_job(self.job);
        Ok(())
    }
}

enum WorkerHandle {
    Task(JoinHandle<()>),
    Process(Child),
}

/// Dispatches accepted jobs and tracks their worker handles.
pub struct ExecutionEngine {
    core: Arc<EngineCore>,
    dispatch: DispatchMode,
    jobs_dir: PathBuf,
    backend_specs: Option<Vec<BackendSpec>>,
    workers: Mutex<HashMap<String, WorkerHandle>>,
}

impl ExecutionEngine {
    pub fn new(
        core: EngineCore,
        dispatch: DispatchMode,
        jobs_dir: PathBuf,
        backend_specs: Option<Vec<BackendSpec>>,
    ) -> Self {
        ExecutionEngine {
            core: Arc::new(core),
            dispatch,
            jobs_dir,
            backend_specs,
            workers: Mutex::new(HashMap::new()),
        }
    }

    /// Start asynchronous execution of an accepted job and return
    /// immediately. The job's record must already exist as `Running`.
    pub async fn dispatch(&self, job: JobRecord) -> Result<()> {
        let job_id = job.id.clone();
        let handle = match &self.dispatch {
            DispatchMode::Thread => {
                let core = Arc::clone(&self.core);
                WorkerHandle::Task(tokio::task::spawn_blocking(move || core.run_job(job)))
            }
            DispatchMode::Process { worker_program } => {
                let program = match worker_program {
                    Some(path) => path.clone(),
                    None => std::env::current_exe()?,
                };
                let payload = WorkerPayload {
                    job,
                    options: self.core.options.clone(),
                    jobs_dir: self.jobs_dir.clone(),
                    backends: self.backend_specs.clone(),
                };
                let mut child = Command::new(program)
                    .arg("worker")
                    .stdin(Stdio::piped())
                    .spawn()?;
                let mut stdin = child
                    .stdin
                    .take()
                    .ok_or_else(|| DaaError::Worker("worker stdin unavailable".to_string()))?;
                stdin.write_all(&serde_json::to_vec(&payload)?).await?;
                drop(stdin);
                tracing::info!(job_id = %job_id, pid = ?child.id(), "Spawned worker process");
                WorkerHandle::Process(child)
            }
        };
        self.workers.lock().await.insert(job_id, handle);
        Ok(())
    }

    /// Forcibly terminate the worker process of `id`, if it has one. Thread
    /// workers cannot be interrupted; their eventual terminal write loses
    /// the status race instead.
    pub async fn kill_worker(&self, id: &str) -> Result<()> {
        let mut workers = self.workers.lock().await;
        if let Some(WorkerHandle::Process(child)) = workers.get_mut(id) {
            let pid = child.id();
            child.kill().await?;
            tracing::info!(job_id = %id, pid = ?pid, "Worker process terminated");
        }
        Ok(())
    }

    /// Drop any lingering handle for `id` (used on job deletion).
    pub async fn forget_worker(&self, id: &str) {
        self.workers.lock().await.remove(id);
    }

    /// Wait for thread workers to finish and kill remaining process
    /// workers.
    pub async fn shutdown(&self) {
        let handles: Vec<(String, WorkerHandle)> =
            self.workers.lock().await.drain().collect();
        for (id, handle) in handles {
            match handle {
                WorkerHandle::Task(task) => {
                    if let Err(err) = task.await {
                        tracing::error!(job_id = %id, error = %err, "Worker task panicked");
                    }
                }
                WorkerHandle::Process(mut child) => {
                    if let Err(err) = child.kill().await {
                        tracing::warn!(job_id = %id, error = %err, "Failed to kill worker process");
                    }
                }
            }
        }
    }
}
