//! The service facade: the single public surface clients call.
//!
//! Owns the job store, backend registry, storage registry and execution
//! engine, and enforces the admission and lifecycle rules on top of them.
//! All methods reject with [`DaaError::ServiceNotAvailable`] once the
//! service has been closed.

use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;

use crate::backend::BackendRegistry;
use crate::config::{ServiceConfig, SERVICE_VERSION};
use crate::engine::{input, EngineCore, ExecutionEngine};
use crate::error::{DaaError, Result};
use crate::job::{JobRecord, JobRequest, JobStatus, ProgramId};
use crate::storage::StorageRegistry;
use crate::store::JobStore;

pub struct DirectAccessService {
    config: ServiceConfig,
    store: JobStore,
    backends: BackendRegistry,
    storages: StorageRegistry,
    engine: ExecutionEngine,
    active: AtomicBool,
}

impl DirectAccessService {
    pub fn new(config: ServiceConfig) -> Result<Self> {
        let store = JobStore::open(&config.jobs_dir)?;
        let backends =
            BackendRegistry::from_config(config.backends.as_deref(), config.include_optional_fields);
        let storages = StorageRegistry::with_defaults();
        let core = EngineCore::new(
            store.clone(),
            backends.clone(),
            storages.clone(),
            config.engine_options.clone(),
        );
        let engine = ExecutionEngine::new(
            core,
            config.dispatch.clone(),
            config.jobs_dir.clone(),
            config.backends.clone(),
        );
        tracing::info!(
            jobs_dir = %config.jobs_dir.display(),
            max_execution_lanes = config.max_execution_lanes,
            version = SERVICE_VERSION,
            "Service initialized"
        );
        Ok(DirectAccessService {
            config,
            store,
            backends,
            storages,
            engine,
            active: AtomicBool::new(true),
        })
    }

    fn assert_active(&self) -> Result<()> {
        if self.active.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(DaaError::ServiceNotAvailable)
        }
    }

    pub fn service_version(&self) -> &'static str {
        SERVICE_VERSION
    }

    /// Name of the backend used when a submission does not pick one.
    pub fn default_backend_name(&self) -> Option<&str> {
        self.backends.default_backend_name()
    }

    /// Details of every registered backend, in registration order.
    pub fn backends(&self) -> Result<Vec<Value>> {
        self.assert_active()?;
        self.backends
            .names()
            .into_iter()
            .map(|name| self.backends.backend_details(name))
            .collect()
    }

    pub fn get_backend_details(&self, name: &str) -> Result<Value> {
        self.assert_active()?;
        self.backends.backend_details(name)
    }

    pub fn get_backend_configuration(&self, name: &str) -> Result<Value> {
        self.assert_active()?;
        self.backends.backend_configuration(name)
    }

    pub fn get_backend_properties(&self, name: &str) -> Result<Value> {
        self.assert_active()?;
        self.backends.backend_properties(name)
    }

    /// Accept a job for asynchronous execution.
    ///
    /// Admission is checked before anything is persisted: the backend must
    /// exist, its execution lanes must not be exhausted (jobs count against
    /// a backend's lanes regardless of status, until deleted), the program
    /// kind must be recognized and the input payload must pass schema
    /// validation. A submission failing any of these leaves no record
    /// behind. Returns the `Running` record once the job is dispatched.
    pub async fn execute_job(&self, request: JobRequest) -> Result<JobRecord> {
        self.assert_active()?;

        let backend = match &request.backend {
            Some(name) => {
                if !self.backends.contains(name) {
                    return Err(DaaError::BackendNotFound(name.clone()));
                }
                name.clone()
            }
            None => self
                .backends
                .default_backend_name()
                .map(str::to_string)
                .ok_or_else(|| DaaError::BackendNotFound(String::new()))?,
        };

        let occupied = self
            .store
            .list()?
            .iter()
            .filter(|job| job.backend.as_deref() == Some(backend.as_str()))
            .count();
        if occupied >= self.config.max_execution_lanes {
            tracing::warn!(
                backend = %backend,
                occupied,
                limit = self.config.max_execution_lanes,
                "Execution lanes exhausted"
            );
            return Err(DaaError::ExecutionLanesLimitReached(backend));
        }

        let program = ProgramId::parse(&request.program_id).ok_or_else(|| {
            DaaError::invalid_input(
                format!("unknown program id: {}", request.program_id),
                request.program_id.clone(),
            )
        })?;

        // Fetch and schema-check the input before creating a record, so a
        // malformed submission fails the call instead of a later poll.
        // Storage access is blocking; keep it off the async runtime.
        let storages = self.storages.clone();
        let input_descriptor = request.storage.input.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let payload = storages.get(&input_descriptor)?;
            input::parse_input(&payload)?;
            Ok(())
        })
        .await
        .map_err(|e| DaaError::Worker(format!("input validation task failed: {e}")))??;

        let mut record = JobRecord::from_request(request, backend, program);
        self.store.create(&mut record)?;

        if let Err(err) = self.engine.dispatch(record.clone()).await {
            tracing::error!(job_id = %record.id, error = %err, "Dispatch failed");
            let failed = self.store.update(
                &record,
                JobStatus::Failed,
                Some(JobStatus::Running),
                Some(err.to_string()),
                Some(crate::engine::EXECUTION_FAILED_CODE),
            )?;
            return Ok(failed);
        }
        tracing::info!(job_id = %record.id, backend = %record.backend.as_deref().unwrap_or(""), "Job accepted");
        Ok(record)
    }

    /// All job records, ascending by creation time.
    pub fn get_jobs(&self) -> Result<Vec<JobRecord>> {
        self.assert_active()?;
        self.store.list()
    }

    /// The record for `id`. Unknown and deleted jobs are
    /// [`DaaError::JobNotFound`].
    pub fn get_job_detail(&self, id: &str) -> Result<JobRecord> {
        self.assert_active()?;
        let record = self.store.read(id)?;
        if record.status == JobStatus::Na {
            return Err(DaaError::JobNotFound(id.to_string()));
        }
        Ok(record)
    }

    /// Cancel a running job. Process workers are killed; thread workers keep
    /// running but their terminal write loses the status race to the
    /// `Cancelled` record written here. Cancelling a terminal or unknown
    /// job is an error.
    pub async fn cancel_job(&self, id: &str) -> Result<JobRecord> {
        self.assert_active()?;
        let record = self.store.read(id)?;
        match record.status {
            JobStatus::Na => return Err(DaaError::JobNotFound(id.to_string())),
            status if status.is_terminal() => {
                return Err(DaaError::JobNotCancellable(id.to_string()))
            }
            _ => {}
        }

        self.engine.kill_worker(id).await?;
        let cancelled = self.store.update(
            &record,
            JobStatus::Cancelled,
            Some(JobStatus::Running),
            None,
            None,
        )?;
        tracing::info!(job_id = %id, "Job cancelled");
        Ok(cancelled)
    }

    /// Delete the record of a terminal job, releasing its execution lane.
    pub async fn delete_job(&self, id: &str) -> Result<()> {
        self.assert_active()?;
        self.store.delete(id)?;
        self.engine.forget_worker(id).await;
        tracing::info!(job_id = %id, "Job deleted");
        Ok(())
    }

    /// Shut the service down: stop accepting calls, drain thread workers,
    /// kill process workers and mark any job still `Running` as
    /// `Cancelled`. Idempotent.
    pub async fn close(&self) -> Result<()> {
        if !self.active.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        tracing::info!("Service closing");
        self.engine.shutdown().await;
        for job in self.store.list()? {
            if job.status != JobStatus::Running {
                continue;
            }
            match self.store.update(
                &job,
                JobStatus::Cancelled,
                Some(JobStatus::Running),
                None,
                None,
            ) {
                Ok(_) => tracing::info!(job_id = %job.id, "Orphaned job cancelled"),
                // A worker's own terminal write may land between the list
                // and the update; the worker's record stands.
                Err(DaaError::UnexpectedStatus { .. }) => {}
                Err(err) => return Err(err),
            }
        }
        tracing::info!("Service closed");
        Ok(())
    }
}
