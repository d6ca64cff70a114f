use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Map;

/// Default job metadata directory.
pub const DEFAULT_JOBS_DIR: &str = ".jobs";

/// Default maximum number of execution lanes per backend.
pub const DEFAULT_MAX_EXECUTION_LANES: usize = 5;

/// Service version, consistent with the latest deployment.
pub const SERVICE_VERSION: &str = "0.7.0";

/// How accepted jobs are executed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DispatchMode {
    /// Run on the blocking worker pool of the current process. Cancellation
    /// only marks the record; the running computation is not interrupted.
    #[default]
    Thread,
    /// Spawn a fresh OS process per job (the `worker` subcommand of this
    /// binary unless `worker_program` points elsewhere). Supports forced
    /// cancellation by killing the worker.
    Process {
        #[serde(skip_serializing_if = "Option::is_none")]
        worker_program: Option<PathBuf>,
    },
}

/// Default execution options merged under each job's own options,
/// split by program kind. Keys follow the job input schema
/// (`backend_options`, `run_options`, `default_precision`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineOptions {
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub sampler: Map<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub estimator: Map<String, serde_json::Value>,
}

/// One entry of the backend override list: the name of a registered
/// constructor. Entries that do not resolve are logged and skipped, so a
/// single broken override cannot keep the service from starting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendSpec {
    pub constructor: String,
}

/// Full service configuration. Constructed once and passed explicitly to
/// every component; process-dispatched workers receive the relevant subset
/// serialized into their startup payload rather than through the
/// environment.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Directory holding one status file per job.
    pub jobs_dir: PathBuf,
    /// Admission limit on jobs per backend, counted regardless of status.
    pub max_execution_lanes: usize,
    pub dispatch: DispatchMode,
    /// Include optional fields (message, version) in backend details.
    pub include_optional_fields: bool,
    /// Override list for the backend registry; `None` keeps the built-ins.
    pub backends: Option<Vec<BackendSpec>>,
    pub engine_options: EngineOptions,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            jobs_dir: PathBuf::from(DEFAULT_JOBS_DIR),
            max_execution_lanes: DEFAULT_MAX_EXECUTION_LANES,
            dispatch: DispatchMode::Thread,
            include_optional_fields: false,
            backends: None,
            engine_options: EngineOptions::default(),
        }
    }
}

impl ServiceConfig {
    pub fn new(jobs_dir: impl Into<PathBuf>) -> Self {
        Self {
            jobs_dir: jobs_dir.into(),
            ..Default::default()
        }
    }

    pub fn with_dispatch(mut self, dispatch: DispatchMode) -> Self {
        self.dispatch = dispatch;
        self
    }

    pub fn with_max_execution_lanes(mut self, lanes: usize) -> Self {
        self.max_execution_lanes = lanes;
        self
    }

    pub fn with_backends(mut self, backends: Vec<BackendSpec>) -> Self {
        self.backends = Some(backends);
        self
    }

    pub fn with_engine_options(mut self, options: EngineOptions) -> Self {
        self.engine_options = options;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_config_default() {
        let cfg = ServiceConfig::default();
        assert_eq!(cfg.jobs_dir, PathBuf::from(".jobs"));
        assert_eq!(cfg.max_execution_lanes, 5);
        assert!(matches!(cfg.dispatch, DispatchMode::Thread));
        assert!(!cfg.include_optional_fields);
        assert!(cfg.backends.is_none());
    }

    #[test]
    fn service_config_builders() {
        let cfg = ServiceConfig::new("/tmp/jobs")
            .with_max_execution_lanes(2)
            .with_dispatch(DispatchMode::Process {
                worker_program: None,
            })
            .with_backends(vec![BackendSpec {
                constructor: "falcon_27".to_string(),
            }]);
        assert_eq!(cfg.jobs_dir, PathBuf::from("/tmp/jobs"));
        assert_eq!(cfg.max_execution_lanes, 2);
        assert!(matches!(cfg.dispatch, DispatchMode::Process { .. }));
        assert_eq!(cfg.backends.unwrap()[0].constructor, "falcon_27");
    }

    #[test]
    fn dispatch_mode_serializes_by_tag() {
        let json = serde_json::to_value(DispatchMode::Thread).unwrap();
        assert_eq!(json["mode"], "thread");

        let json = serde_json::to_value(DispatchMode::Process {
            worker_program: None,
        })
        .unwrap();
        assert_eq!(json["mode"], "process");
    }
}
