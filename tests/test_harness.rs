//! Shared helpers for service-level integration tests.
//!
//! Each test gets its own temp directory holding the jobs dir plus the
//! payload files its jobs read and write through `file_system` descriptors.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tempfile::TempDir;
use uuid::Uuid;

use daa_sim::config::ServiceConfig;
use daa_sim::job::{JobRecord, JobRequest, JobStorageMap, StorageDescriptor};
use daa_sim::service::DirectAccessService;

/// A service over a throwaway directory tree.
pub struct TestService {
    pub service: DirectAccessService,
    pub root: TempDir,
}

impl TestService {
    pub fn new() -> Self {
        let root = TempDir::new().expect("temp dir");
        let config = ServiceConfig::new(root.path().join("jobs"));
        Self::with_config(root, config)
    }

    pub fn with_config(root: TempDir, config: ServiceConfig) -> Self {
        let service = DirectAccessService::new(config).expect("service init");
        TestService { service, root }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.root.path().join(name)
    }

    /// Write a payload file and return its path.
    pub fn write_payload(&self, name: &str, payload: &Value) -> PathBuf {
        let path = self.path(name);
        std::fs::write(&path, payload.to_string()).expect("write payload");
        path
    }

    /// A submission whose input/results/logs all live under the temp root,
    /// prefixed with the job id so tests can inspect them afterwards.
    pub fn request(&self, id: &str, program: &str, input: &Value) -> JobRequest {
        let input_path = self.write_payload(&format!("{id}-input.json"), input);
        JobRequest {
            id: id.to_string(),
            backend: None,
            program_id: program.to_string(),
            storage: JobStorageMap {
                input: StorageDescriptor::file_system(input_path),
                results: StorageDescriptor::file_system(self.path(&format!("{id}-results.json"))),
                logs: Some(StorageDescriptor::file_system(
                    self.path(&format!("{id}-logs.txt")),
                )),
            },
            timeout_secs: None,
            // The default level (warning) would hide the progress lines
            // several tests assert on.
            log_level: Some("info".to_string()),
        }
    }

    /// Poll until the job reaches a terminal state.
    pub async fn wait_terminal(&self, id: &str) -> JobRecord {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let record = self.service.get_job_detail(id).expect("job detail");
            if record.status.is_terminal() {
                return record;
            }
            assert!(Instant::now() < deadline, "job {id} did not finish in time");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// Result payload written by job `id`, parsed as JSON.
    pub fn results(&self, id: &str) -> Value {
        read_json(&self.path(&format!("{id}-results.json")))
    }

    pub fn logs(&self, id: &str) -> String {
        std::fs::read_to_string(self.path(&format!("{id}-logs.txt"))).expect("read logs")
    }
}

pub fn read_json(path: &Path) -> Value {
    let data = std::fs::read_to_string(path).expect("read json file");
    serde_json::from_str(&data).expect("parse json file")
}

pub fn fresh_id() -> String {
    Uuid::new_v4().to_string()
}

/// Bell-pair circuit with measurements: h 0; cx 0 1; measure both.
pub fn bell_input(shots: u64) -> Value {
    json!({
        "pubs": [{
            "num_qubits": 2,
            "num_clbits": 2,
            "instructions": [
                {"name": "h", "qubits": [0]},
                {"name": "cx", "qubits": [0, 1]},
                {"name": "measure", "qubits": [0], "clbits": [0]},
                {"name": "measure", "qubits": [1], "clbits": [1]},
            ],
        }],
        "version": 2,
        "shots": shots,
    })
}

/// Deterministic single-qubit flip: x 0; measure.
pub fn flip_input(shots: u64) -> Value {
    json!({
        "pubs": [{
            "num_qubits": 1,
            "num_clbits": 1,
            "instructions": [
                {"name": "x", "qubits": [0]},
                {"name": "measure", "qubits": [0], "clbits": [0]},
            ],
        }],
        "version": 2,
        "shots": shots,
    })
}

/// Estimator input measuring Z on the ground state.
pub fn ground_z_input() -> Value {
    json!({
        "pubs": [[{"num_qubits": 1, "instructions": []}, "Z"]],
        "version": 2,
    })
}

/// Input with a simulated device latency, for cancellation races.
pub fn slow_input(shots: u64, latency_ms: u64) -> Value {
    let mut payload = flip_input(shots);
    payload["options"] = json!({"backend_options": {"latency_ms": latency_ms}});
    payload
}
