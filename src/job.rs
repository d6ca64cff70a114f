use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle states of a job.
///
/// `Na` is the "no record" sentinel returned when a job was never submitted
/// or has been deleted; it is not a state a stored record can be in.
/// A submitted job starts as `Running` and ends in exactly one of
/// `Completed`, `Failed` or `Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
    #[serde(rename = "NA")]
    Na,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Running => write!(f, "Running"),
            JobStatus::Completed => write!(f, "Completed"),
            JobStatus::Failed => write!(f, "Failed"),
            JobStatus::Cancelled => write!(f, "Cancelled"),
            JobStatus::Na => write!(f, "NA"),
        }
    }
}

/// Recognized computation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgramId {
    Sampler,
    Estimator,
}

impl ProgramId {
    /// Parse a caller-supplied program identifier. Unknown kinds return `None`;
    /// the facade decides how to reject them.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sampler" => Some(ProgramId::Sampler),
            "estimator" => Some(ProgramId::Estimator),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProgramId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProgramId::Sampler => write!(f, "sampler"),
            ProgramId::Estimator => write!(f, "estimator"),
        }
    }
}

/// Where to read or write a payload. The `type` tag selects a registered
/// storage implementation; the remaining fields are implementation-specific
/// parameters, kept open so new variants can be added by tag alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageDescriptor {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub params: serde_json::Map<String, Value>,
}

impl StorageDescriptor {
    pub fn file_system(path: impl Into<PathBuf>) -> Self {
        let mut params = serde_json::Map::new();
        params.insert(
            "path".to_string(),
            Value::String(path.into().to_string_lossy().into_owned()),
        );
        StorageDescriptor {
            kind: "file_system".to_string(),
            params,
        }
    }

    pub fn object_store(presigned_url: impl Into<String>) -> Self {
        let mut params = serde_json::Map::new();
        params.insert(
            "presigned_url".to_string(),
            Value::String(presigned_url.into()),
        );
        StorageDescriptor {
            kind: "object_store".to_string(),
            params,
        }
    }

    /// Fetch a required string parameter from the descriptor.
    pub fn param_str(&self, name: &str) -> Option<&str> {
        self.params.get(name).and_then(Value::as_str)
    }
}

/// Input, results and optional logs locations for one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStorageMap {
    pub input: StorageDescriptor,
    pub results: StorageDescriptor,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logs: Option<StorageDescriptor>,
}

/// A job submission, as accepted by the facade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
    /// Program kind as supplied by the caller; validated by the facade.
    pub program_id: String,
    pub storage: JobStorageMap,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

/// The persisted status record for one job, the central entity of the
/// store. One JSON file per record, mutated only through
/// [`JobStore`](crate::store::JobStore) operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program_id: Option<ProgramId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage: Option<JobStorageMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub usage: BTreeMap<String, u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason_code: Option<u32>,
}

impl JobRecord {
    /// Build the initial record for an accepted submission. The store stamps
    /// `created_time` when the record is created.
    pub fn from_request(request: JobRequest, backend: String, program_id: ProgramId) -> Self {
        JobRecord {
            id: request.id,
            status: JobStatus::Running,
            backend: Some(backend),
            program_id: Some(program_id),
            storage: Some(request.storage),
            timeout_secs: request.timeout_secs,
            log_level: request.log_level,
            usage: BTreeMap::new(),
            created_time: None,
            end_time: None,
            reason_message: None,
            reason_code: None,
        }
    }

    /// The `NA` sentinel returned for jobs with no stored record.
    pub fn not_found(id: impl Into<String>) -> Self {
        JobRecord {
            id: id.into(),
            status: JobStatus::Na,
            backend: None,
            program_id: None,
            storage: None,
            timeout_secs: None,
            log_level: None,
            usage: BTreeMap::new(),
            created_time: None,
            end_time: None,
            reason_message: None,
            reason_code: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(!JobStatus::Na.is_terminal());
    }

    #[test]
    fn na_sentinel_serializes_as_na() {
        let record = JobRecord::not_found("j1");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["status"], "NA");
        assert_eq!(json["id"], "j1");
        assert!(json.get("backend").is_none());
    }

    #[test]
    fn storage_descriptor_roundtrip() {
        let desc = StorageDescriptor::file_system("/tmp/input.json");
        let json = serde_json::to_value(&desc).unwrap();
        assert_eq!(json["type"], "file_system");
        assert_eq!(json["path"], "/tmp/input.json");

        let parsed: StorageDescriptor = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.kind, "file_system");
        assert_eq!(parsed.param_str("path"), Some("/tmp/input.json"));
    }

    #[test]
    fn unknown_program_id_is_rejected() {
        assert_eq!(ProgramId::parse("sampler"), Some(ProgramId::Sampler));
        assert_eq!(ProgramId::parse("estimator"), Some(ProgramId::Estimator));
        assert_eq!(ProgramId::parse("annealer"), None);
    }
}
