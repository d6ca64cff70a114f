//! Job input payload: schema validation, option filtering, pub parsing.
//!
//! The payload is the JSON document fetched from the job's `input` storage
//! descriptor: `{pubs: [...], version: 2, support_qiskit: bool,
//! options: {...}, shots | precision: optional}`.

use std::time::Duration;

use serde_json::{Map, Value};

use crate::backend::Circuit;
use crate::backend::ExecutionOptions;
use crate::error::{DaaError, Result};
use crate::job::ProgramId;
use crate::joblog::JobLog;

/// Default shot count when neither the payload nor a pub specifies one.
pub const DEFAULT_SAMPLER_SHOTS: u64 = 1000;

/// Default estimator precision.
pub const DEFAULT_PRECISION: f64 = 0.015_625;

const SAMPLER_OPTIONS: &[&str] = &["backend_options", "run_options"];
const ESTIMATOR_OPTIONS: &[&str] = &["default_precision", "backend_options", "run_options"];

/// Parsed and schema-checked job input.
#[derive(Debug, Clone)]
pub struct JobInput {
    pub pubs: Vec<Value>,
    pub support_qiskit: bool,
    pub options: Map<String, Value>,
    pub shots: Option<u64>,
    pub precision: Option<f64>,
}

/// Validate the payload document. `pubs` and `version` are required and the
/// only supported version is 2; anything else fails fast with a descriptive
/// error.
pub fn parse_input(payload: &str) -> Result<JobInput> {
    let doc: Value = serde_json::from_str(payload)?;

    let pubs = doc
        .get("pubs")
        .ok_or_else(|| DaaError::invalid_input("no pubs in this input", "pubs"))?
        .as_array()
        .ok_or_else(|| DaaError::invalid_input("pubs must be an array", "pubs"))?
        .clone();

    let version = doc
        .get("version")
        .ok_or_else(|| DaaError::invalid_input("no version in this input", "version"))?;
    if version.as_u64() != Some(2) {
        return Err(DaaError::invalid_input(
            format!("input version must be 2: {version}"),
            version.to_string(),
        ));
    }

    let options = match doc.get("options") {
        Some(Value::Object(map)) => map.clone(),
        Some(other) => {
            return Err(DaaError::invalid_input(
                "options must be an object",
                other.to_string(),
            ))
        }
        None => Map::new(),
    };

    Ok(JobInput {
        pubs,
        support_qiskit: doc
            .get("support_qiskit")
            .and_then(Value::as_bool)
            .unwrap_or(true),
        options,
        shots: doc.get("shots").and_then(Value::as_u64),
        precision: doc.get("precision").and_then(Value::as_f64),
    })
}

/// Keep the options the program kind recognizes, dropping the rest with a
/// warning (service-side and in the job's own log), and merge them over the
/// engine's configured defaults (job options win).
pub fn filter_options(
    program: ProgramId,
    supplied: &Map<String, Value>,
    defaults: &Map<String, Value>,
    user_log: &mut JobLog,
) -> Map<String, Value> {
    let recognized = match program {
        ProgramId::Sampler => SAMPLER_OPTIONS,
        ProgramId::Estimator => ESTIMATOR_OPTIONS,
    };
    let mut merged = defaults.clone();
    for (key, value) in supplied {
        if recognized.contains(&key.as_str()) {
            merged.insert(key.clone(), value.clone());
        } else {
            tracing::warn!(option = %key, value = %value, "Unsupported option specified, ignored");
            user_log.warning(format!("Unsupported option specified, ignored: {key}"));
        }
    }
    merged
}

/// Pull the device-level execution options out of the merged option map.
pub fn execution_options(options: &Map<String, Value>) -> ExecutionOptions {
    let backend_options = options
        .get("backend_options")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    ExecutionOptions {
        seed_simulator: backend_options.get("seed_simulator").and_then(Value::as_u64),
        latency: backend_options
            .get("latency_ms")
            .and_then(Value::as_u64)
            .map(Duration::from_millis),
    }
}

/// One sampler pub: a circuit, optionally with per-pub parameter values
/// (accepted, unused by the simulator) and a shot override.
#[derive(Debug, Clone)]
pub struct SamplerPub {
    pub circuit: Circuit,
    pub shots: Option<u64>,
}

pub fn parse_sampler_pub(value: &Value) -> Result<SamplerPub> {
    match value {
        Value::Array(parts) => {
            let circuit = parse_circuit(parts.first().ok_or_else(|| {
                DaaError::invalid_input("empty pub", value.to_string())
            })?)?;
            let shots = parts.get(2).and_then(Value::as_u64);
            Ok(SamplerPub { circuit, shots })
        }
        Value::Object(_) => Ok(SamplerPub {
            circuit: parse_circuit(value)?,
            shots: None,
        }),
        other => Err(DaaError::invalid_input(
            "pub must be a circuit or an array",
            other.to_string(),
        )),
    }
}

/// One estimator pub: a circuit, its observables and an optional precision.
#[derive(Debug, Clone)]
pub struct EstimatorPub {
    pub circuit: Circuit,
    pub observables: Vec<(String, f64)>,
    pub precision: Option<f64>,
}

pub fn parse_estimator_pub(value: &Value) -> Result<EstimatorPub> {
    match value {
        Value::Array(parts) => {
            let circuit = parse_circuit(parts.first().ok_or_else(|| {
                DaaError::invalid_input("empty pub", value.to_string())
            })?)?;
            let observables = parse_observables(parts.get(1).ok_or_else(|| {
                DaaError::invalid_input("estimator pub is missing observables", value.to_string())
            })?)?;
            let precision = parts.get(3).and_then(Value::as_f64);
            Ok(EstimatorPub {
                circuit,
                observables,
                precision,
            })
        }
        Value::Object(map) => {
            let circuit = parse_circuit(map.get("circuit").ok_or_else(|| {
                DaaError::invalid_input("estimator pub is missing a circuit", value.to_string())
            })?)?;
            let observables = parse_observables(map.get("observables").ok_or_else(|| {
                DaaError::invalid_input("estimator pub is missing observables", value.to_string())
            })?)?;
            Ok(EstimatorPub {
                circuit,
                observables,
                precision: map.get("precision").and_then(Value::as_f64),
            })
        }
        other => Err(DaaError::invalid_input(
            "pub must be an array or an object",
            other.to_string(),
        )),
    }
}

fn parse_circuit(value: &Value) -> Result<Circuit> {
    // A pub may carry the circuit directly or wrapped under "circuit".
    let circuit_value = match value {
        Value::Object(map) if map.contains_key("circuit") => &map["circuit"],
        other => other,
    };
    serde_json::from_value(circuit_value.clone()).map_err(|e| {
        DaaError::invalid_input(format!("malformed circuit: {e}"), circuit_value.to_string())
    })
}

fn parse_observables(value: &Value) -> Result<Vec<(String, f64)>> {
    match value {
        Value::String(pauli) => Ok(vec![(pauli.clone(), 1.0)]),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(pauli) => Ok((pauli.clone(), 1.0)),
                other => Err(DaaError::invalid_input(
                    "observable entries must be Pauli strings",
                    other.to_string(),
                )),
            })
            .collect(),
        Value::Object(map) => map
            .iter()
            .map(|(pauli, coeff)| {
                let coeff = coeff.as_f64().ok_or_else(|| {
                    DaaError::invalid_input(
                        format!("observable coefficient for {pauli} must be a number"),
                        coeff.to_string(),
                    )
                })?;
                Ok((pauli.clone(), coeff))
            })
            .collect(),
        other => Err(DaaError::invalid_input(
            "observables must be a string, array or map",
            other.to_string(),
        )),
    }
}
