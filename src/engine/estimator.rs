//! Estimation computation: exact expectation values per pub.

use serde_json::{Map, Value};

use crate::backend::{PubExecution, SimDevice};
use crate::engine::input::{self, JobInput};
use crate::error::Result;

pub fn run(
    device: &SimDevice,
    job_input: &JobInput,
    options: &Map<String, Value>,
) -> Result<Vec<PubExecution>> {
    let exec_options = input::execution_options(options);
    let default_precision = options
        .get("default_precision")
        .and_then(Value::as_f64)
        .unwrap_or(input::DEFAULT_PRECISION);

    let mut results = Vec::with_capacity(job_input.pubs.len());
    for pub_value in &job_input.pubs {
        let estimator_pub = input::parse_estimator_pub(pub_value)?;
        let precision = estimator_pub
            .precision
            .or(job_input.precision)
            .unwrap_or(default_precision);
        results.push(device.run_estimation(
            &estimator_pub.circuit,
            &estimator_pub.observables,
            precision,
            &exec_options,
        )?);
    }
    Ok(results)
}
