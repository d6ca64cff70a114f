//! Sampling computation: run each pub's circuit and collect shot counts.

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
    let mut results = Vec::with_capacity(job_input.pubs.len());
    for pub_value in &job_input.pubs {
        let sampler_pub = input::parse_sampler_pub(pub_value)?;
        let shots = sampler_pub
            .shots
            .or(job_input.shots)
            .unwrap_or(input::DEFAULT_SAMPLER_SHOTS);
        results.push(device.run_sampling(&sampler_pub.circuit, shots, &exec_options)?);
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::PubData;
    use serde_json::json;

    #[test]
    fn pub_shots_override_payload_shots() {
        let device = SimDevice::new("test_3", 3);
        let payload = json!({
            "pubs": [
                [{"num_qubits": 1, "num_clbits": 1,
                  "instructions": [{"name": "measure", "qubits": [0], "clbits": [0]}]},
                 null, 25],
                {"num_qubits": 1, "num_clbits": 1,
                 "instructions": [{"name": "measure", "qubits": [0], "clbits": [0]}]},
            ],
            "version": 2,
            "shots": 50,
        })
        .to_string();
        let job_input = input::parse_input(&payload).unwrap();
        let results = run(&device, &job_input, &Map::new()).unwrap();
        let shot_totals: Vec<u64> = results
            .iter()
            .map(|r| match &r.data {
                PubData::Counts { counts, .. } => counts.values().sum(),
                _ => 0,
            })
            .collect();
        assert_eq!(shot_totals, vec![25, 50]);
    }

    #[test]
    fn default_shots_apply() {
        let device = SimDevice::new("test_3", 3);
        let payload = json!({
            "pubs": [{"num_qubits": 1, "num_clbits": 1, "instructions": []}],
            "version": 2,
        })
        .to_string();
        let job_input = input::parse_input(&payload).unwrap();
        let results = run(&device, &job_input, &Map::new()).unwrap();
        match &results[0].data {
            PubData::Counts { counts, .. } => {
                assert_eq!(counts.values().sum::<u64>(), input::DEFAULT_SAMPLER_SHOTS);
            }
            _ => panic!("expected counts"),
        }
    }
}
