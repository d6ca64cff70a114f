//! Simulated quantum devices.
//!
//! The simulator only has to produce well-formed, shot-conserving results;
//! it tracks an exact probability distribution over computational basis
//! states, so `h` splits a state, `x`/`cx` permute bits, and everything it
//! does not model is skipped. Numeric fidelity to real hardware is not a
//! goal here.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{DaaError, Result};

/// Distinct basis states tracked per circuit before the device gives up.
const MAX_BASIS_STATES: usize = 4096;

const DEVICE_VERSION: &str = "1.0.0";

/// Circuit description consumed by the simulator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Circuit {
    pub num_qubits: usize,
    #[serde(default)]
    pub num_clbits: usize,
    #[serde(default)]
    pub instructions: Vec<Instruction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instruction {
    pub name: String,
    #[serde(default)]
    pub qubits: Vec<usize>,
    #[serde(default)]
    pub clbits: Vec<usize>,
}

/// Execution options recognized by the device, already filtered and merged
/// by the input layer.
#[derive(Debug, Clone, Default)]
pub struct ExecutionOptions {
    /// Seed for shot sampling; unseeded runs draw from entropy.
    pub seed_simulator: Option<u64>,
    /// Artificial per-pub device latency.
    pub latency: Option<Duration>,
}

/// Result data of one executed pub.
#[derive(Debug, Clone)]
pub enum PubData {
    Counts {
        counts: BTreeMap<String, u64>,
        num_bits: usize,
        shots: u64,
    },
    Expectation {
        evs: Vec<f64>,
        stds: Vec<f64>,
        precision: f64,
    },
}

/// One pub's data plus the wall time the device spent on it, which feeds
/// the job's usage metric.
#[derive(Debug, Clone)]
pub struct PubExecution {
    pub data: PubData,
    pub elapsed: Duration,
}

/// A named simulated device of fixed width.
#[derive(Debug, Clone)]
pub struct SimDevice {
    name: String,
    num_qubits: usize,
}

impl SimDevice {
    pub fn new(name: impl Into<String>, num_qubits: usize) -> Self {
        SimDevice {
            name: name.into(),
            num_qubits,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn num_qubits(&self) -> usize {
        self.num_qubits
    }

    /// Sample `shots` outcomes from the circuit's distribution.
    pub fn run_sampling(
        &self,
        circuit: &Circuit,
        shots: u64,
        options: &ExecutionOptions,
    ) -> Result<PubExecution> {
        let started = Instant::now();
        if let Some(latency) = options.latency {
            std::thread::sleep(latency);
        }

        let distribution = self.simulate(circuit)?;
        let measure_map = measure_map(circuit);
        let num_bits = classical_width(circuit, &measure_map);

        let mut rng = seeded_rng(options.seed_simulator);
        let mut counts: BTreeMap<String, u64> = BTreeMap::new();
        for _ in 0..shots {
            let state = sample_state(&distribution, &mut rng);
            let bits = readout(state, circuit, &measure_map, num_bits);
            *counts.entry(bits).or_insert(0) += 1;
        }

        Ok(PubExecution {
            data: PubData::Counts {
                counts,
                num_bits,
                shots,
            },
            elapsed: started.elapsed(),
        })
    }

    /// Exact expectation values of Pauli-string observables under the
    /// circuit's distribution. Off-diagonal (X/Y) terms contribute zero.
    pub fn run_estimation(
        &self,
        circuit: &Circuit,
        observables: &[(String, f64)],
        precision: f64,
        options: &ExecutionOptions,
    ) -> Result<PubExecution> {
        let started = Instant::now();
        if let Some(latency) = options.latency {
            std::thread::sleep(latency);
        }

        let distribution = self.simulate(circuit)?;
        let mut evs = Vec::with_capacity(observables.len());
        for (pauli, coeff) in observables {
            evs.push(coeff * self.expectation(circuit, &distribution, pauli)?);
        }
        let stds = vec![precision; evs.len()];

        Ok(PubExecution {
            data: PubData::Expectation {
                evs,
                stds,
                precision,
            },
            elapsed: started.elapsed(),
        })
    }

    /// Walk the circuit, producing basis states and their probabilities.
    fn simulate(&self, circuit: &Circuit) -> Result<Vec<(u64, f64)>> {
        if circuit.num_qubits > self.num_qubits {
            return Err(DaaError::invalid_input(
                format!(
                    "circuit uses {} qubits but backend {} has {}",
                    circuit.num_qubits, self.name, self.num_qubits
                ),
                self.name.clone(),
            ));
        }
        if circuit.num_qubits >= 64 {
            return Err(DaaError::invalid_input(
                format!("circuit width {} exceeds simulator limit", circuit.num_qubits),
                self.name.clone(),
            ));
        }

        let mut states: HashMap<u64, f64> = HashMap::new();
        states.insert(0, 1.0);

        for instruction in &circuit.instructions {
            match instruction.name.as_str() {
                "x" => {
                    let bit = 1u64 << qubit_arg(instruction, 0, circuit)?;
                    states = states.into_iter().map(|(s, p)| (s ^ bit, p)).collect();
                }
                "cx" => {
                    let control = 1u64 << qubit_arg(instruction, 0, circuit)?;
                    let target = 1u64 << qubit_arg(instruction, 1, circuit)?;
                    states = states
                        .into_iter()
                        .map(|(s, p)| if s & control != 0 { (s ^ target, p) } else { (s, p) })
                        .collect();
                }
                "h" => {
                    let bit = 1u64 << qubit_arg(instruction, 0, circuit)?;
                    let mut next: HashMap<u64, f64> = HashMap::with_capacity(states.len() * 2);
                    for (s, p) in states {
                        *next.entry(s & !bit).or_insert(0.0) += p / 2.0;
                        *next.entry(s | bit).or_insert(0.0) += p / 2.0;
                    }
                    if next.len() > MAX_BASIS_STATES {
                        return Err(DaaError::invalid_input(
                            "circuit branches into too many basis states",
                            self.name.clone(),
                        ));
                    }
                    states = next;
                }
                "measure" | "barrier" => {}
                other => {
                    tracing::debug!(gate = other, backend = %self.name, "Unmodeled gate, skipped");
                }
            }
        }

        // Fixed order, so seeded sampling maps RNG draws to the same
        // states on every run.
        let mut distribution: Vec<(u64, f64)> = states.into_iter().collect();
        distribution.sort_unstable_by_key(|(state, _)| *state);
        Ok(distribution)
    }

    fn expectation(&self, circuit: &Circuit, distribution: &[(u64, f64)], pauli: &str) -> Result<f64> {
        if pauli.len() != circuit.num_qubits {
            return Err(DaaError::invalid_input(
                format!(
                    "observable {} does not match circuit width {}",
                    pauli, circuit.num_qubits
                ),
                pauli.to_string(),
            ));
        }
        let mut z_mask = 0u64;
        // Leftmost character addresses the highest qubit.
        for (offset, ch) in pauli.chars().enumerate() {
            let qubit = circuit.num_qubits - 1 - offset;
            match ch {
                'Z' => z_mask |= 1 << qubit,
                'I' => {}
                'X' | 'Y' => return Ok(0.0),
                other => {
                    return Err(DaaError::invalid_input(
                        format!("unsupported Pauli operator {other} in {pauli}"),
                        pauli.to_string(),
                    ));
                }
            }
        }
        Ok(distribution
            .iter()
            .map(|(state, prob)| {
                let parity = (state & z_mask).count_ones() % 2;
                if parity == 0 {
                    *prob
                } else {
                    -*prob
                }
            })
            .sum())
    }

    /// Raw configuration document, before the registry narrows it to the
    /// recognized key set.
    pub fn configuration(&self) -> Value {
        json!({
            "backend_name": self.name,
            "backend_version": DEVICE_VERSION,
            "n_qubits": self.num_qubits,
            "basis_gates": ["x", "cx", "h", "measure"],
            "gates": [
                {"name": "x", "parameters": ["q"], "qasm_def": "gate x q { U(pi,0,pi) q; }"},
                {"name": "cx", "parameters": ["c", "t"], "qasm_def": "gate cx c,t { CX c,t; }"},
                {"name": "h", "parameters": ["q"], "qasm_def": "gate h q { U(pi/2,0,pi) q; }"},
                {"name": "barrier", "parameters": [], "qasm_def": ""},
            ],
            "local": true,
            "simulator": true,
            "conditional": false,
            "memory": false,
            "max_shots": 100_000,
            "max_experiments": 128,
            "online_date": "2000-01-01T00:00:00Z",
            "description": format!("{} simulated device, {} qubits", self.name, self.num_qubits),
            "supported_instructions": ["x", "cx", "h", "measure", "barrier"],
            "dt": 0.0,
            "dtm": 0.0,
            "open_pulse": false,
            // Engine internals; the registry drops anything it does not recognize.
            "state_tracker": "basis-distribution",
            "max_basis_states": MAX_BASIS_STATES,
        })
    }

    /// Synthesized calibration document, the shape emitted for pure
    /// simulators: fixed epoch date, zeroed qubit figures.
    pub fn properties(&self) -> Value {
        let qubit = |name: &str, unit: &str, value: f64| {
            json!({
                "date": "2000-01-01T00:00:00Z",
                "name": name,
                "unit": unit,
                "value": value,
            })
        };
        let qubits: Vec<Value> = (0..self.num_qubits)
            .map(|_| {
                json!([
                    qubit("T1", "us", 0.0),
                    qubit("T2", "us", 0.0),
                    qubit("frequency", "GHz", 0.0),
                    qubit("readout_error", "", 0.0),
                    qubit("operational", "", 1.0),
                ])
            })
            .collect();
        json!({
            "backend_name": self.name,
            "backend_version": DEVICE_VERSION,
            "last_update_date": "2000-01-01T00:00:00Z",
            "qubits": qubits,
            "gates": self.configuration()["gates"],
            "general": [],
        })
    }
}

fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

fn qubit_arg(instruction: &Instruction, index: usize, circuit: &Circuit) -> Result<usize> {
    let qubit = *instruction.qubits.get(index).ok_or_else(|| {
        DaaError::invalid_input(
            format!("gate {} is missing qubit operand {index}", instruction.name),
            instruction.name.clone(),
        )
    })?;
    if qubit >= circuit.num_qubits {
        return Err(DaaError::invalid_input(
            format!("gate {} addresses qubit {qubit} outside the circuit", instruction.name),
            instruction.name.clone(),
        ));
    }
    Ok(qubit)
}

/// Qubit-to-clbit mapping from the circuit's measure instructions.
fn measure_map(circuit: &Circuit) -> Vec<(usize, usize)> {
    circuit
        .instructions
        .iter()
        .filter(|i| i.name == "measure")
        .filter_map(|i| match (i.qubits.first(), i.clbits.first()) {
            (Some(&q), Some(&c)) => Some((q, c)),
            (Some(&q), None) => Some((q, q)),
            _ => None,
        })
        .collect()
}

fn classical_width(circuit: &Circuit, measure_map: &[(usize, usize)]) -> usize {
    if circuit.num_clbits > 0 {
        circuit.num_clbits
    } else if let Some(max_clbit) = measure_map.iter().map(|(_, c)| *c).max() {
        max_clbit + 1
    } else {
        circuit.num_qubits
    }
}

fn sample_state(distribution: &[(u64, f64)], rng: &mut StdRng) -> u64 {
    let mut r: f64 = rng.gen();
    for (state, prob) in distribution {
        if r < *prob {
            return *state;
        }
        r -= prob;
    }
    // Rounding can leave a sliver past the last entry.
    distribution.last().map(|(s, _)| *s).unwrap_or(0)
}

/// Map a basis state to its classical bitstring, most significant bit first.
fn readout(state: u64, circuit: &Circuit, measure_map: &[(usize, usize)], num_bits: usize) -> String {
    let mut bits = vec![0u8; num_bits];
    if measure_map.is_empty() {
        for (qubit, bit) in bits.iter_mut().enumerate().take(circuit.num_qubits) {
            *bit = ((state >> qubit) & 1) as u8;
        }
    } else {
        for (qubit, clbit) in measure_map {
            if *clbit < num_bits {
                bits[*clbit] = ((state >> qubit) & 1) as u8;
            }
        }
    }
    bits.iter()
        .rev()
        .map(|b| if *b == 1 { '1' } else { '0' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device() -> SimDevice {
        SimDevice::new("test_5", 5)
    }

    fn gate(name: &str, qubits: &[usize]) -> Instruction {
        Instruction {
            name: name.to_string(),
            qubits: qubits.to_vec(),
            clbits: Vec::new(),
        }
    }

    fn measure(qubit: usize, clbit: usize) -> Instruction {
        Instruction {
            name: "measure".to_string(),
            qubits: vec![qubit],
            clbits: vec![clbit],
        }
    }

    #[test]
    fn x_gate_is_deterministic() {
        let circuit = Circuit {
            num_qubits: 2,
            num_clbits: 2,
            instructions: vec![gate("x", &[0]), measure(0, 0), measure(1, 1)],
        };
        let result = device()
            .run_sampling(&circuit, 100, &ExecutionOptions::default())
            .unwrap();
        match result.data {
            PubData::Counts { counts, .. } => {
                assert_eq!(counts.get("01"), Some(&100));
                assert_eq!(counts.len(), 1);
            }
            _ => panic!("expected counts"),
        }
    }

    #[test]
    fn h_gate_gives_two_outcomes_summing_to_shots() {
        let circuit = Circuit {
            num_qubits: 1,
            num_clbits: 1,
            instructions: vec![gate("h", &[0]), measure(0, 0)],
        };
        let result = device()
            .run_sampling(&circuit, 10_000, &ExecutionOptions::default())
            .unwrap();
        match result.data {
            PubData::Counts { counts, .. } => {
                assert_eq!(counts.values().sum::<u64>(), 10_000);
                assert!(counts.len() <= 2);
                // Both outcomes should show up with overwhelming probability.
                assert!(counts.get("0").copied().unwrap_or(0) > 3000);
                assert!(counts.get("1").copied().unwrap_or(0) > 3000);
            }
            _ => panic!("expected counts"),
        }
    }

    #[test]
    fn bell_circuit_correlates_bits() {
        let circuit = Circuit {
            num_qubits: 2,
            num_clbits: 2,
            instructions: vec![
                gate("h", &[0]),
                gate("cx", &[0, 1]),
                measure(0, 0),
                measure(1, 1),
            ],
        };
        let options = ExecutionOptions {
            seed_simulator: Some(7),
            latency: None,
        };
        let result = device().run_sampling(&circuit, 1000, &options).unwrap();
        match result.data {
            PubData::Counts { counts, .. } => {
                assert_eq!(counts.values().sum::<u64>(), 1000);
                for key in counts.keys() {
                    assert!(key == "00" || key == "11", "uncorrelated outcome {key}");
                }
            }
            _ => panic!("expected counts"),
        }
    }

    #[test]
    fn seeded_runs_are_reproducible() {
        let circuit = Circuit {
            num_qubits: 1,
            num_clbits: 1,
            instructions: vec![gate("h", &[0]), measure(0, 0)],
        };
        let options = ExecutionOptions {
            seed_simulator: Some(42),
            latency: None,
        };
        let a = device().run_sampling(&circuit, 500, &options).unwrap();
        let b = device().run_sampling(&circuit, 500, &options).unwrap();
        match (a.data, b.data) {
            (PubData::Counts { counts: ca, .. }, PubData::Counts { counts: cb, .. }) => {
                assert_eq!(ca, cb);
            }
            _ => panic!("expected counts"),
        }
    }

    #[test]
    fn seeded_sampling_is_stable_across_repeats() {
        let circuit = Circuit {
            num_qubits: 2,
            num_clbits: 2,
            instructions: vec![
                gate("h", &[0]),
                gate("h", &[1]),
                measure(0, 0),
                measure(1, 1),
            ],
        };
        let options = ExecutionOptions {
            seed_simulator: Some(1234),
            latency: None,
        };
        let reference = match device().run_sampling(&circuit, 200, &options).unwrap().data {
            PubData::Counts { counts, .. } => counts,
            _ => panic!("expected counts"),
        };
        for run in 0..20 {
            match device().run_sampling(&circuit, 200, &options).unwrap().data {
                PubData::Counts { counts, .. } => {
                    assert_eq!(counts, reference, "seeded run {run} diverged");
                }
                _ => panic!("expected counts"),
            }
        }
    }

    #[test]
    fn circuit_wider_than_device_is_rejected() {
        let circuit = Circuit {
            num_qubits: 6,
            num_clbits: 6,
            instructions: vec![],
        };
        let err = device()
            .run_sampling(&circuit, 10, &ExecutionOptions::default())
            .unwrap_err();
        assert!(matches!(err, DaaError::InvalidInput { .. }));
    }

    #[test]
    fn z_expectation_of_excited_qubit() {
        let circuit = Circuit {
            num_qubits: 1,
            num_clbits: 1,
            instructions: vec![gate("x", &[0])],
        };
        let result = device()
            .run_estimation(
                &circuit,
                &[("Z".to_string(), 1.0)],
                0.01,
                &ExecutionOptions::default(),
            )
            .unwrap();
        match result.data {
            PubData::Expectation { evs, stds, .. } => {
                assert!((evs[0] + 1.0).abs() < 1e-9);
                assert_eq!(stds, vec![0.01]);
            }
            _ => panic!("expected expectation values"),
        }
    }

    #[test]
    fn zz_expectation_of_bell_state() {
        let circuit = Circuit {
            num_qubits: 2,
            num_clbits: 2,
            instructions: vec![gate("h", &[0]), gate("cx", &[0, 1])],
        };
        let result = device()
            .run_estimation(
                &circuit,
                &[("ZZ".to_string(), 1.0), ("IZ".to_string(), 1.0)],
                0.02,
                &ExecutionOptions::default(),
            )
            .unwrap();
        match result.data {
            PubData::Expectation { evs, .. } => {
                assert!((evs[0] - 1.0).abs() < 1e-9, "ZZ of a Bell state is +1");
                assert!(evs[1].abs() < 1e-9, "single-qubit Z averages out");
            }
            _ => panic!("expected expectation values"),
        }
    }
}
