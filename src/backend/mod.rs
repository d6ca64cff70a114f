//! Backend registry: resolves backend names to simulated devices and serves
//! their descriptive, configuration and calibration documents.

pub mod device;

use serde_json::{json, Map, Value};

pub use device::{Circuit, ExecutionOptions, Instruction, PubData, PubExecution, SimDevice};

use crate::config::BackendSpec;
use crate::error::{DaaError, Result};

type BackendConstructor = fn() -> SimDevice;

/// All constructors an override list may name. The default registry uses a
/// subset of these.
const CONSTRUCTORS: &[(&str, BackendConstructor)] = &[
    ("hummingbird_7", || SimDevice::new("hummingbird_7", 7)),
    ("falcon_27", || SimDevice::new("falcon_27", 27)),
    ("osprey_127", || SimDevice::new("osprey_127", 127)),
    ("condor_133", || SimDevice::new("condor_133", 133)),
];

/// Names registered by default, in order; the first is the default backend.
const DEFAULT_BACKENDS: &[&str] = &["osprey_127", "falcon_27", "hummingbird_7", "condor_133"];

/// Top-level configuration keys recognized by the API. Anything else the
/// device reports is dropped; this is deliberate schema narrowing, not a
/// passthrough.
const CONFIG_KEYS: &[&str] = &[
    "backend_name",
    "backend_version",
    "n_qubits",
    "basis_gates",
    "coupling_map",
    "gates",
    "local",
    "simulator",
    "conditional",
    "memory",
    "max_shots",
    "max_experiments",
    "online_date",
    "description",
    "supported_instructions",
    "dt",
    "dtm",
    "open_pulse",
];

/// Maps backend names to device constructors. Immutable after service
/// construction; order is preserved so the first entry serves as default.
#[derive(Debug, Clone)]
pub struct BackendRegistry {
    entries: Vec<(String, BackendConstructor)>,
    include_optional_fields: bool,
}

impl BackendRegistry {
    /// Registry over the built-in device set, or over an override list.
    /// Override entries that name no known constructor are logged and
    /// skipped; one broken entry must not keep the service from starting.
    pub fn from_config(specs: Option<&[BackendSpec]>, include_optional_fields: bool) -> Self {
        let mut entries: Vec<(String, BackendConstructor)> = Vec::new();
        match specs {
            None => {
                for name in DEFAULT_BACKENDS {
                    if let Some(ctor) = lookup_constructor(name) {
                        entries.push((name.to_string(), ctor));
                    }
                }
            }
            Some(specs) => {
                for spec in specs {
                    match lookup_constructor(&spec.constructor) {
                        Some(ctor) => {
                            let name = ctor().name().to_string();
                            entries.push((name, ctor));
                        }
                        None => {
                            tracing::warn!(
                                constructor = %spec.constructor,
                                "Loading backend failed, skipped"
                            );
                        }
                    }
                }
            }
        }
        tracing::info!(
            backends = ?entries.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>(),
            "Backend registry initialized"
        );
        BackendRegistry {
            entries,
            include_optional_fields,
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }

    /// First registered backend, used when a submission names none.
    pub fn default_backend_name(&self) -> Option<&str> {
        self.entries.first().map(|(n, _)| n.as_str())
    }

    /// Construct the device for `name`.
    pub fn device(&self, name: &str) -> Result<SimDevice> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, ctor)| ctor())
            .ok_or_else(|| DaaError::BackendNotFound(name.to_string()))
    }

    /// Descriptive entry for one backend.
    pub fn backend_details(&self, name: &str) -> Result<Value> {
        if !self.contains(name) {
            return Err(DaaError::BackendNotFound(name.to_string()));
        }
        let mut details = json!({
            "name": name,
            "status": "online",
        });
        if self.include_optional_fields {
            details["message"] = json!(format!("backend {name}"));
            details["version"] = json!("1.0.0");
        }
        Ok(details)
    }

    /// Device configuration narrowed to the recognized key whitelist; gate
    /// entries without a definition are dropped.
    pub fn backend_configuration(&self, name: &str) -> Result<Value> {
        let device = self.device(name)?;
        let full = device.configuration();
        let mut narrowed = Map::new();
        if let Value::Object(fields) = full {
            for (key, value) in fields {
                if CONFIG_KEYS.contains(&key.as_str()) {
                    narrowed.insert(key, value);
                }
            }
        }
        if let Some(Value::Array(gates)) = narrowed.get_mut("gates").map(std::mem::take) {
            let kept: Vec<Value> = gates
                .into_iter()
                .filter(|g| {
                    g.get("qasm_def")
                        .and_then(Value::as_str)
                        .is_some_and(|d| !d.is_empty())
                })
                .collect();
            narrowed.insert("gates".to_string(), Value::Array(kept));
        }
        Ok(Value::Object(narrowed))
    }

    /// Calibration data for one backend.
    pub fn backend_properties(&self, name: &str) -> Result<Value> {
        Ok(self.device(name)?.properties())
    }
}

fn lookup_constructor(name: &str) -> Option<BackendConstructor> {
    CONSTRUCTORS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, ctor)| *ctor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_order() {
        let registry = BackendRegistry::from_config(None, false);
        assert_eq!(
            registry.names(),
            vec!["osprey_127", "falcon_27", "hummingbird_7", "condor_133"]
        );
        assert_eq!(registry.default_backend_name(), Some("osprey_127"));
    }

    #[test]
    fn override_list_skips_unresolvable_entries() {
        let specs = vec![
            BackendSpec {
                constructor: "falcon_27".to_string(),
            },
            BackendSpec {
                constructor: "does_not_exist".to_string(),
            },
        ];
        let registry = BackendRegistry::from_config(Some(&specs), false);
        assert_eq!(registry.names(), vec!["falcon_27"]);
    }

    #[test]
    fn unknown_backend_everywhere() {
        let registry = BackendRegistry::from_config(None, false);
        assert!(matches!(
            registry.backend_details("nope"),
            Err(DaaError::BackendNotFound(_))
        ));
        assert!(matches!(
            registry.backend_configuration("nope"),
            Err(DaaError::BackendNotFound(_))
        ));
        assert!(matches!(
            registry.backend_properties("nope"),
            Err(DaaError::BackendNotFound(_))
        ));
    }

    #[test]
    fn configuration_is_narrowed_to_whitelist() {
        let registry = BackendRegistry::from_config(None, false);
        let config = registry.backend_configuration("falcon_27").unwrap();
        let keys: Vec<&String> = config.as_object().unwrap().keys().collect();
        for key in &keys {
            assert!(CONFIG_KEYS.contains(&key.as_str()), "unexpected key {key}");
        }
        // Engine-internal keys reported by the device must be gone.
        assert!(config.get("state_tracker").is_none());
        assert!(config.get("max_basis_states").is_none());
        assert_eq!(config["n_qubits"], 27);
    }

    #[test]
    fn gates_without_definition_are_dropped() {
        let registry = BackendRegistry::from_config(None, false);
        let config = registry.backend_configuration("osprey_127").unwrap();
        let gates = config["gates"].as_array().unwrap();
        assert!(gates.iter().all(|g| g["name"] != "barrier"));
        assert!(gates.iter().any(|g| g["name"] == "cx"));
    }

    #[test]
    fn details_optional_fields() {
        let bare = BackendRegistry::from_config(None, false);
        let details = bare.backend_details("osprey_127").unwrap();
        assert!(details.get("message").is_none());

        let rich = BackendRegistry::from_config(None, true);
        let details = rich.backend_details("osprey_127").unwrap();
        assert_eq!(details["message"], "backend osprey_127");
        assert_eq!(details["version"], "1.0.0");
    }

    #[test]
    fn properties_shape() {
        let registry = BackendRegistry::from_config(None, false);
        let props = registry.backend_properties("hummingbird_7").unwrap();
        assert_eq!(props["backend_name"], "hummingbird_7");
        assert_eq!(props["qubits"].as_array().unwrap().len(), 7);
        let first_qubit = props["qubits"][0].as_array().unwrap();
        assert_eq!(first_qubit[0]["name"], "T1");
    }
}
