//! Result payload serialization.
//!
//! Two modes, selected by the input's `support_qiskit` flag: a rich mode
//! that tags every container with `__type__`/`__value__` wrappers so an
//! SDK-side decoder can rebuild typed objects, and a plain mode that emits
//! bare JSON for clients without the SDK.

use serde_json::{json, Value};

use crate::backend::{PubData, PubExecution};
use crate::error::Result;

pub fn serialize_results(results: &[PubExecution], support_qiskit: bool) -> Result<String> {
    let payload = if support_qiskit {
        rich_result(results)
    } else {
        plain_result(results)
    };
    Ok(serde_json::to_string(&payload)?)
}

fn pub_data(data: &PubData, support_qiskit: bool) -> Value {
    match data {
        PubData::Counts {
            counts,
            num_bits,
            shots,
        } => {
            let bit_array = json!({
                "counts": counts,
                "num_bits": num_bits,
                "num_shots": shots,
            });
            if support_qiskit {
                json!({
                    "__type__": "DataBin",
                    "__value__": {
                        "field_names": ["c"],
                        "fields": {
                            "c": {"__type__": "BitArray", "__value__": bit_array},
                        },
                    },
                })
            } else {
                json!({"c": bit_array})
            }
        }
        PubData::Expectation { evs, stds, .. } => {
            let fields = json!({"evs": evs, "stds": stds});
            if support_qiskit {
                json!({
                    "__type__": "DataBin",
                    "__value__": {
                        "field_names": ["evs", "stds"],
                        "fields": fields,
                    },
                })
            } else {
                fields
            }
        }
    }
}

fn pub_metadata(result: &PubExecution) -> Value {
    let mut metadata = json!({
        "simulator_metadata": {
            "time_taken_execute": result.elapsed.as_secs_f64(),
        },
    });
    match &result.data {
        PubData::Counts { shots, .. } => metadata["shots"] = json!(shots),
        PubData::Expectation { precision, .. } => {
            metadata["target_precision"] = json!(precision);
        }
    }
    metadata
}

fn plain_result(results: &[PubExecution]) -> Value {
    let pubs: Vec<Value> = results
        .iter()
        .map(|r| {
            json!({
                "data": pub_data(&r.data, false),
                "metadata": pub_metadata(r),
            })
        })
        .collect();
    json!({"results": pubs, "metadata": {"version": 2}})
}

fn rich_result(results: &[PubExecution]) -> Value {
    let pubs: Vec<Value> = results
        .iter()
        .map(|r| {
            json!({
                "__type__": "PubResult",
                "__value__": {
                    "data": pub_data(&r.data, true),
                    "metadata": pub_metadata(r),
                },
            })
        })
        .collect();
    json!({
        "__type__": "PrimitiveResult",
        "__value__": {
            "pub_results": pubs,
            "metadata": {"version": 2},
        },
    })
}
