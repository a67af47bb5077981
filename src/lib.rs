//! Graph-constrained dungeon layout engine — Rust implementation.
//!
//! Given a level description (rooms as graph nodes, passages as edges,
//! candidate shapes per room), the engine produces a planar embedding:
//! non-overlapping orthogonal room polygons on the integer grid,
//! connected by doors exactly where the graph demands. Exposes a single
//! Python-callable function `generate_json` that accepts a JSON string
//! (engine_params) and returns a JSON string (engine_result), plus the
//! regular Rust API re-exported below.

use pyo3::prelude::*;

pub mod annealing;
pub mod chains;
pub mod config_spaces;
pub mod convert;
pub mod doors;
pub mod energy;
pub mod errors;
pub mod events;
pub mod generate;
pub mod geometry;
pub mod layout;
pub mod mapping;
pub mod planner;
pub mod prng;
pub mod types;

pub use errors::{ConfigError, GenerationError};
pub use events::{CancellationToken, GenerationObserver, NoopObserver};
pub use generate::{generate as generate_layout, generate_with, GenerationReport};
pub use prng::Pcg32;
pub use types::{
    EngineParams, EngineResult, GeneratorConfig, LevelDescription, MapLayout,
};

/// Run the layout engine.
///
/// Takes a JSON string matching the `engine_params` schema and returns
/// a JSON string matching the `engine_result` schema. Malformed JSON is
/// a Python error; a failed generation is reported inside the result.
#[pyfunction]
fn generate_json(params_json: &str) -> PyResult<String> {
    let params: EngineParams = serde_json::from_str(params_json)
        .map_err(|e| {
            PyErr::new::<pyo3::exceptions::PyValueError, _>(format!(
                "Invalid engine_params JSON: {e}"
            ))
        })?;

    let result = match generate::generate(&params.level, &params.config, params.seed) {
        Ok(report) => EngineResult {
            layout: Some(report.layout),
            error: None,
            iterations: report.iterations,
            elapsed_ms: report.elapsed.as_millis() as u64,
        },
        Err(err) => {
            let partial = match &err {
                GenerationError::Cancelled { partial } => {
                    partial.as_deref().cloned()
                }
                _ => None,
            };
            EngineResult {
                layout: partial,
                error: Some(err.to_string()),
                iterations: 0,
                elapsed_ms: 0,
            }
        }
    };

    serde_json::to_string(&result).map_err(|e| {
        PyErr::new::<pyo3::exceptions::PyValueError, _>(format!(
            "Failed to serialize engine_result: {e}"
        ))
    })
}

/// Layout engine, importable from Python.
#[pymodule]
fn dungen_rs(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(generate_json, m)?)?;
    Ok(())
}
