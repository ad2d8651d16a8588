//! WASM bridge for `tailflow_core`: orbit runners driven in batches from JS.

mod config;
mod orbit_runner;

pub use config::{OrbitConfig, SetKind};
pub use orbit_runner::WasmOrbitRunner;
