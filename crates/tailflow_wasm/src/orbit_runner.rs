//! Stepped orbit runner.

use crate::config::{BuiltRunner, OrbitConfig};
use serde_wasm_bindgen::{from_value, to_value};
use tailflow_core::dynset::EnclosureSet;
use tailflow_core::orbit::{OrbitProgress, OrbitSample};
use wasm_bindgen::prelude::*;

/// WASM-exported runner that moves an enclosure set along the KS flow.
/// Allows progress reporting by running batches of steps at a time.
#[wasm_bindgen]
pub struct WasmOrbitRunner {
    runner: Option<BuiltRunner>,
}

fn to_js<T: serde::Serialize>(value: &T) -> Result<JsValue, JsValue> {
    to_value(value).map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
}

impl WasmOrbitRunner {
    fn runner(&self) -> Result<&BuiltRunner, JsValue> {
        self.runner
            .as_ref()
            .ok_or_else(|| JsValue::from_str("Runner not initialized"))
    }

    fn progress(&self) -> Result<OrbitProgress, JsValue> {
        Ok(match self.runner()? {
            BuiltRunner::C0(runner) => runner.progress(),
            BuiltRunner::C1(runner) => runner.progress(),
        })
    }
}

#[wasm_bindgen]
impl WasmOrbitRunner {
    #[wasm_bindgen(constructor)]
    pub fn new(config_val: JsValue) -> Result<WasmOrbitRunner, JsValue> {
        console_error_panic_hook::set_once();

        let config: OrbitConfig = from_value(config_val)
            .map_err(|e| JsValue::from_str(&format!("Invalid orbit config: {}", e)))?;
        let runner = config
            .build()
            .map_err(|e| JsValue::from_str(&format!("Orbit init failed: {:#}", e)))?;

        Ok(WasmOrbitRunner {
            runner: Some(runner),
        })
    }

    pub fn is_done(&self) -> bool {
        self.progress().map_or(true, |progress| progress.done)
    }

    pub fn run_steps(&mut self, batch_size: u32) -> Result<JsValue, JsValue> {
        let runner = self
            .runner
            .as_mut()
            .ok_or_else(|| JsValue::from_str("Runner not initialized"))?;

        let progress = match runner {
            BuiltRunner::C0(runner) => runner.run_steps(batch_size as usize),
            BuiltRunner::C1(runner) => runner.run_steps(batch_size as usize),
        }
        .map_err(|e| JsValue::from_str(&format!("Orbit step failed: {:#}", e)))?;

        to_js(&progress)
    }

    pub fn get_progress(&self) -> Result<JsValue, JsValue> {
        to_js(&self.progress()?)
    }

    /// Samples recorded so far, the initial one first.
    pub fn get_samples(&self) -> Result<JsValue, JsValue> {
        let samples: &[OrbitSample] = match self.runner()? {
            BuiltRunner::C0(runner) => runner.samples(),
            BuiltRunner::C1(runner) => runner.samples(),
        };
        to_js(&samples)
    }

    /// Current enclosure of the full state.
    pub fn get_series(&self) -> Result<JsValue, JsValue> {
        match self.runner()? {
            BuiltRunner::C0(runner) => to_js(runner.set().current_series()),
            BuiltRunner::C1(runner) => to_js(runner.set().current_series()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::WasmOrbitRunner;
    use wasm_bindgen::JsValue;
    use wasm_bindgen_test::wasm_bindgen_test;

    #[derive(serde::Deserialize)]
    struct Progress {
        done: bool,
        current_step: usize,
        max_steps: usize,
    }

    fn config_value(json: &str) -> JsValue {
        js_sys::JSON::parse(json).expect("json")
    }

    fn small_config(kind: &str, steps: usize) -> JsValue {
        config_value(&format!(
            r#"{{
                "kind": "{kind}",
                "parameters": {{"nu": 0.1, "dimension": 8, "first_dissipative_index": 4}},
                "solver": {{"order": 5, "absolute_tolerance": 1e-18, "relative_tolerance": 1e-18,
                            "max_step": 0.1, "step_control": {{"type": "Fixed", "step": 1e-6}}}},
                "leading_modes": 4,
                "initial": [0.1, 0.05, 0.01],
                "radius": 1e-4,
                "tail_constant": 1e-8,
                "steps": {steps}
            }}"#
        ))
    }

    #[wasm_bindgen_test]
    fn runner_rejects_invalid_config() {
        let result = WasmOrbitRunner::new(config_value(r#"{"steps": 0}"#));
        let message = result
            .err()
            .and_then(|err| err.as_string())
            .unwrap_or_default();
        assert!(message.contains("Orbit init failed"), "{message}");
    }

    #[wasm_bindgen_test]
    fn c0_runner_reports_progress_in_batches() {
        let mut runner = WasmOrbitRunner::new(small_config("c0", 3)).expect("runner");
        assert!(!runner.is_done());

        let value = runner.run_steps(2).expect("batch");
        let progress: Progress = serde_wasm_bindgen::from_value(value).expect("progress");
        assert_eq!(progress.current_step, 2);
        assert_eq!(progress.max_steps, 3);
        assert!(!progress.done);

        runner.run_steps(5).expect("batch");
        assert!(runner.is_done());
        let samples = runner.get_samples().expect("samples");
        assert_eq!(js_sys::Array::from(&samples).length(), 4);
        assert!(runner.get_series().is_ok());
        let progress: Progress =
            serde_wasm_bindgen::from_value(runner.get_progress().expect("progress"))
                .expect("progress");
        assert!(progress.done);
    }

    #[wasm_bindgen_test]
    fn c1_runner_moves_the_derivative() {
        let mut runner = WasmOrbitRunner::new(small_config("c1", 1)).expect("runner");
        runner.run_steps(1).expect("one C1 step");
        assert!(runner.is_done());
    }
}
