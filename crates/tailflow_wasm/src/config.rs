//! Configuration accepted from JS.

use serde::{Deserialize, Serialize};
use tailflow_core::dynset::{C0DoubletonSetGeometricTail, C1DoubletonSetGeometricTail};
use tailflow_core::kuramoto_sivashinsky::KsSineVectorField;
use tailflow_core::orbit::{OrbitRunner, OrbitSettings};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SetKind {
    #[default]
    C0,
    C1,
}

/// Orbit settings plus the kind of set to move.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrbitConfig {
    #[serde(default)]
    pub kind: SetKind,
    #[serde(flatten)]
    pub settings: OrbitSettings,
}

pub(crate) enum BuiltRunner {
    C0(OrbitRunner<C0DoubletonSetGeometricTail, KsSineVectorField>),
    C1(OrbitRunner<C1DoubletonSetGeometricTail, KsSineVectorField>),
}

impl OrbitConfig {
    pub(crate) fn build(&self) -> anyhow::Result<BuiltRunner> {
        Ok(match self.kind {
            SetKind::C0 => BuiltRunner::C0(OrbitRunner::c0_from_settings(&self.settings)?),
            SetKind::C1 => BuiltRunner::C1(OrbitRunner::c1_from_settings(&self.settings)?),
        })
    }
}
