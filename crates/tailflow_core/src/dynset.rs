//! Sets that carry an enclosure of a PDE state from step to step.
//!
//! The leading modes are represented by a doubleton `x + C r0 + B r` to
//! keep the wrapping effect under control; the remaining explicit modes
//! and the tail live in a [`GeometricBound`] that is intersected with the
//! doubleton after every move.

mod c0_tail;
mod c1_tail;
mod doubleton;
mod matrix_doubleton;

pub use c0_tail::C0DoubletonSetGeometricTail;
pub use c1_tail::C1DoubletonSetGeometricTail;
pub use doubleton::Doubleton;
pub use matrix_doubleton::MatrixDoubleton;

use crate::error::Result;
use crate::geometric_bound::GeometricBound;
use crate::interval::Interval;
use crate::linalg::IVector;
use crate::solver::PdeSolver;
use crate::traits::DissipativeVectorField;
use serde::{Deserialize, Serialize};

/// When to fold the unstructured part of a doubleton into its structured
/// part.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReorganizationSettings {
    /// Reorganize once `maxDiam(r) > factor * maxDiam(r0)`.
    pub factor: f64,
}

impl Default for ReorganizationSettings {
    fn default() -> Self {
        Self { factor: 1.0 }
    }
}

/// A set that can be moved along the flow by a [`PdeSolver`].
pub trait EnclosureSet: Clone {
    /// Writes the image of `self` after one step into `result`.
    fn move_into<V: DissipativeVectorField>(
        &self,
        solver: &mut PdeSolver<V>,
        result: &mut Self,
    ) -> Result<()>;

    fn move_by<V: DissipativeVectorField>(&mut self, solver: &mut PdeSolver<V>) -> Result<()> {
        let mut result = self.clone();
        self.move_into(solver, &mut result)?;
        *self = result;
        Ok(())
    }

    /// Enclosure of the full state, tail included.
    fn current_series(&self) -> &GeometricBound;

    /// Enclosure of all trajectories over the last step.
    fn last_enclosure(&self) -> &GeometricBound;

    fn current_time(&self) -> Interval;

    /// Box enclosure of the leading modes.
    fn current_set(&self) -> &IVector;
}
