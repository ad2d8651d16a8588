use crate::error::Result;
use crate::geometric_bound::GeometricBound;
use crate::interval::Interval;
use crate::linalg::IMatrix;

/// Taylor coefficients of a trajectory, indexed by derivative order.
pub type TaylorJet = Vec<GeometricBound>;

/// Read and write access to one level of a Taylor jet.
///
/// The recurrences of a vector field are written once against this
/// capability and run both on plain trajectories and on variational
/// columns.
pub trait CoefficientSource {
    /// Coefficient of mode `k >= 1` at derivative order `order`.
    fn coefficient(&self, order: usize, k: usize) -> Interval;
    fn set_coefficient(&mut self, order: usize, k: usize, value: Interval);
    fn constant(&self, order: usize) -> f64;
    fn set_constant(&mut self, order: usize, constant: f64) -> Result<()>;
    fn decay(&self, order: usize) -> f64;
    fn set_decay(&mut self, order: usize, decay: f64) -> Result<()>;
}

/// A dissipative PDE in a spectral basis: finitely many explicit modes
/// and a geometric tail that the linear part eventually dominates.
pub trait DissipativeVectorField {
    /// Number of explicitly tracked modes.
    fn dimension(&self) -> usize;

    /// Smallest mode from which on the linear part is contracting.
    fn first_dissipative_index(&self) -> usize;

    fn evaluate(&mut self, x: &GeometricBound) -> Result<GeometricBound>;

    /// Jacobian `df_c / da_j` of the explicit block.
    fn derivative(&mut self, x: &GeometricBound) -> Result<IMatrix>;

    /// Fills orders `1..=order` of `jet` from order 0, including the tail
    /// envelope of every new level.
    fn compute_taylor_coefficients(&mut self, jet: &mut [GeometricBound], order: usize)
        -> Result<()>;

    /// Same recurrence linearised around `base`, written into `column`.
    fn compute_variational_coefficients(
        &mut self,
        base: &[GeometricBound],
        column: &mut [GeometricBound],
        order: usize,
    ) -> Result<()>;

    /// Trajectory first, then every variational column.
    fn compute_jet_with_columns(
        &mut self,
        jet: &mut [GeometricBound],
        columns: &mut [TaylorJet],
        order: usize,
    ) -> Result<()> {
        self.compute_taylor_coefficients(jet, order)?;
        for column in columns.iter_mut() {
            self.compute_variational_coefficients(jet, column, order)?;
        }
        Ok(())
    }

    /// Widens the dissipative modes and the tail constant of `jet[0]` until
    /// the vector field points inward on every face.
    fn make_self_consistent_bound(&mut self, jet: &mut [GeometricBound]) -> Result<()>;

    /// As [`make_self_consistent_bound`](Self::make_self_consistent_bound),
    /// then the same for every Jacobian and Dyx column.
    fn make_self_consistent_bound_c1(
        &mut self,
        jet: &mut [GeometricBound],
        jac: &mut [TaylorJet],
        dyx: &mut [TaylorJet],
    ) -> Result<()>;

    /// Tightens the dissipative modes and the tail of `x` after a step of
    /// length `h`, using the enclosure `enclosure` of the whole step.
    fn update_tail(
        &mut self,
        x: &mut GeometricBound,
        enclosure: &[GeometricBound],
        h: Interval,
    ) -> Result<()>;

    fn update_variational_tails(
        &mut self,
        dyx_id: &mut [GeometricBound],
        dyx: &mut [GeometricBound],
        jac_enclosure: &[TaylorJet],
        dyx_enclosure: &[TaylorJet],
        h: Interval,
    ) -> Result<()>;

    /// `(m+1) x (m+1)` bounds: the explicit block `Dxx` with logarithmic
    /// norms on the diagonal, `Dxy` and `Dyx` norms in the last column and
    /// row, and the logarithmic norm of `Dyy` in the corner.
    fn block_norms(&mut self, x: &GeometricBound, m: usize) -> IMatrix;
}

/// A non-rigorous finite-dimensional flow, used for reference solutions.
pub trait DynamicalSystem {
    fn dimension(&self) -> usize;

    /// Writes `dx/dt` at `x` into `out`.
    fn apply(&self, x: &[f64], out: &mut [f64]);
}

/// A one-step method for [`DynamicalSystem`].
pub trait Steppable {
    fn step(&mut self, system: &impl DynamicalSystem, state: &mut [f64], dt: f64);
}
