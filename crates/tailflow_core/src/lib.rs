/// The `tailflow_core` crate computes rigorous enclosures of dissipative PDE
/// trajectories in a spectral basis.
///
/// Key components:
/// - **GeometricBound**: finitely many interval coefficients plus a tail `|a_k| <= C q^-k`.
/// - **PolyLogBound**: the same layout with a tail `|a_k| <= C q^-k k^-d`.
/// - **Vector fields**: `DissipativeVectorField` and the Kuramoto-Sivashinsky instance.
/// - **Solver**: `PdeSolver`, a Taylor integrator with a-priori enclosures and step control.
/// - **Sets**: C0 and C1 doubleton sets that move along the flow.
/// - **Orbits**: batch drivers and a floating point Galerkin reference.
pub mod curve;
pub mod dynset;
pub mod error;
pub mod geometric_bound;
pub mod interval;
pub mod jet;
pub mod kuramoto_sivashinsky;
pub mod linalg;
pub mod orbit;
pub mod poly_log_bound;
pub mod reference;
pub mod solver;
pub mod solvers;
pub mod step_control;
pub mod traits;
