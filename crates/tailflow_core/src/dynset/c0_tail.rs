use super::{Doubleton, EnclosureSet, ReorganizationSettings};
use crate::error::{EnclosureStage, PdeError, Result};
use crate::geometric_bound::GeometricBound;
use crate::interval::Interval;
use crate::linalg::{self, IMatrix, IVector};
use crate::solver::{C0Step, PdeSolver};
use crate::traits::DissipativeVectorField;
use tracing::debug;

/// Doubleton on the leading `m` modes plus a geometric bound on the rest.
#[derive(Debug, Clone)]
pub struct C0DoubletonSetGeometricTail {
    doubleton: Doubleton,
    series: GeometricBound,
    last_enclosure: GeometricBound,
    time: Interval,
    reorganization: ReorganizationSettings,
}

fn check_leading(x: &GeometricBound, m: usize) -> Result<()> {
    if m == 0 || m > x.dimension() {
        return Err(PdeError::DimensionMismatch {
            context: "leading modes of the doubleton",
            expected: x.dimension(),
            actual: m,
        });
    }
    Ok(())
}

impl C0DoubletonSetGeometricTail {
    /// The set `x`, with its first `m` modes as a doubleton.
    pub fn new(x: GeometricBound, m: usize) -> Result<Self> {
        check_leading(&x, m)?;
        let doubleton = Doubleton::new(&x.projection(m));
        Ok(Self::from_doubleton(x, doubleton))
    }

    /// The set `x` whose leading modes are given as `center + C r0 + B r`.
    /// Those modes of `x` are replaced by the box of the doubleton.
    pub fn from_parts(
        x: GeometricBound,
        center: IVector,
        c: IMatrix,
        r0: IVector,
        b: IMatrix,
        r: IVector,
    ) -> Result<Self> {
        check_leading(&x, center.len())?;
        let doubleton = Doubleton::from_parts(center, c, r0, b, r)?;
        Ok(Self::from_doubleton(x, doubleton))
    }

    fn from_doubleton(mut series: GeometricBound, doubleton: Doubleton) -> Self {
        for (i, value) in doubleton.current_set().iter().enumerate() {
            series[i] = *value;
        }
        Self {
            last_enclosure: series.clone(),
            series,
            doubleton,
            time: Interval::ZERO,
            reorganization: ReorganizationSettings::default(),
        }
    }

    pub fn with_reorganization(mut self, settings: ReorganizationSettings) -> Self {
        self.reorganization = settings;
        self
    }

    pub fn reorganization(&self) -> ReorganizationSettings {
        self.reorganization
    }

    pub fn doubleton(&self) -> &Doubleton {
        &self.doubleton
    }

    /// Number of modes in the doubleton.
    pub fn leading_modes(&self) -> usize {
        self.doubleton.dimension()
    }

    /// Representative point of the next step and the series to move.
    pub(super) fn init_move(&self) -> Result<(IVector, GeometricBound)> {
        let set = self.doubleton.current_set();
        let center = self.doubleton.center();
        let x0 = if linalg::is_subset(center, set) {
            center.clone()
        } else {
            linalg::split_vector(set).0
        };
        let mut series = self.series.clone();
        for (i, value) in set.iter().enumerate() {
            series[i] = value.intersection(series[i]).ok_or_else(|| {
                PdeError::inconsistent(EnclosureStage::InitialSet, i + 1).at_time(self.time)
            })?;
        }
        Ok((x0, series))
    }

    /// Applies a step computed from [`init_move`](Self::init_move) and
    /// writes the moved set into `result`.
    pub(super) fn finish_move(
        &self,
        x0: &IVector,
        step: &C0Step,
        h: f64,
        result: &mut Self,
    ) -> Result<()> {
        result.doubleton = self
            .doubleton
            .affine_image(x0, &step.phi, &step.rem, &step.jac_phi)
            .map_err(|e| e.at_time(self.time))?;
        result.time = self.time + Interval::point(h);
        result.reorganization = self.reorganization;
        if result.doubleton.reorganize_if_needed(self.reorganization.factor) {
            debug!(time = %result.time, "reorganized doubleton");
        }
        result.finalize_move(step)
    }

    fn finalize_move(&mut self, step: &C0Step) -> Result<()> {
        let time = self.time;
        self.series = step.series.clone();
        let set = self.doubleton.current_set_mut();
        for i in 0..set.len() {
            set[i] = self.series[i].intersection(set[i]).ok_or_else(|| {
                PdeError::inconsistent(EnclosureStage::FinalizeMove, i + 1).at_time(time)
            })?;
            self.series[i] = set[i];
        }
        self.last_enclosure = step.enclosure.clone();
        Ok(())
    }
}

impl EnclosureSet for C0DoubletonSetGeometricTail {
    fn move_into<V: DissipativeVectorField>(
        &self,
        solver: &mut PdeSolver<V>,
        result: &mut Self,
    ) -> Result<()> {
        let (x0, series) = self.init_move()?;
        let step = solver
            .enclose_c0_map(&x0, &series)
            .map_err(|e| e.at_time(self.time))?;
        self.finish_move(&x0, &step, solver.step(), result)
    }

    fn current_series(&self) -> &GeometricBound {
        &self.series
    }

    fn last_enclosure(&self) -> &GeometricBound {
        &self.last_enclosure
    }

    fn current_time(&self) -> Interval {
        self.time
    }

    fn current_set(&self) -> &IVector {
        self.doubleton.current_set()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kuramoto_sivashinsky::KsSineVectorField;
    use crate::step_control::SolverSettings;

    fn initial(dim: usize) -> GeometricBound {
        let mut x = GeometricBound::with_tail(dim, 1e-6, 2.0).expect("valid tail");
        x[0] = Interval::new(0.099, 0.101);
        x[1] = Interval::point(0.05);
        x[2] = Interval::point(0.01);
        x
    }

    fn solver(dim: usize) -> PdeSolver<KsSineVectorField> {
        let field = KsSineVectorField::new(0.1, dim, 4).expect("valid field");
        PdeSolver::new(field, SolverSettings::with_fixed_step(6, 1e-5)).expect("valid settings")
    }

    #[test]
    fn construction_checks_the_leading_modes() {
        let err = C0DoubletonSetGeometricTail::new(initial(8), 9).expect_err("too many modes");
        assert!(err.to_string().contains("leading modes of the doubleton"));
        let set = C0DoubletonSetGeometricTail::new(initial(8), 4).expect("valid set");
        assert_eq!(set.leading_modes(), 4);
        assert_eq!(set.current_time(), Interval::ZERO);
        assert_eq!(set.current_series(), set.last_enclosure());
    }

    #[test]
    fn move_advances_time_and_keeps_series_inside_the_box() {
        let mut solver = solver(8);
        let mut set = C0DoubletonSetGeometricTail::new(initial(8), 8).expect("valid set");
        for _ in 0..3 {
            set.move_by(&mut solver).expect("move");
        }
        assert!(set.current_time().contains(3e-5));
        for i in 0..8 {
            assert_eq!(set.current_series()[i], set.current_set()[i]);
            assert!(set.current_set()[i].subset(set.last_enclosure()[i]) || i >= 3);
        }
        assert!(set.current_series().constant() >= 0.0);
    }

    #[test]
    fn set_from_parts_reports_inconsistent_series() {
        let x = initial(8);
        let center = IVector::from_element(2, Interval::point(5.0));
        let set = C0DoubletonSetGeometricTail::from_parts(
            x,
            center,
            linalg::identity(2),
            linalg::zeros(2),
            linalg::identity(2),
            linalg::zeros(2),
        )
        .expect("valid parts");
        // the doubleton box replaced the leading modes, so the first move is consistent
        assert_eq!(set.current_series()[0], Interval::point(5.0));
        let mut broken = set.clone();
        broken.series[0] = Interval::point(0.0);
        let err = broken.init_move().expect_err("disjoint");
        assert!(err.to_string().contains("initial set at mode 1"));
    }

    #[test]
    fn move_into_leaves_the_source_untouched() {
        let mut solver = solver(8);
        let set = C0DoubletonSetGeometricTail::new(initial(8), 8).expect("valid set");
        let mut result = set.clone();
        set.move_into(&mut solver, &mut result).expect("move");
        assert_eq!(set.current_time(), Interval::ZERO);
        assert!(result.current_time().contains(1e-5));
    }
}
