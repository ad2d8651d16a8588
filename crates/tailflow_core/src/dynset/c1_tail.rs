use super::{C0DoubletonSetGeometricTail, EnclosureSet, MatrixDoubleton, ReorganizationSettings};
use crate::error::Result;
use crate::geometric_bound::GeometricBound;
use crate::interval::Interval;
use crate::linalg::{self, IMatrix, IVector};
use crate::solver::PdeSolver;
use crate::traits::DissipativeVectorField;
use tracing::{debug, info};

/// Steps between two reports of the derivative norms.
const NORM_REPORT_INTERVAL: usize = 500;

/// C0 set together with the derivative of the flow.
///
/// With `x` the leading `m` modes and `y` the rest of the state, the
/// derivative is kept in blocks: `Dxx` as a [`MatrixDoubleton`], `Dyx` as
/// `m` geometric columns and `Dxy`, `Dyy` only through their norms in
/// `dy` (last entry `Dyy`).
#[derive(Debug, Clone)]
pub struct C1DoubletonSetGeometricTail {
    base: C0DoubletonSetGeometricTail,
    matrix: MatrixDoubleton,
    current_matrix: IMatrix,
    dyx: Vec<GeometricBound>,
    dy: IVector,
    enc_dy: IVector,
    dxx: Interval,
    dyx_norm: Interval,
    enc_dyx: Interval,
    enc_dxx: IMatrix,
    steps: usize,
}

/// Bound of the `l2` norm of the rows `m..` of the columns, tails included.
fn vyx_norm<'a>(columns: impl IntoIterator<Item = &'a GeometricBound>, m: usize) -> Interval {
    let columns: Vec<&GeometricBound> = columns.into_iter().collect();
    let Some(dim) = columns.first().map(|c| c.dimension()) else {
        return Interval::ZERO;
    };
    let mut norm = 0.0f64;
    for k in m..dim {
        let sum: Interval = columns.iter().map(|c| c[k].sqr()).sum();
        norm = norm.max(sum.sqrt().sup());
    }
    let tail: Interval = columns
        .iter()
        .map(|c| {
            let decay = Interval::point(c.decay()).powi(dim as i32 + 1);
            (Interval::point(c.constant()) / decay).sqr()
        })
        .sum();
    norm = norm.max(tail.sqrt().sup());
    Interval::new(0.0, norm)
}

impl C1DoubletonSetGeometricTail {
    /// The set `x` with the leading `m` modes as a doubleton and the
    /// identity as its derivative.
    pub fn new(x: GeometricBound, m: usize) -> Result<Self> {
        let base = C0DoubletonSetGeometricTail::new(x, m)?;
        Self::from_base(base)
    }

    fn from_base(base: C0DoubletonSetGeometricTail) -> Result<Self> {
        let m = base.leading_modes();
        let series = base.current_series();
        let dyx = (0..m)
            .map(|_| GeometricBound::with_tail(series.dimension(), 0.0, series.decay()))
            .collect::<Result<Vec<_>>>()?;
        let mut dy = linalg::zeros(m + 1);
        dy[m] = Interval::ONE;
        Ok(Self {
            base,
            matrix: MatrixDoubleton::identity(m),
            current_matrix: linalg::identity(m),
            dyx,
            enc_dy: dy.clone(),
            dy,
            dxx: Interval::ONE,
            dyx_norm: Interval::ZERO,
            enc_dyx: Interval::ZERO,
            enc_dxx: linalg::identity(m),
            steps: 0,
        })
    }

    pub fn with_reorganization(mut self, settings: ReorganizationSettings) -> Self {
        self.base = self.base.with_reorganization(settings);
        self
    }

    pub fn c0(&self) -> &C0DoubletonSetGeometricTail {
        &self.base
    }

    pub fn matrix_doubleton(&self) -> &MatrixDoubleton {
        &self.matrix
    }

    /// Enclosure of `Dxx` at the current time.
    pub fn current_matrix(&self) -> &IMatrix {
        &self.current_matrix
    }

    pub fn dyx(&self) -> &[GeometricBound] {
        &self.dyx
    }

    /// Norms of the `Dxy` columns and, last, of `Dyy`.
    pub fn dy(&self) -> &IVector {
        &self.dy
    }

    pub fn enc_dy(&self) -> &IVector {
        &self.enc_dy
    }

    pub fn dxx_norm(&self) -> Interval {
        self.dxx
    }

    pub fn dyx_norm(&self) -> Interval {
        self.dyx_norm
    }

    pub fn enc_dyx_norm(&self) -> Interval {
        self.enc_dyx
    }

    /// Enclosure of `Dxx` over the last step.
    pub fn enc_dxx(&self) -> &IMatrix {
        &self.enc_dxx
    }
}

impl EnclosureSet for C1DoubletonSetGeometricTail {
    fn move_into<V: DissipativeVectorField>(
        &self,
        solver: &mut PdeSolver<V>,
        result: &mut Self,
    ) -> Result<()> {
        let time = self.current_time();
        let (x0, series) = self.base.init_move()?;
        let m = x0.len();
        let dim = series.dimension();
        solver.set_init_matrix(self.current_matrix.clone());
        let step = solver
            .enclose_c1_map(&x0, &series, &self.dy, &self.dyx)
            .map_err(|e| e.at_time(time))?;
        self.base
            .finish_move(&x0, &step.c0, solver.step(), &mut result.base)?;

        let jac = &step.c0.jac_phi + &step.jac_rem;
        let old = &self.current_matrix;
        let mut current_matrix = &jac * old;
        result.matrix = self
            .matrix
            .image(&jac, &mut current_matrix)
            .map_err(|e| e.at_time(time))?;
        let factor = self.base.reorganization().factor;
        if result.matrix.reorganize_if_needed(factor) {
            debug!(time = %result.current_time(), "reorganized matrix doubleton");
        }

        // Dyx started from (0, Dyx) leaks into the leading block; the part
        // started from (Id, 0) is composed with the old Dxx.
        let mut dyx = step.dyx;
        for (i, column) in dyx.iter_mut().enumerate() {
            let leak = column.projection(m);
            result.matrix.add_to_column(i, &leak);
            let mut target = current_matrix.column_mut(i);
            target += &leak;

            for j in m..dim {
                let mut value = column[j];
                for (k, id_column) in step.dyx_id.iter().enumerate() {
                    value += id_column[j] * old[(k, i)];
                }
                column[j] = value;
            }
            let mut constant = Interval::point(column.constant());
            let mut decay = column.decay();
            for (k, id_column) in step.dyx_id.iter().enumerate() {
                constant += Interval::point(id_column.constant()) * old[(k, i)].mag();
                decay = decay.min(id_column.decay());
            }
            for c in 0..m {
                column[c] = Interval::ZERO;
            }
            column.set_decay(decay)?;
            column.set_constant(constant.sup())?;
        }

        let curve = solver.curve();
        let enc_dyx = vyx_norm(curve.matrix_remainder_coefficients().iter().map(|jet| &jet[0]), m)
            * self.dxx
            + vyx_norm(curve.dyx_remainder_coefficients().iter().map(|jet| &jet[0]), m);
        let mut enc_dxx = &step.jac_enc * old;
        for (j, jet) in curve.dyx_remainder_coefficients().iter().enumerate() {
            for i in 0..m {
                enc_dxx[(i, j)] += jet[0][i];
            }
        }

        result.dxx = linalg::max_norm(&current_matrix);
        result.dyx_norm = vyx_norm(dyx.iter(), m);
        result.enc_dyx = enc_dyx;
        result.current_matrix = current_matrix;
        result.dyx = dyx;
        result.dy = step.out_dy;
        result.enc_dy = step.enc_dy;
        result.enc_dxx = enc_dxx;
        result.steps = self.steps + 1;
        if result.steps % NORM_REPORT_INTERVAL == 0 {
            info!(
                steps = result.steps,
                time = %result.current_time(),
                dxx = %result.dxx,
                dyx = %result.dyx_norm,
                dyy = %result.dy[m],
                "derivative norms"
            );
        }
        Ok(())
    }

    fn current_series(&self) -> &GeometricBound {
        self.base.current_series()
    }

    fn last_enclosure(&self) -> &GeometricBound {
        self.base.last_enclosure()
    }

    fn current_time(&self) -> Interval {
        self.base.current_time()
    }

    fn current_set(&self) -> &IVector {
        self.base.current_set()
    }
}
