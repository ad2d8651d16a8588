//! Validated Taylor integrator for dissipative vector fields.
//!
//! One step of [`PdeSolver`] proceeds as follows:
//! 1. the center trajectory, the trajectory of the whole set and (C1) the
//!    variational columns are expanded to the order of the method,
//! 2. a step is chosen and an a-priori enclosure of the step is predicted,
//!    made self-consistent on the dissipative modes and verified on the
//!    remaining ones, shrinking the step when allowed,
//! 3. the series are summed at the step and the remainder added,
//! 4. the tail is advanced through the linear differential inequality of
//!    the vector field.

mod enclosure;

use crate::curve::PdeCurve;
use crate::error::{EnclosureStage, PdeError, Result};
use crate::geometric_bound::GeometricBound;
use crate::interval::Interval;
use crate::linalg::{self, IMatrix, IVector};
use crate::step_control::SolverSettings;
use crate::traits::DissipativeVectorField;
use tracing::trace;

/// Output of one C0 step.
#[derive(Debug, Clone)]
pub struct C0Step {
    /// Enclosure of the image of the whole set, tail included.
    pub series: GeometricBound,
    /// Image of the representative point on the leading modes.
    pub phi: IVector,
    /// Local error of the method on the leading modes.
    pub rem: IVector,
    /// Enclosure of all trajectories over the step.
    pub enclosure: GeometricBound,
    /// Derivative of the method on the leading block.
    pub jac_phi: IMatrix,
}

/// Output of one C1 step.
#[derive(Debug, Clone)]
pub struct C1Step {
    pub c0: C0Step,
    pub jac_rem: IMatrix,
    /// Enclosure of the leading block of the derivative over the step.
    pub jac_enc: IMatrix,
    /// Columns of the variational solution started from `(Id, 0)`.
    pub dyx_id: Vec<GeometricBound>,
    /// Columns of the variational solution started from `(0, Dyx)`.
    pub dyx: Vec<GeometricBound>,
    /// Norms of the `Dxy` and `Dyy` blocks after the step.
    pub out_dy: IVector,
    /// Norms of the `Dxy` and `Dyy` blocks over the step.
    pub enc_dy: IVector,
}

pub struct PdeSolver<V: DissipativeVectorField> {
    vector_field: V,
    settings: SolverSettings,
    curve: PdeCurve,
    step: f64,
    columns: usize,
    delta_x: IVector,
    rem: IVector,
    jac_rem: IMatrix,
    dyx_rem: IMatrix,
    predicted_rem: IVector,
    predicted_jac_rem: Vec<IVector>,
    predicted_dyx_rem: Vec<IVector>,
}

impl<V: DissipativeVectorField> PdeSolver<V> {
    pub fn new(vector_field: V, settings: SolverSettings) -> Result<Self> {
        settings.validate()?;
        let dim = vector_field.dimension();
        Ok(Self {
            curve: PdeCurve::new(dim, settings.order),
            vector_field,
            settings,
            step: 0.0,
            columns: 0,
            delta_x: linalg::zeros(0),
            rem: linalg::zeros(dim),
            jac_rem: IMatrix::zeros(dim, 0),
            dyx_rem: IMatrix::zeros(dim, 0),
            predicted_rem: linalg::zeros(dim),
            predicted_jac_rem: Vec::new(),
            predicted_dyx_rem: Vec::new(),
        })
    }

    pub fn vector_field(&self) -> &V {
        &self.vector_field
    }

    pub fn settings(&self) -> &SolverSettings {
        &self.settings
    }

    pub fn order(&self) -> usize {
        self.settings.order
    }

    pub fn set_order(&mut self, order: usize) -> Result<()> {
        let mut settings = self.settings;
        settings.order = order;
        settings.validate()?;
        self.settings = settings;
        self.curve.set_order(order);
        Ok(())
    }

    /// Switches to fixed steps of length `step`.
    pub fn set_step(&mut self, step: f64) -> Result<()> {
        let mut settings = self.settings;
        settings.step_control = crate::step_control::StepControl::Fixed { step };
        settings.validate()?;
        self.settings = settings;
        Ok(())
    }

    /// Length of the last step.
    pub fn step(&self) -> f64 {
        self.step
    }

    pub fn dimension(&self) -> usize {
        self.vector_field.dimension()
    }

    /// Taylor data of the last step, valid on `[0, step]`.
    pub fn curve(&self) -> &PdeCurve {
        &self.curve
    }

    pub(crate) fn set_init_matrix(&mut self, matrix: IMatrix) {
        self.curve.set_init_matrix(matrix);
    }

    fn step_interval(&self) -> Interval {
        Interval::point(self.step)
    }

    fn set_initial_condition(&mut self, x0: &IVector, x: &GeometricBound) -> Result<()> {
        let dim = self.dimension();
        if x.dimension() != dim {
            return Err(PdeError::DimensionMismatch {
                context: "initial condition of the solver",
                expected: dim,
                actual: x.dimension(),
            });
        }
        let m = x0.len();
        if m > dim {
            return Err(PdeError::DimensionMismatch {
                context: "representative point of the solver",
                expected: dim,
                actual: m,
            });
        }

        self.columns = m;
        self.curve.ensure_columns(m);
        self.delta_x = linalg::zeros(m);
        self.jac_rem = IMatrix::zeros(dim, m);
        self.dyx_rem = IMatrix::zeros(dim, m);
        self.predicted_jac_rem.resize(m, linalg::zeros(dim));
        self.predicted_dyx_rem.resize(m, linalg::zeros(dim));

        let mut center = x.clone();
        for i in 0..m {
            center[i] = x0[i];
            self.delta_x[i] = x[i] - x0[i];
        }
        self.curve.center[0] = center;
        self.curve.coefficients[0] = x.clone();
        for (j, column) in self.curve.jac.iter_mut().enumerate() {
            let mut initial = GeometricBound::with_tail(dim, 0.0, x.decay())?;
            initial[j] = Interval::ONE;
            column[0] = initial;
        }
        Ok(())
    }

    fn init_enclose_one_step(&mut self, x0: &IVector, x: &GeometricBound) -> Result<()> {
        self.set_initial_condition(x0, x)?;
        let order = self.order();
        self.vector_field
            .compute_taylor_coefficients(&mut self.curve.center, order)?;
        self.vector_field.compute_jet_with_columns(
            &mut self.curve.coefficients,
            &mut self.curve.jac,
            order,
        )?;
        self.step = self
            .settings
            .step_control
            .next_step(&self.curve.coefficients, order, &self.settings);
        Ok(())
    }

    /// Sums the series at the accepted step. Returns the image of the set,
    /// tail still untouched, and the leading-mode data of the step.
    fn sum_taylor_series_of_leading_modes(
        &mut self,
        x: &GeometricBound,
    ) -> Result<(GeometricBound, IVector, IVector, IMatrix, IMatrix)> {
        let m = self.columns;
        let h = self.step_interval();
        let mut phi = linalg::zeros(self.dimension());
        crate::jet::sum_taylor_series(
            &self.curve.center,
            h,
            self.order(),
            self.dimension(),
            phi.as_mut_slice(),
        );
        let jac_phi = self.curve.sum_matrix(&self.curve.jac, h);

        let mut y = x.clone();
        crate::jet::sum_taylor_series(
            &self.curve.coefficients,
            h,
            self.order(),
            self.dimension(),
            y.explicit_mut().as_mut_slice(),
        );
        *y.explicit_mut() += &self.rem;

        let mut o_phi = linalg::zeros(m);
        let mut o_rem = linalg::zeros(m);
        let mut o_jac = IMatrix::zeros(m, m);
        for i in 0..m {
            o_rem[i] = self.rem[i];
            o_phi[i] = phi[i];
            let mut t = o_phi[i] + o_rem[i];
            for j in 0..m {
                o_jac[(i, j)] = jac_phi[(i, j)];
                t += jac_phi[(i, j)] * self.delta_x[j];
            }
            y[i] = t
                .intersection(y[i])
                .ok_or_else(|| PdeError::inconsistent(EnclosureStage::SeriesSummation, i + 1))?;
        }
        Ok((y, o_phi, o_rem, o_jac, jac_phi))
    }

    /// Moves the set `x` with representative point `x0` (the leading
    /// `x0.len()` modes) by one step.
    pub fn enclose_c0_map(&mut self, x0: &IVector, x: &GeometricBound) -> Result<C0Step> {
        self.init_enclose_one_step(x0, x)?;
        self.high_order_enclosure(false)?;
        let (mut series, phi, rem, jac_phi, _) = self.sum_taylor_series_of_leading_modes(x)?;

        let h = self.step_interval();
        self.vector_field
            .update_tail(&mut series, &self.curve.remainder, h)?;
        self.curve.set_step(self.step);
        trace!(step = self.step, constant = series.constant(), "C0 step accepted");
        Ok(C0Step {
            series,
            phi,
            rem,
            enclosure: self.curve.remainder[0].clone(),
            jac_phi,
        })
    }

    /// C0 step plus the first variational equation. `in_dy` holds the
    /// norms of the `Dxy` blocks and, last, of the `Dyy` block; `dyx` the
    /// columns of the `Dyx` block of the incoming derivative.
    pub fn enclose_c1_map(
        &mut self,
        x0: &IVector,
        x: &GeometricBound,
        in_dy: &IVector,
        dyx: &[GeometricBound],
    ) -> Result<C1Step> {
        let m = x0.len();
        if in_dy.len() != m + 1 {
            return Err(PdeError::DimensionMismatch {
                context: "norms of the Dxy and Dyy blocks",
                expected: m + 1,
                actual: in_dy.len(),
            });
        }
        if dyx.len() != m {
            return Err(PdeError::DimensionMismatch {
                context: "columns of the Dyx block",
                expected: m,
                actual: dyx.len(),
            });
        }
        self.init_enclose_one_step(x0, x)?;

        let order = self.order();
        for (j, column) in dyx.iter().enumerate() {
            let mut initial = column.clone();
            for c in 1..=m {
                initial.set_coefficient(c, Interval::ZERO);
            }
            self.curve.dyx[j][0] = initial;
            self.vector_field.compute_variational_coefficients(
                &self.curve.coefficients,
                &mut self.curve.dyx[j],
                order,
            )?;
        }

        self.high_order_enclosure(true)?;
        let (mut series, phi, rem, jac_phi, jac_phi_full) =
            self.sum_taylor_series_of_leading_modes(x)?;

        let mut jac_rem = IMatrix::zeros(m, m);
        let mut jac_enc = IMatrix::zeros(m, m);
        for j in 0..m {
            for i in 0..m {
                jac_rem[(i, j)] = self.jac_rem[(i, j)];
                jac_enc[(i, j)] = self.curve.jac_remainder[j][0][i];
            }
        }

        let h = self.step_interval();
        let dim = self.dimension();
        let mut dyx_out = Vec::with_capacity(m);
        let mut dyx_id = Vec::with_capacity(m);
        for i in 0..m {
            let mut column = dyx[i].clone();
            crate::jet::sum_taylor_series(
                &self.curve.dyx[i],
                h,
                order,
                dim,
                column.explicit_mut().as_mut_slice(),
            );
            *column.explicit_mut() += self.dyx_rem.column(i);
            dyx_out.push(column);

            let mut id_column = GeometricBound::with_tail(dim, 0.0, x.decay())?;
            id_column.set_explicit(&(jac_phi_full.column(i) + self.jac_rem.column(i)))?;
            dyx_id.push(id_column);
        }

        self.vector_field
            .update_tail(&mut series, &self.curve.remainder, h)?;
        self.vector_field.update_variational_tails(
            &mut dyx_id,
            &mut dyx_out,
            &self.curve.jac_remainder,
            &self.curve.dyx_remainder,
            h,
        )?;

        let j = self
            .vector_field
            .block_norms(&self.curve.remainder[0], m);
        let enc_dy = linalg::matrix_exp(&(&j * (Interval::new(0.0, 1.0) * h))) * in_dy;
        let out_dy = linalg::matrix_exp(&(&j * h)) * in_dy;

        self.curve.set_step(self.step);
        trace!(step = self.step, constant = series.constant(), "C1 step accepted");
        Ok(C1Step {
            c0: C0Step {
                series,
                phi,
                rem,
                enclosure: self.curve.remainder[0].clone(),
                jac_phi,
            },
            jac_rem,
            jac_enc,
            dyx_id,
            dyx: dyx_out,
            out_dy,
            enc_dy,
        })
    }
}
