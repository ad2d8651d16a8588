//! A-priori enclosure of one step.
//!
//! On the non-dissipative modes the enclosure is the Taylor polynomial over
//! `[0, h]` plus a predicted remainder; it is accepted once the remainder
//! computed from the enclosure itself lies in the interior of the
//! prediction. The dissipative modes and the tail are isolated by the
//! self-consistent bound of the vector field.

use super::PdeSolver;
use crate::error::{PdeError, Result};
use crate::geometric_bound::GeometricBound;
use crate::interval::Interval;
use crate::jet::sum_taylor_series;
use crate::linalg::IVector;
use crate::traits::DissipativeVectorField;
use tracing::debug;

/// Safety factor applied when the step is cut to the contraction ratio.
const CONTRACTION_MARGIN: f64 = 0.999;

/// Time range of the current attempt.
#[derive(Debug, Clone, Copy)]
struct AttemptRange {
    /// Remainder guess used while no order `p + 1` coefficient exists.
    tolerance: Interval,
    range: Interval,
    /// `range^(p+1)`.
    power: Interval,
}

impl AttemptRange {
    fn new(tolerance: Interval, step: f64, order: usize) -> Self {
        let range = Interval::new(0.0, step);
        Self {
            tolerance,
            range,
            power: range.powi(order as i32 + 1),
        }
    }
}

fn predict_enclosure(
    x: &[GeometricBound],
    enc: &mut [GeometricBound],
    rem: &mut IVector,
    d: usize,
    order: usize,
    attempt: AttemptRange,
) -> Result<()> {
    let coefficients = enc[0].explicit_mut().as_mut_slice();
    sum_taylor_series(x, attempt.range, order, d, coefficients);
    for n in 0..d {
        let last = enc[order + 1][n];
        rem[n] = if last == Interval::ZERO {
            attempt.tolerance
        } else {
            Interval::new(-2.0, 2.0) * attempt.power * last
        };
        enc[0][n] += rem[n];
    }
    for n in d..enc[0].dimension() {
        enc[0][n] = x[0][n];
    }
    enc[0].set_constant(x[0].constant())?;
    enc[0].set_decay(x[0].decay())
}

/// Strict interior inclusion of the computed remainder `t` in the
/// prediction `rem` on the first `d` modes. On failure `beta` is lowered
/// to the ratio by which the step would have to shrink.
fn check_remainder_inclusion(
    t: impl Iterator<Item = Interval>,
    rem: &IVector,
    d: usize,
    order: usize,
    beta: &mut f64,
) -> bool {
    let mut success = true;
    for (n, value) in t.take(d).enumerate() {
        if value.subset_interior(rem[n]) {
            continue;
        }
        success = false;
        let magnitude = value.mag();
        if magnitude > 0.0 {
            let c = (rem[n].mag() / magnitude).powf(1.0 / (order + 1) as f64);
            *beta = beta.min(c);
        }
    }
    success
}

impl<V: DissipativeVectorField> PdeSolver<V> {
    fn scale_remainders(&mut self, range_power: Interval, with_columns: bool) {
        let p1 = self.order() + 1;
        self.rem = self.curve.remainder[p1].explicit() * range_power;
        if with_columns {
            for i in 0..self.columns {
                let jac = self.curve.jac_remainder[i][p1].explicit() * range_power;
                self.jac_rem.set_column(i, &jac);
                let dyx = self.curve.dyx_remainder[i][p1].explicit() * range_power;
                self.dyx_rem.set_column(i, &dyx);
            }
        }
    }

    fn check_inclusion(&self, with_columns: bool, beta: &mut f64) -> bool {
        let d = self.vector_field.first_dissipative_index() - 1;
        let order = self.order();
        let mut success = check_remainder_inclusion(
            self.rem.iter().copied(),
            &self.predicted_rem,
            d,
            order,
            beta,
        );
        if with_columns {
            for i in 0..self.columns {
                let jac = self.jac_rem.column(i);
                success = check_remainder_inclusion(
                    jac.iter().copied(),
                    &self.predicted_jac_rem[i],
                    d,
                    order,
                    beta,
                ) && success;
                let dyx = self.dyx_rem.column(i);
                success = check_remainder_inclusion(
                    dyx.iter().copied(),
                    &self.predicted_dyx_rem[i],
                    d,
                    order,
                    beta,
                ) && success;
            }
        }
        success
    }

    fn predict(&mut self, with_columns: bool, attempt: AttemptRange) -> Result<()> {
        let d = self.vector_field.first_dissipative_index() - 1;
        let order = self.order();
        predict_enclosure(
            &self.curve.coefficients,
            &mut self.curve.remainder,
            &mut self.predicted_rem,
            d,
            order,
            attempt,
        )?;
        if with_columns {
            for i in 0..self.columns {
                predict_enclosure(
                    &self.curve.jac[i],
                    &mut self.curve.jac_remainder[i],
                    &mut self.predicted_jac_rem[i],
                    d,
                    order,
                    attempt,
                )?;
                predict_enclosure(
                    &self.curve.dyx[i],
                    &mut self.curve.dyx_remainder[i],
                    &mut self.predicted_dyx_rem[i],
                    d,
                    order,
                    attempt,
                )?;
            }
        }
        Ok(())
    }

    fn refine_and_expand(&mut self, with_columns: bool) -> Result<()> {
        let p1 = self.order() + 1;
        if with_columns {
            self.vector_field.make_self_consistent_bound_c1(
                &mut self.curve.remainder,
                &mut self.curve.jac_remainder[..self.columns],
                &mut self.curve.dyx_remainder[..self.columns],
            )?;
            self.vector_field.compute_jet_with_columns(
                &mut self.curve.remainder,
                &mut self.curve.jac_remainder[..self.columns],
                p1,
            )?;
            for i in 0..self.columns {
                self.vector_field.compute_variational_coefficients(
                    &self.curve.remainder,
                    &mut self.curve.dyx_remainder[i],
                    p1,
                )?;
            }
            Ok(())
        } else {
            self.vector_field
                .make_self_consistent_bound(&mut self.curve.remainder)?;
            self.vector_field
                .compute_taylor_coefficients(&mut self.curve.remainder, p1)
        }
    }

    /// Finds an enclosure of the step, shrinking `self.step` when the step
    /// control allows it.
    pub(super) fn high_order_enclosure(&mut self, with_columns: bool) -> Result<()> {
        self.step = self.step.min(self.settings.max_step);
        let order = self.order();
        let adaptive = self.settings.step_control.is_adaptive();
        let tolerance = Interval::symmetric(self.settings.absolute_tolerance);
        let mut current = AttemptRange::new(tolerance, self.step, order);

        let attempts = 5 * self.vector_field.first_dissipative_index();
        for attempt in 0..attempts {
            self.predict(with_columns, current)?;
            self.refine_and_expand(with_columns)?;
            self.scale_remainders(current.power, with_columns);

            let mut beta = 1.0;
            if self.check_inclusion(with_columns, &mut beta) {
                return Ok(());
            }
            if adaptive && beta > 0.0 {
                if beta > 0.9 {
                    // the enclosure stays valid on the shorter interval
                    self.step = (Interval::point(self.step) * (beta * CONTRACTION_MARGIN)).inf();
                    current = AttemptRange::new(tolerance, self.step, order);
                    self.scale_remainders(current.power, with_columns);
                    let mut unused = 1.0;
                    if self.check_inclusion(with_columns, &mut unused) {
                        debug!(attempt, step = self.step, beta, "step cut to the contraction ratio");
                        return Ok(());
                    }
                } else {
                    self.step *= 0.9;
                    current = AttemptRange::new(tolerance, self.step, order);
                    debug!(attempt, step = self.step, beta, "shrinking step");
                }
            }
        }
        Err(PdeError::EnclosureNotFound {
            attempts,
            step: self.step,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jet::new_jet;

    #[test]
    fn prediction_uses_tolerance_until_a_remainder_exists() {
        let mut x = new_jet(3, 3);
        x[0][0] = Interval::ONE;
        x[1][0] = Interval::point(2.0);
        x[0][2] = Interval::point(0.5);
        let mut enc = new_jet(3, 3);
        let mut rem = IVector::from_element(3, Interval::ZERO);
        let attempt = AttemptRange::new(Interval::symmetric(1e-9), 0.1, 1);
        predict_enclosure(&x, &mut enc, &mut rem, 2, 1, attempt).expect("valid envelope");
        assert_eq!(rem[0], Interval::symmetric(1e-9));
        assert!(enc[0][0].contains(1.2) && enc[0][0].contains(1.0));
        assert_eq!(enc[0][2], Interval::point(0.5));

        enc[2][0] = Interval::point(3.0);
        predict_enclosure(&x, &mut enc, &mut rem, 2, 1, attempt).expect("valid envelope");
        assert!(rem[0].contains(0.06) && rem[0].contains(-0.06));
    }

    #[test]
    fn inclusion_check_reports_contraction_ratio() {
        let rem = IVector::from_element(1, Interval::symmetric(1.0));
        let mut beta = 1.0;
        assert!(check_remainder_inclusion(
            [Interval::new(0.0, 0.5)].into_iter(),
            &rem,
            1,
            1,
            &mut beta
        ));
        assert_eq!(beta, 1.0);
        assert!(!check_remainder_inclusion(
            [Interval::new(0.0, 4.0)].into_iter(),
            &rem,
            1,
            1,
            &mut beta
        ));
        assert!((beta - 0.5).abs() < 1e-12);
    }
}
