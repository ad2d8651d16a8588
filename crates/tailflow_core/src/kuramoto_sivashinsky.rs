//! One-dimensional Kuramoto-Sivashinsky equation
//! `u_t = -nu u_xxxx - u_xx + (u^2)_x` on odd 2pi-periodic functions.
//!
//! With `u(t, x) = -2 sum a_k(t) sin(kx)` the coefficients satisfy
//! `a_k' = lambda_k a_k + k N_k` where `lambda_k = k^2 (1 - nu k^2)` and
//! `N_k = 2 sum_{n>=1} a_n a_{n+k} - sum_{n=1}^{k-1} a_n a_{k-n}`.

mod block_norms;

use crate::error::{PdeError, Result, SelfConsistencyFailure};
use crate::geometric_bound::GeometricBound;
use crate::interval::Interval;
use crate::jet::{new_jet, Trajectory, Variation};
use crate::linalg::IMatrix;
use crate::traits::{CoefficientSource, DissipativeVectorField, TaylorJet};
use num_traits::Zero;
use serde::{Deserialize, Serialize};
use tracing::trace;

const MAX_SELF_CONSISTENCY_ITERATIONS: usize = 10_000;

/// Parameters of [`KsSineVectorField`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct KsParameters {
    pub nu: f64,
    /// Number of explicit modes.
    pub dimension: usize,
    /// First mode treated as dissipative; the smallest mode with a negative
    /// eigenvalue when absent.
    pub first_dissipative_index: Option<usize>,
}

impl Default for KsParameters {
    fn default() -> Self {
        Self {
            nu: 0.1,
            dimension: 16,
            first_dissipative_index: None,
        }
    }
}

#[derive(Debug)]
pub struct KsSineVectorField {
    nu: Interval,
    dimension: usize,
    first_dissipative: usize,
    lambda: Vec<Interval>,
    nonlinear_part: Vec<Interval>,
    jac_nonlinear_part: Vec<Vec<Interval>>,
    dyx_nonlinear_part: Vec<Vec<Interval>>,
}

fn lambda_of(nu: Interval, k: usize) -> Interval {
    let k2 = Interval::point((k * k) as f64);
    k2 * (Interval::ONE - nu * k2)
}

impl KsSineVectorField {
    pub fn new(nu: f64, dimension: usize, first_dissipative_index: usize) -> Result<Self> {
        if !(nu > 0.0) {
            return Err(PdeError::InvalidSettings(format!(
                "viscosity must be positive, got {nu}"
            )));
        }
        if dimension == 0 {
            return Err(PdeError::InvalidSettings(
                "at least one explicit mode is required".to_string(),
            ));
        }
        if first_dissipative_index == 0 || first_dissipative_index > dimension {
            return Err(PdeError::InvalidSettings(format!(
                "first dissipative index {first_dissipative_index} outside 1..={dimension}"
            )));
        }
        let mut field = Self {
            nu: Interval::point(nu),
            dimension,
            first_dissipative: first_dissipative_index,
            lambda: Vec::new(),
            nonlinear_part: vec![Interval::ZERO; dimension + 2],
            jac_nonlinear_part: Vec::new(),
            dyx_nonlinear_part: Vec::new(),
        };
        field.eigenvalue(dimension + 1);
        Ok(field)
    }

    pub fn from_parameters(parameters: &KsParameters) -> Result<Self> {
        let first = match parameters.first_dissipative_index {
            Some(index) => index,
            None => Self::smallest_dissipative_mode(parameters.nu, parameters.dimension)?,
        };
        Self::new(parameters.nu, parameters.dimension, first)
    }

    fn smallest_dissipative_mode(nu: f64, dimension: usize) -> Result<usize> {
        (1..=dimension)
            .find(|&k| lambda_of(Interval::point(nu), k).sup() < 0.0)
            .ok_or_else(|| {
                PdeError::InvalidSettings(format!(
                    "no explicit mode is dissipative for nu = {nu} and dimension {dimension}"
                ))
            })
    }

    pub fn nu(&self) -> Interval {
        self.nu
    }

    /// Changes the viscosity and rebuilds the eigenvalue table.
    pub fn set_parameter(&mut self, nu: f64) -> Result<()> {
        if !(nu > 0.0) {
            return Err(PdeError::InvalidSettings(format!(
                "viscosity must be positive, got {nu}"
            )));
        }
        self.nu = Interval::point(nu);
        self.lambda.clear();
        self.eigenvalue(self.dimension + 1);
        Ok(())
    }

    /// `lambda_k = k^2 (1 - nu k^2)`, cached and grown on demand.
    pub fn eigenvalue(&mut self, k: usize) -> Interval {
        while self.lambda.len() <= k {
            let next = self.lambda.len();
            self.lambda.push(lambda_of(self.nu, next));
        }
        self.lambda[k]
    }

    /// Nonlinear part of the last self-consistent enclosure, indexed by mode
    /// (`dimension + 1` holds the bound for the far tail).
    pub fn nonlinear_part(&self) -> &[Interval] {
        &self.nonlinear_part
    }

    fn ensure_columns(&mut self, columns: usize) {
        let len = self.dimension + 2;
        if self.jac_nonlinear_part.len() < columns {
            self.jac_nonlinear_part.resize(columns, vec![Interval::ZERO; len]);
        }
        if self.dyx_nonlinear_part.len() < columns {
            self.dyx_nonlinear_part.resize(columns, vec![Interval::ZERO; len]);
        }
    }

    fn tail_denominator(&self) -> Interval {
        let m1 = (self.dimension + 1) as f64;
        let m2 = Interval::point(m1 * m1);
        m2 * (self.nu - Interval::ONE / m2)
    }

    /// Orders `1..=order` of any coefficient source.
    fn taylor_recurrence<J: KsCoefficients>(&mut self, jet: &mut J, order: usize) -> Result<()> {
        let m = self.dimension;
        for i in 0..order {
            let di = jet.infinite_part_constant(m, i);
            let decay = Interval::point(jet.decay(i));
            let d = Interval::new(-2.0, 2.0) * di;
            let mut q = decay;
            for k in 1..=m {
                let lambda = self.eigenvalue(k);
                let c = lambda * jet.coefficient(i, k)
                    + (k as f64) * (jet.nonlinear(m, i, k) + d / q);
                jet.set_coefficient(i + 1, k, c / ((i + 1) as f64));
                q *= decay;
            }
            self.next_tail(jet, i, di)?;
        }
        Ok(())
    }

    /// Envelope of level `i + 1`. The decay shrinks by `delta = (2 + q) / 3`
    /// and the constant bounds `max_{k > N} k^4 delta^-k` times the linear
    /// and nonlinear contributions of level `i`.
    fn next_tail<J: KsCoefficients>(&self, jet: &mut J, i: usize, di: Interval) -> Result<()> {
        let m = self.dimension;
        let m1 = Interval::point((m + 1) as f64);
        let m2 = m1 * m1;
        let m3 = m2 * m1;
        let q = Interval::point(jet.decay(i));
        let d = jet.d1(m, i).max(jet.d2(m, i));
        let c = self.nu * Interval::point(jet.constant(i))
            + Interval::point(2.0) * di / m3
            + Interval::point(d) / m2;

        let delta = (Interval::point(2.0) + q) / 3.0;
        let l = delta.ln();
        let l_factor = if (m as f64) > (Interval::point(4.0) / l).sup() {
            m1.powi(4) / delta.powi((m + 1) as i32)
        } else {
            Interval::point(256.0) / (l * Interval::euler()).powi(4)
        };
        jet.set_decay(i + 1, (q / delta).inf())?;
        jet.set_constant(i + 1, (l_factor * c / ((i + 1) as f64)).sup())
    }

    fn self_consistent<J: KsCoefficients>(
        &mut self,
        jet: &mut J,
        part: &mut [Interval],
        decay: f64,
    ) -> Result<()> {
        let m = self.dimension;
        let m1 = m + 1;
        let denominator = self.tail_denominator();
        if denominator.inf() <= 0.0 {
            return Err(PdeError::SelfConsistency {
                reason: SelfConsistencyFailure::TailNotDissipative { mode: m1 },
            });
        }
        let q = Interval::point(decay);
        let two = Interval::new(-2.0, 2.0);

        for iteration in 0..MAX_SELF_CONSISTENCY_ITERATIONS {
            let mut di = two * jet.infinite_part_constant(m, 0);
            let mut found = true;
            for k in self.first_dissipative..=m {
                let coeff = jet.coefficient(0, k);
                let mut left = coeff.inf();
                let mut right = coeff.sup();
                let lambda = self.eigenvalue(k);
                let n = (k as f64) * (jet.nonlinear(m, 0, k) + di / q.powi(k as i32));
                part[k] = n;
                if !((right * lambda + n).sup() < 0.0) {
                    let factor = if right > 0.0 { -1.01 } else { -0.99 };
                    right = (factor * n.sup() / lambda).sup();
                    found = false;
                }
                if !((left * lambda + n).inf() > 0.0) {
                    let factor = if left < 0.0 { -1.01 } else { -0.99 };
                    left = (factor * n.inf() / lambda).inf();
                    found = false;
                }
                if left > right {
                    return Err(PdeError::SelfConsistency {
                        reason: SelfConsistencyFailure::InvertedRange { mode: k },
                    });
                }
                jet.set_coefficient(0, k, Interval::new(left, right));
            }

            di = two * jet.infinite_part_constant(m, 0);
            let d = Interval::symmetric(jet.d1(m, 0).max(jet.d2(m, 0)));
            part[m1] = di / (m1 as f64) + d;
            let required = (part[m1] / denominator).abs().sup();
            if jet.constant(0) < required {
                jet.set_constant(0, (Interval::point(1.01) * required).sup())?;
                found = false;
            }

            if found {
                for i in 1..self.first_dissipative {
                    part[i] = (i as f64) * (jet.nonlinear(m, 0, i) + di / q.powi(i as i32));
                }
                trace!(iterations = iteration + 1, "self-consistent bound found");
                return Ok(());
            }
        }
        Err(PdeError::SelfConsistency {
            reason: SelfConsistencyFailure::IterationLimit {
                iterations: MAX_SELF_CONSISTENCY_ITERATIONS,
            },
        })
    }

    fn tail_update(
        &mut self,
        x: &mut GeometricBound,
        part: &[Interval],
        enclosure: &GeometricBound,
        h: Interval,
    ) -> Result<()> {
        use crate::error::EnclosureStage::TailUpdate;

        let m = self.dimension;
        let e_constant = enclosure.constant();

        for k in 1..self.first_dissipative {
            let lambda = self.eigenvalue(k);
            let enc = enclosure.coefficient(k);
            let upper_ok = (lambda * enc.sup() + part[k]).sup() < 0.0;
            let lower_ok = (lambda * enc.inf() + part[k]).inf() > 0.0;
            if !upper_ok && !lower_ok {
                continue;
            }
            let e = (lambda * h).exp();
            let equilibrium = -part[k] / lambda;
            let current = x.coefficient(k);
            let updated = if upper_ok && lower_ok {
                let u = (enc - equilibrium) * e + equilibrium;
                current.intersection(u)
            } else if upper_ok {
                // only the upper endpoint is certified
                let top = ((Interval::point(enc.sup()) - equilibrium) * e + equilibrium).sup();
                (top >= current.inf())
                    .then(|| Interval::new(current.inf(), top.min(current.sup())))
            } else {
                let bottom = ((Interval::point(enc.inf()) - equilibrium) * e + equilibrium).inf();
                (bottom <= current.sup())
                    .then(|| Interval::new(bottom.max(current.inf()), current.sup()))
            };
            let value = updated.ok_or_else(|| PdeError::inconsistent(TailUpdate, k))?;
            x.set_coefficient(k, value);
        }

        for k in self.first_dissipative..=m {
            let lambda = self.eigenvalue(k);
            let e = (lambda * h).exp();
            let equilibrium = -part[k] / lambda;
            let u = (enclosure.coefficient(k) - equilibrium) * e + equilibrium;
            let value = x
                .coefficient(k)
                .intersection(u)
                .ok_or_else(|| PdeError::inconsistent(TailUpdate, k))?;
            x.set_coefficient(k, value);
        }

        let m1 = m + 1;
        let u = (part[m1] / self.tail_denominator()).abs().sup();
        let lambda = self.eigenvalue(m1);
        let far = (Interval::point(e_constant) - Interval::point(u)) * (h * lambda).exp()
            + Interval::point(u);
        x.set_constant(far.sup().max(0.0))
    }

    fn self_consistent_columns(
        &mut self,
        base: &[GeometricBound],
        columns: &mut [TaylorJet],
        parts: &mut [Vec<Interval>],
    ) -> Result<()> {
        for (column, part) in columns.iter_mut().zip(parts.iter_mut()) {
            let decay = column[0].decay();
            self.self_consistent(&mut Variation::new(base, column), part, decay)?;
        }
        Ok(())
    }

    fn tail_update_columns(
        &mut self,
        columns: &mut [GeometricBound],
        parts: &[Vec<Interval>],
        enclosures: &[TaylorJet],
        h: Interval,
    ) -> Result<()> {
        for ((column, part), enclosure) in columns.iter_mut().zip(parts).zip(enclosures) {
            self.tail_update(column, part, &enclosure[0], h)?;
        }
        Ok(())
    }
}

/// Nonlinear sums of the KS equation for one kind of jet.
trait KsCoefficients: CoefficientSource {
    /// `N_k` at time-order `i`.
    fn nonlinear(&self, m: usize, i: usize, k: usize) -> Interval;

    /// Bound of the contribution of modes beyond `m` to `N_k`, in units of `q^-k`.
    fn infinite_part_constant(&self, m: usize, i: usize) -> Interval;

    /// Bound of `q^k |N_k| / k` for `k > 2m`.
    fn d1(&self, m: usize, i: usize) -> f64;

    /// Decay used when scaling the nonlinear term of level `i`.
    fn reference_decay(&self, i: usize) -> f64;

    /// Bound of `q^k |N_k| / k` for `m < k <= 2m`.
    fn d2(&self, m: usize, i: usize) -> f64 {
        let q = Interval::point(self.reference_decay(i));
        let mut qk = q.powi(m as i32);
        let mut result = 0.0f64;
        for k in m + 1..=2 * m {
            qk *= q;
            let value = (qk * self.nonlinear(m, i, k) / (k as f64)).abs().sup();
            result = result.max(value);
        }
        result
    }
}

impl KsCoefficients for Trajectory<'_> {
    fn nonlinear(&self, m: usize, i: usize, k: usize) -> Interval {
        debug_assert!(k <= 2 * m, "nonlinear term requested beyond 2N");
        let a = &*self.jet;
        let mut s = Interval::ZERO;
        for j in 0..=i {
            for n in 1..=(k - 1) / 2 {
                s += a[j].coefficient(n) * (a[i - j].coefficient(n + k) - a[i - j].coefficient(k - n));
            }
            for n in (k + 1) / 2..=m {
                s += a[j].coefficient(n) * a[i - j].coefficient(n + k);
            }
        }
        if k % 2 == 0 {
            let h = k / 2;
            let mut j = 0;
            while j < i / 2 {
                s -= a[j].coefficient(h) * a[i - j].coefficient(h);
                j += 1;
            }
            if i % 2 == 1 {
                s -= a[j].coefficient(h) * a[j + 1].coefficient(h);
            } else {
                s -= 0.5 * a[j].coefficient(h).sqr();
            }
        }
        2.0 * s
    }

    fn infinite_part_constant(&self, m: usize, i: usize) -> Interval {
        let a = &*self.jet;
        let s: Interval = (0..=i)
            .map(|j| Interval::point(a[j].constant()) * Interval::point(a[i - j].constant()))
            .sum();
        if s.is_zero() {
            return Interval::ZERO;
        }
        let q = Interval::point(a[i].decay());
        Interval::point((s / (q.powi(2 * m as i32) * (q.sqr() - Interval::ONE))).sup())
    }

    fn d1(&self, m: usize, i: usize) -> f64 {
        let a = &*self.jet;
        let mut s = Interval::ZERO;
        for j in 0..=i {
            let c = Interval::point(a[i - j].constant());
            if c.is_zero() {
                continue;
            }
            let decay = Interval::point(a[i - j].decay());
            let mut q = Interval::ONE;
            for n in 1..=m {
                q *= decay;
                s += (q + q.recip()) * c * a[j].coefficient(n).abs();
            }
        }
        s = s * 2.0 / ((2 * m + 1) as f64);
        for j in 0..=i {
            s += Interval::point(a[j].constant()) * Interval::point(a[i - j].constant());
        }
        s.sup()
    }

    fn reference_decay(&self, i: usize) -> f64 {
        self.jet[i].decay()
    }
}

impl KsCoefficients for Variation<'_> {
    fn nonlinear(&self, m: usize, i: usize, k: usize) -> Interval {
        debug_assert!(k <= 2 * m, "nonlinear term requested beyond 2N");
        let a = self.base;
        let v = &*self.column;
        let mut s = Interval::ZERO;
        for j in 0..=i {
            for n in 1..=m {
                s += a[j].coefficient(n) * v[i - j].coefficient(n + k)
                    + v[j].coefficient(n) * a[i - j].coefficient(n + k);
            }
            for n in 1..k {
                s -= a[j].coefficient(n) * v[i - j].coefficient(k - n);
            }
        }
        2.0 * s
    }

    fn infinite_part_constant(&self, m: usize, i: usize) -> Interval {
        let a = self.base;
        let v = &*self.column;
        let s: Interval = (0..=i)
            .map(|j| Interval::point(a[j].constant()) * Interval::point(v[i - j].constant()))
            .sum();
        if s.is_zero() {
            return Interval::ZERO;
        }
        let q = Interval::point(a[i].decay().min(v[i].decay()));
        Interval::point((2.0 * s / (q.powi(2 * m as i32) * (q.sqr() - Interval::ONE))).sup())
    }

    fn d1(&self, m: usize, i: usize) -> f64 {
        let a = self.base;
        let v = &*self.column;
        let mut s = Interval::ZERO;
        for j in 0..=i {
            let ca = Interval::point(a[i - j].constant());
            let cv = Interval::point(v[i - j].constant());
            if ca.is_zero() && cv.is_zero() {
                continue;
            }
            let decay = Interval::point(v[i - j].decay().max(a[i - j].decay()));
            let mut q = Interval::ONE;
            for n in 1..=m {
                q *= decay;
                s += (q + q.recip())
                    * (ca * v[j].coefficient(n).abs() + cv * a[j].coefficient(n).abs());
            }
        }
        s /= (2 * m + 1) as f64;
        for j in 0..=i {
            s += Interval::point(a[j].constant()) * Interval::point(v[i - j].constant());
        }
        (2.0 * s).sup()
    }

    fn reference_decay(&self, i: usize) -> f64 {
        self.base[i].decay().min(self.column[i].decay())
    }
}

impl DissipativeVectorField for KsSineVectorField {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn first_dissipative_index(&self) -> usize {
        self.first_dissipative
    }

    fn evaluate(&mut self, x: &GeometricBound) -> Result<GeometricBound> {
        let mut jet = new_jet(x.dimension(), 2);
        jet[0] = x.clone();
        jet[1] = x.clone();
        self.compute_taylor_coefficients(&mut jet, 1)?;
        Ok(jet.swap_remove(1))
    }

    fn derivative(&mut self, x: &GeometricBound) -> Result<IMatrix> {
        let m = self.dimension;
        let mut jet = new_jet(m, 2);
        jet[0] = x.clone();
        jet[1] = x.clone();
        let mut columns: Vec<TaylorJet> = Vec::with_capacity(m);
        for j in 0..m {
            let mut column = new_jet(m, 2);
            column[0] = GeometricBound::with_tail(m, 0.0, x.decay())?;
            column[0][j] = Interval::ONE;
            columns.push(column);
        }
        self.compute_jet_with_columns(&mut jet, &mut columns, 1)?;
        let mut a = IMatrix::zeros(m, m);
        for (j, column) in columns.iter().enumerate() {
            a.set_column(j, column[1].explicit());
        }
        Ok(a)
    }

    fn compute_taylor_coefficients(
        &mut self,
        jet: &mut [GeometricBound],
        order: usize,
    ) -> Result<()> {
        self.taylor_recurrence(&mut Trajectory::new(jet), order)
    }

    fn compute_variational_coefficients(
        &mut self,
        base: &[GeometricBound],
        column: &mut [GeometricBound],
        order: usize,
    ) -> Result<()> {
        self.taylor_recurrence(&mut Variation::new(base, column), order)
    }

    fn make_self_consistent_bound(&mut self, jet: &mut [GeometricBound]) -> Result<()> {
        let decay = jet[0].decay();
        let mut part = std::mem::take(&mut self.nonlinear_part);
        let result = self.self_consistent(&mut Trajectory::new(jet), &mut part, decay);
        self.nonlinear_part = part;
        result
    }

    fn make_self_consistent_bound_c1(
        &mut self,
        jet: &mut [GeometricBound],
        jac: &mut [TaylorJet],
        dyx: &mut [TaylorJet],
    ) -> Result<()> {
        self.make_self_consistent_bound(jet)?;
        self.ensure_columns(jac.len().max(dyx.len()));
        let mut jac_parts = std::mem::take(&mut self.jac_nonlinear_part);
        let mut dyx_parts = std::mem::take(&mut self.dyx_nonlinear_part);
        let result = self
            .self_consistent_columns(jet, jac, &mut jac_parts)
            .and_then(|()| self.self_consistent_columns(jet, dyx, &mut dyx_parts));
        self.jac_nonlinear_part = jac_parts;
        self.dyx_nonlinear_part = dyx_parts;
        result
    }

    fn update_tail(
        &mut self,
        x: &mut GeometricBound,
        enclosure: &[GeometricBound],
        h: Interval,
    ) -> Result<()> {
        let part = std::mem::take(&mut self.nonlinear_part);
        let result = self.tail_update(x, &part, &enclosure[0], h);
        self.nonlinear_part = part;
        result
    }

    fn update_variational_tails(
        &mut self,
        dyx_id: &mut [GeometricBound],
        dyx: &mut [GeometricBound],
        jac_enclosure: &[TaylorJet],
        dyx_enclosure: &[TaylorJet],
        h: Interval,
    ) -> Result<()> {
        self.ensure_columns(dyx_id.len().max(dyx.len()));
        let jac_parts = std::mem::take(&mut self.jac_nonlinear_part);
        let dyx_parts = std::mem::take(&mut self.dyx_nonlinear_part);
        let result = self
            .tail_update_columns(dyx, &dyx_parts, dyx_enclosure, h)
            .and_then(|()| self.tail_update_columns(dyx_id, &jac_parts, jac_enclosure, h));
        self.jac_nonlinear_part = jac_parts;
        self.dyx_nonlinear_part = dyx_parts;
        result
    }

    fn block_norms(&mut self, x: &GeometricBound, m: usize) -> IMatrix {
        let mut result = IMatrix::zeros(m + 1, m + 1);
        for k in 1..=m {
            self.eigenvalue(k);
        }
        block_norms::dxx_norm(&self.lambda, x, &mut result);
        block_norms::dxy_norm(x, &mut result);
        block_norms::dyx_norm(x, &mut result);
        result[(m, m)] = Interval::point(block_norms::dyy_logarithmic_norm(self.nu, x, m));
        result
    }
}

impl KsSineVectorField {
    /// Non-negative and finite diagnostics of the tail recurrences at `x`.
    pub fn tail_diagnostics(&self, x: &GeometricBound) -> (f64, f64, f64) {
        let mut jet = vec![x.clone()];
        let trajectory = Trajectory::new(&mut jet);
        let m = self.dimension;
        (
            trajectory.d1(m, 0),
            trajectory.d2(m, 0),
            trajectory.infinite_part_constant(m, 0).sup(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::IVector;

    fn assert_err_contains<T: std::fmt::Debug>(result: Result<T>, needle: &str) {
        let err = result.expect_err("expected error");
        let message = format!("{err}");
        assert!(
            message.contains(needle),
            "expected error to contain \"{needle}\", got \"{message}\""
        );
    }

    fn series(values: &[f64], constant: f64, decay: f64) -> GeometricBound {
        let coefficients =
            IVector::from_iterator(values.len(), values.iter().map(|&v| Interval::point(v)));
        GeometricBound::from_coefficients(coefficients, constant, decay).expect("valid envelope")
    }

    /// `a_k' = lambda_k a_k + k N_k` for finitely supported `a`.
    fn galerkin_rhs(nu: f64, a: &[f64]) -> Vec<f64> {
        let n = a.len();
        let coeff = |k: usize| if k >= 1 && k <= n { a[k - 1] } else { 0.0 };
        (1..=n)
            .map(|k| {
                let mut nk = 0.0;
                for m in 1..=2 * n {
                    nk += 2.0 * coeff(m) * coeff(m + k);
                }
                for m in 1..k {
                    nk -= coeff(m) * coeff(k - m);
                }
                let kf = k as f64;
                kf * kf * (1.0 - nu * kf * kf) * coeff(k) + kf * nk
            })
            .collect()
    }

    #[test]
    fn construction_validates_parameters() {
        assert_err_contains(KsSineVectorField::new(0.0, 8, 4), "viscosity");
        assert_err_contains(KsSineVectorField::new(0.1, 0, 1), "explicit mode");
        assert_err_contains(KsSineVectorField::new(0.1, 8, 9), "first dissipative index");
        let params = KsParameters::default();
        let field = KsSineVectorField::from_parameters(&params).expect("valid");
        assert_eq!(field.first_dissipative_index(), 4);
    }

    #[test]
    fn eigenvalue_table_grows_on_demand() {
        let mut field = KsSineVectorField::new(0.1, 4, 4).expect("valid");
        assert!(field.eigenvalue(2).contains(2.4));
        assert!(field.eigenvalue(40).contains(1600.0 * (1.0 - 160.0)));
        field.set_parameter(0.5).expect("valid");
        assert!(field.eigenvalue(2).contains(-4.0));
    }

    #[test]
    fn evaluate_matches_galerkin_right_hand_side_without_tail() {
        let mut field = KsSineVectorField::new(0.1, 6, 4).expect("valid");
        let values = [0.3, -0.2, 0.1, 0.05, 0.0, 0.0];
        let x = series(&values, 0.0, 2.0);
        let f = field.evaluate(&x).expect("evaluation");
        let expected = galerkin_rhs(0.1, &values);
        for k in 1..=6 {
            assert!(
                (f.coefficient(k).mid() - expected[k - 1]).abs() < 1e-12,
                "mode {k}: {} vs {}",
                f.coefficient(k),
                expected[k - 1]
            );
            assert!(f.coefficient(k).width() < 1e-12);
        }
    }

    #[test]
    fn second_order_coefficient_matches_time_derivative_of_the_field() {
        let nu = 0.1;
        let mut field = KsSineVectorField::new(nu, 6, 4).expect("valid");
        let values = [0.2, 0.1, -0.05, 0.0, 0.0, 0.0];
        let mut jet = new_jet(6, 3);
        jet[0] = series(&values, 0.0, 2.0);
        field.compute_taylor_coefficients(&mut jet, 2).expect("coefficients");

        // finite differences of f along f
        let f0 = galerkin_rhs(nu, &values);
        let eps = 1e-6;
        let shifted: Vec<f64> = values.iter().zip(&f0).map(|(a, f)| a + eps * f).collect();
        let f1 = galerkin_rhs(nu, &shifted);
        for k in 0..3 {
            let second = (f1[k] - f0[k]) / eps / 2.0;
            assert!(
                (jet[2][k].mid() - second).abs() < 1e-4,
                "mode {}: {} vs {second}",
                k + 1,
                jet[2][k]
            );
        }
    }

    #[test]
    fn derivative_matches_finite_differences() {
        let nu = 0.1;
        let mut field = KsSineVectorField::new(nu, 5, 4).expect("valid");
        let values = [0.2, -0.1, 0.05, 0.01, 0.0];
        let a = field.derivative(&series(&values, 0.0, 2.0)).expect("jacobian");
        let f0 = galerkin_rhs(nu, &values);
        let eps = 1e-7;
        for j in 0..5 {
            let mut shifted = values.to_vec();
            shifted[j] += eps;
            let f1 = galerkin_rhs(nu, &shifted);
            for c in 0..5 {
                let fd = (f1[c] - f0[c]) / eps;
                assert!(
                    (a[(c, j)].mid() - fd).abs() < 1e-5,
                    "entry ({c},{j}): {} vs {fd}",
                    a[(c, j)]
                );
            }
        }
    }

    #[test]
    fn tail_envelope_of_higher_orders_is_valid() {
        let mut field = KsSineVectorField::new(0.1, 8, 4).expect("valid");
        let mut jet = new_jet(8, 6);
        jet[0] = series(&[0.1, 0.05, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0], 1e-6, 2.0);
        field.compute_taylor_coefficients(&mut jet, 5).expect("coefficients");
        for level in &jet[1..] {
            assert!(level.constant() >= 0.0 && level.constant().is_finite());
            assert!(level.decay() > 1.0);
        }
        assert!(jet[5].decay() < jet[1].decay());
    }

    #[test]
    fn self_consistent_bound_isolates_dissipative_modes() {
        let mut field = KsSineVectorField::new(0.1, 16, 4).expect("valid");
        let mut values = vec![0.0; 16];
        values[0] = 0.1;
        values[1] = 0.05;
        values[2] = 0.01;
        let mut jet = vec![series(&values, 0.0, 2.0)];
        field.make_self_consistent_bound(&mut jet).expect("isolating bound");

        let enc = &jet[0];
        let part = field.nonlinear_part().to_vec();
        for k in 4..=16 {
            let lambda = field.eigenvalue(k);
            let a = enc.coefficient(k);
            assert!((lambda * a.sup() + part[k]).sup() < 0.0, "upper face of mode {k}");
            assert!((lambda * a.inf() + part[k]).inf() > 0.0, "lower face of mode {k}");
        }
        assert!(enc.constant() > 0.0 && enc.constant().is_finite());
        let required = (part[17] / field.tail_denominator()).abs().sup();
        assert!(enc.constant() >= required);
        assert_eq!(enc.coefficient(1), Interval::point(0.1));
    }

    #[test]
    fn self_consistency_fails_when_tail_mode_is_not_dissipative() {
        let mut field = KsSineVectorField::new(0.001, 8, 2).expect("valid");
        let mut jet = vec![series(&[0.5, 0.1, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0], 0.0, 2.0)];
        assert_err_contains(
            field.make_self_consistent_bound(&mut jet),
            "tail mode 9 is not dissipative",
        );
    }

    #[test]
    fn self_consistency_fails_for_expanding_modes_declared_dissipative() {
        // lambda_2 > 0 for nu = 0.1, so mode 2 can never be isolated
        let mut field = KsSineVectorField::new(0.1, 16, 2).expect("valid");
        let mut values = vec![0.0; 16];
        values[0] = 0.5;
        values[1] = 0.1;
        let mut jet = vec![series(&values, 0.0, 2.0)];
        assert_err_contains(
            field.make_self_consistent_bound(&mut jet),
            "cannot make self-consistent bound",
        );
    }

    #[test]
    fn block_norms_have_the_expected_shape() {
        let mut field = KsSineVectorField::new(0.1, 8, 4).expect("valid");
        let x = series(&[0.1, 0.05, 0.01, 0.0, 0.0, 0.0, 0.0, 0.0], 1e-4, 2.0);
        let m = 3;
        let norms = field.block_norms(&x, m);
        assert_eq!(norms.nrows(), m + 1);
        for k in 0..m {
            assert!(norms[(k, m)].sup() >= 0.0);
            assert!(norms[(m, k)].sup() >= 0.0);
        }
        assert!((norms[(0, 0)].mid() - 1.0).abs() < 1e-12);
        // Dyy is strongly contracting for these parameters
        assert!(norms[(m, m)].sup() < 0.0);
    }

    #[test]
    fn diagnostics_are_finite_and_non_negative() {
        let field = KsSineVectorField::new(0.1, 8, 4).expect("valid");
        let x = series(&[0.1, 0.05, 0.01, 0.0, 0.0, 0.0, 0.0, 0.0], 1e-3, 2.0);
        let (d1, d2, di) = field.tail_diagnostics(&x);
        for value in [d1, d2, di] {
            assert!(value >= 0.0 && value.is_finite());
        }
    }

    fn one_sided_update(enclosure_mode: Interval, current: Interval) -> Result<GeometricBound> {
        // lambda_1 = 0.9 > 0, so only one sign check can hold on mode 1
        let mut field = KsSineVectorField::new(0.1, 8, 4).expect("valid");
        let mut enclosure = GeometricBound::new(8);
        enclosure[0] = enclosure_mode;
        let mut x = GeometricBound::new(8);
        x[0] = current;
        field.update_tail(&mut x, &[enclosure], Interval::point(0.01))?;
        Ok(x)
    }

    #[test]
    fn tail_update_narrows_from_the_certified_upper_side() {
        let x = one_sided_update(Interval::new(-2.0, -1.0), Interval::new(-3.0, 0.0))
            .expect("consistent update");
        let bound = -(0.009f64.exp());
        assert_eq!(x[0].inf(), -3.0);
        assert!(x[0].sup() < -1.0 && (x[0].sup() - bound).abs() < 1e-12);
    }

    #[test]
    fn tail_update_rejects_an_upper_bound_below_the_current_range() {
        let err = one_sided_update(Interval::new(-2.0, -1.0), Interval::new(5.0, 6.0))
            .expect_err("propagated bound lies below the set");
        assert!(matches!(
            err,
            PdeError::InconsistentEnclosure { mode: 1, .. }
        ));
    }

    #[test]
    fn tail_update_narrows_from_the_certified_lower_side() {
        let x = one_sided_update(Interval::new(1.0, 2.0), Interval::new(0.0, 3.0))
            .expect("consistent update");
        assert_eq!(x[0].sup(), 3.0);
        assert!(x[0].inf() > 1.0 && (x[0].inf() - 0.009f64.exp()).abs() < 1e-12);
    }

    #[test]
    fn tail_update_rejects_a_lower_bound_above_the_current_range() {
        let err = one_sided_update(Interval::new(1.0, 2.0), Interval::new(-6.0, -5.0))
            .expect_err("propagated bound lies above the set");
        assert!(matches!(
            err,
            PdeError::InconsistentEnclosure { mode: 1, .. }
        ));
    }
}
