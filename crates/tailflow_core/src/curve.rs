//! Taylor data of the last step and its evaluation inside the step.
//!
//! Over `[0, h]` the flow of the enclosed set is represented as
//! `c(t, x0) + D_x c(t, x0) (x - x0) + remainder(t)`, where `c` is the
//! Taylor polynomial of the center trajectory, `D_x c` the polynomial of
//! the variational columns and the remainder comes from the a-priori
//! enclosure of the whole step.

use crate::geometric_bound::GeometricBound;
use crate::interval::Interval;
use crate::jet::{new_jet, sum_taylor_series};
use crate::linalg::{self, IMatrix, IVector};
use crate::traits::TaylorJet;

#[derive(Debug, Clone)]
pub struct PdeCurve {
    order: usize,
    dimension: usize,
    step: f64,
    pub(crate) center: TaylorJet,
    pub(crate) coefficients: TaylorJet,
    pub(crate) remainder: TaylorJet,
    pub(crate) jac: Vec<TaylorJet>,
    pub(crate) jac_remainder: Vec<TaylorJet>,
    pub(crate) dyx: Vec<TaylorJet>,
    pub(crate) dyx_remainder: Vec<TaylorJet>,
    init_matrix: IMatrix,
}

impl PdeCurve {
    pub fn new(dimension: usize, order: usize) -> Self {
        let mut curve = Self {
            order,
            dimension,
            step: 0.0,
            center: Vec::new(),
            coefficients: Vec::new(),
            remainder: Vec::new(),
            jac: Vec::new(),
            jac_remainder: Vec::new(),
            dyx: Vec::new(),
            dyx_remainder: Vec::new(),
            init_matrix: IMatrix::zeros(0, 0),
        };
        curve.realloc();
        curve
    }

    fn realloc(&mut self) {
        let len = self.order + 2;
        self.center = new_jet(self.dimension, len);
        self.coefficients = new_jet(self.dimension, len);
        self.remainder = new_jet(self.dimension, len);
        self.jac.clear();
        self.jac_remainder.clear();
        self.dyx.clear();
        self.dyx_remainder.clear();
    }

    /// Allocates `columns` variational jets of every kind.
    pub(crate) fn ensure_columns(&mut self, columns: usize) {
        let len = self.order + 2;
        let dim = self.dimension;
        for jets in [
            &mut self.jac,
            &mut self.jac_remainder,
            &mut self.dyx,
            &mut self.dyx_remainder,
        ] {
            jets.resize_with(columns, || new_jet(dim, len));
        }
    }

    pub fn order(&self) -> usize {
        self.order
    }

    /// Changes the order and drops all stored coefficients.
    pub fn set_order(&mut self, order: usize) {
        self.order = order;
        self.realloc();
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn columns(&self) -> usize {
        self.jac.len()
    }

    /// Length of the last accepted step; the curve is valid on `[0, step]`.
    pub fn step(&self) -> f64 {
        self.step
    }

    pub(crate) fn set_step(&mut self, step: f64) {
        self.step = step;
    }

    /// Matrix the variational part is composed with in [`derivative`](Self::derivative).
    pub fn set_init_matrix(&mut self, matrix: IMatrix) {
        self.init_matrix = matrix;
    }

    pub fn center_coefficients(&self) -> &[GeometricBound] {
        &self.center
    }

    pub fn coefficients(&self) -> &[GeometricBound] {
        &self.coefficients
    }

    pub fn remainder_coefficients(&self) -> &[GeometricBound] {
        &self.remainder
    }

    pub fn matrix_coefficients(&self) -> &[TaylorJet] {
        &self.jac
    }

    pub fn matrix_remainder_coefficients(&self) -> &[TaylorJet] {
        &self.jac_remainder
    }

    pub fn dyx_coefficients(&self) -> &[TaylorJet] {
        &self.dyx
    }

    pub fn dyx_remainder_coefficients(&self) -> &[TaylorJet] {
        &self.dyx_remainder
    }

    fn sum_vector(&self, jet: &[GeometricBound], h: Interval) -> IVector {
        let mut out = linalg::zeros(self.dimension);
        sum_taylor_series(jet, h, self.order, self.dimension, out.as_mut_slice());
        out
    }

    /// `dimension x jets.len()` matrix whose columns are the jets summed at `h`.
    pub(crate) fn sum_matrix(&self, jets: &[TaylorJet], h: Interval) -> IMatrix {
        let mut out = IMatrix::zeros(self.dimension, jets.len());
        for (j, jet) in jets.iter().enumerate() {
            let column = self.sum_vector(jet, h);
            out.set_column(j, &column);
        }
        out
    }

    fn remainder_term(&self, h: Interval) -> IVector {
        self.remainder[self.order + 1].explicit() * h.powi(self.order as i32 + 1)
    }

    /// Enclosure of the flow of the whole set at time `h`.
    pub fn value(&self, h: Interval) -> GeometricBound {
        let mut result = self.remainder[0].clone();
        let columns = self.columns();
        let x = self.coefficients[0].projection(columns);
        let x0 = self.center[0].projection(columns);
        let delta = x - x0;
        let phi = self.sum_vector(&self.center, h);
        let a = self.sum_matrix(&self.jac, h);
        *result.explicit_mut() = phi + a * delta + self.remainder_term(h);
        result
    }

    /// Taylor polynomial of the center trajectory at `h`; the tail is the
    /// envelope of the step enclosure.
    pub fn value_at_center(&self, h: Interval) -> GeometricBound {
        let mut result = self.remainder[0].clone();
        *result.explicit_mut() = self.sum_vector(&self.center, h);
        result
    }

    pub fn remainder(&self, h: Interval) -> GeometricBound {
        let mut result = self.remainder[0].clone();
        *result.explicit_mut() = self.remainder_term(h);
        result
    }

    /// Variational polynomial at `h`, without remainder.
    pub fn one_step_derivative(&self, h: Interval) -> IMatrix {
        self.sum_matrix(&self.jac, h)
    }

    /// Derivative of the flow on the explicit block at `h`, including the
    /// remainders and the `Dyx` contribution, composed with the init matrix.
    pub fn derivative(&self, h: Interval) -> IMatrix {
        let columns = self.columns();
        let s = (Interval::new(0.0, 1.0) * h).powi(self.order as i32 + 1);
        let mut a = self.sum_matrix(&self.jac, h);
        let mut dyx = self.sum_matrix(&self.dyx, h);
        for i in 0..columns {
            let jac_rem = self.jac_remainder[i][self.order + 1].explicit() * s;
            let dyx_rem = self.dyx_remainder[i][self.order + 1].explicit() * s;
            let mut column = a.column_mut(i);
            column += jac_rem;
            let mut column = dyx.column_mut(i);
            column += dyx_rem;
        }
        let a = a.rows(0, columns).into_owned();
        let dyx = dyx.rows(0, columns).into_owned();
        if self.init_matrix.nrows() == columns && self.init_matrix.ncols() == columns {
            a * &self.init_matrix + dyx
        } else {
            a + dyx
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_curve() -> PdeCurve {
        // x(t) = x(0) + t v, one explicit column with unit derivative
        let mut curve = PdeCurve::new(2, 1);
        curve.ensure_columns(1);
        curve.center[0][0] = Interval::point(1.0);
        curve.center[1][0] = Interval::point(2.0);
        curve.coefficients[0][0] = Interval::new(0.9, 1.1);
        curve.coefficients[1][0] = Interval::point(2.0);
        curve.jac[0][0][0] = Interval::ONE;
        curve.remainder[2][0] = Interval::new(-1.0, 1.0);
        curve.set_step(0.5);
        curve
    }

    #[test]
    fn value_contains_center_and_spread() {
        let curve = linear_curve();
        let h = Interval::point(0.5);
        let center = curve.value_at_center(h);
        assert_eq!(center[0], Interval::point(2.0));
        let value = curve.value(h);
        assert!(value[0].contains(2.1) && value[0].contains(1.9));
        assert!(value[0].contains(2.0 + 0.25));
        let rem = curve.remainder(h)[0];
        assert!(rem.contains(-0.25) && rem.contains(0.25) && rem.width() < 0.5 + 1e-12);
    }

    #[test]
    fn derivative_includes_the_remainder() {
        let curve = linear_curve();
        let d = curve.one_step_derivative(Interval::point(0.5));
        assert_eq!(d[(0, 0)], Interval::ONE);
        let full = curve.derivative(Interval::point(0.5));
        assert_eq!(full.nrows(), 1);
        assert!(full[(0, 0)].contains(1.0));
    }

    #[test]
    fn set_order_reallocates() {
        let mut curve = linear_curve();
        curve.set_order(3);
        assert_eq!(curve.coefficients().len(), 5);
        assert_eq!(curve.columns(), 0);
        assert_eq!(curve.center_coefficients()[0][0], Interval::ZERO);
    }
}
