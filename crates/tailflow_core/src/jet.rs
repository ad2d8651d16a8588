//! Coefficient sources over stored Taylor jets.

use crate::error::Result;
use crate::geometric_bound::GeometricBound;
use crate::interval::Interval;
use crate::traits::{CoefficientSource, TaylorJet};

pub fn new_jet(dimension: usize, len: usize) -> TaylorJet {
    vec![GeometricBound::new(dimension); len]
}

/// Jet of a trajectory; reads and writes the same series.
pub struct Trajectory<'a> {
    pub jet: &'a mut [GeometricBound],
}

impl<'a> Trajectory<'a> {
    pub fn new(jet: &'a mut [GeometricBound]) -> Self {
        Self { jet }
    }
}

/// Variational column along a fixed base trajectory; writes the column.
pub struct Variation<'a> {
    pub base: &'a [GeometricBound],
    pub column: &'a mut [GeometricBound],
}

impl<'a> Variation<'a> {
    pub fn new(base: &'a [GeometricBound], column: &'a mut [GeometricBound]) -> Self {
        Self { base, column }
    }
}

macro_rules! coefficient_source {
    ($ty:ident, $field:ident) => {
        impl CoefficientSource for $ty<'_> {
            fn coefficient(&self, order: usize, k: usize) -> Interval {
                self.$field[order].coefficient(k)
            }

            fn set_coefficient(&mut self, order: usize, k: usize, value: Interval) {
                self.$field[order].set_coefficient(k, value);
            }

            fn constant(&self, order: usize) -> f64 {
                self.$field[order].constant()
            }

            fn set_constant(&mut self, order: usize, constant: f64) -> Result<()> {
                self.$field[order].set_constant(constant)
            }

            fn decay(&self, order: usize) -> f64 {
                self.$field[order].decay()
            }

            fn set_decay(&mut self, order: usize, decay: f64) -> Result<()> {
                self.$field[order].set_decay(decay)
            }
        }
    };
}

coefficient_source!(Trajectory, jet);
coefficient_source!(Variation, column);

/// Horner evaluation of the explicit modes `0..dim` of `jet[0..=order]` at `h`.
pub fn sum_taylor_series(
    jet: &[GeometricBound],
    h: Interval,
    order: usize,
    dim: usize,
    out: &mut [Interval],
) {
    for (n, value) in out.iter_mut().enumerate().take(dim) {
        let mut acc = jet[order][n];
        for r in (0..order).rev() {
            acc = acc * h + jet[r][n];
        }
        *value = acc;
    }
}
