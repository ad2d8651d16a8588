//! Sequences whose tail decays like `C q^-k k^-d`.
//!
//! Same layout as [`GeometricBound`] with an extra polynomial degree `d`
//! in the envelope. Differentiation in `x` multiplies mode `k` by `k`,
//! which a geometric envelope can only absorb by slowing its decay; here
//! it lowers the degree by one instead.

use crate::error::{PdeError, Result};
use crate::geometric_bound::{GeometricBound, DEFAULT_DECAY};
use crate::interval::Interval;
use crate::linalg::{self, IMatrix, IVector};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Index, Mul, Sub};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolyLogBound {
    coefficients: IVector,
    constant: f64,
    decay: f64,
    degree: u32,
}

fn validate(constant: f64, decay: f64) -> Result<()> {
    if decay > 1.0 && constant >= 0.0 {
        Ok(())
    } else {
        Err(PdeError::InvalidEnvelope { constant, decay })
    }
}

/// `(N + 1)^-e`, the largest value of `k^-e` over the tail.
fn first_tail_power(dimension: usize, e: u32) -> Interval {
    Interval::ONE / Interval::point((dimension + 1) as f64).powi(e as i32)
}

impl PolyLogBound {
    /// Zero coefficients with constant 0, decay 2 and degree 0.
    pub fn new(dimension: usize) -> Self {
        Self {
            coefficients: linalg::zeros(dimension),
            constant: 0.0,
            decay: DEFAULT_DECAY,
            degree: 0,
        }
    }

    pub fn with_tail(dimension: usize, constant: f64, decay: f64, degree: u32) -> Result<Self> {
        Self::from_coefficients(linalg::zeros(dimension), constant, decay, degree)
    }

    pub fn from_coefficients(
        coefficients: IVector,
        constant: f64,
        decay: f64,
        degree: u32,
    ) -> Result<Self> {
        validate(constant, decay)?;
        Ok(Self {
            coefficients,
            constant,
            decay,
            degree,
        })
    }

    pub fn dimension(&self) -> usize {
        self.coefficients.len()
    }

    pub fn constant(&self) -> f64 {
        self.constant
    }

    pub fn decay(&self) -> f64 {
        self.decay
    }

    pub fn degree(&self) -> u32 {
        self.degree
    }

    pub fn set_constant(&mut self, constant: f64) -> Result<()> {
        validate(constant, self.decay)?;
        self.constant = constant;
        Ok(())
    }

    pub fn set_decay(&mut self, decay: f64) -> Result<()> {
        validate(self.constant, decay)?;
        self.decay = decay;
        Ok(())
    }

    pub fn set_degree(&mut self, degree: u32) {
        self.degree = degree;
    }

    /// Coefficient of mode `k >= 1`, from the envelope when `k > N`.
    pub fn coefficient(&self, k: usize) -> Interval {
        debug_assert!(k >= 1, "modes are numbered from 1");
        if k <= self.dimension() {
            self.coefficients[k - 1]
        } else {
            self.tail_enclosure(k)
        }
    }

    /// Sets mode `k` in `1..=N`.
    pub fn set_coefficient(&mut self, k: usize, value: Interval) -> Result<()> {
        if k == 0 || k > self.dimension() {
            return Err(PdeError::DimensionMismatch {
                context: "poly-log coefficient index",
                expected: self.dimension(),
                actual: k,
            });
        }
        self.coefficients[k - 1] = value;
        Ok(())
    }

    pub fn tail_enclosure(&self, k: usize) -> Interval {
        if self.constant == 0.0 {
            return Interval::ZERO;
        }
        let kf = Interval::point(k as f64);
        Interval::symmetric(self.constant)
            / (kf.powi(self.degree as i32) * Interval::point(self.decay).powi(k as i32))
    }

    pub fn explicit(&self) -> &IVector {
        &self.coefficients
    }

    pub fn projection(&self, m: usize) -> IVector {
        self.coefficients.rows(0, m.min(self.dimension())).into_owned()
    }

    /// Constant of the same tail written with degree `degree <= self.degree`.
    fn constant_at_degree(&self, degree: u32) -> Interval {
        Interval::point(self.constant) * first_tail_power(self.dimension(), self.degree - degree)
    }

    /// Center with a thin explicit part and no tail, and the deviation
    /// carrying the rest.
    pub fn split(&self) -> (PolyLogBound, PolyLogBound) {
        let (center, deviation) = linalg::split_vector(&self.coefficients);
        (
            Self {
                coefficients: center,
                constant: 0.0,
                ..self.clone()
            },
            Self {
                coefficients: deviation,
                ..self.clone()
            },
        )
    }

    pub fn midpoint(&self) -> PolyLogBound {
        Self {
            coefficients: linalg::midpoint(&self.coefficients),
            constant: 0.0,
            decay: self.decay,
            degree: 0,
        }
    }

    /// Common part of two bounds. Both envelopes hold for the common
    /// part, so with equal decay and degree the smaller constant is taken
    /// and otherwise the envelope smaller at the first tail mode.
    pub fn intersection(&self, other: &PolyLogBound) -> Option<PolyLogBound> {
        let coefficients = linalg::intersect(&self.coefficients, &other.coefficients)?;
        let envelope = if self.decay == other.decay && self.degree == other.degree {
            Self {
                constant: self.constant.min(other.constant),
                ..self.clone()
            }
        } else {
            let k = self.dimension() + 1;
            if self.tail_enclosure(k).sup() <= other.tail_enclosure(k).sup() {
                self.clone()
            } else {
                other.clone()
            }
        };
        Some(Self {
            coefficients,
            ..envelope
        })
    }

    pub fn subset(&self, other: &PolyLogBound) -> bool {
        linalg::is_subset(&self.coefficients, &other.coefficients)
            && self.constant <= other.constant
            && self.decay >= other.decay
            && self.degree >= other.degree
    }

    /// `A` applied to the leading coefficients; the tail is unchanged.
    pub fn apply_matrix(&self, a: &IMatrix) -> Result<PolyLogBound> {
        let n = self.dimension();
        if a.ncols() > n || a.nrows() > n {
            return Err(PdeError::DimensionMismatch {
                context: "matrix times poly-log bound",
                expected: n,
                actual: a.ncols().max(a.nrows()),
            });
        }
        let image = a * self.projection(a.ncols());
        let mut out = self.clone();
        out.coefficients.rows_mut(0, a.nrows()).copy_from(&image);
        Ok(out)
    }

    /// Coefficients `k a_k` of the derivative in `x`; the degree drops by one.
    pub fn partial_derivative(&self) -> Result<PolyLogBound> {
        let Some(degree) = self.degree.checked_sub(1) else {
            return Err(PdeError::InvalidSettings(
                "a degree 0 envelope does not bound the derivative".to_string(),
            ));
        };
        let coefficients = IVector::from_iterator(
            self.dimension(),
            self.coefficients
                .iter()
                .enumerate()
                .map(|(i, &c)| c * ((i + 1) as f64)),
        );
        Ok(Self {
            coefficients,
            constant: self.constant,
            decay: self.decay,
            degree,
        })
    }

    /// Enclosure of `sum |a_k|` over all modes.
    pub fn l1_norm(&self) -> Interval {
        let explicit: Interval = self.coefficients.iter().map(|x| x.abs()).sum();
        let q = Interval::point(self.decay);
        let tail = Interval::point(self.constant)
            * first_tail_power(self.dimension(), self.degree)
            / q.powi(self.dimension() as i32)
            / (q - Interval::ONE);
        explicit + tail
    }

    /// The same set with the polynomial factor folded into the constant.
    pub fn to_geometric(&self) -> Result<GeometricBound> {
        GeometricBound::from_coefficients(
            self.coefficients.clone(),
            self.constant_at_degree(0).sup(),
            self.decay,
        )
    }
}

impl Index<usize> for PolyLogBound {
    type Output = Interval;

    fn index(&self, i: usize) -> &Interval {
        &self.coefficients[i]
    }
}

impl From<&GeometricBound> for PolyLogBound {
    fn from(x: &GeometricBound) -> Self {
        Self {
            coefficients: x.explicit().clone(),
            constant: x.constant(),
            decay: x.decay(),
            degree: 0,
        }
    }
}

/// Envelope of `x + y` and `x - y`: the lower degree and the slower decay,
/// each constant rescaled from the first tail mode.
fn combined_tail(x: &PolyLogBound, y: &PolyLogBound) -> (f64, f64, u32) {
    let degree = x.degree.min(y.degree);
    let constant = (x.constant_at_degree(degree) + y.constant_at_degree(degree)).sup();
    (constant, x.decay.min(y.decay), degree)
}

impl Add for &PolyLogBound {
    type Output = PolyLogBound;

    fn add(self, rhs: &PolyLogBound) -> PolyLogBound {
        let (constant, decay, degree) = combined_tail(self, rhs);
        PolyLogBound {
            coefficients: &self.coefficients + &rhs.coefficients,
            constant,
            decay,
            degree,
        }
    }
}

impl Sub for &PolyLogBound {
    type Output = PolyLogBound;

    fn sub(self, rhs: &PolyLogBound) -> PolyLogBound {
        let (constant, decay, degree) = combined_tail(self, rhs);
        PolyLogBound {
            coefficients: &self.coefficients - &rhs.coefficients,
            constant,
            decay,
            degree,
        }
    }
}

impl Mul<Interval> for &PolyLogBound {
    type Output = PolyLogBound;

    fn mul(self, s: Interval) -> PolyLogBound {
        let mut out = self.clone();
        out.coefficients *= s;
        out.constant = (Interval::point(self.constant) * s.abs()).sup();
        out
    }
}

impl Mul<&PolyLogBound> for Interval {
    type Output = PolyLogBound;

    fn mul(self, x: &PolyLogBound) -> PolyLogBound {
        x * self
    }
}

impl fmt::Display for PolyLogBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{[")?;
        for (i, c) in self.coefficients.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{c}")?;
        }
        write!(
            f,
            "], C={:e}, q={}, d={}}}",
            self.constant, self.decay, self.degree
        )
    }
}
