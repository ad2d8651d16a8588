//! Infinite sequences of Fourier coefficients with a geometric tail.
//!
//! A `GeometricBound` stores the leading `N` coefficients explicitly and
//! bounds every further coefficient by `|a_k| <= C q^-k`. The constant is
//! kept as an upper bound and the decay as a lower bound, so every update
//! rounds `C` up and `q` down.

use crate::error::{PdeError, Result};
use crate::interval::Interval;
use crate::linalg::{self, IMatrix, IVector};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Index, IndexMut, Mul, MulAssign, Sub, SubAssign};

pub const DEFAULT_DECAY: f64 = 2.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometricBound {
    coefficients: IVector,
    constant: f64,
    decay: f64,
}

fn validate(constant: f64, decay: f64) -> Result<()> {
    if decay > 1.0 && constant >= 0.0 {
        Ok(())
    } else {
        Err(PdeError::InvalidEnvelope { constant, decay })
    }
}

impl GeometricBound {
    /// Zero coefficients with constant 0 and decay 2.
    pub fn new(dimension: usize) -> Self {
        Self {
            coefficients: linalg::zeros(dimension),
            constant: 0.0,
            decay: DEFAULT_DECAY,
        }
    }

    pub fn with_tail(dimension: usize, constant: f64, decay: f64) -> Result<Self> {
        validate(constant, decay)?;
        Ok(Self {
            coefficients: linalg::zeros(dimension),
            constant,
            decay,
        })
    }

    pub fn from_coefficients(coefficients: IVector, constant: f64, decay: f64) -> Result<Self> {
        validate(constant, decay)?;
        Ok(Self {
            coefficients,
            constant,
            decay,
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

    /// Coefficient of mode `k >= 1`: the stored value when `k <= N`, the
    /// tail enclosure `C [-1, 1] / q^k` beyond.
    pub fn coefficient(&self, k: usize) -> Interval {
        debug_assert!(k >= 1, "modes are numbered from 1");
        if k <= self.dimension() {
            self.coefficients[k - 1]
        } else {
            self.tail_enclosure(k)
        }
    }

    /// Sets mode `k` in `1..=N`.
    ///
    /// # Panics
    /// If `k` lies outside the explicit range.
    pub fn set_coefficient(&mut self, k: usize, value: Interval) {
        assert!(
            k >= 1 && k <= self.dimension(),
            "mode {k} outside explicit range 1..={}",
            self.dimension()
        );
        self.coefficients[k - 1] = value;
    }

    pub fn tail_enclosure(&self, k: usize) -> Interval {
        if self.constant == 0.0 {
            return Interval::ZERO;
        }
        Interval::symmetric(self.constant) / Interval::point(self.decay).powi(k as i32)
    }

    pub fn explicit(&self) -> &IVector {
        &self.coefficients
    }

    pub fn explicit_mut(&mut self) -> &mut IVector {
        &mut self.coefficients
    }

    pub fn set_explicit(&mut self, coefficients: &IVector) -> Result<()> {
        if coefficients.len() != self.dimension() {
            return Err(PdeError::DimensionMismatch {
                context: "explicit coefficients",
                expected: self.dimension(),
                actual: coefficients.len(),
            });
        }
        self.coefficients.copy_from(coefficients);
        Ok(())
    }

    /// The first `m` coefficients.
    pub fn projection(&self, m: usize) -> IVector {
        self.coefficients.rows(0, m.min(self.dimension())).into_owned()
    }

    /// Center with a thin explicit part and no tail, and the deviation
    /// carrying the rest. `center + deviation` contains `self`.
    pub fn split(&self) -> (GeometricBound, GeometricBound) {
        let (center, deviation) = linalg::split_vector(&self.coefficients);
        (
            Self {
                coefficients: center,
                constant: 0.0,
                decay: self.decay,
            },
            Self {
                coefficients: deviation,
                constant: self.constant,
                decay: self.decay,
            },
        )
    }

    pub fn midpoint(&self) -> GeometricBound {
        Self {
            coefficients: linalg::midpoint(&self.coefficients),
            constant: 0.0,
            decay: self.decay,
        }
    }

    /// Common part of two bounds. With equal decays the smaller constant
    /// wins; otherwise the larger constant and the faster decay are taken.
    pub fn intersection(&self, other: &GeometricBound) -> Option<GeometricBound> {
        let coefficients = linalg::intersect(&self.coefficients, &other.coefficients)?;
        let (constant, decay) = if self.decay == other.decay {
            (self.constant.min(other.constant), self.decay)
        } else {
            (
                self.constant.max(other.constant),
                self.decay.max(other.decay),
            )
        };
        Some(Self {
            coefficients,
            constant,
            decay,
        })
    }

    pub fn hull(&self, other: &GeometricBound) -> GeometricBound {
        let coefficients = self.coefficients.zip_map(&other.coefficients, |a, b| a.hull(b));
        Self {
            coefficients,
            constant: self.constant.max(other.constant),
            decay: self.decay.min(other.decay),
        }
    }

    pub fn subset(&self, other: &GeometricBound) -> bool {
        linalg::is_subset(&self.coefficients, &other.coefficients)
            && self.constant <= other.constant
            && self.decay >= other.decay
    }

    /// `A` applied to the leading `A.ncols()` coefficients; the first
    /// `A.nrows()` coefficients of the result are replaced, the rest kept.
    pub fn apply_matrix(&self, a: &IMatrix) -> Result<GeometricBound> {
        let n = self.dimension();
        if a.ncols() > n || a.nrows() > n {
            return Err(PdeError::DimensionMismatch {
                context: "matrix times geometric bound",
                expected: n,
                actual: a.ncols().max(a.nrows()),
            });
        }
        let image = a * self.projection(a.ncols());
        let mut out = self.clone();
        out.coefficients.rows_mut(0, a.nrows()).copy_from(&image);
        Ok(out)
    }

    /// Enclosure of `sum |a_k|` over all modes.
    pub fn l1_norm(&self) -> Interval {
        let explicit: Interval = self.coefficients.iter().map(|x| x.abs()).sum();
        let q = Interval::point(self.decay);
        let tail = Interval::point(self.constant) / q.powi(self.dimension() as i32)
            / (q - Interval::ONE);
        explicit + tail
    }
}

fn constant_sum(a: f64, b: f64) -> f64 {
    (Interval::point(a) + Interval::point(b)).sup()
}

impl Index<usize> for GeometricBound {
    type Output = Interval;

    /// Zero-based access to the explicit coefficients.
    fn index(&self, i: usize) -> &Interval {
        &self.coefficients[i]
    }
}

impl IndexMut<usize> for GeometricBound {
    fn index_mut(&mut self, i: usize) -> &mut Interval {
        &mut self.coefficients[i]
    }
}

impl Add for &GeometricBound {
    type Output = GeometricBound;

    fn add(self, rhs: &GeometricBound) -> GeometricBound {
        GeometricBound {
            coefficients: &self.coefficients + &rhs.coefficients,
            constant: constant_sum(self.constant, rhs.constant),
            decay: self.decay.min(rhs.decay),
        }
    }
}

impl Sub for &GeometricBound {
    type Output = GeometricBound;

    fn sub(self, rhs: &GeometricBound) -> GeometricBound {
        GeometricBound {
            coefficients: &self.coefficients - &rhs.coefficients,
            constant: constant_sum(self.constant, rhs.constant),
            decay: self.decay.min(rhs.decay),
        }
    }
}

impl Add for GeometricBound {
    type Output = GeometricBound;

    fn add(self, rhs: GeometricBound) -> GeometricBound {
        &self + &rhs
    }
}

impl Sub for GeometricBound {
    type Output = GeometricBound;

    fn sub(self, rhs: GeometricBound) -> GeometricBound {
        &self - &rhs
    }
}

impl AddAssign<&GeometricBound> for GeometricBound {
    fn add_assign(&mut self, rhs: &GeometricBound) {
        self.coefficients += &rhs.coefficients;
        self.constant = constant_sum(self.constant, rhs.constant);
        self.decay = self.decay.min(rhs.decay);
    }
}

impl SubAssign<&GeometricBound> for GeometricBound {
    fn sub_assign(&mut self, rhs: &GeometricBound) {
        self.coefficients -= &rhs.coefficients;
        self.constant = constant_sum(self.constant, rhs.constant);
        self.decay = self.decay.min(rhs.decay);
    }
}

impl MulAssign<Interval> for GeometricBound {
    fn mul_assign(&mut self, s: Interval) {
        self.coefficients *= s;
        self.constant = (Interval::point(self.constant) * s.abs()).sup();
    }
}

impl Mul<Interval> for &GeometricBound {
    type Output = GeometricBound;

    fn mul(self, s: Interval) -> GeometricBound {
        let mut out = self.clone();
        out *= s;
        out
    }
}

impl Mul<&GeometricBound> for Interval {
    type Output = GeometricBound;

    fn mul(self, x: &GeometricBound) -> GeometricBound {
        x * self
    }
}

impl fmt::Display for GeometricBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{[")?;
        for (i, c) in self.coefficients.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{c}")?;
        }
        write!(f, "], C={:e}, q={}}}", self.constant, self.decay)
    }
}
