//! Closed intervals of `f64` with outward rounding.
//!
//! Every arithmetic result encloses the exact real result. Rounding is
//! detected with error-free transformations (two-sum, fused multiply-add)
//! so exact operations stay thin; inexact ones move the affected endpoint
//! one ulp outward. `exp` and `ln` rely on the platform libm and are
//! widened by two ulps on each side.

use num_traits::{One, Zero};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Sub, SubAssign};

/// Below this magnitude the FMA residual may underflow; widen unconditionally.
const TINY: f64 = 1e-290;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    lo: f64,
    hi: f64,
}

pub(crate) fn next_up(x: f64) -> f64 {
    if x.is_nan() || x == f64::INFINITY {
        return x;
    }
    if x == 0.0 {
        return f64::from_bits(1);
    }
    let bits = x.to_bits();
    if x > 0.0 {
        f64::from_bits(bits + 1)
    } else {
        f64::from_bits(bits - 1)
    }
}

pub(crate) fn next_down(x: f64) -> f64 {
    -next_up(-x)
}

fn overflowed(s: f64, a: f64, b: f64) -> bool {
    s.is_infinite() && a.is_finite() && b.is_finite()
}

fn two_sum_error(a: f64, b: f64, s: f64) -> f64 {
    let bb = s - a;
    (a - (s - bb)) + (b - bb)
}

fn add_down(a: f64, b: f64) -> f64 {
    let s = a + b;
    if !s.is_finite() {
        return if overflowed(s, a, b) && s > 0.0 { f64::MAX } else { s };
    }
    if two_sum_error(a, b, s) < 0.0 {
        next_down(s)
    } else {
        s
    }
}

fn add_up(a: f64, b: f64) -> f64 {
    let s = a + b;
    if !s.is_finite() {
        return if overflowed(s, a, b) && s < 0.0 { f64::MIN } else { s };
    }
    if two_sum_error(a, b, s) > 0.0 {
        next_up(s)
    } else {
        s
    }
}

fn sub_down(a: f64, b: f64) -> f64 {
    add_down(a, -b)
}

fn sub_up(a: f64, b: f64) -> f64 {
    add_up(a, -b)
}

fn mul_down(a: f64, b: f64) -> f64 {
    let p = a * b;
    if p.is_nan() {
        // 0 * inf: the endpoint product contributes nothing
        return 0.0;
    }
    if !p.is_finite() {
        return if overflowed(p, a, b) && p > 0.0 { f64::MAX } else { p };
    }
    if p.abs() < TINY {
        return if a == 0.0 || b == 0.0 { 0.0 } else { next_down(p) };
    }
    if a.mul_add(b, -p) < 0.0 {
        next_down(p)
    } else {
        p
    }
}

fn mul_up(a: f64, b: f64) -> f64 {
    let p = a * b;
    if p.is_nan() {
        return 0.0;
    }
    if !p.is_finite() {
        return if overflowed(p, a, b) && p < 0.0 { f64::MIN } else { p };
    }
    if p.abs() < TINY {
        return if a == 0.0 || b == 0.0 { 0.0 } else { next_up(p) };
    }
    if a.mul_add(b, -p) > 0.0 {
        next_up(p)
    } else {
        p
    }
}

/// Sign of the exact residual `a/b - q`, given `q = fl(a/b)`.
fn division_residual(a: f64, b: f64, q: f64) -> f64 {
    let r = (-q).mul_add(b, a);
    if b > 0.0 {
        r
    } else {
        -r
    }
}

fn div_down(a: f64, b: f64) -> f64 {
    let q = a / b;
    if q.is_nan() {
        return f64::NEG_INFINITY;
    }
    if !q.is_finite() {
        return if overflowed(q, a, b) && q > 0.0 { f64::MAX } else { q };
    }
    if q.abs() < TINY {
        return if a == 0.0 { 0.0 } else { next_down(q) };
    }
    if division_residual(a, b, q) < 0.0 {
        next_down(q)
    } else {
        q
    }
}

fn div_up(a: f64, b: f64) -> f64 {
    let q = a / b;
    if q.is_nan() {
        return f64::INFINITY;
    }
    if !q.is_finite() {
        return if overflowed(q, a, b) && q < 0.0 { f64::MIN } else { q };
    }
    if q.abs() < TINY {
        return if a == 0.0 { 0.0 } else { next_up(q) };
    }
    if division_residual(a, b, q) > 0.0 {
        next_up(q)
    } else {
        q
    }
}

fn sqrt_down(a: f64) -> f64 {
    let s = a.sqrt();
    if s == 0.0 || !s.is_finite() {
        return s;
    }
    if (-s).mul_add(s, a) < 0.0 {
        next_down(s)
    } else {
        s
    }
}

fn sqrt_up(a: f64) -> f64 {
    let s = a.sqrt();
    if s == 0.0 || !s.is_finite() {
        return s;
    }
    if (-s).mul_add(s, a) > 0.0 {
        next_up(s)
    } else {
        s
    }
}

fn pow_point(x: f64, mut n: u32) -> Interval {
    let mut base = Interval::point(x);
    let mut acc = Interval::ONE;
    while n > 0 {
        if n & 1 == 1 {
            acc *= base;
        }
        base = base * base;
        n >>= 1;
    }
    acc
}

impl Interval {
    pub const ZERO: Interval = Interval { lo: 0.0, hi: 0.0 };
    pub const ONE: Interval = Interval { lo: 1.0, hi: 1.0 };

    /// Interval `[lo, hi]`. Endpoints out of order are swapped.
    pub fn new(lo: f64, hi: f64) -> Self {
        if lo <= hi {
            Self { lo, hi }
        } else {
            Self { lo: hi, hi: lo }
        }
    }

    pub fn point(x: f64) -> Self {
        Self { lo: x, hi: x }
    }

    /// `[-|r|, |r|]`
    pub fn symmetric(r: f64) -> Self {
        let r = r.abs();
        Self { lo: -r, hi: r }
    }

    pub fn entire() -> Self {
        Self {
            lo: f64::NEG_INFINITY,
            hi: f64::INFINITY,
        }
    }

    /// Enclosure of Euler's number.
    pub fn euler() -> Self {
        let e = std::f64::consts::E;
        Self {
            lo: next_down(e),
            hi: next_up(e),
        }
    }

    pub fn inf(self) -> f64 {
        self.lo
    }

    pub fn sup(self) -> f64 {
        self.hi
    }

    pub fn mid(self) -> f64 {
        if self.lo.is_finite() && self.hi.is_finite() {
            0.5 * self.lo + 0.5 * self.hi
        } else if self.lo.is_finite() {
            f64::MAX
        } else if self.hi.is_finite() {
            f64::MIN
        } else {
            0.0
        }
    }

    /// Upper bound of the radius around `mid()`.
    pub fn rad(self) -> f64 {
        let m = self.mid();
        sub_up(self.hi, m).max(sub_up(m, self.lo))
    }

    /// Upper bound of `hi - lo`.
    pub fn width(self) -> f64 {
        sub_up(self.hi, self.lo)
    }

    /// Magnitude `max |x|`.
    pub fn mag(self) -> f64 {
        self.lo.abs().max(self.hi.abs())
    }

    /// Mignitude `min |x|`.
    pub fn mig(self) -> f64 {
        if self.contains_zero() {
            0.0
        } else {
            self.lo.abs().min(self.hi.abs())
        }
    }

    pub fn is_thin(self) -> bool {
        self.lo == self.hi
    }

    pub fn contains(self, x: f64) -> bool {
        self.lo <= x && x <= self.hi
    }

    pub fn contains_zero(self) -> bool {
        self.contains(0.0)
    }

    pub fn subset(self, other: Interval) -> bool {
        other.lo <= self.lo && self.hi <= other.hi
    }

    pub fn subset_interior(self, other: Interval) -> bool {
        other.lo < self.lo && self.hi < other.hi
    }

    /// `None` when the intervals are disjoint.
    pub fn intersection(self, other: Interval) -> Option<Interval> {
        let lo = self.lo.max(other.lo);
        let hi = self.hi.min(other.hi);
        if lo <= hi {
            Some(Self { lo, hi })
        } else {
            None
        }
    }

    pub fn hull(self, other: Interval) -> Interval {
        Self {
            lo: self.lo.min(other.lo),
            hi: self.hi.max(other.hi),
        }
    }

    /// Splits into a thin midpoint and a deviation interval so that
    /// `center + deviation` contains `self`.
    pub fn split(self) -> (Interval, Interval) {
        let m = self.mid();
        (
            Self::point(m),
            Self {
                lo: sub_down(self.lo, m),
                hi: sub_up(self.hi, m),
            },
        )
    }

    pub fn abs(self) -> Interval {
        if self.lo >= 0.0 {
            self
        } else if self.hi <= 0.0 {
            -self
        } else {
            Self {
                lo: 0.0,
                hi: self.mag(),
            }
        }
    }

    pub fn max(self, other: Interval) -> Interval {
        Self {
            lo: self.lo.max(other.lo),
            hi: self.hi.max(other.hi),
        }
    }

    pub fn min(self, other: Interval) -> Interval {
        Self {
            lo: self.lo.min(other.lo),
            hi: self.hi.min(other.hi),
        }
    }

    pub fn sqr(self) -> Interval {
        let a = self.abs();
        Self {
            lo: mul_down(a.lo, a.lo),
            hi: mul_up(a.hi, a.hi),
        }
    }

    pub fn recip(self) -> Interval {
        Interval::ONE / self
    }

    pub fn powi(self, n: i32) -> Interval {
        if n == 0 {
            return Interval::ONE;
        }
        if n < 0 {
            return self.powi(-n).recip();
        }
        let n = n as u32;
        if n % 2 == 0 {
            let a = self.abs();
            Self {
                lo: pow_point(a.lo, n).lo,
                hi: pow_point(a.hi, n).hi,
            }
        } else {
            Self {
                lo: pow_point(self.lo, n).lo,
                hi: pow_point(self.hi, n).hi,
            }
        }
    }

    /// Square root of the non-negative part.
    pub fn sqrt(self) -> Interval {
        let lo = self.lo.max(0.0);
        let hi = self.hi.max(0.0);
        Self {
            lo: sqrt_down(lo),
            hi: sqrt_up(hi),
        }
    }

    pub fn exp(self) -> Interval {
        let lo = next_down(next_down(self.lo.exp())).max(0.0);
        let hi = next_up(next_up(self.hi.exp()));
        Self { lo, hi }
    }

    /// Natural logarithm of the positive part.
    pub fn ln(self) -> Interval {
        let lo = if self.lo > 0.0 {
            next_down(next_down(self.lo.ln()))
        } else {
            f64::NEG_INFINITY
        };
        let hi = if self.hi > 0.0 {
            next_up(next_up(self.hi.ln()))
        } else {
            f64::NEG_INFINITY
        };
        Self { lo, hi }
    }
}

impl Default for Interval {
    fn default() -> Self {
        Interval::ZERO
    }
}

impl From<f64> for Interval {
    fn from(x: f64) -> Self {
        Interval::point(x)
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:e}, {:e}]", self.lo, self.hi)
    }
}

impl Zero for Interval {
    fn zero() -> Self {
        Interval::ZERO
    }

    fn is_zero(&self) -> bool {
        self.lo == 0.0 && self.hi == 0.0
    }
}

impl One for Interval {
    fn one() -> Self {
        Interval::ONE
    }
}

impl Neg for Interval {
    type Output = Interval;

    fn neg(self) -> Interval {
        Self {
            lo: -self.hi,
            hi: -self.lo,
        }
    }
}

impl Add for Interval {
    type Output = Interval;

    fn add(self, rhs: Interval) -> Interval {
        Self {
            lo: add_down(self.lo, rhs.lo),
            hi: add_up(self.hi, rhs.hi),
        }
    }
}

impl Sub for Interval {
    type Output = Interval;

    fn sub(self, rhs: Interval) -> Interval {
        Self {
            lo: sub_down(self.lo, rhs.hi),
            hi: sub_up(self.hi, rhs.lo),
        }
    }
}

impl Mul for Interval {
    type Output = Interval;

    fn mul(self, rhs: Interval) -> Interval {
        let (a, b, c, d) = (self.lo, self.hi, rhs.lo, rhs.hi);
        let lo = mul_down(a, c)
            .min(mul_down(a, d))
            .min(mul_down(b, c))
            .min(mul_down(b, d));
        let hi = mul_up(a, c)
            .max(mul_up(a, d))
            .max(mul_up(b, c))
            .max(mul_up(b, d));
        Self { lo, hi }
    }
}

impl Div for Interval {
    type Output = Interval;

    fn div(self, rhs: Interval) -> Interval {
        if rhs.contains_zero() {
            return Interval::entire();
        }
        let (a, b, c, d) = (self.lo, self.hi, rhs.lo, rhs.hi);
        let lo = div_down(a, c)
            .min(div_down(a, d))
            .min(div_down(b, c))
            .min(div_down(b, d));
        let hi = div_up(a, c)
            .max(div_up(a, d))
            .max(div_up(b, c))
            .max(div_up(b, d));
        Self { lo, hi }
    }
}

macro_rules! scalar_ops {
    ($($tr:ident $method:ident $assign_tr:ident $assign_method:ident),*) => {$(
        impl $tr<f64> for Interval {
            type Output = Interval;

            fn $method(self, rhs: f64) -> Interval {
                $tr::$method(self, Interval::point(rhs))
            }
        }

        impl $tr<Interval> for f64 {
            type Output = Interval;

            fn $method(self, rhs: Interval) -> Interval {
                $tr::$method(Interval::point(self), rhs)
            }
        }

        impl $assign_tr for Interval {
            fn $assign_method(&mut self, rhs: Interval) {
                *self = $tr::$method(*self, rhs);
            }
        }

        impl $assign_tr<f64> for Interval {
            fn $assign_method(&mut self, rhs: f64) {
                *self = $tr::$method(*self, Interval::point(rhs));
            }
        }
    )*};
}

scalar_ops!(
    Add add AddAssign add_assign,
    Sub sub SubAssign sub_assign,
    Mul mul MulAssign mul_assign,
    Div div DivAssign div_assign
);

impl std::iter::Sum for Interval {
    fn sum<I: Iterator<Item = Interval>>(iter: I) -> Interval {
        iter.fold(Interval::ZERO, |acc, x| acc + x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_operations_stay_thin() {
        let a = Interval::point(1.5);
        let b = Interval::point(0.25);
        assert!((a + b).is_thin());
        assert!((a * b).is_thin());
        assert!((a / b).is_thin());
        assert_eq!((a - b).inf(), 1.25);
    }

    #[test]
    fn inexact_operations_enclose_the_true_value() {
        let third = Interval::ONE / Interval::point(3.0);
        assert!(third.inf() < third.sup());
        let back = third * 3.0;
        assert!(back.contains(1.0));

        let tenth = Interval::point(0.1);
        let sum = tenth + tenth + tenth;
        assert!(sum.contains(0.30000000000000004));
        assert!(sum.width() > 0.0);
    }

    #[test]
    fn division_by_interval_containing_zero_is_entire() {
        let r = Interval::ONE / Interval::new(-1.0, 1.0);
        assert_eq!(r.inf(), f64::NEG_INFINITY);
        assert_eq!(r.sup(), f64::INFINITY);
    }

    #[test]
    fn split_recombines_to_a_superset() {
        let x = Interval::new(0.1, 0.7);
        let (c, d) = x.split();
        assert!(c.is_thin());
        assert!(x.subset(c + d));
        assert!(d.contains_zero());
    }

    #[test]
    fn even_powers_of_sign_changing_intervals_are_non_negative() {
        let x = Interval::new(-2.0, 1.0);
        let p = x.powi(2);
        assert_eq!(p.inf(), 0.0);
        assert!(p.contains(4.0));
        let c = x.powi(3);
        assert!(c.contains(-8.0) && c.contains(1.0));
        let inv = Interval::point(2.0).powi(-2);
        assert!(inv.contains(0.25));
    }

    #[test]
    fn transcendental_functions_enclose_libm_values() {
        let x = Interval::new(0.5, 1.0);
        let e = x.exp();
        assert!(e.contains(0.5f64.exp()) && e.contains(1.0f64.exp()));
        let l = x.ln();
        assert!(l.contains(0.5f64.ln()) && l.contains(0.0));
        let s = Interval::point(2.0).sqrt();
        assert!(s.contains(std::f64::consts::SQRT_2));
        assert!(Interval::euler().contains(std::f64::consts::E));
    }

    #[test]
    fn interior_inclusion_is_strict() {
        let outer = Interval::new(-1.0, 1.0);
        assert!(Interval::new(-0.5, 0.5).subset_interior(outer));
        assert!(!Interval::new(-1.0, 0.5).subset_interior(outer));
        assert!(Interval::new(-1.0, 0.5).subset(outer));
        assert!(outer.intersection(Interval::new(2.0, 3.0)).is_none());
    }
}
