//! Bounds on the blocks of the KS Jacobian split at mode `m`.
//!
//! `result` is `(m+1) x (m+1)`; rows and columns `0..m` refer to modes
//! `1..=m`, index `m` to the remaining modes.

use crate::geometric_bound::GeometricBound;
use crate::interval::Interval;
use crate::linalg::IMatrix;

fn scaled_magnitude(k: usize, x: Interval) -> f64 {
    (Interval::point(2.0 * k as f64) * x).abs().sup()
}

/// Explicit block with the logarithmic-norm diagonal `lambda_k + 2k a_2k`.
pub(super) fn dxx_norm(lambda: &[Interval], x: &GeometricBound, result: &mut IMatrix) {
    let m = result.nrows() - 1;
    for k in 1..=m {
        result[(k - 1, k - 1)] =
            lambda[k] + Interval::point(2.0 * k as f64) * x.coefficient(2 * k);
        for c in 1..k {
            let value = x.coefficient(k + c) - x.coefficient(k - c);
            result[(k - 1, c - 1)] = Interval::point(scaled_magnitude(k, value));
        }
        for c in k + 1..=m {
            let value = x.coefficient(k + c) + x.coefficient(c - k);
            result[(k - 1, c - 1)] = Interval::point(scaled_magnitude(k, value));
        }
    }
}

/// Last column: influence of the modes beyond `m` on each explicit mode.
pub(super) fn dxy_norm(x: &GeometricBound, result: &mut IMatrix) {
    let m = result.nrows() - 1;
    let n = x.dimension();
    let q = Interval::point(x.decay());
    let tail = Interval::point(2.0 * x.constant()) / q.powi(n as i32) / (q - Interval::ONE);
    for k in 1..=m {
        let mut s = tail;
        let mut c = m + 1;
        while c + k <= n {
            s += (x.coefficient(k + c) + x.coefficient(c - k)).abs();
            c += 1;
        }
        while c <= n + k {
            s += x.coefficient(c - k).abs();
            c += 1;
        }
        result[(k - 1, m)] = Interval::point(scaled_magnitude(k, s));
    }
}

/// Last row: influence of each explicit mode on the modes beyond `m`.
pub(super) fn dyx_norm(x: &GeometricBound, result: &mut IMatrix) {
    let m = result.nrows() - 1;
    let n = x.dimension();
    let q = Interval::point(x.decay());
    let monotone_from = q.ln().recip().sup().ceil();
    let k0 = (m + n).max(monotone_from as usize);
    for c in 1..=m {
        let mut bound = scaled_magnitude(k0, x.coefficient(k0 + c) - x.coefficient(k0 - c));
        for k in m + 1..k0 {
            bound = bound.max(scaled_magnitude(k, x.coefficient(k + c) - x.coefficient(k - c)));
        }
        result[(m, c - 1)] = Interval::point(bound);
    }
}

/// Upper bound of the logarithmic norm of the block acting on modes `> m`.
pub(super) fn dyy_logarithmic_norm(nu: Interval, x: &GeometricBound, m: usize) -> f64 {
    let l1 = x.l1_norm().sup();
    let k0 = 1 + (Interval::point(l1.max(0.5)) / nu).sup().ceil() as usize;
    let k0 = k0.max(m + 1);
    let d = Interval::point(4.0 * l1);
    let at = |k: usize| {
        let k = Interval::point(k as f64);
        let k2 = k.sqr();
        (k2 * (Interval::ONE - nu * k2) + k * d).sup()
    };
    (m + 1..k0).fold(at(k0), |bound, k| bound.max(at(k)))
}
