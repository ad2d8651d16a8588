//! Interval vectors and matrices on top of nalgebra.

use crate::error::{PdeError, Result};
use crate::interval::Interval;
use nalgebra::{DMatrix, DVector};

pub type IVector = DVector<Interval>;
pub type IMatrix = DMatrix<Interval>;

pub fn zeros(n: usize) -> IVector {
    IVector::from_element(n, Interval::ZERO)
}

pub fn identity(n: usize) -> IMatrix {
    IMatrix::identity(n, n)
}

pub fn midpoint(v: &IVector) -> IVector {
    v.map(|x| Interval::point(x.mid()))
}

pub fn mid_matrix(a: &IMatrix) -> DMatrix<f64> {
    a.map(|x| x.mid())
}

pub fn from_points(a: &DMatrix<f64>) -> IMatrix {
    a.map(Interval::point)
}

pub fn split_vector(v: &IVector) -> (IVector, IVector) {
    let parts: Vec<(Interval, Interval)> = v.iter().map(|x| x.split()).collect();
    (
        IVector::from_iterator(v.len(), parts.iter().map(|p| p.0)),
        IVector::from_iterator(v.len(), parts.iter().map(|p| p.1)),
    )
}

pub fn split_matrix(a: &IMatrix) -> (IMatrix, IMatrix) {
    (a.map(|x| x.split().0), a.map(|x| x.split().1))
}

/// Componentwise intersection, `None` if any coordinate is empty.
pub fn intersect(a: &IVector, b: &IVector) -> Option<IVector> {
    if a.len() != b.len() {
        return None;
    }
    let mut out = a.clone();
    for (o, y) in out.iter_mut().zip(b.iter()) {
        *o = o.intersection(*y)?;
    }
    Some(out)
}

/// Like [`intersect`] but reports the first empty coordinate.
pub fn intersect_or_mode(a: &IVector, b: &IVector) -> std::result::Result<IVector, usize> {
    let mut out = a.clone();
    for (i, (o, y)) in out.iter_mut().zip(b.iter()).enumerate() {
        *o = o.intersection(*y).ok_or(i)?;
    }
    Ok(out)
}

pub fn is_subset(a: &IVector, b: &IVector) -> bool {
    a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.subset(*y))
}

pub fn max_diam(v: &IVector) -> f64 {
    v.iter().fold(0.0f64, |m, x| m.max(x.width()))
}

pub fn matrix_max_diam(a: &IMatrix) -> f64 {
    a.iter().fold(0.0f64, |m, x| m.max(x.width()))
}

/// Upper bound of the row-sum (infinity) norm.
pub fn max_norm(a: &IMatrix) -> Interval {
    let mut norm = 0.0f64;
    for row in a.row_iter() {
        let s: Interval = row.iter().map(|x| Interval::point(x.mag())).sum();
        norm = norm.max(s.sup());
    }
    Interval::new(0.0, norm)
}

/// Rigorous enclosure of `A^-1` by interval Gauss-Jordan elimination with
/// pivoting on the largest mignitude.
pub fn inverse(a: &IMatrix) -> Result<IMatrix> {
    let n = a.nrows();
    if a.ncols() != n {
        return Err(PdeError::DimensionMismatch {
            context: "matrix inverse",
            expected: n,
            actual: a.ncols(),
        });
    }
    let mut m = a.clone();
    let mut inv = identity(n);
    for col in 0..n {
        let pivot_row = (col..n)
            .max_by(|&i, &j| m[(i, col)].mig().total_cmp(&m[(j, col)].mig()))
            .ok_or(PdeError::SingularMatrix)?;
        if m[(pivot_row, col)].contains_zero() {
            return Err(PdeError::SingularMatrix);
        }
        m.swap_rows(col, pivot_row);
        inv.swap_rows(col, pivot_row);

        let pivot = m[(col, col)];
        for j in 0..n {
            m[(col, j)] /= pivot;
            inv[(col, j)] /= pivot;
        }
        for i in 0..n {
            if i == col {
                continue;
            }
            let factor = m[(i, col)];
            if factor.is_thin() && factor.inf() == 0.0 {
                continue;
            }
            for j in 0..n {
                let mj = m[(col, j)];
                let ij = inv[(col, j)];
                m[(i, j)] -= factor * mj;
                inv[(i, j)] -= factor * ij;
            }
        }
    }
    Ok(inv)
}

const EXP_TAYLOR_TERMS: usize = 16;

/// Enclosure of `{exp(B) : B in A}` by scaling and squaring with a bounded
/// Taylor remainder.
pub fn matrix_exp(a: &IMatrix) -> IMatrix {
    let n = a.nrows();
    let norm = max_norm(a).sup();
    let mut squarings = 0u32;
    let mut scale = 1.0f64;
    while norm * scale > 0.5 {
        scale *= 0.5;
        squarings += 1;
    }
    let b = a * Interval::point(scale);
    let b_norm = Interval::point(norm) * scale;

    let mut result = identity(n);
    let mut term = identity(n);
    for k in 1..=EXP_TAYLOR_TERMS {
        term = (&term * &b) / Interval::point(k as f64);
        result += &term;
    }

    // |R| <= |B|^(K+1)/(K+1)! * 1/(1 - |B|/(K+2))
    let k1 = EXP_TAYLOR_TERMS + 1;
    let mut factorial = Interval::ONE;
    for k in 2..=k1 {
        factorial *= k as f64;
    }
    let tail = b_norm.powi(k1 as i32) / factorial
        / (Interval::ONE - b_norm / Interval::point((k1 + 1) as f64));
    let remainder = Interval::symmetric(tail.sup());
    result.iter_mut().for_each(|x| *x += remainder);

    for _ in 0..squarings {
        result = &result * &result;
    }
    result
}

/// Orthonormal basis from the QR decomposition of `b`, with columns
/// ordered by decreasing `|b_j| * size_j`. Returns the permuted Q.
pub fn pivoted_orthonormal_basis(b: &DMatrix<f64>, sizes: &[f64]) -> DMatrix<f64> {
    let n = b.ncols();
    let mut order: Vec<usize> = (0..n).collect();
    let weight = |j: usize| b.column(j).norm() * sizes.get(j).copied().unwrap_or(0.0);
    order.sort_by(|&i, &j| weight(j).total_cmp(&weight(i)));

    let mut permuted = DMatrix::zeros(b.nrows(), n);
    for (target, &source) in order.iter().enumerate() {
        permuted.set_column(target, &b.column(source));
    }
    permuted.qr().q()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point_matrix(rows: usize, cols: usize, data: &[f64]) -> IMatrix {
        from_points(&DMatrix::from_row_slice(rows, cols, data))
    }

    #[test]
    fn inverse_encloses_the_exact_inverse() {
        let a = point_matrix(2, 2, &[4.0, 7.0, 2.0, 6.0]);
        let inv = inverse(&a).expect("invertible");
        let expected = [0.6, -0.7, -0.2, 0.4];
        for (k, value) in expected.iter().enumerate() {
            assert!(inv[(k / 2, k % 2)].contains(*value) || inv[(k / 2, k % 2)].rad() < 1e-14);
        }
        let product = &a * &inv;
        for i in 0..2 {
            for j in 0..2 {
                assert!(product[(i, j)].contains(if i == j { 1.0 } else { 0.0 }));
            }
        }
    }

    #[test]
    fn inverse_rejects_singular_matrices() {
        let a = point_matrix(2, 2, &[1.0, 2.0, 2.0, 4.0]);
        assert_eq!(inverse(&a), Err(PdeError::SingularMatrix));
    }

    #[test]
    fn matrix_exp_of_diagonal_contains_scalar_exponentials() {
        let a = point_matrix(2, 2, &[-3.0, 0.0, 0.0, 0.5]);
        let e = matrix_exp(&a);
        assert!(e[(0, 0)].contains((-3.0f64).exp()));
        assert!(e[(1, 1)].contains(0.5f64.exp()));
        assert!(e[(0, 1)].contains(0.0));
        assert!(e[(0, 0)].width() < 1e-10);
    }

    #[test]
    fn pivoted_basis_is_orthonormal() {
        let b = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 0.0, 1e-3]);
        let q = pivoted_orthonormal_basis(&b, &[1e-8, 1.0]);
        let qtq = q.transpose() * &q;
        assert!((qtq - DMatrix::<f64>::identity(2, 2)).norm() < 1e-12);
    }

    #[test]
    fn max_norm_bounds_row_sums() {
        let a = point_matrix(2, 2, &[1.0, -2.0, 0.5, 0.25]);
        assert_eq!(max_norm(&a).sup(), 3.0);
    }
}
