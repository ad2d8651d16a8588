use super::doubleton::orthonormal_basis;
use crate::error::{EnclosureStage, PdeError, Result};
use crate::interval::Interval;
use crate::linalg::{self, IMatrix, IVector};

/// The derivative of the flow on the leading modes as `D + C R0 + B R`.
///
/// Every column of `R0` and `R` is transported like the box of a
/// [`Doubleton`](super::Doubleton), so the same wrapping control applies
/// to the Jacobian.
#[derive(Debug, Clone, PartialEq)]
pub struct MatrixDoubleton {
    d: IMatrix,
    c: IMatrix,
    r0: IMatrix,
    b: IMatrix,
    inv_b: IMatrix,
    r: IMatrix,
}

impl MatrixDoubleton {
    pub fn identity(m: usize) -> Self {
        Self {
            d: linalg::identity(m),
            c: linalg::identity(m),
            r0: IMatrix::zeros(m, m),
            b: linalg::identity(m),
            inv_b: linalg::identity(m),
            r: IMatrix::zeros(m, m),
        }
    }

    pub fn d(&self) -> &IMatrix {
        &self.d
    }

    pub fn c(&self) -> &IMatrix {
        &self.c
    }

    pub fn r0(&self) -> &IMatrix {
        &self.r0
    }

    pub fn b(&self) -> &IMatrix {
        &self.b
    }

    pub fn inv_b(&self) -> &IMatrix {
        &self.inv_b
    }

    pub fn r(&self) -> &IMatrix {
        &self.r
    }

    /// Whole matrix `D + C R0 + B R`.
    pub fn value(&self) -> IMatrix {
        &self.d + &self.c * &self.r0 + &self.b * &self.r
    }

    /// Composition with `jac` from the left. `bound` holds an independent
    /// enclosure of the product and is intersected with the new value.
    pub fn image(&self, jac: &IMatrix, bound: &mut IMatrix) -> Result<MatrixDoubleton> {
        let d = jac * &self.d;
        let b_full = jac * &self.b;
        let c = jac * &self.c;

        let affine = &d + &c * &self.r0 + &b_full * &self.r;
        let rows = bound.nrows();
        for (k, (value, other)) in bound.iter_mut().zip(affine.iter()).enumerate() {
            *value = value
                .intersection(*other)
                .ok_or_else(|| PdeError::inconsistent(EnclosureStage::AffineUpdate, k % rows + 1))?;
        }

        let (d, delta_d) = linalg::split_matrix(&d);
        let (c, delta_c) = linalg::split_matrix(&c);
        let delta = delta_d + &delta_c * &self.r0;

        let spread = &self.r + &delta;
        let sizes: Vec<f64> = spread
            .row_iter()
            .map(|row| row.iter().fold(0.0f64, |m, v| m.max(v.mag())))
            .collect();
        let (b, inv_b) = orthonormal_basis(&b_full, &sizes);
        let r = (&inv_b * &b_full) * &self.r + &inv_b * &delta;

        Ok(MatrixDoubleton {
            d,
            c,
            r0: self.r0.clone(),
            b,
            inv_b,
            r,
        })
    }

    /// Adds `B^-1 v` to column `i` of `R`, i.e. `v` to column `i` of the value.
    pub(super) fn add_to_column(&mut self, i: usize, v: &IVector) {
        let shifted = &self.inv_b * v;
        let mut column = self.r.column_mut(i);
        column += shifted;
    }

    pub fn reorganize_if_needed(&mut self, factor: f64) -> bool {
        if linalg::matrix_max_diam(&self.r) <= factor * linalg::matrix_max_diam(&self.r0) {
            return false;
        }
        self.r0 = (&self.inv_b * &self.c) * &self.r0 + &self.r;
        self.c = self.b.clone();
        self.r.fill(Interval::ZERO);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DMatrix;

    fn points(rows: usize, data: &[f64]) -> IMatrix {
        linalg::from_points(&DMatrix::from_row_slice(rows, data.len() / rows, data))
    }

    #[test]
    fn image_encloses_the_product() {
        let start = MatrixDoubleton::identity(2);
        let jac = points(2, &[1.0, 2.0, 0.0, 1.0]).map(|x| x + Interval::symmetric(1e-3));
        let mut bound = &jac * &start.value();
        let image = start.image(&jac, &mut bound).expect("product");
        let value = image.value();
        for i in 0..2 {
            for j in 0..2 {
                assert!(value[(i, j)].contains(jac[(i, j)].mid()));
                assert!(bound[(i, j)].width() <= jac[(i, j)].width() + 1e-12);
            }
        }
        // the spread of the Jacobian went into R
        assert!(linalg::matrix_max_diam(image.r()) > 0.0);
        assert!(linalg::matrix_max_diam(image.r0()) == 0.0);
    }

    #[test]
    fn added_column_shows_in_the_value() {
        let mut doubleton = MatrixDoubleton::identity(2);
        let v = IVector::from_vec(vec![Interval::point(0.5), Interval::ZERO]);
        doubleton.add_to_column(1, &v);
        let value = doubleton.value();
        assert!(value[(0, 1)].contains(0.5));
        assert!(value[(1, 1)].contains(1.0));
    }

    #[test]
    fn reorganization_keeps_the_value() {
        let mut doubleton = MatrixDoubleton::identity(2);
        doubleton.r = IMatrix::from_element(2, 2, Interval::symmetric(0.1));
        let before = doubleton.value();
        assert!(doubleton.reorganize_if_needed(1.0));
        let after = doubleton.value();
        for (a, b) in before.iter().zip(after.iter()) {
            assert!(a.subset(*b));
        }
    }

    #[test]
    fn disjoint_bound_is_reported() {
        let start = MatrixDoubleton::identity(1);
        let mut bound = points(1, &[5.0]);
        let err = start
            .image(&points(1, &[1.0]), &mut bound)
            .expect_err("disjoint");
        assert!(err.to_string().contains("affine update at mode 1"));
    }
}
