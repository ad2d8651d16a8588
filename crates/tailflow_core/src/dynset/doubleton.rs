use crate::error::{EnclosureStage, PdeError, Result};
use crate::interval::Interval;
use crate::linalg::{self, IMatrix, IVector};

/// Affine enclosure `x + C r0 + B r` of finitely many coordinates.
///
/// `C r0` is the structured part, kept unchanged in shape across moves
/// apart from the image under the Jacobian; `B r` absorbs everything the
/// linearisation cannot represent. `current_set` is a box enclosing the
/// whole set.
#[derive(Debug, Clone, PartialEq)]
pub struct Doubleton {
    x: IVector,
    c: IMatrix,
    r0: IVector,
    b: IMatrix,
    inv_b: IMatrix,
    r: IVector,
    current_set: IVector,
}

/// Orthonormal `B` from the midpoint of `b_full`, with columns pivoted by
/// `sizes`, and an enclosure of its inverse. Falls back to the identity
/// when the enclosure of the inverse fails.
pub(super) fn orthonormal_basis(b_full: &IMatrix, sizes: &[f64]) -> (IMatrix, IMatrix) {
    let q = linalg::pivoted_orthonormal_basis(&linalg::mid_matrix(b_full), sizes);
    let b = linalg::from_points(&q);
    match linalg::inverse(&b) {
        Ok(inv_b) => (b, inv_b),
        Err(_) => {
            let n = b_full.nrows();
            (linalg::identity(n), linalg::identity(n))
        }
    }
}

impl Doubleton {
    /// The box `set` as `mid(set) + Id * (set - mid(set))`.
    pub fn new(set: &IVector) -> Self {
        let n = set.len();
        let (x, r0) = linalg::split_vector(set);
        Self {
            x,
            c: linalg::identity(n),
            r0,
            b: linalg::identity(n),
            inv_b: linalg::identity(n),
            r: linalg::zeros(n),
            current_set: set.clone(),
        }
    }

    pub fn from_parts(x: IVector, c: IMatrix, r0: IVector, b: IMatrix, r: IVector) -> Result<Self> {
        let n = x.len();
        let shapes = [
            ("structured shape C", c.nrows() * c.ncols(), n * r0.len()),
            ("box r0", c.ncols(), r0.len()),
            ("unstructured shape B", b.nrows() * b.ncols(), n * n),
            ("box r", r.len(), n),
        ];
        for (context, actual, expected) in shapes {
            if actual != expected {
                return Err(PdeError::DimensionMismatch {
                    context,
                    expected,
                    actual,
                });
            }
        }
        let inv_b = linalg::inverse(&b)?;
        let current_set = &x + &c * &r0 + &b * &r;
        Ok(Self {
            x,
            c,
            r0,
            b,
            inv_b,
            r,
            current_set,
        })
    }

    pub fn dimension(&self) -> usize {
        self.x.len()
    }

    pub fn center(&self) -> &IVector {
        &self.x
    }

    pub fn c(&self) -> &IMatrix {
        &self.c
    }

    pub fn r0(&self) -> &IVector {
        &self.r0
    }

    pub fn b(&self) -> &IMatrix {
        &self.b
    }

    pub fn inv_b(&self) -> &IMatrix {
        &self.inv_b
    }

    pub fn r(&self) -> &IVector {
        &self.r
    }

    pub fn current_set(&self) -> &IVector {
        &self.current_set
    }

    pub(super) fn current_set_mut(&mut self) -> &mut IVector {
        &mut self.current_set
    }

    /// Image of the set under a map that sends `x0` into `phi + rem` and
    /// whose derivative over the set is enclosed by `jac`.
    pub fn affine_image(
        &self,
        x0: &IVector,
        phi: &IVector,
        rem: &IVector,
        jac: &IMatrix,
    ) -> Result<Doubleton> {
        let delta_x = &self.current_set - x0;
        let delta_y = &self.x - x0;

        let mut x = phi + rem;
        let bound = &x + jac * &delta_x;
        x += jac * &delta_y;
        let c = jac * &self.c;
        let b_full = jac * &self.b;
        let affine = &x + &c * &self.r0 + &b_full * &self.r;
        let current_set = linalg::intersect_or_mode(&bound, &affine)
            .map_err(|i| PdeError::inconsistent(EnclosureStage::AffineUpdate, i + 1))?;

        let (c, delta_c) = linalg::split_matrix(&c);
        let (x, mut y) = linalg::split_vector(&x);
        y += &delta_c * &self.r0;

        let sizes: Vec<f64> = (&self.r + &y).iter().map(|v| v.width()).collect();
        let (b, inv_b) = orthonormal_basis(&b_full, &sizes);
        let r = (&inv_b * &b_full) * &self.r + &inv_b * &y;

        Ok(Doubleton {
            x,
            c,
            r0: self.r0.clone(),
            b,
            inv_b,
            r,
            current_set,
        })
    }

    /// Moves `B r` into the structured part when `r` has outgrown `r0` by
    /// more than `factor`. Returns whether it did.
    pub fn reorganize_if_needed(&mut self, factor: f64) -> bool {
        if linalg::max_diam(&self.r) <= factor * linalg::max_diam(&self.r0) {
            return false;
        }
        self.r0 = (&self.inv_b * &self.c) * &self.r0 + &self.r;
        self.c = self.b.clone();
        self.r.fill(Interval::ZERO);
        true
    }
}
