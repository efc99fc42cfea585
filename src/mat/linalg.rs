//! LU decomposition, inversion and augmentation of dense matrices.
//!
//! Decomposition uses partial pivoting by column. An exactly zero pivot is
//! not an error: elimination carries on and the resulting divisions by
//! zero propagate `Inf`/`NaN` into `U` and into any inverse built from it.

use super::Dense;
use crate::error::{Error, Result};

impl Dense {
    fn require_square(&self, op: &'static str) -> Result<usize> {
        if self.rows() != self.cols() {
            return Err(Error::NotSquare {
                op,
                rows: self.rows(),
                cols: self.cols(),
            });
        }
        Ok(self.rows())
    }

    /// Packed decomposition: unit-lower `L`, upper `U`, and the row order.
    ///
    /// `perm[k]` is the original row that ended up in position `k`, so
    /// `A[perm[k]] = (L·U)[k]`.
    pub(crate) fn lu_decompose(&self) -> Result<(Self, Self, Vec<usize>)> {
        let n = self.require_square("Dense::lu")?;
        let mut u = self.clone();
        let mut l = Self::zeros(n, n);
        let mut perm: Vec<usize> = (0..n).collect();

        for k in 0..n {
            let mut pivot = k;
            let mut best = u.at(k, k).abs();
            for i in k + 1..n {
                let v = u.at(i, k).abs();
                if v > best {
                    best = v;
                    pivot = i;
                }
            }
            if pivot != k {
                swap_rows(&mut u, k, pivot);
                swap_rows(&mut l, k, pivot);
                perm.swap(k, pivot);
            }
            let p = u.at(k, k);
            if p == 0.0 {
                log::warn!("lu: zero pivot in column {k}; result will contain Inf/NaN");
            }
            for i in k + 1..n {
                let factor = u.at(i, k) / p;
                l.set(i, k, factor);
                u.set(i, k, 0.0);
                for j in k + 1..n {
                    let v = u.at(i, j) - factor * u.at(k, j);
                    u.set(i, j, v);
                }
            }
        }
        for i in 0..n {
            l.set(i, i, 1.0);
        }
        Ok((l, u, perm))
    }

    /// LU decomposition with partial pivoting.
    ///
    /// Returns `(l, u, p)` such that `p · l · u` reconstructs `self`.
    ///
    /// # Errors
    ///
    /// [`Error::NotSquare`] for non-square input.
    pub fn lu(&self) -> Result<(Self, Self, Self)> {
        let (l, u, perm) = self.lu_decompose()?;
        let n = perm.len();
        let mut p = Self::zeros(n, n);
        for (k, &row) in perm.iter().enumerate() {
            p.set(row, k, 1.0);
        }
        Ok((l, u, p))
    }

    /// Matrix inverse via the LU factors.
    ///
    /// Each column `j` of the inverse solves `L·y = P·e_j` by forward
    /// substitution and then `U·x = y` by back substitution.
    ///
    /// # Errors
    ///
    /// [`Error::NotSquare`] for non-square input.
    pub fn inverse(&self) -> Result<Self> {
        let (l, u, perm) = self.lu_decompose()?;
        let n = perm.len();
        let mut out = Self::zeros(n, n);
        let mut y = vec![0.0_f32; n];
        for j in 0..n {
            for k in 0..n {
                let mut s = if perm[k] == j { 1.0 } else { 0.0 };
                for m in 0..k {
                    s -= l.at(k, m) * y[m];
                }
                y[k] = s;
            }
            for k in (0..n).rev() {
                let mut s = y[k];
                for m in k + 1..n {
                    s -= u.at(k, m) * out.at(m, j);
                }
                out.set(k, j, s / u.at(k, k));
            }
        }
        l.release()?;
        u.release()?;
        Ok(out)
    }

    /// `[A | I]`, the square matrix with an identity appended on the right.
    ///
    /// # Errors
    ///
    /// [`Error::NotSquare`] for non-square input.
    pub fn augment(&self) -> Result<Self> {
        let n = self.require_square("Dense::augment")?;
        let mut out = Self::zeros(n, 2 * n);
        for i in 0..n {
            out.data_mut()[i * 2 * n..i * 2 * n + n].copy_from_slice(&self.data()[i * n..(i + 1) * n]);
            out.set(i, n + i, 1.0);
        }
        Ok(out)
    }
}

fn swap_rows(m: &mut Dense, a: usize, b: usize) {
    let cols = m.cols();
    let data = m.data_mut();
    for j in 0..cols {
        data.swap(a * cols + j, b * cols + j);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mat::Matrix;
    use crate::random::SharedRng;

    fn product(a: &Dense, b: &Dense) -> Dense {
        a.mul(&Matrix::from(b.clone())).unwrap()
    }

    #[test]
    fn lu_reconstructs_input() {
        let a = Dense::new(3, 3, &[2.0, 1.0, 1.0, 4.0, -6.0, 0.0, -2.0, 7.0, 2.0]).unwrap();
        let (l, u, p) = a.lu().unwrap();
        for i in 0..3 {
            assert_eq!(l.at(i, i), 1.0);
            for j in i + 1..3 {
                assert_eq!(l.at(i, j), 0.0);
                assert_eq!(u.at(j, i), 0.0);
            }
        }
        let plu = product(&p, &product(&l, &u));
        assert!(plu.equals_approx(&a, 1e-5));
    }

    #[test]
    fn inverse_of_random_matrix() {
        let rng = SharedRng::seeded(42);
        // diagonally dominant, hence invertible
        let mut a = Dense::uniform(4, 4, -1.0, 1.0, &rng);
        for i in 0..4 {
            let v = a.at(i, i);
            a.set(i, i, v + 5.0);
        }
        let inv = a.inverse().unwrap();
        assert!(product(&inv, &a).equals_approx(&Dense::identity(4), 1e-4));

        let (l, u, p) = a.lu().unwrap();
        assert!(product(&p, &product(&l, &u)).equals_approx(&a, 1e-5));
    }

    #[test]
    fn pivoting_swaps_rows() {
        let a = Dense::new(2, 2, &[0.0, 1.0, 1.0, 0.0]).unwrap();
        let (_, _, p) = a.lu().unwrap();
        assert_eq!(p.data(), &[0.0, 1.0, 1.0, 0.0]);
        assert_eq!(a.inverse().unwrap(), a);
    }

    #[test]
    fn singular_propagates_non_finite() {
        let a = Dense::new(2, 2, &[1.0, 2.0, 2.0, 4.0]).unwrap();
        let inv = a.inverse().unwrap();
        assert!(inv.data().iter().any(|v| !v.is_finite()));
    }

    #[test]
    fn non_square_is_rejected() {
        let a = Dense::zeros(2, 3);
        assert!(matches!(a.lu(), Err(Error::NotSquare { .. })));
        assert!(matches!(a.inverse(), Err(Error::NotSquare { .. })));
        assert!(matches!(a.augment(), Err(Error::NotSquare { .. })));
    }

    #[test]
    fn augment_appends_identity() {
        let a = Dense::new(2, 2, &[1.0, 2.0, 3.0, 4.0]).unwrap();
        let g = a.augment().unwrap();
        assert_eq!(g.data(), &[1.0, 2.0, 1.0, 0.0, 3.0, 4.0, 0.0, 1.0]);
    }
}
