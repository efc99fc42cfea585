//! Matrix engine.
//!
//! # Kinds
//!
//! - [`Dense`]: row-major, every element materialised, buffers pooled.
//! - [`Sparse`]: compressed sparse rows, only non-zeros stored.
//! - [`DenseView`]: a borrowed reshaped window over a `Dense`.
//!
//! [`Matrix`] is the closed sum of the two owning kinds and is what flows
//! between operators. The kind only decides storage: a sparse matrix gives
//! the same logical result as its dense image for every operation,
//! implicit zeros included.
//!
//! # Broadcast rule
//!
//! A binary element-wise operation accepts, checked in this order:
//!
//! 1. identical shapes;
//! 2. two vectors (any orientation) of the same size, the result taking the
//!    left operand's shape;
//! 3. a vector whose size equals the row count of a matrix, applied to
//!    every column of that row (the result takes the matrix's shape).
//!
//! Everything else is [`Error::DimensionMismatch`]. In-place operations
//! additionally require the receiver to be the larger operand.
//!
//! # Example
//!
//! ```rust
//! use briny_grad::mat::{Dense, Matrix};
//!
//! let a = Matrix::from(Dense::new(2, 2, &[1.0, 2.0, 3.0, 4.0]).unwrap());
//! let b = Matrix::from(Dense::vec(&[10.0, 20.0]));
//! let c = a.add(&b).unwrap();
//! assert_eq!(c.to_dense().data(), &[11.0, 12.0, 23.0, 24.0]);
//! ```

mod dense;
pub mod encoding;
mod format;
mod linalg;
mod sparse;

use std::borrow::Cow;

pub use dense::{Dense, DenseView};
pub use sparse::Sparse;

use crate::error::{Error, PoolError, Result};

/// How two operand shapes line up for an element-wise operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Broadcast {
    Same,
    Vectors,
    /// The left operand is a vector spread over the rows of the right one.
    LhsAcrossRows,
    /// The right operand is a vector spread over the rows of the left one.
    RhsAcrossRows,
}

const fn is_vector(dims: (usize, usize)) -> bool {
    dims.0 == 1 || dims.1 == 1
}

pub(crate) fn broadcast(op: &'static str, a: (usize, usize), b: (usize, usize)) -> Result<Broadcast> {
    let (sa, sb) = (a.0 * a.1, b.0 * b.1);
    if a == b {
        Ok(Broadcast::Same)
    } else if is_vector(a) && is_vector(b) && sa == sb {
        Ok(Broadcast::Vectors)
    } else if is_vector(a) && sa == b.0 {
        Ok(Broadcast::LhsAcrossRows)
    } else if is_vector(b) && sb == a.0 {
        Ok(Broadcast::RhsAcrossRows)
    } else {
        Err(Error::DimensionMismatch {
            op,
            lhs_rows: a.0,
            lhs_cols: a.1,
            rhs_rows: b.0,
            rhs_cols: b.1,
        })
    }
}

/// Whether two shapes satisfy the broadcast rule.
#[must_use]
pub fn compatible(a: (usize, usize), b: (usize, usize)) -> bool {
    broadcast("compatible", a, b).is_ok()
}

/// A dense or sparse matrix.
#[derive(Debug, Clone, PartialEq)]
pub enum Matrix {
    /// Row-major, fully materialised.
    Dense(Dense),
    /// Compressed sparse rows.
    Sparse(Sparse),
}

impl From<Dense> for Matrix {
    fn from(d: Dense) -> Self {
        Self::Dense(d)
    }
}

impl From<Sparse> for Matrix {
    fn from(s: Sparse) -> Self {
        Self::Sparse(s)
    }
}

macro_rules! dispatch {
    ($self:expr, $m:ident => $body:expr) => {
        match $self {
            Matrix::Dense($m) => $body,
            Matrix::Sparse($m) => $body,
        }
    };
}

impl Matrix {
    /// Number of rows.
    #[must_use]
    pub const fn rows(&self) -> usize {
        match self {
            Self::Dense(d) => d.rows(),
            Self::Sparse(s) => s.rows(),
        }
    }

    /// Number of columns.
    #[must_use]
    pub const fn cols(&self) -> usize {
        match self {
            Self::Dense(d) => d.cols(),
            Self::Sparse(s) => s.cols(),
        }
    }

    /// `(rows, cols)`.
    #[must_use]
    pub const fn dims(&self) -> (usize, usize) {
        (self.rows(), self.cols())
    }

    /// `rows * cols`.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.rows() * self.cols()
    }

    /// A single row or column.
    #[must_use]
    pub const fn is_vector(&self) -> bool {
        is_vector(self.dims())
    }

    /// Exactly one element.
    #[must_use]
    pub const fn is_scalar(&self) -> bool {
        self.rows() == 1 && self.cols() == 1
    }

    /// Whether this is the sparse kind.
    #[must_use]
    pub const fn is_sparse(&self) -> bool {
        matches!(self, Self::Sparse(_))
    }

    /// Element at `(i, j)`.
    ///
    /// # Errors
    ///
    /// [`Error::OutOfRange`] for an index outside the matrix.
    pub fn at(&self, i: usize, j: usize) -> Result<f32> {
        match self {
            Self::Dense(d) => {
                if i >= d.rows() || j >= d.cols() {
                    return Err(Error::OutOfRange {
                        op: "Matrix::at",
                        row: i,
                        col: j,
                        rows: d.rows(),
                        cols: d.cols(),
                    });
                }
                Ok(d.at(i, j))
            }
            Self::Sparse(s) => s.at(i, j),
        }
    }

    /// The only element of a 1x1 matrix.
    ///
    /// # Errors
    ///
    /// [`Error::NotScalar`] otherwise.
    pub fn scalar_value(&self) -> Result<f32> {
        match self {
            Self::Dense(d) => d.scalar_value(),
            Self::Sparse(s) => {
                if s.rows() != 1 || s.cols() != 1 {
                    return Err(Error::NotScalar {
                        op: "Matrix::scalar_value",
                        rows: s.rows(),
                        cols: s.cols(),
                    });
                }
                s.at(0, 0)
            }
        }
    }

    /// Dense copy (pooled).
    #[must_use]
    pub fn to_dense(&self) -> Dense {
        match self {
            Self::Dense(d) => d.clone(),
            Self::Sparse(s) => s.to_dense(),
        }
    }

    /// Borrows a dense matrix, densifying a sparse one.
    #[must_use]
    pub fn dense(&self) -> Cow<'_, Dense> {
        match self {
            Self::Dense(d) => Cow::Borrowed(d),
            Self::Sparse(s) => Cow::Owned(s.to_dense()),
        }
    }

    /// Consumes the matrix into a dense one.
    #[must_use]
    pub fn into_dense(self) -> Dense {
        match self {
            Self::Dense(d) => d,
            Self::Sparse(s) => s.to_dense(),
        }
    }

    /// Zero matrix of the same kind and shape.
    #[must_use]
    pub fn zeros_like(&self) -> Self {
        match self {
            Self::Dense(d) => d.zeros_like().into(),
            Self::Sparse(s) => Sparse::zeros(s.rows(), s.cols()).into(),
        }
    }

    /// Transpose.
    #[must_use]
    pub fn t(&self) -> Self {
        dispatch!(self, m => m.t().into())
    }

    /// `self + other`. Dense wins whenever either side is dense.
    ///
    /// Mixed-kind operands follow the same broadcast rule as dense ones, so
    /// the result always takes the left operand's shape for two vectors.
    ///
    /// # Errors
    ///
    /// [`Error::DimensionMismatch`] if the shapes are not broadcast-compatible.
    pub fn add(&self, other: &Self) -> Result<Self> {
        Ok(match (self, other) {
            (Self::Dense(a), Self::Dense(b)) => a.add(b)?.into(),
            (Self::Sparse(a), Self::Sparse(b)) => a.add(b)?.into(),
            (Self::Sparse(a), Self::Dense(b)) => a.add_dense(b)?.into(),
            (Self::Dense(a), Self::Sparse(b)) if a.dims() == b.dims() => b.add_dense(a)?.into(),
            (Self::Dense(a), Self::Sparse(b)) => a.add(&b.to_dense())?.into(),
        })
    }

    /// `self - other`.
    ///
    /// # Errors
    ///
    /// [`Error::DimensionMismatch`] if the shapes are not broadcast-compatible.
    pub fn sub(&self, other: &Self) -> Result<Self> {
        Ok(match (self, other) {
            (Self::Dense(a), Self::Dense(b)) => a.sub(b)?.into(),
            (Self::Sparse(a), Self::Sparse(b)) => a.sub(b)?.into(),
            (Self::Sparse(a), Self::Dense(b)) => a.sub_dense(b)?.into(),
            (Self::Dense(a), Self::Sparse(b)) => a.sub(&b.to_dense())?.into(),
        })
    }

    /// Element-wise product; sparse whenever either side is sparse.
    ///
    /// # Errors
    ///
    /// [`Error::DimensionMismatch`] if the shapes are not broadcast-compatible.
    pub fn prod(&self, other: &Self) -> Result<Self> {
        Ok(match (self, other) {
            (Self::Dense(a), Self::Dense(b)) => a.prod(b)?.into(),
            (Self::Sparse(a), Self::Sparse(b)) => a.prod(b)?.into(),
            (Self::Sparse(a), Self::Dense(b)) => a.prod_dense(b)?.into(),
            (Self::Dense(a), Self::Sparse(b)) if a.dims() == b.dims() => b.prod_dense(a)?.into(),
            (Self::Dense(a), Self::Sparse(b)) => Sparse::from_dense(&a.prod(&b.to_dense())?).into(),
        })
    }

    /// Element-wise quotient.
    ///
    /// # Errors
    ///
    /// [`Error::DimensionMismatch`] if the shapes are not broadcast-compatible.
    pub fn div(&self, other: &Self) -> Result<Self> {
        Ok(match (self, other) {
            (Self::Sparse(a), Self::Dense(b)) => a.div_dense(b)?.into(),
            _ => self.dense().div(&other.dense())?.into(),
        })
    }

    /// Element-wise maximum.
    ///
    /// # Errors
    ///
    /// [`Error::DimensionMismatch`] if the shapes are not broadcast-compatible.
    pub fn maximum(&self, other: &Self) -> Result<Self> {
        Ok(match (self, other) {
            (Self::Sparse(a), Self::Sparse(b)) => a.maximum(b)?.into(),
            _ => self.dense().maximum(&other.dense())?.into(),
        })
    }

    /// Element-wise minimum.
    ///
    /// # Errors
    ///
    /// [`Error::DimensionMismatch`] if the shapes are not broadcast-compatible.
    pub fn minimum(&self, other: &Self) -> Result<Self> {
        Ok(match (self, other) {
            (Self::Sparse(a), Self::Sparse(b)) => a.minimum(b)?.into(),
            _ => self.dense().minimum(&other.dense())?.into(),
        })
    }

    /// Accumulates `other` into `self`, reusing the dense buffer when possible.
    ///
    /// # Errors
    ///
    /// [`Error::DimensionMismatch`] if `other` cannot broadcast into `self`.
    pub fn add_assign(&mut self, other: &Self) -> Result<()> {
        if let Self::Dense(a) = self {
            match other {
                Self::Dense(b) => {
                    a.add_in_place(b)?;
                    return Ok(());
                }
                Self::Sparse(b) if a.dims() == b.dims() => {
                    let cols = a.cols();
                    let dst = a.data_mut();
                    b.do_non_zero(|i, j, v| dst[i * cols + j] += v);
                    return Ok(());
                }
                Self::Sparse(_) => {}
            }
        }
        *self = self.add(other)?;
        Ok(())
    }

    /// Adds `n` to every element; always dense.
    #[must_use]
    pub fn add_scalar(&self, n: f32) -> Self {
        dispatch!(self, m => m.add_scalar(n).into())
    }

    /// Subtracts `n` from every element; always dense.
    #[must_use]
    pub fn sub_scalar(&self, n: f32) -> Self {
        dispatch!(self, m => m.sub_scalar(n).into())
    }

    /// Multiplies every element by `n`, keeping the kind.
    #[must_use]
    pub fn prod_scalar(&self, n: f32) -> Self {
        dispatch!(self, m => m.prod_scalar(n).into())
    }

    /// Divides every element by `n`, keeping the kind.
    #[must_use]
    pub fn div_scalar(&self, n: f32) -> Self {
        dispatch!(self, m => m.div_scalar(n).into())
    }

    /// Matrix product; the result is always dense.
    ///
    /// # Errors
    ///
    /// [`Error::DimensionMismatch`] unless `self.cols() == other.rows()`.
    pub fn mul(&self, other: &Self) -> Result<Self> {
        Ok(dispatch!(self, m => m.mul(other)?.into()))
    }

    /// Sum of all elements.
    #[must_use]
    pub fn sum(&self) -> f32 {
        dispatch!(self, m => m.sum())
    }

    /// Largest element.
    #[must_use]
    pub fn max(&self) -> f32 {
        dispatch!(self, m => m.max())
    }

    /// Smallest element.
    #[must_use]
    pub fn min(&self) -> f32 {
        dispatch!(self, m => m.min())
    }

    /// p-norm.
    #[must_use]
    pub fn norm(&self, p: f32) -> f32 {
        dispatch!(self, m => m.norm(p))
    }

    /// Absolute values, keeping the kind.
    #[must_use]
    pub fn abs(&self) -> Self {
        dispatch!(self, m => m.abs().into())
    }

    /// Clamps into `[lo, hi]` in place.
    pub fn clip_in_place(&mut self, lo: f32, hi: f32) -> &mut Self {
        match self {
            Self::Dense(d) => {
                d.clip_in_place(lo, hi);
            }
            Self::Sparse(s) => {
                s.clip_in_place(lo, hi);
            }
        }
        self
    }

    /// Calls `f(i, j, v)` for every non-zero element.
    pub fn do_non_zero(&self, f: impl FnMut(usize, usize, f32)) {
        dispatch!(self, m => m.do_non_zero(f));
    }

    /// Copy with a different shape.
    ///
    /// # Errors
    ///
    /// [`Error::LengthMismatch`] for a size change, [`Error::Unsupported`] for sparse input.
    pub fn reshape(&self, rows: usize, cols: usize) -> Result<Self> {
        Ok(dispatch!(self, m => m.reshape(rows, cols)?.into()))
    }

    /// Inverse of a dense square matrix.
    ///
    /// # Errors
    ///
    /// [`Error::NotSquare`] for non-square input, [`Error::Unsupported`] for sparse input.
    pub fn inverse(&self) -> Result<Self> {
        Ok(dispatch!(self, m => m.inverse()?.into()))
    }

    /// Same kind-independent shape and values within `tolerance`.
    #[must_use]
    pub fn equals_approx(&self, other: &Self, tolerance: f32) -> bool {
        self.dense().equals_approx(&other.dense(), tolerance)
    }

    /// Like [`Matrix::release`], but never fails: non-pooled buffers are dropped.
    pub fn recycle(self) {
        if let Self::Dense(d) = self {
            d.recycle();
        }
    }

    /// Hands a pooled dense buffer back to the global workspace.
    ///
    /// Sparse matrices are simply dropped.
    ///
    /// # Errors
    ///
    /// [`PoolError::NotPooled`] for a dense matrix that did not come from a pool.
    pub fn release(self) -> core::result::Result<(), PoolError> {
        match self {
            Self::Dense(d) => d.release(),
            Self::Sparse(_) => Ok(()),
        }
    }
}
