//! Row-major dense matrices.
//!
//! A [`Dense`] owns a buffer that normally comes from the global
//! [`Workspace`]. Only the first `rows * cols` elements are visible; the
//! remainder is spare capacity of the buffer's size class.
//!
//! Shape-checked operations return [`Result`]; operations that cannot
//! violate a contract (transpose, scalar arithmetic, `apply`, reductions)
//! return plain values. In-place variants mutate the receiver and hand it
//! back for chaining.
//!
//! [`DenseView`] is the borrowed counterpart: it aliases another matrix's
//! storage under a different shape and can never reach the pool.

use core::fmt;

use rayon::prelude::*;

use super::{Broadcast, Matrix, Sparse, broadcast};
use crate::config::is_parallel;
use crate::error::{Error, PoolError, Result};
use crate::pool::Workspace;
use crate::random::SharedRng;
use crate::scalar;

/// A row-major matrix with every element materialised.
pub struct Dense {
    rows: usize,
    cols: usize,
    buf: Vec<f32>,
    pooled: bool,
}

/// A borrowed, reshaped window over another matrix's storage.
///
/// Views have no lifetime of their own and are never returned to the pool.
#[derive(Debug, Clone, Copy)]
pub struct DenseView<'a> {
    rows: usize,
    cols: usize,
    data: &'a [f32],
}

impl<'a> DenseView<'a> {
    /// Number of rows.
    #[must_use]
    pub const fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    #[must_use]
    pub const fn cols(&self) -> usize {
        self.cols
    }

    /// The viewed elements, row-major.
    #[must_use]
    pub const fn data(&self) -> &'a [f32] {
        self.data
    }

    /// Element at `(i, j)`.
    #[must_use]
    pub fn at(&self, i: usize, j: usize) -> f32 {
        assert!(i < self.rows && j < self.cols, "view index out of range");
        self.data[i * self.cols + j]
    }

    /// Copies the viewed elements into a fresh pooled matrix.
    #[must_use]
    pub fn to_dense(&self) -> Dense {
        let mut out = Dense::dirty(self.rows, self.cols);
        out.data_mut().copy_from_slice(self.data);
        out
    }
}

impl Dense {
    pub(crate) const fn from_parts(rows: usize, cols: usize, buf: Vec<f32>, pooled: bool) -> Self {
        Self {
            rows,
            cols,
            buf,
            pooled,
        }
    }

    pub(crate) fn into_buffer(self) -> Vec<f32> {
        self.buf
    }

    fn acquire(rows: usize, cols: usize, zeroed: bool) -> Self {
        let ws = Workspace::global();
        let res = if zeroed {
            ws.get_empty_dense(rows, cols)
        } else {
            ws.get_dense(rows, cols)
        };
        match res {
            Ok(d) => d,
            Err(e) => panic!("{e}"),
        }
    }

    /// Pooled matrix with unspecified contents, for kernels that overwrite every element.
    pub(crate) fn dirty(rows: usize, cols: usize) -> Self {
        Self::acquire(rows, cols, false)
    }

    /// Creates a pooled `rows x cols` matrix holding a copy of `data`.
    ///
    /// # Errors
    ///
    /// [`Error::LengthMismatch`] unless `data.len() == rows * cols`.
    pub fn new(rows: usize, cols: usize, data: &[f32]) -> Result<Self> {
        if rows.checked_mul(cols) != Some(data.len()) {
            return Err(Error::LengthMismatch {
                op: "Dense::new",
                rows,
                cols,
                len: data.len(),
            });
        }
        let mut d = Self::dirty(rows, cols);
        d.data_mut().copy_from_slice(data);
        Ok(d)
    }

    /// Wraps a caller-owned buffer without going through the pool.
    ///
    /// Such a matrix cannot be released to a [`Workspace`].
    ///
    /// # Errors
    ///
    /// [`Error::LengthMismatch`] unless `data.len() == rows * cols`.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f32>) -> Result<Self> {
        if rows.checked_mul(cols) != Some(data.len()) {
            return Err(Error::LengthMismatch {
                op: "Dense::from_vec",
                rows,
                cols,
                len: data.len(),
            });
        }
        Ok(Self::from_parts(rows, cols, data, false))
    }

    /// Zero-filled pooled matrix.
    ///
    /// # Panics
    ///
    /// Panics if `rows * cols` overflows.
    #[must_use]
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self::acquire(rows, cols, true)
    }

    /// Pooled matrix with every element set to `value`.
    #[must_use]
    pub fn filled(rows: usize, cols: usize, value: f32) -> Self {
        let mut d = Self::dirty(rows, cols);
        d.data_mut().fill(value);
        d
    }

    /// Column vector holding a copy of `data`.
    #[must_use]
    pub fn vec(data: &[f32]) -> Self {
        let mut d = Self::dirty(data.len(), 1);
        d.data_mut().copy_from_slice(data);
        d
    }

    /// Zero column vector of length `n`.
    #[must_use]
    pub fn zeros_vec(n: usize) -> Self {
        Self::zeros(n, 1)
    }

    /// 1x1 matrix.
    #[must_use]
    pub fn scalar(value: f32) -> Self {
        Self::filled(1, 1, value)
    }

    /// `n x n` identity.
    #[must_use]
    pub fn identity(n: usize) -> Self {
        let mut d = Self::zeros(n, n);
        for i in 0..n {
            d.buf[i * n + i] = 1.0;
        }
        d
    }

    /// Column vector of length `n` with a single `1.0` at `i`.
    ///
    /// # Errors
    ///
    /// [`Error::OutOfRange`] if `i >= n`.
    pub fn one_hot(n: usize, i: usize) -> Result<Self> {
        if i >= n {
            return Err(Error::OutOfRange {
                op: "Dense::one_hot",
                row: i,
                col: 0,
                rows: n,
                cols: 1,
            });
        }
        let mut d = Self::zeros_vec(n);
        d.buf[i] = 1.0;
        Ok(d)
    }

    /// Matrix whose element `(i, j)` is `f(i, j)`.
    #[must_use]
    pub fn from_fn(rows: usize, cols: usize, mut f: impl FnMut(usize, usize) -> f32) -> Self {
        let mut d = Self::dirty(rows, cols);
        for (k, v) in d.data_mut().iter_mut().enumerate() {
            *v = f(k / cols, k % cols);
        }
        d
    }

    /// Matrix of uniform samples in `[lo, hi)`.
    #[must_use]
    pub fn uniform(rows: usize, cols: usize, lo: f32, hi: f32, rng: &SharedRng) -> Self {
        let mut d = Self::dirty(rows, cols);
        rng.fill_uniform(d.data_mut(), lo, hi);
        d
    }

    /// Zero matrix of the same shape.
    #[must_use]
    pub fn zeros_like(&self) -> Self {
        Self::zeros(self.rows, self.cols)
    }

    /// Matrix of ones with the same shape.
    #[must_use]
    pub fn ones_like(&self) -> Self {
        Self::filled(self.rows, self.cols, 1.0)
    }

    /// Returns the buffer to the global workspace.
    ///
    /// # Errors
    ///
    /// [`PoolError::NotPooled`] for matrices built with [`Dense::from_vec`].
    pub fn release(self) -> core::result::Result<(), PoolError> {
        Workspace::global().release_dense(self)
    }

    /// Releases a pooled matrix and simply drops any other.
    pub fn recycle(self) {
        if self.pooled {
            if let Err(e) = self.release() {
                log::warn!("recycle: {e}");
            }
        }
    }

    /// Number of rows.
    #[must_use]
    pub const fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    #[must_use]
    pub const fn cols(&self) -> usize {
        self.cols
    }

    /// `(rows, cols)`.
    #[must_use]
    pub const fn dims(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// `rows * cols`.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.rows * self.cols
    }

    /// Index of the last element, `-1` for an empty matrix.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub const fn last_index(&self) -> isize {
        self.size() as isize - 1
    }

    /// Length of the underlying buffer.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Whether the buffer came from a [`Workspace`].
    #[must_use]
    pub const fn is_pooled(&self) -> bool {
        self.pooled
    }

    /// A single row or a single column.
    #[must_use]
    pub const fn is_vector(&self) -> bool {
        self.rows == 1 || self.cols == 1
    }

    /// Exactly one element.
    #[must_use]
    pub const fn is_scalar(&self) -> bool {
        self.rows == 1 && self.cols == 1
    }

    /// The visible elements, row-major.
    #[must_use]
    pub fn data(&self) -> &[f32] {
        &self.buf[..self.size()]
    }

    /// Mutable access to the visible elements.
    pub fn data_mut(&mut self) -> &mut [f32] {
        let n = self.size();
        &mut self.buf[..n]
    }

    /// Copies the visible elements out.
    #[must_use]
    pub fn to_vec(&self) -> Vec<f32> {
        self.data().to_vec()
    }

    /// Element at `(i, j)`.
    ///
    /// # Panics
    ///
    /// Panics if the index is out of range.
    #[must_use]
    pub fn at(&self, i: usize, j: usize) -> f32 {
        assert!(
            i < self.rows && j < self.cols,
            "index ({i}, {j}) out of range for {}x{}",
            self.rows,
            self.cols
        );
        self.buf[i * self.cols + j]
    }

    /// Sets element `(i, j)`.
    ///
    /// # Panics
    ///
    /// Panics if the index is out of range.
    pub fn set(&mut self, i: usize, j: usize, value: f32) {
        assert!(
            i < self.rows && j < self.cols,
            "index ({i}, {j}) out of range for {}x{}",
            self.rows,
            self.cols
        );
        self.buf[i * self.cols + j] = value;
    }

    /// Element `i` of a vector.
    ///
    /// # Errors
    ///
    /// [`Error::NotVector`] for matrices, [`Error::OutOfRange`] for a bad index.
    pub fn at_vec(&self, i: usize) -> Result<f32> {
        self.check_vec_index("Dense::at_vec", i)?;
        Ok(self.buf[i])
    }

    /// Sets element `i` of a vector.
    ///
    /// # Errors
    ///
    /// [`Error::NotVector`] for matrices, [`Error::OutOfRange`] for a bad index.
    pub fn set_vec(&mut self, i: usize, value: f32) -> Result<()> {
        self.check_vec_index("Dense::set_vec", i)?;
        self.buf[i] = value;
        Ok(())
    }

    fn check_vec_index(&self, op: &'static str, i: usize) -> Result<()> {
        if !self.is_vector() {
            return Err(Error::NotVector {
                op,
                rows: self.rows,
                cols: self.cols,
            });
        }
        if i >= self.size() {
            return Err(Error::OutOfRange {
                op,
                row: i,
                col: 0,
                rows: self.rows,
                cols: self.cols,
            });
        }
        Ok(())
    }

    /// The only element of a 1x1 matrix.
    ///
    /// # Errors
    ///
    /// [`Error::NotScalar`] otherwise.
    pub fn scalar_value(&self) -> Result<f32> {
        if !self.is_scalar() {
            return Err(Error::NotScalar {
                op: "Dense::scalar_value",
                rows: self.rows,
                cols: self.cols,
            });
        }
        Ok(self.buf[0])
    }

    /// Row `i` as a `1 x cols` matrix.
    ///
    /// # Errors
    ///
    /// [`Error::OutOfRange`] if `i >= rows`.
    pub fn row(&self, i: usize) -> Result<Self> {
        if i >= self.rows {
            return Err(Error::OutOfRange {
                op: "Dense::row",
                row: i,
                col: 0,
                rows: self.rows,
                cols: self.cols,
            });
        }
        Self::new(1, self.cols, &self.data()[i * self.cols..(i + 1) * self.cols])
    }

    /// Column `j` as a `rows x 1` matrix.
    ///
    /// # Errors
    ///
    /// [`Error::OutOfRange`] if `j >= cols`.
    pub fn col(&self, j: usize) -> Result<Self> {
        if j >= self.cols {
            return Err(Error::OutOfRange {
                op: "Dense::col",
                row: 0,
                col: j,
                rows: self.rows,
                cols: self.cols,
            });
        }
        let mut out = Self::dirty(self.rows, 1);
        for (i, v) in out.data_mut().iter_mut().enumerate() {
            *v = self.buf[i * self.cols + j];
        }
        Ok(out)
    }

    /// Reinterprets the storage as `rows x cols` without copying.
    ///
    /// # Errors
    ///
    /// [`Error::LengthMismatch`] if the element count differs.
    pub fn view(&self, rows: usize, cols: usize) -> Result<DenseView<'_>> {
        if rows.checked_mul(cols) != Some(self.size()) {
            return Err(Error::LengthMismatch {
                op: "Dense::view",
                rows,
                cols,
                len: self.size(),
            });
        }
        Ok(DenseView {
            rows,
            cols,
            data: self.data(),
        })
    }

    /// Copy of this matrix with a different shape.
    ///
    /// # Errors
    ///
    /// [`Error::LengthMismatch`] if the element count differs.
    pub fn reshape(&self, rows: usize, cols: usize) -> Result<Self> {
        Ok(self.view(rows, cols)?.to_dense())
    }

    /// Changes the shape in place.
    ///
    /// # Errors
    ///
    /// [`Error::LengthMismatch`] if the element count differs.
    pub fn reshape_in_place(&mut self, rows: usize, cols: usize) -> Result<&mut Self> {
        if rows.checked_mul(cols) != Some(self.size()) {
            return Err(Error::LengthMismatch {
                op: "Dense::reshape_in_place",
                rows,
                cols,
                len: self.size(),
            });
        }
        self.rows = rows;
        self.cols = cols;
        Ok(self)
    }

    /// Copies the `rows x cols` block whose top-left corner is `(row, col)`.
    ///
    /// # Errors
    ///
    /// [`Error::OutOfRange`] if the block does not fit.
    pub fn extract_view(&self, row: usize, col: usize, rows: usize, cols: usize) -> Result<Self> {
        let end_row = row.checked_add(rows).unwrap_or(usize::MAX);
        let end_col = col.checked_add(cols).unwrap_or(usize::MAX);
        if end_row > self.rows || end_col > self.cols {
            return Err(Error::OutOfRange {
                op: "Dense::extract_view",
                row: end_row,
                col: end_col,
                rows: self.rows,
                cols: self.cols,
            });
        }
        let mut out = Self::dirty(rows, cols);
        for i in 0..rows {
            let src = (row + i) * self.cols + col;
            out.data_mut()[i * cols..(i + 1) * cols].copy_from_slice(&self.buf[src..src + cols]);
        }
        Ok(out)
    }

    /// Transpose.
    ///
    /// Walks the source once; the destination index advances by `rows` and
    /// wraps around to the next column when it runs past the end.
    #[must_use]
    pub fn t(&self) -> Self {
        let mut out = Self::dirty(self.cols, self.rows);
        let len = self.size();
        let dst = out.data_mut();
        let mut index = 0;
        for &v in self.data() {
            dst[index] = v;
            index += self.rows;
            if index >= len {
                index -= len - 1;
            }
        }
        out
    }

    /// Concatenates vectors into one column vector.
    ///
    /// # Errors
    ///
    /// [`Error::NotVector`] if any input is not a vector.
    pub fn concat_v(vs: &[&Self]) -> Result<Self> {
        let mut len = 0;
        for v in vs {
            if !v.is_vector() {
                return Err(Error::NotVector {
                    op: "Dense::concat_v",
                    rows: v.rows,
                    cols: v.cols,
                });
            }
            len += v.size();
        }
        let mut out = Self::dirty(len, 1);
        let mut offset = 0;
        for v in vs {
            out.data_mut()[offset..offset + v.size()].copy_from_slice(v.data());
            offset += v.size();
        }
        Ok(out)
    }

    /// Stacks equally sized vectors as the rows of a matrix.
    ///
    /// # Errors
    ///
    /// [`Error::NotVector`] or [`Error::DimensionMismatch`] on bad inputs.
    pub fn stack(vs: &[&Self]) -> Result<Self> {
        let Some(first) = vs.first() else {
            return Ok(Self::zeros(0, 0));
        };
        let cols = first.size();
        for v in vs {
            if !v.is_vector() {
                return Err(Error::NotVector {
                    op: "Dense::stack",
                    rows: v.rows,
                    cols: v.cols,
                });
            }
            if v.size() != cols {
                return Err(Error::DimensionMismatch {
                    op: "Dense::stack",
                    lhs_rows: first.rows,
                    lhs_cols: first.cols,
                    rhs_rows: v.rows,
                    rhs_cols: v.cols,
                });
            }
        }
        let mut out = Self::dirty(vs.len(), cols);
        for (i, v) in vs.iter().enumerate() {
            out.data_mut()[i * cols..(i + 1) * cols].copy_from_slice(v.data());
        }
        Ok(out)
    }

    /// Same shape and element-wise within `tolerance`.
    #[must_use]
    pub fn equals_approx(&self, other: &Self, tolerance: f32) -> bool {
        self.dims() == other.dims() && crate::approx::within(self.data(), other.data(), tolerance)
    }
}

// Elementwise arithmetic and broadcasting.
impl Dense {
    /// Applies `f` pairwise under the broadcast rule, producing a new matrix.
    pub(crate) fn zip_with(
        &self,
        op: &'static str,
        other: &Self,
        f: impl Fn(f32, f32) -> f32,
    ) -> Result<Self> {
        let mode = broadcast(op, self.dims(), other.dims())?;
        let (a, b) = (self.data(), other.data());
        match mode {
            Broadcast::Same | Broadcast::Vectors => {
                let mut out = Self::dirty(self.rows, self.cols);
                for ((o, &x), &y) in out.data_mut().iter_mut().zip(a).zip(b) {
                    *o = f(x, y);
                }
                Ok(out)
            }
            Broadcast::RhsAcrossRows => {
                let cols = self.cols;
                let mut out = Self::dirty(self.rows, cols);
                for (k, (o, &x)) in out.data_mut().iter_mut().zip(a).enumerate() {
                    *o = f(x, b[k / cols]);
                }
                Ok(out)
            }
            Broadcast::LhsAcrossRows => {
                let cols = other.cols;
                let mut out = Self::dirty(other.rows, cols);
                for (k, (o, &y)) in out.data_mut().iter_mut().zip(b).enumerate() {
                    *o = f(a[k / cols], y);
                }
                Ok(out)
            }
        }
    }

    fn zip_with_in_place(
        &mut self,
        op: &'static str,
        other: &Self,
        f: impl Fn(f32, f32) -> f32,
    ) -> Result<&mut Self> {
        let mode = broadcast(op, self.dims(), other.dims())?;
        let cols = self.cols;
        let b = other.data();
        match mode {
            Broadcast::Same | Broadcast::Vectors => {
                for (x, &y) in self.data_mut().iter_mut().zip(b) {
                    *x = f(*x, y);
                }
            }
            Broadcast::RhsAcrossRows => {
                for (k, x) in self.data_mut().iter_mut().enumerate() {
                    *x = f(*x, b[k / cols]);
                }
            }
            Broadcast::LhsAcrossRows => {
                return Err(Error::DimensionMismatch {
                    op,
                    lhs_rows: self.rows,
                    lhs_cols: self.cols,
                    rhs_rows: other.rows,
                    rhs_cols: other.cols,
                });
            }
        }
        Ok(self)
    }

    /// `self + other`.
    ///
    /// # Errors
    ///
    /// [`Error::DimensionMismatch`] if the shapes are not broadcast-compatible.
    pub fn add(&self, other: &Self) -> Result<Self> {
        self.zip_with("Dense::add", other, |x, y| x + y)
    }

    /// `self - other`.
    ///
    /// # Errors
    ///
    /// [`Error::DimensionMismatch`] if the shapes are not broadcast-compatible.
    pub fn sub(&self, other: &Self) -> Result<Self> {
        self.zip_with("Dense::sub", other, |x, y| x - y)
    }

    /// Element-wise product.
    ///
    /// # Errors
    ///
    /// [`Error::DimensionMismatch`] if the shapes are not broadcast-compatible.
    pub fn prod(&self, other: &Self) -> Result<Self> {
        self.zip_with("Dense::prod", other, |x, y| x * y)
    }

    /// Element-wise quotient. Division by zero follows IEEE-754.
    ///
    /// # Errors
    ///
    /// [`Error::DimensionMismatch`] if the shapes are not broadcast-compatible.
    pub fn div(&self, other: &Self) -> Result<Self> {
        self.zip_with("Dense::div", other, |x, y| x / y)
    }

    /// Element-wise maximum.
    ///
    /// # Errors
    ///
    /// [`Error::DimensionMismatch`] if the shapes are not broadcast-compatible.
    pub fn maximum(&self, other: &Self) -> Result<Self> {
        self.zip_with("Dense::maximum", other, scalar::max)
    }

    /// Element-wise minimum.
    ///
    /// # Errors
    ///
    /// [`Error::DimensionMismatch`] if the shapes are not broadcast-compatible.
    pub fn minimum(&self, other: &Self) -> Result<Self> {
        self.zip_with("Dense::minimum", other, scalar::min)
    }

    /// `self += other`.
    ///
    /// # Errors
    ///
    /// [`Error::DimensionMismatch`] if `other` cannot broadcast into `self`.
    pub fn add_in_place(&mut self, other: &Self) -> Result<&mut Self> {
        self.zip_with_in_place("Dense::add_in_place", other, |x, y| x + y)
    }

    /// `self -= other`.
    ///
    /// # Errors
    ///
    /// [`Error::DimensionMismatch`] if `other` cannot broadcast into `self`.
    pub fn sub_in_place(&mut self, other: &Self) -> Result<&mut Self> {
        self.zip_with_in_place("Dense::sub_in_place", other, |x, y| x - y)
    }

    /// `self *= other`, element-wise.
    ///
    /// # Errors
    ///
    /// [`Error::DimensionMismatch`] if `other` cannot broadcast into `self`.
    pub fn prod_in_place(&mut self, other: &Self) -> Result<&mut Self> {
        self.zip_with_in_place("Dense::prod_in_place", other, |x, y| x * y)
    }

    /// `self /= other`, element-wise.
    ///
    /// # Errors
    ///
    /// [`Error::DimensionMismatch`] if `other` cannot broadcast into `self`.
    pub fn div_in_place(&mut self, other: &Self) -> Result<&mut Self> {
        self.zip_with_in_place("Dense::div_in_place", other, |x, y| x / y)
    }

    /// Adds `n` to every element.
    #[must_use]
    pub fn add_scalar(&self, n: f32) -> Self {
        self.apply(|_, _, v| v + n)
    }

    /// Subtracts `n` from every element.
    #[must_use]
    pub fn sub_scalar(&self, n: f32) -> Self {
        self.apply(|_, _, v| v - n)
    }

    /// `n - v` for every element `v`.
    #[must_use]
    pub fn reverse_sub_scalar(&self, n: f32) -> Self {
        self.apply(|_, _, v| n - v)
    }

    /// Multiplies every element by `n`.
    #[must_use]
    pub fn prod_scalar(&self, n: f32) -> Self {
        self.apply(|_, _, v| v * n)
    }

    /// Divides every element by `n`.
    #[must_use]
    pub fn div_scalar(&self, n: f32) -> Self {
        self.apply(|_, _, v| v / n)
    }

    /// In-place [`Dense::add_scalar`].
    pub fn add_scalar_in_place(&mut self, n: f32) -> &mut Self {
        self.apply_in_place(|_, _, v| v + n)
    }

    /// In-place [`Dense::sub_scalar`].
    pub fn sub_scalar_in_place(&mut self, n: f32) -> &mut Self {
        self.apply_in_place(|_, _, v| v - n)
    }

    /// In-place [`Dense::prod_scalar`].
    pub fn prod_scalar_in_place(&mut self, n: f32) -> &mut Self {
        self.apply_in_place(|_, _, v| v * n)
    }

    /// In-place [`Dense::div_scalar`].
    pub fn div_scalar_in_place(&mut self, n: f32) -> &mut Self {
        self.apply_in_place(|_, _, v| v / n)
    }

    /// New matrix with `f(i, j, v)` applied to every element.
    #[must_use]
    pub fn apply(&self, f: impl Fn(usize, usize, f32) -> f32) -> Self {
        let cols = self.cols.max(1);
        let mut out = Self::dirty(self.rows, self.cols);
        for (k, (o, &v)) in out.data_mut().iter_mut().zip(self.data()).enumerate() {
            *o = f(k / cols, k % cols, v);
        }
        out
    }

    /// Like [`Dense::apply`], passing extra parameters to `f`.
    ///
    /// Parametric activations (ELU, `SELU`, leaky `ReLU`, ...) share this
    /// traversal instead of each carrying their own loop.
    #[must_use]
    pub fn apply_with_alpha(&self, f: impl Fn(usize, usize, f32, &[f32]) -> f32, alpha: &[f32]) -> Self {
        self.apply(|i, j, v| f(i, j, v, alpha))
    }

    /// Applies `f(i, j, v)` to every element in place.
    pub fn apply_in_place(&mut self, f: impl Fn(usize, usize, f32) -> f32) -> &mut Self {
        let cols = self.cols.max(1);
        for (k, v) in self.data_mut().iter_mut().enumerate() {
            *v = f(k / cols, k % cols, *v);
        }
        self
    }

    /// Calls `f(i, j, v)` for every non-zero element.
    pub fn do_non_zero(&self, mut f: impl FnMut(usize, usize, f32)) {
        let cols = self.cols.max(1);
        for (k, &v) in self.data().iter().enumerate() {
            if v != 0.0 {
                f(k / cols, k % cols, v);
            }
        }
    }

    /// Absolute values.
    #[must_use]
    pub fn abs(&self) -> Self {
        self.apply(|_, _, v| v.abs())
    }

    /// Square roots.
    #[must_use]
    pub fn sqrt(&self) -> Self {
        self.apply(|_, _, v| scalar::sqrt(v))
    }

    /// Every element raised to `power`.
    #[must_use]
    pub fn pow(&self, power: f32) -> Self {
        self.apply(|_, _, v| scalar::pow(v, power))
    }

    /// Exponentials.
    #[must_use]
    pub fn exp(&self) -> Self {
        self.apply(|_, _, v| scalar::exp(v))
    }

    /// Elements clamped into `[lo, hi]`.
    #[must_use]
    pub fn clip(&self, lo: f32, hi: f32) -> Self {
        self.apply(|_, _, v| scalar::clamp(v, lo, hi))
    }

    /// In-place [`Dense::clip`].
    pub fn clip_in_place(&mut self, lo: f32, hi: f32) -> &mut Self {
        self.apply_in_place(|_, _, v| scalar::clamp(v, lo, hi))
    }
}

// Reductions.
impl Dense {
    /// Sum of all elements.
    #[must_use]
    pub fn sum(&self) -> f32 {
        self.data().iter().sum()
    }

    /// Arithmetic mean; `NaN` for an empty matrix.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn mean(&self) -> f32 {
        self.sum() / self.size() as f32
    }

    /// Largest element, `-Inf` for an empty matrix.
    #[must_use]
    pub fn max(&self) -> f32 {
        self.data().iter().copied().fold(f32::NEG_INFINITY, scalar::max)
    }

    /// Smallest element, `+Inf` for an empty matrix.
    #[must_use]
    pub fn min(&self) -> f32 {
        self.data().iter().copied().fold(f32::INFINITY, scalar::min)
    }

    /// Linear index of the first largest element, or of the first `NaN`
    /// so that it agrees with [`Dense::max`].
    #[must_use]
    pub fn argmax(&self) -> usize {
        let data = self.data();
        let mut best = 0;
        for (k, &v) in data.iter().enumerate() {
            if v.is_nan() {
                return k;
            }
            if v > data[best] {
                best = k;
            }
        }
        best
    }

    /// `(Σ|x|^p)^(1/p)`.
    #[must_use]
    pub fn norm(&self, p: f32) -> f32 {
        let s: f32 = self.data().iter().map(|&v| scalar::pow(v.abs(), p)).sum();
        if p == 2.0 {
            return scalar::sqrt(s);
        }
        scalar::pow(s, 1.0 / p)
    }

    /// Divides by the Euclidean norm; a zero-norm matrix is returned unchanged.
    #[must_use]
    pub fn normalize2(&self) -> Self {
        let norm = self.norm(2.0);
        if norm == 0.0 {
            return self.clone();
        }
        self.div_scalar(norm)
    }

    /// Dot product of two vectors of the same size, ignoring orientation.
    ///
    /// # Errors
    ///
    /// [`Error::DimensionMismatch`] unless both are vectors of equal size.
    pub fn dot_unitary(&self, other: &Self) -> Result<f32> {
        if !(self.is_vector() && other.is_vector() && self.size() == other.size()) {
            return Err(Error::DimensionMismatch {
                op: "Dense::dot_unitary",
                lhs_rows: self.rows,
                lhs_cols: self.cols,
                rhs_rows: other.rows,
                rhs_cols: other.cols,
            });
        }
        Ok(self.data().iter().zip(other.data()).map(|(a, b)| a * b).sum())
    }
}

// Matrix multiplication.
impl Dense {
    /// `self · other` for either matrix kind.
    ///
    /// # Errors
    ///
    /// [`Error::DimensionMismatch`] unless `self.cols() == other.rows()`.
    pub fn mul(&self, other: &Matrix) -> Result<Self> {
        match other {
            Matrix::Dense(d) => self.mul_dense(d),
            Matrix::Sparse(s) => self.mul_sparse(s),
        }
    }

    fn check_mul(&self, op: &'static str, rows: usize, cols: usize) -> Result<()> {
        if self.cols != rows {
            return Err(Error::DimensionMismatch {
                op,
                lhs_rows: self.rows,
                lhs_cols: self.cols,
                rhs_rows: rows,
                rhs_cols: cols,
            });
        }
        Ok(())
    }

    /// `self · other` for dense operands.
    ///
    /// A column-vector right operand goes through the matrix-vector kernel.
    ///
    /// # Errors
    ///
    /// [`Error::DimensionMismatch`] unless `self.cols() == other.rows()`.
    pub fn mul_dense(&self, other: &Self) -> Result<Self> {
        self.check_mul("Dense::mul", other.rows, other.cols)?;
        if other.cols == 1 {
            return Ok(self.mul_vec(other));
        }
        let (k, c) = (self.cols, other.cols);
        let mut out = Self::zeros(self.rows, c);
        if out.size() == 0 {
            return Ok(out);
        }
        let (a, b) = (self.data(), other.data());
        let row_kernel = |(i, row): (usize, &mut [f32])| {
            let a_row = &a[i * k..(i + 1) * k];
            for (l, &av) in a_row.iter().enumerate() {
                let b_row = &b[l * c..(l + 1) * c];
                for (o, &bv) in row.iter_mut().zip(b_row) {
                    *o += av * bv;
                }
            }
        };
        if is_parallel() {
            out.data_mut().par_chunks_mut(c).enumerate().for_each(row_kernel);
        } else {
            out.data_mut().chunks_mut(c).enumerate().for_each(row_kernel);
        }
        Ok(out)
    }

    fn mul_vec(&self, v: &Self) -> Self {
        let k = self.cols;
        let mut out = Self::dirty(self.rows, 1);
        let (a, x) = (self.data(), v.data());
        let dot = |(i, o): (usize, &mut f32)| {
            *o = a[i * k..(i + 1) * k].iter().zip(x).map(|(p, q)| p * q).sum();
        };
        if is_parallel() {
            out.data_mut().par_iter_mut().enumerate().for_each(dot);
        } else {
            out.data_mut().iter_mut().enumerate().for_each(dot);
        }
        out
    }

    /// `self · other` where only the non-zeros of `other` are visited.
    ///
    /// # Errors
    ///
    /// [`Error::DimensionMismatch`] unless `self.cols() == other.rows()`.
    pub fn mul_sparse(&self, other: &Sparse) -> Result<Self> {
        self.check_mul("Dense::mul", other.rows(), other.cols())?;
        let (r, k, c) = (self.rows, self.cols, other.cols());
        let mut out = Self::zeros(r, c);
        let a = self.data();
        let dst = out.data_mut();
        other.do_non_zero(|l, j, v| {
            for i in 0..r {
                dst[i * c + j] += a[i * k + l] * v;
            }
        });
        Ok(out)
    }

    /// `selfᵗ · other` without materialising the transpose.
    ///
    /// # Errors
    ///
    /// [`Error::NotVector`] unless `other` is a column vector, and
    /// [`Error::DimensionMismatch`] unless `self.rows() == other.rows()`.
    pub fn mul_t(&self, other: &Self) -> Result<Self> {
        if other.cols != 1 {
            return Err(Error::NotVector {
                op: "Dense::mul_t",
                rows: other.rows,
                cols: other.cols,
            });
        }
        if self.rows != other.rows {
            return Err(Error::DimensionMismatch {
                op: "Dense::mul_t",
                lhs_rows: self.cols,
                lhs_cols: self.rows,
                rhs_rows: other.rows,
                rhs_cols: other.cols,
            });
        }
        let cols = self.cols;
        let mut out = Self::zeros(cols, 1);
        let dst = out.data_mut();
        for (i, &x) in other.data().iter().enumerate() {
            for (o, &a) in dst.iter_mut().zip(&self.buf[i * cols..(i + 1) * cols]) {
                *o += a * x;
            }
        }
        Ok(out)
    }
}

impl Clone for Dense {
    /// Clones through the pool; the copy is always releasable.
    fn clone(&self) -> Self {
        let mut out = Self::dirty(self.rows, self.cols);
        out.data_mut().copy_from_slice(self.data());
        out
    }
}

impl PartialEq for Dense {
    fn eq(&self, other: &Self) -> bool {
        self.dims() == other.dims() && self.data() == other.data()
    }
}

impl fmt::Debug for Dense {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dense")
            .field("rows", &self.rows)
            .field("cols", &self.cols)
            .field("data", &self.data())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(rows: usize, cols: usize, data: &[f32]) -> Dense {
        Dense::new(rows, cols, data).unwrap()
    }

    #[test]
    fn shape_invariants_hold() {
        let d = m(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(d.rows() * d.cols(), d.size());
        assert_eq!(d.size(), d.data().len());
        assert_eq!(d.last_index(), 5);
        assert_eq!(Dense::zeros(0, 3).last_index(), -1);
    }

    #[test]
    fn new_rejects_wrong_length() {
        assert!(matches!(
            Dense::new(2, 2, &[1.0, 2.0, 3.0]),
            Err(Error::LengthMismatch { len: 3, .. })
        ));
    }

    #[test]
    fn add_zeros_is_identity() {
        let d = m(2, 2, &[1.0, -2.0, 3.5, 0.0]);
        assert_eq!(d.add(&d.zeros_like()).unwrap(), d);
    }

    #[test]
    fn transpose_twice_is_identity() {
        let d = m(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let t = d.t();
        assert_eq!(t.dims(), (3, 2));
        assert_eq!(t.data(), &[1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
        assert_eq!(t.t(), d);

        let v = Dense::vec(&[1.0, 2.0, 3.0]);
        assert_eq!(v.t().dims(), (1, 3));
        assert_eq!(v.t().t(), v);
    }

    #[test]
    fn identity_mul_is_identity() {
        let d = m(3, 2, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let i: Matrix = d.clone().into();
        assert_eq!(Dense::identity(3).mul(&i).unwrap(), d);
    }

    #[test]
    fn mul_matches_hand_computation() {
        let a = m(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let b = m(3, 2, &[7.0, 8.0, 9.0, 10.0, 11.0, 12.0]);
        let c = a.mul_dense(&b).unwrap();
        assert_eq!(c.data(), &[58.0, 64.0, 139.0, 154.0]);
    }

    #[test]
    fn mul_vector_kernel() {
        let a = m(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let x = Dense::vec(&[1.0, 0.0, -1.0]);
        assert_eq!(a.mul_dense(&x).unwrap().data(), &[-2.0, -2.0]);
    }

    #[test]
    fn mul_rejects_inner_mismatch() {
        let a = m(2, 3, &[0.0; 6]);
        let b = m(2, 3, &[0.0; 6]);
        assert!(matches!(a.mul_dense(&b), Err(Error::DimensionMismatch { .. })));
    }

    #[test]
    fn mul_t_equals_explicit_transpose() {
        let a = m(3, 2, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let x = Dense::vec(&[1.0, 2.0, 3.0]);
        let expected = a.t().mul_dense(&x).unwrap();
        assert_eq!(a.mul_t(&x).unwrap(), expected);
    }

    #[test]
    fn broadcast_vector_across_rows() {
        let a = m(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let v = Dense::vec(&[10.0, 20.0]);
        assert_eq!(a.add(&v).unwrap().data(), &[11.0, 12.0, 13.0, 24.0, 25.0, 26.0]);
        assert_eq!(v.sub(&a).unwrap().data(), &[9.0, 8.0, 7.0, 16.0, 15.0, 14.0]);
    }

    #[test]
    fn vectors_of_same_size_combine() {
        let row = m(1, 3, &[1.0, 2.0, 3.0]);
        let col = Dense::vec(&[1.0, 1.0, 1.0]);
        let s = row.add(&col).unwrap();
        assert_eq!(s.dims(), (1, 3));
        assert_eq!(s.data(), &[2.0, 3.0, 4.0]);
    }

    #[test]
    fn incompatible_shapes_are_rejected() {
        let a = m(2, 3, &[0.0; 6]);
        let b = m(3, 2, &[0.0; 6]);
        assert!(a.add(&b).is_err());
        let mut a = a;
        assert!(a.add_in_place(&m(1, 1, &[1.0])).is_err());
    }

    #[test]
    fn normalize2_of_zero_is_clone() {
        let z = Dense::zeros(2, 2);
        assert_eq!(z.normalize2(), z);
        let v = Dense::vec(&[3.0, 4.0]);
        assert_eq!(v.normalize2().data(), &[0.6, 0.8]);
        assert_eq!(v.norm(2.0), 5.0);
        assert_eq!(v.norm(1.0), 7.0);
    }

    #[test]
    fn view_shares_storage() {
        let d = m(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let v = d.view(3, 2).unwrap();
        assert_eq!(v.at(2, 1), 6.0);
        assert!(core::ptr::eq(v.data().as_ptr(), d.data().as_ptr()));
        assert!(d.view(4, 2).is_err());
    }

    #[test]
    fn extract_and_stack() {
        let d = m(3, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0]);
        let block = d.extract_view(1, 1, 2, 2).unwrap();
        assert_eq!(block.data(), &[5.0, 6.0, 8.0, 9.0]);
        let r0 = d.row(0).unwrap();
        let c2 = d.col(2).unwrap();
        assert_eq!(c2.data(), &[3.0, 6.0, 9.0]);
        let s = Dense::stack(&[&r0, &c2]).unwrap();
        assert_eq!(s.data(), &[1.0, 2.0, 3.0, 3.0, 6.0, 9.0]);
        let c = Dense::concat_v(&[&r0, &c2]).unwrap();
        assert_eq!(c.dims(), (6, 1));
    }

    #[test]
    fn extract_view_rejects_overflowing_bounds() {
        let d = m(2, 2, &[1.0, 2.0, 3.0, 4.0]);
        assert!(matches!(
            d.extract_view(1, 0, usize::MAX, 1),
            Err(Error::OutOfRange { row: usize::MAX, .. })
        ));
        assert!(d.extract_view(0, usize::MAX, 1, 2).is_err());
    }

    #[test]
    fn reductions() {
        let d = m(2, 2, &[1.0, -5.0, 3.0, 2.0]);
        assert_eq!(d.sum(), 1.0);
        assert_eq!(d.max(), 3.0);
        assert_eq!(d.min(), -5.0);
        assert_eq!(d.argmax(), 2);
        assert_eq!(d.mean(), 0.25);
    }

    #[test]
    fn argmax_agrees_with_max_on_nan() {
        let d = m(1, 4, &[1.0, 9.0, f32::NAN, 3.0]);
        assert!(d.max().is_nan());
        assert_eq!(d.argmax(), 2);
        let d = m(1, 3, &[f32::NAN, 9.0, f32::NAN]);
        assert_eq!(d.argmax(), 0);
    }

    #[test]
    fn scalar_access() {
        assert_eq!(Dense::scalar(4.0).scalar_value().unwrap(), 4.0);
        assert!(Dense::zeros(2, 1).scalar_value().is_err());
        let mut v = Dense::zeros_vec(3);
        v.set_vec(1, 2.0).unwrap();
        assert_eq!(v.at_vec(1).unwrap(), 2.0);
        assert!(v.at_vec(3).is_err());
        assert!(Dense::zeros(2, 2).at_vec(0).is_err());
    }

    #[test]
    fn non_zero_iteration() {
        let d = m(2, 2, &[0.0, 1.0, 0.0, 2.0]);
        let mut seen = Vec::new();
        d.do_non_zero(|i, j, v| seen.push((i, j, v)));
        assert_eq!(seen, vec![(0, 1, 1.0), (1, 1, 2.0)]);
    }

    #[test]
    fn clone_is_pooled() {
        let d = Dense::from_vec(1, 2, vec![1.0, 2.0]).unwrap();
        assert!(!d.is_pooled());
        let c = d.clone();
        assert!(c.is_pooled());
        assert_eq!(c, d);
    }
}
