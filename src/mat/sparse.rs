//! Compressed sparse row matrices.
//!
//! # Layout
//!
//! A [`Sparse`] stores three arrays:
//!
//! - `values`: the non-zero elements, row by row;
//! - `col_indices`: the column of each value, strictly increasing within a row;
//! - `row_offsets`: `rows + 1` offsets into the other two, starting at `0`
//!   and ending at `nnz`.
//!
//! Every constructor produces this canonical form and every operator
//! preserves it: an entry whose computed value is exactly `0.0` is never
//! stored.
//!
//! # Mixed operands
//!
//! Adding or subtracting a dense matrix fills every cell, so the result is
//! a [`Dense`]. Element-wise product and quotient keep the sparsity pattern
//! of `self`, so they stay sparse. Shapes that need row broadcasting fall
//! back to dense computation.
//!
//! # Unsupported
//!
//! `reshape`, `lu`, `inverse` and `augment` report [`Error::Unsupported`].

use std::collections::BTreeMap;

use super::{Broadcast, Dense, Matrix, broadcast};
use crate::error::{Error, Result};
use crate::scalar;

/// A matrix storing only its non-zero elements.
#[derive(Debug, Clone, PartialEq)]
pub struct Sparse {
    rows: usize,
    cols: usize,
    values: Vec<f32>,
    row_offsets: Vec<usize>,
    col_indices: Vec<usize>,
}

impl Sparse {
    fn empty(rows: usize, cols: usize, nnz: usize) -> Self {
        let mut row_offsets = Vec::with_capacity(rows + 1);
        row_offsets.push(0);
        Self {
            rows,
            cols,
            values: Vec::with_capacity(nnz),
            row_offsets,
            col_indices: Vec::with_capacity(nnz),
        }
    }

    #[inline]
    fn push(&mut self, col: usize, value: f32) {
        if value != 0.0 {
            self.values.push(value);
            self.col_indices.push(col);
        }
    }

    #[inline]
    fn end_row(&mut self) {
        self.row_offsets.push(self.values.len());
    }

    /// Builds a sparse matrix from a row-major dense buffer.
    ///
    /// # Errors
    ///
    /// [`Error::LengthMismatch`] unless `data.len() == rows * cols`.
    pub fn new(rows: usize, cols: usize, data: &[f32]) -> Result<Self> {
        if rows.checked_mul(cols) != Some(data.len()) {
            return Err(Error::LengthMismatch {
                op: "Sparse::new",
                rows,
                cols,
                len: data.len(),
            });
        }
        let nnz = data.iter().filter(|&&v| v != 0.0).count();
        let mut s = Self::empty(rows, cols, nnz);
        for i in 0..rows {
            for (j, &v) in data[i * cols..(i + 1) * cols].iter().enumerate() {
                s.push(j, v);
            }
            s.end_row();
        }
        Ok(s)
    }

    /// Sparse copy of a dense matrix.
    #[must_use]
    pub fn from_dense(d: &Dense) -> Self {
        let mut s = Self::empty(d.rows(), d.cols(), 0);
        for row in d.data().chunks(d.cols().max(1)).take(d.rows()) {
            for (j, &v) in row.iter().enumerate() {
                s.push(j, v);
            }
            s.end_row();
        }
        // a matrix with zero columns still has one offset per row
        while s.row_offsets.len() < d.rows() + 1 {
            s.end_row();
        }
        s
    }

    /// Builds a sparse matrix from `((row, col), value)` entries in any order.
    ///
    /// Zero values are skipped.
    ///
    /// # Errors
    ///
    /// [`Error::OutOfRange`] for an entry outside the matrix and
    /// [`Error::DuplicateEntry`] if a coordinate appears twice.
    pub fn from_entries(
        rows: usize,
        cols: usize,
        entries: impl IntoIterator<Item = ((usize, usize), f32)>,
    ) -> Result<Self> {
        let mut sorted = BTreeMap::new();
        for ((i, j), v) in entries {
            if i >= rows || j >= cols {
                return Err(Error::OutOfRange {
                    op: "Sparse::from_entries",
                    row: i,
                    col: j,
                    rows,
                    cols,
                });
            }
            if sorted.insert((i, j), v).is_some() {
                return Err(Error::DuplicateEntry { row: i, col: j });
            }
        }
        let mut s = Self::empty(rows, cols, sorted.len());
        let mut row = 0;
        for ((i, j), v) in sorted {
            while row < i {
                s.end_row();
                row += 1;
            }
            s.push(j, v);
        }
        while s.row_offsets.len() < rows + 1 {
            s.end_row();
        }
        Ok(s)
    }

    /// All-zero matrix; stores nothing.
    #[must_use]
    pub fn zeros(rows: usize, cols: usize) -> Self {
        let mut s = Self::empty(rows, cols, 0);
        s.row_offsets.resize(rows + 1, 0);
        s
    }

    /// `n x n` identity.
    #[must_use]
    pub fn identity(n: usize) -> Self {
        let mut s = Self::empty(n, n, n);
        for i in 0..n {
            s.push(i, 1.0);
            s.end_row();
        }
        s
    }

    /// Column vector of length `n` with a single `1.0` at `i`.
    ///
    /// # Errors
    ///
    /// [`Error::OutOfRange`] if `i >= n`.
    pub fn one_hot(n: usize, i: usize) -> Result<Self> {
        Self::from_entries(n, 1, [((i, 0), 1.0)])
    }

    /// Column vector holding the non-zeros of `data`.
    #[must_use]
    pub fn vec(data: &[f32]) -> Self {
        let mut s = Self::empty(data.len(), 1, 0);
        for &v in data {
            s.push(0, v);
            s.end_row();
        }
        s
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

    /// `rows * cols`, counting the implicit zeros.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.rows * self.cols
    }

    /// Number of stored (non-zero) elements.
    #[must_use]
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// A single row or a single column.
    #[must_use]
    pub const fn is_vector(&self) -> bool {
        self.rows == 1 || self.cols == 1
    }

    /// The stored values.
    #[must_use]
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// The `rows + 1` row offsets.
    #[must_use]
    pub fn row_offsets(&self) -> &[usize] {
        &self.row_offsets
    }

    /// The column index of every stored value.
    #[must_use]
    pub fn col_indices(&self) -> &[usize] {
        &self.col_indices
    }

    fn row_range(&self, i: usize) -> core::ops::Range<usize> {
        self.row_offsets[i]..self.row_offsets[i + 1]
    }

    /// Element at `(i, j)`, zero when not stored.
    ///
    /// # Errors
    ///
    /// [`Error::OutOfRange`] for an index outside the matrix.
    pub fn at(&self, i: usize, j: usize) -> Result<f32> {
        if i >= self.rows || j >= self.cols {
            return Err(Error::OutOfRange {
                op: "Sparse::at",
                row: i,
                col: j,
                rows: self.rows,
                cols: self.cols,
            });
        }
        let range = self.row_range(i);
        let cols = &self.col_indices[range.clone()];
        Ok(cols
            .binary_search(&j)
            .map_or(0.0, |k| self.values[range.start + k]))
    }

    /// Calls `f(i, j, v)` for every stored element, row-major.
    ///
    /// All other sparse operators are built on this walk.
    pub fn do_non_zero(&self, mut f: impl FnMut(usize, usize, f32)) {
        for i in 0..self.rows {
            for k in self.row_range(i) {
                f(i, self.col_indices[k], self.values[k]);
            }
        }
    }

    /// Iterator over `(i, j, v)` for every stored element.
    pub fn iter_non_zero(&self) -> impl Iterator<Item = (usize, usize, f32)> + '_ {
        (0..self.rows).flat_map(move |i| {
            self.row_range(i)
                .map(move |k| (i, self.col_indices[k], self.values[k]))
        })
    }

    /// Dense copy.
    #[must_use]
    pub fn to_dense(&self) -> Dense {
        let mut out = Dense::zeros(self.rows, self.cols);
        let cols = self.cols;
        let dst = out.data_mut();
        self.do_non_zero(|i, j, v| dst[i * cols + j] = v);
        out
    }

    /// Transpose by counting sort over column indices.
    #[must_use]
    pub fn t(&self) -> Self {
        let nnz = self.nnz();
        let mut offsets = vec![0usize; self.cols + 1];
        for &j in &self.col_indices {
            offsets[j + 1] += 1;
        }
        for j in 0..self.cols {
            offsets[j + 1] += offsets[j];
        }
        let mut next = offsets.clone();
        let mut values = vec![0.0; nnz];
        let mut col_indices = vec![0; nnz];
        self.do_non_zero(|i, j, v| {
            let dst = next[j];
            values[dst] = v;
            col_indices[dst] = i;
            next[j] += 1;
        });
        Self {
            rows: self.cols,
            cols: self.rows,
            values,
            row_offsets: offsets,
            col_indices,
        }
    }

    /// New matrix with `f` applied to the stored values; zero results are dropped.
    #[must_use]
    pub fn apply_non_zero(&self, f: impl Fn(usize, usize, f32) -> f32) -> Self {
        let mut s = Self::empty(self.rows, self.cols, self.nnz());
        for i in 0..self.rows {
            for k in self.row_range(i) {
                let j = self.col_indices[k];
                s.push(j, f(i, j, self.values[k]));
            }
            s.end_row();
        }
        s
    }

    /// Applies `f` to every element, implicit zeros included.
    ///
    /// Stays on the stored values when `f(0) == 0`, otherwise maps the
    /// dense image.
    fn map_all(&self, f: impl Fn(f32) -> f32) -> Self {
        if f(0.0) == 0.0 {
            return self.apply_non_zero(|_, _, v| f(v));
        }
        Self::from_dense(&self.to_dense().apply(|_, _, v| f(v)))
    }
}

// Sparse ⊕ Sparse merge walks.
impl Sparse {
    /// Row-synchronised two-pointer merge of `self` and `other`.
    ///
    /// A column present on one side only is combined with an implicit zero.
    fn merge(&self, other: &Self, f: impl Fn(f32, f32) -> f32) -> Self {
        let mut s = Self::empty(self.rows, self.cols, self.nnz().max(other.nnz()));
        for i in 0..self.rows {
            let (mut a, a_end) = (self.row_offsets[i], self.row_offsets[i + 1]);
            let (mut b, b_end) = (other.row_offsets[i], other.row_offsets[i + 1]);
            while a < a_end || b < b_end {
                let ca = if a < a_end { self.col_indices[a] } else { usize::MAX };
                let cb = if b < b_end { other.col_indices[b] } else { usize::MAX };
                if ca < cb {
                    s.push(ca, f(self.values[a], 0.0));
                    a += 1;
                } else if cb < ca {
                    s.push(cb, f(0.0, other.values[b]));
                    b += 1;
                } else {
                    s.push(ca, f(self.values[a], other.values[b]));
                    a += 1;
                    b += 1;
                }
            }
            s.end_row();
        }
        s
    }

    fn combine(
        &self,
        op: &'static str,
        other: &Self,
        f: impl Fn(f32, f32) -> f32 + Copy,
    ) -> Result<Self> {
        match broadcast(op, self.dims(), other.dims())? {
            Broadcast::Same => Ok(self.merge(other, f)),
            Broadcast::Vectors => Ok(self.merge(&other.t(), f)),
            Broadcast::LhsAcrossRows | Broadcast::RhsAcrossRows => {
                log::warn!("{op}: row broadcast on sparse operands computed densely");
                let d = self.to_dense().zip_with(op, &other.to_dense(), f)?;
                Ok(Self::from_dense(&d))
            }
        }
    }

    /// `self + other`.
    ///
    /// # Errors
    ///
    /// [`Error::DimensionMismatch`] if the shapes are not broadcast-compatible.
    pub fn add(&self, other: &Self) -> Result<Self> {
        self.combine("Sparse::add", other, |x, y| x + y)
    }

    /// `self - other`.
    ///
    /// # Errors
    ///
    /// [`Error::DimensionMismatch`] if the shapes are not broadcast-compatible.
    pub fn sub(&self, other: &Self) -> Result<Self> {
        self.combine("Sparse::sub", other, |x, y| x - y)
    }

    /// Element-wise product.
    ///
    /// # Errors
    ///
    /// [`Error::DimensionMismatch`] if the shapes are not broadcast-compatible.
    pub fn prod(&self, other: &Self) -> Result<Self> {
        self.combine("Sparse::prod", other, |x, y| x * y)
    }

    /// Element-wise maximum, with missing entries read as zero.
    ///
    /// # Errors
    ///
    /// [`Error::DimensionMismatch`] if the shapes are not broadcast-compatible.
    pub fn maximum(&self, other: &Self) -> Result<Self> {
        self.combine("Sparse::maximum", other, scalar::max)
    }

    /// Element-wise minimum, with missing entries read as zero.
    ///
    /// # Errors
    ///
    /// [`Error::DimensionMismatch`] if the shapes are not broadcast-compatible.
    pub fn minimum(&self, other: &Self) -> Result<Self> {
        self.combine("Sparse::minimum", other, scalar::min)
    }
}

// Sparse ⊕ Dense.
impl Sparse {
    /// `self + other`, dense because every cell of `other` is filled.
    ///
    /// # Errors
    ///
    /// [`Error::DimensionMismatch`] if the shapes are not broadcast-compatible.
    pub fn add_dense(&self, other: &Dense) -> Result<Dense> {
        if self.dims() != other.dims() {
            return self.to_dense().add(other);
        }
        let mut out = other.clone();
        let cols = self.cols;
        let dst = out.data_mut();
        self.do_non_zero(|i, j, v| dst[i * cols + j] += v);
        Ok(out)
    }

    /// `self - other`, dense.
    ///
    /// # Errors
    ///
    /// [`Error::DimensionMismatch`] if the shapes are not broadcast-compatible.
    pub fn sub_dense(&self, other: &Dense) -> Result<Dense> {
        if self.dims() != other.dims() {
            return self.to_dense().sub(other);
        }
        let mut out = other.prod_scalar(-1.0);
        let cols = self.cols;
        let dst = out.data_mut();
        self.do_non_zero(|i, j, v| dst[i * cols + j] += v);
        Ok(out)
    }

    fn zip_dense(&self, op: &'static str, other: &Dense, f: impl Fn(f32, f32) -> f32 + Copy) -> Result<Self> {
        if self.dims() != other.dims() {
            log::warn!("{op}: mixed-shape sparse operand computed densely");
            let d = self.to_dense().zip_with(op, other, f)?;
            return Ok(Self::from_dense(&d));
        }
        let data = other.data();
        if data.iter().any(|&y| f(0.0, y) != 0.0) {
            let d = self.to_dense().zip_with(op, other, f)?;
            return Ok(Self::from_dense(&d));
        }
        let cols = self.cols;
        Ok(self.apply_non_zero(|i, j, v| f(v, data[i * cols + j])))
    }

    /// Element-wise product; keeps the sparsity pattern of `self`.
    ///
    /// # Errors
    ///
    /// [`Error::DimensionMismatch`] if the shapes are not broadcast-compatible.
    pub fn prod_dense(&self, other: &Dense) -> Result<Self> {
        self.zip_dense("Sparse::prod", other, |x, y| x * y)
    }

    /// Element-wise quotient; keeps the sparsity pattern of `self` unless
    /// `other` holds a zero or a non-finite value, where `0 / 0` is `NaN`.
    ///
    /// # Errors
    ///
    /// [`Error::DimensionMismatch`] if the shapes are not broadcast-compatible.
    pub fn div_dense(&self, other: &Dense) -> Result<Self> {
        self.zip_dense("Sparse::div", other, |x, y| x / y)
    }

    /// `self · other`, visiting only the stored elements of `self`.
    ///
    /// # Errors
    ///
    /// [`Error::DimensionMismatch`] unless `self.cols() == other.rows()`.
    pub fn mul(&self, other: &Matrix) -> Result<Dense> {
        let (rows, cols) = other.dims();
        if self.cols != rows {
            return Err(Error::DimensionMismatch {
                op: "Sparse::mul",
                lhs_rows: self.rows,
                lhs_cols: self.cols,
                rhs_rows: rows,
                rhs_cols: cols,
            });
        }
        let mut out = Dense::zeros(self.rows, cols);
        let dst = out.data_mut();
        match other {
            Matrix::Dense(b) => {
                let b = b.data();
                self.do_non_zero(|i, l, v| {
                    for (o, &w) in dst[i * cols..(i + 1) * cols].iter_mut().zip(&b[l * cols..(l + 1) * cols]) {
                        *o += v * w;
                    }
                });
            }
            Matrix::Sparse(b) => {
                self.do_non_zero(|i, l, v| {
                    for k in b.row_range(l) {
                        dst[i * cols + b.col_indices[k]] += v * b.values[k];
                    }
                });
            }
        }
        Ok(out)
    }
}

// Scalars and reductions.
impl Sparse {
    /// Adds `n` everywhere; dense because implicit zeros become `n`.
    #[must_use]
    pub fn add_scalar(&self, n: f32) -> Dense {
        let mut out = Dense::filled(self.rows, self.cols, n);
        let cols = self.cols;
        let dst = out.data_mut();
        self.do_non_zero(|i, j, v| dst[i * cols + j] += v);
        out
    }

    /// Subtracts `n` everywhere; dense.
    #[must_use]
    pub fn sub_scalar(&self, n: f32) -> Dense {
        self.add_scalar(-n)
    }

    /// Multiplies every element by `n`.
    ///
    /// A non-finite `n` turns the implicit zeros into `NaN`.
    #[must_use]
    pub fn prod_scalar(&self, n: f32) -> Self {
        self.map_all(|v| v * n)
    }

    /// Divides every element by `n`.
    #[must_use]
    pub fn div_scalar(&self, n: f32) -> Self {
        self.map_all(|v| v / n)
    }

    /// Sum of all elements.
    #[must_use]
    pub fn sum(&self) -> f32 {
        self.values.iter().sum()
    }

    fn has_implicit_zero(&self) -> bool {
        self.nnz() < self.size()
    }

    /// Largest element, implicit zeros included.
    #[must_use]
    pub fn max(&self) -> f32 {
        let init = if self.has_implicit_zero() { 0.0 } else { f32::NEG_INFINITY };
        self.values.iter().copied().fold(init, scalar::max)
    }

    /// Smallest element, implicit zeros included.
    #[must_use]
    pub fn min(&self) -> f32 {
        let init = if self.has_implicit_zero() { 0.0 } else { f32::INFINITY };
        self.values.iter().copied().fold(init, scalar::min)
    }

    /// Absolute values.
    #[must_use]
    pub fn abs(&self) -> Self {
        self.apply_non_zero(|_, _, v| v.abs())
    }

    /// Square roots of the stored elements.
    #[must_use]
    pub fn sqrt(&self) -> Self {
        self.apply_non_zero(|_, _, v| scalar::sqrt(v))
    }

    /// Every element raised to `power`; `0^0` is `1` as for dense input.
    #[must_use]
    pub fn pow(&self, power: f32) -> Self {
        self.map_all(|v| scalar::pow(v, power))
    }

    /// `(Σ|x|^p)^(1/p)` over the stored elements.
    #[must_use]
    pub fn norm(&self, p: f32) -> f32 {
        let s: f32 = self.values.iter().map(|&v| scalar::pow(v.abs(), p)).sum();
        if p == 2.0 {
            return scalar::sqrt(s);
        }
        scalar::pow(s, 1.0 / p)
    }

    /// Clamps every element into `[lo, hi]`.
    ///
    /// Elements clamped to zero are removed. When `0` lies outside the
    /// range the implicit zeros are clamped too and become stored.
    pub fn clip_in_place(&mut self, lo: f32, hi: f32) -> &mut Self {
        *self = self.map_all(|v| scalar::clamp(v, lo, hi));
        self
    }

    /// Not supported for sparse matrices.
    ///
    /// # Errors
    ///
    /// Always [`Error::Unsupported`].
    pub fn reshape(&self, _rows: usize, _cols: usize) -> Result<Self> {
        Err(Error::Unsupported("Sparse::reshape"))
    }

    /// Not supported for sparse matrices.
    ///
    /// # Errors
    ///
    /// Always [`Error::Unsupported`].
    pub fn lu(&self) -> Result<(Self, Self, Self)> {
        Err(Error::Unsupported("Sparse::lu"))
    }

    /// Not supported for sparse matrices.
    ///
    /// # Errors
    ///
    /// Always [`Error::Unsupported`].
    pub fn inverse(&self) -> Result<Self> {
        Err(Error::Unsupported("Sparse::inverse"))
    }

    /// Not supported for sparse matrices.
    ///
    /// # Errors
    ///
    /// Always [`Error::Unsupported`].
    pub fn augment(&self) -> Result<Self> {
        Err(Error::Unsupported("Sparse::augment"))
    }
}
