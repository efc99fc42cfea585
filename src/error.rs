//! Error taxonomy.
//!
//! Every failure in this crate falls into one of a small number of
//! closed categories:
//!
//! - [`Error`]: shape contract violations, unsupported sparse operations,
//!   numeric domain errors and operator lifecycle misuse.
//! - [`PoolError`]: misuse of the [`Workspace`](crate::pool::Workspace).
//! - [`DecodeError`]: malformed or truncated binary matrix streams.
//!
//! None of these are retried internally. A failing call leaves its inputs
//! untouched and the caller decides whether to recover or abort.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;

/// Contract violations raised by matrix operations and differentiable operators.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    /// The operands of a binary operation are neither the same shape nor
    /// broadcast-compatible.
    #[error("{op}: incompatible dimensions {lhs_rows}x{lhs_cols} and {rhs_rows}x{rhs_cols}")]
    DimensionMismatch {
        /// Operation that rejected the operands.
        op: &'static str,
        /// Rows of the left operand.
        lhs_rows: usize,
        /// Columns of the left operand.
        lhs_cols: usize,
        /// Rows of the right operand.
        rhs_rows: usize,
        /// Columns of the right operand.
        rhs_cols: usize,
    },

    /// A buffer length does not agree with the declared `rows * cols`.
    #[error("{op}: {len} values cannot fill a {rows}x{cols} matrix")]
    LengthMismatch {
        /// Operation that rejected the buffer.
        op: &'static str,
        /// Declared rows.
        rows: usize,
        /// Declared columns.
        cols: usize,
        /// Actual buffer length.
        len: usize,
    },

    /// LU decomposition, inversion and augmentation require a square matrix.
    #[error("{op}: expected a square matrix, got {rows}x{cols}")]
    NotSquare {
        /// Operation that rejected the matrix.
        op: &'static str,
        /// Rows of the matrix.
        rows: usize,
        /// Columns of the matrix.
        cols: usize,
    },

    /// The operation is defined only on row or column vectors.
    #[error("{op}: expected a vector, got {rows}x{cols}")]
    NotVector {
        /// Operation that rejected the matrix.
        op: &'static str,
        /// Rows of the matrix.
        rows: usize,
        /// Columns of the matrix.
        cols: usize,
    },

    /// A 1x1 matrix was expected.
    #[error("{op}: expected a scalar, got {rows}x{cols}")]
    NotScalar {
        /// Operation that rejected the matrix.
        op: &'static str,
        /// Rows of the matrix.
        rows: usize,
        /// Columns of the matrix.
        cols: usize,
    },

    /// An index lies outside the matrix.
    #[error("{op}: index ({row}, {col}) out of range for {rows}x{cols}")]
    OutOfRange {
        /// Operation that rejected the index.
        op: &'static str,
        /// Requested row.
        row: usize,
        /// Requested column.
        col: usize,
        /// Rows of the matrix.
        rows: usize,
        /// Columns of the matrix.
        cols: usize,
    },

    /// Coordinate input named the same cell twice.
    #[error("duplicate sparse entry at ({row}, {col})")]
    DuplicateEntry {
        /// Row of the repeated cell.
        row: usize,
        /// Column of the repeated cell.
        col: usize,
    },

    /// The operation is not implemented for this matrix kind.
    #[error("{0}: not implemented for sparse matrices")]
    Unsupported(&'static str),

    /// Logarithm of a negative value.
    #[error("log: invalid input {0} (negative values are outside the domain)")]
    NegativeLog(f32),

    /// An operator was built with the wrong number of parameters.
    #[error("{op}: expected {expected} parameters, got {got}")]
    Arity {
        /// Operator name.
        op: &'static str,
        /// Parameters the operator takes.
        expected: usize,
        /// Parameters supplied.
        got: usize,
    },

    /// A hyper-parameter lies outside its domain.
    #[error("{op}: {name} = {value} is out of range")]
    InvalidParameter {
        /// Operator name.
        op: &'static str,
        /// Parameter name.
        name: &'static str,
        /// Rejected value.
        value: f32,
    },

    /// A `forward`/`backward` call arrived in the wrong lifecycle stage.
    #[error("{op}: cannot {call} an operator in stage {stage:?}")]
    Lifecycle {
        /// Operator name.
        op: &'static str,
        /// The call that was attempted (`"forward"` or `"backward"`).
        call: &'static str,
        /// Stage the operator was in.
        stage: crate::graph::Stage,
    },

    /// Pool misuse surfaced through a matrix operation.
    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// Misuse of the workspace pool.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// The matrix was not obtained from a pool (user-owned buffer).
    #[error("cannot release a matrix that was not obtained from the workspace")]
    NotPooled,

    /// The requested element count does not fit in `usize`.
    #[error("requested workspace of {rows}x{cols} overflows the address space")]
    SizeOverflow {
        /// Requested rows.
        rows: usize,
        /// Requested columns.
        cols: usize,
    },
}

/// Failures of the binary matrix format.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The header declares a non-positive element count.
    #[error("invalid matrix header: {rows}x{cols} has no elements")]
    InvalidSize {
        /// Declared rows.
        rows: i32,
        /// Declared columns.
        cols: i32,
    },

    /// The header declares more elements than a slice may hold.
    #[error("matrix of {rows}x{cols} exceeds the maximum buffer length")]
    TooLarge {
        /// Declared rows.
        rows: i32,
        /// Declared columns.
        cols: i32,
    },

    /// The stream ended before the matrix was complete.
    #[error("matrix stream truncated: expected {expected} more bytes")]
    Truncated {
        /// Bytes still expected when the stream ended.
        expected: usize,
    },

    /// The decoded payload failed validation.
    #[error("decoded matrix failed validation")]
    Invalid,

    /// Any other I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
