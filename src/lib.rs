//! briny_grad: pooled matrices and differentiable operators in Rust.
//!
//! The numerical substrate of a neural-network toolkit: a dense/sparse
//! `f32` matrix engine whose buffers come from a size-classed workspace
//! pool, and a library of operators that pair a forward computation with
//! the gradient routing of its backward pass.
//!
//! # Features
//!
//! - Row-major [`Dense`](mat::Dense) and CSR [`Sparse`](mat::Sparse) matrices
//!   behind one [`Matrix`](mat::Matrix) sum type.
//! - Power-of-two [`Workspace`](pool::Workspace) pool with dirty and zeroed gets.
//! - LU decomposition with partial pivoting and matrix inversion.
//! - Around forty differentiable operators with checked lifecycles.
//! - A small binary format for dense matrices.
//!
//! # Modules
//!
//! - [`mat`]: matrix types, broadcasting, linear algebra, encoding.
//! - [`pool`]: the workspace allocator and its scratch guard.
//! - [`graph`]: the `Operand`/`Function` contract and [`graph::ops`].
//! - [`scalar`]: scalar kernels shared by matrices and operators.
//! - [`config`]: process-wide switches such as [`config::Parallelism`].
//!
//! # Example
//!
//! ```rust
//! use briny_grad::mat::Dense;
//!
//! let a = Dense::new(2, 2, &[4.0, 7.0, 2.0, 6.0]).unwrap();
//! let inv = a.inverse().unwrap();
//! assert!(inv.mul_dense(&a).unwrap().equals_approx(&Dense::identity(2), 1e-5));
//! ```

#![warn(missing_docs)]

pub mod approx;
pub mod config;
pub mod error;
pub mod graph;
pub mod mat;
pub mod pool;
pub mod random;
pub mod scalar;

pub use error::{DecodeError, Error, PoolError, Result};
