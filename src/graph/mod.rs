//! Differentiable operators and autograd plumbing.
//!
//! # Operands and functions
//!
//! An [`Operand`] holds a value, says whether it wants a gradient and
//! accepts one. A [`Function`] is built over operands, computes its output
//! in [`Function::forward`] and, given the gradient of that output, routes
//! a gradient to every operand in [`Function::backward`].
//!
//! ## Autograd pattern
//!
//! 1. **Leaves** are [`Variable`]s, shared as [`OperandRef`].
//! 2. **Forward** reads operand values and returns a fresh pooled matrix.
//! 3. **Backward** validates the incoming gradient's shape, computes one
//!    gradient per operand *that requires one*, and hands it over with
//!    [`Operand::propagate_grad`]. Ownership moves with the call.
//! 4. **Scratch** buffers used only inside backward go back to the pool
//!    before it returns (see [`Scratch`](crate::pool::Scratch)).
//!
//! A chain of functions is wired by wrapping an output in a new
//! `Variable` and, once its gradient has arrived, passing that gradient to
//! the function that produced it.
//!
//! ## Lifecycle
//!
//! Every operator moves `Constructed → Forwarded → Backpropagated` exactly
//! once. Any other call order returns [`Error::Lifecycle`].
//!
//! # Example
//!
//! ```rust
//! use briny_grad::graph::{Function, Operand, Variable};
//! use briny_grad::graph::ops::Add;
//! use briny_grad::mat::{Dense, Matrix};
//!
//! let x1 = Variable::new(Dense::vec(&[0.1, 0.2]), true);
//! let x2 = Variable::new(Dense::vec(&[0.4, 0.3]), false);
//! let mut add = Add::new(x1.clone(), x2.clone());
//!
//! let y = add.forward().unwrap();
//! assert!(y.equals_approx(&Dense::vec(&[0.5, 0.5]).into(), 1e-6));
//!
//! add.backward(&Dense::vec(&[1.0, -1.0]).into()).unwrap();
//! assert_eq!(x1.grad().unwrap().to_dense().data(), &[1.0, -1.0]);
//! assert!(x2.grad().is_none());
//! ```

pub mod ops;

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::mat::{Broadcast, Dense, Matrix, broadcast};

/// Anything that holds a value and can receive a gradient.
pub trait Operand: Send + Sync {
    /// The current value.
    fn value(&self) -> &Matrix;

    /// Whether gradients should be routed to this operand at all.
    fn requires_grad(&self) -> bool;

    /// Accepts a gradient with the same shape as [`Operand::value`].
    ///
    /// # Errors
    ///
    /// [`Error::DimensionMismatch`] if the shapes differ.
    fn propagate_grad(&self, grad: Matrix) -> Result<()>;
}

/// Shared handle to an operand.
pub type OperandRef = Arc<dyn Operand>;

/// A forward/backward pair over one or more operands.
pub trait Function: Send {
    /// Computes the output value.
    ///
    /// # Errors
    ///
    /// Shape contract violations, and [`Error::Lifecycle`] on a second call.
    fn forward(&mut self) -> Result<Matrix>;

    /// Routes `gy`, the gradient of the output, to the operands.
    ///
    /// # Errors
    ///
    /// [`Error::DimensionMismatch`] if `gy` does not match the output, and
    /// [`Error::Lifecycle`] before `forward` or on a second call.
    fn backward(&mut self, gy: &Matrix) -> Result<()>;

    /// The operands this function was built over.
    fn operands(&self) -> Vec<OperandRef>;
}

/// Where an operator is in its one-shot lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Stage {
    /// Built, not yet evaluated.
    #[default]
    Constructed,
    /// `forward` succeeded.
    Forwarded,
    /// `backward` succeeded; terminal.
    Backpropagated,
}

/// Lifecycle bookkeeping embedded in every operator.
///
/// Stage changes are committed only after the call succeeds, so a rejected
/// gradient can be corrected and retried.
#[derive(Debug, Clone, Default)]
pub struct Lifecycle {
    stage: Stage,
    out_dims: (usize, usize),
}

impl Lifecycle {
    /// Current stage.
    #[must_use]
    pub const fn stage(&self) -> Stage {
        self.stage
    }

    /// Shape of the forward output, once known.
    #[must_use]
    pub const fn out_dims(&self) -> (usize, usize) {
        self.out_dims
    }

    /// Fails unless `forward` may run now.
    ///
    /// # Errors
    ///
    /// [`Error::Lifecycle`] after a previous successful `forward`.
    pub fn check_forward(&self, op: &'static str) -> Result<()> {
        if self.stage != Stage::Constructed {
            return Err(Error::Lifecycle {
                op,
                call: "forward",
                stage: self.stage,
            });
        }
        Ok(())
    }

    /// Records a successful `forward` producing `y`.
    pub fn forwarded(&mut self, y: &Matrix) {
        self.stage = Stage::Forwarded;
        self.out_dims = y.dims();
    }

    /// Fails unless `backward` may run now with `gy`.
    ///
    /// `gy` must have the output's shape, or be a vector of the same size.
    ///
    /// # Errors
    ///
    /// [`Error::Lifecycle`] out of order, [`Error::DimensionMismatch`] for a bad `gy`.
    pub fn check_backward(&self, op: &'static str, gy: &Matrix) -> Result<()> {
        if self.stage != Stage::Forwarded {
            return Err(Error::Lifecycle {
                op,
                call: "backward",
                stage: self.stage,
            });
        }
        match broadcast(op, gy.dims(), self.out_dims)? {
            Broadcast::Same | Broadcast::Vectors => Ok(()),
            _ => Err(Error::DimensionMismatch {
                op,
                lhs_rows: gy.rows(),
                lhs_cols: gy.cols(),
                rhs_rows: self.out_dims.0,
                rhs_cols: self.out_dims.1,
            }),
        }
    }

    /// Records a successful `backward`.
    pub fn backpropagated(&mut self) {
        self.stage = Stage::Backpropagated;
    }
}

/// A leaf operand that accumulates the gradients sent to it.
///
/// The first gradient is stored as is; later ones are added into it and
/// their buffers go back to the pool.
#[derive(Debug)]
pub struct Variable {
    value: Matrix,
    requires_grad: bool,
    grad: Mutex<Option<Matrix>>,
}

impl Variable {
    /// New shared variable.
    pub fn new(value: impl Into<Matrix>, requires_grad: bool) -> Arc<Self> {
        Arc::new(Self {
            value: value.into(),
            requires_grad,
            grad: Mutex::new(None),
        })
    }

    /// A value that never receives gradients.
    pub fn constant(value: impl Into<Matrix>) -> Arc<Self> {
        Self::new(value, false)
    }

    /// A 1x1 variable.
    pub fn scalar(value: f32, requires_grad: bool) -> Arc<Self> {
        Self::new(Dense::scalar(value), requires_grad)
    }

    /// Copy of the accumulated gradient.
    #[must_use]
    pub fn grad(&self) -> Option<Matrix> {
        self.grad.lock().clone()
    }

    /// Removes and returns the accumulated gradient.
    #[must_use]
    pub fn take_grad(&self) -> Option<Matrix> {
        self.grad.lock().take()
    }

    /// Whether any gradient has arrived.
    #[must_use]
    pub fn has_grad(&self) -> bool {
        self.grad.lock().is_some()
    }

    /// Drops the accumulated gradient, returning its buffer to the pool.
    pub fn zero_grad(&self) {
        if let Some(g) = self.grad.lock().take() {
            g.recycle();
        }
    }
}

impl Operand for Variable {
    fn value(&self) -> &Matrix {
        &self.value
    }

    fn requires_grad(&self) -> bool {
        self.requires_grad
    }

    fn propagate_grad(&self, grad: Matrix) -> Result<()> {
        if grad.dims() != self.value.dims() {
            return Err(Error::DimensionMismatch {
                op: "Variable::propagate_grad",
                lhs_rows: grad.rows(),
                lhs_cols: grad.cols(),
                rhs_rows: self.value.rows(),
                rhs_cols: self.value.cols(),
            });
        }
        let mut slot = self.grad.lock();
        match slot.as_mut() {
            None => *slot = Some(grad),
            Some(acc) => {
                acc.add_assign(&grad)?;
                grad.recycle();
            }
        }
        Ok(())
    }
}

/// Sends the gradient produced by `grad` to `x`, if `x` wants one.
///
/// `grad` is not evaluated otherwise.
pub(crate) fn route(x: &OperandRef, grad: impl FnOnce() -> Result<Dense>) -> Result<()> {
    if x.requires_grad() {
        let g = grad()?;
        x.propagate_grad(g.into())?;
    }
    Ok(())
}

/// Sends the 1x1 gradient `Σ grad()` to a scalar operand.
pub(crate) fn route_scalar(x: &OperandRef, grad: impl FnOnce() -> Result<f32>) -> Result<()> {
    route(x, || Ok(Dense::scalar(grad()?)))
}

/// Reads a scalar operand.
pub(crate) fn scalar_of(op: &'static str, x: &OperandRef) -> Result<f32> {
    let v = x.value();
    if !v.is_scalar() {
        return Err(Error::NotScalar {
            op,
            rows: v.rows(),
            cols: v.cols(),
        });
    }
    v.scalar_value()
}

/// Folds a gradient of the broadcast output shape back onto an operand of `dims`.
///
/// Same-size gradients are reshaped in place; a vector operand that was
/// spread over rows receives the row sums.
pub(crate) fn unbroadcast(op: &'static str, mut g: Dense, dims: (usize, usize)) -> Result<Dense> {
    if g.dims() == dims {
        return Ok(g);
    }
    if g.size() == dims.0 * dims.1 {
        g.reshape_in_place(dims.0, dims.1)?;
        return Ok(g);
    }
    if (dims.0 == 1 || dims.1 == 1) && dims.0 * dims.1 == g.rows() {
        let cols = g.cols();
        let mut out = Dense::dirty(dims.0, dims.1);
        for (o, row) in out.data_mut().iter_mut().zip(g.data().chunks(cols)) {
            *o = row.iter().sum();
        }
        g.recycle();
        return Ok(out);
    }
    Err(Error::DimensionMismatch {
        op,
        lhs_rows: g.rows(),
        lhs_cols: g.cols(),
        rhs_rows: dims.0,
        rhs_cols: dims.1,
    })
}

/// `gy` as a dense matrix shaped like the forward output.
pub(crate) fn dense_grad(gy: &Matrix, dims: (usize, usize)) -> Result<Dense> {
    let mut g = gy.to_dense();
    if g.dims() != dims {
        g.reshape_in_place(dims.0, dims.1)?;
    }
    Ok(g)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variable_accumulates() {
        let v = Variable::new(Dense::vec(&[1.0, 2.0]), true);
        v.propagate_grad(Dense::vec(&[1.0, 1.0]).into()).unwrap();
        v.propagate_grad(Dense::vec(&[0.5, -1.0]).into()).unwrap();
        assert_eq!(v.grad().unwrap().to_dense().data(), &[1.5, 0.0]);
        let g = v.take_grad().unwrap();
        assert_eq!(g.dims(), (2, 1));
        assert!(!v.has_grad());
    }

    #[test]
    fn variable_rejects_wrong_shape() {
        let v = Variable::new(Dense::zeros(2, 2), true);
        assert!(v.propagate_grad(Dense::zeros(4, 1).into()).is_err());
        assert!(!v.has_grad());
    }

    #[test]
    fn zero_grad_clears() {
        let v = Variable::scalar(1.0, true);
        v.propagate_grad(Dense::scalar(3.0).into()).unwrap();
        v.zero_grad();
        assert!(v.grad().is_none());
    }

    #[test]
    fn route_skips_constants() {
        let c: OperandRef = Variable::constant(Dense::zeros(1, 1));
        route(&c, || panic!("gradient of a constant must not be computed")).unwrap();
    }

    #[test]
    fn unbroadcast_sums_rows() {
        let g = Dense::new(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let r = unbroadcast("t", g, (2, 1)).unwrap();
        assert_eq!(r.data(), &[6.0, 15.0]);
        let g = Dense::vec(&[1.0, 2.0]);
        assert_eq!(unbroadcast("t", g, (1, 2)).unwrap().dims(), (1, 2));
        assert!(unbroadcast("t", Dense::zeros(2, 3), (3, 1)).is_err());
    }

    #[test]
    fn lifecycle_order() {
        let mut life = Lifecycle::default();
        let y = Matrix::from(Dense::zeros(2, 1));
        assert!(life.check_backward("t", &y).is_err());
        life.check_forward("t").unwrap();
        life.forwarded(&y);
        assert!(life.check_forward("t").is_err());
        assert!(life.check_backward("t", &Dense::zeros(3, 1).into()).is_err());
        life.check_backward("t", &Dense::zeros(1, 2).into()).unwrap();
        life.backpropagated();
        assert!(matches!(
            life.check_backward("t", &y),
            Err(Error::Lifecycle { stage: Stage::Backpropagated, .. })
        ));
    }
}
