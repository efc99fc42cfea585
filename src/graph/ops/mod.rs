//! The differentiable operator library.
//!
//! Every operator is a plain struct built from its operands and driven
//! through [`Function`](crate::graph::Function): one `forward`, then at most
//! one `backward` with the gradient of the output.
//!
//! ```
//! use briny_grad::graph::{Function, OperandRef, Variable};
//! use briny_grad::graph::ops::{Activation, ReduceSum, Unary};
//! use briny_grad::mat::{Dense, Matrix};
//!
//! let x = Variable::new(Dense::vec(&[-1.0, 2.0]), true);
//! let mut relu = Unary::new(Activation::ReLU, x.clone()).unwrap();
//! let h = Variable::new(relu.forward().unwrap(), true);
//! let mut sum = ReduceSum::new(h.clone() as OperandRef);
//! assert_eq!(sum.forward().unwrap().scalar_value().unwrap(), 2.0);
//!
//! sum.backward(&Matrix::from(Dense::scalar(1.0))).unwrap();
//! relu.backward(&h.take_grad().unwrap()).unwrap();
//! assert_eq!(x.grad().unwrap().to_dense().data(), &[0.0, 1.0]);
//! ```

mod arith;
mod dropout;
mod pooling;
mod reduce;
mod shape;
mod softmax;
mod unary;

pub use arith::{Add, Div, Dot, Maximum, Minimum, Mul, Pow, Prod, ScalarKind, ScalarOp, Sub};
pub use dropout::Dropout;
pub use pooling::MaxPooling;
pub use reduce::{ReduceMax, ReduceMean, ReduceSum};
pub use shape::{AtVec, ColView, Concat, Identity, Reshape, RowView, Stack, Transpose, View};
pub use softmax::{LogSoftmax, Softmax, SparseMax, SparseMaxLoss};
pub use unary::{Activation, Log, Swish, Unary};
