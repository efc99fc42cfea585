//! Element-wise activations.
//!
//! Every activation is a pair of scalar functions, the value `f(x, p)` and
//! its derivative `f'(x, p)`, where `p` holds the activation's parameters.
//! [`Unary`] evaluates them through
//! [`Dense::apply_with_alpha`](crate::mat::Dense::apply_with_alpha), so a
//! new activation only needs its two formulas.
//!
//! | kind | parameters |
//! |---|---|
//! | `ELU`, `CELU`, `LeakyReLU` | `alpha` |
//! | `SELU` | `alpha`, `scale` |
//! | `SoftPlus` | `beta`, `threshold` |
//! | `Threshold` | `threshold`, `value` |
//! | everything else | none |
//!
//! Parameters are 1x1 operands. They are read on every call but receive
//! no gradient; [`Swish`] is the one activation with a trainable parameter.

use crate::error::{Error, Result};
use crate::graph::{Function, Lifecycle, OperandRef, dense_grad, route, route_scalar, scalar_of};
use crate::mat::{Dense, Matrix};
use crate::pool::Scratch;
use crate::scalar;

/// The element-wise function applied by a [`Unary`] operator.
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    /// Hyperbolic tangent.
    Tanh,
    /// Logistic function.
    Sigmoid,
    /// `clamp(0.2x + 0.5, 0, 1)`.
    HardSigmoid,
    /// `clamp(x, -1, 1)`.
    HardTanh,
    /// `max(0, x)`.
    ReLU,
    /// `x / (1 + |x|)`.
    Softsign,
    /// Cosine.
    Cos,
    /// Sine.
    Sin,
    /// Exponential.
    Exp,
    /// `-x`.
    Neg,
    /// `1 / x`.
    Reciprocal,
    /// `|x|`.
    Abs,
    /// `x · tanh(softplus(x))`.
    Mish,
    /// Gaussian error linear unit (tanh approximation).
    GELU,
    /// `x · sigmoid(x)`.
    SiLU,
    /// Square root.
    Sqrt,
    /// `x²`.
    Square,
    /// `x` above zero, `alpha · (eˣ - 1)` below.
    ELU,
    /// `max(0, x) + min(0, alpha · (e^(x/alpha) - 1))`.
    CELU,
    /// `scale · ELU(x, alpha)`.
    SELU,
    /// `x` above zero, `alpha · x` below.
    LeakyReLU,
    /// `ln(1 + e^(beta·x)) / beta`, linear once `beta·x > threshold`.
    SoftPlus,
    /// `x` above `threshold`, `value` otherwise.
    Threshold,
}

impl Activation {
    /// Number of parameters the activation takes.
    #[must_use]
    pub const fn arity(self) -> usize {
        match self {
            Self::ELU | Self::CELU | Self::LeakyReLU => 1,
            Self::SELU | Self::SoftPlus | Self::Threshold => 2,
            _ => 0,
        }
    }

    /// Value at `x`.
    #[must_use]
    pub fn f(self, x: f32, p: &[f32]) -> f32 {
        match self {
            Self::Tanh => scalar::tanh(x),
            Self::Sigmoid => scalar::sigmoid(x),
            Self::HardSigmoid => scalar::clamp(0.2 * x + 0.5, 0.0, 1.0),
            Self::HardTanh => scalar::clamp(x, -1.0, 1.0),
            Self::ReLU => {
                if x > 0.0 {
                    x
                } else {
                    0.0
                }
            }
            Self::Softsign => x / (1.0 + x.abs()),
            Self::Cos => x.cos(),
            Self::Sin => x.sin(),
            Self::Exp => scalar::exp(x),
            Self::Neg => -x,
            Self::Reciprocal => 1.0 / x,
            Self::Abs => x.abs(),
            Self::Mish => scalar::mish(x),
            Self::GELU => scalar::gelu(x),
            Self::SiLU => x * scalar::sigmoid(x),
            Self::Sqrt => scalar::sqrt(x),
            Self::Square => x * x,
            Self::ELU => elu(x, p[0]),
            Self::CELU => {
                if x > 0.0 {
                    x
                } else {
                    p[0] * (scalar::exp(x / p[0]) - 1.0)
                }
            }
            Self::SELU => p[1] * elu(x, p[0]),
            Self::LeakyReLU => {
                if x > 0.0 {
                    x
                } else {
                    p[0] * x
                }
            }
            Self::SoftPlus => scalar::softplus(x, p[0], p[1]),
            Self::Threshold => {
                if x > p[0] {
                    x
                } else {
                    p[1]
                }
            }
        }
    }

    /// Derivative at `x`.
    #[must_use]
    pub fn df(self, x: f32, p: &[f32]) -> f32 {
        let step = |inside: bool| if inside { 1.0 } else { 0.0 };
        match self {
            Self::Tanh => {
                let t = scalar::tanh(x);
                1.0 - t * t
            }
            Self::Sigmoid => {
                let s = scalar::sigmoid(x);
                s * (1.0 - s)
            }
            Self::HardSigmoid => 0.2 * step(x > -2.5 && x < 2.5),
            Self::HardTanh => step(x > -1.0 && x < 1.0),
            Self::ReLU => step(x > 0.0),
            Self::Softsign => {
                let d = 1.0 + x.abs();
                1.0 / (d * d)
            }
            Self::Cos => -x.sin(),
            Self::Sin => x.cos(),
            Self::Exp => scalar::exp(x),
            Self::Neg => -1.0,
            Self::Reciprocal => -1.0 / (x * x),
            Self::Abs => {
                if x > 0.0 {
                    1.0
                } else if x < 0.0 {
                    -1.0
                } else {
                    0.0
                }
            }
            Self::Mish => scalar::mish_derivative(x),
            Self::GELU => scalar::gelu_derivative(x),
            Self::SiLU => {
                let s = scalar::sigmoid(x);
                s + x * s * (1.0 - s)
            }
            Self::Sqrt => 0.5 / scalar::sqrt(x),
            Self::Square => 2.0 * x,
            Self::ELU => elu_derivative(x, p[0]),
            Self::CELU => {
                if x > 0.0 {
                    1.0
                } else {
                    scalar::exp(x / p[0])
                }
            }
            Self::SELU => p[1] * elu_derivative(x, p[0]),
            Self::LeakyReLU => {
                if x > 0.0 {
                    1.0
                } else {
                    p[0]
                }
            }
            Self::SoftPlus => {
                if p[0] * x > p[1] {
                    1.0
                } else {
                    scalar::sigmoid(p[0] * x)
                }
            }
            Self::Threshold => step(x > p[0]),
        }
    }
}

fn elu(x: f32, alpha: f32) -> f32 {
    if x > 0.0 {
        x
    } else {
        alpha * (scalar::exp(x) - 1.0)
    }
}

fn elu_derivative(x: f32, alpha: f32) -> f32 {
    if x > 0.0 { 1.0 } else { alpha * scalar::exp(x) }
}

/// `y = f(x)` for an [`Activation`] `f`.
pub struct Unary {
    x: OperandRef,
    kind: Activation,
    params: Vec<OperandRef>,
    life: Lifecycle,
}

impl Unary {
    /// Builds a parameterless activation.
    ///
    /// # Errors
    ///
    /// [`Error::Arity`] if `kind` needs parameters.
    pub fn new(kind: Activation, x: OperandRef) -> Result<Self> {
        Self::with_params(kind, x, Vec::new())
    }

    /// Builds an activation with its 1x1 parameters.
    ///
    /// # Errors
    ///
    /// [`Error::Arity`] if `params` has the wrong length.
    pub fn with_params(kind: Activation, x: OperandRef, params: Vec<OperandRef>) -> Result<Self> {
        if params.len() != kind.arity() {
            return Err(Error::Arity {
                op: "Unary",
                expected: kind.arity(),
                got: params.len(),
            });
        }
        Ok(Self {
            x,
            kind,
            params,
            life: Lifecycle::default(),
        })
    }

    /// The activation applied.
    #[must_use]
    pub const fn kind(&self) -> Activation {
        self.kind
    }

    fn param_values(&self) -> Result<Vec<f32>> {
        self.params.iter().map(|p| scalar_of("Unary", p)).collect()
    }
}

impl Function for Unary {
    fn forward(&mut self) -> Result<Matrix> {
        self.life.check_forward("Unary")?;
        let p = self.param_values()?;
        let kind = self.kind;
        let y = Matrix::from(
            self.x
                .value()
                .dense()
                .apply_with_alpha(|_, _, v, a| kind.f(v, a), &p),
        );
        self.life.forwarded(&y);
        Ok(y)
    }

    fn backward(&mut self, gy: &Matrix) -> Result<()> {
        self.life.check_backward("Unary", gy)?;
        let p = self.param_values()?;
        let kind = self.kind;
        route(&self.x, || {
            let x = self.x.value().dense();
            let xd = x.data();
            let cols = x.cols();
            let g = Scratch::new(dense_grad(gy, x.dims())?);
            Ok(g.apply_with_alpha(|i, j, v, a| v * kind.df(xd[i * cols + j], a), &p))
        })?;
        self.life.backpropagated();
        Ok(())
    }

    fn operands(&self) -> Vec<OperandRef> {
        let mut ops = vec![self.x.clone()];
        ops.extend(self.params.iter().cloned());
        ops
    }
}

/// Natural logarithm with `log(0)` mapped to `log(1e-8)`.
pub struct Log {
    x: OperandRef,
    life: Lifecycle,
}

impl Log {
    /// Builds the operator.
    #[must_use]
    pub fn new(x: OperandRef) -> Self {
        Self {
            x,
            life: Lifecycle::default(),
        }
    }
}

impl Function for Log {
    /// # Errors
    ///
    /// [`Error::NegativeLog`] if any element is negative.
    fn forward(&mut self) -> Result<Matrix> {
        self.life.check_forward("Log")?;
        let x = self.x.value().dense();
        let mut y = Dense::dirty(x.rows(), x.cols());
        for (o, &v) in y.data_mut().iter_mut().zip(x.data()) {
            *o = scalar::safe_log(v)?;
        }
        let y = Matrix::from(y);
        self.life.forwarded(&y);
        Ok(y)
    }

    fn backward(&mut self, gy: &Matrix) -> Result<()> {
        self.life.check_backward("Log", gy)?;
        route(&self.x, || {
            let x = self.x.value().dense();
            let xd = x.data();
            let cols = x.cols();
            let g = Scratch::new(dense_grad(gy, x.dims())?);
            Ok(g.apply(|i, j, v| {
                let xv = xd[i * cols + j];
                v / if xv == 0.0 { scalar::LOG_EPSILON } else { xv }
            }))
        })?;
        self.life.backpropagated();
        Ok(())
    }

    fn operands(&self) -> Vec<OperandRef> {
        vec![self.x.clone()]
    }
}

/// `y = x · sigmoid(beta · x)` with a trainable 1x1 `beta`.
pub struct Swish {
    x: OperandRef,
    beta: OperandRef,
    life: Lifecycle,
}

impl Swish {
    /// Builds the operator.
    #[must_use]
    pub fn new(x: OperandRef, beta: OperandRef) -> Self {
        Self {
            x,
            beta,
            life: Lifecycle::default(),
        }
    }
}

impl Function for Swish {
    fn forward(&mut self) -> Result<Matrix> {
        self.life.check_forward("Swish")?;
        let b = scalar_of("Swish", &self.beta)?;
        let y = Matrix::from(self.x.value().dense().apply(|_, _, v| v * scalar::sigmoid(b * v)));
        self.life.forwarded(&y);
        Ok(y)
    }

    fn backward(&mut self, gy: &Matrix) -> Result<()> {
        self.life.check_backward("Swish", gy)?;
        let b = scalar_of("Swish", &self.beta)?;
        let x = self.x.value().dense();
        let g = Scratch::new(dense_grad(gy, x.dims())?);
        let xd = x.data();
        let cols = x.cols();
        route(&self.x, || {
            Ok(g.apply(|i, j, v| {
                let xv = xd[i * cols + j];
                let s = scalar::sigmoid(b * xv);
                v * (s + b * xv * s * (1.0 - s))
            }))
        })?;
        route_scalar(&self.beta, || {
            Ok(g.data()
                .iter()
                .zip(xd)
                .map(|(&v, &xv)| {
                    let s = scalar::sigmoid(b * xv);
                    v * xv * xv * s * (1.0 - s)
                })
                .sum())
        })?;
        self.life.backpropagated();
        Ok(())
    }

    fn operands(&self) -> Vec<OperandRef> {
        vec![self.x.clone(), self.beta.clone()]
    }
}
