//! Probability operators.
//!
//! A vector operand is treated as one distribution. Any other matrix is
//! treated row by row, each row being its own distribution.

use crate::error::{Error, Result};
use crate::graph::{Function, Lifecycle, OperandRef, dense_grad, route};
use crate::mat::{Dense, Matrix};
use crate::pool::Scratch;
use crate::scalar;

/// `(count, len)` of the distributions inside a matrix of `dims`.
const fn groups(dims: (usize, usize)) -> (usize, usize) {
    let (rows, cols) = dims;
    if rows == 1 || cols == 1 {
        (1, rows * cols)
    } else {
        (rows, cols)
    }
}

fn softmax_into(x: &[f32], out: &mut [f32]) {
    let max = x.iter().copied().fold(f32::NEG_INFINITY, scalar::max);
    let mut sum = 0.0;
    for (o, &v) in out.iter_mut().zip(x) {
        *o = scalar::exp(v - max);
        sum += *o;
    }
    for o in out.iter_mut() {
        *o /= sum;
    }
}

/// Sparsemax threshold `tau` of one distribution.
fn sparsemax_threshold(z: &[f32]) -> f32 {
    let mut sorted = z.to_vec();
    sorted.sort_unstable_by(|a, b| b.total_cmp(a));
    let mut cumsum = 0.0;
    let mut tau = 0.0;
    for (k, &v) in sorted.iter().enumerate() {
        cumsum += v;
        #[allow(clippy::cast_precision_loss)]
        let k = (k + 1) as f32;
        if 1.0 + k * v > cumsum {
            tau = (cumsum - 1.0) / k;
        }
    }
    tau
}

fn sparsemax_of(x: &Dense) -> Dense {
    let (count, len) = groups(x.dims());
    let mut y = Dense::dirty(x.rows(), x.cols());
    for (src, dst) in x.data().chunks(len.max(1)).zip(y.data_mut().chunks_mut(len.max(1))).take(count) {
        let tau = sparsemax_threshold(src);
        for (o, &v) in dst.iter_mut().zip(src) {
            *o = if v > tau { v - tau } else { 0.0 };
        }
    }
    y
}

fn cached<'a>(op: &'static str, y: Option<&'a Dense>) -> Result<&'a Dense> {
    y.ok_or(Error::Unsupported(op))
}

/// Numerically stable softmax.
pub struct Softmax {
    x: OperandRef,
    y: Option<Dense>,
    life: Lifecycle,
}

impl Softmax {
    /// Builds the operator.
    #[must_use]
    pub fn new(x: OperandRef) -> Self {
        Self {
            x,
            y: None,
            life: Lifecycle::default(),
        }
    }
}

impl Function for Softmax {
    fn forward(&mut self) -> Result<Matrix> {
        self.life.check_forward("Softmax")?;
        let x = self.x.value().dense();
        let (count, len) = groups(x.dims());
        let mut y = Dense::dirty(x.rows(), x.cols());
        for (src, dst) in x.data().chunks(len.max(1)).zip(y.data_mut().chunks_mut(len.max(1))).take(count) {
            softmax_into(src, dst);
        }
        self.y = Some(y.clone());
        let y = Matrix::from(y);
        self.life.forwarded(&y);
        Ok(y)
    }

    /// Multiplies each distribution's Jacobian `diag(y) - y·yᵗ` by its
    /// slice of the output gradient.
    fn backward(&mut self, gy: &Matrix) -> Result<()> {
        self.life.check_backward("Softmax", gy)?;
        let y = cached("Softmax", self.y.as_ref())?;
        route(&self.x, || {
            let (count, len) = groups(y.dims());
            let g = Scratch::new(dense_grad(gy, y.dims())?);
            let mut gx = Dense::dirty(y.rows(), y.cols());
            for k in 0..count {
                let range = k * len..(k + 1) * len;
                let yk = &y.data()[range.clone()];
                let jacobian = Scratch::new(Dense::from_fn(len, len, |i, j| {
                    if i == j {
                        yk[i] * (1.0 - yk[i])
                    } else {
                        -yk[i] * yk[j]
                    }
                }));
                let gk = Scratch::new(Dense::vec(&g.data()[range.clone()]));
                let part = Scratch::new(jacobian.mul_dense(&gk)?);
                gx.data_mut()[range].copy_from_slice(part.data());
            }
            Ok(gx)
        })?;
        if let Some(y) = self.y.take() {
            y.recycle();
        }
        self.life.backpropagated();
        Ok(())
    }

    fn operands(&self) -> Vec<OperandRef> {
        vec![self.x.clone()]
    }
}

/// `log(softmax(x))`, computed without forming the softmax first.
pub struct LogSoftmax {
    x: OperandRef,
    probs: Option<Dense>,
    life: Lifecycle,
}

impl LogSoftmax {
    /// Builds the operator.
    #[must_use]
    pub fn new(x: OperandRef) -> Self {
        Self {
            x,
            probs: None,
            life: Lifecycle::default(),
        }
    }
}

impl Function for LogSoftmax {
    fn forward(&mut self) -> Result<Matrix> {
        self.life.check_forward("LogSoftmax")?;
        let x = self.x.value().dense();
        let (count, len) = groups(x.dims());
        let mut y = Dense::dirty(x.rows(), x.cols());
        let mut probs = Dense::dirty(x.rows(), x.cols());
        for ((src, dst), p) in x
            .data()
            .chunks(len.max(1))
            .zip(y.data_mut().chunks_mut(len.max(1)))
            .zip(probs.data_mut().chunks_mut(len.max(1)))
            .take(count)
        {
            let max = src.iter().copied().fold(f32::NEG_INFINITY, scalar::max);
            let lse = max + src.iter().map(|&v| scalar::exp(v - max)).sum::<f32>().ln();
            for ((o, q), &v) in dst.iter_mut().zip(p.iter_mut()).zip(src) {
                *o = v - lse;
                *q = scalar::exp(*o);
            }
        }
        self.probs = Some(probs);
        let y = Matrix::from(y);
        self.life.forwarded(&y);
        Ok(y)
    }

    fn backward(&mut self, gy: &Matrix) -> Result<()> {
        self.life.check_backward("LogSoftmax", gy)?;
        let probs = cached("LogSoftmax", self.probs.as_ref())?;
        route(&self.x, || {
            let (count, len) = groups(probs.dims());
            let mut gx = dense_grad(gy, probs.dims())?;
            for (g, p) in gx.data_mut().chunks_mut(len.max(1)).zip(probs.data().chunks(len.max(1))).take(count) {
                let total: f32 = g.iter().sum();
                for (gi, &pi) in g.iter_mut().zip(p) {
                    *gi -= pi * total;
                }
            }
            Ok(gx)
        })?;
        if let Some(p) = self.probs.take() {
            p.recycle();
        }
        self.life.backpropagated();
        Ok(())
    }

    fn operands(&self) -> Vec<OperandRef> {
        vec![self.x.clone()]
    }
}

/// Euclidean projection onto the probability simplex.
///
/// Unlike softmax the result has exact zeros, and the gradient only flows
/// through the non-zero support.
pub struct SparseMax {
    x: OperandRef,
    y: Option<Dense>,
    life: Lifecycle,
}

impl SparseMax {
    /// Builds the operator.
    #[must_use]
    pub fn new(x: OperandRef) -> Self {
        Self {
            x,
            y: None,
            life: Lifecycle::default(),
        }
    }
}

impl Function for SparseMax {
    fn forward(&mut self) -> Result<Matrix> {
        self.life.check_forward("SparseMax")?;
        let y = sparsemax_of(&self.x.value().dense());
        self.y = Some(y.clone());
        let y = Matrix::from(y);
        self.life.forwarded(&y);
        Ok(y)
    }

    fn backward(&mut self, gy: &Matrix) -> Result<()> {
        self.life.check_backward("SparseMax", gy)?;
        let y = cached("SparseMax", self.y.as_ref())?;
        route(&self.x, || {
            let (count, len) = groups(y.dims());
            let mut gx = dense_grad(gy, y.dims())?;
            for (g, yk) in gx.data_mut().chunks_mut(len.max(1)).zip(y.data().chunks(len.max(1))).take(count) {
                let (mut total, mut support) = (0.0, 0_u32);
                for (&gi, &yi) in g.iter().zip(yk) {
                    if yi != 0.0 {
                        total += gi;
                        support += 1;
                    }
                }
                #[allow(clippy::cast_precision_loss)]
                let mean = if support == 0 { 0.0 } else { total / support as f32 };
                for (gi, &yi) in g.iter_mut().zip(yk) {
                    *gi = if yi == 0.0 { 0.0 } else { *gi - mean };
                }
            }
            Ok(gx)
        })?;
        if let Some(y) = self.y.take() {
            y.recycle();
        }
        self.life.backpropagated();
        Ok(())
    }

    fn operands(&self) -> Vec<OperandRef> {
        vec![self.x.clone()]
    }
}

/// `y = x - tau(x)`, the shifted logits whose gradient is that of the
/// sparsemax loss.
pub struct SparseMaxLoss {
    x: OperandRef,
    probs: Option<Dense>,
    life: Lifecycle,
}

impl SparseMaxLoss {
    /// Builds the operator.
    #[must_use]
    pub fn new(x: OperandRef) -> Self {
        Self {
            x,
            probs: None,
            life: Lifecycle::default(),
        }
    }
}

impl Function for SparseMaxLoss {
    fn forward(&mut self) -> Result<Matrix> {
        self.life.check_forward("SparseMaxLoss")?;
        let x = self.x.value().dense();
        let (count, len) = groups(x.dims());
        let mut y = Dense::dirty(x.rows(), x.cols());
        for (src, dst) in x.data().chunks(len.max(1)).zip(y.data_mut().chunks_mut(len.max(1))).take(count) {
            let tau = sparsemax_threshold(src);
            for (o, &v) in dst.iter_mut().zip(src) {
                *o = v - tau;
            }
        }
        self.probs = Some(sparsemax_of(&x));
        let y = Matrix::from(y);
        self.life.forwarded(&y);
        Ok(y)
    }

    fn backward(&mut self, gy: &Matrix) -> Result<()> {
        self.life.check_backward("SparseMaxLoss", gy)?;
        let probs = cached("SparseMaxLoss", self.probs.as_ref())?;
        route(&self.x, || {
            let (count, len) = groups(probs.dims());
            let mut gx = dense_grad(gy, probs.dims())?;
            for (g, p) in gx.data_mut().chunks_mut(len.max(1)).zip(probs.data().chunks(len.max(1))).take(count) {
                let total: f32 = g.iter().sum();
                for (gi, &pi) in g.iter_mut().zip(p) {
                    *gi -= pi * total;
                }
            }
            Ok(gx)
        })?;
        if let Some(p) = self.probs.take() {
            p.recycle();
        }
        self.life.backpropagated();
        Ok(())
    }

    fn operands(&self) -> Vec<OperandRef> {
        vec![self.x.clone()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approx::{ApproxEquality, RelativeEq};
    use crate::graph::Variable;

    fn near(a: f32, b: f32) -> bool {
        a.approx_eq(&b) <= ApproxEquality::Partial
    }

    #[test]
    fn softmax_reference_values() {
        let x = Variable::new(Dense::vec(&[-0.41, -1.08, 0.0, 0.87, -0.19, -0.75]), true);
        let mut f = Softmax::new(x.clone());
        let y = f.forward().unwrap().to_dense();
        let want = [0.116_645_1, 0.059_688_2, 0.175_762_9, 0.419_530_4, 0.145_348_7, 0.083_024];
        for (&got, &want) in y.data().iter().zip(&want) {
            assert!(near(got, want), "{got} vs {want}");
        }
        assert!(near(y.sum(), 1.0));
    }

    #[test]
    fn softmax_gradient_of_uniform_upstream_is_zero() {
        let x = Variable::new(Dense::vec(&[0.3, -2.0, 1.1]), true);
        let mut f = Softmax::new(x.clone());
        f.forward().unwrap();
        f.backward(&Dense::filled(3, 1, 1.0).into()).unwrap();
        for &g in x.grad().unwrap().to_dense().data() {
            assert!(g.abs() < 1e-6);
        }
    }

    #[test]
    fn softmax_gradient_matches_jacobian() {
        let x = Variable::new(Dense::vec(&[0.5, 0.1]), true);
        let mut f = Softmax::new(x.clone());
        let y = f.forward().unwrap().to_dense();
        f.backward(&Dense::vec(&[1.0, 0.0]).into()).unwrap();
        let (y0, y1) = (y.data()[0], y.data()[1]);
        let g = x.grad().unwrap().to_dense();
        assert!(near(g.data()[0], y0 * (1.0 - y0)));
        assert!(near(g.data()[1], -y0 * y1));
    }

    #[test]
    fn softmax_is_row_wise_for_matrices() {
        let x = Variable::constant(Dense::new(2, 2, &[0.0, 0.0, 1000.0, 1000.0]).unwrap());
        let mut f = Softmax::new(x);
        assert_eq!(f.forward().unwrap().to_dense().data(), &[0.5; 4]);
    }

    #[test]
    fn log_softmax_agrees_with_softmax() {
        let data = [1.0, 2.0, -0.5];
        let mut s = Softmax::new(Variable::constant(Dense::vec(&data)));
        let x = Variable::new(Dense::vec(&data), true);
        let mut l = LogSoftmax::new(x.clone());
        let p = s.forward().unwrap().to_dense();
        let lp = l.forward().unwrap().to_dense();
        for (&a, &b) in p.data().iter().zip(lp.data()) {
            assert!(near(a.ln(), b));
        }
        l.backward(&Dense::vec(&[0.0, 1.0, 0.0]).into()).unwrap();
        let g = x.grad().unwrap().to_dense();
        assert!(near(g.data()[1], 1.0 - p.data()[1]));
        assert!(near(g.data()[0], -p.data()[0]));
    }

    #[test]
    fn sparsemax_projects_onto_simplex() {
        let x = Variable::new(Dense::vec(&[0.8, 0.6, -1.0]), true);
        let mut f = SparseMax::new(x.clone());
        let y = f.forward().unwrap().to_dense();
        assert!(near(y.data()[0], 0.6));
        assert!(near(y.data()[1], 0.4));
        assert_eq!(y.data()[2], 0.0);

        f.backward(&Dense::vec(&[1.0, 3.0, 5.0]).into()).unwrap();
        assert_eq!(x.grad().unwrap().to_dense().data(), &[-1.0, 1.0, 0.0]);
    }

    #[test]
    fn sparsemax_loss_gradient() {
        let x = Variable::new(Dense::vec(&[0.8, 0.6, -1.0]), true);
        let mut f = SparseMaxLoss::new(x.clone());
        let y = f.forward().unwrap().to_dense();
        assert!(near(y.data()[0], 0.6));
        assert!(near(y.data()[2], -1.2));

        f.backward(&Dense::vec(&[1.0, 0.0, 0.0]).into()).unwrap();
        let g = x.grad().unwrap().to_dense();
        assert!(near(g.data()[0], 0.4));
        assert!(near(g.data()[1], -0.4));
        assert_eq!(g.data()[2], 0.0);
    }
}
