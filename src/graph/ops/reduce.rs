//! Reductions to a 1x1 value.

use crate::error::Result;
use crate::graph::{Function, Lifecycle, OperandRef, route};
use crate::mat::{Dense, Matrix};

/// `y = Σ x`.
pub struct ReduceSum {
    x: OperandRef,
    life: Lifecycle,
}

impl ReduceSum {
    /// Builds the operator.
    #[must_use]
    pub fn new(x: OperandRef) -> Self {
        Self {
            x,
            life: Lifecycle::default(),
        }
    }
}

impl Function for ReduceSum {
    fn forward(&mut self) -> Result<Matrix> {
        self.life.check_forward("ReduceSum")?;
        let y = Matrix::from(Dense::scalar(self.x.value().sum()));
        self.life.forwarded(&y);
        Ok(y)
    }

    fn backward(&mut self, gy: &Matrix) -> Result<()> {
        self.life.check_backward("ReduceSum", gy)?;
        let g = gy.scalar_value()?;
        route(&self.x, || {
            let (rows, cols) = self.x.value().dims();
            Ok(Dense::filled(rows, cols, g))
        })?;
        self.life.backpropagated();
        Ok(())
    }

    fn operands(&self) -> Vec<OperandRef> {
        vec![self.x.clone()]
    }
}

/// `y = Σ x / n`.
pub struct ReduceMean {
    x: OperandRef,
    life: Lifecycle,
}

impl ReduceMean {
    /// Builds the operator.
    #[must_use]
    pub fn new(x: OperandRef) -> Self {
        Self {
            x,
            life: Lifecycle::default(),
        }
    }
}

impl Function for ReduceMean {
    fn forward(&mut self) -> Result<Matrix> {
        self.life.check_forward("ReduceMean")?;
        let x = self.x.value();
        #[allow(clippy::cast_precision_loss)]
        let y = Matrix::from(Dense::scalar(x.sum() / x.size() as f32));
        self.life.forwarded(&y);
        Ok(y)
    }

    fn backward(&mut self, gy: &Matrix) -> Result<()> {
        self.life.check_backward("ReduceMean", gy)?;
        let g = gy.scalar_value()?;
        route(&self.x, || {
            let (rows, cols) = self.x.value().dims();
            #[allow(clippy::cast_precision_loss)]
            let n = (rows * cols) as f32;
            Ok(Dense::filled(rows, cols, g / n))
        })?;
        self.life.backpropagated();
        Ok(())
    }

    fn operands(&self) -> Vec<OperandRef> {
        vec![self.x.clone()]
    }
}

/// `y = max x`. The gradient flows to the first maximal element only.
pub struct ReduceMax {
    x: OperandRef,
    argmax: usize,
    life: Lifecycle,
}

impl ReduceMax {
    /// Builds the operator.
    #[must_use]
    pub fn new(x: OperandRef) -> Self {
        Self {
            x,
            argmax: 0,
            life: Lifecycle::default(),
        }
    }
}

impl Function for ReduceMax {
    fn forward(&mut self) -> Result<Matrix> {
        self.life.check_forward("ReduceMax")?;
        let x = self.x.value().dense();
        self.argmax = x.argmax();
        let y = Matrix::from(Dense::scalar(x.max()));
        self.life.forwarded(&y);
        Ok(y)
    }

    fn backward(&mut self, gy: &Matrix) -> Result<()> {
        self.life.check_backward("ReduceMax", gy)?;
        let g = gy.scalar_value()?;
        let k = self.argmax;
        route(&self.x, || {
            let (rows, cols) = self.x.value().dims();
            let mut gx = Dense::zeros(rows, cols);
            if let Some(slot) = gx.data_mut().get_mut(k) {
                *slot = g;
            }
            Ok(gx)
        })?;
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
    use crate::graph::Variable;
    use crate::mat::Sparse;

    #[test]
    fn sum_and_mean() {
        let x = Variable::new(Dense::new(2, 2, &[1.0, 2.0, 3.0, 6.0]).unwrap(), true);
        let mut s = ReduceSum::new(x.clone());
        assert_eq!(s.forward().unwrap().scalar_value().unwrap(), 12.0);
        s.backward(&Dense::scalar(2.0).into()).unwrap();
        assert_eq!(x.take_grad().unwrap().to_dense().data(), &[2.0; 4]);

        let mut m = ReduceMean::new(x.clone());
        assert_eq!(m.forward().unwrap().scalar_value().unwrap(), 3.0);
        m.backward(&Dense::scalar(2.0).into()).unwrap();
        assert_eq!(x.grad().unwrap().to_dense().data(), &[0.5; 4]);
    }

    #[test]
    fn sum_of_sparse_operand() {
        let x = Variable::constant(Sparse::new(2, 2, &[0.0, 4.0, 0.0, -1.0]).unwrap());
        let mut s = ReduceSum::new(x);
        assert_eq!(s.forward().unwrap().scalar_value().unwrap(), 3.0);
    }

    #[test]
    fn max_routes_to_argmax() {
        let x = Variable::new(Dense::vec(&[1.0, 7.0, 7.0, -2.0]), true);
        let mut f = ReduceMax::new(x.clone());
        assert_eq!(f.forward().unwrap().scalar_value().unwrap(), 7.0);
        f.backward(&Dense::scalar(1.5).into()).unwrap();
        assert_eq!(x.grad().unwrap().to_dense().data(), &[0.0, 1.5, 0.0, 0.0]);
    }

    #[test]
    fn max_routes_to_nan() {
        let x = Variable::new(Dense::vec(&[5.0, f32::NAN, 1.0]), true);
        let mut f = ReduceMax::new(x.clone());
        assert!(f.forward().unwrap().scalar_value().unwrap().is_nan());
        f.backward(&Dense::scalar(1.0).into()).unwrap();
        assert_eq!(x.grad().unwrap().to_dense().data(), &[0.0, 1.0, 0.0]);
    }

    #[test]
    fn rejects_non_scalar_gradient() {
        let x = Variable::new(Dense::vec(&[1.0, 2.0]), true);
        let mut f = ReduceSum::new(x);
        f.forward().unwrap();
        assert!(f.backward(&Dense::vec(&[1.0, 1.0]).into()).is_err());
    }
}
