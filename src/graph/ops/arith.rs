//! Element-wise arithmetic, scalar arithmetic and matrix products.

use crate::config::is_parallel;
use crate::error::{Error, Result};
use crate::graph::{
    Function, Lifecycle, OperandRef, dense_grad, route, route_scalar, scalar_of, unbroadcast,
};
use crate::mat::{Dense, Matrix};
use crate::pool::Scratch;
use crate::scalar;

macro_rules! binary_operator {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        pub struct $name {
            x1: OperandRef,
            x2: OperandRef,
            life: Lifecycle,
        }

        impl $name {
            /// Builds the operator over two operands.
            #[must_use]
            pub fn new(x1: OperandRef, x2: OperandRef) -> Self {
                Self {
                    x1,
                    x2,
                    life: Lifecycle::default(),
                }
            }
        }
    };
}

binary_operator!(
    /// `y = x1 + x2`, with the usual broadcast rule.
    Add
);
binary_operator!(
    /// `y = x1 - x2`.
    Sub
);
binary_operator!(
    /// `y = x1 ⊙ x2` (element-wise).
    Prod
);
binary_operator!(
    /// `y = x1 / x2` (element-wise).
    Div
);
binary_operator!(
    /// `y = x1 · x2` (matrix product).
    Mul
);
binary_operator!(
    /// `y = <x1, x2>` for two vectors of equal size, as a 1x1 matrix.
    Dot
);
binary_operator!(
    /// `y = max(x1, x2)` element-wise; ties route the gradient to `x1`.
    Maximum
);
binary_operator!(
    /// `y = min(x1, x2)` element-wise; ties route the gradient to `x1`.
    Minimum
);

impl Function for Add {
    fn forward(&mut self) -> Result<Matrix> {
        self.life.check_forward("Add")?;
        let y = self.x1.value().add(self.x2.value())?;
        self.life.forwarded(&y);
        Ok(y)
    }

    fn backward(&mut self, gy: &Matrix) -> Result<()> {
        self.life.check_backward("Add", gy)?;
        let dims = self.life.out_dims();
        route(&self.x1, || unbroadcast("Add", dense_grad(gy, dims)?, self.x1.value().dims()))?;
        route(&self.x2, || unbroadcast("Add", dense_grad(gy, dims)?, self.x2.value().dims()))?;
        self.life.backpropagated();
        Ok(())
    }

    fn operands(&self) -> Vec<OperandRef> {
        vec![self.x1.clone(), self.x2.clone()]
    }
}

impl Function for Sub {
    fn forward(&mut self) -> Result<Matrix> {
        self.life.check_forward("Sub")?;
        let y = self.x1.value().sub(self.x2.value())?;
        self.life.forwarded(&y);
        Ok(y)
    }

    fn backward(&mut self, gy: &Matrix) -> Result<()> {
        self.life.check_backward("Sub", gy)?;
        let dims = self.life.out_dims();
        route(&self.x1, || unbroadcast("Sub", dense_grad(gy, dims)?, self.x1.value().dims()))?;
        route(&self.x2, || {
            let mut g = dense_grad(gy, dims)?;
            g.prod_scalar_in_place(-1.0);
            unbroadcast("Sub", g, self.x2.value().dims())
        })?;
        self.life.backpropagated();
        Ok(())
    }

    fn operands(&self) -> Vec<OperandRef> {
        vec![self.x1.clone(), self.x2.clone()]
    }
}

impl Function for Prod {
    fn forward(&mut self) -> Result<Matrix> {
        self.life.check_forward("Prod")?;
        let y = self.x1.value().prod(self.x2.value())?;
        self.life.forwarded(&y);
        Ok(y)
    }

    fn backward(&mut self, gy: &Matrix) -> Result<()> {
        self.life.check_backward("Prod", gy)?;
        let g = Scratch::new(dense_grad(gy, self.life.out_dims())?);
        route(&self.x1, || {
            unbroadcast("Prod", g.prod(&self.x2.value().dense())?, self.x1.value().dims())
        })?;
        route(&self.x2, || {
            unbroadcast("Prod", g.prod(&self.x1.value().dense())?, self.x2.value().dims())
        })?;
        self.life.backpropagated();
        Ok(())
    }

    fn operands(&self) -> Vec<OperandRef> {
        vec![self.x1.clone(), self.x2.clone()]
    }
}

impl Function for Div {
    fn forward(&mut self) -> Result<Matrix> {
        self.life.check_forward("Div")?;
        let y = self.x1.value().div(self.x2.value())?;
        self.life.forwarded(&y);
        Ok(y)
    }

    fn backward(&mut self, gy: &Matrix) -> Result<()> {
        self.life.check_backward("Div", gy)?;
        let g = Scratch::new(dense_grad(gy, self.life.out_dims())?);
        let x2 = self.x2.value().dense();
        route(&self.x1, || unbroadcast("Div", g.div(&x2)?, self.x1.value().dims()))?;
        route(&self.x2, || {
            // -x1 * gy / x2²
            let num = Scratch::new(g.prod(&self.x1.value().dense())?);
            let den = Scratch::new(x2.prod(&x2)?);
            let mut gx2 = num.div(&den)?;
            gx2.prod_scalar_in_place(-1.0);
            unbroadcast("Div", gx2, self.x2.value().dims())
        })?;
        self.life.backpropagated();
        Ok(())
    }

    fn operands(&self) -> Vec<OperandRef> {
        vec![self.x1.clone(), self.x2.clone()]
    }
}

impl Function for Mul {
    fn forward(&mut self) -> Result<Matrix> {
        self.life.check_forward("Mul")?;
        let y = self.x1.value().mul(self.x2.value())?;
        self.life.forwarded(&y);
        Ok(y)
    }

    /// `gx1 = gy · x2ᵗ` and `gx2 = x1ᵗ · gy`, computed concurrently.
    fn backward(&mut self, gy: &Matrix) -> Result<()> {
        self.life.check_backward("Mul", gy)?;
        let g = Matrix::from(dense_grad(gy, self.life.out_dims())?);
        let (x1, x2) = (&self.x1, &self.x2);

        let left = || route(x1, || Ok(g.mul(&x2.value().t())?.into_dense()));
        let right = || {
            route(x2, || match (x1.value(), &g) {
                (Matrix::Dense(a), Matrix::Dense(gd)) if gd.cols() == 1 => a.mul_t(gd),
                (a, _) => Ok(a.t().mul(&g)?.into_dense()),
            })
        };
        let (l, r) = if is_parallel() && x1.requires_grad() && x2.requires_grad() {
            log::debug!("Mul: computing both operand gradients concurrently");
            rayon::join(left, right)
        } else {
            (left(), right())
        };
        g.recycle();
        l?;
        r?;
        self.life.backpropagated();
        Ok(())
    }

    fn operands(&self) -> Vec<OperandRef> {
        vec![self.x1.clone(), self.x2.clone()]
    }
}

impl Function for Dot {
    fn forward(&mut self) -> Result<Matrix> {
        self.life.check_forward("Dot")?;
        let v = self.x1.value().dense().dot_unitary(&self.x2.value().dense())?;
        let y = Matrix::from(Dense::scalar(v));
        self.life.forwarded(&y);
        Ok(y)
    }

    fn backward(&mut self, gy: &Matrix) -> Result<()> {
        self.life.check_backward("Dot", gy)?;
        let g = gy.scalar_value()?;
        route(&self.x1, || {
            unbroadcast("Dot", self.x2.value().dense().prod_scalar(g), self.x1.value().dims())
        })?;
        route(&self.x2, || {
            unbroadcast("Dot", self.x1.value().dense().prod_scalar(g), self.x2.value().dims())
        })?;
        self.life.backpropagated();
        Ok(())
    }

    fn operands(&self) -> Vec<OperandRef> {
        vec![self.x1.clone(), self.x2.clone()]
    }
}

fn flat_dot(a: &Dense, b: &Dense) -> f32 {
    a.data().iter().zip(b.data()).map(|(x, y)| x * y).sum()
}

fn check_same_size(op: &'static str, x1: &Matrix, x2: &Matrix) -> Result<()> {
    if x1.size() != x2.size() || !(x1.dims() == x2.dims() || (x1.is_vector() && x2.is_vector())) {
        return Err(Error::DimensionMismatch {
            op,
            lhs_rows: x1.rows(),
            lhs_cols: x1.cols(),
            rhs_rows: x2.rows(),
            rhs_cols: x2.cols(),
        });
    }
    Ok(())
}

/// Shared backward of [`Maximum`] and [`Minimum`].
///
/// `pick_first(a, b)` says whether `x1` produced the output at that cell.
fn select_backward(
    op: &'static str,
    x1: &OperandRef,
    x2: &OperandRef,
    gy: &Matrix,
    dims: (usize, usize),
    pick_first: fn(f32, f32) -> bool,
) -> Result<()> {
    let g = Scratch::new(dense_grad(gy, dims)?);
    let (a, b) = (x1.value().dense(), x2.value().dense());
    let (da, db) = (a.data(), b.data());
    route(x1, || {
        let m = g.apply(|i, j, v| {
            let k = i * dims.1 + j;
            if pick_first(da[k], db[k]) { v } else { 0.0 }
        });
        unbroadcast(op, m, a.dims())
    })?;
    route(x2, || {
        let m = g.apply(|i, j, v| {
            let k = i * dims.1 + j;
            if pick_first(da[k], db[k]) { 0.0 } else { v }
        });
        unbroadcast(op, m, b.dims())
    })
}

impl Function for Maximum {
    fn forward(&mut self) -> Result<Matrix> {
        self.life.check_forward("Maximum")?;
        check_same_size("Maximum", self.x1.value(), self.x2.value())?;
        let y = self.x1.value().maximum(self.x2.value())?;
        self.life.forwarded(&y);
        Ok(y)
    }

    fn backward(&mut self, gy: &Matrix) -> Result<()> {
        self.life.check_backward("Maximum", gy)?;
        select_backward("Maximum", &self.x1, &self.x2, gy, self.life.out_dims(), |a, b| a >= b)?;
        self.life.backpropagated();
        Ok(())
    }

    fn operands(&self) -> Vec<OperandRef> {
        vec![self.x1.clone(), self.x2.clone()]
    }
}

impl Function for Minimum {
    fn forward(&mut self) -> Result<Matrix> {
        self.life.check_forward("Minimum")?;
        check_same_size("Minimum", self.x1.value(), self.x2.value())?;
        let y = self.x1.value().minimum(self.x2.value())?;
        self.life.forwarded(&y);
        Ok(y)
    }

    fn backward(&mut self, gy: &Matrix) -> Result<()> {
        self.life.check_backward("Minimum", gy)?;
        select_backward("Minimum", &self.x1, &self.x2, gy, self.life.out_dims(), |a, b| a <= b)?;
        self.life.backpropagated();
        Ok(())
    }

    fn operands(&self) -> Vec<OperandRef> {
        vec![self.x1.clone(), self.x2.clone()]
    }
}

/// `y = x ^ power` element-wise, for a fixed exponent.
pub struct Pow {
    x: OperandRef,
    power: f32,
    life: Lifecycle,
}

impl Pow {
    /// Builds the operator.
    #[must_use]
    pub fn new(x: OperandRef, power: f32) -> Self {
        Self {
            x,
            power,
            life: Lifecycle::default(),
        }
    }
}

impl Function for Pow {
    fn forward(&mut self) -> Result<Matrix> {
        self.life.check_forward("Pow")?;
        let y = Matrix::from(self.x.value().dense().pow(self.power));
        self.life.forwarded(&y);
        Ok(y)
    }

    fn backward(&mut self, gy: &Matrix) -> Result<()> {
        self.life.check_backward("Pow", gy)?;
        let p = self.power;
        route(&self.x, || {
            let x = self.x.value().dense();
            let g = Scratch::new(dense_grad(gy, x.dims())?);
            let xd = x.data();
            let cols = x.cols();
            Ok(g.apply(|i, j, v| v * p * scalar::pow(xd[i * cols + j], p - 1.0)))
        })?;
        self.life.backpropagated();
        Ok(())
    }

    fn operands(&self) -> Vec<OperandRef> {
        vec![self.x.clone()]
    }
}

/// The arithmetic applied by a [`ScalarOp`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    /// `x + alpha`.
    Add,
    /// `x - alpha`.
    Sub,
    /// `alpha - x`.
    ReverseSub,
    /// `x * alpha`.
    Prod,
    /// `x / alpha`.
    Div,
}

impl ScalarKind {
    const fn name(self) -> &'static str {
        match self {
            Self::Add => "AddScalar",
            Self::Sub => "SubScalar",
            Self::ReverseSub => "ReverseSubScalar",
            Self::Prod => "ProdScalar",
            Self::Div => "DivScalar",
        }
    }
}

/// A matrix combined with a 1x1 operand `alpha`.
///
/// The gradient of `alpha` is the sum of its per-element contributions.
pub struct ScalarOp {
    x: OperandRef,
    alpha: OperandRef,
    kind: ScalarKind,
    life: Lifecycle,
}

impl ScalarOp {
    /// Builds the operator.
    #[must_use]
    pub fn new(kind: ScalarKind, x: OperandRef, alpha: OperandRef) -> Self {
        Self {
            x,
            alpha,
            kind,
            life: Lifecycle::default(),
        }
    }

    /// `x + alpha`.
    #[must_use]
    pub fn add(x: OperandRef, alpha: OperandRef) -> Self {
        Self::new(ScalarKind::Add, x, alpha)
    }

    /// `x - alpha`.
    #[must_use]
    pub fn sub(x: OperandRef, alpha: OperandRef) -> Self {
        Self::new(ScalarKind::Sub, x, alpha)
    }

    /// `alpha - x`.
    #[must_use]
    pub fn reverse_sub(x: OperandRef, alpha: OperandRef) -> Self {
        Self::new(ScalarKind::ReverseSub, x, alpha)
    }

    /// `x * alpha`.
    #[must_use]
    pub fn prod(x: OperandRef, alpha: OperandRef) -> Self {
        Self::new(ScalarKind::Prod, x, alpha)
    }

    /// `x / alpha`.
    #[must_use]
    pub fn div(x: OperandRef, alpha: OperandRef) -> Self {
        Self::new(ScalarKind::Div, x, alpha)
    }
}

impl Function for ScalarOp {
    fn forward(&mut self) -> Result<Matrix> {
        let op = self.kind.name();
        self.life.check_forward(op)?;
        let a = scalar_of(op, &self.alpha)?;
        let x = self.x.value();
        let y = match self.kind {
            ScalarKind::Add => x.add_scalar(a),
            ScalarKind::Sub => x.sub_scalar(a),
            ScalarKind::ReverseSub => x.dense().reverse_sub_scalar(a).into(),
            ScalarKind::Prod => x.prod_scalar(a),
            ScalarKind::Div => x.div_scalar(a),
        };
        self.life.forwarded(&y);
        Ok(y)
    }

    fn backward(&mut self, gy: &Matrix) -> Result<()> {
        let op = self.kind.name();
        self.life.check_backward(op, gy)?;
        let a = scalar_of(op, &self.alpha)?;
        let g = Scratch::new(dense_grad(gy, self.x.value().dims())?);
        let kind = self.kind;
        route(&self.x, || {
            Ok(match kind {
                ScalarKind::Add | ScalarKind::Sub => g.clone(),
                ScalarKind::ReverseSub => g.prod_scalar(-1.0),
                ScalarKind::Prod => g.prod_scalar(a),
                ScalarKind::Div => g.div_scalar(a),
            })
        })?;
        route_scalar(&self.alpha, || {
            Ok(match kind {
                ScalarKind::Add | ScalarKind::ReverseSub => g.sum(),
                ScalarKind::Sub => -g.sum(),
                ScalarKind::Prod => flat_dot(&g, &self.x.value().dense()),
                ScalarKind::Div => -flat_dot(&g, &self.x.value().dense()) / (a * a),
            })
        })?;
        self.life.backpropagated();
        Ok(())
    }

    fn operands(&self) -> Vec<OperandRef> {
        vec![self.x.clone(), self.alpha.clone()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Operand, Variable};

    fn grad_of(v: &Variable) -> Vec<f32> {
        v.grad().unwrap().to_dense().to_vec()
    }

    #[test]
    fn add_forward_and_backward() {
        let x1 = Variable::new(Dense::vec(&[0.1, 0.2, 0.3, 0.0]), true);
        let x2 = Variable::new(Dense::vec(&[0.4, 0.3, 0.5, 0.7]), true);
        let mut f = Add::new(x1.clone(), x2.clone());
        let y = f.forward().unwrap();
        assert!(y.equals_approx(&Dense::vec(&[0.5, 0.5, 0.8, 0.7]).into(), 1e-6));

        let gy = Matrix::from(Dense::vec(&[-1.0, 0.5, 0.8, 0.0]));
        f.backward(&gy).unwrap();
        assert_eq!(grad_of(&x1), vec![-1.0, 0.5, 0.8, 0.0]);
        assert_eq!(grad_of(&x2), vec![-1.0, 0.5, 0.8, 0.0]);
    }

    #[test]
    fn lifecycle_is_enforced() {
        let x = Variable::new(Dense::vec(&[1.0]), true);
        let mut f = Sub::new(x.clone(), x.clone());
        let gy = Matrix::from(Dense::vec(&[1.0]));
        assert!(matches!(f.backward(&gy), Err(Error::Lifecycle { .. })));
        f.forward().unwrap();
        assert!(matches!(f.forward(), Err(Error::Lifecycle { .. })));
        f.backward(&gy).unwrap();
        assert!(matches!(f.backward(&gy), Err(Error::Lifecycle { .. })));
        // x - x: the two routes cancel
        assert_eq!(grad_of(&x), vec![0.0]);
    }

    #[test]
    fn backward_rejects_wrong_gradient_shape() {
        let x1 = Variable::new(Dense::zeros(2, 2), true);
        let x2 = Variable::new(Dense::zeros(2, 2), true);
        let mut f = Prod::new(x1.clone(), x2);
        f.forward().unwrap();
        assert!(f.backward(&Dense::zeros(3, 3).into()).is_err());
        assert!(!x1.has_grad());
    }

    #[test]
    fn broadcast_gradient_is_summed() {
        let m = Variable::new(Dense::new(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap(), true);
        let v = Variable::new(Dense::vec(&[10.0, 20.0]), true);
        let mut f = Prod::new(m.clone(), v.clone());
        let y = f.forward().unwrap();
        assert_eq!(y.to_dense().data(), &[10.0, 20.0, 30.0, 80.0, 100.0, 120.0]);
        f.backward(&Dense::filled(2, 3, 1.0).into()).unwrap();
        assert_eq!(grad_of(&m), vec![10.0, 10.0, 10.0, 20.0, 20.0, 20.0]);
        assert_eq!(grad_of(&v), vec![6.0, 15.0]);
    }

    #[test]
    fn div_gradients() {
        let x1 = Variable::new(Dense::vec(&[2.0, 3.0]), true);
        let x2 = Variable::new(Dense::vec(&[4.0, -1.0]), true);
        let mut f = Div::new(x1.clone(), x2.clone());
        assert_eq!(f.forward().unwrap().to_dense().data(), &[0.5, -3.0]);
        f.backward(&Dense::vec(&[1.0, 2.0]).into()).unwrap();
        assert_eq!(grad_of(&x1), vec![0.25, -2.0]);
        // -x1 * gy / x2²
        assert_eq!(grad_of(&x2), vec![-0.125, -6.0]);
    }

    #[test]
    fn mul_gradients_sequential_and_parallel() {
        for mode in [crate::config::Parallelism::Sequential, crate::config::Parallelism::Rayon] {
            crate::config::set_parallelism(mode);
            let a = Variable::new(Dense::new(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap(), true);
            let b = Variable::new(Dense::new(3, 2, &[1.0, 0.0, 0.0, 1.0, 1.0, 1.0]).unwrap(), true);
            let mut f = Mul::new(a.clone(), b.clone());
            let y = f.forward().unwrap();
            assert_eq!(y.to_dense().data(), &[4.0, 5.0, 10.0, 11.0]);
            let gy = Dense::new(2, 2, &[1.0, 0.0, 0.0, 1.0]).unwrap();
            f.backward(&gy.clone().into()).unwrap();
            // gy · bᵗ
            assert_eq!(grad_of(&a), vec![1.0, 0.0, 1.0, 0.0, 1.0, 1.0]);
            // aᵗ · gy
            assert_eq!(grad_of(&b), vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
        }
        crate::config::set_parallelism(crate::config::Parallelism::Rayon);
    }

    #[test]
    fn mul_vector_gradient_uses_transposed_product() {
        let a = Variable::new(Dense::new(2, 2, &[1.0, 2.0, 3.0, 4.0]).unwrap(), true);
        let x = Variable::new(Dense::vec(&[1.0, 1.0]), true);
        let mut f = Mul::new(a.clone(), x.clone());
        assert_eq!(f.forward().unwrap().to_dense().data(), &[3.0, 7.0]);
        f.backward(&Dense::vec(&[1.0, -1.0]).into()).unwrap();
        assert_eq!(grad_of(&x), vec![-2.0, -2.0]);
        assert_eq!(grad_of(&a), vec![1.0, 1.0, -1.0, -1.0]);
    }

    #[test]
    fn dot_and_pow() {
        let x1 = Variable::new(Dense::vec(&[1.0, 2.0]), true);
        let x2 = Variable::new(Dense::new(1, 2, &[3.0, 4.0]).unwrap(), true);
        let mut f = Dot::new(x1.clone(), x2.clone());
        assert_eq!(f.forward().unwrap().scalar_value().unwrap(), 11.0);
        f.backward(&Dense::scalar(2.0).into()).unwrap();
        assert_eq!(grad_of(&x1), vec![6.0, 8.0]);
        assert_eq!(x2.grad().unwrap().dims(), (1, 2));
        assert_eq!(grad_of(&x2), vec![2.0, 4.0]);

        let x = Variable::new(Dense::vec(&[2.0, -3.0]), true);
        let mut p = Pow::new(x.clone(), 3.0);
        assert_eq!(p.forward().unwrap().to_dense().data(), &[8.0, -27.0]);
        p.backward(&Dense::vec(&[1.0, 1.0]).into()).unwrap();
        assert_eq!(grad_of(&x), vec![12.0, 27.0]);
    }

    #[test]
    fn maximum_routes_to_winner() {
        let x1 = Variable::new(Dense::vec(&[1.0, 5.0, 2.0]), true);
        let x2 = Variable::new(Dense::vec(&[3.0, 4.0, 2.0]), true);
        let mut f = Maximum::new(x1.clone(), x2.clone());
        assert_eq!(f.forward().unwrap().to_dense().data(), &[3.0, 5.0, 2.0]);
        f.backward(&Dense::vec(&[1.0, 2.0, 3.0]).into()).unwrap();
        assert_eq!(grad_of(&x1), vec![0.0, 2.0, 3.0]);
        assert_eq!(grad_of(&x2), vec![1.0, 0.0, 0.0]);

        let mut m = Minimum::new(x1.clone(), Variable::constant(Dense::zeros(2, 1)));
        assert!(m.forward().is_err());
    }

    #[test]
    fn scalar_operators() {
        let x = Variable::new(Dense::vec(&[1.0, 2.0, 3.0]), true);
        let a = Variable::scalar(2.0, true);
        let gy = Matrix::from(Dense::vec(&[1.0, 1.0, 2.0]));

        let mut f = ScalarOp::prod(x.clone(), a.clone());
        assert_eq!(f.forward().unwrap().to_dense().data(), &[2.0, 4.0, 6.0]);
        f.backward(&gy).unwrap();
        assert_eq!(grad_of(&x), vec![2.0, 2.0, 4.0]);
        // Σ gy ⊙ x
        assert_eq!(grad_of(&a), vec![9.0]);

        x.zero_grad();
        a.zero_grad();
        let mut f = ScalarOp::reverse_sub(x.clone(), a.clone());
        assert_eq!(f.forward().unwrap().to_dense().data(), &[1.0, 0.0, -1.0]);
        f.backward(&gy).unwrap();
        assert_eq!(grad_of(&x), vec![-1.0, -1.0, -2.0]);
        assert_eq!(grad_of(&a), vec![4.0]);

        x.zero_grad();
        a.zero_grad();
        let mut f = ScalarOp::div(x.clone(), a.clone());
        assert_eq!(f.forward().unwrap().to_dense().data(), &[0.5, 1.0, 1.5]);
        f.backward(&gy).unwrap();
        assert_eq!(grad_of(&x), vec![0.5, 0.5, 1.0]);
        assert_eq!(grad_of(&a), vec![-9.0 / 4.0]);

        let not_scalar = Variable::constant(Dense::zeros(2, 1));
        let mut f = ScalarOp::add(x.clone(), not_scalar);
        assert!(matches!(f.forward(), Err(Error::NotScalar { .. })));
        assert_eq!(f.operands().len(), 2);
        assert!(f.operands()[0].requires_grad());
    }
}
