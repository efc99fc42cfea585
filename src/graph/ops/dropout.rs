//! Inverted dropout.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::graph::{Function, Lifecycle, OperandRef, dense_grad, route};
use crate::mat::{Dense, Matrix};
use crate::random::SharedRng;

/// Zeroes each element with probability `p` and scales the survivors by
/// `1 / (1 - p)`, so the expected value is unchanged.
///
/// The random source is injected, so two operators sharing a seeded
/// [`SharedRng`] draw reproducible masks.
pub struct Dropout {
    x: OperandRef,
    p: f32,
    rng: Arc<SharedRng>,
    mask: Option<Dense>,
    life: Lifecycle,
}

impl Dropout {
    /// Builds the operator.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidParameter`] if `p` is outside `[0, 1]`.
    pub fn new(x: OperandRef, p: f32, rng: Arc<SharedRng>) -> Result<Self> {
        if !(0.0..=1.0).contains(&p) {
            return Err(Error::InvalidParameter {
                op: "Dropout",
                name: "p",
                value: p,
            });
        }
        Ok(Self {
            x,
            p,
            rng,
            mask: None,
            life: Lifecycle::default(),
        })
    }
}

impl Function for Dropout {
    fn forward(&mut self) -> Result<Matrix> {
        self.life.check_forward("Dropout")?;
        let x = self.x.value().dense();
        let y = if self.p == 0.0 {
            x.into_owned()
        } else if self.p == 1.0 {
            self.mask = Some(Dense::zeros(x.rows(), x.cols()));
            Dense::zeros(x.rows(), x.cols())
        } else {
            let mut mask = Dense::dirty(x.rows(), x.cols());
            self.rng.fill_bernoulli(mask.data_mut(), 1.0 - self.p);
            mask.prod_scalar_in_place(1.0 / (1.0 - self.p));
            let y = x.prod(&mask)?;
            self.mask = Some(mask);
            y
        };
        let y = Matrix::from(y);
        self.life.forwarded(&y);
        Ok(y)
    }

    fn backward(&mut self, gy: &Matrix) -> Result<()> {
        self.life.check_backward("Dropout", gy)?;
        let mask = self.mask.take();
        route(&self.x, || {
            let mut g = dense_grad(gy, self.x.value().dims())?;
            if let Some(mask) = &mask {
                g.prod_in_place(mask)?;
            }
            Ok(g)
        })?;
        if let Some(mask) = mask {
            mask.recycle();
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
    use crate::graph::Variable;

    fn input() -> Dense {
        Dense::new(2, 3, &[1.0, -2.0, 3.0, 4.0, 0.5, -6.0]).unwrap()
    }

    #[test]
    fn zero_probability_is_identity() {
        let x = Variable::new(input(), true);
        let mut f = Dropout::new(x.clone(), 0.0, Arc::new(SharedRng::seeded(1))).unwrap();
        assert_eq!(f.forward().unwrap().to_dense(), input());
        let g = Dense::new(2, 3, &[0.1, 0.2, 0.3, 0.4, 0.5, 0.6]).unwrap();
        f.backward(&g.clone().into()).unwrap();
        assert_eq!(x.grad().unwrap().to_dense(), g);
    }

    #[test]
    fn full_probability_zeroes_everything() {
        let x = Variable::new(input(), true);
        let mut f = Dropout::new(x.clone(), 1.0, Arc::new(SharedRng::seeded(1))).unwrap();
        assert_eq!(f.forward().unwrap().to_dense().data(), &[0.0; 6]);
        f.backward(&Dense::filled(2, 3, 1.0).into()).unwrap();
        assert_eq!(x.grad().unwrap().to_dense().data(), &[0.0; 6]);
    }

    #[test]
    fn survivors_are_rescaled_and_gradient_follows_mask() {
        let x = Variable::new(Dense::filled(1, 64, 1.0), true);
        let mut f = Dropout::new(x.clone(), 0.5, Arc::new(SharedRng::seeded(42))).unwrap();
        let y = f.forward().unwrap().to_dense();
        assert!(y.data().iter().all(|&v| v == 0.0 || v == 2.0));
        f.backward(&Dense::filled(1, 64, 1.0).into()).unwrap();
        assert_eq!(x.grad().unwrap().to_dense(), y);
    }

    #[test]
    fn same_seed_same_mask() {
        let draw = || {
            let x = Variable::constant(Dense::filled(4, 4, 1.0));
            let mut f = Dropout::new(x, 0.3, Arc::new(SharedRng::seeded(9))).unwrap();
            f.forward().unwrap().to_dense()
        };
        assert_eq!(draw(), draw());
    }

    #[test]
    fn rejects_bad_probability() {
        let x = Variable::constant(input());
        assert!(matches!(
            Dropout::new(x.clone(), 1.5, Arc::new(SharedRng::seeded(0))),
            Err(Error::InvalidParameter { name: "p", .. })
        ));
        assert!(Dropout::new(x, f32::NAN, Arc::new(SharedRng::seeded(0))).is_err());
    }
}
