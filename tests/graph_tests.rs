use std::sync::Arc;

use briny_grad::config::{Parallelism, set_parallelism};
use briny_grad::error::Error;
use briny_grad::graph::ops::{
    Activation, Add, Dropout, Mul, ReduceSum, ScalarOp, Softmax, Unary,
};
use briny_grad::graph::{Function, Operand, OperandRef, Stage, Variable};
use briny_grad::mat::{Dense, Matrix, Sparse};
use briny_grad::random::SharedRng;

#[test]
fn test_add_forward_backward() {
    let x1 = Variable::new(Dense::vec(&[0.1, 0.2, 0.3, 0.0]), true);
    let x2 = Variable::new(Dense::vec(&[0.4, 0.3, 0.5, 0.7]), true);
    let mut f = Add::new(x1.clone(), x2.clone());
    let y = f.forward().unwrap().to_dense();
    assert!(y.equals_approx(&Dense::vec(&[0.5, 0.5, 0.8, 0.7]), 1e-6));

    let gy = Dense::vec(&[-1.0, 0.5, 0.8, 0.0]);
    f.backward(&gy.clone().into()).unwrap();
    assert_eq!(x1.grad().unwrap().to_dense(), gy);
    assert_eq!(x2.grad().unwrap().to_dense(), gy);
}

#[test]
fn test_lifecycle_is_enforced() {
    let x = Variable::new(Dense::vec(&[1.0]), true);
    let mut f = ReduceSum::new(x);
    assert!(matches!(
        f.backward(&Dense::scalar(1.0).into()),
        Err(Error::Lifecycle { stage: Stage::Constructed, .. })
    ));
    f.forward().unwrap();
    assert!(f.forward().is_err());
    f.backward(&Dense::scalar(1.0).into()).unwrap();
    assert!(matches!(
        f.backward(&Dense::scalar(1.0).into()),
        Err(Error::Lifecycle { stage: Stage::Backpropagated, .. })
    ));
}

/// `loss = Σ tanh(W·x + b)`, checked against finite differences.
#[test]
fn test_linear_tanh_chain() {
    set_parallelism(Parallelism::Sequential);
    let w_data = [0.2, -0.4, 0.1, 0.5, 0.3, -0.2];
    let x = Variable::constant(Dense::vec(&[1.0, -1.0, 2.0]));
    let b = Variable::new(Dense::vec(&[0.05, -0.1]), true);

    let loss_at = |w: &[f32]| -> f32 {
        let wx = Dense::new(2, 3, w).unwrap().mul_dense(&x.value().to_dense()).unwrap();
        wx.add(&b.value().to_dense()).unwrap().data().iter().map(|v| v.tanh()).sum()
    };

    let w = Variable::new(Dense::new(2, 3, &w_data).unwrap(), true);
    let mut mul = Mul::new(w.clone(), x.clone());
    let wx = Variable::new(mul.forward().unwrap(), true);
    let mut add = Add::new(wx.clone(), b.clone());
    let z = Variable::new(add.forward().unwrap(), true);
    let mut act = Unary::new(Activation::Tanh, z.clone()).unwrap();
    let h = Variable::new(act.forward().unwrap(), true);
    let mut sum = ReduceSum::new(h.clone());
    let loss = sum.forward().unwrap().scalar_value().unwrap();
    assert!((loss - loss_at(&w_data)).abs() < 1e-6);

    sum.backward(&Dense::scalar(1.0).into()).unwrap();
    act.backward(&h.take_grad().unwrap()).unwrap();
    add.backward(&z.take_grad().unwrap()).unwrap();
    mul.backward(&wx.take_grad().unwrap()).unwrap();

    let gw = w.grad().unwrap().to_dense();
    let eps = 1e-2;
    for k in 0..w_data.len() {
        let mut hi = w_data;
        let mut lo = w_data;
        hi[k] += eps;
        lo[k] -= eps;
        let numeric = (loss_at(&hi) - loss_at(&lo)) / (2.0 * eps);
        assert!((numeric - gw.data()[k]).abs() < 1e-3, "w[{k}]: {numeric} vs {}", gw.data()[k]);
    }
    assert!(b.grad().is_some());
    assert!(x.grad().is_none());
    set_parallelism(Parallelism::Rayon);
}

#[test]
fn test_sparse_operand_through_mul() {
    let s = Variable::new(Sparse::new(2, 2, &[0.0, 2.0, 3.0, 0.0]).unwrap(), true);
    let v = Variable::new(Dense::vec(&[1.0, 1.0]), true);
    let mut f = Mul::new(s.clone(), v.clone());
    assert_eq!(f.forward().unwrap().to_dense().data(), &[2.0, 3.0]);
    f.backward(&Dense::vec(&[1.0, 1.0]).into()).unwrap();
    assert_eq!(v.grad().unwrap().to_dense().data(), &[3.0, 2.0]);
    assert_eq!(s.grad().unwrap().dims(), (2, 2));
}

#[test]
fn test_scalar_operand_receives_summed_gradient() {
    let x = Variable::new(Dense::new(2, 2, &[1.0, 2.0, 3.0, 4.0]).unwrap(), true);
    let alpha = Variable::scalar(3.0, true);
    let mut f = ScalarOp::add(x.clone(), alpha.clone());
    f.forward().unwrap();
    f.backward(&Dense::filled(2, 2, 0.5).into()).unwrap();
    assert_eq!(alpha.grad().unwrap().scalar_value().unwrap(), 2.0);
}

#[test]
fn test_softmax_distribution() {
    let x = Variable::constant(Dense::vec(&[-0.41, -1.08, 0.0, 0.87, -0.19, -0.75]));
    let mut f = Softmax::new(x);
    let y = f.forward().unwrap().to_dense();
    assert!((y.sum() - 1.0).abs() < 1e-5);
    let want = Dense::vec(&[0.116_645_1, 0.059_688_2, 0.175_762_9, 0.419_530_4, 0.145_348_7, 0.083_024]);
    assert!(y.equals_approx(&want, 1e-5));
}

#[test]
fn test_dropout_boundaries() {
    let rng = Arc::new(SharedRng::seeded(2024));
    let data = Dense::new(2, 2, &[1.0, -1.0, 2.0, -2.0]).unwrap();
    let gy: Matrix = Dense::filled(2, 2, 1.0).into();

    let x = Variable::new(data.clone(), true);
    let mut keep_all = Dropout::new(x.clone(), 0.0, rng.clone()).unwrap();
    assert_eq!(keep_all.forward().unwrap().to_dense(), data);
    keep_all.backward(&gy).unwrap();
    assert_eq!(x.grad().unwrap().to_dense(), Dense::filled(2, 2, 1.0));

    let x = Variable::new(data, true);
    let mut drop_all = Dropout::new(x.clone(), 1.0, rng).unwrap();
    assert_eq!(drop_all.forward().unwrap().to_dense(), Dense::zeros(2, 2));
    drop_all.backward(&gy).unwrap();
    assert_eq!(x.grad().unwrap().to_dense(), Dense::zeros(2, 2));
}

#[test]
fn test_gradients_accumulate_across_operators() {
    let x = Variable::new(Dense::vec(&[1.0, 2.0]), true);
    let mut f = ReduceSum::new(x.clone());
    let mut g = ReduceSum::new(x.clone() as OperandRef);
    f.forward().unwrap();
    g.forward().unwrap();
    f.backward(&Dense::scalar(1.0).into()).unwrap();
    g.backward(&Dense::scalar(2.0).into()).unwrap();
    assert_eq!(x.grad().unwrap().to_dense().data(), &[3.0, 3.0]);
    x.zero_grad();
    assert!(!x.has_grad());
}
