//! Max pooling over non-overlapping windows.

use crate::error::{Error, Result};
use crate::graph::{Function, Lifecycle, OperandRef, dense_grad, route};
use crate::mat::{Dense, Matrix};
use crate::pool::Scratch;

/// Takes the maximum of each `rows x cols` window.
///
/// The input must tile exactly into windows. Forward remembers where each
/// maximum came from so backward can hand the whole output gradient of a
/// cell to that single input element.
pub struct MaxPooling {
    x: OperandRef,
    rows: usize,
    cols: usize,
    argmax: Vec<(usize, usize)>,
    life: Lifecycle,
}

impl MaxPooling {
    /// Builds the operator with a `rows x cols` window.
    #[must_use]
    pub fn new(x: OperandRef, rows: usize, cols: usize) -> Self {
        Self {
            x,
            rows,
            cols,
            argmax: Vec::new(),
            life: Lifecycle::default(),
        }
    }
}

impl Function for MaxPooling {
    /// # Errors
    ///
    /// [`Error::DimensionMismatch`] if the window is empty or does not
    /// divide the input.
    fn forward(&mut self) -> Result<Matrix> {
        self.life.check_forward("MaxPooling")?;
        let x = self.x.value().dense();
        let (r, c) = x.dims();
        if self.rows == 0 || self.cols == 0 || r % self.rows != 0 || c % self.cols != 0 {
            return Err(Error::DimensionMismatch {
                op: "MaxPooling",
                lhs_rows: r,
                lhs_cols: c,
                rhs_rows: self.rows,
                rhs_cols: self.cols,
            });
        }
        let (out_rows, out_cols) = (r / self.rows, c / self.cols);
        let mut y = Dense::dirty(out_rows, out_cols);
        self.argmax = Vec::with_capacity(out_rows * out_cols);
        for oi in 0..out_rows {
            for oj in 0..out_cols {
                let mut best = (oi * self.rows, oj * self.cols);
                let mut max = x.at(best.0, best.1);
                for i in oi * self.rows..(oi + 1) * self.rows {
                    for j in oj * self.cols..(oj + 1) * self.cols {
                        let v = x.at(i, j);
                        if v > max {
                            max = v;
                            best = (i, j);
                        }
                    }
                }
                y.set(oi, oj, max);
                self.argmax.push(best);
            }
        }
        let y = Matrix::from(y);
        self.life.forwarded(&y);
        Ok(y)
    }

    fn backward(&mut self, gy: &Matrix) -> Result<()> {
        self.life.check_backward("MaxPooling", gy)?;
        let argmax = std::mem::take(&mut self.argmax);
        route(&self.x, || {
            let (rows, cols) = self.x.value().dims();
            let g = Scratch::new(dense_grad(gy, self.life.out_dims())?);
            let mut gx = Dense::zeros(rows, cols);
            for (&(i, j), &v) in argmax.iter().zip(g.data()) {
                gx.set(i, j, v);
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

    #[test]
    fn pools_and_routes_to_argmax() {
        #[rustfmt::skip]
        let x = Variable::new(
            Dense::new(4, 4, &[
                1.0, 2.0, 0.0, -1.0,
                3.0, 0.5, 4.0, 1.0,
                -2.0, 0.0, 9.0, 9.0,
                0.0, 1.0, 2.0, 3.0,
            ])
            .unwrap(),
            true,
        );
        let mut f = MaxPooling::new(x.clone(), 2, 2);
        let y = f.forward().unwrap().to_dense();
        assert_eq!(y.dims(), (2, 2));
        assert_eq!(y.data(), &[3.0, 4.0, 1.0, 9.0]);

        f.backward(&Dense::new(2, 2, &[10.0, 20.0, 30.0, 40.0]).unwrap().into()).unwrap();
        let g = x.grad().unwrap().to_dense();
        assert_eq!(g.at(1, 0), 10.0);
        assert_eq!(g.at(1, 2), 20.0);
        assert_eq!(g.at(3, 1), 30.0);
        assert_eq!(g.at(2, 2), 40.0);
        assert_eq!(g.sum(), 100.0);
    }

    #[test]
    fn window_must_tile_input() {
        let x = Variable::constant(Dense::zeros(3, 4));
        assert!(matches!(
            MaxPooling::new(x.clone(), 2, 2).forward(),
            Err(Error::DimensionMismatch { .. })
        ));
        assert!(MaxPooling::new(x, 0, 2).forward().is_err());
    }
}
