//! Data movement.
//!
//! None of these operators do arithmetic. Backward performs the inverse
//! movement on the gradient: concatenations are split, views are scattered
//! into a zero buffer, reshapes are reshaped back.

use std::borrow::Cow;

use crate::error::Result;
use crate::graph::{Function, Lifecycle, OperandRef, dense_grad, route};
use crate::mat::{Dense, Matrix};
use crate::pool::Scratch;

/// Concatenates vectors into one column vector.
pub struct Concat {
    xs: Vec<OperandRef>,
    life: Lifecycle,
}

impl Concat {
    /// Builds the operator.
    #[must_use]
    pub fn new(xs: Vec<OperandRef>) -> Self {
        Self {
            xs,
            life: Lifecycle::default(),
        }
    }
}

impl Function for Concat {
    fn forward(&mut self) -> Result<Matrix> {
        self.life.check_forward("Concat")?;
        let values: Vec<Cow<'_, Dense>> = self.xs.iter().map(|x| x.value().dense()).collect();
        let refs: Vec<&Dense> = values.iter().map(|v| &**v).collect();
        let y = Matrix::from(Dense::concat_v(&refs)?);
        self.life.forwarded(&y);
        Ok(y)
    }

    fn backward(&mut self, gy: &Matrix) -> Result<()> {
        self.life.check_backward("Concat", gy)?;
        let g = Scratch::new(dense_grad(gy, self.life.out_dims())?);
        let mut offset = 0;
        for x in &self.xs {
            let (rows, cols) = x.value().dims();
            let n = rows * cols;
            route(x, || Dense::new(rows, cols, &g.data()[offset..offset + n]))?;
            offset += n;
        }
        self.life.backpropagated();
        Ok(())
    }

    fn operands(&self) -> Vec<OperandRef> {
        self.xs.clone()
    }
}

/// Stacks equally sized vectors as the rows of a matrix.
pub struct Stack {
    xs: Vec<OperandRef>,
    life: Lifecycle,
}

impl Stack {
    /// Builds the operator.
    #[must_use]
    pub fn new(xs: Vec<OperandRef>) -> Self {
        Self {
            xs,
            life: Lifecycle::default(),
        }
    }
}

impl Function for Stack {
    fn forward(&mut self) -> Result<Matrix> {
        self.life.check_forward("Stack")?;
        let values: Vec<Cow<'_, Dense>> = self.xs.iter().map(|x| x.value().dense()).collect();
        let refs: Vec<&Dense> = values.iter().map(|v| &**v).collect();
        let y = Matrix::from(Dense::stack(&refs)?);
        self.life.forwarded(&y);
        Ok(y)
    }

    fn backward(&mut self, gy: &Matrix) -> Result<()> {
        self.life.check_backward("Stack", gy)?;
        let g = Scratch::new(dense_grad(gy, self.life.out_dims())?);
        for (i, x) in self.xs.iter().enumerate() {
            let (rows, cols) = x.value().dims();
            route(x, || Dense::new(rows, cols, &g.data()[i * g.cols()..(i + 1) * g.cols()]))?;
        }
        self.life.backpropagated();
        Ok(())
    }

    fn operands(&self) -> Vec<OperandRef> {
        self.xs.clone()
    }
}

/// Gives the operand a new shape with the same element count.
pub struct Reshape {
    x: OperandRef,
    rows: usize,
    cols: usize,
    life: Lifecycle,
}

impl Reshape {
    /// Builds the operator.
    #[must_use]
    pub fn new(x: OperandRef, rows: usize, cols: usize) -> Self {
        Self {
            x,
            rows,
            cols,
            life: Lifecycle::default(),
        }
    }
}

impl Function for Reshape {
    fn forward(&mut self) -> Result<Matrix> {
        self.life.check_forward("Reshape")?;
        let y = Matrix::from(self.x.value().dense().reshape(self.rows, self.cols)?);
        self.life.forwarded(&y);
        Ok(y)
    }

    fn backward(&mut self, gy: &Matrix) -> Result<()> {
        self.life.check_backward("Reshape", gy)?;
        route(&self.x, || dense_grad(gy, self.x.value().dims()))?;
        self.life.backpropagated();
        Ok(())
    }

    fn operands(&self) -> Vec<OperandRef> {
        vec![self.x.clone()]
    }
}

/// The `rows x cols` block whose top-left corner is `(row, col)`.
pub struct View {
    x: OperandRef,
    row: usize,
    col: usize,
    rows: usize,
    cols: usize,
    life: Lifecycle,
}

impl View {
    /// Builds the operator.
    #[must_use]
    pub fn new(x: OperandRef, row: usize, col: usize, rows: usize, cols: usize) -> Self {
        Self {
            x,
            row,
            col,
            rows,
            cols,
            life: Lifecycle::default(),
        }
    }
}

impl Function for View {
    fn forward(&mut self) -> Result<Matrix> {
        self.life.check_forward("View")?;
        let y = Matrix::from(
            self.x
                .value()
                .dense()
                .extract_view(self.row, self.col, self.rows, self.cols)?,
        );
        self.life.forwarded(&y);
        Ok(y)
    }

    fn backward(&mut self, gy: &Matrix) -> Result<()> {
        self.life.check_backward("View", gy)?;
        route(&self.x, || {
            let (rows, cols) = self.x.value().dims();
            let g = Scratch::new(dense_grad(gy, (self.rows, self.cols))?);
            let mut gx = Dense::zeros(rows, cols);
            for i in 0..self.rows {
                let dst = (self.row + i) * cols + self.col;
                gx.data_mut()[dst..dst + self.cols]
                    .copy_from_slice(&g.data()[i * self.cols..(i + 1) * self.cols]);
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

/// Row `i` as a `1 x cols` matrix.
pub struct RowView {
    x: OperandRef,
    i: usize,
    life: Lifecycle,
}

impl RowView {
    /// Builds the operator.
    #[must_use]
    pub fn new(x: OperandRef, i: usize) -> Self {
        Self {
            x,
            i,
            life: Lifecycle::default(),
        }
    }
}

impl Function for RowView {
    fn forward(&mut self) -> Result<Matrix> {
        self.life.check_forward("RowView")?;
        let y = Matrix::from(self.x.value().dense().row(self.i)?);
        self.life.forwarded(&y);
        Ok(y)
    }

    fn backward(&mut self, gy: &Matrix) -> Result<()> {
        self.life.check_backward("RowView", gy)?;
        route(&self.x, || {
            let (rows, cols) = self.x.value().dims();
            let g = Scratch::new(dense_grad(gy, (1, cols))?);
            let mut gx = Dense::zeros(rows, cols);
            gx.data_mut()[self.i * cols..(self.i + 1) * cols].copy_from_slice(g.data());
            Ok(gx)
        })?;
        self.life.backpropagated();
        Ok(())
    }

    fn operands(&self) -> Vec<OperandRef> {
        vec![self.x.clone()]
    }
}

/// Column `j` as a `rows x 1` matrix.
pub struct ColView {
    x: OperandRef,
    j: usize,
    life: Lifecycle,
}

impl ColView {
    /// Builds the operator.
    #[must_use]
    pub fn new(x: OperandRef, j: usize) -> Self {
        Self {
            x,
            j,
            life: Lifecycle::default(),
        }
    }
}

impl Function for ColView {
    fn forward(&mut self) -> Result<Matrix> {
        self.life.check_forward("ColView")?;
        let y = Matrix::from(self.x.value().dense().col(self.j)?);
        self.life.forwarded(&y);
        Ok(y)
    }

    fn backward(&mut self, gy: &Matrix) -> Result<()> {
        self.life.check_backward("ColView", gy)?;
        route(&self.x, || {
            let (rows, cols) = self.x.value().dims();
            let g = Scratch::new(dense_grad(gy, (rows, 1))?);
            let mut gx = Dense::zeros(rows, cols);
            for (i, &v) in g.data().iter().enumerate() {
                gx.set(i, self.j, v);
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

/// `y = xᵗ`. A sparse operand stays sparse.
pub struct Transpose {
    x: OperandRef,
    life: Lifecycle,
}

impl Transpose {
    /// Builds the operator.
    #[must_use]
    pub fn new(x: OperandRef) -> Self {
        Self {
            x,
            life: Lifecycle::default(),
        }
    }
}

impl Function for Transpose {
    fn forward(&mut self) -> Result<Matrix> {
        self.life.check_forward("Transpose")?;
        let y = self.x.value().t();
        self.life.forwarded(&y);
        Ok(y)
    }

    fn backward(&mut self, gy: &Matrix) -> Result<()> {
        self.life.check_backward("Transpose", gy)?;
        route(&self.x, || {
            let g = Scratch::new(dense_grad(gy, self.life.out_dims())?);
            Ok(g.t())
        })?;
        self.life.backpropagated();
        Ok(())
    }

    fn operands(&self) -> Vec<OperandRef> {
        vec![self.x.clone()]
    }
}

/// `y = x`.
pub struct Identity {
    x: OperandRef,
    life: Lifecycle,
}

impl Identity {
    /// Builds the operator.
    #[must_use]
    pub fn new(x: OperandRef) -> Self {
        Self {
            x,
            life: Lifecycle::default(),
        }
    }
}

impl Function for Identity {
    fn forward(&mut self) -> Result<Matrix> {
        self.life.check_forward("Identity")?;
        let y = self.x.value().clone();
        self.life.forwarded(&y);
        Ok(y)
    }

    fn backward(&mut self, gy: &Matrix) -> Result<()> {
        self.life.check_backward("Identity", gy)?;
        route(&self.x, || dense_grad(gy, self.x.value().dims()))?;
        self.life.backpropagated();
        Ok(())
    }

    fn operands(&self) -> Vec<OperandRef> {
        vec![self.x.clone()]
    }
}

/// Element `i` of a vector as a 1x1 matrix.
pub struct AtVec {
    x: OperandRef,
    i: usize,
    life: Lifecycle,
}

impl AtVec {
    /// Builds the operator.
    #[must_use]
    pub fn new(x: OperandRef, i: usize) -> Self {
        Self {
            x,
            i,
            life: Lifecycle::default(),
        }
    }
}

impl Function for AtVec {
    fn forward(&mut self) -> Result<Matrix> {
        self.life.check_forward("AtVec")?;
        let y = Matrix::from(Dense::scalar(self.x.value().dense().at_vec(self.i)?));
        self.life.forwarded(&y);
        Ok(y)
    }

    fn backward(&mut self, gy: &Matrix) -> Result<()> {
        self.life.check_backward("AtVec", gy)?;
        let g = gy.scalar_value()?;
        route(&self.x, || {
            let (rows, cols) = self.x.value().dims();
            let mut gx = Dense::zeros(rows, cols);
            gx.set_vec(self.i, g)?;
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

    fn grid() -> Dense {
        Dense::new(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap()
    }

    #[test]
    fn concat_splits_gradient() {
        let a = Variable::new(Dense::vec(&[1.0, 2.0]), true);
        let b = Variable::new(Dense::new(1, 3, &[3.0, 4.0, 5.0]).unwrap(), true);
        let mut f = Concat::new(vec![a.clone() as OperandRef, b.clone() as OperandRef]);
        let y = f.forward().unwrap().to_dense();
        assert_eq!(y.dims(), (5, 1));
        assert_eq!(y.data(), &[1.0, 2.0, 3.0, 4.0, 5.0]);

        f.backward(&Dense::vec(&[0.1, 0.2, 0.3, 0.4, 0.5]).into()).unwrap();
        assert_eq!(a.grad().unwrap().to_dense().data(), &[0.1, 0.2]);
        let gb = b.grad().unwrap().to_dense();
        assert_eq!(gb.dims(), (1, 3));
        assert_eq!(gb.data(), &[0.3, 0.4, 0.5]);
    }

    #[test]
    fn stack_unstacks_gradient() {
        let a = Variable::new(Dense::vec(&[1.0, 2.0]), true);
        let b = Variable::new(Dense::vec(&[3.0, 4.0]), false);
        let mut f = Stack::new(vec![a.clone() as OperandRef, b.clone() as OperandRef]);
        let y = f.forward().unwrap().to_dense();
        assert_eq!(y.dims(), (2, 2));
        f.backward(&Dense::new(2, 2, &[5.0, 6.0, 7.0, 8.0]).unwrap().into()).unwrap();
        assert_eq!(a.grad().unwrap().to_dense().data(), &[5.0, 6.0]);
        assert!(b.grad().is_none());
    }

    #[test]
    fn reshape_round_trips_gradient_shape() {
        let x = Variable::new(grid(), true);
        let mut f = Reshape::new(x.clone(), 3, 2);
        assert_eq!(f.forward().unwrap().dims(), (3, 2));
        f.backward(&Dense::filled(3, 2, 1.0).into()).unwrap();
        assert_eq!(x.grad().unwrap().dims(), (2, 3));

        let mut bad = Reshape::new(Variable::constant(grid()), 4, 2);
        assert!(bad.forward().is_err());
    }

    #[test]
    fn view_scatters_into_zeros() {
        let x = Variable::new(grid(), true);
        let mut f = View::new(x.clone(), 0, 1, 2, 2);
        assert_eq!(f.forward().unwrap().to_dense().data(), &[2.0, 3.0, 5.0, 6.0]);
        f.backward(&Dense::new(2, 2, &[1.0, 2.0, 3.0, 4.0]).unwrap().into()).unwrap();
        assert_eq!(x.grad().unwrap().to_dense().data(), &[0.0, 1.0, 2.0, 0.0, 3.0, 4.0]);
    }

    #[test]
    fn row_and_col_views() {
        let x = Variable::new(grid(), true);
        let mut r = RowView::new(x.clone(), 1);
        assert_eq!(r.forward().unwrap().to_dense().data(), &[4.0, 5.0, 6.0]);
        r.backward(&Dense::new(1, 3, &[1.0, 1.0, 1.0]).unwrap().into()).unwrap();
        assert_eq!(x.take_grad().unwrap().to_dense().data(), &[0.0, 0.0, 0.0, 1.0, 1.0, 1.0]);

        let mut c = ColView::new(x.clone(), 2);
        assert_eq!(c.forward().unwrap().to_dense().data(), &[3.0, 6.0]);
        c.backward(&Dense::vec(&[7.0, 8.0]).into()).unwrap();
        assert_eq!(x.grad().unwrap().to_dense().data(), &[0.0, 0.0, 7.0, 0.0, 0.0, 8.0]);

        assert!(RowView::new(x, 2).forward().is_err());
    }

    #[test]
    fn transpose_keeps_sparse_kind() {
        let s = Variable::constant(Sparse::new(2, 3, &[0.0, 1.0, 0.0, 2.0, 0.0, 0.0]).unwrap());
        let mut f = Transpose::new(s);
        let y = f.forward().unwrap();
        assert!(y.is_sparse());
        assert_eq!(y.dims(), (3, 2));

        let x = Variable::new(grid(), true);
        let mut f = Transpose::new(x.clone());
        f.forward().unwrap();
        f.backward(&grid().t().into()).unwrap();
        assert_eq!(x.grad().unwrap().to_dense(), grid());
    }

    #[test]
    fn identity_and_at_vec() {
        let x = Variable::new(Dense::vec(&[4.0, 5.0, 6.0]), true);
        let mut id = Identity::new(x.clone());
        assert_eq!(id.forward().unwrap().to_dense().data(), &[4.0, 5.0, 6.0]);
        id.backward(&Dense::vec(&[1.0, 1.0, 1.0]).into()).unwrap();

        let mut at = AtVec::new(x.clone(), 1);
        assert_eq!(at.forward().unwrap().scalar_value().unwrap(), 5.0);
        at.backward(&Dense::scalar(2.0).into()).unwrap();
        assert_eq!(x.grad().unwrap().to_dense().data(), &[1.0, 3.0, 1.0]);

        assert!(AtVec::new(Variable::constant(grid()), 0).forward().is_err());
    }
}
