//! Human-readable rendering.
//!
//! Rows are drawn between bracket glyphs with right-aligned columns:
//!
//! ```text
//! ⎡1  -2   3⎤
//! ⎢4   5  60⎥
//! ⎣7   8   9⎦
//! ```
//!
//! A single row prints as `[1  2  3]`. A precision given to the formatter
//! (`{:.2}`) applies to every element.

use core::fmt;

use super::{Dense, Matrix, Sparse};

fn render(f: &mut fmt::Formatter<'_>, rows: usize, cols: usize, at: impl Fn(usize, usize) -> f32) -> fmt::Result {
    if rows == 0 || cols == 0 {
        return f.write_str("[]");
    }
    let cells: Vec<String> = (0..rows * cols)
        .map(|k| {
            let v = at(k / cols, k % cols);
            match f.precision() {
                Some(p) => format!("{v:.p$}"),
                None => format!("{v}"),
            }
        })
        .collect();
    let widths: Vec<usize> = (0..cols)
        .map(|j| (0..rows).map(|i| cells[i * cols + j].chars().count()).max().unwrap_or(0))
        .collect();

    for i in 0..rows {
        let (open, close) = match (rows, i) {
            (1, _) => ('[', ']'),
            (_, 0) => ('⎡', '⎤'),
            (_, i) if i == rows - 1 => ('⎣', '⎦'),
            _ => ('⎢', '⎥'),
        };
        if i > 0 {
            f.write_str("\n")?;
        }
        write!(f, "{open}")?;
        for (j, width) in widths.iter().enumerate() {
            if j > 0 {
                f.write_str("  ")?;
            }
            write!(f, "{:>width$}", cells[i * cols + j])?;
        }
        write!(f, "{close}")?;
    }
    Ok(())
}

impl fmt::Display for Dense {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        render(f, self.rows(), self.cols(), |i, j| self.at(i, j))
    }
}

impl fmt::Display for Sparse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = self.to_dense();
        render(f, d.rows(), d.cols(), |i, j| d.at(i, j))
    }
}

impl fmt::Display for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dense(d) => fmt::Display::fmt(d, f),
            Self::Sparse(s) => fmt::Display::fmt(s, f),
        }
    }
}
