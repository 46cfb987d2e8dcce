// Small dense-matrix utilities for chain analysis.
//
// State counts in practice are small (dozens to low hundreds), so a plain
// row-major Vec<f64> matrix with Gaussian elimination covers everything the
// analyzer needs. No external numeric library.

use crate::error::{EngineError, Result};

/// Pivots smaller than this are treated as singular.
const PIVOT_EPSILON: f64 = 1e-12;

/// A dense row-major square-or-rectangular matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    pub fn zeros(rows: usize, cols: usize) -> Matrix {
        Matrix {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    pub fn identity(n: usize) -> Matrix {
        let mut m = Matrix::zeros(n, n);
        for i in 0..n {
            m.set(i, i, 1.0);
        }
        m
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.data[row * self.cols + col] = value;
    }

    /// Left-multiply a row vector: `v * self`. This is one step of power
    /// iteration when `self` is a transition matrix.
    pub fn vec_mat(&self, v: &[f64]) -> Vec<f64> {
        assert_eq!(v.len(), self.rows, "vec_mat: dimension mismatch");
        let mut out = vec![0.0; self.cols];
        for (i, &vi) in v.iter().enumerate() {
            if vi == 0.0 {
                continue;
            }
            for j in 0..self.cols {
                out[j] += vi * self.get(i, j);
            }
        }
        out
    }

    /// Sum of the diagonal.
    pub fn trace(&self) -> f64 {
        assert_eq!(self.rows, self.cols, "trace: matrix must be square");
        (0..self.rows).map(|i| self.get(i, i)).sum()
    }

    /// Solve `self * X = B` for X via Gaussian elimination with partial
    /// pivoting. `self` must be square with `B.rows == self.rows`.
    ///
    /// Returns `NumericalNonConvergence` when a pivot collapses below
    /// epsilon, meaning the system is singular to working precision.
    pub fn solve(&self, b: &Matrix) -> Result<Matrix> {
        assert_eq!(self.rows, self.cols, "solve: matrix must be square");
        assert_eq!(b.rows, self.rows, "solve: right-hand side mismatch");
        let n = self.rows;
        let mut a = self.clone();
        let mut x = b.clone();

        for col in 0..n {
            // Partial pivoting: pick the largest remaining entry in this
            // column for stability.
            let mut pivot_row = col;
            let mut pivot_abs = a.get(col, col).abs();
            for row in col + 1..n {
                let candidate = a.get(row, col).abs();
                if candidate > pivot_abs {
                    pivot_row = row;
                    pivot_abs = candidate;
                }
            }
            if pivot_abs < PIVOT_EPSILON {
                return Err(EngineError::NumericalNonConvergence(format!(
                    "singular system: pivot {pivot_abs:.3e} at column {col}"
                )));
            }
            if pivot_row != col {
                a.swap_rows(col, pivot_row);
                x.swap_rows(col, pivot_row);
            }

            let pivot = a.get(col, col);
            for row in col + 1..n {
                let factor = a.get(row, col) / pivot;
                if factor == 0.0 {
                    continue;
                }
                for k in col..n {
                    let v = a.get(row, k) - factor * a.get(col, k);
                    a.set(row, k, v);
                }
                for k in 0..x.cols {
                    let v = x.get(row, k) - factor * x.get(col, k);
                    x.set(row, k, v);
                }
            }
        }

        // Back substitution.
        for col in (0..n).rev() {
            let pivot = a.get(col, col);
            for k in 0..x.cols {
                let mut v = x.get(col, k);
                for j in col + 1..n {
                    v -= a.get(col, j) * x.get(j, k);
                }
                x.set(col, k, v / pivot);
            }
        }
        Ok(x)
    }

    fn swap_rows(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        for col in 0..self.cols {
            self.data
                .swap(a * self.cols + col, b * self.cols + col);
        }
    }
}

/// Total variation distance between two probability vectors of equal
/// length: half the L1 distance.
pub fn total_variation(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    0.5 * a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).abs())
        .sum::<f64>()
}
