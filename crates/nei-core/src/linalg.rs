//! # Dense Linear Algebra
//!
//! The handful of matrix operations the eigenvalue solver needs. Matrices
//! are tiny (at most 31 × 31 for zinc), so a row-major `Vec<f64>` and
//! cyclic Jacobi rotations are plenty.

use crate::NeiError;
use serde::{Deserialize, Serialize};
use std::ops::{Index, IndexMut};

/// Maximum number of Jacobi sweeps before giving up.
const MAX_SWEEPS: usize = 100;

// =============================================================================
// MATRIX
// =============================================================================

/// A dense, row-major matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    #[must_use]
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    #[must_use]
    pub fn identity(n: usize) -> Self {
        let mut m = Self::zeros(n, n);
        for i in 0..n {
            m[(i, i)] = 1.0;
        }
        m
    }

    /// Build from nested rows. All rows must have the same length.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self, NeiError> {
        let cols = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|row| row.len() != cols) {
            return Err(NeiError::NumericalError(
                "rows have different lengths".to_string(),
            ));
        }
        Ok(Self {
            rows: rows.len(),
            cols,
            data: rows.into_iter().flatten().collect(),
        })
    }

    #[must_use]
    pub const fn rows(&self) -> usize {
        self.rows
    }

    #[must_use]
    pub const fn cols(&self) -> usize {
        self.cols
    }

    #[must_use]
    pub fn row(&self, r: usize) -> &[f64] {
        &self.data[r * self.cols..(r + 1) * self.cols]
    }

    #[must_use]
    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        (0..self.rows).map(|r| self.row(r).to_vec()).collect()
    }

    #[must_use]
    pub fn transpose(&self) -> Self {
        let mut t = Self::zeros(self.cols, self.rows);
        for r in 0..self.rows {
            for c in 0..self.cols {
                t[(c, r)] = self[(r, c)];
            }
        }
        t
    }

    /// Matrix product `self · other`.
    pub fn matmul(&self, other: &Self) -> Result<Self, NeiError> {
        if self.cols != other.rows {
            return Err(NeiError::NumericalError(format!(
                "cannot multiply {}x{} by {}x{}",
                self.rows, self.cols, other.rows, other.cols
            )));
        }
        let mut out = Self::zeros(self.rows, other.cols);
        for r in 0..self.rows {
            for k in 0..self.cols {
                let a = self[(r, k)];
                if a == 0.0 {
                    continue;
                }
                for c in 0..other.cols {
                    out[(r, c)] += a * other[(k, c)];
                }
            }
        }
        Ok(out)
    }

    /// Matrix-vector product `self · v`.
    pub fn mul_vec(&self, v: &[f64]) -> Result<Vec<f64>, NeiError> {
        if self.cols != v.len() {
            return Err(NeiError::NumericalError(format!(
                "cannot multiply {}x{} by vector of length {}",
                self.rows,
                self.cols,
                v.len()
            )));
        }
        Ok((0..self.rows)
            .map(|r| self.row(r).iter().zip(v).map(|(a, b)| a * b).sum())
            .collect())
    }

    /// Multiply every entry by `factor`.
    pub fn scale(&mut self, factor: f64) {
        for x in &mut self.data {
            *x *= factor;
        }
    }

    /// `self += factor · other`.
    pub fn add_scaled(&mut self, other: &Self, factor: f64) -> Result<(), NeiError> {
        if self.rows != other.rows || self.cols != other.cols {
            return Err(NeiError::NumericalError(format!(
                "cannot add {}x{} to {}x{}",
                other.rows, other.cols, self.rows, self.cols
            )));
        }
        for (x, y) in self.data.iter_mut().zip(&other.data) {
            *x += factor * y;
        }
        Ok(())
    }

    /// Largest absolute entry.
    #[must_use]
    pub fn max_abs(&self) -> f64 {
        self.data.iter().fold(0.0, |acc, x| acc.max(x.abs()))
    }
}

impl Index<(usize, usize)> for Matrix {
    type Output = f64;

    fn index(&self, (r, c): (usize, usize)) -> &f64 {
        &self.data[r * self.cols + c]
    }
}

impl IndexMut<(usize, usize)> for Matrix {
    fn index_mut(&mut self, (r, c): (usize, usize)) -> &mut f64 {
        &mut self.data[r * self.cols + c]
    }
}

// =============================================================================
// SYMMETRIC EIGENDECOMPOSITION
// =============================================================================

/// Eigenvalues and orthonormal eigenvectors (columns) of a symmetric matrix,
/// sorted by decreasing eigenvalue.
#[derive(Debug, Clone)]
pub struct SymmetricEigen {
    pub values: Vec<f64>,
    pub vectors: Matrix,
}

/// Diagonalise a symmetric matrix with cyclic Jacobi rotations.
///
/// Only the upper triangle drives the rotations; the input is assumed
/// symmetric.
pub fn symmetric_eigen(matrix: &Matrix) -> Result<SymmetricEigen, NeiError> {
    let n = matrix.rows();
    if n != matrix.cols() {
        return Err(NeiError::NumericalError(format!(
            "eigendecomposition needs a square matrix, got {}x{}",
            n,
            matrix.cols()
        )));
    }

    let mut a = matrix.clone();
    let mut v = Matrix::identity(n);
    let mut converged = n < 2;

    for sweep in 0..MAX_SWEEPS {
        let mut off = 0.0;
        let mut total = 0.0;
        for p in 0..n {
            for q in 0..n {
                let x = a[(p, q)] * a[(p, q)];
                total += x;
                if p != q {
                    off += x;
                }
            }
        }
        if off <= f64::EPSILON * f64::EPSILON * total {
            converged = true;
            break;
        }

        for p in 0..n {
            for q in (p + 1)..n {
                let apq = a[(p, q)];
                if apq == 0.0 {
                    continue;
                }
                // Off-diagonal below the precision of both diagonal entries.
                let g = 100.0 * apq.abs();
                if sweep > 3 && a[(p, p)].abs() + g == a[(p, p)].abs()
                    && a[(q, q)].abs() + g == a[(q, q)].abs()
                {
                    a[(p, q)] = 0.0;
                    a[(q, p)] = 0.0;
                    continue;
                }
                let theta = (a[(q, q)] - a[(p, p)]) / (2.0 * apq);
                let t = if theta.abs() > 1.0e150 {
                    0.5 / theta
                } else {
                    theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt())
                };
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                for k in 0..n {
                    let (akp, akq) = (a[(k, p)], a[(k, q)]);
                    a[(k, p)] = c * akp - s * akq;
                    a[(k, q)] = s * akp + c * akq;
                }
                for k in 0..n {
                    let (apk, aqk) = (a[(p, k)], a[(q, k)]);
                    a[(p, k)] = c * apk - s * aqk;
                    a[(q, k)] = s * apk + c * aqk;
                }
                for k in 0..n {
                    let (vkp, vkq) = (v[(k, p)], v[(k, q)]);
                    v[(k, p)] = c * vkp - s * vkq;
                    v[(k, q)] = s * vkp + c * vkq;
                }
            }
        }
    }

    if !converged {
        return Err(NeiError::NumericalError(format!(
            "Jacobi iteration did not converge in {} sweeps",
            MAX_SWEEPS
        )));
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| a[(j, j)].total_cmp(&a[(i, i)]));

    let values = order.iter().map(|&i| a[(i, i)]).collect();
    let mut vectors = Matrix::zeros(n, n);
    for (new_col, &old_col) in order.iter().enumerate() {
        for r in 0..n {
            vectors[(r, new_col)] = v[(r, old_col)];
        }
    }

    Ok(SymmetricEigen { values, vectors })
}

// =============================================================================
// TESTS
// =============================================================================
