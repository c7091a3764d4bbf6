//! Dimension-checked dense matrix.
//!
//! Thin wrapper over `nalgebra::DMatrix` whose arithmetic returns
//! `PoseError::DimensionMismatch` instead of panicking, so a bad filter
//! configuration surfaces as an error at startup.

use nalgebra::{DMatrix, RealField};

use crate::error::{PoseError, PoseResult};

/// Relative determinant threshold for the singularity test.
const SINGULAR_EPSILON: f64 = 1e-12;

#[derive(Clone, Debug, PartialEq)]
pub struct Matrix<T: RealField + Copy> {
    data: DMatrix<T>,
}

impl<T: RealField + Copy> Matrix<T> {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self { data: DMatrix::zeros(rows, cols) }
    }

    pub fn identity(n: usize) -> Self {
        Self { data: DMatrix::identity(n, n) }
    }

    /// Row-major construction. Fails when `values.len() != rows * cols`.
    pub fn from_row_slice(rows: usize, cols: usize, values: &[T]) -> PoseResult<Self> {
        if values.len() != rows * cols {
            return Err(PoseError::DimensionMismatch {
                op: "from_row_slice",
                expected: (rows, cols),
                found: (values.len(), 1),
            });
        }
        Ok(Self { data: DMatrix::from_row_slice(rows, cols, values) })
    }

    /// n×1 column vector.
    pub fn column(values: &[T]) -> Self {
        Self { data: DMatrix::from_column_slice(values.len(), 1, values) }
    }

    pub fn from_diagonal(values: &[T]) -> Self {
        let n = values.len();
        let mut data = DMatrix::zeros(n, n);
        for (i, v) in values.iter().enumerate() {
            data[(i, i)] = *v;
        }
        Self { data }
    }

    pub fn nrows(&self) -> usize {
        self.data.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.data.ncols()
    }

    pub fn shape(&self) -> (usize, usize) {
        self.data.shape()
    }

    pub fn get(&self, row: usize, col: usize) -> Option<T> {
        self.data.get((row, col)).copied()
    }

    pub fn as_dmatrix(&self) -> &DMatrix<T> {
        &self.data
    }

    pub fn transpose(&self) -> Self {
        Self { data: self.data.transpose() }
    }

    /// Fails with `DimensionMismatch` unless the shape is exactly `expected`.
    pub fn expect_shape(&self, op: &'static str, expected: (usize, usize)) -> PoseResult<()> {
        if self.shape() != expected {
            return Err(PoseError::DimensionMismatch { op, expected, found: self.shape() });
        }
        Ok(())
    }

    pub fn add(&self, rhs: &Self) -> PoseResult<Self> {
        rhs.expect_shape("add", self.shape())?;
        Ok(Self { data: &self.data + &rhs.data })
    }

    pub fn sub(&self, rhs: &Self) -> PoseResult<Self> {
        rhs.expect_shape("sub", self.shape())?;
        Ok(Self { data: &self.data - &rhs.data })
    }

    pub fn mul(&self, rhs: &Self) -> PoseResult<Self> {
        if self.ncols() != rhs.nrows() {
            return Err(PoseError::DimensionMismatch {
                op: "mul",
                expected: (self.ncols(), rhs.ncols()),
                found: rhs.shape(),
            });
        }
        Ok(Self { data: &self.data * &rhs.data })
    }

    pub fn scale(&self, factor: T) -> Self {
        Self { data: &self.data * factor }
    }

    /// General inverse. Fails with `SingularMatrix` when the determinant of
    /// the max-abs normalised matrix is numerically zero.
    pub fn inverse(&self) -> PoseResult<Self> {
        let (rows, cols) = self.shape();
        if rows != cols {
            return Err(PoseError::DimensionMismatch {
                op: "inverse",
                expected: (rows, rows),
                found: (rows, cols),
            });
        }
        let magnitude = self.data.iter().fold(T::zero(), |m, &v| m.max(v.abs()));
        if magnitude <= T::zero() {
            return Err(PoseError::SingularMatrix { op: "inverse" });
        }
        let normalized = &self.data / magnitude;
        if normalized.determinant().abs() <= nalgebra::convert::<f64, T>(SINGULAR_EPSILON) {
            return Err(PoseError::SingularMatrix { op: "inverse" });
        }
        self.data
            .clone()
            .try_inverse()
            .map(|data| Self { data })
            .ok_or(PoseError::SingularMatrix { op: "inverse" })
    }

    /// Mirrors the upper triangle onto the lower one.
    pub fn symmetrize(&mut self) {
        let n = self.nrows().min(self.ncols());
        let two: T = nalgebra::convert(2.0);
        for i in 0..n {
            for j in (i + 1)..n {
                let avg = (self.data[(i, j)] + self.data[(j, i)]) / two;
                self.data[(i, j)] = avg;
                self.data[(j, i)] = avg;
            }
        }
    }
}

impl<T: RealField + Copy> From<DMatrix<T>> for Matrix<T> {
    fn from(data: DMatrix<T>) -> Self {
        Self { data }
    }
}
