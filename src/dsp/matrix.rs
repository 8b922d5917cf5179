use serde::Serialize;

use crate::error::TransformError;

/// Dense row-major 2-D array.
///
/// Rows are frequency (or scale) bins in ascending frequency, columns are
/// time frames.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl Matrix {
    /// Zero-filled matrix. Callers must fill it before it leaves a transform.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// Build from row vectors, which must all have the same length
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Result<Self, TransformError> {
        let cols = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|row| row.len() != cols) {
            return Err(TransformError::degenerate("ragged rows"));
        }
        let n_rows = rows.len();
        let data = rows.into_iter().flatten().collect();
        Self::from_vec(n_rows, cols, data)
    }

    /// Build from row-major data
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f32>) -> Result<Self, TransformError> {
        if data.len() != rows * cols {
            return Err(TransformError::degenerate(format!(
                "expected {} values for a {}x{} matrix, got {}",
                rows * cols,
                rows,
                cols,
                data.len()
            )));
        }
        Ok(Self { rows, cols, data })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0 || self.cols == 0
    }

    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.data[row * self.cols + col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: f32) {
        self.data[row * self.cols + col] = value;
    }

    pub fn row(&self, row: usize) -> &[f32] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    pub fn row_mut(&mut self, row: usize) -> &mut [f32] {
        &mut self.data[row * self.cols..(row + 1) * self.cols]
    }

    /// Copy of one column (one time frame)
    pub fn column(&self, col: usize) -> Vec<f32> {
        (0..self.rows).map(|row| self.get(row, col)).collect()
    }

    /// Raw row-major values
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn map_inplace<F: Fn(f32) -> f32>(&mut self, f: F) {
        for value in self.data.iter_mut() {
            *value = f(*value);
        }
    }

    /// Keep only the first `rows` rows
    pub fn truncate_rows(&mut self, rows: usize) {
        if rows < self.rows {
            self.rows = rows;
            self.data.truncate(rows * self.cols);
        }
    }

    /// Smallest and largest value
    pub fn min_max(&self) -> (f32, f32) {
        self.data
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)))
    }

    /// Largest value, or 0 for an empty matrix
    pub fn max(&self) -> f32 {
        self.data.iter().copied().fold(0.0f32, f32::max)
    }

    /// Final gate before a matrix leaves a transform: non-empty and all finite
    pub fn validated(self) -> Result<Self, TransformError> {
        if self.is_empty() {
            return Err(TransformError::degenerate(format!(
                "empty {}x{} matrix",
                self.rows, self.cols
            )));
        }
        if let Some(index) = self.data.iter().position(|v| !v.is_finite()) {
            return Err(TransformError::degenerate(format!(
                "non-finite value at row {}, column {}",
                index / self.cols,
                index % self.cols
            )));
        }
        Ok(self)
    }
}
