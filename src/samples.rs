//! Row-major sample matrices.
//!
//! A [`Samples`] value holds `n` draws of a `d`-dimensional quantity as an
//! `n × d` row-major buffer. Row `i` is one scenario; column `j` is the
//! history of dimension `j` across scenarios.

use crate::error::{MarginError, Result};

/// `n × d` matrix of draws, stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Samples {
    ndim: usize,
    data: Vec<f64>,
}

impl Samples {
    /// Wraps a row-major buffer of `ndim`-dimensional points.
    ///
    /// # Errors
    /// `InvalidParameters` if `ndim == 0`; `DimensionMismatch` if
    /// `data.len()` is not a multiple of `ndim`.
    pub fn new(ndim: usize, data: Vec<f64>) -> Result<Self> {
        if ndim == 0 {
            return Err(MarginError::invalid("samples need at least one dimension"));
        }
        if data.len() % ndim != 0 {
            return Err(MarginError::mismatch(
                "sample buffer",
                data.len().next_multiple_of(ndim),
                data.len(),
            ));
        }
        Ok(Self { ndim, data })
    }

    /// One-dimensional samples.
    pub fn from_column(values: Vec<f64>) -> Self {
        Self {
            ndim: 1,
            data: values,
        }
    }

    /// Builds a matrix from equal-length rows.
    ///
    /// # Errors
    /// `DimensionMismatch` if the rows differ in length, `InvalidParameters`
    /// for empty input or zero-length rows.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        let ndim = rows
            .first()
            .map(Vec::len)
            .ok_or_else(|| MarginError::invalid("no rows supplied"))?;
        let mut data = Vec::with_capacity(rows.len() * ndim);
        for row in rows {
            if row.len() != ndim {
                return Err(MarginError::mismatch("sample row", ndim, row.len()));
            }
            data.extend_from_slice(row);
        }
        Self::new(ndim, data)
    }

    /// Caller guarantees `ndim > 0` and `data.len() % ndim == 0`.
    pub(crate) fn from_parts(ndim: usize, data: Vec<f64>) -> Self {
        debug_assert!(ndim > 0 && data.len() % ndim == 0);
        Self { ndim, data }
    }

    pub(crate) fn with_capacity(ndim: usize, n: usize) -> Self {
        Self {
            ndim,
            data: Vec::with_capacity(ndim * n),
        }
    }

    pub(crate) fn push_row(&mut self, row: &[f64]) {
        debug_assert_eq!(row.len(), self.ndim);
        self.data.extend_from_slice(row);
    }

    /// Number of draws (rows).
    pub fn len(&self) -> usize {
        self.data.len() / self.ndim
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Dimension of each draw (columns).
    pub fn ndim(&self) -> usize {
        self.ndim
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.ndim..(i + 1) * self.ndim]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        self.data.chunks_exact(self.ndim)
    }

    /// Copies column `j` out as a vector of length [`len`](Self::len).
    ///
    /// # Panics
    /// If `j >= ndim`.
    pub fn column(&self, j: usize) -> Vec<f64> {
        assert!(j < self.ndim, "column {j} out of range for {} dims", self.ndim);
        self.rows().map(|r| r[j]).collect()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<f64> {
        self.data
    }
}
