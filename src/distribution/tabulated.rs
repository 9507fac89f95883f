//! Densities tabulated on a regular grid.

use rand::Rng;

use crate::error::{MarginError, Result};
use crate::random::CumulativeTable;
use crate::samples::Samples;

/// Sampling options for a [`TabulatedDensity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TabulationOptions {
    /// Order weights by magnitude before accumulating the CDF table.
    pub sort: bool,
    /// Jitter each draw uniformly inside its grid cell. Without it draws
    /// land on the lower cell corner.
    pub interpolation: bool,
}

impl Default for TabulationOptions {
    fn default() -> Self {
        Self {
            sort: true,
            interpolation: true,
        }
    }
}

/// Piecewise-constant density over the box `[lb, ub]`, stored as a
/// row-major grid of cell weights.
///
/// Weights need not be normalised; they are treated as relative masses.
#[derive(Debug, Clone)]
pub struct TabulatedDensity {
    weights: Vec<f64>,
    shape: Vec<usize>,
    lb: Vec<f64>,
    ub: Vec<f64>,
    interpolation: bool,
    table: CumulativeTable,
}

impl TabulatedDensity {
    /// Builds a density with default [`TabulationOptions`].
    ///
    /// # Errors
    /// `DimensionMismatch` if `weights.len()` differs from the product of
    /// `shape` or the bounds disagree with `shape.len()`;
    /// `InvalidParameters` for negative/non-finite weights, zero total
    /// mass, an empty or zero-sized shape, or `lb >= ub` in any dimension.
    pub fn new(weights: Vec<f64>, shape: Vec<usize>, lb: Vec<f64>, ub: Vec<f64>) -> Result<Self> {
        Self::with_options(weights, shape, lb, ub, TabulationOptions::default())
    }

    /// One-dimensional density over `[lb, ub]`.
    pub fn univariate(weights: Vec<f64>, lb: f64, ub: f64) -> Result<Self> {
        let n = weights.len();
        Self::new(weights, vec![n], vec![lb], vec![ub])
    }

    pub fn with_options(
        weights: Vec<f64>,
        shape: Vec<usize>,
        lb: Vec<f64>,
        ub: Vec<f64>,
        options: TabulationOptions,
    ) -> Result<Self> {
        if shape.is_empty() || shape.contains(&0) {
            return Err(MarginError::invalid(format!(
                "tabulated grid shape must be non-empty with positive extents, got {shape:?}"
            )));
        }
        let cells: usize = shape.iter().product();
        if weights.len() != cells {
            return Err(MarginError::mismatch("tabulated weights", cells, weights.len()));
        }
        if lb.len() != shape.len() {
            return Err(MarginError::mismatch("tabulated lower bounds", shape.len(), lb.len()));
        }
        if ub.len() != shape.len() {
            return Err(MarginError::mismatch("tabulated upper bounds", shape.len(), ub.len()));
        }
        for j in 0..shape.len() {
            if !lb[j].is_finite() || !ub[j].is_finite() || lb[j] >= ub[j] {
                return Err(MarginError::invalid(format!(
                    "tabulated bounds need finite lb < ub, got [{}, {}] in dimension {j}",
                    lb[j], ub[j]
                )));
            }
        }
        let table = CumulativeTable::new(&weights, options.sort).ok_or_else(|| {
            MarginError::invalid(
                "tabulated weights must be finite, non-negative and have a positive, finite total mass",
            )
        })?;

        Ok(Self {
            weights,
            shape,
            lb,
            ub,
            interpolation: options.interpolation,
            table,
        })
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn lower_bounds(&self) -> &[f64] {
        &self.lb
    }

    pub fn upper_bounds(&self) -> &[f64] {
        &self.ub
    }

    /// Raw cell weights in row-major order.
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Mass-weighted mean of the cell centres.
    pub fn mean(&self) -> Vec<f64> {
        let d = self.ndim();
        let mut acc = vec![0.0; d];
        for (flat, &w) in self.weights.iter().enumerate() {
            if w == 0.0 {
                continue;
            }
            let mut rest = flat;
            for j in (0..d).rev() {
                let idx = rest % self.shape[j];
                rest /= self.shape[j];
                acc[j] += w * (self.lb[j] + (idx as f64 + 0.5) * self.cell_width(j));
            }
        }
        let total = self.table.total_weight();
        acc.into_iter().map(|v| v / total).collect()
    }

    fn cell_width(&self, j: usize) -> f64 {
        (self.ub[j] - self.lb[j]) / self.shape[j] as f64
    }

    fn cell_volume(&self) -> f64 {
        (0..self.ndim()).map(|j| self.cell_width(j)).product()
    }

    /// Inverse-CDF sampling: pick a cell by cumulative weight, unravel it to
    /// grid indices, jitter inside the cell and map to `[lb, ub]`.
    pub fn sample<R: Rng>(&self, n: usize, rng: &mut R) -> Samples {
        let d = self.ndim();
        let mut out = Samples::with_capacity(d, n);
        let mut point = vec![0.0; d];
        for _ in 0..n {
            let mut flat = self.table.sample(rng);
            // unravel, last axis fastest
            for j in (0..d).rev() {
                let idx = flat % self.shape[j];
                flat /= self.shape[j];
                let offset = if self.interpolation {
                    rng.random::<f64>()
                } else {
                    0.0
                };
                point[j] = self.lb[j] + (idx as f64 + offset) * self.cell_width(j);
            }
            out.push_row(&point);
        }
        out
    }

    /// Density at one point: the weight of the enclosing cell divided by
    /// total mass and cell volume. Zero outside `[lb, ub]`.
    pub(crate) fn density_at(&self, x: &[f64]) -> f64 {
        let mut flat = 0_usize;
        for j in 0..self.ndim() {
            if !(x[j] >= self.lb[j] && x[j] <= self.ub[j]) {
                return 0.0;
            }
            let idx = (((x[j] - self.lb[j]) / self.cell_width(j)).floor() as usize)
                .min(self.shape[j] - 1);
            flat = flat * self.shape[j] + idx;
        }
        self.weights[flat] / (self.table.total_weight() * self.cell_volume())
    }
}
