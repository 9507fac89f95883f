//! Uniform density over an axis-aligned box.

use rand::Rng;

use crate::error::{MarginError, Result};
use crate::samples::Samples;

/// Uniform density on `[lb, ub]` (one interval per dimension).
///
/// # Mathematical Definition
/// - PDF: f(x) = 1 / Π(ubⱼ − lbⱼ) inside the box, 0 outside
/// - Mean: (lb + ub) / 2
#[derive(Debug, Clone, PartialEq)]
pub struct UniformFunc {
    lb: Vec<f64>,
    ub: Vec<f64>,
}

impl UniformFunc {
    /// # Errors
    /// `DimensionMismatch` if the bound vectors differ in length;
    /// `InvalidParameters` if they are empty or `lb >= ub` anywhere.
    pub fn new(lb: Vec<f64>, ub: Vec<f64>) -> Result<Self> {
        if lb.len() != ub.len() {
            return Err(MarginError::mismatch("uniform bounds", lb.len(), ub.len()));
        }
        if lb.is_empty() {
            return Err(MarginError::invalid("uniform density needs at least one dimension"));
        }
        for (j, (&lo, &hi)) in lb.iter().zip(&ub).enumerate() {
            if !lo.is_finite() || !hi.is_finite() || lo >= hi {
                return Err(MarginError::invalid(format!(
                    "Uniform requires min < max, got [{lo}, {hi}] in dimension {j}"
                )));
            }
        }
        Ok(Self { lb, ub })
    }

    /// Box of half-width `half_range` around `center`.
    pub fn centered(center: &[f64], half_range: &[f64]) -> Result<Self> {
        if center.len() != half_range.len() {
            return Err(MarginError::mismatch("uniform centre", center.len(), half_range.len()));
        }
        let lb = center.iter().zip(half_range).map(|(c, h)| c - h).collect();
        let ub = center.iter().zip(half_range).map(|(c, h)| c + h).collect();
        Self::new(lb, ub)
    }

    pub fn ndim(&self) -> usize {
        self.lb.len()
    }

    pub fn lower_bounds(&self) -> &[f64] {
        &self.lb
    }

    pub fn upper_bounds(&self) -> &[f64] {
        &self.ub
    }

    pub fn mean(&self) -> Vec<f64> {
        self.lb.iter().zip(&self.ub).map(|(a, b)| (a + b) / 2.0).collect()
    }

    fn volume(&self) -> f64 {
        self.lb.iter().zip(&self.ub).map(|(a, b)| b - a).product()
    }

    pub fn sample<R: Rng>(&self, n: usize, rng: &mut R) -> Samples {
        let d = self.ndim();
        let mut out = Samples::with_capacity(d, n);
        let mut point = vec![0.0; d];
        for _ in 0..n {
            for j in 0..d {
                point[j] = self.lb[j] + rng.random::<f64>() * (self.ub[j] - self.lb[j]);
            }
            out.push_row(&point);
        }
        out
    }

    pub(crate) fn density_at(&self, x: &[f64]) -> f64 {
        let inside = x
            .iter()
            .zip(self.lb.iter().zip(&self.ub))
            .all(|(v, (lo, hi))| v >= lo && v <= hi);
        if inside {
            1.0 / self.volume()
        } else {
            0.0
        }
    }
}
