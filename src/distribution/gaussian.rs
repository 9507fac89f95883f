//! Multivariate Gaussian density.
//!
//! # Mathematical Definition
//! For mean μ ∈ ℝᵈ and symmetric positive-definite covariance Σ:
//!
//! - Mahalanobis radius: r(x) = √((x − μ)ᵀ Σ⁻¹ (x − μ))
//! - PDF: f(x) = exp(−r²/2) / √((2π)ᵈ |Σ|)
//! - Mass inside radius r: P(χ²_d ≤ r²)
//! - Ellipsoid volume at radius r: V_d √|Σ| rᵈ, V_d = π^{d/2} / Γ(d/2 + 1)
//!
//! Draws use the Cholesky factor: x = μ + L z with z ~ N(0, I).

use std::f64::consts::PI;

use log::debug;
use nalgebra::{Cholesky, DMatrix, DVector, SymmetricEigen};
use rand::Rng;
use rand_distr::StandardNormal;

use super::TabulatedDensity;
use crate::doe::full_factorial;
use crate::error::{MarginError, Result};
use crate::samples::Samples;
use crate::special::{chi_squared_cdf, unit_ball_volume};

/// Relative tolerance for the covariance symmetry check.
const SYMMETRY_TOL: f64 = 1e-10;

#[derive(Debug, Clone)]
pub struct GaussianFunc {
    mu: DVector<f64>,
    sigma: DMatrix<f64>,
    chol_l: DMatrix<f64>,
    sigma_inv: DMatrix<f64>,
    det: f64,
    norm: f64,
}

impl GaussianFunc {
    /// # Errors
    /// - `DimensionMismatch` if `sigma` is not square or its size differs
    ///   from `mu`.
    /// - `InvalidParameters` for an empty or non-finite mean/covariance, an
    ///   asymmetric covariance, or one that is not positive-definite.
    pub fn new(mu: DVector<f64>, sigma: DMatrix<f64>) -> Result<Self> {
        if sigma.nrows() != sigma.ncols() {
            return Err(MarginError::mismatch(
                "covariance columns",
                sigma.nrows(),
                sigma.ncols(),
            ));
        }
        if mu.len() != sigma.nrows() {
            return Err(MarginError::mismatch("gaussian mean", sigma.nrows(), mu.len()));
        }
        let d = mu.len();
        if d == 0 {
            return Err(MarginError::invalid("gaussian needs at least one dimension"));
        }
        if mu.iter().chain(sigma.iter()).any(|v| !v.is_finite()) {
            return Err(MarginError::invalid("gaussian mean and covariance must be finite"));
        }
        for i in 0..d {
            for j in (i + 1)..d {
                let (a, b) = (sigma[(i, j)], sigma[(j, i)]);
                if (a - b).abs() > SYMMETRY_TOL * a.abs().max(b.abs()).max(1.0) {
                    return Err(MarginError::invalid(format!(
                        "covariance is not symmetric: Σ[{i},{j}]={a}, Σ[{j},{i}]={b}"
                    )));
                }
            }
        }

        let chol = Cholesky::new(sigma.clone())
            .ok_or_else(|| MarginError::invalid("covariance is not positive-definite"))?;
        let chol_l = chol.l();
        let det: f64 = chol_l.diagonal().iter().map(|v| v * v).product();
        let sigma_inv = chol.inverse();
        let norm = ((2.0 * PI).powi(d as i32) * det).sqrt();
        debug!("GaussianFunc: d={d}, |Σ|={det:.6e}");

        Ok(Self {
            mu,
            sigma,
            chol_l,
            sigma_inv,
            det,
            norm,
        })
    }

    /// Builds from a mean slice and a row-major `d × d` covariance slice.
    pub fn from_slices(mu: &[f64], sigma_row_major: &[f64]) -> Result<Self> {
        let d = mu.len();
        if sigma_row_major.len() != d * d {
            return Err(MarginError::mismatch("covariance entries", d * d, sigma_row_major.len()));
        }
        Self::new(
            DVector::from_column_slice(mu),
            DMatrix::from_row_slice(d, d, sigma_row_major),
        )
    }

    /// One-dimensional Gaussian with the given mean and *variance*.
    pub fn univariate(mean: f64, variance: f64) -> Result<Self> {
        Self::from_slices(&[mean], &[variance])
    }

    pub fn ndim(&self) -> usize {
        self.mu.len()
    }

    pub fn mean(&self) -> &DVector<f64> {
        &self.mu
    }

    pub fn covariance(&self) -> &DMatrix<f64> {
        &self.sigma
    }

    /// Determinant |Σ|.
    pub fn determinant(&self) -> f64 {
        self.det
    }

    /// Mahalanobis radius of `x` from the mean. `x` must have `ndim` entries.
    pub fn mahalanobis(&self, x: &[f64]) -> Result<f64> {
        if x.len() != self.ndim() {
            return Err(MarginError::mismatch("gaussian point", self.ndim(), x.len()));
        }
        Ok(self.radius_unchecked(x))
    }

    fn radius_unchecked(&self, x: &[f64]) -> f64 {
        let diff = DVector::from_column_slice(x) - &self.mu;
        diff.dot(&(&self.sigma_inv * &diff)).max(0.0).sqrt()
    }

    /// Density as a function of Mahalanobis radius. Maximal at `r = 0` and
    /// strictly decreasing in `|r|`.
    pub fn compute_density_r(&self, r: f64) -> f64 {
        (-0.5 * r * r).exp() / self.norm
    }

    pub(crate) fn density_at(&self, x: &[f64]) -> f64 {
        self.compute_density_r(self.radius_unchecked(x))
    }

    /// Density at every row of `points`.
    pub fn compute_density(&self, points: &Samples) -> Result<Vec<f64>> {
        if points.ndim() != self.ndim() {
            return Err(MarginError::mismatch("density points", self.ndim(), points.ndim()));
        }
        Ok(points.rows().map(|x| self.density_at(x)).collect())
    }

    /// Volume of the hyper-ellipsoid `{x : r(x) ≤ r}`.
    pub fn compute_volume(&self, r: f64) -> f64 {
        let d = self.ndim();
        unit_ball_volume(d) * self.det.sqrt() * r.abs().powi(d as i32)
    }

    /// Probability mass inside Mahalanobis radius `r`.
    pub fn probability_within(&self, r: f64) -> f64 {
        chi_squared_cdf(r * r, self.ndim() as f64)
    }

    /// Eigenvalues of Σ, largest first.
    pub fn eigenvalues(&self) -> Vec<f64> {
        let mut ev: Vec<f64> = SymmetricEigen::new(self.sigma.clone())
            .eigenvalues
            .iter()
            .copied()
            .collect();
        ev.sort_unstable_by(|a, b| b.total_cmp(a));
        ev
    }

    /// Bounding box `μ ± k √λ_max`.
    pub fn support(&self, k: f64) -> (Vec<f64>, Vec<f64>) {
        let lambda_max = self.eigenvalues().first().copied().unwrap_or(0.0).max(0.0);
        let half = k * lambda_max.sqrt();
        let lb = self.mu.iter().map(|m| m - half).collect();
        let ub = self.mu.iter().map(|m| m + half).collect();
        (lb, ub)
    }

    /// Discretises the density on a `resolution^d` grid over `support(3)`,
    /// evaluating it at cell centres.
    pub fn tabulate(&self, resolution: usize) -> Result<TabulatedDensity> {
        if resolution == 0 {
            return Err(MarginError::invalid("tabulation resolution must be positive"));
        }
        let d = self.ndim();
        let (lb, ub) = self.support(3.0);
        let (centre_lb, centre_ub): (Vec<f64>, Vec<f64>) = lb
            .iter()
            .zip(&ub)
            .map(|(a, b)| {
                let half_cell = (b - a) / (2.0 * resolution as f64);
                (a + half_cell, b - half_cell)
            })
            .unzip();
        let grid = full_factorial(&centre_lb, &centre_ub, &[resolution])?;
        let weights = self.compute_density(&grid)?;
        TabulatedDensity::new(weights, vec![resolution; d], lb, ub)
    }

    pub fn sample<R: Rng>(&self, n: usize, rng: &mut R) -> Samples {
        let d = self.ndim();
        let mut out = Samples::with_capacity(d, n);
        for _ in 0..n {
            let z = DVector::from_fn(d, |_, _| rng.sample::<f64, _>(StandardNormal));
            let x = &self.mu + &self.chol_l * z;
            out.push_row(x.as_slice());
        }
        out
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn radial_density_decreasing(r in 0.0_f64..8.0, dr in 1e-3_f64..2.0) {
            let g = GaussianFunc::from_slices(&[0.0, 1.0], &[1.0, 0.3, 0.3, 2.0]).unwrap();
            prop_assert!(g.compute_density_r(0.0) >= g.compute_density_r(r));
            prop_assert!(g.compute_density_r(r) > g.compute_density_r(r + dr));
        }

        #[test]
        fn density_non_negative(x in -50.0_f64..50.0, y in -50.0_f64..50.0) {
            let g = GaussianFunc::from_slices(&[0.0, 1.0], &[1.0, 0.3, 0.3, 2.0]).unwrap();
            let p = g.compute_density(&Samples::new(2, vec![x, y]).unwrap()).unwrap();
            prop_assert!(p[0] >= 0.0);
        }
    }
}
