//! Probability densities with seeded sampling.
//!
//! A [`Distribution`] wraps one of three density representations:
//!
//! | Density | Parameters | Sampling |
//! |---|---|---|
//! | [`TabulatedDensity`] | grid weights, shape, `[lb, ub]` | inverse CDF over the flattened grid |
//! | [`GaussianFunc`] | μ, Σ | μ + L z (Cholesky) |
//! | [`UniformFunc`] | `[lb, ub]` | independent uniforms |
//!
//! or none at all. An undefined distribution is a placeholder: sampling it
//! fails with `InvalidState`.
//!
//! Distributions are immutable. Sampling takes the RNG explicitly; the
//! optional seed is read by [`Distribution::sample_seeded`] and by margin
//! networks when they build one stream per distribution.

mod gaussian;
mod tabulated;
mod uniform;

pub use gaussian::GaussianFunc;
pub use tabulated::{TabulatedDensity, TabulationOptions};
pub use uniform::UniformFunc;

use rand::Rng;

use crate::error::{MarginError, Result};
use crate::random::{create_rng, derive_seed};
use crate::samples::Samples;

/// Density representation behind a [`Distribution`].
#[derive(Debug, Clone)]
pub enum Density {
    Tabulated(TabulatedDensity),
    Gaussian(GaussianFunc),
    Uniform(UniformFunc),
}

impl Density {
    pub fn ndim(&self) -> usize {
        match self {
            Density::Tabulated(t) => t.ndim(),
            Density::Gaussian(g) => g.ndim(),
            Density::Uniform(u) => u.ndim(),
        }
    }

    pub fn sample<R: Rng>(&self, n: usize, rng: &mut R) -> Samples {
        match self {
            Density::Tabulated(t) => t.sample(n, rng),
            Density::Gaussian(g) => g.sample(n, rng),
            Density::Uniform(u) => u.sample(n, rng),
        }
    }

    /// Mean vector of the density.
    pub fn mean(&self) -> Vec<f64> {
        match self {
            Density::Tabulated(t) => t.mean(),
            Density::Gaussian(g) => g.mean().iter().copied().collect(),
            Density::Uniform(u) => u.mean(),
        }
    }

    fn density_at(&self, x: &[f64]) -> f64 {
        match self {
            Density::Tabulated(t) => t.density_at(x),
            Density::Gaussian(g) => g.density_at(x),
            Density::Uniform(u) => u.density_at(x),
        }
    }

    /// Non-negative density at every row of `points`.
    pub fn compute_density(&self, points: &Samples) -> Result<Vec<f64>> {
        if points.ndim() != self.ndim() {
            return Err(MarginError::mismatch("density points", self.ndim(), points.ndim()));
        }
        Ok(points.rows().map(|x| self.density_at(x)).collect())
    }
}

impl From<TabulatedDensity> for Density {
    fn from(t: TabulatedDensity) -> Self {
        Density::Tabulated(t)
    }
}

impl From<GaussianFunc> for Density {
    fn from(g: GaussianFunc) -> Self {
        Density::Gaussian(g)
    }
}

impl From<UniformFunc> for Density {
    fn from(u: UniformFunc) -> Self {
        Density::Uniform(u)
    }
}

/// A labelled, optionally seeded density.
///
/// # Examples
/// ```
/// use design_margins::distribution::Distribution;
/// use design_margins::random::create_rng;
///
/// let d = Distribution::uniform(&[0.0], &[1.0]).unwrap().with_seed(7);
/// let mut rng = create_rng(7);
/// let s = d.sample(100, &mut rng).unwrap();
/// assert_eq!(s.len(), 100);
/// assert!(s.as_slice().iter().all(|&x| (0.0..=1.0).contains(&x)));
/// ```
#[derive(Debug, Clone)]
pub struct Distribution {
    label: String,
    seed: Option<u64>,
    density: Option<Density>,
}

impl Distribution {
    /// Wraps a density.
    pub fn new(density: impl Into<Density>) -> Self {
        Self {
            label: String::new(),
            seed: None,
            density: Some(density.into()),
        }
    }

    /// A placeholder with no density.
    pub fn undefined(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            seed: None,
            density: None,
        }
    }

    /// Multivariate Gaussian from a mean and a row-major covariance.
    pub fn gaussian(mu: &[f64], sigma_row_major: &[f64]) -> Result<Self> {
        GaussianFunc::from_slices(mu, sigma_row_major).map(Self::new)
    }

    /// Uniform box `[lb, ub]`.
    pub fn uniform(lb: &[f64], ub: &[f64]) -> Result<Self> {
        UniformFunc::new(lb.to_vec(), ub.to_vec()).map(Self::new)
    }

    /// Tabulated density on a grid of `shape` over `[lb, ub]`.
    pub fn tabulated(
        weights: Vec<f64>,
        shape: Vec<usize>,
        lb: Vec<f64>,
        ub: Vec<f64>,
    ) -> Result<Self> {
        TabulatedDensity::new(weights, shape, lb, ub).map(Self::new)
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    pub fn density(&self) -> Option<&Density> {
        self.density.as_ref()
    }

    pub fn is_defined(&self) -> bool {
        self.density.is_some()
    }

    fn defined(&self) -> Result<&Density> {
        self.density.as_ref().ok_or_else(|| {
            MarginError::state(format!("distribution '{}' has no density defined", self.label))
        })
    }

    /// Dimension of one draw.
    pub fn ndim(&self) -> Result<usize> {
        self.defined().map(Density::ndim)
    }

    /// Draws `n` samples as an `n × ndim` matrix.
    ///
    /// # Errors
    /// `InvalidState` if no density is defined.
    pub fn sample<R: Rng>(&self, n: usize, rng: &mut R) -> Result<Samples> {
        Ok(self.defined()?.sample(n, rng))
    }

    /// Draws with a fresh generator seeded from this distribution's seed
    /// (or from its label when unseeded), so repeated calls return the same
    /// samples.
    pub fn sample_seeded(&self, n: usize) -> Result<Samples> {
        let seed = self.seed.unwrap_or_else(|| derive_seed(0, &self.label));
        self.sample(n, &mut create_rng(seed))
    }

    /// Density at every row of `points`.
    ///
    /// # Errors
    /// `InvalidState` if undefined, `DimensionMismatch` if the point
    /// dimension differs from the density's.
    pub fn compute_density(&self, points: &Samples) -> Result<Vec<f64>> {
        self.defined()?.compute_density(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_undefined_distribution() {
        let d = Distribution::undefined("placeholder");
        assert!(!d.is_defined());
        let mut rng = create_rng(0);
        assert!(matches!(d.sample(10, &mut rng), Err(MarginError::InvalidState(_))));
        assert!(d.ndim().is_err());
        assert!(d.compute_density(&Samples::from_column(vec![0.0])).is_err());
    }

    #[test]
    fn test_sample_shape() {
        let d = Distribution::gaussian(&[0.0, 0.0, 0.0], &[1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0])
            .unwrap();
        let mut rng = create_rng(3);
        let s = d.sample(250, &mut rng).unwrap();
        assert_eq!((s.len(), s.ndim()), (250, 3));
        assert_eq!(d.sample(0, &mut rng).unwrap().len(), 0);
    }

    #[test]
    fn test_sample_seeded_is_reproducible() {
        let d = Distribution::uniform(&[0.0, 0.0], &[1.0, 2.0]).unwrap().with_seed(99);
        assert_eq!(d.sample_seeded(50).unwrap(), d.sample_seeded(50).unwrap());
        let other = d.clone().with_seed(100);
        assert_ne!(d.sample_seeded(50).unwrap(), other.sample_seeded(50).unwrap());
    }

    #[test]
    fn test_density_dimension_checked() {
        let d = Distribution::uniform(&[0.0, 0.0], &[1.0, 1.0]).unwrap();
        let err = d.compute_density(&Samples::from_column(vec![0.5])).unwrap_err();
        assert!(matches!(err, MarginError::DimensionMismatch { expected: 2, got: 1, .. }));
    }

    #[test]
    fn test_tabulated_constructor() {
        let d = Distribution::tabulated(vec![1.0, 1.0], vec![2], vec![0.0], vec![4.0])
            .unwrap()
            .with_label("flat");
        assert_eq!(d.label(), "flat");
        let p = d.compute_density(&Samples::from_column(vec![1.0, 3.0, 5.0])).unwrap();
        assert_eq!(p, vec![0.25, 0.25, 0.0]);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn densities_are_non_negative(
            weights in proptest::collection::vec(0.0_f64..5.0, 4),
            xs in proptest::collection::vec(-3.0_f64..3.0, 1..20),
        ) {
            prop_assume!(weights.iter().sum::<f64>() > 0.0);
            let points = Samples::from_column(xs);
            let dists = [
                Distribution::tabulated(weights, vec![4], vec![-1.0], vec![1.0]).unwrap(),
                Distribution::gaussian(&[0.2], &[0.5]).unwrap(),
                Distribution::uniform(&[-0.5], &[1.5]).unwrap(),
            ];
            for d in &dists {
                prop_assert!(d.compute_density(&points).unwrap().iter().all(|&p| p >= 0.0));
            }
        }

        #[test]
        fn sample_length_matches_request(n in 0_usize..300, seed in 0_u64..1000) {
            let d = Distribution::gaussian(&[1.0, 2.0], &[1.0, 0.2, 0.2, 1.0]).unwrap();
            let s = d.sample(n, &mut create_rng(seed)).unwrap();
            prop_assert_eq!(s.len(), n);
            prop_assert_eq!(s.ndim(), 2);
        }
    }
}
