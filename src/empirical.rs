//! Empirical distributions estimated from Monte Carlo samples.
//!
//! - [`Histogram`]: equal-width bins over the sample range, NumPy
//!   `histogram(density=True)` semantics.
//! - [`EmpiricalCdf`]: exact step CDF over the sorted samples.
//! - [`CdfCurve`]: the binned CDF (bin centres and cumulative mass) with
//!   the excess limit at a cutoff probability and the binned reliability
//!   above a buffer limit.

use log::warn;

use crate::distribution::{Distribution, TabulatedDensity};
use crate::error::{MarginError, Result};
use crate::stats;

fn finite_values(data: &[f64]) -> Vec<f64> {
    let finite: Vec<f64> = data.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.len() != data.len() {
        warn!(
            "ignoring {} non-finite values out of {}",
            data.len() - finite.len(),
            data.len()
        );
    }
    finite
}

/// Equal-width histogram.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    edges: Vec<f64>,
    counts: Vec<u64>,
    total: u64,
}

impl Histogram {
    /// Bins `data` into `bins` equal-width bins spanning `[min, max]`.
    ///
    /// When every value is equal the range widens to `[v − 0.5, v + 0.5]`.
    /// Non-finite values are skipped. The last bin is closed on the right.
    ///
    /// # Errors
    /// `InvalidParameters` for `bins == 0`; `InvalidState` when `data` has
    /// no finite values.
    pub fn new(data: &[f64], bins: usize) -> Result<Self> {
        if bins == 0 {
            return Err(MarginError::invalid("histogram needs at least one bin"));
        }
        let data = finite_values(data);
        let (Some(lo), Some(hi)) = (stats::min(&data), stats::max(&data)) else {
            return Err(MarginError::state("cannot build a histogram from no samples"));
        };
        let (lo, hi) = if lo == hi { (lo - 0.5, hi + 0.5) } else { (lo, hi) };

        let width = (hi - lo) / bins as f64;
        let edges: Vec<f64> = (0..=bins)
            .map(|i| if i == bins { hi } else { lo + width * i as f64 })
            .collect();
        let mut counts = vec![0_u64; bins];
        for &v in &data {
            let idx = (((v - lo) / width).floor() as usize).min(bins - 1);
            counts[idx] += 1;
        }
        Ok(Self {
            edges,
            counts,
            total: data.len() as u64,
        })
    }

    /// `bins + 1` bin edges.
    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    pub fn bins(&self) -> usize {
        self.counts.len()
    }

    /// Number of samples binned.
    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn bin_width(&self) -> f64 {
        (self.edges[self.bins()] - self.edges[0]) / self.bins() as f64
    }

    /// Midpoints of consecutive edges.
    pub fn centers(&self) -> Vec<f64> {
        self.edges.windows(2).map(|w| (w[0] + w[1]) / 2.0).collect()
    }

    /// Counts normalised so the histogram integrates to one.
    pub fn density(&self) -> Vec<f64> {
        let norm = self.total as f64 * self.bin_width();
        self.counts.iter().map(|&c| c as f64 / norm).collect()
    }

    /// The histogram as a one-dimensional tabulated distribution.
    pub fn to_distribution(&self) -> Result<Distribution> {
        let weights = self.counts.iter().map(|&c| c as f64).collect();
        let lo = self.edges[0];
        let hi = self.edges[self.bins()];
        TabulatedDensity::univariate(weights, lo, hi).map(Distribution::new)
    }
}

/// Step-function CDF over sorted samples.
///
/// # Examples
/// ```
/// use design_margins::empirical::EmpiricalCdf;
/// let ecdf = EmpiricalCdf::new(&[3.0, 1.0, 2.0, 4.0]).unwrap();
/// assert_eq!(ecdf.cdf(0.0), 0.0);
/// assert_eq!(ecdf.cdf(2.0), 0.5);
/// assert_eq!(ecdf.survival(2.0), 0.75);
/// assert_eq!(ecdf.cdf(4.0), 1.0);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct EmpiricalCdf {
    sorted: Vec<f64>,
}

impl EmpiricalCdf {
    /// # Errors
    /// `InvalidState` when `data` holds no finite values.
    pub fn new(data: &[f64]) -> Result<Self> {
        let mut sorted = finite_values(data);
        if sorted.is_empty() {
            return Err(MarginError::state("cannot build a CDF from no samples"));
        }
        sorted.sort_unstable_by(f64::total_cmp);
        Ok(Self { sorted })
    }

    pub fn len(&self) -> usize {
        self.sorted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sorted.is_empty()
    }

    pub fn samples(&self) -> &[f64] {
        &self.sorted
    }

    /// P(X ≤ x).
    pub fn cdf(&self, x: f64) -> f64 {
        self.sorted.partition_point(|&v| v <= x) as f64 / self.len() as f64
    }

    /// P(X ≥ x).
    pub fn survival(&self, x: f64) -> f64 {
        let below = self.sorted.partition_point(|&v| v < x);
        (self.len() - below) as f64 / self.len() as f64
    }

    /// `p`-th quantile (linear interpolation), `None` for `p ∉ [0, 1]`.
    pub fn quantile(&self, p: f64) -> Option<f64> {
        stats::quantile_sorted(&self.sorted, p)
    }

    pub fn min(&self) -> f64 {
        self.sorted[0]
    }

    pub fn max(&self) -> f64 {
        self.sorted[self.len() - 1]
    }
}

/// Excess limit and binned reliability read off a [`CdfCurve`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CdfLimits {
    /// First bin centre where the CDF reaches the cutoff.
    pub excess_limit: f64,
    /// `1 − cdf` at the first bin centre at or above the buffer limit.
    pub reliability: f64,
}

/// Binned CDF: bin centres and the cumulative mass up to each bin.
#[derive(Debug, Clone, PartialEq)]
pub struct CdfCurve {
    pub centers: Vec<f64>,
    pub cdf: Vec<f64>,
}

impl CdfCurve {
    pub fn from_histogram(hist: &Histogram) -> Self {
        let width = hist.bin_width();
        let mut running = 0.0;
        let cdf = hist
            .density()
            .into_iter()
            .map(|d| {
                running += d * width;
                running
            })
            .collect();
        Self {
            centers: hist.centers(),
            cdf,
        }
    }

    pub fn from_samples(data: &[f64], bins: usize) -> Result<Self> {
        Histogram::new(data, bins).map(|h| Self::from_histogram(&h))
    }

    /// # Errors
    /// `InvalidParameters` if `cutoff` is outside `[0, 1]`.
    pub fn limits(&self, cutoff: f64, buffer_limit: f64) -> Result<CdfLimits> {
        if !(0.0..=1.0).contains(&cutoff) {
            return Err(MarginError::invalid(format!(
                "cutoff must lie in [0, 1], got {cutoff}"
            )));
        }
        // the final cumulative sum can fall a few ulps short of 1
        let excess_limit = self
            .cdf
            .iter()
            .position(|&c| c >= cutoff - 1e-12)
            .map_or(self.centers[self.centers.len() - 1], |i| self.centers[i]);
        let reliability = self
            .centers
            .iter()
            .position(|&c| c >= buffer_limit)
            .map_or(0.0, |i| 1.0 - self.cdf[i]);
        Ok(CdfLimits {
            excess_limit,
            reliability,
        })
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(300))]

        #[test]
        fn ecdf_monotone_with_unit_limits(
            data in proptest::collection::vec(-1e3_f64..1e3, 1..200),
            a in -2e3_f64..2e3,
            b in -2e3_f64..2e3,
        ) {
            let e = EmpiricalCdf::new(&data).unwrap();
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(e.cdf(lo) <= e.cdf(hi));
            prop_assert_eq!(e.cdf(f64::NEG_INFINITY), 0.0);
            prop_assert_eq!(e.cdf(f64::INFINITY), 1.0);
        }

        #[test]
        fn binned_cdf_non_decreasing(
            data in proptest::collection::vec(-1e3_f64..1e3, 1..200),
            bins in 1_usize..60,
        ) {
            let curve = CdfCurve::from_samples(&data, bins).unwrap();
            prop_assert!(curve.cdf.windows(2).all(|w| w[0] <= w[1] + 1e-12));
            prop_assert!((curve.cdf[bins - 1] - 1.0).abs() < 1e-9);
        }
    }
}
