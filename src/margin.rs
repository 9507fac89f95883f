//! Margin nodes: excess buffers and their empirical distribution.
//!
//! A [`MarginNode`] compares a *decided value* (the capability a design
//! delivers) against a *threshold* (what is required), sample by sample,
//! and keeps three equal-length buffers: decided values, thresholds and
//! the resulting excess. Positive excess means the margin is satisfied:
//!
//! | [`MarginType`] | excess |
//! |---|---|
//! | `MustExceed` | decided − threshold |
//! | `MustNotExceed` | threshold − decided |
//!
//! Buffers grow with every [`MarginNode::compute`] call until
//! [`MarginNode::clear`] or [`MarginNode::discard_last`]. Every derived
//! quantity (pdf, cdf, reliability, limits) is recomputed from the current
//! buffers on each call.

use log::{debug, warn};

use crate::distribution::Distribution;
use crate::empirical::{CdfCurve, CdfLimits, EmpiricalCdf, Histogram};
use crate::error::{MarginError, Result};
use crate::stats::WelfordAccumulator;

/// Direction in which a decided value must clear its threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MarginType {
    /// Capability must exceed the requirement (e.g. load capacity).
    #[default]
    MustExceed,
    /// Response must stay below the limit (e.g. stress vs. yield).
    MustNotExceed,
}

impl MarginType {
    pub fn excess(self, decided_value: f64, threshold: f64) -> f64 {
        match self {
            MarginType::MustExceed => decided_value - threshold,
            MarginType::MustNotExceed => threshold - decided_value,
        }
    }
}

/// How the excess distribution is summarised.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CdfConfig {
    /// Histogram bins for [`MarginNode::pdf`] and [`MarginNode::cdf_curve`].
    pub bins: usize,
    /// Probability at which the excess limit is read off the CDF.
    pub cutoff: f64,
    /// Lower bound of the buffer zone; reliability is P(excess ≥ buffer_limit).
    pub buffer_limit: f64,
}

impl Default for CdfConfig {
    fn default() -> Self {
        Self {
            bins: 500,
            cutoff: 0.9,
            buffer_limit: 0.0,
        }
    }
}

impl CdfConfig {
    pub fn validate(&self) -> Result<()> {
        if self.bins == 0 {
            return Err(MarginError::invalid("CDF config needs at least one bin"));
        }
        if !(0.0..=1.0).contains(&self.cutoff) {
            return Err(MarginError::invalid(format!(
                "cutoff must lie in [0, 1], got {}",
                self.cutoff
            )));
        }
        if !self.buffer_limit.is_finite() {
            return Err(MarginError::invalid("buffer limit must be finite"));
        }
        Ok(())
    }
}

/// Count, moments and reliability of the finite values in a set of
/// excess values. Non-finite entries are skipped, as in [`EmpiricalCdf`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExcessStats {
    /// Number of finite values.
    pub count: usize,
    pub mean: Option<f64>,
    pub std_dev: Option<f64>,
    /// Fraction of finite values at or above the buffer limit; `None` when
    /// there are none.
    pub reliability: Option<f64>,
}

impl ExcessStats {
    pub fn from_excess(excess: &[f64], buffer_limit: f64) -> Self {
        let mut acc = WelfordAccumulator::new();
        let mut satisfied = 0_usize;
        for e in excess.iter().copied().filter(|v| v.is_finite()) {
            acc.update(e);
            if e >= buffer_limit {
                satisfied += 1;
            }
        }
        let count = acc.count() as usize;
        Self {
            count,
            mean: acc.mean(),
            std_dev: acc.sample_std_dev(),
            reliability: (count > 0).then(|| satisfied as f64 / count as f64),
        }
    }
}

/// [`ExcessStats`] of the full buffer plus the binned CDF limits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExcessSummary {
    pub stats: ExcessStats,
    pub limits: CdfLimits,
}

#[derive(Debug, Clone)]
pub struct MarginNode {
    key: String,
    margin_type: MarginType,
    config: CdfConfig,
    decided_value: Vec<f64>,
    threshold: Vec<f64>,
    excess: Vec<f64>,
}

impl MarginNode {
    /// An empty `MustExceed` node with the default [`CdfConfig`].
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            margin_type: MarginType::default(),
            config: CdfConfig::default(),
            decided_value: Vec::new(),
            threshold: Vec::new(),
            excess: Vec::new(),
        }
    }

    /// A `MustExceed` node pre-filled with one batch.
    ///
    /// # Errors
    /// `DimensionMismatch` if the vectors differ in length.
    pub fn from_samples(
        key: impl Into<String>,
        decided_value: &[f64],
        threshold: &[f64],
    ) -> Result<Self> {
        let mut node = Self::new(key);
        node.compute(decided_value, threshold)?;
        Ok(node)
    }

    pub fn with_type(mut self, margin_type: MarginType) -> Self {
        self.margin_type = margin_type;
        self
    }

    /// # Errors
    /// `InvalidParameters` if the config fails [`CdfConfig::validate`].
    pub fn with_config(mut self, config: CdfConfig) -> Result<Self> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn margin_type(&self) -> MarginType {
        self.margin_type
    }

    pub fn config(&self) -> &CdfConfig {
        &self.config
    }

    pub fn decided_value(&self) -> &[f64] {
        &self.decided_value
    }

    pub fn threshold(&self) -> &[f64] {
        &self.threshold
    }

    pub fn excess(&self) -> &[f64] {
        &self.excess
    }

    pub fn len(&self) -> usize {
        self.excess.len()
    }

    pub fn is_empty(&self) -> bool {
        self.excess.is_empty()
    }

    /// Appends one batch and its element-wise excess.
    ///
    /// # Errors
    /// `DimensionMismatch` if the vectors differ in length; the buffers
    /// are left untouched.
    pub fn compute(&mut self, decided_value: &[f64], threshold: &[f64]) -> Result<()> {
        if decided_value.len() != threshold.len() {
            return Err(MarginError::mismatch(
                "margin node threshold",
                decided_value.len(),
                threshold.len(),
            ));
        }
        let excess: Vec<f64> = decided_value
            .iter()
            .zip(threshold)
            .map(|(&d, &t)| self.margin_type.excess(d, t))
            .collect();
        let non_finite = excess.iter().filter(|e| !e.is_finite()).count();
        if non_finite > 0 {
            warn!("margin node '{}': {non_finite} non-finite excess values", self.key);
        }

        self.decided_value.extend_from_slice(decided_value);
        self.threshold.extend_from_slice(threshold);
        self.excess.extend(excess);
        debug!(
            "margin node '{}': +{} samples, {} total",
            self.key,
            decided_value.len(),
            self.excess.len()
        );
        Ok(())
    }

    /// Appends another node's buffers, recomputing excess with this node's
    /// margin type.
    pub fn merge(&mut self, other: &MarginNode) -> Result<()> {
        self.compute(&other.decided_value, &other.threshold)
    }

    /// Empties all three buffers.
    pub fn clear(&mut self) {
        self.decided_value.clear();
        self.threshold.clear();
        self.excess.clear();
    }

    /// Drops the newest `k` samples (all of them if `k >= len`).
    pub fn discard_last(&mut self, k: usize) {
        let keep = self.len().saturating_sub(k);
        self.decided_value.truncate(keep);
        self.threshold.truncate(keep);
        self.excess.truncate(keep);
    }

    fn require_samples(&self) -> Result<()> {
        if self.is_empty() {
            return Err(MarginError::state(format!(
                "margin node '{}' has no excess samples",
                self.key
            )));
        }
        Ok(())
    }

    /// Histogram estimate of the excess density as a tabulated distribution.
    pub fn pdf(&self) -> Result<Distribution> {
        self.require_samples()?;
        Histogram::new(&self.excess, self.config.bins)?
            .to_distribution()
            .map(|d| d.with_label(self.key.clone()))
    }

    /// Empirical CDF of the excess.
    pub fn cdf(&self) -> Result<EmpiricalCdf> {
        self.require_samples()?;
        EmpiricalCdf::new(&self.excess)
    }

    /// P(excess ≥ buffer_limit).
    pub fn reliability(&self) -> Result<f64> {
        Ok(self.cdf()?.survival(self.config.buffer_limit))
    }

    /// Binned CDF of the excess.
    pub fn cdf_curve(&self) -> Result<CdfCurve> {
        self.require_samples()?;
        CdfCurve::from_samples(&self.excess, self.config.bins)
    }

    /// Excess limit at the configured cutoff and binned reliability.
    pub fn limits(&self) -> Result<CdfLimits> {
        self.cdf_curve()?
            .limits(self.config.cutoff, self.config.buffer_limit)
    }

    pub fn summary(&self) -> Result<ExcessSummary> {
        Ok(ExcessSummary {
            limits: self.limits()?,
            stats: ExcessStats::from_excess(&self.excess, self.config.buffer_limit),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::GaussianFunc;
    use crate::random::create_rng;

    use test_log::test;

    #[test]
    fn test_deterministic_excess() {
        let mut node = MarginNode::new("EM1");
        node.compute(&[5.8], &[4.0]).unwrap();
        assert!((node.excess()[0] - 1.8).abs() < 1e-12);

        node.clear();
        node.compute(&[5.8; 10], &[4.0; 10]).unwrap();
        assert_eq!(node.len(), 10);
        assert!(node.excess().iter().all(|&e| (e - 1.8).abs() < 1e-12));
    }

    #[test]
    fn test_must_not_exceed() {
        let mut node = MarginNode::new("E2").with_type(MarginType::MustNotExceed);
        node.compute(&[300.0, 500.0], &[460.0, 460.0]).unwrap();
        assert_eq!(node.excess(), &[160.0, -40.0]);
        assert_eq!(node.reliability().unwrap(), 0.5);
    }

    #[test]
    fn test_non_finite_excess_skipped_consistently() {
        let mut node = MarginNode::new("E3");
        node.compute(&[1.0, f64::NAN, -1.0, f64::INFINITY], &[0.0; 4]).unwrap();
        assert_eq!(node.len(), 4);

        let stats = ExcessStats::from_excess(node.excess(), 0.0);
        assert_eq!(stats.count, 2);
        assert_eq!(stats.mean, Some(0.0));
        assert_eq!(stats.reliability, Some(0.5));
        assert_eq!(stats.reliability, Some(node.reliability().unwrap()));
        assert_eq!(node.summary().unwrap().stats, stats);

        let none = ExcessStats::from_excess(&[f64::NAN], 0.0);
        assert_eq!(none.count, 0);
        assert_eq!(none.reliability, None);
    }

    #[test]
    fn test_length_mismatch_leaves_buffers() {
        let mut node = MarginNode::from_samples("E1", &[1.0, 2.0], &[0.5, 0.5]).unwrap();
        let err = node.compute(&[1.0, 2.0, 3.0], &[1.0, 2.0]).unwrap_err();
        assert_eq!(err, MarginError::mismatch("margin node threshold", 3, 2));
        assert_eq!(node.len(), 2);
        assert_eq!(node.decided_value().len(), 2);
        assert_eq!(node.threshold().len(), 2);
    }

    #[test]
    fn test_buffers_accumulate_and_discard() {
        let mut node = MarginNode::new("E1");
        node.compute(&[1.0, 2.0], &[0.0, 0.0]).unwrap();
        node.compute(&[3.0], &[0.0]).unwrap();
        assert_eq!(node.excess(), &[1.0, 2.0, 3.0]);
        node.discard_last(2);
        assert_eq!(node.excess(), &[1.0]);
        assert_eq!(node.decided_value(), &[1.0]);
        node.discard_last(10);
        assert!(node.is_empty());
    }

    #[test]
    fn test_empty_node_queries_fail() {
        let node = MarginNode::new("E1");
        assert!(matches!(node.pdf(), Err(MarginError::InvalidState(_))));
        assert!(matches!(node.cdf(), Err(MarginError::InvalidState(_))));
        assert!(matches!(node.reliability(), Err(MarginError::InvalidState(_))));
        assert!(matches!(node.summary(), Err(MarginError::InvalidState(_))));
    }

    #[test]
    fn test_config_validation() {
        let bad = CdfConfig {
            cutoff: 1.2,
            ..CdfConfig::default()
        };
        assert!(MarginNode::new("E").with_config(bad).is_err());
        let bad = CdfConfig {
            bins: 0,
            ..CdfConfig::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_stochastic_excess_moments() {
        let decided = GaussianFunc::univariate(4.6, 0.09).unwrap();
        let threshold = GaussianFunc::univariate(4.0, 0.09).unwrap();
        let mut rng = create_rng(17);
        let dv = decided.sample(10_000, &mut rng).column(0);
        let tt = threshold.sample(10_000, &mut rng).column(0);

        let node = MarginNode::from_samples("EM1", &dv, &tt).unwrap();
        let summary = node.summary().unwrap();
        assert_eq!(summary.stats.count, 10_000);
        assert!((summary.stats.mean.unwrap() - 0.6).abs() < 0.06);
        let var = summary.stats.std_dev.unwrap().powi(2);
        assert!((var - 0.18).abs() < 0.018);

        // P(excess >= 0) for N(0.6, 0.18): half the mass plus the mass
        // within the mean's Mahalanobis radius on the positive side
        let r = 0.6 / 0.18_f64.sqrt();
        let expected = 0.5 + 0.5 * crate::special::chi_squared_cdf(r * r, 1.0);
        assert!((node.reliability().unwrap() - expected).abs() < 0.02);
        assert!((summary.limits.reliability - expected).abs() < 0.02);
        // 90th percentile of N(0.6, 0.18)
        let p90 = 0.6 + 1.2816 * 0.18_f64.sqrt();
        assert!((summary.limits.excess_limit - p90).abs() < 0.05);
    }

    #[test]
    fn test_pdf_is_tabulated_over_range() {
        let node = MarginNode::from_samples("E", &[0.0, 1.0, 2.0, 3.0], &[0.0; 4])
            .unwrap()
            .with_config(CdfConfig {
                bins: 3,
                ..CdfConfig::default()
            })
            .unwrap();
        let pdf = node.pdf().unwrap();
        assert_eq!(pdf.label(), "E");
        let p = pdf
            .compute_density(&crate::samples::Samples::from_column(vec![0.5, 2.5, 4.0]))
            .unwrap();
        assert!((p[0] - 0.25).abs() < 1e-12);
        assert!((p[1] - 0.5).abs() < 1e-12);
        assert_eq!(p[2], 0.0);
    }

    #[test]
    fn test_merge_appends() {
        let mut a = MarginNode::from_samples("E", &[1.0], &[0.0]).unwrap();
        let b = MarginNode::from_samples("E", &[2.0, 3.0], &[1.0, 1.0]).unwrap();
        a.merge(&b).unwrap();
        assert_eq!(a.excess(), &[1.0, 1.0, 2.0]);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(300))]

        #[test]
        fn excess_is_exact_difference(
            pairs in proptest::collection::vec((-1e6_f64..1e6, -1e6_f64..1e6), 0..100),
        ) {
            let (dv, tt): (Vec<f64>, Vec<f64>) = pairs.into_iter().unzip();
            let mut node = MarginNode::new("E");
            node.compute(&dv, &tt).unwrap();
            prop_assert_eq!(node.len(), dv.len());
            for i in 0..dv.len() {
                prop_assert_eq!(node.excess()[i], dv[i] - tt[i]);
            }
        }

        #[test]
        fn reliability_in_unit_interval(
            excess in proptest::collection::vec(-10.0_f64..10.0, 1..200),
        ) {
            let node = MarginNode::from_samples("E", &excess, &vec![0.0; excess.len()]).unwrap();
            let r = node.reliability().unwrap();
            prop_assert!((0.0..=1.0).contains(&r));
        }

        #[test]
        fn mismatched_lengths_never_mutate(
            n in 0_usize..50,
            m in 0_usize..50,
        ) {
            prop_assume!(n != m);
            let mut node = MarginNode::from_samples("E", &[1.0], &[0.0]).unwrap();
            prop_assert!(node.compute(&vec![1.0; n], &vec![0.0; m]).is_err());
            prop_assert_eq!(node.len(), 1);
        }
    }
}
