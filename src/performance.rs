//! Performance nodes: buffers of a design's figures of merit.
//!
//! Where a margin node records how far a decided value clears its
//! threshold, a performance node records a quantity the designer wants to
//! push in one direction (weight down, stiffness up). The network appends
//! one batch per forward pass, next to the margin nodes.

use log::warn;

use crate::error::{MarginError, Result};
use crate::stats::{self, WelfordAccumulator};

/// Which way a performance value improves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PerformanceDirection {
    #[default]
    LessIsBetter,
    MoreIsBetter,
}

impl PerformanceDirection {
    /// `value` mapped so that larger always means better.
    pub fn utility(self, value: f64) -> f64 {
        match self {
            PerformanceDirection::LessIsBetter => -value,
            PerformanceDirection::MoreIsBetter => value,
        }
    }

    /// Whether `a` is strictly better than `b`.
    pub fn is_better(self, a: f64, b: f64) -> bool {
        self.utility(a) > self.utility(b)
    }
}

/// Summary of a performance buffer over its finite values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerformanceStats {
    pub count: usize,
    pub mean: Option<f64>,
    pub std_dev: Option<f64>,
    /// Best value in the direction of improvement.
    pub best: Option<f64>,
    pub worst: Option<f64>,
}

impl PerformanceStats {
    pub fn from_values(values: &[f64], direction: PerformanceDirection) -> Self {
        let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        let mut acc = WelfordAccumulator::new();
        acc.extend(finite.iter().copied());
        let (lo, hi) = (stats::min(&finite), stats::max(&finite));
        let (best, worst) = match direction {
            PerformanceDirection::LessIsBetter => (lo, hi),
            PerformanceDirection::MoreIsBetter => (hi, lo),
        };
        Self {
            count: finite.len(),
            mean: acc.mean(),
            std_dev: acc.sample_std_dev(),
            best,
            worst,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PerformanceNode {
    key: String,
    direction: PerformanceDirection,
    values: Vec<f64>,
}

impl PerformanceNode {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            direction: PerformanceDirection::default(),
            values: Vec::new(),
        }
    }

    pub fn with_direction(mut self, direction: PerformanceDirection) -> Self {
        self.direction = direction;
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn direction(&self) -> PerformanceDirection {
        self.direction
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Appends one batch of performance values.
    pub fn record(&mut self, values: &[f64]) {
        let bad = values.iter().filter(|v| !v.is_finite()).count();
        if bad > 0 {
            warn!("performance node '{}': {bad} non-finite values recorded", self.key);
        }
        self.values.extend_from_slice(values);
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    /// Drops the newest `k` values.
    pub fn discard_last(&mut self, k: usize) {
        let keep = self.values.len().saturating_sub(k);
        self.values.truncate(keep);
    }

    /// Statistics of the whole buffer.
    ///
    /// # Errors
    /// `InvalidState` when the buffer is empty.
    pub fn stats(&self) -> Result<PerformanceStats> {
        if self.values.is_empty() {
            return Err(MarginError::state(format!(
                "performance node '{}' has no samples",
                self.key
            )));
        }
        Ok(PerformanceStats::from_values(&self.values, self.direction))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_orders_values() {
        assert!(PerformanceDirection::LessIsBetter.is_better(1.0, 2.0));
        assert!(PerformanceDirection::MoreIsBetter.is_better(2.0, 1.0));
        assert!(!PerformanceDirection::MoreIsBetter.is_better(1.0, 1.0));
        assert_eq!(PerformanceDirection::default(), PerformanceDirection::LessIsBetter);
    }

    #[test]
    fn test_record_and_stats() {
        let mut weight = PerformanceNode::new("P1");
        assert!(matches!(weight.stats(), Err(MarginError::InvalidState(_))));
        weight.record(&[4.0, 2.0]);
        weight.record(&[6.0]);
        assert_eq!(weight.values(), &[4.0, 2.0, 6.0]);

        let s = weight.stats().unwrap();
        assert_eq!(s.count, 3);
        assert_eq!(s.mean, Some(4.0));
        assert_eq!(s.best, Some(2.0));
        assert_eq!(s.worst, Some(6.0));

        let stiffness = weight.clone().with_direction(PerformanceDirection::MoreIsBetter);
        assert_eq!(stiffness.stats().unwrap().best, Some(6.0));
    }

    #[test]
    fn test_stats_skip_non_finite() {
        let mut p = PerformanceNode::new("P2");
        p.record(&[1.0, f64::NAN, 3.0]);
        let s = p.stats().unwrap();
        assert_eq!(s.count, 2);
        assert_eq!(s.mean, Some(2.0));
    }

    #[test]
    fn test_clear_and_discard() {
        let mut p = PerformanceNode::new("P3");
        p.record(&[1.0, 2.0, 3.0]);
        p.discard_last(2);
        assert_eq!(p.values(), &[1.0]);
        p.discard_last(5);
        assert!(p.is_empty());
        p.record(&[1.0]);
        p.clear();
        assert_eq!(p.len(), 0);
    }
}
