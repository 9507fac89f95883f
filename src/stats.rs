//! Descriptive statistics over Monte Carlo sample buffers.
//!
//! Margin buffers can hold hundreds of thousands of draws, so every
//! reduction here is numerically stable:
//!
//! - **Mean and variance**: Welford's online algorithm, mergeable across
//!   batches.
//!   Reference: Welford (1962), *Technometrics* 4(3).
//! - **Quantile**: R-7 linear interpolation (NumPy's default).
//!   Reference: Hyndman & Fan (1996), *The American Statistician* 50(4).
//!
//! Reductions return `None` instead of propagating NaN.

/// Smallest value, or `None` if `data` is empty or contains NaN.
pub fn min(data: &[f64]) -> Option<f64> {
    if data.is_empty() {
        return None;
    }
    data.iter()
        .copied()
        .try_fold(f64::INFINITY, |acc, x| (!x.is_nan()).then(|| acc.min(x)))
}

/// Largest value, or `None` if `data` is empty or contains NaN.
pub fn max(data: &[f64]) -> Option<f64> {
    if data.is_empty() {
        return None;
    }
    data.iter()
        .copied()
        .try_fold(f64::NEG_INFINITY, |acc, x| (!x.is_nan()).then(|| acc.max(x)))
}

/// `p`-th quantile (R-7) of data already sorted in non-decreasing order,
/// `None` if the data is empty or `p` is outside `[0, 1]`.
///
/// # Examples
/// ```
/// use design_margins::stats::quantile_sorted;
/// let excess = [-0.2, 0.1, 0.3, 0.8];
/// assert_eq!(quantile_sorted(&excess, 0.0), Some(-0.2));
/// assert!((quantile_sorted(&excess, 0.5).unwrap() - 0.2).abs() < 1e-15);
/// ```
///
/// For sorted `x[0..n]`: `h = (n−1)p`, `j = ⌊h⌋`, `g = h − j`, result
/// `(1−g)·x[j] + g·x[j+1]`.
pub fn quantile_sorted(sorted_data: &[f64], p: f64) -> Option<f64> {
    let n = sorted_data.len();
    if n == 0 || !(0.0..=1.0).contains(&p) {
        return None;
    }
    if n == 1 {
        return Some(sorted_data[0]);
    }

    let h = (n - 1) as f64 * p;
    let j = h.floor() as usize;
    let g = h - h.floor();

    if j + 1 >= n {
        Some(sorted_data[n - 1])
    } else {
        Some((1.0 - g) * sorted_data[j] + g * sorted_data[j + 1])
    }
}

/// Streaming mean/variance accumulator.
///
/// Used for per-batch excess statistics in a margin network, where a
/// batch is summarised without copying its buffer, and for combining
/// statistics computed by independent Monte Carlo workers via
/// [`merge`](Self::merge).
///
/// # Examples
/// ```
/// use design_margins::stats::WelfordAccumulator;
/// let mut acc = WelfordAccumulator::new();
/// for &x in &[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
///     acc.update(x);
/// }
/// assert!((acc.mean().unwrap() - 5.0).abs() < 1e-15);
/// assert!((acc.sample_variance().unwrap() - 4.571428571428571).abs() < 1e-10);
/// ```
#[derive(Debug, Clone, Default)]
pub struct WelfordAccumulator {
    count: u64,
    mean_acc: f64,
    m2: f64,
}

impl WelfordAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one sample.
    pub fn update(&mut self, value: f64) {
        self.count += 1;
        if self.count == 1 {
            self.mean_acc = value;
            return;
        }
        let delta = value - self.mean_acc;
        self.mean_acc += delta / self.count as f64;
        self.m2 += delta * (value - self.mean_acc);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Running mean, `None` before the first sample.
    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then_some(self.mean_acc)
    }

    /// Sample variance, `None` with fewer than 2 samples.
    pub fn sample_variance(&self) -> Option<f64> {
        (self.count >= 2).then(|| self.m2 / (self.count - 1) as f64)
    }

    pub fn sample_std_dev(&self) -> Option<f64> {
        self.sample_variance().map(f64::sqrt)
    }

    /// Combines another accumulator into this one.
    ///
    /// Reference: Chan, Golub & LeVeque (1979), "Updating Formulae and a
    /// Pairwise Algorithm for Computing Sample Variances".
    pub fn merge(&mut self, other: &WelfordAccumulator) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = other.clone();
            return;
        }
        let na = self.count as f64;
        let nb = other.count as f64;
        let n = na + nb;
        let delta = other.mean_acc - self.mean_acc;

        self.mean_acc += delta * (nb / n);
        self.m2 += other.m2 + delta * delta * na * nb / n;
        self.count += other.count;
    }
}

impl Extend<f64> for WelfordAccumulator {
    fn extend<I: IntoIterator<Item = f64>>(&mut self, iter: I) {
        iter.into_iter().for_each(|x| self.update(x));
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(300))]

        #[test]
        fn quantile_within_min_max(
            mut data in proptest::collection::vec(-1e6_f64..1e6, 1..100),
            p in 0.0_f64..=1.0,
        ) {
            data.sort_unstable_by(f64::total_cmp);
            let q = quantile_sorted(&data, p).unwrap();
            prop_assert!(q >= min(&data).unwrap() - 1e-9);
            prop_assert!(q <= max(&data).unwrap() + 1e-9);
        }

        #[test]
        fn variance_non_negative(data in proptest::collection::vec(-1e3_f64..1e3, 2..100)) {
            let mut acc = WelfordAccumulator::new();
            acc.extend(data.iter().copied());
            prop_assert!(acc.sample_variance().unwrap() >= 0.0);
        }

        #[test]
        fn merge_is_split_invariant(
            data in proptest::collection::vec(-1e3_f64..1e3, 2..80),
            split in 0_usize..80,
        ) {
            let split = split.min(data.len());
            let mut whole = WelfordAccumulator::new();
            whole.extend(data.iter().copied());
            let mut a = WelfordAccumulator::new();
            a.extend(data[..split].iter().copied());
            let mut b = WelfordAccumulator::new();
            b.extend(data[split..].iter().copied());
            a.merge(&b);
            prop_assert!((a.mean().unwrap() - whole.mean().unwrap()).abs() < 1e-8);
        }
    }
}
