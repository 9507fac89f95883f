//! Seeded random number generation and inverse-CDF table sampling.
//!
//! Every sampling routine in this crate takes an explicit `&mut R: Rng`
//! argument. Reproducibility comes from seeding: [`create_rng`] builds a
//! deterministic generator from a `u64`, and [`derive_seed`] splits one
//! parent seed into independent, named sub-streams (one per distribution
//! in a margin network).

use rand::Rng;

/// Creates a fast, seeded random number generator.
///
/// Uses `SmallRng` (Xoshiro256++). The sequence is deterministic for a
/// given seed on the same platform.
///
/// # Examples
/// ```
/// use design_margins::random::create_rng;
/// use rand::Rng;
/// let mut rng = create_rng(42);
/// let x: f64 = rng.random();
/// assert!(x >= 0.0 && x < 1.0);
/// ```
pub fn create_rng(seed: u64) -> rand::rngs::SmallRng {
    use rand::SeedableRng;
    rand::rngs::SmallRng::seed_from_u64(seed)
}

/// Derives a child seed from a parent seed and a string key.
///
/// FNV-1a over the parent's little-endian bytes and the key's UTF-8 bytes,
/// finished with the SplitMix64 mixer. The mapping is fixed, so a network
/// seed reproduces the same streams on every platform and toolchain.
///
/// # Examples
/// ```
/// use design_margins::random::derive_seed;
/// let a = derive_seed(7, "D1");
/// assert_eq!(a, derive_seed(7, "D1"));
/// assert_ne!(a, derive_seed(7, "D2"));
/// ```
#[must_use]
pub fn derive_seed(parent: u64, key: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for &byte in parent.to_le_bytes().iter().chain(key.as_bytes()) {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    splitmix64(hash)
}

/// SplitMix64 output function.
fn splitmix64(x: u64) -> u64 {
    let mut z = x.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// Fisher-Yates (Durstenfeld) in-place shuffle.
///
/// Reference: Knuth (1997), *TAOCP* Vol. 2, §3.4.2, Algorithm P.
pub fn shuffle<T, R: Rng>(slice: &mut [T], rng: &mut R) {
    let n = slice.len();
    if n <= 1 {
        return;
    }
    for i in (1..n).rev() {
        let j = rng.random_range(0..=i);
        slice.swap(i, j);
    }
}

/// Cumulative weight table for repeated inverse-CDF sampling.
///
/// Built once from non-negative weights (a tabulated density), then each
/// draw picks a uniform point on `[0, total)` and binary-searches the
/// cumulative sums, i.e. `searchsorted` over the running total.
///
/// When `sorted` is requested the weights are ordered by magnitude before
/// accumulating, which limits round-off in the running sum for grids with
/// a large dynamic range; [`CumulativeTable::sample`] still returns the
/// index into the *original* weight order.
///
/// # Complexity
/// - Construction: O(n log n) sorted, O(n) unsorted
/// - Sampling: O(log n)
#[derive(Debug, Clone)]
pub struct CumulativeTable {
    cumulative: Vec<f64>,
    order: Option<Vec<usize>>,
    total: f64,
}

impl CumulativeTable {
    /// Builds the table.
    ///
    /// # Returns
    /// - `None` if `weights` is empty, contains a negative or non-finite
    ///   value, or sums to zero or to a non-finite total.
    pub fn new(weights: &[f64], sorted: bool) -> Option<Self> {
        if weights.is_empty() || weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return None;
        }

        let order = sorted.then(|| {
            let mut idx: Vec<usize> = (0..weights.len()).collect();
            idx.sort_by(|&a, &b| weights[a].total_cmp(&weights[b]));
            idx
        });

        let mut cumulative = Vec::with_capacity(weights.len());
        let mut total = 0.0;
        match &order {
            Some(idx) => {
                for &i in idx {
                    total += weights[i];
                    cumulative.push(total);
                }
            }
            None => {
                for &w in weights {
                    total += w;
                    cumulative.push(total);
                }
            }
        }

        if !(total > 0.0 && total.is_finite()) {
            return None;
        }

        Some(Self {
            cumulative,
            order,
            total,
        })
    }

    /// Samples an index into the original weight slice.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> usize {
        let u = rng.random_range(0.0..self.total);
        // First position whose running total exceeds u; zero-weight cells
        // never satisfy this strictly, so they are never selected.
        let pos = self
            .cumulative
            .partition_point(|&c| c <= u)
            .min(self.cumulative.len() - 1);
        match &self.order {
            Some(idx) => idx[pos],
            None => pos,
        }
    }

    /// Sum of all weights.
    pub fn total_weight(&self) -> f64 {
        self.total
    }

    pub fn len(&self) -> usize {
        self.cumulative.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cumulative.is_empty()
    }
}
