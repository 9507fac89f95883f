//! Design of experiments: full-factorial grids and Latin hypercubes.
//!
//! Designs are generated on the unit hypercube `[0, 1]^d` and mapped to a
//! box `[lb, ub]` with [`unscale`]. Full-factorial grids also discretise
//! multivariate Gaussians into tabulated densities.

use log::debug;
use rand::Rng;

use crate::error::{MarginError, Result};
use crate::random::shuffle;
use crate::samples::Samples;

/// `n` evenly spaced points from `start` to `end` inclusive.
///
/// `n == 1` yields `[start]`; `n == 0` yields an empty vector.
pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            (0..n)
                .map(|i| if i == n - 1 { end } else { start + step * i as f64 })
                .collect()
        }
    }
}

fn check_bounds(lb: &[f64], ub: &[f64]) -> Result<()> {
    if lb.len() != ub.len() {
        return Err(MarginError::mismatch("design bounds", lb.len(), ub.len()));
    }
    if lb.is_empty() {
        return Err(MarginError::invalid("design needs at least one factor"));
    }
    if let Some(j) = (0..lb.len()).find(|&j| !(lb[j] <= ub[j]) || !lb[j].is_finite() || !ub[j].is_finite()) {
        return Err(MarginError::invalid(format!(
            "factor {j} requires finite lb <= ub, got [{}, {}]",
            lb[j], ub[j]
        )));
    }
    Ok(())
}

/// Full-factorial grid over `[lb, ub]`.
///
/// `levels` is either a single count applied to every factor or one count
/// per factor. A degenerate factor (`lb == ub`) contributes one level.
/// Rows are in row-major order: the first factor varies slowest.
///
/// # Errors
/// `DimensionMismatch` for inconsistent lengths, `InvalidParameters` for
/// zero levels or reversed bounds.
///
/// # Examples
/// ```
/// use design_margins::doe::full_factorial;
/// let grid = full_factorial(&[0.0, 10.0], &[1.0, 20.0], &[2, 3]).unwrap();
/// assert_eq!(grid.len(), 6);
/// assert_eq!(grid.row(0), &[0.0, 10.0]);
/// assert_eq!(grid.row(5), &[1.0, 20.0]);
/// ```
pub fn full_factorial(lb: &[f64], ub: &[f64], levels: &[usize]) -> Result<Samples> {
    check_bounds(lb, ub)?;
    let d = lb.len();
    let levels: Vec<usize> = match levels.len() {
        1 => vec![levels[0]; d],
        n if n == d => levels.to_vec(),
        n => return Err(MarginError::mismatch("factor levels", d, n)),
    };
    if levels.contains(&0) {
        return Err(MarginError::invalid("every factor needs at least one level"));
    }

    let axes: Vec<Vec<f64>> = (0..d)
        .map(|j| {
            let q = if lb[j] == ub[j] { 1 } else { levels[j] };
            linspace(lb[j], ub[j], q)
        })
        .collect();
    let total: usize = axes.iter().map(Vec::len).product();

    let mut grid = Samples::with_capacity(d, total);
    let mut index = vec![0_usize; d];
    let mut row = vec![0.0; d];
    for _ in 0..total {
        for j in 0..d {
            row[j] = axes[j][index[j]];
        }
        grid.push_row(&row);
        // odometer increment, last factor fastest
        for j in (0..d).rev() {
            index[j] += 1;
            if index[j] < axes[j].len() {
                break;
            }
            index[j] = 0;
        }
    }
    debug!("full_factorial: {d} factors, {total} points");
    Ok(grid)
}

/// Latin hypercube of `n` points in `[0, 1]^d`.
///
/// Each factor's range is cut into `n` equal strata; every stratum holds
/// exactly one point, placed uniformly within it, and strata are paired
/// across factors by independent random permutations.
pub fn latin_hypercube<R: Rng>(ndim: usize, n: usize, rng: &mut R) -> Result<Samples> {
    if ndim == 0 {
        return Err(MarginError::invalid("latin hypercube needs at least one factor"));
    }
    let columns: Vec<Vec<f64>> = (0..ndim)
        .map(|_| {
            let mut col: Vec<f64> = (0..n)
                .map(|k| (k as f64 + rng.random::<f64>()) / n as f64)
                .collect();
            shuffle(&mut col, rng);
            col
        })
        .collect();

    let mut design = Samples::with_capacity(ndim, n);
    let mut row = vec![0.0; ndim];
    for i in 0..n {
        for (j, col) in columns.iter().enumerate() {
            row[j] = col[i];
        }
        design.push_row(&row);
    }
    Ok(design)
}

/// Maps unit-cube points to `[lb, ub]`: `lb + x (ub − lb)`.
pub fn unscale(x: &Samples, lb: &[f64], ub: &[f64]) -> Result<Samples> {
    check_bounds(lb, ub)?;
    if x.ndim() != lb.len() {
        return Err(MarginError::mismatch("unscale", lb.len(), x.ndim()));
    }
    let data = x
        .rows()
        .flat_map(|r| r.iter().enumerate().map(|(j, v)| lb[j] + v * (ub[j] - lb[j])))
        .collect();
    Samples::new(x.ndim(), data)
}

/// Maps points in `[lb, ub]` to the unit cube: `(x − lb) / (ub − lb)`.
///
/// Degenerate factors (`lb == ub`) map to 0.
pub fn scale(x: &Samples, lb: &[f64], ub: &[f64]) -> Result<Samples> {
    check_bounds(lb, ub)?;
    if x.ndim() != lb.len() {
        return Err(MarginError::mismatch("scale", lb.len(), x.ndim()));
    }
    let data = x
        .rows()
        .flat_map(|r| {
            r.iter().enumerate().map(|(j, v)| {
                let range = ub[j] - lb[j];
                if range == 0.0 {
                    0.0
                } else {
                    (v - lb[j]) / range
                }
            })
        })
        .collect();
    Samples::new(x.ndim(), data)
}

/// An experimental design: bounds plus unit-cube points.
#[derive(Debug, Clone)]
pub struct Design {
    lb: Vec<f64>,
    ub: Vec<f64>,
    unit: Samples,
}

impl Design {
    /// Latin hypercube design with `n` points.
    pub fn latin_hypercube<R: Rng>(lb: &[f64], ub: &[f64], n: usize, rng: &mut R) -> Result<Self> {
        check_bounds(lb, ub)?;
        let unit = latin_hypercube(lb.len(), n, rng)?;
        Ok(Self {
            lb: lb.to_vec(),
            ub: ub.to_vec(),
            unit,
        })
    }

    /// Full-factorial design (see [`full_factorial`] for `levels`).
    pub fn full_factorial(lb: &[f64], ub: &[f64], levels: &[usize]) -> Result<Self> {
        check_bounds(lb, ub)?;
        let d = lb.len();
        let unit = full_factorial(&vec![0.0; d], &vec![1.0; d], levels)?;
        Ok(Self {
            lb: lb.to_vec(),
            ub: ub.to_vec(),
            unit,
        })
    }

    /// Points in the unit hypercube.
    pub fn scaled(&self) -> &Samples {
        &self.unit
    }

    /// Points mapped to `[lb, ub]`.
    pub fn unscaled(&self) -> Samples {
        // bounds were validated at construction
        let data = self
            .unit
            .rows()
            .flat_map(|r| {
                r.iter()
                    .enumerate()
                    .map(|(j, v)| self.lb[j] + v * (self.ub[j] - self.lb[j]))
            })
            .collect();
        Samples::from_parts(self.unit.ndim(), data)
    }

    pub fn len(&self) -> usize {
        self.unit.len()
    }

    pub fn is_empty(&self) -> bool {
        self.unit.is_empty()
    }
}
