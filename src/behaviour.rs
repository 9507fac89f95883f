//! Behaviour models: stateless transforms between named signals.
//!
//! A behaviour receives the sample vectors of its declared inputs and
//! returns the sample vectors of its declared outputs, all of the same
//! length (one entry per Monte Carlo scenario). Anything implementing
//! `Fn(&Signals) -> Result<Signals>` is a behaviour; [`Pointwise`] lifts a
//! per-scenario function over whole batches.

use std::collections::BTreeMap;

use crate::error::{MarginError, Result};

/// Named sample vectors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Signals {
    values: BTreeMap<String, Vec<f64>>,
}

impl Signals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a signal, returning the previous vector.
    pub fn insert(&mut self, key: impl Into<String>, values: Vec<f64>) -> Option<Vec<f64>> {
        self.values.insert(key.into(), values)
    }

    pub fn with(mut self, key: impl Into<String>, values: Vec<f64>) -> Self {
        self.insert(key, values);
        self
    }

    pub fn get(&self, key: &str) -> Option<&[f64]> {
        self.values.get(key).map(Vec::as_slice)
    }

    /// Like [`get`](Self::get) but fails with `UnknownSignal`.
    pub fn require(&self, key: &str) -> Result<&[f64]> {
        self.get(key)
            .ok_or_else(|| MarginError::UnknownSignal(key.to_string()))
    }

    pub fn remove(&mut self, key: &str) -> Option<Vec<f64>> {
        self.values.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Number of signals.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

impl<K: Into<String>> FromIterator<(K, Vec<f64>)> for Signals {
    fn from_iter<I: IntoIterator<Item = (K, Vec<f64>)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// A user-defined engineering model.
///
/// Implementations must produce every output the network declares for
/// them, each with one value per input scenario; a missing output surfaces
/// as `MissingOutput` from the network.
pub trait Behaviour: Send + Sync {
    fn evaluate(&self, inputs: &Signals) -> Result<Signals>;
}

impl<F> Behaviour for F
where
    F: Fn(&Signals) -> Result<Signals> + Send + Sync,
{
    fn evaluate(&self, inputs: &Signals) -> Result<Signals> {
        self(inputs)
    }
}

/// Applies a scalar model scenario by scenario.
///
/// The function receives one value per input (in declaration order) and
/// returns one value per output.
///
/// # Examples
/// ```
/// use design_margins::behaviour::{Behaviour, Pointwise, Signals};
///
/// let weight = Pointwise::new(&["rho", "w", "h", "L"], &["weight"], |x: &[f64]| {
///     vec![x[0] * x[1] * x[2] * x[3]]
/// });
/// let inputs = Signals::new()
///     .with("rho", vec![8.19e-6, 8.19e-6])
///     .with("w", vec![130.0, 100.0])
///     .with("h", vec![20.0, 20.0])
///     .with("L", vec![190.0, 190.0]);
/// let out = weight.evaluate(&inputs).unwrap();
/// assert_eq!(out.get("weight").unwrap().len(), 2);
/// ```
pub struct Pointwise<F> {
    inputs: Vec<String>,
    outputs: Vec<String>,
    model: F,
}

impl<F> Pointwise<F>
where
    F: Fn(&[f64]) -> Vec<f64> + Send + Sync,
{
    pub fn new(inputs: &[&str], outputs: &[&str], model: F) -> Self {
        Self {
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            outputs: outputs.iter().map(|s| s.to_string()).collect(),
            model,
        }
    }
}

impl<F> Behaviour for Pointwise<F>
where
    F: Fn(&[f64]) -> Vec<f64> + Send + Sync,
{
    fn evaluate(&self, inputs: &Signals) -> Result<Signals> {
        let columns: Vec<&[f64]> = self
            .inputs
            .iter()
            .map(|k| inputs.require(k))
            .collect::<Result<_>>()?;
        let n = columns.first().map_or(0, |c| c.len());
        if let Some(bad) = columns.iter().find(|c| c.len() != n) {
            return Err(MarginError::mismatch("pointwise input", n, bad.len()));
        }

        let mut outputs: Vec<Vec<f64>> = vec![Vec::with_capacity(n); self.outputs.len()];
        let mut point = vec![0.0; columns.len()];
        for i in 0..n {
            for (p, col) in point.iter_mut().zip(&columns) {
                *p = col[i];
            }
            let values = (self.model)(&point);
            if values.len() != self.outputs.len() {
                return Err(MarginError::mismatch(
                    "pointwise output",
                    self.outputs.len(),
                    values.len(),
                ));
            }
            for (out, v) in outputs.iter_mut().zip(values) {
                out.push(v);
            }
        }
        Ok(self.outputs.iter().cloned().zip(outputs).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signals_lookup() {
        let mut s = Signals::new().with("a", vec![1.0, 2.0]);
        assert_eq!(s.get("a"), Some(&[1.0, 2.0][..]));
        assert_eq!(s.require("b"), Err(MarginError::UnknownSignal("b".into())));
        assert_eq!(s.insert("a", vec![3.0]), Some(vec![1.0, 2.0]));
        assert!(s.contains("a"));
        assert_eq!(s.keys().collect::<Vec<_>>(), vec!["a"]);
        assert_eq!(s.remove("a"), Some(vec![3.0]));
        assert!(s.is_empty());
    }

    #[test]
    fn test_closure_is_behaviour() {
        let double = |inputs: &Signals| -> Result<Signals> {
            let x = inputs.require("x")?;
            Ok(Signals::new().with("y", x.iter().map(|v| 2.0 * v).collect()))
        };
        let out = double.evaluate(&Signals::new().with("x", vec![1.0, 4.0])).unwrap();
        assert_eq!(out.get("y"), Some(&[2.0, 8.0][..]));
        assert!(double.evaluate(&Signals::new()).is_err());
    }

    #[test]
    fn test_pointwise_maps_each_scenario() {
        let b = Pointwise::new(&["a", "b"], &["sum", "prod"], |x: &[f64]| {
            vec![x[0] + x[1], x[0] * x[1]]
        });
        let out = b
            .evaluate(&Signals::new().with("a", vec![1.0, 2.0]).with("b", vec![3.0, 4.0]))
            .unwrap();
        assert_eq!(out.get("sum"), Some(&[4.0, 6.0][..]));
        assert_eq!(out.get("prod"), Some(&[3.0, 8.0][..]));
    }

    #[test]
    fn test_pointwise_rejects_ragged_inputs() {
        let b = Pointwise::new(&["a", "b"], &["c"], |x: &[f64]| vec![x[0]]);
        let err = b
            .evaluate(&Signals::new().with("a", vec![1.0, 2.0]).with("b", vec![3.0]))
            .unwrap_err();
        assert!(matches!(err, MarginError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_pointwise_checks_output_arity() {
        let b = Pointwise::new(&["a"], &["c", "d"], |x: &[f64]| vec![x[0]]);
        assert!(b.evaluate(&Signals::new().with("a", vec![1.0])).is_err());
    }
}
