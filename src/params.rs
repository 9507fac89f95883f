//! Parameters feeding a margin network.
//!
//! - [`FixedParam`]: a constant, broadcast to every sample.
//! - [`DesignParam`]: a design choice, optionally uncertain.
//! - [`InputSpec`]: an input specification (requirement or environment),
//!   optionally uncertain, with the direction it is expected to change in
//!   and the increment used to step it.
//!
//! Uncertain parameters hold a shared `Arc<Distribution>` plus the index of
//! their component inside it, so several parameters can be the marginals
//! of one joint (e.g. correlated Gaussian) distribution. Without a
//! distribution they behave like fixed parameters at their nominal value.

use std::str::FromStr;
use std::sync::Arc;

use rand::Rng;

use crate::distribution::Distribution;
use crate::error::{MarginError, Result};

/// Descriptive metadata common to all parameters.
#[derive(Debug, Clone, Default, PartialEq)]
struct Metadata {
    description: String,
    symbol: String,
}

/// A constant parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct FixedParam {
    key: String,
    value: f64,
    meta: Metadata,
}

impl FixedParam {
    pub fn new(key: impl Into<String>, value: f64) -> Self {
        Self {
            key: key.into(),
            value,
            meta: Metadata::default(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.meta.description = description.into();
        self
    }

    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.meta.symbol = symbol.into();
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn description(&self) -> &str {
        &self.meta.description
    }

    pub fn symbol(&self) -> &str {
        &self.meta.symbol
    }
}

/// State shared by [`DesignParam`] and [`InputSpec`].
#[derive(Debug, Clone)]
pub struct UncertainValue {
    key: String,
    nominal: f64,
    distribution: Option<Arc<Distribution>>,
    component: usize,
    universe: Option<(f64, f64)>,
    meta: Metadata,
    change_direction: Option<ChangeDirection>,
    increment: Option<Increment>,
}

impl UncertainValue {
    fn stochastic(key: String, distribution: Arc<Distribution>) -> Self {
        let nominal = distribution
            .density()
            .and_then(|d| d.mean().first().copied())
            .unwrap_or(0.0);
        Self {
            key,
            nominal,
            distribution: Some(distribution),
            component: 0,
            universe: None,
            meta: Metadata::default(),
            change_direction: None,
            increment: None,
        }
    }

    fn deterministic(key: String, value: f64) -> Self {
        Self {
            key,
            nominal: value,
            distribution: None,
            component: 0,
            universe: None,
            meta: Metadata::default(),
            change_direction: None,
            increment: None,
        }
    }

    fn set_component(&mut self, component: usize) {
        self.component = component;
        if let Some(mean) = self.distribution.as_ref().and_then(|d| d.density()).map(|d| d.mean()) {
            if let Some(&m) = mean.get(component) {
                self.nominal = m;
            }
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Value used when the parameter is evaluated deterministically.
    pub fn nominal(&self) -> f64 {
        self.nominal
    }

    pub fn distribution(&self) -> Option<&Arc<Distribution>> {
        self.distribution.as_ref()
    }

    /// Index of this parameter inside a joint distribution.
    pub fn component(&self) -> usize {
        self.component
    }

    /// Admissible range `(lb, ub)`, if any.
    pub fn universe(&self) -> Option<(f64, f64)> {
        self.universe
    }

    pub fn description(&self) -> &str {
        &self.meta.description
    }

    pub fn symbol(&self) -> &str {
        &self.meta.symbol
    }

    pub fn is_stochastic(&self) -> bool {
        self.distribution.is_some()
    }

    /// Checks the universe ordering, the increment, and that the component
    /// exists in the distribution.
    pub fn validate(&self) -> Result<()> {
        if let Some((lb, ub)) = self.universe {
            if !(lb <= ub) {
                return Err(MarginError::invalid(format!(
                    "universe of '{}' must satisfy lb <= ub, got ({lb}, {ub})",
                    self.key
                )));
            }
        }
        if let Some(inc) = self.increment {
            if !inc.value.is_finite() || inc.value == 0.0 {
                return Err(MarginError::invalid(format!(
                    "increment of '{}' must be finite and non-zero, got {}",
                    self.key, inc.value
                )));
            }
        }
        if let Some(dist) = &self.distribution {
            let ndim = dist.ndim()?;
            if self.component >= ndim {
                return Err(MarginError::mismatch(
                    "distribution component",
                    ndim,
                    self.component + 1,
                ));
            }
        }
        Ok(())
    }

    /// Clamps a drawn value into the universe, when one is set.
    pub fn clamp(&self, value: f64) -> f64 {
        match self.universe {
            Some((lb, ub)) if lb <= ub => value.clamp(lb, ub),
            _ => value,
        }
    }

    /// Draws `n` values: the parameter's component of `n` joint draws,
    /// clamped to the universe, or the nominal value repeated.
    pub fn sample<R: Rng>(&self, n: usize, rng: &mut R) -> Result<Vec<f64>> {
        self.validate()?;
        match &self.distribution {
            Some(dist) => {
                let draws = dist.sample(n, rng)?;
                Ok(draws.rows().map(|r| self.clamp(r[self.component])).collect())
            }
            None => Ok(vec![self.nominal; n]),
        }
    }
}

macro_rules! uncertain_param {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone)]
        pub struct $name(UncertainValue);

        impl $name {
            /// Parameter drawn from `distribution` (component 0).
            pub fn new(key: impl Into<String>, distribution: Arc<Distribution>) -> Self {
                Self(UncertainValue::stochastic(key.into(), distribution))
            }

            /// Deterministic parameter at `value`.
            pub fn deterministic(key: impl Into<String>, value: f64) -> Self {
                Self(UncertainValue::deterministic(key.into(), value))
            }

            /// Selects the component of a joint distribution. The nominal
            /// value follows the component's mean unless overridden later
            /// with [`with_nominal`](Self::with_nominal).
            pub fn with_component(mut self, component: usize) -> Self {
                self.0.set_component(component);
                self
            }

            pub fn with_nominal(mut self, value: f64) -> Self {
                self.0.nominal = value;
                self
            }

            pub fn with_universe(mut self, lb: f64, ub: f64) -> Self {
                self.0.universe = Some((lb, ub));
                self
            }

            pub fn with_description(mut self, description: impl Into<String>) -> Self {
                self.0.meta.description = description.into();
                self
            }

            pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
                self.0.meta.symbol = symbol.into();
                self
            }
        }

        impl std::ops::Deref for $name {
            type Target = UncertainValue;

            fn deref(&self) -> &UncertainValue {
                &self.0
            }
        }
    };
}

uncertain_param! {
    /// A design choice. Draws are clamped to the universe when one is set.
    DesignParam
}

uncertain_param! {
    /// An input specification such as a requirement or an operating
    /// condition.
    InputSpec
}

/// Direction an input specification is expected to move in as the
/// requirements evolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeDirection {
    Increase,
    Decrease,
}

impl ChangeDirection {
    /// `+1.0` or `-1.0`.
    pub fn sign(self) -> f64 {
        match self {
            ChangeDirection::Increase => 1.0,
            ChangeDirection::Decrease => -1.0,
        }
    }
}

impl FromStr for ChangeDirection {
    type Err = MarginError;

    /// Parses `"+"` or `"-"`.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "+" => Ok(ChangeDirection::Increase),
            "-" => Ok(ChangeDirection::Decrease),
            other => Err(MarginError::invalid(format!(
                "change direction must be '+' or '-', got '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncrementKind {
    /// Percent of the nominal value.
    Relative,
    Absolute,
}

/// Step applied to an input specification's nominal value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Increment {
    pub value: f64,
    pub kind: IncrementKind,
}

impl Increment {
    pub fn relative(percent: f64) -> Self {
        Self {
            value: percent,
            kind: IncrementKind::Relative,
        }
    }

    pub fn absolute(value: f64) -> Self {
        Self {
            value,
            kind: IncrementKind::Absolute,
        }
    }

    /// Signed step for a parameter at `nominal`.
    pub fn step(&self, nominal: f64) -> f64 {
        match self.kind {
            IncrementKind::Relative => nominal * self.value / 100.0,
            IncrementKind::Absolute => self.value,
        }
    }
}

impl InputSpec {
    pub fn with_change_direction(mut self, direction: ChangeDirection) -> Self {
        self.0.change_direction = Some(direction);
        self
    }

    pub fn with_increment(mut self, increment: Increment) -> Self {
        self.0.increment = Some(increment);
        self
    }

    pub fn change_direction(&self) -> Option<ChangeDirection> {
        self.0.change_direction
    }

    pub fn increment(&self) -> Option<Increment> {
        self.0.increment
    }

    /// Signed step of the increment at the current nominal value.
    pub fn increment_step(&self) -> Option<f64> {
        self.0.increment.map(|inc| inc.step(self.0.nominal))
    }

    /// Nominal value after `steps` increments, `None` without an increment.
    ///
    /// Relative increments compound, so a -1 % increment applied twice to
    /// 100 gives 98.01.
    pub fn stepped_nominal(&self, steps: i32) -> Option<f64> {
        let inc = self.0.increment?;
        Some(match inc.kind {
            IncrementKind::Relative => self.0.nominal * (1.0 + inc.value / 100.0).powi(steps),
            IncrementKind::Absolute => self.0.nominal + inc.value * f64::from(steps),
        })
    }

    /// Whether moving the nominal value by `delta` follows the declared
    /// change direction. `None` when no direction is declared.
    pub fn follows_change(&self, delta: f64) -> Option<bool> {
        self.0
            .change_direction
            .map(|dir| delta == 0.0 || delta.signum() == dir.sign())
    }
}

/// Any parameter a network can hold.
#[derive(Debug, Clone)]
pub enum Parameter {
    Fixed(FixedParam),
    Design(DesignParam),
    Input(InputSpec),
}

impl Parameter {
    pub fn key(&self) -> &str {
        match self {
            Parameter::Fixed(p) => p.key(),
            Parameter::Design(p) => p.key(),
            Parameter::Input(p) => p.key(),
        }
    }

    pub fn nominal(&self) -> f64 {
        match self {
            Parameter::Fixed(p) => p.value(),
            Parameter::Design(p) => p.nominal(),
            Parameter::Input(p) => p.nominal(),
        }
    }

    /// The uncertain part of the parameter, `None` for fixed parameters.
    pub fn uncertain(&self) -> Option<&UncertainValue> {
        match self {
            Parameter::Fixed(_) => None,
            Parameter::Design(p) => Some(p),
            Parameter::Input(p) => Some(p),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.uncertain().map_or(Ok(()), UncertainValue::validate)
    }
}

impl From<FixedParam> for Parameter {
    fn from(p: FixedParam) -> Self {
        Parameter::Fixed(p)
    }
}

impl From<DesignParam> for Parameter {
    fn from(p: DesignParam) -> Self {
        Parameter::Design(p)
    }
}

impl From<InputSpec> for Parameter {
    fn from(p: InputSpec) -> Self {
        Parameter::Input(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::create_rng;

    fn joint() -> Arc<Distribution> {
        Arc::new(Distribution::gaussian(&[370.0, 580.0], &[50.0, 25.0, 25.0, 100.0]).unwrap())
    }

    #[test]
    fn test_fixed_param() {
        let p = FixedParam::new("I2", 156.3e3)
            .with_description("Young's modulus")
            .with_symbol("E");
        assert_eq!(p.key(), "I2");
        assert_eq!(p.value(), 156.3e3);
        assert_eq!(p.symbol(), "E");
        assert_eq!(Parameter::from(p).nominal(), 156.3e3);
    }

    #[test]
    fn test_nominal_follows_component_mean() {
        let dist = joint();
        let t1 = InputSpec::new("S1", dist.clone());
        let t2 = InputSpec::new("S2", dist).with_component(1);
        assert_eq!(t1.nominal(), 370.0);
        assert_eq!(t2.nominal(), 580.0);
        assert_eq!(t2.component(), 1);
        assert!(t2.is_stochastic());
    }

    #[test]
    fn test_deterministic_sampling_repeats_nominal() {
        let p = DesignParam::deterministic("D1", 130.0).with_universe(70.0, 130.0);
        let mut rng = create_rng(0);
        assert_eq!(p.sample(4, &mut rng).unwrap(), vec![130.0; 4]);
        assert!(!p.is_stochastic());
    }

    #[test]
    fn test_sampling_clamps_to_universe() {
        let dist = Arc::new(Distribution::uniform(&[0.0], &[10.0]).unwrap());
        let p = DesignParam::new("D2", dist).with_universe(2.0, 8.0);
        let mut rng = create_rng(5);
        let s = p.sample(1000, &mut rng).unwrap();
        assert!(s.iter().all(|&v| (2.0..=8.0).contains(&v)));
        assert!(s.iter().any(|&v| v == 2.0) && s.iter().any(|&v| v == 8.0));
    }

    #[test]
    fn test_change_direction_parsing() {
        assert_eq!("+".parse::<ChangeDirection>().unwrap(), ChangeDirection::Increase);
        assert_eq!(" - ".parse::<ChangeDirection>().unwrap(), ChangeDirection::Decrease);
        assert!(matches!(
            "up".parse::<ChangeDirection>(),
            Err(MarginError::InvalidParameters(_))
        ));
    }

    #[test]
    fn test_input_spec_increments() {
        let s1 = InputSpec::new("S1", joint())
            .with_change_direction(ChangeDirection::Decrease)
            .with_increment(Increment::relative(-1.0));
        assert_eq!(s1.change_direction(), Some(ChangeDirection::Decrease));
        assert!((s1.increment_step().unwrap() + 3.7).abs() < 1e-12);
        assert!((s1.stepped_nominal(2).unwrap() - 370.0 * 0.99 * 0.99).abs() < 1e-9);
        assert_eq!(s1.stepped_nominal(0), Some(370.0));
        assert_eq!(s1.follows_change(s1.increment_step().unwrap()), Some(true));
        assert_eq!(s1.follows_change(1.0), Some(false));

        let s3 = InputSpec::deterministic("S3", 460.0).with_increment(Increment::absolute(5.0));
        assert_eq!(s3.increment_step(), Some(5.0));
        assert_eq!(s3.stepped_nominal(-2), Some(450.0));
        assert_eq!(s3.follows_change(5.0), None);

        let plain = InputSpec::deterministic("S4", 1.0);
        assert_eq!(plain.increment(), None);
        assert_eq!(plain.stepped_nominal(1), None);
    }

    #[test]
    fn test_zero_increment_rejected() {
        let p = InputSpec::deterministic("S5", 10.0).with_increment(Increment::absolute(0.0));
        assert!(matches!(p.validate(), Err(MarginError::InvalidParameters(_))));
        let p = InputSpec::deterministic("S6", 10.0).with_increment(Increment::relative(f64::NAN));
        assert!(matches!(
            Parameter::from(p).validate(),
            Err(MarginError::InvalidParameters(_))
        ));
    }

    #[test]
    fn test_validation() {
        let p = InputSpec::new("S3", joint()).with_component(2);
        assert!(matches!(p.validate(), Err(MarginError::DimensionMismatch { .. })));
        let p = DesignParam::deterministic("D3", 85.0).with_universe(90.0, 0.0);
        assert!(matches!(p.validate(), Err(MarginError::InvalidParameters(_))));
        let p = DesignParam::new("D4", Arc::new(Distribution::undefined("tbd")));
        assert!(matches!(
            p.sample(3, &mut create_rng(1)),
            Err(MarginError::InvalidState(_))
        ));
    }
}
