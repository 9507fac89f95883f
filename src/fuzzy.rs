//! Mamdani-style fuzzy inference.
//!
//! Inputs are fuzzified against [`FuzzySet`]s of three triangular terms.
//! Each [`FuzzyRule`] combines clauses with a t-norm (AND) or s-norm (OR)
//! into a firing strength, clips its consequent term at that strength, and
//! the clipped outputs are merged element-wise (max) into an [`Aggregate`]
//! over the output universe. Defuzzifying the aggregate gives a crisp value.
//!
//! Two APIs share the same inference:
//!
//! - [`FuzzySystem::evaluate`] returns a fresh [`Aggregate`] and never
//!   mutates the system, so a shared `&FuzzySystem` can serve many callers.
//! - [`FuzzySystem::compute`] / [`FuzzySystem::accumulate`] /
//!   [`FuzzySystem::reset`] drive an internal accumulator. `compute` refuses
//!   to run over an aggregate left by a previous computation.

use std::collections::HashMap;

use log::{debug, trace};

use crate::error::{MarginError, Result};

// ============================================================================
// Membership functions
// ============================================================================

/// Triangular membership function with breakpoints `a ≤ b ≤ c` over a
/// discretised universe of discourse.
#[derive(Debug, Clone, PartialEq)]
pub struct TriangularFunc {
    universe: Vec<f64>,
    a: f64,
    b: f64,
    c: f64,
}

impl TriangularFunc {
    /// # Errors
    /// `InvalidParameters` if the universe is empty or non-finite, or the
    /// breakpoints are not finite and ordered.
    pub fn new(universe: Vec<f64>, a: f64, b: f64, c: f64) -> Result<Self> {
        if universe.is_empty() || universe.iter().any(|u| !u.is_finite()) {
            return Err(MarginError::invalid("universe must be non-empty and finite"));
        }
        if ![a, b, c].iter().all(|v| v.is_finite()) || !(a <= b && b <= c) {
            return Err(MarginError::invalid(format!(
                "triangular breakpoints must satisfy a <= b <= c, got ({a}, {b}, {c})"
            )));
        }
        Ok(Self { universe, a, b, c })
    }

    pub fn universe(&self) -> &[f64] {
        &self.universe
    }

    pub fn breakpoints(&self) -> (f64, f64, f64) {
        (self.a, self.b, self.c)
    }

    /// Degree of membership of `x`, in `[0, 1]`.
    pub fn membership(&self, x: f64) -> f64 {
        let (a, b, c) = (self.a, self.b, self.c);
        if x.is_nan() || x < a || x > c {
            0.0
        } else if x == b {
            1.0
        } else if x < b {
            (x - a) / (b - a)
        } else {
            (c - x) / (c - b)
        }
    }

    pub fn membership_array(&self, xs: &[f64]) -> Vec<f64> {
        xs.iter().map(|&x| self.membership(x)).collect()
    }

    /// Membership evaluated over the whole universe.
    pub fn activation(&self) -> Vec<f64> {
        self.membership_array(&self.universe)
    }
}

/// Linguistic level of a [`FuzzySet`] term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    Low,
    Medium,
    High,
}

/// Memberships of one crisp value in the three terms of a set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Memberships {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
}

impl Memberships {
    pub fn get(&self, level: Level) -> f64 {
        match level {
            Level::Low => self.low,
            Level::Medium => self.medium,
            Level::High => self.high,
        }
    }
}

/// A linguistic variable: three triangular terms over one universe.
#[derive(Debug, Clone, PartialEq)]
pub struct FuzzySet {
    label: String,
    low: TriangularFunc,
    medium: TriangularFunc,
    high: TriangularFunc,
}

impl FuzzySet {
    /// # Errors
    /// `InvalidParameters` if the three terms do not share a universe.
    pub fn new(
        label: impl Into<String>,
        low: TriangularFunc,
        medium: TriangularFunc,
        high: TriangularFunc,
    ) -> Result<Self> {
        let label = label.into();
        if low.universe != medium.universe || low.universe != high.universe {
            return Err(MarginError::invalid(format!(
                "terms of fuzzy set '{label}' must share one universe"
            )));
        }
        Ok(Self {
            label,
            low,
            medium,
            high,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn universe(&self) -> &[f64] {
        self.low.universe()
    }

    pub fn term(&self, level: Level) -> &TriangularFunc {
        match level {
            Level::Low => &self.low,
            Level::Medium => &self.medium,
            Level::High => &self.high,
        }
    }

    pub fn fuzzify(&self, x: f64) -> Memberships {
        Memberships {
            low: self.low.membership(x),
            medium: self.medium.membership(x),
            high: self.high.membership(x),
        }
    }

    pub fn fuzzify_array(&self, xs: &[f64]) -> Vec<Memberships> {
        xs.iter().map(|&x| self.fuzzify(x)).collect()
    }
}

// ============================================================================
// Operators
// ============================================================================

/// Conjunction used for AND clauses and between statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TNorm {
    #[default]
    Min,
    Product,
}

impl TNorm {
    pub fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            TNorm::Min => a.min(b),
            TNorm::Product => a * b,
        }
    }
}

/// Disjunction used for OR clauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SNorm {
    #[default]
    Max,
    ProbabilisticSum,
}

impl SNorm {
    pub fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            SNorm::Max => a.max(b),
            SNorm::ProbabilisticSum => a + b - a * b,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FuzzyOperators {
    pub t_norm: TNorm,
    pub s_norm: SNorm,
}

/// Crisp-output method applied to an [`Aggregate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Defuzzification {
    #[default]
    Centroid,
    Bisector,
    MeanOfMaximum,
    SmallestOfMaximum,
    LargestOfMaximum,
}

// ============================================================================
// Rules
// ============================================================================

/// "`set` is `level`".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause {
    pub set: String,
    pub level: Level,
}

impl Clause {
    pub fn new(set: impl Into<String>, level: Level) -> Self {
        Self {
            set: set.into(),
            level,
        }
    }
}

/// One antecedent statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Antecedent {
    Is(Clause),
    And(Clause, Clause),
    Or(Clause, Clause),
}

impl Antecedent {
    fn clauses(&self) -> impl Iterator<Item = &Clause> {
        let (first, second) = match self {
            Antecedent::Is(c) => (c, None),
            Antecedent::And(a, b) | Antecedent::Or(a, b) => (a, Some(b)),
        };
        std::iter::once(first).chain(second)
    }
}

/// `IF s₁ AND s₂ AND … THEN output is consequent`.
#[derive(Debug, Clone, PartialEq)]
pub struct FuzzyRule {
    label: String,
    antecedents: Vec<Antecedent>,
    consequent: Level,
}

impl FuzzyRule {
    /// # Errors
    /// `InvalidParameters` if `antecedents` is empty.
    pub fn new(antecedents: Vec<Antecedent>, consequent: Level) -> Result<Self> {
        if antecedents.is_empty() {
            return Err(MarginError::invalid("a fuzzy rule needs at least one antecedent"));
        }
        Ok(Self {
            label: String::new(),
            antecedents,
            consequent,
        })
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn consequent(&self) -> Level {
        self.consequent
    }

    pub fn antecedents(&self) -> &[Antecedent] {
        &self.antecedents
    }

    fn clause_degree(
        clause: &Clause,
        sets: &[FuzzySet],
        inputs: &HashMap<String, f64>,
    ) -> Result<f64> {
        let set = sets
            .iter()
            .find(|s| s.label == clause.set)
            .ok_or_else(|| MarginError::UnknownSignal(clause.set.clone()))?;
        let x = inputs
            .get(&clause.set)
            .copied()
            .ok_or_else(|| MarginError::UnknownSignal(clause.set.clone()))?;
        Ok(set.term(clause.level).membership(x))
    }

    /// Firing strength of the rule for crisp `inputs`.
    pub fn strength(
        &self,
        sets: &[FuzzySet],
        inputs: &HashMap<String, f64>,
        operators: FuzzyOperators,
    ) -> Result<f64> {
        let mut strength = 1.0;
        for statement in &self.antecedents {
            let degree = match statement {
                Antecedent::Is(c) => Self::clause_degree(c, sets, inputs)?,
                Antecedent::And(a, b) => operators.t_norm.apply(
                    Self::clause_degree(a, sets, inputs)?,
                    Self::clause_degree(b, sets, inputs)?,
                ),
                Antecedent::Or(a, b) => operators.s_norm.apply(
                    Self::clause_degree(a, sets, inputs)?,
                    Self::clause_degree(b, sets, inputs)?,
                ),
            };
            strength = operators.t_norm.apply(strength, degree);
        }
        Ok(strength)
    }

    /// Consequent term clipped at the firing strength, over the output
    /// universe.
    pub fn apply(
        &self,
        sets: &[FuzzySet],
        output: &FuzzySet,
        inputs: &HashMap<String, f64>,
        operators: FuzzyOperators,
    ) -> Result<Vec<f64>> {
        let strength = self.strength(sets, inputs, operators)?;
        trace!("rule '{}': strength {strength:.4}", self.label);
        Ok(output
            .term(self.consequent)
            .activation()
            .into_iter()
            .map(|m| m.min(strength))
            .collect())
    }
}

// ============================================================================
// Aggregation and defuzzification
// ============================================================================

/// Element-wise maximum of clipped rule outputs over the output universe.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    universe: Vec<f64>,
    activation: Vec<f64>,
}

impl Aggregate {
    /// An all-zero aggregate over `universe`.
    pub fn new(universe: &[f64]) -> Self {
        Self {
            universe: universe.to_vec(),
            activation: vec![0.0; universe.len()],
        }
    }

    pub fn universe(&self) -> &[f64] {
        &self.universe
    }

    pub fn activation(&self) -> &[f64] {
        &self.activation
    }

    /// Merges one activation array (element-wise max).
    pub fn merge(&mut self, activation: &[f64]) -> Result<()> {
        if activation.len() != self.activation.len() {
            return Err(MarginError::mismatch(
                "aggregate activation",
                self.activation.len(),
                activation.len(),
            ));
        }
        for (acc, &a) in self.activation.iter_mut().zip(activation) {
            *acc = acc.max(a);
        }
        Ok(())
    }

    /// Total activation mass (sum over the universe samples).
    pub fn area(&self) -> f64 {
        self.activation.iter().sum()
    }

    fn clear(&mut self) {
        self.activation.iter_mut().for_each(|a| *a = 0.0);
    }

    /// Crisp output.
    ///
    /// # Errors
    /// `InvalidState` if the aggregate has zero area.
    pub fn defuzzify(&self, method: Defuzzification) -> Result<f64> {
        let total = self.area();
        if !(total > 0.0) {
            return Err(MarginError::state("cannot defuzzify an aggregate with zero area"));
        }
        let u = &self.universe;
        let mu = &self.activation;
        let value = match method {
            Defuzzification::Centroid => {
                u.iter().zip(mu).map(|(x, m)| x * m).sum::<f64>() / total
            }
            Defuzzification::Bisector => {
                let half = total / 2.0;
                let mut running = 0.0;
                let mut at = u[u.len() - 1];
                for (x, m) in u.iter().zip(mu) {
                    running += m;
                    if running >= half {
                        at = *x;
                        break;
                    }
                }
                at
            }
            Defuzzification::MeanOfMaximum
            | Defuzzification::SmallestOfMaximum
            | Defuzzification::LargestOfMaximum => {
                let peak = mu.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                let at_peak: Vec<f64> = u
                    .iter()
                    .zip(mu)
                    .filter(|&(_, &m)| m == peak)
                    .map(|(&x, _)| x)
                    .collect();
                match method {
                    Defuzzification::MeanOfMaximum => {
                        at_peak.iter().sum::<f64>() / at_peak.len() as f64
                    }
                    Defuzzification::SmallestOfMaximum => {
                        at_peak.iter().copied().fold(f64::INFINITY, f64::min)
                    }
                    _ => at_peak.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                }
            }
        };
        Ok(value)
    }
}

// ============================================================================
// System
// ============================================================================

/// Accumulator state of a [`FuzzySystem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemState {
    Idle,
    Aggregated,
}

/// Input sets, an output set and the rules linking them.
///
/// # Examples
/// ```
/// use std::collections::HashMap;
/// use design_margins::fuzzy::*;
///
/// let universe: Vec<f64> = (0..=100).map(|i| i as f64 / 10.0).collect();
/// let set = |label: &str| {
///     FuzzySet::new(
///         label,
///         TriangularFunc::new(universe.clone(), 0.0, 0.0, 5.0).unwrap(),
///         TriangularFunc::new(universe.clone(), 0.0, 5.0, 10.0).unwrap(),
///         TriangularFunc::new(universe.clone(), 5.0, 10.0, 10.0).unwrap(),
///     )
///     .unwrap()
/// };
/// let rules = vec![
///     FuzzyRule::new(vec![Antecedent::Is(Clause::new("load", Level::Low))], Level::Low).unwrap(),
///     FuzzyRule::new(vec![Antecedent::Is(Clause::new("load", Level::High))], Level::High).unwrap(),
/// ];
/// let system = FuzzySystem::new(vec![set("load")], set("risk"), rules).unwrap();
///
/// let inputs = HashMap::from([("load".to_string(), 9.0)]);
/// let risk = system.evaluate(&inputs).unwrap().defuzzify(Defuzzification::Centroid).unwrap();
/// assert!(risk > 5.0);
/// ```
#[derive(Debug, Clone)]
pub struct FuzzySystem {
    inputs: Vec<FuzzySet>,
    output: FuzzySet,
    rules: Vec<FuzzyRule>,
    operators: FuzzyOperators,
    defuzzification: Defuzzification,
    aggregate: Aggregate,
    state: SystemState,
}

impl FuzzySystem {
    /// # Errors
    /// - `DuplicateSignal` if two input sets share a label.
    /// - `UnknownSignal` if a rule refers to a set that is not an input.
    pub fn new(inputs: Vec<FuzzySet>, output: FuzzySet, rules: Vec<FuzzyRule>) -> Result<Self> {
        for (i, set) in inputs.iter().enumerate() {
            if inputs[..i].iter().any(|s| s.label == set.label) {
                return Err(MarginError::DuplicateSignal(set.label.clone()));
            }
        }
        for clause in rules
            .iter()
            .flat_map(|r| r.antecedents.iter())
            .flat_map(Antecedent::clauses)
        {
            if !inputs.iter().any(|s| s.label == clause.set) {
                return Err(MarginError::UnknownSignal(clause.set.clone()));
            }
        }
        debug!(
            "FuzzySystem '{}': {} inputs, {} rules",
            output.label,
            inputs.len(),
            rules.len()
        );
        let aggregate = Aggregate::new(output.universe());
        Ok(Self {
            inputs,
            output,
            rules,
            operators: FuzzyOperators::default(),
            defuzzification: Defuzzification::default(),
            aggregate,
            state: SystemState::Idle,
        })
    }

    pub fn with_operators(mut self, operators: FuzzyOperators) -> Self {
        self.operators = operators;
        self
    }

    pub fn with_defuzzification(mut self, method: Defuzzification) -> Self {
        self.defuzzification = method;
        self
    }

    pub fn inputs(&self) -> &[FuzzySet] {
        &self.inputs
    }

    pub fn output(&self) -> &FuzzySet {
        &self.output
    }

    pub fn rules(&self) -> &[FuzzyRule] {
        &self.rules
    }

    pub fn state(&self) -> SystemState {
        self.state
    }

    /// Current contents of the internal accumulator.
    pub fn output_activation(&self) -> &[f64] {
        self.aggregate.activation()
    }

    /// Runs every rule on `inputs` and returns the merged result, leaving
    /// the system untouched.
    ///
    /// # Errors
    /// `InvalidState` if the system has no rules; `UnknownSignal` if an
    /// input value a rule needs is missing.
    pub fn evaluate(&self, inputs: &HashMap<String, f64>) -> Result<Aggregate> {
        if self.rules.is_empty() {
            return Err(MarginError::state("fuzzy system has no rules"));
        }
        let mut aggregate = Aggregate::new(self.output.universe());
        for rule in &self.rules {
            let clipped = rule.apply(&self.inputs, &self.output, inputs, self.operators)?;
            aggregate.merge(&clipped)?;
        }
        Ok(aggregate)
    }

    /// Evaluates and defuzzifies element-wise over equal-length columns of
    /// crisp inputs.
    pub fn evaluate_batch(&self, columns: &HashMap<String, Vec<f64>>) -> Result<Vec<f64>> {
        let n = columns.values().map(Vec::len).next().unwrap_or(0);
        if let Some(bad) = columns.values().find(|c| c.len() != n) {
            return Err(MarginError::mismatch("fuzzy input column", n, bad.len()));
        }
        let mut row: HashMap<String, f64> = HashMap::with_capacity(columns.len());
        (0..n)
            .map(|i| {
                for (key, col) in columns {
                    row.insert(key.clone(), col[i]);
                }
                self.evaluate(&row)?.defuzzify(self.defuzzification)
            })
            .collect()
    }

    /// Starts a fresh aggregation.
    ///
    /// # Errors
    /// `StaleAggregate` if a previous computation was not [`reset`](Self::reset).
    pub fn compute(&mut self, inputs: &HashMap<String, f64>) -> Result<()> {
        if self.state == SystemState::Aggregated {
            return Err(MarginError::StaleAggregate);
        }
        self.accumulate(inputs)
    }

    /// Merges another computation into the aggregate, whatever its state.
    pub fn accumulate(&mut self, inputs: &HashMap<String, f64>) -> Result<()> {
        let result = self.evaluate(inputs)?;
        self.aggregate.merge(result.activation())?;
        self.state = SystemState::Aggregated;
        Ok(())
    }

    /// Zeroes the aggregate and returns to `Idle`.
    pub fn reset(&mut self) {
        self.aggregate.clear();
        self.state = SystemState::Idle;
    }

    /// Crisp output of the aggregate with the configured method.
    ///
    /// # Errors
    /// `InvalidState` before any computation or when the aggregate has
    /// zero area.
    pub fn defuzzify(&self) -> Result<f64> {
        if self.state != SystemState::Aggregated {
            return Err(MarginError::state("defuzzify called before compute"));
        }
        self.aggregate.defuzzify(self.defuzzification)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    fn universe() -> Vec<f64> {
        (0..=100).map(|i| i as f64 / 10.0).collect()
    }

    fn three_terms(label: &str) -> FuzzySet {
        let u = universe();
        FuzzySet::new(
            label,
            TriangularFunc::new(u.clone(), 0.0, 0.0, 5.0).unwrap(),
            TriangularFunc::new(u.clone(), 0.0, 5.0, 10.0).unwrap(),
            TriangularFunc::new(u, 5.0, 10.0, 10.0).unwrap(),
        )
        .unwrap()
    }

    fn inputs(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs.iter().map(|&(k, v)| (k.to_string(), v)).collect()
    }

    fn tipping() -> FuzzySystem {
        let rules = vec![
            FuzzyRule::new(
                vec![Antecedent::Or(
                    Clause::new("quality", Level::Low),
                    Clause::new("service", Level::Low),
                )],
                Level::Low,
            )
            .unwrap()
            .with_label("poor"),
            FuzzyRule::new(vec![Antecedent::Is(Clause::new("service", Level::Medium))], Level::Medium)
                .unwrap()
                .with_label("average"),
            FuzzyRule::new(
                vec![Antecedent::And(
                    Clause::new("quality", Level::High),
                    Clause::new("service", Level::High),
                )],
                Level::High,
            )
            .unwrap()
            .with_label("great"),
        ];
        FuzzySystem::new(
            vec![three_terms("quality"), three_terms("service")],
            three_terms("tip"),
            rules,
        )
        .unwrap()
    }

    #[test]
    fn test_triangular_membership_values() {
        let f = TriangularFunc::new(universe(), 2.0, 4.0, 8.0).unwrap();
        assert_eq!(f.membership(4.0), 1.0);
        assert_eq!(f.membership(1.0), 0.0);
        assert_eq!(f.membership(9.0), 0.0);
        assert_eq!(f.membership(2.0), 0.0);
        assert_eq!(f.membership(8.0), 0.0);
        assert!((f.membership(3.0) - 0.5).abs() < 1e-15);
        assert!((f.membership(6.0) - 0.5).abs() < 1e-15);
        assert_eq!(f.membership(f64::NAN), 0.0);
    }

    #[test]
    fn test_triangular_shoulders() {
        let left = TriangularFunc::new(universe(), 0.0, 0.0, 5.0).unwrap();
        assert_eq!(left.membership(0.0), 1.0);
        let right = TriangularFunc::new(universe(), 5.0, 10.0, 10.0).unwrap();
        assert_eq!(right.membership(10.0), 1.0);
        let spike = TriangularFunc::new(universe(), 3.0, 3.0, 3.0).unwrap();
        assert_eq!(spike.membership(3.0), 1.0);
        assert_eq!(spike.membership(3.1), 0.0);
    }

    #[test]
    fn test_triangular_rejects_unordered() {
        assert!(TriangularFunc::new(universe(), 3.0, 2.0, 5.0).is_err());
        assert!(TriangularFunc::new(universe(), 0.0, 6.0, 5.0).is_err());
        assert!(TriangularFunc::new(vec![], 0.0, 1.0, 2.0).is_err());
    }

    #[test]
    fn test_activation_over_universe() {
        let f = TriangularFunc::new(vec![0.0, 1.0, 2.0, 3.0, 4.0], 0.0, 2.0, 4.0).unwrap();
        assert_eq!(f.activation(), vec![0.0, 0.5, 1.0, 0.5, 0.0]);
    }

    #[test]
    fn test_fuzzy_set_requires_shared_universe() {
        let u = universe();
        let err = FuzzySet::new(
            "x",
            TriangularFunc::new(u.clone(), 0.0, 0.0, 5.0).unwrap(),
            TriangularFunc::new(vec![0.0, 1.0], 0.0, 0.5, 1.0).unwrap(),
            TriangularFunc::new(u, 5.0, 10.0, 10.0).unwrap(),
        );
        assert!(matches!(err, Err(MarginError::InvalidParameters(_))));
    }

    #[test]
    fn test_fuzzify() {
        let set = three_terms("q");
        let m = set.fuzzify(2.5);
        assert!((m.low - 0.5).abs() < 1e-15);
        assert!((m.medium - 0.5).abs() < 1e-15);
        assert_eq!(m.high, 0.0);
        assert_eq!(m.get(Level::Medium), m.medium);
        assert_eq!(set.fuzzify_array(&[0.0, 10.0])[1].high, 1.0);
    }

    #[test]
    fn test_rule_clips_consequent() {
        let system = tipping();
        let clipped = system.rules()[0]
            .apply(
                system.inputs(),
                system.output(),
                &inputs(&[("quality", 2.5), ("service", 8.0)]),
                FuzzyOperators::default(),
            )
            .unwrap();
        // strength = max(0.5, 0) = 0.5
        assert!(clipped.iter().all(|&v| v <= 0.5));
        assert_eq!(clipped[0], 0.5);
    }

    #[test]
    fn test_operator_variants() {
        assert_eq!(TNorm::Product.apply(0.5, 0.4), 0.2);
        assert!((SNorm::ProbabilisticSum.apply(0.5, 0.4) - 0.7).abs() < 1e-15);
        assert_eq!(TNorm::Min.apply(0.5, 0.4), 0.4);
        assert_eq!(SNorm::Max.apply(0.5, 0.4), 0.5);
    }

    #[test]
    fn test_stale_aggregate_guard() {
        let mut system = tipping();
        let x = inputs(&[("quality", 6.5), ("service", 9.8)]);
        assert!(matches!(system.defuzzify(), Err(MarginError::InvalidState(_))));
        system.compute(&x).unwrap();
        assert_eq!(system.state(), SystemState::Aggregated);
        let first = system.defuzzify().unwrap();
        let activation = system.output_activation().to_vec();
        assert!(activation.iter().any(|&v| v > 0.0));
        assert_eq!(system.compute(&x), Err(MarginError::StaleAggregate));
        assert_eq!(system.output_activation(), activation.as_slice());
        system.reset();
        assert_eq!(system.state(), SystemState::Idle);
        assert!(system.output_activation().iter().all(|&v| v == 0.0));
        system.compute(&x).unwrap();
        assert_eq!(system.output_activation(), activation.as_slice());
        assert_eq!(system.defuzzify().unwrap(), first);
    }

    #[test]
    fn test_accumulate_merges() {
        let mut system = tipping();
        system.compute(&inputs(&[("quality", 0.0), ("service", 0.0)])).unwrap();
        let low_only = system.defuzzify().unwrap();
        system
            .accumulate(&inputs(&[("quality", 10.0), ("service", 10.0)]))
            .unwrap();
        assert!(system.defuzzify().unwrap() > low_only);
    }

    #[test]
    fn test_evaluate_matches_stateful_compute() {
        let mut system = tipping();
        let x = inputs(&[("quality", 3.0), ("service", 7.0)]);
        let scoped = system.evaluate(&x).unwrap();
        system.compute(&x).unwrap();
        assert_eq!(scoped.activation(), system.output_activation());
        assert_eq!(
            scoped.defuzzify(Defuzzification::Centroid).unwrap(),
            system.defuzzify().unwrap()
        );
    }

    #[test]
    fn test_evaluate_errors() {
        let system = tipping();
        assert_eq!(
            system.evaluate(&inputs(&[("quality", 3.0)])),
            Err(MarginError::UnknownSignal("service".into()))
        );
        let empty = FuzzySystem::new(vec![three_terms("a")], three_terms("b"), vec![]).unwrap();
        assert!(matches!(
            empty.evaluate(&inputs(&[("a", 1.0)])),
            Err(MarginError::InvalidState(_))
        ));
    }

    #[test]
    fn test_construction_validates_sets() {
        let rule = FuzzyRule::new(vec![Antecedent::Is(Clause::new("ghost", Level::Low))], Level::Low)
            .unwrap();
        assert_eq!(
            FuzzySystem::new(vec![three_terms("a")], three_terms("b"), vec![rule]).unwrap_err(),
            MarginError::UnknownSignal("ghost".into())
        );
        assert_eq!(
            FuzzySystem::new(vec![three_terms("a"), three_terms("a")], three_terms("b"), vec![])
                .unwrap_err(),
            MarginError::DuplicateSignal("a".into())
        );
        assert!(FuzzyRule::new(vec![], Level::Low).is_err());
    }

    #[test]
    fn test_zero_area_aggregate() {
        let agg = Aggregate::new(&universe());
        assert!(matches!(
            agg.defuzzify(Defuzzification::Centroid),
            Err(MarginError::InvalidState(_))
        ));
    }

    #[test]
    fn test_defuzzification_methods() {
        let mut agg = Aggregate::new(&[0.0, 1.0, 2.0, 3.0, 4.0]);
        agg.merge(&[0.0, 1.0, 1.0, 0.5, 0.0]).unwrap();
        assert!((agg.defuzzify(Defuzzification::Centroid).unwrap() - 4.5 / 2.5).abs() < 1e-12);
        assert_eq!(agg.defuzzify(Defuzzification::Bisector).unwrap(), 2.0);
        assert_eq!(agg.defuzzify(Defuzzification::MeanOfMaximum).unwrap(), 1.5);
        assert_eq!(agg.defuzzify(Defuzzification::SmallestOfMaximum).unwrap(), 1.0);
        assert_eq!(agg.defuzzify(Defuzzification::LargestOfMaximum).unwrap(), 2.0);
        assert!(agg.merge(&[1.0]).is_err());
    }

    #[test]
    fn test_evaluate_batch() {
        let system = tipping();
        let columns = HashMap::from([
            ("quality".to_string(), vec![0.0, 10.0, 5.0]),
            ("service".to_string(), vec![0.0, 10.0, 5.0]),
        ]);
        let out = system.evaluate_batch(&columns).unwrap();
        assert_eq!(out.len(), 3);
        assert!(out[0] < out[2] && out[2] < out[1]);

        let ragged = HashMap::from([
            ("quality".to_string(), vec![0.0, 10.0]),
            ("service".to_string(), vec![0.0]),
        ]);
        assert!(matches!(
            system.evaluate_batch(&ragged),
            Err(MarginError::DimensionMismatch { .. })
        ));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(300))]

        #[test]
        fn membership_in_unit_interval(
            mut bp in proptest::array::uniform3(-10.0_f64..10.0),
            x in -20.0_f64..20.0,
        ) {
            bp.sort_by(f64::total_cmp);
            let f = TriangularFunc::new(vec![0.0], bp[0], bp[1], bp[2]).unwrap();
            let m = f.membership(x);
            prop_assert!((0.0..=1.0).contains(&m));
        }

        #[test]
        fn centroid_within_universe(acts in proptest::collection::vec(0.0_f64..1.0, 11)) {
            prop_assume!(acts.iter().sum::<f64>() > 0.0);
            let u: Vec<f64> = (0..11).map(|i| i as f64).collect();
            let mut agg = Aggregate::new(&u);
            agg.merge(&acts).unwrap();
            let c = agg.defuzzify(Defuzzification::Centroid).unwrap();
            prop_assert!((0.0..=10.0 + 1e-9).contains(&c));
        }
    }
}
