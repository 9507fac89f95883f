//! Margin analysis networks.
//!
//! A network wires parameters, behaviours and margin nodes together by
//! signal name. Parameters produce signals named after their keys;
//! behaviours consume and produce signals; each margin node reads a
//! decided-value signal and a threshold signal, and each performance node
//! records one signal.
//!
//! [`MarginNetworkBuilder::build`] checks the wiring once: every consumed
//! signal has exactly one producer and the behaviour graph is acyclic. The
//! resulting execution order (Kahn's algorithm, ties broken by declaration
//! order) is reused by every [`Network::forward`] call.
//!
//! # Sampling
//!
//! Each distinct distribution gets its own RNG stream, seeded from the
//! distribution's seed or, when it has none, derived from the network seed
//! and the key of the first parameter that uses it. Parameters sharing a
//! distribution read different components of the same joint draws, so row
//! `i` of every signal belongs to one scenario.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use log::{debug, trace};
use rand::rngs::SmallRng;

use crate::behaviour::{Behaviour, Signals};
use crate::distribution::Distribution;
use crate::error::{MarginError, Result};
use crate::margin::{ExcessStats, MarginNode};
use crate::params::Parameter;
use crate::performance::{PerformanceNode, PerformanceStats};
use crate::random::{create_rng, derive_seed};

/// Seed used when the builder is not given one.
pub const DEFAULT_SEED: u64 = 42;

/// The single operation every margin network offers: run a batch of Monte
/// Carlo scenarios and append the resulting excess to its margin nodes.
pub trait Network {
    fn forward(&mut self, n_samples: usize) -> Result<ForwardReport>;
}

/// Batch statistics of one margin node after a forward pass.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeReport {
    pub key: String,
    /// Statistics of this batch only.
    pub batch: ExcessStats,
    /// Buffer length after the batch was appended.
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceReport {
    pub key: String,
    pub batch: PerformanceStats,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForwardReport {
    pub n_samples: usize,
    pub nodes: Vec<NodeReport>,
    pub performances: Vec<PerformanceReport>,
}

impl ForwardReport {
    pub fn node(&self, key: &str) -> Option<&NodeReport> {
        self.nodes.iter().find(|n| n.key == key)
    }

    pub fn performance(&self, key: &str) -> Option<&PerformanceReport> {
        self.performances.iter().find(|p| p.key == key)
    }
}

/// Every signal, the excess of every margin node and the value of every
/// performance node at nominal parameter values.
#[derive(Debug, Clone, PartialEq)]
pub struct NominalPoint {
    pub signals: Signals,
    pub excess: Vec<(String, f64)>,
    pub performance: Vec<(String, f64)>,
}

struct BehaviourSpec {
    key: String,
    inputs: Vec<String>,
    outputs: Vec<String>,
    model: Box<dyn Behaviour>,
}

struct NodeSpec {
    node: MarginNode,
    decided_value: String,
    threshold: String,
}

struct PerformanceSpec {
    node: PerformanceNode,
    signal: String,
}

/// Declarative construction of a [`MarginNetwork`].
///
/// # Examples
/// ```
/// use std::sync::Arc;
/// use design_margins::prelude::*;
///
/// let demand = Arc::new(Distribution::uniform(&[0.0], &[1.0]).unwrap());
/// let mut man = MarginNetworkBuilder::new()
///     .seed(7)
///     .parameter(FixedParam::new("capacity", 0.5))
///     .parameter(InputSpec::new("demand", demand))
///     .margin_node(MarginNode::new("E1"), "capacity", "demand")
///     .build()
///     .unwrap();
///
/// let report = man.forward(1000).unwrap();
/// let r = report.node("E1").unwrap().batch.reliability.unwrap();
/// assert!((r - 0.5).abs() < 0.1);
/// ```
pub struct MarginNetworkBuilder {
    seed: u64,
    parameters: Vec<Parameter>,
    behaviours: Vec<BehaviourSpec>,
    nodes: Vec<NodeSpec>,
    performances: Vec<PerformanceSpec>,
}

impl Default for MarginNetworkBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MarginNetworkBuilder {
    pub fn new() -> Self {
        Self {
            seed: DEFAULT_SEED,
            parameters: Vec::new(),
            behaviours: Vec::new(),
            nodes: Vec::new(),
            performances: Vec::new(),
        }
    }

    /// Parent seed for distributions without their own seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn parameter(mut self, parameter: impl Into<Parameter>) -> Self {
        self.parameters.push(parameter.into());
        self
    }

    /// Adds a behaviour reading `inputs` and producing `outputs`.
    pub fn behaviour(
        mut self,
        key: impl Into<String>,
        inputs: &[&str],
        outputs: &[&str],
        model: impl Behaviour + 'static,
    ) -> Self {
        self.behaviours.push(BehaviourSpec {
            key: key.into(),
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            outputs: outputs.iter().map(|s| s.to_string()).collect(),
            model: Box::new(model),
        });
        self
    }

    /// Adds a margin node comparing `decided_value` against `threshold`.
    pub fn margin_node(mut self, node: MarginNode, decided_value: &str, threshold: &str) -> Self {
        self.nodes.push(NodeSpec {
            node,
            decided_value: decided_value.to_string(),
            threshold: threshold.to_string(),
        });
        self
    }

    /// Adds a performance node recording `signal`.
    pub fn performance_node(mut self, node: PerformanceNode, signal: &str) -> Self {
        self.performances.push(PerformanceSpec {
            node,
            signal: signal.to_string(),
        });
        self
    }

    /// Validates the wiring and fixes the execution order.
    ///
    /// # Errors
    /// - `DuplicateSignal` if a signal has two producers.
    /// - `UnknownSignal` if a behaviour or node reads a signal nobody
    ///   produces.
    /// - `Cycle` if behaviours depend on each other circularly.
    /// - `InvalidParameters` for duplicate behaviour, margin node or
    ///   performance node keys and for parameters that fail validation.
    pub fn build(self) -> Result<MarginNetwork> {
        for p in &self.parameters {
            p.validate()?;
        }
        for (i, b) in self.behaviours.iter().enumerate() {
            if self.behaviours[..i].iter().any(|o| o.key == b.key) {
                return Err(MarginError::invalid(format!("duplicate behaviour key '{}'", b.key)));
            }
        }
        for (i, n) in self.nodes.iter().enumerate() {
            if self.nodes[..i].iter().any(|o| o.node.key() == n.node.key()) {
                return Err(MarginError::invalid(format!(
                    "duplicate margin node key '{}'",
                    n.node.key()
                )));
            }
        }
        for (i, p) in self.performances.iter().enumerate() {
            if self.performances[..i].iter().any(|o| o.node.key() == p.node.key()) {
                return Err(MarginError::invalid(format!(
                    "duplicate performance node key '{}'",
                    p.node.key()
                )));
            }
        }

        // signal -> producing behaviour (None for parameters)
        let mut producers: HashMap<&str, Option<usize>> = HashMap::new();
        for p in &self.parameters {
            if producers.insert(p.key(), None).is_some() {
                return Err(MarginError::DuplicateSignal(p.key().to_string()));
            }
        }
        for (j, b) in self.behaviours.iter().enumerate() {
            for out in &b.outputs {
                if producers.insert(out, Some(j)).is_some() {
                    return Err(MarginError::DuplicateSignal(out.clone()));
                }
            }
        }

        let mut successors: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); self.behaviours.len()];
        for (k, b) in self.behaviours.iter().enumerate() {
            for input in &b.inputs {
                match producers.get(input.as_str()) {
                    None => return Err(MarginError::UnknownSignal(input.clone())),
                    Some(Some(j)) => {
                        successors[*j].insert(k);
                    }
                    Some(None) => {}
                }
            }
        }
        for spec in &self.nodes {
            for signal in [&spec.decided_value, &spec.threshold] {
                if !producers.contains_key(signal.as_str()) {
                    return Err(MarginError::UnknownSignal(signal.clone()));
                }
            }
        }
        for spec in &self.performances {
            if !producers.contains_key(spec.signal.as_str()) {
                return Err(MarginError::UnknownSignal(spec.signal.clone()));
            }
        }

        let order = topological_order(&successors).map_err(|cycle| {
            MarginError::Cycle(
                cycle
                    .into_iter()
                    .map(|j| self.behaviours[j].key.clone())
                    .collect(),
            )
        })?;

        let streams = build_streams(&self.parameters, self.seed);
        debug!(
            "margin network: {} parameters, {} behaviours, {} margin nodes, {} performance nodes, {} random streams",
            self.parameters.len(),
            self.behaviours.len(),
            self.nodes.len(),
            self.performances.len(),
            streams.len()
        );

        Ok(MarginNetwork {
            seed: self.seed,
            parameters: self.parameters,
            behaviours: self.behaviours,
            nodes: self.nodes,
            performances: self.performances,
            order,
            streams,
        })
    }
}

/// Kahn's algorithm over behaviour indices. On failure returns one cycle,
/// closed (first index repeated at the end).
fn topological_order(successors: &[BTreeSet<usize>]) -> std::result::Result<Vec<usize>, Vec<usize>> {
    let n = successors.len();
    let mut in_degree = vec![0_usize; n];
    for succ in successors {
        for &k in succ {
            in_degree[k] += 1;
        }
    }

    // ordered set keeps ties in declaration order
    let mut ready: BTreeSet<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(n);
    while let Some(j) = ready.pop_first() {
        order.push(j);
        for &k in &successors[j] {
            in_degree[k] -= 1;
            if in_degree[k] == 0 {
                ready.insert(k);
            }
        }
    }
    if order.len() == n {
        return Ok(order);
    }

    // Every unscheduled node has an unscheduled predecessor, so walking
    // backwards from one must revisit a node.
    let mut predecessor = vec![None; n];
    for (j, succ) in successors.iter().enumerate() {
        for &k in succ {
            if in_degree[k] > 0 && in_degree[j] > 0 {
                predecessor[k] = Some(j);
            }
        }
    }
    let start = (0..n).find(|&i| in_degree[i] > 0).unwrap_or(0);
    let mut seen = vec![false; n];
    let mut walk = vec![start];
    let mut at = start;
    seen[at] = true;
    while let Some(prev) = predecessor[at] {
        if seen[prev] {
            let from = walk.iter().position(|&v| v == prev).unwrap_or(0);
            let mut cycle: Vec<usize> = walk[from..].iter().rev().copied().collect();
            cycle.push(cycle[0]);
            return Err(cycle);
        }
        seen[prev] = true;
        walk.push(prev);
        at = prev;
    }
    Err(walk)
}

/// One RNG stream per distinct distribution, in first-use order.
struct SampleStream {
    distribution: Arc<Distribution>,
    seed: u64,
    rng: SmallRng,
    /// Indices into the network's parameter list.
    members: Vec<usize>,
}

fn build_streams(parameters: &[Parameter], network_seed: u64) -> Vec<SampleStream> {
    let mut streams: Vec<SampleStream> = Vec::new();
    for (i, p) in parameters.iter().enumerate() {
        let Some(dist) = p.uncertain().and_then(|u| u.distribution()) else {
            continue;
        };
        match streams
            .iter_mut()
            .find(|s| Arc::ptr_eq(&s.distribution, dist))
        {
            Some(stream) => stream.members.push(i),
            None => {
                let seed = dist
                    .seed()
                    .unwrap_or_else(|| derive_seed(network_seed, p.key()));
                streams.push(SampleStream {
                    distribution: Arc::clone(dist),
                    seed,
                    rng: create_rng(seed),
                    members: vec![i],
                });
            }
        }
    }
    streams
}

/// A validated margin analysis network.
pub struct MarginNetwork {
    seed: u64,
    parameters: Vec<Parameter>,
    behaviours: Vec<BehaviourSpec>,
    nodes: Vec<NodeSpec>,
    performances: Vec<PerformanceSpec>,
    order: Vec<usize>,
    streams: Vec<SampleStream>,
}

impl MarginNetwork {
    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Behaviour keys in execution order.
    pub fn execution_order(&self) -> Vec<&str> {
        self.order
            .iter()
            .map(|&j| self.behaviours[j].key.as_str())
            .collect()
    }

    pub fn node(&self, key: &str) -> Option<&MarginNode> {
        self.nodes.iter().map(|s| &s.node).find(|n| n.key() == key)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &MarginNode> {
        self.nodes.iter().map(|s| &s.node)
    }

    pub fn performance(&self, key: &str) -> Option<&PerformanceNode> {
        self.performances.iter().map(|s| &s.node).find(|p| p.key() == key)
    }

    pub fn performances(&self) -> impl Iterator<Item = &PerformanceNode> {
        self.performances.iter().map(|s| &s.node)
    }

    /// Empties every margin and performance buffer.
    pub fn clear(&mut self) {
        self.nodes.iter_mut().for_each(|s| s.node.clear());
        self.performances.iter_mut().for_each(|s| s.node.clear());
    }

    /// Drops the newest `k` samples from every margin and performance node.
    pub fn discard_last(&mut self, k: usize) {
        self.nodes.iter_mut().for_each(|s| s.node.discard_last(k));
        self.performances.iter_mut().for_each(|s| s.node.discard_last(k));
    }

    /// Restarts every RNG stream from its seed, so the next forward passes
    /// replay the sequence of a freshly built network.
    pub fn reset_streams(&mut self) {
        for stream in &mut self.streams {
            stream.rng = create_rng(stream.seed);
        }
    }

    /// Draws `n` scenarios for every parameter from copies of the RNG
    /// streams. The advanced generators are returned so the caller can
    /// commit them once the whole pass has succeeded.
    fn sample_parameters(&self, n: usize) -> Result<(Signals, Vec<SmallRng>)> {
        let mut signals = Signals::new();
        for p in &self.parameters {
            let stochastic = p.uncertain().is_some_and(|u| u.is_stochastic());
            if !stochastic {
                signals.insert(p.key(), vec![p.nominal(); n]);
            }
        }
        let mut rngs = Vec::with_capacity(self.streams.len());
        for stream in &self.streams {
            let mut rng = stream.rng.clone();
            let draws = stream.distribution.sample(n, &mut rng)?;
            for &i in &stream.members {
                let param = &self.parameters[i];
                if let Some(u) = param.uncertain() {
                    let column = draws.rows().map(|r| u.clamp(r[u.component()])).collect();
                    signals.insert(param.key(), column);
                }
            }
            rngs.push(rng);
        }
        Ok((signals, rngs))
    }

    /// Runs the behaviours in execution order, adding their outputs to
    /// `signals`.
    fn propagate(&self, signals: &mut Signals, n: usize) -> Result<()> {
        for &j in &self.order {
            let spec = &self.behaviours[j];
            let inputs: Signals = spec
                .inputs
                .iter()
                .map(|k| signals.require(k).map(|v| (k.clone(), v.to_vec())))
                .collect::<Result<_>>()?;
            let mut outputs = spec.model.evaluate(&inputs)?;
            for signal in &spec.outputs {
                let values = outputs.remove(signal).ok_or_else(|| MarginError::MissingOutput {
                    behaviour: spec.key.clone(),
                    signal: signal.clone(),
                })?;
                if values.len() != n {
                    return Err(MarginError::mismatch("behaviour output", n, values.len()));
                }
                signals.insert(signal.clone(), values);
            }
            trace!("behaviour '{}' evaluated", spec.key);
        }
        Ok(())
    }

    /// Evaluates the network once at nominal parameter values. Node
    /// buffers and RNG streams are untouched.
    pub fn nominal(&self) -> Result<NominalPoint> {
        let mut signals: Signals = self
            .parameters
            .iter()
            .map(|p| (p.key().to_string(), vec![p.nominal()]))
            .collect();
        self.propagate(&mut signals, 1)?;
        let excess = self
            .nodes
            .iter()
            .map(|s| -> Result<(String, f64)> {
                let dv = signals.require(&s.decided_value)?[0];
                let tt = signals.require(&s.threshold)?[0];
                Ok((s.node.key().to_string(), s.node.margin_type().excess(dv, tt)))
            })
            .collect::<Result<_>>()?;
        let performance = self
            .performances
            .iter()
            .map(|s| -> Result<(String, f64)> {
                Ok((s.node.key().to_string(), signals.require(&s.signal)?[0]))
            })
            .collect::<Result<_>>()?;
        Ok(NominalPoint {
            signals,
            excess,
            performance,
        })
    }
}

impl Network for MarginNetwork {
    /// Samples parameters, evaluates behaviours in order, then appends one
    /// batch to every margin node. On error neither the nodes nor the RNG
    /// streams are modified.
    fn forward(&mut self, n_samples: usize) -> Result<ForwardReport> {
        let (mut signals, rngs) = self.sample_parameters(n_samples)?;
        self.propagate(&mut signals, n_samples)?;

        let mut batches = Vec::with_capacity(self.nodes.len());
        for spec in &self.nodes {
            let dv = signals.require(&spec.decided_value)?;
            let tt = signals.require(&spec.threshold)?;
            if dv.len() != n_samples || tt.len() != n_samples {
                return Err(MarginError::mismatch(
                    "margin node input",
                    n_samples,
                    dv.len().min(tt.len()),
                ));
            }
            batches.push((dv, tt));
        }
        let mut recorded = Vec::with_capacity(self.performances.len());
        for spec in &self.performances {
            let values = signals.require(&spec.signal)?;
            if values.len() != n_samples {
                return Err(MarginError::mismatch("performance node input", n_samples, values.len()));
            }
            recorded.push(values);
        }

        for (stream, rng) in self.streams.iter_mut().zip(rngs) {
            stream.rng = rng;
        }

        let mut nodes = Vec::with_capacity(self.nodes.len());
        for (spec, (dv, tt)) in self.nodes.iter_mut().zip(batches) {
            spec.node.compute(dv, tt)?;
            let excess = spec.node.excess();
            let batch = &excess[excess.len() - n_samples..];
            nodes.push(NodeReport {
                key: spec.node.key().to_string(),
                batch: ExcessStats::from_excess(batch, spec.node.config().buffer_limit),
                total: excess.len(),
            });
        }
        let mut performances = Vec::with_capacity(self.performances.len());
        for (spec, values) in self.performances.iter_mut().zip(recorded) {
            spec.node.record(values);
            performances.push(PerformanceReport {
                key: spec.node.key().to_string(),
                batch: PerformanceStats::from_values(values, spec.node.direction()),
                total: spec.node.len(),
            });
        }
        debug!(
            "forward: {n_samples} scenarios through {} margin and {} performance nodes",
            nodes.len(),
            performances.len()
        );
        Ok(ForwardReport {
            n_samples,
            nodes,
            performances,
        })
    }
}
