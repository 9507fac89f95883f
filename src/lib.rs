//! # design-margins
//!
//! Margin analysis for engineering design under uncertainty.
//!
//! A margin is the excess of a decided value (what the design delivers)
//! over a threshold (what is required of it). With uncertain parameters
//! the excess is a distribution, estimated here by Monte Carlo sampling
//! through a network of user-supplied behaviour models.
//!
//! ## Modules
//!
//! - [`distribution`]: tabulated, Gaussian and uniform densities with
//!   seeded sampling
//! - [`params`]: fixed, design and input parameters
//! - [`behaviour`]: named signals and the behaviour-model capability
//! - [`margin`]: margin nodes accumulating excess samples
//! - [`performance`]: performance nodes recording figures of merit
//! - [`network`]: dependency-ordered forward passes over a margin network
//! - [`empirical`]: histograms, empirical and binned CDFs
//! - [`fuzzy`]: Mamdani fuzzy inference for qualitative behaviours
//! - [`doe`]: design-of-experiments helpers
//! - [`stats`], [`special`], [`random`]: numerical building blocks
//!
//! ## Design Philosophy
//!
//! - **Reproducible**: every random stream is seeded, either explicitly or
//!   from the network seed and the parameter key
//! - **Atomic failures**: a call that returns an error leaves its receiver
//!   unchanged
//! - **Property-based testing**: invariants verified via proptest

pub mod behaviour;
pub mod distribution;
pub mod doe;
pub mod empirical;
pub mod error;
pub mod fuzzy;
pub mod margin;
pub mod network;
pub mod params;
pub mod performance;
pub mod random;
pub mod samples;
pub mod special;
pub mod stats;

pub use error::{MarginError, Result};

/// The types needed to declare and run a margin network.
pub mod prelude {
    pub use crate::behaviour::{Behaviour, Pointwise, Signals};
    pub use crate::distribution::{Distribution, GaussianFunc, TabulatedDensity, UniformFunc};
    pub use crate::error::{MarginError, Result};
    pub use crate::margin::{CdfConfig, MarginNode, MarginType};
    pub use crate::network::{MarginNetwork, MarginNetworkBuilder, Network};
    pub use crate::params::{ChangeDirection, DesignParam, FixedParam, Increment, InputSpec, Parameter};
    pub use crate::performance::{PerformanceDirection, PerformanceNode};
    pub use crate::samples::Samples;
}
