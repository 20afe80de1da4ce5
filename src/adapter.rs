//! Contract between the orchestration core and a simulatable unit.
//!
//! The core never looks inside the unit: it pushes the per-step input
//! frame, asks for a step of a given duration and reads back the outputs.
//! Everything else (equation solving, embedded control logic) belongs to
//! the implementor.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::points::PointCatalog;
use crate::sim::overrides::OverrideMap;

/// Values of every measurement and every applied input after a step.
pub type OutputSnapshot = BTreeMap<String, f64>;

/// Numerical failure reported by a simulatable unit.
///
/// Once returned, the unit's internal state is considered unusable until
/// the next [`SimulatableUnit::reset`].
#[derive(Debug, Error, Clone, PartialEq)]
#[error("{reason}")]
pub struct Divergence {
    pub reason: String,
}

impl Divergence {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// A stepped dynamical-system simulation exposing named inputs and outputs.
pub trait SimulatableUnit: Send + Sync {
    /// Test case name published to callers.
    fn name(&self) -> &str;

    /// Static metadata for every input and measurement point.
    fn catalog(&self) -> &PointCatalog;

    /// Inclusive start and exclusive end of the simulated time span the
    /// model can be initialized within (seconds).
    fn valid_horizon(&self) -> (f64, f64);

    /// Puts the model back into its initial state at `time`.
    fn reset(&mut self, time: f64);

    /// Sets the inputs used by subsequent steps. Points mapped to
    /// `PassThrough` (or absent) fall back to the embedded control signal.
    fn set_inputs(&mut self, inputs: &OverrideMap);

    /// Integrates the model forward by `duration` seconds.
    ///
    /// # Errors
    ///
    /// Returns a [`Divergence`] if the integration fails numerically.
    fn do_step(&mut self, duration: f64) -> Result<OutputSnapshot, Divergence>;

    /// Current outputs without advancing time.
    fn outputs(&self) -> OutputSnapshot;
}
