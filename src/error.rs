//! Error taxonomy for the orchestration core.

use thiserror::Error;

/// Result type for testbed operations.
pub type TestbedResult<T> = Result<T, TestbedError>;

/// Errors surfaced by the stepper, scenario manager, forecast provider,
/// results store and KPI calculator.
///
/// Every variant except [`TestbedError::SimulationDiverged`] is a
/// validation failure: it is raised before any state is touched, so the
/// caller can fix its input and retry.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TestbedError {
    /// Start time outside the model horizon, or a negative warmup.
    #[error("invalid time range: {what}")]
    InvalidTimeRange { what: String },

    /// Communication step that is not strictly positive.
    #[error("invalid communication step {step}: must be a finite value > 0")]
    InvalidStep { step: f64 },

    /// Malformed request parameters (forecast window, query range, override value).
    #[error("invalid parameters: {what}")]
    InvalidParameters { what: String },

    /// Scenario field naming an unknown price series or time period.
    #[error("unknown scenario {field} \"{value}\", available: {available}")]
    UnknownScenario {
        field: &'static str,
        value: String,
        available: String,
    },

    /// Point name that is not part of the model catalog.
    #[error("unknown point \"{name}\"")]
    UnknownPoint { name: String },

    /// Forecast window reaching past the available boundary data.
    #[error("forecast window [{start}, {end}] s exceeds boundary data [{available_start}, {available_end}] s")]
    ForecastOutOfRange {
        start: f64,
        end: f64,
        available_start: f64,
        available_end: f64,
    },

    /// Operation requires an initialized simulation.
    #[error("simulation is not initialized")]
    NotInitialized,

    /// The simulatable unit failed numerically; the run is frozen.
    #[error("simulation diverged at t={time} s: {reason}")]
    SimulationDiverged { time: f64, reason: String },
}

impl TestbedError {
    /// Stable machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidTimeRange { .. } => "InvalidTimeRange",
            Self::InvalidStep { .. } => "InvalidStep",
            Self::InvalidParameters { .. } => "InvalidParameters",
            Self::UnknownScenario { .. } => "UnknownScenario",
            Self::UnknownPoint { .. } => "UnknownPoint",
            Self::ForecastOutOfRange { .. } => "ForecastOutOfRange",
            Self::NotInitialized => "NotInitialized",
            Self::SimulationDiverged { .. } => "SimulationDiverged",
        }
    }

    /// Returns `true` when the caller can correct its input and retry
    /// without re-initializing.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::SimulationDiverged { .. })
    }

    pub(crate) fn invalid_parameters(what: impl Into<String>) -> Self {
        Self::InvalidParameters { what: what.into() }
    }

    pub(crate) fn invalid_time_range(what: impl Into<String>) -> Self {
        Self::InvalidTimeRange { what: what.into() }
    }
}
