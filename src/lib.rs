//! Orchestration core for stepped building-energy simulations.
//!
//! A [`testbed::Testbed`] drives a [`adapter::SimulatableUnit`] one
//! communication step at a time, merging caller overrides with the unit's
//! embedded control, recording results, computing KPIs incrementally and
//! serving boundary-condition forecasts aligned to simulated time.

pub mod adapter;
pub mod boundary;
pub mod config;
pub mod error;
pub mod forecast;
pub mod io;
pub mod kpi;
/// Reference single-zone model with embedded thermostat.
pub mod model;
pub mod points;
pub mod results;
pub mod scenario;
/// Simulation stepper, clock and override resolution.
pub mod sim;
pub mod telemetry;
pub mod testbed;

#[cfg(feature = "api")]
pub mod api;

pub use error::{TestbedError, TestbedResult};
pub use testbed::Testbed;
