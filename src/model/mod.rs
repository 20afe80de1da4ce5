//! Reference simulatable unit: a single thermal zone with embedded control.

pub mod thermostat;
pub mod zone;

pub use thermostat::Thermostat;
pub use zone::{ZoneModel, ZoneParams};
