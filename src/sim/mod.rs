/// Simulated time and communication step management.
pub mod clock;
pub mod overrides;
pub mod stepper;
pub mod types;

pub use overrides::{Override, OverrideMap, OverridePolicy, OverrideRequest};
pub use stepper::Stepper;
pub use types::{AdvanceOutcome, Phase};
