//! Stepper state and per-advance outcome types.

use std::fmt;

use serde::Serialize;

use crate::adapter::OutputSnapshot;

/// Lifecycle of a simulation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// No run started, or the run was reset.
    #[default]
    Uninitialized,
    /// Ready to advance.
    Initialized,
    /// The unit failed numerically. Results stay readable until the next
    /// initialize.
    Diverged,
    /// A scenario time period was fully simulated.
    Completed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Uninitialized => "uninitialized",
            Self::Initialized => "initialized",
            Self::Diverged => "diverged",
            Self::Completed => "completed",
        };
        f.write_str(s)
    }
}

/// Result of one call to advance.
#[derive(Debug, Clone, PartialEq)]
pub enum AdvanceOutcome {
    /// One communication step was simulated; holds the outputs at the new
    /// simulated time.
    Stepped(OutputSnapshot),
    /// The scenario end is reached; nothing was simulated.
    Completed,
}

impl AdvanceOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Outputs of the step, if one was taken.
    pub fn snapshot(&self) -> Option<&OutputSnapshot> {
        match self {
            Self::Stepped(s) => Some(s),
            Self::Completed => None,
        }
    }
}
