use crate::error::{TestbedError, TestbedResult};

/// Slack applied when comparing the next step against an end bound.
const END_TOLERANCE_S: f64 = 1e-6;

/// Simulated time, communication step and optional end bound.
///
/// Only the stepper owns a `SimClock`; nothing else moves simulated time.
///
/// # Examples
///
/// ```
/// use testbed_sim::sim::clock::SimClock;
///
/// let mut clock = SimClock::new(900.0).unwrap();
/// clock.start_at(0.0, Some(1800.0));
/// assert_eq!(clock.tick(), Some(900.0));
/// assert_eq!(clock.tick(), Some(1800.0));
/// assert_eq!(clock.tick(), None);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SimClock {
    /// Current simulated time (s)
    time: f64,
    /// Communication step used by the next tick (s)
    step: f64,
    /// Time after which no further step is taken
    end: Option<f64>,
}

impl SimClock {
    /// Creates a clock at time zero.
    ///
    /// # Errors
    ///
    /// `InvalidStep` if `step` is not a finite value > 0.
    pub fn new(step: f64) -> TestbedResult<Self> {
        validate_step(step)?;
        Ok(Self {
            time: 0.0,
            step,
            end: None,
        })
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn step(&self) -> f64 {
        self.step
    }

    /// Changes the step used from the next tick on.
    pub fn set_step(&mut self, step: f64) -> TestbedResult<()> {
        validate_step(step)?;
        self.step = step;
        Ok(())
    }

    /// Moves the clock to `time` and installs a new end bound.
    pub fn start_at(&mut self, time: f64, end: Option<f64>) {
        self.time = time;
        self.end = end;
    }

    /// Time the next tick would reach.
    pub fn next_time(&self) -> f64 {
        self.time + self.step
    }

    /// Returns `true` when the next tick would pass the end bound.
    pub fn is_exhausted(&self) -> bool {
        self.end.is_some_and(|end| self.overruns(end))
    }

    /// Returns `true` when the next tick would pass `limit`.
    pub fn overruns(&self, limit: f64) -> bool {
        self.next_time() > limit + END_TOLERANCE_S
    }

    /// Advances by one step.
    ///
    /// # Returns
    ///
    /// * `Some(time)` - The new simulated time
    /// * `None` - If the step would pass the end bound; time is unchanged
    pub fn tick(&mut self) -> Option<f64> {
        if self.is_exhausted() {
            return None;
        }
        self.time = self.next_time();
        Some(self.time)
    }
}

fn validate_step(step: f64) -> TestbedResult<()> {
    if step.is_finite() && step > 0.0 {
        Ok(())
    } else {
        Err(TestbedError::InvalidStep { step })
    }
}
