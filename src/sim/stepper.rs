//! Simulation stepper: the state machine that drives a simulatable unit.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info};

use crate::adapter::{OutputSnapshot, SimulatableUnit};
use crate::boundary::BoundaryData;
use crate::error::{TestbedError, TestbedResult};
use crate::kpi::{KpiCalculator, KpiSettings};
use crate::points::PointCatalog;
use crate::results::{ResultRecord, ResultsStore};

use super::clock::SimClock;
use super::overrides::{OverrideMap, OverridePolicy, OverrideRequest};
use super::types::{AdvanceOutcome, Phase};

/// Owns the unit, simulated time, results and KPI accumulators of one run.
///
/// Every failing operation leaves the stepper untouched, except a
/// numerical divergence of the unit which moves it to [`Phase::Diverged`].
pub struct Stepper {
    unit: Box<dyn SimulatableUnit>,
    clock: SimClock,
    phase: Phase,
    policy: OverridePolicy,
    results: ResultsStore,
    kpi: KpiCalculator,
}

impl Stepper {
    /// Creates an uninitialized stepper.
    ///
    /// # Arguments
    ///
    /// * `unit` - The simulatable unit to drive
    /// * `boundary` - Boundary data used for KPI comfort bands and prices
    /// * `kpi_settings` - KPI normalization constants
    /// * `step` - Initial communication step (s)
    /// * `policy` - Handling of out-of-bounds overrides
    pub fn new(
        unit: Box<dyn SimulatableUnit>,
        boundary: Arc<BoundaryData>,
        kpi_settings: KpiSettings,
        step: f64,
        policy: OverridePolicy,
    ) -> TestbedResult<Self> {
        let clock = SimClock::new(step)?;
        let kpi = KpiCalculator::new(unit.catalog(), boundary, kpi_settings);
        Ok(Self {
            unit,
            clock,
            phase: Phase::Uninitialized,
            policy,
            results: ResultsStore::new(),
            kpi,
        })
    }

    pub fn name(&self) -> &str {
        self.unit.name()
    }

    pub fn catalog(&self) -> &PointCatalog {
        self.unit.catalog()
    }

    pub fn time(&self) -> f64 {
        self.clock.time()
    }

    pub fn step(&self) -> f64 {
        self.clock.step()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn results(&self) -> &ResultsStore {
        &self.results
    }

    pub fn kpi(&self) -> &KpiCalculator {
        &self.kpi
    }

    /// Starts a new run at `start_time` after `warmup` seconds of native
    /// control. A warmup reaching before the model horizon is shortened to
    /// start at the horizon. Clears any scenario end bound.
    ///
    /// # Errors
    ///
    /// * `InvalidTimeRange` for a start outside the unit's horizon or a negative warmup.
    /// * `SimulationDiverged` if the unit fails during warmup.
    pub fn initialize(&mut self, start_time: f64, warmup: f64) -> TestbedResult<OutputSnapshot> {
        self.start_run(start_time, warmup, None)
    }

    /// Like [`Stepper::initialize`], but advances stop once
    /// `start_time + duration` is reached.
    pub(crate) fn initialize_bounded(
        &mut self,
        start_time: f64,
        warmup: f64,
        duration: f64,
    ) -> TestbedResult<OutputSnapshot> {
        if !duration.is_finite() || duration <= 0.0 {
            return Err(TestbedError::invalid_time_range(format!(
                "duration {duration} must be a finite value > 0"
            )));
        }
        self.start_run(start_time, warmup, Some(start_time + duration))
    }

    fn start_run(
        &mut self,
        start_time: f64,
        warmup: f64,
        end: Option<f64>,
    ) -> TestbedResult<OutputSnapshot> {
        self.validate_window(start_time, warmup)?;

        // Warmup never reaches before the start of the horizon.
        let (h0, _) = self.unit.valid_horizon();
        let from = (start_time - warmup).max(h0);
        if from > start_time - warmup {
            debug!(requested = warmup, applied = start_time - from, "warmup truncated to model horizon");
        }

        self.results.clear();
        self.kpi.reset();
        self.unit.reset(from);
        self.unit.set_inputs(&OverrideMap::pass_through());

        let snapshot = if start_time > from {
            match self.unit.do_step(start_time - from) {
                Ok(s) => s,
                Err(div) => {
                    self.phase = Phase::Diverged;
                    self.clock.start_at(from, None);
                    error!(time = from, reason = %div, "unit diverged during warmup");
                    return Err(TestbedError::SimulationDiverged {
                        time: from,
                        reason: div.reason,
                    });
                }
            }
        } else {
            self.unit.outputs()
        };

        self.clock.start_at(start_time, end);
        self.phase = Phase::Initialized;
        info!(start_time, warmup, end = ?end, step = self.clock.step(), "simulation initialized");
        Ok(snapshot)
    }

    fn validate_window(&self, start_time: f64, warmup: f64) -> TestbedResult<()> {
        let (h0, h1) = self.unit.valid_horizon();
        if !warmup.is_finite() || warmup < 0.0 {
            return Err(TestbedError::invalid_time_range(format!(
                "warmup period {warmup} must be a finite value >= 0"
            )));
        }
        if !start_time.is_finite() || start_time < h0 || start_time >= h1 {
            return Err(TestbedError::invalid_time_range(format!(
                "start time {start_time} outside model horizon [{h0}, {h1})"
            )));
        }
        Ok(())
    }

    /// Sets the communication step used by the next advance.
    pub fn set_step(&mut self, step: f64) -> TestbedResult<()> {
        self.clock.set_step(step)?;
        debug!(step, "communication step changed");
        Ok(())
    }

    /// Simulates one communication step with `request` applied.
    ///
    /// # Errors
    ///
    /// * `NotInitialized` unless the run is initialized (or completed).
    /// * `UnknownPoint` or `InvalidParameters` for a bad override request.
    /// * `InvalidTimeRange` if the step would pass the end of the unit's
    ///   horizon. Nothing changes; a shorter step may still fit.
    /// * `SimulationDiverged` if the unit fails; the run is then frozen.
    pub fn advance(&mut self, request: &OverrideRequest) -> TestbedResult<AdvanceOutcome> {
        let started = Instant::now();
        match self.phase {
            Phase::Initialized => {}
            Phase::Completed => return Ok(AdvanceOutcome::Completed),
            Phase::Uninitialized | Phase::Diverged => return Err(TestbedError::NotInitialized),
        }

        let overrides = OverrideMap::resolve(request, self.unit.catalog(), self.policy)?;

        if self.clock.is_exhausted() {
            self.phase = Phase::Completed;
            info!(time = self.clock.time(), "scenario time period completed");
            return Ok(AdvanceOutcome::Completed);
        }

        let (_, horizon_end) = self.unit.valid_horizon();
        if self.clock.overruns(horizon_end) {
            return Err(TestbedError::invalid_time_range(format!(
                "step to {} passes the model horizon end at {horizon_end}",
                self.clock.next_time()
            )));
        }

        let step = self.clock.step();
        self.unit.set_inputs(&overrides);
        let snapshot = match self.unit.do_step(step) {
            Ok(s) => s,
            Err(div) => {
                self.phase = Phase::Diverged;
                error!(time = self.clock.time(), step, reason = %div, "simulation diverged");
                return Err(TestbedError::SimulationDiverged {
                    time: self.clock.time(),
                    reason: div.reason,
                });
            }
        };

        let Some(time) = self.clock.tick() else {
            return Ok(AdvanceOutcome::Completed);
        };
        let catalog = self.unit.catalog();
        let values = snapshot
            .iter()
            .filter(|(name, _)| catalog.contains(name))
            .map(|(name, v)| (name.clone(), *v))
            .collect();
        let record = ResultRecord::new(time, values);
        let elapsed = started.elapsed();
        self.kpi.record(&record, step, elapsed);
        self.results.append(record);

        debug!(
            time,
            step,
            overrides = overrides.active_count(),
            elapsed_us = elapsed.as_micros() as u64,
            "advanced"
        );
        Ok(AdvanceOutcome::Stepped(snapshot))
    }

    /// Drops the current run. The unit is re-seeded on the next initialize.
    pub fn reset(&mut self) {
        self.results.clear();
        self.kpi.reset();
        self.clock.start_at(0.0, None);
        self.phase = Phase::Uninitialized;
        info!("simulation reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::Divergence;
    use crate::points::PointMeta;
    use crate::sim::overrides::Override;

    /// Integrates `x' = u` where `u` defaults to 1.
    struct Integrator {
        catalog: PointCatalog,
        x: f64,
        u: f64,
    }

    impl Integrator {
        fn boxed() -> Box<dyn SimulatableUnit> {
            Box::new(Self {
                catalog: PointCatalog::new(vec![
                    PointMeta::input("u_u", "1", "Rate", -2.0, 2.0),
                    PointMeta::measurement("x_y", "1", "State"),
                ])
                .unwrap(),
                x: 0.0,
                u: 1.0,
            })
        }
    }

    impl SimulatableUnit for Integrator {
        fn name(&self) -> &str {
            "integrator"
        }
        fn catalog(&self) -> &PointCatalog {
            &self.catalog
        }
        fn valid_horizon(&self) -> (f64, f64) {
            (0.0, 1e6)
        }
        fn reset(&mut self, _time: f64) {
            self.x = 0.0;
        }
        fn set_inputs(&mut self, inputs: &OverrideMap) {
            self.u = match inputs.get("u_u") {
                Override::Active(v) => v,
                Override::PassThrough => 1.0,
            };
        }
        fn do_step(&mut self, duration: f64) -> Result<OutputSnapshot, Divergence> {
            self.x += self.u * duration;
            if self.x < 0.0 {
                return Err(Divergence::new("negative state"));
            }
            Ok(self.outputs())
        }
        fn outputs(&self) -> OutputSnapshot {
            OutputSnapshot::from([("x_y".to_string(), self.x), ("u_u".to_string(), self.u)])
        }
    }

    fn stepper() -> Stepper {
        Stepper::new(
            Integrator::boxed(),
            Arc::new(BoundaryData::new()),
            KpiSettings::default(),
            10.0,
            OverridePolicy::Clamp,
        )
        .unwrap()
    }

    #[test]
    fn advance_requires_initialize() {
        let mut s = stepper();
        assert_eq!(
            s.advance(&OverrideRequest::new()),
            Err(TestbedError::NotInitialized)
        );
    }

    #[test]
    fn initialize_runs_warmup_and_clears_history() {
        let mut s = stepper();
        let snap = s.initialize(100.0, 50.0).unwrap();
        assert_eq!(snap["x_y"], 50.0);
        s.advance(&OverrideRequest::new()).unwrap();
        assert_eq!(s.results().len(), 1);

        let snap = s.initialize(0.0, 0.0).unwrap();
        assert_eq!(snap["x_y"], 0.0);
        assert!(s.results().is_empty());
        assert_eq!(s.time(), 0.0);
        assert_eq!(s.phase(), Phase::Initialized);
    }

    #[test]
    fn invalid_windows_do_not_touch_state() {
        let mut s = stepper();
        s.initialize(0.0, 0.0).unwrap();
        s.advance(&OverrideRequest::new()).unwrap();
        for (start, warmup) in [(-1.0, 0.0), (1e6, 0.0), (10.0, -1.0), (f64::NAN, 0.0), (0.0, f64::INFINITY)] {
            assert!(matches!(
                s.initialize(start, warmup),
                Err(TestbedError::InvalidTimeRange { .. })
            ));
        }
        assert_eq!(s.results().len(), 1);
        assert_eq!(s.time(), 10.0);
    }

    #[test]
    fn warmup_before_horizon_is_truncated() {
        let mut s = stepper();
        let snap = s.initialize(10.0, 30.0).unwrap();
        assert_eq!(snap["x_y"], 10.0);
        assert_eq!(s.time(), 10.0);
    }

    #[test]
    fn records_follow_step_changes() {
        let mut s = stepper();
        s.initialize(0.0, 0.0).unwrap();
        s.advance(&OverrideRequest::new()).unwrap();
        s.set_step(5.0).unwrap();
        s.advance(&OverrideRequest::new().activate("u_u", 2.0)).unwrap();
        let times: Vec<f64> = s.results().records().iter().map(|r| r.time).collect();
        assert_eq!(times, vec![10.0, 15.0]);
        assert_eq!(s.results().records()[1].get("u_u"), Some(2.0));
        assert_eq!(s.results().records()[1].get("x_y"), Some(20.0));
    }

    #[test]
    fn divergence_freezes_the_run() {
        let mut s = stepper();
        s.initialize(0.0, 0.0).unwrap();
        s.advance(&OverrideRequest::new()).unwrap();
        let err = s.advance(&OverrideRequest::new().activate("u_u", -2.0));
        assert!(matches!(err, Err(TestbedError::SimulationDiverged { .. })));
        assert_eq!(s.phase(), Phase::Diverged);
        assert_eq!(s.results().len(), 1);
        assert_eq!(
            s.advance(&OverrideRequest::new()),
            Err(TestbedError::NotInitialized)
        );
        s.initialize(0.0, 0.0).unwrap();
        assert!(s.advance(&OverrideRequest::new()).is_ok());
    }

    #[test]
    fn bounded_run_completes() {
        let mut s = stepper();
        s.initialize_bounded(0.0, 0.0, 20.0).unwrap();
        assert!(s.advance(&OverrideRequest::new()).unwrap().snapshot().is_some());
        assert!(s.advance(&OverrideRequest::new()).unwrap().snapshot().is_some());
        assert!(s.advance(&OverrideRequest::new()).unwrap().is_completed());
        assert_eq!(s.phase(), Phase::Completed);
        assert_eq!(s.results().len(), 2);
        assert!(s.advance(&OverrideRequest::new()).unwrap().is_completed());
    }

    #[test]
    fn step_past_the_model_horizon_is_refused() {
        let mut s = stepper();
        s.initialize(1e6 - 5.0, 0.0).unwrap();
        let err = s.advance(&OverrideRequest::new()).unwrap_err();
        assert!(matches!(err, TestbedError::InvalidTimeRange { .. }));
        assert!(err.is_recoverable());
        assert_eq!(s.phase(), Phase::Initialized);
        assert_eq!(s.time(), 1e6 - 5.0);
        assert!(s.results().is_empty());

        s.set_step(5.0).unwrap();
        assert!(s.advance(&OverrideRequest::new()).unwrap().snapshot().is_some());
        assert_eq!(s.time(), 1e6);
    }

    #[test]
    fn bad_override_leaves_state_untouched() {
        let mut s = stepper();
        s.initialize(0.0, 0.0).unwrap();
        let err = s.advance(&OverrideRequest::new().activate("x_y", 1.0));
        assert!(matches!(err, Err(TestbedError::UnknownPoint { .. })));
        assert_eq!(s.time(), 0.0);
        assert!(s.results().is_empty());
    }

    #[test]
    fn reset_returns_to_uninitialized() {
        let mut s = stepper();
        s.initialize(0.0, 0.0).unwrap();
        s.advance(&OverrideRequest::new()).unwrap();
        s.reset();
        assert_eq!(s.phase(), Phase::Uninitialized);
        assert!(s.results().is_empty());
        assert_eq!(s.kpi().accumulator().steps, 0);
    }
}
