//! Thread-safe facade with one method per transport verb.
//!
//! A [`Testbed`] is an explicit context object: several can live in one
//! process. Mutating verbs hold the write lock for their whole duration,
//! so two advances never interleave. Read verbs take the read lock and
//! observe simulated time exactly once.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::adapter::{OutputSnapshot, SimulatableUnit};
use crate::boundary::BoundaryData;
use crate::error::TestbedResult;
use crate::forecast::{ForecastParameters, ForecastProvider, ForecastSettings, ForecastWindow};
use crate::kpi::{KpiReport, KpiSettings};
use crate::points::{PointInfo, PointKind};
use crate::results::{ResultColumns, ResultsStore};
use crate::scenario::{ElectricityPrice, ScenarioManager, ScenarioSpec, ScenarioUpdate, TimePeriod};
use crate::sim::{AdvanceOutcome, OverridePolicy, OverrideRequest, Phase, Stepper};

struct TestbedState {
    stepper: Stepper,
    scenario: ScenarioManager,
    forecast: ForecastProvider,
}

/// A simulatable unit wrapped with results, KPIs, forecasts and scenarios.
pub struct Testbed {
    state: RwLock<TestbedState>,
}

impl Testbed {
    /// Creates an uninitialized testbed.
    ///
    /// # Arguments
    ///
    /// * `unit` - The simulatable unit to drive
    /// * `boundary` - Boundary data shared by forecasts and KPIs
    /// * `kpi` - KPI normalization settings
    /// * `forecast` - Default forecast horizon, interval and sample limit
    /// * `time_periods` - Named scenario time periods
    /// * `step` - Initial communication step (s)
    /// * `policy` - Handling of out-of-bounds overrides
    pub fn new(
        unit: Box<dyn SimulatableUnit>,
        boundary: Arc<BoundaryData>,
        kpi: KpiSettings,
        forecast: ForecastSettings,
        time_periods: BTreeMap<String, TimePeriod>,
        step: f64,
        policy: OverridePolicy,
    ) -> TestbedResult<Self> {
        let forecast = ForecastProvider::new(Arc::clone(&boundary), forecast)?;
        let stepper = Stepper::new(unit, boundary, kpi, step, policy)?;
        Ok(Self {
            state: RwLock::new(TestbedState {
                stepper,
                scenario: ScenarioManager::new(time_periods),
                forecast,
            }),
        })
    }

    pub fn name(&self) -> String {
        self.state.read().stepper.name().to_string()
    }

    pub fn version(&self) -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    /// Metadata of every overridable input.
    pub fn inputs(&self) -> BTreeMap<String, PointInfo> {
        self.state.read().stepper.catalog().describe(PointKind::Input)
    }

    /// Metadata of every measurement.
    pub fn measurements(&self) -> BTreeMap<String, PointInfo> {
        self.state.read().stepper.catalog().describe(PointKind::Measurement)
    }

    pub fn step(&self) -> f64 {
        self.state.read().stepper.step()
    }

    pub fn set_step(&self, step: f64) -> TestbedResult<()> {
        self.state.write().stepper.set_step(step)
    }

    pub fn time(&self) -> f64 {
        self.state.read().stepper.time()
    }

    pub fn phase(&self) -> Phase {
        self.state.read().stepper.phase()
    }

    /// Starts a new run; see [`Stepper::initialize`].
    pub fn initialize(&self, start_time: f64, warmup_period: f64) -> TestbedResult<OutputSnapshot> {
        self.state.write().stepper.initialize(start_time, warmup_period)
    }

    /// Simulates one communication step; see [`Stepper::advance`].
    pub fn advance(&self, overrides: &OverrideRequest) -> TestbedResult<AdvanceOutcome> {
        self.state.write().stepper.advance(overrides)
    }

    /// Recorded values of `points` with `start_time <= time <= final_time`.
    pub fn results(&self, points: &[&str], start_time: f64, final_time: f64) -> TestbedResult<ResultColumns> {
        let state = self.state.read();
        let stepper = &state.stepper;
        let records = stepper
            .results()
            .query(stepper.catalog(), points, start_time, final_time)?;
        Ok(ResultColumns::from_records(&records, points))
    }

    /// Runs `f` against the results store under the read lock.
    pub fn with_results<R>(&self, f: impl FnOnce(&ResultsStore) -> R) -> R {
        f(self.state.read().stepper.results())
    }

    /// KPIs of the current run, priced with the active electricity scenario.
    pub fn kpis(&self) -> KpiReport {
        let state = self.state.read();
        state.stepper.kpi().report(state.scenario.price())
    }

    /// Forecast from the current simulated time.
    ///
    /// The returned window owns its data and can be consumed after this
    /// call returns.
    pub fn forecast(&self, horizon: Option<f64>, interval: Option<f64>) -> TestbedResult<ForecastWindow> {
        let state = self.state.read();
        let time = state.stepper.time();
        state
            .forecast
            .window(time, state.scenario.price(), horizon, interval)
    }

    pub fn forecast_parameters(&self) -> ForecastParameters {
        self.state.read().forecast.parameters()
    }

    pub fn set_forecast_parameters(&self, horizon: f64, interval: f64) -> TestbedResult<ForecastParameters> {
        self.state.write().forecast.set_parameters(horizon, interval)
    }

    pub fn scenario(&self) -> ScenarioSpec {
        self.state.read().scenario.scenario().clone()
    }

    pub fn electricity_price(&self) -> ElectricityPrice {
        self.state.read().scenario.price()
    }

    /// Applies a scenario; see [`ScenarioManager::set_scenario`].
    pub fn set_scenario(&self, spec: &ScenarioSpec) -> TestbedResult<ScenarioUpdate> {
        let mut guard = self.state.write();
        let state = &mut *guard;
        state.scenario.set_scenario(spec, &mut state.stepper)
    }

    /// Drops the current run.
    pub fn reset(&self) {
        self.state.write().stepper.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TestbedConfig;

    fn testbed() -> Testbed {
        let mut cfg = TestbedConfig::single_zone();
        cfg.boundary.synthetic.span_s = 40.0 * 86_400.0;
        cfg.time_periods.retain(|name, _| name == "peak_heat_day");
        cfg.build().unwrap()
    }

    #[test]
    fn metadata_is_published() {
        let tb = testbed();
        assert_eq!(tb.name(), "single_zone");
        assert!(tb.inputs().contains_key("oveTSetHea_u"));
        assert!(tb.measurements().contains_key("reaTZon_y"));
        assert!(!tb.version().is_empty());
    }

    #[test]
    fn kpis_are_idempotent() {
        let tb = testbed();
        tb.initialize(86_400.0, 0.0).unwrap();
        tb.advance(&OverrideRequest::new()).unwrap();
        assert_eq!(tb.kpis(), tb.kpis());
        assert!(tb.kpis().time_rat.is_some());
    }

    #[test]
    fn forecast_starts_at_current_time() {
        let tb = testbed();
        tb.initialize(86_400.0, 0.0).unwrap();
        tb.advance(&OverrideRequest::new()).unwrap();
        let w = tb.forecast(Some(7200.0), Some(3600.0)).unwrap();
        assert_eq!(w.start(), tb.time());
        assert_eq!(w.iter().count(), 3);
    }

    #[test]
    fn price_switch_reprices_without_resimulating() {
        let tb = testbed();
        tb.initialize(2.0 * 86_400.0, 0.0).unwrap();
        for _ in 0..24 {
            tb.advance(&OverrideRequest::new()).unwrap();
        }
        let steps = tb.with_results(|r| r.len());
        let constant = tb.kpis();
        tb.set_scenario(&ScenarioSpec::default().with_price(ElectricityPrice::Dynamic))
            .unwrap();
        let dynamic = tb.kpis();
        assert_eq!(tb.with_results(|r| r.len()), steps);
        assert_eq!(constant.ener_tot, dynamic.ener_tot);
        assert_ne!(constant.cost_tot, dynamic.cost_tot);
    }
}
