//! Shared test fixtures for integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use testbed_sim::adapter::{Divergence, OutputSnapshot, SimulatableUnit};
use testbed_sim::boundary::{BoundaryData, SyntheticBoundary};
use testbed_sim::config::TestbedConfig;
use testbed_sim::forecast::ForecastSettings;
use testbed_sim::kpi::KpiSettings;
use testbed_sim::points::{KpiTag, PointCatalog, PointMeta};
use testbed_sim::scenario::TimePeriod;
use testbed_sim::sim::{Override, OverrideMap, OverridePolicy};
use testbed_sim::testbed::Testbed;

pub const HEATER_INPUT: &str = "oveHea_u";
pub const HEATER_POWER: &str = "reaPHea_y";
pub const ZONE_TEMPERATURE: &str = "reaTZon_y";
pub const CLOCK: &str = "reaClock_y";

/// Heater power commanded by the embedded control when not overridden.
pub const NATIVE_HEAT_W: f64 = 1000.0;

/// Zone temperature the scripted unit starts from after a reset.
pub const START_TEMPERATURE_K: f64 = 293.15;

/// Deterministic unit: a heater whose power warms the zone linearly, with
/// an optional scripted divergence.
///
/// The horizon starts a day before t=0 so warmups before t=0 are valid.
pub struct ScriptedUnit {
    catalog: PointCatalog,
    time: f64,
    temperature: f64,
    heat: f64,
    diverge_after: Option<f64>,
}

impl ScriptedUnit {
    pub fn new() -> Self {
        Self {
            catalog: PointCatalog::new(vec![
                PointMeta::input(HEATER_INPUT, "W", "Heater power", 0.0, 5000.0),
                PointMeta::measurement(HEATER_POWER, "W", "Heater electric power")
                    .with_kpi(KpiTag::ElectricPower),
                PointMeta::measurement(ZONE_TEMPERATURE, "K", "Zone temperature").with_kpi(
                    KpiTag::ZoneTemperature {
                        zone: "zon".to_string(),
                    },
                ),
                PointMeta::measurement(CLOCK, "s", "Internal model time"),
            ])
            .unwrap(),
            time: 0.0,
            temperature: START_TEMPERATURE_K,
            heat: NATIVE_HEAT_W,
            diverge_after: None,
        }
    }

    /// Fails every step that would move past `time`.
    pub fn diverging_after(mut self, time: f64) -> Self {
        self.diverge_after = Some(time);
        self
    }
}

impl SimulatableUnit for ScriptedUnit {
    fn name(&self) -> &str {
        "scripted"
    }

    fn catalog(&self) -> &PointCatalog {
        &self.catalog
    }

    fn valid_horizon(&self) -> (f64, f64) {
        (-86_400.0, 1.0e7)
    }

    fn reset(&mut self, time: f64) {
        self.time = time;
        self.temperature = START_TEMPERATURE_K;
        self.heat = NATIVE_HEAT_W;
    }

    fn set_inputs(&mut self, inputs: &OverrideMap) {
        self.heat = match inputs.get(HEATER_INPUT) {
            Override::Active(v) => v,
            Override::PassThrough => NATIVE_HEAT_W,
        };
    }

    fn do_step(&mut self, duration: f64) -> Result<OutputSnapshot, Divergence> {
        if let Some(limit) = self.diverge_after {
            if self.time + duration > limit {
                return Err(Divergence::new("scripted failure"));
            }
        }
        self.time += duration;
        // 1 kW for one hour warms the zone by 1 K.
        self.temperature += self.heat / 1000.0 * duration / 3600.0;
        Ok(self.outputs())
    }

    fn outputs(&self) -> OutputSnapshot {
        OutputSnapshot::from([
            (HEATER_INPUT.to_string(), self.heat),
            (HEATER_POWER.to_string(), self.heat),
            (ZONE_TEMPERATURE.to_string(), self.temperature),
            (CLOCK.to_string(), self.time),
        ])
    }
}

/// Synthetic boundary data covering the first 30 days.
pub fn boundary() -> Arc<BoundaryData> {
    Arc::new(BoundaryData::synthetic(
        &SyntheticBoundary {
            span_s: 30.0 * 86_400.0,
            ..SyntheticBoundary::default()
        },
        &["zon"],
    ))
}

/// One short period: start on day 2 after a 1 h warmup, run for 4 h.
pub fn short_periods() -> BTreeMap<String, TimePeriod> {
    BTreeMap::from([(
        "short_day".to_string(),
        TimePeriod {
            start_time: 2.0 * 86_400.0,
            warmup_period: 3600.0,
            duration: 4.0 * 3600.0,
        },
    )])
}

pub fn scripted_testbed_with(unit: ScriptedUnit, policy: OverridePolicy) -> Testbed {
    Testbed::new(
        Box::new(unit),
        boundary(),
        KpiSettings::default(),
        ForecastSettings::default(),
        short_periods(),
        3600.0,
        policy,
    )
    .unwrap()
}

/// Scripted unit behind a testbed with the clamp policy.
pub fn scripted_testbed() -> Testbed {
    scripted_testbed_with(ScriptedUnit::new(), OverridePolicy::Clamp)
}

/// Reference zone model on 40 days of synthetic data, with only the
/// `peak_heat_day` period kept.
pub fn zone_testbed() -> Testbed {
    let mut cfg = TestbedConfig::single_zone();
    cfg.boundary.synthetic.span_s = 40.0 * 86_400.0;
    cfg.time_periods.retain(|name, _| name == "peak_heat_day");
    cfg.build().unwrap()
}
