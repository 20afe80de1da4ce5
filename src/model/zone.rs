//! Single-zone thermal and air-quality model.
//!
//! Two thermal nodes (zone air and building mass) coupled to the outdoor
//! air, a heat pump supplying heat to the air node, solar gains on the
//! mass node, and a well-mixed CO2 balance driven by occupants and a
//! ventilation fan. Integrated with explicit Euler sub-steps.

use std::sync::Arc;

use serde::Deserialize;

use crate::adapter::{Divergence, OutputSnapshot, SimulatableUnit};
use crate::boundary::{BoundaryData, GLOBAL_HORIZONTAL_IRRADIATION, OUTDOOR_TEMPERATURE, occupancy_series};
use crate::error::TestbedResult;
use crate::points::{KpiTag, PointCatalog, PointMeta};
use crate::sim::overrides::{Override, OverrideMap};

use super::thermostat::Thermostat;

pub const SETPOINT_INPUT: &str = "oveTSetHea_u";
pub const HEATER_INPUT: &str = "oveHeaPow_u";
pub const FAN_INPUT: &str = "oveFan_u";

pub const ZONE_TEMPERATURE: &str = "reaTZon_y";
pub const ZONE_CO2: &str = "reaCO2Zon_y";
pub const HEATER_POWER: &str = "reaPHea_y";
pub const FAN_POWER: &str = "reaPFan_y";
pub const OUTDOOR_TEMPERATURE_MEASUREMENT: &str = "reaTOut_y";
pub const SETPOINT_MEASUREMENT: &str = "reaTSetHea_y";

/// Physically plausible zone temperature range (K); leaving it means the
/// integration has blown up.
const TEMPERATURE_LIMITS_K: (f64, f64) = (173.15, 373.15);

/// Physical parameters of the zone.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ZoneParams {
    /// Zone identifier used for occupancy and comfort series.
    pub zone: String,
    /// Heat capacity of the zone air and furnishings (J/K).
    pub air_capacitance_j_per_k: f64,
    /// Heat capacity of the building mass (J/K).
    pub mass_capacitance_j_per_k: f64,
    /// Envelope conductance between zone air and outdoors (W/K).
    pub envelope_ua_w_per_k: f64,
    /// Conductance between zone air and building mass (W/K).
    pub air_mass_ua_w_per_k: f64,
    /// Effective solar aperture absorbed by the mass (m2).
    pub solar_aperture_m2: f64,
    /// Sensible heat per occupant (W).
    pub occupant_gain_w: f64,
    /// Maximum heat pump thermal output (W).
    pub heater_max_w: f64,
    /// Heat pump coefficient of performance.
    pub heater_cop: f64,
    /// Zone air volume (m3).
    pub volume_m3: f64,
    /// Infiltration airflow (m3/s).
    pub infiltration_m3_s: f64,
    /// Fan airflow at full speed (m3/s).
    pub fan_max_flow_m3_s: f64,
    /// Fan electric power at full speed (W).
    pub fan_max_power_w: f64,
    /// CO2 generation per occupant (m3/s).
    pub co2_per_occupant_m3_s: f64,
    /// Outdoor CO2 concentration (ppm).
    pub outdoor_co2_ppm: f64,
    /// Initial temperature of both thermal nodes (K).
    pub initial_temperature_k: f64,
    /// Longest explicit Euler sub-step (s).
    pub max_substep_s: f64,
}

impl Default for ZoneParams {
    fn default() -> Self {
        Self {
            zone: "zon".to_string(),
            air_capacitance_j_per_k: 1.5e6,
            mass_capacitance_j_per_k: 2.0e7,
            envelope_ua_w_per_k: 60.0,
            air_mass_ua_w_per_k: 400.0,
            solar_aperture_m2: 3.0,
            occupant_gain_w: 100.0,
            heater_max_w: 6000.0,
            heater_cop: 3.0,
            volume_m3: 130.0,
            infiltration_m3_s: 0.01,
            fan_max_flow_m3_s: 0.12,
            fan_max_power_w: 150.0,
            co2_per_occupant_m3_s: 5.0e-6,
            outdoor_co2_ppm: 400.0,
            initial_temperature_k: 293.15,
            max_substep_s: 60.0,
        }
    }
}

/// Control source of each input for the current step.
#[derive(Debug, Clone, Copy, PartialEq)]
struct InputFrame {
    setpoint: Override,
    heater: Override,
    fan: Override,
}

impl Default for InputFrame {
    fn default() -> Self {
        Self {
            setpoint: Override::PassThrough,
            heater: Override::PassThrough,
            fan: Override::PassThrough,
        }
    }
}

/// Applied inputs and averaged powers of the last step.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Applied {
    setpoint_k: f64,
    heater_w: f64,
    fan: f64,
    heater_electric_w: f64,
    fan_electric_w: f64,
}

/// Reference single-zone building with an embedded [`Thermostat`].
#[derive(Debug, Clone)]
pub struct ZoneModel {
    name: String,
    params: ZoneParams,
    thermostat: Thermostat,
    boundary: Arc<BoundaryData>,
    catalog: PointCatalog,
    horizon: (f64, f64),
    time: f64,
    air_k: f64,
    mass_k: f64,
    co2_ppm: f64,
    inputs: InputFrame,
    applied: Applied,
}

impl ZoneModel {
    /// Builds the model. The valid horizon is the span of the outdoor
    /// temperature series, or empty if the boundary data lacks it.
    pub fn new(
        name: &str,
        params: ZoneParams,
        thermostat: Thermostat,
        boundary: Arc<BoundaryData>,
    ) -> TestbedResult<Self> {
        let catalog = Self::build_catalog(&params)?;
        let horizon = boundary
            .get(OUTDOOR_TEMPERATURE)
            .map_or((0.0, 0.0), |s| (s.start(), s.end()));
        let mut model = Self {
            name: name.to_string(),
            params,
            thermostat,
            boundary,
            catalog,
            horizon,
            time: 0.0,
            air_k: 0.0,
            mass_k: 0.0,
            co2_ppm: 0.0,
            inputs: InputFrame::default(),
            applied: Applied::default(),
        };
        model.reset(horizon.0);
        Ok(model)
    }

    fn build_catalog(params: &ZoneParams) -> TestbedResult<PointCatalog> {
        let zone = params.zone.clone();
        PointCatalog::new(vec![
            PointMeta::input(SETPOINT_INPUT, "K", "Zone heating setpoint", 278.15, 308.15),
            PointMeta::input(HEATER_INPUT, "W", "Heat pump thermal power", 0.0, params.heater_max_w),
            PointMeta::input(FAN_INPUT, "1", "Ventilation fan speed", 0.0, 1.0),
            PointMeta::measurement(ZONE_TEMPERATURE, "K", "Zone air temperature")
                .with_kpi(KpiTag::ZoneTemperature { zone: zone.clone() }),
            PointMeta::measurement(ZONE_CO2, "ppm", "Zone air CO2 concentration")
                .with_kpi(KpiTag::ZoneCo2 { zone }),
            PointMeta::measurement(HEATER_POWER, "W", "Heat pump electric power")
                .with_kpi(KpiTag::ElectricPower),
            PointMeta::measurement(FAN_POWER, "W", "Fan electric power").with_kpi(KpiTag::ElectricPower),
            PointMeta::measurement(OUTDOOR_TEMPERATURE_MEASUREMENT, "K", "Outdoor air temperature"),
            PointMeta::measurement(SETPOINT_MEASUREMENT, "K", "Applied heating setpoint"),
        ])
    }

    fn occupants(&self, time: f64) -> f64 {
        self.boundary
            .value_at(&occupancy_series(&self.params.zone), time)
            .unwrap_or(0.0)
    }

    /// One explicit Euler step of length `dt` starting at `self.time`.
    ///
    /// Returns the applied inputs of the sub-step.
    fn euler(&mut self, dt: f64) -> Result<Applied, Divergence> {
        let p = &self.params;
        let t = self.time;
        let t_out = self.boundary.value_at(OUTDOOR_TEMPERATURE, t).ok_or_else(|| {
            Divergence::new(format!("no outdoor temperature at t={t} s"))
        })?;
        let irradiation = self
            .boundary
            .value_at(GLOBAL_HORIZONTAL_IRRADIATION, t)
            .unwrap_or(0.0);
        let occupants = self.occupants(t);
        let occupied = occupants > 0.0;

        let setpoint_k = match self.inputs.setpoint {
            Override::Active(v) => v,
            Override::PassThrough => self.thermostat.heating_setpoint(occupied),
        };
        let heater_w = match self.inputs.heater {
            Override::Active(v) => v,
            Override::PassThrough => self.thermostat.heating_power(setpoint_k, self.air_k, p.heater_max_w),
        };
        let fan = match self.inputs.fan {
            Override::Active(v) => v,
            Override::PassThrough => self.thermostat.fan_speed(self.co2_ppm, occupied),
        };

        let airflow = p.infiltration_m3_s + fan * p.fan_max_flow_m3_s;
        // Volumetric heat capacity of air (J/m3/K).
        let ventilation_ua = airflow * 1.2 * 1005.0;

        let q_air = p.envelope_ua_w_per_k * (t_out - self.air_k)
            + ventilation_ua * (t_out - self.air_k)
            + p.air_mass_ua_w_per_k * (self.mass_k - self.air_k)
            + occupants * p.occupant_gain_w
            + heater_w;
        let q_mass = p.air_mass_ua_w_per_k * (self.air_k - self.mass_k) + irradiation * p.solar_aperture_m2;
        let co2_rate = (airflow * (p.outdoor_co2_ppm - self.co2_ppm)
            + occupants * p.co2_per_occupant_m3_s * 1e6)
            / p.volume_m3;

        self.air_k += dt * q_air / p.air_capacitance_j_per_k;
        self.mass_k += dt * q_mass / p.mass_capacitance_j_per_k;
        self.co2_ppm += dt * co2_rate;
        self.time += dt;

        let (lo, hi) = TEMPERATURE_LIMITS_K;
        if !self.air_k.is_finite() || !self.mass_k.is_finite() || !(lo..=hi).contains(&self.air_k) {
            return Err(Divergence::new(format!(
                "zone temperature {} K left [{lo}, {hi}] K",
                self.air_k
            )));
        }
        if !self.co2_ppm.is_finite() || self.co2_ppm < 0.0 {
            return Err(Divergence::new(format!(
                "zone CO2 {} ppm is not physical",
                self.co2_ppm
            )));
        }

        Ok(Applied {
            setpoint_k,
            heater_w,
            fan,
            heater_electric_w: heater_w / p.heater_cop,
            fan_electric_w: fan.powi(3) * p.fan_max_power_w,
        })
    }
}

impl SimulatableUnit for ZoneModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn catalog(&self) -> &PointCatalog {
        &self.catalog
    }

    fn valid_horizon(&self) -> (f64, f64) {
        self.horizon
    }

    fn reset(&mut self, time: f64) {
        self.time = time;
        self.air_k = self.params.initial_temperature_k;
        self.mass_k = self.params.initial_temperature_k;
        self.co2_ppm = self.params.outdoor_co2_ppm;
        self.inputs = InputFrame::default();
        let occupied = self.occupants(time) > 0.0;
        self.applied = Applied {
            setpoint_k: self.thermostat.heating_setpoint(occupied),
            ..Applied::default()
        };
    }

    fn set_inputs(&mut self, inputs: &OverrideMap) {
        self.inputs = InputFrame {
            setpoint: inputs.get(SETPOINT_INPUT),
            heater: inputs.get(HEATER_INPUT),
            fan: inputs.get(FAN_INPUT),
        };
    }

    fn do_step(&mut self, duration: f64) -> Result<OutputSnapshot, Divergence> {
        let n = (duration / self.params.max_substep_s).ceil().max(1.0) as usize;
        let dt = duration / n as f64;
        let mut heater_electric = 0.0;
        let mut fan_electric = 0.0;
        let mut last = None;
        for _ in 0..n {
            let applied = self.euler(dt)?;
            heater_electric += applied.heater_electric_w;
            fan_electric += applied.fan_electric_w;
            last = Some(applied);
        }
        let last = last.unwrap_or(self.applied);
        // Powers are step averages so that power times step is the energy used.
        self.applied = Applied {
            heater_electric_w: heater_electric / n as f64,
            fan_electric_w: fan_electric / n as f64,
            ..last
        };
        Ok(self.outputs())
    }

    fn outputs(&self) -> OutputSnapshot {
        let t_out = self
            .boundary
            .value_at(OUTDOOR_TEMPERATURE, self.time)
            .unwrap_or(f64::NAN);
        OutputSnapshot::from([
            (ZONE_TEMPERATURE.to_string(), self.air_k),
            (ZONE_CO2.to_string(), self.co2_ppm),
            (HEATER_POWER.to_string(), self.applied.heater_electric_w),
            (FAN_POWER.to_string(), self.applied.fan_electric_w),
            (OUTDOOR_TEMPERATURE_MEASUREMENT.to_string(), t_out),
            (SETPOINT_MEASUREMENT.to_string(), self.applied.setpoint_k),
            (SETPOINT_INPUT.to_string(), self.applied.setpoint_k),
            (HEATER_INPUT.to_string(), self.applied.heater_w),
            (FAN_INPUT.to_string(), self.applied.fan),
        ])
    }
}
