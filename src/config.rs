//! TOML-based testbed configuration and preset definitions.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;

use crate::boundary::{BoundaryData, SyntheticBoundary};
use crate::forecast::ForecastSettings;
use crate::kpi::KpiSettings;
use crate::model::{Thermostat, ZoneModel, ZoneParams};
use crate::scenario::{TimePeriod, default_time_periods};
use crate::sim::OverridePolicy;
use crate::testbed::Testbed;

/// Top-level testbed configuration parsed from TOML.
///
/// All sections have defaults matching the `single_zone` preset. Load
/// from TOML with [`TestbedConfig::from_toml_file`] or use
/// [`TestbedConfig::single_zone`] for the built-in default.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestbedConfig {
    /// Test case identity and stepping defaults.
    #[serde(default)]
    pub testcase: TestcaseConfig,
    /// Default forecast horizon and interval, and the per-window sample limit.
    #[serde(default)]
    pub forecast: ForecastSettings,
    /// KPI normalization and fixed energy prices.
    #[serde(default)]
    pub kpi: KpiSettings,
    /// Reference zone model parameters.
    #[serde(default)]
    pub model: ZoneParams,
    /// Embedded control of the reference zone.
    #[serde(default)]
    pub thermostat: Thermostat,
    /// Source of weather, schedules and prices.
    #[serde(default)]
    pub boundary: BoundaryConfig,
    /// Named test periods. A table here replaces the built-in periods.
    #[serde(default = "default_time_periods")]
    pub time_periods: BTreeMap<String, TimePeriod>,
}

/// Test case identity and stepping defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TestcaseConfig {
    /// Name published by the `name` verb.
    pub name: String,
    /// Initial communication step (s).
    pub step: f64,
    /// Handling of overrides outside the declared input bounds.
    pub override_policy: OverridePolicy,
}

impl Default for TestcaseConfig {
    fn default() -> Self {
        Self {
            name: "single_zone".to_string(),
            step: 3600.0,
            override_policy: OverridePolicy::Clamp,
        }
    }
}

/// Boundary data source: a CSV file, or synthetic data when absent.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BoundaryConfig {
    /// CSV with a `time` column and one column per series.
    pub csv: Option<PathBuf>,
    /// Generator settings used when no CSV is given.
    pub synthetic: SyntheticBoundary,
}

/// A configuration problem, located by its dotted field path.
#[derive(Debug, Error)]
#[error("config error: {field}: {message}")]
pub struct ConfigError {
    pub field: String,
    pub message: String,
}

impl ConfigError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl Default for TestbedConfig {
    fn default() -> Self {
        Self::single_zone()
    }
}

impl TestbedConfig {
    /// Lightweight single-zone office.
    pub fn single_zone() -> Self {
        Self {
            testcase: TestcaseConfig::default(),
            forecast: ForecastSettings::default(),
            kpi: KpiSettings::default(),
            model: ZoneParams::default(),
            thermostat: Thermostat::default(),
            boundary: BoundaryConfig::default(),
            time_periods: default_time_periods(),
        }
    }

    /// Same zone with a heavy, well-insulated construction.
    pub fn heavy_mass() -> Self {
        Self {
            testcase: TestcaseConfig {
                name: "heavy_mass".to_string(),
                ..TestcaseConfig::default()
            },
            model: ZoneParams {
                mass_capacitance_j_per_k: 6.0e7,
                air_mass_ua_w_per_k: 800.0,
                envelope_ua_w_per_k: 40.0,
                ..ZoneParams::default()
            },
            ..Self::single_zone()
        }
    }

    /// Names accepted by [`TestbedConfig::from_preset`].
    pub const PRESETS: &[&str] = &["single_zone", "heavy_mass"];

    /// Loads a configuration from a named preset.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the preset name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "single_zone" => Ok(Self::single_zone()),
            "heavy_mass" => Ok(Self::heavy_mass()),
            _ => Err(ConfigError::new(
                "preset",
                format!("unknown preset \"{name}\", available: {}", Self::PRESETS.join(", ")),
            )),
        }
    }

    /// Parses a configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::new("config", format!("cannot read \"{}\": {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    /// Parses a configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::new("toml", e.to_string()))
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let mut positive = |field: &str, value: f64| {
            if !(value.is_finite() && value > 0.0) {
                errors.push(ConfigError::new(field, "must be a finite value > 0"));
            }
        };

        positive("testcase.step", self.testcase.step);
        positive("forecast.interval", self.forecast.interval);
        positive("kpi.floor_area_m2", self.kpi.floor_area_m2);

        let m = &self.model;
        positive("model.air_capacitance_j_per_k", m.air_capacitance_j_per_k);
        positive("model.mass_capacitance_j_per_k", m.mass_capacitance_j_per_k);
        positive("model.heater_max_w", m.heater_max_w);
        positive("model.heater_cop", m.heater_cop);
        positive("model.volume_m3", m.volume_m3);
        positive("model.max_substep_s", m.max_substep_s);
        positive("thermostat.proportional_band_k", self.thermostat.proportional_band_k);
        positive("boundary.synthetic.sample_s", self.boundary.synthetic.sample_s);
        positive("boundary.synthetic.span_s", self.boundary.synthetic.span_s);

        if self.forecast.horizon < 0.0 || !self.forecast.horizon.is_finite() {
            errors.push(ConfigError::new("forecast.horizon", "must be a finite value >= 0"));
        }
        if self.forecast.max_samples == 0 {
            errors.push(ConfigError::new("forecast.max_samples", "must be >= 1"));
        }
        if m.zone.is_empty() {
            errors.push(ConfigError::new("model.zone", "must not be empty"));
        }
        let t = &self.thermostat;
        if t.co2_low_ppm >= t.co2_high_ppm {
            errors.push(ConfigError::new(
                "thermostat.co2_low_ppm",
                "must be < thermostat.co2_high_ppm",
            ));
        }
        if !(0.0..=1.0).contains(&t.min_fan_speed) {
            errors.push(ConfigError::new("thermostat.min_fan_speed", "must be in [0.0, 1.0]"));
        }

        let synthetic = &self.boundary.synthetic;
        if synthetic.span_s < synthetic.sample_s {
            errors.push(ConfigError::new(
                "boundary.synthetic.span_s",
                "must be >= boundary.synthetic.sample_s",
            ));
        }

        for (name, p) in &self.time_periods {
            let field = |f: &str| format!("time_periods.{name}.{f}");
            if !(p.duration.is_finite() && p.duration > 0.0) {
                errors.push(ConfigError::new(field("duration"), "must be a finite value > 0"));
            }
            if !(p.warmup_period.is_finite() && p.warmup_period >= 0.0) {
                errors.push(ConfigError::new(field("warmup_period"), "must be a finite value >= 0"));
            }
            if p.start_time < 0.0 {
                errors.push(ConfigError::new(field("start_time"), "must be >= 0"));
            }
            if self.boundary.csv.is_none() && p.start_time + p.duration > synthetic.span_s {
                errors.push(ConfigError::new(
                    field("duration"),
                    "period ends after the synthetic boundary data",
                ));
            }
        }

        errors
    }

    /// Loads or generates the boundary data.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the CSV cannot be loaded.
    pub fn load_boundary(&self) -> Result<BoundaryData, ConfigError> {
        match &self.boundary.csv {
            Some(path) => BoundaryData::from_csv_path(path)
                .map_err(|e| ConfigError::new("boundary.csv", format!("\"{}\": {e}", path.display()))),
            None => Ok(BoundaryData::synthetic(
                &self.boundary.synthetic,
                &[self.model.zone.as_str()],
            )),
        }
    }

    /// Builds a ready-to-initialize testbed around the reference zone model.
    ///
    /// # Errors
    ///
    /// Returns the first validation error, or a `ConfigError` if the
    /// boundary data cannot be loaded or the model cannot be built.
    pub fn build(&self) -> Result<Testbed, ConfigError> {
        if let Some(first) = self.validate().into_iter().next() {
            return Err(first);
        }
        let boundary = Arc::new(self.load_boundary()?);
        let model = ZoneModel::new(
            &self.testcase.name,
            self.model.clone(),
            self.thermostat.clone(),
            Arc::clone(&boundary),
        )
        .map_err(|e| ConfigError::new("model", e.to_string()))?;
        Testbed::new(
            Box::new(model),
            boundary,
            self.kpi.clone(),
            self.forecast,
            self.time_periods.clone(),
            self.testcase.step,
            self.testcase.override_policy,
        )
        .map_err(|e| ConfigError::new("testcase", e.to_string()))
    }
}
