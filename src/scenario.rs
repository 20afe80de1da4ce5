//! Named test scenarios: electricity price series and time periods.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::adapter::OutputSnapshot;
use crate::error::{TestbedError, TestbedResult};
use crate::sim::Stepper;

const DAY_S: f64 = 86_400.0;

/// Electricity price scenario used to compute operational cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElectricityPrice {
    #[default]
    Constant,
    Dynamic,
    HighlyDynamic,
}

impl ElectricityPrice {
    pub const ALL: [Self; 3] = [Self::Constant, Self::Dynamic, Self::HighlyDynamic];

    /// Position in [`ElectricityPrice::ALL`].
    pub fn index(self) -> usize {
        match self {
            Self::Constant => 0,
            Self::Dynamic => 1,
            Self::HighlyDynamic => 2,
        }
    }

    /// Boundary data series holding this price (per kWh).
    pub fn series_name(self) -> &'static str {
        match self {
            Self::Constant => "PriceElectricPowerConstant",
            Self::Dynamic => "PriceElectricPowerDynamic",
            Self::HighlyDynamic => "PriceElectricPowerHighlyDynamic",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Constant => "constant",
            Self::Dynamic => "dynamic",
            Self::HighlyDynamic => "highly_dynamic",
        }
    }
}

impl fmt::Display for ElectricityPrice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ElectricityPrice {
    type Err = TestbedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| TestbedError::UnknownScenario {
                field: "electricity_price",
                value: s.to_string(),
                available: Self::ALL.map(Self::as_str).join(", "),
            })
    }
}

/// Start, warmup and length of a named test period (all in seconds).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimePeriod {
    pub start_time: f64,
    #[serde(default = "default_warmup")]
    pub warmup_period: f64,
    #[serde(default = "default_duration")]
    pub duration: f64,
}

fn default_warmup() -> f64 {
    7.0 * DAY_S
}

fn default_duration() -> f64 {
    14.0 * DAY_S
}

impl TimePeriod {
    /// A period starting at day `day` with the default warmup and length.
    pub fn starting_on_day(day: f64) -> Self {
        Self {
            start_time: day * DAY_S,
            warmup_period: default_warmup(),
            duration: default_duration(),
        }
    }
}

/// Built-in time periods of a heating-and-cooling test case.
pub fn default_time_periods() -> BTreeMap<String, TimePeriod> {
    [
        ("peak_heat_day", 23.0),
        ("typical_heat_day", 115.0),
        ("peak_cool_day", 204.0),
        ("typical_cool_day", 253.0),
        ("mix_day", 296.0),
    ]
    .into_iter()
    .map(|(name, day)| (name.to_string(), TimePeriod::starting_on_day(day)))
    .collect()
}

/// Scenario selection as requested by a caller or last applied.
///
/// Absent fields leave the corresponding setting unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub electricity_price: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_period: Option<String>,
}

impl ScenarioSpec {
    pub fn with_price(mut self, price: ElectricityPrice) -> Self {
        self.electricity_price = Some(price.as_str().to_string());
        self
    }

    pub fn with_time_period(mut self, name: &str) -> Self {
        self.time_period = Some(name.to_string());
        self
    }
}

/// What a scenario change did.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioUpdate {
    /// Price scenario now in effect, if the request set one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub electricity_price: Option<ElectricityPrice>,
    /// Outputs at the start of the period, if the request set one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_period: Option<OutputSnapshot>,
}

/// Resolves scenario names and applies them to a stepper.
#[derive(Debug, Clone)]
pub struct ScenarioManager {
    periods: BTreeMap<String, TimePeriod>,
    price: ElectricityPrice,
    current: ScenarioSpec,
}

impl ScenarioManager {
    pub fn new(periods: BTreeMap<String, TimePeriod>) -> Self {
        Self {
            periods,
            price: ElectricityPrice::default(),
            current: ScenarioSpec::default(),
        }
    }

    /// Price scenario used for cost KPIs and the forecast price alias.
    pub fn price(&self) -> ElectricityPrice {
        self.price
    }

    /// Last applied scenario; fields never set are absent.
    pub fn scenario(&self) -> &ScenarioSpec {
        &self.current
    }

    /// Looks up a time period by name.
    pub fn time_period(&self, name: &str) -> TestbedResult<TimePeriod> {
        self.periods
            .get(name)
            .copied()
            .ok_or_else(|| TestbedError::UnknownScenario {
                field: "time_period",
                value: name.to_string(),
                available: self.periods.keys().cloned().collect::<Vec<_>>().join(", "),
            })
    }

    /// Applies `spec`. Every field is validated before anything changes.
    ///
    /// A time period re-initializes `stepper` at the period start and
    /// bounds its run to the period duration. A price change leaves
    /// simulated time alone.
    ///
    /// # Errors
    ///
    /// * `UnknownScenario` for an unknown price or time period name.
    /// * Any error of [`Stepper::initialize`] for the selected period.
    pub fn set_scenario(
        &mut self,
        spec: &ScenarioSpec,
        stepper: &mut Stepper,
    ) -> TestbedResult<ScenarioUpdate> {
        let price = spec
            .electricity_price
            .as_deref()
            .map(ElectricityPrice::from_str)
            .transpose()?;
        let period = spec
            .time_period
            .as_deref()
            .map(|name| self.time_period(name).map(|p| (name, p)))
            .transpose()?;

        let snapshot = match period {
            Some((name, p)) => {
                let snapshot = stepper.initialize_bounded(p.start_time, p.warmup_period, p.duration)?;
                info!(
                    time_period = name,
                    start_time = p.start_time,
                    duration = p.duration,
                    "time period scenario applied"
                );
                self.current.time_period = Some(name.to_string());
                Some(snapshot)
            }
            None => None,
        };
        if let Some(price) = price {
            self.price = price;
            self.current.electricity_price = Some(price.as_str().to_string());
            info!(electricity_price = %price, "electricity price scenario applied");
        }

        Ok(ScenarioUpdate {
            electricity_price: price,
            time_period: snapshot,
        })
    }
}

impl Default for ScenarioManager {
    fn default() -> Self {
        Self::new(default_time_periods())
    }
}
