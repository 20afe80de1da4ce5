//! Boundary-condition forecasts aligned to the current simulated time.
//!
//! A forecast is a [`ForecastWindow`]: a finite, restartable sequence of
//! samples at `t, t + interval, ...` up to `t + horizon`. Samples are
//! produced lazily from shared [`BoundaryData`], so a window can be read
//! after the testbed lock that produced it has been released.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::boundary::BoundaryData;
use crate::error::{TestbedError, TestbedResult};
use crate::scenario::ElectricityPrice;

/// Alias series carrying the price of the active electricity scenario.
pub const ACTIVE_PRICE_SERIES: &str = "PriceElectricPower";

/// Relative slack, in intervals, for a horizon that is a multiple of the
/// interval up to rounding.
const TIME_TOLERANCE: f64 = 1e-9;

/// Default forecast horizon and sampling interval (s).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ForecastParameters {
    pub horizon: f64,
    pub interval: f64,
}

impl Default for ForecastParameters {
    fn default() -> Self {
        Self {
            horizon: 86_400.0,
            interval: 3_600.0,
        }
    }
}

impl ForecastParameters {
    /// # Errors
    ///
    /// `InvalidParameters` if `horizon < 0`, `interval <= 0` or either is
    /// not finite.
    pub fn new(horizon: f64, interval: f64) -> TestbedResult<Self> {
        if !horizon.is_finite() || horizon < 0.0 {
            return Err(TestbedError::invalid_parameters(format!(
                "forecast horizon {horizon} must be a finite value >= 0"
            )));
        }
        if !interval.is_finite() || interval <= 0.0 {
            return Err(TestbedError::invalid_parameters(format!(
                "forecast interval {interval} must be a finite value > 0"
            )));
        }
        Ok(Self { horizon, interval })
    }
}

/// Forecast defaults and the per-window sample limit, as read from the
/// `[forecast]` config section.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ForecastSettings {
    pub horizon: f64,
    pub interval: f64,
    /// Largest number of samples one window may hold.
    pub max_samples: usize,
}

impl Default for ForecastSettings {
    fn default() -> Self {
        let ForecastParameters { horizon, interval } = ForecastParameters::default();
        Self {
            horizon,
            interval,
            max_samples: 10_000,
        }
    }
}

impl ForecastSettings {
    pub fn parameters(&self) -> TestbedResult<ForecastParameters> {
        ForecastParameters::new(self.horizon, self.interval)
    }
}

/// Boundary values of every series at one future time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastSample {
    pub time: f64,
    pub values: BTreeMap<String, f64>,
}

/// Serves forecast windows from shared boundary data.
#[derive(Debug, Clone)]
pub struct ForecastProvider {
    boundary: Arc<BoundaryData>,
    parameters: ForecastParameters,
    max_samples: usize,
}

impl ForecastProvider {
    /// # Errors
    ///
    /// `InvalidParameters` for invalid default parameters or a zero
    /// sample limit.
    pub fn new(boundary: Arc<BoundaryData>, settings: ForecastSettings) -> TestbedResult<Self> {
        let parameters = settings.parameters()?;
        if settings.max_samples == 0 {
            return Err(TestbedError::invalid_parameters("forecast max_samples must be >= 1"));
        }
        Ok(Self {
            boundary,
            parameters,
            max_samples: settings.max_samples,
        })
    }

    pub fn parameters(&self) -> ForecastParameters {
        self.parameters
    }

    /// Replaces the default horizon and interval.
    pub fn set_parameters(&mut self, horizon: f64, interval: f64) -> TestbedResult<ForecastParameters> {
        self.parameters = ForecastParameters::new(horizon, interval)?;
        Ok(self.parameters)
    }

    /// Forecast window starting at `time`.
    ///
    /// Missing `horizon`/`interval` fall back to the stored defaults.
    ///
    /// # Errors
    ///
    /// * `InvalidParameters` for a negative horizon, a non-positive
    ///   interval, or a window holding more than `max_samples` samples.
    /// * `ForecastOutOfRange` if `[time, time + horizon]` is not covered
    ///   by the boundary data.
    pub fn window(
        &self,
        time: f64,
        price: ElectricityPrice,
        horizon: Option<f64>,
        interval: Option<f64>,
    ) -> TestbedResult<ForecastWindow> {
        let params = ForecastParameters::new(
            horizon.unwrap_or(self.parameters.horizon),
            interval.unwrap_or(self.parameters.interval),
        )?;
        let len = sample_count(params, self.max_samples)?;
        let end = time + params.horizon;
        let (available_start, available_end) = self.boundary.span().unwrap_or((0.0, 0.0));
        if self.boundary.span().is_none() || time < available_start || end > available_end {
            return Err(TestbedError::ForecastOutOfRange {
                start: time,
                end,
                available_start,
                available_end,
            });
        }
        Ok(ForecastWindow {
            boundary: Arc::clone(&self.boundary),
            start: time,
            parameters: params,
            len,
            price,
        })
    }
}

/// Samples at `k * interval` for every `k` with `k * interval <= horizon`,
/// tolerating rounding of the last multiple.
fn sample_count(params: ForecastParameters, max_samples: usize) -> TestbedResult<usize> {
    let ForecastParameters { horizon, interval } = params;
    let mut steps = (horizon / interval).floor();
    if (steps + 1.0) * interval <= horizon + TIME_TOLERANCE * interval {
        steps += 1.0;
    }
    // NaN and infinite step counts fail this comparison too.
    if !(steps < max_samples as f64) {
        return Err(TestbedError::invalid_parameters(format!(
            "forecast of horizon {horizon} at interval {interval} exceeds {max_samples} samples"
        )));
    }
    Ok(steps as usize + 1)
}

/// A forecast window; iterate it as many times as needed.
#[derive(Debug, Clone)]
pub struct ForecastWindow {
    boundary: Arc<BoundaryData>,
    start: f64,
    parameters: ForecastParameters,
    len: usize,
    price: ElectricityPrice,
}

impl ForecastWindow {
    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn horizon(&self) -> f64 {
        self.parameters.horizon
    }

    pub fn interval(&self) -> f64 {
        self.parameters.interval
    }

    /// A fresh iterator from the first sample.
    pub fn iter(&self) -> ForecastIter<'_> {
        ForecastIter {
            window: self,
            next: 0,
            len: self.len,
        }
    }

    fn sample(&self, k: usize) -> ForecastSample {
        // The last sample may round past the horizon; pin it to the end.
        let time = (self.start + k as f64 * self.parameters.interval).min(self.start + self.parameters.horizon);
        let mut values: BTreeMap<String, f64> = self
            .boundary
            .series_names()
            .filter_map(|name| {
                self.boundary
                    .value_at(name, time)
                    .map(|v| (name.to_string(), v))
            })
            .collect();
        if let Some(price) = self.boundary.value_at(self.price.series_name(), time) {
            values.insert(ACTIVE_PRICE_SERIES.to_string(), price);
        }
        ForecastSample { time, values }
    }

    /// Column-oriented form: `time` plus one vector per series.
    pub fn to_columns(&self) -> ForecastColumns {
        let mut columns = ForecastColumns::default();
        for sample in self.iter() {
            columns.time.push(sample.time);
            for (name, v) in sample.values {
                columns.series.entry(name).or_default().push(v);
            }
        }
        columns
    }
}

impl<'a> IntoIterator for &'a ForecastWindow {
    type Item = ForecastSample;
    type IntoIter = ForecastIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Lazy iterator over the samples of a [`ForecastWindow`].
#[derive(Debug, Clone)]
pub struct ForecastIter<'a> {
    window: &'a ForecastWindow,
    next: usize,
    len: usize,
}

impl Iterator for ForecastIter<'_> {
    type Item = ForecastSample;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.len {
            return None;
        }
        let sample = self.window.sample(self.next);
        self.next += 1;
        Some(sample)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let rest = self.len - self.next;
        (rest, Some(rest))
    }
}

impl ExactSizeIterator for ForecastIter<'_> {}

/// Serialized forecast: `{"time": [...], "<series>": [...], ...}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ForecastColumns {
    pub time: Vec<f64>,
    #[serde(flatten)]
    pub series: BTreeMap<String, Vec<f64>>,
}
