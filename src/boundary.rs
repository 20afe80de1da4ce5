//! Precomputed boundary-condition series (weather, schedules, prices).
//!
//! Lookups use the nearest preceding sample: a value holds from its
//! timestamp until the next one. No extrapolation is done past the last
//! sample of a series.

use std::collections::BTreeMap;
use std::f64::consts::PI;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

use crate::scenario::ElectricityPrice;

/// Outdoor dry-bulb temperature (K).
pub const OUTDOOR_TEMPERATURE: &str = "TDryBul";
/// Global horizontal irradiation (W/m2).
pub const GLOBAL_HORIZONTAL_IRRADIATION: &str = "HGloHor";
/// Electricity emission factor (kgCO2/kWh).
pub const ELECTRICITY_EMISSIONS: &str = "EmissionsElectricPower";

/// Occupant count schedule for a zone.
pub fn occupancy_series(zone: &str) -> String {
    format!("Occupancy[{zone}]")
}

/// Lower comfort bound for a zone (K).
pub fn lower_setpoint_series(zone: &str) -> String {
    format!("LowerSetp[{zone}]")
}

/// Upper comfort bound for a zone (K).
pub fn upper_setpoint_series(zone: &str) -> String {
    format!("UpperSetp[{zone}]")
}

/// Upper CO2 bound for a zone (ppm).
pub fn upper_co2_series(zone: &str) -> String {
    format!("UpperCO2[{zone}]")
}

/// Failure while building or loading boundary data.
#[derive(Debug, Error)]
pub enum BoundaryError {
    #[error("cannot read boundary data: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed boundary CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("boundary CSV has no `time` column")]
    MissingTimeColumn,

    #[error("boundary CSV row {row}, column \"{column}\": cannot parse \"{value}\" as a number")]
    Parse {
        row: usize,
        column: String,
        value: String,
    },

    #[error("series \"{series}\" is empty")]
    Empty { series: String },

    #[error("series \"{series}\" timestamps must be strictly increasing (row {row})")]
    NotMonotonic { series: String, row: usize },

    #[error("series \"{series}\" has {times} timestamps but {values} values")]
    LengthMismatch {
        series: String,
        times: usize,
        values: usize,
    },
}

/// One time-indexed series with strictly increasing timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    times: Vec<f64>,
    values: Vec<f64>,
}

impl Series {
    /// Builds a series from parallel time and value vectors.
    ///
    /// # Errors
    ///
    /// Fails if the vectors differ in length, are empty, or the timestamps
    /// are not strictly increasing.
    pub fn new(name: &str, times: Vec<f64>, values: Vec<f64>) -> Result<Self, BoundaryError> {
        if times.len() != values.len() {
            return Err(BoundaryError::LengthMismatch {
                series: name.to_string(),
                times: times.len(),
                values: values.len(),
            });
        }
        if times.is_empty() {
            return Err(BoundaryError::Empty {
                series: name.to_string(),
            });
        }
        if let Some(row) = times.windows(2).position(|w| !(w[1] > w[0])) {
            return Err(BoundaryError::NotMonotonic {
                series: name.to_string(),
                row: row + 1,
            });
        }
        Ok(Self { times, values })
    }

    /// Value of the nearest sample at or before `time`.
    pub fn value_at(&self, time: f64) -> Option<f64> {
        if time.is_nan() || time > self.end() {
            return None;
        }
        let idx = self.times.partition_point(|&t| t <= time);
        idx.checked_sub(1).map(|i| self.values[i])
    }

    pub fn start(&self) -> f64 {
        self.times[0]
    }

    pub fn end(&self) -> f64 {
        self.times[self.times.len() - 1]
    }
}

/// Named collection of boundary series.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundaryData {
    series: BTreeMap<String, Series>,
}

impl BoundaryData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a series.
    pub fn insert(&mut self, name: impl Into<String>, series: Series) {
        self.series.insert(name.into(), series);
    }

    pub fn get(&self, name: &str) -> Option<&Series> {
        self.series.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.series.contains_key(name)
    }

    /// Nearest-preceding value of `name` at `time`.
    pub fn value_at(&self, name: &str, time: f64) -> Option<f64> {
        self.series.get(name).and_then(|s| s.value_at(time))
    }

    /// Series names in sorted order.
    pub fn series_names(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    /// Time span covered by every series: latest start to earliest end.
    ///
    /// Returns `None` when there is no data or the series do not overlap.
    pub fn span(&self) -> Option<(f64, f64)> {
        let start = self
            .series
            .values()
            .map(Series::start)
            .fold(None, |acc: Option<f64>, t| Some(acc.map_or(t, |a| a.max(t))))?;
        let end = self
            .series
            .values()
            .map(Series::end)
            .fold(f64::INFINITY, f64::min);
        (start <= end).then_some((start, end))
    }

    /// Loads boundary data from CSV: one `time` column in seconds, one
    /// column per series.
    ///
    /// # Errors
    ///
    /// Returns a `BoundaryError` if the file cannot be read or parsed.
    pub fn from_csv_path(path: &Path) -> Result<Self, BoundaryError> {
        let file = File::open(path)?;
        Self::from_csv_reader(file)
    }

    /// Loads boundary data from any CSV reader.
    ///
    /// # Errors
    ///
    /// Returns a `BoundaryError` if the CSV is malformed.
    pub fn from_csv_reader(reader: impl Read) -> Result<Self, BoundaryError> {
        let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let headers = rdr.headers()?.clone();
        let time_col = headers
            .iter()
            .position(|h| h == "time")
            .ok_or(BoundaryError::MissingTimeColumn)?;

        let mut times = Vec::new();
        let mut columns: Vec<Vec<f64>> = vec![Vec::new(); headers.len()];
        for (row, record) in rdr.records().enumerate() {
            let record = record?;
            for (col, field) in record.iter().enumerate() {
                let value = field.parse::<f64>().map_err(|_| BoundaryError::Parse {
                    row: row + 1,
                    column: headers.get(col).unwrap_or_default().to_string(),
                    value: field.to_string(),
                })?;
                if col == time_col {
                    times.push(value);
                } else {
                    columns[col].push(value);
                }
            }
        }

        let mut data = Self::new();
        for (col, name) in headers.iter().enumerate() {
            if col == time_col {
                continue;
            }
            let values = std::mem::take(&mut columns[col]);
            data.insert(name, Series::new(name, times.clone(), values)?);
        }
        Ok(data)
    }

    /// Generates a deterministic year of synthetic boundary data for the
    /// given zones.
    pub fn synthetic(params: &SyntheticBoundary, zones: &[&str]) -> Self {
        let n = (params.span_s / params.sample_s).floor() as usize + 1;
        let times: Vec<f64> = (0..n).map(|i| i as f64 * params.sample_s).collect();
        let mut rng = StdRng::seed_from_u64(params.seed);

        let mut t_out = Vec::with_capacity(n);
        let mut irr = Vec::with_capacity(n);
        let mut occ = Vec::with_capacity(n);
        let mut lower = Vec::with_capacity(n);
        let mut upper = Vec::with_capacity(n);
        let mut co2 = Vec::with_capacity(n);
        let mut constant = Vec::with_capacity(n);
        let mut dynamic = Vec::with_capacity(n);
        let mut highly = Vec::with_capacity(n);
        let mut emissions = Vec::with_capacity(n);

        for &t in &times {
            let day = t / 86_400.0;
            let hour = (t % 86_400.0) / 3600.0;
            let weekday = (day.floor() as i64).rem_euclid(7) < 5;
            let occupied = weekday && (7.0..19.0).contains(&hour);

            // Coldest around early January, warmest mid-July; daily low before dawn.
            let seasonal = -((2.0 * PI * (day - 15.0) / 365.0).cos());
            let diurnal = -((2.0 * PI * (hour - 3.0) / 24.0).cos());
            t_out.push(params.mean_outdoor_k + params.seasonal_amp_k * seasonal + params.daily_amp_k * diurnal);

            let sun = ((hour - 6.0) / 12.0 * PI).sin().max(0.0);
            irr.push(params.peak_irradiation * sun * (0.75 - 0.25 * (2.0 * PI * day / 365.0).cos()));

            occ.push(if occupied { params.occupants } else { 0.0 });
            lower.push(if occupied { 294.15 } else { 288.15 });
            upper.push(if occupied { 297.15 } else { 303.15 });
            co2.push(894.0);

            constant.push(0.2535);
            dynamic.push(if (7.0..22.0).contains(&hour) { 0.2666 } else { 0.2301 });
            let spot = 0.05 * ((2.0 * PI * (hour - 8.0) / 24.0).sin() + (2.0 * PI * (hour - 18.0) / 12.0).sin());
            highly.push((0.22 + spot + 0.03 * (rng.random::<f64>() - 0.5)).max(0.0));
            emissions.push(0.1105);
        }

        let mut data = Self::new();
        let mut put = |name: String, values: Vec<f64>| {
            // Lengths and ordering are constructed above; cannot fail.
            if let Ok(series) = Series::new(&name, times.clone(), values) {
                data.insert(name, series);
            }
        };
        put(OUTDOOR_TEMPERATURE.to_string(), t_out);
        put(GLOBAL_HORIZONTAL_IRRADIATION.to_string(), irr);
        put(ELECTRICITY_EMISSIONS.to_string(), emissions);
        put(ElectricityPrice::Constant.series_name().to_string(), constant);
        put(ElectricityPrice::Dynamic.series_name().to_string(), dynamic);
        put(ElectricityPrice::HighlyDynamic.series_name().to_string(), highly);
        for zone in zones {
            put(occupancy_series(zone), occ.clone());
            put(lower_setpoint_series(zone), lower.clone());
            put(upper_setpoint_series(zone), upper.clone());
            put(upper_co2_series(zone), co2.clone());
        }
        data
    }
}

/// Parameters of the synthetic boundary-data generator.
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyntheticBoundary {
    /// Covered span from t=0 (s).
    pub span_s: f64,
    /// Sample spacing (s).
    pub sample_s: f64,
    /// Annual mean outdoor temperature (K).
    pub mean_outdoor_k: f64,
    /// Seasonal swing amplitude (K).
    pub seasonal_amp_k: f64,
    /// Daily swing amplitude (K).
    pub daily_amp_k: f64,
    /// Clear-sky noon irradiation (W/m2).
    pub peak_irradiation: f64,
    /// Occupant count during occupied hours.
    pub occupants: f64,
    /// Seed for the spot-price noise.
    pub seed: u64,
}

impl Default for SyntheticBoundary {
    fn default() -> Self {
        Self {
            span_s: 365.0 * 86_400.0,
            sample_s: 900.0,
            mean_outdoor_k: 283.15,
            seasonal_amp_k: 9.0,
            daily_amp_k: 4.0,
            peak_irradiation: 800.0,
            occupants: 5.0,
            seed: 7,
        }
    }
}
