//! Append-only, time-indexed store of step results.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::{TestbedError, TestbedResult};
use crate::points::PointCatalog;

/// Values of every recorded point at the end of one communication step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRecord {
    /// Simulated time at the end of the step (s).
    pub time: f64,
    /// Point name to value.
    pub values: BTreeMap<String, f64>,
}

impl ResultRecord {
    pub fn new(time: f64, values: BTreeMap<String, f64>) -> Self {
        Self { time, values }
    }

    pub fn get(&self, point: &str) -> Option<f64> {
        self.values.get(point).copied()
    }

    /// Copy of this record restricted to `points`.
    fn project(&self, points: &[&str]) -> Self {
        Self {
            time: self.time,
            values: points
                .iter()
                .filter_map(|p| self.values.get(*p).map(|v| ((*p).to_string(), *v)))
                .collect(),
        }
    }
}

/// Column-oriented view of a query: one `time` vector plus one vector per
/// point, all of equal length.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultColumns {
    pub time: Vec<f64>,
    #[serde(flatten)]
    pub points: BTreeMap<String, Vec<f64>>,
}

impl ResultColumns {
    /// Pivots records into columns for the requested points.
    pub fn from_records(records: &[ResultRecord], points: &[&str]) -> Self {
        let mut columns = Self {
            time: Vec::with_capacity(records.len()),
            points: points
                .iter()
                .map(|p| ((*p).to_string(), Vec::with_capacity(records.len())))
                .collect(),
        };
        for r in records {
            columns.time.push(r.time);
            for (name, col) in &mut columns.points {
                col.push(r.get(name).unwrap_or(f64::NAN));
            }
        }
        columns
    }
}

/// Record buffer in strictly increasing time order.
#[derive(Debug, Clone, Default)]
pub struct ResultsStore {
    records: Vec<ResultRecord>,
}

impl ResultsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record. Callers guarantee that `record.time` is later
    /// than every stored record.
    pub(crate) fn append(&mut self, record: ResultRecord) {
        debug_assert!(
            self.records.last().is_none_or(|last| record.time > last.time),
            "result records must be strictly increasing in time"
        );
        self.records.push(record);
    }

    pub(crate) fn clear(&mut self) {
        self.records.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn last(&self) -> Option<&ResultRecord> {
        self.records.last()
    }

    /// Every stored record, oldest first.
    pub fn records(&self) -> &[ResultRecord] {
        &self.records
    }

    /// Records with `start_time <= time <= final_time`, projected to
    /// `points`.
    ///
    /// # Errors
    ///
    /// * `UnknownPoint` if any name is not in `catalog`.
    /// * `InvalidParameters` if a bound is NaN or `start_time > final_time`.
    pub fn query(
        &self,
        catalog: &PointCatalog,
        points: &[&str],
        start_time: f64,
        final_time: f64,
    ) -> TestbedResult<Vec<ResultRecord>> {
        for p in points {
            catalog.require(p)?;
        }
        if start_time.is_nan() || final_time.is_nan() {
            return Err(TestbedError::invalid_parameters(
                "query bounds must not be NaN",
            ));
        }
        if start_time > final_time {
            return Err(TestbedError::invalid_parameters(format!(
                "start_time {start_time} is after final_time {final_time}"
            )));
        }
        let lo = self.records.partition_point(|r| r.time < start_time);
        let hi = self.records.partition_point(|r| r.time <= final_time);
        Ok(self.records[lo..hi.max(lo)]
            .iter()
            .map(|r| r.project(points))
            .collect())
    }
}
