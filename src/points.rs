//! Static point metadata published by a simulatable unit.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{TestbedError, TestbedResult};

/// Whether a point is read from the model or written to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointKind {
    Measurement,
    Input,
}

/// Category a measurement contributes to when computing KPIs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum KpiTag {
    /// Electric power draw (W).
    ElectricPower,
    /// Natural gas power draw (W).
    GasPower,
    /// District heating power draw (W).
    DistrictHeatingPower,
    /// Operative temperature of a zone (K).
    ZoneTemperature { zone: String },
    /// CO2 concentration of a zone (ppm).
    ZoneCo2 { zone: String },
}

/// Metadata for one named signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointMeta {
    pub name: String,
    pub kind: PointKind,
    pub unit: String,
    pub description: String,
    pub min: Option<f64>,
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kpi: Option<KpiTag>,
}

impl PointMeta {
    /// Creates an input point with declared bounds.
    pub fn input(name: &str, unit: &str, description: &str, min: f64, max: f64) -> Self {
        Self {
            name: name.to_string(),
            kind: PointKind::Input,
            unit: unit.to_string(),
            description: description.to_string(),
            min: Some(min),
            max: Some(max),
            kpi: None,
        }
    }

    /// Creates an unbounded measurement point.
    pub fn measurement(name: &str, unit: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: PointKind::Measurement,
            unit: unit.to_string(),
            description: description.to_string(),
            min: None,
            max: None,
            kpi: None,
        }
    }

    /// Attaches a KPI category.
    pub fn with_kpi(mut self, tag: KpiTag) -> Self {
        self.kpi = Some(tag);
        self
    }

    /// Saturates `value` into the declared bounds.
    pub fn clamp(&self, value: f64) -> f64 {
        let lo = self.min.unwrap_or(f64::NEG_INFINITY);
        let hi = self.max.unwrap_or(f64::INFINITY);
        value.clamp(lo, hi)
    }

    /// Returns `true` when `value` lies within the declared bounds.
    pub fn in_bounds(&self, value: f64) -> bool {
        self.min.is_none_or(|lo| value >= lo) && self.max.is_none_or(|hi| value <= hi)
    }
}

/// Public description of a point, as published to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PointInfo {
    pub unit: String,
    pub description: String,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
}

/// Immutable set of points exposed by a loaded model.
#[derive(Debug, Clone)]
pub struct PointCatalog {
    points: Vec<PointMeta>,
    index: BTreeMap<String, usize>,
}

impl PointCatalog {
    /// Builds a catalog, rejecting duplicate names and inverted bounds.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameters` if two points share a name or a point
    /// declares `min > max`.
    pub fn new(points: Vec<PointMeta>) -> TestbedResult<Self> {
        let mut index = BTreeMap::new();
        for (i, p) in points.iter().enumerate() {
            if let (Some(lo), Some(hi)) = (p.min, p.max) {
                if lo > hi {
                    return Err(TestbedError::invalid_parameters(format!(
                        "point \"{}\" declares min {lo} > max {hi}",
                        p.name
                    )));
                }
            }
            if index.insert(p.name.clone(), i).is_some() {
                return Err(TestbedError::invalid_parameters(format!(
                    "duplicate point \"{}\"",
                    p.name
                )));
            }
        }
        Ok(Self { points, index })
    }

    /// Looks up a point by name.
    pub fn get(&self, name: &str) -> Option<&PointMeta> {
        self.index.get(name).map(|&i| &self.points[i])
    }

    /// Looks up a point by name, failing with `UnknownPoint`.
    pub fn require(&self, name: &str) -> TestbedResult<&PointMeta> {
        self.get(name).ok_or_else(|| TestbedError::UnknownPoint {
            name: name.to_string(),
        })
    }

    /// Looks up an input point by name, failing with `UnknownPoint` for
    /// measurements as well as unknown names.
    pub fn require_input(&self, name: &str) -> TestbedResult<&PointMeta> {
        match self.get(name) {
            Some(p) if p.kind == PointKind::Input => Ok(p),
            _ => Err(TestbedError::UnknownPoint {
                name: name.to_string(),
            }),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// All points in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &PointMeta> {
        self.points.iter()
    }

    /// Published metadata for every point of the given kind, keyed by name.
    pub fn describe(&self, kind: PointKind) -> BTreeMap<String, PointInfo> {
        self.points
            .iter()
            .filter(|p| p.kind == kind)
            .map(|p| {
                (
                    p.name.clone(),
                    PointInfo {
                        unit: p.unit.clone(),
                        description: p.description.clone(),
                        minimum: p.min,
                        maximum: p.max,
                    },
                )
            })
            .collect()
    }
}
