//! Per-step override resolution.
//!
//! A caller asks for overrides with an [`OverrideRequest`]. The stepper
//! validates it against the point catalog and turns it into an
//! [`OverrideMap`] holding one [`Override`] per input: either an active
//! value or a pass-through to the model's embedded control.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{TestbedError, TestbedResult};
use crate::points::PointCatalog;

const VALUE_SUFFIX: &str = "_u";
const ACTIVATE_SUFFIX: &str = "_activate";

/// Resolved control source for one input during one step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Override {
    /// Force the input to this value.
    Active(f64),
    /// Use the model's embedded control signal.
    PassThrough,
}

/// What to do with an active override outside the input's declared bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverridePolicy {
    /// Saturate to the nearest bound and log a warning.
    #[default]
    Clamp,
    /// Fail the advance with `InvalidParameters`.
    Reject,
}

/// One requested override as supplied by the caller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverrideEntry {
    pub value: Option<f64>,
    pub activate: bool,
}

/// Overrides requested for the next step, keyed by input point name.
///
/// Deserializes from either the flat form
/// `{"oveX_u": 1.0, "oveX_activate": 1}` or the structured form
/// `{"oveX_u": {"value": 1.0, "activate": 1}}`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(try_from = "Map<String, Value>")]
pub struct OverrideRequest {
    entries: BTreeMap<String, OverrideEntry>,
}

impl OverrideRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests an active override of `point` to `value`.
    pub fn activate(mut self, point: &str, value: f64) -> Self {
        self.entries.insert(
            point.to_string(),
            OverrideEntry {
                value: Some(value),
                activate: true,
            },
        );
        self
    }

    /// Supplies a value for `point` while leaving it inactive.
    pub fn inactive(mut self, point: &str, value: f64) -> Self {
        self.entries.insert(
            point.to_string(),
            OverrideEntry {
                value: Some(value),
                activate: false,
            },
        );
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &OverrideEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    fn entry(&mut self, point: &str) -> &mut OverrideEntry {
        self.entries
            .entry(point.to_string())
            .or_insert(OverrideEntry {
                value: None,
                activate: false,
            })
    }
}

impl TryFrom<Map<String, Value>> for OverrideRequest {
    type Error = TestbedError;

    fn try_from(map: Map<String, Value>) -> Result<Self, Self::Error> {
        let mut request = Self::new();
        for (key, value) in map {
            if let Value::Object(fields) = &value {
                let entry = request.entry(&key);
                entry.value = fields.get("value").map(|v| number(&key, v)).transpose()?;
                entry.activate = fields
                    .get("activate")
                    .map(|v| flag(&key, v))
                    .transpose()?
                    .unwrap_or(false);
            } else if let Some(base) = key.strip_suffix(ACTIVATE_SUFFIX) {
                let point = format!("{base}{VALUE_SUFFIX}");
                request.entry(&point).activate = flag(&key, &value)?;
            } else {
                request.entry(&key).value = Some(number(&key, &value)?);
            }
        }
        Ok(request)
    }
}

fn number(key: &str, value: &Value) -> TestbedResult<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .ok_or_else(|| TestbedError::invalid_parameters(format!("\"{key}\" must be a number")))
}

fn flag(key: &str, value: &Value) -> TestbedResult<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        _ => match number(key, value)? {
            v if v == 0.0 => Ok(false),
            v if v == 1.0 => Ok(true),
            _ => Err(TestbedError::invalid_parameters(format!(
                "\"{key}\" must be 0 or 1"
            ))),
        },
    }
}

/// Resolved overrides for one step. Inputs without an entry pass through.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverrideMap {
    entries: BTreeMap<String, Override>,
}

impl OverrideMap {
    /// A map with every input passing through to native control.
    pub fn pass_through() -> Self {
        Self::default()
    }

    /// Validates `request` against `catalog` and resolves it.
    ///
    /// Nothing is mutated on failure.
    ///
    /// # Errors
    ///
    /// * `UnknownPoint` if a name is not an input of the catalog.
    /// * `InvalidParameters` if an active entry has no value, a non-finite
    ///   value, or (under [`OverridePolicy::Reject`]) a value outside the
    ///   declared bounds.
    pub fn resolve(
        request: &OverrideRequest,
        catalog: &PointCatalog,
        policy: OverridePolicy,
    ) -> TestbedResult<Self> {
        let mut entries = BTreeMap::new();
        for (name, entry) in request.iter() {
            let meta = catalog.require_input(name)?;
            if !entry.activate {
                entries.insert(name.to_string(), Override::PassThrough);
                continue;
            }
            let value = entry.value.ok_or_else(|| {
                TestbedError::invalid_parameters(format!("\"{name}\" is activated without a value"))
            })?;
            if !value.is_finite() {
                return Err(TestbedError::invalid_parameters(format!(
                    "\"{name}\" value {value} is not finite"
                )));
            }
            let applied = if meta.in_bounds(value) {
                value
            } else {
                match policy {
                    OverridePolicy::Clamp => {
                        let clamped = meta.clamp(value);
                        warn!(point = name, requested = value, applied = clamped, "override clamped to bounds");
                        clamped
                    }
                    OverridePolicy::Reject => {
                        return Err(TestbedError::invalid_parameters(format!(
                            "\"{name}\" value {value} outside [{}, {}]",
                            meta.min.unwrap_or(f64::NEG_INFINITY),
                            meta.max.unwrap_or(f64::INFINITY)
                        )));
                    }
                }
            };
            entries.insert(name.to_string(), Override::Active(applied));
        }
        Ok(Self { entries })
    }

    /// Control source for `input`; absent entries pass through.
    pub fn get(&self, input: &str) -> Override {
        self.entries
            .get(input)
            .copied()
            .unwrap_or(Override::PassThrough)
    }

    /// Active overrides only.
    pub fn active(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().filter_map(|(k, v)| match v {
            Override::Active(x) => Some((k.as_str(), *x)),
            Override::PassThrough => None,
        })
    }

    pub fn active_count(&self) -> usize {
        self.active().count()
    }
}
