//! API request and response bodies.

use serde::{Deserialize, Serialize};

/// `PUT /step` body.
#[derive(Debug, Serialize, Deserialize)]
pub struct StepBody {
    /// Communication step (s).
    pub step: f64,
}

/// `PUT /initialize` body.
#[derive(Debug, Deserialize)]
pub struct InitializeBody {
    pub start_time: f64,
    #[serde(default)]
    pub warmup_period: f64,
}

/// `PUT /results` body. Missing bounds leave the range open.
#[derive(Debug, Deserialize)]
pub struct ResultsBody {
    pub point_names: Vec<String>,
    pub start_time: Option<f64>,
    pub final_time: Option<f64>,
}

/// `GET /forecast` query. Missing fields use the stored defaults.
#[derive(Debug, Deserialize)]
pub struct ForecastQuery {
    pub horizon: Option<f64>,
    pub interval: Option<f64>,
}

/// `PUT /forecast_parameters` body.
#[derive(Debug, Deserialize)]
pub struct ForecastParametersBody {
    pub horizon: f64,
    pub interval: f64,
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub error: String,
    /// Stable error kind, e.g. `"UnknownPoint"`.
    pub kind: String,
}
