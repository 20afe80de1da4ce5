//! Request handlers for the API endpoints.
//!
//! Every handler that takes the testbed lock goes through [`blocking`], so
//! waiting on a long step never stalls the async runtime.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use serde_json::{Value, json};

use crate::adapter::OutputSnapshot;
use crate::error::TestbedResult;
use crate::forecast::{ForecastColumns, ForecastParameters};
use crate::kpi::KpiReport;
use crate::points::PointInfo;
use crate::results::ResultColumns;
use crate::scenario::{ScenarioSpec, ScenarioUpdate};
use crate::sim::{AdvanceOutcome, OverrideRequest};
use crate::testbed::Testbed;

use super::AppState;
use super::error::ApiError;
use super::types::{ForecastParametersBody, ForecastQuery, InitializeBody, ResultsBody, StepBody};

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Runs `f` on the blocking thread pool.
async fn blocking<T, F>(state: Arc<AppState>, f: F) -> ApiResult<T>
where
    T: Send + 'static,
    F: FnOnce(&Testbed) -> TestbedResult<T> + Send + 'static,
{
    let out = tokio::task::spawn_blocking(move || f(&state.testbed))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;
    Ok(Json(out))
}

/// `GET /name` → `{"name": ...}`
pub async fn get_name(State(state): State<Arc<AppState>>) -> ApiResult<Value> {
    blocking(state, |tb| Ok(json!({ "name": tb.name() }))).await
}

/// `GET /version` → `{"version": ...}`
pub async fn get_version(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({ "version": state.testbed.version() }))
}

pub async fn get_inputs(State(state): State<Arc<AppState>>) -> ApiResult<BTreeMap<String, PointInfo>> {
    blocking(state, |tb| Ok(tb.inputs())).await
}

pub async fn get_measurements(
    State(state): State<Arc<AppState>>,
) -> ApiResult<BTreeMap<String, PointInfo>> {
    blocking(state, |tb| Ok(tb.measurements())).await
}

pub async fn get_step(State(state): State<Arc<AppState>>) -> ApiResult<StepBody> {
    blocking(state, |tb| Ok(StepBody { step: tb.step() })).await
}

pub async fn put_step(
    State(state): State<Arc<AppState>>,
    Json(body): Json<StepBody>,
) -> ApiResult<StepBody> {
    blocking(state, move |tb| {
        tb.set_step(body.step)?;
        Ok(body)
    })
    .await
}

/// `PUT /initialize` → outputs at the start time.
pub async fn put_initialize(
    State(state): State<Arc<AppState>>,
    Json(body): Json<InitializeBody>,
) -> ApiResult<OutputSnapshot> {
    blocking(state, move |tb| tb.initialize(body.start_time, body.warmup_period)).await
}

/// `POST /advance` with an optional override body.
///
/// Returns the outputs at the new time, or `{}` once the scenario time
/// period is complete.
pub async fn post_advance(State(state): State<Arc<AppState>>, body: Bytes) -> ApiResult<OutputSnapshot> {
    let request: OverrideRequest = if body.iter().all(u8::is_ascii_whitespace) {
        OverrideRequest::new()
    } else {
        serde_json::from_slice(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?
    };
    blocking(state, move |tb| {
        Ok(match tb.advance(&request)? {
            AdvanceOutcome::Stepped(snapshot) => snapshot,
            AdvanceOutcome::Completed => OutputSnapshot::new(),
        })
    })
    .await
}

/// `PUT /results` → `{"time": [...], "<point>": [...]}`
pub async fn put_results(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ResultsBody>,
) -> ApiResult<ResultColumns> {
    blocking(state, move |tb| {
        let points: Vec<&str> = body.point_names.iter().map(String::as_str).collect();
        tb.results(
            &points,
            body.start_time.unwrap_or(f64::NEG_INFINITY),
            body.final_time.unwrap_or(f64::INFINITY),
        )
    })
    .await
}

pub async fn get_kpi(State(state): State<Arc<AppState>>) -> ApiResult<KpiReport> {
    blocking(state, |tb| Ok(tb.kpis())).await
}

/// `GET /forecast?horizon=..&interval=..`
///
/// The window is pivoted into columns on the blocking pool as well.
pub async fn get_forecast(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ForecastQuery>,
) -> ApiResult<ForecastColumns> {
    blocking(state, move |tb| {
        Ok(tb.forecast(query.horizon, query.interval)?.to_columns())
    })
    .await
}

pub async fn get_forecast_parameters(
    State(state): State<Arc<AppState>>,
) -> ApiResult<ForecastParameters> {
    blocking(state, |tb| Ok(tb.forecast_parameters())).await
}

pub async fn put_forecast_parameters(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ForecastParametersBody>,
) -> ApiResult<ForecastParameters> {
    blocking(state, move |tb| tb.set_forecast_parameters(body.horizon, body.interval)).await
}

pub async fn get_scenario(State(state): State<Arc<AppState>>) -> ApiResult<ScenarioSpec> {
    blocking(state, |tb| Ok(tb.scenario())).await
}

/// `PUT /scenario`; a time period re-initializes the run.
pub async fn put_scenario(
    State(state): State<Arc<AppState>>,
    Json(spec): Json<ScenarioSpec>,
) -> ApiResult<ScenarioUpdate> {
    blocking(state, move |tb| tb.set_scenario(&spec)).await
}

pub async fn put_reset(State(state): State<Arc<AppState>>) -> Result<StatusCode, ApiError> {
    blocking(state, |tb| {
        tb.reset();
        Ok(())
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}
