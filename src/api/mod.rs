//! HTTP transport mapping one route to each testbed verb.
//!
//! - `GET /name`, `GET /version`, `GET /inputs`, `GET /measurements`
//! - `GET|PUT /step`, `PUT /initialize`, `POST /advance`, `PUT /reset`
//! - `PUT /results`, `GET /kpi`
//! - `GET /forecast`, `GET|PUT /forecast_parameters`
//! - `GET|PUT /scenario`

mod error;
mod handlers;
mod types;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use tracing::info;

use crate::testbed::Testbed;

pub use error::ApiError;
pub use types::{
    ErrorResponse, ForecastParametersBody, ForecastQuery, InitializeBody, ResultsBody, StepBody,
};

/// Application state shared across all request handlers.
///
/// The testbed does its own locking, so handlers only need an `Arc`.
pub struct AppState {
    pub testbed: Testbed,
}

impl AppState {
    pub fn new(testbed: Testbed) -> Arc<Self> {
        Arc::new(Self { testbed })
    }
}

/// Builds the axum router with all API routes.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/name", get(handlers::get_name))
        .route("/version", get(handlers::get_version))
        .route("/inputs", get(handlers::get_inputs))
        .route("/measurements", get(handlers::get_measurements))
        .route("/step", get(handlers::get_step).put(handlers::put_step))
        .route("/initialize", put(handlers::put_initialize))
        .route("/advance", post(handlers::post_advance))
        .route("/results", put(handlers::put_results))
        .route("/kpi", get(handlers::get_kpi))
        .route("/forecast", get(handlers::get_forecast))
        .route(
            "/forecast_parameters",
            get(handlers::get_forecast_parameters).put(handlers::put_forecast_parameters),
        )
        .route("/scenario", get(handlers::get_scenario).put(handlers::put_scenario))
        .route("/reset", put(handlers::put_reset))
        .with_state(state)
}

/// Binds to the given address and serves the API until the server fails.
///
/// # Errors
///
/// Returns an `io::Error` if the listener cannot bind or the server stops
/// with an error.
pub async fn serve(state: Arc<AppState>, addr: SocketAddr) -> std::io::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "API server listening");
    axum::serve(listener, app).await
}
