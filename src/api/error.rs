use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

use crate::error::TestbedError;

use super::types::ErrorResponse;

/// Failure of a request handler.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Testbed(#[from] TestbedError),
    /// Request body that could not be decoded.
    #[error("malformed request: {0}")]
    BadRequest(String),
    /// The blocking worker running the request failed.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Testbed(e) => match e {
                TestbedError::InvalidTimeRange { .. }
                | TestbedError::InvalidStep { .. }
                | TestbedError::InvalidParameters { .. }
                | TestbedError::ForecastOutOfRange { .. } => StatusCode::BAD_REQUEST,
                TestbedError::UnknownPoint { .. } | TestbedError::UnknownScenario { .. } => {
                    StatusCode::NOT_FOUND
                }
                TestbedError::NotInitialized => StatusCode::CONFLICT,
                TestbedError::SimulationDiverged { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Testbed(e) => e.kind(),
            Self::BadRequest(_) => "BadRequest",
            Self::Internal(_) => "Internal",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        let body = ErrorResponse {
            error: self.to_string(),
            kind: self.kind().to_string(),
        };
        (status, Json(body)).into_response()
    }
}
