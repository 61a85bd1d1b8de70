// Error type for the HTTP layer

use crate::dispatch::DispatchError;
use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// Every failure is reported as 500 with a displayable `detail`.
#[derive(Debug)]
pub enum ApiError {
    Dispatch(DispatchError),
    InvalidPayload(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            Self::Dispatch(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
            Self::InvalidPayload(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Invalid request: {}", msg),
            ),
        };

        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        Self::Dispatch(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::InvalidPayload(rejection.body_text())
    }
}
