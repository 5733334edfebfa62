//! Mapping of service errors onto HTTP responses.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use notiflow_core::error::NotiflowError;

/// Error returned by handlers; rendered as `{"detail": "..."}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            detail: detail.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn detail(&self) -> &str {
        &self.detail
    }
}

impl From<NotiflowError> for ApiError {
    fn from(err: NotiflowError) -> Self {
        let status = match &err {
            NotiflowError::Validation(_) => StatusCode::BAD_REQUEST,
            NotiflowError::NotFound(_) => StatusCode::NOT_FOUND,
            NotiflowError::Initialization(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!("Request failed: {err}");
        }
        let detail = match err {
            NotiflowError::Validation(msg) => msg,
            other => other.to_string(),
        };
        Self { status, detail }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(serde_json::json!({ "detail": self.detail }))).into_response()
    }
}
