//! JSON error responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::{error, warn};

use crate::error::{ErrorKind, PortalError};

/// Portal error rendered as `{ error, kind, field? }`
#[derive(Debug)]
pub struct ApiError(pub PortalError);

impl From<PortalError> for ApiError {
    fn from(err: PortalError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
            ErrorKind::Authorization => StatusCode::FORBIDDEN,
            ErrorKind::StateConflict => StatusCode::CONFLICT,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::ExternalService if self.0.is_retryable() => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::ExternalService => StatusCode::BAD_GATEWAY,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let kind = self.0.kind();

        let body = match &self.0 {
            PortalError::Validation(v) => json!({
                "error": v.message,
                "kind": kind.to_string(),
                "field": v.field,
            }),
            PortalError::Storage(e) => {
                error!(error = ?e, "Storage failure");
                json!({ "error": "Internal server error", "kind": kind.to_string() })
            }
            PortalError::External(e) => {
                warn!(service = e.service, retryable = e.retryable, "{}", e.message);
                json!({
                    "error": self.0.to_string(),
                    "kind": kind.to_string(),
                    "retryable": e.retryable,
                })
            }
            other => json!({ "error": other.to_string(), "kind": kind.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
