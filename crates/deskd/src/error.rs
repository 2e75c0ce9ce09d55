//! HTTP mapping for the domain error taxonomy.
//!
//! Every error leaves the daemon as `{"error": {"code", "message",
//! "field"?}}` with a status matching the taxonomy, so clients can
//! distinguish retryable failures (conflict, timeout) from permanent ones.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use desk_common::DeskError;
use serde_json::{json, Value};
use tracing::error;

/// Wrapper carrying a `DeskError` out of a handler
pub struct ApiError(pub DeskError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            DeskError::Validation { .. } => StatusCode::BAD_REQUEST,
            DeskError::Unauthorized => StatusCode::UNAUTHORIZED,
            DeskError::Forbidden(_) => StatusCode::FORBIDDEN,
            DeskError::NotFound(_) => StatusCode::NOT_FOUND,
            DeskError::VersionConflict => StatusCode::CONFLICT,
            DeskError::InvalidAssignee => StatusCode::BAD_REQUEST,
            DeskError::DuplicateRequest => StatusCode::CONFLICT,
            DeskError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            DeskError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            DeskError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<DeskError> for ApiError {
    fn from(err: DeskError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        }
        (status, Json(error_body(&self.0))).into_response()
    }
}

fn error_body(err: &DeskError) -> Value {
    let mut body = json!({
        "error": {
            "code": err.code(),
            "message": err.to_string(),
        }
    });
    if let Some(field) = err.field() {
        body["error"]["field"] = json!(field);
    }
    body
}

/// Error body for responses built outside the `ApiError` path
/// (rate limiting, the 404 fallback)
pub fn raw_error_body(code: &str, message: &str) -> Value {
    json!({
        "error": {
            "code": code,
            "message": message,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError(DeskError::Unauthorized).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiError(DeskError::VersionConflict).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError(DeskError::InvalidAssignee).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError(DeskError::Timeout).status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(
            ApiError(DeskError::DuplicateRequest).status(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_validation_body_carries_field() {
        let err = DeskError::Validation {
            field: "title".into(),
            message: "title must not be empty".into(),
        };
        let body = error_body(&err);
        assert_eq!(body["error"]["code"], "FIELD_VALIDATION");
        assert_eq!(body["error"]["field"], "title");
    }

    #[test]
    fn test_non_validation_body_omits_field() {
        let body = error_body(&DeskError::VersionConflict);
        assert!(body["error"].get("field").is_none());
    }
}
