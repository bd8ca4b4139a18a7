use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};

use crate::ledger::LedgerError;
use crate::models::ApiResponse;

pub const UPSTREAM_UNAVAILABLE: &str = "Failed to connect to ledger API";
pub const UPSTREAM_UNEXPECTED: &str = "Unexpected response from ledger API";

/// Every failure a route can answer with. Rendered as `{ success: false, error }`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Unprocessable(String),
    /// The ledger answered, but with a non-success status.
    #[error("{message}")]
    Upstream { status: StatusCode, message: String },
    #[error("{}", UPSTREAM_UNAVAILABLE)]
    Unavailable,
    #[error("{}", UPSTREAM_UNEXPECTED)]
    UnexpectedResponse,
    #[error("Internal server error")]
    Internal,
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        ApiError::NotFound(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        ApiError::Validation(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Upstream { status, .. } => *status,
            ApiError::Unavailable | ApiError::UnexpectedResponse | ApiError::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Unavailable(_) => ApiError::Unavailable,
            LedgerError::Decode(_) => ApiError::UnexpectedResponse,
            LedgerError::Status { status, message } => ApiError::Upstream {
                status: StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
                message,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::warn!("Request rejected ({}): {}", status.as_u16(), self);
        }
        (status, Json(ApiResponse::failure(self.to_string()))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_ledger_errors_to_statuses() {
        let e: ApiError = LedgerError::Unavailable("connection refused".into()).into();
        assert_eq!(e.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(e.to_string(), UPSTREAM_UNAVAILABLE);

        let e: ApiError = LedgerError::Status {
            status: 403,
            message: "Forbidden".into(),
        }
        .into();
        assert_eq!(e.status(), StatusCode::FORBIDDEN);
        assert_eq!(e.to_string(), "Forbidden");

        assert_eq!(
            ApiError::validation("Insufficient balance").status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[tokio::test]
    async fn renders_failure_envelope() {
        let response = ApiError::not_found("User not found").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json, serde_json::json!({"success": false, "error": "User not found"}));
    }
}
