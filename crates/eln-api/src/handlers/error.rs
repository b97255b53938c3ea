//! API Error Types
//!
//! Maps the domain error taxonomy (`eln_domain::ElnError`) onto HTTP status
//! codes. One place, per spec §7: every handler propagates `ElnError` via
//! `?` and this is the only spot that turns it into a response.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use eln_domain::errors::ElnError;
use serde::Serialize;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug)]
pub struct ApiError(pub ElnError);

impl From<ElnError> for ApiError {
    fn from(e: ElnError) -> Self {
        ApiError(e)
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: u16,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            ElnError::Unauthenticated => (StatusCode::UNAUTHORIZED, self.0.to_string()),
            ElnError::Forbidden { .. } => (StatusCode::FORBIDDEN, self.0.to_string()),
            ElnError::NotFound { .. } => (StatusCode::NOT_FOUND, self.0.to_string()),
            ElnError::Conflict { .. } => (StatusCode::CONFLICT, self.0.to_string()),
            ElnError::Invalid { .. } => (StatusCode::UNPROCESSABLE_ENTITY, self.0.to_string()),
            ElnError::TooLarge { .. } => (StatusCode::PAYLOAD_TOO_LARGE, self.0.to_string()),
            ElnError::ForbiddenType { .. } => (StatusCode::UNSUPPORTED_MEDIA_TYPE, self.0.to_string()),
            ElnError::PartialFailure { .. } => (StatusCode::OK, self.0.to_string()),
            ElnError::ProviderUnreachable { .. } => (StatusCode::BAD_GATEWAY, self.0.to_string()),
            ElnError::Io { .. } => {
                tracing::error!(error = %self.0, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };

        let body = ErrorResponse {
            error: message,
            code: status.as_u16(),
        };

        (status, Json(body)).into_response()
    }
}
