//! Transport mapping for `AuthError`.
//!
//! Service errors become a status code plus a machine-readable body. Internal
//! detail never crosses the boundary: it is logged here and replaced with a
//! generic message.

use axum::{
    http::{header::RETRY_AFTER, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;
use utoipa::ToSchema;

use crate::auth::AuthError;

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

/// Wrapper so handlers can `?` service errors straight into responses.
#[derive(Debug)]
pub struct ApiError(pub AuthError);

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            AuthError::Unauthorized => {
                (StatusCode::UNAUTHORIZED, "Invalid credentials".to_string())
            }
            AuthError::BadRequest(message) => (StatusCode::BAD_REQUEST, (*message).to_string()),
            AuthError::RateLimited { .. } => {
                (StatusCode::TOO_MANY_REQUESTS, "Rate limited".to_string())
            }
            AuthError::NotFound => (StatusCode::NOT_FOUND, "Not found".to_string()),
            AuthError::Internal(err) => {
                error!("auth internal error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal error".to_string(),
                )
            }
        };

        let body = ErrorBody {
            error: self.0.code(),
            message,
        };
        let mut response = (status, Json(body)).into_response();
        if let AuthError::RateLimited {
            retry_after_seconds,
        } = self.0
        {
            if let Ok(value) = HeaderValue::from_str(&retry_after_seconds.to_string()) {
                response.headers_mut().insert(RETRY_AFTER, value);
            }
        }
        response
    }
}
