//! Recovery-code endpoints.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

use super::csrf::require_csrf;
use super::error::ApiError;
use super::principal::require_auth;
use super::rate_limit::{check_rate_limit, RateLimitAction};
use super::state::AuthState;
use super::types::{RecoveryVerifyRequest, SuccessResponse};
use super::utils::extract_client_ip;
use crate::auth::{AuthError, AuthService};

#[utoipa::path(
    post,
    path = "/v1/auth/recovery/generate",
    responses(
        (status = 200, description = "Fresh plaintext batch; previous batch is dead", body = [String]),
        (status = 401, description = "Not authenticated", body = super::error::ErrorBody)
    ),
    tag = "auth"
)]
pub async fn generate(
    headers: HeaderMap,
    service: Extension<Arc<AuthService>>,
) -> Response {
    let principal = match require_auth(&headers, service.tokens()) {
        Ok(principal) => principal,
        Err(err) => return ApiError(err).into_response(),
    };
    if let Err(err) = require_csrf(&headers) {
        return ApiError(err).into_response();
    }

    match service.generate_recovery_codes(principal.user_id, None).await {
        Ok(codes) => (StatusCode::OK, Json(codes)).into_response(),
        Err(err) => ApiError(err).into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/recovery/verify",
    request_body = RecoveryVerifyRequest,
    responses(
        (status = 200, description = "Code accepted and consumed", body = SuccessResponse),
        (status = 401, description = "Invalid or already-used code", body = super::error::ErrorBody),
        (status = 429, description = "Rate limited", body = super::error::ErrorBody)
    ),
    tag = "auth"
)]
pub async fn verify(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    service: Extension<Arc<AuthService>>,
    payload: Option<Json<RecoveryVerifyRequest>>,
) -> Response {
    let principal = match require_auth(&headers, service.tokens()) {
        Ok(principal) => principal,
        Err(err) => return ApiError(err).into_response(),
    };
    if let Err(err) = require_csrf(&headers) {
        return ApiError(err).into_response();
    }
    let Some(Json(request)) = payload else {
        return ApiError(AuthError::BadRequest("missing payload")).into_response();
    };

    let client_ip = extract_client_ip(&headers);
    if let Err(err) = check_rate_limit(
        auth_state.rate_limiter(),
        client_ip.as_deref(),
        None,
        RateLimitAction::Recovery,
    ) {
        return ApiError(err).into_response();
    }

    // The port reports false instead of throwing; the controller translates.
    match service
        .verify_recovery_code(principal.user_id, request.code.trim())
        .await
    {
        Ok(true) => (StatusCode::OK, Json(SuccessResponse { success: true })).into_response(),
        Ok(false) => ApiError(AuthError::Unauthorized).into_response(),
        Err(err) => ApiError(err).into_response(),
    }
}
