//! Password reset endpoints.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

use super::error::ApiError;
use super::rate_limit::{check_rate_limit, RateLimitAction};
use super::state::AuthState;
use super::types::{ForgotPasswordRequest, ResetPasswordRequest, SuccessResponse};
use super::utils::{extract_client_ip, normalize_email, valid_email};
use crate::auth::{AuthError, AuthService};

const MIN_PASSWORD_LEN: usize = 8;

#[utoipa::path(
    post,
    path = "/v1/auth/password/forgot",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 202, description = "Accepted whether or not the account exists"),
        (status = 400, description = "Validation error", body = super::error::ErrorBody),
        (status = 429, description = "Rate limited", body = super::error::ErrorBody)
    ),
    tag = "auth"
)]
pub async fn forgot_password(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    service: Extension<Arc<AuthService>>,
    payload: Option<Json<ForgotPasswordRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return ApiError(AuthError::BadRequest("missing payload")).into_response();
    };
    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return ApiError(AuthError::BadRequest("invalid email")).into_response();
    }

    let client_ip = extract_client_ip(&headers);
    if let Err(err) = check_rate_limit(
        auth_state.rate_limiter(),
        client_ip.as_deref(),
        Some(&email),
        RateLimitAction::PasswordForgot,
    ) {
        return ApiError(err).into_response();
    }

    // Enumeration-silent: unknown accounts and delivery failures both 202.
    match service.request_password_reset(&email).await {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(err) => ApiError(err).into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/password/reset",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password updated", body = SuccessResponse),
        (status = 400, description = "Validation error", body = super::error::ErrorBody),
        (status = 401, description = "Invalid or expired reset token", body = super::error::ErrorBody)
    ),
    tag = "auth"
)]
pub async fn reset_password(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    service: Extension<Arc<AuthService>>,
    payload: Option<Json<ResetPasswordRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return ApiError(AuthError::BadRequest("missing payload")).into_response();
    };
    let token = request.token.trim();
    if token.is_empty() {
        return ApiError(AuthError::BadRequest("missing token")).into_response();
    }
    if request.new_password.len() < MIN_PASSWORD_LEN {
        return ApiError(AuthError::BadRequest("password too short")).into_response();
    }

    let client_ip = extract_client_ip(&headers);
    if let Err(err) = check_rate_limit(
        auth_state.rate_limiter(),
        client_ip.as_deref(),
        None,
        RateLimitAction::PasswordForgot,
    ) {
        return ApiError(err).into_response();
    }

    match service.reset_password(token, &request.new_password).await {
        Ok(()) => (StatusCode::OK, Json(SuccessResponse { success: true })).into_response(),
        Err(err) => ApiError(err).into_response(),
    }
}
