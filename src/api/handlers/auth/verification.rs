//! Email verification endpoints: request plus the token/OTP confirm pair.

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
use super::types::{EmailVerificationRequest, SuccessResponse, VerifyEmailRequest};
use super::utils::{extract_client_ip, normalize_email, valid_email};
use crate::auth::{AuthError, AuthService};

#[utoipa::path(
    post,
    path = "/v1/auth/email/verify/request",
    request_body = EmailVerificationRequest,
    responses(
        (status = 202, description = "Accepted whether or not the account exists"),
        (status = 400, description = "Validation error", body = super::error::ErrorBody),
        (status = 429, description = "Rate limited", body = super::error::ErrorBody)
    ),
    tag = "auth"
)]
pub async fn request_verification(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    service: Extension<Arc<AuthService>>,
    payload: Option<Json<EmailVerificationRequest>>,
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
        RateLimitAction::VerifyEmail,
    ) {
        return ApiError(err).into_response();
    }

    match service.request_email_verification(&email).await {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(err) => ApiError(err).into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/email/verify/confirm",
    request_body = VerifyEmailRequest,
    responses(
        (status = 200, description = "Email verified", body = SuccessResponse),
        (status = 400, description = "Neither token nor email+otp supplied", body = super::error::ErrorBody),
        (status = 401, description = "Invalid/expired token or code", body = super::error::ErrorBody),
        (status = 429, description = "Rate limited", body = super::error::ErrorBody)
    ),
    tag = "auth"
)]
pub async fn confirm_verification(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    service: Extension<Arc<AuthService>>,
    payload: Option<Json<VerifyEmailRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return ApiError(AuthError::BadRequest("missing payload")).into_response();
    };

    let client_ip = extract_client_ip(&headers);
    if let Err(err) = check_rate_limit(
        auth_state.rate_limiter(),
        client_ip.as_deref(),
        None,
        RateLimitAction::VerifyEmail,
    ) {
        return ApiError(err).into_response();
    }

    // Two accepted shapes: {token} or {email, otp}. Anything else is a 400.
    let result = match (
        request.token.as_deref().map(str::trim),
        request.email.as_deref(),
        request.otp.as_deref().map(str::trim),
    ) {
        (Some(token), _, _) if !token.is_empty() => service.verify_email(token).await,
        (_, Some(email), Some(otp)) if !otp.is_empty() => {
            let email = normalize_email(email);
            if !valid_email(&email) {
                return ApiError(AuthError::BadRequest("invalid email")).into_response();
            }
            if let Err(err) = check_rate_limit(
                auth_state.rate_limiter(),
                None,
                Some(&email),
                RateLimitAction::VerifyEmail,
            ) {
                return ApiError(err).into_response();
            }
            service.verify_email_otp(&email, otp).await
        }
        _ => {
            return ApiError(AuthError::BadRequest("token or email+otp required"))
                .into_response()
        }
    };

    match result {
        Ok(()) => (StatusCode::OK, Json(SuccessResponse { success: true })).into_response(),
        Err(err) => ApiError(err).into_response(),
    }
}
