//! TOTP enrollment endpoints.
//!
//! Enrollment stages a secret (`verified = false`); only a confirmed first
//! code flips it to verified, and only a verified credential gates login.

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
use super::types::{SuccessResponse, TotpEnrollFinishRequest, TotpEnrollStartResponse};
use crate::auth::{AuthError, AuthService};

#[utoipa::path(
    post,
    path = "/v1/auth/totp/enroll/start",
    responses(
        (status = 200, description = "Enrollment secret staged", body = TotpEnrollStartResponse),
        (status = 400, description = "Already enrolled", body = super::error::ErrorBody),
        (status = 401, description = "Not authenticated", body = super::error::ErrorBody)
    ),
    tag = "auth"
)]
pub async fn enroll_start(
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

    match service.totp_enroll_start(principal.user_id).await {
        Ok(enrollment) => (
            StatusCode::OK,
            Json(TotpEnrollStartResponse {
                secret: enrollment.secret_base32,
                otpauth_url: enrollment.otpauth_url,
            }),
        )
            .into_response(),
        Err(err) => ApiError(err).into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/totp/enroll/finish",
    request_body = TotpEnrollFinishRequest,
    responses(
        (status = 200, description = "Credential verified; MFA now gates login", body = SuccessResponse),
        (status = 401, description = "Bad code or no staged credential", body = super::error::ErrorBody)
    ),
    tag = "auth"
)]
pub async fn enroll_finish(
    headers: HeaderMap,
    service: Extension<Arc<AuthService>>,
    payload: Option<Json<TotpEnrollFinishRequest>>,
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

    match service
        .totp_enroll_confirm(principal.user_id, request.totp_code.trim())
        .await
    {
        Ok(()) => (StatusCode::OK, Json(SuccessResponse { success: true })).into_response(),
        Err(err) => ApiError(err).into_response(),
    }
}
