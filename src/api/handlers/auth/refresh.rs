//! Refresh-token rotation endpoint.
//!
//! Bypasses the JWT guard (an expired access token is the normal case) but
//! stays behind the rate limiter. Token resolution order: `bsaas_rt` cookie,
//! legacy cookie, then the JSON body; absence is a 400, never a silent
//! success.

use axum::{
    extract::Extension,
    http::HeaderMap,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

use super::cookies::resolve_refresh_token;
use super::error::ApiError;
use super::login::token_response;
use super::rate_limit::{check_rate_limit, RateLimitAction};
use super::state::AuthState;
use super::types::RefreshRequest;
use super::utils::extract_client_ip;
use crate::auth::{AuthError, AuthService};

#[utoipa::path(
    post,
    path = "/v1/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Rotated token pair set as cookies", body = super::types::LoginResponse),
        (status = 400, description = "No refresh token resolvable", body = super::error::ErrorBody),
        (status = 401, description = "Invalid or reused refresh token", body = super::error::ErrorBody),
        (status = 429, description = "Rate limited", body = super::error::ErrorBody)
    ),
    tag = "auth"
)]
pub async fn refresh(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    service: Extension<Arc<AuthService>>,
    payload: Option<Json<RefreshRequest>>,
) -> Response {
    let client_ip = extract_client_ip(&headers);
    if let Err(err) = check_rate_limit(
        auth_state.rate_limiter(),
        client_ip.as_deref(),
        None,
        RateLimitAction::Refresh,
    ) {
        return ApiError(err).into_response();
    }

    let body_token = payload
        .as_ref()
        .and_then(|request| request.refresh_token.as_deref());
    let Some(token) = resolve_refresh_token(&headers, body_token) else {
        return ApiError(AuthError::BadRequest("missing refresh token")).into_response();
    };

    match service.refresh(&token).await {
        Ok(pair) => token_response(&auth_state, &pair),
        Err(err) => ApiError(err).into_response(),
    }
}
