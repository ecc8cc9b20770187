//! Password and TOTP login endpoints.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::error;

use super::cookies::issue_token_cookies;
use super::csrf::generate_csrf_token;
use super::error::ApiError;
use super::rate_limit::{check_rate_limit, RateLimitAction};
use super::state::AuthState;
use super::types::{LoginRequest, LoginResponse, TotpLoginRequest};
use super::utils::{extract_client_ip, normalize_email, session_meta, valid_email};
use crate::auth::{AuthError, AuthService, SignInOutcome, TokenPair};

/// Build the login success response: cookies plus an empty-ish JSON body.
pub(super) fn token_response(auth_state: &AuthState, pair: &TokenPair) -> Response {
    let csrf_token = match generate_csrf_token() {
        Ok(token) => token,
        Err(err) => {
            error!("Failed to generate csrf token: {err}");
            return ApiError(AuthError::Internal(err)).into_response();
        }
    };
    let mut response_headers = HeaderMap::new();
    if let Err(err) =
        issue_token_cookies(&mut response_headers, auth_state.config(), pair, &csrf_token)
    {
        error!("Failed to build auth cookies: {err}");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    (
        StatusCode::OK,
        response_headers,
        Json(LoginResponse {
            totp_required: false,
            temp_token: None,
        }),
    )
        .into_response()
}

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in, or TOTP challenge issued", body = LoginResponse),
        (status = 400, description = "Validation error", body = super::error::ErrorBody),
        (status = 401, description = "Invalid credentials", body = super::error::ErrorBody),
        (status = 429, description = "Rate limited", body = super::error::ErrorBody)
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    service: Extension<Arc<AuthService>>,
    payload: Option<Json<LoginRequest>>,
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
        RateLimitAction::Login,
    ) {
        return ApiError(err).into_response();
    }

    let meta = session_meta(&headers);
    match service.sign_in(&email, &request.password, &meta).await {
        Ok(SignInOutcome::TotpRequired { temp_token }) => (
            StatusCode::OK,
            Json(LoginResponse {
                totp_required: true,
                temp_token: Some(temp_token),
            }),
        )
            .into_response(),
        Ok(SignInOutcome::Complete(pair)) => token_response(&auth_state, &pair),
        Err(err) => ApiError(err).into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/login/totp",
    request_body = TotpLoginRequest,
    responses(
        (status = 200, description = "Signed in", body = LoginResponse),
        (status = 400, description = "Validation error", body = super::error::ErrorBody),
        (status = 401, description = "Invalid credentials", body = super::error::ErrorBody),
        (status = 429, description = "Rate limited", body = super::error::ErrorBody)
    ),
    tag = "auth"
)]
pub async fn login_totp(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    service: Extension<Arc<AuthService>>,
    payload: Option<Json<TotpLoginRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return ApiError(AuthError::BadRequest("missing payload")).into_response();
    };
    if request.temp_token.trim().is_empty() || request.totp_code.trim().is_empty() {
        return ApiError(AuthError::BadRequest("missing token or code")).into_response();
    }

    let client_ip = extract_client_ip(&headers);
    if let Err(err) = check_rate_limit(
        auth_state.rate_limiter(),
        client_ip.as_deref(),
        None,
        RateLimitAction::TotpLogin,
    ) {
        return ApiError(err).into_response();
    }

    let meta = session_meta(&headers);
    match service
        .sign_in_with_totp(request.temp_token.trim(), request.totp_code.trim(), &meta)
        .await
    {
        Ok(pair) => token_response(&auth_state, &pair),
        Err(err) => ApiError(err).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::auth::rate_limit::NoopRateLimiter;
    use crate::api::handlers::auth::state::AuthConfig;
    use crate::social::ProviderRegistry;
    use axum::http::header::SET_COOKIE;
    use uuid::Uuid;

    #[test]
    fn token_response_sets_cookie_trio() {
        let state = AuthState::new(
            AuthConfig::new("https://app.bsaas.app".to_string()),
            Arc::new(NoopRateLimiter),
            ProviderRegistry::new(),
        );
        let pair = TokenPair {
            access_token: "at".to_string(),
            refresh_token: "rt".to_string(),
            session_id: Uuid::new_v4(),
            access_expires_in: 900,
        };
        let response = token_response(&state, &pair);
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get_all(SET_COOKIE).iter().count(), 3);
    }
}
