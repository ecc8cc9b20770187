//! OAuth social sign-in endpoints.
//!
//! `start` sets an anti-forgery state cookie and redirects to the provider.
//! `callback` verifies the state, exchanges the code through the provider
//! port, then either links (authenticated request) or signs in — and signing
//! in fails closed when no explicit `(provider, provider_user_id)` link
//! exists, email match or not.

use axum::{
    extract::{Extension, Path, Query},
    http::{
        header::{LOCATION, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::error;

use super::cookies::cookie_value;
use super::csrf::{generate_csrf_token, require_csrf};
use super::error::ApiError;
use super::login::token_response;
use super::principal::require_auth;
use super::rate_limit::{check_rate_limit, RateLimitAction};
use super::state::{AuthConfig, AuthState};
use super::types::{OauthCallbackQuery, SuccessResponse};
use super::utils::{extract_client_ip, session_meta};
use crate::auth::{AuthError, AuthService};

const OAUTH_STATE_COOKIE: &str = "bsaas_oauth_state";
const OAUTH_STATE_PATH: &str = "/v1/auth/oauth";
const OAUTH_STATE_TTL_SECONDS: i64 = 10 * 60;

fn state_cookie(config: &AuthConfig, value: &str, max_age: i64) -> Option<HeaderValue> {
    let mut cookie = format!(
        "{OAUTH_STATE_COOKIE}={value}; Path={OAUTH_STATE_PATH}; HttpOnly; SameSite=Lax; Max-Age={max_age}"
    );
    if config.cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie).ok()
}

#[utoipa::path(
    get,
    path = "/v1/auth/oauth/{provider}/start",
    params(("provider" = String, Path, description = "Configured provider name")),
    responses(
        (status = 302, description = "Redirect to the provider's authorize URL"),
        (status = 404, description = "Unknown provider", body = super::error::ErrorBody)
    ),
    tag = "auth"
)]
pub async fn oauth_start(
    auth_state: Extension<Arc<AuthState>>,
    Path(provider): Path<String>,
) -> Response {
    let Some(provider) = auth_state.providers().get(&provider) else {
        return ApiError(AuthError::NotFound).into_response();
    };

    let state = match generate_csrf_token() {
        Ok(state) => state,
        Err(err) => return ApiError(AuthError::Internal(err)).into_response(),
    };
    let authorize_url = match provider.authorize_url(&state) {
        Ok(url) => url,
        Err(err) => {
            error!("Failed to build authorize URL: {err}");
            return ApiError(AuthError::Internal(err)).into_response();
        }
    };

    let mut headers = HeaderMap::new();
    if let Some(cookie) = state_cookie(auth_state.config(), &state, OAUTH_STATE_TTL_SECONDS) {
        headers.insert(SET_COOKIE, cookie);
    }
    match HeaderValue::from_str(authorize_url.as_str()) {
        Ok(location) => {
            headers.insert(LOCATION, location);
            (StatusCode::FOUND, headers).into_response()
        }
        Err(err) => {
            error!("Authorize URL is not a valid header value: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/v1/auth/oauth/{provider}/callback",
    params(
        ("provider" = String, Path, description = "Configured provider name"),
        ("code" = String, Query, description = "Authorization code"),
        ("state" = String, Query, description = "Anti-forgery state")
    ),
    responses(
        (status = 302, description = "Linked or signed in; redirected to the frontend"),
        (status = 401, description = "State mismatch or no linked account", body = super::error::ErrorBody),
        (status = 404, description = "Unknown provider", body = super::error::ErrorBody)
    ),
    tag = "auth"
)]
pub async fn oauth_callback(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    service: Extension<Arc<AuthService>>,
    Path(provider_name): Path<String>,
    query: Option<Query<OauthCallbackQuery>>,
) -> Response {
    let Some(provider) = auth_state.providers().get(&provider_name) else {
        return ApiError(AuthError::NotFound).into_response();
    };
    let Some(Query(query)) = query else {
        return ApiError(AuthError::BadRequest("missing code or state")).into_response();
    };

    // Double-submit on the OAuth state: cookie set at start must match.
    let expected_state = cookie_value(&headers, OAUTH_STATE_COOKIE);
    if expected_state.as_deref() != Some(query.state.as_str()) || query.state.is_empty() {
        return ApiError(AuthError::Unauthorized).into_response();
    }

    let profile = match provider.exchange_code(&query.code).await {
        Ok(profile) => profile,
        Err(err) => {
            error!("OAuth code exchange failed: {err}");
            return ApiError(AuthError::Unauthorized).into_response();
        }
    };

    // The state cookie is one-shot.
    let mut response_headers = HeaderMap::new();
    if let Some(cookie) = state_cookie(auth_state.config(), "", 0) {
        response_headers.insert(SET_COOKIE, cookie);
    }
    let frontend = auth_state.config().frontend_base_url().to_string();

    // Authenticated request: attach the provider identity to this account.
    if let Ok(principal) = require_auth(&headers, service.tokens()) {
        return match service
            .link_social_account(principal.user_id, &profile.provider, &profile.provider_user_id)
            .await
        {
            Ok(()) => {
                if let Ok(location) = HeaderValue::from_str(&frontend) {
                    response_headers.insert(LOCATION, location);
                }
                (StatusCode::FOUND, response_headers).into_response()
            }
            Err(err) => ApiError(err).into_response(),
        };
    }

    // Anonymous request: sign in through the existing link, fail closed
    // otherwise.
    let meta = session_meta(&headers);
    match service.sign_in_with_social(&profile, &meta).await {
        Ok(pair) => {
            let mut response = token_response(&auth_state, &pair);
            if response.status() == StatusCode::OK {
                // Carry the state-cookie clearing alongside the auth cookies.
                for cookie in response_headers.get_all(SET_COOKIE) {
                    response.headers_mut().append(SET_COOKIE, cookie.clone());
                }
                if let Ok(location) = HeaderValue::from_str(&frontend) {
                    response.headers_mut().insert(LOCATION, location);
                }
                *response.status_mut() = StatusCode::FOUND;
            }
            response
        }
        Err(err) => ApiError(err).into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/oauth/{provider}/unlink",
    params(("provider" = String, Path, description = "Provider to unlink")),
    responses(
        (status = 200, description = "Link removed", body = SuccessResponse),
        (status = 400, description = "Last remaining sign-in method", body = super::error::ErrorBody),
        (status = 401, description = "Not authenticated", body = super::error::ErrorBody),
        (status = 404, description = "No such link", body = super::error::ErrorBody)
    ),
    tag = "auth"
)]
pub async fn oauth_unlink(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    service: Extension<Arc<AuthService>>,
    Path(provider): Path<String>,
) -> Response {
    let principal = match require_auth(&headers, service.tokens()) {
        Ok(principal) => principal,
        Err(err) => return ApiError(err).into_response(),
    };
    if let Err(err) = require_csrf(&headers) {
        return ApiError(err).into_response();
    }

    let client_ip = extract_client_ip(&headers);
    if let Err(err) = check_rate_limit(
        auth_state.rate_limiter(),
        client_ip.as_deref(),
        None,
        RateLimitAction::Recovery,
    ) {
        return ApiError(err).into_response();
    }

    match service
        .unlink_social_account(principal.user_id, &provider)
        .await
    {
        Ok(()) => (StatusCode::OK, Json(SuccessResponse { success: true })).into_response(),
        Err(err) => ApiError(err).into_response(),
    }
}
