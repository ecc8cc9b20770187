//! Passkey (`WebAuthn`) endpoints.
//!
//! Registration requires an authenticated session. Login start requires a
//! resolved identity — the session if present, otherwise an email lookup —
//! and never issues an anonymous challenge.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;
use webauthn_rs::prelude::{PublicKeyCredential, RegisterPublicKeyCredential};

use super::csrf::require_csrf;
use super::error::ApiError;
use super::login::token_response;
use super::principal::require_auth;
use super::rate_limit::{check_rate_limit, RateLimitAction};
use super::state::AuthState;
use super::types::{
    SuccessResponse, WebauthnChallengeResponse, WebauthnLoginFinishRequest,
    WebauthnLoginStartRequest, WebauthnRegisterFinishRequest,
};
use super::utils::{extract_client_ip, normalize_email, session_meta, valid_email};
use crate::auth::{AuthError, AuthService};
use crate::webauthn::PasskeyService;

fn challenge_response<T: serde::Serialize>(challenge_id: Uuid, options: &T) -> Response {
    match serde_json::to_value(options) {
        Ok(options) => (
            StatusCode::OK,
            Json(WebauthnChallengeResponse {
                challenge_id: challenge_id.to_string(),
                options,
            }),
        )
            .into_response(),
        Err(err) => {
            error!("Failed to serialize webauthn challenge: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/webauthn/register/start",
    responses(
        (status = 200, description = "Creation options for the browser", body = WebauthnChallengeResponse),
        (status = 401, description = "Not authenticated", body = super::error::ErrorBody),
        (status = 429, description = "Rate limited", body = super::error::ErrorBody)
    ),
    tag = "auth"
)]
pub async fn register_start(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    service: Extension<Arc<AuthService>>,
    passkeys: Extension<Arc<PasskeyService>>,
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
        RateLimitAction::WebauthnStart,
    ) {
        return ApiError(err).into_response();
    }

    match passkeys
        .register_begin(principal.user_id, &principal.email)
        .await
    {
        Ok((challenge, challenge_id)) => challenge_response(challenge_id, &challenge),
        Err(err) => {
            error!("Failed to start passkey registration: {err}");
            ApiError(AuthError::Internal(err)).into_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/webauthn/register/finish",
    request_body = WebauthnRegisterFinishRequest,
    responses(
        (status = 200, description = "Credential verified and stored", body = SuccessResponse),
        (status = 400, description = "Malformed attestation", body = super::error::ErrorBody),
        (status = 401, description = "Not authenticated or attestation rejected", body = super::error::ErrorBody)
    ),
    tag = "auth"
)]
pub async fn register_finish(
    headers: HeaderMap,
    service: Extension<Arc<AuthService>>,
    passkeys: Extension<Arc<PasskeyService>>,
    payload: Option<Json<WebauthnRegisterFinishRequest>>,
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
    let Ok(challenge_id) = Uuid::parse_str(request.challenge_id.trim()) else {
        return ApiError(AuthError::BadRequest("invalid challenge id")).into_response();
    };
    let Ok(credential) =
        serde_json::from_value::<RegisterPublicKeyCredential>(request.credential.clone())
    else {
        return ApiError(AuthError::BadRequest("malformed credential")).into_response();
    };

    let label = request.label.as_deref().unwrap_or("passkey");
    match passkeys
        .register_finish(challenge_id, principal.user_id, &credential, label)
        .await
    {
        Ok(()) => (StatusCode::OK, Json(SuccessResponse { success: true })).into_response(),
        Err(err) => {
            error!("Passkey registration failed: {err}");
            ApiError(AuthError::Unauthorized).into_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/webauthn/login/start",
    request_body = WebauthnLoginStartRequest,
    responses(
        (status = 200, description = "Assertion challenge for the browser", body = WebauthnChallengeResponse),
        (status = 400, description = "No resolvable user identity", body = super::error::ErrorBody),
        (status = 401, description = "Unknown identity", body = super::error::ErrorBody),
        (status = 429, description = "Rate limited", body = super::error::ErrorBody)
    ),
    tag = "auth"
)]
pub async fn login_start(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    service: Extension<Arc<AuthService>>,
    passkeys: Extension<Arc<PasskeyService>>,
    payload: Option<Json<WebauthnLoginStartRequest>>,
) -> Response {
    let client_ip = extract_client_ip(&headers);
    if let Err(err) = check_rate_limit(
        auth_state.rate_limiter(),
        client_ip.as_deref(),
        None,
        RateLimitAction::WebauthnStart,
    ) {
        return ApiError(err).into_response();
    }

    // Resolve the user: authenticated session first, then the email field.
    // Without either there is no challenge to hand out.
    let user_id = if let Ok(principal) = require_auth(&headers, service.tokens()) {
        principal.user_id
    } else {
        let email = payload
            .as_ref()
            .and_then(|request| request.email.as_deref())
            .map(normalize_email);
        let Some(email) = email.filter(|email| valid_email(email)) else {
            return ApiError(AuthError::BadRequest("user identity required")).into_response();
        };
        match service.user_by_email(&email).await {
            Ok(Some(user)) => user.id,
            Ok(None) => return ApiError(AuthError::Unauthorized).into_response(),
            Err(err) => return ApiError(err).into_response(),
        }
    };

    match passkeys.auth_begin(user_id).await {
        Ok((challenge, challenge_id)) => challenge_response(challenge_id, &challenge),
        Err(err) => {
            error!("Failed to start passkey authentication: {err}");
            ApiError(AuthError::Unauthorized).into_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/webauthn/login/finish",
    request_body = WebauthnLoginFinishRequest,
    responses(
        (status = 200, description = "Signed in; cookies set", body = super::types::LoginResponse),
        (status = 400, description = "Malformed assertion", body = super::error::ErrorBody),
        (status = 401, description = "Assertion rejected", body = super::error::ErrorBody)
    ),
    tag = "auth"
)]
pub async fn login_finish(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    service: Extension<Arc<AuthService>>,
    passkeys: Extension<Arc<PasskeyService>>,
    payload: Option<Json<WebauthnLoginFinishRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return ApiError(AuthError::BadRequest("missing payload")).into_response();
    };
    let Ok(challenge_id) = Uuid::parse_str(request.challenge_id.trim()) else {
        return ApiError(AuthError::BadRequest("invalid challenge id")).into_response();
    };
    let Ok(credential) = serde_json::from_value::<PublicKeyCredential>(request.credential.clone())
    else {
        return ApiError(AuthError::BadRequest("malformed credential")).into_response();
    };

    let user_id = match passkeys.auth_finish(challenge_id, &credential).await {
        Ok(user_id) => user_id,
        Err(err) => {
            error!("Passkey assertion failed: {err}");
            return ApiError(AuthError::Unauthorized).into_response();
        }
    };

    let meta = session_meta(&headers);
    match service.sign_in_with_passkey(user_id, &meta).await {
        Ok(pair) => token_response(&auth_state, &pair),
        Err(err) => ApiError(err).into_response(),
    }
}
