//! Session lifecycle endpoints: logout, listing, revocation.

use axum::{
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

use super::cookies::clear_token_cookies;
use super::csrf::require_csrf;
use super::error::ApiError;
use super::principal::require_auth;
use super::state::AuthState;
use super::types::{RevokeSessionRequest, SessionSummary, SuccessResponse};
use crate::auth::{AuthError, AuthService};
use crate::store::SessionRecord;

fn session_summary(record: &SessionRecord) -> SessionSummary {
    SessionSummary {
        id: record.id.to_string(),
        device: record.device.clone(),
        ip: record.ip.clone(),
        created_at: record.created_at.to_rfc3339(),
        last_seen_at: record.last_seen_at.to_rfc3339(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    responses(
        (status = 200, description = "Session cleared and cookies dropped", body = SuccessResponse),
        (status = 401, description = "Not authenticated", body = super::error::ErrorBody)
    ),
    tag = "auth"
)]
pub async fn logout(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    service: Extension<Arc<AuthService>>,
) -> Response {
    let principal = match require_auth(&headers, service.tokens()) {
        Ok(principal) => principal,
        Err(err) => return ApiError(err).into_response(),
    };
    if let Err(err) = require_csrf(&headers) {
        return ApiError(err).into_response();
    }

    // Idempotent: a session deleted elsewhere still logs out cleanly.
    if let Err(err) = service.logout(principal.session_id).await {
        return ApiError(err).into_response();
    }

    let mut response_headers = HeaderMap::new();
    if let Err(err) = clear_token_cookies(&mut response_headers, auth_state.config()) {
        error!("Failed to build clearing cookies: {err}");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    (
        StatusCode::OK,
        response_headers,
        Json(SuccessResponse { success: true }),
    )
        .into_response()
}

#[utoipa::path(
    get,
    path = "/v1/auth/sessions",
    responses(
        (status = 200, description = "All sessions owned by the caller", body = [SessionSummary]),
        (status = 401, description = "Not authenticated", body = super::error::ErrorBody)
    ),
    tag = "auth"
)]
pub async fn list_sessions(
    headers: HeaderMap,
    service: Extension<Arc<AuthService>>,
) -> Response {
    let principal = match require_auth(&headers, service.tokens()) {
        Ok(principal) => principal,
        Err(err) => return ApiError(err).into_response(),
    };
    match service.list_sessions(principal.user_id).await {
        Ok(sessions) => {
            let summaries: Vec<SessionSummary> = sessions.iter().map(session_summary).collect();
            (StatusCode::OK, Json(summaries)).into_response()
        }
        Err(err) => ApiError(err).into_response(),
    }
}

async fn revoke(
    headers: &HeaderMap,
    service: &AuthService,
    session_id: &str,
) -> Result<(), AuthError> {
    let principal = require_auth(headers, service.tokens())?;
    require_csrf(headers)?;
    let session_id =
        Uuid::parse_str(session_id.trim()).map_err(|_| AuthError::BadRequest("invalid session id"))?;
    service.revoke_session(principal.user_id, session_id).await
}

#[utoipa::path(
    post,
    path = "/v1/auth/sessions/revoke/{id}",
    params(("id" = String, Path, description = "Session id to revoke")),
    responses(
        (status = 200, description = "Session revoked", body = SuccessResponse),
        (status = 401, description = "Not authenticated or not the owner", body = super::error::ErrorBody)
    ),
    tag = "auth"
)]
pub async fn revoke_session_by_path(
    headers: HeaderMap,
    service: Extension<Arc<AuthService>>,
    Path(id): Path<String>,
) -> Response {
    match revoke(&headers, &service, &id).await {
        Ok(()) => (StatusCode::OK, Json(SuccessResponse { success: true })).into_response(),
        Err(err) => ApiError(err).into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/sessions/revoke",
    request_body = RevokeSessionRequest,
    responses(
        (status = 200, description = "Session revoked", body = SuccessResponse),
        (status = 400, description = "Missing session id", body = super::error::ErrorBody),
        (status = 401, description = "Not authenticated or not the owner", body = super::error::ErrorBody)
    ),
    tag = "auth"
)]
pub async fn revoke_session_by_body(
    headers: HeaderMap,
    service: Extension<Arc<AuthService>>,
    payload: Option<Json<RevokeSessionRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return ApiError(AuthError::BadRequest("missing payload")).into_response();
    };
    match revoke(&headers, &service, &request.id).await {
        Ok(()) => (StatusCode::OK, Json(SuccessResponse { success: true })).into_response(),
        Err(err) => ApiError(err).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn summary_renders_opaque_ids_and_rfc3339_times() {
        let now = Utc::now();
        let record = SessionRecord {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            device: Some("agent".to_string()),
            ip: Some("1.2.3.4".to_string()),
            created_at: now,
            last_seen_at: now,
        };
        let summary = session_summary(&record);
        assert_eq!(summary.id, record.id.to_string());
        assert_eq!(summary.device.as_deref(), Some("agent"));
        assert_eq!(summary.created_at, now.to_rfc3339());
    }
}
