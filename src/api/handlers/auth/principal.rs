//! Authenticated principal extraction and role checks.
//!
//! The JWT guard reads the access token from the `bsaas_at` cookie first,
//! then the `Authorization: Bearer` header, and attaches the decoded
//! identity for downstream authorization. Role checks compare against an
//! endpoint's declared allowed set; the booking/salon services call
//! `require_role` with the same principal.

use axum::http::{header::AUTHORIZATION, HeaderMap};
use uuid::Uuid;

use super::cookies::{cookie_value, ACCESS_COOKIE};
use crate::auth::AuthError;
use crate::token::TokenIssuer;

/// Authenticated request context derived from a verified access token.
#[derive(Clone, Debug)]
pub struct Principal {
    pub user_id: Uuid,
    pub email: String,
    pub roles: Vec<String>,
    pub session_id: Uuid,
}

impl Principal {
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|owned| owned == role)
    }
}

pub(crate) fn extract_access_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = cookie_value(headers, ACCESS_COOKIE) {
        return Some(token);
    }
    extract_bearer_token(headers)
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// JWT guard: reject missing/expired/invalid tokens, return the principal.
pub fn require_auth(headers: &HeaderMap, tokens: &TokenIssuer) -> Result<Principal, AuthError> {
    let Some(token) = extract_access_token(headers) else {
        return Err(AuthError::Unauthorized);
    };
    let claims = tokens
        .verify_access(&token)
        .map_err(|_| AuthError::Unauthorized)?;
    let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::Unauthorized)?;
    let session_id = Uuid::parse_str(&claims.sid).map_err(|_| AuthError::Unauthorized)?;
    Ok(Principal {
        user_id,
        email: claims.email,
        roles: claims.roles,
        session_id,
    })
}

/// Role guard over the principal's attached roles.
pub fn require_role(principal: &Principal, allowed: &[&str]) -> Result<(), AuthError> {
    if allowed.iter().any(|role| principal.has_role(role)) {
        Ok(())
    } else {
        Err(AuthError::Unauthorized)
    }
}
