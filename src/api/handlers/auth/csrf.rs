//! CSRF double-submit check.
//!
//! The readable `XSRF-TOKEN` cookie must be echoed in the `X-XSRF-TOKEN`
//! header on state-changing authenticated requests. Endpoints that precede
//! cookie establishment (login, TOTP completion, refresh, forgot/reset,
//! verification, OAuth, register) are exempt by simply not calling
//! `require_csrf`.

use anyhow::{Context, Result};
use axum::http::HeaderMap;
use base64::Engine;
use rand::{rngs::OsRng, RngCore};

use super::cookies::{cookie_value, CSRF_COOKIE};
use crate::auth::AuthError;

pub const CSRF_HEADER: &str = "x-xsrf-token";

/// Mint a fresh double-submit token.
///
/// # Errors
/// Returns an error if the system RNG fails.
pub(crate) fn generate_csrf_token() -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate csrf token")?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

/// Enforce the double-submit pattern for a state-changing request.
pub(crate) fn require_csrf(headers: &HeaderMap) -> Result<(), AuthError> {
    let Some(cookie_token) = cookie_value(headers, CSRF_COOKIE) else {
        return Err(AuthError::Unauthorized);
    };
    let Some(header_token) = headers.get(CSRF_HEADER).and_then(|value| value.to_str().ok())
    else {
        return Err(AuthError::Unauthorized);
    };
    if header_token.trim() != cookie_token || cookie_token.is_empty() {
        return Err(AuthError::Unauthorized);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{header::COOKIE, HeaderValue};

    fn headers_with(cookie: Option<&'static str>, header: Option<&'static str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(value) = cookie {
            headers.insert(COOKIE, HeaderValue::from_static(value));
        }
        if let Some(value) = header {
            headers.insert(CSRF_HEADER, HeaderValue::from_static(value));
        }
        headers
    }

    #[test]
    fn matching_tokens_pass() {
        let headers = headers_with(Some("XSRF-TOKEN=tok-123"), Some("tok-123"));
        assert!(require_csrf(&headers).is_ok());
    }

    #[test]
    fn mismatched_tokens_fail() {
        let headers = headers_with(Some("XSRF-TOKEN=tok-123"), Some("tok-456"));
        assert!(matches!(
            require_csrf(&headers),
            Err(AuthError::Unauthorized)
        ));
    }

    #[test]
    fn missing_cookie_or_header_fails() {
        let headers = headers_with(None, Some("tok-123"));
        assert!(require_csrf(&headers).is_err());

        let headers = headers_with(Some("XSRF-TOKEN=tok-123"), None);
        assert!(require_csrf(&headers).is_err());

        let headers = headers_with(Some("XSRF-TOKEN="), Some(""));
        assert!(require_csrf(&headers).is_err());
    }

    #[test]
    fn generated_tokens_are_unique_and_url_safe() {
        let first = generate_csrf_token().expect("token");
        let second = generate_csrf_token().expect("token");
        assert_ne!(first, second);
        assert!(base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(first.as_bytes())
            .is_ok());
    }
}
