//! Cookie boundary: everything between service results and `Set-Cookie`.
//!
//! Three cookies carry auth state: `bsaas_at` (access, `HttpOnly`, root
//! path), `bsaas_rt` (refresh, `HttpOnly`, scoped to the auth routes), and
//! `XSRF-TOKEN` (readable, root path, double-submit). Clearing mirrors the
//! exact path/domain attributes so browsers actually drop them.

use axum::http::{
    header::{InvalidHeaderValue, COOKIE, SET_COOKIE},
    HeaderMap, HeaderValue,
};

use super::state::AuthConfig;
use crate::auth::TokenPair;

pub const ACCESS_COOKIE: &str = "bsaas_at";
pub const REFRESH_COOKIE: &str = "bsaas_rt";
/// Pre-rename cookie still sent by older clients; read, never written.
pub const LEGACY_REFRESH_COOKIE: &str = "bsaas_refresh";
pub const CSRF_COOKIE: &str = "XSRF-TOKEN";

/// Refresh cookie scope: only the auth routes ever need it.
const AUTH_COOKIE_PATH: &str = "/v1/auth";
const ROOT_COOKIE_PATH: &str = "/";

/// Read one cookie from the `Cookie` header.
pub(crate) fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let header = headers.get(COOKIE)?;
    let value = header.to_str().ok()?;
    for pair in value.split(';') {
        let trimmed = pair.trim();
        let mut parts = trimmed.splitn(2, '=');
        let key = parts.next()?.trim();
        let val = parts.next()?.trim();
        if key == name {
            return Some(val.to_string());
        }
    }
    None
}

/// Refresh-token resolution order: named cookie, legacy cookie, body field.
pub(crate) fn resolve_refresh_token(
    headers: &HeaderMap,
    body_token: Option<&str>,
) -> Option<String> {
    if let Some(token) = cookie_value(headers, REFRESH_COOKIE) {
        return Some(token);
    }
    if let Some(token) = cookie_value(headers, LEGACY_REFRESH_COOKIE) {
        return Some(token);
    }
    body_token
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

fn build_cookie(
    config: &AuthConfig,
    name: &str,
    value: &str,
    path: &str,
    max_age: i64,
    http_only: bool,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!("{name}={value}; Path={path}; SameSite=Lax; Max-Age={max_age}");
    if http_only {
        cookie.push_str("; HttpOnly");
    }
    if config.cookie_secure() {
        cookie.push_str("; Secure");
    }
    if let Some(domain) = config.cookie_domain() {
        cookie.push_str("; Domain=");
        cookie.push_str(domain);
    }
    HeaderValue::from_str(&cookie)
}

/// Set the access/refresh/CSRF cookie trio after a successful login, TOTP or
/// passkey completion, or refresh rotation.
pub(crate) fn issue_token_cookies(
    response_headers: &mut HeaderMap,
    config: &AuthConfig,
    pair: &TokenPair,
    csrf_token: &str,
) -> Result<(), InvalidHeaderValue> {
    response_headers.append(
        SET_COOKIE,
        build_cookie(
            config,
            ACCESS_COOKIE,
            &pair.access_token,
            ROOT_COOKIE_PATH,
            config.access_cookie_ttl_seconds(),
            true,
        )?,
    );
    response_headers.append(
        SET_COOKIE,
        build_cookie(
            config,
            REFRESH_COOKIE,
            &pair.refresh_token,
            AUTH_COOKIE_PATH,
            config.refresh_cookie_ttl_seconds(),
            true,
        )?,
    );
    // Readable by design: the frontend echoes it in X-XSRF-TOKEN.
    response_headers.append(
        SET_COOKIE,
        build_cookie(
            config,
            CSRF_COOKIE,
            csrf_token,
            ROOT_COOKIE_PATH,
            config.refresh_cookie_ttl_seconds(),
            false,
        )?,
    );
    Ok(())
}

/// Clear both auth cookies with the attributes they were set with.
pub(crate) fn clear_token_cookies(
    response_headers: &mut HeaderMap,
    config: &AuthConfig,
) -> Result<(), InvalidHeaderValue> {
    response_headers.append(
        SET_COOKIE,
        build_cookie(config, ACCESS_COOKIE, "", ROOT_COOKIE_PATH, 0, true)?,
    );
    response_headers.append(
        SET_COOKIE,
        build_cookie(config, REFRESH_COOKIE, "", AUTH_COOKIE_PATH, 0, true)?,
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn config() -> AuthConfig {
        AuthConfig::new("https://app.bsaas.app".to_string())
    }

    fn pair() -> TokenPair {
        TokenPair {
            access_token: "access-token".to_string(),
            refresh_token: "refresh-token".to_string(),
            session_id: Uuid::new_v4(),
            access_expires_in: 900,
        }
    }

    fn set_cookies(headers: &HeaderMap) -> Vec<String> {
        headers
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn cookie_value_parses_multi_cookie_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("a=1; bsaas_at=token-value; b=2"),
        );
        assert_eq!(
            cookie_value(&headers, ACCESS_COOKIE),
            Some("token-value".to_string())
        );
        assert_eq!(cookie_value(&headers, "missing"), None);
    }

    #[test]
    fn refresh_resolution_prefers_named_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("bsaas_rt=from-cookie; bsaas_refresh=from-legacy"),
        );
        assert_eq!(
            resolve_refresh_token(&headers, Some("from-body")),
            Some("from-cookie".to_string())
        );
    }

    #[test]
    fn refresh_resolution_falls_back_to_legacy_then_body() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("bsaas_refresh=from-legacy"));
        assert_eq!(
            resolve_refresh_token(&headers, Some("from-body")),
            Some("from-legacy".to_string())
        );

        let headers = HeaderMap::new();
        assert_eq!(
            resolve_refresh_token(&headers, Some("from-body")),
            Some("from-body".to_string())
        );
        assert_eq!(resolve_refresh_token(&headers, Some("  ")), None);
        assert_eq!(resolve_refresh_token(&headers, None), None);
    }

    #[test]
    fn issued_cookies_carry_expected_attributes() {
        let mut headers = HeaderMap::new();
        issue_token_cookies(&mut headers, &config(), &pair(), "csrf-token").expect("cookies");
        let cookies = set_cookies(&headers);
        assert_eq!(cookies.len(), 3);

        let access = &cookies[0];
        assert!(access.starts_with("bsaas_at=access-token"));
        assert!(access.contains("HttpOnly"));
        assert!(access.contains("Secure"));
        assert!(access.contains("SameSite=Lax"));
        assert!(access.contains("Path=/"));

        let refresh = &cookies[1];
        assert!(refresh.starts_with("bsaas_rt=refresh-token"));
        assert!(refresh.contains("Path=/v1/auth"));
        assert!(refresh.contains("HttpOnly"));

        let csrf = &cookies[2];
        assert!(csrf.starts_with("XSRF-TOKEN=csrf-token"));
        assert!(!csrf.contains("HttpOnly"));
    }

    #[test]
    fn cookie_domain_is_applied_when_configured() {
        let config = config().with_cookie_domain(Some(".bsaas.app".to_string()));
        let mut headers = HeaderMap::new();
        issue_token_cookies(&mut headers, &config, &pair(), "csrf").expect("cookies");
        for cookie in set_cookies(&headers) {
            assert!(cookie.contains("Domain=.bsaas.app"), "cookie: {cookie}");
        }
    }

    #[test]
    fn clearing_matches_paths_and_zeroes_max_age() {
        let mut headers = HeaderMap::new();
        clear_token_cookies(&mut headers, &config()).expect("cookies");
        let cookies = set_cookies(&headers);
        assert_eq!(cookies.len(), 2);
        assert!(cookies[0].starts_with("bsaas_at=;"));
        assert!(cookies[0].contains("Max-Age=0"));
        assert!(cookies[0].contains("Path=/"));
        assert!(cookies[1].starts_with("bsaas_rt=;"));
        assert!(cookies[1].contains("Max-Age=0"));
        assert!(cookies[1].contains("Path=/v1/auth"));
    }

    #[test]
    fn insecure_frontend_omits_secure_attribute() {
        let config = AuthConfig::new("http://localhost:4200".to_string());
        let mut headers = HeaderMap::new();
        issue_token_cookies(&mut headers, &config, &pair(), "csrf").expect("cookies");
        for cookie in set_cookies(&headers) {
            assert!(!cookie.contains("Secure"), "cookie: {cookie}");
        }
    }
}
