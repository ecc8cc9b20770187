//! Auth transport state and configuration.

use std::sync::Arc;
use url::Url;

use super::rate_limit::RateLimiter;
use crate::social::ProviderRegistry;

const DEFAULT_ACCESS_COOKIE_TTL_SECONDS: i64 = 15 * 60;
const DEFAULT_REFRESH_COOKIE_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    frontend_base_url: String,
    cookie_domain: Option<String>,
    access_cookie_ttl_seconds: i64,
    refresh_cookie_ttl_seconds: i64,
    webauthn_rp_id: String,
    webauthn_rp_origin: String,
}

impl AuthConfig {
    #[must_use]
    pub fn new(frontend_base_url: String) -> Self {
        let rp_id = Url::parse(&frontend_base_url)
            .ok()
            .and_then(|u: Url| u.host_str().map(ToString::to_string))
            .unwrap_or_else(|| "localhost".to_string());

        // Origins never carry a trailing slash.
        let rp_origin = frontend_base_url.trim_end_matches('/').to_string();

        Self {
            frontend_base_url,
            cookie_domain: None,
            access_cookie_ttl_seconds: DEFAULT_ACCESS_COOKIE_TTL_SECONDS,
            refresh_cookie_ttl_seconds: DEFAULT_REFRESH_COOKIE_TTL_SECONDS,
            webauthn_rp_id: rp_id,
            webauthn_rp_origin: rp_origin,
        }
    }

    #[must_use]
    pub fn with_cookie_domain(mut self, domain: Option<String>) -> Self {
        self.cookie_domain = domain.filter(|value| !value.is_empty());
        self
    }

    #[must_use]
    pub fn with_access_cookie_ttl_seconds(mut self, seconds: i64) -> Self {
        self.access_cookie_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_refresh_cookie_ttl_seconds(mut self, seconds: i64) -> Self {
        self.refresh_cookie_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_webauthn_rp_id(mut self, rp_id: String) -> Self {
        self.webauthn_rp_id = rp_id;
        self
    }

    #[must_use]
    pub fn with_webauthn_rp_origin(mut self, rp_origin: String) -> Self {
        self.webauthn_rp_origin = rp_origin;
        self
    }

    #[must_use]
    pub fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    #[must_use]
    pub fn cookie_domain(&self) -> Option<&str> {
        self.cookie_domain.as_deref()
    }

    /// Only mark cookies secure when the frontend is served over HTTPS.
    #[must_use]
    pub fn cookie_secure(&self) -> bool {
        self.frontend_base_url.starts_with("https://")
    }

    #[must_use]
    pub fn access_cookie_ttl_seconds(&self) -> i64 {
        self.access_cookie_ttl_seconds
    }

    #[must_use]
    pub fn refresh_cookie_ttl_seconds(&self) -> i64 {
        self.refresh_cookie_ttl_seconds
    }

    #[must_use]
    pub fn webauthn_rp_id(&self) -> &str {
        &self.webauthn_rp_id
    }

    #[must_use]
    pub fn webauthn_rp_origin(&self) -> &str {
        &self.webauthn_rp_origin
    }
}

pub struct AuthState {
    config: AuthConfig,
    rate_limiter: Arc<dyn RateLimiter>,
    providers: ProviderRegistry,
}

impl AuthState {
    #[must_use]
    pub fn new(
        config: AuthConfig,
        rate_limiter: Arc<dyn RateLimiter>,
        providers: ProviderRegistry,
    ) -> Self {
        Self {
            config,
            rate_limiter,
            providers,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub(super) fn rate_limiter(&self) -> &dyn RateLimiter {
        self.rate_limiter.as_ref()
    }

    #[must_use]
    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }
}

#[cfg(test)]
mod tests {
    use super::super::rate_limit::NoopRateLimiter;
    use super::*;

    #[test]
    fn config_derives_webauthn_relying_party() {
        let config = AuthConfig::new("https://app.bsaas.app/".to_string());
        assert_eq!(config.webauthn_rp_id(), "app.bsaas.app");
        assert_eq!(config.webauthn_rp_origin(), "https://app.bsaas.app");
        assert!(config.cookie_secure());
    }

    #[test]
    fn plain_http_frontend_disables_secure_cookies() {
        let config = AuthConfig::new("http://localhost:4200".to_string());
        assert!(!config.cookie_secure());
        assert_eq!(config.webauthn_rp_id(), "localhost");
    }

    #[test]
    fn empty_cookie_domain_is_dropped() {
        let config = AuthConfig::new("https://app.bsaas.app".to_string())
            .with_cookie_domain(Some(String::new()));
        assert_eq!(config.cookie_domain(), None);

        let config = AuthConfig::new("https://app.bsaas.app".to_string())
            .with_cookie_domain(Some(".bsaas.app".to_string()));
        assert_eq!(config.cookie_domain(), Some(".bsaas.app"));
    }

    #[test]
    fn state_exposes_config_and_registry() {
        let config = AuthConfig::new("https://app.bsaas.app".to_string())
            .with_access_cookie_ttl_seconds(600)
            .with_refresh_cookie_ttl_seconds(3600);
        let state = AuthState::new(
            config,
            Arc::new(NoopRateLimiter),
            crate::social::ProviderRegistry::new(),
        );
        assert_eq!(state.config().access_cookie_ttl_seconds(), 600);
        assert_eq!(state.config().refresh_cookie_ttl_seconds(), 3600);
        assert!(state.providers().is_empty());
    }
}
