//! OAuth social sign-in port.
//!
//! The auth core never speaks a provider's wire protocol directly: it sees
//! an `OAuthProvider` that can build an authorize URL and exchange a
//! callback code for a `SocialProfile`. The reqwest-backed
//! `CodeExchangeProvider` covers standard authorization-code providers;
//! tests substitute a fake.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;

/// Identity returned by a provider after code exchange.
#[derive(Clone, Debug)]
pub struct SocialProfile {
    pub provider: String,
    pub provider_user_id: String,
    pub email: Option<String>,
    pub name: Option<String>,
}

#[async_trait]
pub trait OAuthProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Authorization redirect target carrying the anti-forgery `state`.
    ///
    /// # Errors
    /// Returns an error if the configured base URL is invalid.
    fn authorize_url(&self, state: &str) -> Result<Url>;

    /// Exchange a callback code for the provider's identity claims.
    async fn exchange_code(&self, code: &str) -> Result<SocialProfile>;
}

/// Static configuration for one authorization-code provider.
#[derive(Clone, Debug)]
pub struct OAuthProviderConfig {
    pub name: String,
    pub client_id: String,
    pub client_secret: SecretString,
    pub auth_url: String,
    pub token_url: String,
    pub userinfo_url: String,
    pub redirect_url: String,
    pub scopes: Vec<String>,
}

/// Generic authorization-code flow over reqwest.
pub struct CodeExchangeProvider {
    config: OAuthProviderConfig,
    client: reqwest::Client,
}

impl CodeExchangeProvider {
    #[must_use]
    pub fn new(config: OAuthProviderConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[async_trait]
impl OAuthProvider for CodeExchangeProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn authorize_url(&self, state: &str) -> Result<Url> {
        let mut url = Url::parse(&self.config.auth_url)
            .with_context(|| format!("invalid auth URL for provider {}", self.config.name))?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_url)
            .append_pair("scope", &self.config.scopes.join(" "))
            .append_pair("state", state);
        Ok(url)
    }

    async fn exchange_code(&self, code: &str) -> Result<SocialProfile> {
        let token: TokenResponse = self
            .client
            .post(&self.config.token_url)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.config.redirect_url.as_str()),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.expose_secret()),
            ])
            .send()
            .await
            .context("token exchange request failed")?
            .error_for_status()
            .context("token endpoint rejected the code")?
            .json()
            .await
            .context("invalid token endpoint response")?;

        let claims: serde_json::Value = self
            .client
            .get(&self.config.userinfo_url)
            .bearer_auth(&token.access_token)
            .send()
            .await
            .context("userinfo request failed")?
            .error_for_status()
            .context("userinfo endpoint rejected the token")?
            .json()
            .await
            .context("invalid userinfo response")?;

        profile_from_claims(&self.config.name, &claims)
    }
}

/// Map standard userinfo claims to a `SocialProfile`. Providers disagree on
/// the subject field name; `sub` wins, `id` is the fallback.
pub fn profile_from_claims(provider: &str, claims: &serde_json::Value) -> Result<SocialProfile> {
    let subject = claims
        .get("sub")
        .or_else(|| claims.get("id"))
        .and_then(value_as_string)
        .ok_or_else(|| anyhow!("userinfo response has no subject"))?;
    Ok(SocialProfile {
        provider: provider.to_string(),
        provider_user_id: subject,
        email: claims
            .get("email")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string),
        name: claims
            .get("name")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string),
    })
}

fn value_as_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Providers configured at startup, looked up by path segment.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn OAuthProvider>>,
}

impl ProviderRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_provider(mut self, provider: Arc<dyn OAuthProvider>) -> Self {
        self.providers
            .insert(provider.name().to_string(), provider);
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn OAuthProvider>> {
        self.providers.get(name)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
