//! Server action: translate CLI args into the running service.

use anyhow::Result;

use crate::api::{self, ServerOptions};
use crate::api::handlers::auth::AuthConfig;
use crate::social::ProviderRegistry;
use crate::token::TokenSecrets;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub frontend_base_url: String,
    pub cookie_domain: Option<String>,
    pub totp_issuer: String,
    pub token_secrets: TokenSecrets,
    pub access_ttl_seconds: i64,
    pub refresh_ttl_seconds: i64,
    pub purpose_ttl_seconds: i64,
}

/// Execute the server action.
///
/// # Errors
/// Returns an error if the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let auth_config = AuthConfig::new(args.frontend_base_url)
        .with_cookie_domain(args.cookie_domain)
        .with_access_cookie_ttl_seconds(args.access_ttl_seconds)
        .with_refresh_cookie_ttl_seconds(args.refresh_ttl_seconds);

    // OAuth providers are wired by the host deployment; an empty registry
    // keeps the oauth endpoints answering 404 until one is configured.
    let providers = ProviderRegistry::new();

    api::new(ServerOptions {
        port: args.port,
        dsn: args.dsn,
        auth_config,
        token_secrets: args.token_secrets,
        access_ttl_seconds: args.access_ttl_seconds,
        refresh_ttl_seconds: args.refresh_ttl_seconds,
        purpose_ttl_seconds: args.purpose_ttl_seconds,
        totp_issuer: args.totp_issuer,
        providers,
    })
    .await
}
