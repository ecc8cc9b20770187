//! Server assembly: pool, services, middleware, and the axum router.

use anyhow::{anyhow, Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method, Request,
    },
    routing::get,
    Extension,
};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;
use url::Url;
use utoipa_axum::router::OpenApiRouter;

pub(crate) mod email;
pub mod handlers;
mod openapi;

pub use email::{EmailMessage, EmailSender, LogEmailSender};
pub use openapi::openapi;

use crate::audit::AuditLog;
use crate::auth::AuthService;
use crate::social::ProviderRegistry;
use crate::store::{AuthStore, PgStore};
use crate::token::{TokenIssuer, TokenSecrets};
use crate::totp::TotpRsAuthenticator;
use crate::webauthn::PasskeyService;
use handlers::auth::{AuthConfig, AuthState, FixedWindowRateLimiter};
use handlers::{health, root};

/// Build the API router with all documented routes registered.
#[must_use]
pub fn router() -> OpenApiRouter {
    openapi::api_router()
}

/// Everything the server needs, resolved by the CLI layer.
pub struct ServerOptions {
    pub port: u16,
    pub dsn: String,
    pub auth_config: AuthConfig,
    pub token_secrets: TokenSecrets,
    pub access_ttl_seconds: i64,
    pub refresh_ttl_seconds: i64,
    pub purpose_ttl_seconds: i64,
    pub totp_issuer: String,
    pub providers: ProviderRegistry,
}

/// Start the server.
///
/// # Errors
/// Returns an error if the database is unreachable, the relying-party
/// configuration is invalid, or the listener cannot bind.
pub async fn new(options: ServerOptions) -> Result<()> {
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&options.dsn)
        .await
        .context("Failed to connect to database")?;

    let issuer = TokenIssuer::new(options.token_secrets)
        .with_access_ttl_seconds(options.access_ttl_seconds)
        .with_refresh_ttl_seconds(options.refresh_ttl_seconds)
        .with_purpose_ttl_seconds(options.purpose_ttl_seconds);

    let audit = AuditLog::new();
    let store: Arc<dyn AuthStore> = Arc::new(PgStore::new(pool.clone()));
    let service = Arc::new(AuthService::new(
        store.clone(),
        issuer,
        Arc::new(TotpRsAuthenticator::new(options.totp_issuer)),
        Arc::new(LogEmailSender),
        audit.clone(),
        options.auth_config.frontend_base_url().to_string(),
    ));
    let passkeys = Arc::new(PasskeyService::new(
        store,
        audit,
        options.auth_config.webauthn_rp_id(),
        options.auth_config.webauthn_rp_origin(),
    )?);

    let frontend_origin = frontend_origin(options.auth_config.frontend_base_url())?;
    let auth_state = Arc::new(AuthState::new(
        options.auth_config,
        Arc::new(FixedWindowRateLimiter::new()),
        options.providers,
    ));

    let cors = CorsLayer::new()
        .allow_headers([
            CONTENT_TYPE,
            AUTHORIZATION,
            HeaderName::from_static("x-xsrf-token"),
        ])
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(AllowOrigin::exact(frontend_origin))
        .allow_credentials(true);

    // Build the router from OpenAPI-wired routes, then extend it with non-doc
    // routes like `/` and preflight-only `OPTIONS /health`.
    let (router, _openapi) = router().split_for_parts();
    let app = router
        .route("/", get(root::root))
        .route("/health", axum::routing::options(health::health))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(auth_state))
                .layer(Extension(service))
                .layer(Extension(passkeys))
                .layer(Extension(pool)),
        );

    let listener = TcpListener::bind(format!("::0:{}", options.port)).await?;

    info!("Listening on [::]:{}", options.port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

fn frontend_origin(frontend_base_url: &str) -> Result<HeaderValue> {
    let parsed = Url::parse(frontend_base_url)
        .with_context(|| format!("Invalid frontend base URL: {frontend_base_url}"))?;
    let host = parsed.host_str().ok_or_else(|| {
        anyhow!("Frontend base URL must include a valid host: {frontend_base_url}")
    })?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    let origin = format!("{}://{}{}", parsed.scheme(), host, port);
    HeaderValue::from_str(&origin).context("Failed to build frontend origin header")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frontend_origin_strips_path_and_keeps_port() -> Result<()> {
        let origin = frontend_origin("https://app.bsaas.app/some/path")?;
        assert_eq!(origin, HeaderValue::from_static("https://app.bsaas.app"));

        let origin = frontend_origin("http://localhost:4200/")?;
        assert_eq!(origin, HeaderValue::from_static("http://localhost:4200"));
        Ok(())
    }

    #[test]
    fn frontend_origin_rejects_garbage() {
        assert!(frontend_origin("not a url").is_err());
    }
}
