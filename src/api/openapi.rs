use super::handlers::{auth, health};
use utoipa::openapi::{InfoBuilder, License, OpenApiBuilder, Tag};
use utoipa_axum::{router::OpenApiRouter, routes};

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    // Reuse the same router wiring and only return the generated spec.
    let (_router, openapi) = api_router().split_for_parts();
    openapi
}

/// Build the router that also drives the `OpenAPI` document.
///
/// Add new endpoints here via `.routes(routes!(...))` so they are both served
/// and documented. Routes added outside (like `/`) are intentionally not
/// documented.
pub(crate) fn api_router() -> OpenApiRouter {
    let mut openapi = cargo_openapi();

    let mut auth_tag = Tag::new("auth");
    auth_tag.description = Some("Login, sessions, recovery, and linked accounts".to_string());

    let mut health_tag = Tag::new("health");
    health_tag.description = Some("Service and dependency health".to_string());

    openapi.tags = Some(vec![auth_tag, health_tag]);

    OpenApiRouter::with_openapi(openapi)
        .routes(routes!(health::health))
        .routes(routes!(auth::login::login))
        .routes(routes!(auth::login::login_totp))
        .routes(routes!(auth::refresh::refresh))
        .routes(routes!(auth::session::logout))
        .routes(routes!(auth::session::list_sessions))
        .routes(routes!(auth::session::revoke_session_by_path))
        .routes(routes!(auth::session::revoke_session_by_body))
        .routes(routes!(auth::password::forgot_password))
        .routes(routes!(auth::password::reset_password))
        .routes(routes!(auth::verification::request_verification))
        .routes(routes!(auth::verification::confirm_verification))
        .routes(routes!(auth::totp::enroll_start))
        .routes(routes!(auth::totp::enroll_finish))
        .routes(routes!(auth::recovery::generate))
        .routes(routes!(auth::recovery::verify))
        .routes(routes!(auth::webauthn::register_start))
        .routes(routes!(auth::webauthn::register_finish))
        .routes(routes!(auth::webauthn::login_start))
        .routes(routes!(auth::webauthn::login_finish))
        .routes(routes!(auth::social::oauth_start))
        .routes(routes!(auth::social::oauth_callback))
        .routes(routes!(auth::social::oauth_unlink))
        .routes(routes!(auth::register::register))
}

fn cargo_openapi() -> utoipa::openapi::OpenApi {
    // Use Cargo.toml metadata instead of the utoipa defaults.
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(Some(env!("CARGO_PKG_DESCRIPTION")))
        .build();
    info.license = Some(License::new(env!("CARGO_PKG_LICENSE")));

    OpenApiBuilder::new().info(info).build()
}
