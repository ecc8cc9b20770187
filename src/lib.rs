//! # bsaas-auth (Authentication & Session Core)
//!
//! `bsaas-auth` is the authentication authority for the bsaas salon booking
//! platform. It owns password + TOTP multi-factor login, refresh-token
//! rotation, session lifecycle, passkey (`WebAuthn`) enrollment and sign-in,
//! OAuth social account linking, and account-recovery flows. Everything else
//! on the platform (salons, bookings, reviews, portfolios) consumes this
//! service through its cookies and guards.
//!
//! ## Tokens & Cookies
//!
//! Successful logins mint a short-lived access JWT and a longer-lived refresh
//! JWT bound to a session row. Both travel as `HttpOnly` cookies (`bsaas_at`,
//! `bsaas_rt`), alongside a readable `XSRF-TOKEN` cookie for the double-submit
//! CSRF check. Refresh tokens rotate on every use: presenting one revokes it
//! and issues a successor bound to the same session, and presenting a revoked
//! token is treated as a compromise signal, not a stale client.
//!
//! ## Single-purpose tokens
//!
//! Short-lived tokens for TOTP completion, password reset, and email
//! verification carry an audience claim (`totp`, `reset`, `verify`) that is
//! enforced as a hard gate, so a token minted for one flow can never complete
//! another.
//!
//! ## Enumeration hygiene
//!
//! Credential-class failures are deliberately undifferentiated: unknown
//! email, wrong password, bad TOTP code, and missing social links all fail
//! with the same error, and forgot-password / verification requests return
//! success whether or not the account exists.

pub mod api;
pub mod audit;
pub mod auth;
pub mod cli;
pub mod social;
pub mod store;
pub mod token;
pub mod totp;
pub mod webauthn;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
