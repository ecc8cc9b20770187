//! Error taxonomy for the auth service.
//!
//! Credential-class failures are deliberately collapsed into one
//! `Unauthorized` variant so callers cannot tell which factor failed, and the
//! transport layer cannot accidentally leak it either.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Bad credentials, bad/expired/wrong-audience tokens, ownership
    /// mismatches, and failed MFA/recovery/social checks.
    #[error("invalid credentials")]
    Unauthorized,

    /// Missing or malformed request data.
    #[error("{0}")]
    BadRequest(&'static str),

    /// Per-endpoint budget exceeded; carries a retry-after hint in seconds.
    #[error("rate limited")]
    RateLimited { retry_after_seconds: u64 },

    /// Genuinely-missing resources that are safe to name. Most lookups fold
    /// misses into `Unauthorized` instead to avoid enumeration.
    #[error("not found")]
    NotFound,

    /// Infrastructure failure. Details stay server-side.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    /// Stable machine-readable code for the transport layer.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::BadRequest(_) => "bad_request",
            Self::RateLimited { .. } => "rate_limited",
            Self::NotFound => "not_found",
            Self::Internal(_) => "internal",
        }
    }
}
