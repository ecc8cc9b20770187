//! Signed-token issuance and verification.
//!
//! Three token families share the HS256 primitives here:
//! - access tokens: subject, email, session id, and role names;
//! - refresh tokens: subject, session id, and a fresh random `jti` that is
//!   persisted before the token leaves the issuer;
//! - purpose tokens: short-lived, audience-tagged (`totp`, `reset`,
//!   `verify`) so verification for one flow can never accept a token minted
//!   for another.
//!
//! Secret resolution prefers the operation-specific secret, falls back to the
//! shared secret, and finally to a fixed development default. The default
//! exists only so local and test environments run unconfigured; the first
//! time it is used a warning is logged so a production deployment cannot
//! miss it.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::sync::Once;
use tracing::warn;
use uuid::Uuid;

const DEFAULT_ACCESS_TTL_SECONDS: i64 = 15 * 60;
const DEFAULT_REFRESH_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;
const DEFAULT_PURPOSE_TTL_SECONDS: i64 = 5 * 60;

/// Development-only fallback secret. Never configure this in production.
const DEV_FALLBACK_SECRET: &str = "bsaas-auth-dev-secret-do-not-deploy";

static DEV_SECRET_WARNING: Once = Once::new();

/// Which signing key a token family uses.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum SecretKind {
    Access,
    Refresh,
}

/// Audience tag for single-purpose tokens.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TokenPurpose {
    Totp,
    Reset,
    Verify,
}

impl TokenPurpose {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Totp => "totp",
            Self::Reset => "reset",
            Self::Verify => "verify",
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: String,
    pub email: String,
    pub sid: String,
    pub roles: Vec<String>,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: String,
    pub sid: String,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PurposeClaims {
    pub sub: String,
    pub aud: String,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

/// Signing secrets as configured by the host. Any of the three may be absent.
#[derive(Clone, Debug, Default)]
pub struct TokenSecrets {
    access: Option<SecretString>,
    refresh: Option<SecretString>,
    shared: Option<SecretString>,
}

impl TokenSecrets {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_access(mut self, secret: SecretString) -> Self {
        self.access = Some(secret);
        self
    }

    #[must_use]
    pub fn with_refresh(mut self, secret: SecretString) -> Self {
        self.refresh = Some(secret);
        self
    }

    #[must_use]
    pub fn with_shared(mut self, secret: SecretString) -> Self {
        self.shared = Some(secret);
        self
    }

    /// Specific secret, then shared, then the development default.
    fn resolve(&self, kind: SecretKind) -> String {
        let specific = match kind {
            SecretKind::Access => self.access.as_ref(),
            SecretKind::Refresh => self.refresh.as_ref(),
        };
        if let Some(secret) = specific.or(self.shared.as_ref()) {
            return secret.expose_secret().to_string();
        }
        DEV_SECRET_WARNING.call_once(|| {
            warn!("no signing secret configured; using the development fallback secret");
        });
        DEV_FALLBACK_SECRET.to_string()
    }
}

/// Issues and verifies the service's signed tokens.
#[derive(Clone, Debug)]
pub struct TokenIssuer {
    secrets: TokenSecrets,
    access_ttl: Duration,
    refresh_ttl: Duration,
    purpose_ttl: Duration,
}

impl TokenIssuer {
    #[must_use]
    pub fn new(secrets: TokenSecrets) -> Self {
        Self {
            secrets,
            access_ttl: Duration::seconds(DEFAULT_ACCESS_TTL_SECONDS),
            refresh_ttl: Duration::seconds(DEFAULT_REFRESH_TTL_SECONDS),
            purpose_ttl: Duration::seconds(DEFAULT_PURPOSE_TTL_SECONDS),
        }
    }

    #[must_use]
    pub fn with_access_ttl_seconds(mut self, seconds: i64) -> Self {
        self.access_ttl = Duration::seconds(seconds);
        self
    }

    #[must_use]
    pub fn with_refresh_ttl_seconds(mut self, seconds: i64) -> Self {
        self.refresh_ttl = Duration::seconds(seconds);
        self
    }

    #[must_use]
    pub fn with_purpose_ttl_seconds(mut self, seconds: i64) -> Self {
        self.purpose_ttl = Duration::seconds(seconds);
        self
    }

    #[must_use]
    pub fn access_ttl_seconds(&self) -> i64 {
        self.access_ttl.num_seconds()
    }

    #[must_use]
    pub fn refresh_ttl_seconds(&self) -> i64 {
        self.refresh_ttl.num_seconds()
    }

    #[must_use]
    pub fn purpose_ttl_seconds(&self) -> i64 {
        self.purpose_ttl.num_seconds()
    }

    /// Sign an access token for one session.
    ///
    /// # Errors
    /// Returns an error if JWT encoding fails.
    pub fn sign_access(
        &self,
        user_id: Uuid,
        email: &str,
        session_id: Uuid,
        roles: &[String],
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let now = Utc::now();
        let claims = AccessClaims {
            sub: user_id.to_string(),
            email: email.to_string(),
            sid: session_id.to_string(),
            roles: roles.to_vec(),
            iat: now.timestamp(),
            exp: (now + self.access_ttl).timestamp(),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secrets.resolve(SecretKind::Access).as_bytes()),
        )
    }

    /// Sign a refresh token with a fresh `jti`, returning both.
    ///
    /// The caller must persist the `jti` before handing the token out.
    ///
    /// # Errors
    /// Returns an error if JWT encoding fails.
    pub fn sign_refresh(
        &self,
        user_id: Uuid,
        session_id: Uuid,
    ) -> Result<(String, Uuid), jsonwebtoken::errors::Error> {
        let now = Utc::now();
        let jti = Uuid::new_v4();
        let claims = RefreshClaims {
            sub: user_id.to_string(),
            sid: session_id.to_string(),
            jti: jti.to_string(),
            iat: now.timestamp(),
            exp: (now + self.refresh_ttl).timestamp(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secrets.resolve(SecretKind::Refresh).as_bytes()),
        )?;
        Ok((token, jti))
    }

    /// Sign a short-lived, audience-tagged token, returning it with its `jti`.
    ///
    /// # Errors
    /// Returns an error if JWT encoding fails.
    pub fn sign_purpose(
        &self,
        user_id: Uuid,
        purpose: TokenPurpose,
    ) -> Result<(String, Uuid), jsonwebtoken::errors::Error> {
        let now = Utc::now();
        let jti = Uuid::new_v4();
        let claims = PurposeClaims {
            sub: user_id.to_string(),
            aud: purpose.as_str().to_string(),
            jti: jti.to_string(),
            iat: now.timestamp(),
            exp: (now + self.purpose_ttl).timestamp(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secrets.resolve(SecretKind::Access).as_bytes()),
        )?;
        Ok((token, jti))
    }

    /// # Errors
    /// Returns an error for a missing/expired/forged token.
    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, jsonwebtoken::errors::Error> {
        let mut validation = Validation::default();
        validation.validate_aud = false;
        decode::<AccessClaims>(
            token,
            &DecodingKey::from_secret(self.secrets.resolve(SecretKind::Access).as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
    }

    /// # Errors
    /// Returns an error for a missing/expired/forged token.
    pub fn verify_refresh(
        &self,
        token: &str,
    ) -> Result<RefreshClaims, jsonwebtoken::errors::Error> {
        let mut validation = Validation::default();
        validation.validate_aud = false;
        decode::<RefreshClaims>(
            token,
            &DecodingKey::from_secret(self.secrets.resolve(SecretKind::Refresh).as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
    }

    /// Verify a purpose token, enforcing the audience as a hard gate.
    ///
    /// # Errors
    /// Returns an error for expired/forged tokens or an audience mismatch,
    /// including tokens minted for a different purpose.
    pub fn verify_purpose(
        &self,
        token: &str,
        purpose: TokenPurpose,
    ) -> Result<PurposeClaims, jsonwebtoken::errors::Error> {
        let mut validation = Validation::default();
        validation.set_audience(&[purpose.as_str()]);
        decode::<PurposeClaims>(
            token,
            &DecodingKey::from_secret(self.secrets.resolve(SecretKind::Access).as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
    }
}
