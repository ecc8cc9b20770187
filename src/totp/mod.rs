//! TOTP port and its `totp-rs` implementation.
//!
//! The auth service depends on the trait only; tests substitute a fake that
//! accepts a fixed code.

use anyhow::{anyhow, Result};
use totp_rs::{Algorithm, Secret, TOTP};

const TOTP_DIGITS: usize = 6;
const TOTP_SKEW: u8 = 1;
const TOTP_STEP: u64 = 30;

/// Pluggable TOTP operations over base32-encoded secrets.
pub trait TotpAuthenticator: Send + Sync {
    /// Generate a fresh base32 secret for enrollment.
    fn generate_secret(&self) -> Result<String>;

    /// Build the `otpauth://` provisioning URI shown to the user's app.
    fn provisioning_uri(&self, secret_base32: &str, account: &str) -> Result<String>;

    /// Check a 6-digit code against the secret, allowing one step of skew.
    fn verify(&self, secret_base32: &str, code: &str) -> Result<bool>;
}

/// `totp-rs`-backed authenticator. The issuer shows up in authenticator apps.
#[derive(Clone, Debug)]
pub struct TotpRsAuthenticator {
    issuer: String,
}

impl TotpRsAuthenticator {
    #[must_use]
    pub fn new(issuer: String) -> Self {
        Self { issuer }
    }

    fn totp(&self, secret_base32: &str, account: &str) -> Result<TOTP> {
        let secret_bytes = Secret::Encoded(secret_base32.to_string())
            .to_bytes()
            .map_err(|e| anyhow!("invalid TOTP secret: {e:?}"))?;
        TOTP::new(
            Algorithm::SHA1,
            TOTP_DIGITS,
            TOTP_SKEW,
            TOTP_STEP,
            secret_bytes,
            Some(self.issuer.clone()),
            account.to_string(),
        )
        .map_err(|e| anyhow!("TOTP init error: {e}"))
    }
}

impl TotpAuthenticator for TotpRsAuthenticator {
    fn generate_secret(&self) -> Result<String> {
        let secret = Secret::generate_secret();
        // Round-trip through bytes so the stored value is canonical base32.
        let bytes = secret
            .to_bytes()
            .map_err(|e| anyhow!("secret generation error: {e:?}"))?;
        match Secret::Raw(bytes).to_encoded() {
            Secret::Encoded(encoded) => Ok(encoded),
            Secret::Raw(_) => Err(anyhow!("secret encoding failed")),
        }
    }

    fn provisioning_uri(&self, secret_base32: &str, account: &str) -> Result<String> {
        let totp = self.totp(secret_base32, account)?;
        Ok(totp.get_url())
    }

    fn verify(&self, secret_base32: &str, code: &str) -> Result<bool> {
        // The label does not participate in code verification.
        let totp = self.totp(secret_base32, "account")?;
        Ok(totp.check_current(code).unwrap_or(false))
    }
}
