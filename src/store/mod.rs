//! Repository contracts for the credential and session store.
//!
//! The auth service is storage-agnostic: it talks to these traits only, so
//! the Postgres implementation can be swapped for the in-memory store in
//! unit and integration tests. All timestamps are server-assigned UTC and
//! every identifier is opaque beyond uniqueness.

pub mod memory;
pub mod postgres;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Clone, Debug)]
pub struct UserRecord {
    pub id: Uuid,
    pub email: String,
    /// Absent for social-only accounts.
    pub password_hash: Option<String>,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub is_verified: bool,
    pub is_active: bool,
    pub email_verified_at: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub roles: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct SessionRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub device: Option<String>,
    pub ip: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct RefreshTokenRecord {
    pub jti: Uuid,
    pub user_id: Uuid,
    pub session_id: Uuid,
    pub issued_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    /// Audit lineage only; not an ownership edge.
    pub rotated_from: Option<Uuid>,
}

#[derive(Clone, Debug)]
pub struct NewRefreshToken {
    pub jti: Uuid,
    pub user_id: Uuid,
    pub session_id: Uuid,
    pub rotated_from: Option<Uuid>,
}

#[derive(Clone, Debug)]
pub struct TotpCredentialRecord {
    pub user_id: Uuid,
    pub secret: String,
    /// Only a verified credential gates login behind MFA.
    pub verified: bool,
}

#[derive(Clone, Debug)]
pub struct EmailVerificationRecord {
    pub id: Uuid,
    pub email: String,
    pub code_hash: String,
    pub expires_at: DateTime<Utc>,
    pub attempts: i32,
    pub used_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug)]
pub struct SocialAccountRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub provider: String,
    pub provider_user_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct RecoveryCodeRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub code_hash: String,
    pub used_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug)]
pub struct PasskeyRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub credential_id: Vec<u8>,
    /// Serialized `webauthn-rs` credential.
    pub credential_json: String,
    pub label: String,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>>;
    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<UserRecord>>;
    async fn set_password_hash(&self, user_id: Uuid, password_hash: &str) -> Result<()>;
    async fn mark_email_verified(&self, user_id: Uuid) -> Result<()>;
    async fn touch_last_login(&self, user_id: Uuid) -> Result<()>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert_session(
        &self,
        user_id: Uuid,
        device: Option<&str>,
        ip: Option<&str>,
    ) -> Result<SessionRecord>;
    async fn find_session(&self, id: Uuid) -> Result<Option<SessionRecord>>;
    async fn list_sessions(&self, user_id: Uuid) -> Result<Vec<SessionRecord>>;
    /// Deletes dependent refresh tokens first, then the session row.
    /// Idempotent: deleting a missing session is not an error.
    async fn delete_session(&self, id: Uuid) -> Result<()>;
    async fn touch_session(&self, id: Uuid) -> Result<()>;
}

#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    async fn insert_refresh_token(&self, token: &NewRefreshToken) -> Result<()>;
    async fn find_refresh_token(&self, jti: Uuid) -> Result<Option<RefreshTokenRecord>>;
    async fn revoke_refresh_token(&self, jti: Uuid) -> Result<()>;
}

#[async_trait]
pub trait TotpStore: Send + Sync {
    async fn totp_credential(&self, user_id: Uuid) -> Result<Option<TotpCredentialRecord>>;
    /// Creates or replaces the (unverified) enrollment secret.
    async fn upsert_totp_secret(&self, user_id: Uuid, secret: &str) -> Result<()>;
    async fn mark_totp_verified(&self, user_id: Uuid) -> Result<()>;
}

#[async_trait]
pub trait EmailVerificationStore: Send + Sync {
    /// Creates or replaces the pending record for this email.
    async fn upsert_email_verification(
        &self,
        email: &str,
        code_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Uuid>;
    /// The active record: unused and unexpired.
    async fn active_email_verification(&self, email: &str)
        -> Result<Option<EmailVerificationRecord>>;
    async fn record_verification_attempt(&self, id: Uuid) -> Result<()>;
    async fn mark_verification_used(&self, id: Uuid) -> Result<()>;
}

#[async_trait]
pub trait PasswordResetStore: Send + Sync {
    async fn insert_password_reset(
        &self,
        token_id: Uuid,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<()>;
    /// Marks the record used iff it is unused and unexpired; returns whether
    /// the caller won the consume.
    async fn consume_password_reset(&self, token_id: Uuid) -> Result<bool>;
}

#[async_trait]
pub trait SocialAccountStore: Send + Sync {
    async fn find_social_account(
        &self,
        provider: &str,
        provider_user_id: &str,
    ) -> Result<Option<SocialAccountRecord>>;
    async fn list_social_accounts(&self, user_id: Uuid) -> Result<Vec<SocialAccountRecord>>;
    async fn link_social_account(
        &self,
        user_id: Uuid,
        provider: &str,
        provider_user_id: &str,
    ) -> Result<SocialAccountRecord>;
    /// Returns whether a link was removed.
    async fn unlink_social_account(&self, user_id: Uuid, provider: &str) -> Result<bool>;
}

#[async_trait]
pub trait RecoveryCodeStore: Send + Sync {
    /// Replaces any previous batch: unused codes from older batches stop
    /// working the moment a new batch is issued.
    async fn replace_recovery_codes(&self, user_id: Uuid, code_hashes: &[String]) -> Result<()>;
    async fn unused_recovery_codes(&self, user_id: Uuid) -> Result<Vec<RecoveryCodeRecord>>;
    async fn mark_recovery_code_used(&self, id: Uuid) -> Result<()>;
}

#[async_trait]
pub trait PasskeyStore: Send + Sync {
    async fn insert_passkey(
        &self,
        user_id: Uuid,
        credential_id: &[u8],
        credential_json: &str,
        label: &str,
    ) -> Result<()>;
    async fn list_passkeys(&self, user_id: Uuid) -> Result<Vec<PasskeyRecord>>;
    async fn update_passkey_credential(
        &self,
        credential_id: &[u8],
        credential_json: &str,
    ) -> Result<()>;
}

/// Everything the auth service needs, as one injectable handle.
pub trait AuthStore:
    UserStore
    + SessionStore
    + RefreshTokenStore
    + TotpStore
    + EmailVerificationStore
    + PasswordResetStore
    + SocialAccountStore
    + RecoveryCodeStore
    + PasskeyStore
    + Send
    + Sync
{
}

impl<T> AuthStore for T where
    T: UserStore
        + SessionStore
        + RefreshTokenStore
        + TotpStore
        + EmailVerificationStore
        + PasswordResetStore
        + SocialAccountStore
        + RecoveryCodeStore
        + PasskeyStore
        + Send
        + Sync
{
}
