//! The auth orchestrator.
//!
//! `AuthService` owns every account-security operation: password + TOTP
//! sign-in, refresh rotation, session lifecycle, password reset, email
//! verification, recovery codes, and social links. It talks to storage
//! through the `AuthStore` traits and to TOTP/email through their ports, so
//! the whole service runs against in-memory fakes in tests.
//!
//! Failure discipline: anything credential-shaped fails with
//! `AuthError::Unauthorized` and an audit record; only infrastructure
//! failures surface as `Internal`.

use anyhow::{Context, Result as AnyResult};
use chrono::{Duration, Utc};
use rand::{rngs::OsRng, RngCore};
use serde_json::json;
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

use crate::api::email::{EmailMessage, EmailSender};
use crate::audit::{AuditAction, AuditEvent, AuditLog};
use crate::auth::error::AuthError;
use crate::auth::password;
use crate::auth::recovery::{self, RecoveryCodeBatch, DEFAULT_RECOVERY_CODE_COUNT};
use crate::social::SocialProfile;
use crate::store::{
    AuthStore, EmailVerificationStore, NewRefreshToken, PasswordResetStore, RecoveryCodeStore,
    RefreshTokenStore, SessionRecord, SessionStore, SocialAccountStore, TotpStore, UserRecord,
    UserStore,
};
use crate::token::{TokenIssuer, TokenPurpose};
use crate::totp::TotpAuthenticator;

const OTP_TTL_MINUTES: i64 = 15;
const MAX_OTP_ATTEMPTS: i32 = 5;

/// Request-scoped client metadata recorded on new sessions.
#[derive(Clone, Debug, Default)]
pub struct SessionMeta {
    pub device: Option<String>,
    pub ip: Option<String>,
}

/// A freshly issued access/refresh pair bound to one session.
#[derive(Clone, Debug)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub session_id: Uuid,
    pub access_expires_in: i64,
}

/// Outcome of the password step of sign-in.
#[derive(Clone, Debug)]
pub enum SignInOutcome {
    /// No verified TOTP credential: the session exists and tokens are live.
    Complete(TokenPair),
    /// A verified TOTP credential gates this account. No session exists yet;
    /// the temp token (audience `totp`) is the only artifact.
    TotpRequired { temp_token: String },
}

/// Material returned from TOTP enrollment start.
#[derive(Clone, Debug)]
pub struct TotpEnrollment {
    pub secret_base32: String,
    pub otpauth_url: String,
}

pub struct AuthService {
    store: Arc<dyn AuthStore>,
    tokens: TokenIssuer,
    totp: Arc<dyn TotpAuthenticator>,
    email: Arc<dyn EmailSender>,
    audit: AuditLog,
    frontend_base_url: String,
}

impl AuthService {
    #[must_use]
    pub fn new(
        store: Arc<dyn AuthStore>,
        tokens: TokenIssuer,
        totp: Arc<dyn TotpAuthenticator>,
        email: Arc<dyn EmailSender>,
        audit: AuditLog,
        frontend_base_url: String,
    ) -> Self {
        Self {
            store,
            tokens,
            totp,
            email,
            audit,
            frontend_base_url,
        }
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }

    /// Password step of sign-in.
    ///
    /// Unknown email, password-less account, inactive account, and wrong
    /// password all fail identically.
    ///
    /// # Errors
    /// `Unauthorized` for any credential failure; `Internal` for store errors.
    pub async fn sign_in(
        &self,
        email: &str,
        password_input: &str,
        meta: &SessionMeta,
    ) -> Result<SignInOutcome, AuthError> {
        let Some(user) = self.store.find_user_by_email(email).await? else {
            return Err(self.login_failure(None, meta));
        };
        if !user.is_active {
            return Err(self.login_failure(Some(user.id), meta));
        }
        let Some(stored_hash) = user.password_hash.as_deref() else {
            // Social-only account: a password can never match.
            return Err(self.login_failure(Some(user.id), meta));
        };
        if !password::verify_password(password_input, stored_hash) {
            return Err(self.login_failure(Some(user.id), meta));
        }

        let totp_gated = self
            .store
            .totp_credential(user.id)
            .await?
            .is_some_and(|cred| cred.verified);
        if totp_gated {
            let (temp_token, _) = self
                .tokens
                .sign_purpose(user.id, TokenPurpose::Totp)
                .context("failed to sign totp challenge token")?;
            self.audit.record(
                &AuditEvent::new(AuditAction::TotpChallengeIssued)
                    .user(user.id)
                    .ip(meta.ip.clone()),
            );
            return Ok(SignInOutcome::TotpRequired { temp_token });
        }

        let pair = self.create_session_and_issue(&user, meta).await?;
        self.store.touch_last_login(user.id).await?;
        self.audit.record(
            &AuditEvent::new(AuditAction::LoginSuccess)
                .user(user.id)
                .session(pair.session_id)
                .ip(meta.ip.clone()),
        );
        Ok(SignInOutcome::Complete(pair))
    }

    /// Complete an MFA-gated sign-in with a temp token and a TOTP code.
    ///
    /// # Errors
    /// `Unauthorized` for a bad/expired/wrong-audience token, a bad code, or
    /// a vanished user/credential.
    pub async fn sign_in_with_totp(
        &self,
        temp_token: &str,
        totp_code: &str,
        meta: &SessionMeta,
    ) -> Result<TokenPair, AuthError> {
        let claims = self
            .tokens
            .verify_purpose(temp_token, TokenPurpose::Totp)
            .map_err(|_| AuthError::Unauthorized)?;
        let user_id = parse_uuid(&claims.sub)?;

        let cred = self
            .store
            .totp_credential(user_id)
            .await?
            .filter(|cred| cred.verified)
            .ok_or(AuthError::Unauthorized)?;
        if !self.totp.verify(&cred.secret, totp_code)? {
            self.audit.record(
                &AuditEvent::new(AuditAction::TotpFailure)
                    .user(user_id)
                    .ip(meta.ip.clone()),
            );
            return Err(AuthError::Unauthorized);
        }

        let Some(user) = self.store.find_user_by_id(user_id).await? else {
            return Err(AuthError::Unauthorized);
        };
        let pair = self.create_session_and_issue(&user, meta).await?;
        self.store.touch_last_login(user.id).await?;
        self.audit.record(
            &AuditEvent::new(AuditAction::LoginSuccess)
                .user(user.id)
                .session(pair.session_id)
                .ip(meta.ip.clone()),
        );
        Ok(pair)
    }

    /// Mint a fresh session + token pair for an externally authenticated user
    /// (passkey assertion, social callback).
    ///
    /// # Errors
    /// `Unauthorized` if the user is missing or inactive.
    pub async fn issue_tokens_for_user(
        &self,
        user_id: Uuid,
        meta: &SessionMeta,
    ) -> Result<TokenPair, AuthError> {
        let Some(user) = self.store.find_user_by_id(user_id).await? else {
            return Err(AuthError::Unauthorized);
        };
        if !user.is_active {
            return Err(AuthError::Unauthorized);
        }
        let pair = self.create_session_and_issue(&user, meta).await?;
        self.store.touch_last_login(user.id).await?;
        Ok(pair)
    }

    /// Passkey completion: the assertion already verified, mint the session.
    ///
    /// # Errors
    /// `Unauthorized` if the user is missing or inactive.
    pub async fn sign_in_with_passkey(
        &self,
        user_id: Uuid,
        meta: &SessionMeta,
    ) -> Result<TokenPair, AuthError> {
        let pair = self.issue_tokens_for_user(user_id, meta).await?;
        self.audit.record(
            &AuditEvent::new(AuditAction::WebauthnSignIn)
                .user(user_id)
                .session(pair.session_id)
                .ip(meta.ip.clone()),
        );
        Ok(pair)
    }

    /// Rotate a refresh token: revoke the presented `jti`, then issue a new
    /// pair bound to the same session.
    ///
    /// Presenting an already-revoked token is treated as a compromise signal
    /// and audited, not as a stale client.
    ///
    /// # Errors
    /// `Unauthorized` for bad signatures, unknown or revoked `jti`s, and
    /// vanished users.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let claims = self
            .tokens
            .verify_refresh(refresh_token)
            .map_err(|_| AuthError::Unauthorized)?;
        let jti = parse_uuid(&claims.jti)?;

        let Some(record) = self.store.find_refresh_token(jti).await? else {
            return Err(AuthError::Unauthorized);
        };
        if record.revoked_at.is_some() {
            self.audit.record(
                &AuditEvent::new(AuditAction::RefreshReuseDetected)
                    .user(record.user_id)
                    .session(record.session_id),
            );
            return Err(AuthError::Unauthorized);
        }

        let user_id = parse_uuid(&claims.sub)?;
        let Some(user) = self.store.find_user_by_id(user_id).await? else {
            return Err(AuthError::Unauthorized);
        };

        // Revoke-then-issue is not transactional across the two store calls.
        // A crash in between strands a revoked token with no successor; the
        // client re-authenticates. See DESIGN.md.
        self.store.revoke_refresh_token(jti).await?;
        let pair = self.issue_pair(&user, record.session_id, Some(jti)).await?;
        self.store.touch_session(record.session_id).await?;
        self.audit.record(
            &AuditEvent::new(AuditAction::RefreshRotated)
                .user(user.id)
                .session(record.session_id),
        );
        Ok(pair)
    }

    /// Idempotent logout: deleting a missing session is a no-op.
    ///
    /// # Errors
    /// `Internal` only; absence is not an error.
    pub async fn logout(&self, session_id: Uuid) -> Result<(), AuthError> {
        self.store.delete_session(session_id).await?;
        self.audit
            .record(&AuditEvent::new(AuditAction::Logout).session(session_id));
        Ok(())
    }

    /// # Errors
    /// `Internal` on store failure.
    pub async fn list_sessions(&self, user_id: Uuid) -> Result<Vec<SessionRecord>, AuthError> {
        Ok(self.store.list_sessions(user_id).await?)
    }

    /// Revoke one of the requesting user's own sessions.
    ///
    /// # Errors
    /// `Unauthorized` when the session is missing or owned by someone else.
    pub async fn revoke_session(
        &self,
        user_id: Uuid,
        session_id: Uuid,
    ) -> Result<(), AuthError> {
        let Some(session) = self.store.find_session(session_id).await? else {
            // Missing folds into Unauthorized: existence of other users'
            // sessions is not observable.
            return Err(AuthError::Unauthorized);
        };
        if session.user_id != user_id {
            return Err(AuthError::Unauthorized);
        }
        self.store.delete_session(session_id).await?;
        self.audit.record(
            &AuditEvent::new(AuditAction::SessionRevoked)
                .user(user_id)
                .session(session_id),
        );
        Ok(())
    }

    /// Always succeeds from the caller's perspective; a missing account is a
    /// silent no-op and delivery failures only reach the logs.
    ///
    /// # Errors
    /// `Internal` on store failure.
    pub async fn request_password_reset(&self, email: &str) -> Result<(), AuthError> {
        let Some(user) = self.store.find_user_by_email(email).await? else {
            return Ok(());
        };
        let (token, jti) = self
            .tokens
            .sign_purpose(user.id, TokenPurpose::Reset)
            .context("failed to sign password reset token")?;
        let expires_at = Utc::now() + Duration::seconds(self.tokens.purpose_ttl_seconds());
        self.store
            .insert_password_reset(jti, user.id, expires_at)
            .await?;

        let reset_url = format!(
            "{}/reset-password#token={token}",
            self.frontend_base_url.trim_end_matches('/')
        );
        let message = EmailMessage {
            to_email: user.email.clone(),
            template: "password_reset",
            payload_json: json!({
                "email": user.email,
                "reset_url": reset_url,
            })
            .to_string(),
        };
        if let Err(err) = self.email.send(&message) {
            error!("Failed to send password reset email: {err}");
        }
        self.audit
            .record(&AuditEvent::new(AuditAction::PasswordResetRequested).user(user.id));
        Ok(())
    }

    /// Consume a reset token (audience `reset`, single-use) and set the new
    /// password hash.
    ///
    /// # Errors
    /// `Unauthorized` for bad/expired/reused tokens.
    pub async fn reset_password(
        &self,
        token: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        let claims = self
            .tokens
            .verify_purpose(token, TokenPurpose::Reset)
            .map_err(|_| AuthError::Unauthorized)?;
        let jti = parse_uuid(&claims.jti)?;
        if !self.store.consume_password_reset(jti).await? {
            return Err(AuthError::Unauthorized);
        }
        let user_id = parse_uuid(&claims.sub)?;
        let Some(user) = self.store.find_user_by_id(user_id).await? else {
            return Err(AuthError::Unauthorized);
        };
        let hash = password::hash_password(new_password)?;
        self.store.set_password_hash(user.id, &hash).await?;
        self.audit
            .record(&AuditEvent::new(AuditAction::PasswordResetCompleted).user(user.id));
        Ok(())
    }

    /// Issue (or reissue) a verification OTP + link for an unverified
    /// account. Missing or already-verified accounts are silent no-ops.
    ///
    /// # Errors
    /// `Internal` on store failure.
    pub async fn request_email_verification(&self, email: &str) -> Result<(), AuthError> {
        let Some(user) = self.store.find_user_by_email(email).await? else {
            return Ok(());
        };
        if user.email_verified_at.is_some() || user.is_verified {
            return Ok(());
        }

        let otp = generate_otp()?;
        let code_hash = password::hash_password(&otp)?;
        let expires_at = Utc::now() + Duration::minutes(OTP_TTL_MINUTES);
        self.store
            .upsert_email_verification(&user.email, &code_hash, expires_at)
            .await?;

        let (verify_token, _) = self
            .tokens
            .sign_purpose(user.id, TokenPurpose::Verify)
            .context("failed to sign verification token")?;
        let verify_url = format!(
            "{}/verify-email#token={verify_token}",
            self.frontend_base_url.trim_end_matches('/')
        );
        let message = EmailMessage {
            to_email: user.email.clone(),
            template: "verify_email",
            payload_json: json!({
                "email": user.email,
                "otp": otp,
                "verify_url": verify_url,
            })
            .to_string(),
        };
        if let Err(err) = self.email.send(&message) {
            error!("Failed to send verification email: {err}");
        }
        self.audit
            .record(&AuditEvent::new(AuditAction::EmailVerificationRequested).user(user.id));
        Ok(())
    }

    /// Link-based verification: audience `verify` is the hard gate.
    ///
    /// # Errors
    /// `Unauthorized` for bad/expired/wrong-audience tokens.
    pub async fn verify_email(&self, token: &str) -> Result<(), AuthError> {
        let claims = self
            .tokens
            .verify_purpose(token, TokenPurpose::Verify)
            .map_err(|_| AuthError::Unauthorized)?;
        let user_id = parse_uuid(&claims.sub)?;
        let Some(user) = self.store.find_user_by_id(user_id).await? else {
            return Err(AuthError::Unauthorized);
        };
        self.store.mark_email_verified(user.id).await?;
        self.audit
            .record(&AuditEvent::new(AuditAction::EmailVerified).user(user.id));
        Ok(())
    }

    /// OTP-based verification. Succeeds exactly once per issued OTP.
    ///
    /// # Errors
    /// `Unauthorized` for missing/expired/used records, exhausted attempts,
    /// and mismatched codes.
    pub async fn verify_email_otp(&self, email: &str, otp: &str) -> Result<(), AuthError> {
        let Some(record) = self.store.active_email_verification(email).await? else {
            return Err(AuthError::Unauthorized);
        };
        if record.attempts >= MAX_OTP_ATTEMPTS {
            return Err(AuthError::Unauthorized);
        }
        if !password::verify_password(otp, &record.code_hash) {
            self.store.record_verification_attempt(record.id).await?;
            return Err(AuthError::Unauthorized);
        }
        self.store.mark_verification_used(record.id).await?;
        let Some(user) = self.store.find_user_by_email(email).await? else {
            return Err(AuthError::Unauthorized);
        };
        self.store.mark_email_verified(user.id).await?;
        self.audit
            .record(&AuditEvent::new(AuditAction::EmailVerified).user(user.id));
        Ok(())
    }

    /// Start TOTP enrollment: generate and stage an unverified secret.
    ///
    /// # Errors
    /// `Unauthorized` for unknown users, `BadRequest` when a verified
    /// credential already exists.
    pub async fn totp_enroll_start(&self, user_id: Uuid) -> Result<TotpEnrollment, AuthError> {
        let Some(user) = self.store.find_user_by_id(user_id).await? else {
            return Err(AuthError::Unauthorized);
        };
        if self
            .store
            .totp_credential(user.id)
            .await?
            .is_some_and(|cred| cred.verified)
        {
            return Err(AuthError::BadRequest("totp already enrolled"));
        }
        let secret = self.totp.generate_secret()?;
        self.store.upsert_totp_secret(user.id, &secret).await?;
        let otpauth_url = self.totp.provisioning_uri(&secret, &user.email)?;
        Ok(TotpEnrollment {
            secret_base32: secret,
            otpauth_url,
        })
    }

    /// Confirm enrollment with the first code; only then does the credential
    /// start gating login.
    ///
    /// # Errors
    /// `Unauthorized` when no staged credential exists or the code is wrong.
    pub async fn totp_enroll_confirm(
        &self,
        user_id: Uuid,
        code: &str,
    ) -> Result<(), AuthError> {
        let Some(cred) = self.store.totp_credential(user_id).await? else {
            return Err(AuthError::Unauthorized);
        };
        if cred.verified {
            return Ok(());
        }
        if !self.totp.verify(&cred.secret, code)? {
            self.audit
                .record(&AuditEvent::new(AuditAction::TotpFailure).user(user_id));
            return Err(AuthError::Unauthorized);
        }
        self.store.mark_totp_verified(user_id).await?;
        Ok(())
    }

    /// Issue a fresh recovery-code batch, invalidating any previous batch.
    /// Returns the plaintext codes; only hashes are stored.
    ///
    /// # Errors
    /// `Unauthorized` for unknown users, `Internal` on store failure.
    pub async fn generate_recovery_codes(
        &self,
        user_id: Uuid,
        count: Option<usize>,
    ) -> Result<Vec<String>, AuthError> {
        if self.store.find_user_by_id(user_id).await?.is_none() {
            return Err(AuthError::Unauthorized);
        }
        let count = count.unwrap_or(DEFAULT_RECOVERY_CODE_COUNT);
        let batch = RecoveryCodeBatch::generate(count)?;
        self.store
            .replace_recovery_codes(user_id, &batch.code_hashes)
            .await?;
        self.audit
            .record(&AuditEvent::new(AuditAction::RecoveryCodesGenerated).user(user_id));
        Ok(batch.codes)
    }

    /// Consume a recovery code. Returns `false` (rather than erroring) for
    /// invalid or already-used codes; the transport translates that.
    ///
    /// # Errors
    /// `Internal` on store failure.
    pub async fn verify_recovery_code(
        &self,
        user_id: Uuid,
        code: &str,
    ) -> Result<bool, AuthError> {
        let candidates = self.store.unused_recovery_codes(user_id).await?;
        for record in candidates {
            if recovery::verify_recovery_code(code, &record.code_hash)? {
                self.store.mark_recovery_code_used(record.id).await?;
                self.audit
                    .record(&AuditEvent::new(AuditAction::RecoveryCodeConsumed).user(user_id));
                return Ok(true);
            }
        }
        self.audit
            .record(&AuditEvent::new(AuditAction::RecoveryCodeRejected).user(user_id));
        Ok(false)
    }

    /// Social sign-in resolves strictly through an existing
    /// `(provider, provider_user_id)` link. No auto-link by email: an
    /// attacker controlling a matching address elsewhere must not inherit
    /// the account.
    ///
    /// # Errors
    /// `Unauthorized` when no explicit link exists.
    pub async fn sign_in_with_social(
        &self,
        profile: &SocialProfile,
        meta: &SessionMeta,
    ) -> Result<TokenPair, AuthError> {
        let Some(link) = self
            .store
            .find_social_account(&profile.provider, &profile.provider_user_id)
            .await?
        else {
            return Err(AuthError::Unauthorized);
        };
        let pair = self.issue_tokens_for_user(link.user_id, meta).await?;
        self.audit.record(
            &AuditEvent::new(AuditAction::SocialSignIn)
                .user(link.user_id)
                .session(pair.session_id)
                .detail(profile.provider.clone()),
        );
        Ok(pair)
    }

    /// Attach a provider identity to an already-authenticated user.
    ///
    /// # Errors
    /// `BadRequest` if the provider identity is already linked somewhere.
    pub async fn link_social_account(
        &self,
        user_id: Uuid,
        provider: &str,
        provider_user_id: &str,
    ) -> Result<(), AuthError> {
        if self
            .store
            .find_social_account(provider, provider_user_id)
            .await?
            .is_some()
        {
            return Err(AuthError::BadRequest("social account already linked"));
        }
        self.store
            .link_social_account(user_id, provider, provider_user_id)
            .await?;
        self.audit.record(
            &AuditEvent::new(AuditAction::SocialLinked)
                .user(user_id)
                .detail(provider.to_string()),
        );
        Ok(())
    }

    /// Remove a provider link, refusing to strand the account: the user must
    /// keep a password or at least one other linked provider.
    ///
    /// # Errors
    /// `NotFound` when no such link exists, `BadRequest` when it is the last
    /// authentication method.
    pub async fn unlink_social_account(
        &self,
        user_id: Uuid,
        provider: &str,
    ) -> Result<(), AuthError> {
        let Some(user) = self.store.find_user_by_id(user_id).await? else {
            return Err(AuthError::Unauthorized);
        };
        let links = self.store.list_social_accounts(user_id).await?;
        if !links.iter().any(|link| link.provider == provider) {
            return Err(AuthError::NotFound);
        }
        let keeps_a_method =
            user.password_hash.is_some() || links.iter().any(|link| link.provider != provider);
        if !keeps_a_method {
            return Err(AuthError::BadRequest(
                "cannot remove the last sign-in method",
            ));
        }
        self.store.unlink_social_account(user_id, provider).await?;
        self.audit.record(
            &AuditEvent::new(AuditAction::SocialUnlinked)
                .user(user_id)
                .detail(provider.to_string()),
        );
        Ok(())
    }

    /// # Errors
    /// `Internal` on store failure.
    pub async fn user_by_email(&self, email: &str) -> Result<Option<UserRecord>, AuthError> {
        Ok(self.store.find_user_by_email(email).await?)
    }

    fn login_failure(&self, user_id: Option<Uuid>, meta: &SessionMeta) -> AuthError {
        let mut event = AuditEvent::new(AuditAction::LoginFailure).ip(meta.ip.clone());
        if let Some(id) = user_id {
            event = event.user(id);
        }
        self.audit.record(&event);
        AuthError::Unauthorized
    }

    async fn create_session_and_issue(
        &self,
        user: &UserRecord,
        meta: &SessionMeta,
    ) -> Result<TokenPair, AuthError> {
        let session = self
            .store
            .insert_session(user.id, meta.device.as_deref(), meta.ip.as_deref())
            .await?;
        self.issue_pair(user, session.id, None).await
    }

    async fn issue_pair(
        &self,
        user: &UserRecord,
        session_id: Uuid,
        rotated_from: Option<Uuid>,
    ) -> Result<TokenPair, AuthError> {
        let (refresh_token, jti) = self
            .tokens
            .sign_refresh(user.id, session_id)
            .context("failed to sign refresh token")?;
        // The row must exist before the token leaves the issuer, otherwise a
        // fast client could present a refresh token we do not know about.
        self.store
            .insert_refresh_token(&NewRefreshToken {
                jti,
                user_id: user.id,
                session_id,
                rotated_from,
            })
            .await?;
        let access_token = self
            .tokens
            .sign_access(user.id, &user.email, session_id, &user.roles)
            .context("failed to sign access token")?;
        Ok(TokenPair {
            access_token,
            refresh_token,
            session_id,
            access_expires_in: self.tokens.access_ttl_seconds(),
        })
    }
}

fn parse_uuid(value: &str) -> Result<Uuid, AuthError> {
    Uuid::parse_str(value).map_err(|_| AuthError::Unauthorized)
}

fn generate_otp() -> AnyResult<String> {
    let mut bytes = [0u8; 4];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate verification otp")?;
    let value = u32::from_be_bytes(bytes) % 1_000_000;
    Ok(format!("{value:06}"))
}
