//! In-memory store used by unit and integration tests.
//!
//! State lives behind one `std::sync::Mutex`; critical sections are short
//! and never hold the lock across an `.await`.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use super::{
    EmailVerificationRecord, EmailVerificationStore, NewRefreshToken, PasskeyRecord, PasskeyStore,
    PasswordResetStore, RecoveryCodeRecord, RecoveryCodeStore, RefreshTokenRecord,
    RefreshTokenStore, SessionRecord, SessionStore, SocialAccountRecord, SocialAccountStore,
    TotpCredentialRecord, TotpStore, UserRecord, UserStore,
};

#[derive(Clone, Debug)]
struct PasswordResetRow {
    expires_at: DateTime<Utc>,
    used_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct Inner {
    users: HashMap<Uuid, UserRecord>,
    sessions: HashMap<Uuid, SessionRecord>,
    refresh_tokens: HashMap<Uuid, RefreshTokenRecord>,
    totp_credentials: HashMap<Uuid, TotpCredentialRecord>,
    email_verifications: HashMap<String, EmailVerificationRecord>,
    password_resets: HashMap<Uuid, PasswordResetRow>,
    social_accounts: Vec<SocialAccountRecord>,
    recovery_codes: Vec<RecoveryCodeRecord>,
    passkeys: Vec<PasskeyRecord>,
}

/// Mutex-guarded in-memory implementation of every store trait.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Test seeding: insert a user row directly.
    pub fn seed_user(&self, user: UserRecord) {
        let mut inner = self.lock();
        inner.users.insert(user.id, user);
    }

    /// Test seeding: insert a social link directly.
    pub fn seed_social_account(&self, user_id: Uuid, provider: &str, provider_user_id: &str) {
        let mut inner = self.lock();
        inner.social_accounts.push(SocialAccountRecord {
            id: Uuid::new_v4(),
            user_id,
            provider: provider.to_string(),
            provider_user_id: provider_user_id.to_string(),
            created_at: Utc::now(),
        });
    }

    /// Test seeding: insert a TOTP credential directly.
    pub fn seed_totp_credential(&self, user_id: Uuid, secret: &str, verified: bool) {
        let mut inner = self.lock();
        inner.totp_credentials.insert(
            user_id,
            TotpCredentialRecord {
                user_id,
                secret: secret.to_string(),
                verified,
            },
        );
    }

    /// Test observability: how many refresh-token rows exist for a session.
    #[must_use]
    pub fn refresh_token_count(&self, session_id: Uuid) -> usize {
        self.lock()
            .refresh_tokens
            .values()
            .filter(|row| row.session_id == session_id)
            .count()
    }

    /// Test observability: how many sessions exist for a user.
    #[must_use]
    pub fn session_count(&self, user_id: Uuid) -> usize {
        self.lock()
            .sessions
            .values()
            .filter(|row| row.user_id == user_id)
            .count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // Poisoning only happens if a test panicked mid-update.
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        Ok(self
            .lock()
            .users
            .values()
            .find(|user| user.email == email)
            .cloned())
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<UserRecord>> {
        Ok(self.lock().users.get(&id).cloned())
    }

    async fn set_password_hash(&self, user_id: Uuid, password_hash: &str) -> Result<()> {
        let mut inner = self.lock();
        let user = inner
            .users
            .get_mut(&user_id)
            .ok_or_else(|| anyhow!("no such user"))?;
        user.password_hash = Some(password_hash.to_string());
        Ok(())
    }

    async fn mark_email_verified(&self, user_id: Uuid) -> Result<()> {
        let mut inner = self.lock();
        let user = inner
            .users
            .get_mut(&user_id)
            .ok_or_else(|| anyhow!("no such user"))?;
        user.is_verified = true;
        user.email_verified_at = Some(Utc::now());
        Ok(())
    }

    async fn touch_last_login(&self, user_id: Uuid) -> Result<()> {
        let mut inner = self.lock();
        if let Some(user) = inner.users.get_mut(&user_id) {
            user.last_login_at = Some(Utc::now());
        }
        Ok(())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn insert_session(
        &self,
        user_id: Uuid,
        device: Option<&str>,
        ip: Option<&str>,
    ) -> Result<SessionRecord> {
        let now = Utc::now();
        let session = SessionRecord {
            id: Uuid::new_v4(),
            user_id,
            device: device.map(str::to_string),
            ip: ip.map(str::to_string),
            created_at: now,
            last_seen_at: now,
        };
        self.lock().sessions.insert(session.id, session.clone());
        Ok(session)
    }

    async fn find_session(&self, id: Uuid) -> Result<Option<SessionRecord>> {
        Ok(self.lock().sessions.get(&id).cloned())
    }

    async fn list_sessions(&self, user_id: Uuid) -> Result<Vec<SessionRecord>> {
        let mut sessions: Vec<SessionRecord> = self
            .lock()
            .sessions
            .values()
            .filter(|session| session.user_id == user_id)
            .cloned()
            .collect();
        sessions.sort_by_key(|session| session.created_at);
        Ok(sessions)
    }

    async fn delete_session(&self, id: Uuid) -> Result<()> {
        let mut inner = self.lock();
        // Refresh tokens first, mirroring the FK ordering in Postgres.
        inner.refresh_tokens.retain(|_, row| row.session_id != id);
        inner.sessions.remove(&id);
        Ok(())
    }

    async fn touch_session(&self, id: Uuid) -> Result<()> {
        let mut inner = self.lock();
        if let Some(session) = inner.sessions.get_mut(&id) {
            session.last_seen_at = Utc::now();
        }
        Ok(())
    }
}

#[async_trait]
impl RefreshTokenStore for MemoryStore {
    async fn insert_refresh_token(&self, token: &NewRefreshToken) -> Result<()> {
        let mut inner = self.lock();
        if inner.refresh_tokens.contains_key(&token.jti) {
            return Err(anyhow!("duplicate refresh token jti"));
        }
        inner.refresh_tokens.insert(
            token.jti,
            RefreshTokenRecord {
                jti: token.jti,
                user_id: token.user_id,
                session_id: token.session_id,
                issued_at: Utc::now(),
                revoked_at: None,
                rotated_from: token.rotated_from,
            },
        );
        Ok(())
    }

    async fn find_refresh_token(&self, jti: Uuid) -> Result<Option<RefreshTokenRecord>> {
        Ok(self.lock().refresh_tokens.get(&jti).cloned())
    }

    async fn revoke_refresh_token(&self, jti: Uuid) -> Result<()> {
        let mut inner = self.lock();
        let row = inner
            .refresh_tokens
            .get_mut(&jti)
            .ok_or_else(|| anyhow!("no such refresh token"))?;
        if row.revoked_at.is_none() {
            row.revoked_at = Some(Utc::now());
        }
        Ok(())
    }
}

#[async_trait]
impl TotpStore for MemoryStore {
    async fn totp_credential(&self, user_id: Uuid) -> Result<Option<TotpCredentialRecord>> {
        Ok(self.lock().totp_credentials.get(&user_id).cloned())
    }

    async fn upsert_totp_secret(&self, user_id: Uuid, secret: &str) -> Result<()> {
        self.lock().totp_credentials.insert(
            user_id,
            TotpCredentialRecord {
                user_id,
                secret: secret.to_string(),
                verified: false,
            },
        );
        Ok(())
    }

    async fn mark_totp_verified(&self, user_id: Uuid) -> Result<()> {
        let mut inner = self.lock();
        let cred = inner
            .totp_credentials
            .get_mut(&user_id)
            .ok_or_else(|| anyhow!("no totp credential"))?;
        cred.verified = true;
        Ok(())
    }
}

#[async_trait]
impl EmailVerificationStore for MemoryStore {
    async fn upsert_email_verification(
        &self,
        email: &str,
        code_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Uuid> {
        let record = EmailVerificationRecord {
            id: Uuid::new_v4(),
            email: email.to_string(),
            code_hash: code_hash.to_string(),
            expires_at,
            attempts: 0,
            used_at: None,
        };
        let id = record.id;
        self.lock()
            .email_verifications
            .insert(email.to_string(), record);
        Ok(id)
    }

    async fn active_email_verification(
        &self,
        email: &str,
    ) -> Result<Option<EmailVerificationRecord>> {
        Ok(self
            .lock()
            .email_verifications
            .get(email)
            .filter(|record| record.used_at.is_none() && record.expires_at > Utc::now())
            .cloned())
    }

    async fn record_verification_attempt(&self, id: Uuid) -> Result<()> {
        let mut inner = self.lock();
        for record in inner.email_verifications.values_mut() {
            if record.id == id {
                record.attempts += 1;
                return Ok(());
            }
        }
        Err(anyhow!("no such verification record"))
    }

    async fn mark_verification_used(&self, id: Uuid) -> Result<()> {
        let mut inner = self.lock();
        for record in inner.email_verifications.values_mut() {
            if record.id == id {
                record.used_at = Some(Utc::now());
                return Ok(());
            }
        }
        Err(anyhow!("no such verification record"))
    }
}

#[async_trait]
impl PasswordResetStore for MemoryStore {
    async fn insert_password_reset(
        &self,
        token_id: Uuid,
        _user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        self.lock().password_resets.insert(
            token_id,
            PasswordResetRow {
                expires_at,
                used_at: None,
            },
        );
        Ok(())
    }

    async fn consume_password_reset(&self, token_id: Uuid) -> Result<bool> {
        let mut inner = self.lock();
        let Some(row) = inner.password_resets.get_mut(&token_id) else {
            return Ok(false);
        };
        if row.used_at.is_some() || row.expires_at <= Utc::now() {
            return Ok(false);
        }
        row.used_at = Some(Utc::now());
        Ok(true)
    }
}

#[async_trait]
impl SocialAccountStore for MemoryStore {
    async fn find_social_account(
        &self,
        provider: &str,
        provider_user_id: &str,
    ) -> Result<Option<SocialAccountRecord>> {
        Ok(self
            .lock()
            .social_accounts
            .iter()
            .find(|link| link.provider == provider && link.provider_user_id == provider_user_id)
            .cloned())
    }

    async fn list_social_accounts(&self, user_id: Uuid) -> Result<Vec<SocialAccountRecord>> {
        Ok(self
            .lock()
            .social_accounts
            .iter()
            .filter(|link| link.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn link_social_account(
        &self,
        user_id: Uuid,
        provider: &str,
        provider_user_id: &str,
    ) -> Result<SocialAccountRecord> {
        let mut inner = self.lock();
        let exists = inner
            .social_accounts
            .iter()
            .any(|link| link.provider == provider && link.provider_user_id == provider_user_id);
        if exists {
            return Err(anyhow!("social account already linked"));
        }
        let record = SocialAccountRecord {
            id: Uuid::new_v4(),
            user_id,
            provider: provider.to_string(),
            provider_user_id: provider_user_id.to_string(),
            created_at: Utc::now(),
        };
        inner.social_accounts.push(record.clone());
        Ok(record)
    }

    async fn unlink_social_account(&self, user_id: Uuid, provider: &str) -> Result<bool> {
        let mut inner = self.lock();
        let before = inner.social_accounts.len();
        inner
            .social_accounts
            .retain(|link| !(link.user_id == user_id && link.provider == provider));
        Ok(inner.social_accounts.len() < before)
    }
}

#[async_trait]
impl RecoveryCodeStore for MemoryStore {
    async fn replace_recovery_codes(&self, user_id: Uuid, code_hashes: &[String]) -> Result<()> {
        let mut inner = self.lock();
        inner.recovery_codes.retain(|code| code.user_id != user_id);
        for hash in code_hashes {
            inner.recovery_codes.push(RecoveryCodeRecord {
                id: Uuid::new_v4(),
                user_id,
                code_hash: hash.clone(),
                used_at: None,
            });
        }
        Ok(())
    }

    async fn unused_recovery_codes(&self, user_id: Uuid) -> Result<Vec<RecoveryCodeRecord>> {
        Ok(self
            .lock()
            .recovery_codes
            .iter()
            .filter(|code| code.user_id == user_id && code.used_at.is_none())
            .cloned()
            .collect())
    }

    async fn mark_recovery_code_used(&self, id: Uuid) -> Result<()> {
        let mut inner = self.lock();
        let code = inner
            .recovery_codes
            .iter_mut()
            .find(|code| code.id == id)
            .ok_or_else(|| anyhow!("no such recovery code"))?;
        code.used_at = Some(Utc::now());
        Ok(())
    }
}

#[async_trait]
impl PasskeyStore for MemoryStore {
    async fn insert_passkey(
        &self,
        user_id: Uuid,
        credential_id: &[u8],
        credential_json: &str,
        label: &str,
    ) -> Result<()> {
        self.lock().passkeys.push(PasskeyRecord {
            id: Uuid::new_v4(),
            user_id,
            credential_id: credential_id.to_vec(),
            credential_json: credential_json.to_string(),
            label: label.to_string(),
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn list_passkeys(&self, user_id: Uuid) -> Result<Vec<PasskeyRecord>> {
        Ok(self
            .lock()
            .passkeys
            .iter()
            .filter(|key| key.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn update_passkey_credential(
        &self,
        credential_id: &[u8],
        credential_json: &str,
    ) -> Result<()> {
        let mut inner = self.lock();
        for key in &mut inner.passkeys {
            if key.credential_id == credential_id {
                key.credential_json = credential_json.to_string();
                return Ok(());
            }
        }
        Err(anyhow!("no such passkey"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(email: &str) -> UserRecord {
        UserRecord {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: None,
            name: None,
            phone: None,
            is_verified: false,
            is_active: true,
            email_verified_at: None,
            last_login_at: None,
            roles: vec!["customer".to_string()],
        }
    }

    #[tokio::test]
    async fn session_delete_removes_refresh_tokens_first() -> Result<()> {
        let store = MemoryStore::new();
        let owner = user("a@example.com");
        store.seed_user(owner.clone());
        let session = store.insert_session(owner.id, None, None).await?;
        store
            .insert_refresh_token(&NewRefreshToken {
                jti: Uuid::new_v4(),
                user_id: owner.id,
                session_id: session.id,
                rotated_from: None,
            })
            .await?;
        assert_eq!(store.refresh_token_count(session.id), 1);

        store.delete_session(session.id).await?;
        assert_eq!(store.refresh_token_count(session.id), 0);
        assert!(store.find_session(session.id).await?.is_none());

        // Idempotent: deleting again is a no-op.
        store.delete_session(session.id).await?;
        Ok(())
    }

    #[tokio::test]
    async fn email_verification_upsert_replaces_pending_record() -> Result<()> {
        let store = MemoryStore::new();
        let expires = Utc::now() + chrono::Duration::minutes(10);
        let first = store
            .upsert_email_verification("a@example.com", "hash-1", expires)
            .await?;
        let second = store
            .upsert_email_verification("a@example.com", "hash-2", expires)
            .await?;
        assert_ne!(first, second);

        let active = store
            .active_email_verification("a@example.com")
            .await?
            .expect("active record");
        assert_eq!(active.code_hash, "hash-2");
        Ok(())
    }

    #[tokio::test]
    async fn expired_verification_is_not_active() -> Result<()> {
        let store = MemoryStore::new();
        let expired = Utc::now() - chrono::Duration::minutes(1);
        store
            .upsert_email_verification("a@example.com", "hash", expired)
            .await?;
        assert!(store
            .active_email_verification("a@example.com")
            .await?
            .is_none());
        Ok(())
    }

    #[tokio::test]
    async fn password_reset_consumes_exactly_once() -> Result<()> {
        let store = MemoryStore::new();
        let token_id = Uuid::new_v4();
        store
            .insert_password_reset(
                token_id,
                Uuid::new_v4(),
                Utc::now() + chrono::Duration::minutes(5),
            )
            .await?;
        assert!(store.consume_password_reset(token_id).await?);
        assert!(!store.consume_password_reset(token_id).await?);
        assert!(!store.consume_password_reset(Uuid::new_v4()).await?);
        Ok(())
    }

    #[tokio::test]
    async fn recovery_batch_replacement_invalidates_old_codes() -> Result<()> {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        store
            .replace_recovery_codes(owner, &["old-1".to_string(), "old-2".to_string()])
            .await?;
        store
            .replace_recovery_codes(owner, &["new-1".to_string()])
            .await?;
        let unused = store.unused_recovery_codes(owner).await?;
        assert_eq!(unused.len(), 1);
        assert_eq!(unused[0].code_hash, "new-1");
        Ok(())
    }
}
