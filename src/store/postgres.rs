//! Postgres-backed credential and session store.
//!
//! Every query runs inside a `db.query` span so traces show the statement
//! and operation. Session deletion removes dependent refresh-token rows
//! first, inside one transaction; that ordering keeps the foreign keys
//! satisfied and is load-bearing.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::{
    EmailVerificationRecord, EmailVerificationStore, NewRefreshToken, PasskeyRecord, PasskeyStore,
    PasswordResetStore, RecoveryCodeRecord, RecoveryCodeStore, RefreshTokenRecord,
    RefreshTokenStore, SessionRecord, SessionStore, SocialAccountRecord, SocialAccountStore,
    TotpCredentialRecord, TotpStore, UserRecord, UserStore,
};

/// Shared-pool store handle.
#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn user_roles(&self, user_id: Uuid) -> Result<Vec<String>> {
        let query = r"
            SELECT roles.name
            FROM user_roles
            JOIN roles ON roles.id = user_roles.role_id
            WHERE user_roles.user_id = $1
            ORDER BY user_roles.position
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let rows = sqlx::query(query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .context("failed to fetch user roles")?;
        Ok(rows.iter().map(|row| row.get("name")).collect())
    }

    async fn user_from_row(&self, row: &sqlx::postgres::PgRow) -> Result<UserRecord> {
        let id: Uuid = row.get("id");
        let roles = self.user_roles(id).await?;
        Ok(UserRecord {
            id,
            email: row.get("email"),
            password_hash: row.get("password_hash"),
            name: row.get("name"),
            phone: row.get("phone"),
            is_verified: row.get("is_verified"),
            is_active: row.get("is_active"),
            email_verified_at: row.get("email_verified_at"),
            last_login_at: row.get("last_login_at"),
            roles,
        })
    }
}

const USER_COLUMNS: &str = "id, email, password_hash, name, phone, is_verified, is_active, \
                            email_verified_at, last_login_at";

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup user by email")?;
        match row {
            Some(row) => Ok(Some(self.user_from_row(&row).await?)),
            None => Ok(None),
        }
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<UserRecord>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup user by id")?;
        match row {
            Some(row) => Ok(Some(self.user_from_row(&row).await?)),
            None => Ok(None),
        }
    }

    async fn set_password_hash(&self, user_id: Uuid, password_hash: &str) -> Result<()> {
        let query = r"
            UPDATE users
            SET password_hash = $2, updated_at = NOW()
            WHERE id = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(user_id)
            .bind(password_hash)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to update password hash")?;
        if result.rows_affected() == 0 {
            return Err(anyhow!("no such user"));
        }
        Ok(())
    }

    async fn mark_email_verified(&self, user_id: Uuid) -> Result<()> {
        let query = r"
            UPDATE users
            SET is_verified = TRUE, email_verified_at = NOW(), updated_at = NOW()
            WHERE id = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(user_id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to mark email verified")?;
        Ok(())
    }

    async fn touch_last_login(&self, user_id: Uuid) -> Result<()> {
        let query = "UPDATE users SET last_login_at = NOW() WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(user_id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to touch last login")?;
        Ok(())
    }
}

fn session_from_row(row: &sqlx::postgres::PgRow) -> SessionRecord {
    SessionRecord {
        id: row.get("id"),
        user_id: row.get("user_id"),
        device: row.get("device"),
        ip: row.get("ip"),
        created_at: row.get("created_at"),
        last_seen_at: row.get("last_seen_at"),
    }
}

#[async_trait]
impl SessionStore for PgStore {
    async fn insert_session(
        &self,
        user_id: Uuid,
        device: Option<&str>,
        ip: Option<&str>,
    ) -> Result<SessionRecord> {
        let query = r"
            INSERT INTO sessions (user_id, device, ip)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, device, ip, created_at, last_seen_at
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(user_id)
            .bind(device)
            .bind(ip)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to insert session")?;
        Ok(session_from_row(&row))
    }

    async fn find_session(&self, id: Uuid) -> Result<Option<SessionRecord>> {
        let query = r"
            SELECT id, user_id, device, ip, created_at, last_seen_at
            FROM sessions
            WHERE id = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup session")?;
        Ok(row.as_ref().map(session_from_row))
    }

    async fn list_sessions(&self, user_id: Uuid) -> Result<Vec<SessionRecord>> {
        let query = r"
            SELECT id, user_id, device, ip, created_at, last_seen_at
            FROM sessions
            WHERE user_id = $1
            ORDER BY created_at
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let rows = sqlx::query(query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .context("failed to list sessions")?;
        Ok(rows.iter().map(session_from_row).collect())
    }

    async fn delete_session(&self, id: Uuid) -> Result<()> {
        // Refresh tokens reference the session; they go first.
        let mut tx = self
            .pool
            .begin()
            .await
            .context("begin session delete transaction")?;

        let query = "DELETE FROM refresh_tokens WHERE session_id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(id)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to delete session refresh tokens")?;

        let query = "DELETE FROM sessions WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(id)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to delete session")?;

        tx.commit().await.context("commit session delete")?;
        Ok(())
    }

    async fn touch_session(&self, id: Uuid) -> Result<()> {
        let query = "UPDATE sessions SET last_seen_at = NOW() WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to touch session")?;
        Ok(())
    }
}

fn refresh_token_from_row(row: &sqlx::postgres::PgRow) -> RefreshTokenRecord {
    RefreshTokenRecord {
        jti: row.get("jti"),
        user_id: row.get("user_id"),
        session_id: row.get("session_id"),
        issued_at: row.get("issued_at"),
        revoked_at: row.get("revoked_at"),
        rotated_from: row.get("rotated_from"),
    }
}

#[async_trait]
impl RefreshTokenStore for PgStore {
    async fn insert_refresh_token(&self, token: &NewRefreshToken) -> Result<()> {
        let query = r"
            INSERT INTO refresh_tokens (jti, user_id, session_id, rotated_from)
            VALUES ($1, $2, $3, $4)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(token.jti)
            .bind(token.user_id)
            .bind(token.session_id)
            .bind(token.rotated_from)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to insert refresh token")?;
        Ok(())
    }

    async fn find_refresh_token(&self, jti: Uuid) -> Result<Option<RefreshTokenRecord>> {
        let query = r"
            SELECT jti, user_id, session_id, issued_at, revoked_at, rotated_from
            FROM refresh_tokens
            WHERE jti = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(jti)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup refresh token")?;
        Ok(row.as_ref().map(refresh_token_from_row))
    }

    async fn revoke_refresh_token(&self, jti: Uuid) -> Result<()> {
        let query = r"
            UPDATE refresh_tokens
            SET revoked_at = NOW()
            WHERE jti = $1 AND revoked_at IS NULL
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(jti)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to revoke refresh token")?;
        Ok(())
    }
}

#[async_trait]
impl TotpStore for PgStore {
    async fn totp_credential(&self, user_id: Uuid) -> Result<Option<TotpCredentialRecord>> {
        let query = r"
            SELECT user_id, secret, verified
            FROM totp_credentials
            WHERE user_id = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup totp credential")?;
        Ok(row.map(|row| TotpCredentialRecord {
            user_id: row.get("user_id"),
            secret: row.get("secret"),
            verified: row.get("verified"),
        }))
    }

    async fn upsert_totp_secret(&self, user_id: Uuid, secret: &str) -> Result<()> {
        let query = r"
            INSERT INTO totp_credentials (user_id, secret, verified)
            VALUES ($1, $2, FALSE)
            ON CONFLICT (user_id)
            DO UPDATE SET secret = EXCLUDED.secret, verified = FALSE, updated_at = NOW()
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(user_id)
            .bind(secret)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to upsert totp secret")?;
        Ok(())
    }

    async fn mark_totp_verified(&self, user_id: Uuid) -> Result<()> {
        let query = r"
            UPDATE totp_credentials
            SET verified = TRUE, updated_at = NOW()
            WHERE user_id = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(user_id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to mark totp verified")?;
        if result.rows_affected() == 0 {
            return Err(anyhow!("no totp credential"));
        }
        Ok(())
    }
}

#[async_trait]
impl EmailVerificationStore for PgStore {
    async fn upsert_email_verification(
        &self,
        email: &str,
        code_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Uuid> {
        let query = r"
            INSERT INTO email_verifications (email, code_hash, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (email)
            DO UPDATE SET code_hash = EXCLUDED.code_hash,
                          expires_at = EXCLUDED.expires_at,
                          attempts = 0,
                          used_at = NULL
            RETURNING id
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(email)
            .bind(code_hash)
            .bind(expires_at)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to upsert email verification")?;
        Ok(row.get("id"))
    }

    async fn active_email_verification(
        &self,
        email: &str,
    ) -> Result<Option<EmailVerificationRecord>> {
        let query = r"
            SELECT id, email, code_hash, expires_at, attempts, used_at
            FROM email_verifications
            WHERE email = $1
              AND used_at IS NULL
              AND expires_at > NOW()
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup email verification")?;
        Ok(row.map(|row| EmailVerificationRecord {
            id: row.get("id"),
            email: row.get("email"),
            code_hash: row.get("code_hash"),
            expires_at: row.get("expires_at"),
            attempts: row.get("attempts"),
            used_at: row.get("used_at"),
        }))
    }

    async fn record_verification_attempt(&self, id: Uuid) -> Result<()> {
        let query = "UPDATE email_verifications SET attempts = attempts + 1 WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to record verification attempt")?;
        Ok(())
    }

    async fn mark_verification_used(&self, id: Uuid) -> Result<()> {
        let query = "UPDATE email_verifications SET used_at = NOW() WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to mark verification used")?;
        Ok(())
    }
}

#[async_trait]
impl PasswordResetStore for PgStore {
    async fn insert_password_reset(
        &self,
        token_id: Uuid,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let query = r"
            INSERT INTO password_resets (token_id, user_id, expires_at)
            VALUES ($1, $2, $3)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(token_id)
            .bind(user_id)
            .bind(expires_at)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to insert password reset")?;
        Ok(())
    }

    async fn consume_password_reset(&self, token_id: Uuid) -> Result<bool> {
        // Single-use: the UPDATE only wins while unused and unexpired.
        let query = r"
            UPDATE password_resets
            SET used_at = NOW()
            WHERE token_id = $1
              AND used_at IS NULL
              AND expires_at > NOW()
            RETURNING token_id
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(token_id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to consume password reset")?;
        Ok(row.is_some())
    }
}

fn social_account_from_row(row: &sqlx::postgres::PgRow) -> SocialAccountRecord {
    SocialAccountRecord {
        id: row.get("id"),
        user_id: row.get("user_id"),
        provider: row.get("provider"),
        provider_user_id: row.get("provider_user_id"),
        created_at: row.get("created_at"),
    }
}

#[async_trait]
impl SocialAccountStore for PgStore {
    async fn find_social_account(
        &self,
        provider: &str,
        provider_user_id: &str,
    ) -> Result<Option<SocialAccountRecord>> {
        let query = r"
            SELECT id, user_id, provider, provider_user_id, created_at
            FROM social_accounts
            WHERE provider = $1 AND provider_user_id = $2
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(provider)
            .bind(provider_user_id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup social account")?;
        Ok(row.as_ref().map(social_account_from_row))
    }

    async fn list_social_accounts(&self, user_id: Uuid) -> Result<Vec<SocialAccountRecord>> {
        let query = r"
            SELECT id, user_id, provider, provider_user_id, created_at
            FROM social_accounts
            WHERE user_id = $1
            ORDER BY created_at
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let rows = sqlx::query(query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .context("failed to list social accounts")?;
        Ok(rows.iter().map(social_account_from_row).collect())
    }

    async fn link_social_account(
        &self,
        user_id: Uuid,
        provider: &str,
        provider_user_id: &str,
    ) -> Result<SocialAccountRecord> {
        let query = r"
            INSERT INTO social_accounts (user_id, provider, provider_user_id)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, provider, provider_user_id, created_at
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(user_id)
            .bind(provider)
            .bind(provider_user_id)
            .fetch_one(&self.pool)
            .instrument(span)
            .await;
        match row {
            Ok(row) => Ok(social_account_from_row(&row)),
            Err(err) if is_unique_violation(&err) => Err(anyhow!("social account already linked")),
            Err(err) => Err(err).context("failed to link social account"),
        }
    }

    async fn unlink_social_account(&self, user_id: Uuid, provider: &str) -> Result<bool> {
        let query = "DELETE FROM social_accounts WHERE user_id = $1 AND provider = $2";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(user_id)
            .bind(provider)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to unlink social account")?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl RecoveryCodeStore for PgStore {
    async fn replace_recovery_codes(&self, user_id: Uuid, code_hashes: &[String]) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("begin recovery code transaction")?;

        let query = "DELETE FROM recovery_codes WHERE user_id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(user_id)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to delete old recovery codes")?;

        let query = "INSERT INTO recovery_codes (user_id, code_hash) VALUES ($1, $2)";
        for hash in code_hashes {
            let span = tracing::info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "INSERT",
                db.statement = query
            );
            sqlx::query(query)
                .bind(user_id)
                .bind(hash)
                .execute(&mut *tx)
                .instrument(span)
                .await
                .context("failed to insert recovery code")?;
        }

        tx.commit().await.context("commit recovery code batch")?;
        Ok(())
    }

    async fn unused_recovery_codes(&self, user_id: Uuid) -> Result<Vec<RecoveryCodeRecord>> {
        let query = r"
            SELECT id, user_id, code_hash, used_at
            FROM recovery_codes
            WHERE user_id = $1 AND used_at IS NULL
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let rows = sqlx::query(query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .context("failed to list recovery codes")?;
        Ok(rows
            .iter()
            .map(|row| RecoveryCodeRecord {
                id: row.get("id"),
                user_id: row.get("user_id"),
                code_hash: row.get("code_hash"),
                used_at: row.get("used_at"),
            })
            .collect())
    }

    async fn mark_recovery_code_used(&self, id: Uuid) -> Result<()> {
        let query = r"
            UPDATE recovery_codes
            SET used_at = NOW()
            WHERE id = $1 AND used_at IS NULL
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to mark recovery code used")?;
        if result.rows_affected() == 0 {
            return Err(anyhow!("recovery code already used"));
        }
        Ok(())
    }
}

#[async_trait]
impl PasskeyStore for PgStore {
    async fn insert_passkey(
        &self,
        user_id: Uuid,
        credential_id: &[u8],
        credential_json: &str,
        label: &str,
    ) -> Result<()> {
        let query = r"
            INSERT INTO passkeys (user_id, credential_id, credential_json, label)
            VALUES ($1, $2, $3, $4)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(user_id)
            .bind(credential_id)
            .bind(credential_json)
            .bind(label)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to insert passkey")?;
        Ok(())
    }

    async fn list_passkeys(&self, user_id: Uuid) -> Result<Vec<PasskeyRecord>> {
        let query = r"
            SELECT id, user_id, credential_id, credential_json, label, created_at
            FROM passkeys
            WHERE user_id = $1
            ORDER BY created_at
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let rows = sqlx::query(query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .context("failed to list passkeys")?;
        Ok(rows
            .iter()
            .map(|row| PasskeyRecord {
                id: row.get("id"),
                user_id: row.get("user_id"),
                credential_id: row.get("credential_id"),
                credential_json: row.get("credential_json"),
                label: row.get("label"),
                created_at: row.get("created_at"),
            })
            .collect())
    }

    async fn update_passkey_credential(
        &self,
        credential_id: &[u8],
        credential_json: &str,
    ) -> Result<()> {
        let query = r"
            UPDATE passkeys
            SET credential_json = $2, updated_at = NOW()
            WHERE credential_id = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(credential_id)
            .bind(credential_json)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to update passkey credential")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct TestDbError {
        code: Option<&'static str>,
    }

    impl std::fmt::Display for TestDbError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "test database error")
        }
    }

    impl std::error::Error for TestDbError {}

    impl sqlx::error::DatabaseError for TestDbError {
        fn message(&self) -> &'static str {
            "test database error"
        }

        fn code(&self) -> Option<std::borrow::Cow<'_, str>> {
            self.code.map(std::borrow::Cow::Borrowed)
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> sqlx::error::ErrorKind {
            sqlx::error::ErrorKind::UniqueViolation
        }
    }

    #[test]
    fn unique_violation_matches_sqlstate() {
        let err = sqlx::Error::Database(Box::new(TestDbError {
            code: Some("23505"),
        }));
        assert!(is_unique_violation(&err));

        let err = sqlx::Error::Database(Box::new(TestDbError {
            code: Some("23503"),
        }));
        assert!(!is_unique_violation(&err));

        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
    }
}
