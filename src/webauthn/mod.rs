//! Passkey (`WebAuthn`) service.
//!
//! Coordinates the multi-step protocol: challenge generation, ephemeral
//! protocol state, and verification of the browser's proof against stored
//! credentials. Ephemeral registration/authentication states live in
//! mutex-guarded maps keyed by a one-time id; credentials persist through
//! the passkey store as serialized `webauthn-rs` values.
//!
//! Authentication always starts from a resolved user: there is no anonymous
//! challenge, so credential presence is never observable without an identity.

use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;
use webauthn_rs::prelude::*;

use crate::audit::{AuditAction, AuditEvent, AuditLog};
use crate::store::{AuthStore, PasskeyStore};

pub struct PasskeyService {
    webauthn: Arc<Webauthn>,
    store: Arc<dyn AuthStore>,
    audit: AuditLog,
    reg_states: Mutex<HashMap<Uuid, PasskeyRegistration>>,
    auth_states: Mutex<HashMap<Uuid, (Uuid, PasskeyAuthentication)>>,
}

impl PasskeyService {
    /// # Errors
    /// Returns an error if the relying-party configuration is invalid.
    pub fn new(
        store: Arc<dyn AuthStore>,
        audit: AuditLog,
        rp_id: &str,
        rp_origin: &str,
    ) -> Result<Self> {
        let rp_origin_url = Url::parse(rp_origin).context("invalid relying-party origin")?;
        let webauthn = WebauthnBuilder::new(rp_id, &rp_origin_url)
            .context("invalid relying-party id")?
            .rp_name("bsaas")
            .build()
            .context("failed to build webauthn context")?;
        Ok(Self {
            webauthn: Arc::new(webauthn),
            store,
            audit,
            reg_states: Mutex::new(HashMap::new()),
            auth_states: Mutex::new(HashMap::new()),
        })
    }

    /// Start registering a new passkey, excluding already-registered
    /// credentials so the browser refuses duplicates.
    ///
    /// # Errors
    /// Returns an error if the store or challenge generation fails.
    pub async fn register_begin(
        &self,
        user_id: Uuid,
        username: &str,
    ) -> Result<(CreationChallengeResponse, Uuid)> {
        let existing = self.store.list_passkeys(user_id).await?;
        let exclude: Vec<CredentialID> = existing
            .into_iter()
            .map(|key| key.credential_id.into())
            .collect();

        let (challenge, registration) = self
            .webauthn
            .start_passkey_registration(user_id, username, username, Some(exclude))
            .context("failed to start passkey registration")?;

        let reg_id = Uuid::new_v4();
        let mut states = self.reg_states.lock().await;
        states.insert(reg_id, registration);
        Ok((challenge, reg_id))
    }

    /// Verify the attestation and persist the credential.
    ///
    /// # Errors
    /// Returns an error if the challenge state is missing/expired or the
    /// attestation does not verify.
    pub async fn register_finish(
        &self,
        reg_id: Uuid,
        user_id: Uuid,
        response: &RegisterPublicKeyCredential,
        label: &str,
    ) -> Result<()> {
        let registration = {
            let mut states = self.reg_states.lock().await;
            states
                .remove(&reg_id)
                .ok_or_else(|| anyhow!("registration challenge not found or expired"))?
        };

        let passkey = self
            .webauthn
            .finish_passkey_registration(response, &registration)
            .context("passkey attestation failed")?;

        let credential_json =
            serde_json::to_string(&passkey).context("failed to serialize passkey")?;
        self.store
            .insert_passkey(
                user_id,
                passkey.cred_id().as_slice(),
                &credential_json,
                label,
            )
            .await?;
        self.audit
            .record(&AuditEvent::new(AuditAction::WebauthnRegistered).user(user_id));
        Ok(())
    }

    /// Start authentication for a known user.
    ///
    /// # Errors
    /// Returns an error if the user has no passkeys or challenge generation
    /// fails.
    pub async fn auth_begin(&self, user_id: Uuid) -> Result<(RequestChallengeResponse, Uuid)> {
        let records = self.store.list_passkeys(user_id).await?;
        if records.is_empty() {
            return Err(anyhow!("no passkeys registered"));
        }
        let mut passkeys = Vec::with_capacity(records.len());
        for record in &records {
            let passkey: Passkey = serde_json::from_str(&record.credential_json)
                .context("failed to deserialize stored passkey")?;
            passkeys.push(passkey);
        }

        let (challenge, authentication) = self
            .webauthn
            .start_passkey_authentication(&passkeys)
            .context("failed to start passkey authentication")?;

        let auth_id = Uuid::new_v4();
        let mut states = self.auth_states.lock().await;
        states.insert(auth_id, (user_id, authentication));
        Ok((challenge, auth_id))
    }

    /// Verify the assertion. On success returns the authenticated user id;
    /// the caller issues tokens exactly as a password login would.
    ///
    /// # Errors
    /// Returns an error if the challenge state is missing or the assertion
    /// does not verify.
    pub async fn auth_finish(
        &self,
        auth_id: Uuid,
        response: &PublicKeyCredential,
    ) -> Result<Uuid> {
        let (user_id, authentication) = {
            let mut states = self.auth_states.lock().await;
            states
                .remove(&auth_id)
                .ok_or_else(|| anyhow!("authentication challenge not found or expired"))?
        };

        let result = self
            .webauthn
            .finish_passkey_authentication(response, &authentication)
            .context("passkey assertion failed")?;

        // Persist the updated signature counter for clone detection.
        if result.needs_update() {
            let records = self.store.list_passkeys(user_id).await?;
            for record in records {
                let mut passkey: Passkey = serde_json::from_str(&record.credential_json)
                    .context("failed to deserialize stored passkey")?;
                if passkey.update_credential(&result) == Some(true) {
                    let credential_json = serde_json::to_string(&passkey)
                        .context("failed to serialize updated passkey")?;
                    self.store
                        .update_passkey_credential(&record.credential_id, &credential_json)
                        .await?;
                }
            }
        }

        Ok(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn service() -> PasskeyService {
        let store = Arc::new(MemoryStore::new());
        PasskeyService::new(store, AuditLog::new(), "localhost", "http://localhost:4200")
            .expect("passkey service")
    }

    #[test]
    fn invalid_origin_is_rejected() {
        let store: Arc<dyn AuthStore> = Arc::new(MemoryStore::new());
        assert!(PasskeyService::new(store, AuditLog::new(), "localhost", "not a url").is_err());
    }

    #[tokio::test]
    async fn register_begin_hands_out_unique_challenge_ids() -> Result<()> {
        let service = service();
        let user = Uuid::new_v4();
        let (_, first) = service.register_begin(user, "a@example.com").await?;
        let (_, second) = service.register_begin(user, "a@example.com").await?;
        assert_ne!(first, second);
        Ok(())
    }

    #[tokio::test]
    async fn auth_begin_requires_a_registered_passkey() {
        let service = service();
        let result = service.auth_begin(Uuid::new_v4()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn finish_with_unknown_challenge_fails() {
        let service = service();
        let mut states = service.reg_states.lock().await;
        assert!(states.remove(&Uuid::new_v4()).is_none());
    }
}
