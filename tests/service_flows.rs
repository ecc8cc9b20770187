//! End-to-end auth service flows over the in-memory store.
//!
//! These tests drive `AuthService` the way the transport layer does, with a
//! fixed-code TOTP fake and a capturing email sender, and assert the
//! security-relevant behavior: uniform credential failures, single-use
//! refresh rotation, idempotent logout, session ownership, OTP single-use,
//! fail-closed social sign-in, and the last-method unlink guard.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use bsaas_auth::api::{EmailMessage, EmailSender};
use bsaas_auth::audit::AuditLog;
use bsaas_auth::auth::{password, AuthError, AuthService, SessionMeta, SignInOutcome, TokenPair};
use bsaas_auth::store::{MemoryStore, SessionStore, UserRecord, UserStore};
use bsaas_auth::token::{TokenIssuer, TokenPurpose, TokenSecrets};
use bsaas_auth::totp::TotpAuthenticator;
use secrecy::SecretString;
use uuid::Uuid;

const GOOD_TOTP_CODE: &str = "123456";

/// TOTP fake: one fixed code passes, everything else fails.
struct FixedCodeTotp;

impl TotpAuthenticator for FixedCodeTotp {
    fn generate_secret(&self) -> Result<String> {
        Ok("JBSWY3DPEHPK3PXP".to_string())
    }

    fn provisioning_uri(&self, secret_base32: &str, account: &str) -> Result<String> {
        Ok(format!("otpauth://totp/bsaas:{account}?secret={secret_base32}"))
    }

    fn verify(&self, _secret_base32: &str, code: &str) -> Result<bool> {
        Ok(code == GOOD_TOTP_CODE)
    }
}

/// Email sender that records every message instead of delivering.
#[derive(Clone, Default)]
struct CapturingSender {
    messages: Arc<Mutex<Vec<EmailMessage>>>,
}

impl CapturingSender {
    fn sent(&self) -> Vec<EmailMessage> {
        self.messages.lock().expect("inbox lock").clone()
    }
}

impl EmailSender for CapturingSender {
    fn send(&self, message: &EmailMessage) -> Result<()> {
        self.messages.lock().expect("inbox lock").push(message.clone());
        Ok(())
    }
}

struct Harness {
    store: Arc<MemoryStore>,
    service: AuthService,
    inbox: CapturingSender,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let inbox = CapturingSender::default();
    let tokens = TokenIssuer::new(
        TokenSecrets::new()
            .with_access(SecretString::from("test-access-secret"))
            .with_refresh(SecretString::from("test-refresh-secret")),
    );
    let service = AuthService::new(
        store.clone(),
        tokens,
        Arc::new(FixedCodeTotp),
        Arc::new(inbox.clone()),
        AuditLog::new(),
        "https://app.bsaas.test".to_string(),
    );
    Harness {
        store,
        service,
        inbox,
    }
}

fn user_record(email: &str, password_plain: Option<&str>) -> UserRecord {
    UserRecord {
        id: Uuid::new_v4(),
        email: email.to_string(),
        password_hash: password_plain.map(|p| password::hash_password(p).expect("hash")),
        name: None,
        phone: None,
        is_verified: false,
        is_active: true,
        email_verified_at: None,
        last_login_at: None,
        roles: vec!["customer".to_string()],
    }
}

fn meta() -> SessionMeta {
    SessionMeta {
        device: Some("tests/1.0".to_string()),
        ip: Some("192.0.2.1".to_string()),
    }
}

async fn sign_in_complete(harness: &Harness, email: &str, password_plain: &str) -> TokenPair {
    match harness
        .service
        .sign_in(email, password_plain, &meta())
        .await
        .expect("sign in")
    {
        SignInOutcome::Complete(pair) => pair,
        SignInOutcome::TotpRequired { .. } => panic!("unexpected TOTP gate"),
    }
}

fn payload_field(message: &EmailMessage, field: &str) -> String {
    let payload: serde_json::Value =
        serde_json::from_str(&message.payload_json).expect("payload json");
    payload
        .get(field)
        .and_then(serde_json::Value::as_str)
        .unwrap_or_else(|| panic!("payload missing {field}"))
        .to_string()
}

#[tokio::test]
async fn password_sign_in_creates_exactly_one_session() {
    let h = harness();
    let user = user_record("u1@x.com", Some("correct-horse"));
    let user_id = user.id;
    h.store.seed_user(user);

    let pair = sign_in_complete(&h, "u1@x.com", "correct-horse").await;
    assert!(!pair.access_token.is_empty());
    assert!(!pair.refresh_token.is_empty());
    assert_eq!(h.store.session_count(user_id), 1);
    assert_eq!(h.store.refresh_token_count(pair.session_id), 1);
}

#[tokio::test]
async fn wrong_password_and_unknown_email_fail_identically() {
    let h = harness();
    h.store.seed_user(user_record("known@x.com", Some("correct")));

    let wrong_password = h.service.sign_in("known@x.com", "wrong", &meta()).await;
    let unknown_email = h.service.sign_in("ghost@x.com", "correct", &meta()).await;

    assert!(matches!(wrong_password, Err(AuthError::Unauthorized)));
    assert!(matches!(unknown_email, Err(AuthError::Unauthorized)));
    // No session appears for either failure.
    let user = h
        .store
        .find_user_by_email("known@x.com")
        .await
        .expect("lookup")
        .expect("user");
    assert_eq!(h.store.session_count(user.id), 0);
}

#[tokio::test]
async fn social_only_account_rejects_password_login() {
    let h = harness();
    let user = user_record("social@x.com", None);
    let user_id = user.id;
    h.store.seed_user(user);
    h.store.seed_social_account(user_id, "acme", "acme-1");

    let result = h.service.sign_in("social@x.com", "anything", &meta()).await;
    assert!(matches!(result, Err(AuthError::Unauthorized)));
}

#[tokio::test]
async fn verified_totp_credential_gates_login_behind_mfa() {
    let h = harness();
    let user = user_record("mfa@x.com", Some("correct"));
    let user_id = user.id;
    h.store.seed_user(user);
    h.store.seed_totp_credential(user_id, "SECRET", true);

    let outcome = h
        .service
        .sign_in("mfa@x.com", "correct", &meta())
        .await
        .expect("sign in");
    let temp_token = match outcome {
        SignInOutcome::TotpRequired { temp_token } => temp_token,
        SignInOutcome::Complete(_) => panic!("expected TOTP gate"),
    };
    // No session yet: the temp token is the only artifact.
    assert_eq!(h.store.session_count(user_id), 0);

    // Wrong code fails and still creates nothing.
    let bad = h
        .service
        .sign_in_with_totp(&temp_token, "000000", &meta())
        .await;
    assert!(matches!(bad, Err(AuthError::Unauthorized)));
    assert_eq!(h.store.session_count(user_id), 0);

    let pair = h
        .service
        .sign_in_with_totp(&temp_token, GOOD_TOTP_CODE, &meta())
        .await
        .expect("totp completion");
    assert_eq!(h.store.session_count(user_id), 1);
    assert_eq!(h.store.refresh_token_count(pair.session_id), 1);
}

#[tokio::test]
async fn unverified_totp_credential_does_not_gate_login() {
    let h = harness();
    let user = user_record("staged@x.com", Some("correct"));
    let user_id = user.id;
    h.store.seed_user(user);
    h.store.seed_totp_credential(user_id, "SECRET", false);

    let pair = sign_in_complete(&h, "staged@x.com", "correct").await;
    assert_eq!(h.store.session_count(user_id), 1);
    assert!(!pair.access_token.is_empty());
}

#[tokio::test]
async fn tokens_minted_for_other_purposes_cannot_complete_mfa() {
    let h = harness();
    let user = user_record("mfa2@x.com", Some("correct"));
    let user_id = user.id;
    h.store.seed_user(user);
    h.store.seed_totp_credential(user_id, "SECRET", true);

    // A verify-audience token must not pass the totp gate.
    let (verify_token, _) = h
        .service
        .tokens()
        .sign_purpose(user_id, TokenPurpose::Verify)
        .expect("sign purpose");
    let result = h
        .service
        .sign_in_with_totp(&verify_token, GOOD_TOTP_CODE, &meta())
        .await;
    assert!(matches!(result, Err(AuthError::Unauthorized)));
}

#[tokio::test]
async fn refresh_rotation_is_single_use_and_keeps_the_session() {
    let h = harness();
    h.store.seed_user(user_record("u1@x.com", Some("correct")));

    let original = sign_in_complete(&h, "u1@x.com", "correct").await;
    let rotated = h
        .service
        .refresh(&original.refresh_token)
        .await
        .expect("first refresh");

    // Session identity persists across rotations.
    assert_eq!(rotated.session_id, original.session_id);
    assert_ne!(rotated.refresh_token, original.refresh_token);

    // Re-submitting the consumed token is a reuse signal, not a refresh.
    let reuse = h.service.refresh(&original.refresh_token).await;
    assert!(matches!(reuse, Err(AuthError::Unauthorized)));

    // The successor still works exactly once.
    let third = h
        .service
        .refresh(&rotated.refresh_token)
        .await
        .expect("second refresh");
    assert_eq!(third.session_id, original.session_id);
}

#[tokio::test]
async fn garbage_refresh_tokens_are_rejected() {
    let h = harness();
    assert!(matches!(
        h.service.refresh("not-a-jwt").await,
        Err(AuthError::Unauthorized)
    ));

    // An access token is not a refresh token.
    h.store.seed_user(user_record("u1@x.com", Some("correct")));
    let pair = sign_in_complete(&h, "u1@x.com", "correct").await;
    assert!(matches!(
        h.service.refresh(&pair.access_token).await,
        Err(AuthError::Unauthorized)
    ));
}

#[tokio::test]
async fn logout_is_idempotent_and_cleans_refresh_tokens() {
    let h = harness();
    let user = user_record("u1@x.com", Some("correct"));
    let user_id = user.id;
    h.store.seed_user(user);

    let pair = sign_in_complete(&h, "u1@x.com", "correct").await;
    h.service.logout(pair.session_id).await.expect("logout");
    assert_eq!(h.store.session_count(user_id), 0);
    assert_eq!(h.store.refresh_token_count(pair.session_id), 0);

    // Second logout of the same session is a silent no-op.
    h.service.logout(pair.session_id).await.expect("relogout");

    // The session's refresh token died with it.
    let reuse = h.service.refresh(&pair.refresh_token).await;
    assert!(matches!(reuse, Err(AuthError::Unauthorized)));
}

#[tokio::test]
async fn revoke_session_enforces_ownership() {
    let h = harness();
    let owner = user_record("owner@x.com", Some("correct"));
    let other = user_record("other@x.com", Some("correct"));
    let owner_id = owner.id;
    let other_id = other.id;
    h.store.seed_user(owner);
    h.store.seed_user(other);

    let pair = sign_in_complete(&h, "owner@x.com", "correct").await;

    // A different user may not revoke it.
    let denied = h.service.revoke_session(other_id, pair.session_id).await;
    assert!(matches!(denied, Err(AuthError::Unauthorized)));
    assert_eq!(h.store.session_count(owner_id), 1);

    // The owner may.
    h.service
        .revoke_session(owner_id, pair.session_id)
        .await
        .expect("revoke");
    assert_eq!(h.store.session_count(owner_id), 0);
    assert_eq!(h.store.refresh_token_count(pair.session_id), 0);

    // Revoking a now-missing session folds into Unauthorized.
    let missing = h.service.revoke_session(owner_id, pair.session_id).await;
    assert!(matches!(missing, Err(AuthError::Unauthorized)));
}

#[tokio::test]
async fn list_sessions_returns_all_of_them() {
    let h = harness();
    let user = user_record("multi@x.com", Some("correct"));
    let user_id = user.id;
    h.store.seed_user(user);

    for _ in 0..3 {
        sign_in_complete(&h, "multi@x.com", "correct").await;
    }
    let sessions = h.service.list_sessions(user_id).await.expect("sessions");
    assert_eq!(sessions.len(), 3);
    assert!(sessions.iter().all(|s| s.user_id == user_id));
}

#[tokio::test]
async fn forgot_password_is_silent_for_ghost_accounts() {
    let h = harness();
    h.service
        .request_password_reset("ghost@nowhere.com")
        .await
        .expect("silent no-op");
    assert!(h.inbox.sent().is_empty());
}

#[tokio::test]
async fn password_reset_round_trip_is_single_use() {
    let h = harness();
    h.store.seed_user(user_record("u1@x.com", Some("old-password")));

    h.service
        .request_password_reset("u1@x.com")
        .await
        .expect("request reset");
    let sent = h.inbox.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].template, "password_reset");

    let reset_url = payload_field(&sent[0], "reset_url");
    let token = reset_url
        .split("#token=")
        .nth(1)
        .expect("token in reset url")
        .to_string();

    h.service
        .reset_password(&token, "new-password-123")
        .await
        .expect("reset");

    // Old password dead, new password works.
    assert!(matches!(
        h.service.sign_in("u1@x.com", "old-password", &meta()).await,
        Err(AuthError::Unauthorized)
    ));
    sign_in_complete(&h, "u1@x.com", "new-password-123").await;

    // The reset token is single-use.
    let reuse = h.service.reset_password(&token, "another-password").await;
    assert!(matches!(reuse, Err(AuthError::Unauthorized)));
}

#[tokio::test]
async fn reset_rejects_wrong_audience_tokens() {
    let h = harness();
    let user = user_record("u1@x.com", Some("old-password"));
    let user_id = user.id;
    h.store.seed_user(user);

    let (totp_token, _) = h
        .service
        .tokens()
        .sign_purpose(user_id, TokenPurpose::Totp)
        .expect("sign purpose");
    let result = h.service.reset_password(&totp_token, "new-password").await;
    assert!(matches!(result, Err(AuthError::Unauthorized)));
}

#[tokio::test]
async fn email_verification_otp_succeeds_exactly_once() {
    let h = harness();
    h.store.seed_user(user_record("verify@x.com", Some("correct")));

    h.service
        .request_email_verification("verify@x.com")
        .await
        .expect("request verification");
    let sent = h.inbox.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].template, "verify_email");
    let otp = payload_field(&sent[0], "otp");

    // Wrong code fails; the record survives for the right one.
    assert!(matches!(
        h.service.verify_email_otp("verify@x.com", "000000").await,
        Err(AuthError::Unauthorized)
    ));

    h.service
        .verify_email_otp("verify@x.com", &otp)
        .await
        .expect("verify");
    let user = h
        .store
        .find_user_by_email("verify@x.com")
        .await
        .expect("lookup")
        .expect("user");
    assert!(user.is_verified);
    assert!(user.email_verified_at.is_some());

    // Consumed: the same OTP no longer verifies.
    let reuse = h.service.verify_email_otp("verify@x.com", &otp).await;
    assert!(matches!(reuse, Err(AuthError::Unauthorized)));
}

#[tokio::test]
async fn email_verification_is_silent_for_ghosts_and_already_verified() {
    let h = harness();
    h.service
        .request_email_verification("ghost@x.com")
        .await
        .expect("silent");
    assert!(h.inbox.sent().is_empty());

    let mut user = user_record("done@x.com", Some("correct"));
    user.is_verified = true;
    user.email_verified_at = Some(chrono::Utc::now());
    h.store.seed_user(user);
    h.service
        .request_email_verification("done@x.com")
        .await
        .expect("silent");
    assert!(h.inbox.sent().is_empty());

    // And verifying with no active record fails closed.
    assert!(matches!(
        h.service.verify_email_otp("ghost@x.com", "123456").await,
        Err(AuthError::Unauthorized)
    ));
}

#[tokio::test]
async fn verification_link_token_verifies_the_user() {
    let h = harness();
    h.store.seed_user(user_record("link@x.com", Some("correct")));

    h.service
        .request_email_verification("link@x.com")
        .await
        .expect("request verification");
    let sent = h.inbox.sent();
    let verify_url = payload_field(&sent[0], "verify_url");
    let token = verify_url
        .split("#token=")
        .nth(1)
        .expect("token in verify url")
        .to_string();

    h.service.verify_email(&token).await.expect("verify");
    let user = h
        .store
        .find_user_by_email("link@x.com")
        .await
        .expect("lookup")
        .expect("user");
    assert!(user.is_verified);
}

#[tokio::test]
async fn totp_enrollment_flow_verifies_with_first_code() {
    let h = harness();
    let user = user_record("enroll@x.com", Some("correct"));
    let user_id = user.id;
    h.store.seed_user(user);

    let enrollment = h
        .service
        .totp_enroll_start(user_id)
        .await
        .expect("enroll start");
    assert!(!enrollment.secret_base32.is_empty());
    assert!(enrollment.otpauth_url.starts_with("otpauth://"));

    // Bad first code leaves the credential unverified; login stays direct.
    assert!(matches!(
        h.service.totp_enroll_confirm(user_id, "000000").await,
        Err(AuthError::Unauthorized)
    ));
    sign_in_complete(&h, "enroll@x.com", "correct").await;

    h.service
        .totp_enroll_confirm(user_id, GOOD_TOTP_CODE)
        .await
        .expect("enroll confirm");

    // Enrolled and verified: login now requires the second factor.
    let outcome = h
        .service
        .sign_in("enroll@x.com", "correct", &meta())
        .await
        .expect("sign in");
    assert!(matches!(outcome, SignInOutcome::TotpRequired { .. }));

    // Re-enrolling over a verified credential is rejected.
    assert!(matches!(
        h.service.totp_enroll_start(user_id).await,
        Err(AuthError::BadRequest(_))
    ));
}

#[tokio::test]
async fn recovery_codes_are_single_use_and_batch_scoped() {
    let h = harness();
    let user = user_record("rec@x.com", Some("correct"));
    let user_id = user.id;
    h.store.seed_user(user);

    let codes = h
        .service
        .generate_recovery_codes(user_id, None)
        .await
        .expect("generate");
    assert_eq!(codes.len(), 10);

    let code = codes[0].clone();
    assert!(h
        .service
        .verify_recovery_code(user_id, &code)
        .await
        .expect("verify"));
    // Consumed.
    assert!(!h
        .service
        .verify_recovery_code(user_id, &code)
        .await
        .expect("verify again"));
    // Garbage never verifies, and the port reports false rather than erroring.
    assert!(!h
        .service
        .verify_recovery_code(user_id, "not-a-code")
        .await
        .expect("garbage"));

    // A new batch invalidates the remainder of the old one.
    let survivor = codes[1].clone();
    let fresh = h
        .service
        .generate_recovery_codes(user_id, Some(5))
        .await
        .expect("regenerate");
    assert_eq!(fresh.len(), 5);
    assert!(!h
        .service
        .verify_recovery_code(user_id, &survivor)
        .await
        .expect("old batch"));
    assert!(h
        .service
        .verify_recovery_code(user_id, &fresh[0])
        .await
        .expect("new batch"));
}

#[tokio::test]
async fn social_sign_in_fails_closed_without_an_explicit_link() {
    let h = harness();
    // An account with a matching email exists, but no provider link.
    h.store.seed_user(user_record("match@x.com", Some("correct")));

    let profile = bsaas_auth::social::SocialProfile {
        provider: "acme".to_string(),
        provider_user_id: "acme-123".to_string(),
        email: Some("match@x.com".to_string()),
        name: None,
    };
    let result = h.service.sign_in_with_social(&profile, &meta()).await;
    assert!(matches!(result, Err(AuthError::Unauthorized)));
}

#[tokio::test]
async fn social_sign_in_resolves_through_the_link() {
    let h = harness();
    let user = user_record("linked@x.com", Some("correct"));
    let user_id = user.id;
    h.store.seed_user(user);
    h.service
        .link_social_account(user_id, "acme", "acme-123")
        .await
        .expect("link");

    let profile = bsaas_auth::social::SocialProfile {
        provider: "acme".to_string(),
        provider_user_id: "acme-123".to_string(),
        email: None,
        name: None,
    };
    let pair = h
        .service
        .sign_in_with_social(&profile, &meta())
        .await
        .expect("social sign in");
    assert_eq!(h.store.session_count(user_id), 1);
    assert!(!pair.access_token.is_empty());

    // The same provider identity cannot be linked twice.
    let relink = h.service.link_social_account(user_id, "acme", "acme-123").await;
    assert!(matches!(relink, Err(AuthError::BadRequest(_))));
}

#[tokio::test]
async fn unlink_never_strands_the_account() {
    let h = harness();
    // Social-only account with a single link: unlink must fail.
    let user = user_record("solo@x.com", None);
    let user_id = user.id;
    h.store.seed_user(user);
    h.store.seed_social_account(user_id, "acme", "acme-1");

    let result = h.service.unlink_social_account(user_id, "acme").await;
    assert!(matches!(result, Err(AuthError::BadRequest(_))));

    // A second provider makes the first removable.
    h.store.seed_social_account(user_id, "other", "other-1");
    h.service
        .unlink_social_account(user_id, "acme")
        .await
        .expect("unlink with fallback");

    // Password holders can always drop their last link.
    let pw_user = user_record("pw@x.com", Some("correct"));
    let pw_user_id = pw_user.id;
    h.store.seed_user(pw_user);
    h.store.seed_social_account(pw_user_id, "acme", "acme-2");
    h.service
        .unlink_social_account(pw_user_id, "acme")
        .await
        .expect("unlink with password");

    // Unlinking a provider that was never linked is NotFound.
    let missing = h.service.unlink_social_account(pw_user_id, "acme").await;
    assert!(matches!(missing, Err(AuthError::NotFound)));
}

#[tokio::test]
async fn issue_tokens_for_user_requires_a_live_account() {
    let h = harness();
    let missing = h
        .service
        .issue_tokens_for_user(Uuid::new_v4(), &meta())
        .await;
    assert!(matches!(missing, Err(AuthError::Unauthorized)));

    let mut user = user_record("inactive@x.com", Some("correct"));
    user.is_active = false;
    let user_id = user.id;
    h.store.seed_user(user);
    let inactive = h.service.issue_tokens_for_user(user_id, &meta()).await;
    assert!(matches!(inactive, Err(AuthError::Unauthorized)));
}

#[tokio::test]
async fn session_metadata_lands_on_the_session_row() {
    let h = harness();
    let user = user_record("meta@x.com", Some("correct"));
    let user_id = user.id;
    h.store.seed_user(user);

    sign_in_complete(&h, "meta@x.com", "correct").await;
    let sessions = h.store.list_sessions(user_id).await.expect("sessions");
    assert_eq!(sessions[0].device.as_deref(), Some("tests/1.0"));
    assert_eq!(sessions[0].ip.as_deref(), Some("192.0.2.1"));
}
