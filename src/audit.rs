//! Append-only audit trail for security-relevant events.
//!
//! Every event lands on the `audit` tracing target with a stable snake_case
//! action name plus whatever identifiers were available at the call site.
//! Collectors key off the target, so application logging filters never
//! swallow these records.

use tracing::info;
use uuid::Uuid;

/// Security-relevant actions recorded by the auth core.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AuditAction {
    LoginSuccess,
    LoginFailure,
    TotpChallengeIssued,
    TotpFailure,
    RefreshRotated,
    RefreshReuseDetected,
    Logout,
    SessionRevoked,
    PasswordResetRequested,
    PasswordResetCompleted,
    EmailVerificationRequested,
    EmailVerified,
    RecoveryCodesGenerated,
    RecoveryCodeConsumed,
    RecoveryCodeRejected,
    SocialSignIn,
    SocialLinked,
    SocialUnlinked,
    WebauthnRegistered,
    WebauthnSignIn,
}

impl AuditAction {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LoginSuccess => "login_success",
            Self::LoginFailure => "login_failure",
            Self::TotpChallengeIssued => "totp_challenge_issued",
            Self::TotpFailure => "totp_failure",
            Self::RefreshRotated => "refresh_rotated",
            Self::RefreshReuseDetected => "refresh_reuse_detected",
            Self::Logout => "logout",
            Self::SessionRevoked => "session_revoked",
            Self::PasswordResetRequested => "password_reset_requested",
            Self::PasswordResetCompleted => "password_reset_completed",
            Self::EmailVerificationRequested => "email_verification_requested",
            Self::EmailVerified => "email_verified",
            Self::RecoveryCodesGenerated => "recovery_codes_generated",
            Self::RecoveryCodeConsumed => "recovery_code_consumed",
            Self::RecoveryCodeRejected => "recovery_code_rejected",
            Self::SocialSignIn => "social_sign_in",
            Self::SocialLinked => "social_linked",
            Self::SocialUnlinked => "social_unlinked",
            Self::WebauthnRegistered => "webauthn_registered",
            Self::WebauthnSignIn => "webauthn_sign_in",
        }
    }
}

/// One audit record. Identifiers are optional since failures often happen
/// before a user or session is resolved.
#[derive(Clone, Debug)]
pub struct AuditEvent {
    action: AuditAction,
    user_id: Option<Uuid>,
    session_id: Option<Uuid>,
    ip: Option<String>,
    detail: Option<String>,
}

impl AuditEvent {
    #[must_use]
    pub fn new(action: AuditAction) -> Self {
        Self {
            action,
            user_id: None,
            session_id: None,
            ip: None,
            detail: None,
        }
    }

    #[must_use]
    pub fn user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    #[must_use]
    pub fn session(mut self, session_id: Uuid) -> Self {
        self.session_id = Some(session_id);
        self
    }

    #[must_use]
    pub fn ip(mut self, ip: Option<String>) -> Self {
        self.ip = ip;
        self
    }

    #[must_use]
    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Structured audit sink. Cloneable handle; records are emitted synchronously
/// so an event is on the log stream before the response leaves the handler.
#[derive(Clone, Debug, Default)]
pub struct AuditLog;

impl AuditLog {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    pub fn record(&self, event: &AuditEvent) {
        let user_id = event.user_id.map(|id| id.to_string());
        let session_id = event.session_id.map(|id| id.to_string());
        info!(
            target: "audit",
            action = event.action.as_str(),
            user_id = user_id.as_deref().unwrap_or("-"),
            session_id = session_id.as_deref().unwrap_or("-"),
            ip = event.ip.as_deref().unwrap_or("-"),
            detail = event.detail.as_deref().unwrap_or(""),
            "audit"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_names_are_snake_case() {
        let actions = [
            AuditAction::LoginSuccess,
            AuditAction::RefreshReuseDetected,
            AuditAction::RecoveryCodeRejected,
            AuditAction::WebauthnSignIn,
        ];
        for action in actions {
            let name = action.as_str();
            assert!(!name.is_empty());
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "unexpected action name: {name}"
            );
        }
    }

    #[test]
    fn event_builder_collects_fields() {
        let user = Uuid::new_v4();
        let session = Uuid::new_v4();
        let event = AuditEvent::new(AuditAction::SessionRevoked)
            .user(user)
            .session(session)
            .ip(Some("1.2.3.4".to_string()))
            .detail("revoked by owner");
        assert_eq!(event.user_id, Some(user));
        assert_eq!(event.session_id, Some(session));
        assert_eq!(event.ip.as_deref(), Some("1.2.3.4"));

        // Recording must not panic without a subscriber installed.
        AuditLog::new().record(&event);
    }
}
