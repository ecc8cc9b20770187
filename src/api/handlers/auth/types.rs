//! Request/response types for auth endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginResponse {
    pub totp_required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_token: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TotpLoginRequest {
    pub temp_token: String,
    pub totp_code: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Default)]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SuccessResponse {
    pub success: bool,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SessionSummary {
    pub id: String,
    pub device: Option<String>,
    pub ip: Option<String>,
    pub created_at: String,
    pub last_seen_at: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RevokeSessionRequest {
    pub id: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct EmailVerificationRequest {
    pub email: String,
}

/// Either `{token}` (link flow) or `{email, otp}` (code flow).
#[derive(ToSchema, Serialize, Deserialize, Debug, Default)]
pub struct VerifyEmailRequest {
    pub token: Option<String>,
    pub email: Option<String>,
    pub otp: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TotpEnrollStartResponse {
    pub secret: String,
    pub otpauth_url: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TotpEnrollFinishRequest {
    pub totp_code: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RecoveryVerifyRequest {
    pub code: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct WebauthnChallengeResponse {
    pub challenge_id: String,
    /// Provider-specific options passed straight to the browser API.
    #[schema(value_type = Object)]
    pub options: serde_json::Value,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct WebauthnRegisterFinishRequest {
    pub challenge_id: String,
    pub label: Option<String>,
    #[schema(value_type = Object)]
    pub credential: serde_json::Value,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Default)]
pub struct WebauthnLoginStartRequest {
    /// Required when the request carries no authenticated session.
    pub email: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct WebauthnLoginFinishRequest {
    pub challenge_id: String,
    #[schema(value_type = Object)]
    pub credential: serde_json::Value,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct OauthCallbackQuery {
    pub code: String,
    pub state: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn login_response_omits_absent_temp_token() -> Result<()> {
        let response = LoginResponse {
            totp_required: false,
            temp_token: None,
        };
        let value = serde_json::to_value(&response)?;
        assert!(value.get("temp_token").is_none());

        let response = LoginResponse {
            totp_required: true,
            temp_token: Some("token".to_string()),
        };
        let value = serde_json::to_value(&response)?;
        assert_eq!(
            value.get("temp_token").and_then(serde_json::Value::as_str),
            Some("token")
        );
        Ok(())
    }

    #[test]
    fn verify_email_request_accepts_both_shapes() -> Result<()> {
        let link: VerifyEmailRequest = serde_json::from_str(r#"{"token":"abc"}"#)?;
        assert_eq!(link.token.as_deref(), Some("abc"));
        assert!(link.email.is_none());

        let otp: VerifyEmailRequest =
            serde_json::from_str(r#"{"email":"a@example.com","otp":"123456"}"#)?;
        assert_eq!(otp.email.as_deref(), Some("a@example.com"));
        assert_eq!(otp.otp.as_deref(), Some("123456"));
        Ok(())
    }

    #[test]
    fn refresh_request_tolerates_empty_body_shape() -> Result<()> {
        let empty: RefreshRequest = serde_json::from_str("{}")?;
        assert!(empty.refresh_token.is_none());
        Ok(())
    }
}
