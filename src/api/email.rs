//! Email delivery port.
//!
//! Password-reset links and verification OTPs are dispatched through
//! `EmailSender`. Enumeration-sensitive flows return success to the caller
//! whether or not delivery happened, so failures only show up server-side in
//! the logs; the sender must therefore never panic on bad input.
//!
//! The default sender for local dev is `LogEmailSender`, which logs the
//! payload and returns `Ok(())`.

use anyhow::Result;
use tracing::info;

#[derive(Clone, Debug)]
pub struct EmailMessage {
    pub to_email: String,
    pub template: &'static str,
    pub payload_json: String,
}

/// Email delivery abstraction.
pub trait EmailSender: Send + Sync {
    /// Deliver a message or return an error for the server logs.
    fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Local dev sender that logs instead of delivering.
#[derive(Clone, Debug)]
pub struct LogEmailSender;

impl EmailSender for LogEmailSender {
    fn send(&self, message: &EmailMessage) -> Result<()> {
        info!(
            to_email = %message.to_email,
            template = %message.template,
            payload = %message.payload_json,
            "email send stub"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_sender_accepts_any_message() {
        let sender = LogEmailSender;
        let message = EmailMessage {
            to_email: "a@example.com".to_string(),
            template: "password_reset",
            payload_json: "{}".to_string(),
        };
        assert!(sender.send(&message).is_ok());
    }
}
