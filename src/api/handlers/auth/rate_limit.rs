//! Rate limiting for auth flows.
//!
//! Per-endpoint budgets over a fixed one-minute window, keyed by client IP
//! and (where it makes sense) by target email so one address cannot be
//! hammered from many IPs. A `Limited` decision carries the retry-after hint
//! surfaced on the 429.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::auth::AuthError;

const WINDOW: Duration = Duration::from_secs(60);

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum RateLimitAction {
    Login,
    TotpLogin,
    Refresh,
    WebauthnStart,
    PasswordForgot,
    VerifyEmail,
    Recovery,
}

impl RateLimitAction {
    /// Requests allowed per key per minute.
    #[must_use]
    pub fn budget_per_minute(self) -> u32 {
        match self {
            Self::Login | Self::TotpLogin | Self::PasswordForgot | Self::Recovery => 5,
            Self::Refresh => 20,
            Self::WebauthnStart | Self::VerifyEmail => 10,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited { retry_after_seconds: u64 },
}

pub trait RateLimiter: Send + Sync {
    fn check_ip(&self, ip: Option<&str>, action: RateLimitAction) -> RateLimitDecision;
    fn check_email(&self, email: &str, action: RateLimitAction) -> RateLimitDecision;
}

#[derive(Clone, Debug)]
pub struct NoopRateLimiter;

impl RateLimiter for NoopRateLimiter {
    fn check_ip(&self, _ip: Option<&str>, _action: RateLimitAction) -> RateLimitDecision {
        RateLimitDecision::Allowed
    }

    fn check_email(&self, _email: &str, _action: RateLimitAction) -> RateLimitDecision {
        RateLimitDecision::Allowed
    }
}

#[derive(Debug)]
struct Window {
    started_at: Instant,
    count: u32,
}

/// Fixed-window in-memory limiter. Windows reset rather than slide; the
/// budget numbers assume that coarseness.
#[derive(Debug, Default)]
pub struct FixedWindowRateLimiter {
    windows: Mutex<HashMap<(RateLimitAction, String), Window>>,
}

impl FixedWindowRateLimiter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn check(&self, key: String, action: RateLimitAction) -> RateLimitDecision {
        let now = Instant::now();
        let mut windows = self
            .windows
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        // Drop dead windows so the map stays bounded by active clients.
        windows.retain(|_, window| now.duration_since(window.started_at) < WINDOW);

        let window = windows.entry((action, key)).or_insert(Window {
            started_at: now,
            count: 0,
        });
        window.count += 1;
        if window.count > action.budget_per_minute() {
            let elapsed = now.duration_since(window.started_at);
            let retry_after_seconds = WINDOW.saturating_sub(elapsed).as_secs().max(1);
            return RateLimitDecision::Limited {
                retry_after_seconds,
            };
        }
        RateLimitDecision::Allowed
    }
}

impl RateLimiter for FixedWindowRateLimiter {
    fn check_ip(&self, ip: Option<&str>, action: RateLimitAction) -> RateLimitDecision {
        // Unknown clients share one bucket; better one coarse budget than none.
        let key = format!("ip:{}", ip.unwrap_or("unknown"));
        self.check(key, action)
    }

    fn check_email(&self, email: &str, action: RateLimitAction) -> RateLimitDecision {
        self.check(format!("email:{email}"), action)
    }
}

/// Handler-side enforcement: IP budget first, then the optional email budget.
pub(super) fn check_rate_limit(
    limiter: &dyn RateLimiter,
    ip: Option<&str>,
    email: Option<&str>,
    action: RateLimitAction,
) -> Result<(), AuthError> {
    if let RateLimitDecision::Limited {
        retry_after_seconds,
    } = limiter.check_ip(ip, action)
    {
        return Err(AuthError::RateLimited {
            retry_after_seconds,
        });
    }
    if let Some(email) = email {
        if let RateLimitDecision::Limited {
            retry_after_seconds,
        } = limiter.check_email(email, action)
        {
            return Err(AuthError::RateLimited {
                retry_after_seconds,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_rate_limiter_allows() {
        let limiter = NoopRateLimiter;
        assert_eq!(
            limiter.check_ip(None, RateLimitAction::Login),
            RateLimitDecision::Allowed
        );
        assert_eq!(
            limiter.check_email("user@example.com", RateLimitAction::Refresh),
            RateLimitDecision::Allowed
        );
    }

    #[test]
    fn budget_exhaustion_limits_with_retry_hint() {
        let limiter = FixedWindowRateLimiter::new();
        let budget = RateLimitAction::Login.budget_per_minute();
        for _ in 0..budget {
            assert_eq!(
                limiter.check_ip(Some("1.2.3.4"), RateLimitAction::Login),
                RateLimitDecision::Allowed
            );
        }
        match limiter.check_ip(Some("1.2.3.4"), RateLimitAction::Login) {
            RateLimitDecision::Limited {
                retry_after_seconds,
            } => assert!(retry_after_seconds >= 1 && retry_after_seconds <= 60),
            RateLimitDecision::Allowed => panic!("expected limit"),
        }
    }

    #[test]
    fn distinct_keys_have_independent_budgets() {
        let limiter = FixedWindowRateLimiter::new();
        let budget = RateLimitAction::Login.budget_per_minute();
        for _ in 0..budget {
            limiter.check_ip(Some("1.1.1.1"), RateLimitAction::Login);
        }
        assert_eq!(
            limiter.check_ip(Some("2.2.2.2"), RateLimitAction::Login),
            RateLimitDecision::Allowed
        );
        assert_eq!(
            limiter.check_email("a@example.com", RateLimitAction::Login),
            RateLimitDecision::Allowed
        );
    }

    #[test]
    fn actions_do_not_share_windows() {
        let limiter = FixedWindowRateLimiter::new();
        let budget = RateLimitAction::Login.budget_per_minute();
        for _ in 0..budget {
            limiter.check_ip(Some("1.1.1.1"), RateLimitAction::Login);
        }
        assert_eq!(
            limiter.check_ip(Some("1.1.1.1"), RateLimitAction::Refresh),
            RateLimitDecision::Allowed
        );
    }

    #[test]
    fn enforcement_helper_maps_to_auth_error() {
        let limiter = FixedWindowRateLimiter::new();
        let budget = RateLimitAction::PasswordForgot.budget_per_minute();
        for _ in 0..budget {
            let result = check_rate_limit(
                &limiter,
                Some("1.1.1.1"),
                None,
                RateLimitAction::PasswordForgot,
            );
            assert!(result.is_ok());
        }
        let result = check_rate_limit(
            &limiter,
            Some("1.1.1.1"),
            None,
            RateLimitAction::PasswordForgot,
        );
        assert!(matches!(result, Err(AuthError::RateLimited { .. })));
    }
}
