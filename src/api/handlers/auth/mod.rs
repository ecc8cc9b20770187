//! Auth transport layer.
//!
//! Request flow: rate limit and CSRF checks, then the JWT guard where the
//! endpoint needs an identity, then one call into `AuthService`, then the
//! cookie boundary shapes the response. Handlers never touch storage
//! directly.

pub(crate) mod cookies;
pub(crate) mod csrf;
pub mod error;
pub mod login;
pub mod password;
pub mod principal;
pub mod rate_limit;
pub mod recovery;
pub mod refresh;
pub mod register;
pub mod session;
pub mod social;
pub mod state;
pub mod totp;
pub mod types;
pub(crate) mod utils;
pub mod verification;
pub mod webauthn;

pub use principal::{require_auth, require_role, Principal};
pub use rate_limit::{FixedWindowRateLimiter, NoopRateLimiter, RateLimiter};
pub use state::{AuthConfig, AuthState};
