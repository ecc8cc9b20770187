//! Argon2id password hashing.
//!
//! The slow hash is pluggable at the parameter level only; everything above
//! this module treats hashes as opaque PHC strings.

use anyhow::{anyhow, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

/// Hash a password into a PHC-format string.
///
/// # Errors
/// Returns an error if the hasher rejects its inputs.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| anyhow!("failed to hash password: {err}"))?;
    Ok(hash.to_string())
}

/// Constant-time verification of a password against a stored PHC hash.
///
/// Unparseable stored hashes verify as `false` rather than erroring, so a
/// corrupt row degrades to a failed login instead of a 500.
#[must_use]
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_round_trip() -> Result<()> {
        let hash = hash_password("hunter2")?;
        assert!(verify_password("hunter2", &hash));
        assert!(!verify_password("hunter3", &hash));
        Ok(())
    }

    #[test]
    fn hashes_are_salted() -> Result<()> {
        let first = hash_password("same-password")?;
        let second = hash_password("same-password")?;
        assert_ne!(first, second);
        Ok(())
    }

    #[test]
    fn garbage_stored_hash_fails_closed() {
        assert!(!verify_password("anything", "not-a-phc-string"));
        assert!(!verify_password("anything", ""));
    }
}
