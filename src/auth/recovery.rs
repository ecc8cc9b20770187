//! Recovery code generation and verification.
//!
//! Recovery codes are the self-service fallback when MFA factors are lost.
//! Codes use a confusion-resistant alphabet (no `0O1I`), are shown to the
//! user once in grouped form, and only Argon2id hashes are stored.

use anyhow::{anyhow, Context, Result};
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::{rngs::OsRng, RngCore};

pub const DEFAULT_RECOVERY_CODE_COUNT: usize = 10;
const RECOVERY_CODE_LEN: usize = 12;
const RECOVERY_CODE_GROUP_SIZE: usize = 4;
const RECOVERY_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// A freshly generated recovery-code batch (plaintext + hashes).
///
/// The plaintext codes leave the process exactly once, in the generate
/// response; everything persisted comes from `code_hashes`.
#[derive(Debug)]
pub struct RecoveryCodeBatch {
    pub codes: Vec<String>,
    pub code_hashes: Vec<String>,
}

impl RecoveryCodeBatch {
    /// Generate `count` fresh codes.
    ///
    /// # Errors
    /// Returns an error if code generation or hashing fails.
    pub fn generate(count: usize) -> Result<Self> {
        let mut rng = OsRng;
        let mut codes = Vec::with_capacity(count);
        let mut code_hashes = Vec::with_capacity(count);
        for _ in 0..count {
            let code = generate_code(&mut rng)?;
            let hash = hash_recovery_code(&code)?;
            codes.push(code);
            code_hashes.push(hash);
        }
        Ok(Self { codes, code_hashes })
    }
}

/// Normalize user input for verification: strip separators, uppercase, and
/// reject anything outside the code alphabet.
pub fn normalize_recovery_code(input: &str) -> Result<String> {
    let normalized: String = input
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|ch| ch.to_ascii_uppercase())
        .collect();

    if normalized.len() != RECOVERY_CODE_LEN {
        return Err(anyhow!("invalid recovery code length"));
    }
    if !normalized
        .as_bytes()
        .iter()
        .all(|ch| RECOVERY_CODE_ALPHABET.contains(ch))
    {
        return Err(anyhow!("invalid recovery code characters"));
    }
    Ok(normalized)
}

/// Format a normalized code for display (`ABCD-EFGH-JKLM`).
pub fn format_recovery_code(normalized: &str) -> Result<String> {
    if normalized.len() != RECOVERY_CODE_LEN {
        return Err(anyhow!("invalid recovery code length"));
    }
    let mut out = String::with_capacity(RECOVERY_CODE_LEN + 2);
    for (idx, chunk) in normalized
        .as_bytes()
        .chunks(RECOVERY_CODE_GROUP_SIZE)
        .enumerate()
    {
        if idx > 0 {
            out.push('-');
        }
        out.push_str(std::str::from_utf8(chunk).context("invalid recovery code chunk")?);
    }
    Ok(out)
}

/// Verify a candidate against one stored hash. Malformed input verifies as
/// `false`; only hashing-machinery failures surface as errors.
pub fn verify_recovery_code(code: &str, stored_hash: &str) -> Result<bool> {
    let Ok(normalized) = normalize_recovery_code(code) else {
        return Ok(false);
    };
    let parsed =
        PasswordHash::new(stored_hash).map_err(|_| anyhow!("invalid recovery code hash"))?;
    Ok(Argon2::default()
        .verify_password(normalized.as_bytes(), &parsed)
        .is_ok())
}

fn generate_code<R: RngCore + ?Sized>(rng: &mut R) -> Result<String> {
    let mut raw = [0u8; RECOVERY_CODE_LEN];
    rng.fill_bytes(&mut raw);
    let mut normalized = String::with_capacity(RECOVERY_CODE_LEN);
    for byte in raw {
        let idx = usize::from(byte) % RECOVERY_CODE_ALPHABET.len();
        if let Some(&char_byte) = RECOVERY_CODE_ALPHABET.get(idx) {
            normalized.push(char_byte as char);
        }
    }
    format_recovery_code(&normalized)
}

fn hash_recovery_code(code: &str) -> Result<String> {
    let normalized = normalize_recovery_code(code)?;
    let salt = SaltString::generate(&mut argon2::password_hash::rand_core::OsRng);
    let hash = Argon2::default()
        .hash_password(normalized.as_bytes(), &salt)
        .map_err(|_| anyhow!("failed to hash recovery code"))?
        .to_string();
    Ok(hash)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_separators_and_uppercases() {
        let normalized = normalize_recovery_code("abcd-efgh-jklm").unwrap();
        assert_eq!(normalized, "ABCDEFGHJKLM");
    }

    #[test]
    fn normalize_rejects_wrong_length_and_alphabet() {
        assert!(normalize_recovery_code("short").is_err());
        // `0` and `1` are excluded from the alphabet.
        assert!(normalize_recovery_code("ABCD-EFGH-JK01").is_err());
    }

    #[test]
    fn format_groups_in_fours() {
        let formatted = format_recovery_code("ABCDEFGHJKLM").unwrap();
        assert_eq!(formatted, "ABCD-EFGH-JKLM");
    }

    #[test]
    fn batch_generates_requested_count() {
        let batch = RecoveryCodeBatch::generate(DEFAULT_RECOVERY_CODE_COUNT).unwrap();
        assert_eq!(batch.codes.len(), DEFAULT_RECOVERY_CODE_COUNT);
        assert_eq!(batch.code_hashes.len(), DEFAULT_RECOVERY_CODE_COUNT);
        for code in &batch.codes {
            assert_eq!(code.len(), RECOVERY_CODE_LEN + 2);
        }
    }

    #[test]
    fn hash_and_verify_round_trip() {
        let batch = RecoveryCodeBatch::generate(2).unwrap();
        let code = batch.codes.first().unwrap();
        let hash = batch.code_hashes.first().unwrap();
        assert!(verify_recovery_code(code, hash).unwrap());
        assert!(!verify_recovery_code("ABCD-EFGH-9999", hash).unwrap());
    }

    #[test]
    fn malformed_input_fails_closed() {
        let batch = RecoveryCodeBatch::generate(1).unwrap();
        let hash = batch.code_hashes.first().unwrap();
        assert!(!verify_recovery_code("", hash).unwrap());
        assert!(!verify_recovery_code("!!nonsense!!", hash).unwrap());
    }
}
