//! Token signing secrets and lifetimes.
//!
//! Secrets are optional on purpose: the issuer falls back to the shared
//! secret and finally a development default, so a bare `bsaas-auth --dsn ...`
//! still runs locally. Production deployments set the specific secrets.

use anyhow::Result;
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

use crate::token::TokenSecrets;

#[derive(Debug)]
pub struct Options {
    pub secrets: TokenSecrets,
    pub access_ttl_seconds: i64,
    pub refresh_ttl_seconds: i64,
    pub purpose_ttl_seconds: i64,
}

impl Options {
    /// # Errors
    /// Returns an error if a TTL argument fails to parse.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let mut secrets = TokenSecrets::new();
        if let Some(secret) = matches.get_one::<String>("access-token-secret") {
            secrets = secrets.with_access(SecretString::from(secret.clone()));
        }
        if let Some(secret) = matches.get_one::<String>("refresh-token-secret") {
            secrets = secrets.with_refresh(SecretString::from(secret.clone()));
        }
        if let Some(secret) = matches.get_one::<String>("token-secret") {
            secrets = secrets.with_shared(SecretString::from(secret.clone()));
        }
        Ok(Self {
            secrets,
            access_ttl_seconds: matches
                .get_one::<i64>("access-token-ttl-seconds")
                .copied()
                .unwrap_or(900),
            refresh_ttl_seconds: matches
                .get_one::<i64>("refresh-token-ttl-seconds")
                .copied()
                .unwrap_or(604_800),
            purpose_ttl_seconds: matches
                .get_one::<i64>("purpose-token-ttl-seconds")
                .copied()
                .unwrap_or(300),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("access-token-secret")
                .long("access-token-secret")
                .help("Secret for signing access tokens")
                .env("BSAAS_AUTH_ACCESS_TOKEN_SECRET"),
        )
        .arg(
            Arg::new("refresh-token-secret")
                .long("refresh-token-secret")
                .help("Secret for signing refresh tokens")
                .env("BSAAS_AUTH_REFRESH_TOKEN_SECRET"),
        )
        .arg(
            Arg::new("token-secret")
                .long("token-secret")
                .help("Shared fallback secret when specific secrets are unset")
                .env("BSAAS_AUTH_TOKEN_SECRET"),
        )
        .arg(
            Arg::new("access-token-ttl-seconds")
                .long("access-token-ttl-seconds")
                .help("Access token lifetime in seconds")
                .env("BSAAS_AUTH_ACCESS_TOKEN_TTL_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("refresh-token-ttl-seconds")
                .long("refresh-token-ttl-seconds")
                .help("Refresh token lifetime in seconds")
                .env("BSAAS_AUTH_REFRESH_TOKEN_TTL_SECONDS")
                .default_value("604800")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("purpose-token-ttl-seconds")
                .long("purpose-token-ttl-seconds")
                .help("Lifetime for totp/reset/verify tokens in seconds")
                .env("BSAAS_AUTH_PURPOSE_TOKEN_TTL_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(i64)),
        )
}
