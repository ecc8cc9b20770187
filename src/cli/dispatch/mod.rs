//! Command-line argument dispatch.
//!
//! Maps validated CLI matches to the server action with its full
//! configuration state.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{auth, tokens};
use anyhow::{Context, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;

    let auth_opts = auth::Options::parse(matches)?;
    let token_opts = tokens::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        frontend_base_url: auth_opts.frontend_base_url,
        cookie_domain: auth_opts.cookie_domain,
        totp_issuer: auth_opts.totp_issuer,
        token_secrets: token_opts.secrets,
        access_ttl_seconds: token_opts.access_ttl_seconds,
        refresh_ttl_seconds: token_opts.refresh_ttl_seconds,
        purpose_ttl_seconds: token_opts.purpose_ttl_seconds,
    }))
}
