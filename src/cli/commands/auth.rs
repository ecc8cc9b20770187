//! Auth-facing configuration: frontend URL, cookies, TOTP issuer.

use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};

#[derive(Debug)]
pub struct Options {
    pub frontend_base_url: String,
    pub cookie_domain: Option<String>,
    pub totp_issuer: String,
}

impl Options {
    /// # Errors
    /// Returns an error if a required argument is missing.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        Ok(Self {
            frontend_base_url: matches
                .get_one::<String>("frontend-base-url")
                .cloned()
                .context("missing required argument: --frontend-base-url")?,
            cookie_domain: matches.get_one::<String>("cookie-domain").cloned(),
            totp_issuer: matches
                .get_one::<String>("totp-issuer")
                .cloned()
                .context("missing required argument: --totp-issuer")?,
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("frontend-base-url")
                .long("frontend-base-url")
                .help("Frontend base URL used for reset/verification links and CORS")
                .env("BSAAS_AUTH_FRONTEND_BASE_URL")
                .default_value("https://app.bsaas.app"),
        )
        .arg(
            Arg::new("cookie-domain")
                .long("cookie-domain")
                .help("Domain attribute applied to all auth cookies")
                .env("BSAAS_AUTH_COOKIE_DOMAIN"),
        )
        .arg(
            Arg::new("totp-issuer")
                .long("totp-issuer")
                .help("Issuer shown in authenticator apps")
                .env("BSAAS_AUTH_TOTP_ISSUER")
                .default_value("bsaas"),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_flags() -> Result<()> {
        let command = with_args(Command::new("test"));
        let matches = command.try_get_matches_from(vec!["test"])?;
        let options = Options::parse(&matches)?;
        assert_eq!(options.frontend_base_url, "https://app.bsaas.app");
        assert_eq!(options.cookie_domain, None);
        assert_eq!(options.totp_issuer, "bsaas");
        Ok(())
    }

    #[test]
    fn flags_override_defaults() -> Result<()> {
        let command = with_args(Command::new("test"));
        let matches = command.try_get_matches_from(vec![
            "test",
            "--frontend-base-url",
            "http://localhost:4200",
            "--cookie-domain",
            ".bsaas.app",
            "--totp-issuer",
            "bsaas-dev",
        ])?;
        let options = Options::parse(&matches)?;
        assert_eq!(options.frontend_base_url, "http://localhost:4200");
        assert_eq!(options.cookie_domain.as_deref(), Some(".bsaas.app"));
        assert_eq!(options.totp_issuer, "bsaas-dev");
        Ok(())
    }
}
