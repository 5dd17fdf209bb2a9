//! Command-line argument dispatch and server initialization.
//!
//! This module parses validated CLI arguments and maps them to the appropriate
//! action, such as starting the API server with its full configuration state.

use crate::cli::actions::{Action, server::Args};
use anyhow::{Context, Result};
use secrecy::SecretString;

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

    let frontend_base_url = matches
        .get_one::<String>("frontend-base-url")
        .cloned()
        .context("missing argument: --frontend-base-url")?;

    let session_ttl_seconds = matches
        .get_one::<i64>("session-ttl-seconds")
        .copied()
        .context("missing argument: --session-ttl-seconds")?;

    let totp_issuer = matches
        .get_one::<String>("totp-issuer")
        .cloned()
        .context("missing argument: --totp-issuer")?;

    let encryption_key = matches
        .get_one::<String>("encryption-key")
        .cloned()
        .map(SecretString::from)
        .context("missing required argument: --encryption-key")?;

    Ok(Action::Server(Args {
        port,
        dsn,
        frontend_base_url,
        session_ttl_seconds,
        totp_issuer,
        encryption_key,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn server_args_from_env() {
        temp_env::with_vars(
            [
                (
                    "MEDISAFE_DSN",
                    Some("postgres://user@localhost:5432/medisafe"),
                ),
                (
                    "MEDISAFE_ENCRYPTION_KEY",
                    Some("AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA="),
                ),
                ("MEDISAFE_PORT", None::<&str>),
                ("MEDISAFE_FRONTEND_BASE_URL", None),
                ("MEDISAFE_SESSION_TTL_SECONDS", None),
                ("MEDISAFE_TOTP_ISSUER", None),
            ],
            || {
                let command = crate::cli::commands::new();
                let matches = command.get_matches_from(vec!["medisafe"]);
                let action = handler(&matches).expect("handler should succeed");

                let Action::Server(args) = action;
                assert_eq!(args.port, 8080);
                assert_eq!(args.dsn, "postgres://user@localhost:5432/medisafe");
                assert_eq!(args.frontend_base_url, "https://medisafe.dev");
                assert_eq!(args.session_ttl_seconds, 43200);
                assert_eq!(args.totp_issuer, "MediSafe");
                assert_eq!(
                    args.encryption_key.expose_secret(),
                    "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA="
                );
            },
        );
    }

    #[test]
    fn secret_key_is_redacted_in_debug() {
        temp_env::with_vars(
            [
                (
                    "MEDISAFE_DSN",
                    Some("postgres://user@localhost:5432/medisafe"),
                ),
                (
                    "MEDISAFE_ENCRYPTION_KEY",
                    Some("AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA="),
                ),
            ],
            || {
                let command = crate::cli::commands::new();
                let matches = command.get_matches_from(vec!["medisafe"]);
                let action = handler(&matches).expect("handler should succeed");

                let Action::Server(args) = action;
                let rendered = format!("{args:?}");
                assert!(!rendered.contains("AAAAAAAA"));
            },
        );
    }
}
