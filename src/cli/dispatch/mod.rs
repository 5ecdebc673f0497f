//! Command-line argument dispatch.
//!
//! This module maps validated CLI arguments to the action to run: serving the
//! HTTP API or registering an identity.

use crate::cli::actions::{create_user, serve, Action};
use crate::cli::commands::{
    auth, ARG_COOKIE_PREFIX, ARG_DSN, ARG_EMAIL, ARG_LANGUAGE, ARG_MAX_DEPTH, ARG_PASSWORD,
    ARG_PORT, ARG_SECRET, CMD_CREATE_USER, CMD_SERVE,
};
use anyhow::{anyhow, Context, Result};
use secrecy::SecretString;
use url::Url;

/// Map validated CLI matches to an action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    match matches.subcommand() {
        Some((CMD_SERVE, sub)) => serve_args(sub).map(Action::Serve),
        Some((CMD_CREATE_USER, sub)) => create_user_args(sub).map(Action::CreateUser),
        Some((name, _)) => Err(anyhow!("unknown command: {name}")),
        None => Err(anyhow!("missing command")),
    }
}

fn serve_args(matches: &clap::ArgMatches) -> Result<serve::Args> {
    let secret = required(matches, ARG_SECRET)?;
    let dsn = matches
        .get_one::<String>(ARG_DSN)
        .map(|dsn| validate_dsn(dsn))
        .transpose()?;

    Ok(serve::Args {
        port: matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080),
        dsn,
        secret: SecretString::from(secret),
        cookie_prefix: required(matches, ARG_COOKIE_PREFIX)?,
        language: required(matches, ARG_LANGUAGE)?,
        max_depth: matches
            .get_one::<u32>(ARG_MAX_DEPTH)
            .copied()
            .unwrap_or(crate::config::DEFAULT_MAX_DEPTH),
        auth: auth::Options::parse(matches)?,
    })
}

fn create_user_args(matches: &clap::ArgMatches) -> Result<create_user::Args> {
    Ok(create_user::Args {
        dsn: validate_dsn(&required(matches, ARG_DSN)?)?,
        email: required(matches, ARG_EMAIL)?,
        password: SecretString::from(required(matches, ARG_PASSWORD)?),
        auth: auth::Options::parse(matches)?,
    })
}

fn required(matches: &clap::ArgMatches, id: &str) -> Result<String> {
    matches
        .get_one::<String>(id)
        .cloned()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| anyhow!("missing required argument: --{id}"))
}

/// Keep the DSN opaque to logs; only check that it parses as a postgres URL.
fn validate_dsn(dsn: &str) -> Result<SecretString> {
    let url = Url::parse(dsn).context("invalid --dsn")?;
    if !matches!(url.scheme(), "postgres" | "postgresql") {
        return Err(anyhow!("--dsn must use the postgres scheme"));
    }
    Ok(SecretString::from(dsn.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_without_dsn_uses_memory() -> Result<()> {
        temp_env::with_vars(
            [
                ("FOLIO_DSN", None::<&str>),
                ("FOLIO_SECRET", Some("s3cret")),
                ("FOLIO_MAX_DEPTH", None),
            ],
            || {
                let matches = crate::cli::commands::new().try_get_matches_from(["folio", "serve"])?;
                let Action::Serve(args) = handler(&matches)? else {
                    return Err(anyhow!("expected serve"));
                };
                assert!(args.dsn.is_none());
                assert_eq!(args.port, 8080);
                assert_eq!(args.auth.collection, "users");
                assert_eq!(args.max_depth, 10);
                Ok(())
            },
        )
    }

    #[test]
    fn bad_dsn_scheme_is_rejected() -> Result<()> {
        temp_env::with_vars([("FOLIO_SECRET", Some("s3cret"))], || {
            let matches = crate::cli::commands::new().try_get_matches_from([
                "folio",
                "serve",
                "--dsn",
                "mysql://localhost/folio",
            ])?;
            let result = handler(&matches);
            assert!(result.is_err());
            if let Err(err) = result {
                assert!(err.to_string().contains("postgres"));
            }
            Ok(())
        })
    }

    #[test]
    fn create_user_is_dispatched() -> Result<()> {
        temp_env::with_vars([("FOLIO_PASSWORD", None::<&str>)], || {
            let matches = crate::cli::commands::new().try_get_matches_from([
                "folio",
                "create-user",
                "--dsn",
                "postgres://localhost/folio",
                "--email",
                "alice@example.com",
                "--password",
                "hunter2",
            ])?;
            let Action::CreateUser(args) = handler(&matches)? else {
                return Err(anyhow!("expected create-user"));
            };
            assert_eq!(args.email, "alice@example.com");
            Ok(())
        })
    }
}
