use clap::{Arg, ArgAction, ArgMatches, Command};
use std::time::Duration;

use crate::config::{AuthPolicy, CookiePolicy, SameSite};

pub const ARG_COLLECTION: &str = "collection";
pub const ARG_MAX_LOGIN_ATTEMPTS: &str = "max-login-attempts";
pub const ARG_LOCK_TIME_SECONDS: &str = "lock-time-seconds";
pub const ARG_TOKEN_EXPIRATION_SECONDS: &str = "token-expiration-seconds";
pub const ARG_VERIFY: &str = "verify";
pub const ARG_REMOVE_TOKEN: &str = "remove-token-from-responses";
pub const ARG_COOKIE_DOMAIN: &str = "cookie-domain";
pub const ARG_COOKIE_SAME_SITE: &str = "cookie-same-site";
pub const ARG_COOKIE_SECURE: &str = "cookie-secure";

/// Auth collection served by the binary and its policy.
#[derive(Debug, Clone)]
pub struct Options {
    pub collection: String,
    pub policy: AuthPolicy,
}

impl Options {
    /// Parse auth collection arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the collection slug is empty or a duration is zero.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let collection = matches
            .get_one::<String>(ARG_COLLECTION)
            .cloned()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("missing required argument: --{ARG_COLLECTION}"))?;

        let seconds = |id: &str, default: u64| -> anyhow::Result<Duration> {
            let value = matches.get_one::<u64>(id).copied().unwrap_or(default);
            if value == 0 {
                anyhow::bail!("--{id} must be greater than zero");
            }
            Ok(Duration::from_secs(value))
        };

        let same_site = match matches
            .get_one::<String>(ARG_COOKIE_SAME_SITE)
            .map(String::as_str)
        {
            Some("strict") => SameSite::Strict,
            Some("none") => SameSite::None,
            _ => SameSite::Lax,
        };
        let mut cookies = CookiePolicy::new()
            .with_same_site(same_site)
            .with_secure(matches.get_flag(ARG_COOKIE_SECURE));
        if let Some(domain) = matches.get_one::<String>(ARG_COOKIE_DOMAIN) {
            cookies = cookies.with_domain(domain.clone());
        }

        let policy = AuthPolicy::new()
            .with_max_login_attempts(
                matches
                    .get_one::<u32>(ARG_MAX_LOGIN_ATTEMPTS)
                    .copied()
                    .unwrap_or(5),
            )
            .with_lock_time(seconds(ARG_LOCK_TIME_SECONDS, 600)?)
            .with_token_expiration(seconds(ARG_TOKEN_EXPIRATION_SECONDS, 7200)?)
            .with_verify(matches.get_flag(ARG_VERIFY))
            .with_remove_token_from_responses(matches.get_flag(ARG_REMOVE_TOKEN))
            .with_cookies(cookies);

        Ok(Self { collection, policy })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_COLLECTION)
                .long(ARG_COLLECTION)
                .help("Slug of the auth collection")
                .env("FOLIO_COLLECTION")
                .default_value("users"),
        )
        .arg(
            Arg::new(ARG_MAX_LOGIN_ATTEMPTS)
                .long(ARG_MAX_LOGIN_ATTEMPTS)
                .help("Failed logins before the identity is locked (0 disables lockout)")
                .env("FOLIO_MAX_LOGIN_ATTEMPTS")
                .default_value("5")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_LOCK_TIME_SECONDS)
                .long(ARG_LOCK_TIME_SECONDS)
                .help("How long a locked identity stays locked, in seconds")
                .env("FOLIO_LOCK_TIME_SECONDS")
                .default_value("600")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_TOKEN_EXPIRATION_SECONDS)
                .long(ARG_TOKEN_EXPIRATION_SECONDS)
                .help("Session token lifetime in seconds")
                .env("FOLIO_TOKEN_EXPIRATION_SECONDS")
                .default_value("7200")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_VERIFY)
                .long(ARG_VERIFY)
                .help("Reject logins from identities that have not been verified")
                .env("FOLIO_VERIFY")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new(ARG_REMOVE_TOKEN)
                .long(ARG_REMOVE_TOKEN)
                .help("Only deliver the session token as a cookie")
                .env("FOLIO_REMOVE_TOKEN_FROM_RESPONSES")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new(ARG_COOKIE_DOMAIN)
                .long(ARG_COOKIE_DOMAIN)
                .help("Domain attribute of the session cookie (host-only when unset)")
                .env("FOLIO_COOKIE_DOMAIN"),
        )
        .arg(
            Arg::new(ARG_COOKIE_SAME_SITE)
                .long(ARG_COOKIE_SAME_SITE)
                .help("SameSite attribute of the session cookie")
                .env("FOLIO_COOKIE_SAME_SITE")
                .default_value("lax")
                .value_parser(["strict", "lax", "none"]),
        )
        .arg(
            Arg::new(ARG_COOKIE_SECURE)
                .long(ARG_COOKIE_SECURE)
                .help("Mark the session cookie Secure")
                .env("FOLIO_COOKIE_SECURE")
                .action(ArgAction::SetTrue),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_policy_defaults() -> anyhow::Result<()> {
        temp_env::with_vars(
            [
                ("FOLIO_COLLECTION", None::<&str>),
                ("FOLIO_MAX_LOGIN_ATTEMPTS", None),
                ("FOLIO_LOCK_TIME_SECONDS", None),
                ("FOLIO_VERIFY", None),
            ],
            || {
                let matches = with_args(Command::new("t")).try_get_matches_from(["t"])?;
                let options = Options::parse(&matches)?;
                assert_eq!(options.collection, "users");
                assert_eq!(options.policy.max_login_attempts(), 5);
                assert_eq!(options.policy.lock_time(), Duration::from_secs(600));
                assert!(!options.policy.verify());
                assert_eq!(options.policy.cookies().same_site(), SameSite::Lax);
                Ok(())
            },
        )
    }

    #[test]
    fn flags_and_env() -> anyhow::Result<()> {
        temp_env::with_vars([("FOLIO_MAX_LOGIN_ATTEMPTS", Some("3"))], || {
            let matches = with_args(Command::new("t")).try_get_matches_from([
                "t",
                "--verify",
                "--cookie-secure",
                "--cookie-same-site",
                "strict",
                "--lock-time-seconds",
                "900",
            ])?;
            let options = Options::parse(&matches)?;
            assert_eq!(options.policy.max_login_attempts(), 3);
            assert_eq!(options.policy.lock_time(), Duration::from_secs(900));
            assert!(options.policy.verify());
            assert!(options.policy.cookies().secure());
            assert_eq!(options.policy.cookies().same_site(), SameSite::Strict);
            Ok(())
        })
    }

    #[test]
    fn zero_lock_time_is_rejected() -> anyhow::Result<()> {
        let matches = with_args(Command::new("t")).try_get_matches_from([
            "t",
            "--lock-time-seconds",
            "0",
        ])?;
        assert!(Options::parse(&matches).is_err());
        Ok(())
    }
}
