//! Per-collection authentication policy.

use std::fmt;
use std::time::Duration;

use crate::auth::lockout::LockoutPolicy;

const DEFAULT_MAX_LOGIN_ATTEMPTS: u32 = 5;
const DEFAULT_LOCK_TIME: Duration = Duration::from_secs(10 * 60);
const DEFAULT_TOKEN_EXPIRATION: Duration = Duration::from_secs(2 * 60 * 60);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    #[default]
    Lax,
    None,
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Strict => "Strict",
            Self::Lax => "Lax",
            Self::None => "None",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CookiePolicy {
    domain: Option<String>,
    same_site: SameSite,
    secure: bool,
    http_only: bool,
    path: String,
}

impl Default for CookiePolicy {
    fn default() -> Self {
        Self {
            domain: None,
            same_site: SameSite::Lax,
            secure: false,
            http_only: true,
            path: "/".to_string(),
        }
    }
}

impl CookiePolicy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    #[must_use]
    pub fn with_same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = same_site;
        self
    }

    #[must_use]
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    #[must_use]
    pub fn with_http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    #[must_use]
    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }

    #[must_use]
    pub fn same_site(&self) -> SameSite {
        self.same_site
    }

    #[must_use]
    pub fn secure(&self) -> bool {
        self.secure
    }

    #[must_use]
    pub fn http_only(&self) -> bool {
        self.http_only
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }
}

#[derive(Clone, Debug)]
pub struct AuthPolicy {
    max_login_attempts: u32,
    lock_time: Duration,
    token_expiration: Duration,
    verify: bool,
    cookies: CookiePolicy,
    remove_token_from_responses: bool,
}

impl Default for AuthPolicy {
    fn default() -> Self {
        Self {
            max_login_attempts: DEFAULT_MAX_LOGIN_ATTEMPTS,
            lock_time: DEFAULT_LOCK_TIME,
            token_expiration: DEFAULT_TOKEN_EXPIRATION,
            verify: false,
            cookies: CookiePolicy::default(),
            remove_token_from_responses: false,
        }
    }
}

impl AuthPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero disables lockout.
    #[must_use]
    pub fn with_max_login_attempts(mut self, attempts: u32) -> Self {
        self.max_login_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_lock_time(mut self, lock_time: Duration) -> Self {
        self.lock_time = lock_time;
        self
    }

    #[must_use]
    pub fn with_token_expiration(mut self, expiration: Duration) -> Self {
        self.token_expiration = expiration;
        self
    }

    #[must_use]
    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    #[must_use]
    pub fn with_cookies(mut self, cookies: CookiePolicy) -> Self {
        self.cookies = cookies;
        self
    }

    #[must_use]
    pub fn with_remove_token_from_responses(mut self, remove: bool) -> Self {
        self.remove_token_from_responses = remove;
        self
    }

    #[must_use]
    pub fn max_login_attempts(&self) -> u32 {
        self.max_login_attempts
    }

    #[must_use]
    pub fn lock_time(&self) -> Duration {
        self.lock_time
    }

    #[must_use]
    pub fn token_expiration(&self) -> Duration {
        self.token_expiration
    }

    #[must_use]
    pub fn verify(&self) -> bool {
        self.verify
    }

    #[must_use]
    pub fn cookies(&self) -> &CookiePolicy {
        &self.cookies
    }

    #[must_use]
    pub fn remove_token_from_responses(&self) -> bool {
        self.remove_token_from_responses
    }

    #[must_use]
    pub fn lockout(&self) -> LockoutPolicy {
        LockoutPolicy {
            max_login_attempts: self.max_login_attempts,
            lock_time: self.lock_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let policy = AuthPolicy::new();
        assert_eq!(policy.max_login_attempts(), 5);
        assert_eq!(policy.lock_time(), Duration::from_secs(600));
        assert_eq!(policy.token_expiration(), Duration::from_secs(7200));
        assert!(!policy.verify());
        assert!(!policy.remove_token_from_responses());

        let cookies = policy.cookies();
        assert_eq!(cookies.domain(), None);
        assert_eq!(cookies.same_site(), SameSite::Lax);
        assert!(cookies.http_only());
        assert!(!cookies.secure());
        assert_eq!(cookies.path(), "/");
    }

    #[test]
    fn builder_overrides() {
        let policy = AuthPolicy::new()
            .with_max_login_attempts(0)
            .with_cookies(CookiePolicy::new().with_domain("example.com").with_secure(true));
        assert!(!policy.lockout().enabled());
        assert_eq!(policy.cookies().domain(), Some("example.com"));
        assert!(policy.cookies().secure());
    }
}
