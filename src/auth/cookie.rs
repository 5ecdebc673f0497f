//! Session cookie rendering.

use chrono::{DateTime, Utc};
use std::fmt;

use crate::config::{CookiePolicy, SameSite};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub expires: DateTime<Utc>,
    pub domain: Option<String>,
    pub path: String,
    pub same_site: SameSite,
    pub secure: bool,
    pub http_only: bool,
}

impl Cookie {
    /// Session cookie carrying `token` until `expires`, with every attribute
    /// taken from `policy`.
    #[must_use]
    pub fn session(name: &str, token: &str, expires: DateTime<Utc>, policy: &CookiePolicy) -> Self {
        Self {
            name: name.to_string(),
            value: token.to_string(),
            expires,
            domain: policy.domain().map(ToString::to_string),
            path: policy.path().to_string(),
            same_site: policy.same_site(),
            secure: policy.secure(),
            http_only: policy.http_only(),
        }
    }
}

/// `Set-Cookie` header value. No `Domain` attribute means a host-only cookie.
impl fmt::Display for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}={}; Path={}; Expires={}",
            self.name,
            self.value,
            self.path,
            self.expires.format("%a, %d %b %Y %H:%M:%S GMT")
        )?;
        if let Some(domain) = &self.domain {
            write!(f, "; Domain={domain}")?;
        }
        write!(f, "; SameSite={}", self.same_site)?;
        if self.secure {
            f.write_str("; Secure")?;
        }
        if self.http_only {
            f.write_str("; HttpOnly")?;
        }
        Ok(())
    }
}

/// Collects transport side effects (cookies) produced by an operation.
#[derive(Clone, Debug, Default)]
pub struct ResponseSink {
    cookies: Vec<Cookie>,
}

impl ResponseSink {
    pub fn set_cookie(&mut self, cookie: Cookie) {
        self.cookies.retain(|c| c.name != cookie.name);
        self.cookies.push(cookie);
    }

    /// Drop everything staged so far.
    pub fn clear(&mut self) {
        self.cookies.clear();
    }

    #[must_use]
    pub fn cookies(&self) -> &[Cookie] {
        &self.cookies
    }

    #[must_use]
    pub fn into_cookies(self) -> Vec<Cookie> {
        self.cookies
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expires() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_007_200, 0).unwrap_or_default()
    }

    #[test]
    fn host_only_cookie_has_no_domain() {
        let cookie = Cookie::session("folio-token", "abc", expires(), &CookiePolicy::new());
        assert_eq!(
            cookie.to_string(),
            "folio-token=abc; Path=/; Expires=Wed, 15 Nov 2023 00:13:20 GMT; SameSite=Lax; HttpOnly"
        );
    }

    #[test]
    fn policy_attributes_are_rendered_verbatim() {
        let policy = CookiePolicy::new()
            .with_domain("example.com")
            .with_same_site(SameSite::Strict)
            .with_secure(true)
            .with_path("/admin");
        let rendered = Cookie::session("cms-token", "t", expires(), &policy).to_string();
        assert!(rendered.contains("; Domain=example.com"));
        assert!(rendered.contains("; SameSite=Strict"));
        assert!(rendered.contains("; Secure"));
        assert!(rendered.contains("Path=/admin"));
    }

    #[test]
    fn sink_keeps_latest_cookie_per_name() {
        let mut sink = ResponseSink::default();
        sink.set_cookie(Cookie::session("a", "1", expires(), &CookiePolicy::new()));
        sink.set_cookie(Cookie::session("a", "2", expires(), &CookiePolicy::new()));
        assert_eq!(sink.cookies().len(), 1);
        assert_eq!(sink.into_cookies()[0].value, "2");
    }
}
