//! Failed-attempt counting and temporary lockout.
//!
//! Lockout is enabled only when `max_login_attempts > 0`. A lock is active
//! while `lock_until > now`; once it passes, the next failure starts a fresh
//! count.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::time::Duration;

use super::{LOCK_UNTIL, LOGIN_ATTEMPTS};
use crate::clock::delta;
use crate::storage::Document;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockState {
    Active,
    Locked { until: DateTime<Utc> },
}

#[must_use]
pub fn state(lock_until: Option<DateTime<Utc>>, now: DateTime<Utc>) -> LockState {
    match lock_until {
        Some(until) if until > now => LockState::Locked { until },
        _ => LockState::Active,
    }
}

#[must_use]
pub fn is_locked(lock_until: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    matches!(state(lock_until, now), LockState::Locked { .. })
}

/// New counter and lock values to persist.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LockoutUpdate {
    pub login_attempts: u32,
    pub lock_until: Option<DateTime<Utc>>,
}

impl LockoutUpdate {
    #[must_use]
    pub const fn reset() -> Self {
        Self {
            login_attempts: 0,
            lock_until: None,
        }
    }

    #[must_use]
    pub fn to_patch(&self) -> Document {
        let mut patch = Document::new();
        patch.insert(LOGIN_ATTEMPTS.to_string(), Value::from(self.login_attempts));
        patch.insert(
            LOCK_UNTIL.to_string(),
            self.lock_until
                .map_or(Value::Null, |until| Value::String(until.to_rfc3339())),
        );
        patch
    }
}

/// Last instant a lock can reach. Later deadlines would not survive an
/// RFC 3339 round trip through storage.
fn latest_lock() -> DateTime<Utc> {
    DateTime::from_timestamp(253_402_300_799, 0).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn lock_deadline(now: DateTime<Utc>, lock_time: Duration) -> DateTime<Utc> {
    let latest = latest_lock();
    now.checked_add_signed(delta(lock_time))
        .map_or(latest, |until| until.min(latest))
}

#[derive(Clone, Copy, Debug)]
pub struct LockoutPolicy {
    pub max_login_attempts: u32,
    pub lock_time: Duration,
}

impl LockoutPolicy {
    #[must_use]
    pub const fn enabled(&self) -> bool {
        self.max_login_attempts > 0
    }

    /// Counter update after one more failed attempt.
    ///
    /// Reaching the limit sets the lock in the same update. A failure after an
    /// expired lock restarts the count at one and clears the stale lock.
    #[must_use]
    pub fn register_failure(
        &self,
        login_attempts: u32,
        lock_until: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> LockoutUpdate {
        let lock_expired = lock_until.is_some_and(|until| until <= now);
        let previous = if lock_expired { 0 } else { login_attempts };
        let attempts = previous.saturating_add(1);

        let lock_until = if attempts >= self.max_login_attempts {
            Some(lock_deadline(now, self.lock_time))
        } else {
            None
        };

        LockoutUpdate {
            login_attempts: attempts,
            lock_until,
        }
    }
}
