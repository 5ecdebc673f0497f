//! Authentication building blocks: credential hashing, lockout, tokens and
//! cookies.

use anyhow::Context;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::OperationError;
use crate::storage::Document;

pub mod cookie;
pub mod credentials;
pub mod lockout;
pub mod token;

pub const EMAIL: &str = "email";
pub const HASH: &str = "hash";
pub const LOGIN_ATTEMPTS: &str = "login_attempts";
pub const LOCK_UNTIL: &str = "lock_until";
pub const VERIFIED: &str = "verified";

/// Typed view of an identity document.
#[derive(Clone, Debug, Deserialize)]
pub struct IdentityRecord {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub login_attempts: u32,
    #[serde(default)]
    pub lock_until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub verified: Option<bool>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl IdentityRecord {
    /// # Errors
    /// Returns an error if the document lacks `id`/`email` or has mistyped
    /// bookkeeping fields.
    pub fn from_document(doc: &Document) -> Result<Self, OperationError> {
        serde_json::from_value(Value::Object(doc.clone()))
            .context("malformed identity record")
            .map_err(OperationError::Storage)
    }
}

#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
#[must_use]
pub fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

/// Normalize and validate a submitted email.
///
/// # Errors
/// Returns `Validation` when the email is empty or malformed.
pub fn validate_email(email: &str) -> Result<String, OperationError> {
    let email = normalize_email(email);
    if email.is_empty() {
        return Err(OperationError::validation("email is required"));
    }
    if !valid_email(&email) {
        return Err(OperationError::validation("email is invalid"));
    }
    Ok(email)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalize_email_trims_and_lowercases() {
        assert_eq!(normalize_email(" Alice@Example.COM "), "alice@example.com");
    }

    #[test]
    fn valid_email_rejects_missing_parts() {
        assert!(valid_email("a@example.com"));
        assert!(!valid_email("not-an-email"));
        assert!(!valid_email("missing-domain@"));
    }

    #[test]
    fn validate_email_classifies_errors() {
        assert!(matches!(
            validate_email("   "),
            Err(OperationError::Validation(_))
        ));
        assert!(matches!(
            validate_email("nope"),
            Err(OperationError::Validation(_))
        ));
        assert_eq!(validate_email(" A@B.co ").ok().as_deref(), Some("a@b.co"));
    }

    #[test]
    fn identity_record_reads_bookkeeping_fields() -> Result<(), OperationError> {
        let doc = json!({
            "id": "u1",
            "email": "a@b.co",
            "hash": "$argon2id$...",
            "login_attempts": 2,
            "lock_until": "2030-01-01T00:00:00Z",
            "extra": true
        });
        let Value::Object(doc) = doc else {
            return Ok(());
        };
        let record = IdentityRecord::from_document(&doc)?;
        assert_eq!(record.login_attempts, 2);
        assert!(record.lock_until.is_some());
        assert_eq!(record.verified, None);
        Ok(())
    }

    #[test]
    fn null_lock_until_reads_as_none() -> Result<(), OperationError> {
        let Value::Object(doc) = json!({"id": "u1", "email": "a@b.co", "lock_until": null, "login_attempts": null}) else {
            return Ok(());
        };
        assert!(IdentityRecord::from_document(&doc)?.lock_until.is_none());
        Ok(())
    }
}
