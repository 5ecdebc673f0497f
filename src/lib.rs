//! # Folio (collection operation pipeline)
//!
//! `folio` runs content-management operations against document collections.
//! Every operation goes through the same frame: user-supplied hooks at fixed
//! stages, a transaction that commits on success and rolls back on any error,
//! and a read pipeline that strips hidden data before anything leaves the
//! process.
//!
//! ## Authentication
//!
//! Collections configured with an [`config::AuthPolicy`] hold identities.
//! `login` verifies an Argon2id credential hash, enforces a failed-attempt
//! lockout, and issues an HS256 session token, optionally written as a cookie.
//! Failed-attempt counters are persisted even though the login transaction is
//! rolled back.
//!
//! ## Hooks
//!
//! Hooks are async functions registered per stage (`beforeOperation`,
//! `beforeLogin`, `afterLogin`, `afterRead`, `afterOperation`, and field-level
//! `afterRead`). Each hook may replace the value it receives; the first hook
//! error aborts the operation.
//!
//! ## Transports
//!
//! Operations are called in-process through [`Folio`] and an
//! [`OperationContext`], or over HTTP through [`api`].

pub mod api;
pub mod auth;
pub mod cli;
pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod hooks;
pub mod i18n;
pub mod instance;
pub mod operations;
pub mod sanitize;
pub mod storage;
pub mod transaction;

pub use context::{LocalOptions, OperationContext};
pub use error::{ErrorKind, HookStage, OperationError};
pub use instance::{Folio, FolioBuilder};
pub use storage::Document;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }
}
