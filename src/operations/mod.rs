//! Collection operations.
//!
//! Every operation follows the same frame: `beforeOperation` hooks, open or
//! join a transaction, the operation body, `afterOperation` hooks, then commit
//! when the transaction is owned. A failure anywhere rolls back.

use secrecy::SecretString;
use serde::Serialize;

use crate::storage::Document;

pub mod find_by_id;
pub mod login;
pub mod register;
pub mod unlock;

#[derive(Clone, Debug)]
pub struct LoginArgs {
    pub email: String,
    pub password: SecretString,
    pub depth: u32,
    pub show_hidden_fields: bool,
}

impl LoginArgs {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: SecretString::from(password.into()),
            depth: 0,
            show_hidden_fields: false,
        }
    }
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct LoginResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Token expiry, seconds since the epoch.
    pub exp: i64,
    pub user: Document,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UnlockArgs {
    pub email: String,
    /// Skip the collection's unlock access check. Set by in-process callers
    /// such as login, never by transports.
    pub override_access: bool,
}

impl UnlockArgs {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            override_access: false,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FindByIdArgs {
    pub id: String,
    /// Requested population depth, clamped to the instance's `max_depth`.
    pub depth: u32,
    /// Levels already populated by an enclosing read.
    pub current_depth: u32,
    pub show_hidden_fields: bool,
    /// Return `Ok(None)` instead of `NotFound`.
    pub disable_errors: bool,
    /// Skip the collection's read access check.
    pub override_access: bool,
}

/// Input seen by `beforeOperation` hooks.
#[derive(Clone, Debug)]
pub enum OperationArgs {
    Login(LoginArgs),
    Unlock(UnlockArgs),
    FindById(FindByIdArgs),
}

/// Output seen by `afterOperation` hooks.
#[derive(Clone, Debug, PartialEq)]
pub enum OperationResult {
    Login(LoginResult),
    Unlock(bool),
    FindById(Option<Document>),
}

pub(crate) fn wrong_shape(stage: &str) -> crate::error::OperationError {
    crate::error::OperationError::validation(format!(
        "{stage} hook returned a value for a different operation"
    ))
}
