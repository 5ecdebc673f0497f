//! Operation error taxonomy.
//!
//! Every fallible step of an operation returns [`OperationError`]. The core only
//! classifies failures through [`ErrorKind`]; transports decide how to render
//! them (see `api::handlers::error_response`).

use std::fmt;
use thiserror::Error;

use crate::auth::token::TokenError;

/// Lifecycle stage a hook is bound to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HookStage {
    BeforeOperation,
    BeforeLogin,
    AfterLogin,
    AfterRead,
    AfterOperation,
    FieldAfterRead,
}

impl HookStage {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BeforeOperation => "beforeOperation",
            Self::BeforeLogin => "beforeLogin",
            Self::AfterLogin => "afterLogin",
            Self::AfterRead => "afterRead",
            Self::AfterOperation => "afterOperation",
            Self::FieldAfterRead => "field.afterRead",
        }
    }
}

impl fmt::Display for HookStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse classification used by transports to pick a status code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Authentication,
    Forbidden,
    Locked,
    NotFound,
    Validation,
    Hook,
    Timeout,
    Internal,
}

impl ErrorKind {
    /// Translation key for the user-facing message of this kind.
    #[must_use]
    pub const fn message_key(self) -> &'static str {
        match self {
            Self::Authentication => "error:emailOrPasswordIncorrect",
            Self::Forbidden => "error:notAllowedToPerformAction",
            Self::Locked => "error:userLocked",
            Self::NotFound => "error:notFound",
            Self::Validation => "error:validation",
            Self::Hook | Self::Internal => "error:unknown",
            Self::Timeout => "error:timeout",
        }
    }
}

#[derive(Debug, Error)]
pub enum OperationError {
    /// Unknown identity, unverified identity or wrong credential. Kept as a
    /// single variant so callers cannot enumerate accounts.
    #[error("authentication failed")]
    Authentication,
    /// The caller's access does not permit the operation.
    #[error("not allowed to perform this action")]
    Forbidden,
    #[error("identity is locked after too many failed attempts")]
    Locked,
    #[error("{collection} document {id} not found")]
    NotFound { collection: String, id: String },
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("{stage} hook `{hook}` failed")]
    Hook {
        stage: HookStage,
        hook: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("operation deadline elapsed before commit")]
    Timeout,
    #[error("token error")]
    Token(#[from] TokenError),
    #[error("unknown collection: {0}")]
    UnknownCollection(String),
    #[error("collection {0} does not have auth enabled")]
    NotAuthCollection(String),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl OperationError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Authentication => ErrorKind::Authentication,
            Self::Forbidden => ErrorKind::Forbidden,
            Self::Locked => ErrorKind::Locked,
            Self::NotFound { .. } | Self::UnknownCollection(_) => ErrorKind::NotFound,
            Self::Validation(_) | Self::NotAuthCollection(_) => ErrorKind::Validation,
            Self::Hook { .. } => ErrorKind::Hook,
            Self::Timeout => ErrorKind::Timeout,
            Self::Token(_) | Self::Storage(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}
