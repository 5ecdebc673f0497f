use crate::auth::{EMAIL, HASH, LOCK_UNTIL, LOGIN_ATTEMPTS, VERIFIED};
use crate::hooks::Hook;
use crate::operations::{OperationArgs, OperationResult};
use crate::storage::Document;

use super::fields::Field;
use super::policy::AuthPolicy;

/// Collection-level hook lists, one per stage.
#[derive(Clone, Debug, Default)]
pub struct CollectionHooks {
    pub before_operation: Vec<Hook<OperationArgs>>,
    pub before_login: Vec<Hook<Document>>,
    pub after_login: Vec<Hook<Document>>,
    pub after_read: Vec<Hook<Document>>,
    pub after_operation: Vec<Hook<OperationResult>>,
}

/// Who may run an operation when the call does not override access.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Access {
    #[default]
    Anyone,
    LoggedIn,
    Nobody,
}

impl Access {
    #[must_use]
    pub fn permits(self, user: Option<&Document>) -> bool {
        match self {
            Self::Anyone => true,
            Self::LoggedIn => user.is_some(),
            Self::Nobody => false,
        }
    }
}

/// Per-operation access of a collection. Reads are public by default and
/// unlocking requires a logged-in user.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CollectionAccess {
    pub read: Access,
    pub unlock: Access,
}

impl Default for CollectionAccess {
    fn default() -> Self {
        Self {
            read: Access::Anyone,
            unlock: Access::LoggedIn,
        }
    }
}

#[derive(Clone, Debug)]
pub struct CollectionConfig {
    slug: String,
    fields: Vec<Field>,
    auth: Option<AuthPolicy>,
    hooks: CollectionHooks,
    access: CollectionAccess,
}

impl CollectionConfig {
    pub fn new(slug: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            fields: Vec::new(),
            auth: None,
            hooks: CollectionHooks::default(),
            access: CollectionAccess::default(),
        }
    }

    /// Add `field`, replacing any field with the same name in place.
    #[must_use]
    pub fn with_field(mut self, field: Field) -> Self {
        match self.fields.iter_mut().find(|f| f.name() == field.name()) {
            Some(existing) => *existing = field,
            None => self.fields.push(field),
        }
        self
    }

    /// Enable authentication. Adds the identity fields every auth collection
    /// carries; credential and lockout bookkeeping fields are hidden.
    #[must_use]
    pub fn with_auth(mut self, policy: AuthPolicy) -> Self {
        self.auth = Some(policy);
        if !self.fields.iter().any(|f| f.name() == EMAIL) {
            self.fields.insert(0, Field::scalar(EMAIL).save_to_jwt());
        }
        for name in [HASH, LOGIN_ATTEMPTS, LOCK_UNTIL, VERIFIED] {
            self = self.with_field(Field::scalar(name).hidden());
        }
        self
    }

    #[must_use]
    pub fn with_read_access(mut self, access: Access) -> Self {
        self.access.read = access;
        self
    }

    #[must_use]
    pub fn with_unlock_access(mut self, access: Access) -> Self {
        self.access.unlock = access;
        self
    }

    #[must_use]
    pub fn with_before_operation(mut self, hook: Hook<OperationArgs>) -> Self {
        self.hooks.before_operation.push(hook);
        self
    }

    #[must_use]
    pub fn with_before_login(mut self, hook: Hook<Document>) -> Self {
        self.hooks.before_login.push(hook);
        self
    }

    #[must_use]
    pub fn with_after_login(mut self, hook: Hook<Document>) -> Self {
        self.hooks.after_login.push(hook);
        self
    }

    #[must_use]
    pub fn with_after_read(mut self, hook: Hook<Document>) -> Self {
        self.hooks.after_read.push(hook);
        self
    }

    #[must_use]
    pub fn with_after_operation(mut self, hook: Hook<OperationResult>) -> Self {
        self.hooks.after_operation.push(hook);
        self
    }

    #[must_use]
    pub fn slug(&self) -> &str {
        &self.slug
    }

    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    #[must_use]
    pub fn auth(&self) -> Option<&AuthPolicy> {
        self.auth.as_ref()
    }

    #[must_use]
    pub fn hooks(&self) -> &CollectionHooks {
        &self.hooks
    }

    #[must_use]
    pub fn access(&self) -> CollectionAccess {
        self.access
    }
}
