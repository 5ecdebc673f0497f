//! Field schema consumed by the read sanitization pass.

use serde_json::Value;

use crate::hooks::Hook;

#[derive(Clone, Debug)]
pub enum FieldKind {
    Scalar,
    Group(Vec<Field>),
    Array(Vec<Field>),
    /// Id (or list of ids) of documents in another collection.
    Relationship { collection: String },
}

#[derive(Clone, Debug)]
pub struct Field {
    name: String,
    kind: FieldKind,
    hidden: bool,
    localized: bool,
    save_to_jwt: bool,
    after_read: Vec<Hook<Value>>,
}

impl Field {
    fn with_kind(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            hidden: false,
            localized: false,
            save_to_jwt: false,
            after_read: Vec::new(),
        }
    }

    pub fn scalar(name: impl Into<String>) -> Self {
        Self::with_kind(name, FieldKind::Scalar)
    }

    pub fn group(name: impl Into<String>, fields: Vec<Field>) -> Self {
        Self::with_kind(name, FieldKind::Group(fields))
    }

    pub fn array(name: impl Into<String>, fields: Vec<Field>) -> Self {
        Self::with_kind(name, FieldKind::Array(fields))
    }

    pub fn relationship(name: impl Into<String>, collection: impl Into<String>) -> Self {
        Self::with_kind(
            name,
            FieldKind::Relationship {
                collection: collection.into(),
            },
        )
    }

    #[must_use]
    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    #[must_use]
    pub fn localized(mut self) -> Self {
        self.localized = true;
        self
    }

    #[must_use]
    pub fn save_to_jwt(mut self) -> Self {
        self.save_to_jwt = true;
        self
    }

    #[must_use]
    pub fn with_after_read(mut self, hook: Hook<Value>) -> Self {
        self.after_read.push(hook);
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    #[must_use]
    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    #[must_use]
    pub fn is_localized(&self) -> bool {
        self.localized
    }

    #[must_use]
    pub fn is_saved_to_jwt(&self) -> bool {
        self.save_to_jwt
    }

    #[must_use]
    pub fn after_read(&self) -> &[Hook<Value>] {
        &self.after_read
    }
}
