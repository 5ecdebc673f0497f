//! Instance and collection configuration.
//!
//! Everything here is immutable once a [`crate::Folio`] is built; operations
//! only read it.

use secrecy::SecretString;

pub mod collection;
pub mod fields;
pub mod policy;

pub use collection::{Access, CollectionAccess, CollectionConfig, CollectionHooks};
pub use fields::{Field, FieldKind};
pub use policy::{AuthPolicy, CookiePolicy, SameSite};

const DEFAULT_COOKIE_PREFIX: &str = "folio";
const DEFAULT_LANGUAGE: &str = "en";
pub const DEFAULT_MAX_DEPTH: u32 = 10;

/// Locale value that keeps every translation of a localized field.
pub const ALL_LOCALES: &str = "all";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Localization {
    locales: Vec<String>,
    default_locale: String,
}

impl Localization {
    /// `default_locale` is added to `locales` when missing.
    pub fn new<I, S>(locales: I, default_locale: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let default_locale = default_locale.into();
        let mut locales: Vec<String> = locales.into_iter().map(Into::into).collect();
        if !locales.contains(&default_locale) {
            locales.insert(0, default_locale.clone());
        }
        Self {
            locales,
            default_locale,
        }
    }

    #[must_use]
    pub fn locales(&self) -> &[String] {
        &self.locales
    }

    #[must_use]
    pub fn default_locale(&self) -> &str {
        &self.default_locale
    }
}

#[derive(Clone, Debug)]
pub struct FolioConfig {
    secret: SecretString,
    cookie_prefix: String,
    localization: Option<Localization>,
    language: String,
    max_depth: u32,
}

impl FolioConfig {
    #[must_use]
    pub fn new(secret: SecretString) -> Self {
        Self {
            secret,
            cookie_prefix: DEFAULT_COOKIE_PREFIX.to_string(),
            localization: None,
            language: DEFAULT_LANGUAGE.to_string(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    #[must_use]
    pub fn with_cookie_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.cookie_prefix = prefix.into();
        self
    }

    #[must_use]
    pub fn with_localization(mut self, localization: Localization) -> Self {
        self.localization = Some(localization);
        self
    }

    #[must_use]
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Upper bound on relationship population depth, whatever a call asks for.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }

    #[must_use]
    pub fn secret(&self) -> &SecretString {
        &self.secret
    }

    #[must_use]
    pub fn cookie_prefix(&self) -> &str {
        &self.cookie_prefix
    }

    #[must_use]
    pub fn cookie_name(&self) -> String {
        format!("{}-token", self.cookie_prefix)
    }

    #[must_use]
    pub fn localization(&self) -> Option<&Localization> {
        self.localization.as_ref()
    }

    #[must_use]
    pub fn language(&self) -> &str {
        &self.language
    }

    #[must_use]
    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    /// Population depth for a call asking for `requested` levels, `current`
    /// of which were already populated by an enclosing read.
    #[must_use]
    pub fn effective_depth(&self, requested: u32, current: u32) -> u32 {
        requested.min(self.max_depth).saturating_sub(current)
    }
}
