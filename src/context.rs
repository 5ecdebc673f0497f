//! Per-invocation operation context.
//!
//! One [`OperationContext`] is created for each top-level call and threaded by
//! `&mut` through every nested operation, so that nested calls share the
//! transaction, the acting user and the data cache.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::auth::cookie::{Cookie, ResponseSink};
use crate::config::FolioConfig;
use crate::hooks::{HookContext, OperationKind, RequestContext};
use crate::i18n::Translator;
use crate::storage::{Document, Storage, TransactionId};

/// Write that must survive a rollback of the surrounding transaction.
#[derive(Clone, Debug, PartialEq)]
pub struct DeferredWrite {
    pub collection: String,
    pub id: String,
    pub patch: Document,
}

pub struct OperationContext {
    pub(crate) storage: Arc<dyn Storage>,
    pub(crate) transaction: Option<TransactionId>,
    pub(crate) user: Option<Document>,
    pub(crate) locale: Option<String>,
    pub(crate) fallback_locale: Option<String>,
    pub(crate) locales: Vec<String>,
    pub(crate) translator: Translator,
    pub(crate) data_cache: HashMap<(String, String), Option<Document>>,
    pub(crate) request_context: RequestContext,
    pub(crate) deferred: Vec<DeferredWrite>,
    pub(crate) deadline: Option<Instant>,
    pub(crate) response: Option<ResponseSink>,
}

impl std::fmt::Debug for OperationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationContext")
            .field("transaction", &self.transaction)
            .field("locale", &self.locale)
            .field("fallback_locale", &self.fallback_locale)
            .field("deferred", &self.deferred.len())
            .finish_non_exhaustive()
    }
}

impl OperationContext {
    pub(crate) fn hook_context(
        &self,
        operation: OperationKind,
        collection: &str,
        token: Option<&str>,
    ) -> HookContext {
        HookContext {
            operation,
            collection: collection.to_string(),
            storage: Arc::clone(&self.storage),
            transaction: self.transaction,
            user: self.user.clone(),
            locale: self.locale.clone(),
            token: token.map(ToString::to_string),
            context: self.request_context.clone(),
        }
    }

    pub(crate) fn defer(&mut self, write: DeferredWrite) {
        self.deferred.push(write);
    }

    #[must_use]
    pub fn transaction(&self) -> Option<TransactionId> {
        self.transaction
    }

    #[must_use]
    pub fn user(&self) -> Option<&Document> {
        self.user.as_ref()
    }

    pub fn set_user(&mut self, user: Option<Document>) {
        self.user = user;
    }

    #[must_use]
    pub fn locale(&self) -> Option<&str> {
        self.locale.as_deref()
    }

    #[must_use]
    pub fn fallback_locale(&self) -> Option<&str> {
        self.fallback_locale.as_deref()
    }

    #[must_use]
    pub fn translator(&self) -> &Translator {
        &self.translator
    }

    #[must_use]
    pub fn request_context(&self) -> &RequestContext {
        &self.request_context
    }

    /// Cookies written by the operation, if the caller asked for a sink.
    #[must_use]
    pub fn take_cookies(&mut self) -> Vec<Cookie> {
        self.response
            .take()
            .map(ResponseSink::into_cookies)
            .unwrap_or_default()
    }
}

/// Options for invoking operations in-process.
#[derive(Clone, Debug, Default)]
pub struct LocalOptions {
    locale: Option<String>,
    fallback_locale: Option<String>,
    user: Option<Document>,
    context: Option<Document>,
    timeout: Option<Duration>,
    transaction: Option<TransactionId>,
    response_sink: bool,
}

impl LocalOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    #[must_use]
    pub fn with_fallback_locale(mut self, locale: impl Into<String>) -> Self {
        self.fallback_locale = Some(locale.into());
        self
    }

    /// Acting identity, visible to hooks.
    #[must_use]
    pub fn with_user(mut self, user: Document) -> Self {
        self.user = Some(user);
        self
    }

    #[must_use]
    pub fn with_context(mut self, context: Document) -> Self {
        self.context = Some(context);
        self
    }

    /// Roll back and fail with `Timeout` if the operation is still running
    /// after `timeout`.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Join an already open transaction (for calls made from inside hooks).
    #[must_use]
    pub fn with_transaction(mut self, transaction: Option<TransactionId>) -> Self {
        self.transaction = transaction;
        self
    }

    /// Collect cookies produced by the operation.
    #[must_use]
    pub fn with_response_sink(mut self) -> Self {
        self.response_sink = true;
        self
    }

    pub(crate) fn build(self, config: &FolioConfig, storage: Arc<dyn Storage>) -> OperationContext {
        let localization = config.localization();
        let default_locale = localization.map(|l| l.default_locale().to_string());
        let (locale, fallback_locale) = match localization {
            Some(_) => (
                self.locale.or_else(|| default_locale.clone()),
                self.fallback_locale.or(default_locale),
            ),
            None => (None, None),
        };

        OperationContext {
            storage,
            transaction: self.transaction,
            user: self.user,
            locale,
            fallback_locale,
            locales: localization.map(|l| l.locales().to_vec()).unwrap_or_default(),
            translator: Translator::new(config.language()),
            data_cache: HashMap::new(),
            request_context: RequestContext::from(self.context.unwrap_or_default()),
            deferred: Vec::new(),
            deadline: self.timeout.map(|timeout| Instant::now() + timeout),
            response: self.response_sink.then(ResponseSink::default),
        }
    }
}

/// Copy of `doc` without storage-reserved keys (`__`-prefixed).
pub(crate) fn strip_reserved(mut doc: Document) -> Document {
    doc.retain(|key, _| !key.starts_with("__"));
    doc
}

/// Value for `key` without cloning the whole document.
pub(crate) fn string_field<'a>(doc: &'a Document, key: &str) -> Option<&'a str> {
    doc.get(key).and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Localization;
    use crate::storage::MemoryStorage;
    use secrecy::SecretString;

    fn config() -> FolioConfig {
        FolioConfig::new(SecretString::from("s".to_string()))
    }

    #[test]
    fn locale_defaults_come_from_localization() {
        let config = config().with_localization(Localization::new(["en", "es"], "en"));
        let ctx = LocalOptions::new().build(&config, Arc::new(MemoryStorage::new()));
        assert_eq!(ctx.locale(), Some("en"));
        assert_eq!(ctx.fallback_locale(), Some("en"));

        let ctx = LocalOptions::new()
            .with_locale("es")
            .build(&config, Arc::new(MemoryStorage::new()));
        assert_eq!(ctx.locale(), Some("es"));
        assert_eq!(ctx.fallback_locale(), Some("en"));
    }

    #[test]
    fn no_localization_means_no_locale() {
        let ctx = LocalOptions::new()
            .with_locale("es")
            .build(&config(), Arc::new(MemoryStorage::new()));
        assert_eq!(ctx.locale(), None);
        assert!(ctx.data_cache.is_empty());
        assert!(ctx.deadline.is_none());
    }

    #[test]
    fn request_context_is_seeded() {
        let mut seed = Document::new();
        seed.insert("ip".into(), Value::String("127.0.0.1".into()));
        let ctx = LocalOptions::new()
            .with_context(seed)
            .build(&config(), Arc::new(MemoryStorage::new()));
        assert_eq!(
            ctx.request_context().get("ip"),
            Some(Value::String("127.0.0.1".into()))
        );
    }

    #[test]
    fn strip_reserved_drops_double_underscore_keys() {
        let mut doc = Document::new();
        doc.insert("__v".into(), Value::from(1));
        doc.insert("name".into(), Value::from("x"));
        let doc = strip_reserved(doc);
        assert_eq!(doc.len(), 1);
        assert_eq!(string_field(&doc, "name"), Some("x"));
    }
}
