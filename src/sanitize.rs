//! Read sanitization (`afterRead`).
//!
//! Runs in two passes over a document and its schema:
//!
//! 1. structural: drop `__` keys and hidden fields, populate relationships up
//!    to the requested depth, run field-level `afterRead` hooks;
//! 2. localization: project localized fields onto the context locale, falling
//!    back to the fallback locale.
//!
//! Both the key stripping and the projection leave an already sanitized
//! document unchanged.

use futures::future::BoxFuture;
use serde_json::Value;

use crate::config::{CollectionConfig, Field, FieldKind, ALL_LOCALES};
use crate::context::OperationContext;
use crate::error::{HookStage, OperationError};
use crate::hooks::{run_chain, OperationKind};
use crate::instance::Folio;
use crate::storage::{Document, Filter};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// How many levels of relationships to populate, at most the instance's
    /// `max_depth`.
    pub depth: u32,
    pub show_hidden_fields: bool,
}

#[derive(Clone, Copy)]
struct Scope<'a> {
    folio: &'a Folio,
    operation: OperationKind,
    collection: &'a str,
    show_hidden: bool,
}

/// Sanitize `doc` read from `collection`.
///
/// # Errors
/// Fails if a field hook fails or a related document cannot be loaded.
pub async fn after_read(
    folio: &Folio,
    ctx: &mut OperationContext,
    collection: &CollectionConfig,
    mut doc: Document,
    operation: OperationKind,
    options: ReadOptions,
) -> Result<Document, OperationError> {
    let scope = Scope {
        folio,
        operation,
        collection: collection.slug(),
        show_hidden: options.show_hidden_fields,
    };
    let depth = options.depth.min(folio.config().max_depth());
    sanitize_fields(scope, ctx, collection.fields(), &mut doc, depth).await?;
    localize_fields(collection.fields(), &mut doc, ctx);
    Ok(doc)
}

fn sanitize_fields<'a>(
    scope: Scope<'a>,
    ctx: &'a mut OperationContext,
    fields: &'a [Field],
    data: &'a mut Document,
    depth: u32,
) -> BoxFuture<'a, Result<(), OperationError>> {
    Box::pin(async move {
        data.retain(|key, _| !key.starts_with("__"));

        for field in fields {
            let name = field.name();
            if field.is_hidden() && !scope.show_hidden {
                data.remove(name);
                continue;
            }

            let present = data.contains_key(name);
            let mut value = data.remove(name).unwrap_or(Value::Null);

            match value {
                Value::Object(ref mut per_locale)
                    if field.is_localized() && is_locale_map(per_locale, &ctx.locales) =>
                {
                    for inner in per_locale.values_mut() {
                        sanitize_value(scope, ctx, field, inner, depth).await?;
                    }
                }
                _ => sanitize_value(scope, ctx, field, &mut value, depth).await?,
            }

            if !field.after_read().is_empty() {
                let hook_ctx = ctx.hook_context(scope.operation, scope.collection, None);
                value =
                    run_chain(HookStage::FieldAfterRead, field.after_read(), value, &hook_ctx)
                        .await?;
            }

            if present || !value.is_null() {
                data.insert(name.to_string(), value);
            }
        }
        Ok(())
    })
}

async fn sanitize_value(
    scope: Scope<'_>,
    ctx: &mut OperationContext,
    field: &Field,
    value: &mut Value,
    depth: u32,
) -> Result<(), OperationError> {
    match (field.kind(), value) {
        (FieldKind::Group(children), Value::Object(obj)) => {
            sanitize_fields(scope, ctx, children, obj, depth).await?;
        }
        (FieldKind::Array(children), Value::Array(items)) => {
            for item in items.iter_mut() {
                if let Value::Object(obj) = item {
                    sanitize_fields(scope, ctx, children, obj, depth).await?;
                }
            }
        }
        (FieldKind::Relationship { collection }, value) if depth > 0 => match value {
            Value::String(id) => {
                if let Some(related) = populate(scope, ctx, collection, id, depth - 1).await? {
                    *value = Value::Object(related);
                }
            }
            Value::Array(items) => {
                for item in items.iter_mut() {
                    let Value::String(id) = item else { continue };
                    if let Some(related) = populate(scope, ctx, collection, id, depth - 1).await? {
                        *item = Value::Object(related);
                    }
                }
            }
            _ => {}
        },
        _ => {}
    }
    Ok(())
}

/// Load `id` from `collection` through the data cache and sanitize it at
/// `depth`. Missing documents leave the id in place.
async fn populate(
    scope: Scope<'_>,
    ctx: &mut OperationContext,
    collection: &str,
    id: &str,
    depth: u32,
) -> Result<Option<Document>, OperationError> {
    let config = scope.folio.collection(collection)?;
    let key = (collection.to_string(), id.to_string());

    let raw = match ctx.data_cache.get(&key) {
        Some(cached) => cached.clone(),
        None => {
            let loaded = ctx
                .storage
                .find_one(collection, &Filter::id(id), ctx.transaction.as_ref())
                .await?;
            ctx.data_cache.insert(key, loaded.clone());
            loaded
        }
    };

    let Some(mut doc) = raw else {
        return Ok(None);
    };
    let related = Scope {
        collection: config.slug(),
        ..scope
    };
    sanitize_fields(related, ctx, config.fields(), &mut doc, depth).await?;
    localize_fields(config.fields(), &mut doc, ctx);
    Ok(Some(doc))
}

fn is_locale_map(obj: &Document, locales: &[String]) -> bool {
    !obj.is_empty() && obj.keys().all(|key| locales.iter().any(|l| l == key))
}

fn localize_fields(fields: &[Field], data: &mut Document, ctx: &OperationContext) {
    let Some(locale) = ctx.locale.as_deref() else {
        return;
    };
    if locale == ALL_LOCALES {
        return;
    }

    for field in fields {
        let Some(value) = data.get_mut(field.name()) else {
            continue;
        };

        if field.is_localized() {
            if let Value::Object(per_locale) = value {
                if is_locale_map(per_locale, &ctx.locales) {
                    let projected = per_locale
                        .get(locale)
                        .filter(|v| !v.is_null())
                        .or_else(|| {
                            ctx.fallback_locale
                                .as_deref()
                                .and_then(|fallback| per_locale.get(fallback))
                        })
                        .cloned()
                        .unwrap_or(Value::Null);
                    *value = projected;
                }
            }
        }

        match (field.kind(), value) {
            (FieldKind::Group(children), Value::Object(obj)) => {
                localize_fields(children, obj, ctx);
            }
            (FieldKind::Array(children), Value::Array(items)) => {
                for item in items {
                    if let Value::Object(obj) = item {
                        localize_fields(children, obj, ctx);
                    }
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AuthPolicy, FolioConfig, Localization};
    use crate::context::LocalOptions;
    use crate::hooks::Hook;
    use crate::storage::{MemoryStorage, Storage, TransactionId};
    use anyhow::Result;
    use async_trait::async_trait;
    use secrecy::SecretString;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => Document::new(),
        }
    }

    #[derive(Default)]
    struct CountingStorage {
        inner: MemoryStorage,
        finds: AtomicUsize,
    }

    #[async_trait]
    impl Storage for CountingStorage {
        async fn begin_transaction(&self) -> Result<TransactionId> {
            self.inner.begin_transaction().await
        }
        async fn commit_transaction(&self, tx: TransactionId) -> Result<()> {
            self.inner.commit_transaction(tx).await
        }
        async fn rollback_transaction(&self, tx: TransactionId) -> Result<()> {
            self.inner.rollback_transaction(tx).await
        }
        async fn find_one(
            &self,
            collection: &str,
            filter: &Filter,
            tx: Option<&TransactionId>,
        ) -> Result<Option<Document>> {
            self.finds.fetch_add(1, Ordering::SeqCst);
            self.inner.find_one(collection, filter, tx).await
        }
        async fn update_one(
            &self,
            collection: &str,
            id: &str,
            patch: &Document,
            tx: Option<&TransactionId>,
        ) -> Result<Option<Document>> {
            self.inner.update_one(collection, id, patch, tx).await
        }
        async fn insert_one(
            &self,
            collection: &str,
            doc: Document,
            tx: Option<&TransactionId>,
        ) -> Result<Document> {
            self.inner.insert_one(collection, doc, tx).await
        }
    }

    fn users() -> CollectionConfig {
        CollectionConfig::new("users")
            .with_field(Field::scalar("name"))
            .with_field(Field::group(
                "profile",
                vec![Field::scalar("bio"), Field::scalar("secret").hidden()],
            ))
            .with_auth(AuthPolicy::new())
    }

    fn folio(storage: Arc<dyn Storage>, extra: Vec<CollectionConfig>) -> Result<Folio> {
        let mut builder = Folio::builder(FolioConfig::new(SecretString::from("s".to_string())))
            .storage(storage)
            .collection(users());
        for config in extra {
            builder = builder.collection(config);
        }
        builder.build()
    }

    #[tokio::test]
    async fn hidden_and_reserved_fields_are_removed() -> Result<()> {
        let folio = folio(Arc::new(MemoryStorage::new()), Vec::new())?;
        let mut ctx = folio.local_context(LocalOptions::new());
        let config = folio.collection("users")?;
        let raw = doc(json!({
            "id": "u1",
            "email": "a@b.co",
            "hash": "$argon2id$x",
            "login_attempts": 2,
            "lock_until": null,
            "__v": 3,
            "profile": {"bio": "hi", "secret": "s", "__internal": true}
        }));

        let out = after_read(
            &folio,
            &mut ctx,
            config,
            raw.clone(),
            OperationKind::FindById,
            ReadOptions::default(),
        )
        .await?;
        assert_eq!(
            out,
            doc(json!({"id": "u1", "email": "a@b.co", "profile": {"bio": "hi"}}))
        );

        let again = after_read(
            &folio,
            &mut ctx,
            config,
            out.clone(),
            OperationKind::FindById,
            ReadOptions::default(),
        )
        .await?;
        assert_eq!(again, out);

        let shown = after_read(
            &folio,
            &mut ctx,
            config,
            raw,
            OperationKind::FindById,
            ReadOptions {
                depth: 0,
                show_hidden_fields: true,
            },
        )
        .await?;
        assert!(shown.contains_key("hash"));
        assert!(!shown.contains_key("__v"));
        Ok(())
    }

    #[tokio::test]
    async fn field_hooks_run_in_order() -> Result<()> {
        let shout = Hook::new("shout", |value: Value, _ctx| async move {
            Ok(value.as_str().map(|s| Value::String(s.to_uppercase())))
        });
        let suffix = Hook::new("suffix", |value: Value, _ctx| async move {
            Ok(value.as_str().map(|s| Value::String(format!("{s}!"))))
        });
        let posts = CollectionConfig::new("posts").with_field(
            Field::scalar("title")
                .with_after_read(shout)
                .with_after_read(suffix),
        );
        let folio = folio(Arc::new(MemoryStorage::new()), vec![posts])?;
        let mut ctx = folio.local_context(LocalOptions::new());
        let out = after_read(
            &folio,
            &mut ctx,
            folio.collection("posts")?,
            doc(json!({"title": "hello"})),
            OperationKind::FindById,
            ReadOptions::default(),
        )
        .await?;
        assert_eq!(out.get("title"), Some(&json!("HELLO!")));
        Ok(())
    }

    #[tokio::test]
    async fn localized_fields_fall_back() -> Result<()> {
        let pages = CollectionConfig::new("pages")
            .with_field(Field::scalar("title").localized())
            .with_field(Field::scalar("slug"));
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let folio = Folio::builder(
            FolioConfig::new(SecretString::from("s".to_string()))
                .with_localization(Localization::new(["en", "es"], "en")),
        )
        .storage(storage)
        .collection(pages)
        .build()?;
        let raw = doc(json!({"title": {"en": "Hello"}, "slug": "hello"}));

        let mut ctx = folio.local_context(LocalOptions::new().with_locale("es"));
        let out = after_read(
            &folio,
            &mut ctx,
            folio.collection("pages")?,
            raw.clone(),
            OperationKind::FindById,
            ReadOptions::default(),
        )
        .await?;
        assert_eq!(out, doc(json!({"title": "Hello", "slug": "hello"})));

        let mut ctx = folio.local_context(LocalOptions::new().with_locale(ALL_LOCALES));
        let out = after_read(
            &folio,
            &mut ctx,
            folio.collection("pages")?,
            raw.clone(),
            OperationKind::FindById,
            ReadOptions::default(),
        )
        .await?;
        assert_eq!(out, raw);
        Ok(())
    }

    #[tokio::test]
    async fn relationships_are_populated_through_the_cache() -> Result<()> {
        let storage = Arc::new(CountingStorage::default());
        storage
            .insert_one(
                "users",
                doc(json!({"id": "u1", "email": "a@b.co", "hash": "h", "name": "Alice"})),
                None,
            )
            .await?;
        let posts = CollectionConfig::new("posts")
            .with_field(Field::relationship("author", "users"))
            .with_field(Field::relationship("editors", "users"));
        let folio = folio(storage.clone(), vec![posts])?;
        let mut ctx = folio.local_context(LocalOptions::new());
        let raw = doc(json!({"author": "u1", "editors": ["u1", "missing"]}));

        let out = after_read(
            &folio,
            &mut ctx,
            folio.collection("posts")?,
            raw.clone(),
            OperationKind::FindById,
            ReadOptions {
                depth: 1,
                show_hidden_fields: false,
            },
        )
        .await?;
        let alice = json!({"id": "u1", "email": "a@b.co", "name": "Alice"});
        assert_eq!(out.get("author"), Some(&alice));
        assert_eq!(out.get("editors"), Some(&json!([alice, "missing"])));
        assert_eq!(storage.finds.load(Ordering::SeqCst), 2);

        let shallow = after_read(
            &folio,
            &mut ctx,
            folio.collection("posts")?,
            raw.clone(),
            OperationKind::FindById,
            ReadOptions::default(),
        )
        .await?;
        assert_eq!(shallow, raw);
        Ok(())
    }
}
