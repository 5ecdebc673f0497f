//! Ordered hook chains.
//!
//! A chain is folded left to right: each hook receives the value produced by
//! the previous one and may return a replacement (`Ok(Some(_))`) or keep it
//! (`Ok(None)`). Hooks run one at a time, in configuration order.

use futures::future::BoxFuture;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::Instrument;

use crate::error::{HookStage, OperationError};
use crate::storage::{Document, Storage, TransactionId};

/// Operation a hook is running for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationKind {
    Login,
    Unlock,
    FindById,
}

impl OperationKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Unlock => "unlock",
            Self::FindById => "findByID",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Free-form bag shared by every hook of one invocation.
#[derive(Clone, Debug, Default)]
pub struct RequestContext(Arc<Mutex<Document>>);

impl RequestContext {
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn insert(&self, key: impl Into<String>, value: Value) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value);
    }
}

impl From<Document> for RequestContext {
    fn from(doc: Document) -> Self {
        Self(Arc::new(Mutex::new(doc)))
    }
}

/// What a hook can see of the running operation.
#[derive(Clone)]
pub struct HookContext {
    pub operation: OperationKind,
    pub collection: String,
    pub storage: Arc<dyn Storage>,
    pub transaction: Option<TransactionId>,
    pub user: Option<Document>,
    pub locale: Option<String>,
    /// Session token, once issued.
    pub token: Option<String>,
    pub context: RequestContext,
}

impl fmt::Debug for HookContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookContext")
            .field("operation", &self.operation)
            .field("collection", &self.collection)
            .field("transaction", &self.transaction)
            .field("locale", &self.locale)
            .finish_non_exhaustive()
    }
}

type HookFn<T> =
    dyn Fn(T, HookContext) -> BoxFuture<'static, anyhow::Result<Option<T>>> + Send + Sync;

pub struct Hook<T> {
    name: String,
    run: Arc<HookFn<T>>,
}

impl<T> Clone for Hook<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            run: Arc::clone(&self.run),
        }
    }
}

impl<T> fmt::Debug for Hook<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook").field("name", &self.name).finish()
    }
}

impl<T: Send + 'static> Hook<T> {
    pub fn new<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(T, HookContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Option<T>>> + Send + 'static,
    {
        Self {
            name: name.into(),
            run: Arc::new(
                move |value, ctx| -> BoxFuture<'static, anyhow::Result<Option<T>>> {
                    Box::pin(f(value, ctx))
                },
            ),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

fn into_operation_error(stage: HookStage, hook: &str, err: anyhow::Error) -> OperationError {
    match err.downcast::<OperationError>() {
        Ok(inner) => inner,
        Err(source) => OperationError::Hook {
            stage,
            hook: hook.to_string(),
            source,
        },
    }
}

/// Fold `initial` through `hooks`.
///
/// # Errors
///
/// Stops at the first failing hook. An [`OperationError`] raised inside the
/// hook keeps its kind; anything else is wrapped in [`OperationError::Hook`].
pub async fn run_chain<T>(
    stage: HookStage,
    hooks: &[Hook<T>],
    initial: T,
    ctx: &HookContext,
) -> Result<T, OperationError>
where
    T: Clone + Send + 'static,
{
    let mut value = initial;
    for hook in hooks {
        let span = tracing::debug_span!("hook", stage = %stage, hook = %hook.name);
        match (hook.run)(value.clone(), ctx.clone()).instrument(span).await {
            Ok(Some(next)) => value = next,
            Ok(None) => {}
            Err(err) => return Err(into_operation_error(stage, &hook.name, err)),
        }
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use anyhow::{anyhow, Result};

    fn ctx() -> HookContext {
        HookContext {
            operation: OperationKind::Login,
            collection: "users".to_string(),
            storage: Arc::new(MemoryStorage::new()),
            transaction: None,
            user: None,
            locale: None,
            token: None,
            context: RequestContext::default(),
        }
    }

    fn append(name: &'static str) -> Hook<Vec<&'static str>> {
        Hook::new(name, move |mut seen: Vec<&'static str>, _ctx| async move {
            seen.push(name);
            Ok(Some(seen))
        })
    }

    #[tokio::test]
    async fn runs_in_configuration_order() -> Result<()> {
        let hooks = vec![append("h1"), append("h2"), append("h3")];
        let out = run_chain(HookStage::BeforeLogin, &hooks, Vec::new(), &ctx()).await?;
        assert_eq!(out, vec!["h1", "h2", "h3"]);
        Ok(())
    }

    #[tokio::test]
    async fn empty_chain_is_identity() -> Result<()> {
        let out = run_chain(HookStage::AfterRead, &[], 7_u32, &ctx()).await?;
        assert_eq!(out, 7);
        Ok(())
    }

    #[tokio::test]
    async fn none_keeps_previous_value() -> Result<()> {
        let keep = Hook::new("keep", |_value: u32, _ctx| async { Ok(None) });
        let double = Hook::new("double", |value: u32, _ctx| async move { Ok(Some(value * 2)) });
        let out = run_chain(HookStage::AfterRead, &[double.clone(), keep, double], 3, &ctx()).await?;
        assert_eq!(out, 12);
        Ok(())
    }

    #[tokio::test]
    async fn failure_stops_the_chain() {
        let seen = RequestContext::default();
        let fail = Hook::new("fail", |_value: u32, _ctx| async { Err(anyhow!("nope")) });
        let mark = Hook::new("mark", |value: u32, ctx: HookContext| async move {
            ctx.context.insert("ran", Value::Bool(true));
            Ok(Some(value))
        });
        let mut context = ctx();
        context.context = seen.clone();

        let err = run_chain(HookStage::AfterLogin, &[fail, mark], 1, &context).await;
        match err {
            Err(OperationError::Hook { stage, hook, source }) => {
                assert_eq!(stage, HookStage::AfterLogin);
                assert_eq!(hook, "fail");
                assert_eq!(source.to_string(), "nope");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(seen.get("ran").is_none());
    }

    #[tokio::test]
    async fn operation_errors_pass_through() {
        let locked = Hook::new("nested", |_value: u32, _ctx| async {
            Err(anyhow::Error::new(OperationError::Locked))
        });
        let result = run_chain(HookStage::BeforeOperation, &[locked], 1, &ctx()).await;
        assert!(matches!(result, Err(OperationError::Locked)));
    }
}
