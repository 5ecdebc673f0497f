//! Transaction lifecycle around an operation.
//!
//! The outermost operation of an invocation owns the transaction and commits
//! it. Nested operations reuse it. Any failure rolls the transaction back,
//! whoever opened it, then applies the deferred writes outside of it.

use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use tokio::time::Instant;

use crate::context::{DeferredWrite, OperationContext};
use crate::error::OperationError;
use crate::storage::Storage;

/// Open a transaction unless `ctx` already carries one. Returns whether the
/// caller owns it.
///
/// # Errors
/// Returns an error if storage cannot begin a transaction.
pub async fn begin(ctx: &mut OperationContext) -> Result<bool, OperationError> {
    if ctx.transaction.is_some() {
        return Ok(false);
    }
    let tx = ctx.storage.begin_transaction().await?;
    tracing::debug!(%tx, "transaction started");
    ctx.transaction = Some(tx);
    Ok(true)
}

/// Commit on success when owned; roll back on failure.
///
/// # Errors
/// Returns the operation error unchanged, or the commit error.
pub async fn finish<T>(
    ctx: &mut OperationContext,
    owns: bool,
    outcome: Result<T, OperationError>,
) -> Result<T, OperationError> {
    match outcome {
        Ok(value) => {
            if owns {
                if let Some(tx) = ctx.transaction.take() {
                    if let Err(err) = ctx.storage.commit_transaction(tx).await {
                        tracing::error!(%tx, "commit failed: {err:#}");
                        ctx.transaction = Some(tx);
                        kill(ctx).await;
                        return Err(err.into());
                    }
                    tracing::debug!(%tx, "transaction committed");
                }
                flush_deferred(ctx).await;
            }
            Ok(value)
        }
        Err(err) => {
            kill(ctx).await;
            Err(err)
        }
    }
}

/// Roll back the context's transaction, clear it, discard staged cookies,
/// then apply deferred writes. Failures here are logged only.
pub async fn kill(ctx: &mut OperationContext) {
    if let Some(sink) = ctx.response.as_mut() {
        sink.clear();
    }
    if let Some(tx) = ctx.transaction.take() {
        match ctx.storage.rollback_transaction(tx).await {
            Ok(()) => tracing::debug!(%tx, "transaction rolled back"),
            Err(err) => tracing::error!(%tx, "rollback failed: {err:#}"),
        }
    }
    flush_deferred(ctx).await;
}

async fn flush_deferred(ctx: &mut OperationContext) {
    apply_deferred(ctx.storage.as_ref(), std::mem::take(&mut ctx.deferred)).await;
}

async fn apply_deferred(storage: &dyn Storage, writes: Vec<DeferredWrite>) {
    for write in writes {
        match storage
            .update_one(&write.collection, &write.id, &write.patch, None)
            .await
        {
            Ok(Some(_)) => {}
            Ok(None) => tracing::warn!(
                collection = %write.collection,
                id = %write.id,
                "deferred write matched no document"
            ),
            Err(err) => tracing::error!(
                collection = %write.collection,
                id = %write.id,
                "deferred write failed: {err:#}"
            ),
        }
    }
}

/// Run `fut`, failing with `Timeout` once `deadline` passes.
///
/// # Errors
/// Returns `Timeout` on expiry, otherwise the future's own result.
pub async fn with_deadline<T, F>(deadline: Option<Instant>, fut: F) -> Result<T, OperationError>
where
    F: Future<Output = Result<T, OperationError>>,
{
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, fut)
            .await
            .unwrap_or(Err(OperationError::Timeout)),
        None => fut.await,
    }
}

/// Borrows the context for the body of an operation. If the operation future
/// is dropped before `disarm`, an owned transaction is detached from the
/// context, staged cookies are discarded, and the rollback plus any deferred
/// writes run on the current Tokio runtime.
#[must_use]
pub struct RollbackOnDrop<'a> {
    ctx: &'a mut OperationContext,
    armed: bool,
}

impl<'a> RollbackOnDrop<'a> {
    pub fn arm(ctx: &'a mut OperationContext, owns: bool) -> Self {
        Self { ctx, armed: owns }
    }

    pub fn disarm(mut self) {
        self.armed = false;
    }
}

impl Deref for RollbackOnDrop<'_> {
    type Target = OperationContext;

    fn deref(&self) -> &OperationContext {
        self.ctx
    }
}

impl DerefMut for RollbackOnDrop<'_> {
    fn deref_mut(&mut self) -> &mut OperationContext {
        self.ctx
    }
}

impl Drop for RollbackOnDrop<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Some(tx) = self.ctx.transaction.take() else {
            return;
        };
        if let Some(sink) = self.ctx.response.as_mut() {
            sink.clear();
        }
        let deferred = std::mem::take(&mut self.ctx.deferred);
        let storage = Arc::clone(&self.ctx.storage);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::warn!(%tx, "operation cancelled, rolling back");
                handle.spawn(async move {
                    if let Err(err) = storage.rollback_transaction(tx).await {
                        tracing::error!(%tx, "rollback after cancellation failed: {err:#}");
                    }
                    apply_deferred(storage.as_ref(), deferred).await;
                });
            }
            Err(_) => tracing::error!(%tx, "operation cancelled outside a runtime"),
        }
    }
}
