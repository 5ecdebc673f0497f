use tracing::{debug, instrument};

use super::{wrong_shape, OperationArgs, OperationResult, UnlockArgs};
use crate::auth::lockout::LockoutUpdate;
use crate::auth::{validate_email, IdentityRecord, EMAIL};
use crate::config::CollectionConfig;
use crate::context::OperationContext;
use crate::error::{HookStage, OperationError};
use crate::hooks::{run_chain, OperationKind};
use crate::instance::Folio;
use crate::storage::Filter;
use crate::transaction::{self, with_deadline, RollbackOnDrop};

impl Folio {
    /// Clear the failed-attempt counter and any lock of the identity with
    /// `email`. Joins the transaction already on `ctx`, if any.
    ///
    /// Returns `false` when no identity has this email, so callers answer
    /// known and unknown emails alike.
    ///
    /// # Errors
    ///
    /// `Forbidden` when the collection's unlock access rejects the acting
    /// user (unless `override_access`), `Validation` for a malformed email,
    /// and hook or storage errors unchanged.
    #[instrument(skip(self, ctx, args), fields(collection = %collection))]
    pub async fn unlock(
        &self,
        ctx: &mut OperationContext,
        collection: &str,
        args: UnlockArgs,
    ) -> Result<bool, OperationError> {
        let (config, _) = self.auth_collection(collection)?;

        let hook_ctx = ctx.hook_context(OperationKind::Unlock, collection, None);
        let args = match run_chain(
            HookStage::BeforeOperation,
            &config.hooks().before_operation,
            OperationArgs::Unlock(args),
            &hook_ctx,
        )
        .await?
        {
            OperationArgs::Unlock(args) => args,
            _ => return Err(wrong_shape("beforeOperation")),
        };

        let owns = transaction::begin(ctx).await?;
        let mut guard = RollbackOnDrop::arm(ctx, owns);
        let deadline = guard.deadline;
        let outcome =
            with_deadline(deadline, self.execute_unlock(&mut guard, config, args)).await;
        guard.disarm();
        transaction::finish(ctx, owns, outcome).await
    }

    async fn execute_unlock(
        &self,
        ctx: &mut OperationContext,
        config: &CollectionConfig,
        args: UnlockArgs,
    ) -> Result<bool, OperationError> {
        let slug = config.slug();
        if !args.override_access && !config.access().unlock.permits(ctx.user()) {
            debug!("unlock rejected by access");
            return Err(OperationError::Forbidden);
        }
        let email = validate_email(&args.email)?;

        let unlocked = match ctx
            .storage
            .find_one(
                slug,
                &Filter::equals(EMAIL, email.as_str()),
                ctx.transaction.as_ref(),
            )
            .await?
        {
            Some(raw) => {
                let record = IdentityRecord::from_document(&raw)?;
                let updated = ctx
                    .storage
                    .update_one(
                        slug,
                        &record.id,
                        &LockoutUpdate::reset().to_patch(),
                        ctx.transaction.as_ref(),
                    )
                    .await?;
                if updated.is_some() {
                    debug!(id = %record.id, "lockout counters cleared");
                }
                updated.is_some()
            }
            None => {
                debug!("no identity for submitted email");
                false
            }
        };

        let hook_ctx = ctx.hook_context(OperationKind::Unlock, slug, None);
        match run_chain(
            HookStage::AfterOperation,
            &config.hooks().after_operation,
            OperationResult::Unlock(unlocked),
            &hook_ctx,
        )
        .await?
        {
            OperationResult::Unlock(unlocked) => Ok(unlocked),
            _ => Err(wrong_shape("afterOperation")),
        }
    }
}
