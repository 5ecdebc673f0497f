use tracing::instrument;

use super::{wrong_shape, FindByIdArgs, OperationArgs, OperationResult};
use crate::config::CollectionConfig;
use crate::context::OperationContext;
use crate::error::{HookStage, OperationError};
use crate::hooks::{run_chain, OperationKind};
use crate::instance::Folio;
use crate::sanitize::{self, ReadOptions};
use crate::storage::{Document, Filter};
use crate::transaction::{self, with_deadline, RollbackOnDrop};

impl Folio {
    /// Read one document by id, sanitized for output.
    ///
    /// # Errors
    ///
    /// `Forbidden` when the collection's read access rejects the acting user
    /// (unless `override_access`), `NotFound` when the document does not
    /// exist (unless `disable_errors`), and hook or storage errors unchanged.
    #[instrument(skip(self, ctx, args), fields(collection = %collection, id = %args.id))]
    pub async fn find_by_id(
        &self,
        ctx: &mut OperationContext,
        collection: &str,
        args: FindByIdArgs,
    ) -> Result<Option<Document>, OperationError> {
        let config = self.collection(collection)?;

        let hook_ctx = ctx.hook_context(OperationKind::FindById, collection, None);
        let args = match run_chain(
            HookStage::BeforeOperation,
            &config.hooks().before_operation,
            OperationArgs::FindById(args),
            &hook_ctx,
        )
        .await?
        {
            OperationArgs::FindById(args) => args,
            _ => return Err(wrong_shape("beforeOperation")),
        };

        let owns = transaction::begin(ctx).await?;
        let mut guard = RollbackOnDrop::arm(ctx, owns);
        let deadline = guard.deadline;
        let outcome =
            with_deadline(deadline, self.execute_find_by_id(&mut guard, config, args)).await;
        guard.disarm();
        transaction::finish(ctx, owns, outcome).await
    }

    async fn execute_find_by_id(
        &self,
        ctx: &mut OperationContext,
        config: &CollectionConfig,
        args: FindByIdArgs,
    ) -> Result<Option<Document>, OperationError> {
        let slug = config.slug();
        if !args.override_access && !config.access().read.permits(ctx.user()) {
            return Err(OperationError::Forbidden);
        }
        if args.id.trim().is_empty() {
            return Err(OperationError::validation("id is required"));
        }

        let found = ctx
            .storage
            .find_one(slug, &Filter::id(args.id.as_str()), ctx.transaction.as_ref())
            .await?;

        let doc = match found {
            Some(raw) => {
                let options = ReadOptions {
                    depth: self
                        .config()
                        .effective_depth(args.depth, args.current_depth),
                    show_hidden_fields: args.show_hidden_fields,
                };
                let doc =
                    sanitize::after_read(self, ctx, config, raw, OperationKind::FindById, options)
                        .await?;
                let hook_ctx = ctx.hook_context(OperationKind::FindById, slug, None);
                Some(
                    run_chain(
                        HookStage::AfterRead,
                        &config.hooks().after_read,
                        doc,
                        &hook_ctx,
                    )
                    .await?,
                )
            }
            None if args.disable_errors => None,
            None => {
                return Err(OperationError::NotFound {
                    collection: slug.to_string(),
                    id: args.id,
                })
            }
        };

        let hook_ctx = ctx.hook_context(OperationKind::FindById, slug, None);
        match run_chain(
            HookStage::AfterOperation,
            &config.hooks().after_operation,
            OperationResult::FindById(doc),
            &hook_ctx,
        )
        .await?
        {
            OperationResult::FindById(doc) => Ok(doc),
            _ => Err(wrong_shape("afterOperation")),
        }
    }
}
