use secrecy::ExposeSecret;
use serde_json::Value;
use tracing::{debug, instrument};

use super::{wrong_shape, LoginArgs, LoginResult, OperationArgs, OperationResult, UnlockArgs};
use crate::auth::cookie::Cookie;
use crate::auth::lockout::{self, LockoutUpdate};
use crate::auth::{credentials, token, validate_email, IdentityRecord, EMAIL, HASH};
use crate::config::{AuthPolicy, CollectionConfig};
use crate::context::{strip_reserved, DeferredWrite, OperationContext};
use crate::error::{HookStage, OperationError};
use crate::hooks::{run_chain, OperationKind};
use crate::instance::Folio;
use crate::sanitize::{self, ReadOptions};
use crate::storage::{merge, Document, Filter, ID_FIELD};
use crate::transaction::{self, with_deadline, RollbackOnDrop};

impl Folio {
    /// Authenticate against an auth collection and issue a session token.
    ///
    /// # Errors
    ///
    /// `Authentication` for unknown, unverified or wrong credentials, `Locked`
    /// while the identity is locked out, `Validation` for malformed input, and
    /// any hook or storage error unchanged. The transaction is rolled back on
    /// every error; a failed-attempt counter update is still persisted.
    #[instrument(skip(self, ctx, args), fields(collection = %collection))]
    pub async fn login(
        &self,
        ctx: &mut OperationContext,
        collection: &str,
        args: LoginArgs,
    ) -> Result<LoginResult, OperationError> {
        let (config, policy) = self.auth_collection(collection)?;

        let hook_ctx = ctx.hook_context(OperationKind::Login, collection, None);
        let args = match run_chain(
            HookStage::BeforeOperation,
            &config.hooks().before_operation,
            OperationArgs::Login(args),
            &hook_ctx,
        )
        .await?
        {
            OperationArgs::Login(args) => args,
            _ => return Err(wrong_shape("beforeOperation")),
        };

        let owns = transaction::begin(ctx).await?;
        let mut guard = RollbackOnDrop::arm(ctx, owns);
        let deadline = guard.deadline;
        let outcome =
            with_deadline(deadline, self.execute_login(&mut guard, config, policy, args)).await;
        guard.disarm();
        transaction::finish(ctx, owns, outcome).await
    }

    async fn execute_login(
        &self,
        ctx: &mut OperationContext,
        config: &CollectionConfig,
        policy: &AuthPolicy,
        args: LoginArgs,
    ) -> Result<LoginResult, OperationError> {
        let slug = config.slug();
        let email = validate_email(&args.email)?;
        if args.password.expose_secret().is_empty() {
            return Err(OperationError::validation("password is required"));
        }

        let Some(raw) = ctx
            .storage
            .find_one(
                slug,
                &Filter::equals(EMAIL, email.as_str()),
                ctx.transaction.as_ref(),
            )
            .await?
        else {
            debug!("no identity for submitted email");
            // same argon2 work as a wrong password
            credentials::verify_blocking(self.decoy_hash().await?, args.password.clone()).await;
            return Err(OperationError::Authentication);
        };
        let record = IdentityRecord::from_document(&raw)?;
        if policy.verify() && record.verified == Some(false) {
            debug!(id = %record.id, "identity not verified");
            return Err(OperationError::Authentication);
        }

        let now = self.clock().now();
        if lockout::is_locked(record.lock_until, now) {
            debug!(id = %record.id, "identity locked");
            return Err(OperationError::Locked);
        }

        let lockout = policy.lockout();
        let verified = match record.hash.clone() {
            Some(hash) => credentials::verify_blocking(hash, args.password.clone()).await,
            None => {
                credentials::verify_blocking(self.decoy_hash().await?, args.password.clone())
                    .await;
                false
            }
        };
        if !verified {
            if lockout.enabled() {
                let update = lockout.register_failure(record.login_attempts, record.lock_until, now);
                debug!(
                    id = %record.id,
                    attempts = update.login_attempts,
                    locked = update.lock_until.is_some(),
                    "failed login recorded"
                );
                ctx.defer(DeferredWrite {
                    collection: slug.to_string(),
                    id: record.id.clone(),
                    patch: update.to_patch(),
                });
            }
            return Err(OperationError::Authentication);
        }

        let mut user = strip_reserved(raw);
        if lockout.enabled() {
            let args = UnlockArgs {
                email,
                override_access: true,
            };
            self.unlock(ctx, slug, args).await?;
            merge(&mut user, &LockoutUpdate::reset().to_patch());
        }

        let hook_ctx = ctx.hook_context(OperationKind::Login, slug, None);
        let user = run_chain(
            HookStage::BeforeLogin,
            &config.hooks().before_login,
            user,
            &hook_ctx,
        )
        .await?;

        let issued = token::issue(
            &claims(config, &user),
            self.config().secret(),
            policy.token_expiration(),
            now,
        )?;
        if let Some(sink) = ctx.response.as_mut() {
            sink.set_cookie(Cookie::session(
                &self.config().cookie_name(),
                &issued.token,
                issued.expires_at,
                policy.cookies(),
            ));
        }
        ctx.set_user(Some(user.clone()));

        let hook_ctx = ctx.hook_context(OperationKind::Login, slug, Some(&issued.token));
        let user = run_chain(
            HookStage::AfterLogin,
            &config.hooks().after_login,
            user,
            &hook_ctx,
        )
        .await?;

        let options = ReadOptions {
            depth: self.config().effective_depth(args.depth, 0),
            show_hidden_fields: args.show_hidden_fields,
        };
        let user =
            sanitize::after_read(self, ctx, config, user, OperationKind::Login, options).await?;
        let hook_ctx = ctx.hook_context(OperationKind::Login, slug, Some(&issued.token));
        let user = run_chain(
            HookStage::AfterRead,
            &config.hooks().after_read,
            user,
            &hook_ctx,
        )
        .await?;

        let result = LoginResult {
            token: Some(issued.token.clone()),
            exp: issued.expires_at.timestamp(),
            user,
        };
        let mut result = match run_chain(
            HookStage::AfterOperation,
            &config.hooks().after_operation,
            OperationResult::Login(result),
            &hook_ctx,
        )
        .await?
        {
            OperationResult::Login(result) => result,
            _ => return Err(wrong_shape("afterOperation")),
        };

        if policy.remove_token_from_responses() {
            result.token = None;
        }
        Ok(result)
    }
}

/// Token payload: collection, id, email and every field flagged for the
/// token. The credential hash never leaves the store.
fn claims(config: &CollectionConfig, user: &Document) -> Document {
    let mut claims = Document::new();
    for field in config.fields() {
        if field.is_saved_to_jwt() && field.name() != HASH {
            if let Some(value) = user.get(field.name()) {
                claims.insert(field.name().to_string(), value.clone());
            }
        }
    }
    claims.insert(
        "collection".to_string(),
        Value::String(config.slug().to_string()),
    );
    for key in [ID_FIELD, EMAIL] {
        if let Some(value) = user.get(key) {
            claims.insert(key.to_string(), value.clone());
        }
    }
    claims
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AuthPolicy, Field};
    use serde_json::json;

    #[test]
    fn claims_include_flagged_fields_only() {
        let config = CollectionConfig::new("users")
            .with_field(Field::scalar("role").save_to_jwt())
            .with_field(Field::scalar("name"))
            .with_field(Field::scalar(HASH).save_to_jwt())
            .with_auth(AuthPolicy::new());
        let Value::Object(user) = json!({
            "id": "u1",
            "email": "a@b.co",
            "role": "editor",
            "name": "Alice",
            "hash": "$argon2id$x"
        }) else {
            return;
        };

        let claims = claims(&config, &user);
        let Value::Object(expected) = json!({
            "collection": "users",
            "id": "u1",
            "email": "a@b.co",
            "role": "editor"
        }) else {
            return;
        };
        assert_eq!(claims, expected);
    }
}
