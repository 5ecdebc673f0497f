use anyhow::Context;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{info, instrument};

use crate::auth::{validate_email, EMAIL, HASH, LOCK_UNTIL, LOGIN_ATTEMPTS, VERIFIED};
use crate::context::strip_reserved;
use crate::error::OperationError;
use crate::instance::Folio;
use crate::storage::{Document, Filter, UniqueViolation};

impl Folio {
    /// Create an identity in an auth collection. Runs no hooks.
    ///
    /// The stored document starts unlocked and, when the collection requires
    /// verification, unverified. The returned document omits the hash.
    ///
    /// # Errors
    ///
    /// `Validation` for a malformed email, an empty password or an email that
    /// is already registered; storage errors otherwise.
    #[instrument(skip(self, password, extra), fields(collection = %collection))]
    pub async fn register(
        &self,
        collection: &str,
        email: &str,
        password: &SecretString,
        extra: Document,
    ) -> Result<Document, OperationError> {
        let (_, policy) = self.auth_collection(collection)?;
        let email = validate_email(email)?;
        if password.expose_secret().is_empty() {
            return Err(OperationError::validation("password is required"));
        }

        let existing = self
            .storage()
            .find_one(collection, &Filter::equals(EMAIL, email.as_str()), None)
            .await?;
        if existing.is_some() {
            return Err(OperationError::validation("email is already registered"));
        }

        let hasher = self.hasher().clone();
        let secret = password.clone();
        let hash = tokio::task::spawn_blocking(move || hasher.hash(&secret))
            .await
            .context("credential hashing task failed")??;

        let mut doc = strip_reserved(extra);
        doc.insert(EMAIL.to_string(), Value::String(email));
        doc.insert(HASH.to_string(), Value::String(hash));
        doc.insert(LOGIN_ATTEMPTS.to_string(), Value::from(0));
        doc.insert(LOCK_UNTIL.to_string(), Value::Null);
        doc.insert(VERIFIED.to_string(), Value::Bool(!policy.verify()));

        // a concurrent registration can win between the lookup and the insert
        let mut created = match self.storage().insert_one(collection, doc, None).await {
            Ok(created) => created,
            Err(err) if err.is::<UniqueViolation>() => {
                return Err(OperationError::validation("email is already registered"));
            }
            Err(err) => return Err(err.into()),
        };
        created.remove(HASH);
        info!(id = ?created.get("id"), "identity registered");
        Ok(created)
    }
}
