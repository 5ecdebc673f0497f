pub mod create_user;
pub mod serve;

// Internal "interpreter" for `Action`.
mod run;

use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tracing::info;

use crate::storage::{MemoryStorage, PgStorage, Storage};

#[derive(Debug)]
pub enum Action {
    Serve(serve::Args),
    CreateUser(create_user::Args),
}

impl Action {
    /// Execute the action.
    /// # Errors
    /// Returns an error if the action fails.
    pub async fn execute(self) -> Result<()> {
        run::execute(self).await
    }
}

/// Postgres storage with the schema applied, or an in-memory store.
pub(crate) async fn open_storage(dsn: Option<&SecretString>) -> Result<Arc<dyn Storage>> {
    match dsn {
        Some(dsn) => {
            let storage = PgStorage::connect(dsn.expose_secret())
                .await
                .context("Failed to connect to database")?;
            storage.migrate().await?;
            info!("Using postgres storage");
            Ok(Arc::new(storage))
        }
        None => {
            info!("Using in-memory storage");
            Ok(Arc::new(MemoryStorage::new()))
        }
    }
}
