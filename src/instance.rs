//! The configured instance every operation runs against.

use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::auth::credentials::CredentialHasher;
use crate::clock::{Clock, SystemClock};
use crate::config::{AuthPolicy, CollectionConfig, FolioConfig};
use crate::context::{LocalOptions, OperationContext};
use crate::error::OperationError;
use crate::storage::{MemoryStorage, Storage};

pub struct Folio {
    config: FolioConfig,
    collections: HashMap<String, CollectionConfig>,
    storage: Arc<dyn Storage>,
    clock: Arc<dyn Clock>,
    hasher: CredentialHasher,
    decoy_hash: OnceCell<String>,
}

impl std::fmt::Debug for Folio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut slugs: Vec<&String> = self.collections.keys().collect();
        slugs.sort();
        f.debug_struct("Folio")
            .field("collections", &slugs)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl Folio {
    #[must_use]
    pub fn builder(config: FolioConfig) -> FolioBuilder {
        FolioBuilder {
            config,
            collections: Vec::new(),
            storage: None,
            clock: None,
            hasher: None,
        }
    }

    #[must_use]
    pub fn config(&self) -> &FolioConfig {
        &self.config
    }

    #[must_use]
    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    #[must_use]
    pub fn hasher(&self) -> &CredentialHasher {
        &self.hasher
    }

    /// Verified against when login finds no usable credential. Hashed on
    /// first use.
    pub(crate) async fn decoy_hash(&self) -> Result<String> {
        let hash = self
            .decoy_hash
            .get_or_try_init(|| async {
                let hasher = self.hasher.clone();
                tokio::task::spawn_blocking(move || hasher.decoy())
                    .await
                    .context("decoy hashing task failed")?
            })
            .await?;
        Ok(hash.clone())
    }

    /// # Errors
    /// Returns `UnknownCollection` if no collection has this slug.
    pub fn collection(&self, slug: &str) -> Result<&CollectionConfig, OperationError> {
        self.collections
            .get(slug)
            .ok_or_else(|| OperationError::UnknownCollection(slug.to_string()))
    }

    /// # Errors
    /// Returns `UnknownCollection` or `NotAuthCollection`.
    pub fn auth_collection(
        &self,
        slug: &str,
    ) -> Result<(&CollectionConfig, &AuthPolicy), OperationError> {
        let config = self.collection(slug)?;
        let policy = config
            .auth()
            .ok_or_else(|| OperationError::NotAuthCollection(slug.to_string()))?;
        Ok((config, policy))
    }

    /// Context for calling operations in-process, without a transport.
    #[must_use]
    pub fn local_context(&self, options: LocalOptions) -> OperationContext {
        options.build(&self.config, Arc::clone(&self.storage))
    }
}

pub struct FolioBuilder {
    config: FolioConfig,
    collections: Vec<CollectionConfig>,
    storage: Option<Arc<dyn Storage>>,
    clock: Option<Arc<dyn Clock>>,
    hasher: Option<CredentialHasher>,
}

impl FolioBuilder {
    #[must_use]
    pub fn collection(mut self, config: CollectionConfig) -> Self {
        self.collections.push(config);
        self
    }

    #[must_use]
    pub fn storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    #[must_use]
    pub fn hasher(mut self, hasher: CredentialHasher) -> Self {
        self.hasher = Some(hasher);
        self
    }

    /// Defaults to in-memory storage, the system clock and default Argon2
    /// parameters.
    ///
    /// # Errors
    /// Returns an error on duplicate collection slugs.
    pub fn build(self) -> Result<Folio> {
        let mut collections = HashMap::with_capacity(self.collections.len());
        for config in self.collections {
            let slug = config.slug().to_string();
            if collections.insert(slug.clone(), config).is_some() {
                bail!("duplicate collection slug: {slug}");
            }
        }

        Ok(Folio {
            config: self.config,
            collections,
            storage: self
                .storage
                .unwrap_or_else(|| Arc::new(MemoryStorage::new())),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            hasher: self.hasher.unwrap_or_default(),
            decoy_hash: OnceCell::new(),
        })
    }
}
