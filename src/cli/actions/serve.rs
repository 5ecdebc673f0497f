use crate::{
    api,
    cli::{actions::open_storage, commands::auth},
    config::{CollectionConfig, FolioConfig},
    instance::Folio,
};
use anyhow::Result;
use secrecy::SecretString;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: Option<SecretString>,
    pub secret: SecretString,
    pub cookie_prefix: String,
    pub language: String,
    pub max_depth: u32,
    pub auth: auth::Options,
}

/// Execute the serve action.
/// # Errors
/// Returns an error if storage cannot be opened or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let storage = open_storage(args.dsn.as_ref()).await?;

    let config = FolioConfig::new(args.secret)
        .with_cookie_prefix(args.cookie_prefix)
        .with_language(args.language)
        .with_max_depth(args.max_depth);
    let collection = CollectionConfig::new(args.auth.collection).with_auth(args.auth.policy);

    let folio = Folio::builder(config)
        .collection(collection)
        .storage(storage)
        .build()?;
    debug!("Instance: {:?}", folio);

    api::new(args.port, Arc::new(folio)).await
}
