use crate::{
    cli::{actions::open_storage, commands::auth},
    config::{CollectionConfig, FolioConfig},
    instance::Folio,
    storage::Document,
};
use anyhow::Result;
use secrecy::SecretString;
use tracing::info;

#[derive(Debug)]
pub struct Args {
    pub dsn: SecretString,
    pub email: String,
    pub password: SecretString,
    pub auth: auth::Options,
}

/// Register an identity and print its id.
/// # Errors
/// Returns an error if storage cannot be opened or registration is rejected.
pub async fn execute(args: Args) -> Result<()> {
    let storage = open_storage(Some(&args.dsn)).await?;

    // registration never signs tokens
    let config = FolioConfig::new(SecretString::from(String::new()));
    let slug = args.auth.collection.clone();
    let folio = Folio::builder(config)
        .collection(CollectionConfig::new(args.auth.collection).with_auth(args.auth.policy))
        .storage(storage)
        .build()?;

    let created = folio
        .register(&slug, &args.email, &args.password, Document::new())
        .await?;
    let id = created
        .get("id")
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default();
    info!(id, collection = %slug, "identity created");
    println!("{id}");

    Ok(())
}
