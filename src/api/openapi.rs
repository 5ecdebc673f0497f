use super::handlers::{find, health, login, unlock, ErrorBody, ErrorItem};
use utoipa::openapi::{InfoBuilder, License};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        login::login,
        unlock::unlock,
        find::find_by_id
    ),
    components(schemas(
        health::Health,
        login::LoginRequest,
        login::LoginResponse,
        unlock::UnlockRequest,
        unlock::UnlockResponse,
        ErrorBody,
        ErrorItem
    )),
    tags(
        (name = "health", description = "Service and storage status"),
        (name = "auth", description = "Login and lockout management for auth collections"),
        (name = "collections", description = "Sanitized document reads")
    )
)]
struct ApiDoc;

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();
    // Use Cargo.toml metadata instead of the derive defaults.
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(optional_str(env!("CARGO_PKG_DESCRIPTION")))
        .build();
    if let Some(identifier) = optional_str(env!("CARGO_PKG_LICENSE")) {
        let mut license = License::new(identifier);
        license.identifier = Some(identifier.to_string());
        info.license = Some(license);
    }
    doc.info = info;
    doc
}

fn optional_str(value: &'static str) -> Option<&'static str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}
