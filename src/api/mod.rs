//! HTTP transport.
//!
//! Routes map one-to-one onto collection operations. Each request builds a
//! fresh operation context; error kinds are rendered by
//! [`handlers::error_response`].

use anyhow::Result;
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request},
    response::{IntoResponse, Json},
    routing::{get, post},
    Extension, Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{error, info, info_span, Span};
use ulid::Ulid;

use crate::instance::Folio;

pub mod handlers;
mod openapi;

pub use openapi::openapi;

/// Build the application router around a shared instance.
pub fn router(folio: Arc<Folio>) -> Router {
    Router::new()
        .route(
            "/health",
            get(handlers::health::health).options(handlers::health::health),
        )
        .route("/api-docs/openapi.json", get(openapi_json))
        .route("/api/:collection/login", post(handlers::login::login))
        .route("/api/:collection/unlock", post(handlers::unlock::unlock))
        .route("/api/:collection/:id", get(handlers::find::find_by_id))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(Extension(folio)),
        )
}

/// Start the server
/// # Errors
/// Return error if failed to bind or serve
pub async fn new(port: u16, folio: Arc<Folio>) -> Result<()> {
    let app = router(folio);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {err}");
            }
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

async fn openapi_json() -> impl IntoResponse {
    Json(openapi())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
