use axum::{
    extract::{Extension, Path, Query},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;
use tracing::instrument;

use super::{error_response, local_options, OperationQuery};
use crate::{error::OperationError, instance::Folio, operations::FindByIdArgs};

#[utoipa::path(
    get,
    path= "/api/{collection}/{id}",
    params(
        ("collection" = String, Path, description = "Collection slug"),
        ("id" = String, Path, description = "Document id"),
        OperationQuery
    ),
    responses (
        (status = 200, description = "Sanitized document", body = Object),
        (status = 403, description = "Caller may not read this collection", body = super::ErrorBody),
        (status = 404, description = "Unknown collection or document", body = super::ErrorBody),
    ),
    tag= "collections"
)]
#[instrument(skip(folio, query, headers))]
pub async fn find_by_id(
    folio: Extension<Arc<Folio>>,
    Path((collection, id)): Path<(String, String)>,
    Query(query): Query<OperationQuery>,
    headers: HeaderMap,
) -> Response {
    let mut ctx = folio.local_context(local_options(&folio, &headers, &query));
    let args = FindByIdArgs {
        id: id.clone(),
        depth: query.depth.unwrap_or(0),
        ..FindByIdArgs::default()
    };

    match folio.find_by_id(&mut ctx, &collection, args).await {
        Ok(Some(doc)) => (StatusCode::OK, Json(doc)).into_response(),
        // an afterOperation hook may drop the document
        Ok(None) => error_response(
            &OperationError::NotFound { collection, id },
            ctx.translator(),
        ),
        Err(err) => error_response(&err, ctx.translator()),
    }
}
