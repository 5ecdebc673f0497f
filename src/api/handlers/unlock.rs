use axum::{
    extract::{Extension, Path, Query},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;

use super::{error_response, local_options, OperationQuery};
use crate::{error::OperationError, instance::Folio, operations::UnlockArgs};

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct UnlockRequest {
    email: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct UnlockResponse {
    message: String,
}

#[utoipa::path(
    post,
    path= "/api/{collection}/unlock",
    params(
        ("collection" = String, Path, description = "Auth collection slug"),
        OperationQuery
    ),
    request_body = UnlockRequest,
    responses (
        (status = 200, description = "Failed-attempt counter and lock cleared, if the identity exists", body = UnlockResponse),
        (status = 400, description = "Malformed email", body = super::ErrorBody),
        (status = 403, description = "Caller may not unlock identities", body = super::ErrorBody),
    ),
    tag= "auth"
)]
#[instrument(skip(folio, query, headers, payload))]
pub async fn unlock(
    folio: Extension<Arc<Folio>>,
    Path(collection): Path<String>,
    Query(query): Query<OperationQuery>,
    headers: HeaderMap,
    payload: Option<Json<UnlockRequest>>,
) -> Response {
    let mut ctx = folio.local_context(local_options(&folio, &headers, &query));

    let Some(Json(UnlockRequest { email })) = payload else {
        return error_response(
            &OperationError::validation("missing payload"),
            ctx.translator(),
        );
    };
    let args = UnlockArgs::new(email.unwrap_or_default());

    match folio.unlock(&mut ctx, &collection, args).await {
        Ok(_) => {
            let body = UnlockResponse {
                message: ctx.translator().t("authentication:unlocked"),
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(err) => error_response(&err, ctx.translator()),
    }
}
