use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;

use super::{cookie_headers, error_response, local_options, OperationQuery};
use crate::{
    error::OperationError, instance::Folio, operations::LoginArgs, storage::Document,
};

#[derive(ToSchema, Deserialize)]
pub struct LoginRequest {
    email: Option<String>,
    password: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginResponse {
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<String>,
    exp: i64,
    #[schema(value_type = Object)]
    user: Document,
}

#[utoipa::path(
    post,
    path= "/api/{collection}/login",
    params(
        ("collection" = String, Path, description = "Auth collection slug"),
        OperationQuery
    ),
    request_body = LoginRequest,
    responses (
        (status = 200, description = "Authenticated; session cookie set", body = LoginResponse),
        (status = 400, description = "Malformed email or missing password", body = super::ErrorBody),
        (status = 401, description = "Email or password incorrect", body = super::ErrorBody),
        (status = 429, description = "Identity locked after too many failed attempts", body = super::ErrorBody),
    ),
    tag= "auth"
)]
// axum handler for login
#[instrument(skip(folio, query, headers, payload))]
pub async fn login(
    folio: Extension<Arc<Folio>>,
    Path(collection): Path<String>,
    Query(query): Query<OperationQuery>,
    headers: axum::http::HeaderMap,
    payload: Option<Json<LoginRequest>>,
) -> Response {
    let mut ctx = folio.local_context(local_options(&folio, &headers, &query));

    let Some(Json(request)) = payload else {
        return error_response(
            &OperationError::validation("missing payload"),
            ctx.translator(),
        );
    };

    let mut args = LoginArgs::new(
        request.email.unwrap_or_default(),
        request.password.unwrap_or_default(),
    );
    args.depth = query.depth.unwrap_or(0);

    match folio.login(&mut ctx, &collection, args).await {
        Ok(result) => {
            let response_headers = cookie_headers(ctx.take_cookies());
            let body = LoginResponse {
                message: ctx.translator().t("authentication:passed"),
                token: result.token,
                exp: result.exp,
                user: result.user,
            };
            (StatusCode::OK, response_headers, Json(body)).into_response()
        }
        Err(err) => error_response(&err, ctx.translator()),
    }
}
