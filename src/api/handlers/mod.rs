pub mod find;
pub mod health;
pub mod login;
pub mod unlock;

// common functions for the handlers
use axum::{
    http::{
        header::{AUTHORIZATION, COOKIE, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use utoipa::{IntoParams, ToSchema};

use crate::{
    auth::{cookie::Cookie, token},
    context::LocalOptions,
    error::{ErrorKind, OperationError},
    i18n::Translator,
    instance::Folio,
    storage::Document,
};

/// Query parameters shared by every collection endpoint.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct OperationQuery {
    /// Locale to project localized fields to, or `all`.
    pub locale: Option<String>,
    /// Locale used when a localized field has no value for `locale`.
    #[serde(rename = "fallback-locale")]
    pub fallback_locale: Option<String>,
    /// Relationship population depth.
    pub depth: Option<u32>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ErrorItem {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ErrorBody {
    pub errors: Vec<ErrorItem>,
}

#[must_use]
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Authentication => StatusCode::UNAUTHORIZED,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::Locked => StatusCode::TOO_MANY_REQUESTS,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Timeout => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Hook | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Render an operation failure with a translated message. Internal details
/// are logged, never returned.
pub fn error_response(err: &OperationError, translator: &Translator) -> Response {
    let kind = err.kind();
    let status = status_for(kind);
    if status.is_server_error() {
        error!("Operation failed: {err:#}");
    } else {
        debug!("Operation rejected: {err}");
    }

    let data = match err {
        OperationError::Validation(detail) => Some(detail.clone()),
        _ => None,
    };
    let body = ErrorBody {
        errors: vec![ErrorItem {
            message: translator.t(kind.message_key()),
            data,
        }],
    };
    (status, Json(body)).into_response()
}

/// Build per-request operation options: locale from the query, acting user
/// from a valid session token, and a sink so cookies reach the response.
pub(crate) fn local_options(folio: &Folio, headers: &HeaderMap, query: &OperationQuery) -> LocalOptions {
    let mut options = LocalOptions::new().with_response_sink();
    if let Some(locale) = &query.locale {
        options = options.with_locale(locale.clone());
    }
    if let Some(fallback) = &query.fallback_locale {
        options = options.with_fallback_locale(fallback.clone());
    }
    if let Some(user) = acting_user(folio, headers) {
        options = options.with_user(user);
    }
    options
}

fn acting_user(folio: &Folio, headers: &HeaderMap) -> Option<Document> {
    let raw = extract_session_token(headers, &folio.config().cookie_name())?;
    match token::decode(&raw, folio.config().secret(), folio.clock().now()) {
        Ok(claims) => Some(claims.fields),
        Err(err) => {
            debug!("Ignoring session token: {err}");
            None
        }
    }
}

/// `Set-Cookie` headers for every cookie the operation produced.
pub(crate) fn cookie_headers(cookies: Vec<Cookie>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for cookie in cookies {
        match HeaderValue::from_str(&cookie.to_string()) {
            Ok(value) => {
                headers.append(SET_COOKIE, value);
            }
            Err(err) => error!("Failed to encode cookie {}: {err}", cookie.name),
        }
    }
    headers
}

fn extract_session_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    if let Some(token) = extract_bearer_token(headers) {
        return Some(token);
    }
    let value = headers.get(COOKIE)?.to_str().ok()?;
    value.split(';').find_map(|pair| {
        let (key, val) = pair.trim().split_once('=')?;
        (key.trim() == cookie_name).then(|| val.trim().to_string())
    })
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(
            status_for(ErrorKind::Authentication),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(status_for(ErrorKind::Forbidden), StatusCode::FORBIDDEN);
        assert_eq!(status_for(ErrorKind::Locked), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(status_for(ErrorKind::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_for(ErrorKind::Validation), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_for(ErrorKind::Timeout),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(ErrorKind::Hook),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn bearer_wins_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        headers.insert(COOKIE, HeaderValue::from_static("folio-token=xyz"));
        assert_eq!(
            extract_session_token(&headers, "folio-token"),
            Some("abc".to_string())
        );
    }

    #[test]
    fn cookie_token_is_found_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; folio-token=xyz; other=1"),
        );
        assert_eq!(
            extract_session_token(&headers, "folio-token"),
            Some("xyz".to_string())
        );
        assert_eq!(extract_session_token(&headers, "missing"), None);
    }

    #[test]
    fn empty_bearer_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer   "));
        assert_eq!(extract_bearer_token(&headers), None);
    }
}
