//! services/trainer/src/web/middleware.rs
//!
//! Access control for the trainer routes.

use axum::{
    extract::{Query, Request, State},
    http::{header, StatusCode, Uri},
    middleware::Next,
    response::Response,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;

use crate::web::state::AppState;

/// Middleware that checks the admin token when one is configured.
///
/// The token may arrive as an `Authorization: Bearer` header or, for browser
/// WebSocket clients that cannot set headers, as a `token` query parameter.
/// Without a configured token every request passes.
pub async fn require_admin_token(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(expected) = state.config.admin_token.as_deref() else {
        return Ok(next.run(req).await);
    };

    let from_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);
    let from_query = query_token(req.uri());

    if from_header == Some(expected) || from_query.as_deref() == Some(expected) {
        Ok(next.run(req).await)
    } else {
        warn!(path = %req.uri().path(), "Rejected request without a valid admin token");
        Err(StatusCode::UNAUTHORIZED)
    }
}

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// The percent-decoded `token` query parameter, if present.
fn query_token(uri: &Uri) -> Option<String> {
    Query::<TokenQuery>::try_from_uri(uri).ok()?.0.token
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(uri: &str) -> Option<String> {
        query_token(&uri.parse::<Uri>().unwrap())
    }

    #[test]
    fn token_is_read_from_the_query_string() {
        assert_eq!(token("/ws?a=1&token=secret").as_deref(), Some("secret"));
        assert_eq!(token("/ws?tokens=secret"), None);
        assert_eq!(token("/ws"), None);
    }

    #[test]
    fn query_token_is_percent_decoded() {
        assert_eq!(token("/ws?token=a%2Bb%26c%25d").as_deref(), Some("a+b&c%d"));
        assert_eq!(token("/ws?token=two+words").as_deref(), Some("two words"));
    }
}
