//! Authentication middleware

use axum::{
    body::Body,
    extract::{Query, Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use serde::Deserialize;

use crate::error::{ApiError, Result};
use crate::AppState;

/// Authenticated user info stored in request extensions
#[derive(Clone, Debug)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub token: String,
}

#[derive(Debug, Default, Deserialize)]
struct TokenField {
    token: Option<String>,
}

/// Auth middleware.
///
/// The token is taken from the `Authorization: Bearer` header, then the
/// `token` query parameter, then the `token` field of a JSON body.
pub async fn auth_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response> {
    let (token, mut request) = extract_token(request, state.config.max_body_bytes).await?;
    let token = token.ok_or_else(|| ApiError::Unauthorized("Missing bearer token".to_string()))?;

    let auth = state
        .db
        .find_valid_token(&token, Utc::now())
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Invalid or expired token".to_string()))?;

    request.extensions_mut().insert(AuthenticatedUser {
        user_id: auth.user_id,
        token,
    });

    Ok(next.run(request).await)
}

async fn extract_token(request: Request<Body>, body_limit: usize) -> Result<(Option<String>, Request<Body>)> {
    if let Some(token) = bearer_token(request.headers()) {
        return Ok((Some(token), request));
    }

    if let Some(token) = query_token(&request) {
        return Ok((Some(token), request));
    }

    // Body fallback: buffer, inspect, and hand the same bytes to the handler
    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, body_limit)
        .await
        .map_err(|_| ApiError::BadRequest("Request body too large".to_string()))?;
    let token = body_token(&bytes);

    Ok((token, Request::from_parts(parts, Body::from(bytes))))
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

fn query_token(request: &Request<Body>) -> Option<String> {
    Query::<TokenField>::try_from_uri(request.uri())
        .ok()
        .and_then(|Query(field)| field.token)
        .filter(|t| !t.is_empty())
}

fn body_token(bytes: &[u8]) -> Option<String> {
    if bytes.is_empty() {
        return None;
    }
    serde_json::from_slice::<TokenField>(bytes)
        .ok()
        .and_then(|field| field.token)
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc-123"));
        assert_eq!(bearer_token(&headers), Some("abc-123".to_string()));
    }

    #[test]
    fn test_query_token() {
        let request = Request::builder()
            .uri("/api/get-progress?packageUuid=p1&token=tok")
            .body(Body::empty())
            .unwrap();
        assert_eq!(query_token(&request), Some("tok".to_string()));

        let request = Request::builder()
            .uri("/api/get-progress?packageUuid=p1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(query_token(&request), None);
    }

    #[test]
    fn test_body_token() {
        assert_eq!(
            body_token(br#"{"packageUuid":"p1","token":"tok"}"#),
            Some("tok".to_string())
        );
        assert_eq!(body_token(br#"{"packageUuid":"p1"}"#), None);
        assert_eq!(body_token(br#"{"token":""}"#), None);
        assert_eq!(body_token(b"not json"), None);
        assert_eq!(body_token(b""), None);
    }

    #[tokio::test]
    async fn test_body_is_restored_after_inspection() {
        let payload = r#"{"token":"tok","score":3}"#;
        let request = Request::builder()
            .method("POST")
            .uri("/api/save-progress")
            .body(Body::from(payload))
            .unwrap();

        let (token, request) = extract_token(request, 1024).await.unwrap();
        assert_eq!(token, Some("tok".to_string()));

        let bytes = axum::body::to_bytes(request.into_body(), 1024).await.unwrap();
        assert_eq!(&bytes[..], payload.as_bytes());
    }
}
