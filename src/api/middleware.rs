//! Correlation ids and shared-key authentication

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::{warn, Instrument};

use super::error::ApiError;
use super::AppState;

/// Correlation id header, echoed on every response
pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request_id");

/// Shared-key header
pub const AUTH_HEADER: HeaderName = HeaderName::from_static("x-auth");

/// Correlation id of the current request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestId(pub String);

fn request_id_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(&REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Take the correlation id from the request or make one up, run the request
/// inside a `request` span and echo the id back
pub async fn request_id(mut req: Request<Body>, next: Next) -> Response {
    let id = request_id_from_headers(req.headers()).unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    req.extensions_mut().insert(RequestId(id.clone()));

    let span = tracing::info_span!(
        "request",
        request_id = %id,
        method = %req.method(),
        path = %req.uri().path()
    );
    let mut response = next.run(req).instrument(span).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Reject requests whose `X-AUTH` does not match the configured key
///
/// Without a configured key every request passes.
pub async fn require_auth(State(state): State<AppState>, req: Request<Body>, next: Next) -> Response {
    let Some(expected) = state.auth_key.as_deref() else {
        return next.run(req).await;
    };
    let presented = req.headers().get(&AUTH_HEADER).and_then(|v| v.to_str().ok());
    if presented != Some(expected) {
        warn!(path = %req.uri().path(), "Rejected request with a bad X-AUTH header");
        return ApiError::Unauthorized.into_response();
    }
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_request_ids_are_ignored() {
        let mut headers = HeaderMap::new();
        assert_eq!(request_id_from_headers(&headers), None);

        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_static("  "));
        assert_eq!(request_id_from_headers(&headers), None);

        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_static("abc-123"));
        assert_eq!(request_id_from_headers(&headers).as_deref(), Some("abc-123"));
    }
}
