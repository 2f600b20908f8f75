//! HTTP error responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::error;

use crate::status::StoreError;
use crate::Error;

/// Error returned by a handler
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// `X-AUTH` did not match the configured key
    #[error("unauthorized")]
    Unauthorized,

    /// Malformed request
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Nothing recorded under the requested key
    #[error("not found: {0}")]
    NotFound(String),

    /// Failure from the deployment core
    #[error(transparent)]
    Core(#[from] Error),
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Core(Error::Store(e))
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Core(Error::Invalid(_)) => StatusCode::BAD_REQUEST,
            ApiError::Core(Error::TemplateNotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Core(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }
        let body = serde_json::json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_status_codes() {
        let cases = [
            (ApiError::Unauthorized, StatusCode::UNAUTHORIZED),
            (ApiError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
            (ApiError::NotFound("k".into()), StatusCode::NOT_FOUND),
            (Error::invalid("serviceName is required").into(), StatusCode::BAD_REQUEST),
            (Error::template_not_found("elastic").into(), StatusCode::NOT_FOUND),
            (Error::not_found("route push-ups").into(), StatusCode::INTERNAL_SERVER_ERROR),
            (Error::cluster("conflict").into(), StatusCode::INTERNAL_SERVER_ERROR),
            (StoreError::Backend("redis down".into()).into(), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[tokio::test]
    async fn body_carries_the_message() {
        let response = ApiError::Core(Error::invalid("target is required")).into_response();
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(json["error"].as_str().unwrap().contains("target is required"));
    }
}
