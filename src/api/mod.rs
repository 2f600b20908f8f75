//! HTTP surface
//!
//! Routes:
//! - `POST /service/deploy/{template}/{namespace}` - dispatch a template
//! - `GET /v2/service_instances/{instance_id}/last_operation` - status of an operation
//! - `GET /service/templates` - list templates
//! - `GET /sys/info/ping`, `GET /sys/info/health` - liveness
//!
//! The `/sys/info` routes skip the `X-AUTH` check.

mod error;
mod handlers;
mod middleware;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

pub use error::ApiError;
pub use handlers::{LastOperation, TemplateListing, HOST_HEADER, TOKEN_HEADER};
pub use middleware::{RequestId, AUTH_HEADER, REQUEST_ID_HEADER};

use crate::client::ClientFactory;
use crate::dispatch::Dispatcher;
use crate::payload::Target;
use crate::status::DurablePublisher;
use crate::template::Templates;

/// Shared state for handlers
#[derive(Clone)]
pub struct AppState {
    /// Applies templates
    pub dispatcher: Arc<Dispatcher>,
    /// Builds a cluster client per request target
    pub clients: Arc<dyn ClientFactory>,
    /// Templates, for listings
    pub templates: Arc<Templates>,
    /// Durable status records
    pub status: Arc<DurablePublisher>,
    /// Shared secret expected in `X-AUTH`
    pub auth_key: Option<String>,
    /// Target for listings without `X-RHMAP-*` headers
    pub default_target: Option<Target>,
    /// Namespace for listings without `env`
    pub deploy_namespace: Option<String>,
}

/// Create the router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/service/deploy/{template}/{namespace}", post(handlers::deploy))
        .route(
            "/v2/service_instances/{instance_id}/last_operation",
            get(handlers::last_operation),
        )
        .route("/service/templates", get(handlers::list_templates))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ))
        .route("/sys/info/ping", get(handlers::ping))
        .route("/sys/info/health", get(handlers::health))
        .layer(axum::middleware::from_fn(middleware::request_id))
        .with_state(state)
}
