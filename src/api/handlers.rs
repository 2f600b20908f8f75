//! Route handlers

use std::collections::BTreeSet;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::error::ApiError;
use super::AppState;
use crate::dispatch::Dispatched;
use crate::objects::label_selector;
use crate::payload::{Payload, Target};
use crate::status::{status_key, Phase};
use crate::template::TemplateSummary;
use crate::{ENVIRONMENT_SERVICE, NAME_LABEL, TYPE_LABEL};

/// Cluster host header for template listings
pub const HOST_HEADER: &str = "x-rhmap-host";
/// Cluster token header for template listings
pub const TOKEN_HEADER: &str = "x-rhmap-token";

/// `POST /service/deploy/{template}/{namespace}`
pub async fn deploy(
    State(state): State<AppState>,
    Path((template, namespace)): Path<(String, String)>,
    body: Bytes,
) -> Result<Json<Dispatched>, ApiError> {
    let payload: Payload = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("malformed payload: {e}")))?;
    let client = state.clients.client(payload.target()?)?;

    info!(template = %template, namespace = %namespace, service = %payload.service_name, "Deploy requested");
    let dispatched = state
        .dispatcher
        .dispatch(client, &template, &namespace, &payload)
        .await?;
    Ok(Json(dispatched))
}

/// Query of a last-operation lookup
#[derive(Debug, Deserialize)]
pub struct LastOperationQuery {
    /// `provision` or `update`
    pub operation: Option<String>,
}

/// Status of an operation as served over HTTP
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct LastOperation {
    /// Current phase
    pub phase: Phase,
    /// Latest description
    pub description: String,
    /// Every description so far
    pub log: Vec<String>,
}

/// `GET /v2/service_instances/{instance_id}/last_operation?operation=`
pub async fn last_operation(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
    Query(query): Query<LastOperationQuery>,
) -> Result<Json<LastOperation>, ApiError> {
    let operation = query
        .operation
        .filter(|op| !op.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("operation is required".to_string()))?;

    let key = status_key(&instance_id, &operation);
    let record = state
        .status
        .get(&key)
        .await?
        .ok_or_else(|| ApiError::NotFound(key.clone()))?;
    debug!(key = %key, phase = %record.phase, "Served last operation");

    Ok(Json(LastOperation {
        phase: record.phase,
        description: record.description,
        log: record.log,
    }))
}

/// Query of a template listing
#[derive(Debug, Deserialize)]
pub struct TemplatesQuery {
    /// Namespace to check for deployed services
    pub env: Option<String>,
}

/// One entry of a template listing
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct TemplateListing {
    /// Template metadata
    #[serde(flatten)]
    pub summary: TemplateSummary,
    /// Whether a supporting service of this template runs in the namespace
    pub deployed: bool,
}

fn target_from_headers(headers: &HeaderMap) -> Option<Target> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };
    Some(Target {
        host: header(HOST_HEADER)?,
        token: header(TOKEN_HEADER)?,
    })
}

/// `GET /service/templates?env=`
pub async fn list_templates(
    State(state): State<AppState>,
    Query(query): Query<TemplatesQuery>,
    headers: HeaderMap,
) -> Result<Json<Vec<TemplateListing>>, ApiError> {
    let summaries = state.templates.list()?;

    let namespace = query
        .env
        .filter(|ns| !ns.is_empty())
        .or_else(|| state.deploy_namespace.clone());
    let target = target_from_headers(&headers).or_else(|| state.default_target.clone());

    let mut deployed = BTreeSet::new();
    if let (Some(namespace), Some(target)) = (namespace, target) {
        let client = state.clients.client(&target)?;
        let selector = label_selector(&[(TYPE_LABEL, ENVIRONMENT_SERVICE)]);
        for service in client.find_deployment_configs_by_label(&namespace, &selector).await? {
            if let Some(name) = service.label(NAME_LABEL) {
                deployed.insert(name.to_string());
            }
        }
    }

    Ok(Json(
        summaries
            .into_iter()
            .map(|summary| TemplateListing {
                deployed: deployed.contains(&summary.name),
                summary,
            })
            .collect(),
    ))
}

/// `GET /sys/info/ping`
pub async fn ping() -> &'static str {
    "Ok"
}

/// `GET /sys/info/health`
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({}))
}
