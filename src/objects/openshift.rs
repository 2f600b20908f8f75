//! OpenShift resource types
//!
//! k8s-openapi has no OpenShift kinds, so these carry the fields the
//! negotiator reads or writes and keep the rest as raw JSON. They travel
//! through the API as `DynamicObject`s.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Container, PodSpec, PodTemplateSpec, Volume};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};

/// API version of apps.openshift.io kinds
pub const APPS_API_VERSION: &str = "apps.openshift.io/v1";
/// API version of route.openshift.io kinds
pub const ROUTE_API_VERSION: &str = "route.openshift.io/v1";
/// API version of image.openshift.io kinds
pub const IMAGE_API_VERSION: &str = "image.openshift.io/v1";
/// API version of build.openshift.io kinds
pub const BUILD_API_VERSION: &str = "build.openshift.io/v1";

fn apps_api_version() -> String {
    APPS_API_VERSION.to_string()
}

fn route_api_version() -> String {
    ROUTE_API_VERSION.to_string()
}

fn image_api_version() -> String {
    IMAGE_API_VERSION.to_string()
}

fn build_api_version() -> String {
    BUILD_API_VERSION.to_string()
}

fn kind_deployment_config() -> String {
    "DeploymentConfig".to_string()
}

fn kind_route() -> String {
    "Route".to_string()
}

fn kind_image_stream() -> String {
    "ImageStream".to_string()
}

fn kind_build_config() -> String {
    "BuildConfig".to_string()
}

fn kind_build() -> String {
    "Build".to_string()
}

// =============================================================================
// DeploymentConfig
// =============================================================================

/// OpenShift DeploymentConfig, the workload controller
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentConfig {
    /// API version
    #[serde(default = "apps_api_version")]
    pub api_version: String,
    /// Kind
    #[serde(default = "kind_deployment_config")]
    pub kind: String,
    /// Metadata
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// Spec
    #[serde(default)]
    pub spec: DeploymentConfigSpec,
    /// Status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<DeploymentConfigStatus>,
}

/// DeploymentConfig spec
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentConfigSpec {
    /// Desired replicas
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    /// Pod selector
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<BTreeMap<String, String>>,
    /// Pod template
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<PodTemplateSpec>,
    /// Image and config change triggers
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub triggers: Vec<serde_json::Value>,
    /// Rollout strategy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<serde_json::Value>,
}

/// DeploymentConfig status
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentConfigStatus {
    /// Latest rollout number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_version: Option<i64>,
    /// Current replicas
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    /// Ready replicas
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready_replicas: Option<i32>,
    /// Available replicas
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_replicas: Option<i32>,
    /// Conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<DeploymentCondition>,
}

/// A DeploymentConfig condition
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentCondition {
    /// Condition type, e.g. `Available`
    #[serde(rename = "type")]
    pub type_: String,
    /// `True`, `False` or `Unknown`
    pub status: String,
    /// Machine-readable reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Human-readable message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl DeploymentConfig {
    /// Name, or empty when unset
    pub fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }

    /// Value of a metadata label
    pub fn label(&self, key: &str) -> Option<&str> {
        self.metadata
            .labels
            .as_ref()
            .and_then(|l| l.get(key))
            .map(String::as_str)
    }

    fn pod_spec(&self) -> Option<&PodSpec> {
        self.spec.template.as_ref().and_then(|t| t.spec.as_ref())
    }

    fn pod_spec_mut(&mut self) -> &mut PodSpec {
        self.spec
            .template
            .get_or_insert_with(Default::default)
            .spec
            .get_or_insert_with(Default::default)
    }

    /// Containers of the pod template
    pub fn containers(&self) -> &[Container] {
        self.pod_spec().map(|s| s.containers.as_slice()).unwrap_or_default()
    }

    /// Mutable containers of the pod template
    pub fn containers_mut(&mut self) -> &mut Vec<Container> {
        &mut self.pod_spec_mut().containers
    }

    /// Volumes of the pod template
    pub fn volumes(&self) -> &[Volume] {
        self.pod_spec()
            .and_then(|s| s.volumes.as_deref())
            .unwrap_or_default()
    }

    /// Mutable volumes of the pod template
    pub fn volumes_mut(&mut self) -> &mut Vec<Volume> {
        self.pod_spec_mut().volumes.get_or_insert_with(Vec::new)
    }

    /// Value of an env var on the first container that defines it
    pub fn env_value(&self, name: &str) -> Option<&str> {
        self.containers()
            .iter()
            .flat_map(|c| c.env.iter().flatten())
            .find(|e| e.name == name)
            .and_then(|e| e.value.as_deref())
    }

    /// Whether the latest rollout has ready pods
    ///
    /// True when the `Available` condition is `True`, or when at least the
    /// desired number of replicas (minimum one) report ready.
    pub fn is_ready(&self) -> bool {
        let Some(status) = &self.status else {
            return false;
        };
        if status
            .conditions
            .iter()
            .any(|c| c.type_ == "Available" && c.status == "True")
        {
            return true;
        }
        let desired = self.spec.replicas.unwrap_or(1).max(1);
        status.ready_replicas.unwrap_or(0) >= desired
    }
}

// =============================================================================
// Route
// =============================================================================

/// OpenShift Route, an externally addressable host rule
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    /// API version
    #[serde(default = "route_api_version")]
    pub api_version: String,
    /// Kind
    #[serde(default = "kind_route")]
    pub kind: String,
    /// Metadata
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// Spec
    #[serde(default)]
    pub spec: RouteSpec,
}

/// Route spec
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RouteSpec {
    /// Exposed host name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Target service
    #[serde(default)]
    pub to: RouteTarget,
    /// Target port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<serde_json::Value>,
    /// TLS settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<RouteTls>,
}

/// What a route points at
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RouteTarget {
    /// Target kind, usually `Service`
    #[serde(default)]
    pub kind: String,
    /// Target name
    #[serde(default)]
    pub name: String,
}

/// Route TLS settings
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RouteTls {
    /// `edge`, `passthrough` or `reencrypt`
    #[serde(default)]
    pub termination: String,
    /// What to do with plain HTTP
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insecure_edge_termination_policy: Option<String>,
}

impl Route {
    /// Name, or empty when unset
    pub fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }

    /// Base URL of the route: `https://host` when TLS is set, else `http://host`
    pub fn base_url(&self) -> Option<String> {
        let host = self.spec.host.as_deref().filter(|h| !h.is_empty())?;
        let scheme = if self.spec.tls.is_some() { "https" } else { "http" };
        Some(format!("{scheme}://{host}"))
    }
}

// =============================================================================
// ImageStream
// =============================================================================

/// OpenShift ImageStream
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImageStream {
    /// API version
    #[serde(default = "image_api_version")]
    pub api_version: String,
    /// Kind
    #[serde(default = "kind_image_stream")]
    pub kind: String,
    /// Metadata
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// Spec
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<serde_json::Value>,
}

// =============================================================================
// BuildConfig / Build
// =============================================================================

/// OpenShift BuildConfig
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BuildConfig {
    /// API version
    #[serde(default = "build_api_version")]
    pub api_version: String,
    /// Kind
    #[serde(default = "kind_build_config")]
    pub kind: String,
    /// Metadata
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// Spec
    #[serde(default)]
    pub spec: BuildConfigSpec,
}

/// BuildConfig spec
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BuildConfigSpec {
    /// Source repository
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<serde_json::Value>,
    /// Build strategy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<serde_json::Value>,
    /// Output image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    /// Build triggers
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub triggers: Vec<serde_json::Value>,
    /// Run policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_policy: Option<String>,
}

impl BuildConfig {
    /// Name, or empty when unset
    pub fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }
}

/// OpenShift Build, one run of a BuildConfig
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Build {
    /// API version
    #[serde(default = "build_api_version")]
    pub api_version: String,
    /// Kind
    #[serde(default = "kind_build")]
    pub kind: String,
    /// Metadata
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// Status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<serde_json::Value>,
}

impl Build {
    /// Name, or empty when unset
    pub fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }
}

/// Body posted to a BuildConfig's `instantiate` subresource
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildRequest {
    /// API version
    pub api_version: String,
    /// Kind
    pub kind: String,
    /// Metadata; the name must match the BuildConfig
    pub metadata: ObjectMeta,
}

impl BuildRequest {
    /// Request a build of the named BuildConfig
    pub fn for_build_config(name: impl Into<String>) -> Self {
        Self {
            api_version: BUILD_API_VERSION.to_string(),
            kind: "BuildRequest".to_string(),
            metadata: ObjectMeta {
                name: Some(name.into()),
                ..Default::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::EnvVar;

    fn dc_with_env(env: Vec<(&str, &str)>) -> DeploymentConfig {
        let mut dc = DeploymentConfig::default();
        dc.containers_mut().push(Container {
            name: "app".to_string(),
            env: Some(
                env.into_iter()
                    .map(|(n, v)| EnvVar {
                        name: n.to_string(),
                        value: Some(v.to_string()),
                        ..Default::default()
                    })
                    .collect(),
            ),
            ..Default::default()
        });
        dc
    }

    #[test]
    fn defaults_fill_type_meta() {
        let dc: DeploymentConfig = serde_json::from_str(r#"{"metadata":{"name":"x"}}"#).unwrap();
        assert_eq!(dc.api_version, APPS_API_VERSION);
        assert_eq!(dc.kind, "DeploymentConfig");
        assert_eq!(dc.name(), "x");
    }

    #[test]
    fn env_value_reads_first_definition() {
        let dc = dc_with_env(vec![("ADMIN_PASSWORD", "secret"), ("OTHER", "1")]);
        assert_eq!(dc.env_value("ADMIN_PASSWORD"), Some("secret"));
        assert_eq!(dc.env_value("MISSING"), None);
    }

    #[test]
    fn readiness_follows_available_condition_or_ready_replicas() {
        let mut dc = DeploymentConfig::default();
        assert!(!dc.is_ready());

        dc.status = Some(DeploymentConfigStatus {
            ready_replicas: Some(0),
            ..Default::default()
        });
        assert!(!dc.is_ready());

        dc.status = Some(DeploymentConfigStatus {
            ready_replicas: Some(1),
            ..Default::default()
        });
        assert!(dc.is_ready());

        dc.spec.replicas = Some(3);
        assert!(!dc.is_ready());

        dc.status = Some(DeploymentConfigStatus {
            conditions: vec![DeploymentCondition {
                type_: "Available".to_string(),
                status: "True".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        });
        assert!(dc.is_ready());
    }

    #[test]
    fn route_base_url_depends_on_tls() {
        let mut route = Route::default();
        assert_eq!(route.base_url(), None);

        route.spec.host = Some("push.example.com".to_string());
        assert_eq!(route.base_url().as_deref(), Some("http://push.example.com"));

        route.spec.tls = Some(RouteTls {
            termination: "edge".to_string(),
            ..Default::default()
        });
        assert_eq!(route.base_url().as_deref(), Some("https://push.example.com"));
    }

    #[test]
    fn build_request_names_the_build_config() {
        let req = serde_json::to_value(BuildRequest::for_build_config("cloudapp")).unwrap();
        assert_eq!(req["kind"], "BuildRequest");
        assert_eq!(req["apiVersion"], BUILD_API_VERSION);
        assert_eq!(req["metadata"]["name"], "cloudapp");
    }
}
