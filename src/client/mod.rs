//! Cluster client capability
//!
//! Everything the negotiator does to a cluster goes through [`Client`], so
//! the dispatcher and the configurers can be exercised against mocks. The
//! production implementation is [`KubeClient`].

mod kube_client;

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{ConfigMap, PersistentVolumeClaim, Pod, Secret, Service};
#[cfg(test)]
use mockall::automock;

pub use kube_client::{KubeClient, KubeClientFactory};

use crate::objects::{Build, BuildConfig, DeploymentConfig, ImageStream, Route};
use crate::payload::Target;
use crate::Result;

/// Watch event for a provisioning job
#[derive(Clone, Debug)]
pub enum JobEvent {
    /// First sighting of the job
    Added(Job),
    /// The job changed
    Modified(Job),
    /// The job was deleted
    Deleted(Job),
    /// The watch failed
    Error(String),
}

/// Stream of job events, ending when the watch is dropped
pub type JobEventStream = BoxStream<'static, JobEvent>;

/// Stream of DeploymentConfig states
pub type DeploymentConfigStream = BoxStream<'static, Result<DeploymentConfig>>;

/// Namespace-scoped operations against one cluster
///
/// Label selectors are strings in Kubernetes syntax (`k1=v1,k2=v2`).
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Client: Send + Sync {
    /// Create a DeploymentConfig
    async fn create_deployment_config(&self, ns: &str, dc: &DeploymentConfig) -> Result<DeploymentConfig>;

    /// Replace a DeploymentConfig; `metadata.resourceVersion` must be current
    async fn update_deployment_config(&self, ns: &str, dc: &DeploymentConfig) -> Result<DeploymentConfig>;

    /// List DeploymentConfigs matching a label selector
    async fn find_deployment_configs_by_label(&self, ns: &str, selector: &str) -> Result<Vec<DeploymentConfig>>;

    /// Get a DeploymentConfig by name
    async fn get_deployment_config_by_name(&self, ns: &str, name: &str) -> Result<Option<DeploymentConfig>>;

    /// Watch one DeploymentConfig, yielding its state on every change
    async fn watch_deployment_config(&self, ns: &str, name: &str) -> Result<DeploymentConfigStream>;

    /// Create a Service
    async fn create_service(&self, ns: &str, svc: &Service) -> Result<Service>;

    /// List Services matching a label selector
    async fn find_services_by_label(&self, ns: &str, selector: &str) -> Result<Vec<Service>>;

    /// Create a Route
    async fn create_route(&self, ns: &str, route: &Route) -> Result<Route>;

    /// Replace a Route
    async fn update_route(&self, ns: &str, route: &Route) -> Result<Route>;

    /// Get a Route by name
    async fn find_route_by_name(&self, ns: &str, name: &str) -> Result<Option<Route>>;

    /// Create an ImageStream
    async fn create_image_stream(&self, ns: &str, is: &ImageStream) -> Result<ImageStream>;

    /// Create a BuildConfig
    async fn create_build_config(&self, ns: &str, bc: &BuildConfig) -> Result<BuildConfig>;

    /// Replace a BuildConfig
    async fn update_build_config(&self, ns: &str, bc: &BuildConfig) -> Result<BuildConfig>;

    /// List BuildConfigs matching a label selector
    async fn find_build_configs_by_label(&self, ns: &str, selector: &str) -> Result<Vec<BuildConfig>>;

    /// Start a build of the named BuildConfig
    async fn instantiate_build(&self, ns: &str, build_config: &str) -> Result<Option<Build>>;

    /// Create a Secret
    async fn create_secret(&self, ns: &str, secret: &Secret) -> Result<Secret>;

    /// Create a PersistentVolumeClaim
    async fn create_persistent_volume_claim(&self, ns: &str, pvc: &PersistentVolumeClaim) -> Result<PersistentVolumeClaim>;

    /// Create a Pod
    async fn create_pod(&self, ns: &str, pod: &Pod) -> Result<Pod>;

    /// Get a ConfigMap by name
    async fn find_config_map_by_name(&self, ns: &str, name: &str) -> Result<Option<ConfigMap>>;

    /// Create a ConfigMap
    async fn create_config_map(&self, ns: &str, cm: &ConfigMap) -> Result<ConfigMap>;

    /// Replace a ConfigMap
    async fn update_config_map(&self, ns: &str, cm: &ConfigMap) -> Result<ConfigMap>;

    /// Get a Job by name
    async fn find_job_by_name(&self, ns: &str, name: &str) -> Result<Option<Job>>;

    /// Create a Job and watch it
    async fn create_job_to_watch(&self, ns: &str, job: &Job) -> Result<JobEventStream>;

    /// Latest deploy log of a DeploymentConfig
    async fn deploy_logs(&self, ns: &str, name: &str) -> Result<String>;

    /// Tail of the log of the first pod matching a label selector
    async fn pod_logs(&self, ns: &str, selector: &str) -> Result<String>;

    /// URL streaming the deploy log of a DeploymentConfig
    fn deploy_log_url(&self, ns: &str, name: &str) -> String;

    /// URL streaming the log of a build
    fn build_config_log_url(&self, ns: &str, build: &str) -> String;

    /// URL watching the builds of a cloud app
    fn build_url(&self, ns: &str, build: &str, guid: &str) -> String;
}

/// Builds a [`Client`] for a deploy target
#[cfg_attr(test, automock)]
pub trait ClientFactory: Send + Sync {
    /// Client for the cluster at `target.host`, authenticated with `target.token`
    fn client(&self, target: &Target) -> Result<Arc<dyn Client>>;
}

/// URL streaming the deploy log of a DeploymentConfig
pub fn deploy_log_url(host: &str, ns: &str, name: &str) -> String {
    format!(
        "{}/apis/apps.openshift.io/v1/namespaces/{ns}/deploymentconfigs/{name}/log?follow=true",
        host.trim_end_matches('/')
    )
}

/// URL streaming the log of a build
pub fn build_config_log_url(host: &str, ns: &str, build: &str) -> String {
    format!(
        "{}/apis/build.openshift.io/v1/namespaces/{ns}/builds/{build}/log?follow=true",
        host.trim_end_matches('/')
    )
}

/// URL watching the builds of a cloud app
///
/// The build name is not part of the URL; builds are selected by the
/// cloud app's GUID label so later builds of the same app are seen too.
pub fn build_url(host: &str, ns: &str, _build: &str, guid: &str) -> String {
    format!(
        "{}/apis/build.openshift.io/v1/namespaces/{ns}/builds?watch=true&labelSelector={}%3D{guid}",
        host.trim_end_matches('/'),
        crate::GUID_LABEL.replace('/', "%2F"),
    )
}
