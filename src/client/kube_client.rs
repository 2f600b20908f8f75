//! [`Client`] over the Kubernetes API
//!
//! Core kinds go through typed `Api<T>`s. OpenShift kinds go through
//! `Api<DynamicObject>` and are converted to and from the types in
//! [`crate::objects::openshift`].

use std::sync::Arc;

use async_trait::async_trait;
use futures::{future, StreamExt};
use http::header::{HeaderValue, AUTHORIZATION};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{ConfigMap, PersistentVolumeClaim, Pod, Secret, Service};
use kube::api::{Api, DynamicObject, ListParams, LogParams, PostParams};
use kube::core::GroupVersionKind;
use kube::discovery::ApiResource;
use kube::runtime::watcher::{self, Event};
use kube::runtime::WatchStreamExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use super::{Client, ClientFactory, DeploymentConfigStream, JobEvent, JobEventStream};
use crate::objects::openshift::{
    APPS_API_VERSION, BUILD_API_VERSION, IMAGE_API_VERSION, ROUTE_API_VERSION,
};
use crate::objects::{convert, Build, BuildConfig, BuildRequest, DeploymentConfig, ImageStream, Route};
use crate::payload::Target;
use crate::{Error, Result};

/// Lines of pod log attached to a failed job
const POD_LOG_TAIL_LINES: i64 = 50;

/// Client for one cluster, authenticated with a bearer token
#[derive(Clone)]
pub struct KubeClient {
    client: kube::Client,
    host: String,
}

impl KubeClient {
    /// Wrap an existing kube client; `host` is used to build log URLs
    pub fn new(client: kube::Client, host: impl Into<String>) -> Self {
        Self {
            client,
            host: host.into(),
        }
    }

    /// Connect to the API server at `host` with a bearer `token`
    pub fn for_target(host: &str, token: &str, accept_invalid_certs: bool) -> Result<Self> {
        let uri: http::Uri = host
            .parse()
            .map_err(|e| Error::invalid(format!("target host {host} is not a URL: {e}")))?;

        let mut config = kube::Config::new(uri);
        config.accept_invalid_certs = accept_invalid_certs;
        if !token.is_empty() {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| Error::invalid(format!("target token is not a valid header: {e}")))?;
            value.set_sensitive(true);
            config.headers.push((AUTHORIZATION, value));
        }

        let client = kube::Client::try_from(config)?;
        Ok(Self::new(client, host.trim_end_matches('/')))
    }

    fn openshift_api(&self, ns: &str, api_version: &str, kind: &str) -> Api<DynamicObject> {
        let (group, version) = api_version.split_once('/').unwrap_or(("", api_version));
        let ar = ApiResource::from_gvk(&GroupVersionKind::gvk(group, version, kind));
        Api::namespaced_with(self.client.clone(), ns, &ar)
    }

    fn deployment_configs(&self, ns: &str) -> Api<DynamicObject> {
        self.openshift_api(ns, APPS_API_VERSION, "DeploymentConfig")
    }

    fn routes(&self, ns: &str) -> Api<DynamicObject> {
        self.openshift_api(ns, ROUTE_API_VERSION, "Route")
    }

    fn build_configs(&self, ns: &str) -> Api<DynamicObject> {
        self.openshift_api(ns, BUILD_API_VERSION, "BuildConfig")
    }
}

async fn create_dynamic<T>(api: &Api<DynamicObject>, object: &T) -> Result<T>
where
    T: Serialize + DeserializeOwned,
{
    let obj: DynamicObject = convert(object)?;
    let created = api.create(&PostParams::default(), &obj).await?;
    Ok(convert(&created)?)
}

async fn replace_dynamic<T>(api: &Api<DynamicObject>, name: &str, object: &T) -> Result<T>
where
    T: Serialize + DeserializeOwned,
{
    if name.is_empty() {
        return Err(Error::invalid("cannot update an object without a name"));
    }
    let obj: DynamicObject = convert(object)?;
    let replaced = api.replace(name, &PostParams::default(), &obj).await?;
    Ok(convert(&replaced)?)
}

async fn list_dynamic<T>(api: &Api<DynamicObject>, selector: &str) -> Result<Vec<T>>
where
    T: DeserializeOwned,
{
    let list = api.list(&ListParams::default().labels(selector)).await?;
    list.items
        .iter()
        .map(|o| convert(o).map_err(Error::from))
        .collect()
}

fn object_name(meta: &k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta) -> Result<&str> {
    meta.name
        .as_deref()
        .filter(|n| !n.is_empty())
        .ok_or_else(|| Error::invalid("cannot update an object without a name"))
}

#[async_trait]
impl Client for KubeClient {
    async fn create_deployment_config(&self, ns: &str, dc: &DeploymentConfig) -> Result<DeploymentConfig> {
        let created = create_dynamic(&self.deployment_configs(ns), dc).await?;
        info!(namespace = %ns, name = %created.name(), "Created DeploymentConfig");
        Ok(created)
    }

    async fn update_deployment_config(&self, ns: &str, dc: &DeploymentConfig) -> Result<DeploymentConfig> {
        let updated = replace_dynamic(&self.deployment_configs(ns), dc.name(), dc).await?;
        info!(namespace = %ns, name = %updated.name(), "Updated DeploymentConfig");
        Ok(updated)
    }

    async fn find_deployment_configs_by_label(&self, ns: &str, selector: &str) -> Result<Vec<DeploymentConfig>> {
        list_dynamic(&self.deployment_configs(ns), selector).await
    }

    async fn get_deployment_config_by_name(&self, ns: &str, name: &str) -> Result<Option<DeploymentConfig>> {
        match self.deployment_configs(ns).get_opt(name).await? {
            Some(obj) => Ok(Some(convert(&obj)?)),
            None => Ok(None),
        }
    }

    async fn watch_deployment_config(&self, ns: &str, name: &str) -> Result<DeploymentConfigStream> {
        let config = watcher::Config::default().fields(&format!("metadata.name={name}"));
        let stream = watcher::watcher(self.deployment_configs(ns), config)
            .applied_objects()
            .map(|item| match item {
                Ok(obj) => convert::<_, DeploymentConfig>(&obj).map_err(Error::from),
                Err(e) => Err(Error::transient(format!("deployment config watch failed: {e}"))),
            });
        Ok(stream.boxed())
    }

    async fn create_service(&self, ns: &str, svc: &Service) -> Result<Service> {
        let api: Api<Service> = Api::namespaced(self.client.clone(), ns);
        Ok(api.create(&PostParams::default(), svc).await?)
    }

    async fn find_services_by_label(&self, ns: &str, selector: &str) -> Result<Vec<Service>> {
        let api: Api<Service> = Api::namespaced(self.client.clone(), ns);
        Ok(api.list(&ListParams::default().labels(selector)).await?.items)
    }

    async fn create_route(&self, ns: &str, route: &Route) -> Result<Route> {
        create_dynamic(&self.routes(ns), route).await
    }

    async fn update_route(&self, ns: &str, route: &Route) -> Result<Route> {
        replace_dynamic(&self.routes(ns), route.name(), route).await
    }

    async fn find_route_by_name(&self, ns: &str, name: &str) -> Result<Option<Route>> {
        match self.routes(ns).get_opt(name).await? {
            Some(obj) => Ok(Some(convert(&obj)?)),
            None => Ok(None),
        }
    }

    async fn create_image_stream(&self, ns: &str, is: &ImageStream) -> Result<ImageStream> {
        let api = self.openshift_api(ns, IMAGE_API_VERSION, "ImageStream");
        create_dynamic(&api, is).await
    }

    async fn create_build_config(&self, ns: &str, bc: &BuildConfig) -> Result<BuildConfig> {
        create_dynamic(&self.build_configs(ns), bc).await
    }

    async fn update_build_config(&self, ns: &str, bc: &BuildConfig) -> Result<BuildConfig> {
        replace_dynamic(&self.build_configs(ns), bc.name(), bc).await
    }

    async fn find_build_configs_by_label(&self, ns: &str, selector: &str) -> Result<Vec<BuildConfig>> {
        list_dynamic(&self.build_configs(ns), selector).await
    }

    async fn instantiate_build(&self, ns: &str, build_config: &str) -> Result<Option<Build>> {
        let body = serde_json::to_vec(&BuildRequest::for_build_config(build_config))?;
        let build: Build = self
            .build_configs(ns)
            .create_subresource("instantiate", build_config, &PostParams::default(), body)
            .await?;
        if build.name().is_empty() {
            return Ok(None);
        }
        info!(namespace = %ns, build = %build.name(), "Instantiated build");
        Ok(Some(build))
    }

    async fn create_secret(&self, ns: &str, secret: &Secret) -> Result<Secret> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), ns);
        Ok(api.create(&PostParams::default(), secret).await?)
    }

    async fn create_persistent_volume_claim(&self, ns: &str, pvc: &PersistentVolumeClaim) -> Result<PersistentVolumeClaim> {
        let api: Api<PersistentVolumeClaim> = Api::namespaced(self.client.clone(), ns);
        Ok(api.create(&PostParams::default(), pvc).await?)
    }

    async fn create_pod(&self, ns: &str, pod: &Pod) -> Result<Pod> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), ns);
        Ok(api.create(&PostParams::default(), pod).await?)
    }

    async fn find_config_map_by_name(&self, ns: &str, name: &str) -> Result<Option<ConfigMap>> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), ns);
        Ok(api.get_opt(name).await?)
    }

    async fn create_config_map(&self, ns: &str, cm: &ConfigMap) -> Result<ConfigMap> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), ns);
        Ok(api.create(&PostParams::default(), cm).await?)
    }

    async fn update_config_map(&self, ns: &str, cm: &ConfigMap) -> Result<ConfigMap> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), ns);
        let name = object_name(&cm.metadata)?;
        Ok(api.replace(name, &PostParams::default(), cm).await?)
    }

    async fn find_job_by_name(&self, ns: &str, name: &str) -> Result<Option<Job>> {
        let api: Api<Job> = Api::namespaced(self.client.clone(), ns);
        Ok(api.get_opt(name).await?)
    }

    async fn create_job_to_watch(&self, ns: &str, job: &Job) -> Result<JobEventStream> {
        let api: Api<Job> = Api::namespaced(self.client.clone(), ns);
        let created = api.create(&PostParams::default(), job).await?;
        let name = object_name(&created.metadata)?.to_string();
        info!(namespace = %ns, job = %name, "Created provisioning job");

        let config = watcher::Config::default().fields(&format!("metadata.name={name}"));
        let mut seen = false;
        let stream = watcher::watcher(api, config).filter_map(move |event| {
            let mapped = match event {
                Ok(Event::Apply(job)) | Ok(Event::InitApply(job)) => {
                    if seen {
                        Some(JobEvent::Modified(job))
                    } else {
                        seen = true;
                        Some(JobEvent::Added(job))
                    }
                }
                Ok(Event::Delete(job)) => Some(JobEvent::Deleted(job)),
                Ok(Event::Init) | Ok(Event::InitDone) => None,
                Err(e) => Some(JobEvent::Error(e.to_string())),
            };
            future::ready(mapped)
        });
        Ok(stream.boxed())
    }

    async fn deploy_logs(&self, ns: &str, name: &str) -> Result<String> {
        let path = format!("/apis/{APPS_API_VERSION}/namespaces/{ns}/deploymentconfigs/{name}/log");
        let request = http::Request::get(path)
            .body(Vec::new())
            .map_err(|e| Error::internal(format!("building deploy log request: {e}")))?;
        Ok(self.client.request_text(request).await?)
    }

    async fn pod_logs(&self, ns: &str, selector: &str) -> Result<String> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), ns);
        let pods = api.list(&ListParams::default().labels(selector)).await?;
        let Some(name) = pods.items.first().and_then(|p| p.metadata.name.clone()) else {
            debug!(namespace = %ns, selector = %selector, "No pod for log request");
            return Ok(String::new());
        };
        let params = LogParams {
            tail_lines: Some(POD_LOG_TAIL_LINES),
            ..Default::default()
        };
        Ok(api.logs(&name, &params).await?)
    }

    fn deploy_log_url(&self, ns: &str, name: &str) -> String {
        super::deploy_log_url(&self.host, ns, name)
    }

    fn build_config_log_url(&self, ns: &str, build: &str) -> String {
        super::build_config_log_url(&self.host, ns, build)
    }

    fn build_url(&self, ns: &str, build: &str, guid: &str) -> String {
        super::build_url(&self.host, ns, build, guid)
    }
}

/// Builds a [`KubeClient`] per deploy target
#[derive(Clone, Debug, Default)]
pub struct KubeClientFactory {
    accept_invalid_certs: bool,
}

impl KubeClientFactory {
    /// Create a factory; `accept_invalid_certs` disables TLS verification
    pub fn new(accept_invalid_certs: bool) -> Self {
        Self {
            accept_invalid_certs,
        }
    }
}

impl ClientFactory for KubeClientFactory {
    fn client(&self, target: &Target) -> Result<Arc<dyn Client>> {
        let client = KubeClient::for_target(&target.host, &target.token, self.accept_invalid_certs)?;
        Ok(Arc::new(client))
    }
}
