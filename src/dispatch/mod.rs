//! Dispatcher: apply a rendered template to a namespace
//!
//! A dispatch renders the named template with the payload, deploys any
//! templates it depends on, and then either creates the object graph or,
//! when a workload for the payload already exists, updates the workload,
//! build config and route in place. Environment configuration is handed
//! off to the [`EnvironmentHook`] and runs in the background.
//!
//! # Errors
//!
//! Every error up to the returned [`Dispatched`] is surfaced to the caller.
//! A failure part way through an object graph leaves the objects written so
//! far in place.

mod dependencies;

use std::collections::BTreeSet;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;
use tracing::{debug, info, warn};

pub use dependencies::{DependencyError, MAX_DEPENDENCY_DEPTH};

use crate::client::Client;
use crate::configure::{Configuration, EnvironmentHook};
use crate::objects::{label_selector, BuildConfig, ClusterObject, DeploymentConfig, Route};
use crate::payload::Payload;
use crate::template::{canonical_template_name, Template, TemplateKind, Templates};
use crate::{Error, Result};

/// Operation name for a first deploy
pub const OPERATION_PROVISION: &str = "provision";

/// Operation name for a redeploy
pub const OPERATION_UPDATE: &str = "update";

/// Handle returned once an object graph has been applied
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Dispatched {
    /// Name of the resulting DeploymentConfig
    #[serde(rename = "deploymentName")]
    pub deployment_name: String,
    /// Route exposed by the template, if any
    #[serde(rename = "route", skip_serializing_if = "Option::is_none")]
    pub route: Option<Route>,
    /// URL streaming the deploy or build log
    #[serde(rename = "watchURL")]
    pub watch_url: String,
    /// URL watching the build; only set when a build was started
    #[serde(rename = "buildURL", skip_serializing_if = "Option::is_none")]
    pub build_url: Option<String>,
    /// `<namespace>:<deployment name>`
    pub instance_id: String,
    /// `provision` or `update`
    pub operation: String,
}

impl Dispatched {
    /// Status key of this dispatch's operation
    pub fn status_key(&self) -> String {
        crate::status::status_key(&self.instance_id, &self.operation)
    }
}

/// Build the instance id of a workload
pub fn instance_id(namespace: &str, deployment_name: &str) -> String {
    format!("{namespace}:{deployment_name}")
}

/// Objects already in the namespace for a payload
struct Existing {
    deployment_config: DeploymentConfig,
    build_config: Option<BuildConfig>,
}

/// Applies templates to namespaces
pub struct Dispatcher {
    templates: Arc<Templates>,
    environment: Arc<dyn EnvironmentHook>,
}

impl Dispatcher {
    /// Create a dispatcher
    pub fn new(templates: Arc<Templates>, environment: Arc<dyn EnvironmentHook>) -> Self {
        Self {
            templates,
            environment,
        }
    }

    /// Deploy or update `template` in `namespace`
    ///
    /// # Errors
    ///
    /// - `Invalid` for an empty namespace or a payload the template rejects
    /// - `TemplateNotFound` for an unknown template
    /// - `InvalidTemplate` when the template does not render or decode
    /// - any cluster error from writing the object graph
    pub async fn dispatch(
        &self,
        client: Arc<dyn Client>,
        template: &str,
        namespace: &str,
        payload: &Payload,
    ) -> Result<Dispatched> {
        let mut seen = BTreeSet::new();
        self.dispatch_at(&client, template, namespace, payload, 0, &mut seen)
            .await
    }

    fn dispatch_at<'a>(
        &'a self,
        client: &'a Arc<dyn Client>,
        template_name: &'a str,
        namespace: &'a str,
        payload: &'a Payload,
        depth: usize,
        seen: &'a mut BTreeSet<String>,
    ) -> BoxFuture<'a, Result<Dispatched>> {
        async move {
            if namespace.trim().is_empty() {
                return Err(Error::invalid("namespace is required"));
            }
            seen.insert(canonical_template_name(template_name));

            let kind = TemplateKind::parse(template_name);
            payload.validate(kind)?;
            let options = kind.map(|k| payload.options_for(k)).transpose()?;

            let ctx = payload.render_context(namespace, options.as_ref());
            let template = self.templates.render(template_name, &ctx)?;
            let kind = kind.or(template.kind);
            check_object_graph(&template, kind)?;

            let deployed = self
                .deploy_dependencies(client, &template, namespace, payload, depth, seen)
                .await
                .map_err(|e| {
                    warn!(
                        template = %template.name,
                        deployed = e.deployed.len(),
                        error = %e,
                        "Dependency deploy failed"
                    );
                    e.source
                })?;
            if !deployed.is_empty() {
                info!(
                    template = %template.name,
                    dependencies = ?deployed.iter().map(|d| d.deployment_name.as_str()).collect::<Vec<_>>(),
                    "Deployed dependencies"
                );
            }

            let mut dispatched = match find_existing(client.as_ref(), namespace, payload).await? {
                Some(existing) => {
                    info!(template = %template.name, namespace = %namespace, "Updating existing deployment");
                    let mut d = update_objects(client.as_ref(), namespace, &template, &existing).await?;
                    d.operation = OPERATION_UPDATE.to_string();
                    d
                }
                None => {
                    info!(template = %template.name, namespace = %namespace, "Creating deployment");
                    let mut d = create_objects(client.as_ref(), namespace, &template).await?;
                    d.operation = OPERATION_PROVISION.to_string();
                    d
                }
            };
            dispatched.instance_id = instance_id(namespace, &dispatched.deployment_name);

            self.environment.configure(
                client.clone(),
                Configuration {
                    deployment_name: dispatched.deployment_name.clone(),
                    namespace: namespace.to_string(),
                    operation: dispatched.operation.clone(),
                    instance_id: dispatched.instance_id.clone(),
                },
            );

            if kind.is_some_and(TemplateKind::is_application) {
                let build_config = build_config_name(&template)?;
                let build = client
                    .instantiate_build(namespace, build_config)
                    .await?
                    .ok_or_else(|| {
                        Error::cluster(format!("no build was started for build config {build_config}"))
                    })?;
                dispatched.watch_url = client.build_config_log_url(namespace, build.name());
                dispatched.build_url =
                    Some(client.build_url(namespace, build.name(), &payload.cloud_app_guid));
            } else {
                dispatched.watch_url = client.deploy_log_url(namespace, &payload.service_name);
            }

            info!(
                instance_id = %dispatched.instance_id,
                operation = %dispatched.operation,
                "Dispatched template"
            );
            Ok(dispatched)
        }
        .boxed()
    }
}

/// Reject graphs the dispatcher cannot produce a handle for
fn check_object_graph(template: &Template, kind: Option<TemplateKind>) -> Result<()> {
    let has_workload = template
        .objects
        .iter()
        .any(|o| matches!(o, ClusterObject::DeploymentConfig(_)));
    if !has_workload {
        return Err(Error::invalid_template(format!(
            "{}: no DeploymentConfig in template",
            template.name
        )));
    }
    if kind.is_some_and(TemplateKind::is_application) {
        build_config_name(template)?;
    }
    Ok(())
}

fn build_config_name(template: &Template) -> Result<&str> {
    template
        .objects
        .iter()
        .find_map(|o| match o {
            ClusterObject::BuildConfig(bc) if !bc.name().is_empty() => Some(bc.name()),
            _ => None,
        })
        .ok_or_else(|| {
            Error::invalid_template(format!("{}: no BuildConfig in template", template.name))
        })
}

/// Find the workload and build config a previous deploy of this payload made
///
/// With several matches the first one wins.
async fn find_existing(
    client: &dyn Client,
    namespace: &str,
    payload: &Payload,
) -> Result<Option<Existing>> {
    let selector = label_selector(&[payload.lookup_label()]);
    let deployment_configs = client
        .find_deployment_configs_by_label(namespace, &selector)
        .await?;
    let Some(deployment_config) = deployment_configs.into_iter().next() else {
        return Ok(None);
    };
    let build_config = client
        .find_build_configs_by_label(namespace, &selector)
        .await?
        .into_iter()
        .next();
    debug!(
        namespace = %namespace,
        selector = %selector,
        deployment_config = %deployment_config.name(),
        "Found existing deployment"
    );
    Ok(Some(Existing {
        deployment_config,
        build_config,
    }))
}

async fn create_objects(client: &dyn Client, namespace: &str, template: &Template) -> Result<Dispatched> {
    let mut dispatched = Dispatched::default();
    for object in &template.objects {
        debug!(kind = object.kind(), name = %object.name(), "Creating object");
        match object {
            ClusterObject::DeploymentConfig(dc) => {
                let created = client.create_deployment_config(namespace, dc).await?;
                dispatched.deployment_name = created.name().to_string();
            }
            ClusterObject::Service(svc) => {
                client.create_service(namespace, svc).await?;
            }
            ClusterObject::Route(route) => {
                dispatched.route = Some(client.create_route(namespace, route).await?);
            }
            ClusterObject::ImageStream(is) => {
                client.create_image_stream(namespace, is).await?;
            }
            ClusterObject::BuildConfig(bc) => {
                client.create_build_config(namespace, bc).await?;
            }
            ClusterObject::Secret(secret) => {
                client.create_secret(namespace, secret).await?;
            }
            ClusterObject::PersistentVolumeClaim(pvc) => {
                client.create_persistent_volume_claim(namespace, pvc).await?;
            }
            ClusterObject::Pod(pod) => {
                client.create_pod(namespace, pod).await?;
            }
            ClusterObject::ConfigMap(cm) => {
                client.create_config_map(namespace, cm).await?;
            }
            ClusterObject::Job(_) => {
                debug!(name = %object.name(), "Jobs are only created by configurers; skipping");
            }
        }
    }
    Ok(dispatched)
}

/// Update the workload, build config and route; leave everything else alone
async fn update_objects(
    client: &dyn Client,
    namespace: &str,
    template: &Template,
    existing: &Existing,
) -> Result<Dispatched> {
    let mut dispatched = Dispatched::default();
    for object in &template.objects {
        match object {
            ClusterObject::DeploymentConfig(dc) => {
                let mut dc = dc.clone();
                dc.metadata.resource_version = existing.deployment_config.metadata.resource_version.clone();
                let updated = client.update_deployment_config(namespace, &dc).await?;
                dispatched.deployment_name = updated.name().to_string();
            }
            ClusterObject::BuildConfig(bc) => match &existing.build_config {
                Some(current) => {
                    let mut bc = bc.clone();
                    bc.metadata.resource_version = current.metadata.resource_version.clone();
                    client.update_build_config(namespace, &bc).await?;
                }
                None => {
                    info!(name = %bc.name(), "No existing build config; creating it");
                    client.create_build_config(namespace, bc).await?;
                }
            },
            ClusterObject::Route(route) => {
                let Some(current) = client.find_route_by_name(namespace, route.name()).await? else {
                    warn!(name = %route.name(), "Route to update not found; skipping");
                    continue;
                };
                let mut route = route.clone();
                route.metadata.resource_version = current.metadata.resource_version.clone();
                dispatched.route = Some(client.update_route(namespace, &route).await?);
            }
            other => {
                debug!(kind = other.kind(), name = %other.name(), "Not updated on redeploy");
            }
        }
    }
    Ok(dispatched)
}
