//! Shared steps of the job-driven configurers
//!
//! The document and relational store configurers both find their supporting
//! service, wait for it to become ready, and submit a one-shot provisioning
//! job whose progress is reported on the operation's status key.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::Service;
use minijinja::Value;
use tracing::{debug, info, warn};

use super::barrier::JobTracker;
use crate::client::{Client, JobEvent, JobEventStream};
use crate::objects::{label_selector, ClusterObject, DeploymentConfig};
use crate::status::{publish_or_log, Phase, StatusPublisher};
use crate::template::{TemplateKind, Templates};
use crate::{Error, Result, GUID_LABEL, NAME_LABEL};

/// Workload and service of a supporting service kind
pub(crate) struct SupportingService {
    pub(crate) workload: DeploymentConfig,
    pub(crate) service: Service,
}

impl SupportingService {
    /// Name of the service, used as the host inside the namespace
    pub(crate) fn host(&self) -> &str {
        self.service.metadata.name.as_deref().unwrap_or_default()
    }
}

/// Whether the workload is itself the supporting service
pub(crate) fn is_self(workload: &DeploymentConfig, kind: TemplateKind) -> bool {
    workload.label(NAME_LABEL) == Some(kind.canonical_name())
}

/// Database (and user) name for a workload: its GUID label, else its name
pub(crate) fn database_name(workload: &DeploymentConfig) -> String {
    match workload.label(GUID_LABEL) {
        Some(guid) if !guid.is_empty() => guid.to_string(),
        _ => workload.name().to_string(),
    }
}

/// Whether the sentinel job of a previous provisioning run exists
pub(crate) async fn sentinel_exists(client: &dyn Client, namespace: &str, job_name: &str) -> Result<bool> {
    let found = client.find_job_by_name(namespace, job_name).await?.is_some();
    if found {
        debug!(namespace = %namespace, job = %job_name, "Provisioning job already exists");
    }
    Ok(found)
}

/// Find the workload and service labelled with `kind`
pub(crate) async fn find_supporting_service(
    client: &dyn Client,
    namespace: &str,
    kind: TemplateKind,
) -> Result<SupportingService> {
    let selector = label_selector(&[(NAME_LABEL, kind.canonical_name())]);
    let workload = client
        .find_deployment_configs_by_label(namespace, &selector)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| Error::not_found(format!("deployment config labelled {selector} in {namespace}")))?;
    let service = client
        .find_services_by_label(namespace, &selector)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| Error::not_found(format!("service labelled {selector} in {namespace}")))?;
    Ok(SupportingService { workload, service })
}

/// Wait until a supporting workload is ready
///
/// Returns at once when `workload` is already ready; otherwise watches it
/// for at most `timeout`. A timeout carries the latest deploy log.
pub(crate) async fn wait_until_ready(
    client: &dyn Client,
    namespace: &str,
    workload: &DeploymentConfig,
    timeout: Duration,
) -> Result<()> {
    if workload.is_ready() {
        return Ok(());
    }
    let name = workload.name();
    info!(namespace = %namespace, name = %name, timeout_secs = timeout.as_secs(), "Waiting for supporting service");

    let mut states = client.watch_deployment_config(namespace, name).await?;
    let watched = tokio::time::timeout(timeout, async {
        while let Some(state) = states.next().await {
            if state?.is_ready() {
                return Ok(true);
            }
        }
        Ok::<_, Error>(false)
    })
    .await;

    match watched {
        Ok(Ok(true)) => Ok(()),
        Ok(Ok(false)) => Err(Error::transient(format!(
            "watch on {name} ended before it became ready"
        ))),
        Ok(Err(e)) => Err(e),
        Err(_) => {
            let logs = client
                .deploy_logs(namespace, name)
                .await
                .unwrap_or_else(|e| format!("deploy log unavailable: {e}"));
            Err(Error::transient(format!(
                "{name} not ready after {}s; deploy log:\n{logs}",
                timeout.as_secs()
            )))
        }
    }
}

/// Render a job template and pull out its Job
pub(crate) fn render_job(templates: &Templates, template: &str, ctx: &Value) -> Result<Job> {
    let rendered = templates.render(template, ctx)?;
    rendered
        .objects
        .into_iter()
        .find_map(|o| match o {
            ClusterObject::Job(job) => Some(job),
            _ => None,
        })
        .ok_or_else(|| Error::invalid_template(format!("{template}: no Job in template")))
}

/// Submit a provisioning job and watch it in the background
///
/// The watcher is counted in on `jobs` under `kind`, so the operation is not
/// finished until the job is.
pub(crate) async fn submit_job(
    client: Arc<dyn Client>,
    publisher: Arc<dyn StatusPublisher>,
    jobs: &JobTracker,
    kind: TemplateKind,
    key: &str,
    namespace: &str,
    job: &Job,
) -> Result<()> {
    let job_name = job.metadata.name.clone().unwrap_or_default();
    let events = client.create_job_to_watch(namespace, job).await?;
    publish_or_log(publisher.as_ref(), key, Phase::InProgress, &format!("started job {job_name}")).await;

    let watch = tokio::spawn(watch_job(
        events,
        client,
        publisher,
        key.to_string(),
        namespace.to_string(),
        job_name,
    ));
    jobs.track(kind.canonical_name(), watch);
    Ok(())
}

/// Report job events on `key` until the job completes, fails or the watch ends
///
/// A failed job or a broken watch is returned as an error; the terminal
/// status is left to whoever waits for the watcher.
pub(crate) async fn watch_job(
    mut events: JobEventStream,
    client: Arc<dyn Client>,
    publisher: Arc<dyn StatusPublisher>,
    key: String,
    namespace: String,
    job_name: String,
) -> Result<()> {
    while let Some(event) = events.next().await {
        let job = match event {
            JobEvent::Added(job) | JobEvent::Modified(job) => job,
            JobEvent::Deleted(_) => {
                warn!(job = %job_name, "Job deleted before it finished");
                return Err(Error::cluster(format!("job {job_name} was deleted before it finished")));
            }
            JobEvent::Error(e) => {
                warn!(job = %job_name, error = %e, "Job watch failed");
                return Err(Error::transient(format!("watching job {job_name} failed: {e}")));
            }
        };

        let status = job.status.unwrap_or_default();
        let succeeded = status.succeeded.unwrap_or(0);
        let failed = status.failed.unwrap_or(0);
        publish_or_log(
            publisher.as_ref(),
            &key,
            Phase::InProgress,
            &format!("job {job_name}: succeeded {succeeded} failed {failed}"),
        )
        .await;

        for condition in status.conditions.unwrap_or_default() {
            if condition.status != "True" {
                continue;
            }
            match condition.type_.as_str() {
                "Failed" => {
                    let logs = client
                        .pod_logs(&namespace, &format!("job-name={job_name}"))
                        .await
                        .unwrap_or_else(|e| format!("pod log unavailable: {e}"));
                    warn!(job = %job_name, reason = ?condition.reason, "Provisioning job failed");
                    return Err(Error::cluster(format!(
                        "job {job_name} failed ({}): {}\n{logs}",
                        condition.reason.unwrap_or_default(),
                        condition.message.unwrap_or_default(),
                    )));
                }
                "Complete" => {
                    publish_or_log(publisher.as_ref(), &key, Phase::InProgress, &format!("job {job_name} succeeded")).await;
                }
                _ => {}
            }
        }

        if succeeded >= 1 {
            return Ok(());
        }
    }
    debug!(job = %job_name, "Job watch ended");
    Ok(())
}
