//! Environment configuration
//!
//! After a dispatch, every supporting service running in the namespace gets
//! a chance to wire itself into the new workload. A [`Configurer`] exists
//! per supporting service kind; the [`EnvironmentController`] runs one per
//! kind found, concurrently, and writes the combined result back once.
//!
//! # Configurers
//!
//! | Kind | Workload changes | Job |
//! |------|------------------|-----|
//! | cache-redis | `FH_REDIS_HOST` | no |
//! | data-mongo | `FH_MONGODB_CONN_URL` | database and user |
//! | data-mysql | `MYSQL_*` connection vars | database and user |
//! | push-ups | `UPS_*` vars, config map mount | no |

mod barrier;
mod cache;
mod document_store;
mod environment;
mod job;
mod patch;
mod push;
mod relational_store;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

pub use barrier::{BarrierReport, CompletionBarrier, ConfigureFailures, ConfigurerFailure, JobTracker};
pub use cache::CacheConfigurer;
pub use document_store::DocumentStoreConfigurer;
pub use environment::EnvironmentController;
pub use patch::{PatchOp, WorkloadPatch};
pub use push::{HttpPushLister, PushApplication, PushConfigurer, PushLister};
pub use relational_store::RelationalStoreConfigurer;

#[cfg(test)]
pub use push::MockPushLister;

use crate::client::Client;
use crate::objects::DeploymentConfig;
use crate::status::StatusPublisher;
use crate::template::{TemplateKind, Templates};
use crate::{Error, Result, DEFAULT_DEPENDENCY_TIMEOUT_SECS};

/// Default value written into `FH_REDIS_HOST`
pub const DEFAULT_CACHE_HOST: &str = "data-cache";

/// Inputs of one environment configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Configuration {
    /// Workload being configured
    pub deployment_name: String,
    /// Namespace of the workload
    pub namespace: String,
    /// `provision` or `update`
    pub operation: String,
    /// `<namespace>:<deployment name>`
    pub instance_id: String,
}

impl Configuration {
    /// Status key of the operation
    pub fn status_key(&self) -> String {
        crate::status::status_key(&self.instance_id, &self.operation)
    }
}

/// Starts environment configuration after a dispatch
///
/// Implementations return immediately; progress is reported through the
/// status publisher under [`Configuration::status_key`].
#[cfg_attr(test, automock)]
pub trait EnvironmentHook: Send + Sync {
    /// Configure the environment of `configuration.deployment_name`
    fn configure(&self, client: Arc<dyn Client>, configuration: Configuration);
}

/// Wires one kind of supporting service into a workload
#[async_trait]
pub trait Configurer: Send + Sync {
    /// Kind of supporting service this configurer handles
    fn kind(&self) -> TemplateKind;

    /// Work out the changes `workload` needs
    ///
    /// Side effects on other objects (jobs, config maps) happen here; the
    /// workload itself is only changed through the returned patch. A
    /// workload that is itself of this kind gets an empty patch and no
    /// writes.
    async fn configure(
        &self,
        client: Arc<dyn Client>,
        workload: &DeploymentConfig,
        namespace: &str,
    ) -> Result<WorkloadPatch>;
}

/// Knobs shared by the configurers
#[derive(Clone, Debug)]
pub struct ConfigureSettings {
    /// Value the cache configurer writes into `FH_REDIS_HOST`
    pub cache_host: String,
    /// How long to wait for a supporting service to become ready
    pub dependency_timeout: Duration,
}

impl Default for ConfigureSettings {
    fn default() -> Self {
        Self {
            cache_host: DEFAULT_CACHE_HOST.to_string(),
            dependency_timeout: Duration::from_secs(DEFAULT_DEPENDENCY_TIMEOUT_SECS),
        }
    }
}

/// What a configurer is bound to for one operation
#[derive(Clone)]
pub struct ConfigurerContext {
    /// Publisher for progress on `status_key`
    pub publisher: Arc<dyn StatusPublisher>,
    /// Templates, for the provisioning jobs
    pub templates: Arc<Templates>,
    /// `<instance_id>:<operation>`
    pub status_key: String,
    /// Shared knobs
    pub settings: ConfigureSettings,
    /// Provisioning job watchers of the operation
    pub jobs: JobTracker,
}

/// Maps supporting service kinds to configurers
pub struct ConfigurerFactory {
    publisher: Arc<dyn StatusPublisher>,
    templates: Arc<Templates>,
    push_lister: Arc<dyn PushLister>,
    settings: ConfigureSettings,
}

impl ConfigurerFactory {
    /// Create a factory
    pub fn new(
        publisher: Arc<dyn StatusPublisher>,
        templates: Arc<Templates>,
        push_lister: Arc<dyn PushLister>,
        settings: ConfigureSettings,
    ) -> Self {
        Self {
            publisher,
            templates,
            push_lister,
            settings,
        }
    }

    /// Configurer for the service kind named by a `rhmap/name` label
    ///
    /// Jobs the configurer starts are counted in on `jobs`.
    ///
    /// # Errors
    ///
    /// `UnsupportedKind` when no configurer handles `kind`.
    pub fn configurer(&self, kind: &str, status_key: &str, jobs: &JobTracker) -> Result<Arc<dyn Configurer>> {
        let parsed = TemplateKind::parse(kind)
            .filter(|k| k.is_supporting_service())
            .ok_or_else(|| Error::unsupported_kind(kind))?;

        let ctx = ConfigurerContext {
            publisher: self.publisher.clone(),
            templates: self.templates.clone(),
            status_key: status_key.to_string(),
            settings: self.settings.clone(),
            jobs: jobs.clone(),
        };
        let configurer: Arc<dyn Configurer> = match parsed {
            TemplateKind::Cache => Arc::new(CacheConfigurer::new(ctx)),
            TemplateKind::DocumentStore => Arc::new(DocumentStoreConfigurer::new(ctx)),
            TemplateKind::RelationalStore => Arc::new(RelationalStoreConfigurer::new(ctx)),
            TemplateKind::Push => Arc::new(PushConfigurer::new(ctx, self.push_lister.clone())),
            TemplateKind::CloudApp => return Err(Error::unsupported_kind(kind)),
        };
        Ok(configurer)
    }
}
