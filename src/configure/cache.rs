//! Cache configurer: point the workload at the shared cache

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::job::is_self;
use super::{Configurer, ConfigurerContext, WorkloadPatch};
use crate::client::Client;
use crate::objects::DeploymentConfig;
use crate::template::TemplateKind;
use crate::Result;

/// Env var holding the cache host
pub const REDIS_HOST_ENV: &str = "FH_REDIS_HOST";

/// Rewrites `FH_REDIS_HOST` where the workload already declares it
pub struct CacheConfigurer {
    ctx: ConfigurerContext,
}

impl CacheConfigurer {
    /// Create a cache configurer
    pub fn new(ctx: ConfigurerContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Configurer for CacheConfigurer {
    fn kind(&self) -> TemplateKind {
        TemplateKind::Cache
    }

    async fn configure(
        &self,
        _client: Arc<dyn Client>,
        workload: &DeploymentConfig,
        namespace: &str,
    ) -> Result<WorkloadPatch> {
        if is_self(workload, self.kind()) {
            return Ok(WorkloadPatch::new());
        }
        debug!(namespace = %namespace, workload = %workload.name(), host = %self.ctx.settings.cache_host, "Configuring cache");
        Ok(WorkloadPatch::new().replace_env(REDIS_HOST_ENV, self.ctx.settings.cache_host.as_str()))
    }
}
