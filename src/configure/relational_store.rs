//! Relational store configurer: a MySQL database and user per cloud app

use std::sync::Arc;

use async_trait::async_trait;
use minijinja::context;
use tracing::info;

use super::job::{
    database_name, find_supporting_service, is_self, render_job, sentinel_exists, submit_job,
    wait_until_ready,
};
use super::{Configurer, ConfigurerContext, WorkloadPatch};
use crate::client::Client;
use crate::objects::DeploymentConfig;
use crate::status::{publish_or_log, Phase};
use crate::template::{generate_password, TemplateKind};
use crate::{Error, Result};

/// Root password on the relational store workload
pub const ROOT_PASSWORD_ENV: &str = "MYSQL_ROOT_PASSWORD";
/// Template of the provisioning job
pub const JOB_TEMPLATE: &str = "data-mysql-job";
/// MySQL rejects user names longer than this
pub const MAX_USER_LENGTH: usize = 16;

const PORT: &str = "3306";
const PASSWORD_LENGTH: usize = 16;

/// Name of the provisioning job for a workload
pub fn sentinel_job_name(workload: &str) -> String {
    format!("{workload}-mysql-dataconfig-job")
}

/// User name derived from a database name
pub fn user_name(database: &str) -> String {
    database.chars().take(MAX_USER_LENGTH).collect()
}

/// Provisions a relational database for the workload
pub struct RelationalStoreConfigurer {
    ctx: ConfigurerContext,
}

impl RelationalStoreConfigurer {
    /// Create a relational store configurer
    pub fn new(ctx: ConfigurerContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Configurer for RelationalStoreConfigurer {
    fn kind(&self) -> TemplateKind {
        TemplateKind::RelationalStore
    }

    async fn configure(
        &self,
        client: Arc<dyn Client>,
        workload: &DeploymentConfig,
        namespace: &str,
    ) -> Result<WorkloadPatch> {
        if is_self(workload, self.kind()) {
            return Ok(WorkloadPatch::new());
        }
        let job_name = sentinel_job_name(workload.name());
        if sentinel_exists(client.as_ref(), namespace, &job_name).await? {
            return Ok(WorkloadPatch::new());
        }

        let supporting = find_supporting_service(client.as_ref(), namespace, self.kind()).await?;
        let key = self.ctx.status_key.as_str();
        publish_or_log(self.ctx.publisher.as_ref(), key, Phase::InProgress, "waiting for the relational store to be ready").await;
        wait_until_ready(client.as_ref(), namespace, &supporting.workload, self.ctx.settings.dependency_timeout).await?;

        let root_password = supporting
            .workload
            .env_value(ROOT_PASSWORD_ENV)
            .ok_or_else(|| {
                Error::not_found(format!("{ROOT_PASSWORD_ENV} on {}", supporting.workload.name()))
            })?
            .to_string();

        let database = database_name(workload);
        let user = user_name(&database);
        let password = generate_password(PASSWORD_LENGTH);
        let host = supporting.host().to_string();

        let job = render_job(
            &self.ctx.templates,
            JOB_TEMPLATE,
            &context! {
                jobName => &job_name,
                adminPassword => &root_password,
                serviceHost => &host,
                database => &database,
                user => &user,
                password => &password,
            },
        )?;
        submit_job(
            client.clone(),
            self.ctx.publisher.clone(),
            &self.ctx.jobs,
            self.kind(),
            key,
            namespace,
            &job,
        )
        .await?;

        info!(namespace = %namespace, workload = %workload.name(), database = %database, "Configured relational store");
        publish_or_log(self.ctx.publisher.as_ref(), key, Phase::InProgress, "relational store connection configured").await;
        Ok(WorkloadPatch::new()
            .upsert_env("MYSQL_USER", user)
            .upsert_env("MYSQL_PASSWORD", password)
            .upsert_env("MYSQL_DATABASE", database)
            .upsert_env("MYSQL_HOST", host)
            .upsert_env("MYSQL_PORT", PORT)
            .upsert_env("MYSQL_SERVICE_PORT", PORT))
    }
}
