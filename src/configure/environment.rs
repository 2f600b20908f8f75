//! Environment controller: fan out configurers and write the result back

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::barrier::{CompletionBarrier, JobTracker};
use super::{Configuration, ConfigurerFactory, EnvironmentHook};
use crate::client::Client;
use crate::objects::label_selector;
use crate::status::{publish_or_log, Phase, StatusPublisher};
use crate::{Error, Result, ENVIRONMENT_SERVICE, NAME_LABEL, TYPE_LABEL};

/// Configures the environment of freshly dispatched workloads
#[derive(Clone)]
pub struct EnvironmentController {
    factory: Arc<ConfigurerFactory>,
    publisher: Arc<dyn StatusPublisher>,
}

impl EnvironmentController {
    /// Create a controller
    pub fn new(factory: Arc<ConfigurerFactory>, publisher: Arc<dyn StatusPublisher>) -> Self {
        Self { factory, publisher }
    }

    /// Configure one workload to completion
    ///
    /// Owns the status key of `configuration`: it is cleared, marked in
    /// progress, and ends with exactly one terminal publish.
    pub async fn run(&self, client: Arc<dyn Client>, configuration: Configuration) -> Result<()> {
        let key = configuration.status_key();
        if let Err(e) = self.publisher.clear(&key).await {
            warn!(key = %key, error = %e, "failed to clear status");
        }
        publish_or_log(
            self.publisher.as_ref(),
            &key,
            Phase::InProgress,
            &format!("configuring environment for {}", configuration.deployment_name),
        )
        .await;

        let result = self.configure_environment(&client, &configuration, &key).await;
        match &result {
            Ok(()) => {
                info!(key = %key, "Environment configured");
                publish_or_log(self.publisher.as_ref(), &key, Phase::Succeeded, "environment configured").await;
            }
            Err(e) => {
                error!(key = %key, error = %e, "Environment configuration failed");
                publish_or_log(self.publisher.as_ref(), &key, Phase::Failed, &e.to_string()).await;
            }
        }
        result
    }

    async fn configure_environment(
        &self,
        client: &Arc<dyn Client>,
        configuration: &Configuration,
        key: &str,
    ) -> Result<()> {
        let namespace = configuration.namespace.as_str();
        let mut workload = client
            .get_deployment_config_by_name(namespace, &configuration.deployment_name)
            .await?
            .ok_or_else(|| {
                Error::not_found(format!(
                    "deployment config {} in {namespace}",
                    configuration.deployment_name
                ))
            })?;

        let selector = label_selector(&[(TYPE_LABEL, ENVIRONMENT_SERVICE)]);
        let services = client.find_deployment_configs_by_label(namespace, &selector).await?;
        let kinds: BTreeSet<String> = services
            .iter()
            .filter_map(|service| match service.label(NAME_LABEL) {
                Some(kind) => Some(kind.to_string()),
                None => {
                    debug!(service = %service.name(), "Supporting service without a name label");
                    None
                }
            })
            .collect();

        let jobs = JobTracker::new();
        let mut barrier = CompletionBarrier::new();
        for kind in kinds {
            match self.factory.configurer(&kind, key, &jobs) {
                Ok(configurer) => {
                    let client = client.clone();
                    let snapshot = workload.clone();
                    let namespace = namespace.to_string();
                    debug!(kind = %kind, workload = %snapshot.name(), "Starting configurer");
                    barrier.spawn(kind, async move {
                        configurer.configure(client, &snapshot, &namespace).await
                    });
                }
                Err(e) => barrier.fail(kind, e),
            }
        }

        let report = barrier.wait().await;
        for (kind, patch) in report.patches {
            debug!(kind = %kind, ops = patch.ops().len(), "Applying configurer patch");
            patch.apply(&mut workload);
        }
        let updated = client.update_deployment_config(namespace, &workload).await;

        let mut failures = report.failures;
        if !jobs.is_empty() {
            debug!(key = %key, jobs = jobs.len(), "Waiting for provisioning jobs");
        }
        failures.0.extend(jobs.wait().await.0);
        updated?;

        if failures.0.is_empty() {
            Ok(())
        } else {
            Err(Error::Configure(failures))
        }
    }
}

impl EnvironmentHook for EnvironmentController {
    fn configure(&self, client: Arc<dyn Client>, configuration: Configuration) {
        let controller = self.clone();
        tokio::spawn(async move {
            // Outcome is reported through the status key.
            let _ = controller.run(client, configuration).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{JobEvent, MockClient};
    use crate::configure::test_support::{cloudapp, env, service, supporting};
    use crate::configure::{ConfigureSettings, MockPushLister};
    use crate::objects::DeploymentConfig;
    use crate::status::{DurablePublisher, MemoryStore, StatusRecord};
    use futures::{stream, StreamExt};
    use k8s_openapi::api::batch::v1::Job;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;

    fn configuration() -> Configuration {
        Configuration {
            deployment_name: "cloudapp".to_string(),
            namespace: "test".to_string(),
            operation: "provision".to_string(),
            instance_id: "test:cloudapp".to_string(),
        }
    }

    fn controller(publisher: Arc<DurablePublisher>) -> EnvironmentController {
        let factory = ConfigurerFactory::new(
            publisher.clone(),
            Arc::new(crate::template::bundled()),
            Arc::new(MockPushLister::new()),
            ConfigureSettings::default(),
        );
        EnvironmentController::new(Arc::new(factory), publisher)
    }

    fn publisher() -> Arc<DurablePublisher> {
        Arc::new(DurablePublisher::new(Arc::new(MemoryStore::new())))
    }

    async fn record(publisher: &DurablePublisher) -> StatusRecord {
        publisher.get("test:cloudapp:provision").await.unwrap().unwrap()
    }

    fn terminal_entries(record: &StatusRecord) -> usize {
        record
            .log
            .iter()
            .filter(|line| *line == "environment configured" || line.contains("failed"))
            .count()
    }

    /// Cluster holding the cloud app and the given supporting services
    fn cluster(services: Vec<DeploymentConfig>, updated: Arc<Mutex<Vec<DeploymentConfig>>>) -> MockClient {
        let mut client = MockClient::new();
        client
            .expect_get_deployment_config_by_name()
            .withf(|ns, name| ns == "test" && name == "cloudapp")
            .returning(|_, _| {
                Ok(Some(cloudapp(json!([{"name": "FH_REDIS_HOST", "value": "localhost"}]))))
            });
        client
            .expect_find_deployment_configs_by_label()
            .withf(|_, selector| selector == "rhmap/type=environmentService")
            .returning(move |_, _| Ok(services.clone()));
        client
            .expect_update_deployment_config()
            .times(1)
            .returning(move |_, dc| {
                updated.lock().unwrap().push(dc.clone());
                Ok(dc.clone())
            });
        client
    }

    #[tokio::test]
    async fn wires_cache_and_relational_store_in_one_update() {
        let updated = Arc::new(Mutex::new(Vec::new()));
        let mysql = supporting(
            "data-mysql",
            "data-mysql",
            json!([{"name": "MYSQL_ROOT_PASSWORD", "value": "dfgdfgdf"}]),
        );
        let cache = supporting("data-cache", "cache-redis", json!([]));
        let mut client = cluster(vec![mysql.clone(), cache.clone(), cache], updated.clone());
        client
            .expect_find_deployment_configs_by_label()
            .withf(|_, selector| selector == "rhmap/name=data-mysql")
            .returning(move |_, _| Ok(vec![mysql.clone()]));
        client
            .expect_find_services_by_label()
            .returning(|_, _| Ok(vec![service("mysql", "data-mysql")]));
        client.expect_find_job_by_name().returning(|_, _| Ok(None));
        client
            .expect_create_job_to_watch()
            .times(1)
            .returning(|_, _| Ok(stream::iter(Vec::<JobEvent>::new()).boxed()));

        let publisher = publisher();
        controller(publisher.clone())
            .run(Arc::new(client), configuration())
            .await
            .unwrap();

        let updated = updated.lock().unwrap();
        assert_eq!(updated.len(), 1);
        let workload = &updated[0];
        assert_eq!(env(workload, "FH_REDIS_HOST").as_deref(), Some("data-cache"));
        assert_eq!(env(workload, "MYSQL_HOST").as_deref(), Some("mysql"));
        assert_eq!(env(workload, "MYSQL_PORT").as_deref(), Some("3306"));
        assert_eq!(workload.metadata.resource_version.as_deref(), Some("7"));

        let record = record(&publisher).await;
        assert_eq!(record.phase, Phase::Succeeded);
        assert_eq!(record.log.first().map(String::as_str), Some("configuring environment for cloudapp"));
    }

    #[tokio::test]
    async fn job_failing_after_configurers_return_fails_the_operation() {
        let updated = Arc::new(Mutex::new(Vec::new()));
        let mysql = supporting(
            "data-mysql",
            "data-mysql",
            json!([{"name": "MYSQL_ROOT_PASSWORD", "value": "dfgdfgdf"}]),
        );
        let mut client = cluster(vec![mysql.clone()], updated.clone());
        client
            .expect_find_deployment_configs_by_label()
            .withf(|_, selector| selector == "rhmap/name=data-mysql")
            .returning(move |_, _| Ok(vec![mysql.clone()]));
        client
            .expect_find_services_by_label()
            .returning(|_, _| Ok(vec![service("mysql", "data-mysql")]));
        client.expect_find_job_by_name().returning(|_, _| Ok(None));
        client.expect_create_job_to_watch().times(1).returning(|_, _| {
            let failed: Job = serde_json::from_value(json!({
                "metadata": {"name": "cloudapp-mysql-dataconfig-job"},
                "status": {
                    "failed": 1,
                    "conditions": [{
                        "type": "Failed",
                        "status": "True",
                        "reason": "DeadlineExceeded",
                        "message": "deadline"
                    }]
                }
            }))
            .unwrap();
            Ok(stream::once(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                JobEvent::Modified(failed)
            })
            .boxed())
        });
        client
            .expect_pod_logs()
            .withf(|_, selector| selector == "job-name=cloudapp-mysql-dataconfig-job")
            .times(1)
            .returning(|_, _| Ok("access denied".to_string()));

        let publisher = publisher();
        let err = controller(publisher.clone())
            .run(Arc::new(client), configuration())
            .await
            .unwrap_err();

        let Error::Configure(failures) = &err else {
            panic!("expected aggregated failures, got {err:?}");
        };
        assert_eq!(failures.0.len(), 1);
        assert_eq!(failures.0[0].kind, "data-mysql");

        let updated = updated.lock().unwrap();
        assert_eq!(env(&updated[0], "MYSQL_HOST").as_deref(), Some("mysql"));

        let record = record(&publisher).await;
        assert_eq!(record.phase, Phase::Failed);
        assert!(record.description.contains("DeadlineExceeded"));
        assert!(record.description.contains("access denied"));
        assert!(record.log.iter().any(|line| line.ends_with("succeeded 0 failed 1")));
        assert!(!record.log.iter().any(|line| line == "environment configured"));
        assert_eq!(record.log.last(), Some(&record.description));
    }

    #[tokio::test]
    async fn unsupported_kind_fails_without_stopping_peers() {
        let updated = Arc::new(Mutex::new(Vec::new()));
        let services = vec![
            supporting("memcached", "memcached", json!([])),
            supporting("data-cache", "cache-redis", json!([])),
        ];
        let client = cluster(services, updated.clone());

        let publisher = publisher();
        let err = controller(publisher.clone())
            .run(Arc::new(client), configuration())
            .await
            .unwrap_err();

        let Error::Configure(failures) = &err else {
            panic!("expected aggregated failures, got {err:?}");
        };
        assert_eq!(failures.0.len(), 1);
        assert_eq!(failures.0[0].kind, "memcached");

        let updated = updated.lock().unwrap();
        assert_eq!(env(&updated[0], "FH_REDIS_HOST").as_deref(), Some("data-cache"));

        let record = record(&publisher).await;
        assert_eq!(record.phase, Phase::Failed);
        assert!(record.description.contains("memcached"));
        assert_eq!(terminal_entries(&record), 1);
    }

    #[tokio::test]
    async fn no_supporting_services_still_succeeds() {
        let updated = Arc::new(Mutex::new(Vec::new()));
        let client = cluster(Vec::new(), updated.clone());

        let publisher = publisher();
        controller(publisher.clone())
            .run(Arc::new(client), configuration())
            .await
            .unwrap();

        assert_eq!(updated.lock().unwrap().len(), 1);
        let record = record(&publisher).await;
        assert_eq!(record.phase, Phase::Succeeded);
        assert_eq!(record.log.len(), 2);
    }

    #[tokio::test]
    async fn missing_workload_is_fatal() {
        let mut client = MockClient::new();
        client
            .expect_get_deployment_config_by_name()
            .returning(|_, _| Ok(None));
        client.expect_update_deployment_config().never();

        let publisher = publisher();
        let err = controller(publisher.clone())
            .run(Arc::new(client), configuration())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        let record = record(&publisher).await;
        assert_eq!(record.phase, Phase::Failed);
        assert_eq!(record.log.len(), 2);
    }

    #[tokio::test]
    async fn rerun_starts_a_fresh_log() {
        let publisher = publisher();
        publisher
            .publish("test:cloudapp:provision", Phase::Failed, "earlier run")
            .await
            .unwrap();

        let client = cluster(Vec::new(), Arc::default());
        controller(publisher.clone())
            .run(Arc::new(client), configuration())
            .await
            .unwrap();

        let record = record(&publisher).await;
        assert_eq!(record.phase, Phase::Succeeded);
        assert!(!record.log.iter().any(|line| line == "earlier run"));
    }
}
