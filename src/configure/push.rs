//! Push configurer: share the push server's application list with the
//! workload
//!
//! The push server's applications are fetched over HTTP, written into the
//! `ups-client-config` config map as `config.json`, and the config map is
//! mounted into the workload at [`CONFIG_MOUNT_PATH`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::job::is_self;
use super::{Configurer, ConfigurerContext, WorkloadPatch};
use crate::client::Client;
use crate::objects::{label_selector, DeploymentConfig};
use crate::status::{publish_or_log, Phase};
use crate::template::TemplateKind;
use crate::{Error, Result, NAME_LABEL};

/// Route of the push server
pub const PUSH_ROUTE: &str = "push-ups";
/// Config map holding the application list
pub const CLIENT_CONFIG_MAP: &str = "ups-client-config";
/// Key of the application list in the config map
pub const CLIENT_CONFIG_KEY: &str = "config.json";
/// Volume the config map is mounted through
pub const CONFIG_VOLUME: &str = "push-config-volume";
/// Mount path of the config map
pub const CONFIG_MOUNT_PATH: &str = "/etc/push";
/// Admin user on the push server workload
pub const ADMIN_USER_ENV: &str = "UPS_ADMIN_USER";
/// Admin password on the push server workload
pub const ADMIN_PASSWORD_ENV: &str = "UPS_ADMIN_PASSWORD";

/// Bound on each request to the push server
pub const PUSH_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const TOKEN_PATH: &str = "/auth/realms/aerogear/protocol/openid-connect/token";
const APPLICATIONS_PATH: &str = "/ag-push/rest/applications";
const OAUTH_CLIENT_ID: &str = "unified-push-server-js";

/// An application registered with the push server
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushApplication {
    /// Application id
    #[serde(rename = "pushApplicationID")]
    pub push_application_id: String,
    /// Secret for sending pushes
    #[serde(default)]
    pub master_secret: String,
    /// Display name
    pub name: String,
}

/// Fetches the application list from a push server
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PushLister: Send + Sync {
    /// Authenticate as `user` and list the applications at `base_url`
    async fn list_applications(&self, base_url: &str, user: &str, password: &str) -> Result<Vec<PushApplication>>;
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// [`PushLister`] over HTTP with an OAuth2 password grant
#[derive(Clone)]
pub struct HttpPushLister {
    http: reqwest::Client,
}

impl HttpPushLister {
    /// Create a lister whose requests time out after [`PUSH_REQUEST_TIMEOUT`]
    pub fn new(accept_invalid_certs: bool) -> Result<Self> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(accept_invalid_certs)
            .timeout(PUSH_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::internal(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl PushLister for HttpPushLister {
    async fn list_applications(&self, base_url: &str, user: &str, password: &str) -> Result<Vec<PushApplication>> {
        let base = base_url.trim_end_matches('/');

        let token: TokenResponse = self
            .http
            .post(format!("{base}{TOKEN_PATH}"))
            .form(&[
                ("grant_type", "password"),
                ("client_id", OAUTH_CLIENT_ID),
                ("username", user),
                ("password", password),
            ])
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| Error::transient(format!("push server login failed: {e}")))?
            .json()
            .await
            .map_err(|e| Error::transient(format!("push server login returned no token: {e}")))?;

        let applications = self
            .http
            .get(format!("{base}{APPLICATIONS_PATH}"))
            .bearer_auth(&token.access_token)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| Error::transient(format!("listing push applications failed: {e}")))?
            .json()
            .await
            .map_err(|e| Error::transient(format!("push application list is malformed: {e}")))?;
        Ok(applications)
    }
}

/// Shares the push application list with the workload
pub struct PushConfigurer {
    ctx: ConfigurerContext,
    lister: Arc<dyn PushLister>,
}

impl PushConfigurer {
    /// Create a push configurer
    pub fn new(ctx: ConfigurerContext, lister: Arc<dyn PushLister>) -> Self {
        Self { ctx, lister }
    }
}

#[async_trait]
impl Configurer for PushConfigurer {
    fn kind(&self) -> TemplateKind {
        TemplateKind::Push
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

        let route = client
            .find_route_by_name(namespace, PUSH_ROUTE)
            .await?
            .ok_or_else(|| Error::not_found(format!("route {PUSH_ROUTE} in {namespace}")))?;
        let selector = label_selector(&[(NAME_LABEL, self.kind().canonical_name())]);
        let server = client
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
        let mut config_map = client
            .find_config_map_by_name(namespace, CLIENT_CONFIG_MAP)
            .await?
            .ok_or_else(|| Error::not_found(format!("config map {CLIENT_CONFIG_MAP} in {namespace}")))?;

        let base_url = route
            .base_url()
            .ok_or_else(|| Error::not_found(format!("host of route {PUSH_ROUTE}")))?;
        let user = server
            .env_value(ADMIN_USER_ENV)
            .ok_or_else(|| Error::not_found(format!("{ADMIN_USER_ENV} on {}", server.name())))?;
        let password = server
            .env_value(ADMIN_PASSWORD_ENV)
            .ok_or_else(|| Error::not_found(format!("{ADMIN_PASSWORD_ENV} on {}", server.name())))?;

        debug!(base_url = %base_url, "Listing push applications");
        let applications = self.lister.list_applications(&base_url, user, password).await?;
        let by_name: BTreeMap<&str, &PushApplication> =
            applications.iter().map(|a| (a.name.as_str(), a)).collect();
        config_map
            .data
            .get_or_insert_with(BTreeMap::new)
            .insert(CLIENT_CONFIG_KEY.to_string(), serde_json::to_string(&by_name)?);
        client.update_config_map(namespace, &config_map).await?;

        info!(namespace = %namespace, workload = %workload.name(), applications = applications.len(), "Configured push");
        publish_or_log(
            self.ctx.publisher.as_ref(),
            &self.ctx.status_key,
            Phase::InProgress,
            &format!("push configuration shared with {} application(s)", applications.len()),
        )
        .await;

        let service_host = service.metadata.name.unwrap_or_default();
        Ok(WorkloadPatch::new()
            .upsert_env("UPS_SERVICE_HOST", service_host)
            .upsert_env("UPS_CONFIG_PATH", format!("{CONFIG_MOUNT_PATH}/{CLIENT_CONFIG_KEY}"))
            .mount_config_map(CONFIG_VOLUME, CLIENT_CONFIG_MAP, CONFIG_MOUNT_PATH))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockClient;
    use crate::configure::test_support::{cloudapp, context, env, service, supporting};
    use crate::objects::Route;
    use k8s_openapi::api::core::v1::ConfigMap;
    use serde_json::json;
    use std::sync::Mutex;

    fn route(tls: bool) -> Route {
        let mut spec = json!({"host": "push.example.com", "to": {"kind": "Service", "name": "ups"}});
        if tls {
            spec["tls"] = json!({"termination": "edge"});
        }
        serde_json::from_value(json!({"metadata": {"name": "push-ups"}, "spec": spec})).unwrap()
    }

    fn push_server() -> DeploymentConfig {
        supporting(
            "push-ups",
            "push-ups",
            json!([
                {"name": "UPS_ADMIN_USER", "value": "admin"},
                {"name": "UPS_ADMIN_PASSWORD", "value": "secret"}
            ]),
        )
    }

    fn cluster(tls: bool, written: Arc<Mutex<Option<ConfigMap>>>) -> MockClient {
        let mut client = MockClient::new();
        client
            .expect_find_route_by_name()
            .returning(move |_, _| Ok(Some(route(tls))));
        client
            .expect_find_deployment_configs_by_label()
            .withf(|_, selector| selector == "rhmap/name=push-ups")
            .returning(|_, _| Ok(vec![push_server()]));
        client
            .expect_find_services_by_label()
            .returning(|_, _| Ok(vec![service("ups", "push-ups")]));
        client.expect_find_config_map_by_name().returning(|_, name| {
            Ok(Some(serde_json::from_value(json!({"metadata": {"name": name}, "data": {"config.json": "{}"}})).unwrap()))
        });
        client
            .expect_update_config_map()
            .times(1)
            .returning(move |_, cm| {
                *written.lock().unwrap() = Some(cm.clone());
                Ok(cm.clone())
            });
        client
    }

    fn lister(expected_url: &'static str) -> MockPushLister {
        let mut lister = MockPushLister::new();
        lister
            .expect_list_applications()
            .withf(move |url, user, password| url == expected_url && user == "admin" && password == "secret")
            .times(1)
            .returning(|_, _, _| {
                Ok(vec![PushApplication {
                    push_application_id: "app-1".to_string(),
                    master_secret: "m".to_string(),
                    name: "shop".to_string(),
                }])
            });
        lister
    }

    #[tokio::test]
    async fn writes_the_application_list_and_mounts_it() {
        let written = Arc::new(Mutex::new(None));
        let configurer = PushConfigurer::new(context(), Arc::new(lister("https://push.example.com")));
        let mut workload = cloudapp(json!([]));

        let patch = configurer
            .configure(Arc::new(cluster(true, written.clone())), &workload, "test")
            .await
            .unwrap();
        patch.apply(&mut workload);

        let cm = written.lock().unwrap().clone().unwrap();
        let config: serde_json::Value =
            serde_json::from_str(&cm.data.unwrap()[CLIENT_CONFIG_KEY]).unwrap();
        assert_eq!(config["shop"]["pushApplicationID"], "app-1");
        assert_eq!(config["shop"]["masterSecret"], "m");

        assert_eq!(env(&workload, "UPS_SERVICE_HOST").as_deref(), Some("ups"));
        assert_eq!(env(&workload, "UPS_CONFIG_PATH").as_deref(), Some("/etc/push/config.json"));
        assert_eq!(workload.volumes().len(), 1);
        assert_eq!(workload.volumes()[0].name, CONFIG_VOLUME);
        let mounts = workload.containers()[0].volume_mounts.as_ref().unwrap();
        assert_eq!(mounts[0].mount_path, CONFIG_MOUNT_PATH);
    }

    #[tokio::test]
    async fn plain_http_route_without_tls() {
        let written = Arc::new(Mutex::new(None));
        let configurer = PushConfigurer::new(context(), Arc::new(lister("http://push.example.com")));

        configurer
            .configure(Arc::new(cluster(false, written)), &cloudapp(json!([])), "test")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn missing_config_map_is_fatal() {
        let mut client = MockClient::new();
        client
            .expect_find_route_by_name()
            .returning(|_, _| Ok(Some(route(true))));
        client
            .expect_find_deployment_configs_by_label()
            .returning(|_, _| Ok(vec![push_server()]));
        client
            .expect_find_services_by_label()
            .returning(|_, _| Ok(vec![service("ups", "push-ups")]));
        client.expect_find_config_map_by_name().returning(|_, _| Ok(None));
        client.expect_update_config_map().never();

        let mut lister = MockPushLister::new();
        lister.expect_list_applications().never();

        let err = PushConfigurer::new(context(), Arc::new(lister))
            .configure(Arc::new(client), &cloudapp(json!([])), "test")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn lister_failure_is_fatal() {
        let mut client = MockClient::new();
        client
            .expect_find_route_by_name()
            .returning(|_, _| Ok(Some(route(true))));
        client
            .expect_find_deployment_configs_by_label()
            .returning(|_, _| Ok(vec![push_server()]));
        client
            .expect_find_services_by_label()
            .returning(|_, _| Ok(vec![service("ups", "push-ups")]));
        client.expect_find_config_map_by_name().returning(|_, name| {
            Ok(Some(serde_json::from_value(json!({"metadata": {"name": name}})).unwrap()))
        });
        client.expect_update_config_map().never();

        let mut lister = MockPushLister::new();
        lister
            .expect_list_applications()
            .returning(|_, _, _| Err(Error::transient("push server login failed: timed out")));

        let err = PushConfigurer::new(context(), Arc::new(lister))
            .configure(Arc::new(client), &cloudapp(json!([])), "test")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transient(_)));
    }

    #[tokio::test]
    async fn skips_the_push_server_itself() {
        let mut lister = MockPushLister::new();
        lister.expect_list_applications().never();

        let patch = PushConfigurer::new(context(), Arc::new(lister))
            .configure(Arc::new(MockClient::new()), &push_server(), "test")
            .await
            .unwrap();
        assert!(patch.is_empty());
    }
}
