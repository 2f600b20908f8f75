//! Deploy request payload
//!
//! A payload is validated against the template kind it targets, then bound
//! into the template as the render context.

mod options;

use std::collections::BTreeMap;

use minijinja::{context, Value};
use serde::{Deserialize, Serialize};

pub use options::{is_quantity, TemplateOptions, DEFAULT_CACHE_MEMORY, DEFAULT_STORAGE};

use crate::template::TemplateKind;
use crate::{Error, Result, GUID_LABEL, NAME_LABEL};

fn default_replicas() -> i32 {
    1
}

/// A request to deploy or update one template
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payload {
    /// Name of the deployed service within the namespace
    #[serde(default)]
    pub service_name: String,
    /// Optional route host hint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
    /// Project identifier
    #[serde(default, rename = "projectGUID")]
    pub project_guid: String,
    /// Cloud app identifier
    #[serde(default, rename = "cloudAppGUID")]
    pub cloud_app_guid: String,
    /// Environment tag
    #[serde(default)]
    pub env: String,
    /// Domain
    #[serde(default)]
    pub domain: String,
    /// Replica count
    #[serde(default = "default_replicas")]
    pub replicas: i32,
    /// Extra environment variables for the workload
    #[serde(default)]
    pub env_vars: Vec<PayloadEnvVar>,
    /// Source repository; required for cloud apps
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<Repo>,
    /// Cluster to deploy into
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Target>,
    /// Free-form options, interpreted per template kind
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, serde_json::Value>,
}

/// Environment variable in a payload
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadEnvVar {
    /// Name
    pub name: String,
    /// Value
    #[serde(default)]
    pub value: String,
}

/// Source repository
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repo {
    /// Clone URL
    #[serde(default)]
    pub loc: String,
    /// Git ref to build
    #[serde(default, rename = "ref")]
    pub git_ref: String,
    /// Credentials for private repositories
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<RepoAuth>,
}

/// Repository credentials
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoAuth {
    /// Credential type
    #[serde(rename = "type")]
    pub mode: AuthMode,
    /// User name (basic auth)
    #[serde(default)]
    pub user: String,
    /// Password or private key
    #[serde(default)]
    pub key: String,
}

/// Repository credential type
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// User name and password
    Basic,
    /// SSH private key
    Ssh,
}

/// Cluster to deploy into
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// API server URL
    pub host: String,
    /// Bearer token
    pub token: String,
}

impl Payload {
    /// Check the payload against the template it targets
    ///
    /// Succeeds iff a target is present, the service name is non-empty and,
    /// for cloud apps, the repo has a location and a ref. `kind` is `None`
    /// for templates outside the known kinds; only the common checks apply.
    pub fn validate(&self, kind: Option<TemplateKind>) -> Result<()> {
        match &self.target {
            Some(t) if !t.host.trim().is_empty() => {}
            Some(_) => return Err(Error::invalid("target.host is required")),
            None => return Err(Error::invalid("target is required")),
        }
        if self.service_name.trim().is_empty() {
            return Err(Error::invalid("serviceName is required"));
        }
        if kind.is_some_and(TemplateKind::is_application) {
            let Some(repo) = &self.repo else {
                return Err(Error::invalid("repo is required for a cloud app"));
            };
            if repo.loc.trim().is_empty() {
                return Err(Error::invalid("repo.loc is required for a cloud app"));
            }
            if repo.git_ref.trim().is_empty() {
                return Err(Error::invalid("repo.ref is required for a cloud app"));
            }
        }
        Ok(())
    }

    /// The cluster target
    pub fn target(&self) -> Result<&Target> {
        self.target
            .as_ref()
            .ok_or_else(|| Error::invalid("target is required"))
    }

    /// Typed options for `kind`
    pub fn options_for(&self, kind: TemplateKind) -> Result<TemplateOptions> {
        TemplateOptions::parse(kind, &self.options)
    }

    /// Label used to find objects this payload deployed before
    ///
    /// The cloud app GUID when set, otherwise the service name.
    pub fn lookup_label(&self) -> (&'static str, &str) {
        if self.cloud_app_guid.is_empty() {
            (NAME_LABEL, self.service_name.as_str())
        } else {
            (GUID_LABEL, self.cloud_app_guid.as_str())
        }
    }

    /// Payload for deploying a dependency template on behalf of this one
    ///
    /// The dependency is named after its template and is not tied to this
    /// payload's cloud app, route or env vars.
    pub fn for_dependency(&self, dependency: &str) -> Payload {
        Payload {
            service_name: dependency.to_string(),
            route: None,
            cloud_app_guid: String::new(),
            env_vars: Vec::new(),
            repo: None,
            ..self.clone()
        }
    }

    /// Render context for a template
    pub fn render_context(&self, namespace: &str, options: Option<&TemplateOptions>) -> Value {
        let options = options.map(TemplateOptions::to_context).unwrap_or_else(|| context! {});
        context! {
            serviceName => &self.service_name,
            route => self.route.as_deref().unwrap_or_default(),
            projectGUID => &self.project_guid,
            cloudAppGUID => &self.cloud_app_guid,
            env => &self.env,
            domain => &self.domain,
            replicas => self.replicas,
            envVars => &self.env_vars,
            repo => &self.repo,
            namespace => namespace,
            options => options,
        }
    }
}
