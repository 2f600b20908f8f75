//! Deploying the templates a template depends on
//!
//! Dependencies are named in the template's `dependencies` annotation. One
//! is deployed only when no workload labelled with its name exists in the
//! namespace yet, and at most once per request.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info};

use super::{Dispatched, Dispatcher};
use crate::client::Client;
use crate::objects::label_selector;
use crate::payload::Payload;
use crate::template::{canonical_template_name, Template};
use crate::{Error, NAME_LABEL};

/// Deepest chain of dependencies followed from one request
pub const MAX_DEPENDENCY_DEPTH: usize = 4;

/// A dependency failed to deploy
///
/// `deployed` holds the dependencies that were dispatched before the
/// failure; they are left in place.
#[derive(Debug, thiserror::Error)]
#[error("dependency {dependency} failed: {source}")]
pub struct DependencyError {
    /// Dependency that failed
    pub dependency: String,
    /// Dependencies dispatched before the failure
    pub deployed: Vec<Dispatched>,
    /// Underlying error
    #[source]
    pub source: Error,
}

impl Dispatcher {
    /// Deploy every missing dependency of `template`, in annotation order
    pub(super) async fn deploy_dependencies(
        &self,
        client: &Arc<dyn Client>,
        template: &Template,
        namespace: &str,
        payload: &Payload,
        depth: usize,
        seen: &mut BTreeSet<String>,
    ) -> Result<Vec<Dispatched>, DependencyError> {
        let mut deployed = Vec::new();
        for dependency in template.dependencies() {
            let dependency = canonical_template_name(&dependency);
            if !seen.insert(dependency.clone()) {
                debug!(template = %template.name, dependency = %dependency, "Dependency already handled");
                continue;
            }

            let fail = |deployed: Vec<Dispatched>, source: Error| DependencyError {
                dependency: dependency.clone(),
                deployed,
                source,
            };

            if depth + 1 > MAX_DEPENDENCY_DEPTH {
                return Err(fail(
                    deployed,
                    Error::invalid(format!(
                        "dependencies of {} nest deeper than {MAX_DEPENDENCY_DEPTH}",
                        template.name
                    )),
                ));
            }

            let selector = label_selector(&[(NAME_LABEL, dependency.as_str())]);
            let existing = match client.find_deployment_configs_by_label(namespace, &selector).await {
                Ok(existing) => existing,
                Err(e) => return Err(fail(deployed, e)),
            };
            if !existing.is_empty() {
                debug!(dependency = %dependency, namespace = %namespace, "Dependency already deployed");
                continue;
            }

            info!(template = %template.name, dependency = %dependency, namespace = %namespace, "Deploying dependency");
            let dependency_payload = payload.for_dependency(&dependency);
            match self
                .dispatch_at(client, &dependency, namespace, &dependency_payload, depth + 1, seen)
                .await
            {
                Ok(dispatched) => deployed.push(dispatched),
                Err(e) => return Err(fail(deployed, e)),
            }
        }
        Ok(deployed)
    }
}
