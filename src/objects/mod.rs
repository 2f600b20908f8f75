//! Cluster object variants
//!
//! A rendered template decodes into an ordered object graph: a sequence of
//! [`ClusterObject`]s that the dispatcher creates or updates in order.
//! Core kinds use the k8s-openapi types; OpenShift kinds are defined in
//! [`openshift`].

pub mod openshift;

use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{ConfigMap, PersistentVolumeClaim, Pod, Secret, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::Serialize;

pub use openshift::{
    Build, BuildConfig, BuildRequest, DeploymentConfig, ImageStream, Route, RouteTls,
};

use crate::template::TemplateError;

/// One object of an object graph
#[derive(Clone, Debug, PartialEq)]
pub enum ClusterObject {
    /// Workload controller
    DeploymentConfig(DeploymentConfig),
    /// Service
    Service(Service),
    /// Route
    Route(Route),
    /// Image stream
    ImageStream(ImageStream),
    /// Build config
    BuildConfig(BuildConfig),
    /// Secret
    Secret(Secret),
    /// Persistent volume claim
    PersistentVolumeClaim(PersistentVolumeClaim),
    /// Pod
    Pod(Pod),
    /// Config map
    ConfigMap(ConfigMap),
    /// One-shot job
    Job(Job),
}

impl ClusterObject {
    /// Decode one object from its JSON form, dispatching on `kind`
    pub fn from_value(value: serde_json::Value) -> Result<Self, TemplateError> {
        let kind = value
            .get("kind")
            .and_then(|k| k.as_str())
            .ok_or_else(|| TemplateError::decode("object without a kind"))?
            .to_string();

        let object = match kind.as_str() {
            "DeploymentConfig" => Self::DeploymentConfig(serde_json::from_value(value)?),
            "Service" => Self::Service(serde_json::from_value(value)?),
            "Route" => Self::Route(serde_json::from_value(value)?),
            "ImageStream" => Self::ImageStream(serde_json::from_value(value)?),
            "BuildConfig" => Self::BuildConfig(serde_json::from_value(value)?),
            "Secret" => Self::Secret(serde_json::from_value(value)?),
            "PersistentVolumeClaim" => Self::PersistentVolumeClaim(serde_json::from_value(value)?),
            "Pod" => Self::Pod(serde_json::from_value(value)?),
            "ConfigMap" => Self::ConfigMap(serde_json::from_value(value)?),
            "Job" => Self::Job(serde_json::from_value(value)?),
            other => {
                return Err(TemplateError::decode(format!(
                    "unsupported object kind {other}"
                )))
            }
        };
        Ok(object)
    }

    /// Kind name as it appears on the wire
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DeploymentConfig(_) => "DeploymentConfig",
            Self::Service(_) => "Service",
            Self::Route(_) => "Route",
            Self::ImageStream(_) => "ImageStream",
            Self::BuildConfig(_) => "BuildConfig",
            Self::Secret(_) => "Secret",
            Self::PersistentVolumeClaim(_) => "PersistentVolumeClaim",
            Self::Pod(_) => "Pod",
            Self::ConfigMap(_) => "ConfigMap",
            Self::Job(_) => "Job",
        }
    }

    /// Object metadata
    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            Self::DeploymentConfig(o) => &o.metadata,
            Self::Service(o) => &o.metadata,
            Self::Route(o) => &o.metadata,
            Self::ImageStream(o) => &o.metadata,
            Self::BuildConfig(o) => &o.metadata,
            Self::Secret(o) => &o.metadata,
            Self::PersistentVolumeClaim(o) => &o.metadata,
            Self::Pod(o) => &o.metadata,
            Self::ConfigMap(o) => &o.metadata,
            Self::Job(o) => &o.metadata,
        }
    }

    /// Object name, or empty when unset
    pub fn name(&self) -> &str {
        self.metadata().name.as_deref().unwrap_or_default()
    }
}

/// Convert a typed object into another serde shape, e.g. a `DynamicObject`
pub(crate) fn convert<T, U>(object: &T) -> Result<U, serde_json::Error>
where
    T: Serialize,
    U: serde::de::DeserializeOwned,
{
    serde_json::from_value(serde_json::to_value(object)?)
}

/// Whether an object's labels contain every `(key, value)` in `selector`
pub fn matches_labels(meta: &ObjectMeta, selector: &[(&str, &str)]) -> bool {
    let Some(labels) = meta.labels.as_ref() else {
        return selector.is_empty();
    };
    selector
        .iter()
        .all(|(k, v)| labels.get(*k).map(String::as_str) == Some(*v))
}

/// Render a label selector string, `k1=v1,k2=v2`
pub fn label_selector(selector: &[(&str, &str)]) -> String {
    selector
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    #[test]
    fn decodes_each_kind() {
        let cases = [
            json!({"apiVersion": "apps.openshift.io/v1", "kind": "DeploymentConfig", "metadata": {"name": "a"}}),
            json!({"apiVersion": "v1", "kind": "Service", "metadata": {"name": "b"}}),
            json!({"apiVersion": "route.openshift.io/v1", "kind": "Route", "metadata": {"name": "c"}, "spec": {"to": {"kind": "Service", "name": "b"}}}),
            json!({"apiVersion": "image.openshift.io/v1", "kind": "ImageStream", "metadata": {"name": "d"}}),
            json!({"apiVersion": "build.openshift.io/v1", "kind": "BuildConfig", "metadata": {"name": "e"}}),
            json!({"apiVersion": "v1", "kind": "Secret", "metadata": {"name": "f"}}),
            json!({"apiVersion": "v1", "kind": "PersistentVolumeClaim", "metadata": {"name": "g"}}),
            json!({"apiVersion": "v1", "kind": "Pod", "metadata": {"name": "h"}}),
            json!({"apiVersion": "v1", "kind": "ConfigMap", "metadata": {"name": "i"}}),
            json!({"apiVersion": "batch/v1", "kind": "Job", "metadata": {"name": "j"}}),
        ];

        let kinds: Vec<&str> = cases
            .into_iter()
            .map(|v| ClusterObject::from_value(v).unwrap())
            .map(|o| o.kind())
            .collect();
        assert_eq!(
            kinds,
            vec![
                "DeploymentConfig",
                "Service",
                "Route",
                "ImageStream",
                "BuildConfig",
                "Secret",
                "PersistentVolumeClaim",
                "Pod",
                "ConfigMap",
                "Job"
            ]
        );
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let err = ClusterObject::from_value(json!({"kind": "CronJob", "metadata": {}})).unwrap_err();
        assert!(err.to_string().contains("CronJob"));

        let err = ClusterObject::from_value(json!({"metadata": {}})).unwrap_err();
        assert!(err.to_string().contains("without a kind"));
    }

    #[test]
    fn name_comes_from_metadata() {
        let obj = ClusterObject::from_value(
            json!({"apiVersion": "v1", "kind": "Service", "metadata": {"name": "data-cache"}}),
        )
        .unwrap();
        assert_eq!(obj.name(), "data-cache");
    }

    #[test]
    fn label_matching() {
        let meta = ObjectMeta {
            labels: Some(BTreeMap::from([
                ("rhmap/name".to_string(), "data-mongo".to_string()),
                ("rhmap/type".to_string(), "environmentService".to_string()),
            ])),
            ..Default::default()
        };
        assert!(matches_labels(&meta, &[("rhmap/name", "data-mongo")]));
        assert!(!matches_labels(&meta, &[("rhmap/name", "data-mysql")]));
        assert!(!matches_labels(&ObjectMeta::default(), &[("rhmap/name", "x")]));
        assert_eq!(
            label_selector(&[("rhmap/name", "data-mongo"), ("rhmap/type", "environmentService")]),
            "rhmap/name=data-mongo,rhmap/type=environmentService"
        );
    }
}
