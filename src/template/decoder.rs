//! Decoding rendered templates into object graphs

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::error::TemplateError;
use super::kind::TemplateKind;
use crate::objects::ClusterObject;
use crate::{DEPENDENCIES_ANNOTATION, NAME_LABEL};

/// Annotation holding the human-readable description
pub const DESCRIPTION_ANNOTATION: &str = "description";

/// A rendered and decoded template
#[derive(Clone, Debug)]
pub struct Template {
    /// Template name
    pub name: String,
    /// Kind, from the `rhmap/name` label or the template name
    pub kind: Option<TemplateKind>,
    /// Template-level labels
    pub labels: BTreeMap<String, String>,
    /// Template-level annotations
    pub annotations: BTreeMap<String, String>,
    /// Ordered object graph
    pub objects: Vec<ClusterObject>,
    raw: serde_json::Value,
}

impl Template {
    /// Description annotation, or empty
    pub fn description(&self) -> &str {
        self.annotations
            .get(DESCRIPTION_ANNOTATION)
            .map(String::as_str)
            .unwrap_or_default()
    }

    /// Templates this one depends on
    ///
    /// The `dependencies` annotation is whitespace separated. Entries are
    /// trimmed and lowercased, empty and `,` entries dropped, and repeats
    /// removed keeping first occurrence.
    pub fn dependencies(&self) -> Vec<String> {
        let Some(raw) = self.annotations.get(DEPENDENCIES_ANNOTATION) else {
            return Vec::new();
        };
        let mut deps: Vec<String> = Vec::new();
        for entry in raw.split_whitespace() {
            let dep = entry.trim().to_lowercase();
            if dep.is_empty() || dep == "," || deps.contains(&dep) {
                continue;
            }
            deps.push(dep);
        }
        deps
    }

    /// Look up a JSON-pointer path (e.g. `/metadata/labels/rhmap~1name`) in
    /// the decoded document
    pub fn find(&self, path: &str) -> Option<&serde_json::Value> {
        self.raw.pointer(path)
    }

    /// Metadata summary for listings
    pub fn summary(&self) -> TemplateSummary {
        TemplateSummary {
            name: self.name.clone(),
            description: self.description().to_string(),
            labels: self.labels.clone(),
            depends_on: self.dependencies(),
        }
    }
}

/// Look up a JSON-pointer path in a decoded template
pub fn find_in_template<'a>(template: &'a Template, path: &str) -> Option<&'a serde_json::Value> {
    template.find(path)
}

/// Template metadata as listed over HTTP
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateSummary {
    /// Template name
    pub name: String,
    /// Description
    pub description: String,
    /// Template-level labels
    pub labels: BTreeMap<String, String>,
    /// Templates that must exist first
    pub depends_on: Vec<String>,
}

#[derive(Deserialize)]
struct TemplateDocument {
    #[serde(default)]
    metadata: TemplateMetadata,
    #[serde(default)]
    objects: Vec<serde_json::Value>,
}

#[derive(Default, Deserialize)]
struct TemplateMetadata {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    labels: BTreeMap<String, String>,
    #[serde(default)]
    annotations: BTreeMap<String, String>,
}

/// Decodes rendered template bytes into a [`Template`]
#[derive(Clone, Copy, Debug, Default)]
pub struct TemplateDecoder;

impl TemplateDecoder {
    /// Decode rendered bytes
    pub fn decode(&self, bytes: &[u8]) -> Result<Template, TemplateError> {
        let raw: serde_json::Value = serde_json::from_slice(bytes)?;
        let doc: TemplateDocument = serde_json::from_value(raw.clone())?;

        let name = doc.metadata.name.unwrap_or_default();
        let kind = doc
            .metadata
            .labels
            .get(NAME_LABEL)
            .and_then(|n| TemplateKind::parse(n))
            .or_else(|| TemplateKind::parse(&name));

        let objects = doc
            .objects
            .into_iter()
            .map(ClusterObject::from_value)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Template {
            name,
            kind,
            labels: doc.metadata.labels,
            annotations: doc.metadata.annotations,
            objects,
            raw,
        })
    }
}
