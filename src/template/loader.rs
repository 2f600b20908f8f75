//! Template sources
//!
//! Templates are read-only inputs: the file loader reads every `*.json`
//! under the template directory once at startup and serves them from
//! memory afterwards.

use std::collections::BTreeMap;
use std::path::Path;

use super::error::TemplateError;
use super::kind::canonical_template_name;

/// Extension of template files
const TEMPLATE_EXTENSION: &str = "json";

/// Unrendered template source
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawTemplate {
    /// Canonical template name
    pub name: String,
    /// Template text
    pub source: String,
}

/// Source of unrendered templates
pub trait TemplateLoader: Send + Sync {
    /// Load a template by canonical name or alias; `None` when unknown
    fn load(&self, name: &str) -> Option<RawTemplate>;

    /// Canonical names of every known template, sorted
    fn names(&self) -> Vec<String>;
}

/// Loader over `<dir>/<name>.json` files
#[derive(Clone, Debug, Default)]
pub struct FileTemplateLoader {
    templates: BTreeMap<String, String>,
}

impl FileTemplateLoader {
    /// Read every template file in `dir`
    pub async fn from_dir(dir: impl AsRef<Path>) -> Result<Self, TemplateError> {
        let dir = dir.as_ref();
        let mut entries = tokio::fs::read_dir(dir).await.map_err(|e| {
            TemplateError::Io(format!("read template dir {}: {}", dir.display(), e))
        })?;

        let mut templates = BTreeMap::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(TEMPLATE_EXTENSION) {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let source = tokio::fs::read_to_string(&path).await.map_err(|e| {
                TemplateError::Io(format!("read template {}: {}", path.display(), e))
            })?;
            templates.insert(name.to_string(), source);
        }

        tracing::info!(dir = %dir.display(), count = templates.len(), "Loaded templates");
        Ok(Self { templates })
    }

    /// Build a loader from in-memory `(name, source)` pairs
    pub fn from_sources<N, S>(sources: impl IntoIterator<Item = (N, S)>) -> Self
    where
        N: Into<String>,
        S: Into<String>,
    {
        Self {
            templates: sources
                .into_iter()
                .map(|(n, s)| (n.into(), s.into()))
                .collect(),
        }
    }
}

impl TemplateLoader for FileTemplateLoader {
    fn load(&self, name: &str) -> Option<RawTemplate> {
        let name = canonical_template_name(name);
        self.templates.get(&name).map(|source| RawTemplate {
            name,
            source: source.clone(),
        })
    }

    fn names(&self) -> Vec<String> {
        self.templates.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_by_canonical_name_or_alias() {
        let loader = FileTemplateLoader::from_sources([("cache-redis", "{}"), ("cloudapp", "[]")]);

        assert_eq!(loader.load("cache-redis").unwrap().source, "{}");
        let by_alias = loader.load("cache").unwrap();
        assert_eq!(by_alias.name, "cache-redis");
        assert!(loader.load("data-mongo").is_none());
        assert_eq!(loader.names(), vec!["cache-redis", "cloudapp"]);
    }

    #[tokio::test]
    async fn reads_json_files_from_a_directory() {
        let dir = std::env::temp_dir().join(format!("negotiator-templates-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(dir.join("cloudapp.json"), "{\"a\":1}").await.unwrap();
        tokio::fs::write(dir.join("README.md"), "ignored").await.unwrap();

        let loader = FileTemplateLoader::from_dir(&dir).await.unwrap();
        assert_eq!(loader.names(), vec!["cloudapp"]);
        assert_eq!(loader.load("application").unwrap().source, "{\"a\":1}");

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn missing_directory_is_an_io_error() {
        let err = FileTemplateLoader::from_dir("/nonexistent/negotiator/templates")
            .await
            .unwrap_err();
        assert!(matches!(err, TemplateError::Io(_)));
    }
}
