//! Templates: loading, rendering and decoding
//!
//! A template is a JSON document with Jinja placeholders. Rendering binds a
//! payload into it as text; decoding turns the text into an ordered object
//! graph. The two steps are separate so that decode failures and render
//! failures can both be reported as an invalid template with their own
//! message.
//!
//! Helpers available inside templates:
//! - `isset(map, key)`, `genPass(len)`, `isEnd(index, len)`
//! - `value | json` for JSON literals

mod decoder;
mod engine;
mod error;
mod functions;
mod kind;
mod loader;

use std::sync::Arc;

use minijinja::Value;

pub use decoder::{find_in_template, Template, TemplateDecoder, TemplateSummary};
pub use engine::TemplateEngine;
pub use error::TemplateError;
pub use functions::generate_password;
pub use kind::{canonical_template_name, is_job_template, TemplateKind};
pub use loader::{FileTemplateLoader, RawTemplate, TemplateLoader};

use crate::{Error, Result};

/// Template set with its rendering machinery
pub struct Templates {
    loader: Arc<dyn TemplateLoader>,
    engine: TemplateEngine,
    listing_engine: TemplateEngine,
    decoder: TemplateDecoder,
}

impl Templates {
    /// Wrap a loader
    pub fn new(loader: Arc<dyn TemplateLoader>) -> Self {
        Self {
            loader,
            engine: TemplateEngine::new(),
            listing_engine: TemplateEngine::chainable(),
            decoder: TemplateDecoder,
        }
    }

    /// Whether a template with this name or alias exists
    pub fn exists(&self, name: &str) -> bool {
        self.loader.load(name).is_some()
    }

    /// Load, render and decode a template
    ///
    /// # Errors
    ///
    /// - `TemplateNotFound` when no template has this name
    /// - `InvalidTemplate` when rendering or decoding fails
    pub fn render(&self, name: &str, ctx: &Value) -> Result<Template> {
        let raw = self
            .loader
            .load(name)
            .ok_or_else(|| Error::template_not_found(name))?;

        let rendered = self
            .engine
            .render(&raw.source, ctx)
            .map_err(|e| Error::invalid_template(format!("{}: {}", raw.name, e)))?;

        let mut template = self
            .decoder
            .decode(rendered.as_bytes())
            .map_err(|e| Error::invalid_template(format!("{}: {}", raw.name, e)))?;
        if template.name.is_empty() {
            template.name = raw.name;
        }
        Ok(template)
    }

    /// Metadata of every deployable template
    ///
    /// Job templates are skipped. Templates are rendered without a payload,
    /// so placeholders come out empty.
    pub fn list(&self) -> Result<Vec<TemplateSummary>> {
        let ctx = minijinja::context! {};
        let mut summaries = Vec::new();
        for name in self.loader.names() {
            if is_job_template(&name) {
                continue;
            }
            let Some(raw) = self.loader.load(&name) else {
                continue;
            };
            let rendered = self
                .listing_engine
                .render(&raw.source, &ctx)
                .map_err(|e| Error::invalid_template(format!("{name}: {e}")))?;
            let mut template = self
                .decoder
                .decode(rendered.as_bytes())
                .map_err(|e| Error::invalid_template(format!("{name}: {e}")))?;
            if template.name.is_empty() {
                template.name = name;
            }
            summaries.push(template.summary());
        }
        Ok(summaries)
    }
}

/// Templates shipped in `templates/`, for tests
#[cfg(test)]
pub(crate) fn bundled() -> Templates {
    Templates::new(Arc::new(FileTemplateLoader::from_sources([
        ("cloudapp", include_str!("../../templates/cloudapp.json")),
        ("cache-redis", include_str!("../../templates/cache-redis.json")),
        ("data-mongo", include_str!("../../templates/data-mongo.json")),
        ("data-mysql", include_str!("../../templates/data-mysql.json")),
        ("push-ups", include_str!("../../templates/push-ups.json")),
        ("data-mongo-job", include_str!("../../templates/data-mongo-job.json")),
        ("data-mysql-job", include_str!("../../templates/data-mysql-job.json")),
    ])))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::ClusterObject;
    use minijinja::context;

    fn cache_ctx() -> Value {
        context! {
            serviceName => "cacheservice",
            namespace => "test",
            domain => "d",
            projectGUID => "g",
            cloudAppGUID => "g",
            env => "e",
            replicas => 1,
            envVars => vec![context! { name => "test", value => "test" }],
            options => context! { memory => "512Mi" },
        }
    }

    #[test]
    fn unknown_template_is_not_found() {
        let err = bundled().render("no-such-thing", &cache_ctx()).unwrap_err();
        assert!(matches!(err, Error::TemplateNotFound(_)));
    }

    #[test]
    fn cache_template_renders_workload_and_service() {
        let t = bundled().render("cache", &cache_ctx()).unwrap();
        assert_eq!(t.kind, Some(TemplateKind::Cache));

        let kinds: Vec<_> = t.objects.iter().map(ClusterObject::kind).collect();
        assert_eq!(kinds, vec!["DeploymentConfig", "Service"]);

        let ClusterObject::DeploymentConfig(dc) = &t.objects[0] else {
            panic!("expected DeploymentConfig first");
        };
        assert_eq!(dc.name(), "cacheservice");
        assert_eq!(dc.label(crate::NAME_LABEL), Some("cache-redis"));
        assert_eq!(dc.label(crate::TYPE_LABEL), Some(crate::ENVIRONMENT_SERVICE));
        assert_eq!(dc.env_value("test"), Some("test"));
    }

    #[test]
    fn render_errors_are_invalid_template() {
        let templates = Templates::new(Arc::new(FileTemplateLoader::from_sources([
            ("broken", "{{ missing }}"),
            ("not-json", "not json at all"),
        ])));
        assert!(matches!(
            templates.render("broken", &context! {}),
            Err(Error::InvalidTemplate(_))
        ));
        assert!(matches!(
            templates.render("not-json", &context! {}),
            Err(Error::InvalidTemplate(_))
        ));
    }

    #[test]
    fn listing_skips_job_templates_and_reads_metadata() {
        let list = bundled().list().unwrap();
        let names: Vec<&str> = list.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["cache-redis", "cloudapp", "data-mongo", "data-mysql", "push-ups"]
        );

        for summary in &list {
            assert!(!summary.description.is_empty(), "{} has no description", summary.name);
        }
        let cloudapp = list.iter().find(|s| s.name == "cloudapp").unwrap();
        assert!(cloudapp.depends_on.is_empty());
        let push = list.iter().find(|s| s.name == "push-ups").unwrap();
        assert_eq!(push.depends_on, vec!["data-mysql"]);
    }
}
