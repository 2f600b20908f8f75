//! Text templating
//!
//! Templates are JSON documents with Jinja placeholders (`{{ ... }}`,
//! `{% ... %}`). Rendering only produces text; turning that text into
//! cluster objects is the decoder's job.

use minijinja::{Environment, UndefinedBehavior, Value};

use super::error::TemplateError;
use super::functions;

/// Template engine for payload interpolation
///
/// Supports:
/// - strict undefined handling for deploys, chainable for metadata listing
/// - functions `isset`, `genPass`, `isEnd`
/// - filter `json`
pub struct TemplateEngine {
    env: Environment<'static>,
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateEngine {
    /// Create an engine that fails on any undefined value
    pub fn new() -> Self {
        Self::with_undefined(UndefinedBehavior::Strict)
    }

    /// Create an engine that renders undefined values as empty
    ///
    /// Used to read template metadata without a payload.
    pub fn chainable() -> Self {
        Self::with_undefined(UndefinedBehavior::Chainable)
    }

    fn with_undefined(behavior: UndefinedBehavior) -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(behavior);

        env.add_function("isset", functions::isset);
        env.add_function("genPass", functions::gen_pass);
        env.add_function("isEnd", functions::is_end);
        env.add_filter("json", functions::json);

        Self { env }
    }

    /// Render a template source with the given context
    ///
    /// # Errors
    ///
    /// Returns `TemplateError::Render` if the syntax is invalid, a referenced
    /// variable is undefined (strict engine), or a function fails.
    pub fn render(&self, source: &str, ctx: &Value) -> Result<String, TemplateError> {
        Ok(self.env.render_str(source, ctx)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use minijinja::context;

    #[test]
    fn test_render_variables() {
        let engine = TemplateEngine::new();
        let ctx = context! { serviceName => "cacheservice" };
        assert_eq!(
            engine.render("name={{ serviceName }}", &ctx).unwrap(),
            "name=cacheservice"
        );
    }

    #[test]
    fn test_strict_engine_rejects_undefined() {
        let engine = TemplateEngine::new();
        let ctx = context! {};
        assert!(engine.render("{{ serviceName }}", &ctx).is_err());
    }

    #[test]
    fn test_chainable_engine_tolerates_undefined() {
        let engine = TemplateEngine::chainable();
        let ctx = context! {};
        assert_eq!(engine.render("[{{ repo.loc }}]", &ctx).unwrap(), "[]");
        assert_eq!(engine.render("{{ replicas | json }}", &ctx).unwrap(), "null");
    }

    #[test]
    fn test_helpers_are_registered() {
        let engine = TemplateEngine::new();
        let ctx = context! {
            options => context! { storage => "5Gi" },
            envVars => vec!["a", "b"],
        };

        assert_eq!(
            engine
                .render(r#"{% if isset(options, "storage") %}yes{% endif %}"#, &ctx)
                .unwrap(),
            "yes"
        );
        assert_eq!(
            engine
                .render(
                    "{% for e in envVars %}{{ e }}{% if not isEnd(loop.index0, loop.length) %},{% endif %}{% endfor %}",
                    &ctx
                )
                .unwrap(),
            "a,b"
        );
        assert_eq!(engine.render("{{ genPass(12) }}", &ctx).unwrap().len(), 12);
    }
}
