//! Template kinds
//!
//! Each deployable template has one canonical name, which is also the value
//! of the `rhmap/name` label on everything it creates, plus a descriptive
//! alias accepted wherever a kind is parsed.

use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Suffix shared by provisioning job templates
pub const JOB_TEMPLATE_SUFFIX: &str = "-job";

/// A deployable template kind
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TemplateKind {
    /// Code-built application
    CloudApp,
    /// Redis cache
    Cache,
    /// MongoDB document store
    DocumentStore,
    /// MySQL relational store
    RelationalStore,
    /// Push notification server
    Push,
}

impl TemplateKind {
    /// Every kind, in listing order
    pub const ALL: [TemplateKind; 5] = [
        TemplateKind::CloudApp,
        TemplateKind::Cache,
        TemplateKind::DocumentStore,
        TemplateKind::RelationalStore,
        TemplateKind::Push,
    ];

    /// Canonical template name and `rhmap/name` label value
    pub fn canonical_name(self) -> &'static str {
        match self {
            TemplateKind::CloudApp => "cloudapp",
            TemplateKind::Cache => "cache-redis",
            TemplateKind::DocumentStore => "data-mongo",
            TemplateKind::RelationalStore => "data-mysql",
            TemplateKind::Push => "push-ups",
        }
    }

    /// Descriptive alias
    pub fn alias(self) -> &'static str {
        match self {
            TemplateKind::CloudApp => "application",
            TemplateKind::Cache => "cache",
            TemplateKind::DocumentStore => "document-store",
            TemplateKind::RelationalStore => "relational-store",
            TemplateKind::Push => "push-service",
        }
    }

    /// Parse a canonical name or alias
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|k| k.canonical_name().eq_ignore_ascii_case(name) || k.alias().eq_ignore_ascii_case(name))
    }

    /// Whether this template builds from source
    pub fn is_application(self) -> bool {
        self == TemplateKind::CloudApp
    }

    /// Whether this template is a supporting service other workloads bind to
    pub fn is_supporting_service(self) -> bool {
        !self.is_application()
    }
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical_name())
    }
}

impl FromStr for TemplateKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| Error::unsupported_kind(s))
    }
}

/// Resolve an alias to its canonical template name; other names pass through
pub fn canonical_template_name(name: &str) -> String {
    match TemplateKind::parse(name) {
        Some(kind) => kind.canonical_name().to_string(),
        None => name.trim().to_string(),
    }
}

/// Whether a template name refers to a provisioning job template
pub fn is_job_template(name: &str) -> bool {
    name.ends_with(JOB_TEMPLATE_SUFFIX)
}
