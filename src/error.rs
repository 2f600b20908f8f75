//! Error types for the deployment negotiator

use thiserror::Error;

use crate::configure::ConfigureFailures;
use crate::status::StoreError;
use crate::template::TemplateError;

/// Main error type for negotiator operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Payload or template preconditions unmet
    #[error("invalid: {0}")]
    Invalid(String),

    /// The requested template does not exist
    #[error("template not found: {0}")]
    TemplateNotFound(String),

    /// A cluster object required by the operation is absent
    #[error("not found: {0}")]
    NotFound(String),

    /// Rendering or decoding a template failed
    #[error("invalid template: {0}")]
    InvalidTemplate(String),

    /// Watch/stream failure or timeout waiting on a dependency
    #[error("transient error: {0}")]
    Transient(String),

    /// Cluster API rejected an operation, with context
    #[error("cluster error: {0}")]
    Cluster(String),

    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// No configurer exists for a supporting service kind
    #[error("unsupported service kind: {0}")]
    UnsupportedKind(String),

    /// Status store error
    #[error(transparent)]
    Store(#[from] StoreError),

    /// One or more configurers failed during environment configuration
    #[error(transparent)]
    Configure(#[from] ConfigureFailures),

    /// Anything else that is a bug or an environment failure
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an invalid-input error with the given message
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }

    /// Create a template-not-found error for the given template name
    pub fn template_not_found(name: impl Into<String>) -> Self {
        Self::TemplateNotFound(name.into())
    }

    /// Create a not-found error with the given message
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an invalid-template error with the given message
    pub fn invalid_template(msg: impl Into<String>) -> Self {
        Self::InvalidTemplate(msg.into())
    }

    /// Create a transient error with the given message
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    /// Create a cluster error with the given message
    pub fn cluster(msg: impl Into<String>) -> Self {
        Self::Cluster(msg.into())
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create an unsupported-kind error for the given kind
    pub fn unsupported_kind(kind: impl Into<String>) -> Self {
        Self::UnsupportedKind(kind.into())
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error was caused by the caller's input rather than the system
    pub fn is_caller_error(&self) -> bool {
        matches!(self, Error::Invalid(_) | Error::TemplateNotFound(_))
    }
}

impl From<TemplateError> for Error {
    fn from(e: TemplateError) -> Self {
        Self::InvalidTemplate(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==========================================================================
    // Story Tests: Error Propagation Through a Deployment
    // ==========================================================================
    //
    // A deploy request can fail at validation, template lookup, rendering,
    // while writing objects, or later while configuring the environment.
    // Each stage maps onto one variant so the HTTP layer and the status
    // stream can report it consistently.

    /// Story: Validation rejects a request before anything touches the cluster
    #[test]
    fn story_invalid_payload_is_a_caller_error() {
        let err = Error::invalid("serviceName is required");
        assert!(err.to_string().contains("invalid"));
        assert!(err.to_string().contains("serviceName"));
        assert!(err.is_caller_error());

        match Error::invalid("any message") {
            Error::Invalid(msg) => assert_eq!(msg, "any message"),
            _ => panic!("Expected Invalid variant"),
        }
    }

    /// Story: An unknown template name is reported distinctly from other misses
    #[test]
    fn story_unknown_template_is_distinct_from_missing_objects() {
        let err = Error::template_not_found("no-such-template");
        assert!(err.to_string().contains("template not found"));
        assert!(err.is_caller_error());

        let err = Error::not_found("service labelled rhmap/name=data-mongo");
        assert!(err.to_string().contains("not found"));
        assert!(!err.is_caller_error());
    }

    /// Story: Failures after the request was accepted are system errors
    #[test]
    fn story_system_failures_are_not_caller_errors() {
        for err in [
            Error::invalid_template("expected value at line 1 column 1"),
            Error::transient("timed out waiting for data-mongo"),
            Error::cluster("create DeploymentConfig cloudapp: conflict"),
            Error::serialization("missing field kind"),
            Error::unsupported_kind("elastic"),
            Error::internal("task panicked"),
        ] {
            assert!(!err.is_caller_error(), "{err} should not be a caller error");
        }
    }

    /// Story: JSON failures convert into serialization errors with `?`
    #[test]
    fn story_json_errors_convert() {
        fn parse(s: &str) -> crate::Result<serde_json::Value> {
            Ok(serde_json::from_str(s)?)
        }

        match parse("{not json") {
            Err(Error::Serialization(msg)) => assert!(!msg.is_empty()),
            other => panic!("Expected Serialization, got {other:?}"),
        }
    }

    /// Story: Error helper functions accept both String and &str
    #[test]
    fn story_error_construction_ergonomics() {
        let ns = "test";
        let err = Error::cluster(format!("list deploymentconfigs in {ns}"));
        assert!(err.to_string().contains("test"));

        let err = Error::unsupported_kind("elastic");
        assert_eq!(err.to_string(), "unsupported service kind: elastic");
    }
}
