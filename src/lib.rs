//! Negotiator - deploys cloud apps and supporting services into a cluster
//!
//! A deploy request names a template and a target namespace. The negotiator
//! renders the template with the request payload, creates or updates the
//! resulting object graph through the cluster API, and then reconciles the
//! environment so the new workload is wired to every supporting service
//! (cache, document store, relational store, push) already running beside it.
//!
//! # Modules
//!
//! - [`payload`] - Deploy request, typed options and validation
//! - [`template`] - Template loading, rendering and decoding
//! - [`objects`] - Cluster object variants that make up an object graph
//! - [`client`] - Cluster client capability and its kube implementation
//! - [`dispatch`] - Create-or-update of an object graph, dependency resolution
//! - [`configure`] - Configurers and the environment controller
//! - [`status`] - Status publishers and the stores behind them
//! - [`api`] - HTTP surface
//! - [`config`] - Environment knobs
//! - [`telemetry`] - Logging setup
//! - [`error`] - Error types

#![deny(missing_docs)]

pub mod api;
pub mod client;
pub mod config;
pub mod configure;
pub mod dispatch;
pub mod error;
pub mod objects;
pub mod payload;
pub mod status;
pub mod telemetry;
pub mod template;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Label Conventions
// =============================================================================
// Labels are the wire format that ties objects to the template and the
// cloud app that produced them. Supporting services are discovered by them.

/// Label carrying the canonical template/service kind name
pub const NAME_LABEL: &str = "rhmap/name";

/// Label carrying the cloud app GUID
pub const GUID_LABEL: &str = "rhmap/guid";

/// Label marking a workload as a supporting service
pub const TYPE_LABEL: &str = "rhmap/type";

/// Value of [`TYPE_LABEL`] on supporting services
pub const ENVIRONMENT_SERVICE: &str = "environmentService";

/// Template annotation listing templates that must exist first
pub const DEPENDENCIES_ANNOTATION: &str = "dependencies";

/// Default seconds to wait for a supporting service to become ready
pub const DEFAULT_DEPENDENCY_TIMEOUT_SECS: u64 = 600;
