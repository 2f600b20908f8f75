//! Typed per-template options
//!
//! Requests carry a free-form `options` map. Each template kind declares the
//! options it understands; everything else is ignored.

use std::collections::BTreeMap;

use minijinja::{context, Value};

use crate::template::TemplateKind;
use crate::{Error, Result};

/// Default memory limit of the cache
pub const DEFAULT_CACHE_MEMORY: &str = "512Mi";

/// Default volume size of the data stores
pub const DEFAULT_STORAGE: &str = "1Gi";

const QUANTITY_SUFFIXES: [&str; 4] = ["Ki", "Mi", "Gi", "Ti"];

/// Options understood by one template kind
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TemplateOptions {
    /// Cloud app: no options
    CloudApp,
    /// Cache
    Cache {
        /// Memory limit, e.g. `512Mi`
        memory: String,
    },
    /// Document store
    DocumentStore {
        /// Volume size, e.g. `1Gi`
        storage: String,
        /// Replica set name; empty for a standalone server
        replica_set: String,
    },
    /// Relational store
    RelationalStore {
        /// Volume size, e.g. `1Gi`
        storage: String,
    },
    /// Push server: no options
    Push,
}

impl TemplateOptions {
    /// Parse the options map for `kind`
    ///
    /// # Errors
    ///
    /// `Invalid` when a recognised option has a malformed value.
    pub fn parse(kind: TemplateKind, raw: &BTreeMap<String, serde_json::Value>) -> Result<Self> {
        let known: &[&str] = match kind {
            TemplateKind::CloudApp | TemplateKind::Push => &[],
            TemplateKind::Cache => &["memory"],
            TemplateKind::DocumentStore => &["storage", "replicaSet"],
            TemplateKind::RelationalStore => &["storage"],
        };
        for key in raw.keys().filter(|k| !known.contains(&k.as_str())) {
            tracing::debug!(template = %kind, option = %key, "Ignoring unknown option");
        }

        let options = match kind {
            TemplateKind::CloudApp => Self::CloudApp,
            TemplateKind::Push => Self::Push,
            TemplateKind::Cache => Self::Cache {
                memory: quantity(raw, "memory", DEFAULT_CACHE_MEMORY)?,
            },
            TemplateKind::DocumentStore => Self::DocumentStore {
                storage: quantity(raw, "storage", DEFAULT_STORAGE)?,
                replica_set: replica_set(raw)?,
            },
            TemplateKind::RelationalStore => Self::RelationalStore {
                storage: quantity(raw, "storage", DEFAULT_STORAGE)?,
            },
        };
        Ok(options)
    }

    /// Options as seen by the template (`options.*`)
    pub fn to_context(&self) -> Value {
        match self {
            Self::CloudApp | Self::Push => context! {},
            Self::Cache { memory } => context! { memory => memory },
            Self::DocumentStore {
                storage,
                replica_set,
            } => context! { storage => storage, replicaSet => replica_set },
            Self::RelationalStore { storage } => context! { storage => storage },
        }
    }
}

fn option_string(raw: &BTreeMap<String, serde_json::Value>, key: &str) -> Result<Option<String>> {
    match raw.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s.trim().to_string())),
        Some(other) => Err(Error::invalid(format!(
            "option {key} must be a string, got {other}"
        ))),
    }
}

fn quantity(raw: &BTreeMap<String, serde_json::Value>, key: &str, default: &str) -> Result<String> {
    let Some(value) = option_string(raw, key)? else {
        return Ok(default.to_string());
    };
    if is_quantity(&value) {
        Ok(value)
    } else {
        Err(Error::invalid(format!(
            "option {key}={value} is not a size like 512Mi or 5Gi"
        )))
    }
}

fn replica_set(raw: &BTreeMap<String, serde_json::Value>) -> Result<String> {
    let value = option_string(raw, "replicaSet")?.unwrap_or_default();
    if value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        Ok(value)
    } else {
        Err(Error::invalid(format!(
            "option replicaSet={value} may only contain letters, digits, '-' and '_'"
        )))
    }
}

/// Whether `s` is `<digits>(Ki|Mi|Gi|Ti)`
pub fn is_quantity(s: &str) -> bool {
    QUANTITY_SUFFIXES.iter().any(|suffix| {
        s.strip_suffix(suffix)
            .is_some_and(|digits| !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()))
    })
}
