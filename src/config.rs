//! Service configuration
//!
//! Every setting is a command line flag that can also be set through the
//! environment variable named next to it.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::configure::{ConfigureSettings, DEFAULT_CACHE_HOST};
use crate::payload::Target;
use crate::DEFAULT_DEPENDENCY_TIMEOUT_SECS;

/// Negotiator - deploys cloud apps and wires them to their supporting services
#[derive(Parser, Debug, Clone)]
#[command(name = "negotiator", version, about, long_about = None)]
pub struct Config {
    /// Directory holding `<name>.json` templates
    #[arg(long, env = "TEMPLATE_DIR", default_value = "./templates")]
    pub template_dir: PathBuf,

    /// Cluster API used for template listings without `X-RHMAP-HOST`
    #[arg(long, env = "API_HOST")]
    pub api_host: Option<String>,

    /// Bearer token for `API_HOST`
    #[arg(long, env = "API_TOKEN", hide_env_values = true)]
    pub api_token: Option<String>,

    /// Redis host for durable status; an in-process store is used when unset
    #[arg(long, env = "REDIS_SERVICE_HOST")]
    pub redis_host: Option<String>,

    /// Redis port
    #[arg(long, env = "REDIS_SERVICE_PORT", default_value_t = 6379)]
    pub redis_port: u16,

    /// Redis password
    #[arg(long, env = "REDIS_SERVICE_PASSWORD", hide_env_values = true)]
    pub redis_password: Option<String>,

    /// Namespace listed when a template listing names none
    #[arg(long, env = "DEPLOY_NAMESPACE")]
    pub deploy_namespace: Option<String>,

    /// Seconds to wait for a supporting service to become ready
    #[arg(long, env = "DEPENDENCY_TIMEOUT", default_value_t = DEFAULT_DEPENDENCY_TIMEOUT_SECS)]
    pub dependency_timeout_secs: u64,

    /// Shared secret expected in `X-AUTH`; requests are not checked when unset
    #[arg(long, env = "AUTH_KEY", hide_env_values = true)]
    pub auth_key: Option<String>,

    /// Address the HTTP server binds to
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:3000")]
    pub listen_addr: SocketAddr,

    /// Value written into `FH_REDIS_HOST` of cloud apps
    #[arg(long, env = "CACHE_HOST", default_value = DEFAULT_CACHE_HOST)]
    pub cache_host: String,

    /// Skip TLS verification towards clusters and the push server
    #[arg(long, env = "CLUSTER_ACCEPT_INVALID_CERTS")]
    pub cluster_accept_invalid_certs: bool,
}

impl Config {
    /// Readiness bound for supporting services
    pub fn dependency_timeout(&self) -> Duration {
        Duration::from_secs(self.dependency_timeout_secs)
    }

    /// Settings handed to the configurers
    pub fn configure_settings(&self) -> ConfigureSettings {
        ConfigureSettings {
            cache_host: self.cache_host.clone(),
            dependency_timeout: self.dependency_timeout(),
        }
    }

    /// Cluster target from `API_HOST` and `API_TOKEN`, when both are set
    pub fn default_target(&self) -> Option<Target> {
        match (&self.api_host, &self.api_token) {
            (Some(host), Some(token)) if !host.is_empty() => Some(Target {
                host: host.clone(),
                token: token.clone(),
            }),
            _ => None,
        }
    }
}
