//! In-memory changes to the workload under configuration
//!
//! Configurers run concurrently against the same workload snapshot. Each
//! returns a [`WorkloadPatch`]; the environment controller applies all of
//! them to the snapshot and writes the result once.

use k8s_openapi::api::core::v1::{Container, EnvVar, Volume, VolumeMount};

use crate::objects::DeploymentConfig;

/// One change to a workload
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PatchOp {
    /// Overwrite an env var in each container that already has it
    ///
    /// Only the first occurrence per container is touched; containers
    /// without the var are left alone.
    ReplaceEnv {
        /// Variable name
        name: String,
        /// New value
        value: String,
    },
    /// Set an env var in every container, adding it where absent
    UpsertEnv {
        /// Variable name
        name: String,
        /// New value
        value: String,
    },
    /// Mount a config map read-only into every container
    ///
    /// Nothing happens when the workload already has a volume named `volume`.
    MountConfigMap {
        /// Volume name
        volume: String,
        /// Config map backing the volume
        config_map: String,
        /// Mount path in each container
        mount_path: String,
    },
}

/// Ordered set of changes produced by one configurer
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WorkloadPatch {
    ops: Vec<PatchOp>,
}

impl WorkloadPatch {
    /// An empty patch
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a [`PatchOp::ReplaceEnv`]
    pub fn replace_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.ops.push(PatchOp::ReplaceEnv {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    /// Add a [`PatchOp::UpsertEnv`]
    pub fn upsert_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.ops.push(PatchOp::UpsertEnv {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    /// Add a [`PatchOp::MountConfigMap`]
    pub fn mount_config_map(
        mut self,
        volume: impl Into<String>,
        config_map: impl Into<String>,
        mount_path: impl Into<String>,
    ) -> Self {
        self.ops.push(PatchOp::MountConfigMap {
            volume: volume.into(),
            config_map: config_map.into(),
            mount_path: mount_path.into(),
        });
        self
    }

    /// Whether the patch changes nothing
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// The operations, in order
    pub fn ops(&self) -> &[PatchOp] {
        &self.ops
    }

    /// Apply every operation to `workload`
    ///
    /// Applying the same patch twice leaves the workload as applying it once.
    pub fn apply(&self, workload: &mut DeploymentConfig) {
        for op in &self.ops {
            match op {
                PatchOp::ReplaceEnv { name, value } => {
                    for container in workload.containers_mut() {
                        replace_env(container, name, value);
                    }
                }
                PatchOp::UpsertEnv { name, value } => {
                    for container in workload.containers_mut() {
                        upsert_env(container, name, value);
                    }
                }
                PatchOp::MountConfigMap {
                    volume,
                    config_map,
                    mount_path,
                } => mount_config_map(workload, volume, config_map, mount_path),
            }
        }
    }
}

fn replace_env(container: &mut Container, name: &str, value: &str) {
    let Some(env) = container.env.as_mut() else {
        return;
    };
    if let Some(var) = env.iter_mut().find(|v| v.name == name) {
        if var.value.as_deref() != Some(value) {
            var.value = Some(value.to_string());
            var.value_from = None;
        }
    }
}

fn upsert_env(container: &mut Container, name: &str, value: &str) {
    let env = container.env.get_or_insert_with(Vec::new);
    match env.iter_mut().find(|v| v.name == name) {
        Some(var) => {
            var.value = Some(value.to_string());
            var.value_from = None;
        }
        None => env.push(EnvVar {
            name: name.to_string(),
            value: Some(value.to_string()),
            value_from: None,
        }),
    }
}

fn mount_config_map(workload: &mut DeploymentConfig, volume: &str, config_map: &str, mount_path: &str) {
    if workload.volumes().iter().any(|v| v.name == volume) {
        return;
    }
    workload.volumes_mut().push(config_map_volume(volume, config_map));
    for container in workload.containers_mut() {
        let mounts = container.volume_mounts.get_or_insert_with(Vec::new);
        if mounts.iter().any(|m| m.name == volume) {
            continue;
        }
        mounts.push(VolumeMount {
            name: volume.to_string(),
            mount_path: mount_path.to_string(),
            read_only: Some(true),
            ..Default::default()
        });
    }
}

fn config_map_volume(volume: &str, config_map: &str) -> Volume {
    let mut v = Volume {
        name: volume.to_string(),
        ..Default::default()
    };
    v.config_map = serde_json::from_value(serde_json::json!({ "name": config_map })).ok();
    v
}
