use binding_mirror_k8s_api::ResourceKind;
use binding_mirror_sync::{ReconcilerName, UnknownReconciler};
use serde::Deserialize;
use std::{
    fs, io,
    path::{Path, PathBuf},
};

pub const CONFIG_FILE: &str = "config.yaml";

/// The `config.yaml` document.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub resources: Resources,

    #[serde(default, alias = "handler")]
    pub reconciler: ReconcilerConfig,
}

/// Resource kinds to watch.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Resources {
    pub pod: bool,
    pub deployment: bool,
    pub replicationcontroller: bool,
    pub replicaset: bool,
    pub daemonset: bool,
    pub services: bool,
    pub secret: bool,
    pub configmap: bool,
    pub rolebinding: bool,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ReconcilerConfig {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error(transparent)]
    Reconciler(#[from] UnknownReconciler),
}

// === impl Config ===

impl Config {
    /// Reads `config.yaml` from `dir`.
    pub fn load(dir: &Path) -> Result<Self, ConfigError> {
        let path = dir.join(CONFIG_FILE);
        let text = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse { path, source })
    }

    pub fn reconciler(&self) -> Result<ReconcilerName, ConfigError> {
        Ok(self.reconciler.name.parse()?)
    }

    /// The resource kinds enabled for watching.
    pub fn enabled(&self) -> Vec<ResourceKind> {
        let r = &self.resources;
        ResourceKind::ALL
            .into_iter()
            .filter(|kind| match kind {
                ResourceKind::ConfigMap => r.configmap,
                ResourceKind::DaemonSet => r.daemonset,
                ResourceKind::Deployment => r.deployment,
                ResourceKind::Pod => r.pod,
                ResourceKind::ReplicaSet => r.replicaset,
                ResourceKind::ReplicationController => r.replicationcontroller,
                ResourceKind::RoleBinding => r.rolebinding,
                ResourceKind::Secret => r.secret,
                ResourceKind::Service => r.services,
            })
            .collect()
    }
}
