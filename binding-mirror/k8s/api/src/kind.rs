use std::{fmt, str::FromStr};

/// A cluster resource kind that may be watched.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    ConfigMap,
    DaemonSet,
    Deployment,
    Pod,
    ReplicaSet,
    ReplicationController,
    RoleBinding,
    Secret,
    Service,
}

#[derive(Debug, PartialEq, Eq)]
pub struct InvalidResourceKind(String);

// === impl ResourceKind ===

impl ResourceKind {
    pub const ALL: [Self; 9] = [
        Self::ConfigMap,
        Self::DaemonSet,
        Self::Deployment,
        Self::Pod,
        Self::ReplicaSet,
        Self::ReplicationController,
        Self::RoleBinding,
        Self::Secret,
        Self::Service,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConfigMap => "configmap",
            Self::DaemonSet => "daemonset",
            Self::Deployment => "deployment",
            Self::Pod => "pod",
            Self::ReplicaSet => "replicaset",
            Self::ReplicationController => "replicationcontroller",
            Self::RoleBinding => "rolebinding",
            Self::Secret => "secret",
            Self::Service => "service",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = InvalidResourceKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == lower || (*k == Self::Service && lower == "services"))
            .ok_or_else(|| InvalidResourceKind(s.to_string()))
    }
}

// === impl InvalidResourceKind ===

impl fmt::Display for InvalidResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown resource kind: {}", self.0)
    }
}

impl std::error::Error for InvalidResourceKind {}
