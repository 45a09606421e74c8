#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod kind;

pub use self::kind::ResourceKind;
pub use k8s_openapi::{
    api::{
        apps::v1::{DaemonSet, Deployment, ReplicaSet},
        core::v1::{ConfigMap, Pod, ReplicationController, Secret, Service},
        rbac::v1::{RoleBinding, RoleRef, Subject},
    },
    apimachinery::pkg::apis::meta::v1::Time,
};
pub use kube::{
    api::{ObjectMeta, Resource, ResourceExt},
    runtime::watcher,
};

/// Returns the cache key for an object: `namespace/name`, or just `name` for
/// cluster-scoped objects.
pub fn object_key<K: Resource>(obj: &K) -> String {
    let name = obj.name_any();
    match obj.meta().namespace.as_deref() {
        Some(ns) if !ns.is_empty() => format!("{ns}/{name}"),
        _ => name,
    }
}
