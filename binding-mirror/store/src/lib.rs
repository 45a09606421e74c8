//! Durable record of the last-synced state of each cluster object.
//!
//! The cluster only reports the key of a deleted object, so the last state
//! that was mirrored outward is kept here, keyed by `namespace/name`, and
//! read back when the deletion is processed.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod etcd;
mod memory;

pub use self::{etcd::EtcdStore, memory::MemoryStore};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no store endpoints configured")]
    NoEndpoints,

    #[error("invalid store endpoint {0:?}")]
    InvalidEndpoint(String),

    #[error("store request to {endpoint} timed out after {timeout:?}")]
    Timeout { endpoint: String, timeout: Duration },

    #[error("store request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("store endpoint {endpoint} returned {status}")]
    Status {
        endpoint: String,
        status: reqwest::StatusCode,
    },

    #[error("invalid value for key {key}: {reason}")]
    Decode { key: String, reason: String },
}

/// A keyed blob store. Operations on different keys are independent.
#[async_trait::async_trait]
pub trait RecoveryStore: Send + Sync {
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), Error>;

    /// Returns `None` if no value is stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Error>;

    /// Removes `key`. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), Error>;
}

#[async_trait::async_trait]
impl<S: RecoveryStore + ?Sized> RecoveryStore for std::sync::Arc<S> {
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), Error> {
        (**self).put(key, value).await
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Error> {
        (**self).get(key).await
    }

    async fn delete(&self, key: &str) -> Result<(), Error> {
        (**self).delete(key).await
    }
}
