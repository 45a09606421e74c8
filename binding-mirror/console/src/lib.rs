//! A client for the security console's collection and group APIs.
//!
//! A collection scopes console policy to a set of namespaces; a group maps a
//! directory group onto a console role. Both are named by the common name of
//! the directory group they were created for.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod client;
mod error;
mod model;
mod templates;

pub use self::{
    client::Client,
    error::Error,
    model::{Collection, Group},
    templates::{TemplateError, Templates},
};
use serde_json::Value;

/// The console role granted to mirrored groups.
pub const DEVOPS_ROLE: &str = "devOps";

/// The subset of console operations used to mirror role bindings.
#[async_trait::async_trait]
pub trait Console: Send + Sync {
    async fn list_collections(&self) -> Result<Vec<Collection>, Error>;

    async fn list_groups(&self) -> Result<Vec<Group>, Error>;

    async fn create_collection(&self, doc: &Value) -> Result<(), Error>;

    async fn create_group(&self, doc: &Value) -> Result<(), Error>;

    /// Replaces the collection named `collection.name` with `collection`.
    async fn replace_collection(&self, collection: &Collection) -> Result<(), Error>;

    async fn delete_collection(&self, name: &str) -> Result<(), Error>;

    async fn delete_group(&self, name: &str) -> Result<(), Error>;
}

#[async_trait::async_trait]
impl<C: Console + ?Sized> Console for std::sync::Arc<C> {
    async fn list_collections(&self) -> Result<Vec<Collection>, Error> {
        (**self).list_collections().await
    }

    async fn list_groups(&self) -> Result<Vec<Group>, Error> {
        (**self).list_groups().await
    }

    async fn create_collection(&self, doc: &Value) -> Result<(), Error> {
        (**self).create_collection(doc).await
    }

    async fn create_group(&self, doc: &Value) -> Result<(), Error> {
        (**self).create_group(doc).await
    }

    async fn replace_collection(&self, collection: &Collection) -> Result<(), Error> {
        (**self).replace_collection(collection).await
    }

    async fn delete_collection(&self, name: &str) -> Result<(), Error> {
        (**self).delete_collection(name).await
    }

    async fn delete_group(&self, name: &str) -> Result<(), Error> {
        (**self).delete_group(name).await
    }
}
