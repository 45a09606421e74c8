use anyhow::Result;
use std::sync::Arc;

/// Applies watch notifications for objects of type `K` to some target.
///
/// An error asks the caller to retry the whole notification later, so
/// implementations must tolerate being invoked again with the same input.
#[async_trait::async_trait]
pub trait Reconciler<K>: Send + Sync
where
    K: Send + Sync + 'static,
{
    /// A short name used in logs.
    fn name(&self) -> &'static str;

    /// Prepares the reconciler before any notification is processed.
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    async fn object_created(&self, obj: Arc<K>) -> Result<()>;

    async fn object_updated(&self, old: Arc<K>, new: Arc<K>) -> Result<()>;

    /// Handles the deletion of the object with the given `namespace/name`
    /// key. The object body is no longer available.
    async fn object_deleted(&self, key: &str) -> Result<()>;
}
