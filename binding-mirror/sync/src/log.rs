use anyhow::Result;
use binding_mirror_core::Reconciler;
use binding_mirror_k8s_api::{object_key, Resource};
use std::{marker::PhantomData, sync::Arc};
use tracing::info;

/// Logs every notification and always succeeds.
pub struct LogReconciler<K> {
    _kind: PhantomData<fn(K)>,
}

impl<K> Default for LogReconciler<K> {
    fn default() -> Self {
        Self { _kind: PhantomData }
    }
}

#[async_trait::async_trait]
impl<K> Reconciler<K> for LogReconciler<K>
where
    K: Resource<DynamicType = ()> + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        "log"
    }

    async fn object_created(&self, obj: Arc<K>) -> Result<()> {
        info!(kind = %K::kind(&()), key = %object_key(&*obj), "Created");
        Ok(())
    }

    async fn object_updated(&self, _old: Arc<K>, new: Arc<K>) -> Result<()> {
        info!(kind = %K::kind(&()), key = %object_key(&*new), "Updated");
        Ok(())
    }

    async fn object_deleted(&self, key: &str) -> Result<()> {
        info!(kind = %K::kind(&()), %key, "Deleted");
        Ok(())
    }
}
