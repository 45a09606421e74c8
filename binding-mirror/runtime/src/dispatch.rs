use crate::Cache;
use anyhow::Result;
use binding_mirror_core::{Notification, Reconciler};
use binding_mirror_k8s_api::{Resource, Time};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

/// Hands each notification to a reconciler.
///
/// Objects listed when the process starts are replayed as creations; they
/// are skipped unless they were created after `started_at`. A skipped
/// creation that absorbed an update is dispatched as that update.
pub struct Dispatcher<K> {
    cache: Arc<Cache<K>>,
    reconciler: Arc<dyn Reconciler<K>>,
    started_at: DateTime<Utc>,
}

// === impl Dispatcher ===

impl<K> Dispatcher<K>
where
    K: Resource + Send + Sync + 'static,
{
    pub fn new(
        cache: Arc<Cache<K>>,
        reconciler: Arc<dyn Reconciler<K>>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            cache,
            reconciler,
            started_at,
        }
    }

    pub async fn dispatch(&self, notification: Notification<K>) -> Result<()> {
        match notification {
            Notification::Created { key, prior } => {
                let Some(obj) = self.cache.get(&key) else {
                    debug!(%key, "Object is no longer cached");
                    return Ok(());
                };
                if self.created_since_start(&*obj) {
                    return self.reconciler.object_created(obj).await;
                }
                match prior {
                    Some(old) => self.reconciler.object_updated(old, obj).await,
                    None => {
                        debug!(%key, "Skipping object created before startup");
                        Ok(())
                    }
                }
            }
            Notification::Updated { old, new, .. } => {
                self.reconciler.object_updated(old, new).await
            }
            Notification::Deleted { key } => self.reconciler.object_deleted(&key).await,
        }
    }

    fn created_since_start(&self, obj: &K) -> bool {
        match &obj.meta().creation_timestamp {
            Some(Time(created)) => *created > self.started_at,
            None => false,
        }
    }
}
