use binding_mirror_core::Notification;
use binding_mirror_k8s_api::{object_key, watcher, Resource};
use binding_mirror_queue::Queue;
use futures::prelude::*;
use parking_lot::RwLock;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::watch;
use tracing::{debug, info};

/// The last observed state of every object of one kind, keyed by
/// `namespace/name`.
///
/// Watch events are applied to the cache and turned into notifications. The
/// cache reports itself synced once the first full listing has been applied.
pub struct Cache<K> {
    objects: RwLock<HashMap<String, Arc<K>>>,
    synced: watch::Sender<bool>,
}

// === impl Cache ===

impl<K> Cache<K>
where
    K: Resource + Send + Sync + 'static,
{
    pub fn new() -> Arc<Self> {
        let (synced, _) = watch::channel(false);
        Arc::new(Self {
            objects: RwLock::new(HashMap::new()),
            synced,
        })
    }

    pub fn get(&self, key: &str) -> Option<Arc<K>> {
        self.objects.read().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn has_synced(&self) -> bool {
        *self.synced.borrow()
    }

    /// Returns a receiver that observes the synced flag.
    pub fn synced(&self) -> watch::Receiver<bool> {
        self.synced.subscribe()
    }

    /// Records an added or modified object. Returns `None` if the object's
    /// resource version is unchanged.
    pub fn apply(&self, obj: K) -> Option<Notification<K>> {
        let key = object_key(&obj);
        let new = Arc::new(obj);
        let old = self.objects.write().insert(key.clone(), new.clone());
        changed(key, old, new)
    }

    pub fn delete(&self, obj: K) -> Notification<K> {
        let key = object_key(&obj);
        self.objects.write().remove(&key);
        Notification::Deleted { key }
    }

    /// Replaces the cache contents with a full listing and marks the cache
    /// synced. Objects that are absent from the listing are reported deleted.
    pub fn restart(&self, objs: Vec<K>) -> Vec<Notification<K>> {
        let mut notifications = Vec::new();
        {
            let mut objects = self.objects.write();
            let mut prior = std::mem::take(&mut *objects);
            for obj in objs {
                let key = object_key(&obj);
                let new = Arc::new(obj);
                let old = prior.remove(&key);
                objects.insert(key.clone(), new.clone());
                if let Some(n) = changed(key, old, new) {
                    notifications.push(n);
                }
            }
            notifications.extend(prior.into_keys().map(|key| Notification::Deleted { key }));
        }
        if !self.synced.send_replace(true) {
            info!(objects = self.len(), "Cache synced");
        }
        notifications
    }

    /// Applies watch events to the cache, enqueueing a notification for each
    /// change, until the stream ends.
    pub async fn watch(
        self: Arc<Self>,
        events: impl Stream<Item = watcher::Event<K>>,
        queue: Queue<Notification<K>>,
    ) {
        tokio::pin!(events);
        while let Some(event) = events.next().await {
            match event {
                watcher::Event::Applied(obj) => {
                    if let Some(n) = self.apply(obj) {
                        queue.add(n);
                    }
                }
                watcher::Event::Deleted(obj) => queue.add(self.delete(obj)),
                watcher::Event::Restarted(objs) => {
                    debug!(objects = objs.len(), "Watch restarted");
                    for n in self.restart(objs) {
                        queue.add(n);
                    }
                }
            }
        }
        debug!("Watch stream ended");
    }
}

fn changed<K: Resource>(key: String, old: Option<Arc<K>>, new: Arc<K>) -> Option<Notification<K>> {
    match old {
        None => Some(Notification::Created { key, prior: None }),
        Some(old) if same_version(&*old, &*new) => None,
        Some(old) => Some(Notification::Updated { key, old, new }),
    }
}

fn same_version<K: Resource>(old: &K, new: &K) -> bool {
    let version = old.meta().resource_version.as_deref();
    version.is_some() && version == new.meta().resource_version.as_deref()
}
