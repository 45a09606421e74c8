use binding_mirror_queue::Item;
use std::sync::Arc;

/// An observed change to a watched object.
///
/// Deletions carry only the key: the object body is gone from the cluster by
/// the time the notification is processed.
#[derive(Debug)]
pub enum Notification<K> {
    Created {
        key: String,
        /// The state before the first update absorbed into this creation.
        prior: Option<Arc<K>>,
    },
    Updated {
        key: String,
        old: Arc<K>,
        new: Arc<K>,
    },
    Deleted {
        key: String,
    },
}

// === impl Notification ===

impl<K> Clone for Notification<K> {
    fn clone(&self) -> Self {
        match self {
            Self::Created { key, prior } => Self::Created {
                key: key.clone(),
                prior: prior.clone(),
            },
            Self::Updated { key, old, new } => Self::Updated {
                key: key.clone(),
                old: old.clone(),
                new: new.clone(),
            },
            Self::Deleted { key } => Self::Deleted { key: key.clone() },
        }
    }
}

impl<K> Notification<K> {
    pub fn key(&self) -> &str {
        match self {
            Self::Created { key, .. } | Self::Updated { key, .. } | Self::Deleted { key } => key,
        }
    }

    pub fn change(&self) -> &'static str {
        match self {
            Self::Created { .. } => "create",
            Self::Updated { .. } => "update",
            Self::Deleted { .. } => "delete",
        }
    }
}

impl<K: Send + Sync + 'static> Item for Notification<K> {
    type Key = String;

    fn key(&self) -> &String {
        match self {
            Self::Created { key, .. } | Self::Updated { key, .. } | Self::Deleted { key } => key,
        }
    }

    /// Merges a newer notification into one that has not been processed yet.
    ///
    /// Consecutive updates keep the oldest previous state so that the
    /// membership diff spans both changes. A creation absorbs later updates,
    /// since creations are resolved against the watch cache's latest object,
    /// but keeps the state before the first of them in case the creation is
    /// a startup replay that must be handled as an update.
    fn coalesce(self, newer: Self) -> Self {
        match (self, newer) {
            (Self::Updated { old, .. }, Self::Updated { key, new, .. }) => {
                Self::Updated { key, old, new }
            }
            (Self::Created { key, prior }, Self::Updated { old, .. }) => Self::Created {
                key,
                prior: prior.or(Some(old)),
            },
            (_, newer) => newer,
        }
    }
}
