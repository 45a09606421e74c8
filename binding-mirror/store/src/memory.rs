use crate::{Error, RecoveryStore};
use parking_lot::RwLock;
use std::{collections::BTreeMap, sync::Arc};

/// An in-process store. Values do not survive a restart.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(Arc<RwLock<BTreeMap<String, Vec<u8>>>>);

impl MemoryStore {
    pub fn contains(&self, key: &str) -> bool {
        self.0.read().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.0.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.read().is_empty()
    }
}

#[async_trait::async_trait]
impl RecoveryStore for MemoryStore {
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), Error> {
        self.0.write().insert(key.to_string(), value);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Error> {
        Ok(self.0.read().get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<(), Error> {
        self.0.write().remove(key);
        Ok(())
    }
}
