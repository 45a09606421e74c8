use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// A console collection.
///
/// Only the fields this controller edits are typed. Everything else the
/// console returns is kept in `extra` and sent back unchanged on replace.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    #[serde(default)]
    pub name: String,

    #[serde(default, deserialize_with = "null_as_empty")]
    pub namespaces: Vec<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A console user group.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Group {
    #[serde(rename = "groupName", default)]
    pub group_name: String,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// === impl Collection ===

impl Collection {
    pub fn contains_namespace(&self, namespace: &str) -> bool {
        self.namespaces.iter().any(|ns| ns == namespace)
    }

    /// Adds `namespace`, returning false if it was already present.
    pub fn add_namespace(&mut self, namespace: &str) -> bool {
        if self.contains_namespace(namespace) {
            return false;
        }
        self.namespaces.push(namespace.to_string());
        true
    }

    /// Removes every occurrence of `namespace`, returning false if it was
    /// not present.
    pub fn remove_namespace(&mut self, namespace: &str) -> bool {
        let before = self.namespaces.len();
        self.namespaces.retain(|ns| ns != namespace);
        self.namespaces.len() != before
    }
}

fn null_as_empty<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    Ok(Option::<Vec<String>>::deserialize(d)?.unwrap_or_default())
}
