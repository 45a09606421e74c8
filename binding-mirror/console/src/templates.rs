use serde_json::{json, Map, Value};
use std::{
    fs, io,
    path::{Path, PathBuf},
};

const COLLECTION_FILE: &str = "collection.json";
const GROUP_FILE: &str = "group.json";

/// Documents used to create console collections and groups.
///
/// Operator-supplied templates may carry any fields the console accepts. The
/// identifying fields are always overwritten when a document is rendered.
#[derive(Clone, Debug, PartialEq)]
pub struct Templates {
    collection: Map<String, Value>,
    group: Map<String, Value>,
}

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{path} must contain a JSON object")]
    NotAnObject { path: PathBuf },
}

// === impl Templates ===

impl Default for Templates {
    fn default() -> Self {
        let collection = json!({
            "description": "Mirrored from cluster role bindings",
            "color": "#3FA2F7",
            "images": ["*"],
            "hosts": ["*"],
            "labels": ["*"],
            "containers": ["*"],
            "services": ["*"],
            "functions": ["*"],
            "appIDs": ["*"],
        });
        let group = json!({ "ldapGroup": true });
        Self {
            collection: into_object(collection),
            group: into_object(group),
        }
    }
}

impl Templates {
    /// Loads `collection.json` and `group.json` from `dir`, falling back to
    /// the built-in document for any file that does not exist.
    pub fn from_dir(dir: &Path) -> Result<Self, TemplateError> {
        let defaults = Self::default();
        Ok(Self {
            collection: load(&dir.join(COLLECTION_FILE))?.unwrap_or(defaults.collection),
            group: load(&dir.join(GROUP_FILE))?.unwrap_or(defaults.group),
        })
    }

    /// Renders a collection named `cn` scoped to `namespace`.
    pub fn collection(&self, cn: &str, namespace: &str) -> Value {
        let mut doc = self.collection.clone();
        doc.insert("name".to_string(), json!(cn));
        doc.insert("namespaces".to_string(), json!([namespace]));
        Value::Object(doc)
    }

    /// Renders a group named `cn` granted `role`.
    pub fn group(&self, cn: &str, role: &str) -> Value {
        let mut doc = self.group.clone();
        doc.insert("groupName".to_string(), json!(cn));
        doc.insert("role".to_string(), json!(role));
        Value::Object(doc)
    }
}

fn load(path: &Path) -> Result<Option<Map<String, Value>>, TemplateError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(TemplateError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(Value::Object(doc)) => Ok(Some(doc)),
        Ok(_) => Err(TemplateError::NotAnObject {
            path: path.to_path_buf(),
        }),
        Err(source) => Err(TemplateError::Parse {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn into_object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
