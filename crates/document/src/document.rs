use crate::error::{DocumentError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const METADATA: &str = "metadata";
const ANNOTATIONS: &str = "annotations";

/// One structured configuration document (a KRM object).
///
/// The handle is opaque to the engine: it only reads the identity fields,
/// annotations and named payload fields through the accessors below.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document {
    object: Map<String, Value>,
}

impl Document {
    /// Create an empty document with its identity fields set
    pub fn new(api_version: &str, kind: &str, name: &str) -> Self {
        let mut metadata = Map::new();
        metadata.insert("name".to_string(), Value::String(name.to_string()));

        let mut object = Map::new();
        object.insert(
            "apiVersion".to_string(),
            Value::String(api_version.to_string()),
        );
        object.insert("kind".to_string(), Value::String(kind.to_string()));
        object.insert(METADATA.to_string(), Value::Object(metadata));
        Self { object }
    }

    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(object) => Ok(Self { object }),
            other => Err(DocumentError::NotAnObject(other.to_string())),
        }
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.object)
    }

    pub fn api_version(&self) -> &str {
        self.get_str(&["apiVersion"]).unwrap_or_default()
    }

    pub fn kind(&self) -> &str {
        self.get_str(&["kind"]).unwrap_or_default()
    }

    pub fn name(&self) -> &str {
        self.get_str(&[METADATA, "name"]).unwrap_or_default()
    }

    /// True when both documents have the same apiVersion, kind and name
    pub fn same_identity(&self, other: &Document) -> bool {
        self.api_version() == other.api_version()
            && self.kind() == other.kind()
            && self.name() == other.name()
    }

    /// Nested field lookup, e.g. `get(&["spec", "config"])`
    pub fn get(&self, path: &[&str]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        let mut current = self.object.get(*first)?;
        for segment in rest {
            current = current.as_object()?.get(*segment)?;
        }
        Some(current)
    }

    pub fn get_str(&self, path: &[&str]) -> Option<&str> {
        self.get(path).and_then(Value::as_str)
    }

    /// Set a nested field, creating intermediate objects on demand.
    ///
    /// Fails when the path is empty or an intermediate field exists but is not
    /// an object.
    pub fn set(&mut self, path: &[&str], value: Value) -> Result<()> {
        let Some((last, parents)) = path.split_last() else {
            return Err(DocumentError::InvalidPath("empty path".to_string()));
        };

        let mut current = &mut self.object;
        for (idx, segment) in parents.iter().enumerate() {
            let entry = current
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            current = entry.as_object_mut().ok_or_else(|| {
                DocumentError::InvalidPath(format!(
                    "{} is not an object",
                    parents[..=idx].join(".")
                ))
            })?;
        }
        current.insert(last.to_string(), value);
        Ok(())
    }

    pub fn remove(&mut self, path: &[&str]) -> Option<Value> {
        let (last, parents) = path.split_last()?;
        let mut current = &mut self.object;
        for segment in parents {
            current = current.get_mut(*segment)?.as_object_mut()?;
        }
        current.remove(*last)
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.get_str(&[METADATA, ANNOTATIONS, key])
    }

    pub fn set_annotation(&mut self, key: &str, value: &str) -> Result<()> {
        self.set(
            &[METADATA, ANNOTATIONS, key],
            Value::String(value.to_string()),
        )
    }

    pub fn remove_annotation(&mut self, key: &str) -> Option<String> {
        let removed = self.remove(&[METADATA, ANNOTATIONS, key])?;
        let empty = self
            .get(&[METADATA, ANNOTATIONS])
            .and_then(Value::as_object)
            .is_some_and(Map::is_empty);
        if empty {
            self.remove(&[METADATA, ANNOTATIONS]);
        }
        match removed {
            Value::String(value) => Some(value),
            other => Some(other.to_string()),
        }
    }
}
