//! Runtime parameters supplied alongside the application package.
//!
//! The document is a JSON object of sections, each an object of parameters:
//!
//! ```json
//! { "java": { "version": "1.8", "opts": "-Xmx512m" } }
//! ```

use std::path::Path;

use serde_json::{Map, Value};

use crate::error::{ProvisionError, ProvisionResult};

/// File name of the metadata document inside the control-data root.
pub const METADATA_FILE: &str = "metadata.json";

/// Source of opaque runtime parameters.
pub trait MetadataProvider {
    /// Value of `namespace.key`, or `default` when absent.
    fn runtime_parameter(&self, namespace: &str, key: &str, default: &str) -> String;
}

/// Metadata backed by a parsed JSON document.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    sections: Map<String, Value>,
}

impl Metadata {
    /// Metadata with no parameters; every lookup yields its default.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_file(path: &Path) -> ProvisionResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|err| ProvisionError::io("metadata.read", path, err))?;
        let value: Value =
            serde_json::from_str(&content).map_err(|source| ProvisionError::MetadataParse {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_value(value).map_err(|_| {
            ProvisionError::config(
                path.display().to_string(),
                "metadata document must be a JSON object",
            )
        })
    }

    pub fn from_value(value: Value) -> ProvisionResult<Self> {
        match value {
            Value::Object(sections) => Ok(Self { sections }),
            other => Err(ProvisionError::config(
                "metadata",
                format!("expected an object, found {}", json_type(&other)),
            )),
        }
    }
}

impl MetadataProvider for Metadata {
    fn runtime_parameter(&self, namespace: &str, key: &str, default: &str) -> String {
        let value = self
            .sections
            .get(namespace)
            .and_then(Value::as_object)
            .and_then(|section| section.get(key));
        match value {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Bool(b)) => b.to_string(),
            _ => default.to_string(),
        }
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
