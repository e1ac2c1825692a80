//! TOML loading for stack descriptors

use std::path::Path;

use super::schema::StackConfig;
use crate::error::{ProvisionError, ProvisionResult};

/// Parse and validate a descriptor file.
pub fn parse_stack_toml(path: &Path) -> ProvisionResult<StackConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|err| ProvisionError::io("config.read", path, err))?;
    parse_stack_toml_str(&content, path)
}

/// Parse and validate descriptor content; `origin` is used in errors.
pub fn parse_stack_toml_str(content: &str, origin: &Path) -> ProvisionResult<StackConfig> {
    let config: StackConfig =
        toml::from_str(content).map_err(|source| ProvisionError::ConfigParse {
            path: origin.to_path_buf(),
            source,
        })?;
    config.validate()?;
    Ok(config)
}

/// Serialize a descriptor, e.g. to seed a `stack.toml` from a preset.
pub fn to_toml(config: &StackConfig) -> ProvisionResult<String> {
    toml::to_string_pretty(config)
        .map_err(|err| ProvisionError::config("stack", format!("cannot serialize: {err}")))
}
