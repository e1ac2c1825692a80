//! `{name}` placeholder expansion for descriptor templates.
//!
//! `{{` and `}}` produce literal braces. Any other brace that does not form a
//! known placeholder is a configuration error, so a typo in a descriptor
//! surfaces at install time instead of ending up in a generated file.

use std::collections::BTreeMap;

use crate::error::{ProvisionError, ProvisionResult};

/// Values available to templates.
#[derive(Debug, Clone, Default)]
pub struct TemplateVars {
    values: BTreeMap<&'static str, String>,
}

impl TemplateVars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: &'static str, value: impl Into<String>) -> &mut Self {
        self.values.insert(name, value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Expand every placeholder in `template`. `field` names the descriptor
    /// entry in error messages.
    pub fn expand(&self, field: &str, template: &str) -> ProvisionResult<String> {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(pos) = rest.find(['{', '}']) {
            out.push_str(&rest[..pos]);
            let tail = &rest[pos..];

            if tail.starts_with("{{") {
                out.push('{');
                rest = &tail[2..];
            } else if tail.starts_with("}}") {
                out.push('}');
                rest = &tail[2..];
            } else if tail.starts_with('}') {
                return Err(unbalanced(field, template));
            } else {
                let Some(end) = tail.find('}') else {
                    return Err(unbalanced(field, template));
                };
                let name = &tail[1..end];
                let value = self.get(name).ok_or_else(|| {
                    ProvisionError::config(field, format!("unknown placeholder '{{{name}}}'"))
                })?;
                out.push_str(value);
                rest = &tail[end + 1..];
            }
        }
        out.push_str(rest);
        Ok(out)
    }

    /// Expand each template and join the results with single spaces.
    pub fn expand_joined(&self, field: &str, templates: &[String]) -> ProvisionResult<String> {
        let parts = templates
            .iter()
            .map(|template| self.expand(field, template))
            .collect::<ProvisionResult<Vec<_>>>()?;
        Ok(parts.join(" "))
    }
}

fn unbalanced(field: &str, template: &str) -> ProvisionError {
    ProvisionError::config(field, format!("unbalanced brace in '{template}'"))
}
