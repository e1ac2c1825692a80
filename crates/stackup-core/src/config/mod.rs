//! Stack descriptors
//!
//! A descriptor is chosen in this order:
//! - an explicit file passed by the caller
//! - `stack.toml` at the plugin root
//! - a built-in preset

pub mod parser;
pub mod schema;
pub mod template;

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use tracing::{debug, info};

use crate::error::ProvisionResult;

pub use parser::{parse_stack_toml, parse_stack_toml_str, to_toml};
pub use schema::{
    AgentConfig, ArtifactRef, BaseConfig, ControlConfig, ControlLibrary, JavaConfig,
    LayoutConfig, RuntimeConfig, RuntimeHome, StackConfig,
};
pub use template::TemplateVars;

/// Descriptor file looked up at the plugin root.
pub const STACK_FILE: &str = "stack.toml";

/// Built-in descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StackPreset {
    #[default]
    Tomcat8,
    Tomcat7,
}

impl StackPreset {
    pub const ALL: [StackPreset; 2] = [StackPreset::Tomcat8, StackPreset::Tomcat7];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tomcat8 => "tomcat8",
            Self::Tomcat7 => "tomcat7",
        }
    }

    pub fn config(self) -> StackConfig {
        match self {
            Self::Tomcat8 => StackConfig::tomcat8(),
            Self::Tomcat7 => StackConfig::tomcat7(),
        }
    }
}

impl fmt::Display for StackPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StackPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|preset| preset.as_str() == s)
            .ok_or_else(|| {
                let known: Vec<_> = Self::ALL.iter().map(|p| p.as_str()).collect();
                format!("unknown stack '{s}', expected one of: {}", known.join(", "))
            })
    }
}

impl StackConfig {
    /// Load and validate a descriptor file.
    pub fn load(path: &Path) -> ProvisionResult<Self> {
        parse_stack_toml(path)
    }

    /// Pick the descriptor for a run.
    pub fn resolve(
        explicit: Option<&Path>,
        plugin_root: &Path,
        preset: StackPreset,
    ) -> ProvisionResult<Self> {
        if let Some(path) = explicit {
            info!("Using stack descriptor {}", path.display());
            return Self::load(path);
        }

        let bundled = plugin_root.join(STACK_FILE);
        if bundled.is_file() {
            info!("Using stack descriptor {}", bundled.display());
            return Self::load(&bundled);
        }

        debug!("No {} in {}, using preset", STACK_FILE, plugin_root.display());
        info!("Using built-in stack '{}'", preset);
        Ok(preset.config())
    }
}
