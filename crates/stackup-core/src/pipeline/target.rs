//! Directories owned by one deployment instance.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::{LayoutConfig, TemplateVars};
use crate::error::{ProvisionError, ProvisionResult};
use crate::fs::chmod_read_write;
use crate::fs::tree_ops::ensure_dir;

/// Resolved inputs of a provisioning run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionRequest {
    /// Directory the run populates
    pub deployment_root: PathBuf,
    /// Directory holding the runtime archive, libraries and assets
    pub plugin_root: PathBuf,
    /// Directory holding the application archive
    pub package_root: PathBuf,
    /// Directory holding the metadata document
    pub control_data_root: PathBuf,
    pub port: u16,
}

/// Paths of the deployment tree, derived from a request and a layout.
///
/// Everything except runtime-home is known up front. Runtime-home is only
/// known once its archive has been extracted, since a prefix-located home
/// carries the distribution's version in its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallationTarget {
    pub deployment_root: PathBuf,
    pub genapp_dir: PathBuf,
    pub control_dir: PathBuf,
    pub log_dir: PathBuf,
    pub genapp_lib_dir: PathBuf,
    pub tmp_dir: PathBuf,
    pub agent_lib_dir: PathBuf,
    pub runtime_base: PathBuf,
    pub application_archive: PathBuf,
    runtime_home: Option<PathBuf>,
}

impl InstallationTarget {
    pub fn plan(request: &ProvisionRequest, layout: &LayoutConfig) -> Self {
        let root = &request.deployment_root;
        let genapp_dir = root.join(&layout.genapp_dir);
        Self {
            deployment_root: root.clone(),
            control_dir: genapp_dir.join(&layout.control_dir),
            log_dir: genapp_dir.join(&layout.log_dir),
            genapp_lib_dir: genapp_dir.join(&layout.lib_dir),
            genapp_dir,
            tmp_dir: root.join(&layout.tmp_dir),
            agent_lib_dir: root.join(&layout.agent_lib_dir),
            runtime_base: root.join(&layout.runtime_base),
            application_archive: request.package_root.join(&layout.application_archive),
            runtime_home: None,
        }
    }

    /// Create the fixed directories and check the run's inputs.
    pub fn prepare(&self, plugin_root: &Path) -> ProvisionResult<()> {
        info!("Deployment root: {}", self.deployment_root.display());
        info!("Plugin root: {}", plugin_root.display());

        if !plugin_root.is_dir() {
            return Err(ProvisionError::state(plugin_root, "plugin root is not a directory"));
        }
        if !self.application_archive.exists() || self.application_archive.is_dir() {
            return Err(ProvisionError::state(
                &self.application_archive,
                "application archive is missing or not a file",
            ));
        }

        ensure_dir(&self.genapp_dir, "prepare.genapp_dir")?;
        ensure_dir(&self.control_dir, "prepare.control_dir")?;
        // Locked read-execute by a previous run.
        chmod_read_write(&self.control_dir)?;
        ensure_dir(&self.log_dir, "prepare.log_dir")?;
        chmod_read_write(&self.log_dir)?;
        ensure_dir(&self.runtime_base, "prepare.runtime_base")?;
        ensure_dir(&self.agent_lib_dir, "prepare.agent_lib_dir")?;
        ensure_dir(&self.tmp_dir, "prepare.tmp_dir")?;
        chmod_read_write(&self.tmp_dir)?;

        debug!("Application archive: {}", self.application_archive.display());
        debug!("Runtime base: {}", self.runtime_base.display());
        debug!("Agent lib dir: {}", self.agent_lib_dir.display());
        Ok(())
    }

    /// Runtime-home, once it has been installed.
    pub fn runtime_home(&self) -> ProvisionResult<&Path> {
        self.runtime_home.as_deref().ok_or_else(|| {
            ProvisionError::state(&self.deployment_root, "runtime-home has not been installed")
        })
    }

    pub(crate) fn set_runtime_home(&mut self, home: PathBuf) {
        info!("Runtime home: {}", home.display());
        self.runtime_home = Some(home);
    }

    /// Placeholder values for descriptor templates. `runtime_home` is only
    /// available after it has been installed.
    pub fn template_vars(&self, port: u16) -> TemplateVars {
        let mut vars = TemplateVars::new();
        vars.set("app_dir", display(&self.deployment_root))
            .set("tmp_dir", display(&self.tmp_dir))
            .set("log_dir", display(&self.log_dir))
            .set("control_dir", display(&self.control_dir))
            .set("genapp_dir", display(&self.genapp_dir))
            .set("runtime_base", display(&self.runtime_base))
            .set("agent_lib_dir", display(&self.agent_lib_dir))
            .set("port", port.to_string());
        if let Some(home) = &self.runtime_home {
            vars.set("runtime_home", display(home));
        }
        vars
    }
}

fn display(path: &Path) -> String {
    path.display().to_string()
}
