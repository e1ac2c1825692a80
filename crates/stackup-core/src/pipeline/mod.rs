//! Ordered installation of a deployment.
//!
//! Steps run strictly in [`StepKind::ORDER`]; later steps read what earlier
//! ones produced (the classpath needs runtime-home, the control directory is
//! locked only after every generated file has been written). The first
//! failure stops the run and is returned wrapped in
//! [`ProvisionError::Step`]. Nothing is rolled back.

pub mod control_file;
pub mod java;
pub mod target;

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use crate::archive::extract;
use crate::artifact::{copy_artifact_to_directory, find_artifact, find_unique_directory};
use crate::config::{RuntimeHome, StackConfig};
use crate::error::{ProvisionError, ProvisionResult};
use crate::fs::tree_ops::{clear_file_slot, ensure_dir};
use crate::fs::{chmod_read_execute, chmod_read_only, chmod_read_write, copy_tree};
use crate::metadata::MetadataProvider;

pub use control_file::{ControlConfigFile, write_line_file};
pub use java::{JavaInstallation, resolve_java};
pub use target::{InstallationTarget, ProvisionRequest};

/// Name of the core java options file.
pub const CORE_OPTIONS_FILE: &str = "java-opts-10-core";
/// Name of the generated control config.
pub const CONFIG_FILE: &str = "config";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepKind {
    PrepareTarget,
    InstallRuntimeHome,
    InstallRuntimeBase,
    InstallAgents,
    WriteJavaOptions,
    WriteControlConfig,
    InstallControlScripts,
}

impl StepKind {
    pub const ORDER: [StepKind; 7] = [
        StepKind::PrepareTarget,
        StepKind::InstallRuntimeHome,
        StepKind::InstallRuntimeBase,
        StepKind::InstallAgents,
        StepKind::WriteJavaOptions,
        StepKind::WriteControlConfig,
        StepKind::InstallControlScripts,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PrepareTarget => "prepare-target",
            Self::InstallRuntimeHome => "install-runtime-home",
            Self::InstallRuntimeBase => "install-runtime-base",
            Self::InstallAgents => "install-agents",
            Self::WriteJavaOptions => "write-java-options",
            Self::WriteControlConfig => "write-control-config",
            Self::InstallControlScripts => "install-control-scripts",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone)]
pub struct ProvisionReport {
    pub target: InstallationTarget,
    pub java: JavaInstallation,
    pub completed: Vec<StepKind>,
    /// Files written into the control directory, in write order
    pub generated: Vec<PathBuf>,
}

/// Installs one deployment as described by a [`StackConfig`].
pub struct ProvisioningPipeline<'a> {
    config: StackConfig,
    request: ProvisionRequest,
    metadata: &'a dyn MetadataProvider,
    target: InstallationTarget,
    java: Option<JavaInstallation>,
    completed: Vec<StepKind>,
    generated: Vec<PathBuf>,
}

impl<'a> ProvisioningPipeline<'a> {
    pub fn new(
        config: StackConfig,
        request: ProvisionRequest,
        metadata: &'a dyn MetadataProvider,
    ) -> Self {
        let target = InstallationTarget::plan(&request, &config.layout);
        Self {
            config,
            request,
            metadata,
            target,
            java: None,
            completed: Vec::new(),
            generated: Vec::new(),
        }
    }

    pub fn target(&self) -> &InstallationTarget {
        &self.target
    }

    /// Run every step in order, stopping at the first failure.
    pub fn run(mut self) -> ProvisionResult<ProvisionReport> {
        info!(
            "Provisioning {} on port {}",
            self.request.deployment_root.display(),
            self.request.port
        );
        for step in StepKind::ORDER {
            self.execute_step(step)?;
        }

        let java = self.java.ok_or_else(|| {
            ProvisionError::state(&self.target.deployment_root, "java was never resolved")
        })?;
        info!("Provisioning complete");
        Ok(ProvisionReport {
            target: self.target,
            java,
            completed: self.completed,
            generated: self.generated,
        })
    }

    fn execute_step(&mut self, step: StepKind) -> ProvisionResult<()> {
        info!(step = %step, "Running step");
        let outcome = match step {
            StepKind::PrepareTarget => self.target.prepare(&self.request.plugin_root),
            StepKind::InstallRuntimeHome => self.install_runtime_home(),
            StepKind::InstallRuntimeBase => self.install_runtime_base(),
            StepKind::InstallAgents => self.install_agents(),
            StepKind::WriteJavaOptions => self.write_java_options(),
            StepKind::WriteControlConfig => self.write_control_config(),
            StepKind::InstallControlScripts => self.install_control_scripts(),
        };

        match outcome {
            Ok(()) => {
                debug!(step = %step, "Step completed");
                self.completed.push(step);
                Ok(())
            }
            Err(err) => {
                error!(step = %step, kind = %err.kind(), "Step failed: {}", err);
                Err(ProvisionError::Step {
                    step,
                    source: Box::new(err),
                })
            }
        }
    }

    fn plugin_path(&self, relative: &str) -> PathBuf {
        if relative.is_empty() {
            self.request.plugin_root.clone()
        } else {
            self.request.plugin_root.join(relative)
        }
    }

    fn install_runtime_home(&mut self) -> ProvisionResult<()> {
        let runtime = &self.config.runtime;
        let archive = find_artifact(
            &self.plugin_path(&runtime.archive_dir),
            &runtime.archive,
            &runtime.archive_extension,
        )?;
        info!("Installing runtime from {}", archive.display());

        let root = &self.target.deployment_root;
        let home = match &runtime.home {
            RuntimeHome::Dir(dir) => {
                let home = root.join(dir);
                if home.is_dir() {
                    unlock_previous_home(&home)?;
                }
                extract(&archive, &home)?;
                home
            }
            RuntimeHome::Prefix(prefix) => {
                if let Ok(previous) = find_unique_directory(root, prefix) {
                    unlock_previous_home(&previous)?;
                }
                extract(&archive, root)?;
                find_unique_directory(root, prefix)?
            }
        };
        self.target.set_runtime_home(home.clone());

        let lib_dir = home.join(&runtime.lib_dir);
        ensure_dir(&lib_dir, "runtime.create_lib_dir")?;
        for library in &runtime.libraries {
            copy_artifact_to_directory(
                &self.plugin_path(&library.source),
                &library.artifact,
                &library.extension,
                &lib_dir,
            )?;
        }

        chmod_read_only(&home)
    }

    fn install_runtime_base(&mut self) -> ProvisionResult<()> {
        let base = &self.config.base;
        if let Some(skeleton) = &base.skeleton {
            copy_tree(&self.plugin_path(skeleton), &self.target.deployment_root)?;
        }
        if let Some(assets) = &base.assets {
            copy_tree(&self.plugin_path(assets), &self.target.runtime_base)?;
        }

        for dir in &base.writable {
            let dir = self.target.runtime_base.join(dir);
            ensure_dir(&dir, "base.create_writable")?;
            chmod_read_write(&dir)?;
        }

        let webapp = self.target.runtime_base.join(&base.webapp);
        ensure_dir(&webapp, "base.create_webapp")?;
        info!("Deploying {}", self.target.application_archive.display());
        extract(&self.target.application_archive, &webapp)?;
        chmod_read_write(&webapp)
    }

    fn install_agents(&mut self) -> ProvisionResult<()> {
        let vars = self.target.template_vars(self.request.port);
        for (index, agent) in self.config.agents.iter().enumerate() {
            let jar = copy_artifact_to_directory(
                &self.plugin_path(&agent.source),
                &agent.artifact,
                &agent.extension,
                &self.target.agent_lib_dir,
            )?;

            let companion = vars.expand(&format!("agents[{index}].companion"), &agent.companion)?;
            if !Path::new(&companion).exists() {
                if agent.require_companion {
                    return Err(ProvisionError::state(
                        &companion,
                        format!("companion file of agent '{}' does not exist", agent.artifact),
                    ));
                }
                warn!("Companion file not found at {}", companion);
            }

            let mut line = format!(
                "-javaagent:{}={}{}",
                jar.display(),
                agent.argument_prefix,
                companion
            );
            let extra =
                vars.expand_joined(&format!("agents[{index}].extra_options"), &agent.extra_options)?;
            if !extra.is_empty() {
                line.push(' ');
                line.push_str(&extra);
            }
            write_control(
                &self.target.control_dir,
                &mut self.generated,
                &agent.options_file,
                &line,
            )?;
        }
        Ok(())
    }

    fn write_java_options(&mut self) -> ProvisionResult<()> {
        let control_dir = &self.target.control_dir;
        let opts = self.metadata.runtime_parameter("java", "opts", "");
        write_control(control_dir, &mut self.generated, CORE_OPTIONS_FILE, &opts)?;

        let java = &self.config.java;
        if let Some(file) = &java.runtime_options_file {
            let vars = self.target.template_vars(self.request.port);
            let opts = vars.expand_joined("java.runtime_options", &java.runtime_options)?;
            write_control(control_dir, &mut self.generated, file, &opts)?;
        }
        Ok(())
    }

    fn write_control_config(&mut self) -> ProvisionResult<()> {
        let java = resolve_java(self.metadata, &self.config.java)?;
        let control = &self.config.control;
        let vars = self.target.template_vars(self.request.port);
        let runtime_home = self.target.runtime_home()?;

        let file = ControlConfigFile {
            app_dir: &self.target.deployment_root,
            app_tmp: &self.target.tmp_dir,
            log_dir: &self.target.log_dir,
            home_variable: &control.home_variable,
            runtime_home,
            base_variable: &control.base_variable,
            runtime_base: &self.target.runtime_base,
            port: self.request.port,
            java: &java.executable,
            java_home: &java.home,
            genapp_dir: &self.target.genapp_dir,
            opts_variable: &control.opts_variable,
            opts: vars.expand("control.opts", &control.opts)?,
            classpath: self
                .config
                .runtime
                .classpath
                .iter()
                .map(|entry| runtime_home.join(entry))
                .collect(),
        };
        let content = file.to_string();

        let path = self.target.control_dir.join(CONFIG_FILE);
        write_line_file(&path, content.trim_end_matches('\n'))?;
        self.generated.push(path);
        self.java = Some(java);
        Ok(())
    }

    fn install_control_scripts(&mut self) -> ProvisionResult<()> {
        if let Some(scripts) = &self.config.control.scripts {
            copy_tree(&self.plugin_path(scripts), &self.target.control_dir)?;
        }
        chmod_read_execute(&self.target.control_dir)?;

        let lib_dir = &self.target.genapp_lib_dir;
        ensure_dir(lib_dir, "control.create_lib_dir")?;
        for library in &self.config.control.libraries {
            let artifact = &library.artifact;
            let copied = copy_artifact_to_directory(
                &self.plugin_path(&artifact.source),
                &artifact.artifact,
                &artifact.extension,
                lib_dir,
            )?;
            if let Some(link) = &library.link {
                link_library(&copied, &lib_dir.join(link))?;
            }
        }
        Ok(())
    }
}

/// A home left read-only by an earlier run has to be writable again before
/// its files can be replaced.
fn unlock_previous_home(home: &Path) -> ProvisionResult<()> {
    debug!("Unlocking existing runtime home {}", home.display());
    chmod_read_write(home)
}

fn write_control(
    control_dir: &Path,
    generated: &mut Vec<PathBuf>,
    name: &str,
    content: &str,
) -> ProvisionResult<()> {
    let path = control_dir.join(name);
    write_line_file(&path, content)?;
    generated.push(path);
    Ok(())
}

/// Point a version-less name at a copied library.
fn link_library(library: &Path, link: &Path) -> ProvisionResult<()> {
    clear_file_slot(link)?;
    debug!("Link {} -> {}", link.display(), library.display());
    create_link(library, link).map_err(|err| ProvisionError::io("control.link_library", link, err))
}

#[cfg(unix)]
fn create_link(library: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(library, link)
}

#[cfg(not(unix))]
fn create_link(library: &Path, link: &Path) -> std::io::Result<()> {
    std::fs::copy(library, link).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_names_are_stable() {
        let names: Vec<_> = StepKind::ORDER.iter().map(|s| s.as_str()).collect();
        assert_eq!(
            names,
            [
                "prepare-target",
                "install-runtime-home",
                "install-runtime-base",
                "install-agents",
                "write-java-options",
                "write-control-config",
                "install-control-scripts",
            ]
        );
        assert_eq!(StepKind::InstallAgents.to_string(), "install-agents");
    }

    #[test]
    fn step_errors_keep_their_cause() {
        let err = ProvisionError::Step {
            step: StepKind::WriteControlConfig,
            source: Box::new(ProvisionError::state("/opt/java7", "missing")),
        };
        assert_eq!(err.to_string(), "step 'write-control-config' failed");
        assert_eq!(err.step(), Some(StepKind::WriteControlConfig));
    }
}
