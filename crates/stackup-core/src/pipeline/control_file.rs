//! Generated control files.
//!
//! The launcher sources `config` as shell assignments, so line order and
//! quoting are fixed: paths are double-quoted, the port is bare.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::trace;

use crate::error::{ProvisionError, ProvisionResult};
use crate::fs::tree_ops::clear_file_slot;

/// Contents of the control `config` file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlConfigFile<'a> {
    pub app_dir: &'a Path,
    pub app_tmp: &'a Path,
    pub log_dir: &'a Path,
    pub home_variable: &'a str,
    pub runtime_home: &'a Path,
    pub base_variable: &'a str,
    pub runtime_base: &'a Path,
    pub port: u16,
    pub java: &'a Path,
    pub java_home: &'a Path,
    pub genapp_dir: &'a Path,
    pub opts_variable: &'a str,
    pub opts: String,
    pub classpath: Vec<PathBuf>,
}

impl fmt::Display for ControlConfigFile<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "app_dir=\"{}\"", self.app_dir.display())?;
        writeln!(f, "app_tmp=\"{}\"", self.app_tmp.display())?;
        writeln!(f, "log_dir=\"{}\"", self.log_dir.display())?;
        writeln!(f, "{}=\"{}\"", self.home_variable, self.runtime_home.display())?;
        writeln!(f, "{}=\"{}\"", self.base_variable, self.runtime_base.display())?;
        writeln!(f, "port={}", self.port)?;
        writeln!(f, "java=\"{}\"", self.java.display())?;
        writeln!(f, "JAVA_HOME=\"{}\"", self.java_home.display())?;
        writeln!(f, "genapp_dir=\"{}\"", self.genapp_dir.display())?;
        writeln!(f, "{}=\"{}\"", self.opts_variable, self.opts)?;
        let classpath = self
            .classpath
            .iter()
            .map(|entry| entry.display().to_string())
            .collect::<Vec<_>>()
            .join(":");
        writeln!(f, "java_classpath=\"{classpath}\"")
    }
}

/// Write `content` followed by a newline, replacing any existing file.
pub fn write_line_file(path: &Path, content: &str) -> ProvisionResult<()> {
    clear_file_slot(path)?;
    trace!("Write {}", path.display());
    fs::write(path, format!("{content}\n"))
        .map_err(|err| ProvisionError::io("control.write", path, err))
}
