//! Java installation lookup.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::config::JavaConfig;
use crate::error::{ProvisionError, ProvisionResult};
use crate::metadata::MetadataProvider;

/// A Java installation selected for the deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JavaInstallation {
    pub version: String,
    pub home: PathBuf,
    pub executable: PathBuf,
}

/// Pick JAVA_HOME from the requested version.
///
/// The version comes from `<version_namespace>.version`; versions without a
/// configured home fall back to the default version's home.
pub fn resolve_java(
    metadata: &dyn MetadataProvider,
    config: &JavaConfig,
) -> ProvisionResult<JavaInstallation> {
    let requested =
        metadata.runtime_parameter(&config.version_namespace, "version", &config.default_version);

    let (version, home) = match config.homes.get(&requested) {
        Some(home) => (requested, home),
        None => {
            let home = config.homes.get(&config.default_version).ok_or_else(|| {
                ProvisionError::config(
                    "java.default_version",
                    format!("no home configured for version '{}'", config.default_version),
                )
            })?;
            warn!(
                "No java home for version '{}', using default {}",
                requested, config.default_version
            );
            (config.default_version.clone(), home)
        }
    };

    let home = PathBuf::from(home);
    if !home.is_dir() {
        return Err(ProvisionError::state(
            &home,
            "java home does not exist or is not a directory",
        ));
    }
    let executable = java_executable(&home);
    if !executable.exists() || executable.is_dir() {
        return Err(ProvisionError::state(
            &executable,
            "java executable does not exist or is not a file",
        ));
    }

    debug!("Java {} at {}", version, home.display());
    Ok(JavaInstallation {
        version,
        home,
        executable,
    })
}

fn java_executable(home: &Path) -> PathBuf {
    home.join("bin").join("java")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use crate::metadata::Metadata;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn fake_home(root: &Path, name: &str) -> PathBuf {
        let home = root.join(name);
        fs::create_dir_all(home.join("bin")).expect("create_dir_all should succeed");
        fs::write(home.join("bin").join("java"), b"#!/bin/sh\n").expect("write should succeed");
        home
    }

    fn config(tmp: &Path) -> JavaConfig {
        let mut config = JavaConfig::default();
        config.homes.clear();
        config
            .homes
            .insert("1.7".to_string(), fake_home(tmp, "java7").display().to_string());
        config
            .homes
            .insert("1.8".to_string(), fake_home(tmp, "java8").display().to_string());
        config
    }

    #[test]
    fn requested_version_wins() {
        let tmp = TempDir::new().expect("tempdir should succeed");
        let metadata =
            Metadata::from_value(json!({ "java": { "version": "1.8" } })).expect("metadata");

        let java = resolve_java(&metadata, &config(tmp.path())).expect("resolve should succeed");
        assert_eq!(java.version, "1.8");
        assert_eq!(java.home, tmp.path().join("java8"));
        assert_eq!(java.executable, tmp.path().join("java8/bin/java"));
    }

    #[test]
    fn unknown_version_falls_back_to_default() {
        let tmp = TempDir::new().expect("tempdir should succeed");
        let metadata =
            Metadata::from_value(json!({ "java": { "version": "11" } })).expect("metadata");

        let java = resolve_java(&metadata, &config(tmp.path())).expect("resolve should succeed");
        assert_eq!(java.version, "1.7");
        assert_eq!(java.home, tmp.path().join("java7"));
    }

    #[test]
    fn namespace_is_configurable() {
        let tmp = TempDir::new().expect("tempdir should succeed");
        let mut config = config(tmp.path());
        config.version_namespace = "javaHome".to_string();
        let metadata =
            Metadata::from_value(json!({ "javaHome": { "version": "1.8" } })).expect("metadata");

        let java = resolve_java(&metadata, &config).expect("resolve should succeed");
        assert_eq!(java.version, "1.8");
    }

    #[test]
    fn missing_home_or_executable_is_state_violation() {
        let tmp = TempDir::new().expect("tempdir should succeed");
        let mut config = config(tmp.path());
        config
            .homes
            .insert("1.7".to_string(), tmp.path().join("absent").display().to_string());
        let err = resolve_java(&Metadata::empty(), &config).expect_err("resolve should fail");
        assert_eq!(err.kind(), ErrorKind::StateViolation);

        let broken = tmp.path().join("broken");
        fs::create_dir_all(broken.join("bin").join("java")).expect("create_dir_all");
        config
            .homes
            .insert("1.7".to_string(), broken.display().to_string());
        let err = resolve_java(&Metadata::empty(), &config).expect_err("resolve should fail");
        assert_eq!(err.kind(), ErrorKind::StateViolation);
        assert_eq!(err.path(), Some(broken.join("bin").join("java").as_path()));
    }
}
