//! Artifact lookup by naming convention.
//!
//! Plugin directories ship versioned files (`mysql-connector-java-5.1.25.jar`,
//! `tomcat-8.0.3.zip`, ...). Callers know the identifier and the extension but
//! not the version, so a lookup lists the directory and requires exactly one
//! entry named `<identifier>*.<extension>`. Anything else is an error: a
//! second match usually means a stale version was left behind, and picking
//! one silently would install the wrong library.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{ProvisionError, ProvisionResult};
use crate::fs::copy_to_directory;

/// Default artifact extension.
pub const JAR: &str = "jar";

/// Find the single file in `source_dir` whose name starts with `prefix` and
/// ends with `.<extension>`. Only direct children are considered.
pub fn find_artifact(source_dir: &Path, prefix: &str, extension: &str) -> ProvisionResult<PathBuf> {
    let suffix = format!(".{extension}");
    let matches = list_matching(source_dir, |name, is_dir| {
        !is_dir && name.starts_with(prefix) && name.ends_with(&suffix)
    })?;
    single_match(source_dir, prefix, extension, matches)
}

/// Find the single sub-directory of `dir` whose name starts with `prefix`.
pub fn find_unique_directory(dir: &Path, prefix: &str) -> ProvisionResult<PathBuf> {
    let matches = list_matching(dir, |name, is_dir| is_dir && name.starts_with(prefix))?;
    single_match(dir, prefix, "", matches)
}

/// Locate `<prefix>*.<extension>` in `source_dir` and copy it into `dest_dir`.
/// Returns the path of the copy.
pub fn copy_artifact_to_directory(
    source_dir: &Path,
    prefix: &str,
    extension: &str,
    dest_dir: &Path,
) -> ProvisionResult<PathBuf> {
    let artifact = find_artifact(source_dir, prefix, extension)?;
    let copied = copy_to_directory(&artifact, dest_dir)?;
    debug!("Installed {} into {}", artifact.display(), dest_dir.display());
    Ok(copied)
}

fn list_matching(
    dir: &Path,
    accept: impl Fn(&str, bool) -> bool,
) -> ProvisionResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(ProvisionError::state(dir, "artifact source is not a directory"));
    }

    let entries =
        fs::read_dir(dir).map_err(|err| ProvisionError::io("artifact.read_dir", dir, err))?;
    let mut matches = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| ProvisionError::io("artifact.read_dir_entry", dir, err))?;
        let name = entry.file_name();
        let is_dir = entry.path().is_dir();
        if accept(&name.to_string_lossy(), is_dir) {
            matches.push(entry.path());
        }
    }
    matches.sort();
    Ok(matches)
}

fn single_match(
    dir: &Path,
    prefix: &str,
    extension: &str,
    mut matches: Vec<PathBuf>,
) -> ProvisionResult<PathBuf> {
    match matches.len() {
        0 => Err(ProvisionError::NotFound {
            prefix: prefix.to_string(),
            extension: extension.to_string(),
            dir: dir.to_path_buf(),
        }),
        1 => Ok(matches.remove(0)),
        _ => Err(ProvisionError::Ambiguous {
            prefix: prefix.to_string(),
            extension: extension.to_string(),
            dir: dir.to_path_buf(),
            matches,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), name).expect("write should succeed in test temp dirs");
    }

    #[test]
    fn finds_the_single_match() {
        let tmp = TempDir::new().expect("tempdir should succeed");
        touch(tmp.path(), "foo-1.0.jar");
        touch(tmp.path(), "bar-2.0.jar");

        let found = find_artifact(tmp.path(), "foo", JAR).expect("lookup should succeed");
        assert_eq!(found, tmp.path().join("foo-1.0.jar"));
    }

    #[test]
    fn missing_identifier_is_not_found() {
        let tmp = TempDir::new().expect("tempdir should succeed");
        touch(tmp.path(), "foo-1.0.jar");
        touch(tmp.path(), "bar-2.0.jar");

        let err = find_artifact(tmp.path(), "baz", JAR).expect_err("lookup should fail");
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn extension_must_match() {
        let tmp = TempDir::new().expect("tempdir should succeed");
        touch(tmp.path(), "foo-1.0.jar");

        let err = find_artifact(tmp.path(), "foo", "zip").expect_err("lookup should fail");
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn two_versions_are_ambiguous() {
        let tmp = TempDir::new().expect("tempdir should succeed");
        touch(tmp.path(), "foo-1.0.jar");
        touch(tmp.path(), "foo-1.1.jar");

        let err = find_artifact(tmp.path(), "foo", JAR).expect_err("lookup should fail");
        match err {
            ProvisionError::Ambiguous { matches, .. } => {
                assert_eq!(
                    matches,
                    vec![tmp.path().join("foo-1.0.jar"), tmp.path().join("foo-1.1.jar")]
                );
            }
            other => panic!("expected Ambiguous, got {other:?}"),
        }
    }

    #[test]
    fn version_suffix_prefix_collision_is_ambiguous() {
        let tmp = TempDir::new().expect("tempdir should succeed");
        touch(tmp.path(), "foo-1.2.jar");
        touch(tmp.path(), "foo-1.20.jar");

        let err = find_artifact(tmp.path(), "foo-1.2", JAR).expect_err("lookup should fail");
        assert_eq!(err.kind(), ErrorKind::Ambiguous);
    }

    #[test]
    fn lookup_is_not_recursive_and_ignores_directories() {
        let tmp = TempDir::new().expect("tempdir should succeed");
        fs::create_dir_all(tmp.path().join("nested")).expect("create_dir_all should succeed");
        touch(&tmp.path().join("nested"), "foo-1.0.jar");
        fs::create_dir_all(tmp.path().join("foo-dir.jar")).expect("create_dir_all should succeed");

        let err = find_artifact(tmp.path(), "foo", JAR).expect_err("lookup should fail");
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn source_must_be_a_directory() {
        let tmp = TempDir::new().expect("tempdir should succeed");
        touch(tmp.path(), "foo-1.0.jar");

        let err = find_artifact(&tmp.path().join("foo-1.0.jar"), "foo", JAR)
            .expect_err("lookup should fail");
        assert_eq!(err.kind(), ErrorKind::StateViolation);

        let err = find_artifact(&tmp.path().join("missing"), "foo", JAR)
            .expect_err("lookup should fail");
        assert_eq!(err.kind(), ErrorKind::StateViolation);
    }

    #[test]
    fn unique_directory_lookup() {
        let tmp = TempDir::new().expect("tempdir should succeed");
        fs::create_dir_all(tmp.path().join("apache-tomcat-7.0.42")).expect("create_dir_all");
        touch(tmp.path(), "apache-tomcat-notes.txt");

        let found =
            find_unique_directory(tmp.path(), "apache-tomcat").expect("lookup should succeed");
        assert_eq!(found, tmp.path().join("apache-tomcat-7.0.42"));

        fs::create_dir_all(tmp.path().join("apache-tomcat-7.0.50")).expect("create_dir_all");
        let err = find_unique_directory(tmp.path(), "apache-tomcat").expect_err("should fail");
        assert_eq!(err.kind(), ErrorKind::Ambiguous);
    }

    #[test]
    fn copy_artifact_lands_in_destination() {
        let tmp = TempDir::new().expect("tempdir should succeed");
        let src = tmp.path().join("deps");
        let dst = tmp.path().join("lib");
        fs::create_dir_all(&src).expect("create_dir_all should succeed");
        fs::create_dir_all(&dst).expect("create_dir_all should succeed");
        touch(&src, "mail-1.4.7.jar");

        let copied =
            copy_artifact_to_directory(&src, "mail", JAR, &dst).expect("copy should succeed");
        assert_eq!(copied, dst.join("mail-1.4.7.jar"));
        assert_eq!(
            fs::read_to_string(&copied).expect("read should succeed"),
            "mail-1.4.7.jar"
        );
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn non_utf8_names_still_count_as_matches() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let tmp = TempDir::new().expect("tempdir should succeed");
        touch(tmp.path(), "foo-1.0.jar");
        let odd = tmp.path().join(OsStr::from_bytes(b"foo-\xff.jar"));
        fs::write(&odd, "odd").expect("write should succeed");

        let err = find_artifact(tmp.path(), "foo", JAR).expect_err("lookup should fail");
        match err {
            ProvisionError::Ambiguous { matches, .. } => {
                assert_eq!(matches.len(), 2);
                assert!(matches.contains(&odd));
            }
            other => panic!("expected Ambiguous, got {other:?}"),
        }
    }
}
