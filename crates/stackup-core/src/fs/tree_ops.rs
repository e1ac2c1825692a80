//! Recursive tree operations built on [`TreeWalker`].

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use crate::error::{ProvisionError, ProvisionResult};
use crate::fs::permissions::{PermissionBits, PermissionProfile, symbolic_mode};
use crate::fs::walker::{EntryKind, TreeWalker};

/// Remove `root` and everything below it, children before parents.
///
/// A failure stops the rest of the failing directory; directories already
/// removed stay removed. A missing root is an error. A symlinked root is
/// removed as a link; its target is left alone.
pub fn delete_subtree(root: &Path) -> ProvisionResult<()> {
    delete_subtree_with(root, |file| fs::remove_file(file))
}

fn delete_subtree_with(
    root: &Path,
    mut remove_file: impl FnMut(&Path) -> io::Result<()>,
) -> ProvisionResult<()> {
    debug!("Delete tree {}", root.display());
    let meta = fs::symlink_metadata(root)
        .map_err(|err| ProvisionError::io("delete.stat_root", root, err))?;
    if meta.file_type().is_symlink() {
        trace!("Delete link: {}", root.display());
        return remove_file(root).map_err(|err| ProvisionError::io("delete.remove_link", root, err));
    }

    TreeWalker::new()
        .on_file(|file, _| {
            trace!("Delete file: {}", file.display());
            remove_file(file).map_err(|err| ProvisionError::io("delete.remove_file", file, err))
        })
        .on_exit_dir(|dir, err| {
            if let Some(err) = err {
                return Err(err);
            }
            trace!("Delete dir: {}", dir.display());
            fs::remove_dir(dir).map_err(|err| ProvisionError::io("delete.remove_dir", dir, err))
        })
        .walk(root)
}

/// Apply `profile` to every entry under `root`.
///
/// Directory modes are set on entry, before their children are visited.
/// Symlinks are left untouched.
pub fn apply_permission_profile(root: &Path, profile: &PermissionProfile) -> ProvisionResult<()> {
    debug!("Apply {} to {}", profile, root.display());
    let file_bits = profile.file_permissions();
    let dir_bits = profile.directory_permissions();

    TreeWalker::new()
        .on_enter_dir(|dir| set_mode(dir, dir_bits, "chmod.set_dir"))
        .on_file(|file, kind| {
            if kind == EntryKind::Symlink {
                trace!("Skip symlink {}", file.display());
                return Ok(());
            }
            if file.is_dir() {
                return Err(ProvisionError::state(file, "expected a plain file, found a directory"));
            }
            set_mode(file, file_bits, "chmod.set_file")
        })
        .walk(root)
}

/// Files `r--`, directories `r-x` (owner and group).
pub fn chmod_read_only(root: &Path) -> ProvisionResult<()> {
    apply_permission_profile(root, &PermissionProfile::READ_ONLY)
}

/// Files and directories `r-x` (owner and group).
pub fn chmod_read_execute(root: &Path) -> ProvisionResult<()> {
    apply_permission_profile(root, &PermissionProfile::READ_EXECUTE)
}

/// Files `rw-`, directories `rwx` (owner and group).
pub fn chmod_read_write(root: &Path) -> ProvisionResult<()> {
    apply_permission_profile(root, &PermissionProfile::READ_WRITE)
}

#[cfg(unix)]
fn set_mode(path: &Path, bits: PermissionBits, operation: &'static str) -> ProvisionResult<()> {
    use std::os::unix::fs::PermissionsExt;
    trace!("chmod {} {}", bits, path.display());
    fs::set_permissions(path, fs::Permissions::from_mode(bits.mode()))
        .map_err(|err| ProvisionError::io(operation, path, err))
}

#[cfg(not(unix))]
fn set_mode(path: &Path, bits: PermissionBits, operation: &'static str) -> ProvisionResult<()> {
    let meta = fs::metadata(path).map_err(|err| ProvisionError::io(operation, path, err))?;
    let mut perms = meta.permissions();
    perms.set_readonly(!bits.contains(PermissionBits::OWNER_WRITE));
    fs::set_permissions(path, perms).map_err(|err| ProvisionError::io(operation, path, err))
}

/// Mirror the tree under `source` into `destination`.
///
/// Missing directories are created, existing ones are kept along with any
/// unrelated entries they hold. Files at colliding relative paths are
/// replaced. Overlapping trees (either one inside the other) are rejected
/// before anything is written.
pub fn copy_tree(source: &Path, destination: &Path) -> ProvisionResult<()> {
    debug!("Copy from {} to {}", source.display(), destination.display());
    let resolved_source = fs::canonicalize(source)
        .map_err(|err| ProvisionError::io("copy.resolve_source", source, err))?;
    let resolved_destination = resolve_planned(destination)?;
    if resolved_destination.starts_with(&resolved_source)
        || resolved_source.starts_with(&resolved_destination)
    {
        return Err(ProvisionError::state(
            destination,
            format!("copy target overlaps source {}", source.display()),
        ));
    }

    let target_of = |path: &Path| -> ProvisionResult<PathBuf> {
        let relative = path.strip_prefix(source).map_err(|_| {
            ProvisionError::state(path, format!("not under {}", source.display()))
        })?;
        Ok(destination.join(relative))
    };

    TreeWalker::new()
        .on_enter_dir(|dir| {
            let target = target_of(dir)?;
            ensure_dir(&target, "copy.create_dir")
        })
        .on_file(|file, _| {
            let target = target_of(file)?;
            replace_file_with_copy(file, &target)
        })
        .walk(source)
}

/// Canonical form of `path`, which may not exist yet: the deepest existing
/// ancestor is resolved and the missing components are appended.
fn resolve_planned(path: &Path) -> ProvisionResult<PathBuf> {
    let absolute =
        std::path::absolute(path).map_err(|err| ProvisionError::io("copy.resolve", path, err))?;
    let mut existing = absolute.as_path();
    let mut missing = Vec::new();
    loop {
        match fs::canonicalize(existing) {
            Ok(resolved) => {
                return Ok(missing
                    .iter()
                    .rev()
                    .fold(resolved, |acc: PathBuf, name| acc.join(name)));
            }
            Err(err) => match (existing.parent(), existing.file_name()) {
                (Some(parent), Some(name)) => {
                    missing.push(name);
                    existing = parent;
                }
                _ => return Err(ProvisionError::io("copy.resolve", path, err)),
            },
        }
    }
}

/// Copy `file` into the existing directory `dir`, keeping its file name.
pub fn copy_to_directory(file: &Path, dir: &Path) -> ProvisionResult<PathBuf> {
    if !dir.is_dir() {
        return Err(ProvisionError::state(dir, "destination is not a directory"));
    }
    let name = file
        .file_name()
        .ok_or_else(|| ProvisionError::state(file, "source has no file name"))?;
    let target = dir.join(name);
    replace_file_with_copy(file, &target)?;
    Ok(target)
}

/// Create `dir` unless it already exists as a directory.
pub(crate) fn ensure_dir(dir: &Path, operation: &'static str) -> ProvisionResult<()> {
    match fs::symlink_metadata(dir) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(ProvisionError::state(dir, "expected a directory, found a file")),
        Err(_) => {
            trace!("Create dir {}", dir.display());
            fs::create_dir_all(dir).map_err(|err| ProvisionError::io(operation, dir, err))
        }
    }
}

/// Remove whatever non-directory entry sits at `target`, so that read-only
/// leftovers from an earlier run do not block the write.
pub(crate) fn clear_file_slot(target: &Path) -> ProvisionResult<()> {
    match fs::symlink_metadata(target) {
        Ok(meta) if meta.is_dir() => Err(ProvisionError::state(
            target,
            "cannot replace a directory with a file",
        )),
        Ok(_) => fs::remove_file(target)
            .map_err(|err| ProvisionError::io("replace.remove_existing", target, err)),
        Err(_) => Ok(()),
    }
}

fn replace_file_with_copy(from: &Path, to: &Path) -> ProvisionResult<()> {
    clear_file_slot(to)?;
    trace!("Copy {} to {}", from.display(), to.display());
    fs::copy(from, to).map_err(|err| ProvisionError::io("copy.file", to, err))?;
    Ok(())
}

/// Render `root` as an indented listing with symbolic modes.
///
/// ```text
///  + webapps	rwxrwx---
///   + ROOT	rwxrwx---
///    |- index.html	rw-rw----
/// ```
pub fn render_tree(root: &Path) -> ProvisionResult<String> {
    let entries = std::cell::RefCell::new(Vec::new());
    TreeWalker::new()
        .on_enter_dir(|dir| {
            entries.borrow_mut().push((dir.to_path_buf(), true));
            Ok(())
        })
        .on_file(|file, _| {
            entries.borrow_mut().push((file.to_path_buf(), false));
            Ok(())
        })
        .walk(root)?;

    let base_depth = root.components().count();
    let mut out = String::new();
    for (path, is_dir) in entries.into_inner() {
        let meta = fs::symlink_metadata(&path)
            .map_err(|err| ProvisionError::io("tree.stat", &path, err))?;
        let depth = path.components().count().saturating_sub(base_depth) + 1;
        let icon = if is_dir { " + " } else { " |- " };
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        out.push_str(&" ".repeat(depth));
        out.push_str(icon);
        out.push_str(&name);
        out.push('\t');
        out.push_str(&symbolic_mode(mode_of(&meta)));
        out.push('\n');
    }
    Ok(out)
}

#[cfg(unix)]
fn mode_of(meta: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode()
}

#[cfg(not(unix))]
fn mode_of(meta: &fs::Metadata) -> u32 {
    if meta.permissions().readonly() { 0o444 } else { 0o666 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_file(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create_dir_all should succeed in test temp dirs");
        }
        fs::write(path, content).expect("write should succeed in test temp dirs");
    }

    fn populated(root: &Path) {
        write_file(&root.join("conf").join("server.xml"), "<Server/>");
        write_file(&root.join("conf").join("nested").join("ctx.xml"), "<Context/>");
        write_file(&root.join("README"), "readme");
        fs::create_dir_all(root.join("empty")).expect("create_dir_all should succeed");
    }

    // =========================================================================
    // delete_subtree
    // =========================================================================

    #[test]
    fn delete_removes_everything() {
        let tmp = TempDir::new().expect("tempdir should succeed");
        let root = tmp.path().join("tree");
        populated(&root);

        delete_subtree(&root).expect("delete should succeed");
        assert!(!root.exists());
    }

    #[test]
    fn delete_missing_root_is_io_failure() {
        let tmp = TempDir::new().expect("tempdir should succeed");
        let err = delete_subtree(&tmp.path().join("nope")).expect_err("delete should fail");
        assert_eq!(err.kind(), crate::ErrorKind::IoFailure);
    }

    #[test]
    fn delete_failure_keeps_failing_directory_and_later_siblings() {
        let tmp = TempDir::new().expect("tempdir should succeed");
        let root = tmp.path().join("tree");
        write_file(&root.join("a_done").join("x.txt"), "x");
        write_file(&root.join("b_fail").join("y.txt"), "y");
        write_file(&root.join("b_fail").join("z.txt"), "z");
        write_file(&root.join("c_later").join("w.txt"), "w");

        let err = delete_subtree_with(&root, |file| {
            if file.ends_with("y.txt") {
                Err(io::Error::other("injected failure"))
            } else {
                fs::remove_file(file)
            }
        })
        .expect_err("delete should fail");

        assert_eq!(err.kind(), crate::ErrorKind::IoFailure);
        assert_eq!(err.path(), Some(root.join("b_fail").join("y.txt").as_path()));
        assert!(!root.join("a_done").exists());
        assert!(root.join("b_fail").join("y.txt").is_file());
        assert!(root.join("b_fail").join("z.txt").is_file());
        assert!(root.join("c_later").join("w.txt").is_file());
    }

    #[cfg(unix)]
    #[test]
    fn delete_symlinked_root_removes_only_the_link() {
        let tmp = TempDir::new().expect("tempdir should succeed");
        let real = tmp.path().join("real");
        write_file(&real.join("sub").join("keep.txt"), "keep");
        let link = tmp.path().join("link");
        std::os::unix::fs::symlink(&real, &link).expect("symlink should succeed");

        delete_subtree(&link).expect("delete should succeed");

        assert!(fs::symlink_metadata(&link).is_err());
        assert!(real.join("sub").join("keep.txt").is_file());
    }

    #[test]
    fn delete_single_file_root() {
        let tmp = TempDir::new().expect("tempdir should succeed");
        let file = tmp.path().join("lonely.txt");
        write_file(&file, "x");
        delete_subtree(&file).expect("delete should succeed");
        assert!(!file.exists());
    }

    // =========================================================================
    // apply_permission_profile
    // =========================================================================

    #[cfg(unix)]
    fn mode(path: &Path) -> u32 {
        use std::os::unix::fs::PermissionsExt;
        fs::metadata(path).expect("metadata should succeed").permissions().mode() & 0o777
    }

    #[cfg(unix)]
    #[test]
    fn profile_sets_file_and_directory_modes() {
        let tmp = TempDir::new().expect("tempdir should succeed");
        let root = tmp.path().join("tree");
        populated(&root);

        for profile in [
            PermissionProfile::READ_WRITE,
            PermissionProfile::READ_EXECUTE,
            PermissionProfile::READ_ONLY,
        ] {
            apply_permission_profile(&root, &profile).expect("chmod should succeed");
            assert_eq!(mode(&root), profile.directory_permissions().mode());
            assert_eq!(mode(&root.join("conf")), profile.directory_permissions().mode());
            assert_eq!(mode(&root.join("empty")), profile.directory_permissions().mode());
            assert_eq!(
                mode(&root.join("conf").join("nested").join("ctx.xml")),
                profile.file_permissions().mode()
            );
            assert_eq!(mode(&root.join("README")), profile.file_permissions().mode());
        }

        chmod_read_write(&root).expect("chmod should succeed");
    }

    #[cfg(unix)]
    #[test]
    fn profile_on_single_file() {
        let tmp = TempDir::new().expect("tempdir should succeed");
        let file = tmp.path().join("run.sh");
        write_file(&file, "#!/bin/sh");
        chmod_read_execute(&file).expect("chmod should succeed");
        assert_eq!(mode(&file), 0o550);
    }

    // =========================================================================
    // copy_tree / copy_to_directory
    // =========================================================================

    #[test]
    fn copy_mirrors_structure_and_content() {
        let tmp = TempDir::new().expect("tempdir should succeed");
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        populated(&src);

        copy_tree(&src, &dst).expect("copy should succeed");

        assert_eq!(
            fs::read_to_string(dst.join("conf").join("nested").join("ctx.xml"))
                .expect("read should succeed"),
            "<Context/>"
        );
        assert_eq!(
            fs::read_to_string(dst.join("README")).expect("read should succeed"),
            "readme"
        );
        assert!(dst.join("empty").is_dir());
    }

    #[test]
    fn copy_keeps_unrelated_entries_and_overwrites_collisions() {
        let tmp = TempDir::new().expect("tempdir should succeed");
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        populated(&src);
        write_file(&dst.join("conf").join("local.properties"), "keep=me");
        write_file(&dst.join("README"), "stale");

        copy_tree(&src, &dst).expect("copy should succeed");

        assert_eq!(
            fs::read_to_string(dst.join("conf").join("local.properties"))
                .expect("read should succeed"),
            "keep=me"
        );
        assert_eq!(
            fs::read_to_string(dst.join("README")).expect("read should succeed"),
            "readme"
        );
    }

    #[cfg(unix)]
    #[test]
    fn copy_replaces_read_only_files() {
        let tmp = TempDir::new().expect("tempdir should succeed");
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        populated(&src);
        copy_tree(&src, &dst).expect("first copy should succeed");
        apply_permission_profile(
            &dst.join("README"),
            &PermissionProfile::READ_ONLY,
        )
        .expect("chmod should succeed");
        write_file(&src.join("README"), "fresh");

        copy_tree(&src, &dst).expect("second copy should succeed");
        assert_eq!(
            fs::read_to_string(dst.join("README")).expect("read should succeed"),
            "fresh"
        );
    }

    #[test]
    fn copy_onto_file_where_directory_expected_fails() {
        let tmp = TempDir::new().expect("tempdir should succeed");
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        populated(&src);
        write_file(&dst.join("conf"), "i am a file");

        let err = copy_tree(&src, &dst).expect_err("copy should fail");
        assert_eq!(err.kind(), crate::ErrorKind::StateViolation);
    }

    #[test]
    fn copy_into_own_subtree_is_rejected() {
        let tmp = TempDir::new().expect("tempdir should succeed");
        let src = tmp.path().join("src");
        populated(&src);

        let err = copy_tree(&src, &src.join("nested").join("copy"))
            .expect_err("copy into itself should fail");
        assert_eq!(err.kind(), crate::ErrorKind::StateViolation);
        assert!(!src.join("nested").exists());

        let err = copy_tree(&src.join("conf"), &src).expect_err("copy onto ancestor should fail");
        assert_eq!(err.kind(), crate::ErrorKind::StateViolation);

        let err = copy_tree(&src, &src).expect_err("copy onto itself should fail");
        assert_eq!(err.kind(), crate::ErrorKind::StateViolation);
    }

    #[test]
    fn copy_to_directory_requires_directory() {
        let tmp = TempDir::new().expect("tempdir should succeed");
        let file = tmp.path().join("lib.jar");
        write_file(&file, "jar");

        let err = copy_to_directory(&file, &tmp.path().join("missing"))
            .expect_err("copy should fail");
        assert_eq!(err.kind(), crate::ErrorKind::StateViolation);

        let dir = tmp.path().join("target");
        fs::create_dir(&dir).expect("create_dir should succeed");
        let copied = copy_to_directory(&file, &dir).expect("copy should succeed");
        assert_eq!(copied, dir.join("lib.jar"));
        assert!(copied.is_file());
    }

    // =========================================================================
    // render_tree
    // =========================================================================

    #[cfg(unix)]
    #[test]
    fn render_tree_lists_entries_with_modes() {
        let tmp = TempDir::new().expect("tempdir should succeed");
        let root = tmp.path().join("tree");
        populated(&root);
        chmod_read_write(&root).expect("chmod should succeed");

        let dump = render_tree(&root).expect("render should succeed");
        assert!(dump.contains(" + tree\trwxrwx---"));
        assert!(dump.contains("  + conf\trwxrwx---"));
        assert!(dump.contains("    |- ctx.xml\trw-rw----"));
        assert!(dump.contains("  |- README\trw-rw----"));
    }
}
