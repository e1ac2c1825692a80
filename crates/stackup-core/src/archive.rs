//! Zip archive extraction.
//!
//! An archive is opened as an [`ArchiveView`]: a read-only virtual directory
//! tree indexed from the zip central directory. Extraction walks that tree
//! with the same [`TreeWalker`] used for local trees, creating directories on
//! entry and copying file entries over whatever sits at the destination.
//!
//! Entry names are validated when the view is opened; absolute names and
//! names with `..` segments are rejected before anything is written.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, trace};
use zip::ZipArchive;

use crate::error::{ProvisionError, ProvisionResult};
use crate::fs::tree_ops::{clear_file_slot, ensure_dir};
use crate::fs::walker::{EntryKind, TreeSource, TreeWalker};

#[derive(Debug)]
enum VirtualNode {
    Directory(BTreeSet<PathBuf>),
    File(usize),
}

/// Read-only view of a zip archive as a directory tree rooted at `""`.
///
/// The underlying file handle is held for the lifetime of the view and
/// released when it is dropped.
pub struct ArchiveView {
    path: PathBuf,
    archive: RefCell<ZipArchive<File>>,
    nodes: BTreeMap<PathBuf, VirtualNode>,
}

impl std::fmt::Debug for ArchiveView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveView")
            .field("path", &self.path)
            .field("entries", &self.nodes.len())
            .finish()
    }
}

impl ArchiveView {
    /// Open `path` and index its entries.
    pub fn open(path: &Path) -> ProvisionResult<Self> {
        let file = File::open(path).map_err(|err| ProvisionError::io("archive.open", path, err))?;
        let mut archive = ZipArchive::new(file)
            .map_err(|err| ProvisionError::archive("archive.decode", path, err))?;

        let mut nodes = BTreeMap::new();
        nodes.insert(PathBuf::new(), VirtualNode::Directory(BTreeSet::new()));

        for index in 0..archive.len() {
            let (name, is_dir) = {
                let entry = archive
                    .by_index_raw(index)
                    .map_err(|err| ProvisionError::archive("archive.read_entry", path, err))?;
                (entry.name().to_string(), entry.is_dir())
            };
            let relative = sanitize_entry_name(path, &name)?;
            if relative.as_os_str().is_empty() {
                continue;
            }

            match (nodes.get(&relative), is_dir) {
                (Some(VirtualNode::File(_)), true) | (Some(VirtualNode::Directory(_)), false) => {
                    return Err(ProvisionError::state(
                        path,
                        format!("entry '{name}' is both a file and a directory"),
                    ));
                }
                (Some(VirtualNode::Directory(_)), true) => continue,
                _ => {}
            }

            let node = if is_dir {
                VirtualNode::Directory(BTreeSet::new())
            } else {
                VirtualNode::File(index)
            };
            nodes.insert(relative.clone(), node);
            attach(&mut nodes, path, &relative)?;
        }

        debug!(
            "Opened archive {} ({} entries)",
            path.display(),
            nodes.len() - 1
        );
        Ok(Self {
            path: path.to_path_buf(),
            archive: RefCell::new(archive),
            nodes,
        })
    }

    /// Virtual root of the archive tree.
    pub fn root(&self) -> &Path {
        Path::new("")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Relative paths of every file entry, in lexical order.
    pub fn files(&self) -> Vec<&Path> {
        self.nodes
            .iter()
            .filter(|(_, node)| matches!(node, VirtualNode::File(_)))
            .map(|(path, _)| path.as_path())
            .collect()
    }

    /// Write the content of the file entry at `entry` to `target`, replacing
    /// any existing file there.
    pub fn copy_entry(&self, entry: &Path, target: &Path) -> ProvisionResult<()> {
        let index = match self.nodes.get(entry) {
            Some(VirtualNode::File(index)) => *index,
            _ => {
                return Err(ProvisionError::state(
                    &self.path,
                    format!("no file entry '{}' in archive", entry.display()),
                ));
            }
        };

        let mut archive = self.archive.borrow_mut();
        let mut reader = archive
            .by_index(index)
            .map_err(|err| ProvisionError::archive("archive.read_entry", &self.path, err))?;

        clear_file_slot(target)?;
        trace!("Extract {} to {}", entry.display(), target.display());
        let mut output = File::create(target)
            .map_err(|err| ProvisionError::io("extract.create_file", target, err))?;
        io::copy(&mut reader, &mut output)
            .map_err(|err| ProvisionError::io("extract.copy", target, err))?;
        Ok(())
    }
}

impl TreeSource for ArchiveView {
    fn entry_kind(&self, path: &Path) -> ProvisionResult<EntryKind> {
        match self.nodes.get(path) {
            Some(VirtualNode::Directory(_)) => Ok(EntryKind::Directory),
            Some(VirtualNode::File(_)) => Ok(EntryKind::File),
            None => Err(ProvisionError::state(
                &self.path,
                format!("no entry '{}' in archive", path.display()),
            )),
        }
    }

    fn children(&self, dir: &Path) -> ProvisionResult<Vec<PathBuf>> {
        match self.nodes.get(dir) {
            Some(VirtualNode::Directory(children)) => Ok(children.iter().cloned().collect()),
            _ => Err(ProvisionError::state(
                &self.path,
                format!("no directory '{}' in archive", dir.display()),
            )),
        }
    }
}

impl Drop for ArchiveView {
    fn drop(&mut self) {
        trace!("Release archive {}", self.path.display());
    }
}

/// Register `child` with its parent directory, creating implicit parents.
fn attach(
    nodes: &mut BTreeMap<PathBuf, VirtualNode>,
    archive: &Path,
    child: &Path,
) -> ProvisionResult<()> {
    let parent = child.parent().unwrap_or(Path::new(""));
    if !nodes.contains_key(parent) {
        nodes.insert(parent.to_path_buf(), VirtualNode::Directory(BTreeSet::new()));
        attach(nodes, archive, parent)?;
    }
    match nodes.get_mut(parent) {
        Some(VirtualNode::Directory(children)) => {
            children.insert(child.to_path_buf());
            Ok(())
        }
        _ => Err(ProvisionError::state(
            archive,
            format!("entry '{}' is nested under a file", child.display()),
        )),
    }
}

/// Normalize a zip entry name into a relative path that stays below the
/// extraction root.
fn sanitize_entry_name(archive: &Path, name: &str) -> ProvisionResult<PathBuf> {
    let mut sanitized = PathBuf::new();
    for component in Path::new(name).components() {
        match component {
            Component::Normal(segment) => sanitized.push(segment),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(ProvisionError::state(
                    archive,
                    format!("entry '{name}' escapes the extraction root"),
                ));
            }
        }
    }
    Ok(sanitized)
}

/// Extract every entry of `archive` below `destination`.
///
/// `destination` is created if missing. Existing directories are kept and
/// existing files at entry paths are overwritten; the archive itself is only
/// read.
pub fn extract(archive: &Path, destination: &Path) -> ProvisionResult<()> {
    debug!(
        "Extract {} into {}",
        archive.display(),
        destination.display()
    );
    let view = ArchiveView::open(archive)?;
    ensure_dir(destination, "extract.create_root")?;
    TreeWalker::new()
        .on_enter_dir(|dir| ensure_dir(&destination.join(dir), "extract.create_dir"))
        .on_file(|file, _| view.copy_entry(file, &destination.join(file)))
        .walk_source(&view, view.root())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_zip(path: &Path, dirs: &[&str], files: &[(&str, &str)]) {
        let file = File::create(path).expect("create zip should succeed");
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        for dir in dirs {
            zip.add_directory(*dir, options)
                .expect("add_directory should succeed");
        }
        for (name, content) in files {
            zip.start_file(*name, options)
                .expect("start_file should succeed");
            zip.write_all(content.as_bytes())
                .expect("write should succeed");
        }
        zip.finish().expect("finish should succeed");
    }

    #[test]
    fn view_indexes_implicit_directories() {
        let tmp = TempDir::new().expect("tempdir should succeed");
        let archive = tmp.path().join("app.war");
        write_zip(&archive, &[], &[("WEB-INF/classes/App.class", "cafe")]);

        let view = ArchiveView::open(&archive).expect("open should succeed");
        assert_eq!(
            view.entry_kind(Path::new("WEB-INF")).expect("kind"),
            EntryKind::Directory
        );
        assert_eq!(
            view.children(Path::new("WEB-INF")).expect("children"),
            vec![PathBuf::from("WEB-INF/classes")]
        );
        assert_eq!(view.files(), vec![Path::new("WEB-INF/classes/App.class")]);
    }

    #[test]
    fn extract_reproduces_entries() {
        let tmp = TempDir::new().expect("tempdir should succeed");
        let archive = tmp.path().join("app.war");
        write_zip(
            &archive,
            &["META-INF/", "empty/"],
            &[
                ("index.html", "<html/>"),
                ("META-INF/MANIFEST.MF", "Manifest-Version: 1.0"),
                ("WEB-INF/web.xml", "<web-app/>"),
            ],
        );
        let dest = tmp.path().join("out").join("ROOT");

        extract(&archive, &dest).expect("extract should succeed");

        assert_eq!(
            fs::read_to_string(dest.join("index.html")).expect("read"),
            "<html/>"
        );
        assert_eq!(
            fs::read_to_string(dest.join("WEB-INF").join("web.xml")).expect("read"),
            "<web-app/>"
        );
        assert!(dest.join("empty").is_dir());
        assert!(archive.is_file());
    }

    #[test]
    fn extract_twice_overwrites_conflicting_files_only() {
        let tmp = TempDir::new().expect("tempdir should succeed");
        let archive = tmp.path().join("bundle.zip");
        write_zip(&archive, &[], &[("conf/app.properties", "a=1")]);
        let dest = tmp.path().join("dest");

        extract(&archive, &dest).expect("first extract should succeed");
        fs::write(dest.join("conf").join("app.properties"), "a=edited").expect("write");
        fs::write(dest.join("conf").join("extra.properties"), "b=2").expect("write");

        extract(&archive, &dest).expect("second extract should succeed");

        assert_eq!(
            fs::read_to_string(dest.join("conf").join("app.properties")).expect("read"),
            "a=1"
        );
        assert_eq!(
            fs::read_to_string(dest.join("conf").join("extra.properties")).expect("read"),
            "b=2"
        );
    }

    #[test]
    fn parent_segments_are_rejected_before_writing() {
        let tmp = TempDir::new().expect("tempdir should succeed");
        let archive = tmp.path().join("evil.zip");
        write_zip(
            &archive,
            &[],
            &[("ok.txt", "fine"), ("../escaped.txt", "gotcha")],
        );
        let dest = tmp.path().join("dest");

        let err = extract(&archive, &dest).expect_err("extract should fail");
        assert_eq!(err.kind(), crate::ErrorKind::StateViolation);
        assert!(!tmp.path().join("escaped.txt").exists());
        assert!(!dest.exists());
    }

    #[test]
    fn absolute_entries_are_rejected() {
        let err = sanitize_entry_name(Path::new("a.zip"), "/etc/passwd")
            .expect_err("absolute path should be rejected");
        assert_eq!(err.kind(), crate::ErrorKind::StateViolation);
        assert_eq!(
            sanitize_entry_name(Path::new("a.zip"), "./a/./b.txt").expect("sanitize"),
            PathBuf::from("a/b.txt")
        );
    }

    #[test]
    fn invalid_archive_is_io_failure() {
        let tmp = TempDir::new().expect("tempdir should succeed");
        let archive = tmp.path().join("broken.zip");
        fs::write(&archive, b"not a zip file").expect("write");

        let dest = tmp.path().join("dest");
        let err = extract(&archive, &dest).expect_err("extract should fail");
        assert!(matches!(err, ProvisionError::Archive { .. }));
        assert_eq!(err.kind(), crate::ErrorKind::IoFailure);
        assert!(!dest.exists());
    }

    #[test]
    fn missing_archive_is_io_failure() {
        let tmp = TempDir::new().expect("tempdir should succeed");
        let err = ArchiveView::open(&tmp.path().join("missing.zip")).expect_err("open should fail");
        assert!(matches!(err, ProvisionError::Io { .. }));
    }
}
