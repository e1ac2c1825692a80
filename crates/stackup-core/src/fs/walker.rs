//! Generic recursive traversal with pluggable callbacks.
//!
//! A [`TreeWalker`] visits a tree exposed by a [`TreeSource`]:
//!
//! - `on_enter_dir` fires before a directory's children are visited (pre-order),
//! - `on_file` fires once per non-directory entry,
//! - `on_exit_dir` fires after the children, receiving the first error raised
//!   inside the subtree, if any (post-order).
//!
//! The first failing callback stops the remaining siblings of its directory;
//! the enclosing directory still gets its `on_exit_dir` call with the captured
//! error. A directory whose `on_enter_dir` fails is never exited. Sibling order
//! is whatever the source returns and callers must not rely on it.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{ProvisionError, ProvisionResult};

/// Kind of a node in a walked tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    File,
    Symlink,
}

impl EntryKind {
    pub fn is_dir(self) -> bool {
        matches!(self, EntryKind::Directory)
    }
}

/// Something that can be traversed like a directory tree.
pub trait TreeSource {
    /// Kind of the node at `path`.
    fn entry_kind(&self, path: &Path) -> ProvisionResult<EntryKind>;

    /// Direct children of the directory at `dir`, as full paths.
    fn children(&self, dir: &Path) -> ProvisionResult<Vec<PathBuf>>;
}

/// The local filesystem. Symlinks below the root are reported as
/// [`EntryKind::Symlink`] and never followed; a symlinked root is followed.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl LocalFs {
    fn root_kind(&self, path: &Path) -> ProvisionResult<EntryKind> {
        let meta =
            fs::metadata(path).map_err(|err| ProvisionError::io("walk.stat_root", path, err))?;
        Ok(if meta.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::File
        })
    }
}

impl TreeSource for LocalFs {
    fn entry_kind(&self, path: &Path) -> ProvisionResult<EntryKind> {
        let meta = fs::symlink_metadata(path)
            .map_err(|err| ProvisionError::io("walk.stat", path, err))?;
        let ty = meta.file_type();
        Ok(if ty.is_dir() {
            EntryKind::Directory
        } else if ty.is_symlink() {
            EntryKind::Symlink
        } else {
            EntryKind::File
        })
    }

    fn children(&self, dir: &Path) -> ProvisionResult<Vec<PathBuf>> {
        let entries =
            fs::read_dir(dir).map_err(|err| ProvisionError::io("walk.read_dir", dir, err))?;
        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| ProvisionError::io("walk.read_dir_entry", dir, err))?;
            paths.push(entry.path());
        }
        // Stable output for dumps; traversal semantics do not depend on it.
        paths.sort();
        Ok(paths)
    }
}

type DirCallback<'a> = Box<dyn FnMut(&Path) -> ProvisionResult<()> + 'a>;
type FileCallback<'a> = Box<dyn FnMut(&Path, EntryKind) -> ProvisionResult<()> + 'a>;
type ExitCallback<'a> = Box<dyn FnMut(&Path, Option<ProvisionError>) -> ProvisionResult<()> + 'a>;

/// Recursive traversal parameterized by per-operation callbacks.
pub struct TreeWalker<'a> {
    on_enter_dir: DirCallback<'a>,
    on_file: FileCallback<'a>,
    on_exit_dir: ExitCallback<'a>,
}

impl Default for TreeWalker<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> TreeWalker<'a> {
    /// Walker whose callbacks do nothing; the exit callback re-raises any
    /// captured error.
    pub fn new() -> Self {
        Self {
            on_enter_dir: Box::new(|_| Ok(())),
            on_file: Box::new(|_, _| Ok(())),
            on_exit_dir: Box::new(|_, err| match err {
                Some(err) => Err(err),
                None => Ok(()),
            }),
        }
    }

    pub fn on_enter_dir(mut self, f: impl FnMut(&Path) -> ProvisionResult<()> + 'a) -> Self {
        self.on_enter_dir = Box::new(f);
        self
    }

    pub fn on_file(mut self, f: impl FnMut(&Path, EntryKind) -> ProvisionResult<()> + 'a) -> Self {
        self.on_file = Box::new(f);
        self
    }

    pub fn on_exit_dir(
        mut self,
        f: impl FnMut(&Path, Option<ProvisionError>) -> ProvisionResult<()> + 'a,
    ) -> Self {
        self.on_exit_dir = Box::new(f);
        self
    }

    /// Walk a tree on the local filesystem.
    pub fn walk(&mut self, root: &Path) -> ProvisionResult<()> {
        let kind = LocalFs.root_kind(root)?;
        self.visit(&LocalFs, root, kind)
    }

    /// Walk a tree exposed by an arbitrary source.
    pub fn walk_source<S: TreeSource + ?Sized>(
        &mut self,
        source: &S,
        root: &Path,
    ) -> ProvisionResult<()> {
        let kind = source.entry_kind(root)?;
        self.visit(source, root, kind)
    }

    fn visit<S: TreeSource + ?Sized>(
        &mut self,
        source: &S,
        path: &Path,
        kind: EntryKind,
    ) -> ProvisionResult<()> {
        if !kind.is_dir() {
            return (self.on_file)(path, kind);
        }

        (self.on_enter_dir)(path)?;
        let outcome = self.visit_children(source, path).err();
        (self.on_exit_dir)(path, outcome)
    }

    fn visit_children<S: TreeSource + ?Sized>(
        &mut self,
        source: &S,
        dir: &Path,
    ) -> ProvisionResult<()> {
        for child in source.children(dir)? {
            let kind = source.entry_kind(&child)?;
            self.visit(source, &child, kind)?;
        }
        Ok(())
    }
}
