//! Filesystem primitives shared by the archive extractor and the pipeline.

pub mod permissions;
pub mod tree_ops;
pub mod walker;

pub use permissions::{PermissionBits, PermissionProfile};
pub use tree_ops::{
    apply_permission_profile, chmod_read_execute, chmod_read_only, chmod_read_write,
    copy_to_directory, copy_tree, delete_subtree, render_tree,
};
pub use walker::{EntryKind, LocalFs, TreeSource, TreeWalker};
