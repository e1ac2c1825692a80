//! Permission profiles applied to provisioned trees.
//!
//! A profile pairs the mode given to plain files with the mode given to
//! directories. Only owner and group bits are ever granted.

use std::fmt;

/// Owner/group permission bits, stored as a POSIX mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PermissionBits(u32);

impl PermissionBits {
    pub const OWNER_READ: Self = Self(0o400);
    pub const OWNER_WRITE: Self = Self(0o200);
    pub const OWNER_EXECUTE: Self = Self(0o100);
    pub const GROUP_READ: Self = Self(0o040);
    pub const GROUP_WRITE: Self = Self(0o020);
    pub const GROUP_EXECUTE: Self = Self(0o010);

    const MASK: u32 = 0o770;

    pub const fn empty() -> Self {
        Self(0)
    }

    /// Build from a raw mode; "other" bits and special bits are dropped.
    pub const fn from_mode(mode: u32) -> Self {
        Self(mode & Self::MASK)
    }

    pub const fn mode(self) -> u32 {
        self.0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Symbolic form, e.g. `rwxr-x---`.
    pub fn to_symbolic(self) -> String {
        symbolic_mode(self.0)
    }
}

impl fmt::Display for PermissionBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_symbolic())
    }
}

/// Render the lower nine bits of `mode` as `rwxrwxrwx`.
pub fn symbolic_mode(mode: u32) -> String {
    const FLAGS: [(u32, char); 9] = [
        (0o400, 'r'),
        (0o200, 'w'),
        (0o100, 'x'),
        (0o040, 'r'),
        (0o020, 'w'),
        (0o010, 'x'),
        (0o004, 'r'),
        (0o002, 'w'),
        (0o001, 'x'),
    ];
    FLAGS
        .iter()
        .map(|(bit, c)| if mode & bit != 0 { *c } else { '-' })
        .collect()
}

/// Named file/directory permission pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionProfile {
    name: &'static str,
    file: PermissionBits,
    directory: PermissionBits,
}

const R: PermissionBits = PermissionBits::OWNER_READ.union(PermissionBits::GROUP_READ);
const W: PermissionBits = PermissionBits::OWNER_WRITE.union(PermissionBits::GROUP_WRITE);
const X: PermissionBits = PermissionBits::OWNER_EXECUTE.union(PermissionBits::GROUP_EXECUTE);

impl PermissionProfile {
    /// Files `r--r-----`, directories `r-xr-x---`.
    pub const READ_ONLY: Self = Self::new("read-only", R, R.union(X));
    /// Files and directories `r-xr-x---`.
    pub const READ_EXECUTE: Self = Self::new("read-execute", R.union(X), R.union(X));
    /// Files `rw-rw----`, directories `rwxrwx---`.
    pub const READ_WRITE: Self = Self::new("read-write", R.union(W), R.union(W).union(X));

    /// Directories gain execute wherever files are readable so that their
    /// entries stay listable.
    pub const fn new(
        name: &'static str,
        file: PermissionBits,
        directory: PermissionBits,
    ) -> Self {
        let mut dir = directory;
        if file.contains(PermissionBits::OWNER_READ) {
            dir = dir.union(PermissionBits::OWNER_EXECUTE);
        }
        if file.contains(PermissionBits::GROUP_READ) {
            dir = dir.union(PermissionBits::GROUP_EXECUTE);
        }
        Self {
            name,
            file,
            directory: dir,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn file_permissions(&self) -> PermissionBits {
        self.file
    }

    pub fn directory_permissions(&self) -> PermissionBits {
        self.directory
    }
}

impl fmt::Display for PermissionProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (files {}, dirs {})",
            self.name, self.file, self.directory
        )
    }
}
