//! Error taxonomy for provisioning.
//!
//! Every failure raised by the tree operations, the archive extractor, the
//! artifact resolver and the pipeline is a [`ProvisionError`]. Callers that
//! only care about the class of failure use [`ProvisionError::kind`].

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::pipeline::StepKind;

/// Result type for provisioning operations.
pub type ProvisionResult<T> = Result<T, ProvisionError>;

/// Coarse classification of a [`ProvisionError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No artifact or path matched an expected selector.
    NotFound,
    /// More than one artifact matched a selector that must be unique.
    Ambiguous,
    /// A precondition about path kind or tree shape does not hold.
    StateViolation,
    /// The underlying storage operation failed.
    IoFailure,
    /// A stack descriptor, metadata document or template is malformed.
    Configuration,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not found",
            ErrorKind::Ambiguous => "ambiguous",
            ErrorKind::StateViolation => "state violation",
            ErrorKind::IoFailure => "io failure",
            ErrorKind::Configuration => "configuration",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced while provisioning a deployment.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// No entry matched `<prefix>*.<extension>` (or a directory prefix).
    #[error("no artifact matching '{prefix}*{}' in {}", extension_suffix(.extension), .dir.display())]
    NotFound {
        prefix: String,
        extension: String,
        dir: PathBuf,
    },

    /// Several entries matched a selector that must be unique.
    #[error(
        "{} artifacts matching '{prefix}*{}' in {}: {}",
        .matches.len(),
        extension_suffix(.extension),
        .dir.display(),
        display_paths(.matches)
    )]
    Ambiguous {
        prefix: String,
        extension: String,
        dir: PathBuf,
        matches: Vec<PathBuf>,
    },

    /// A path was not of the expected kind, or a tree had an unexpected shape.
    #[error("state violation at {}: {reason}", .path.display())]
    StateViolation { path: PathBuf, reason: String },

    /// Filesystem call failed.
    #[error("{operation} failed at {}", .path.display())]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The archive container could not be decoded.
    #[error("{operation} failed for archive {}", .path.display())]
    Archive {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    /// Stack descriptor could not be parsed.
    #[error("invalid stack descriptor {}", .path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Metadata document could not be parsed.
    #[error("invalid metadata document {}", .path.display())]
    MetadataParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Semantic configuration problem (unknown template placeholder, missing
    /// java home mapping, ...).
    #[error("invalid configuration for {field}: {reason}")]
    Config { field: String, reason: String },

    /// A pipeline step failed; `source` holds the underlying cause.
    #[error("step '{step}' failed")]
    Step {
        step: StepKind,
        #[source]
        source: Box<ProvisionError>,
    },
}

impl ProvisionError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn archive(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: zip::result::ZipError,
    ) -> Self {
        Self::Archive {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn state(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::StateViolation {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Config {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Failure class, looking through step wrappers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Ambiguous { .. } => ErrorKind::Ambiguous,
            Self::StateViolation { .. } => ErrorKind::StateViolation,
            Self::Io { .. } | Self::Archive { .. } => ErrorKind::IoFailure,
            Self::ConfigParse { .. } | Self::MetadataParse { .. } | Self::Config { .. } => {
                ErrorKind::Configuration
            }
            Self::Step { source, .. } => source.kind(),
        }
    }

    /// Pipeline step that failed, if this error came out of the pipeline.
    pub fn step(&self) -> Option<StepKind> {
        match self {
            Self::Step { step, .. } => Some(*step),
            _ => None,
        }
    }

    /// Innermost error, with step wrappers removed.
    pub fn root_cause(&self) -> &ProvisionError {
        match self {
            Self::Step { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Path the failure is attached to, when there is one.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::NotFound { dir, .. } | Self::Ambiguous { dir, .. } => Some(dir),
            Self::StateViolation { path, .. }
            | Self::Io { path, .. }
            | Self::Archive { path, .. }
            | Self::ConfigParse { path, .. }
            | Self::MetadataParse { path, .. } => Some(path),
            Self::Config { .. } => None,
            Self::Step { source, .. } => source.path(),
        }
    }
}

fn extension_suffix(extension: &str) -> String {
    if extension.is_empty() {
        String::new()
    } else {
        format!(".{extension}")
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
