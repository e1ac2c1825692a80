//! Stackup Core Library
//!
//! Provisions an application-server instance: extracts a runtime
//! distribution and the application archive, installs versioned libraries
//! and java agents located by naming convention, applies permission profiles
//! and writes the control files read by the launcher.

pub mod archive;
pub mod artifact;
pub mod config;
pub mod error;
pub mod fs;
pub mod metadata;
pub mod pipeline;

pub use error::{ErrorKind, ProvisionError, ProvisionResult};

/// Re-exports of commonly used types
pub mod prelude {
    // Errors
    pub use crate::error::{ErrorKind, ProvisionError, ProvisionResult};

    // Configuration
    pub use crate::config::{StackConfig, StackPreset};

    // Metadata
    pub use crate::metadata::{Metadata, MetadataProvider};

    // Filesystem
    pub use crate::fs::{PermissionProfile, TreeWalker};

    // Pipeline
    pub use crate::pipeline::{
        InstallationTarget, ProvisionReport, ProvisionRequest, ProvisioningPipeline, StepKind,
    };
}
