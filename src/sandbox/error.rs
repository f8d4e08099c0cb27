use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while making sure the sandbox image is available.
///
/// Judging cannot proceed without the image, so these fail the enclosing
/// request instead of being retried internally.
#[derive(Debug, Error)]
pub enum ProvisioningError {
    /// The container runtime could not be reached or answered unexpectedly.
    #[error("container runtime unavailable: {0}")]
    Daemon(String),

    /// The image build ran but did not succeed.
    #[error("failed to build sandbox image {image}: {detail}")]
    Build { image: String, detail: String },
}

/// Errors raised while allocating or populating a submission workspace.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    /// A directory with the freshly generated id is already present.
    #[error("workspace {} already exists", .0.display())]
    Collision(PathBuf),

    #[error("workspace I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl WorkspaceError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failure classes of a single container invocation.
///
/// `Runtime` is the submitted program's fault, `Daemon` is infrastructure
/// trouble. They map to different verdicts and must never be merged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SandboxFailure {
    #[error("runtime failure: {0}")]
    Runtime(String),

    #[error("container runtime failure: {0}")]
    Daemon(String),
}
