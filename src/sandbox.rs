mod docker;
mod error;
mod image;
mod runner;
mod workspace;

// Re-export the traits and common types
pub use docker::{ContainerPolicy, DockerCli, classify_exit};
pub use error::{ProvisioningError, SandboxFailure, WorkspaceError};
pub use image::{ImageProvisioner, ImageSpec, ImageStore};
pub use runner::{SandboxRunResult, SandboxRunner};
pub use workspace::{INPUT_FILE, SOURCE_FILE, Workspace, WorkspaceManager};

use std::sync::Arc;

use crate::config::SandboxConfig;

/// Creates the Docker backend described by `config`
///
/// The same client is handed out as image store and as runner.
pub fn create_docker_backend(config: &SandboxConfig) -> Arc<DockerCli> {
    let policy = ContainerPolicy {
        image: config.image.clone(),
        user: config.user.clone(),
        memory_limit_mb: config.memory_limit_mb,
        pids_limit: config.pids_limit,
        mount_path: config.mount_path.clone(),
    };
    log::info!(
        "Using docker sandbox backend '{}' with image '{}'",
        config.docker_bin,
        config.image
    );
    Arc::new(DockerCli::new(config.docker_bin.clone(), policy))
}
