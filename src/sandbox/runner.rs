use super::error::SandboxFailure;
use super::workspace::Workspace;

/// Outcome of one container invocation: captured stdout, or a classified failure
pub type SandboxRunResult = Result<Vec<u8>, SandboxFailure>;

/// Trait for the backends that execute a workspace's program
///
/// An implementation launches exactly one isolated, ephemeral execution per
/// call, with the workspace as the only reachable host path. The isolation
/// policy belongs to the implementation and cannot be relaxed by `command`.
pub trait SandboxRunner: Send + Sync {
    /// Runs `command` against the files currently in `workspace`
    ///
    /// Runtime failures of the submitted program are reported as
    /// [`SandboxFailure::Runtime`], trouble with the backend itself as
    /// [`SandboxFailure::Daemon`].
    fn run(&self, workspace: &Workspace, command: &[String]) -> SandboxRunResult;
}
