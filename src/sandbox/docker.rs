use std::path::Path;
use std::process::{Command, Output, Stdio};

use super::error::{ProvisioningError, SandboxFailure};
use super::image::{ImageSpec, ImageStore};
use super::runner::{SandboxRunResult, SandboxRunner};
use super::workspace::Workspace;

// `docker run` exit statuses that do not come from the contained program
const EXIT_DAEMON_ERROR: i32 = 125;
// The fixed entrypoint could not be executed or found in the image
const EXIT_CANNOT_EXEC: i32 = 126;
const EXIT_NOT_FOUND: i32 = 127;
// Prefix the client puts on its own diagnostics
const CLIENT_DIAGNOSTIC_PREFIX: &str = "docker:";
// 128 + SIGKILL; what the runtime reports when the memory ceiling is hit
const EXIT_KILLED: i32 = 137;

const UNKNOWN_RUNTIME_ERROR: &str = "Unknown runtime error";

/// Fixed isolation policy applied to every sandbox container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerPolicy {
    pub image: String,
    /// `uid[:gid]` of the unprivileged user the program runs as
    pub user: String,
    pub memory_limit_mb: u32,
    pub pids_limit: Option<u32>,
    /// Where the workspace appears inside the container
    pub mount_path: String,
}

/// Sandbox backend driving the `docker` command line client.
///
/// Serves both as the image store for provisioning and as the runner that
/// executes test cases.
#[derive(Debug, Clone)]
pub struct DockerCli {
    docker_bin: String,
    policy: ContainerPolicy,
}

impl DockerCli {
    pub fn new(docker_bin: impl Into<String>, policy: ContainerPolicy) -> Self {
        Self {
            docker_bin: docker_bin.into(),
            policy,
        }
    }

    /// Arguments for `docker run` executing `command` over `host_dir`
    pub fn run_args(&self, host_dir: &Path, command: &[String]) -> Vec<String> {
        let policy = &self.policy;
        let memory = format!("{}m", policy.memory_limit_mb);

        let mut args: Vec<String> = vec![
            "run".into(),
            "--rm".into(),
            "--network".into(),
            "none".into(),
            "--user".into(),
            policy.user.clone(),
            "--cap-drop".into(),
            "ALL".into(),
            "--security-opt".into(),
            "no-new-privileges".into(),
            "--memory".into(),
            memory.clone(),
            "--memory-swap".into(),
            memory,
        ];

        if let Some(pids) = policy.pids_limit {
            args.extend(["--pids-limit".into(), pids.to_string()]);
        }

        args.extend([
            "--volume".into(),
            format!("{}:{}:ro", host_dir.display(), policy.mount_path),
            "--workdir".into(),
            policy.mount_path.clone(),
            policy.image.clone(),
        ]);
        args.extend(command.iter().cloned());

        args
    }

    fn docker(&self) -> Command {
        let mut cmd = Command::new(&self.docker_bin);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }

    fn output_of(&self, args: &[String]) -> std::io::Result<Output> {
        self.docker().args(args).output()
    }
}

impl SandboxRunner for DockerCli {
    fn run(&self, workspace: &Workspace, command: &[String]) -> SandboxRunResult {
        let args = self.run_args(workspace.host_path(), command);
        log::debug!("Launching sandbox for workspace {}", workspace.id());

        let output = self.output_of(&args).map_err(|e| {
            SandboxFailure::Daemon(format!(
                "failed to launch container runtime '{}': {e}",
                self.docker_bin
            ))
        })?;

        classify_exit(output.status.code(), output.stdout, &output.stderr)
    }
}

impl ImageStore for DockerCli {
    fn image_exists(&self, tag: &str) -> Result<bool, ProvisioningError> {
        let args: Vec<String> = vec![
            "image".into(),
            "inspect".into(),
            "--format".into(),
            "{{.Id}}".into(),
            tag.into(),
        ];
        let output = self.output_of(&args).map_err(|e| {
            ProvisioningError::Daemon(format!(
                "failed to launch container runtime '{}': {e}",
                self.docker_bin
            ))
        })?;

        if output.status.success() {
            return Ok(true);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.to_lowercase().contains("no such image") {
            Ok(false)
        } else {
            Err(ProvisioningError::Daemon(stderr.trim().to_string()))
        }
    }

    fn build_image(&self, spec: &ImageSpec) -> Result<(), ProvisioningError> {
        let dockerfile = spec.context.join(&spec.dockerfile);
        let args: Vec<String> = vec![
            "build".into(),
            "--rm".into(),
            "--tag".into(),
            spec.tag.clone(),
            "--file".into(),
            dockerfile.display().to_string(),
            spec.context.display().to_string(),
        ];

        let output = self.output_of(&args).map_err(|e| {
            ProvisioningError::Daemon(format!(
                "failed to launch container runtime '{}': {e}",
                self.docker_bin
            ))
        })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(ProvisioningError::Build {
                image: spec.tag.clone(),
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

/// Maps the exit status of `docker run` onto a sandbox outcome
///
/// `None` means the client itself was terminated by a signal. Exit 126 and
/// 127 are only blamed on the runtime when the client reports them itself;
/// the submitted program can produce them too.
pub fn classify_exit(code: Option<i32>, stdout: Vec<u8>, stderr: &[u8]) -> SandboxRunResult {
    let diagnostic = String::from_utf8_lossy(stderr).trim().to_string();

    match code {
        Some(0) => Ok(stdout),
        Some(EXIT_DAEMON_ERROR) => Err(SandboxFailure::Daemon(if diagnostic.is_empty() {
            "container runtime failed to start the sandbox".to_string()
        } else {
            diagnostic
        })),
        None => Err(SandboxFailure::Daemon(
            "container runtime client was terminated by a signal".to_string(),
        )),
        Some(EXIT_CANNOT_EXEC | EXIT_NOT_FOUND)
            if diagnostic.starts_with(CLIENT_DIAGNOSTIC_PREFIX) =>
        {
            Err(SandboxFailure::Daemon(diagnostic))
        }
        Some(EXIT_KILLED) if diagnostic.is_empty() => Err(SandboxFailure::Runtime(
            "Process was killed (memory limit exceeded)".to_string(),
        )),
        Some(_) if !diagnostic.is_empty() => Err(SandboxFailure::Runtime(diagnostic)),
        Some(code) => Err(SandboxFailure::Runtime(format!(
            "{UNKNOWN_RUNTIME_ERROR} (exit code {code})"
        ))),
    }
}
