use std::path::PathBuf;

use clap::Parser;
use serde::Deserialize;

use crate::sandbox::{INPUT_FILE, SOURCE_FILE};

#[derive(Parser)]
#[command(name = "sandbox-oj", version = "1.0", about, long_about = None)]
pub struct CliArgs {
    /// Path to the configuration file; built-in defaults are used when omitted
    #[arg(long = "config", short = 'c')]
    pub config_path: Option<String>,

    /// Whether to flush the existing database
    #[arg(long = "flush-data", short = 'f', default_value_t = false)]
    pub flush_data: bool,

    /// Host-side path of the workspace root, when the judge runs in a container
    #[arg(long = "host-workspace-root", env = "OJ_HOST_WORKSPACE_ROOT")]
    pub host_workspace_root: Option<PathBuf>,
}

impl CliArgs {
    /// Load the configuration from the specified file, then apply overrides
    pub fn to_config(&self) -> std::io::Result<Config> {
        let mut config = match &self.config_path {
            Some(path) => {
                let file = std::fs::File::open(path)?;
                let reader = std::io::BufReader::new(file);
                serde_json::from_reader(reader)?
            }
            None => Config::default(),
        };

        if let Some(host_root) = &self.host_workspace_root {
            config.sandbox.host_workspace_root = Some(host_root.clone());
        }

        Ok(config)
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub sandbox: SandboxConfig,
    pub problem: ProblemConfig,
}

#[derive(Deserialize, Debug, Default)]
pub struct ServerConfig {
    pub bind_address: Option<String>,
    pub bind_port: Option<u16>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct SandboxConfig {
    /// Container runtime client binary
    pub docker_bin: String,
    pub image: String,
    /// Directory holding the image definition
    pub build_context: PathBuf,
    pub dockerfile: String,
    /// Shared directory that per-submission workspaces are created under
    pub workspace_root: Option<PathBuf>,
    /// The same directory as seen by the host running the container runtime
    pub host_workspace_root: Option<PathBuf>,
    pub mount_path: String,
    pub user: String,
    pub memory_limit_mb: u32,
    pub pids_limit: Option<u32>,
    pub interpreter: String,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            docker_bin: "docker".to_string(),
            image: "python-sandbox-env".to_string(),
            build_context: PathBuf::from("sandbox-image"),
            dockerfile: "Dockerfile.sandbox".to_string(),
            workspace_root: None,
            host_workspace_root: None,
            mount_path: "/sandbox".to_string(),
            user: "1000:1000".to_string(),
            memory_limit_mb: 64,
            pids_limit: Some(64),
            interpreter: "python".to_string(),
        }
    }
}

impl SandboxConfig {
    /// Workspace root, falling back to the user's cache directory
    pub fn workspace_root(&self) -> std::io::Result<PathBuf> {
        use directories::ProjectDirs;

        if let Some(root) = &self.workspace_root {
            return Ok(root.clone());
        }

        let proj_dirs = ProjectDirs::from("", "", "sandbox-oj").ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "Unable to find user directory")
        })?;
        Ok(proj_dirs.cache_dir().join("workspaces"))
    }

    /// Command executed inside the container for every test case
    pub fn run_command(&self) -> Vec<String> {
        vec![
            "sh".to_string(),
            "-c".to_string(),
            format!("{} {SOURCE_FILE} < {INPUT_FILE}", self.interpreter),
        ]
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct ProblemConfig {
    pub name: String,
    pub cases: Vec<ProblemCaseConfig>,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ProblemCaseConfig {
    pub input: String,
    pub output: String,
}

impl Default for ProblemConfig {
    /// Read two integers on two lines, print their sum
    fn default() -> Self {
        let cases = [
            ("2\n3\n", "5\n"),
            ("-10\n10\n", "0\n"),
            ("100\n200\n", "300\n"),
            ("0\n100\n", "100\n"),
            ("100\n0\n", "100\n"),
        ]
        .into_iter()
        .map(|(input, output)| ProblemCaseConfig {
            input: input.to_string(),
            output: output.to_string(),
        })
        .collect();

        Self {
            name: "sum of two integers".to_string(),
            cases,
        }
    }
}
