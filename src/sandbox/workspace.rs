use std::fs;
use std::io::ErrorKind;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use super::error::WorkspaceError;

/// File name of the submitted program inside a workspace
pub const SOURCE_FILE: &str = "submission.py";
/// File name of the input slot, rewritten before every test case
pub const INPUT_FILE: &str = "input.txt";

// The sandbox user is not the owner, so the mount must be world-readable
const WORKSPACE_DIR_PERMISSIONS: u32 = 0o755;
const WORKSPACE_FILE_PERMISSIONS: u32 = 0o644;

/// Allocates per-submission directories under a shared root.
///
/// When the judge itself runs inside a container, `host_root` names the same
/// directory as seen by the host, so the container runtime can bind-mount it.
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
    host_root: Option<PathBuf>,
}

impl WorkspaceManager {
    pub fn new(root: impl Into<PathBuf>, host_root: Option<PathBuf>) -> Result<Self, WorkspaceError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| WorkspaceError::io(&root, e))?;

        Ok(Self { root, host_root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates the workspace directory for `submission_id`.
    ///
    /// Fails with [`WorkspaceError::Collision`] instead of reusing a directory
    /// that already exists.
    pub fn create_workspace(&self, submission_id: &Uuid) -> Result<Workspace, WorkspaceError> {
        let name = submission_id.to_string();
        let path = self.root.join(&name);

        match fs::create_dir(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(WorkspaceError::Collision(path));
            }
            Err(e) => return Err(WorkspaceError::io(&path, e)),
        }

        // From here on the guard owns the directory and removes it on any exit
        let workspace = Workspace {
            id: *submission_id,
            host_path: self
                .host_root
                .as_ref()
                .map_or_else(|| path.clone(), |root| root.join(&name)),
            path,
        };

        fs::set_permissions(
            &workspace.path,
            fs::Permissions::from_mode(WORKSPACE_DIR_PERMISSIONS),
        )
        .map_err(|e| WorkspaceError::io(&workspace.path, e))?;

        log::debug!("Created workspace {}", workspace.path.display());
        Ok(workspace)
    }
}

/// A single submission's directory. Removed when dropped.
#[derive(Debug)]
pub struct Workspace {
    id: Uuid,
    path: PathBuf,
    host_path: PathBuf,
}

impl Workspace {
    pub fn id(&self) -> &Uuid {
        &self.id
    }

    /// Location as seen by this process
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Location as seen by the container runtime
    pub fn host_path(&self) -> &Path {
        &self.host_path
    }

    pub fn source_path(&self) -> PathBuf {
        self.path.join(SOURCE_FILE)
    }

    pub fn input_path(&self) -> PathBuf {
        self.path.join(INPUT_FILE)
    }

    pub fn write_source(&self, code: &str) -> Result<(), WorkspaceError> {
        self.write_file(&self.source_path(), code.as_bytes())
    }

    /// Overwrites the input slot. Callers must not run cases in parallel.
    pub fn write_case_input(&self, input: &[u8]) -> Result<(), WorkspaceError> {
        self.write_file(&self.input_path(), input)
    }

    fn write_file(&self, path: &Path, contents: &[u8]) -> Result<(), WorkspaceError> {
        fs::write(path, contents).map_err(|e| WorkspaceError::io(path, e))?;
        fs::set_permissions(path, fs::Permissions::from_mode(WORKSPACE_FILE_PERMISSIONS))
            .map_err(|e| WorkspaceError::io(path, e))
    }

    fn destroy(&self) {
        match fs::remove_dir_all(&self.path) {
            Ok(()) => log::debug!("Removed workspace {}", self.path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => log::warn!(
                "Unable to remove workspace {}: {e}",
                self.path.display()
            ),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.destroy();
    }
}
