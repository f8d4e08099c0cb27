use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{ProblemConfig, SandboxConfig};
use crate::sandbox::{
    ImageProvisioner, ImageSpec, SandboxFailure, SandboxRunner, WorkspaceManager,
    create_docker_backend,
};

/// One input/expected-output pair of the problem's battery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCase {
    pub input: Vec<u8>,
    pub expected_output: Vec<u8>,
}

impl TestCase {
    pub fn new(input: impl Into<Vec<u8>>, expected_output: impl Into<Vec<u8>>) -> Self {
        Self {
            input: input.into(),
            expected_output: expected_output.into(),
        }
    }
}

/// Loads the ordered battery from the problem configuration
pub fn load_test_cases(problem: &ProblemConfig) -> Vec<TestCase> {
    problem
        .cases
        .iter()
        .map(|case| TestCase::new(case.input.as_bytes(), case.output.as_bytes()))
        .collect()
}

/// A single judge request. The id is never taken from user input.
#[derive(Debug)]
pub struct Submission {
    pub id: Uuid,
    pub source_code: String,
}

impl Submission {
    pub fn new(source_code: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_code: source_code.into(),
        }
    }
}

/// Final outcome of judging one submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    /// 1-based index of the first failing case
    WrongAnswer { case: usize },
    RuntimeError(String),
    SystemError(String),
}

impl Verdict {
    pub fn status(&self) -> &'static str {
        match self {
            Verdict::Accepted => "Accept",
            Verdict::WrongAnswer { .. } => "Wrong Answer",
            Verdict::RuntimeError(_) => "Runtime Error",
            Verdict::SystemError(_) => "System Error",
        }
    }

    pub fn message(&self) -> String {
        match self {
            Verdict::Accepted => "All test cases passed!".to_string(),
            Verdict::WrongAnswer { case } => format!("Test case {case} failed."),
            Verdict::RuntimeError(detail) => detail.clone(),
            Verdict::SystemError(detail) => format!("Judge system error: {detail}"),
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::WrongAnswer { case } => write!(f, "{} (case {case})", self.status()),
            _ => write!(f, "{}", self.status()),
        }
    }
}

/// Verdict as returned to the submitter
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct JudgeResponse {
    pub status: String,
    pub message: String,
}

impl From<&Verdict> for JudgeResponse {
    fn from(verdict: &Verdict) -> Self {
        Self {
            status: verdict.status().to_string(),
            message: verdict.message(),
        }
    }
}

/// Runs submissions against the battery, one sandbox per case, failing fast.
pub struct Judge {
    provisioner: Arc<ImageProvisioner>,
    workspaces: WorkspaceManager,
    runner: Arc<dyn SandboxRunner>,
    command: Vec<String>,
    cases: Vec<TestCase>,
}

impl Judge {
    pub fn new(
        provisioner: Arc<ImageProvisioner>,
        workspaces: WorkspaceManager,
        runner: Arc<dyn SandboxRunner>,
        command: Vec<String>,
        cases: Vec<TestCase>,
    ) -> Self {
        Self {
            provisioner,
            workspaces,
            runner,
            command,
            cases,
        }
    }

    /// Builds a judge backed by the docker client described in `sandbox`
    pub fn from_config(sandbox: &SandboxConfig, problem: &ProblemConfig) -> anyhow::Result<Self> {
        let backend = create_docker_backend(sandbox);
        let provisioner = ImageProvisioner::new(
            backend.clone(),
            ImageSpec {
                tag: sandbox.image.clone(),
                context: sandbox.build_context.clone(),
                dockerfile: sandbox.dockerfile.clone(),
            },
        );
        let workspaces = WorkspaceManager::new(
            sandbox.workspace_root()?,
            sandbox.host_workspace_root.clone(),
        )?;
        log::info!(
            "Workspaces are created under {} ({} test cases loaded for '{}')",
            workspaces.root().display(),
            problem.cases.len(),
            problem.name
        );

        Ok(Self::new(
            Arc::new(provisioner),
            workspaces,
            backend,
            sandbox.run_command(),
            load_test_cases(problem),
        ))
    }

    pub fn provisioner(&self) -> &ImageProvisioner {
        &self.provisioner
    }

    pub fn cases(&self) -> &[TestCase] {
        &self.cases
    }

    /// Judges `source_code` and returns a terminal verdict.
    ///
    /// Blocks for the duration of every container launch. The workspace is
    /// removed before this returns, whatever the verdict.
    pub fn judge(&self, source_code: &str) -> Verdict {
        let submission = Submission::new(source_code);
        let verdict = self.judge_submission(&submission);
        log::info!("Submission {} judged: {verdict}", submission.id);
        verdict
    }

    fn judge_submission(&self, submission: &Submission) -> Verdict {
        if let Err(e) = self.provisioner.ensure_image() {
            log::error!("Sandbox image unavailable for submission {}: {e}", submission.id);
            return Verdict::SystemError(e.to_string());
        }

        let workspace = match self.workspaces.create_workspace(&submission.id) {
            Ok(workspace) => workspace,
            Err(e) => {
                log::error!("Failed to allocate workspace for {}: {e}", submission.id);
                return Verdict::SystemError(e.to_string());
            }
        };

        if let Err(e) = workspace.write_source(&submission.source_code) {
            log::error!("Failed to write source of {}: {e}", submission.id);
            return Verdict::SystemError(e.to_string());
        }

        // Cases share the input slot, so they must run one after another
        for (idx, case) in self.cases.iter().enumerate() {
            let case_idx = idx + 1;

            if let Err(e) = workspace.write_case_input(&case.input) {
                log::error!("Failed to write input of case {case_idx}: {e}");
                return Verdict::SystemError(e.to_string());
            }

            match self.runner.run(&workspace, &self.command) {
                Ok(stdout) => {
                    if !outputs_match(&stdout, &case.expected_output) {
                        return Verdict::WrongAnswer { case: case_idx };
                    }
                }
                Err(SandboxFailure::Runtime(detail)) => {
                    log::debug!("Case {case_idx} of {} raised: {detail}", submission.id);
                    return Verdict::RuntimeError(detail);
                }
                Err(SandboxFailure::Daemon(detail)) => {
                    log::error!(
                        "Sandbox backend failed on case {case_idx} of {}: {detail}",
                        submission.id
                    );
                    return Verdict::SystemError(detail);
                }
            }
        }

        Verdict::Accepted
    }
}

/// Compares program output with the expected answer
///
/// Surrounding whitespace on both sides is ignored, so a missing or extra
/// trailing newline never fails a case.
pub fn outputs_match(program_output: &[u8], expected_output: &[u8]) -> bool {
    program_output.trim_ascii() == expected_output.trim_ascii()
}
