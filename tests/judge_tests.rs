use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

use sandbox_oj::config::{ProblemConfig, SandboxConfig};
use sandbox_oj::judge::{Judge, Verdict, load_test_cases};
use sandbox_oj::sandbox::{
    ContainerPolicy, DockerCli, ImageProvisioner, ImageSpec, ImageStore, ProvisioningError,
    SandboxFailure, SandboxRunResult, SandboxRunner, Workspace, WorkspaceManager,
};

// Fake image store that counts how often it is asked to build
#[derive(Default)]
struct FakeImageStore {
    present: AtomicBool,
    builds: AtomicUsize,
}

impl ImageStore for FakeImageStore {
    fn image_exists(&self, _tag: &str) -> Result<bool, ProvisioningError> {
        Ok(self.present.load(Ordering::SeqCst))
    }

    fn build_image(&self, _spec: &ImageSpec) -> Result<(), ProvisioningError> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        self.present.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct BrokenImageStore;

impl ImageStore for BrokenImageStore {
    fn image_exists(&self, _tag: &str) -> Result<bool, ProvisioningError> {
        Err(ProvisioningError::Daemon(
            "Cannot connect to the Docker daemon".to_string(),
        ))
    }

    fn build_image(&self, _spec: &ImageSpec) -> Result<(), ProvisioningError> {
        unreachable!("build must not be attempted when the daemon is unreachable")
    }
}

// Interprets a tiny set of "programs" by reading the workspace files, the way
// a container would see them through the mount
#[derive(Default)]
struct ScriptRunner {
    calls: Mutex<Vec<PathBuf>>,
    delay: Duration,
}

impl ScriptRunner {
    fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    fn seen_workspaces(&self) -> Vec<PathBuf> {
        let mut seen = self.calls.lock().clone();
        seen.dedup();
        seen
    }
}

impl SandboxRunner for ScriptRunner {
    fn run(&self, workspace: &Workspace, command: &[String]) -> SandboxRunResult {
        assert_eq!(command.len(), 3, "unexpected command {command:?}");
        self.calls.lock().push(workspace.path().to_path_buf());

        let read = |path: &Path| {
            fs::read_to_string(path).map_err(|e| SandboxFailure::Daemon(e.to_string()))
        };
        let source = read(workspace.source_path().as_path())?;
        thread::sleep(self.delay);
        let input = read(workspace.input_path().as_path())?;

        let numbers: Vec<i64> = input
            .split_whitespace()
            .map(|n| n.parse().unwrap())
            .collect();
        let sum: i64 = numbers.iter().sum();

        let stdout = match source.trim() {
            "sum" => format!("{sum}\n"),
            "sum-no-newline" => format!("{sum}"),
            "product" => format!("{}\n", numbers.iter().product::<i64>()),
            "sum-unless-zero" if numbers.contains(&0) => "oops\n".to_string(),
            "sum-unless-zero" => format!("{sum}\n"),
            "raise" => {
                return Err(SandboxFailure::Runtime(
                    "Traceback (most recent call last):\nZeroDivisionError: division by zero"
                        .to_string(),
                ));
            }
            "daemon" => {
                return Err(SandboxFailure::Daemon(
                    "Cannot connect to the Docker daemon".to_string(),
                ));
            }
            other => match other.strip_prefix("offset:") {
                Some(k) => format!("{}\n", sum + k.parse::<i64>().unwrap()),
                None => {
                    return Err(SandboxFailure::Runtime(
                        "SyntaxError: invalid syntax".to_string(),
                    ));
                }
            },
        };

        Ok(stdout.into_bytes())
    }
}

struct TestJudge {
    judge: Judge,
    runner: Arc<ScriptRunner>,
    store: Arc<FakeImageStore>,
    root: TempDir,
}

impl TestJudge {
    fn new() -> Self {
        Self::with_runner(ScriptRunner::default())
    }

    fn with_runner(runner: ScriptRunner) -> Self {
        let root = tempfile::tempdir().unwrap();
        let runner = Arc::new(runner);
        let store = Arc::new(FakeImageStore::default());
        let judge = Judge::new(
            Arc::new(ImageProvisioner::new(store.clone(), image_spec())),
            WorkspaceManager::new(root.path(), None).unwrap(),
            runner.clone(),
            SandboxConfig::default().run_command(),
            load_test_cases(&ProblemConfig::default()),
        );

        Self {
            judge,
            runner,
            store,
            root,
        }
    }

    fn assert_no_workspace_left(&self) {
        for path in self.runner.seen_workspaces() {
            assert!(!path.exists(), "workspace {} was not removed", path.display());
        }
        assert_eq!(fs::read_dir(self.root.path()).unwrap().count(), 0);
    }
}

fn image_spec() -> ImageSpec {
    ImageSpec {
        tag: "python-sandbox-env".to_string(),
        context: PathBuf::from("sandbox-image"),
        dockerfile: "Dockerfile.sandbox".to_string(),
    }
}

#[test]
fn test_correct_solution_is_accepted() {
    let t = TestJudge::new();

    assert_eq!(t.judge.judge("sum"), Verdict::Accepted);
    assert_eq!(t.runner.call_count(), t.judge.cases().len());
    t.assert_no_workspace_left();
}

#[test]
fn test_missing_trailing_newline_is_accepted() {
    let t = TestJudge::new();

    assert_eq!(t.judge.judge("sum-no-newline"), Verdict::Accepted);
}

#[test]
fn test_wrong_answer_reports_first_failing_case() {
    let t = TestJudge::new();
    assert_eq!(t.judge.judge("product"), Verdict::WrongAnswer { case: 1 });
    assert_eq!(t.runner.call_count(), 1);
    t.assert_no_workspace_left();

    let t = TestJudge::new();
    assert_eq!(
        t.judge.judge("sum-unless-zero"),
        Verdict::WrongAnswer { case: 4 }
    );
    // Case 5 also contains a zero but must never run
    assert_eq!(t.runner.call_count(), 4);
    t.assert_no_workspace_left();
}

#[test]
fn test_runtime_failure_becomes_runtime_error() {
    let t = TestJudge::new();

    match t.judge.judge("raise") {
        Verdict::RuntimeError(detail) => {
            assert!(!detail.is_empty());
            assert!(detail.contains("ZeroDivisionError"));
        }
        other => panic!("expected a runtime error, got {other:?}"),
    }
    assert_eq!(t.runner.call_count(), 1);
    t.assert_no_workspace_left();
}

#[test]
fn test_daemon_failure_becomes_system_error() {
    let t = TestJudge::new();

    let verdict = t.judge.judge("daemon");
    assert_eq!(
        verdict,
        Verdict::SystemError("Cannot connect to the Docker daemon".to_string())
    );
    assert_eq!(verdict.status(), "System Error");
    t.assert_no_workspace_left();
}

#[test]
fn test_image_is_built_once_across_submissions() {
    let t = TestJudge::new();

    for _ in 0..3 {
        assert_eq!(t.judge.judge("sum"), Verdict::Accepted);
    }
    assert_eq!(t.store.builds.load(Ordering::SeqCst), 1);
}

#[test]
fn test_provisioning_failure_becomes_system_error() {
    let root = tempfile::tempdir().unwrap();
    let runner = Arc::new(ScriptRunner::default());
    let judge = Judge::new(
        Arc::new(ImageProvisioner::new(Arc::new(BrokenImageStore), image_spec())),
        WorkspaceManager::new(root.path(), None).unwrap(),
        runner.clone(),
        SandboxConfig::default().run_command(),
        load_test_cases(&ProblemConfig::default()),
    );

    assert!(matches!(judge.judge("sum"), Verdict::SystemError(_)));
    assert_eq!(runner.call_count(), 0);
    assert_eq!(fs::read_dir(root.path()).unwrap().count(), 0);
}

#[test]
fn test_unreachable_backend_returns_system_error_promptly() {
    let root = tempfile::tempdir().unwrap();
    let docker = Arc::new(DockerCli::new(
        "/nonexistent/bin/docker",
        ContainerPolicy {
            image: "python-sandbox-env".to_string(),
            user: "1000:1000".to_string(),
            memory_limit_mb: 64,
            pids_limit: Some(64),
            mount_path: "/sandbox".to_string(),
        },
    ));

    // Image check and container launch both go through the missing client
    let judge = Judge::new(
        Arc::new(ImageProvisioner::new(docker.clone(), image_spec())),
        WorkspaceManager::new(root.path(), None).unwrap(),
        docker.clone(),
        SandboxConfig::default().run_command(),
        load_test_cases(&ProblemConfig::default()),
    );
    let started = Instant::now();
    assert!(matches!(judge.judge("sum"), Verdict::SystemError(_)));
    assert!(started.elapsed() < Duration::from_secs(10));

    // Image already known, the launch itself fails
    let store = Arc::new(FakeImageStore::default());
    store.present.store(true, Ordering::SeqCst);
    let judge = Judge::new(
        Arc::new(ImageProvisioner::new(store, image_spec())),
        WorkspaceManager::new(root.path(), None).unwrap(),
        docker,
        SandboxConfig::default().run_command(),
        load_test_cases(&ProblemConfig::default()),
    );
    assert!(matches!(judge.judge("sum"), Verdict::SystemError(_)));
    assert_eq!(fs::read_dir(root.path()).unwrap().count(), 0);
}

#[test]
fn test_concurrent_submissions_are_isolated() {
    let t = TestJudge::with_runner(ScriptRunner::with_delay(Duration::from_millis(2)));
    const SUBMISSIONS: usize = 8;

    let verdicts: Vec<(usize, Verdict)> = thread::scope(|s| {
        let handles: Vec<_> = (0..SUBMISSIONS)
            .map(|i| {
                let judge = &t.judge;
                s.spawn(move || (i, judge.judge(&format!("offset:{}", i % 2))))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for (i, verdict) in verdicts {
        let expected = if i % 2 == 0 {
            Verdict::Accepted
        } else {
            Verdict::WrongAnswer { case: 1 }
        };
        assert_eq!(verdict, expected, "submission {i}");
    }

    let mut seen = t.runner.calls.lock().clone();
    seen.sort();
    seen.dedup();
    assert_eq!(seen.len(), SUBMISSIONS);
    t.assert_no_workspace_left();
}
