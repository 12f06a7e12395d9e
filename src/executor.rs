//! Process-based test executor.
//!
//! Each test case runs as a child process of its program's binary, in the binary's directory:
//! - `plain` programs are run without arguments and pass when they exit with status 0;
//! - `listing` programs are run with the case name as their only argument. Exit status 77 means the
//!   case skipped itself.
//!
//! Requirements declared in the case metadata are checked before anything is spawned. The child is
//! killed when the case times out or the run is cancelled. Cases declared as expected failures have
//! their failed and passed outcomes swapped for `expected_failure` and `failed`.

use std::env;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use testdrive_core::{Interface, Outcome, OutcomeKind, TestCase, TestProgram};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;

use crate::driver::CancelToken;
use crate::interfaces::{ExecutionContext, ExecutionReport, TestExecutor};

/// Exit status a `listing` test case uses to report that it skipped itself.
pub const SKIP_EXIT_STATUS: i32 = 77;

/// How long to keep reading output once the test program is gone. Background processes it left behind
/// may hold the pipes open indefinitely.
const OUTPUT_GRACE: Duration = Duration::from_secs(2);

/// Default [`TestExecutor`] spawning one process per test case.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessExecutor;

#[async_trait]
impl TestExecutor for ProcessExecutor {
    async fn execute(
        &self,
        program: &TestProgram,
        case: &TestCase,
        context: &ExecutionContext,
        cancel: &CancelToken,
    ) -> ExecutionReport {
        let started = Instant::now();

        if let Some(reason) = check_requirements(program, case, context) {
            return ExecutionReport::new(Outcome::skipped(reason), started.elapsed());
        }

        let captured = run_case(program, case, cancel).await;
        let duration = started.elapsed();

        if let Some(store) = &context.store_path {
            store_output(store, program, case, &captured).await;
        }

        ExecutionReport::new(apply_expectation(case, captured.outcome), duration)
    }
}

/// Reinterpret the outcome of a case declared as an expected failure. Broken and skipped outcomes
/// are kept as they are.
pub fn apply_expectation(case: &TestCase, outcome: Outcome) -> Outcome {
    let Some(expected) = &case.metadata().expected_failure else {
        return outcome;
    };
    match outcome.kind {
        OutcomeKind::Failed => Outcome::expected_failure(expected.clone()),
        OutcomeKind::Passed => Outcome::failed("Test case was expected to fail but passed"),
        _ => outcome,
    }
}

/// Return the skip reason for the first requirement of `case` that is not met.
fn check_requirements(program: &TestProgram, case: &TestCase, context: &ExecutionContext) -> Option<String> {
    let metadata = case.metadata();

    for var in &metadata.required_configs {
        if context.config.test_suite_var(program.test_suite(), var).is_none() {
            return Some(format!("Required configuration property '{}' not defined", var));
        }
    }

    for required in &metadata.required_programs {
        if !program_available(required, program.root()) {
            return Some(format!("Required program '{}' not found", required.display()));
        }
    }

    None
}

/// Absolute paths are checked directly, bare names are searched in `PATH`, other relative paths are
/// resolved against `root`.
fn program_available(required: &Path, root: &Path) -> bool {
    if required.is_absolute() {
        return required.is_file();
    }
    if required.components().count() > 1 {
        return root.join(required).is_file();
    }
    env::var_os("PATH")
        .map(|paths| env::split_paths(&paths).any(|dir| dir.join(required).is_file()))
        .unwrap_or(false)
}

/// Outcome of a child process plus whatever it wrote.
#[derive(Debug)]
struct Captured {
    outcome: Outcome,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

impl Captured {
    fn without_output(outcome: Outcome) -> Self {
        Self {
            outcome,
            stdout: Vec::new(),
            stderr: Vec::new(),
        }
    }
}

#[tracing::instrument(skip_all, fields(program = %program.relative_path().display(), case = case.name()))]
async fn run_case(program: &TestProgram, case: &TestCase, cancel: &CancelToken) -> Captured {
    let binary = program.absolute_path();
    let binary = std::path::absolute(&binary).unwrap_or(binary);
    let mut command = Command::new(&binary);
    if program.interface() == Interface::Listing {
        command.arg(case.name());
    }
    if let Some(dir) = binary.parent() {
        command.current_dir(dir);
    }
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            return Captured::without_output(Outcome::broken(format!(
                "Failed to execute test program '{}': {}",
                binary.display(),
                e
            )));
        }
    };

    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    let timeout = case.metadata().timeout;
    let outcome = tokio::select! {
        status = child.wait() => match status {
            Ok(status) => outcome_for(program.interface(), status),
            Err(e) => Outcome::broken(format!("Failed to wait for test program: {}", e)),
        },
        _ = tokio::time::sleep(timeout) => {
            tracing::debug!(timeout_secs = timeout.as_secs(), "test case timed out");
            kill(&mut child).await;
            Outcome::broken("Test case timed out")
        }
        _ = cancel.cancelled() => {
            kill(&mut child).await;
            Outcome::broken("Test case was cancelled")
        }
    };

    Captured {
        outcome,
        stdout: collect(stdout).await,
        stderr: collect(stderr).await,
    }
}

async fn kill(child: &mut tokio::process::Child) {
    if let Err(e) = child.kill().await {
        tracing::warn!(error = %e, "failed to kill test program");
    }
}

fn drain<R>(mut reader: R) -> JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buffer = Vec::new();
        if let Err(e) = reader.read_to_end(&mut buffer).await {
            tracing::debug!(error = %e, "failed to read test program output");
        }
        buffer
    })
}

async fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    let Some(mut handle) = handle else {
        return Vec::new();
    };
    match tokio::time::timeout(OUTPUT_GRACE, &mut handle).await {
        Ok(output) => output.unwrap_or_default(),
        Err(_) => {
            tracing::debug!("test program output still open after exit; discarding it");
            handle.abort();
            Vec::new()
        }
    }
}

/// Map the exit status of a finished test case to its outcome.
pub fn outcome_for(interface: Interface, status: ExitStatus) -> Outcome {
    match status.code() {
        Some(0) => Outcome::passed(),
        Some(SKIP_EXIT_STATUS) if interface == Interface::Listing => Outcome::skipped("Test case skipped itself"),
        Some(code) => Outcome::failed(format!("Returned non-success exit status {}", code)),
        None => Outcome::broken(terminated_reason(status)),
    }
}

#[cfg(unix)]
fn terminated_reason(status: ExitStatus) -> String {
    use std::os::unix::process::ExitStatusExt;

    match status.signal() {
        Some(signal) => format!("Received signal {}", signal),
        None => format!("Terminated abnormally: {}", status),
    }
}

#[cfg(not(unix))]
fn terminated_reason(status: ExitStatus) -> String {
    format!("Terminated abnormally: {}", status)
}

/// Directory under `store` holding the artifacts of `program`.
pub fn artifact_dir(store: &Path, program: &TestProgram) -> PathBuf {
    store.join(flatten(&program.relative_path().to_string_lossy()))
}

fn flatten(name: &str) -> String {
    name.replace(['/', '\\'], "_")
}

async fn store_output(store: &Path, program: &TestProgram, case: &TestCase, captured: &Captured) {
    let dir = artifact_dir(store, program);
    if let Err(e) = tokio::fs::create_dir_all(&dir).await {
        tracing::warn!(path = %dir.display(), error = %e, "cannot create artifact directory");
        return;
    }

    let stem = flatten(case.name());
    for (extension, contents) in [("stdout", &captured.stdout), ("stderr", &captured.stderr)] {
        let path = dir.join(format!("{}.{}", stem, extension));
        if let Err(e) = tokio::fs::write(&path, contents).await {
            tracing::warn!(path = %path.display(), error = %e, "cannot store test case output");
        }
    }
}
