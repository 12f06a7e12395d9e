//! Collaborator boundaries of the driver.
//!
//! The driver does not know how a suite is described on disk or how a test program is launched. It
//! talks to two services through the traits below:
//! - [`SuiteLoader`]: turn a suite root into the tree of test programs and cases;
//! - [`TestExecutor`]: run one test case and report its outcome.
//!
//! Default implementations live in [`crate::suite`] and [`crate::executor`]; tests substitute in-memory
//! versions.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use testdrive_core::{ConfigTree, Outcome, TestCase, TestProgram, TestSuite};
use thiserror::Error;

use crate::driver::CancelToken;

/// Errors that prevent a suite from being loaded at all.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Cannot read test suite definitions '{}': {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed test suite definitions '{}': {message}", .path.display())]
    Parse { path: PathBuf, message: String },

    #[error("Invalid test suite definitions '{}': {message}", .path.display())]
    Invalid { path: PathBuf, message: String },

    #[error("Test suite definitions '{}' include themselves", .0.display())]
    IncludeCycle(PathBuf),

    #[error("Cannot resolve build root '{}': {source}", .path.display())]
    BuildRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

// ============================================================================
// Suite Loader Interface
// ============================================================================

/// Produce the test tree for a run.
///
/// Failing to load the top-level definitions is fatal for the whole run. Programs that exist in the
/// definitions but cannot be enumerated are not errors: they are returned with a listing failure.
#[async_trait]
pub trait SuiteLoader: Send + Sync {
    /// ## Parameters
    /// - `suite_root`: directory holding the suite definitions.
    /// - `definitions`: explicit definitions file, replacing the default one under `suite_root`.
    /// - `build_root`: directory where the test program binaries live.
    async fn load(
        &self,
        suite_root: &Path,
        definitions: Option<&Path>,
        build_root: &Path,
    ) -> Result<TestSuite, LoadError>;
}

// ============================================================================
// Test Executor Interface
// ============================================================================

/// Read-only state shared by every execution of one run.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    pub config: ConfigTree,
    /// Where the executor may persist per-case artifacts. Opaque to the driver.
    pub store_path: Option<PathBuf>,
}

/// Outcome of one execution and how long it took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionReport {
    pub outcome: Outcome,
    pub duration: Duration,
}

impl ExecutionReport {
    pub fn new(outcome: Outcome, duration: Duration) -> Self {
        Self { outcome, duration }
    }
}

/// Run a single test case.
///
/// Executions of different cases may overlap. Implementations must return once `cancel` fires instead
/// of waiting for the case to complete on its own.
#[async_trait]
pub trait TestExecutor: Send + Sync {
    async fn execute(
        &self,
        program: &TestProgram,
        case: &TestCase,
        context: &ExecutionContext,
        cancel: &CancelToken,
    ) -> ExecutionReport;
}
