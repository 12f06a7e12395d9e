//! Test suite model: programs, cases, metadata and outcomes.
//!
//! Everything here is produced once per run by a suite loader and treated as read-only afterwards.
//! Programs are shared between the driver and running executions through `Arc`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Name of the synthetic test case reported for a program whose test cases could not be enumerated.
pub const LISTING_FAILURE_CASE: &str = "__test_cases_list__";

/// Timeout applied to a test case when its definition does not set one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

// ============================================================================
// Interfaces and metadata
// ============================================================================

/// Protocol spoken between the runner and a test program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interface {
    /// The program is a single test case; its exit status is the result.
    Plain,
    /// The program prints its case names for `--list` and runs one case per invocation.
    Listing,
}

impl Interface {
    pub fn as_str(self) -> &'static str {
        match self {
            Interface::Plain => "plain",
            Interface::Listing => "listing",
        }
    }
}

impl FromStr for Interface {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plain" => Ok(Interface::Plain),
            "listing" => Ok(Interface::Listing),
            other => Err(format!("unknown test program interface '{}'", other)),
        }
    }
}

impl fmt::Display for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Properties attached to a test program or test case by its definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    /// Maximum wall-clock time a single case may run.
    pub timeout: Duration,
    /// Test suite configuration variables that must be defined for the case to run.
    pub required_configs: Vec<String>,
    /// Programs that must be available for the case to run.
    pub required_programs: Vec<PathBuf>,
    pub description: Option<String>,
    /// Set when the case is known to fail; a failure then counts as
    /// [`OutcomeKind::ExpectedFailure`] and a pass as a failure.
    pub expected_failure: Option<String>,
}

impl Default for Metadata {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            required_configs: Vec::new(),
            required_programs: Vec::new(),
            description: None,
            expected_failure: None,
        }
    }
}

// ============================================================================
// Test cases and programs
// ============================================================================

/// A single, independently reportable test case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCase {
    name: String,
    metadata: Metadata,
}

impl TestCase {
    pub fn new(name: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            name: name.into(),
            metadata,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }
}

/// A test program and the test cases it exposes.
///
/// `test_cases` is either the ordered list of cases in discovery order, or the reason the program could
/// not be enumerated (missing binary, failed listing). The latter is a program-level failure: the run
/// reports it as a single broken result instead of aborting.
#[derive(Debug, Clone)]
pub struct TestProgram {
    interface: Interface,
    relative_path: PathBuf,
    root: PathBuf,
    test_suite: String,
    metadata: Metadata,
    test_cases: Result<Vec<TestCase>, String>,
}

impl TestProgram {
    /// Create a program whose test cases were enumerated successfully.
    ///
    /// ## Parameters
    /// - `relative_path`: path of the program relative to the suite root; this is what filters match.
    /// - `root`: directory the relative path is resolved against to find the binary.
    pub fn new(
        interface: Interface,
        relative_path: impl Into<PathBuf>,
        root: impl Into<PathBuf>,
        test_suite: impl Into<String>,
        metadata: Metadata,
        test_cases: Vec<TestCase>,
    ) -> Self {
        Self {
            interface,
            relative_path: relative_path.into(),
            root: root.into(),
            test_suite: test_suite.into(),
            metadata,
            test_cases: Ok(test_cases),
        }
    }

    /// Create a program that could not be enumerated.
    pub fn with_listing_failure(
        interface: Interface,
        relative_path: impl Into<PathBuf>,
        root: impl Into<PathBuf>,
        test_suite: impl Into<String>,
        metadata: Metadata,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            interface,
            relative_path: relative_path.into(),
            root: root.into(),
            test_suite: test_suite.into(),
            metadata,
            test_cases: Err(reason.into()),
        }
    }

    pub fn interface(&self) -> Interface {
        self.interface
    }

    pub fn relative_path(&self) -> &Path {
        &self.relative_path
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of the program binary.
    pub fn absolute_path(&self) -> PathBuf {
        self.root.join(&self.relative_path)
    }

    pub fn test_suite(&self) -> &str {
        &self.test_suite
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// The program's test cases, or the reason they could not be listed.
    pub fn test_cases(&self) -> Result<&[TestCase], &str> {
        match &self.test_cases {
            Ok(cases) => Ok(cases),
            Err(reason) => Err(reason),
        }
    }
}

/// Read-only view over the programs of a loaded test suite, in discovery order.
#[derive(Debug, Clone, Default)]
pub struct TestSuite {
    programs: Vec<Arc<TestProgram>>,
}

impl TestSuite {
    pub fn new(programs: Vec<Arc<TestProgram>>) -> Self {
        Self { programs }
    }

    pub fn programs(&self) -> &[Arc<TestProgram>] {
        &self.programs
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    /// Number of enumerated test cases across all programs.
    pub fn case_count(&self) -> usize {
        self.programs
            .iter()
            .filter_map(|program| program.test_cases().ok())
            .map(<[TestCase]>::len)
            .sum()
    }
}

impl From<Vec<TestProgram>> for TestSuite {
    fn from(programs: Vec<TestProgram>) -> Self {
        Self::new(programs.into_iter().map(Arc::new).collect())
    }
}

// ============================================================================
// Outcomes
// ============================================================================

/// Classification of a test case result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OutcomeKind {
    Passed,
    Failed,
    Skipped,
    /// The case could not be run or its result could not be interpreted.
    Broken,
    /// The case failed in a way its definition declared as expected.
    ExpectedFailure,
}

impl OutcomeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OutcomeKind::Passed => "passed",
            OutcomeKind::Failed => "failed",
            OutcomeKind::Skipped => "skipped",
            OutcomeKind::Broken => "broken",
            OutcomeKind::ExpectedFailure => "expected_failure",
        }
    }

    /// Whether this kind of result counts as a success for the run as a whole.
    pub fn is_good(self) -> bool {
        matches!(
            self,
            OutcomeKind::Passed | OutcomeKind::Skipped | OutcomeKind::ExpectedFailure
        )
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of attempting to execute one test case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub kind: OutcomeKind,
    pub reason: Option<String>,
}

impl Outcome {
    pub fn new(kind: OutcomeKind, reason: Option<String>) -> Self {
        Self { kind, reason }
    }

    pub fn passed() -> Self {
        Self::new(OutcomeKind::Passed, None)
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self::new(OutcomeKind::Failed, Some(reason.into()))
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::new(OutcomeKind::Skipped, Some(reason.into()))
    }

    pub fn broken(reason: impl Into<String>) -> Self {
        Self::new(OutcomeKind::Broken, Some(reason.into()))
    }

    pub fn expected_failure(reason: impl Into<String>) -> Self {
        Self::new(OutcomeKind::ExpectedFailure, Some(reason.into()))
    }

    pub fn is_good(&self) -> bool {
        self.kind.is_good()
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            Some(reason) => write!(f, "{}: {}", self.kind, reason),
            None => write!(f, "{}", self.kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program(cases: &[&str]) -> TestProgram {
        TestProgram::new(
            Interface::Listing,
            "dir/prog",
            "/build",
            "suite",
            Metadata::default(),
            cases.iter().map(|name| TestCase::new(*name, Metadata::default())).collect(),
        )
    }

    #[test]
    fn test_interface_round_trip() {
        assert_eq!("plain".parse::<Interface>(), Ok(Interface::Plain));
        assert_eq!("listing".parse::<Interface>(), Ok(Interface::Listing));
        assert!("atf".parse::<Interface>().is_err());
        assert_eq!(Interface::Listing.to_string(), "listing");
    }

    #[test]
    fn test_program_paths() {
        let program = program(&["a"]);
        assert_eq!(program.relative_path(), Path::new("dir/prog"));
        assert_eq!(program.absolute_path(), PathBuf::from("/build/dir/prog"));
    }

    #[test]
    fn test_program_keeps_case_order() {
        let program = program(&["z", "a", "m"]);
        let names: Vec<_> = program.test_cases().unwrap().iter().map(TestCase::name).collect();
        assert_eq!(names, ["z", "a", "m"]);
    }

    #[test]
    fn test_listing_failure_has_no_cases() {
        let program = TestProgram::with_listing_failure(
            Interface::Plain,
            "dir/gone",
            "/build",
            "suite",
            Metadata::default(),
            "Test program does not exist",
        );
        assert_eq!(program.test_cases(), Err("Test program does not exist"));
    }

    #[test]
    fn test_suite_case_count_skips_broken_programs() {
        let broken = TestProgram::with_listing_failure(
            Interface::Plain,
            "x",
            "/build",
            "suite",
            Metadata::default(),
            "boom",
        );
        let suite = TestSuite::from(vec![program(&["a", "b"]), broken, program(&["c"])]);
        assert_eq!(suite.programs().len(), 3);
        assert_eq!(suite.case_count(), 3);
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(Outcome::passed().to_string(), "passed");
        assert_eq!(
            Outcome::failed("Returned non-success exit status 1").to_string(),
            "failed: Returned non-success exit status 1"
        );
        assert_eq!(Outcome::expected_failure("known bug").to_string(), "expected_failure: known bug");
    }

    #[test]
    fn test_good_outcomes() {
        assert!(Outcome::passed().is_good());
        assert!(Outcome::skipped("no network").is_good());
        assert!(Outcome::expected_failure("known").is_good());
        assert!(!Outcome::failed("x").is_good());
        assert!(!Outcome::broken("x").is_good());
    }
}
