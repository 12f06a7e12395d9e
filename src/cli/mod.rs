//! Command-line interface of the test driver.
//!
//! ## Commands
//!
//! - `test [FILTER]...` - Run the selected test cases and report their results
//! - `list [FILTER]...` - Print the selected test cases without running them
//!
//! Filters are `.` (whole suite), `path` (a program or every program under a directory) or
//! `path:case` (one test case).
//!
//! ## Modules
//!
//! - `commands` - Command implementations
//! - `reporter` - Console hooks and run summary
//!
//! ## Design
//!
//! Command functions return `CliResult<T>` instead of calling `process::exit`.
//! Only the top-level `run()` function handles errors and exits.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod commands;
pub mod reporter;

use std::fmt;
use std::path::PathBuf;
use std::process;

use clap::{Args, Parser, Subcommand};

// ============================================================================
// CLI Error handling
// ============================================================================

/// Exit code for CLI operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(pub i32);

impl ExitCode {
    pub const SUCCESS: ExitCode = ExitCode(0);
    pub const FAILURE: ExitCode = ExitCode(1);
    /// Bad command-line input.
    pub const USAGE: ExitCode = ExitCode(2);
}

/// Error type for CLI operations.
///
/// Contains a user-facing message and an exit code. The CLI entry point
/// catches these errors, prints the message, and exits with the code.
#[derive(Debug)]
pub struct CliError {
    /// User-facing error message (already formatted for display)
    pub message: String,
    /// Exit code to return to the shell
    pub exit_code: ExitCode,
}

impl CliError {
    pub fn new(message: impl Into<String>, exit_code: ExitCode) -> Self {
        Self {
            message: message.into(),
            exit_code,
        }
    }

    /// Create a failure error (exit code 1).
    pub fn failure(message: impl Into<String>) -> Self {
        Self::new(message, ExitCode::FAILURE)
    }

    /// Create a usage error (exit code 2).
    pub fn usage(message: impl Into<String>) -> Self {
        Self::new(message, ExitCode::USAGE)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// Clap CLI definition
// ============================================================================

/// Run test programs selected by filters
#[derive(Parser, Debug)]
#[command(name = "testdrive")]
#[command(version = VERSION)]
#[command(about = "Run test programs selected by filters", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Options shared by every command that loads a suite.
#[derive(Args, Debug, Clone)]
pub struct SuiteArgs {
    /// Directory holding the test suite definitions
    #[arg(long = "suite-root", value_name = "DIR", default_value = ".")]
    pub suite_root: PathBuf,

    /// Definitions file to use instead of <DIR>/Suitefile
    #[arg(long, value_name = "FILE")]
    pub definitions: Option<PathBuf>,

    /// Directory holding the test program binaries (default: the suite root)
    #[arg(long = "build-root", value_name = "DIR")]
    pub build_root: Option<PathBuf>,

    /// Set a configuration variable
    #[arg(long = "variable", value_name = "KEY=VALUE")]
    pub variables: Vec<String>,

    /// Test filters: `.`, `path` or `path:case`
    #[arg(value_name = "FILTER")]
    pub filters: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run test cases
    Test {
        #[command(flatten)]
        suite: SuiteArgs,
        /// Directory where the output of each test case is stored
        #[arg(long, value_name = "DIR")]
        store: Option<PathBuf>,
        /// Maximum number of test cases to run at once
        #[arg(short = 'j', long, value_name = "N")]
        parallelism: Option<usize>,
        /// Announce each test case as it starts
        #[arg(long)]
        verbose: bool,
    },

    /// List test cases
    List {
        #[command(flatten)]
        suite: SuiteArgs,
        /// Print the metadata of each test case
        #[arg(long)]
        verbose: bool,
    },
}

// ============================================================================
// CLI entry point
// ============================================================================

/// Main CLI entry point.
///
/// This is the only place where `process::exit` is called. All command
/// implementations return `CliResult` and errors are handled here.
pub fn run() {
    let cli = Cli::parse();

    match execute(cli) {
        Ok(exit_code) => {
            if exit_code != ExitCode::SUCCESS {
                process::exit(exit_code.0);
            }
        }
        Err(e) => {
            if !e.message.is_empty() {
                eprintln!("{}", e.message);
            }
            process::exit(e.exit_code.0);
        }
    }
}

/// Execute the CLI command and return result.
fn execute(cli: Cli) -> CliResult<ExitCode> {
    match cli.command {
        Command::Test {
            suite,
            store,
            parallelism,
            verbose,
        } => commands::run_tests(&suite, store, parallelism, verbose),
        Command::List { suite, verbose } => commands::list_tests(&suite, verbose),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_test() {
        let cli = Cli::try_parse_from([
            "testdrive",
            "test",
            "-j",
            "4",
            "--variable",
            "test_suites.net.server=localhost",
            "--store",
            "/tmp/out",
            "dir/prog1:a",
            "dir/prog2",
        ])
        .unwrap();

        let Command::Test {
            suite,
            store,
            parallelism,
            verbose,
        } = cli.command
        else {
            panic!("Expected Test command");
        };
        assert_eq!(suite.filters, ["dir/prog1:a", "dir/prog2"]);
        assert_eq!(suite.variables, ["test_suites.net.server=localhost"]);
        assert_eq!(suite.suite_root, PathBuf::from("."));
        assert_eq!(store, Some(PathBuf::from("/tmp/out")));
        assert_eq!(parallelism, Some(4));
        assert!(!verbose);
    }

    #[test]
    fn test_cli_parse_list() {
        let cli = Cli::try_parse_from([
            "testdrive",
            "list",
            "--suite-root",
            "src",
            "--build-root",
            "obj",
            "--verbose",
        ])
        .unwrap();

        let Command::List { suite, verbose } = cli.command else {
            panic!("Expected List command");
        };
        assert!(verbose);
        assert!(suite.filters.is_empty());
        assert_eq!(suite.build_root, Some(PathBuf::from("obj")));
    }

    #[test]
    fn test_cli_has_no_short_variable_flag() {
        let err = Cli::try_parse_from(["testdrive", "test", "-v", "a=b"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::UnknownArgument);
    }

    #[test]
    fn test_cli_requires_command() {
        assert!(Cli::try_parse_from(["testdrive"]).is_err());
    }
}
