#![forbid(unsafe_code)]
//! Filter-driven test suite execution.
//!
//! A run loads a test suite, selects the test cases matched by a set of filters, executes them with a
//! bounded amount of concurrency and reports each result through caller-supplied hooks. Filters that
//! select nothing are returned to the caller so that typos do not go unnoticed.
//!
//! ## Panic Policy
//!
//! - **Production code**: Use `Result` or `Option` with `?` / `ok_or` / `map_err`. The `cli` module
//!   enforces `#![deny(clippy::unwrap_used)]`.
//! - **Test code**: `.unwrap()` and `.expect()` are acceptable in tests.
//! - **Collaborators**: a panicking [`TestExecutor`] only breaks the test case it was running.

pub mod cli;
pub mod driver;
pub mod executor;
pub mod interfaces;
pub mod suite;

pub use driver::{CancelToken, DriveError, Driver, ListResult, RunHooks, RunOptions, RunResult};
pub use executor::ProcessExecutor;
pub use interfaces::{ExecutionContext, ExecutionReport, LoadError, SuiteLoader, TestExecutor};
pub use suite::SuitefileLoader;
pub use testdrive_core::{
    ConfigError, ConfigTree, FilterError, Interface, Metadata, Outcome, OutcomeKind, TestCase, TestFilter,
    TestProgram, TestSuite,
};
