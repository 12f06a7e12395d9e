//! Provide the pure vocabulary shared by the testdrive driver, its collaborators and its CLI.
//!
//! This crate is intentionally small and dependency-light:
//! - [`model`]: test programs, test cases, their metadata and execution outcomes;
//! - [`filters`]: hierarchical test filters and their matching rules;
//! - [`config`]: the read-only configuration tree handed to a run.
//!
//! ## Notes
//!
//! - **No IO**, no async runtime and no global state. Loading suites and running programs lives in the
//!   `testdrive` crate.

pub mod config;
pub mod filters;
pub mod model;

pub use config::{ConfigError, ConfigTree};
pub use filters::{FilterError, TestFilter};
pub use model::{Interface, Metadata, Outcome, OutcomeKind, TestCase, TestProgram, TestSuite};
