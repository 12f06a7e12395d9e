//! Driver to run a collection of tests.
//!
//! The driver loads a test suite, selects the test cases matched by the user's filters, runs them
//! through a [`TestExecutor`](crate::interfaces::TestExecutor) and reports progress through
//! [`RunHooks`]. Its result is the set of filters that selected nothing, which usually means a typo.
//!
//! ## Modules
//!
//! - `resolver` - Filter resolution and the per-run filter usage arena
//! - `coordinator` - Concurrent dispatch and result aggregation
//! - `hooks` - Observer interface
//! - `cancel` - Cooperative cancellation token

mod cancel;
mod coordinator;
mod hooks;
mod resolver;

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use testdrive_core::{ConfigError, ConfigTree, TestFilter, TestSuite};
use thiserror::Error;

pub use cancel::CancelToken;
pub use coordinator::{CANCELLED_BEFORE_START, CaseOutcome, Coordinator, CoordinatorReport, EXECUTION_LOST};
pub use hooks::RunHooks;
pub use resolver::{FilterId, FilterUsage, SelectedCase, Selection, Target, select};

use crate::interfaces::{ExecutionContext, LoadError, SuiteLoader, TestExecutor};

/// Errors that abort a run before any test case is reported.
#[derive(Debug, Error)]
pub enum DriveError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Locations a run works with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub suite_root: PathBuf,
    /// Definitions file replacing the default one under `suite_root`.
    pub definitions: Option<PathBuf>,
    pub build_root: PathBuf,
    /// Passed to the executor untouched.
    pub store_path: Option<PathBuf>,
}

impl RunOptions {
    /// Options for a suite whose binaries live next to its definitions.
    pub fn new(suite_root: impl Into<PathBuf>) -> Self {
        let suite_root = suite_root.into();
        Self {
            build_root: suite_root.clone(),
            suite_root,
            definitions: None,
            store_path: None,
        }
    }

    pub fn with_definitions(mut self, definitions: impl Into<PathBuf>) -> Self {
        self.definitions = Some(definitions.into());
        self
    }

    pub fn with_build_root(mut self, build_root: impl Into<PathBuf>) -> Self {
        self.build_root = build_root.into();
        self
    }

    pub fn with_store_path(mut self, store_path: impl Into<PathBuf>) -> Self {
        self.store_path = Some(store_path.into());
        self
    }
}

/// Result of [`Driver::drive`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunResult {
    /// Filters that did not select any executed test case.
    ///
    /// A non-empty set probably indicates a usage error: a filter that matches nothing is usually a typo
    /// or refers to a test that no longer exists.
    pub unused_filters: BTreeSet<TestFilter>,
    /// Whether the run was cancelled before every selected case could start.
    pub cancelled: bool,
}

/// Result of [`Driver::list`].
#[derive(Debug, Clone, Default)]
pub struct ListResult {
    pub selection: Selection,
    pub unused_filters: BTreeSet<TestFilter>,
}

/// Loads suites and runs them with a fixed pair of collaborators.
///
/// A driver keeps no state between calls. Each run gets a fresh filter usage arena and is cancelled
/// only through the token its caller passes in.
pub struct Driver {
    loader: Arc<dyn SuiteLoader>,
    executor: Arc<dyn TestExecutor>,
}

impl Driver {
    pub fn new(loader: Arc<dyn SuiteLoader>, executor: Arc<dyn TestExecutor>) -> Self {
        Self { loader, executor }
    }

    /// Run the test cases of the suite described by `options` that match `filters`.
    ///
    /// ## Parameters
    /// - `filters`: selection filters; an empty set runs everything.
    /// - `config`: run configuration; `parallelism` bounds the number of cases in flight.
    /// - `cancel`: stops the run once fired; cases not yet started are skipped and running ones are
    ///   asked to stop.
    /// - `hooks`: progress observer.
    ///
    /// ## Returns
    /// - (`RunResult`): the filters that did not select any executed case.
    ///
    /// ## Errors
    /// - `DriveError::Config` if `config` holds invalid values.
    /// - `DriveError::Load` if the suite definitions cannot be loaded. No hook is called in either case.
    #[tracing::instrument(skip_all, fields(suite_root = %options.suite_root.display(), filters = filters.len()))]
    pub async fn drive(
        &self,
        options: &RunOptions,
        filters: &BTreeSet<TestFilter>,
        config: &ConfigTree,
        cancel: &CancelToken,
        hooks: &mut dyn RunHooks,
    ) -> Result<RunResult, DriveError> {
        let parallelism = config.parallelism()?;
        let suite = self.load(options).await?;

        let filters: Vec<TestFilter> = filters.iter().cloned().collect();
        let selection = select(&filters, &suite);

        let context = Arc::new(ExecutionContext {
            config: config.clone(),
            store_path: options.store_path.clone(),
        });
        let coordinator = Coordinator::new(Arc::clone(&self.executor), context, parallelism, cancel.clone());
        let report = coordinator.run(selection, FilterUsage::new(filters.len()), hooks).await;

        let unused_filters = report.usage.unused(&filters);
        tracing::info!(
            results = report.outcomes.len(),
            unused_filters = unused_filters.len(),
            cancelled = report.cancelled,
            "run finished"
        );

        Ok(RunResult {
            unused_filters,
            cancelled: report.cancelled,
        })
    }

    /// Load the suite and resolve `filters` without running anything.
    #[tracing::instrument(skip_all, fields(suite_root = %options.suite_root.display(), filters = filters.len()))]
    pub async fn list(&self, options: &RunOptions, filters: &BTreeSet<TestFilter>) -> Result<ListResult, DriveError> {
        let suite = self.load(options).await?;

        let filters: Vec<TestFilter> = filters.iter().cloned().collect();
        let selection = select(&filters, &suite);

        let mut usage = FilterUsage::new(filters.len());
        for entry in &selection {
            usage.mark(&entry.filters);
        }

        Ok(ListResult {
            unused_filters: usage.unused(&filters),
            selection,
        })
    }

    async fn load(&self, options: &RunOptions) -> Result<TestSuite, LoadError> {
        let suite = self
            .loader
            .load(&options.suite_root, options.definitions.as_deref(), &options.build_root)
            .await?;
        tracing::debug!(
            programs = suite.programs().len(),
            cases = suite.case_count(),
            "loaded test suite"
        );
        Ok(suite)
    }
}
